//! Stream partitioning by (organization, device).
//!
//! Groups keep first-seen order at both levels and items keep input order
//! inside a group. Nothing is filtered or deduplicated.

use std::collections::HashMap;
use std::fmt;

use crate::model::{Measurement, PositionFix};

/// Records that belong to one device of one organization.
pub trait Keyed {
    fn organization(&self) -> &str;
    fn device(&self) -> &str;
}

impl Keyed for Measurement {
    fn organization(&self) -> &str {
        &self.organization
    }

    fn device(&self) -> &str {
        &self.device
    }
}

impl Keyed for PositionFix {
    fn organization(&self) -> &str {
        &self.organization
    }

    fn device(&self) -> &str {
        &self.device
    }
}

impl<T: Keyed + ?Sized> Keyed for &T {
    fn organization(&self) -> &str {
        (**self).organization()
    }

    fn device(&self) -> &str {
        (**self).device()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub organization: String,
    pub device: String,
}

impl PartitionKey {
    pub fn new(organization: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            device: device.into(),
        }
    }

    pub fn of<T: Keyed + ?Sized>(item: &T) -> Self {
        Self::new(item.organization(), item.device())
    }

    pub fn matches<T: Keyed + ?Sized>(&self, item: &T) -> bool {
        self.organization == item.organization() && self.device == item.device()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.device)
    }
}

#[derive(Debug, Clone)]
struct DeviceGroup<T> {
    device: String,
    items: Vec<T>,
}

#[derive(Debug, Clone)]
struct OrganizationGroup<T> {
    organization: String,
    devices: Vec<DeviceGroup<T>>,
}

#[derive(Debug, Clone)]
pub struct Partitions<T> {
    groups: Vec<OrganizationGroup<T>>,
    // (organization slot, device slot) inside `groups`.
    slots: HashMap<PartitionKey, (usize, usize)>,
    len: usize,
}

impl<T> Default for Partitions<T> {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            slots: HashMap::new(),
            len: 0,
        }
    }
}

impl<T: Keyed> Partitions<T> {
    pub fn push(&mut self, item: T) {
        let key = PartitionKey::of(&item);
        let (org_slot, device_slot) = match self.slots.get(&key) {
            Some(slot) => *slot,
            None => {
                let existing = self
                    .groups
                    .iter()
                    .position(|group| group.organization == key.organization);
                let org_slot = match existing {
                    Some(slot) => slot,
                    None => {
                        self.groups.push(OrganizationGroup {
                            organization: key.organization.clone(),
                            devices: Vec::new(),
                        });
                        self.groups.len() - 1
                    }
                };
                let devices = &mut self.groups[org_slot].devices;
                devices.push(DeviceGroup {
                    device: key.device.clone(),
                    items: Vec::new(),
                });
                let slot = (org_slot, devices.len() - 1);
                self.slots.insert(key, slot);
                slot
            }
        };
        self.groups[org_slot].devices[device_slot].items.push(item);
        self.len += 1;
    }
}

impl<T> Partitions<T> {
    pub fn get(&self, key: &PartitionKey) -> Option<&[T]> {
        let (org_slot, device_slot) = *self.slots.get(key)?;
        Some(&self.groups[org_slot].devices[device_slot].items)
    }

    /// Total number of items across all partitions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn partition_count(&self) -> usize {
        self.slots.len()
    }

    /// Partitions in deterministic order: organizations first-seen, then
    /// devices first-seen within the organization.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionKey, &[T])> + '_ {
        self.groups.iter().flat_map(|group| {
            group.devices.iter().map(move |device| {
                (
                    PartitionKey::new(group.organization.as_str(), device.device.as_str()),
                    device.items.as_slice(),
                )
            })
        })
    }

    pub fn into_items(self) -> impl Iterator<Item = T> {
        self.groups
            .into_iter()
            .flat_map(|group| group.devices.into_iter())
            .flat_map(|device| device.items.into_iter())
    }
}

impl<T: Keyed> FromIterator<T> for Partitions<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut partitions = Partitions::default();
        for item in iter {
            partitions.push(item);
        }
        partitions
    }
}

/// Partitions borrowed records without copying them.
pub fn partition<T: Keyed>(items: &[T]) -> Partitions<&T> {
    items.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::RawTimestamp;

    fn m(org: &str, device: &str, ts: f64) -> Measurement {
        Measurement::new(org, device, RawTimestamp::epoch(ts))
    }

    #[test]
    fn keeps_first_seen_order() {
        let items = vec![
            m("B", "D9", 1.0),
            m("A", "D2", 2.0),
            m("B", "D1", 3.0),
            m("A", "D1", 4.0),
            m("B", "D9", 5.0),
        ];
        let parts = partition(&items);
        let keys: Vec<String> = parts.iter().map(|(key, _)| key.to_string()).collect();
        assert_eq!(keys, vec!["B/D9", "B/D1", "A/D2", "A/D1"]);

        let b_d9 = parts.get(&PartitionKey::new("B", "D9")).unwrap();
        let ts: Vec<_> = b_d9.iter().map(|m| m.timestamp.clone()).collect();
        assert_eq!(ts, vec![RawTimestamp::epoch(1.0), RawTimestamp::epoch(5.0)]);
    }

    #[test]
    fn reconstructs_input_multiset() {
        let items = vec![
            m("A", "D1", 1.0),
            m("A", "D1", 1.0),
            m("A", "D2", 2.0),
            m("C", "D1", 3.0),
        ];
        let parts = partition(&items);
        assert_eq!(parts.len(), items.len());
        assert_eq!(parts.partition_count(), 3);

        let mut rebuilt: Vec<Measurement> = parts.into_items().cloned().collect();
        let mut original = items.clone();
        let order = |a: &Measurement, b: &Measurement| {
            (a.organization.as_str(), a.device.as_str())
                .cmp(&(b.organization.as_str(), b.device.as_str()))
                .then(a.timestamp.to_string().cmp(&b.timestamp.to_string()))
        };
        rebuilt.sort_by(order);
        original.sort_by(order);
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn same_device_in_other_org_is_separate() {
        let items = vec![m("A", "D1", 1.0), m("B", "D1", 2.0)];
        let parts = partition(&items);
        assert_eq!(parts.partition_count(), 2);
        assert_eq!(parts.get(&PartitionKey::new("A", "D1")).unwrap().len(), 1);
        assert!(parts.get(&PartitionKey::new("a", "D1")).is_none());
    }

    #[test]
    fn empty_input_has_no_partitions() {
        let parts = partition::<Measurement>(&[]);
        assert!(parts.is_empty());
        assert_eq!(parts.iter().count(), 0);
    }
}
