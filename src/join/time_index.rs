//! Sorted timestamp index over one device's position fixes.

use time::OffsetDateTime;

use super::partition::PartitionKey;
use crate::error::{Error, Result};
use crate::model::PositionFix;

#[derive(Debug, Clone, Copy)]
pub struct IndexedFix<'a> {
    pub at: OffsetDateTime,
    pub fix: &'a PositionFix,
}

#[derive(Debug, Clone)]
pub struct TimeIndex<'a> {
    key: PartitionKey,
    entries: Vec<IndexedFix<'a>>,
    rejected: usize,
}

impl<'a> TimeIndex<'a> {
    /// Builds the index for `key`. Fixes whose timestamp cannot be read are
    /// left out and counted in [`TimeIndex::rejected`]; a fix for another
    /// device is a caller bug and fails the build.
    pub fn build<I>(key: PartitionKey, fixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a PositionFix>,
    {
        let mut entries = Vec::new();
        let mut rejected = 0usize;
        for fix in fixes {
            if !key.matches(fix) {
                return Err(Error::MixedPartition {
                    expected: key.to_string(),
                    found: PartitionKey::of(fix).to_string(),
                });
            }
            match fix.timestamp.to_instant() {
                Ok(at) => entries.push(IndexedFix { at, fix }),
                Err(err) => {
                    log::warn!("dropping position fix for {key}: {err}");
                    rejected += 1;
                }
            }
        }
        // Stable: equal timestamps keep input order.
        entries.sort_by_key(|entry| entry.at);
        Ok(Self {
            key,
            entries,
            rejected,
        })
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn entries(&self) -> &[IndexedFix<'a>] {
        &self.entries
    }

    /// Index of the first entry with `at >= instant`.
    pub(crate) fn lower_bound(&self, instant: OffsetDateTime) -> usize {
        self.entries.partition_point(|entry| entry.at < instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::RawTimestamp;

    fn fix(ts: RawTimestamp, lat: f64) -> PositionFix {
        PositionFix::new("A", "D1", ts, lat, 0.0)
    }

    #[test]
    fn sorts_ascending_and_keeps_tie_order() {
        let fixes = vec![
            fix(RawTimestamp::epoch(30.0), 3.0),
            fix(RawTimestamp::epoch(10.0), 1.0),
            fix(RawTimestamp::epoch(20.0), 2.0),
            fix(RawTimestamp::epoch(10.0), 1.5),
        ];
        let index = TimeIndex::build(PartitionKey::new("A", "D1"), &fixes).unwrap();
        let lats: Vec<f64> = index.entries().iter().map(|e| e.fix.latitude).collect();
        assert_eq!(lats, vec![1.0, 1.5, 2.0, 3.0]);
    }

    #[test]
    fn empty_input_builds_empty_index() {
        let fixes: Vec<PositionFix> = Vec::new();
        let index = TimeIndex::build(PartitionKey::new("A", "D1"), &fixes).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.rejected(), 0);
    }

    #[test]
    fn malformed_fixes_are_counted_not_indexed() {
        let fixes = vec![
            fix(RawTimestamp::text("not a time"), 9.0),
            fix(RawTimestamp::epoch(5.0), 1.0),
        ];
        let index = TimeIndex::build(PartitionKey::new("A", "D1"), &fixes).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.rejected(), 1);
    }

    #[test]
    fn rejects_fix_from_other_device() {
        let fixes = vec![
            fix(RawTimestamp::epoch(5.0), 1.0),
            PositionFix::new("A", "D2", RawTimestamp::epoch(6.0), 0.0, 0.0),
        ];
        let err = TimeIndex::build(PartitionKey::new("A", "D1"), &fixes).unwrap_err();
        assert!(matches!(err, Error::MixedPartition { .. }));
    }

    #[test]
    fn does_not_touch_input_timestamps() {
        let fixes = vec![fix(RawTimestamp::text("1970-01-01T00:00:07Z"), 1.0)];
        let before = fixes.clone();
        let _ = TimeIndex::build(PartitionKey::new("A", "D1"), &fixes).unwrap();
        assert_eq!(fixes, before);
    }
}
