//! Nearest-timestamp lookup against a [`TimeIndex`].

use time::OffsetDateTime;

use super::time_index::{IndexedFix, TimeIndex};
use crate::error::{Error, Result};
use crate::timestamp::abs_diff_seconds;

#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub entry: IndexedFix<'a>,
    /// Absolute distance between the query and the chosen fix, in seconds.
    pub gap_seconds: f64,
}

/// Returns the fix closest in time to `query`.
///
/// When the fixes immediately before and after `query` are equally far away
/// the earlier one wins. Among fixes sharing a timestamp the first one in
/// input order wins.
pub fn nearest<'a>(index: &TimeIndex<'a>, query: OffsetDateTime) -> Result<Resolved<'a>> {
    let entries = index.entries();
    if entries.is_empty() {
        return Err(Error::EmptyIndex {
            organization: index.key().organization.clone(),
            device: index.key().device.clone(),
        });
    }

    let upper = index.lower_bound(query);
    let chosen = if upper == entries.len() {
        first_of_run(index, upper - 1)
    } else if upper == 0 || entries[upper].at == query {
        upper
    } else {
        let before = first_of_run(index, upper - 1);
        let gap_before = query - entries[before].at;
        let gap_after = entries[upper].at - query;
        if gap_before <= gap_after {
            before
        } else {
            upper
        }
    };

    let entry = entries[chosen];
    Ok(Resolved {
        entry,
        gap_seconds: abs_diff_seconds(entry.at, query),
    })
}

fn first_of_run(index: &TimeIndex<'_>, position: usize) -> usize {
    index.lower_bound(index.entries()[position].at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::partition::PartitionKey;
    use crate::model::PositionFix;
    use crate::timestamp::RawTimestamp;
    use time::macros::datetime;

    fn fixes(points: &[(f64, f64)]) -> Vec<PositionFix> {
        points
            .iter()
            .map(|(ts, lat)| PositionFix::new("A", "D1", RawTimestamp::epoch(*ts), *lat, 0.0))
            .collect()
    }

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    fn key() -> PartitionKey {
        PartitionKey::new("A", "D1")
    }

    #[test]
    fn picks_closest_fix() {
        let data = fixes(&[(98.0, 1.0), (105.0, 1.1)]);
        let index = TimeIndex::build(key(), &data).unwrap();
        let resolved = nearest(&index, at(100)).unwrap();
        assert_eq!(resolved.entry.fix.latitude, 1.0);
        assert_eq!(resolved.gap_seconds, 2.0);
    }

    #[test]
    fn tie_prefers_earlier_fix() {
        let data = fixes(&[(105.0, 2.0), (95.0, 1.0)]);
        let index = TimeIndex::build(key(), &data).unwrap();
        let resolved = nearest(&index, at(100)).unwrap();
        assert_eq!(resolved.entry.fix.latitude, 1.0);
        assert_eq!(resolved.gap_seconds, 5.0);
    }

    #[test]
    fn exact_match_has_zero_gap() {
        let data = fixes(&[(90.0, 0.0), (100.0, 1.0), (110.0, 2.0)]);
        let index = TimeIndex::build(key(), &data).unwrap();
        let resolved = nearest(&index, at(100)).unwrap();
        assert_eq!(resolved.entry.fix.latitude, 1.0);
        assert_eq!(resolved.gap_seconds, 0.0);
    }

    #[test]
    fn clamps_outside_the_series() {
        let data = fixes(&[(50.0, 1.0), (60.0, 2.0)]);
        let index = TimeIndex::build(key(), &data).unwrap();
        assert_eq!(nearest(&index, at(0)).unwrap().entry.fix.latitude, 1.0);
        let late = nearest(&index, at(1_000)).unwrap();
        assert_eq!(late.entry.fix.latitude, 2.0);
        assert_eq!(late.gap_seconds, 940.0);
    }

    #[test]
    fn duplicate_timestamps_resolve_to_first_inserted() {
        let data = fixes(&[(10.0, 1.0), (10.0, 2.0), (40.0, 3.0)]);
        let index = TimeIndex::build(key(), &data).unwrap();
        assert_eq!(nearest(&index, at(12)).unwrap().entry.fix.latitude, 1.0);
        assert_eq!(nearest(&index, at(10)).unwrap().entry.fix.latitude, 1.0);
        assert_eq!(nearest(&index, at(100)).unwrap().entry.fix.latitude, 3.0);
    }

    #[test]
    fn sub_second_distances_are_kept() {
        let data = vec![PositionFix::new(
            "A",
            "D1",
            RawTimestamp::text("2022-05-01T10:00:00.250Z"),
            1.0,
            2.0,
        )];
        let index = TimeIndex::build(key(), &data).unwrap();
        let resolved = nearest(&index, datetime!(2022-05-01 10:00:00 UTC)).unwrap();
        assert_eq!(resolved.gap_seconds, 0.25);
    }

    #[test]
    fn empty_index_fails() {
        let fixes: Vec<PositionFix> = Vec::new();
        let index = TimeIndex::build(key(), &fixes).unwrap();
        let err = nearest(&index, at(0)).unwrap_err();
        assert!(matches!(err, Error::EmptyIndex { ref device, .. } if device == "D1"));
    }

    #[test]
    fn never_beaten_by_another_fix() {
        // Deterministic LCG sweep.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 33) % 10_000
        };

        for _ in 0..50 {
            let points: Vec<(f64, f64)> = (0..25)
                .map(|i| (next() as f64, i as f64))
                .collect();
            let data = fixes(&points);
            let index = TimeIndex::build(key(), &data).unwrap();
            for _ in 0..20 {
                let query = at(next() as i64);
                let resolved = nearest(&index, query).unwrap();
                for entry in index.entries() {
                    assert!(resolved.gap_seconds <= abs_diff_seconds(entry.at, query));
                }
            }
        }
    }
}
