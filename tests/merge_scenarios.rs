use airjoin::join::{
    merge, nearest, partition, MergeConfig, MergeStatus, MissingPositionPolicy, PartitionKey,
    TimeIndex,
};
use airjoin::join::record::FieldValue;
use airjoin::{Measurement, Pollutant, PositionFix, RawTimestamp, Reading};

fn measurement(org: &str, device: &str, ts: f64, pm2_5: f64) -> Measurement {
    Measurement::new(org, device, RawTimestamp::epoch(ts))
        .with_reading(Pollutant::Pm2_5, Reading::new(pm2_5))
}

fn fix(org: &str, device: &str, ts: f64, lat: f64, lon: f64) -> PositionFix {
    PositionFix::new(org, device, RawTimestamp::epoch(ts), lat, lon)
}

#[test]
fn nearest_fix_wins_over_later_one() {
    let measurements = vec![measurement("A", "D1", 100.0, 5.0)];
    let positions = vec![fix("A", "D1", 98.0, 1.0, 2.0), fix("A", "D1", 105.0, 1.1, 2.1)];

    let outcome = merge(&measurements, &positions, &MergeConfig::default()).expect("merge");
    let row = &outcome.records[0];
    assert_eq!(row.field("timestamp_abs_diff"), Some(FieldValue::Float(2.0)));
    assert_eq!(row.field("phone_latitude"), Some(FieldValue::Float(1.0)));
    assert_eq!(row.field("phone_longitude"), Some(FieldValue::Float(2.0)));
    assert_eq!(row.field("pm2_5_value"), Some(FieldValue::Float(5.0)));
}

#[test]
fn equidistant_fixes_resolve_to_the_earlier() {
    let positions = vec![fix("A", "D1", 105.0, 1.1, 0.0), fix("A", "D1", 95.0, 0.9, 0.0)];
    let measurements = vec![measurement("A", "D1", 100.0, 1.0)];

    let outcome = merge(&measurements, &positions, &MergeConfig::default()).expect("merge");
    assert_eq!(
        outcome.records[0].field("phone_latitude"),
        Some(FieldValue::Float(0.9))
    );
    assert_eq!(
        outcome.records[0].field("timestamp_abs_diff"),
        Some(FieldValue::Float(5.0))
    );
}

#[test]
fn device_without_positions_follows_policy() {
    let measurements = vec![measurement("A", "D1", 100.0, 1.0), measurement("A", "D2", 100.0, 2.0)];
    let positions = vec![fix("A", "D1", 100.0, 1.0, 2.0)];

    let filled = merge(&measurements, &positions, &MergeConfig::default()).expect("null-fill");
    assert_eq!(filled.records.len(), 2);
    assert_eq!(filled.records[1].field("phone_latitude"), None);
    assert_eq!(
        filled.records[1].field("merge_status"),
        Some(FieldValue::Text("no_position".to_string()))
    );
    assert_eq!((filled.stats.merged, filled.stats.errored), (1, 1));

    let dropped = merge(
        &measurements,
        &positions,
        &MergeConfig::default().with_policy(MissingPositionPolicy::Drop),
    )
    .expect("drop");
    assert_eq!(dropped.records.len(), 1);
    assert_eq!(dropped.stats.skipped, 1);
    assert_eq!(dropped.skipped[0].status, MergeStatus::NoPosition);
    assert_eq!(dropped.skipped[0].measurement.device, "D2");
}

#[test]
fn positions_without_measurements_emit_nothing() {
    let positions = vec![fix("A", "D1", 100.0, 1.0, 2.0)];
    let outcome = merge(&[], &positions, &MergeConfig::default()).expect("merge");
    assert!(outcome.records.is_empty());
    assert!(outcome.skipped.is_empty());
}

#[test]
fn repeated_merges_are_identical() {
    let measurements = vec![
        Measurement::new("A", "D1", RawTimestamp::text("1970-01-01T00:01:40Z")),
        measurement("A", "D1", 130.0, 2.0),
        measurement("B", "D9", 10.0, 3.0),
    ];
    let positions = vec![
        PositionFix::new("A", "D1", RawTimestamp::text("1970-01-01T00:01:38+00:00"), 1.0, 2.0),
        fix("A", "D1", 140.0, 1.5, 2.5).with_accuracy(3.0),
    ];
    let before = (measurements.clone(), positions.clone());

    let first = merge(&measurements, &positions, &MergeConfig::default()).expect("first");
    let second = merge(&measurements, &positions, &MergeConfig::default()).expect("second");

    assert_eq!(first.records, second.records);
    assert_eq!(first.stats, second.stats);
    assert_eq!((measurements, positions), before);
}

#[test]
fn partitioning_keeps_every_measurement() {
    let measurements = vec![
        measurement("A", "D1", 1.0, 1.0),
        measurement("B", "D1", 2.0, 2.0),
        measurement("A", "D2", 3.0, 3.0),
        measurement("A", "D1", 4.0, 4.0),
        measurement("A", "D1", 4.0, 4.0),
    ];
    let parts = partition(&measurements);
    assert_eq!(parts.partition_count(), 3);

    let mut rebuilt: Vec<f64> = parts
        .iter()
        .flat_map(|(_, rows)| rows.iter().filter_map(|m| m.pollutants.pm2_5.value))
        .collect();
    rebuilt.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
    assert_eq!(rebuilt, vec![1.0, 2.0, 3.0, 4.0, 4.0]);
}

#[test]
fn resolver_agrees_with_linear_scan() {
    let key = PartitionKey::new("A", "D1");
    let offsets = [0.0, 7.0, 7.0, 19.0, 20.5, 44.0, 90.0];
    let fixes: Vec<PositionFix> = offsets
        .iter()
        .enumerate()
        .map(|(i, ts)| fix("A", "D1", 1_000.0 + ts, i as f64, 0.0))
        .collect();
    let index = TimeIndex::build(key, &fixes).expect("index");

    for step in 0..240 {
        let query = 990.0 + step as f64 * 0.5;
        let instant = RawTimestamp::epoch(query).to_instant().expect("instant");
        let resolved = nearest(&index, instant).expect("nearest");
        let best = offsets
            .iter()
            .map(|ts| (1_000.0 + ts - query).abs())
            .fold(f64::INFINITY, f64::min);
        assert_eq!(resolved.gap_seconds, best, "query {query}");
    }
}
