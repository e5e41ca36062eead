//! Per-device nearest-in-time join of measurements against position fixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::partition::{partition, PartitionKey};
use super::record::{MergeStatus, MergedRecord, PhoneFix};
use super::resolver::nearest;
use super::time_index::TimeIndex;
use crate::error::{Error, Result};
use crate::model::{Measurement, PositionFix};

pub const DEFAULT_TENANT: &str = "urbanbetter";

/// What to do with a measurement that cannot be matched to a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPositionPolicy {
    /// Emit the row with null position fields and a diagnostic status.
    #[default]
    NullFill,
    /// Emit nothing; record the measurement in the skipped side channel.
    Drop,
    /// Abort the whole merge when a device has no positions. Measurements
    /// with an unreadable timestamp are still null-filled.
    FailFast,
}

impl MissingPositionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingPositionPolicy::NullFill => "null_fill",
            MissingPositionPolicy::Drop => "drop",
            MissingPositionPolicy::FailFast => "fail_fast",
        }
    }
}

impl fmt::Display for MissingPositionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingPositionPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "null_fill" | "null" => Ok(MissingPositionPolicy::NullFill),
            "drop" | "skip" => Ok(MissingPositionPolicy::Drop),
            "fail_fast" | "fail" => Ok(MissingPositionPolicy::FailFast),
            other => Err(format!(
                "unknown missing-position policy {other:?} (expected null-fill, drop or fail-fast)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    pub missing_position: MissingPositionPolicy,
    /// Provenance tag stamped on every output row.
    pub tenant: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            missing_position: MissingPositionPolicy::default(),
            tenant: DEFAULT_TENANT.to_string(),
        }
    }
}

impl MergeConfig {
    pub fn with_policy(mut self, policy: MissingPositionPolicy) -> Self {
        self.missing_position = policy;
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Rows joined to a position fix.
    pub merged: u64,
    /// Rows emitted with null position fields and a diagnostic status.
    pub errored: u64,
    /// Measurements dropped into the skipped side channel.
    pub skipped: u64,
    /// Position fixes left out of an index because of a bad timestamp.
    pub rejected_positions: u64,
}

/// A measurement that produced no output row, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMeasurement {
    pub measurement: Measurement,
    pub status: MergeStatus,
    pub detail: String,
}

#[derive(Debug, Default, Clone)]
pub struct MergeOutcome {
    pub records: Vec<MergedRecord>,
    pub skipped: Vec<SkippedMeasurement>,
    pub stats: MergeStats,
}

/// Joins every measurement to the position fix of the same organization and
/// device that is nearest in time.
///
/// Output order: organizations in first-seen order, devices in first-seen
/// order within an organization, measurements in input order. Keys that only
/// have positions produce nothing. The inputs are only read.
pub fn merge(
    measurements: &[Measurement],
    positions: &[PositionFix],
    config: &MergeConfig,
) -> Result<MergeOutcome> {
    if measurements.is_empty() && positions.is_empty() {
        return Err(Error::EmptyInput);
    }

    let measurement_parts = partition(measurements);
    let position_parts = partition(positions);
    let mut merger = Merger {
        config,
        outcome: MergeOutcome {
            records: Vec::with_capacity(measurements.len()),
            ..MergeOutcome::default()
        },
    };

    for (key, rows) in measurement_parts.iter() {
        let fixes = position_parts.get(&key).unwrap_or(&[]);
        // One index per device, shared by all of its measurements.
        let index = TimeIndex::build(key.clone(), fixes.iter().copied())?;
        merger.outcome.stats.rejected_positions += index.rejected() as u64;
        log::debug!(
            "merging {} measurements for {key} against {} fixes",
            rows.len(),
            index.len()
        );
        for measurement in rows {
            merger.merge_one(measurement, &index)?;
        }
    }

    let stats = merger.outcome.stats;
    log::info!(
        "merge finished: merged={} errored={} skipped={} rejected_positions={}",
        stats.merged,
        stats.errored,
        stats.skipped,
        stats.rejected_positions
    );
    Ok(merger.outcome)
}

struct Merger<'c> {
    config: &'c MergeConfig,
    outcome: MergeOutcome,
}

impl Merger<'_> {
    fn merge_one(&mut self, measurement: &Measurement, index: &TimeIndex<'_>) -> Result<()> {
        let device_timestamp = match measurement.timestamp.to_instant() {
            Ok(ts) => ts,
            Err(err) => return self.reject(measurement, None, err),
        };
        match nearest(index, device_timestamp) {
            Ok(resolved) => {
                let phone = PhoneFix::from_fix(resolved.entry.fix, resolved.entry.at);
                self.outcome.records.push(MergedRecord::merged(
                    &self.config.tenant,
                    measurement,
                    device_timestamp,
                    phone,
                    resolved.gap_seconds,
                ));
                self.outcome.stats.merged += 1;
                Ok(())
            }
            Err(err) => self.reject(measurement, Some(device_timestamp), err),
        }
    }

    fn reject(
        &mut self,
        measurement: &Measurement,
        device_timestamp: Option<OffsetDateTime>,
        err: Error,
    ) -> Result<()> {
        let status = match &err {
            Error::EmptyIndex { .. } => MergeStatus::NoPosition,
            Error::MalformedTimestamp { .. } => MergeStatus::MalformedTimestamp,
            _ => return Err(err),
        };
        let key = PartitionKey::of(measurement);
        match self.config.missing_position {
            MissingPositionPolicy::FailFast if status == MergeStatus::NoPosition => Err(err),
            // A bad measurement timestamp only ever fails its own row.
            MissingPositionPolicy::FailFast | MissingPositionPolicy::NullFill => {
                log::warn!("null-filling measurement for {key}: {err}");
                self.outcome.records.push(MergedRecord::unresolved(
                    &self.config.tenant,
                    measurement,
                    device_timestamp,
                    status,
                ));
                self.outcome.stats.errored += 1;
                Ok(())
            }
            MissingPositionPolicy::Drop => {
                log::warn!("skipping measurement for {key}: {err}");
                self.outcome.skipped.push(SkippedMeasurement {
                    measurement: measurement.clone(),
                    status,
                    detail: err.to_string(),
                });
                self.outcome.stats.skipped += 1;
                Ok(())
            }
        }
    }
}
