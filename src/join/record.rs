//! Flattened output of the merge step and its column view.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Measurement, Pollutant, Pollutants, PositionFix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Merged,
    NoPosition,
    MalformedTimestamp,
}

impl MergeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStatus::Merged => "merged",
            MergeStatus::NoPosition => "no_position",
            MergeStatus::MalformedTimestamp => "malformed_timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Float,
    Integer,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Timestamp(OffsetDateTime),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::String,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
        }
    }
}

/// Output columns of a merged record, in their natural order.
pub const MERGED_COLUMNS: &[(&str, FieldType)] = &[
    ("tenant", FieldType::String),
    ("organization", FieldType::String),
    ("device", FieldType::String),
    ("device_timestamp", FieldType::Timestamp),
    ("phone_timestamp", FieldType::Timestamp),
    ("phone_latitude", FieldType::Float),
    ("phone_longitude", FieldType::Float),
    ("phone_horizontal_accuracy", FieldType::Float),
    ("timestamp_abs_diff", FieldType::Float),
    ("merge_status", FieldType::String),
    ("no2_value", FieldType::Float),
    ("no2_pi_value", FieldType::Float),
    ("voc_value", FieldType::Float),
    ("voc_pi_value", FieldType::Float),
    ("pm2_5_value", FieldType::Float),
    ("pm2_5_pi_value", FieldType::Float),
    ("pm10_value", FieldType::Float),
    ("pm10_pi_value", FieldType::Float),
    ("pm1_value", FieldType::Float),
    ("pm1_pi_value", FieldType::Float),
];

pub fn column_type(name: &str) -> Option<FieldType> {
    MERGED_COLUMNS
        .iter()
        .find(|(column, _)| *column == name)
        .map(|(_, kind)| *kind)
}

/// Position fields carried over from the resolved fix.
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneFix {
    pub timestamp: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: Option<f64>,
}

impl PhoneFix {
    pub fn from_fix(fix: &PositionFix, timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            latitude: fix.latitude,
            longitude: fix.longitude,
            horizontal_accuracy: fix.horizontal_accuracy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub tenant: String,
    pub organization: String,
    pub device: String,
    pub device_timestamp: Option<OffsetDateTime>,
    pub pollutants: Pollutants,
    pub phone: Option<PhoneFix>,
    pub timestamp_abs_diff: Option<f64>,
    pub status: MergeStatus,
}

impl MergedRecord {
    pub fn merged(
        tenant: &str,
        measurement: &Measurement,
        device_timestamp: OffsetDateTime,
        phone: PhoneFix,
        gap_seconds: f64,
    ) -> Self {
        Self {
            tenant: tenant.to_string(),
            organization: measurement.organization.clone(),
            device: measurement.device.clone(),
            device_timestamp: Some(device_timestamp),
            pollutants: measurement.pollutants.clone(),
            phone: Some(phone),
            timestamp_abs_diff: Some(gap_seconds),
            status: MergeStatus::Merged,
        }
    }

    /// A measurement that could not be matched; position fields stay null.
    pub fn unresolved(
        tenant: &str,
        measurement: &Measurement,
        device_timestamp: Option<OffsetDateTime>,
        status: MergeStatus,
    ) -> Self {
        Self {
            tenant: tenant.to_string(),
            organization: measurement.organization.clone(),
            device: measurement.device.clone(),
            device_timestamp,
            pollutants: measurement.pollutants.clone(),
            phone: None,
            timestamp_abs_diff: None,
            status,
        }
    }

    /// Looks up a column by its output name. Unknown names and null values
    /// both yield `None`.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "tenant" => Some(FieldValue::Text(self.tenant.clone())),
            "organization" => Some(FieldValue::Text(self.organization.clone())),
            "device" => Some(FieldValue::Text(self.device.clone())),
            "device_timestamp" => self.device_timestamp.map(FieldValue::Timestamp),
            "phone_timestamp" => self.phone.as_ref().map(|p| FieldValue::Timestamp(p.timestamp)),
            "phone_latitude" => self.phone.as_ref().map(|p| FieldValue::Float(p.latitude)),
            "phone_longitude" => self.phone.as_ref().map(|p| FieldValue::Float(p.longitude)),
            "phone_horizontal_accuracy" => self
                .phone
                .as_ref()
                .and_then(|p| p.horizontal_accuracy)
                .map(FieldValue::Float),
            "timestamp_abs_diff" => self.timestamp_abs_diff.map(FieldValue::Float),
            "merge_status" => Some(FieldValue::Text(self.status.as_str().to_string())),
            other => self.pollutant_field(other),
        }
    }

    fn pollutant_field(&self, name: &str) -> Option<FieldValue> {
        let (prefix, pi) = if let Some(prefix) = name.strip_suffix("_pi_value") {
            (prefix, true)
        } else {
            (name.strip_suffix("_value")?, false)
        };
        let pollutant = Pollutant::ALL
            .into_iter()
            .find(|p| p.column_prefix() == prefix)?;
        let reading = self.pollutants.get(pollutant);
        let value = if pi { reading.pi } else { reading.value };
        value.map(FieldValue::Float)
    }
}
