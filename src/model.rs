//! Input records for a single request window.

use serde::{Deserialize, Serialize};

use crate::timestamp::RawTimestamp;

/// One pollutant reading. Either half may be missing in vendor output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: Option<f64>,
    /// Precision indicator reported alongside the value.
    pub pi: Option<f64>,
}

impl Reading {
    pub fn new(value: f64) -> Self {
        Self {
            value: Some(value),
            pi: None,
        }
    }

    pub fn with_pi(mut self, pi: f64) -> Self {
        self.pi = Some(pi);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pollutant {
    No2,
    Voc,
    Pm2_5,
    Pm10,
    Pm1,
}

impl Pollutant {
    pub const ALL: [Pollutant; 5] = [
        Pollutant::No2,
        Pollutant::Voc,
        Pollutant::Pm2_5,
        Pollutant::Pm10,
        Pollutant::Pm1,
    ];

    /// Column prefix used in merged output (`pm2_5` → `pm2_5_value`).
    pub fn column_prefix(self) -> &'static str {
        match self {
            Pollutant::No2 => "no2",
            Pollutant::Voc => "voc",
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm1 => "pm1",
        }
    }

    /// Key used by the vendor payload.
    pub fn vendor_key(self) -> &'static str {
        match self {
            Pollutant::Pm2_5 => "pm25",
            other => other.column_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    #[serde(default)]
    pub no2: Reading,
    #[serde(default)]
    pub voc: Reading,
    #[serde(default)]
    pub pm2_5: Reading,
    #[serde(default)]
    pub pm10: Reading,
    #[serde(default)]
    pub pm1: Reading,
}

impl Pollutants {
    pub fn get(&self, pollutant: Pollutant) -> &Reading {
        match pollutant {
            Pollutant::No2 => &self.no2,
            Pollutant::Voc => &self.voc,
            Pollutant::Pm2_5 => &self.pm2_5,
            Pollutant::Pm10 => &self.pm10,
            Pollutant::Pm1 => &self.pm1,
        }
    }

    pub fn get_mut(&mut self, pollutant: Pollutant) -> &mut Reading {
        match pollutant {
            Pollutant::No2 => &mut self.no2,
            Pollutant::Voc => &mut self.voc,
            Pollutant::Pm2_5 => &mut self.pm2_5,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::Pm1 => &mut self.pm1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub organization: String,
    pub device: String,
    pub timestamp: RawTimestamp,
    #[serde(default)]
    pub pollutants: Pollutants,
}

impl Measurement {
    pub fn new(
        organization: impl Into<String>,
        device: impl Into<String>,
        timestamp: RawTimestamp,
    ) -> Self {
        Self {
            organization: organization.into(),
            device: device.into(),
            timestamp,
            pollutants: Pollutants::default(),
        }
    }

    pub fn with_reading(mut self, pollutant: Pollutant, reading: Reading) -> Self {
        *self.pollutants.get_mut(pollutant) = reading;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub organization: String,
    pub device: String,
    pub timestamp: RawTimestamp,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
}

impl PositionFix {
    pub fn new(
        organization: impl Into<String>,
        device: impl Into<String>,
        timestamp: RawTimestamp,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            organization: organization.into(),
            device: device.into(),
            timestamp,
            latitude,
            longitude,
            horizontal_accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = Some(meters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_keys_differ_only_for_pm25() {
        let renamed: Vec<_> = Pollutant::ALL
            .iter()
            .filter(|p| p.vendor_key() != p.column_prefix())
            .collect();
        assert_eq!(renamed, vec![&Pollutant::Pm2_5]);
    }

    #[test]
    fn builder_sets_single_reading() {
        let m = Measurement::new("A", "D1", RawTimestamp::epoch(0.0))
            .with_reading(Pollutant::Pm10, Reading::new(12.0).with_pi(0.5));
        assert_eq!(m.pollutants.pm10.value, Some(12.0));
        assert_eq!(m.pollutants.pm10.pi, Some(0.5));
        assert_eq!(m.pollutants.pm2_5, Reading::default());
    }
}
