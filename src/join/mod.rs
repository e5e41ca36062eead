//! Spatio-temporal join: measurements × position fixes, per device.

pub mod merge;
pub mod partition;
pub mod record;
pub mod resolver;
pub mod time_index;

pub use merge::{
    merge, MergeConfig, MergeOutcome, MergeStats, MissingPositionPolicy, SkippedMeasurement,
    DEFAULT_TENANT,
};
pub use partition::{partition, Keyed, PartitionKey, Partitions};
pub use record::{FieldType, FieldValue, MergeStatus, MergedRecord, PhoneFix, MERGED_COLUMNS};
pub use resolver::{nearest, Resolved};
pub use time_index::{IndexedFix, TimeIndex};
