//! Warehouse side of a batch: schema projection, sinks and the run loop.

#[cfg(feature = "parquet")]
pub mod batch;
pub mod pipeline;
pub mod schema;
pub mod sink;

pub use pipeline::{run_batch, RunReport};
pub use schema::{project, ColumnDef, JsonSchemaCatalog, ProjectedRow, SchemaCatalog, TargetSchema};
#[cfg(feature = "parquet")]
pub use sink::ParquetSink;
pub use sink::{CsvSink, DeferredFile, DocumentSink, WarehouseSink};
