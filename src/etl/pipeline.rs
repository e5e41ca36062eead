//! One batch run: source → merge → project → sink.

use anyhow::{Context, Result};
use serde::Serialize;

use super::schema::{project, SchemaCatalog};
use super::sink::WarehouseSink;
use crate::config::PipelineConfig;
use crate::join::merge::{merge, MergeStats, SkippedMeasurement};
use crate::vendor::BatchSource;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub stats: MergeStats,
    pub rows_written: u64,
    #[serde(skip)]
    pub skipped: Vec<SkippedMeasurement>,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "merged={} errored={} skipped={} rejected_positions={} rows_written={}",
            self.stats.merged,
            self.stats.errored,
            self.stats.skipped,
            self.stats.rejected_positions,
            self.rows_written
        )
    }
}

/// Runs one batch end to end. Schema resolution failures and merge errors
/// abort the run before anything reaches the sink.
pub fn run_batch<S, C, W>(
    config: &PipelineConfig,
    source: &mut S,
    catalog: &C,
    sink: &mut W,
) -> Result<RunReport>
where
    S: BatchSource + ?Sized,
    C: SchemaCatalog + ?Sized,
    W: WarehouseSink + ?Sized,
{
    config.validate()?;
    let measurements = source.measurements().context("load measurements")?;
    let positions = source.positions().context("load positions")?;
    log::info!(
        "loaded {} measurements and {} positions",
        measurements.len(),
        positions.len()
    );

    let outcome = merge(&measurements, &positions, &config.merge_config())?;
    let schema = catalog.resolve(&config.table)?;
    let rows = project(&outcome.records, &schema);

    sink.write_rows(&schema, &rows)
        .with_context(|| format!("write rows for {}", schema.table()))?;
    sink.finish().context("finish sink")?;

    let report = RunReport {
        stats: outcome.stats,
        rows_written: rows.len() as u64,
        skipped: outcome.skipped,
    };
    log::info!("batch for {} done: {}", schema.table(), report.summary());
    Ok(report)
}
