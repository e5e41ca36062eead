//! Arrow batches built from projected rows.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;

use super::schema::{ColumnDef, ProjectedRow, TargetSchema};
use crate::join::record::{FieldType, FieldValue};

pub fn arrow_type(kind: FieldType) -> DataType {
    match kind {
        FieldType::String => DataType::Utf8,
        FieldType::Float => DataType::Float64,
        FieldType::Integer => DataType::Int64,
        FieldType::Boolean => DataType::Boolean,
        FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
    }
}

pub fn arrow_schema(schema: &TargetSchema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .columns()
        .iter()
        .map(|column| Field::new(&column.name, arrow_type(column.kind), column.nullable))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Accumulates rows column by column until a batch is full.
pub struct RowBuffer {
    schema: SchemaRef,
    columns: Vec<ColumnDef>,
    builders: Vec<ColumnBuilder>,
    row_count: usize,
    batch_size: usize,
}

impl RowBuffer {
    pub fn new(target: &TargetSchema, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch_size must be > 0");
        }
        let builders = target
            .columns()
            .iter()
            .map(|column| ColumnBuilder::new(column.kind, batch_size))
            .collect();
        Ok(Self {
            schema: arrow_schema(target),
            columns: target.columns().to_vec(),
            builders,
            row_count: 0,
            batch_size,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn should_flush(&self) -> bool {
        self.row_count >= self.batch_size
    }

    pub fn push_row(&mut self, row: &ProjectedRow) -> Result<()> {
        if row.values.len() != self.builders.len() {
            bail!(
                "row has {} values, schema has {} columns",
                row.values.len(),
                self.builders.len()
            );
        }
        // Check the whole row first so a bad value leaves no partial row behind.
        for (column, value) in self.columns.iter().zip(&row.values) {
            check_value(column, value.as_ref())?;
        }
        for (builder, value) in self.builders.iter_mut().zip(&row.values) {
            builder.append(value.as_ref())?;
        }
        self.row_count += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<RecordBatch> {
        if self.row_count == 0 {
            bail!("attempted to flush an empty RowBuffer");
        }
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(|b| b.finish()).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        self.row_count = 0;
        Ok(batch)
    }
}

fn check_value(column: &ColumnDef, value: Option<&FieldValue>) -> Result<()> {
    match value {
        None if !column.nullable => Err(anyhow!("column {} is required", column.name)),
        None => Ok(()),
        Some(value) if value.field_type() != column.kind => Err(anyhow!(
            "column {} expects {:?}, got {:?}",
            column.name,
            column.kind,
            value.field_type()
        )),
        Some(_) => Ok(()),
    }
}

enum ColumnBuilder {
    Utf8(StringBuilder),
    F64(Float64Builder),
    I64(Int64Builder),
    Bool(BooleanBuilder),
    TimestampUs(TimestampMicrosecondBuilder),
}

impl ColumnBuilder {
    fn new(kind: FieldType, batch_size: usize) -> Self {
        match kind {
            FieldType::String => Self::Utf8(StringBuilder::with_capacity(batch_size, batch_size * 16)),
            FieldType::Float => Self::F64(Float64Builder::with_capacity(batch_size)),
            FieldType::Integer => Self::I64(Int64Builder::with_capacity(batch_size)),
            FieldType::Boolean => Self::Bool(BooleanBuilder::with_capacity(batch_size)),
            FieldType::Timestamp => Self::TimestampUs(
                TimestampMicrosecondBuilder::with_capacity(batch_size).with_timezone("UTC"),
            ),
        }
    }

    fn append(&mut self, value: Option<&FieldValue>) -> Result<()> {
        match (self, value) {
            (ColumnBuilder::Utf8(b), None) => b.append_null(),
            (ColumnBuilder::Utf8(b), Some(FieldValue::Text(v))) => b.append_value(v),
            (ColumnBuilder::F64(b), None) => b.append_null(),
            (ColumnBuilder::F64(b), Some(FieldValue::Float(v))) => b.append_value(*v),
            // Merged records carry no integer or boolean values; such schema
            // columns are always null.
            (ColumnBuilder::I64(b), None) => b.append_null(),
            (ColumnBuilder::Bool(b), None) => b.append_null(),
            (ColumnBuilder::TimestampUs(b), None) => b.append_null(),
            (ColumnBuilder::TimestampUs(b), Some(FieldValue::Timestamp(v))) => {
                let micros = i64::try_from(v.unix_timestamp_nanos() / 1_000)
                    .map_err(|_| anyhow!("timestamp {v} out of range"))?;
                b.append_value(micros)
            }
            (_, Some(other)) => bail!("unexpected value {other:?}"),
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
            ColumnBuilder::F64(b) => Arc::new(b.finish()),
            ColumnBuilder::I64(b) => Arc::new(b.finish()),
            ColumnBuilder::Bool(b) => Arc::new(b.finish()),
            ColumnBuilder::TimestampUs(b) => Arc::new(b.finish()),
        }
    }
}
