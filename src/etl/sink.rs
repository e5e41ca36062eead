use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_json::{Map, Number, Value};

use super::schema::{ProjectedRow, TargetSchema};
use crate::docstore::DocumentStore;
use crate::join::record::FieldValue;
use crate::timestamp::format_rfc3339;

/// Destination for projected rows.
pub trait WarehouseSink {
    fn write_rows(&mut self, schema: &TargetSchema, rows: &[ProjectedRow]) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: WarehouseSink + ?Sized> WarehouseSink for Box<S> {
    fn write_rows(&mut self, schema: &TargetSchema, rows: &[ProjectedRow]) -> Result<()> {
        (**self).write_rows(schema, rows)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Output file that is created on the first write. A run that fails before
/// producing rows leaves nothing at `path`.
#[derive(Debug)]
pub struct DeferredFile {
    path: PathBuf,
    file: Option<File>,
}

impl DeferredFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                log::debug!("creating output {}", self.path.display());
                File::create(&self.path).map_err(|err| {
                    io::Error::new(
                        err.kind(),
                        format!("create output {}: {err}", self.path.display()),
                    )
                })?
            }
        };
        Ok(self.file.insert(file))
    }
}

impl Write for DeferredFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Seek for DeferredFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

#[cfg(feature = "parquet")]
pub use self::parquet_sink::ParquetSink;

#[cfg(feature = "parquet")]
mod parquet_sink {
    use std::io::{Seek, Write};
    use std::path::Path;

    use anyhow::{bail, Result};
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;

    use super::{DeferredFile, WarehouseSink};
    use crate::etl::batch::RowBuffer;
    use crate::etl::schema::{ProjectedRow, TargetSchema};

    /// Writes rows as Parquet, one row group per `batch_size` rows.
    ///
    /// The Arrow schema is fixed by the first `write_rows` call; later calls
    /// must use the same target schema.
    pub struct ParquetSink<W: Write + Seek + Send> {
        output: Option<W>,
        writer: Option<ArrowWriter<W>>,
        buffer: Option<RowBuffer>,
        table: Option<String>,
        batch_size: usize,
        props: Option<WriterProperties>,
    }

    impl ParquetSink<DeferredFile> {
        /// The file at `path` is created when the first rows are written.
        pub fn create(path: impl AsRef<Path>, batch_size: usize) -> Self {
            Self::from_writer(DeferredFile::new(path), batch_size, None)
        }
    }

    impl<W: Write + Seek + Send> ParquetSink<W> {
        pub fn from_writer(output: W, batch_size: usize, props: Option<WriterProperties>) -> Self {
            Self {
                output: Some(output),
                writer: None,
                buffer: None,
                table: None,
                batch_size,
                props,
            }
        }

        fn open(&mut self, schema: &TargetSchema) -> Result<()> {
            let Some(output) = self.output.take() else {
                bail!("parquet sink is closed");
            };
            let buffer = RowBuffer::new(schema, self.batch_size)?;
            let writer = ArrowWriter::try_new(output, buffer.schema(), self.props.clone())?;
            self.writer = Some(writer);
            self.buffer = Some(buffer);
            self.table = Some(schema.table().to_string());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            let (Some(writer), Some(buffer)) = (self.writer.as_mut(), self.buffer.as_mut()) else {
                return Ok(());
            };
            if buffer.is_empty() {
                return Ok(());
            }
            let batch = buffer.flush()?;
            writer.write(&batch)?;
            // Close the row group so each batch maps to one.
            writer.flush()?;
            Ok(())
        }
    }

    impl<W: Write + Seek + Send> WarehouseSink for ParquetSink<W> {
        fn write_rows(&mut self, schema: &TargetSchema, rows: &[ProjectedRow]) -> Result<()> {
            match self.table.as_deref() {
                None => self.open(schema)?,
                Some(table) if table != schema.table() => {
                    bail!("parquet sink opened for {table}, got rows for {}", schema.table())
                }
                Some(_) => {}
            }
            for row in rows {
                let Some(buffer) = self.buffer.as_mut() else {
                    bail!("parquet sink is closed");
                };
                buffer.push_row(row)?;
                if buffer.should_flush() {
                    self.flush()?;
                }
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.flush()?;
            self.buffer = None;
            if let Some(writer) = self.writer.take() {
                let _ = writer.close()?;
            }
            Ok(())
        }
    }
}

/// Comma-separated output with a header row. Nulls are empty cells and
/// timestamps are RFC 3339.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl CsvSink<DeferredFile> {
    /// The file at `path` is created when the first rows are written.
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self::from_writer(DeferredFile::new(path))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(output: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(output),
            header_written: false,
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flush csv output: {}", err.error()))
    }
}

impl<W: Write> WarehouseSink for CsvSink<W> {
    fn write_rows(&mut self, schema: &TargetSchema, rows: &[ProjectedRow]) -> Result<()> {
        if !self.header_written {
            self.writer.write_record(schema.column_names())?;
            self.header_written = true;
        }
        for row in rows {
            if row.values.len() != schema.len() {
                bail!(
                    "row has {} values, schema has {} columns",
                    row.values.len(),
                    schema.len()
                );
            }
            self.writer
                .write_record(row.values.iter().map(|value| csv_cell(value.as_ref())))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn csv_cell(value: Option<&FieldValue>) -> String {
    match value {
        None => String::new(),
        Some(FieldValue::Text(v)) => v.clone(),
        Some(FieldValue::Float(v)) => v.to_string(),
        Some(FieldValue::Timestamp(v)) => format_rfc3339(*v),
    }
}

/// Inserts every row as one JSON document into a store collection.
pub struct DocumentSink<'s, S: DocumentStore + ?Sized> {
    store: &'s mut S,
    collection: String,
    written: usize,
}

impl<'s, S: DocumentStore + ?Sized> DocumentSink<'s, S> {
    pub fn new(store: &'s mut S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl<S: DocumentStore + ?Sized> WarehouseSink for DocumentSink<'_, S> {
    fn write_rows(&mut self, schema: &TargetSchema, rows: &[ProjectedRow]) -> Result<()> {
        let docs = rows
            .iter()
            .map(|row| to_document(schema, row))
            .collect::<Result<Vec<_>>>()?;
        self.written += self.store.insert_many(&self.collection, docs)?;
        Ok(())
    }
}

pub fn to_document(schema: &TargetSchema, row: &ProjectedRow) -> Result<Value> {
    let mut doc = Map::new();
    for (name, value) in schema.column_names().zip(&row.values) {
        let json = match value {
            None => Value::Null,
            Some(FieldValue::Text(v)) => Value::String(v.clone()),
            Some(FieldValue::Float(v)) => Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Some(FieldValue::Timestamp(v)) => Value::String(format_rfc3339(*v)),
        };
        doc.insert(name.to_string(), json);
    }
    Ok(Value::Object(doc))
}
