//! Arrow export for metric tables
//!
//! Wide layout, one row per (entity, threshold):
//! ```text
//! id: Utf8          // node or edge identifier
//! threshold: f64    // distance threshold
//! failed: bool      // computation failed for this entity
//! <metric>: f64     // one column per metric
//! ```

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;

use crate::error::Result;
use crate::results::MetricResult;

pub fn metric_schema(result: &MetricResult) -> Schema {
    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("threshold", DataType::Float64, false),
        Field::new("failed", DataType::Boolean, false),
    ];
    fields.extend(
        result
            .metrics()
            .iter()
            .map(|m| Field::new(m, DataType::Float64, false)),
    );
    Schema::new(fields)
}

pub fn to_record_batch(result: &MetricResult) -> Result<RecordBatch> {
    let schema = Arc::new(metric_schema(result));
    let n_ids = result.ids().len();
    let n_thresholds = result.thresholds().len();

    // rows are entity-major, thresholds ascending within an entity
    let rows = || (0..n_ids).flat_map(move |e| (0..n_thresholds).map(move |t| (e, t)));

    let ids: ArrayRef = Arc::new(StringArray::from(
        rows()
            .map(|(e, _)| result.ids()[e].as_str())
            .collect::<Vec<_>>(),
    ));
    let thresholds: ArrayRef = Arc::new(Float64Array::from(
        rows().map(|(_, t)| result.thresholds()[t]).collect::<Vec<_>>(),
    ));
    let failed: ArrayRef = Arc::new(BooleanArray::from(
        rows()
            .map(|(e, _)| result.is_failed(&result.ids()[e]))
            .collect::<Vec<_>>(),
    ));

    let mut columns = vec![ids, thresholds, failed];
    for m in 0..result.metrics().len() {
        let values: ArrayRef = Arc::new(Float64Array::from(
            rows().map(|(e, t)| result.value_at(m, t, e)).collect::<Vec<_>>(),
        ));
        columns.push(values);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Serialize a metric table as an Arrow IPC stream
pub fn to_ipc_stream(result: &MetricResult) -> Result<Bytes> {
    let batch = to_record_batch(result)?;
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    tracing::debug!(rows = batch.num_rows(), bytes = buf.len(), "metric table serialized");
    Ok(Bytes::from(buf))
}
