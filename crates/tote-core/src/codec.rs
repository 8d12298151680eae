//! Parquet encoding of record batches.
//!
//! Every staged and processed file holds exactly one logical batch. Files are
//! written with Snappy compression, matching what the warehouse writes for
//! its own data files.

use bytes::Bytes;
use deltalake::arrow::compute::concat_batches;
use deltalake::arrow::record_batch::RecordBatch;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use deltalake::parquet::basic::Compression;
use deltalake::parquet::file::properties::WriterProperties;
use snafu::prelude::*;

use crate::error::{
    ArrowBatchSnafu, CodecError, ParquetDecodeSnafu, ParquetEncodeSnafu, ValidationError,
};

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Encode a non-empty batch as a Parquet file.
pub fn encode_batch(batch: &RecordBatch) -> Result<Bytes, CodecError> {
    if batch.num_rows() == 0 {
        return Err(CodecError::EmptyInput {
            source: ValidationError::EmptyBatch {
                what: "record batch".to_string(),
            },
        });
    }

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(writer_properties()))
        .context(ParquetEncodeSnafu)?;
    writer.write(batch).context(ParquetEncodeSnafu)?;
    writer.close().context(ParquetEncodeSnafu)?;

    Ok(Bytes::from(buffer))
}

/// Decode a Parquet file into a single batch.
pub fn decode_batch(bytes: Bytes) -> Result<RecordBatch, CodecError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).context(ParquetDecodeSnafu)?;
    let schema = builder.schema().clone();
    let reader = builder.build().context(ParquetDecodeSnafu)?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowBatchSnafu)?;

    concat_batches(&schema, &batches).context(ArrowBatchSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::{Int64Array, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn currency_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("currency_id", DataType::Int64, false),
            Field::new("currency_code", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("GBP"), Some("USD"), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_batch() {
        let batch = currency_batch();
        let bytes = encode_batch(&batch).unwrap();
        assert!(bytes.starts_with(b"PAR1"));

        let decoded = decode_batch(bytes).unwrap();
        assert_eq!(decoded.schema().fields(), batch.schema().fields());
        assert_eq!(decoded.columns(), batch.columns());
    }

    #[test]
    fn test_encode_rejects_empty_batch() {
        let batch = currency_batch().slice(0, 0);
        let err = encode_batch(&batch).unwrap_err();
        assert!(matches!(err, CodecError::EmptyInput { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_batch(Bytes::from_static(b"not parquet")).unwrap_err();
        assert!(matches!(err, CodecError::ParquetDecode { .. }));
    }
}
