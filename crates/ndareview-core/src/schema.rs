/// Arrow schema definitions for training data.
pub mod training {
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    use arrow::array::{Array, StringArray, UInt8Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::error::ArrowError;
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;

    use crate::error::Result;
    use crate::review::TrainingExample;

    /// Schema for derived training examples.
    pub fn examples_schema() -> Schema {
        Schema::new(vec![
            Field::new("text", DataType::Utf8, false),
            Field::new("label", DataType::UInt8, false),
        ])
    }

    pub fn examples_to_batch(examples: &[TrainingExample]) -> Result<RecordBatch> {
        let texts = StringArray::from_iter_values(examples.iter().map(|e| e.text.as_str()));
        let labels = UInt8Array::from_iter_values(examples.iter().map(|e| e.label));
        let batch = RecordBatch::try_new(
            Arc::new(examples_schema()),
            vec![Arc::new(texts), Arc::new(labels)],
        )?;
        Ok(batch)
    }

    pub fn examples_from_batch(batch: &RecordBatch) -> Result<Vec<TrainingExample>> {
        let texts = batch
            .column_by_name("text")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| ArrowError::SchemaError("missing Utf8 'text' column".into()))?;
        let labels = batch
            .column_by_name("label")
            .and_then(|c| c.as_any().downcast_ref::<UInt8Array>())
            .ok_or_else(|| ArrowError::SchemaError("missing UInt8 'label' column".into()))?;

        Ok((0..batch.num_rows())
            .filter(|&row| !texts.is_null(row) && !labels.is_null(row))
            .map(|row| TrainingExample {
                text: texts.value(row).to_string(),
                label: labels.value(row),
            })
            .collect())
    }

    /// Write examples to an Arrow IPC file.
    pub fn write_examples(path: &Path, examples: &[TrainingExample]) -> Result<()> {
        let batch = examples_to_batch(examples)?;
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;
        Ok(())
    }

    /// Read examples back from an Arrow IPC file.
    pub fn read_examples(path: &Path) -> Result<Vec<TrainingExample>> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)?;
        let mut examples = Vec::new();
        for batch in reader {
            examples.extend(examples_from_batch(&batch?)?);
        }
        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::training;
    use crate::review::TrainingExample;

    #[test]
    fn examples_schema_has_expected_fields() {
        let schema = training::examples_schema();
        assert_eq!(schema.fields().len(), 2);
        assert!(schema.field_with_name("text").is_ok());
        assert!(schema.field_with_name("label").is_ok());
    }

    #[test]
    fn batch_preserves_order_and_labels() {
        let examples = vec![
            TrainingExample::new("The Recipient shall indemnify...", true),
            TrainingExample::new("Liability is unlimited.", false),
        ];
        let batch = training::examples_to_batch(&examples).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(training::examples_from_batch(&batch).unwrap(), examples);
    }

    #[test]
    fn ipc_file_written_and_read() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("training_examples.arrow");
        let examples = vec![TrainingExample::new("Termination for convenience.", true)];

        training::write_examples(&path, &examples).unwrap();
        assert!(path.exists());
        assert_eq!(training::read_examples(&path).unwrap(), examples);
    }

    #[test]
    fn empty_example_set() {
        let batch = training::examples_to_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }
}
