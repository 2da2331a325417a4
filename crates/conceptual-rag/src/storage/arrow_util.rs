//! Shared Arrow column helpers used by all three tables.

use std::sync::Arc;

use arrow_array::{Array, Float32Array, FixedSizeListArray, StringArray};
use arrow_schema::{DataType, Field};

pub fn vector_field(dimension: usize) -> Field {
    Field::new(
        "vector",
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
        true,
    )
}

pub fn build_vector_array(vectors: &[Vec<f32>], dimension: usize) -> FixedSizeListArray {
    let flat: Vec<f32> = vectors
        .iter()
        .flat_map(|v| {
            let mut v = v.clone();
            v.resize(dimension, 0.0);
            v.into_iter()
        })
        .collect();
    let values = Float32Array::from(flat);
    let item_field = Field::new("item", DataType::Float32, true);
    FixedSizeListArray::new(Arc::new(item_field), dimension as i32, Arc::new(values) as Arc<dyn Array>, None)
}

pub fn json_column<T: serde::Serialize>(values: &[T]) -> StringArray {
    StringArray::from(
        values
            .iter()
            .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "null".to_string()))
            .collect::<Vec<_>>(),
    )
}

/// Parse a JSON column value, skip-with-warning (logging the row id) on mismatch.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(raw: &str, row_context: &str) -> T {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(row = %row_context, error = %e, "skipping malformed JSON column, using default");
            T::default()
        }
    }
}
