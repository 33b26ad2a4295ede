use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Range;

/// Trailing dimensions shared by every record in a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordShape(Vec<usize>);

impl RecordShape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Elements per record. A scalar record holds exactly one.
    pub fn record_len(&self) -> usize {
        self.checked_record_len().unwrap_or(usize::MAX)
    }

    /// `None` when the dims describe more elements than fit in a `usize`.
    pub fn checked_record_len(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

impl fmt::Display for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "scalar");
        }
        let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

/// A batch of records laid out row-major: `dims[0]` records, each of shape
/// `dims[1..]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

impl<T> Batch<T> {
    pub fn new(dims: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if dims.is_empty() {
            return Err(IngestError::Shape("batch needs at least one axis".into()));
        }
        let record_len = dims[1..]
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| IngestError::Shape(format!("dims {:?} overflow", dims)))?;
        let expected = dims[0]
            .checked_mul(record_len)
            .ok_or_else(|| IngestError::Shape(format!("dims {:?} overflow", dims)))?;
        if data.len() != expected {
            return Err(IngestError::Shape(format!(
                "dims {:?} describe {} elements, got {}",
                dims, expected, data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// One scalar record per element.
    pub fn scalars(data: Vec<T>) -> Self {
        Self { dims: vec![data.len()], data }
    }

    /// A zero-record batch that still carries a record shape.
    pub fn empty(shape: &RecordShape) -> Self {
        let mut dims = Vec::with_capacity(shape.dims().len() + 1);
        dims.push(0);
        dims.extend_from_slice(shape.dims());
        Self { dims, data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.dims[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn trailing_dims(&self) -> &[usize] {
        &self.dims[1..]
    }

    pub fn record_shape(&self) -> RecordShape {
        RecordShape(self.trailing_dims().to_vec())
    }

    pub fn record_len(&self) -> usize {
        self.trailing_dims()
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .unwrap_or(usize::MAX)
    }

    pub fn as_flat(&self) -> &[T] {
        &self.data
    }

    pub fn into_flat(self) -> Vec<T> {
        self.data
    }

    /// Flat elements of the records in `range`.
    pub fn records(&self, range: Range<usize>) -> &[T] {
        let len = self.record_len();
        &self.data[range.start * len..range.end * len]
    }

    pub fn record(&self, index: usize) -> &[T] {
        self.records(index..index + 1)
    }
}

impl Batch<f64> {
    /// Decode a batch from JSON.
    ///
    /// Accepts nested arrays (`[[1, 2], [3, 4]]`, dims inferred from the first
    /// element at each depth) or an explicit `{"dims": [...], "data": [...]}`
    /// object, which is the only way to express an empty batch with a
    /// non-scalar record shape.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let dims = map
                    .get("dims")
                    .and_then(Value::as_array)
                    .ok_or_else(|| IngestError::Shape("missing \"dims\" array".into()))?
                    .iter()
                    .map(|d| d.as_u64().map(|d| d as usize))
                    .collect::<Option<Vec<usize>>>()
                    .ok_or_else(|| IngestError::Shape("dims must be non-negative integers".into()))?;
                let data = map
                    .get("data")
                    .and_then(Value::as_array)
                    .ok_or_else(|| IngestError::Shape("missing \"data\" array".into()))?
                    .iter()
                    .map(Value::as_f64)
                    .collect::<Option<Vec<f64>>>()
                    .ok_or_else(|| IngestError::Shape("data must be numeric".into()))?;
                Self::new(dims, data)
            }
            Value::Array(_) => {
                let dims = infer_dims(value);
                let mut data = Vec::new();
                flatten_into(value, &dims, &mut data)?;
                Self::new(dims, data)
            }
            _ => Err(IngestError::Shape("batch needs at least one axis".into())),
        }
    }
}

fn infer_dims(value: &Value) -> Vec<usize> {
    let mut dims = Vec::new();
    let mut cur = value;
    while let Value::Array(items) = cur {
        dims.push(items.len());
        match items.first() {
            Some(first) => cur = first,
            None        => break,
        }
    }
    dims
}

fn flatten_into(value: &Value, dims: &[usize], out: &mut Vec<f64>) -> Result<()> {
    match (dims.split_first(), value) {
        (None, Value::Number(n)) => {
            let v = n.as_f64().ok_or_else(|| IngestError::Shape(format!("{} is not an f64", n)))?;
            out.push(v);
            Ok(())
        }
        (Some((&len, rest)), Value::Array(items)) if items.len() == len => {
            for item in items {
                flatten_into(item, rest, out)?;
            }
            Ok(())
        }
        _ => Err(IngestError::Shape("ragged or non-numeric nested array".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_rejects_zero_axes_and_bad_lengths() {
        assert!(matches!(Batch::<f64>::new(vec![], vec![]), Err(IngestError::Shape(_))));
        assert!(matches!(Batch::new(vec![2, 2], vec![1.0, 2.0, 3.0]), Err(IngestError::Shape(_))));
        let b = Batch::new(vec![2, 3], vec![0u8; 6]).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.record_len(), 3);
        assert_eq!(b.record_shape(), RecordShape::new(vec![3]));
    }

    #[test]
    fn new_rejects_overflowing_record_shape_even_when_empty() {
        let err = Batch::<f64>::new(vec![0, 1 << 32, 1 << 32], vec![]).unwrap_err();
        assert!(matches!(err, IngestError::Shape(_)));
        assert_eq!(RecordShape::new(vec![1 << 32, 1 << 32]).checked_record_len(), None);
    }

    #[test]
    fn records_slices_whole_rows() {
        let b = Batch::new(vec![3, 2], vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(b.records(1..3), &[3, 4, 5, 6]);
        assert_eq!(b.record(0), &[1, 2]);
        assert_eq!(b.records(2..2), &[] as &[i32]);
    }

    #[test]
    fn empty_batch_keeps_shape() {
        let shape = RecordShape::new(vec![4, 2]);
        let b = Batch::<f32>::empty(&shape);
        assert!(b.is_empty());
        assert_eq!(b.dims(), &[0, 4, 2]);
        assert_eq!(b.record_shape(), shape);
    }

    #[test]
    fn from_json_nested_arrays() {
        let b = Batch::from_json(&json!([[1, 2], [2, 3], [3, 4]])).unwrap();
        assert_eq!(b.dims(), &[3, 2]);
        assert_eq!(b.as_flat(), &[1.0, 2.0, 2.0, 3.0, 3.0, 4.0]);

        let s = Batch::from_json(&json!([1.5, 2.5])).unwrap();
        assert_eq!(s.dims(), &[2]);
        assert_eq!(s.record_shape(), RecordShape::scalar());
    }

    #[test]
    fn from_json_explicit_object() {
        let b = Batch::from_json(&json!({"dims": [0, 3], "data": []})).unwrap();
        assert!(b.is_empty());
        assert_eq!(b.trailing_dims(), &[3]);

        let err = Batch::from_json(&json!({"dims": [2], "data": [1, "x"]})).unwrap_err();
        assert!(matches!(err, IngestError::Shape(_)));
    }

    #[test]
    fn from_json_rejects_ragged_and_scalars() {
        assert!(Batch::from_json(&json!([[1, 2], [3]])).is_err());
        assert!(Batch::from_json(&json!([[1, 2], 3])).is_err());
        assert!(Batch::from_json(&json!(7)).is_err());
        assert!(Batch::from_json(&json!("nope")).is_err());
    }

    #[test]
    fn shape_display() {
        assert_eq!(RecordShape::scalar().to_string(), "scalar");
        assert_eq!(RecordShape::new(vec![2, 3]).to_string(), "[2, 3]");
    }
}
