use crate::error::{IngestError, Result};
use crate::models::batch::{Batch, RecordShape};
use crate::window::guard::GuardHandle;
use serde::{Deserialize, Serialize};

/// Default storage headroom, in percent, added on each reallocation.
pub const DEFAULT_GROWTH_PCT: u32 = 50;

/// Smallest headroom honoured; lower settings are raised to this.
pub const MIN_GROWTH_PCT: u32 = 10;

fn default_growth_pct() -> u32 { DEFAULT_GROWTH_PCT }

/// Fixed-capacity record window backed by flat storage.
///
/// While filling, records are appended and `cursor == len`. Once full, the
/// record at `cursor` is the next one overwritten. Physical slot order says
/// nothing about arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowBuffer<T> {
    capacity:     usize,
    #[serde(default = "default_growth_pct")]
    growth_pct:   u32,
    record_shape: Option<RecordShape>,
    storage:      Vec<T>,
    size:         usize,
    cursor:       usize,
    #[serde(skip)]
    guard:        Option<GuardHandle>,
}

impl<T> WindowBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(IngestError::Config("window capacity must be positive".into()));
        }
        Ok(Self {
            capacity,
            growth_pct:   DEFAULT_GROWTH_PCT,
            record_shape: None,
            storage:      Vec::new(),
            size:         0,
            cursor:       0,
            guard:        None,
        })
    }

    /// Build from a signed capacity as read from config or a command line.
    pub fn with_signed_capacity(capacity: i64) -> Result<Self> {
        match usize::try_from(capacity) {
            Ok(c) if c > 0 => Self::new(c),
            _ => Err(IngestError::Config(format!("window capacity must be positive, got {}", capacity))),
        }
    }

    pub fn with_growth_pct(mut self, pct: u32) -> Self {
        self.growth_pct = pct.max(MIN_GROWTH_PCT);
        self
    }

    /// Bind a guard that every ingest into this buffer acquires unless the
    /// call supplies its own. Bound guards are not persisted.
    pub fn bind_guard(&mut self, handle: GuardHandle) {
        self.guard = Some(handle);
    }

    pub fn unbind_guard(&mut self) -> Option<GuardHandle> {
        self.guard.take()
    }

    pub fn bound_guard(&self) -> Option<&GuardHandle> {
        self.guard.as_ref()
    }

    pub fn capacity(&self) -> usize { self.capacity }
    pub fn growth_pct(&self) -> u32 { self.growth_pct }
    pub fn len(&self) -> usize { self.size }
    pub fn is_empty(&self) -> bool { self.size == 0 }
    pub fn is_full(&self) -> bool { self.size == self.capacity }
    pub fn cursor(&self) -> usize { self.cursor }
    pub fn record_shape(&self) -> Option<&RecordShape> { self.record_shape.as_ref() }

    /// A buffer is initialized once a non-empty batch has fixed its shape.
    pub fn is_initialized(&self) -> bool {
        self.record_shape.is_some()
    }

    /// Elements per record, or `None` if a corrupted shape overflows.
    pub fn checked_record_len(&self) -> Option<usize> {
        self.record_shape.as_ref().map_or(Some(1), RecordShape::checked_record_len)
    }

    /// Elements per record. Saturates on a shape that `validate` rejects.
    pub fn record_len(&self) -> usize {
        self.checked_record_len().unwrap_or(usize::MAX)
    }

    /// Records that fit in the current allocation without reallocating.
    pub fn allocated(&self) -> usize {
        match self.record_len() {
            0   => self.capacity,
            len => (self.storage.capacity() / len).min(self.capacity),
        }
    }

    pub fn as_flat(&self) -> &[T] {
        &self.storage
    }

    pub fn record(&self, index: usize) -> Option<&[T]> {
        if index >= self.size {
            return None;
        }
        let len = self.record_len();
        let start = index.checked_mul(len)?;
        self.storage.get(start..start.checked_add(len)?)
    }

    /// Retained records in physical slot order.
    pub fn records(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.size).filter_map(move |i| self.record(i))
    }

    /// Check the persisted bookkeeping before it is trusted.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(IngestError::Config("window capacity must be positive".into()));
        }
        if self.size > self.capacity {
            return Err(IngestError::Invariant(format!(
                "size {} exceeds capacity {}", self.size, self.capacity
            )));
        }
        if self.cursor >= self.capacity {
            return Err(IngestError::Invariant(format!(
                "cursor {} outside [0, {})", self.cursor, self.capacity
            )));
        }
        if !self.is_full() && self.cursor != self.size {
            return Err(IngestError::Invariant(format!(
                "cursor {} must equal size {} until the window is full", self.cursor, self.size
            )));
        }
        let len = self.checked_record_len().ok_or_else(|| {
            IngestError::Invariant(format!("record shape {:?} overflows", self.record_shape))
        })?;
        let expected = self.size.checked_mul(len).ok_or_else(|| {
            IngestError::Invariant(format!("{} records of {} elements overflow", self.size, len))
        })?;
        if self.storage.len() != expected {
            return Err(IngestError::Invariant(format!(
                "storage holds {} elements, expected {} records of {}",
                self.storage.len(), self.size, len
            )));
        }
        if self.record_shape.is_none() && self.size > 0 {
            return Err(IngestError::Invariant("records stored without a record shape".into()));
        }
        Ok(())
    }

    /// Drop every record and the established shape. Capacity is kept.
    pub fn reset(&mut self) {
        self.storage = Vec::new();
        self.record_shape = None;
        self.size = 0;
        self.cursor = 0;
    }

    pub(crate) fn establish_shape(&mut self, shape: RecordShape) {
        self.record_shape = Some(shape);
    }

    pub(crate) fn set_len(&mut self, size: usize) {
        self.size = size;
    }

    pub(crate) fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }
}

impl<T: Copy + Default> WindowBuffer<T> {
    /// Make room for `target_size` records (capped at capacity), keeping the
    /// records already stored. The allocation grows by `growth_pct` so that a
    /// filling window does not reallocate on every call.
    pub fn ensure_capacity(&mut self, target_size: usize) {
        let target_size = target_size.min(self.capacity);
        let len = self.record_len();
        let allocated = self.allocated();
        if target_size > allocated && len > 0 {
            let pct = self.growth_pct.max(MIN_GROWTH_PCT) as usize;
            let grown = allocated.saturating_add(allocated.saturating_mul(pct) / 100);
            let records = grown.max(target_size).min(self.capacity);
            let elements = records.checked_mul(len).unwrap_or(target_size * len);
            self.storage.reserve_exact(elements - self.storage.len());
        }
        if target_size * len > self.storage.len() {
            self.storage.resize(target_size * len, T::default());
        }
    }

    /// Copy whole records into storage starting at record `offset`. The
    /// caller keeps the run inside the current logical length.
    pub fn write_run(&mut self, offset: usize, records: &[T]) {
        let start = offset * self.record_len();
        self.storage[start..start + records.len()].copy_from_slice(records);
    }

    /// Retained records as a batch (slot order, not arrival order).
    pub fn to_batch(&self) -> Result<Batch<T>> {
        self.validate()?;
        let mut dims = vec![self.size];
        if let Some(shape) = &self.record_shape {
            dims.extend_from_slice(shape.dims());
        }
        Batch::new(dims, self.storage.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaped(capacity: usize, dims: Vec<usize>) -> WindowBuffer<i32> {
        let mut buf = WindowBuffer::new(capacity).unwrap();
        buf.establish_shape(RecordShape::new(dims));
        buf
    }

    #[test]
    fn zero_or_negative_capacity_is_config_error() {
        assert!(matches!(WindowBuffer::<f32>::new(0), Err(IngestError::Config(_))));
        assert!(matches!(WindowBuffer::<f32>::with_signed_capacity(-4), Err(IngestError::Config(_))));
        assert!(matches!(WindowBuffer::<f32>::with_signed_capacity(0), Err(IngestError::Config(_))));
        assert_eq!(WindowBuffer::<f32>::with_signed_capacity(7).unwrap().capacity(), 7);
    }

    #[test]
    fn ensure_capacity_preserves_records() {
        let mut buf = shaped(10, vec![2]);
        buf.ensure_capacity(2);
        buf.write_run(0, &[1, 2, 3, 4]);
        buf.set_len(2);
        buf.set_cursor(2);
        buf.ensure_capacity(5);
        assert_eq!(&buf.as_flat()[..4], &[1, 2, 3, 4]);
        assert_eq!(buf.as_flat().len(), 10);
    }

    #[test]
    fn growth_is_geometric_and_capped() {
        let mut buf = shaped(100, vec![]);
        buf.ensure_capacity(10);
        assert!(buf.allocated() >= 10);

        let before = buf.allocated();
        buf.ensure_capacity(before + 1);
        assert!(buf.allocated() >= before + before / 2);

        buf.ensure_capacity(500);
        assert_eq!(buf.allocated(), 100);
        assert_eq!(buf.as_flat().len(), 100);
    }

    #[test]
    fn ensure_capacity_does_not_reallocate_within_headroom() {
        let mut buf = shaped(1000, vec![]);
        buf.ensure_capacity(100);
        buf.ensure_capacity(101);
        let allocated = buf.allocated();
        let ptr = buf.as_flat().as_ptr();
        buf.ensure_capacity(allocated);
        assert_eq!(buf.as_flat().as_ptr(), ptr);
    }

    #[test]
    fn write_run_touches_only_its_slots() {
        let mut buf = shaped(4, vec![]);
        buf.ensure_capacity(4);
        buf.write_run(0, &[1, 2, 3, 4]);
        buf.write_run(3, &[9]);
        buf.write_run(0, &[]);
        assert_eq!(buf.as_flat(), &[1, 2, 3, 9]);
    }

    #[test]
    fn records_iterates_retained_slots() {
        let mut buf = shaped(3, vec![2]);
        buf.ensure_capacity(2);
        buf.write_run(0, &[1, 2, 3, 4]);
        buf.set_len(2);
        let rows: Vec<&[i32]> = buf.records().collect();
        assert_eq!(rows, vec![&[1, 2][..], &[3, 4][..]]);
        assert_eq!(buf.record(2), None);
        buf.set_cursor(2);
        assert_eq!(buf.to_batch().unwrap().dims(), &[2, 2]);
    }

    #[test]
    fn validate_catches_corrupted_state() {
        let bad_cursor: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":4,"record_shape":[],"storage":[1,2,3,4],"size":4,"cursor":4}"#,
        ).unwrap();
        assert!(matches!(bad_cursor.validate(), Err(IngestError::Invariant(_))));

        let gap: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":4,"record_shape":[],"storage":[1,2],"size":2,"cursor":3}"#,
        ).unwrap();
        assert!(matches!(gap.validate(), Err(IngestError::Invariant(_))));

        let short: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":4,"record_shape":[2],"storage":[1,2],"size":2,"cursor":2}"#,
        ).unwrap();
        assert!(matches!(short.validate(), Err(IngestError::Invariant(_))));

        let oversized: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":2,"record_shape":[],"storage":[1,2,3],"size":3,"cursor":0}"#,
        ).unwrap();
        assert!(matches!(oversized.validate(), Err(IngestError::Invariant(_))));

        let huge_shape: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":4,"record_shape":[4294967296,4294967296],"storage":[],"size":0,"cursor":0}"#,
        ).unwrap();
        assert!(matches!(huge_shape.validate(), Err(IngestError::Invariant(_))));
        assert_eq!(huge_shape.record(0), None);

        let huge_size: WindowBuffer<i32> = serde_json::from_str(&format!(
            r#"{{"capacity":{},"record_shape":[4],"storage":[],"size":{},"cursor":{}}}"#,
            i64::MAX, 1u64 << 62, 1u64 << 62
        )).unwrap();
        assert!(matches!(huge_size.validate(), Err(IngestError::Invariant(_))));

        let ok: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":4,"record_shape":[],"storage":[1,2,3,4],"size":4,"cursor":1}"#,
        ).unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.growth_pct(), DEFAULT_GROWTH_PCT);
    }

    #[test]
    fn zero_growth_still_grows_geometrically() {
        let mut buf = shaped(10_000, vec![]).with_growth_pct(0);
        assert_eq!(buf.growth_pct(), MIN_GROWTH_PCT);

        buf.ensure_capacity(1000);
        let before = buf.allocated();
        buf.ensure_capacity(before + 1);
        assert!(buf.allocated() >= before + before / 10);

        let mut persisted: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":10000,"growth_pct":0,"record_shape":[],"storage":[],"size":0,"cursor":0}"#,
        ).unwrap();
        persisted.ensure_capacity(1000);
        let before = persisted.allocated();
        persisted.ensure_capacity(before + 1);
        assert!(persisted.allocated() >= before + before / 10);
    }

    #[test]
    fn to_batch_refuses_inconsistent_state() {
        let short: WindowBuffer<i32> = serde_json::from_str(
            r#"{"capacity":4,"record_shape":[2],"storage":[1,2],"size":2,"cursor":2}"#,
        ).unwrap();
        assert!(matches!(short.to_batch(), Err(IngestError::Invariant(_))));
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut buf = shaped(3, vec![]);
        buf.ensure_capacity(1);
        buf.write_run(0, &[5]);
        buf.set_len(1);
        buf.set_cursor(1);
        buf.reset();
        assert_eq!(buf.capacity(), 3);
        assert!(!buf.is_initialized());
        assert!(buf.validate().is_ok());
    }
}
