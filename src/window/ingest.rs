//! Ingest controller: folds one batch into a window.
//!
//! Every call validates first and mutates second, so a rejected batch leaves
//! the buffer, its cursor, and the visit counter exactly as they were. Only
//! `O(batch)` slots are written per call:
//!
//! ```text
//!   batch longer than N   -> last N records overwrite slots [0, N), cursor = 0
//!   otherwise             -> splice at cursor, wrapping to slot 0 if needed
//!
//!   N = 4, cursor = 3, batch [a, b]
//!   slots  [ b | . | . | a ]   cursor = 1
//! ```

use crate::error::{IngestError, Result};
use crate::models::batch::Batch;
use crate::window::buffer::WindowBuffer;
use crate::window::guard::Guard;
use crate::window::visits::VisitCounter;
use serde::Serialize;
use tracing::{debug, warn};

/// What a successful ingest did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestOutcome {
    /// Records in the batch.
    pub offered:    usize,
    /// Records written into the window.
    pub copied:     usize,
    /// The batch alone exceeded capacity and replaced the whole window.
    pub overflowed: bool,
    /// The splice wrapped past the end of storage.
    pub wrapped:    bool,
    pub size:       usize,
    pub cursor:     usize,
}

/// Fold `batch` into `buffer`.
///
/// `visits`, when supplied, is reset on a buffer that has not yet seen a
/// record and then advanced by `batch.len()`. The lock is taken from `guard`
/// if it names one, otherwise from the buffer's bound guard, and is held until
/// the call returns.
pub fn ingest<T: Copy + Default>(
    buffer: &mut WindowBuffer<T>,
    batch:  &Batch<T>,
    visits: Option<&mut VisitCounter>,
    guard:  Guard<'_>,
) -> Result<IngestOutcome> {
    let bound = buffer.bound_guard().cloned();
    let _lock = guard.or_bound(bound.as_ref()).acquire();

    let result = collect(buffer, batch, visits);
    match &result {
        Ok(out) => debug!(
            offered = out.offered,
            copied = out.copied,
            overflowed = out.overflowed,
            wrapped = out.wrapped,
            size = out.size,
            cursor = out.cursor,
            "batch ingested"
        ),
        Err(e) => warn!(kind = e.label(), error = %e, "batch rejected"),
    }
    result
}

fn collect<T: Copy + Default>(
    buffer: &mut WindowBuffer<T>,
    batch:  &Batch<T>,
    visits: Option<&mut VisitCounter>,
) -> Result<IngestOutcome> {
    buffer.validate()?;
    check_shape(buffer, batch)?;

    let initialized = buffer.is_initialized();
    let entries = batch.len();
    let next_visits = match visits.as_deref() {
        Some(v) if initialized => Some(v.checked_add(entries)?),
        Some(_)                => Some(VisitCounter::new().checked_add(entries)?),
        None                   => None,
    };

    // Nothing below can fail.
    if let (Some(v), Some(next)) = (visits, next_visits) {
        *v = next;
    }

    if entries == 0 {
        return Ok(IngestOutcome {
            size:   buffer.len(),
            cursor: buffer.cursor(),
            ..IngestOutcome::default()
        });
    }
    if !initialized {
        buffer.establish_shape(batch.record_shape());
    }

    let capacity = buffer.capacity();
    let num_to_copy = entries.min(capacity);
    let new_size = capacity.min(buffer.len() + num_to_copy);
    buffer.ensure_capacity(new_size);

    if entries > capacity {
        buffer.write_run(0, batch.records(entries - capacity..entries));
        buffer.set_cursor(0);
        buffer.set_len(new_size);
        return Ok(IngestOutcome {
            offered:    entries,
            copied:     num_to_copy,
            overflowed: true,
            wrapped:    false,
            size:       new_size,
            cursor:     0,
        });
    }

    let start = buffer.cursor();
    let first_chunk = (start + num_to_copy).min(capacity) - start;
    buffer.write_run(start, batch.records(0..first_chunk));
    buffer.write_run(0, batch.records(first_chunk..num_to_copy));

    let cursor = (start + num_to_copy) % capacity;
    buffer.set_cursor(cursor);
    buffer.set_len(new_size);

    Ok(IngestOutcome {
        offered:    entries,
        copied:     num_to_copy,
        overflowed: false,
        wrapped:    first_chunk < num_to_copy,
        size:       new_size,
        cursor,
    })
}

fn check_shape<T>(buffer: &WindowBuffer<T>, batch: &Batch<T>) -> Result<()> {
    match buffer.record_shape() {
        Some(shape) if shape.dims() != batch.trailing_dims() => Err(IngestError::Shape(format!(
            "window holds records of shape {}, batch records are {}",
            shape,
            batch.record_shape()
        ))),
        _ => Ok(()),
    }
}
