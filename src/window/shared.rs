use crate::error::Result;
use crate::models::batch::Batch;
use crate::window::buffer::WindowBuffer;
use crate::window::guard::Guard;
use crate::window::ingest::{ingest, IngestOutcome};
use crate::window::visits::VisitCounter;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct SharedState<T> {
    buffer: WindowBuffer<T>,
    visits: VisitCounter,
}

/// A window and its visit counter behind one lock, for several producers.
///
/// Ingests are totally ordered by lock acquisition; "most recent" is relative
/// to that order.
#[derive(Debug)]
pub struct SharedWindow<T> {
    inner: Arc<Mutex<SharedState<T>>>,
}

impl<T> Clone for SharedWindow<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Copy + Default> SharedWindow<T> {
    pub fn new(buffer: WindowBuffer<T>) -> Self {
        Self::with_visits(buffer, VisitCounter::new())
    }

    pub fn with_visits(buffer: WindowBuffer<T>, visits: VisitCounter) -> Self {
        Self { inner: Arc::new(Mutex::new(SharedState { buffer, visits })) }
    }

    pub fn ingest(&self, batch: &Batch<T>) -> Result<IngestOutcome> {
        let mut state = self.inner.lock();
        let SharedState { buffer, visits } = &mut *state;
        ingest(buffer, batch, Some(visits), Guard::NoGuard)
    }

    pub fn visits(&self) -> i64 {
        self.inner.lock().visits.get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current window and counter.
    pub fn snapshot(&self) -> (WindowBuffer<T>, VisitCounter) {
        let state = self.inner.lock();
        (state.buffer.clone(), state.visits)
    }
}
