use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Caller-owned lock serializing ingests into one window.
pub type GuardHandle = Arc<Mutex<()>>;

pub fn new_handle() -> GuardHandle {
    Arc::new(Mutex::new(()))
}

/// Per-call synchronization choice.
#[derive(Debug, Clone, Copy, Default)]
pub enum Guard<'a> {
    /// Rely on the guard bound to the buffer, if any.
    #[default]
    NoGuard,
    External(&'a GuardHandle),
}

impl<'a> Guard<'a> {
    pub fn handle(self) -> Option<&'a GuardHandle> {
        match self {
            Guard::NoGuard     => None,
            Guard::External(h) => Some(h),
        }
    }

    /// Fall back to `bound` when this call names no guard of its own.
    pub fn or_bound(self, bound: Option<&'a GuardHandle>) -> Guard<'a> {
        match self {
            Guard::NoGuard => Guard::from(bound),
            external       => external,
        }
    }

    /// Block until the named lock is held. `None` for `NoGuard`.
    pub fn acquire(self) -> Option<MutexGuard<'a, ()>> {
        self.handle().map(|h| h.lock())
    }
}

impl<'a> From<Option<&'a GuardHandle>> for Guard<'a> {
    fn from(handle: Option<&'a GuardHandle>) -> Self {
        handle.map_or(Guard::NoGuard, Guard::External)
    }
}
