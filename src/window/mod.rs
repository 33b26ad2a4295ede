pub mod buffer;
pub mod guard;
pub mod ingest;
pub mod shared;
pub mod visits;

pub use buffer::WindowBuffer;
pub use guard::{new_handle, Guard, GuardHandle};
pub use ingest::{ingest, IngestOutcome};
pub use shared::SharedWindow;
pub use visits::VisitCounter;
