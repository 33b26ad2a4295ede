pub mod journal;
pub mod state_store;
