use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

/// Running total of every record offered to a window, retained or not.
///
/// Stored signed so that a corrupted, negative persisted value can be
/// recognised instead of silently wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitCounter(i64);

impl VisitCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_persisted(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn validate(&self) -> Result<()> {
        if self.0 < 0 {
            return Err(IngestError::Invariant(format!("visit count {} is negative", self.0)));
        }
        Ok(())
    }

    /// The counter after `entries` more visits, without applying it.
    pub fn checked_add(&self, entries: usize) -> Result<Self> {
        self.validate()?;
        i64::try_from(entries)
            .ok()
            .and_then(|n| self.0.checked_add(n))
            .map(Self)
            .ok_or_else(|| IngestError::Invariant(format!("visit count {} overflows", self.0)))
    }
}
