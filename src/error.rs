//! Unified error handling for the simulator.
//!
//! Construction-time problems (a malformed brush, an unreadable collision
//! model) are recoverable by design: the offending primitive is dropped and a
//! descriptive entry is pushed onto an [`ErrorReport`] that world construction
//! hands back to the caller. Runtime problems are recovered locally; the
//! simulation never aborts the process.

use std::fmt;

/// Main error type for the simulator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SimError {
    /// A map lump violates a structural invariant. The affected primitive is
    /// dropped and construction proceeds.
    #[error("malformed map data: {what}")]
    MapMalformed { what: String },

    /// A prop's collision file contains more than one solid. Deliberately
    /// ignored by the rest of the system (hostages, articulated doors);
    /// callers treat this as "skipped", not as a failure.
    #[error("collision model contains multiple solids")]
    PhyMultipleSolids,

    /// A prop's collision file fails structural checks. The prop becomes
    /// non-solid in the simulation.
    #[error("malformed collision model: {what}")]
    PhyMalformed { what: String },

    /// A referenced model file is absent from both the packed sub-files and
    /// the external search paths. The prop becomes non-solid.
    #[error("asset not found: {path}")]
    AssetNotFound { path: String },

    /// A simulation tick was requested before a world was published.
    /// The tick is a no-op.
    #[error("no collidable world has been loaded")]
    WorldNotLoaded,

    /// A velocity or origin component became non-finite. The component is
    /// zeroed and simulation continues.
    #[error("non-finite value detected in {what}")]
    NanDetected { what: String },

    /// A world load was cancelled at a chunk boundary.
    #[error("world load was cancelled")]
    LoadCancelled,

    /// A configuration field failed validation.
    #[error("invalid config: {field} ({reason})")]
    InvalidConfig { field: String, reason: String },

    /// An I/O failure while opening a collision blob.
    #[error("io error: {context}")]
    Io { context: String },
}

/// Result alias used throughout the crate.
pub type SimResult<T> = Result<T, SimError>;

/// Accumulator for non-fatal construction errors.
///
/// World construction returns one of these alongside its artifacts so callers
/// can surface every dropped primitive without aborting the load.
#[derive(Debug, Default, Clone)]
pub struct ErrorReport {
    entries: Vec<SimError>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-fatal error and log it as a warning.
    pub fn push(&mut self, err: SimError) {
        log::warn!("[WorldLoad] {}", err);
        self.entries.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[SimError] {
        &self.entries
    }

    /// Merge another report into this one, preserving order.
    pub fn merge(&mut self, other: ErrorReport) {
        self.entries.extend(other.entries);
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

impl From<std::io::Error> for SimError {
    fn from(error: std::io::Error) -> Self {
        SimError::Io {
            context: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SimError::AssetNotFound {
            path: "models/props/crate.mdl".to_string(),
        };
        assert_eq!(err.to_string(), "asset not found: models/props/crate.mdl");
    }

    #[test]
    fn report_accumulates_in_order() {
        let mut report = ErrorReport::new();
        assert!(report.is_empty());
        report.push(SimError::PhyMultipleSolids);
        report.push(SimError::MapMalformed {
            what: "brush 3 missing axial side".to_string(),
        });
        assert_eq!(report.len(), 2);
        assert!(matches!(report.entries()[0], SimError::PhyMultipleSolids));
    }
}
