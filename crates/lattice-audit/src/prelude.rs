//! Prelude module - commonly used types for convenient import.

pub use crate::custody::{CustodyEvent, CustodyLog, CustodyRecord};
pub use crate::error::{AuditError, AuditResult};
pub use crate::observation::{ObservationPhase, ObservationRecord, ObservationStore};
