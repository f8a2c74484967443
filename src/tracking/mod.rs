pub mod commands;
pub mod controller;
pub mod error;
mod loops;
pub mod reconcile;
pub mod state;

pub use controller::{ReconciliationEngine, RestoreOutcome};
pub use error::TrackingError;
pub use state::{EngineStatus, SessionSnapshot, SessionState, SessionWatcher};
