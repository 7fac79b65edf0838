//! Game concept builder: a guided chat that refines a game idea through
//! four analysis phases and then creates the app.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod script;
pub mod session;
pub mod sse;
pub mod state;
pub mod steps;
pub mod transport;
pub mod ui;

pub use api::ApiClient;
pub use config::{Config, TransportKind};
pub use error::{ConfigError, PhaseError, TransportError};
pub use script::ScriptedTransport;
pub use session::{ConceptSession, SessionEvent, SessionOptions};
pub use steps::{StepKey, StepStatus, StepTracker};
pub use transport::{AnalysisTransport, AppCreator, Transport};
