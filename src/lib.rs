//! # Compliance Session
//!
//! Client-side session orchestration for a contract compliance analysis
//! service. A user uploads a contract, the service splits it into terms and
//! judges each one; this crate keeps the resulting session consistent while
//! the user questions, rewrites, confirms and escalates individual terms.
//!
//! ## Features
//!
//! - **Upload & Analysis**: Multipart upload with staged progress reporting
//! - **Term Review**: Questions, reviewed rewrites and confirmations per term
//! - **Expert Feedback**: Expert verdicts that override the automated analysis
//! - **Derived Statistics**: Compliance figures computed from effective verdicts
//! - **Contract Generation**: Modified and marked documents
//! - **Persistence**: Snapshot of the current session, interaction log and
//!   bounded local history in SQLite
//!
//! ## Architecture
//!
//! ```text
//! CLI → SessionStore → ComplianceApi (HTTP)
//!             ↓
//!   InteractionLog / LocalHistory / snapshot
//!             ↓
//!     KeyValueStore (SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use compliance_session::{AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::initialize(config).await?;
//!     if let Some(stats) = state.session.compliance_stats() {
//!         println!("{:.2}% compliant", stats.rounded_percentage());
//!     }
//!     Ok(())
//! }
//! ```

/// Application wiring and shared state.
pub mod app;
/// Command-line front end.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// HTTP gateway to the analysis service.
pub mod gateway;
/// Bounded local history of analyzed sessions.
pub mod history;
/// Append-only log of user actions.
pub mod interactions;
/// Current-session state, operations and persistence.
pub mod session;
/// Key-value persistence backends.
pub mod storage;

pub use app::AppState;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use session::SessionStore;
