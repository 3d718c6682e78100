//! # Datahub Client
//!
//! Client-side session guard: tracks who is signed in and decides whether
//! a protected view may render, must wait, or must redirect.
//!
//! ```no_run
//! use std::sync::Arc;
//! use datahub_client::{HttpAuthApi, Requirement, Session};
//!
//! # async fn example() -> Result<(), datahub_client::ClientError> {
//! let api = Arc::new(HttpAuthApi::new("http://127.0.0.1:8787")?);
//! let session = Session::new(api);
//! let state = session.initialize().await;
//! println!("{:?}", state.gate(Requirement::Authenticated));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Auth API trait and HTTP implementation.
pub mod api;
/// Client errors.
pub mod error;
/// Protected view gating.
pub mod guard;
/// Session context object.
pub mod session;

pub use api::{AuthApi, Credentials, HttpAuthApi, Role, SessionUser};
pub use error::ClientError;
pub use guard::{Gate, Navigator, ProtectedShell, Requirement, Route};
pub use session::{Session, SessionState};
