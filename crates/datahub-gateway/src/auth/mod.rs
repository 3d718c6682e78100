//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - A credential store with role-based users
//! - Signed, expiring identity tokens
//! - `require_auth` / `require_admin` guards and axum extractors
//! - The auth controller behind the REST routes
//! - First-run superadmin bootstrap

mod controller;
mod error;
mod jwt;
mod middleware;
mod revocation;
/// First-run superadmin bootstrap.
pub mod setup;
mod users;

pub use controller::{
    Ack, AuthController, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
};
pub use error::{ApiError, AppError, AuthError};
pub use jwt::{Claims, IssuedToken, Principal, TokenError, TokenService};
pub use middleware::{AuthInitError, AuthState, OptionalAuth, RequireAdmin, RequireAuth};
pub use revocation::RevocationList;
pub use users::{ParseRoleError, PublicUser, Role, StoreError, User, UserStore};
