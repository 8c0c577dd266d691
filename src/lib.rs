//! Client-side authentication session for the capsule app.
//!
//! [`SessionManager`] owns the signed-in state, persists the bearer token
//! through a [`store::TokenStore`], and talks to the remote auth API through
//! [`net::api::AuthApi`].

pub mod config;
pub mod error;
pub mod net;
pub mod session;
pub mod store;

pub use config::CapsuleConfig;
pub use error::{AuthError, ErrorCode};
pub use net::types::UserProfile;
pub use session::{AuthPhase, RouteAccess, Session, SessionManager, route_access};
