//! Client-side authentication session.

pub mod guard;
pub mod manager;
pub mod state;

pub use guard::{RouteAccess, route_access};
pub use manager::SessionManager;
pub use state::{AuthPhase, Session};
