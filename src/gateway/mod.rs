//! HTTPS front end: TLS acceptor, authorization middleware, and endpoints.

mod acceptor;
pub mod auth;
pub mod handlers;
mod router;
mod server;

pub use acceptor::PeerCertAcceptor;
pub use auth::{FORBIDDEN_MESSAGE, auth_middleware};
pub use router::{AppState, create_router};
pub use server::TfaasServer;
