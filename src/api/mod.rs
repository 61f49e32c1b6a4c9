//! HTTP interface

pub mod router;
pub mod server;

pub use router::{AppState, IdentifyRequest, IdentifyResponse, create_router};
pub use server::Server;
