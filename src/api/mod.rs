//! HTTP surface: routing, multipart parsing, and response shaping.

pub mod handlers;
pub mod router;
pub mod server;
pub mod types;

pub use router::{AppState, create_router};
pub use server::serve;
