//! Structured RPC frontend.

pub mod error;
pub mod server;
pub mod types;

pub use error::RpcError;
pub use server::{RpcServer, RpcState, create_router};
pub use types::*;
