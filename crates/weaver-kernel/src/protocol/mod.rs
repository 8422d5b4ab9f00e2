//! Legacy binary TCP protocol.

pub mod frame;
pub mod message;
pub mod server;

pub use frame::{Frame, FrameError, HEADER_LEN, LegacyCodec};
pub use message::{MessageType, ParseError, Request, dispatch};
pub use server::{LegacyServer, LegacySettings};
