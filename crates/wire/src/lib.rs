//! Wire protocol for DTranx storage nodes
//!
//! A small request/response protocol over TCP. Every message travels in one
//! frame:
//!
//! ```text
//! +------------+------------+---------------------+
//! | magic u32  | len u32    | bincode payload     |
//! | "DTRX"     | big endian | len bytes           |
//! +------------+------------+---------------------+
//! ```
//!
//! - [`frame`]: frame encoding and decoding
//! - [`message`]: [`Request`] / [`Response`] payloads
//! - [`server`]: [`NodeServer`], one thread per connection
//! - [`session`]: [`TcpSession`], the client side, a [`NodeSession`] over TCP
//!
//! [`NodeSession`]: dtranx_core::NodeSession

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod frame;
pub mod message;
pub mod server;
pub mod session;

pub use frame::{read_frame, write_frame, WireError, FRAME_MAGIC, MAX_FRAME_SIZE};
pub use message::{Request, Response};
pub use server::{NodeServer, ServerHandle};
pub use session::{SessionOptions, TcpSession};
