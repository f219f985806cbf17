//! Framed TCP transport
//!
//! Many concurrent replies share one persistent socket between the dispatch
//! server and each actor. Messages are multiplexed on that socket as JSON
//! documents separated by a three byte sentinel.
//!
//! # Wire Format
//!
//! ```text
//! {json}\0\n\0{json}\0\n\0...
//! ```
//!
//! # Components
//!
//! - **[`FrameCodec`]** / **[`FrameBuffer`]**: encode frames and reassemble
//!   them across read boundaries
//! - **[`FrameReader`]** / **[`FrameWriter`]**: async halves of a framed socket
//! - **[`TcpServer`]**: accept loop for actor connections

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::{FrameBuffer, FrameCodec, SENTINEL};
pub use tcp::{connect, framed, FrameReader, FrameWriter};
pub use tcp_server::TcpServer;
