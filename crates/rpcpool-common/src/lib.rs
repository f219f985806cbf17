//! rpcpool Common Types and Transport
//!
//! Shared protocol definitions and the framed TCP transport used by every
//! rpcpool component.
//!
//! # Overview
//!
//! rpcpool accepts command invocations over HTTP, fans them out to a pool
//! of worker threads (in process, or in remote actor processes reachable
//! over a persistent socket) and correlates each asynchronous reply with
//! the caller that is waiting for it. This crate holds the pieces that both
//! sides of that socket agree on:
//!
//! - **Protocol Layer**: JSON-RPC envelope, out-of-band job ids, dispatch
//!   and reply records, error type
//! - **Transport Layer**: sentinel-delimited JSON frames over TCP
//!
//! # Components
//!
//! - [`protocol`] - Envelope, wire records and [`PoolError`]
//! - [`transport`] - Frame codec, framed socket halves and the TCP accept loop
//!
//! # Example
//!
//! ```
//! use rpcpool_common::{Request, Response};
//! use serde_json::json;
//!
//! let request = Request::new(1, "hello-world", json!(["a"]));
//! let response = Response::success(request.id.clone(), json!(["a"]));
//! assert_eq!(response.id, request.id);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
