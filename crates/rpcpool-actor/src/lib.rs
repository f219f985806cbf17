//! Remote actor for rpcpool
//!
//! An actor process owns a local worker pool and keeps one outbound socket
//! open to a dispatch server. Dispatch records arrive on that socket and
//! replies leave on it, correlated by `messageSeq`.

pub mod client;

pub use client::{ActorClient, ActorState, ReconnectPolicy};
