use thiserror::Error;

use crate::protocol::jsonrpc::RpcError;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Correlation error: {0}")]
    Correlation(String),

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("No actors available to handle requests")]
    EmptyActorPool,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for PoolError {
    fn from(err: std::net::AddrParseError) -> Self {
        PoolError::InvalidRequest(err.to_string())
    }
}

/// Caller-facing form of a pool failure.
///
/// Codes land in the server error range: timeouts are -32008, a closed
/// pool or an empty actor pool -32003, connection trouble -32002 and
/// anything else -32000.
impl From<PoolError> for RpcError {
    fn from(err: PoolError) -> Self {
        let code = match &err {
            PoolError::Timeout(_) => 8,
            PoolError::PoolClosed | PoolError::EmptyActorPool => 3,
            PoolError::Connection(_) | PoolError::Transport(_) | PoolError::Io(_) => 2,
            _ => 0,
        };
        RpcError::server_error(code, &err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
