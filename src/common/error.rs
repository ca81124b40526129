//! Error types for shardcoord

use crate::common::wire::wire_enum;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

wire_enum! {
    /// Machine-checkable error code carried in every response envelope.
    pub enum ErrorCode {
        Undefined = (0, "UNDEFINED"),
        /// The coordinator itself failed to serve the call.
        RpcError = (1, "RPC_ERROR"),
        /// A shard could not be reached or did not answer in time.
        CommunicationShardRpcError = (2, "COMMUNICATION_SHARD_RPC_ERROR"),
        /// A shard answered but refused or failed the operation.
        CommunicationShardError = (3, "COMMUNICATION_SHARD_ERROR"),
        MarshalError = (4, "MARSHAL_ERROR"),
        InternalFuncError = (5, "INTERNAL_FUNC_ERROR"),
    }
    fallback = Undefined;
}

/// Failure of a single call to one shard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("shard {node} unreachable: {reason}")]
    Unreachable { node: String, reason: String },

    #[error("shard {node} did not answer within {timeout_ms}ms")]
    Timeout { node: String, timeout_ms: u64 },

    #[error("shard {node} has no collection {collection}")]
    NotFound { node: String, collection: String },

    #[error("shard {node} rejected the request: {reason}")]
    Rejected { node: String, reason: String },

    #[error("shard {node} internal error: {reason}")]
    Internal { node: String, reason: String },

    #[error("malformed payload from shard {node}: {reason}")]
    Marshal { node: String, reason: String },
}

impl ShardError {
    pub fn node(&self) -> &str {
        match self {
            ShardError::Unreachable { node, .. }
            | ShardError::Timeout { node, .. }
            | ShardError::NotFound { node, .. }
            | ShardError::Rejected { node, .. }
            | ShardError::Internal { node, .. }
            | ShardError::Marshal { node, .. } => node,
        }
    }

    /// Transport failures are the only ones worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShardError::Unreachable { .. } | ShardError::Timeout { .. }
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ShardError::Unreachable { .. } | ShardError::Timeout { .. } => {
                ErrorCode::CommunicationShardRpcError
            }
            ShardError::NotFound { .. } | ShardError::Rejected { .. } => {
                ErrorCode::CommunicationShardError
            }
            ShardError::Internal { .. } => ErrorCode::InternalFuncError,
            ShardError::Marshal { .. } => ErrorCode::MarshalError,
        }
    }

    /// HTTP status a worker answers with for this failure.
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ShardError::NotFound { .. } => StatusCode::NOT_FOUND,
            ShardError::Rejected { .. } => StatusCode::CONFLICT,
            ShardError::Marshal { .. } => StatusCode::BAD_REQUEST,
            ShardError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ShardError::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            ShardError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("collection already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid collection name: {0}")]
    InvalidName(String),

    #[error("invalid collection definition: {0}")]
    InvalidDefinition(String),

    #[error("collection {name} is {status}, cannot {operation}")]
    InvalidState {
        name: String,
        status: String,
        operation: &'static str,
    },

    // === Placement Errors ===
    #[error("no node has capacity for {needed_bytes} bytes on {tier} ({candidates} candidates)")]
    NoCapacity {
        tier: String,
        needed_bytes: u64,
        candidates: usize,
    },

    #[error("unknown node: {0}")]
    UnknownNode(String),

    // === Shard Errors ===
    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error("{operation} failed on {failed} of {total} shards: {first}")]
    PartialFailure {
        operation: &'static str,
        failed: usize,
        total: usize,
        first: ShardError,
    },

    // === I/O & Network Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Marshal(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NoCapacity { .. } => true,
            Error::Shard(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Wire code reported in the response envelope.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Shard(e) => e.code(),
            Error::PartialFailure { first, .. } => first.code(),
            Error::Marshal(_) => ErrorCode::MarshalError,
            Error::Http(_) | Error::Io(_) => ErrorCode::RpcError,
            _ => ErrorCode::InternalFuncError,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Marshal(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
