//! MCP Error Handling
//!
//! Server failures and their JSON-RPC error codes.

use crate::RagError;
use crate::mcp::protocol::*;
use thiserror::Error;
use tracing::{error, warn};

/// Failures surfaced to the client as JSON-RPC errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    #[error("Unsupported protocol version: {version}. Supported: {}", supported.join(", "))]
    UnsupportedProtocolVersion {
        version: String,
        supported: Vec<String>,
    },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Invalid parameters for tool '{tool}': {message}")]
    InvalidToolParameters { tool: String, message: String },

    #[error("Server not initialized. Send initialize request first.")]
    ServerNotInitialized,

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("{message}")]
    InternalError { message: String },

    #[error("{message}")]
    ParseError { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("{message}")]
    InvalidParameters { message: String },
}

impl McpError {
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            Self::UnsupportedProtocolVersion { .. } => error_codes::INVALID_PROTOCOL_VERSION,
            Self::ToolNotFound { .. } => error_codes::TOOL_NOT_FOUND,
            Self::ServerNotInitialized => error_codes::SERVER_NOT_INITIALIZED,
            Self::InvalidToolParameters { .. } | Self::InvalidParameters { .. } => {
                error_codes::INVALID_PARAMS
            }
            Self::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            Self::InternalError { .. } => error_codes::INTERNAL_ERROR,
            Self::ParseError { .. } => error_codes::PARSE_ERROR,
            Self::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
        }
    }

    /// Whether the client caused the error
    #[inline]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InternalError { .. })
    }

    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let data = match self {
            Self::UnsupportedProtocolVersion { supported, .. } => {
                Some(serde_json::json!({ "supported": supported }))
            }
            _ => None,
        };

        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }

    #[inline]
    pub fn to_error_response(&self, id: Option<RequestId>) -> JsonRpcMessage {
        JsonRpcMessage::failure(id, self.to_jsonrpc_error())
    }

    #[inline]
    pub fn log(&self) {
        if self.is_client_error() {
            warn!("Client error ({}): {}", self.code(), self);
        } else {
            error!("Server error: {}", self);
        }
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

impl From<anyhow::Error> for McpError {
    #[inline]
    fn from(error: anyhow::Error) -> Self {
        Self::InternalError {
            message: format!("{:#}", error),
        }
    }
}

impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidParameters {
            message: error.to_string(),
        }
    }
}

impl From<McpError> for RagError {
    #[inline]
    fn from(error: McpError) -> Self {
        Self::Mcp(error.to_string())
    }
}
