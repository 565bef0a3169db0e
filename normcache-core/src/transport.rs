//! Network transport capability.

use crate::error::NetworkError;
use crate::operation::OperationRequest;
use async_trait::async_trait;
use serde_json::Value;

/// Executes an operation against a server and returns the raw response body.
///
/// The body is the usual `{"data": ..., "errors": [...]}` object; decoding
/// it into typed data is the operation's job, not the transport's. Whether
/// the transport speaks HTTP or multiplexes over a WebSocket is invisible
/// to the cache.
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> Result<Value, NetworkError>;
}
