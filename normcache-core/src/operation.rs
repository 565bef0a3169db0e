//! Operation descriptors and results.

use crate::error::NetworkError;
use crate::key::CacheKey;
use crate::selection::SelectionSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of GraphQL operation, which decides the root record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    pub fn root_key(&self) -> CacheKey {
        match self {
            Self::Query => CacheKey::query_root(),
            Self::Mutation => CacheKey::mutation_root(),
            Self::Subscription => CacheKey::subscription_root(),
        }
    }
}

/// An opaque, already-resolved operation.
///
/// Generated code implements this; the cache only needs a stable identity,
/// the resolved selection shape, and a way to move data between its typed
/// form and JSON.
pub trait Operation: Send + Sync + 'static {
    type Data: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn name(&self) -> &str;

    /// Resolved selections under the operation's root record.
    fn selections(&self) -> &SelectionSet;

    fn operation_type(&self) -> OperationType {
        OperationType::Query
    }

    /// Variables as sent over the wire.
    fn variables(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Source document, if the transport needs one.
    fn document(&self) -> &str {
        ""
    }

    /// Stable identity used for logging and for matching queued test responses.
    fn id(&self) -> String {
        format!("{}{}", self.name(), self.variables())
    }

    fn root_key(&self) -> CacheKey {
        self.operation_type().root_key()
    }

    fn decode_data(&self, data: Value) -> Result<Self::Data, serde_json::Error> {
        serde_json::from_value(data)
    }

    fn encode_data(&self, data: &Self::Data) -> Result<Value, serde_json::Error> {
        serde_json::to_value(data)
    }

    /// Untyped description handed to the network transport.
    fn request(&self) -> OperationRequest {
        OperationRequest {
            id: self.id(),
            name: self.name().to_string(),
            operation_type: self.operation_type(),
            document: self.document().to_string(),
            variables: self.variables(),
        }
    }
}

/// What the transport sees of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub id: String,
    pub name: String,
    pub operation_type: OperationType,
    pub document: String,
    pub variables: Value,
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataOrigin {
    Cache,
    Network,
}

/// A GraphQL error entry from a response's `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }
}

/// Result of executing or reading an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult<D> {
    pub data: Option<D>,
    pub errors: Vec<GraphQlError>,
    pub origin: DataOrigin,
}

impl<D> OperationResult<D> {
    pub fn from_cache(data: D) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            origin: DataOrigin::Cache,
        }
    }

    pub fn from_network(data: Option<D>, errors: Vec<GraphQlError>) -> Self {
        Self {
            data,
            errors,
            origin: DataOrigin::Network,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_from_cache(&self) -> bool {
        self.origin == DataOrigin::Cache
    }

    /// Decode a `{"data": ..., "errors": [...]}` response body.
    pub fn from_response_body<O>(operation: &O, body: Value) -> Result<Self, NetworkError>
    where
        O: Operation<Data = D>,
    {
        let invalid = |reason: String| NetworkError::InvalidResponse {
            operation: operation.name().to_string(),
            reason,
        };

        let Value::Object(mut body) = body else {
            return Err(invalid("response body is not a JSON object".to_string()));
        };

        let data = body.remove("data");
        let errors = body.remove("errors");
        if data.is_none() && errors.is_none() {
            return Err(invalid("response has neither data nor errors".to_string()));
        }

        let data = match data {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                operation
                    .decode_data(value)
                    .map_err(|e| invalid(format!("data: {e}")))?,
            ),
        };

        let errors = match errors {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<GraphQlError>>(value)
                .map_err(|e| invalid(format!("errors: {e}")))?,
        };

        Ok(Self::from_network(data, errors))
    }
}
