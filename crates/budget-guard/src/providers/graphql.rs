//! Typed GraphQL request and response envelopes

use serde::{Deserialize, Serialize};

use super::FetchError;

/// A GraphQL operation ready to be posted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest<V> {
    /// Operation to run when the document holds several
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'static str>,
    /// Operation variables
    pub variables: V,
    /// Query document
    pub query: &'static str,
}

impl<V: Serialize> GraphQlRequest<V> {
    /// A named operation with variables
    pub fn named(operation_name: &'static str, query: &'static str, variables: V) -> Self {
        Self {
            operation_name: Some(operation_name),
            variables,
            query,
        }
    }
}

/// No variables: serialises as `{}`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoVariables {}

/// Response envelope
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    /// Payload, absent on failure
    pub data: Option<T>,
    /// Errors reported by the server
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// One entry of the `errors` array
#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    /// Error description
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    /// Extract `data`, turning GraphQL errors into [`FetchError::MalformedResponse`]
    pub fn into_data(self) -> Result<T, FetchError> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(FetchError::MalformedResponse(format!(
                "GraphQL errors: {}",
                messages.join("; ")
            )));
        }
        self.data
            .ok_or_else(|| FetchError::MalformedResponse("GraphQL response without data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_serialises_camel_case() {
        let request = GraphQlRequest::named("myOp", "query myOp { x }", NoVariables {});
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"operationName": "myOp", "variables": {}, "query": "query myOp { x }"})
        );
    }

    #[test]
    fn test_errors_take_precedence_over_data() {
        let response: GraphQlResponse<serde_json::Value> = serde_json::from_value(json!({
            "data": {"x": 1},
            "errors": [{"message": "unauthorized"}, {"message": "try again"}]
        }))
        .unwrap();

        let err = response.into_data().unwrap_err();
        assert_eq!(
            err,
            FetchError::MalformedResponse("GraphQL errors: unauthorized; try again".into())
        );
    }

    #[test]
    fn test_missing_data_is_malformed() {
        let response: GraphQlResponse<serde_json::Value> =
            serde_json::from_value(json!({"data": null})).unwrap();
        assert!(matches!(response.into_data(), Err(FetchError::MalformedResponse(_))));
    }
}
