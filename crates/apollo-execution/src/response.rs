use crate::error::ExecuteError;
use crate::GraphQLError;
use crate::JsonMap;
use apollo_compiler::parser::SourceMap;
use serde::Serialize;

/// A [GraphQL response](https://spec.graphql.org/October2021/#sec-Response-Format)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResponse {
    // <https://spec.graphql.org/October2021/#note-6f005> suggests serializing this first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    #[serde(skip_serializing_if = "ResponseData::is_absent")]
    pub data: ResponseData,

    /// Includes `metrics` when enabled in [`ExecutionOptions`][crate::ExecutionOptions]
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub extensions: JsonMap,
}

/// The `data` entry of an [`ExecutionResponse`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// Serialized as a JSON object
    Object(JsonMap),

    /// A field error on a non-null field propagated null all the way to the root.
    /// Serialized as JSON null.
    Null,

    /// A [request error](https://spec.graphql.org/October2021/#sec-Errors.Request-errors)
    /// was encountered and execution did not start. Skipped from serialization.
    Absent,
}

impl ExecutionResponse {
    /// A response for a request error: one error and no `data`.
    ///
    /// Unlike a field error, the error has no path.
    pub fn request_error(error: &ExecuteError, sources: &SourceMap) -> Self {
        let code = match error {
            ExecuteError::UnknownOperation(_) | ExecuteError::AmbiguousOperation => {
                Some("OPERATION_RESOLUTION_FAILURE")
            }
            _ => None,
        };
        let mut error = GraphQLError::new(error.to_string(), None, sources);
        if let Some(code) = code {
            error.extensions.insert("code", code.into());
        }
        Self {
            errors: vec![error],
            data: ResponseData::Absent,
            extensions: JsonMap::new(),
        }
    }
}

impl ResponseData {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_object(&self) -> Option<&JsonMap> {
        match self {
            Self::Object(map) => Some(map),
            Self::Null | Self::Absent => None,
        }
    }
}

impl Serialize for ResponseData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            // Skipped by `ExecutionResponse`
            ResponseData::Absent | ResponseData::Null => serializer.serialize_unit(),
            ResponseData::Object(map) => map.serialize(serializer),
        }
    }
}

impl From<Option<JsonMap>> for ResponseData {
    fn from(value: Option<JsonMap>) -> Self {
        match value {
            Some(data) => Self::Object(data),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_have_no_data() {
        let response =
            ExecutionResponse::request_error(&ExecuteError::AmbiguousOperation, &Default::default());
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"errors":[{"message":"multiple operations but no operation name","extensions":{"code":"OPERATION_RESOLUTION_FAILURE"}}]}"#
        );

        let response = ExecutionResponse {
            errors: Vec::new(),
            data: None.into(),
            extensions: JsonMap::new(),
        };
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"data":null}"#);
    }
}
