use crate::GraphQLError;
use crate::JsonMap;
use crate::JsonValue;
use crate::ResponseDataPathSegment;
use apollo_compiler::parser::SourceMap;
use apollo_compiler::parser::SourceSpan;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A user-facing error, raised intentionally by a resolver.
///
/// It is recorded in the response with the path of the field being resolved,
/// and execution continues for other fields.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,

    /// Serialized as `extensions.code`
    pub code: Option<String>,

    /// Reserved for any additional information
    pub extensions: JsonMap,
}

/// The error type returned by resolvers and deferred values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FieldError {
    /// An error meant to be shown to the client as-is
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Anything else. Its handling is configured by
    /// [`Execution::unhandled_error_handler`][crate::Execution::unhandled_error_handler]
    /// and [`ExecutionOptions::throw_on_unhandled_error`][crate::ExecutionOptions].
    #[error(transparent)]
    Unhandled(Arc<dyn std::error::Error + Send + Sync>),
}

/// Request-level failures: no response data could be produced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecuteError {
    #[error("no operation named '{0}'")]
    UnknownOperation(String),

    #[error("multiple operations but no operation name")]
    AmbiguousOperation,

    #[error("root operation type {0} is undefined or not an object type")]
    UndefinedRootType(String),

    #[error("subscription operations must be executed with `Execution::subscribe`")]
    SubscriptionNotSupported,

    #[error("`Execution::subscribe` only executes subscription operations")]
    NotASubscription,

    #[error("subscription operations must select exactly one top-level field")]
    InvalidSubscriptionSelection,

    /// An unhandled resolver error, with
    /// [`throw_on_unhandled_error`][crate::ExecutionOptions::throw_on_unhandled_error] enabled
    #[error("{message}")]
    Unhandled {
        message: String,
        path: Vec<ResponseDataPathSegment>,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

/// Passed to the unhandled error hook.
///
/// The hook may rewrite [`message`][Self::message],
/// or substitute a user-facing error by setting [`replacement`][Self::replacement].
pub struct UnhandledErrorContext {
    /// The error returned or the panic raised by a resolver
    pub error: Arc<dyn std::error::Error + Send + Sync>,

    /// The message of the response error that will be recorded
    pub message: String,

    /// The path of the field being resolved
    pub path: Vec<ResponseDataPathSegment>,

    /// If set, recorded instead and execution always continues
    pub replacement: Option<ExecutionError>,
}

pub(crate) type UnhandledErrorHandler = Arc<dyn Fn(&mut UnhandledErrorContext) + Send + Sync>;

/// An append-only collection of response errors shared by all resolvers of an execution.
#[derive(Clone, Default)]
pub struct ErrorSink(Arc<Mutex<Vec<GraphQLError>>>);

/// A panic payload caught while resolving a field
#[derive(Debug, thiserror::Error)]
#[error("resolver panicked: {0}")]
pub(crate) struct ResolverPanic(pub(crate) String);

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            extensions: JsonMap::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }

    pub(crate) fn into_field_error(
        self,
        path: Vec<ResponseDataPathSegment>,
        location: Option<SourceSpan>,
        sources: &SourceMap,
    ) -> GraphQLError {
        let Self {
            message,
            code,
            mut extensions,
        } = self;
        if let Some(code) = code {
            extensions.insert("code", code.into());
        }
        let mut error = GraphQLError::new(message, location, sources);
        error.path = path;
        error.extensions = extensions;
        error
    }
}

impl FieldError {
    /// Wraps any error not meant for the client
    pub fn unhandled(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unhandled(Arc::new(error))
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::Execution(ExecutionError::new(message))
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::Execution(ExecutionError::new(message))
    }
}

impl ResolverPanic {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(str) = payload.downcast_ref::<&str>() {
            str.to_string()
        } else if let Some(string) = payload.downcast_ref::<String>() {
            string.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self(message)
    }
}

impl ErrorSink {
    pub fn push(&self, error: GraphQLError) {
        self.0.lock().push(error)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub(crate) fn take(&self) -> Vec<GraphQLError> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorSink").field(&*self.0.lock()).finish()
    }
}

impl fmt::Debug for UnhandledErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnhandledErrorContext")
            .field("error", &self.error)
            .field("message", &self.message)
            .field("path", &self.path)
            .field("replacement", &self.replacement)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_becomes_an_extension() {
        let error = ExecutionError::new("boom")
            .with_code("BOOM")
            .with_extension("retry", false)
            .into_field_error(
                vec![ResponseDataPathSegment::ListIndex(3)],
                None,
                &Default::default(),
            );
        assert_eq!(error.message, "boom");
        assert_eq!(error.extensions["code"], JsonValue::from("BOOM"));
        assert_eq!(error.extensions["retry"], JsonValue::from(false));
        assert_eq!(error.path, [ResponseDataPathSegment::ListIndex(3)]);
        assert!(error.locations.is_empty());
    }

    #[test]
    fn panic_payloads() {
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(ResolverPanic::from_payload(payload).0, "static");
        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 1)).unwrap_err();
        assert_eq!(ResolverPanic::from_payload(payload).0, "formatted 1");
    }
}
