//! Execution of GraphQL operations against per-field resolvers.
//!
//! This crate takes a schema and an executable document that were parsed and validated
//! by [`apollo_compiler`], a set of [`Resolvers`], and produces an [`ExecutionResponse`].
//!
//! Execution builds a tree of nodes, one per response position, and a scheduler walks it:
//!
//! * Fields run one at a time in request order, unless their resolver was registered
//!   with [`Resolvers::concurrent_field`], in which case they may overlap with anything else.
//! * A resolver may return a value, a future, or a [deferred value][Resolved::Deferred].
//!   Deferred values are only completed once nothing else can make progress,
//!   so that sibling requests end up in the same batch. [`DataLoader`] builds on this.
//! * Field errors are recorded with their response path and null is propagated
//!   to the nearest nullable position, per
//!   [Handling Field Errors](https://spec.graphql.org/October2021/#sec-Handling-Field-Errors).
//!
//! # Example
//!
//! ```
#![doc = include_str!("../tests/doc_example.rs")]
//! ```

mod builder;
mod dataloader;
mod error;
mod execution;
mod input_coercion;
mod listener;
mod metrics;
mod node;
mod options;
mod resolve;
mod resolver;
mod response;
mod strategy;
mod value;

pub use self::dataloader::DataLoader;
pub use self::dataloader::Dispatch;
pub use self::dataloader::DispatchListener;
pub use self::dataloader::Loader;
pub use self::error::ErrorSink;
pub use self::error::ExecuteError;
pub use self::error::ExecutionError;
pub use self::error::FieldError;
pub use self::error::UnhandledErrorContext;
pub use self::execution::Execution;
pub use self::listener::ExecutionListener;
pub use self::listener::ListenerInfo;
pub use self::metrics::FieldMetrics;
pub use self::metrics::Metrics;
pub use self::options::ExecutionOptions;
pub use self::resolver::EventStream;
pub use self::resolver::ResolveInfo;
pub use self::resolver::Resolvers;
pub use self::response::ExecutionResponse;
pub use self::response::ResponseData;
pub use self::value::DeferredValue;
pub use self::value::FieldValue;
pub use self::value::ObjectRef;
pub use self::value::Resolved;
pub use apollo_compiler::response::GraphQLError;
pub use apollo_compiler::response::ResponseDataPathSegment;
pub use serde_json_bytes::ByteString;
/// Re-export of the cancellation token checked before every field resolution
pub use tokio_util::sync::CancellationToken;

/// A JSON-compatible dynamically-typed value.
pub type JsonValue = serde_json_bytes::Value;

/// A JSON-compatible object/map with string keys and dynamically-typed values.
pub type JsonMap = serde_json_bytes::Map<ByteString, JsonValue>;
