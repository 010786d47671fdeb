use crate::error::ErrorSink;
use crate::error::ExecutionError;
use crate::error::FieldError;
use crate::node::NodeId;
use crate::node::NodeTree;
use crate::value::FieldValue;
use crate::value::Resolved;
use crate::JsonMap;
use crate::JsonValue;
use crate::ResponseDataPathSegment;
use apollo_compiler::executable;
use apollo_compiler::schema;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use futures::stream::BoxStream;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type FieldResolverFn = dyn Fn(&ResolveInfo<'_>) -> Result<Resolved, FieldError> + Send + Sync;

type TypeResolverFn = dyn Fn(&FieldValue) -> Option<String> + Send + Sync;

/// A stream of subscription events
pub type EventStream = BoxStream<'static, Result<FieldValue, FieldError>>;

type SubscriptionResolverFn =
    dyn Fn(&ResolveInfo<'_>) -> Result<EventStream, FieldError> + Send + Sync;

/// Per-field resolver functions, keyed by object type and field name.
///
/// Fields without a registered resolver read the same-named key of their parent value
/// when it is a JSON object, and resolve to null if that key is absent.
///
/// ```
/// use apollo_execution::{Resolved, Resolvers};
///
/// let resolvers = Resolvers::new()
///     .field("Query", "hero", |_info| Ok(Resolved::value(serde_json_bytes::json!({"name": "R2-D2"}))))
///     .concurrent_field("Hero", "friends", |_info| {
///         Ok(Resolved::future(async { Ok(vec!["Luke", "Leia"]) }))
///     });
/// ```
#[derive(Clone, Default)]
pub struct Resolvers {
    fields: HashMap<String, HashMap<String, FieldResolver>>,
    type_resolvers: HashMap<String, Arc<TypeResolverFn>>,
    subscriptions: HashMap<String, HashMap<String, Arc<SubscriptionResolverFn>>>,
}

#[derive(Clone)]
pub(crate) struct FieldResolver {
    pub(crate) resolve: Arc<FieldResolverFn>,
    /// May run concurrently with any other field
    pub(crate) concurrent: bool,
}

/// Information passed to resolver functions
pub struct ResolveInfo<'a> {
    pub(crate) schema: &'a Valid<Schema>,
    pub(crate) document: &'a Valid<ExecutableDocument>,
    pub(crate) object_type: &'a ObjectType,
    pub(crate) fields: &'a [&'a executable::Field],
    pub(crate) arguments: &'a JsonMap,
    pub(crate) source: &'a FieldValue,
    pub(crate) tree: &'a NodeTree<'a>,
    pub(crate) node: NodeId,
    pub(crate) context: &'a (dyn Any + Send + Sync),
    pub(crate) cancellation: &'a CancellationToken,
    pub(crate) errors: &'a ErrorSink,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resolver for `type_name.field_name`.
    ///
    /// The field is resolved sequentially: it does not start before the previous
    /// sequential field completed, and the next one does not start before it completes.
    pub fn field<F>(self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Result<Resolved, FieldError> + Send + Sync + 'static,
    {
        self.insert_field(type_name, field_name, Arc::new(resolver), false)
    }

    /// Registers a resolver for `type_name.field_name` that may run concurrently
    /// with any other field, once its parent completed.
    ///
    /// Top-level fields of mutations are always sequential.
    pub fn concurrent_field<F>(self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Result<Resolved, FieldError> + Send + Sync + 'static,
    {
        self.insert_field(type_name, field_name, Arc::new(resolver), true)
    }

    /// Registers a function returning the concrete object type name of values
    /// at positions of the given interface or union type.
    ///
    /// Without one, the [`ObjectRef`][crate::ObjectRef] type name
    /// or a `"__typename"` key of a JSON object is used.
    pub fn type_resolver<F>(mut self, abstract_type: &str, resolver: F) -> Self
    where
        F: Fn(&FieldValue) -> Option<String> + Send + Sync + 'static,
    {
        self.type_resolvers
            .insert(abstract_type.to_owned(), Arc::new(resolver));
        self
    }

    /// Registers the source event stream of a subscription root field
    pub fn subscription<F>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveInfo<'_>) -> Result<EventStream, FieldError> + Send + Sync + 'static,
    {
        self.subscriptions
            .entry(type_name.to_owned())
            .or_default()
            .insert(field_name.to_owned(), Arc::new(resolver));
        self
    }

    /// Adds every resolver of `other`, replacing those registered for the same field or type
    pub fn merge(mut self, other: Resolvers) -> Self {
        for (type_name, fields) in other.fields {
            self.fields.entry(type_name).or_default().extend(fields);
        }
        self.type_resolvers.extend(other.type_resolvers);
        for (type_name, fields) in other.subscriptions {
            self.subscriptions.entry(type_name).or_default().extend(fields);
        }
        self
    }

    fn insert_field(
        mut self,
        type_name: &str,
        field_name: &str,
        resolve: Arc<FieldResolverFn>,
        concurrent: bool,
    ) -> Self {
        self.fields
            .entry(type_name.to_owned())
            .or_default()
            .insert(field_name.to_owned(), FieldResolver { resolve, concurrent });
        self
    }

    pub(crate) fn field_resolver(&self, type_name: &str, field_name: &str) -> Option<&FieldResolver> {
        self.fields.get(type_name)?.get(field_name)
    }

    pub(crate) fn is_concurrent(&self, type_name: &str, field_name: &str) -> bool {
        self.field_resolver(type_name, field_name)
            .is_some_and(|resolver| resolver.concurrent)
    }

    pub(crate) fn resolve_type(&self, abstract_type: &str, value: &FieldValue) -> Option<String> {
        let resolver = self.type_resolvers.get(abstract_type)?;
        resolver(value)
    }

    pub(crate) fn subscription_resolver(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&SubscriptionResolverFn> {
        self.subscriptions.get(type_name)?.get(field_name).map(|f| &**f)
    }
}

impl<'a> ResolveInfo<'a> {
    /// The schema originally passed to [`Execution::new`][crate::Execution::new]
    pub fn schema(&self) -> &'a Valid<Schema> {
        self.schema
    }

    /// The executable document originally passed to [`Execution::new`][crate::Execution::new]
    pub fn document(&self) -> &'a Valid<ExecutableDocument> {
        self.document
    }

    /// The object type whose field is being resolved
    pub fn object_type(&self) -> &'a ObjectType {
        self.object_type
    }

    /// The name of the field being resolved
    pub fn field_name(&self) -> &'a str {
        &self.fields[0].name
    }

    /// The alias of the field being resolved if it has one, or its name
    pub fn response_key(&self) -> &'a str {
        self.fields[0].response_key()
    }

    /// The field definition in the schema
    pub fn field_definition(&self) -> &'a schema::FieldDefinition {
        &self.fields[0].definition
    }

    /// The field selections being resolved.
    ///
    /// There is always at least one, but there may be more in case of
    /// [field merging](https://spec.graphql.org/draft/#sec-Field-Selection-Merging).
    pub fn field_selections(&self) -> &'a [&'a executable::Field] {
        self.fields
    }

    pub fn return_type(&self) -> &'a Type {
        self.fields[0].ty()
    }

    /// The arguments passed to this field, after
    /// [`CoerceArgumentValues()`](https://spec.graphql.org/draft/#sec-Coercing-Field-Arguments):
    /// this matches the argument definitions in the schema.
    pub fn arguments(&self) -> &'a JsonMap {
        self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&'a JsonValue> {
        self.arguments.get(name)
    }

    /// The value of the parent object
    pub fn source(&self) -> &'a FieldValue {
        self.source
    }

    /// The response path of the field being resolved
    pub fn path(&self) -> Vec<ResponseDataPathSegment> {
        self.tree.path(self.node)
    }

    /// The context value set with [`Execution::context`][crate::Execution::context],
    /// if it has type `T`
    pub fn context<T: Any>(&self) -> Option<&'a T> {
        self.context.downcast_ref()
    }

    /// Triggered when execution is cancelled
    pub fn cancellation_token(&self) -> &'a CancellationToken {
        self.cancellation
    }

    /// Records an error in the response, at the path of this field,
    /// without failing the field
    pub fn report_error(&self, error: ExecutionError) {
        let node = self.tree.get(self.node);
        self.errors.push(error.into_field_error(
            self.path(),
            node.location(),
            &self.document.sources,
        ))
    }

    /// Errors recorded so far, shared by all resolvers of this execution
    pub fn error_sink(&self) -> &'a ErrorSink {
        self.errors
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<_> = self
            .fields
            .iter()
            .flat_map(|(ty, fields)| fields.keys().map(move |field| format!("{ty}.{field}")))
            .collect();
        f.debug_struct("Resolvers")
            .field("fields", &fields)
            .field("type_resolvers", &self.type_resolvers.keys())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry() {
        let resolvers = Resolvers::new()
            .field("Query", "a", |_| Ok(Resolved::null()))
            .concurrent_field("Query", "b", |_| Ok(Resolved::null()))
            .type_resolver("Node", |value| value.type_name_hint().map(str::to_owned));
        assert!(resolvers.field_resolver("Query", "a").is_some());
        assert!(resolvers.field_resolver("Query", "c").is_none());
        assert!(resolvers.field_resolver("Mutation", "a").is_none());
        assert!(!resolvers.is_concurrent("Query", "a"));
        assert!(resolvers.is_concurrent("Query", "b"));
        assert!(!resolvers.is_concurrent("Query", "c"));

        let value = FieldValue::typed_object(apollo_compiler::name!("User"), ());
        assert_eq!(resolvers.resolve_type("Node", &value), Some("User".to_owned()));
        assert_eq!(resolvers.resolve_type("Other", &value), None);
    }
}
