use crate::builder::build_root;
use crate::builder::complete_node;
use crate::error::ErrorSink;
use crate::error::ExecuteError;
use crate::error::UnhandledErrorContext;
use crate::error::UnhandledErrorHandler;
use crate::listener::ExecutionListener;
use crate::listener::ListenerInfo;
use crate::metrics::Metrics;
use crate::node::NodeId;
use crate::node::NodeOrigin;
use crate::node::NodeTree;
use crate::options::ExecutionOptions;
use crate::resolve::handle_field_error;
use crate::resolve::resolve_event_stream;
use crate::resolver::Resolvers;
use crate::response::ExecutionResponse;
use crate::strategy::Scheduler;
use crate::value::FieldValue;
use crate::FieldError;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::OperationType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use futures::stream::BoxStream;
use futures::StreamExt as _;
use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

/// Builder for configuring GraphQL execution
///
/// See [crate-level documentation][crate].
pub struct Execution<'a> {
    schema: &'a Valid<Schema>,
    document: &'a Valid<ExecutableDocument>,
    operation: Option<&'a Operation>,
    variable_values: Cow<'a, JsonMap>,
    root_value: FieldValue,
    context: Arc<dyn Any + Send + Sync>,
    cancellation: CancellationToken,
    unhandled_error_handler: Option<UnhandledErrorHandler>,
    options: ExecutionOptions,
    listeners: Vec<Arc<dyn ExecutionListener>>,
}

/// State shared by everything that runs during one execution
pub(crate) struct ExecutionContext<'a> {
    pub(crate) schema: &'a Valid<Schema>,
    pub(crate) document: &'a Valid<ExecutableDocument>,
    pub(crate) operation: &'a Operation,
    pub(crate) variable_values: &'a JsonMap,
    pub(crate) resolvers: &'a Resolvers,
    pub(crate) context: Arc<dyn Any + Send + Sync>,
    pub(crate) errors: ErrorSink,
    pub(crate) cancellation: CancellationToken,
    pub(crate) unhandled_error_handler: Option<UnhandledErrorHandler>,
    pub(crate) options: &'a ExecutionOptions,
    pub(crate) started_at: Instant,
}

impl<'a> Execution<'a> {
    /// Create a new builder for configuring GraphQL execution
    pub fn new(schema: &'a Valid<Schema>, document: &'a Valid<ExecutableDocument>) -> Self {
        Self {
            schema,
            document,
            operation: None,
            variable_values: Cow::Owned(JsonMap::new()),
            root_value: FieldValue::Json(JsonValue::Object(JsonMap::new())),
            context: Arc::new(()),
            cancellation: CancellationToken::new(),
            unhandled_error_handler: None,
            options: ExecutionOptions::default(),
            listeners: Vec::new(),
        }
    }

    /// Sets the operation to execute.
    ///
    /// Mutually exclusive with [`operation_name`][Self::operation_name].
    pub fn operation(mut self, operation: &'a Operation) -> Self {
        assert!(
            self.operation.is_none(),
            "operation to execute already provided"
        );
        self.operation = Some(operation);
        self
    }

    /// Sets the operation to execute.
    ///
    /// Mutually exclusive with [`operation`][Self::operation].
    ///
    /// If neither is called or if `None` is passed here,
    /// the document is expected to contain exactly one operation.
    pub fn operation_name(mut self, operation_name: Option<&str>) -> Result<Self, ExecuteError> {
        assert!(
            self.operation.is_none(),
            "operation to execute already provided"
        );
        self.operation = Some(select_operation(self.document, operation_name)?);
        Ok(self)
    }

    /// Provide values of the request’s variables, already coerced to the declared types.
    ///
    /// If not called, an empty map is assumed.
    pub fn variable_values(mut self, variable_values: &'a JsonMap) -> Self {
        self.variable_values = Cow::Borrowed(variable_values);
        self
    }

    /// The parent value of root fields. Defaults to an empty JSON object.
    pub fn root_value(mut self, root_value: impl Into<FieldValue>) -> Self {
        self.root_value = root_value.into();
        self
    }

    /// An arbitrary value made available to resolvers by [`ResolveInfo::context`][crate::ResolveInfo::context]
    pub fn context(mut self, context: impl Any + Send + Sync) -> Self {
        self.context = Arc::new(context);
        self
    }

    /// Once this token is cancelled, no further field is started
    /// and pending fields are abandoned. The response then contains the data resolved so far.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Called for every unhandled resolver error, including panics.
    ///
    /// See [`UnhandledErrorContext`] for what the hook can change.
    pub fn unhandled_error_handler(
        mut self,
        handler: impl Fn(&mut UnhandledErrorContext) + Send + Sync + 'static,
    ) -> Self {
        self.unhandled_error_handler = Some(Arc::new(handler));
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers a listener. Listeners are called in registration order.
    pub fn listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Executes a query or mutation operation
    pub async fn execute(&self, resolvers: &Resolvers) -> Result<ExecutionResponse, ExecuteError> {
        let operation = self.selected_operation()?;
        if operation.operation_type == OperationType::Subscription {
            return Err(ExecuteError::SubscriptionNotSupported);
        }
        let root_type = self.root_type(operation)?;
        let span = tracing::debug_span!(
            "execute",
            operation_type = %operation.operation_type,
            operation_name = operation.name.as_ref().map(|name| name.as_str()),
        );
        async {
            let ctx = self.execution_context(operation, resolvers);
            let info = ListenerInfo {
                operation,
                context: &*ctx.context,
            };
            for listener in &self.listeners {
                listener.before_execution(&info).await;
            }
            let mut tree = NodeTree::new(root_type, self.root_value.clone());
            build_root(&ctx, &mut tree);
            let (tree, metrics) = Scheduler::new(&ctx, &self.listeners, tree).run().await?;
            for listener in &self.listeners {
                listener.after_execution(&info).await;
            }
            Ok::<_, ExecuteError>(response(&ctx, &tree, metrics))
        }
        .instrument(span)
        .await
    }

    /// Executes a subscription operation.
    ///
    /// The subscription resolver of the single root field is called once to obtain
    /// a stream of events. Each event then goes through execution as the value
    /// of that root field, producing one response.
    pub fn subscribe<'b>(
        &'b self,
        resolvers: &'b Resolvers,
    ) -> Result<BoxStream<'b, ExecutionResponse>, ExecuteError> {
        let operation = self.selected_operation()?;
        if operation.operation_type != OperationType::Subscription {
            return Err(ExecuteError::NotASubscription);
        }
        let root_type = self.root_type(operation)?;
        let ctx = self.execution_context(operation, resolvers);
        let (tree, field) = self.subscription_tree(&ctx, root_type)?;
        let events = match resolve_event_stream(&ctx, &tree, field) {
            Ok(events) => events,
            Err(error) => {
                let mut tree = tree;
                handle_field_error(&ctx, &mut tree, field, error)?;
                let response = response(&ctx, &tree, None);
                return Ok(futures::stream::once(futures::future::ready(response)).boxed());
            }
        };
        tracing::debug!(field = tree.get(field).field_name(), "subscription started");
        Ok(events
            .then(move |event| self.execute_event(resolvers, operation, root_type, event))
            .boxed())
    }

    /// Executes the selection set of a subscription for one event
    async fn execute_event(
        &self,
        resolvers: &Resolvers,
        operation: &Operation,
        root_type: &ObjectType,
        event: Result<FieldValue, FieldError>,
    ) -> ExecutionResponse {
        let ctx = self.execution_context(operation, resolvers);
        let result = async {
            let (mut tree, field) = self.subscription_tree(&ctx, root_type)?;
            match event {
                Ok(value) => complete_node(&ctx, &mut tree, field, value),
                Err(error) => handle_field_error(&ctx, &mut tree, field, error)?,
            }
            let (tree, metrics) = Scheduler::new(&ctx, &self.listeners, tree).run().await?;
            Ok::<_, ExecuteError>(response(&ctx, &tree, metrics))
        };
        let span = tracing::debug_span!(
            "subscription_event",
            operation_name = operation.name.as_ref().map(|name| name.as_str()),
        );
        result
            .instrument(span)
            .await
            .unwrap_or_else(|error| ExecutionResponse::request_error(&error, &self.document.sources))
    }

    /// A tree for a subscription operation, with its single root field node
    fn subscription_tree<'b>(
        &self,
        ctx: &ExecutionContext<'b>,
        root_type: &'b ObjectType,
    ) -> Result<(NodeTree<'b>, NodeId), ExecuteError> {
        let mut tree = NodeTree::new(root_type, self.root_value.clone());
        build_root(ctx, &mut tree);
        let &[field] = tree.children(NodeId::ROOT) else {
            return Err(ExecuteError::InvalidSubscriptionSelection);
        };
        tree.get_mut(field).origin = NodeOrigin::SubscriptionEvent;
        Ok((tree, field))
    }

    fn selected_operation(&self) -> Result<&'a Operation, ExecuteError> {
        match self.operation {
            Some(operation) => Ok(operation),
            None => select_operation(self.document, None),
        }
    }

    fn root_type(&self, operation: &Operation) -> Result<&'a ObjectType, ExecuteError> {
        let schema: &'a Valid<Schema> = self.schema;
        let name = operation.object_type();
        match schema.get_object(name) {
            Some(object_type) => Ok(object_type.as_ref()),
            None => Err(ExecuteError::UndefinedRootType(name.to_string())),
        }
    }

    fn execution_context<'b>(
        &'b self,
        operation: &'b Operation,
        resolvers: &'b Resolvers,
    ) -> ExecutionContext<'b> {
        ExecutionContext {
            schema: self.schema,
            document: self.document,
            operation,
            variable_values: &self.variable_values,
            resolvers,
            context: self.context.clone(),
            errors: ErrorSink::default(),
            cancellation: self.cancellation.clone(),
            unhandled_error_handler: self.unhandled_error_handler.clone(),
            options: &self.options,
            started_at: Instant::now(),
        }
    }
}

fn select_operation<'a>(
    document: &'a Valid<ExecutableDocument>,
    operation_name: Option<&str>,
) -> Result<&'a Operation, ExecuteError> {
    match document.operations.get(operation_name) {
        Ok(operation) => Ok(operation.as_ref()),
        Err(_) => Err(match operation_name {
            Some(name) => ExecuteError::UnknownOperation(name.to_owned()),
            None => ExecuteError::AmbiguousOperation,
        }),
    }
}

fn response(ctx: &ExecutionContext<'_>, tree: &NodeTree<'_>, metrics: Option<Metrics>) -> ExecutionResponse {
    let data = tree.to_data().into();
    let errors = ctx.errors.take();
    tracing::debug!(nodes = tree.len(), errors = errors.len(), "execution finished");
    let mut extensions = JsonMap::new();
    if let Some(metrics) = metrics {
        extensions.insert("metrics", metrics.to_json());
    }
    ExecutionResponse {
        errors,
        data,
        extensions,
    }
}
