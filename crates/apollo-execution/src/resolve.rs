use crate::error::ExecuteError;
use crate::error::ExecutionError;
use crate::error::FieldError;
use crate::error::ResolverPanic;
use crate::error::UnhandledErrorContext;
use crate::execution::ExecutionContext;
use crate::input_coercion::coerce_argument_values;
use crate::node::NodeId;
use crate::node::NodeResult;
use crate::node::NodeTree;
use crate::resolver::EventStream;
use crate::resolver::ResolveInfo;
use crate::value::DeferredValue;
use crate::value::FieldValue;
use crate::value::Resolved;
use crate::JsonValue;
use futures::future::BoxFuture;
use futures::future::Either;
use futures::FutureExt as _;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a started node is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    /// At most one at a time, in request order
    Sequential,
    Concurrent,
    /// Completion of a deferred value, in a batch with every other pending one
    Deferred,
}

/// A node whose resolution finished, successfully or not
pub(crate) struct Completion {
    pub(crate) id: NodeId,
    pub(crate) lane: Lane,
    pub(crate) outcome: Outcome,
    pub(crate) started_at: Instant,
}

pub(crate) enum Outcome {
    Ready(FieldValue),
    Deferred(Box<dyn DeferredValue>),
    Failed(FieldError),
    /// The cancellation token was triggered before the resolver finished
    Cancelled,
}

/// Calls the resolver of a node and returns a future for the rest of its resolution.
///
/// Immediate values are wrapped in a ready future,
/// pending values race the cancellation token.
pub(crate) fn start_node<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &NodeTree<'a>,
    id: NodeId,
    lane: Lane,
) -> BoxFuture<'static, Completion> {
    let started_at = Instant::now();
    let outcome = match resolve_field(ctx, tree, id) {
        Ok(Resolved::Ready(value)) => Outcome::Ready(value),
        Ok(Resolved::Deferred(deferred)) => Outcome::Deferred(deferred),
        Ok(pending @ Resolved::Pending(_)) => {
            return complete_later(ctx.cancellation.clone(), id, lane, started_at, pending)
        }
        Err(error) => Outcome::Failed(error),
    };
    futures::future::ready(Completion {
        id,
        lane,
        outcome,
        started_at,
    })
    .boxed()
}

/// Fetches the real value behind a deferred node
pub(crate) fn start_deferred(
    ctx: &ExecutionContext<'_>,
    id: NodeId,
    deferred: Box<dyn DeferredValue>,
) -> BoxFuture<'static, Completion> {
    let started_at = Instant::now();
    let token = ctx.cancellation.clone();
    match std::panic::catch_unwind(AssertUnwindSafe(|| deferred.complete(token.clone()))) {
        Ok(future) => complete_later(token, id, Lane::Deferred, started_at, Resolved::Pending(future)),
        Err(payload) => futures::future::ready(Completion {
            id,
            lane: Lane::Deferred,
            outcome: Outcome::Failed(panicked(payload)),
            started_at,
        })
        .boxed(),
    }
}

fn complete_later(
    token: CancellationToken,
    id: NodeId,
    lane: Lane,
    started_at: Instant,
    resolved: Resolved,
) -> BoxFuture<'static, Completion> {
    async move {
        let outcome = cancellable(token, drive(resolved)).await;
        Completion {
            id,
            lane,
            outcome,
            started_at,
        }
    }
    .boxed()
}

/// Awaits pending values until something else comes out
async fn drive(mut resolved: Resolved) -> Outcome {
    loop {
        let future = match resolved {
            Resolved::Ready(value) => return Outcome::Ready(value),
            Resolved::Deferred(deferred) => return Outcome::Deferred(deferred),
            Resolved::Pending(future) => future,
        };
        resolved = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(next)) => next,
            Ok(Err(error)) => return Outcome::Failed(error),
            Err(payload) => return Outcome::Failed(panicked(payload)),
        }
    }
}

async fn cancellable(token: CancellationToken, future: impl Future<Output = Outcome>) -> Outcome {
    let cancelled = token.cancelled();
    futures::pin_mut!(cancelled, future);
    match futures::future::select(future, cancelled).await {
        Either::Left((outcome, _)) => outcome,
        Either::Right(((), _)) => Outcome::Cancelled,
    }
}

fn panicked(payload: Box<dyn std::any::Any + Send>) -> FieldError {
    FieldError::unhandled(ResolverPanic::from_payload(payload))
}

/// Calls the registered or default resolver of a field
fn resolve_field<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &NodeTree<'a>,
    id: NodeId,
) -> Result<Resolved, FieldError> {
    with_resolve_info(ctx, tree, id, |info| {
        match ctx
            .resolvers
            .field_resolver(&info.object_type().name, info.field_name())
        {
            Some(resolver) => (resolver.resolve)(info),
            None => default_resolver(info),
        }
    })
}

/// Calls the subscription resolver of a root field
pub(crate) fn resolve_event_stream<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &NodeTree<'a>,
    id: NodeId,
) -> Result<EventStream, FieldError> {
    with_resolve_info(ctx, tree, id, |info| {
        let type_name = &info.object_type().name;
        match ctx
            .resolvers
            .subscription_resolver(type_name, info.field_name())
        {
            Some(resolver) => resolver(info),
            None => Err(ExecutionError::new(format!(
                "no subscription resolver for field {type_name}.{}",
                info.field_name()
            ))
            .into()),
        }
    })
}

/// Assembles [`ResolveInfo`] for a node and calls `f`, converting panics to errors
fn with_resolve_info<'a, T>(
    ctx: &ExecutionContext<'a>,
    tree: &NodeTree<'a>,
    id: NodeId,
    f: impl FnOnce(&ResolveInfo<'_>) -> Result<T, FieldError>,
) -> Result<T, FieldError> {
    let node = tree.get(id);
    let parent = node.parent.unwrap_or(NodeId::ROOT);
    let (Some(field), Some(object_type), Some(source)) = (
        node.fields.first(),
        tree.object_type(parent),
        tree.source(id),
    ) else {
        return Err(ExecutionError::new("field resolved outside of an object").into());
    };
    let arguments =
        coerce_argument_values(ctx.schema, ctx.variable_values, &field.definition, field)?;
    let info = ResolveInfo {
        schema: ctx.schema,
        document: ctx.document,
        object_type,
        fields: &node.fields,
        arguments: &arguments,
        source,
        tree,
        node: id,
        context: &*ctx.context,
        cancellation: &ctx.cancellation,
        errors: &ctx.errors,
    };
    std::panic::catch_unwind(AssertUnwindSafe(|| f(&info)))
        .unwrap_or_else(|payload| Err(panicked(payload)))
}

/// Reads the same-named key of a JSON object parent
fn default_resolver(info: &ResolveInfo<'_>) -> Result<Resolved, FieldError> {
    match info.source() {
        FieldValue::Json(JsonValue::Object(map)) => Ok(Resolved::value(
            map.get(info.field_name()).cloned().unwrap_or(JsonValue::Null),
        )),
        FieldValue::Json(JsonValue::Null) => Ok(Resolved::null()),
        _ => Err(ExecutionError::new(format!(
            "no resolver for field {}.{}",
            info.object_type().name,
            info.field_name()
        ))
        .into()),
    }
}

/// Records an error at the path of a node and fails the node
pub(crate) fn field_error<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &mut NodeTree<'a>,
    id: NodeId,
    error: ExecutionError,
) {
    let path = tree.path(id);
    let location = tree.get(id).location();
    ctx.errors
        .push(error.into_field_error(path, location, &ctx.document.sources));
    tree.get_mut(id).result = NodeResult::Failed;
}

/// Records a resolver error.
///
/// Unhandled errors go through the unhandled error hook and are either recorded
/// as a generic error, or abort the execution.
pub(crate) fn handle_field_error<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &mut NodeTree<'a>,
    id: NodeId,
    error: FieldError,
) -> Result<(), ExecuteError> {
    let source = match error {
        FieldError::Execution(error) => {
            field_error(ctx, tree, id, error);
            return Ok(());
        }
        FieldError::Unhandled(source) => source,
    };
    let mut context = UnhandledErrorContext {
        error: source.clone(),
        message: format!("Error trying to resolve field '{}'.", tree.get(id).field_name()),
        path: tree.path(id),
        replacement: None,
    };
    if let Some(handler) = &ctx.unhandled_error_handler {
        handler(&mut context)
    }
    if let Some(replacement) = context.replacement {
        field_error(ctx, tree, id, replacement);
        return Ok(());
    }
    if ctx.options.throw_on_unhandled_error {
        return Err(ExecuteError::Unhandled {
            message: context.message,
            path: context.path,
            source,
        });
    }
    tracing::warn!(path = ?context.path, error = %source, "unhandled error while resolving a field");
    let mut error = ExecutionError::new(context.message);
    if ctx.options.expose_error_details {
        error = error.with_extension("details", source.to_string());
    }
    field_error(ctx, tree, id, error);
    Ok(())
}
