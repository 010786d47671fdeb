use apollo_compiler::executable::Operation;
use futures::future::BoxFuture;
use futures::FutureExt as _;
use std::any::Any;

/// Information about the execution passed to [`ExecutionListener`] hooks
pub struct ListenerInfo<'a> {
    pub(crate) operation: &'a Operation,
    pub(crate) context: &'a (dyn Any + Send + Sync),
}

/// Hooks invoked by the scheduler, for cross-cutting concerns such as batching or tracing.
///
/// Registering any listener changes how execution waits for pending fields:
/// instead of processing each field as soon as it completes,
/// every field in flight is awaited together after [`before_step_awaited`] is called,
/// so that hooks observe a consistent boundary between scheduling rounds.
///
/// [`before_step_awaited`]: ExecutionListener::before_step_awaited
pub trait ExecutionListener: Send + Sync {
    /// Called once before any field is resolved
    fn before_execution<'a>(&'a self, _info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()> {
        futures::future::ready(()).boxed()
    }

    /// Called once per scheduling round, before waiting on the fields in flight
    fn before_step_awaited<'a>(&'a self, info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()>;

    /// Called once after the last field is resolved, before the response is built
    fn after_execution<'a>(&'a self, _info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()> {
        futures::future::ready(()).boxed()
    }
}

impl<'a> ListenerInfo<'a> {
    /// The operation being executed
    pub fn operation(&self) -> &'a Operation {
        self.operation
    }

    /// The context value set with [`Execution::context`][crate::Execution::context],
    /// if it has type `T`
    pub fn context<T: Any>(&self) -> Option<&'a T> {
        self.context.downcast_ref()
    }
}
