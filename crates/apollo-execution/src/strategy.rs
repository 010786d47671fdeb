use crate::builder::complete_node;
use crate::error::ExecuteError;
use crate::execution::ExecutionContext;
use crate::listener::ExecutionListener;
use crate::listener::ListenerInfo;
use crate::metrics::FieldMetrics;
use crate::metrics::Metrics;
use crate::node::NodeId;
use crate::node::NodeResult;
use crate::node::NodeTree;
use crate::resolve::handle_field_error;
use crate::resolve::start_deferred;
use crate::resolve::start_node;
use crate::resolve::Completion;
use crate::resolve::Lane;
use crate::resolve::Outcome;
use apollo_compiler::executable::OperationType;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt as _;
use std::collections::VecDeque;
use std::sync::Arc;

/// Walks the node tree, starting resolvers as their parents complete.
///
/// Sequential fields run one at a time, from a stack so that the first field in
/// request order is popped first. Concurrent fields are all started as soon as possible.
/// Deferred values are held back until nothing else can make progress,
/// then completed together.
pub(crate) struct Scheduler<'ctx, 'a> {
    ctx: &'ctx ExecutionContext<'a>,
    listeners: &'ctx [Arc<dyn ExecutionListener>],
    tree: NodeTree<'a>,
    sync_stack: Vec<NodeId>,
    async_queue: VecDeque<NodeId>,
    deferred: Vec<NodeId>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    sync_in_flight: bool,
    concurrent_in_flight: usize,
    cancelled: bool,
    metrics: Option<Metrics>,
}

impl<'ctx, 'a> Scheduler<'ctx, 'a> {
    pub(crate) fn new(
        ctx: &'ctx ExecutionContext<'a>,
        listeners: &'ctx [Arc<dyn ExecutionListener>],
        tree: NodeTree<'a>,
    ) -> Self {
        Self {
            ctx,
            listeners,
            tree,
            sync_stack: Vec::new(),
            async_queue: VecDeque::new(),
            deferred: Vec::new(),
            in_flight: FuturesUnordered::new(),
            sync_in_flight: false,
            concurrent_in_flight: 0,
            cancelled: false,
            metrics: ctx.options.enable_metrics.then(Metrics::default),
        }
    }

    /// Runs until every node is settled, or execution is cancelled or aborted
    pub(crate) async fn run(mut self) -> Result<(NodeTree<'a>, Option<Metrics>), ExecuteError> {
        self.queue_runnable(NodeId::ROOT);
        let ctx = self.ctx;
        let listeners = self.listeners;
        let info = ListenerInfo {
            operation: ctx.operation,
            context: &*ctx.context,
        };
        loop {
            self.start_queued();
            if self.cancelled {
                tracing::debug!("execution cancelled");
                break;
            }
            if self.in_flight.is_empty() {
                // Nothing else can make progress
                if self.deferred.is_empty() {
                    break;
                }
                self.start_deferred();
                continue;
            }
            if listeners.is_empty() {
                if let Some(completion) = self.in_flight.next().await {
                    self.process(completion)?;
                }
            } else {
                for listener in listeners {
                    listener.before_step_awaited(&info).await;
                }
                let completions: Vec<Completion> =
                    std::mem::take(&mut self.in_flight).collect().await;
                for completion in completions {
                    self.process(completion)?;
                }
            }
        }
        if let Some(metrics) = &mut self.metrics {
            metrics.duration = ctx.started_at.elapsed();
        }
        Ok((self.tree, self.metrics))
    }

    fn start_queued(&mut self) {
        let max_concurrency = self.ctx.options.max_concurrency.map_or(usize::MAX, |max| max.max(1));
        while self.concurrent_in_flight < max_concurrency && !self.cancelled {
            let Some(id) = self.async_queue.pop_front() else {
                break;
            };
            self.start(id, Lane::Concurrent);
        }
        if !self.sync_in_flight && !self.cancelled {
            if let Some(id) = self.sync_stack.pop() {
                self.start(id, Lane::Sequential);
            }
        }
    }

    fn start(&mut self, id: NodeId, lane: Lane) {
        if self.ctx.cancellation.is_cancelled() {
            self.cancelled = true;
            return;
        }
        tracing::trace!(node = ?id, field = self.tree.get(id).field_name(), ?lane, "starting field");
        let future = start_node(self.ctx, &self.tree, id, lane);
        self.tree.get_mut(id).result = NodeResult::Pending;
        match lane {
            Lane::Sequential => self.sync_in_flight = true,
            Lane::Concurrent => self.concurrent_in_flight += 1,
            Lane::Deferred => {}
        }
        self.in_flight.push(future);
    }

    /// Completes every pending deferred value in one wave
    fn start_deferred(&mut self) {
        tracing::debug!(count = self.deferred.len(), "completing deferred values");
        for id in std::mem::take(&mut self.deferred) {
            if self.ctx.cancellation.is_cancelled() {
                self.cancelled = true;
                return;
            }
            let node = self.tree.get_mut(id);
            let NodeResult::Deferred(deferred) = std::mem::replace(&mut node.result, NodeResult::Pending)
            else {
                continue;
            };
            self.in_flight.push(start_deferred(self.ctx, id, deferred));
        }
    }

    fn process(&mut self, completion: Completion) -> Result<(), ExecuteError> {
        let Completion {
            id,
            lane,
            outcome,
            started_at,
        } = completion;
        match lane {
            Lane::Sequential => self.sync_in_flight = false,
            Lane::Concurrent => self.concurrent_in_flight -= 1,
            Lane::Deferred => {}
        }
        if let Some(metrics) = &mut self.metrics {
            let node = self.tree.get(id);
            let parent_type = node
                .parent
                .and_then(|parent| self.tree.object_type(parent))
                .map_or_else(String::new, |ty| ty.name.to_string());
            metrics.fields.push(FieldMetrics {
                path: self.tree.path(id),
                parent_type,
                field_name: node.field_name().to_owned(),
                start_offset: started_at.saturating_duration_since(self.ctx.started_at),
                duration: started_at.elapsed(),
            })
        }
        match outcome {
            Outcome::Ready(value) => {
                tracing::trace!(node = ?id, "field completed");
                complete_node(self.ctx, &mut self.tree, id, value);
                self.queue_runnable(id);
            }
            Outcome::Deferred(deferred) => {
                tracing::trace!(node = ?id, "field deferred");
                self.tree.get_mut(id).result = NodeResult::Deferred(deferred);
                self.deferred.push(id);
            }
            Outcome::Failed(error) => {
                tracing::trace!(node = ?id, "field failed");
                handle_field_error(self.ctx, &mut self.tree, id, error)?;
            }
            Outcome::Cancelled => self.cancelled = true,
        }
        Ok(())
    }

    /// Queues unresolved descendants of a just-completed node.
    ///
    /// Descendants completed along with it (list items, `__typename`) are walked through.
    pub(crate) fn queue_runnable(&mut self, id: NodeId) {
        let mut runnable = Vec::new();
        collect_unresolved(&self.tree, id, &mut runnable);
        let serial = id == NodeId::ROOT && self.ctx.operation.operation_type == OperationType::Mutation;
        let (concurrent, sequential): (Vec<_>, Vec<_>) = runnable
            .into_iter()
            .partition(|&child| !serial && self.is_concurrent(child));
        self.async_queue.extend(concurrent);
        // Reversed, so that the first field in request order is popped first
        self.sync_stack.extend(sequential.into_iter().rev());
    }

    fn is_concurrent(&self, id: NodeId) -> bool {
        let node = self.tree.get(id);
        node.parent
            .and_then(|parent| self.tree.object_type(parent))
            .is_some_and(|ty| self.ctx.resolvers.is_concurrent(&ty.name, node.field_name()))
    }
}

fn collect_unresolved(tree: &NodeTree<'_>, id: NodeId, runnable: &mut Vec<NodeId>) {
    tree.apply_to_children(id, false, |child| {
        if tree.get(child).is_unresolved() {
            runnable.push(child)
        } else {
            collect_unresolved(tree, child, runnable)
        }
    })
}
