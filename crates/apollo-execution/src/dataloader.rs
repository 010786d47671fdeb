use crate::error::FieldError;
use crate::listener::ExecutionListener;
use crate::listener::ListenerInfo;
use crate::value::DeferredValue;
use crate::value::FieldValue;
use crate::value::Resolved;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::FutureExt as _;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetches values for many keys at once
pub trait Loader<K>: Send + Sync + 'static {
    type Value: Clone + Into<FieldValue> + Send + Sync + 'static;

    /// Keys missing from the returned map resolve to null
    fn load<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, Result<HashMap<K, Self::Value>, FieldError>>;
}

/// Something that starts fetching what it has queued so far
pub trait Dispatch: Send + Sync {
    fn dispatch(&self);
}

/// Batches and caches loads of the same [`Loader`] within an execution.
///
/// [`load`][Self::load] returns a [deferred value][Resolved::Deferred]:
/// keys requested by fields that resolve in the same scheduling round
/// are fetched by a single [`Loader::load`] call.
///
/// Values are cached for the lifetime of the `DataLoader`, usually one request.
pub struct DataLoader<K, L: Loader<K>> {
    inner: Arc<Inner<K, L>>,
}

struct Inner<K, L: Loader<K>> {
    loader: Arc<L>,
    state: Mutex<State<K, L::Value>>,
}

type Batch<K, V> = Shared<BoxFuture<'static, Result<Arc<HashMap<K, V>>, FieldError>>>;

struct State<K, V> {
    /// Requested but not dispatched, in request order
    queued: IndexSet<K>,
    in_flight: HashMap<K, Batch<K, V>>,
    cache: HashMap<K, V>,
}

/// Calls [`Dispatch::dispatch`] on every scheduling round.
///
/// Registered as an [`ExecutionListener`], batches start as soon as
/// every field of a round has been started, instead of waiting for
/// every other field to be resolved.
pub struct DispatchListener {
    loaders: Vec<Arc<dyn Dispatch>>,
}

struct Load<K, L: Loader<K>> {
    inner: Arc<Inner<K, L>>,
    key: K,
}

impl<K, L> DataLoader<K, L>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Loader<K>,
{
    pub fn new(loader: L) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader: Arc::new(loader),
                state: Mutex::new(State {
                    queued: IndexSet::new(),
                    in_flight: HashMap::new(),
                    cache: HashMap::new(),
                }),
            }),
        }
    }

    /// Returns the cached value for `key`, or queues it for the next batch
    pub fn load(&self, key: K) -> Resolved {
        let mut state = self.inner.state.lock();
        if let Some(value) = state.cache.get(&key) {
            return Resolved::value(value.clone());
        }
        if !state.in_flight.contains_key(&key) {
            state.queued.insert(key.clone());
        }
        Resolved::deferred(Load {
            inner: self.inner.clone(),
            key,
        })
    }

    /// Number of keys waiting for the next batch
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queued.len()
    }
}

impl<K, L> Inner<K, L>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Loader<K>,
{
    /// Starts a batch with every queued key
    fn dispatch(&self, state: &mut State<K, L::Value>) {
        if state.queued.is_empty() {
            return;
        }
        let keys: Vec<K> = state.queued.drain(..).collect();
        tracing::debug!(keys = keys.len(), "dispatching batch");
        let loader = self.loader.clone();
        let batch_keys = keys.clone();
        let batch: Batch<K, L::Value> = async move {
            let values = loader.load(&batch_keys).await?;
            Ok(Arc::new(values))
        }
        .boxed()
        .shared();
        for key in keys {
            state.in_flight.insert(key, batch.clone());
        }
    }

    /// The batch that fetches `key`, dispatching queued keys if needed
    fn batch(&self, key: &K) -> Option<Batch<K, L::Value>> {
        let mut state = self.state.lock();
        if !state.in_flight.contains_key(key) {
            self.dispatch(&mut state);
        }
        state.in_flight.get(key).cloned()
    }

    /// Forgets a failed batch, so that the next load of `key` queues it again
    fn abandon(&self, key: &K, batch: &Batch<K, L::Value>) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(key)
            .is_some_and(|current| current.ptr_eq(batch))
        {
            state.in_flight.remove(key);
        }
    }

    fn complete(&self, key: &K, values: &HashMap<K, L::Value>) -> Option<L::Value> {
        let value = values.get(key).cloned();
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if let Some(value) = &value {
            state.cache.insert(key.clone(), value.clone());
        }
        value
    }
}

impl<K, L> DeferredValue for Load<K, L>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Loader<K>,
{
    fn complete(
        self: Box<Self>,
        _cancellation: CancellationToken,
    ) -> BoxFuture<'static, Result<Resolved, FieldError>> {
        let cached = self.inner.state.lock().cache.get(&self.key).cloned();
        if let Some(value) = cached {
            return futures::future::ready(Ok(Resolved::value(value))).boxed();
        }
        let batch = self.inner.batch(&self.key);
        async move {
            let Some(batch) = batch else {
                return Ok(Resolved::null());
            };
            let values = match batch.clone().await {
                Ok(values) => values,
                Err(error) => {
                    self.inner.abandon(&self.key, &batch);
                    return Err(error);
                }
            };
            Ok::<_, FieldError>(self
                .inner
                .complete(&self.key, &values)
                .map_or_else(Resolved::null, Resolved::value))
        }
        .boxed()
    }
}

impl<K, L> Dispatch for DataLoader<K, L>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    L: Loader<K>,
{
    fn dispatch(&self) {
        let mut state = self.inner.state.lock();
        self.inner.dispatch(&mut state)
    }
}

impl<K, L: Loader<K>> Clone for DataLoader<K, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl DispatchListener {
    pub fn new(loaders: impl IntoIterator<Item = Arc<dyn Dispatch>>) -> Self {
        Self {
            loaders: loaders.into_iter().collect(),
        }
    }
}

impl ExecutionListener for DispatchListener {
    fn before_step_awaited<'a>(&'a self, _info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()> {
        for loader in &self.loaders {
            loader.dispatch()
        }
        futures::future::ready(()).boxed()
    }
}
