use crate::star_wars::execute;
use crate::star_wars::execute_with;
use apollo_execution::DataLoader;
use apollo_execution::Dispatch;
use apollo_execution::DispatchListener;
use apollo_execution::ExecutionListener;
use apollo_execution::FieldError;
use apollo_execution::JsonValue;
use apollo_execution::ListenerInfo;
use apollo_execution::Loader;
use apollo_execution::Resolved;
use apollo_execution::Resolvers;
use expect_test::expect;
use futures::future::BoxFuture;
use futures::FutureExt as _;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Droids by id, recording the keys of every batch
#[derive(Default)]
struct Droids {
    batches: Mutex<Vec<Vec<String>>>,
}

impl Loader<String> for Droids {
    type Value = JsonValue;

    fn load<'a>(
        &'a self,
        keys: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, JsonValue>, FieldError>> {
        self.batches.lock().push(keys.to_vec());
        async move {
            let mut droids = HashMap::new();
            for key in keys {
                let name = match key.as_str() {
                    "2000" => "C-3PO",
                    "2001" => "R2-D2",
                    _ => continue,
                };
                droids.insert(key.clone(), json!({"name": name}));
            }
            Ok(droids)
        }
        .boxed()
    }
}

fn droid_resolvers(loader: &DataLoader<String, SharedDroids>, concurrent: bool) -> Resolvers {
    let loader = loader.clone();
    let resolver = move |info: &apollo_execution::ResolveInfo<'_>| {
        let id = info
            .argument("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_owned();
        Ok::<_, FieldError>(loader.load(id))
    };
    if concurrent {
        Resolvers::new().concurrent_field("Query", "droid", resolver)
    } else {
        Resolvers::new().field("Query", "droid", resolver)
    }
}

const QUERY: &str = r#"{
  first: droid(id: "2000") { name }
  second: droid(id: "2001") { name }
  missing: droid(id: "0") { name }
  again: droid(id: "2000") { name }
}"#;

#[tokio::test]
async fn sibling_loads_are_batched() {
    let droids = Arc::new(Droids::default());
    let loader = DataLoader::new(SharedDroids(droids.clone()));
    let response = execute(QUERY, &droid_resolvers(&loader, false)).await;
    let expected = expect![[r#"
        {
          "data": {
            "first": {
              "name": "C-3PO"
            },
            "second": {
              "name": "R2-D2"
            },
            "missing": null,
            "again": {
              "name": "C-3PO"
            }
          }
        }"#]];
    expected.assert_eq(&response);
    assert_eq!(*droids.batches.lock(), [["2000", "2001", "0"]]);

    // Cached for the lifetime of the loader
    execute(r#"{ droid(id: "2001") { name } }"#, &droid_resolvers(&loader, false)).await;
    assert_eq!(droids.batches.lock().len(), 1);
}

#[tokio::test]
async fn deferred_loads_wait_for_slower_fields() {
    let droids = Arc::new(Droids::default());
    let loader = DataLoader::new(SharedDroids(droids.clone()));
    let batches = droids.clone();
    let slow = Resolvers::new().concurrent_field("Query", "a", move |_info| {
        let batches = batches.clone();
        Ok(Resolved::future(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            // Deferred siblings have not been fetched yet
            assert!(batches.batches.lock().is_empty());
            Ok(1)
        }))
    });
    let resolvers = droid_resolvers(&loader, false).merge(slow);
    let query = r#"{
      a
      first: droid(id: "2000") { name }
      second: droid(id: "2001") { name }
    }"#;
    let response = execute(query, &resolvers).await;
    let expected = expect![[r#"
        {
          "data": {
            "a": 1,
            "first": {
              "name": "C-3PO"
            },
            "second": {
              "name": "R2-D2"
            }
          }
        }"#]];
    expected.assert_eq(&response);
    assert_eq!(*droids.batches.lock(), [["2000", "2001"]]);
}

/// Keeps a handle on the loader so that tests can inspect its batches
struct SharedDroids(Arc<Droids>);

impl Loader<String> for SharedDroids {
    type Value = JsonValue;

    fn load<'a>(
        &'a self,
        keys: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, JsonValue>, FieldError>> {
        self.0.load(keys)
    }
}

#[derive(Default)]
struct Counting {
    before_execution: AtomicUsize,
    steps: AtomicUsize,
    after_execution: AtomicUsize,
}

impl ExecutionListener for Counting {
    fn before_execution<'a>(&'a self, _info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()> {
        self.before_execution.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(()).boxed()
    }

    fn before_step_awaited<'a>(&'a self, info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()> {
        assert_eq!(info.context::<&str>(), Some(&"request context"));
        self.steps.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(()).boxed()
    }

    fn after_execution<'a>(&'a self, _info: &'a ListenerInfo<'a>) -> BoxFuture<'a, ()> {
        self.after_execution.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(()).boxed()
    }
}

#[tokio::test]
async fn dispatch_listener() {
    let droids = Arc::new(Droids::default());
    let loader = DataLoader::new(SharedDroids(droids.clone()));
    let counting = Arc::new(Counting::default());
    let dispatch = Arc::new(DispatchListener::new([
        Arc::new(loader.clone()) as Arc<dyn Dispatch>
    ]));
    let response = execute_with(QUERY, &droid_resolvers(&loader, true), |execution| {
        execution
            .context("request context")
            .listener(dispatch)
            .listener(counting.clone())
    })
    .await;
    let expected = expect![[r#"
        {
          "data": {
            "first": {
              "name": "C-3PO"
            },
            "second": {
              "name": "R2-D2"
            },
            "missing": null,
            "again": {
              "name": "C-3PO"
            }
          }
        }"#]];
    expected.assert_eq(&response);
    assert_eq!(*droids.batches.lock(), [["2000", "2001", "0"]]);
    assert_eq!(loader.queued(), 0);
    assert_eq!(counting.before_execution.load(Ordering::SeqCst), 1);
    assert_eq!(counting.after_execution.load(Ordering::SeqCst), 1);
    assert!(counting.steps.load(Ordering::SeqCst) >= 2);
}
