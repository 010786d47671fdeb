use crate::star_wars::document;
use crate::star_wars::execute;
use crate::star_wars::execute_with;
use crate::star_wars::schema;
use apollo_execution::ExecuteError;
use apollo_execution::Execution;
use apollo_execution::ExecutionError;
use apollo_execution::ExecutionOptions;
use apollo_execution::FieldError;
use apollo_execution::Resolved;
use apollo_execution::Resolvers;
use apollo_execution::ResponseDataPathSegment;
use expect_test::expect;
use serde_json_bytes::json;

fn database_down() -> Resolvers {
    Resolvers::new().field("Query", "hero", |_info| {
        Err(FieldError::unhandled(std::io::Error::other("database down")))
    })
}

#[tokio::test]
async fn unhandled_errors_are_masked() {
    let response = execute("{ hero { name } }", &database_down()).await;
    let expected = expect![[r#"
        {
          "errors": [
            {
              "message": "Error trying to resolve field 'hero'.",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "hero"
              ]
            }
          ],
          "data": {
            "hero": null
          }
        }"#]];
    expected.assert_eq(&response);
}

#[tokio::test]
async fn expose_error_details() {
    let options = ExecutionOptions {
        expose_error_details: true,
        ..Default::default()
    };
    let response = execute_with("{ hero { name } }", &database_down(), |execution| {
        execution.options(options)
    })
    .await;
    let expected = expect![[r#"
        {
          "errors": [
            {
              "message": "Error trying to resolve field 'hero'.",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "hero"
              ],
              "extensions": {
                "details": "database down"
              }
            }
          ],
          "data": {
            "hero": null
          }
        }"#]];
    expected.assert_eq(&response);
}

#[tokio::test]
async fn unhandled_error_handler() {
    let response = execute_with("{ hero { name } a }", &database_down(), |execution| {
        execution.unhandled_error_handler(|context| {
            assert_eq!(context.error.to_string(), "database down");
            assert_eq!(
                context.path,
                [ResponseDataPathSegment::Field(apollo_compiler::name!("hero"))]
            );
            context.replacement =
                Some(ExecutionError::new("hero is unavailable").with_code("UNAVAILABLE"));
        })
    })
    .await;
    let expected = expect![[r#"
        {
          "errors": [
            {
              "message": "hero is unavailable",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "hero"
              ],
              "extensions": {
                "code": "UNAVAILABLE"
              }
            }
          ],
          "data": {
            "hero": null,
            "a": null
          }
        }"#]];
    expected.assert_eq(&response);

    // Rewriting the message only
    let response = execute_with("{ hero { name } }", &database_down(), |execution| {
        execution.unhandled_error_handler(|context| {
            context.message = format!("{} (reported)", context.message);
        })
    })
    .await;
    assert!(response.contains(r#""message": "Error trying to resolve field 'hero'. (reported)""#));
}

#[tokio::test]
async fn throw_on_unhandled_error() {
    let schema = schema();
    let document = document(&schema, "{ a hero { name } }");
    let options = ExecutionOptions {
        throw_on_unhandled_error: true,
        ..Default::default()
    };
    let result = Execution::new(&schema, &document)
        .options(options)
        .execute(&database_down())
        .await;
    let Err(ExecuteError::Unhandled {
        message,
        path,
        source,
    }) = result
    else {
        panic!("expected an unhandled error")
    };
    assert_eq!(message, "Error trying to resolve field 'hero'.");
    assert_eq!(path.len(), 1);
    assert_eq!(source.to_string(), "database down");
}

#[tokio::test]
async fn panics_are_unhandled_errors() {
    let resolvers = Resolvers::new()
        .field("Query", "a", |_info| panic!("boom"))
        .field("Query", "b", |_info| {
            Ok(Resolved::future(async {
                let values: Vec<i32> = Vec::new();
                Ok(values[3])
            }))
        })
        .field("Query", "c", |_info| Ok(Resolved::value("still running")));
    let options = ExecutionOptions {
        expose_error_details: true,
        ..Default::default()
    };
    let response = execute_with("{ a b c }", &resolvers, |execution| {
        execution.options(options)
    })
    .await;
    let expected = expect![[r#"
        {
          "errors": [
            {
              "message": "Error trying to resolve field 'a'.",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "a"
              ],
              "extensions": {
                "details": "resolver panicked: boom"
              }
            },
            {
              "message": "Error trying to resolve field 'b'.",
              "locations": [
                {
                  "line": 1,
                  "column": 5
                }
              ],
              "path": [
                "b"
              ],
              "extensions": {
                "details": "resolver panicked: index out of bounds: the len is 0 but the index is 3"
              }
            }
          ],
          "data": {
            "a": null,
            "b": null,
            "c": "still running"
          }
        }"#]];
    expected.assert_eq(&response);
}

#[tokio::test]
async fn reported_errors_keep_the_value() {
    let resolvers = Resolvers::new().field("Query", "hero", |info| {
        info.report_error(ExecutionError::new("hero is deprecated").with_extension("since", 2024));
        assert_eq!(info.error_sink().len(), 1);
        Ok(Resolved::value(json!({"__typename": "Droid", "name": "R2-D2"})))
    });
    let response = execute("{ hero { name } }", &resolvers).await;
    let expected = expect![[r#"
        {
          "errors": [
            {
              "message": "hero is deprecated",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "hero"
              ],
              "extensions": {
                "since": 2024
              }
            }
          ],
          "data": {
            "hero": {
              "name": "R2-D2"
            }
          }
        }"#]];
    expected.assert_eq(&response);
}

#[tokio::test]
async fn deferred_value_errors() {
    struct Failing;

    impl apollo_execution::DeferredValue for Failing {
        fn complete(
            self: Box<Self>,
            _cancellation: apollo_execution::CancellationToken,
        ) -> futures::future::BoxFuture<'static, Result<Resolved, FieldError>> {
            Box::pin(async { Err::<Resolved, FieldError>(ExecutionError::new("batch failed").into()) })
        }
    }

    let resolvers = Resolvers::new()
        .field("Query", "a", |_info| Ok(Resolved::deferred(Failing)))
        .field("Query", "b", |_info| Ok(Resolved::value(2)));
    let response = execute("{ a b }", &resolvers).await;
    let expected = expect![[r#"
        {
          "errors": [
            {
              "message": "batch failed",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "a"
              ]
            }
          ],
          "data": {
            "a": null,
            "b": 2
          }
        }"#]];
    expected.assert_eq(&response);
}
