use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_execution::Execution;
use apollo_execution::Resolved;
use apollo_execution::Resolvers;
use serde_json_bytes::json;

fn main() {
    let sdl = r#"
        type Query {
            hero: Character
        }

        type Character {
            name: String
            friends: [Character]
        }
    "#;
    let schema = Schema::parse_and_validate(sdl, "schema.graphql").unwrap();
    let query = "{ hero { name friends { name } } }";
    let document = ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();

    // Fields without a resolver read the same-named key of a JSON parent
    let resolvers = Resolvers::new().field("Query", "hero", |_info| {
        Ok(Resolved::value(json!({
            "name": "R2-D2",
            "friends": [{"name": "Luke Skywalker"}, {"name": "Leia Organa"}],
        })))
    });

    let execution = Execution::new(&schema, &document);
    let response = futures::executor::block_on(execution.execute(&resolvers)).unwrap();
    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"data":{"hero":{"name":"R2-D2","friends":[{"name":"Luke Skywalker"},{"name":"Leia Organa"}]}}}"#
    );
}
