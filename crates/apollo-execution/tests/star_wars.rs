use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_execution::Execution;
use apollo_execution::ResolveInfo;
use apollo_execution::Resolvers;

pub(crate) const SCHEMA: &str = r#"
    type Query {
        hero: Character
        requiredHero: Character!
        droid(id: ID!): Droid
        search(text: String!): [SearchResult!]
        numbers: [Int!]
        episode: Episode
        a: Int
        b: Int
        c: String
    }

    type Mutation {
        push(value: Int!): [Int!]!
    }

    type Subscription {
        ticks(count: Int!): Int!
    }

    enum Episode {
        NEWHOPE
        EMPIRE
        JEDI
    }

    interface Character {
        id: ID!
        name: String
        friends: [Character]
    }

    type Human implements Character {
        id: ID!
        name: String
        friends: [Character]
        height: Float
    }

    type Droid implements Character {
        id: ID!
        name: String
        friends: [Character]
        primaryFunction: String
    }

    union SearchResult = Human | Droid
"#;

pub(crate) fn schema() -> Valid<Schema> {
    Schema::parse_and_validate(SCHEMA, "schema.graphql").unwrap()
}

pub(crate) fn document(schema: &Valid<Schema>, query: &str) -> Valid<ExecutableDocument> {
    ExecutableDocument::parse_and_validate(schema, query, "query.graphql").unwrap()
}

/// Executes `query` and returns the response as pretty JSON
pub(crate) async fn execute(query: &str, resolvers: &Resolvers) -> String {
    execute_with(query, resolvers, |execution| execution).await
}

pub(crate) async fn execute_with(
    query: &str,
    resolvers: &Resolvers,
    configure: impl FnOnce(Execution<'_>) -> Execution<'_>,
) -> String {
    let schema = schema();
    let document = document(&schema, query);
    let execution = configure(Execution::new(&schema, &document));
    let response = execution.execute(resolvers).await.unwrap();
    serde_json::to_string_pretty(&response).unwrap()
}

/// A string key of a JSON parent value
pub(crate) fn source_str<'a>(info: &ResolveInfo<'a>, key: &str) -> Option<&'a str> {
    info.source()
        .as_json()?
        .as_object()?
        .get(key)?
        .as_str()
}
