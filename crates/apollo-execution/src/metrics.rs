use crate::JsonMap;
use crate::JsonValue;
use crate::ResponseDataPathSegment;
use std::time::Duration;

/// Resolver timings of one execution,
/// reported under `extensions.metrics` when enabled in [`ExecutionOptions`][crate::ExecutionOptions]
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Total execution duration
    pub duration: Duration,
    pub fields: Vec<FieldMetrics>,
}

/// Timing of one field resolution
#[derive(Debug, Clone)]
pub struct FieldMetrics {
    pub path: Vec<ResponseDataPathSegment>,
    pub parent_type: String,
    pub field_name: String,
    /// Time elapsed between the start of execution and the resolver call
    pub start_offset: Duration,
    /// Time until the resolved value was available, including any awaited future
    pub duration: Duration,
}

impl Metrics {
    /// The `extensions.metrics` response entry. Durations are in nanoseconds.
    pub fn to_json(&self) -> JsonValue {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let path: Vec<JsonValue> = field
                    .path
                    .iter()
                    .map(|segment| match segment {
                        ResponseDataPathSegment::Field(name) => name.as_str().into(),
                        ResponseDataPathSegment::ListIndex(index) => (*index).into(),
                    })
                    .collect();
                let mut map = JsonMap::new();
                map.insert("path", path.into());
                map.insert("parentType", field.parent_type.as_str().into());
                map.insert("fieldName", field.field_name.as_str().into());
                map.insert("startOffset", nanos(field.start_offset));
                map.insert("duration", nanos(field.duration));
                JsonValue::Object(map)
            })
            .collect();
        let mut map = JsonMap::new();
        map.insert("duration", nanos(self.duration));
        map.insert("fields", JsonValue::Array(fields));
        JsonValue::Object(map)
    }
}

fn nanos(duration: Duration) -> JsonValue {
    u64::try_from(duration.as_nanos())
        .unwrap_or(u64::MAX)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json_bytes::json;

    #[test]
    fn json_representation() {
        let metrics = Metrics {
            duration: Duration::from_micros(5),
            fields: vec![FieldMetrics {
                path: vec![
                    ResponseDataPathSegment::Field(apollo_compiler::name!("hero")),
                    ResponseDataPathSegment::ListIndex(2),
                ],
                parent_type: "Query".into(),
                field_name: "hero".into(),
                start_offset: Duration::from_nanos(10),
                duration: Duration::from_nanos(300),
            }],
        };
        assert_eq!(
            metrics.to_json(),
            json!({
                "duration": 5000,
                "fields": [{
                    "path": ["hero", 2],
                    "parentType": "Query",
                    "fieldName": "hero",
                    "startOffset": 10,
                    "duration": 300,
                }],
            })
        );
    }
}
