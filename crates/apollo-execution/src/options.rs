use serde::Deserialize;

/// Execution settings that can be loaded from a configuration file.
///
/// All fields are optional when deserializing:
///
/// ```
/// let options: apollo_execution::ExecutionOptions =
///     serde_json::from_str(r#"{ "enable_metrics": true, "max_concurrency": 8 }"#).unwrap();
/// assert!(options.enable_metrics);
/// assert!(!options.throw_on_unhandled_error);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionOptions {
    /// Abort the whole execution on an unhandled resolver error,
    /// instead of recording it as a field error.
    pub throw_on_unhandled_error: bool,

    /// Report per-field resolver timings under `extensions.metrics` of the response.
    pub enable_metrics: bool,

    /// Include the text of unhandled errors under `extensions.details` of response errors.
    pub expose_error_details: bool,

    /// Maximum number of fields registered as concurrent that are in flight at once.
    /// Unlimited if unset.
    pub max_concurrency: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options: ExecutionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ExecutionOptions::default());
        assert_eq!(options.max_concurrency, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = serde_json::from_str::<ExecutionOptions>(r#"{ "parallel": true }"#);
        assert!(result.is_err());
    }
}
