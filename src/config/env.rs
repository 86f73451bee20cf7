use std::env;

/// Environment variable access.
pub struct EnvConfig;

impl EnvConfig {
    /// Reads `key`; a blank value counts as unset.
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// Expands a `${VAR_NAME}` reference.
    ///
    /// The referenced name is looked up through `lookup` first, then in the
    /// process environment. Values that are not references pass through.
    pub fn expand_reference<F>(raw: String, lookup: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        match raw.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
            Some(var) => lookup(var).or_else(|| Self::get_env_optional(var)),
            None => Some(raw),
        }
    }

    /// `SALESFLOW_DEBUG` is set.
    pub fn is_debug_mode() -> bool {
        env::var("SALESFLOW_DEBUG").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_lookup(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn plain_value_is_kept() {
        let value = EnvConfig::expand_reference("sk-live-value".to_string(), &no_lookup);
        assert_eq!(value.as_deref(), Some("sk-live-value"));
    }

    #[test]
    fn reference_prefers_lookup() {
        let lookup = |key: &str| (key == "TEAM_KEY").then(|| "from-lookup".to_string());
        let value = EnvConfig::expand_reference("${TEAM_KEY}".to_string(), &lookup);
        assert_eq!(value.as_deref(), Some("from-lookup"));
    }

    #[test]
    fn reference_falls_back_to_process_env() {
        env::set_var("SALESFLOW_TEST_KEY_REF", "from-env");
        let value = EnvConfig::expand_reference("${SALESFLOW_TEST_KEY_REF}".to_string(), &no_lookup);
        assert_eq!(value.as_deref(), Some("from-env"));
        env::remove_var("SALESFLOW_TEST_KEY_REF");

        let missing = EnvConfig::expand_reference("${SALESFLOW_TEST_UNSET_REF}".to_string(), &no_lookup);
        assert!(missing.is_none());
    }
}
