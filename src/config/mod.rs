//! Build configuration derived from the staging environment
//!
//! The platform passes user configuration as environment variables. They are
//! read once at the start of a build into an explicit `BuildConfig` value;
//! nothing downstream reads the process environment on its own.

use std::collections::HashMap;

/// Defaults written to the runtime environment when the user left them unset
pub const ENVIRONMENT_DEFAULTS: &[(&str, &str)] = &[
    ("NODE_ENV", "production"),
    ("NPM_CONFIG_PRODUCTION", "true"),
    ("NPM_CONFIG_LOGLEVEL", "error"),
    ("NODE_MODULES_CACHE", "true"),
    ("NODE_VERBOSE", "false"),
    ("WEB_MEMORY", "512"),
    ("WEB_CONCURRENCY", "1"),
];

/// Configuration for one build
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// NODE_MODULES_CACHE != "false"
    pub node_modules_cache: bool,

    /// NPM_CONFIG_PRODUCTION == "true"
    pub npm_config_production: bool,

    /// NODE_VERBOSE == "true"
    pub node_verbose: bool,

    /// BP_DEBUG set to anything non-empty
    pub debug: bool,

    /// NODE_ENV, defaults to "production"
    pub node_env: String,

    /// CF_STACK, used to filter catalog entries
    pub stack: Option<String>,

    /// Full snapshot of the staging environment
    pub vars: HashMap<String, String>,
}

impl BuildConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build configuration from explicit key/value pairs
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let get = |key: &str| vars.get(key).map(String::as_str);

        Self {
            node_modules_cache: get("NODE_MODULES_CACHE") != Some("false"),
            npm_config_production: get("NPM_CONFIG_PRODUCTION") == Some("true"),
            node_verbose: get("NODE_VERBOSE") == Some("true"),
            debug: get("BP_DEBUG").is_some_and(|v| !v.is_empty()),
            node_env: get("NODE_ENV")
                .filter(|v| !v.is_empty())
                .unwrap_or("production")
                .to_string(),
            stack: get("CF_STACK")
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            vars,
        }
    }

    /// Look up a raw environment variable
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Environment defaults the user did not set themselves
    pub fn missing_defaults(&self) -> Vec<(&'static str, &'static str)> {
        ENVIRONMENT_DEFAULTS
            .iter()
            .filter(|(key, _)| self.var(key).map_or(true, str::is_empty))
            .copied()
            .collect()
    }

    /// This configuration with every unset default filled in
    ///
    /// The build's own package manager runs see the same environment the
    /// app will get at runtime.
    pub fn with_defaults(&self) -> Self {
        let mut vars = self.vars.clone();
        for (key, value) in self.missing_defaults() {
            vars.insert(key.to_string(), value.to_string());
        }
        Self::from_vars(vars)
    }

    /// `NPM_CONFIG_*`, `YARN_*` and `NODE_*` variables, sorted, as `KEY=value`
    pub fn node_config_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .vars
            .iter()
            .filter(|(k, _)| {
                k.starts_with("NPM_CONFIG_") || k.starts_with("YARN_") || k.starts_with("NODE_")
            })
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        lines.sort();
        lines
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::from_vars(std::iter::empty::<(String, String)>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_when_empty() {
        let config = BuildConfig::default();
        assert!(config.node_modules_cache);
        assert!(!config.npm_config_production);
        assert!(!config.node_verbose);
        assert!(!config.debug);
        assert_eq!(config.node_env, "production");
        assert!(config.stack.is_none());
    }

    #[test]
    fn cache_disabled_only_by_false() {
        let config = BuildConfig::from_vars([("NODE_MODULES_CACHE", "false")]);
        assert!(!config.node_modules_cache);

        let config = BuildConfig::from_vars([("NODE_MODULES_CACHE", "0")]);
        assert!(config.node_modules_cache);
    }

    #[test]
    fn missing_defaults_skip_user_values() {
        let config = BuildConfig::from_vars([("NODE_ENV", "development"), ("WEB_MEMORY", "")]);
        let missing = config.missing_defaults();

        assert!(!missing.iter().any(|(k, _)| *k == "NODE_ENV"));
        assert!(missing.contains(&("WEB_MEMORY", "512")));
        assert!(missing.contains(&("NODE_MODULES_CACHE", "true")));
    }

    #[test]
    fn with_defaults_keeps_user_values() {
        let config = BuildConfig::from_vars([("NODE_ENV", "staging"), ("PATH", "/bin")]);
        let staged = config.with_defaults();

        assert!(staged.npm_config_production);
        assert_eq!(staged.node_env, "staging");
        assert_eq!(staged.var("NPM_CONFIG_LOGLEVEL"), Some("error"));
        assert_eq!(staged.var("PATH"), Some("/bin"));
        assert!(staged.missing_defaults().is_empty());
    }

    #[test]
    fn node_config_lines_filtered_and_sorted() {
        let config = BuildConfig::from_vars([
            ("PATH", "/bin"),
            ("NODE_ENV", "production"),
            ("NPM_CONFIG_LOGLEVEL", "error"),
            ("YARN_CACHE", "x"),
        ]);

        assert_eq!(
            config.node_config_lines(),
            vec![
                "NODE_ENV=production",
                "NPM_CONFIG_LOGLEVEL=error",
                "YARN_CACHE=x"
            ]
        );
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        std::env::set_var("NPM_CONFIG_PRODUCTION", "true");
        let config = BuildConfig::from_env();
        std::env::remove_var("NPM_CONFIG_PRODUCTION");

        assert!(config.npm_config_production);
    }
}
