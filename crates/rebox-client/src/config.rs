//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration against a local store.

use std::path::PathBuf;

use directories::ProjectDirs;
use rebox_shared::constants::DEFAULT_REALTIME_CAPACITY;
use rebox_shared::Backend;

/// File name accepted by the `*_FILE` variables to keep a store in memory.
pub const IN_MEMORY: &str = ":memory:";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ReboxConfig {
    /// Which persistence backend to open.
    /// Env: `REBOX_BACKEND` (`local` | `remote`)
    /// Default: `local`
    pub backend: Backend,

    /// Directory holding the store files.
    /// Env: `REBOX_DATA_DIR`
    /// Default: the platform data directory, or `./rebox-data`.
    pub data_dir: PathBuf,

    /// JSON file of the local store, or `:memory:`.
    /// Env: `REBOX_LOCAL_STORE_FILE`
    /// Default: `<data_dir>/rebox.json`
    pub local_store_file: Option<String>,

    /// SQLite file of the remote backend, or `:memory:`.
    /// Env: `REBOX_DATABASE_FILE`
    /// Default: `<data_dir>/rebox.db`
    pub database_file: Option<String>,

    /// Capacity of the insert broadcast channel.
    /// Env: `REBOX_REALTIME_CAPACITY`
    pub realtime_capacity: usize,

    /// Endpoint that exchanges an OAuth code for a user profile.
    /// Env: `REBOX_OAUTH_EXCHANGE_URL`
    /// Default: unset (provider sign-in disabled).
    pub oauth_exchange_url: Option<String>,

    /// Insert demo users and items into an empty store on startup.
    /// Env: `REBOX_SEED_DEMO` (true/false)
    /// Default: `false`
    pub seed_demo: bool,
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "rebox", "rebox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./rebox-data"))
}

impl Default for ReboxConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            data_dir: default_data_dir(),
            local_store_file: None,
            database_file: None,
            realtime_capacity: DEFAULT_REALTIME_CAPACITY,
            oauth_exchange_url: None,
            seed_demo: false,
        }
    }
}

impl ReboxConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ReboxConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("REBOX_BACKEND") {
            match val.parse::<Backend>() {
                Ok(backend) => config.backend = backend,
                Err(e) => {
                    tracing::warn!(value = %val, error = %e, "Invalid REBOX_BACKEND, using default");
                }
            }
        }

        if let Some(dir) = lookup("REBOX_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(file) = lookup("REBOX_LOCAL_STORE_FILE").filter(|f| !f.is_empty()) {
            config.local_store_file = Some(file);
        }

        if let Some(file) = lookup("REBOX_DATABASE_FILE").filter(|f| !f.is_empty()) {
            config.database_file = Some(file);
        }

        if let Some(val) = lookup("REBOX_REALTIME_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.realtime_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid REBOX_REALTIME_CAPACITY, using default"),
            }
        }

        if let Some(url) = lookup("REBOX_OAUTH_EXCHANGE_URL").filter(|u| !u.is_empty()) {
            config.oauth_exchange_url = Some(url);
        }

        if let Some(val) = lookup("REBOX_SEED_DEMO") {
            config.seed_demo = val == "true" || val == "1";
        }

        config
    }

    /// Where the local store lives; `None` keeps it in memory.
    pub fn local_store_path(&self) -> Option<PathBuf> {
        resolve(&self.data_dir, self.local_store_file.as_deref(), "rebox.json")
    }

    /// Where the database lives; `None` keeps it in memory.
    pub fn database_path(&self) -> Option<PathBuf> {
        resolve(&self.data_dir, self.database_file.as_deref(), "rebox.db")
    }
}

fn resolve(data_dir: &std::path::Path, file: Option<&str>, default: &str) -> Option<PathBuf> {
    match file {
        Some(IN_MEMORY) => None,
        Some(file) => Some(data_dir.join(file)),
        None => Some(data_dir.join(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ReboxConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReboxConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.realtime_capacity, DEFAULT_REALTIME_CAPACITY);
        assert!(!config.seed_demo);
        assert!(config.oauth_exchange_url.is_none());
        assert_eq!(
            config.local_store_path(),
            Some(config.data_dir.join("rebox.json"))
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REBOX_BACKEND", "remote"),
            ("REBOX_DATA_DIR", "/tmp/rebox"),
            ("REBOX_DATABASE_FILE", "main.db"),
            ("REBOX_REALTIME_CAPACITY", "16"),
            ("REBOX_OAUTH_EXCHANGE_URL", "https://auth.example.com/exchange"),
            ("REBOX_SEED_DEMO", "1"),
        ]);
        assert_eq!(config.backend, Backend::Remote);
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/rebox/main.db")));
        assert_eq!(config.realtime_capacity, 16);
        assert!(config.seed_demo);
        assert_eq!(
            config.oauth_exchange_url.as_deref(),
            Some("https://auth.example.com/exchange")
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("REBOX_BACKEND", "cloud"),
            ("REBOX_REALTIME_CAPACITY", "0"),
            ("REBOX_SEED_DEMO", "yes please"),
        ]);
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.realtime_capacity, DEFAULT_REALTIME_CAPACITY);
        assert!(!config.seed_demo);
    }

    #[test]
    fn test_in_memory_stores() {
        let config = config_from(&[
            ("REBOX_LOCAL_STORE_FILE", ":memory:"),
            ("REBOX_DATABASE_FILE", ":memory:"),
        ]);
        assert_eq!(config.local_store_path(), None);
        assert_eq!(config.database_path(), None);
    }
}
