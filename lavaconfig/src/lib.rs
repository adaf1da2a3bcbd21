//! # Spotilava Configuration Module
//!
//! Configuration of the gateway, as a YAML tree:
//! - embedded defaults (`spotilava.yaml`) merged with the user's `config.yaml`
//! - `SPOTILAVA_CONFIG__SECTION__KEY=value` environment overrides
//! - case-insensitive keys
//! - a validated streaming window (`streaming.chunk_size`)
//!
//! ## Usage
//!
//! ```no_run
//! use lavaconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let chunk_size = config.get_chunk_size()?;
//!
//! config.set_chunk_size(8192)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, bail, Context, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

pub mod secrets;

const DEFAULT_CONFIG: &str = include_str!("spotilava.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Spotilava configuration"));
}

const ENV_CONFIG_DIR: &str = "SPOTILAVA_CONFIG";
const ENV_PREFIX: &str = "SPOTILAVA_CONFIG__";
const CONFIG_DIR_NAME: &str = ".spotilava";
const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_HTTP_PORT: u16 = 37784;
const DEFAULT_BASE_URL: &str = "localhost";
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Smallest accepted streaming window, in bytes.
pub const MIN_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_CHUNK_SIZE: usize = MIN_CHUNK_SIZE;

const CHUNK_SIZE_PATH: &[&str] = &["streaming", "chunk_size"];
const HTTP_PORT_PATH: &[&str] = &["host", "http_port"];

/// Configuration of the gateway
///
/// The YAML tree is kept in memory behind a mutex. When the configuration
/// was loaded from a directory, every setter writes the tree back to
/// `config.yaml`; an in-memory configuration (see [`Config::from_yaml_str`])
/// never touches the disk.
#[derive(Debug)]
pub struct Config {
    config_dir: Option<String>,
    file: Option<PathBuf>,
    tree: Mutex<Value>,
}

/// Checks that a streaming window size can be used by the sniffer and the injector.
///
/// The window must hold at least [`MIN_CHUNK_SIZE`] bytes and be a multiple of 8.
pub fn validate_chunk_size(size: usize) -> Result<usize> {
    if size < MIN_CHUNK_SIZE {
        bail!(
            "chunk size {} is too small, it must be at least {} bytes",
            size,
            MIN_CHUNK_SIZE
        );
    }
    if size % 8 != 0 {
        bail!("chunk size {} must be a multiple of 8", size);
    }
    Ok(size)
}

/// Configuration directory: explicit argument, `SPOTILAVA_CONFIG`, then
/// `.spotilava` in the working directory or in the home directory
fn locate_config_dir(directory: &str) -> PathBuf {
    if !directory.is_empty() {
        return PathBuf::from(directory);
    }
    if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
        info!(env_var = ENV_CONFIG_DIR, path = %from_env, "Config directory set by environment");
        return PathBuf::from(from_env);
    }
    let local = PathBuf::from(CONFIG_DIR_NAME);
    let in_home = home_dir().map(|home| home.join(CONFIG_DIR_NAME));
    match in_home {
        Some(home) if !local.exists() && home.exists() => home,
        _ => local,
    }
}

/// Creates the directory if needed and checks that it is writable
fn prepare_config_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create config directory {}", dir.display()))?;
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let marker = dir.join(".write_check");
    fs::write(&marker, b"")
        .with_context(|| format!("config directory {} is not writable", dir.display()))?;
    fs::remove_file(&marker)?;
    Ok(())
}

impl Config {
    /// Loads the configuration from `directory` (or the default location when empty)
    ///
    /// The embedded defaults are merged with `config.yaml` when it exists,
    /// environment overrides are applied, and the merged tree is validated
    /// then written back so the user sees every available key.
    pub fn load_config(directory: &str) -> Result<Self> {
        let dir = locate_config_dir(directory);
        prepare_config_dir(&dir)?;
        let file = dir.join(CONFIG_FILE_NAME);
        info!(config_dir = %dir.display(), "Using config directory");

        let user = if file.exists() {
            let raw = fs::read(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            info!(config_file = %file.display(), "Loaded config file");
            Some(serde_yaml::from_slice::<Value>(&raw)?)
        } else {
            info!(config_file = %file.display(), "No config file, using embedded defaults");
            None
        };

        let mut tree = defaults_with(user.as_ref())?;
        apply_env_overrides(&mut tree);

        let config = Config {
            config_dir: Some(dir.to_string_lossy().into_owned()),
            file: Some(file),
            tree: Mutex::new(tree),
        };
        config.validate()?;
        config.persist()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML document
    ///
    /// The document is merged over the embedded defaults exactly like a
    /// `config.yaml` file would be, but environment overrides are ignored
    /// and nothing is ever written to disk.
    ///
    /// ```
    /// let config = lavaconfig::Config::from_yaml_str("streaming:\n  chunk_size: 8192\n")?;
    /// assert_eq!(config.get_chunk_size()?, 8192);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let user: Value = serde_yaml::from_str(yaml)?;
        let config = Config {
            config_dir: None,
            file: None,
            tree: Mutex::new(defaults_with(Some(&user))?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_chunk_size(self.raw_chunk_size()?).map(|_| ())
    }

    /// Returns the directory the configuration was loaded from, if any
    pub fn directory(&self) -> Option<&str> {
        self.config_dir.as_deref()
    }

    fn tree(&self) -> MutexGuard<'_, Value> {
        // A panic while holding the lock leaves a tree that is still well formed.
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self) -> Result<()> {
        if let Some(file) = &self.file {
            let yaml = serde_yaml::to_string(&*self.tree())?;
            fs::write(file, yaml).with_context(|| format!("cannot write {}", file.display()))?;
        }
        Ok(())
    }

    /// Sets the value at `path` (e.g. `&["host", "http_port"]`), creating
    /// intermediate sections, then persists the tree
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        insert_at(&mut self.tree(), path, value)?;
        self.persist()
    }

    /// Gets the value at `path`; a missing key is an error
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let tree = self.tree();
        let mut node = &*tree;
        for (depth, key) in path.iter().enumerate() {
            node = node
                .as_mapping()
                .ok_or_else(|| anyhow!("{} is not a section", path[..depth].join(".")))?
                .get(key.to_lowercase().as_str())
                .ok_or_else(|| anyhow!("Path {} does not exist", path[..=depth].join(".")))?;
        }
        Ok(node.clone())
    }

    /// Gets a string value, treating a missing path, a null or an empty string as absent
    pub fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Ok(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Gets the base URL advertised by the HTTP server
    pub fn get_base_url(&self) -> String {
        self.get_string(&["host", "base_url"])
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Gets the HTTP port, falling back to 37784 when absent or invalid
    pub fn get_http_port(&self) -> u16 {
        let port = match self.get_value(HTTP_PORT_PATH) {
            Ok(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Ok(Value::String(s)) => s.trim().parse().ok(),
            _ => return DEFAULT_HTTP_PORT,
        };
        port.unwrap_or_else(|| {
            warn!(default = DEFAULT_HTTP_PORT, "Invalid HTTP port in configuration, using default");
            DEFAULT_HTTP_PORT
        })
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(HTTP_PORT_PATH, Value::Number(Number::from(port)))
    }

    fn raw_chunk_size(&self) -> Result<usize> {
        match self.get_value(CHUNK_SIZE_PATH) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| anyhow!("chunk size {} is not a positive integer", n)),
            Ok(Value::String(s)) => s
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("chunk size '{}' is not a positive integer", s)),
            Ok(Value::Null) | Err(_) => Ok(DEFAULT_CHUNK_SIZE),
            Ok(other) => Err(anyhow!("chunk size has an invalid type: {:?}", other)),
        }
    }

    /// Gets the streaming window size (bytes read before sniffing, and relay chunk size)
    pub fn get_chunk_size(&self) -> Result<usize> {
        validate_chunk_size(self.raw_chunk_size()?)
    }

    /// Sets the streaming window size, rejecting values the pipeline cannot use
    pub fn set_chunk_size(&self, size: usize) -> Result<()> {
        validate_chunk_size(size)?;
        self.set_value(CHUNK_SIZE_PATH, Value::Number(Number::from(size)))
    }

    /// Number of log entries kept in memory for `/log-dump` and `/log-sse`
    pub fn get_log_cache_size(&self) -> Result<usize> {
        Ok(match self.get_value(&["host", "logger", "buffer_capacity"])? {
            Value::Number(n) => n.as_u64().map_or(DEFAULT_LOG_BUFFER_CAPACITY, |v| v as usize),
            _ => DEFAULT_LOG_BUFFER_CAPACITY,
        })
    }

    pub fn get_log_enable_console(&self) -> Result<bool> {
        Ok(matches!(
            self.get_value(&["host", "logger", "enable_console"])?,
            Value::Bool(true) | Value::Null
        ))
    }

    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"])? {
            Value::String(s) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }
}

/// Returns the global configuration instance
///
/// The configuration is lazily loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Embedded defaults, with `user` merged over them, keys lowercased
fn defaults_with(user: Option<&Value>) -> Result<Value> {
    let mut tree = lowercase_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
    if let Some(user) = user {
        merge_yaml(&mut tree, lowercase_keys(user.clone()));
    }
    Ok(tree)
}

fn insert_at(tree: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, sections)) = path.split_last() else {
        *tree = value;
        return Ok(());
    };
    let mut node = tree;
    for key in sections {
        let map = node
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("cannot set {}: {} is not a section", path.join("."), key))?;
        node = map
            .entry(Value::String(key.to_lowercase()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
    }
    node.as_mapping_mut()
        .ok_or_else(|| anyhow!("cannot set {}: parent is not a section", path.join(".")))?
        .insert(Value::String(last.to_lowercase()), value);
    Ok(())
}

/// `SPOTILAVA_CONFIG__PROVIDERS__TIDAL__CLIENT_ID=x` sets `providers.tidal.client_id`;
/// values are parsed as YAML scalars when possible
fn apply_env_overrides(tree: &mut Value) {
    for (name, raw) in env::vars() {
        let Some(path) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<&str> = path.split("__").collect();
        let value = serde_yaml::from_str(&raw).unwrap_or(Value::String(raw));
        if let Err(e) = insert_at(tree, &path, value) {
            warn!(env_var = %name, "Ignoring environment override: {}", e);
        }
    }
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, child)| {
                    let key = match key {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, lowercase_keys(child))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Sections are merged key by key; scalars and sequences from `user` win
fn merge_yaml(base: &mut Value, user: Value) {
    match (base, user) {
        (Value::Mapping(base), Value::Mapping(user)) => {
            for (key, child) in user {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, child),
                    None => {
                        base.insert(key, child);
                    }
                }
            }
        }
        (base, user) => *base = user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_bounds() {
        assert_eq!(validate_chunk_size(4096).unwrap(), 4096);
        assert_eq!(validate_chunk_size(65536).unwrap(), 65536);
        assert!(validate_chunk_size(4095).is_err());
        assert!(validate_chunk_size(2048).is_err());
        assert!(validate_chunk_size(4100).is_err());
        assert!(validate_chunk_size(0).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_chunk_size().unwrap(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
        assert_eq!(config.get_base_url(), "localhost");
        assert_eq!(config.get_log_cache_size().unwrap(), 1000);
        assert!(config.get_log_enable_console().unwrap());
    }

    #[test]
    fn test_invalid_chunk_size_rejected_at_load() {
        let err = Config::from_yaml_str("streaming:\n  chunk_size: 4100\n").unwrap_err();
        assert!(err.to_string().contains("multiple of 8"));

        let err = Config::from_yaml_str("streaming:\n  chunk_size: 1024\n").unwrap_err();
        assert!(err.to_string().contains("at least"));
    }

    #[test]
    fn test_set_chunk_size_keeps_previous_value_on_error() {
        let config = Config::from_yaml_str("{}").unwrap();
        config.set_chunk_size(8192).unwrap();
        assert!(config.set_chunk_size(8190).is_err());
        assert_eq!(config.get_chunk_size().unwrap(), 8192);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let config = Config::from_yaml_str("Host:\n  HTTP_Port: 9000\n").unwrap();
        assert_eq!(config.get_http_port(), 9000);
        assert_eq!(
            config.get_value(&["HOST", "http_port"]).unwrap(),
            Value::Number(Number::from(9000))
        );
    }

    #[test]
    fn test_invalid_port_falls_back_to_default() {
        let config = Config::from_yaml_str("host:\n  http_port: 70000\n").unwrap();
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_merge_keeps_unrelated_defaults() {
        let config = Config::from_yaml_str("providers:\n  deezer:\n    enabled: true\n").unwrap();
        assert_eq!(
            config.get_value(&["providers", "deezer", "enabled"]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            config.get_value(&["providers", "spotify", "enabled"]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_set_value_through_a_scalar_fails() {
        let config = Config::from_yaml_str("{}").unwrap();
        let err = config
            .set_value(&["streaming", "chunk_size", "nested"], Value::Bool(true))
            .unwrap_err();
        assert!(err.to_string().contains("not a section"));
    }

    #[test]
    fn test_get_string_treats_empty_as_absent() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_string(&["providers", "deezer", "arl"]), None);
        config
            .set_value(
                &["providers", "deezer", "arl"],
                Value::String("cookie".to_string()),
            )
            .unwrap();
        assert_eq!(
            config.get_string(&["providers", "deezer", "arl"]).as_deref(),
            Some("cookie")
        );
    }
}
