use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

use crate::execution::Language;

const APP_DIR: &str = "snippet_playground";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .playgroundrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Build a config from defaults plus explicit entries, ignoring the rc file.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut inner = default_map();
        for (k, v) in entries {
            inner.insert(k.into(), v.into());
        }
        Self { inner, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // ENV first
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn snippet_store_path(&self) -> PathBuf {
        self.get_path("SNIPPET_STORE_PATH")
            .unwrap_or_else(|| data_dir().join("snippets.json"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.get_path("DOWNLOAD_DIR").unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn log_path(&self) -> PathBuf {
        self.get_path("LOG_PATH")
            .unwrap_or_else(|| env::temp_dir().join(APP_DIR).join("playground.log"))
    }

    pub fn default_language(&self) -> Language {
        self.get("DEFAULT_LANGUAGE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Language::JavaScript)
    }
}

/// Typed view over the keys the runners care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub node_path: String,
    pub python_path: String,
    pub js_timeout: Duration,
    pub js_permission_model: bool,
    pub python_init_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            node_path: "node".into(),
            python_path: "python3".into(),
            js_timeout: Duration::from_secs(8),
            js_permission_model: true,
            python_init_timeout: Duration::from_secs(30),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = Self::default();
        Self {
            node_path: cfg.get("PLAYGROUND_NODE").unwrap_or(defaults.node_path),
            python_path: cfg.get("PLAYGROUND_PYTHON").unwrap_or(defaults.python_path),
            js_timeout: cfg
                .get_u64("JS_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.js_timeout),
            js_permission_model: cfg.get_bool("JS_PERMISSION_MODEL"),
            python_init_timeout: cfg
                .get_u64("PYTHON_INIT_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.python_init_timeout),
        }
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (k, v) = line.split_once('=')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "PLAYGROUND_NODE",
        "PLAYGROUND_PYTHON",
        "JS_TIMEOUT_SECS",
        "JS_PERMISSION_MODEL",
        "PYTHON_INIT_TIMEOUT_SECS",
        "DEFAULT_LANGUAGE",
        "SNIPPET_STORE_PATH",
        "DOWNLOAD_DIR",
        "LOG_PATH",
    ];

    KEYS.contains(&k) || k.starts_with("PLAYGROUND_")
}

fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join(APP_DIR)
}

fn data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join(APP_DIR)
}

fn default_config_path() -> PathBuf {
    config_dir().join(".playgroundrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Interpreters
    m.insert("PLAYGROUND_NODE".into(), "node".into());
    m.insert("PLAYGROUND_PYTHON".into(), "python3".into());

    // Numbers
    m.insert("JS_TIMEOUT_SECS".into(), "8".into());
    m.insert("PYTHON_INIT_TIMEOUT_SECS".into(), "30".into());

    // Strings
    m.insert("DEFAULT_LANGUAGE".into(), "javascript".into());

    // Bools as strings
    m.insert("JS_PERMISSION_MODEL".into(), "true".into());

    m
}
