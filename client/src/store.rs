//! Persisted session state: token, demo flag, exit URL and device hint.
//!
//! Every write is mirrored into a durable store (survives restarts) and a
//! per-session store (lives as long as the process). Reads prefer the durable
//! copy.

use slotfront_types::{DEMO_KEY, DEVICE_KEY, EXIT_URL_KEY, TOKEN_KEY};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use url::Url;

/// String key/value storage.
///
/// Implementations swallow their own I/O failures; a storage hiccup must not
/// take the game session down with it.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("store lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock(&self.values).insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        lock(&self.values).remove(key);
    }
}

/// JSON file backed store, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open `path`, starting empty when it is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(values) => values,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "session file unreadable; starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read session file");
                BTreeMap::new()
            }
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) {
        let bytes = match serde_json::to_vec_pretty(values) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to encode session file");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "failed to create session directory");
                return;
            }
        }
        if let Err(err) = std::fs::write(&self.path, bytes) {
            warn!(path = %self.path.display(), error = %err, "failed to write session file");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = lock(&self.values);
        values.insert(key.to_string(), value.to_string());
        self.flush(&values);
    }

    fn remove(&self, key: &str) {
        let mut values = lock(&self.values);
        if values.remove(key).is_some() {
            self.flush(&values);
        }
    }
}

/// Query parameters the game is launched with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchParams {
    pub demo: Option<bool>,
    pub token: Option<String>,
    pub device: Option<String>,
    pub api_exit: Option<String>,
    pub start_game: bool,
}

fn parse_flag(name: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        other => {
            warn!(param = name, value = other, "ignoring unrecognized launch flag");
            None
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl LaunchParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "demo" => params.demo = parse_flag("demo", &value),
                "token" => params.token = non_empty(&value),
                "device" => params.device = non_empty(&value),
                "api_exit" => params.api_exit = non_empty(&value),
                "start_game" => params.start_game = parse_flag("start_game", &value).unwrap_or(false),
                _ => {}
            }
        }
        params
    }

    pub fn parse(launch_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(&Url::parse(launch_url)?))
    }
}

/// Mirrored durable + per-session storage with typed accessors.
#[derive(Clone)]
pub struct SessionStore {
    durable: Arc<dyn KeyValueStore>,
    tab: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(durable: Arc<dyn KeyValueStore>, tab: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, tab }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Durable half backed by a JSON file at `path`.
    pub fn with_file(path: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(FileStore::open(path)), Arc::new(MemoryStore::new()))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.durable.get(key).or_else(|| self.tab.get(key))
    }

    pub fn set(&self, key: &str, value: &str) {
        self.durable.set(key, value);
        self.tab.set(key, value);
    }

    pub fn remove(&self, key: &str) {
        self.durable.remove(key);
        self.tab.remove(key);
    }

    pub fn token(&self) -> Option<String> {
        self.get(TOKEN_KEY).filter(|token| !token.is_empty())
    }

    pub fn set_token(&self, token: &str) {
        self.set(TOKEN_KEY, token);
    }

    pub fn clear_token(&self) {
        debug!("clearing session token");
        self.remove(TOKEN_KEY);
    }

    pub fn is_demo(&self) -> bool {
        self.get(DEMO_KEY).as_deref() == Some("true")
    }

    pub fn set_demo(&self, demo: bool) {
        self.set(DEMO_KEY, if demo { "true" } else { "false" });
    }

    pub fn exit_url(&self) -> Option<String> {
        self.get(EXIT_URL_KEY)
    }

    pub fn set_exit_url(&self, url: &str) {
        self.set(EXIT_URL_KEY, url);
    }

    pub fn device(&self) -> Option<String> {
        self.get(DEVICE_KEY)
    }

    pub fn set_device(&self, device: &str) {
        self.set(DEVICE_KEY, device);
    }

    /// Seed the stores from launch parameters. Returns the `start_game` flag.
    pub fn apply_launch_params(&self, params: &LaunchParams) -> bool {
        if let Some(demo) = params.demo {
            self.set_demo(demo);
        }
        if let Some(token) = params.token.as_deref() {
            self.set_token(token);
        }
        if let Some(device) = params.device.as_deref() {
            self.set_device(device);
        }
        if let Some(exit) = params.api_exit.as_deref() {
            self.set_exit_url(exit);
        }
        debug!(
            demo = ?params.demo,
            has_token = params.token.is_some(),
            device = ?params.device,
            start_game = params.start_game,
            "applied launch parameters"
        );
        params.start_game
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_mirrored() {
        let durable = Arc::new(MemoryStore::new());
        let tab = Arc::new(MemoryStore::new());
        let store = SessionStore::new(durable.clone(), tab.clone());

        store.set_token("tok-1");
        assert_eq!(durable.get(TOKEN_KEY).as_deref(), Some("tok-1"));
        assert_eq!(tab.get(TOKEN_KEY).as_deref(), Some("tok-1"));

        store.clear_token();
        assert!(durable.get(TOKEN_KEY).is_none());
        assert!(tab.get(TOKEN_KEY).is_none());
        assert!(store.token().is_none());
    }

    #[test]
    fn test_reads_prefer_durable_then_tab() {
        let durable = Arc::new(MemoryStore::new());
        let tab = Arc::new(MemoryStore::new());
        let store = SessionStore::new(durable.clone(), tab.clone());

        tab.set(EXIT_URL_KEY, "https://tab.example");
        assert_eq!(store.exit_url().as_deref(), Some("https://tab.example"));

        durable.set(EXIT_URL_KEY, "https://lobby.example");
        assert_eq!(store.exit_url().as_deref(), Some("https://lobby.example"));
    }

    #[test]
    fn test_demo_flag() {
        let store = SessionStore::in_memory();
        assert!(!store.is_demo());
        store.set_demo(true);
        assert!(store.is_demo());
        store.set_demo(false);
        assert!(!store.is_demo());
        assert_eq!(store.get(DEMO_KEY).as_deref(), Some("false"));
    }

    #[test]
    fn test_empty_token_is_absent() {
        let store = SessionStore::in_memory();
        store.set_token("");
        assert!(store.token().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = SessionStore::with_file(&path);
        store.set_token("persisted");
        store.set_device("mobile");
        drop(store);

        let reopened = SessionStore::with_file(&path);
        assert_eq!(reopened.token().as_deref(), Some("persisted"));
        assert_eq!(reopened.device().as_deref(), Some("mobile"));

        reopened.clear_token();
        let again = FileStore::open(&path);
        assert!(again.get(TOKEN_KEY).is_none());
        assert_eq!(again.get(DEVICE_KEY).as_deref(), Some("mobile"));
    }

    #[test]
    fn test_file_store_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = FileStore::open(&path);
        assert!(store.get(TOKEN_KEY).is_none());
        store.set(TOKEN_KEY, "fresh");
        assert_eq!(FileStore::open(&path).get(TOKEN_KEY).as_deref(), Some("fresh"));
    }

    #[test]
    fn test_launch_params_seed_store() {
        let params = LaunchParams::parse(
            "https://games.example/kobi?demo=false&token=abc123&device=desktop&api_exit=https%3A%2F%2Flobby.example&start_game=true",
        )
        .unwrap();
        assert_eq!(params.demo, Some(false));
        assert_eq!(params.token.as_deref(), Some("abc123"));
        assert_eq!(params.api_exit.as_deref(), Some("https://lobby.example"));
        assert!(params.start_game);

        let store = SessionStore::in_memory();
        assert!(store.apply_launch_params(&params));
        assert_eq!(store.token().as_deref(), Some("abc123"));
        assert_eq!(store.device().as_deref(), Some("desktop"));
        assert_eq!(store.exit_url().as_deref(), Some("https://lobby.example"));
        assert!(!store.is_demo());
    }

    #[test]
    fn test_launch_params_ignore_unknown_values() {
        let params = LaunchParams::parse("https://games.example/?demo=maybe&token=&other=1").unwrap();
        assert_eq!(params.demo, None);
        assert_eq!(params.token, None);
        assert!(!params.start_game);

        let store = SessionStore::in_memory();
        store.set_token("kept");
        assert!(!store.apply_launch_params(&params));
        assert_eq!(store.token().as_deref(), Some("kept"));
    }
}
