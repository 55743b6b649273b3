// Settings persisted as `configuration.json` next to the executable.
// Every run loads the file, back-fills keys that are missing, asks for
// anything still blank and writes the result back only when it changed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "configuration.json";
pub const DEFAULT_LOG_FILE_NAME: &str = "upload_adif.log";
pub const DEFAULT_LOGIN_URL: &str = "https://www.qrz.com/login";
pub const DEFAULT_ADIF_URL: &str = "https://logbook.qrz.com/adif";

/// Environment variable that points the store at a different file.
pub const CONFIG_PATH_ENV: &str = "QRZ_UPLOAD_CONFIG";

/// Typed view of the settings file. Keys we do not know about are kept in
/// `extra` so a rewrite never drops them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(deserialize_with = "lenient_string")]
    pub login_url: String,
    #[serde(deserialize_with = "lenient_string")]
    pub adif_url: String,
    #[serde(deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(deserialize_with = "lenient_string")]
    pub password: String,
    #[serde(deserialize_with = "lenient_string")]
    pub book_id: String,
    pub sbook: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub adif_path: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub allow_duplicates: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub email_report: bool,
    pub log_path: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub twofactor_code: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub trust_device: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    pub fn login_url(&self) -> &str {
        non_empty_or(&self.login_url, DEFAULT_LOGIN_URL)
    }

    pub fn adif_url(&self) -> &str {
        non_empty_or(&self.adif_url, DEFAULT_ADIF_URL)
    }

    /// Sub-book as sent in the upload form. Numbers and strings are both
    /// accepted in the file; anything unset means book 0.
    pub fn sbook_param(&self) -> String {
        match &self.sbook {
            None | Some(Value::Null) => "0".into(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Where the run log goes. A leading `~` is the home directory.
    pub fn log_file(&self, fallback: &Path) -> PathBuf {
        match self.log_path.as_deref() {
            Some(p) if !p.is_empty() => expand_home(p),
            _ => fallback.to_path_buf(),
        }
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// Hand-edited files put numbers in the book id and `null` in blanks.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    })
}

/// Source of answers for blank required fields.
pub trait Prompter {
    fn text(&mut self, prompt: &str) -> Result<String>;
    fn secret(&mut self, prompt: &str) -> Result<String>;
}

/// Owns the location of the settings file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore { path: path.into() }
    }

    /// `QRZ_UPLOAD_CONFIG` if set, otherwise `configuration.json` beside
    /// the running executable.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Ok(ConfigStore::new(path));
            }
        }
        let exe = std::env::current_exe()?;
        Ok(ConfigStore::new(exe.with_file_name(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_log_path(&self) -> PathBuf {
        self.path.with_file_name(DEFAULT_LOG_FILE_NAME)
    }

    pub fn defaults(&self) -> Config {
        Config {
            login_url: DEFAULT_LOGIN_URL.into(),
            adif_url: DEFAULT_ADIF_URL.into(),
            username: String::new(),
            password: String::new(),
            book_id: String::new(),
            sbook: Some(Value::from(0)),
            adif_path: String::new(),
            allow_duplicates: false,
            email_report: false,
            log_path: Some(self.default_log_path().to_string_lossy().into_owned()),
            twofactor_code: String::new(),
            trust_device: false,
            extra: Map::new(),
        }
    }

    /// Reads the settings, creating the file with defaults on first run.
    /// Keys missing from an existing file are filled from the defaults and
    /// the merged object is written back.
    pub fn load(&self) -> Result<Config> {
        let defaults = self.defaults();
        if !self.path.exists() {
            debug!("creating {} with defaults", self.path.display());
            self.save(&defaults)?;
            return Ok(defaults);
        }

        let text = fs::read_to_string(&self.path)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let mut stored: Map<String, Value> =
            serde_json::from_str(text).map_err(|source| self.invalid(source))?;

        let mut changed = false;
        for (key, value) in self.default_map(&defaults)? {
            if !stored.contains_key(&key) {
                stored.insert(key, value);
                changed = true;
            }
        }

        let config: Config =
            serde_json::from_value(Value::Object(stored)).map_err(|source| self.invalid(source))?;
        if changed {
            self.save(&config)?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(config).map_err(|source| self.invalid(source))?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Prompts for blank `username`, `password`, `book_id` and `adif_path`,
    /// restores `sbook`/`log_path` when they are `null`, and persists once if
    /// anything changed. Returns whether the file was rewritten.
    pub fn ensure_interactive_fields(
        &self,
        config: &mut Config,
        prompter: &mut dyn Prompter,
    ) -> Result<bool> {
        let mut changed = false;

        if config.username.is_empty() {
            config.username = prompter.text("QRZ username")?.trim().to_string();
            changed = true;
        }
        if config.password.is_empty() {
            config.password = prompter.secret("QRZ password")?.trim().to_string();
            changed = true;
        }
        if config.book_id.is_empty() {
            config.book_id = prompter.text("Logbook ID (bid)")?.trim().to_string();
            changed = true;
        }
        if matches!(config.sbook, None | Some(Value::Null)) {
            config.sbook = Some(Value::from(0));
            changed = true;
        }
        if config.adif_path.is_empty() {
            config.adif_path = prompter.text("ADIF file path (.adi/.adif)")?.trim().to_string();
            changed = true;
        }
        if config.log_path.is_none() {
            config.log_path = Some(self.default_log_path().to_string_lossy().into_owned());
            changed = true;
        }

        if changed {
            self.save(config)?;
        }
        Ok(changed)
    }

    fn default_map(&self, defaults: &Config) -> Result<Map<String, Value>> {
        match serde_json::to_value(defaults).map_err(|source| self.invalid(source))? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn invalid(&self, source: serde_json::Error) -> Error {
        Error::Config {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join(CONFIG_FILE_NAME));
        (dir, store)
    }

    #[test]
    fn sbook_accepts_numbers_and_strings() {
        let (_dir, store) = store();
        let mut config = store.defaults();
        assert_eq!(config.sbook_param(), "0");
        config.sbook = Some(Value::from(3));
        assert_eq!(config.sbook_param(), "3");
        config.sbook = Some(Value::from("7"));
        assert_eq!(config.sbook_param(), "7");
        config.sbook = None;
        assert_eq!(config.sbook_param(), "0");
    }

    #[test]
    fn empty_urls_fall_back_to_qrz() {
        let (_dir, store) = store();
        let mut config = store.defaults();
        config.login_url.clear();
        config.adif_url.clear();
        assert_eq!(config.login_url(), DEFAULT_LOGIN_URL);
        assert_eq!(config.adif_url(), DEFAULT_ADIF_URL);
    }

    #[test]
    fn numeric_book_id_and_null_strings_are_read() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            r#"{"book_id": 12345, "username": null, "allow_duplicates": 1}"#,
        )
        .unwrap();
        let config = store.load().unwrap();
        assert_eq!(config.book_id, "12345");
        assert_eq!(config.username, "");
        assert!(config.allow_duplicates);
    }

    #[test]
    fn log_file_expands_home() {
        let (_dir, store) = store();
        let mut config = store.defaults();
        let fallback = store.default_log_path();
        assert_eq!(config.log_file(&fallback), fallback);

        config.log_path = Some(String::new());
        assert_eq!(config.log_file(&fallback), fallback);

        if let Some(home) = dirs::home_dir() {
            config.log_path = Some("~/qrz/upload.log".into());
            assert_eq!(config.log_file(&fallback), home.join("qrz/upload.log"));
        }
    }
}
