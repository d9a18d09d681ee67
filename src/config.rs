//! Settings persistence with named profiles.
//!
//! Each profile is a flat `section -> key -> value` bag stored as JSON in
//! `<dir>/<name>.json`:
//!
//! ```json
//! {
//!   "Settings": {
//!     "DelayMS": "100",
//!     "ProcessName": "Notepad.exe",
//!     "SpamKey": "3, 4",
//!     "TriggerKey": "2"
//!   }
//! }
//! ```
//!
//! The engine never reads the store directly. It takes a
//! [`SettingsSnapshot`] when a session starts.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SpamError};

pub const SETTINGS_SECTION: &str = "Settings";
pub const PROCESS_NAME: &str = "ProcessName";
pub const TRIGGER_KEY: &str = "TriggerKey";
pub const SPAM_KEY: &str = "SpamKey";
pub const DELAY_MS: &str = "DelayMS";

pub const DEFAULT_PROFILE: &str = "Default";
pub const DEFAULT_CONFIG_DIR: &str = "configs";

const PROFILE_EXTENSION: &str = "json";

/// Default values for the `Settings` section.
pub fn default_settings() -> BTreeMap<String, String> {
    [
        (PROCESS_NAME, "Notepad.exe"),
        (TRIGGER_KEY, "2"),
        (SPAM_KEY, "3"),
        (DELAY_MS, "100"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_value(section: &str, key: &str) -> Option<String> {
    if section != SETTINGS_SECTION {
        return None;
    }
    default_settings().remove(key)
}

/// Split a comma-separated key list, trimming items and dropping empty ones.
pub fn split_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// A value read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::List(items) => items.join(","),
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::Text(text) => split_key_list(&text),
            Self::List(items) => items,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// The flat settings consumed by the engine, copied once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub process_name: String,
    pub trigger_key: String,
    pub spam_keys: Vec<String>,
    /// Kept as entered; the engine substitutes a default if it is not a
    /// valid number.
    pub delay_ms: String,
}

impl SettingsSnapshot {
    pub fn validate(&self) -> Result<()> {
        if self.process_name.trim().is_empty() {
            return Err(SpamError::config_validation("ProcessName cannot be empty"));
        }
        if self.trigger_key.trim().is_empty() {
            return Err(SpamError::config_validation("TriggerKey cannot be empty"));
        }
        if self.spam_keys.is_empty() {
            return Err(SpamError::config_validation(
                "SpamKey must name at least one key",
            ));
        }
        Ok(())
    }
}

type Bag = BTreeMap<String, BTreeMap<String, String>>;

/// Profile-backed settings store.
#[derive(Debug)]
pub struct SettingsStore {
    dir: PathBuf,
    bag: Bag,
    active: Option<String>,
}

impl SettingsStore {
    /// Open (creating if needed) a profile directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            bag: Bag::new(),
            active: None,
        })
    }

    /// Name of the profile currently loaded, if any.
    pub fn active_profile(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn profile_path(&self, name: &str) -> Result<PathBuf> {
        validate_profile_name(name)?;
        Ok(self.dir.join(format!("{name}.{PROFILE_EXTENSION}")))
    }

    /// Profile names, sorted. Creates the default profile when none exist.
    pub fn list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        if names.is_empty() {
            info!("no profiles found, creating '{DEFAULT_PROFILE}'");
            self.save(DEFAULT_PROFILE, &default_settings())?;
            return Ok(vec![DEFAULT_PROFILE.to_string()]);
        }

        names.sort();
        Ok(names)
    }

    /// Make `name` the active profile.
    ///
    /// A missing profile loads the defaults in memory without writing them.
    /// An existing one has any missing default keys filled in and is
    /// rewritten if that changed anything.
    pub fn load(&mut self, name: &str) -> Result<()> {
        let path = self.profile_path(name)?;

        if !path.exists() {
            debug!(profile = name, "profile not on disk, using defaults");
            self.bag = Bag::new();
            self.bag
                .insert(SETTINGS_SECTION.to_string(), default_settings());
            self.active = Some(name.to_string());
            return Ok(());
        }

        let mut bag = read_bag(&path)?;
        let section = bag.entry(SETTINGS_SECTION.to_string()).or_default();
        let mut changed = false;
        for (key, value) in default_settings() {
            if !section.contains_key(&key) {
                section.insert(key, value);
                changed = true;
            }
        }
        if changed {
            debug!(profile = name, "filling in missing default settings");
            write_bag(&path, &bag)?;
        }

        self.bag = bag;
        self.active = Some(name.to_string());
        info!(profile = name, "profile loaded");
        Ok(())
    }

    /// Write a clean profile holding only `settings`, then load it.
    pub fn save(&mut self, name: &str, settings: &BTreeMap<String, String>) -> Result<()> {
        let path = self.profile_path(name)?;
        let mut bag = Bag::new();
        bag.insert(SETTINGS_SECTION.to_string(), settings.clone());
        write_bag(&path, &bag)?;
        info!(profile = name, "profile saved");
        self.load(name)
    }

    /// Remove a profile. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let path = self.profile_path(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        if self.active.as_deref() == Some(name) {
            self.bag.clear();
            self.active = None;
        }
        info!(profile = name, "profile deleted");
        Ok(true)
    }

    /// Read a setting, falling back to the default. `SpamKey` is a list.
    pub fn get(&self, section: &str, key: &str) -> Option<SettingValue> {
        let raw = self
            .bag
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
            .or_else(|| default_value(section, key))?;

        if key == SPAM_KEY {
            Some(SettingValue::List(split_key_list(&raw)))
        } else {
            Some(SettingValue::Text(raw))
        }
    }

    /// Update a setting and persist it to the active profile, if any.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) -> Result<()> {
        self.bag
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());

        if let Some(name) = self.active.clone() {
            let path = self.profile_path(&name)?;
            write_bag(&path, &self.bag)?;
        }
        Ok(())
    }

    /// Flatten the `Settings` section for an engine session.
    pub fn snapshot(&self) -> SettingsSnapshot {
        let text = |key| {
            self.get(SETTINGS_SECTION, key)
                .map(SettingValue::into_text)
                .unwrap_or_default()
        };
        SettingsSnapshot {
            process_name: text(PROCESS_NAME),
            trigger_key: text(TRIGGER_KEY),
            spam_keys: self
                .get(SETTINGS_SECTION, SPAM_KEY)
                .map(SettingValue::into_list)
                .unwrap_or_default(),
            delay_ms: text(DELAY_MS),
        }
    }
}

fn validate_profile_name(name: &str) -> Result<()> {
    let bad = name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name.contains("..")
        || name.starts_with('.');
    if bad {
        return Err(SpamError::InvalidProfileName(name.to_string()));
    }
    Ok(())
}

fn read_bag(path: &Path) -> Result<Bag> {
    let content = fs::read_to_string(path)
        .map_err(|e| SpamError::config_load(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&content)
        .map_err(|e| SpamError::config_load(path.display().to_string(), e.to_string()))
}

fn write_bag(path: &Path, bag: &Bag) -> Result<()> {
    let content = serde_json::to_string_pretty(bag)?;
    fs::write(path, content)
        .map_err(|e| SpamError::config_save(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_list_creates_default_profile() {
        let (dir, mut store) = store();
        assert_eq!(store.list().unwrap(), vec![DEFAULT_PROFILE]);
        assert!(dir.path().join("Default.json").exists());
        assert_eq!(store.active_profile(), Some(DEFAULT_PROFILE));
    }

    #[test]
    fn test_get_falls_back_to_defaults() {
        let (_dir, store) = store();
        assert_eq!(
            store.get(SETTINGS_SECTION, PROCESS_NAME),
            Some(SettingValue::Text("Notepad.exe".to_string()))
        );
        assert_eq!(
            store.get(SETTINGS_SECTION, SPAM_KEY),
            Some(SettingValue::List(vec!["3".to_string()]))
        );
        assert_eq!(store.get("Other", "Missing"), None);
    }

    #[test]
    fn test_spam_key_list_is_trimmed() {
        assert_eq!(split_key_list(" A, B ,C"), vec!["A", "B", "C"]);
        assert_eq!(split_key_list("A,,B"), vec!["A", "B"]);
        assert!(split_key_list("").is_empty());
        assert!(split_key_list(" , ").is_empty());
    }

    #[test]
    fn test_load_missing_profile_uses_defaults_without_writing() {
        let (dir, mut store) = store();
        store.load("fresh").unwrap();
        assert_eq!(store.active_profile(), Some("fresh"));
        assert_eq!(store.snapshot().trigger_key, "2");
        assert!(!dir.path().join("fresh.json").exists());
    }

    #[test]
    fn test_load_fills_missing_keys() {
        let (dir, mut store) = store();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"Settings": {"ProcessName": "game.exe"}}"#).unwrap();

        store.load("partial").unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.process_name, "game.exe");
        assert_eq!(snap.delay_ms, "100");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("DelayMS"));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let (dir, mut store) = store();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(matches!(
            store.load("broken"),
            Err(SpamError::ConfigLoad { .. })
        ));
    }

    #[test]
    fn test_set_persists_to_active_profile() {
        let (dir, mut store) = store();
        store.save("raid", &default_settings()).unwrap();
        store.set(SETTINGS_SECTION, DELAY_MS, "250").unwrap();

        let mut reopened = SettingsStore::open(dir.path()).unwrap();
        reopened.load("raid").unwrap();
        assert_eq!(reopened.snapshot().delay_ms, "250");
    }

    #[test]
    fn test_set_without_active_profile_stays_in_memory() {
        let (dir, mut store) = store();
        store.set(SETTINGS_SECTION, TRIGGER_KEY, "F5").unwrap();
        assert_eq!(store.snapshot().trigger_key, "F5");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_delete_clears_active_profile() {
        let (_dir, mut store) = store();
        let mut settings = default_settings();
        settings.insert(TRIGGER_KEY.to_string(), "F9".to_string());
        store.save("temp", &settings).unwrap();
        assert_eq!(store.snapshot().trigger_key, "F9");

        assert!(store.delete("temp").unwrap());
        assert_eq!(store.active_profile(), None);
        assert_eq!(store.snapshot().trigger_key, "2");
        assert!(!store.delete("temp").unwrap());
    }

    #[test]
    fn test_invalid_profile_names() {
        let (_dir, mut store) = store();
        for name in ["", "../escape", "a/b", "a\\b", ".hidden"] {
            assert!(matches!(
                store.load(name),
                Err(SpamError::InvalidProfileName(_))
            ));
        }
    }

    #[test]
    fn test_snapshot_validation() {
        let (_dir, mut store) = store();
        assert!(store.snapshot().validate().is_ok());

        store.set(SETTINGS_SECTION, SPAM_KEY, " , ").unwrap();
        assert!(store.snapshot().validate().is_err());

        store.set(SETTINGS_SECTION, SPAM_KEY, "A").unwrap();
        store.set(SETTINGS_SECTION, PROCESS_NAME, "").unwrap();
        assert!(store.snapshot().validate().is_err());
    }
}
