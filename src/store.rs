//! Persisted configuration entries, one per configured sender id.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Credentials, SenderId, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access entry file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse entry file: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode entry file: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("stored entry {entry_id} is invalid: {source}")]
    InvalidEntry {
        entry_id: String,
        #[source]
        source: ValidationError,
    },

    #[error("an entry for sender id {0} already exists")]
    Duplicate(SenderId),

    #[error("no entry with id {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One configured SMS.to account.
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub credentials: Credentials,
}

impl ConfigEntry {
    /// New entry with a random id and the standard title.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().simple().to_string(),
            title: Self::title_for(credentials.sender_id()),
            credentials,
        }
    }

    /// Display title; embeds only the non-secret sender id.
    pub fn title_for(sender_id: &SenderId) -> String {
        format!("SMS.to ({sender_id})")
    }
}

/// Durable storage of configuration entries, unique by sender id.
pub trait EntryStore: Send + Sync {
    fn entries(&self) -> Result<Vec<ConfigEntry>, StoreError>;

    /// Add a new entry; fails with [`StoreError::Duplicate`] on a sender id collision.
    fn insert(&self, entry: ConfigEntry) -> Result<(), StoreError>;

    /// Replace the credentials and title of an entry in one write.
    fn update(
        &self,
        entry_id: &str,
        credentials: Credentials,
        title: String,
    ) -> Result<ConfigEntry, StoreError>;

    fn remove(&self, entry_id: &str) -> Result<bool, StoreError>;

    fn get(&self, entry_id: &str) -> Result<Option<ConfigEntry>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.entry_id == entry_id))
    }

    /// Exact match on the sender id.
    fn find_by_sender_id(&self, sender_id: &SenderId) -> Result<Option<ConfigEntry>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.credentials.sender_id() == sender_id))
    }
}

fn insert_unique(entries: &mut Vec<ConfigEntry>, entry: ConfigEntry) -> Result<(), StoreError> {
    let sender_id = entry.credentials.sender_id();
    if entries
        .iter()
        .any(|existing| existing.credentials.sender_id() == sender_id)
    {
        return Err(StoreError::Duplicate(sender_id.clone()));
    }
    entries.push(entry);
    Ok(())
}

fn update_in_place(
    entries: &mut [ConfigEntry],
    entry_id: &str,
    credentials: Credentials,
    title: String,
) -> Result<ConfigEntry, StoreError> {
    let index = entries
        .iter()
        .position(|it| it.entry_id == entry_id)
        .ok_or_else(|| StoreError::NotFound(entry_id.to_owned()))?;

    let sender_id = credentials.sender_id();
    if entries
        .iter()
        .enumerate()
        .any(|(i, it)| i != index && it.credentials.sender_id() == sender_id)
    {
        return Err(StoreError::Duplicate(sender_id.clone()));
    }

    let entry = &mut entries[index];
    entry.credentials = credentials;
    entry.title = title;
    Ok(entry.clone())
}

fn remove_by_id(entries: &mut Vec<ConfigEntry>, entry_id: &str) -> bool {
    let before = entries.len();
    entries.retain(|it| it.entry_id != entry_id);
    entries.len() != before
}

#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    entries: Mutex<Vec<ConfigEntry>>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn entries(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn insert(&self, entry: ConfigEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        insert_unique(&mut entries, entry)
    }

    fn update(
        &self,
        entry_id: &str,
        credentials: Credentials,
        title: String,
    ) -> Result<ConfigEntry, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        update_in_place(&mut entries, entry_id, credentials, title)
    }

    fn remove(&self, entry_id: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(remove_by_id(&mut entries, entry_id))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntryFile {
    #[serde(default)]
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    entry_id: String,
    title: String,
    api_key: String,
    sender_id: String,
}

impl StoredEntry {
    fn from_entry(entry: &ConfigEntry) -> Self {
        Self {
            entry_id: entry.entry_id.clone(),
            title: entry.title.clone(),
            api_key: entry.credentials.api_key().expose().to_owned(),
            sender_id: entry.credentials.sender_id().as_str().to_owned(),
        }
    }

    fn into_entry(self) -> Result<ConfigEntry, StoreError> {
        let credentials =
            Credentials::parse(self.api_key, self.sender_id).map_err(|source| {
                StoreError::InvalidEntry {
                    entry_id: self.entry_id.clone(),
                    source,
                }
            })?;
        Ok(ConfigEntry {
            entry_id: self.entry_id,
            title: self.title,
            credentials,
        })
    }
}

#[derive(Debug)]
/// Entries kept in a TOML file. A missing file is an empty store.
///
/// ```toml
/// [[entries]]
/// entry_id = "4f0c..."
/// title = "SMS.to (Alerts)"
/// api_key = "..."
/// sender_id = "Alerts"
/// ```
pub struct TomlEntryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlEntryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "entry file not found; starting empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.io_error(err)),
        };
        let file: EntryFile = toml::from_str(&content)?;
        file.entries
            .into_iter()
            .map(StoredEntry::into_entry)
            .collect()
    }

    /// Write to a sibling temp file, then rename over the target.
    fn save(&self, entries: &[ConfigEntry]) -> Result<(), StoreError> {
        let file = EntryFile {
            entries: entries.iter().map(StoredEntry::from_entry).collect(),
        };
        let content = toml::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|it| !it.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|err| self.io_error(err))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| self.io_error(err))?;
        info!(path = ?self.path, entries = entries.len(), "entry file saved");
        Ok(())
    }
}

impl EntryStore for TomlEntryStore {
    fn entries(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load()
    }

    fn insert(&self, entry: ConfigEntry) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        insert_unique(&mut entries, entry)?;
        self.save(&entries)
    }

    fn update(
        &self,
        entry_id: &str,
        credentials: Credentials,
        title: String,
    ) -> Result<ConfigEntry, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        let updated = update_in_place(&mut entries, entry_id, credentials, title)?;
        self.save(&entries)?;
        Ok(updated)
    }

    fn remove(&self, entry_id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        let removed = remove_by_id(&mut entries, entry_id);
        if removed {
            self.save(&entries)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(api_key: &str, sender_id: &str) -> Credentials {
        Credentials::parse(api_key, sender_id).unwrap()
    }

    #[test]
    fn new_entry_title_embeds_sender_id() {
        let entry = ConfigEntry::new(creds("0123456789", "Alerts"));
        assert_eq!(entry.title, "SMS.to (Alerts)");
        assert_eq!(entry.entry_id.len(), 32);
    }

    #[test]
    fn in_memory_store_rejects_duplicate_sender_id() {
        let store = InMemoryEntryStore::new();
        store
            .insert(ConfigEntry::new(creds("0123456789", "Alerts")))
            .unwrap();
        let err = store
            .insert(ConfigEntry::new(creds("9876543210", "Alerts")))
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn update_replaces_credentials_and_title() {
        let store = InMemoryEntryStore::new();
        let entry = ConfigEntry::new(creds("0123456789", "Alerts"));
        let id = entry.entry_id.clone();
        store.insert(entry).unwrap();

        let new_creds = creds("abcdefghijk", "Garage");
        let updated = store
            .update(&id, new_creds.clone(), "SMS.to (Garage)".to_owned())
            .unwrap();
        assert_eq!(updated.credentials, new_creds);
        assert_eq!(store.get(&id).unwrap().unwrap().title, "SMS.to (Garage)");

        assert!(matches!(
            store.update("missing", new_creds, String::new()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn update_checks_sender_id_against_other_entries_only() {
        let store = InMemoryEntryStore::new();
        let alerts = ConfigEntry::new(creds("0123456789", "Alerts"));
        let garage = ConfigEntry::new(creds("abcdefghijk", "Garage"));
        let alerts_id = alerts.entry_id.clone();
        store.insert(alerts).unwrap();
        store.insert(garage).unwrap();

        let kept = store
            .update(&alerts_id, creds("new-key-12345", "Alerts"), "SMS.to (Alerts)".to_owned())
            .unwrap();
        assert_eq!(kept.credentials.api_key().expose(), "new-key-12345");

        assert!(matches!(
            store.update(&alerts_id, creds("0123456789", "Garage"), String::new()),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn toml_store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("smsto.toml");
        let store = TomlEntryStore::new(&path);
        assert!(store.entries().unwrap().is_empty());

        let entry = ConfigEntry::new(creds("0123456789", "Alerts"));
        store.insert(entry.clone()).unwrap();

        let reopened = TomlEntryStore::new(&path);
        assert_eq!(reopened.entries().unwrap(), vec![entry.clone()]);
        let found = reopened
            .find_by_sender_id(&SenderId::new("Alerts").unwrap())
            .unwrap();
        assert_eq!(found, Some(entry.clone()));

        assert!(reopened.remove(&entry.entry_id).unwrap());
        assert!(TomlEntryStore::new(&path).entries().unwrap().is_empty());
    }

    #[test]
    fn toml_store_rejects_invalid_stored_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smsto.toml");
        std::fs::write(
            &path,
            r#"
            [[entries]]
            entry_id = "abc"
            title = "SMS.to ()"
            api_key = "0123456789"
            sender_id = "   "
            "#,
        )
        .unwrap();

        let err = TomlEntryStore::new(&path).entries().unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidEntry { ref entry_id, .. } if entry_id == "abc"),
            "{err:?}"
        );
    }
}
