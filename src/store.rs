//! Persistence of the dashboard document
//!
//! The store keeps no copy of the document between calls: every read goes to
//! disk and every mutation is a full `load → mutate → save` cycle. Saves are
//! atomic (staging file plus rename), so the backing file is never observed
//! half-written.

use crate::document::{
    CalendarWidget, Countdown, Document, FeedWidget, Group, IframeWidget, Link, Note,
};
use crate::error::{IronDashError, Result};
use crate::utils::{stage_file, write_atomic};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const FAVICON_FILE: &str = "favicon.bin";
const FAVICON_TYPE_FILE: &str = "favicon.type";

/// Owner of the backing document file
pub struct DocumentStore {
    path: PathBuf,
    defaults: Document,
    /// Serializes read-modify-write cycles issued through [`DocumentStore::update`]
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Create a store backed by `path`, using [`Document::default`] for absent fields.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_defaults(path, Document::default())
    }

    /// Create a store whose missing fields are filled from `defaults`.
    #[must_use]
    pub fn with_defaults(path: impl Into<PathBuf>, defaults: Document) -> Self {
        Self {
            path: path.into(),
            defaults,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing document file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current document.
    ///
    /// Fields missing from the file take their default values. A missing,
    /// unreadable or corrupt file yields the default document; this never
    /// fails.
    #[must_use]
    pub fn load(&self) -> Document {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No document at {}; using defaults", self.path.display());
                return self.defaults.clone();
            }
            Err(e) => {
                warn!("Failed to read {}: {e}; using defaults", self.path.display());
                return self.defaults.clone();
            }
        };

        match self.parse(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to parse {}: {e}; using defaults", self.path.display());
                self.defaults.clone()
            }
        }
    }

    fn parse(&self, raw: &str) -> Result<Document> {
        // Hand-edited files may use JSON5 conveniences (comments, trailing commas).
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => json5::from_str(raw)?,
        };
        let Value::Object(fields) = value else {
            return Err(IronDashError::from("Document root is not an object"));
        };
        salvage_document(&self.defaults, fields)
    }

    /// Durably replace the backing file with `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    pub fn save(&self, doc: &Document) -> Result<()> {
        let staged = self.stage(doc)?;
        self.commit(&staged)
    }

    fn stage(&self, doc: &Document) -> Result<PathBuf> {
        let body = serde_json::to_string_pretty(doc)?;
        Ok(stage_file(&self.path, body.as_bytes())?)
    }

    fn commit(&self, staged: &Path) -> Result<()> {
        fs::rename(staged, &self.path)?;
        debug!("Document saved to {}", self.path.display());
        Ok(())
    }

    /// Run `mutate` against a freshly loaded document and save the result.
    ///
    /// Concurrent calls are applied one after another. Nothing is written if
    /// `mutate` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `mutate`, or a storage error from saving.
    pub async fn update<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T>,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load();
        let output = mutate(&mut doc)?;
        self.save(&doc)?;
        Ok(output)
    }

    /// Replace the document with an exported copy.
    ///
    /// The payload must carry a `groups` array. Other fields are only taken
    /// when present and of the same JSON type as the current value.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a payload without `groups`, leaving the
    /// stored document untouched.
    pub async fn import(&self, payload: &Value) -> Result<Document> {
        if !payload.get("groups").is_some_and(Value::is_array) {
            return Err(IronDashError::Validation(
                "Imported document must contain a groups array".to_string(),
            ));
        }
        let doc = self.update(|doc| overlay(doc, payload)).await?;
        info!(
            "Imported document with {} groups and {} links",
            doc.groups.len(),
            doc.links().count()
        );
        Ok(doc)
    }

    /// Overlay the settings present in `payload` on the stored document.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `payload` is not an object or the merged
    /// document is invalid.
    pub async fn apply_partial(&self, payload: &Value) -> Result<Document> {
        self.update(|doc| overlay(doc, payload)).await
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.path.with_file_name(name)
    }

    /// Store a custom favicon next to the document.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn save_favicon(&self, bytes: &[u8], mime: &str) -> Result<()> {
        write_atomic(&self.sibling(FAVICON_FILE), bytes)?;
        write_atomic(&self.sibling(FAVICON_TYPE_FILE), mime.as_bytes())?;
        info!("Custom favicon stored ({} bytes, {mime})", bytes.len());
        Ok(())
    }

    /// Read the custom favicon and its MIME type, if one is stored.
    #[must_use]
    pub fn load_favicon(&self) -> Option<(Vec<u8>, String)> {
        let bytes = fs::read(self.sibling(FAVICON_FILE)).ok()?;
        let mime = fs::read_to_string(self.sibling(FAVICON_TYPE_FILE))
            .map(|m| m.trim().to_string())
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "image/x-icon".to_string());
        Some((bytes, mime))
    }

    /// Remove the custom favicon.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be removed.
    pub fn clear_favicon(&self) -> Result<()> {
        for name in [FAVICON_FILE, FAVICON_TYPE_FILE] {
            match fs::remove_file(self.sibling(name)) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Copy each field of `payload` whose JSON kind matches the current value.
fn overlay(doc: &mut Document, payload: &Value) -> Result<Document> {
    let Value::Object(incoming) = payload else {
        return Err(IronDashError::Validation(
            "Expected a JSON object".to_string(),
        ));
    };

    let mut merged = salvage_document(doc, incoming.clone())?;
    for link in merged.groups.iter_mut().flat_map(|g| g.links.iter_mut()) {
        link.normalize();
    }
    *doc = merged;
    Ok(doc.clone())
}

/// Rebuild a document from `fields` on top of `base`.
///
/// Fields that are unknown, of the wrong JSON kind, or fail to deserialize keep
/// the value from `base`. Malformed entries inside the collections are dropped
/// one by one instead of discarding the whole collection.
fn salvage_document(base: &Document, mut fields: Map<String, Value>) -> Result<Document> {
    if let Some(groups) = fields.get_mut("groups") {
        if let Value::Array(items) = &mut *groups {
            for group in items.iter_mut() {
                if let Some(links) = group.get_mut("links") {
                    salvage_list::<Link>(links, "link");
                }
            }
        }
        salvage_list::<Group>(groups, "group");
    }
    salvage_field::<Note>(&mut fields, "notes", "note");
    salvage_field::<FeedWidget>(&mut fields, "feeds", "feed");
    salvage_field::<IframeWidget>(&mut fields, "iframes", "iframe");
    salvage_field::<Countdown>(&mut fields, "countdowns", "countdown");
    salvage_field::<CalendarWidget>(&mut fields, "calendars", "calendar");
    if let Some(Value::Array(order)) = fields.get_mut("widgetOrder") {
        order.retain(Value::is_string);
    }
    if let Some(Value::Object(spans)) = fields.get_mut("colSpan") {
        spans.retain(|_, span| span.as_u64().is_some_and(|n| u32::try_from(n).is_ok()));
    }

    let mut merged = salvage(base, fields, "document")?;
    let pruned = merged.prune_layout();
    if pruned > 0 {
        debug!("Ignoring {pruned} orphaned layout entries");
    }
    Ok(merged)
}

/// Overlay `fields` on `base` one field at a time, keeping the base value for
/// any field that would not deserialize.
fn salvage<T>(base: &T, fields: Map<String, Value>, what: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(mut merged) = serde_json::to_value(base)? else {
        return Err(IronDashError::from("Record did not serialize to an object"));
    };

    for (key, value) in fields {
        let Some(existing) = merged.get(&key) else {
            debug!("Ignoring unknown {what} field {key}");
            continue;
        };
        if !same_kind(existing, &value) {
            warn!("Ignoring {what} field {key} with mismatched type");
            continue;
        }
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value);
        if serde_json::from_value::<T>(Value::Object(candidate.clone())).is_ok() {
            merged = candidate;
        } else {
            warn!("Ignoring invalid {what} field {key}");
        }
    }

    Ok(serde_json::from_value(Value::Object(merged))?)
}

fn salvage_field<T>(fields: &mut Map<String, Value>, key: &str, what: &str)
where
    T: Serialize + DeserializeOwned + Default,
{
    if let Some(list) = fields.get_mut(key) {
        salvage_list::<T>(list, what);
    }
}

/// Replace the records in `list` with their salvaged form, dropping entries
/// that are not objects.
fn salvage_list<T>(list: &mut Value, what: &str)
where
    T: Serialize + DeserializeOwned + Default,
{
    let Value::Array(items) = list else {
        return;
    };
    *items = std::mem::take(items)
        .into_iter()
        .filter_map(|item| {
            let Value::Object(fields) = item else {
                warn!("Dropping malformed {what} entry");
                return None;
            };
            salvage(&T::default(), fields, what)
                .and_then(|record| Ok(serde_json::to_value(record)?))
                .map_err(|e| warn!("Dropping {what} entry: {e}"))
                .ok()
        })
        .collect();
}

fn same_kind(existing: &Value, incoming: &Value) -> bool {
    matches!(
        (existing, incoming),
        (Value::Null, _)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
    )
}
