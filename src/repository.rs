//! Versioned repository for looks, look metadata and wardrobe items.
//!
//! The store holds one schema. Older layouts are upgraded once by
//! [`LookRepository::migrate`] at startup; after that every read expects the
//! current layout and nothing probes alternate field names.

use crate::assets::StableImage;
use crate::constants::SCHEMA_VERSION;
use crate::error::Result;
use crate::look::{normalize_title, Look, LookComment, LookElement, LookMeta, WardrobeItem};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const LOOKS_KEY: &str = "wardrobe_looks";
pub const META_KEY: &str = "looks_meta";
pub const WARDROBE_KEY: &str = "wardrobe_items";
/// Keys older builds also wrote looks to.
pub const LEGACY_LOOK_KEYS: [&str; 2] = ["looks", "outfits"];

/// What a migration run changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub looks: usize,
    pub dropped: usize,
    pub wardrobe_items: usize,
}

pub struct LookRepository {
    store: Box<dyn KeyValueStore>,
}

impl LookRepository {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key)? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.store.set(key, &text)
    }

    pub fn schema_version(&self) -> Result<u32> {
        Ok(self.read(SCHEMA_VERSION_KEY)?.unwrap_or(1))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Migration
    // ─────────────────────────────────────────────────────────────────────────────

    /// Upgrades older layouts to the current schema. Returns `None` when the
    /// store is already current.
    ///
    /// The version is written last, so an interrupted run is simply repeated
    /// on the next start.
    pub fn migrate(&mut self) -> Result<Option<MigrationReport>> {
        let from_version = self.schema_version()?;
        if from_version >= SCHEMA_VERSION {
            return Ok(None);
        }
        log::info!("migrating look storage from v{from_version} to v{SCHEMA_VERSION}");

        let now = Utc::now();
        let mut report = MigrationReport {
            from_version,
            ..Default::default()
        };
        let mut newest: HashMap<String, Look> = HashMap::new();
        for key in std::iter::once(LOOKS_KEY).chain(LEGACY_LOOK_KEYS) {
            for raw in self.legacy_array(key)? {
                match legacy_look(&raw, key, now) {
                    Some(look) => {
                        let keep = newest
                            .get(&look.id)
                            .map_or(true, |existing| look.created_at > existing.created_at);
                        if keep {
                            newest.insert(look.id.clone(), look);
                        }
                    }
                    None => report.dropped += 1,
                }
            }
        }
        let mut looks: Vec<Look> = newest.into_values().collect();
        looks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        report.looks = looks.len();
        self.write(LOOKS_KEY, &looks)?;
        for key in LEGACY_LOOK_KEYS {
            self.store.remove(key)?;
        }

        let items: Vec<WardrobeItem> = self
            .legacy_array(WARDROBE_KEY)?
            .iter()
            .filter_map(legacy_wardrobe_item)
            .collect();
        report.wardrobe_items = items.len();
        self.write(WARDROBE_KEY, &items)?;

        self.write(SCHEMA_VERSION_KEY, &SCHEMA_VERSION)?;
        log::info!(
            "migration done: {} looks, {} dropped, {} wardrobe items",
            report.looks,
            report.dropped,
            report.wardrobe_items
        );
        Ok(Some(report))
    }

    /// Reads `key` as a JSON array of free-form records. Anything else is
    /// logged and treated as empty.
    fn legacy_array(&self, key: &str) -> Result<Vec<Value>> {
        let Some(text) = self.store.get(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(values)) => Ok(values),
            Ok(_) => {
                log::warn!("ignoring {key}: not an array");
                Ok(Vec::new())
            }
            Err(err) => {
                log::warn!("ignoring {key}: {err}");
                Ok(Vec::new())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Looks
    // ─────────────────────────────────────────────────────────────────────────────

    /// All looks, newest first.
    pub fn list(&self) -> Result<Vec<Look>> {
        Ok(self.read(LOOKS_KEY)?.unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<Option<Look>> {
        Ok(self.list()?.into_iter().find(|look| look.id == id))
    }

    /// Prepends a look. The collection is written in one `set`, so a failure
    /// leaves the stored looks exactly as they were.
    pub fn create(&mut self, look: Look) -> Result<()> {
        let mut looks = self.list()?;
        let id = look.id.clone();
        looks.insert(0, look);
        self.write(LOOKS_KEY, &looks)?;
        log::info!("saved look {id} ({} total)", looks.len());
        Ok(())
    }

    /// Removes a look from the collection, from any older key that still holds
    /// it, and drops its metadata. Returns whether anything was removed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let mut removed = false;

        let mut looks = self.list()?;
        let before = looks.len();
        looks.retain(|look| look.id != id);
        if looks.len() != before {
            self.write(LOOKS_KEY, &looks)?;
            removed = true;
        }

        for key in LEGACY_LOOK_KEYS {
            if self.store.get(key)?.is_none() {
                continue;
            }
            let mut records = self.legacy_array(key)?;
            let before = records.len();
            records.retain(|raw| legacy_id(raw).as_deref() != Some(id));
            if records.len() != before {
                self.write(key, &records)?;
                removed = true;
            }
        }

        let mut meta = self.all_meta()?;
        if meta.remove(id).is_some() {
            self.write(META_KEY, &meta)?;
            removed = true;
        }

        if removed {
            log::info!("deleted look {id}");
        }
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Likes & comments
    // ─────────────────────────────────────────────────────────────────────────────

    fn all_meta(&self) -> Result<BTreeMap<String, LookMeta>> {
        Ok(self.read(META_KEY)?.unwrap_or_default())
    }

    pub fn meta(&self, id: &str) -> Result<LookMeta> {
        Ok(self.all_meta()?.remove(id).unwrap_or_default())
    }

    pub fn toggle_like(&mut self, id: &str) -> Result<LookMeta> {
        let mut all = self.all_meta()?;
        let entry = all.entry(id.to_string()).or_default();
        entry.liked = !entry.liked;
        entry.likes = if entry.liked {
            entry.likes + 1
        } else {
            entry.likes.saturating_sub(1)
        };
        let updated = entry.clone();
        self.write(META_KEY, &all)?;
        Ok(updated)
    }

    /// Appends a comment. Blank text is ignored.
    pub fn add_comment(&mut self, id: &str, text: &str) -> Result<Option<LookComment>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let comment = LookComment {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            date: Utc::now().timestamp_millis(),
        };
        let mut all = self.all_meta()?;
        all.entry(id.to_string())
            .or_default()
            .comments
            .push(comment.clone());
        self.write(META_KEY, &all)?;
        Ok(Some(comment))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Wardrobe
    // ─────────────────────────────────────────────────────────────────────────────

    /// Wardrobe items, optionally restricted to one kind.
    pub fn wardrobe(&self, kind: Option<&str>) -> Result<Vec<WardrobeItem>> {
        let items: Vec<WardrobeItem> = self.read(WARDROBE_KEY)?.unwrap_or_default();
        Ok(match kind {
            Some(kind) => items
                .into_iter()
                .filter(|item| item.kind.as_deref() == Some(kind))
                .collect(),
            None => items,
        })
    }

    pub fn add_wardrobe_item(&mut self, item: WardrobeItem) -> Result<()> {
        let mut items = self.wardrobe(None)?;
        items.push(item);
        self.write(WARDROBE_KEY, &items)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Version 1 records
// ─────────────────────────────────────────────────────────────────────────────

/// A version-1 record read as a plain JSON object. Older builds wrote the same
/// field under different names, sometimes several at once; each accessor takes
/// the first candidate that holds a usable value.
struct LegacyRecord<'a>(&'a Map<String, Value>);

impl<'a> LegacyRecord<'a> {
    fn of(raw: &'a Value) -> Option<Self> {
        raw.as_object().map(Self)
    }

    fn values(&self, names: &'a [&'a str]) -> impl Iterator<Item = &'a Value> + 'a {
        let map = self.0;
        names.iter().filter_map(move |name| map.get(*name))
    }

    fn id(&self) -> Option<String> {
        self.values(&["id", "_id", "uid"]).find_map(id_text)
    }

    fn text(&self, names: &'a [&'a str]) -> Option<String> {
        self.values(names).find_map(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
    }

    fn image(&self, names: &'a [&'a str]) -> Option<StableImage> {
        self.text(names).as_deref().and_then(stable_image)
    }

    fn created_at(&self) -> Option<i64> {
        self.values(&["createdAt", "date"]).find_map(timestamp_millis)
    }
}

fn legacy_id(raw: &Value) -> Option<String> {
    LegacyRecord::of(raw)?.id()
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts Unix milliseconds as a number or numeric text, or RFC 3339 text.
fn timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|millis| millis as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|date| date.timestamp_millis())
            })
        }
        _ => None,
    }
}

fn stable_image(text: &str) -> Option<StableImage> {
    match StableImage::try_from(text.to_string()) {
        Ok(image) => Some(image),
        Err(err) => {
            log::warn!("dropping unreadable image reference: {err}");
            None
        }
    }
}

fn legacy_element(raw: &Value) -> Option<LookElement> {
    let record = LegacyRecord::of(raw)?;
    Some(LookElement {
        id: record.id().unwrap_or_else(|| Uuid::new_v4().to_string()),
        image: record.image(&["src", "image"])?,
        display_name: record.text(&["displayName", "name"]),
    })
}

fn legacy_wardrobe_item(raw: &Value) -> Option<WardrobeItem> {
    let Some(record) = LegacyRecord::of(raw) else {
        log::warn!("dropping wardrobe item that is not an object");
        return None;
    };
    Some(WardrobeItem {
        id: record.id().unwrap_or_else(|| Uuid::new_v4().to_string()),
        image: record.image(&["src", "image"])?,
        name: record.text(&["name"]),
        kind: record.text(&["kind"]),
    })
}

fn legacy_look(raw: &Value, source_key: &str, now: DateTime<Utc>) -> Option<Look> {
    let Some(record) = LegacyRecord::of(raw) else {
        log::warn!("dropping look in {source_key}: not an object");
        return None;
    };

    let elements = record
        .values(&["elements"])
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(legacy_element)
        .collect();

    Some(Look {
        id: record
            .id()
            .unwrap_or_else(|| format!("{source_key}-{}", Uuid::new_v4())),
        title: normalize_title(record.text(&["title", "name"]).as_deref().unwrap_or_default()),
        created_at: record
            .created_at()
            .unwrap_or_else(|| now.timestamp_millis()),
        collage: record.image(&["collageDataUrl", "collage", "canvasImage", "preview"]),
        photo: record.image(&["photoDataUrl", "photo", "basePhoto"]),
        elements,
    })
}
