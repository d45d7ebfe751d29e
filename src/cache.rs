use crate::error::{AppError, Result};
use crate::game::{GameRecord, GameUpdate, PriceNote};
use chrono::{DateTime, Utc};
use json::JsonValue;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

pub const GAME_STATS_FILE: &str = "games_stats.json";
pub const FORMATTED_STATS_FILE: &str = "formatted_stats.txt";

const FORMAT_VERSION: u32 = 1;

/// Last-known stats for every game of one account, keyed by app id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cache {
    games: BTreeMap<u32, GameRecord>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_id: u32) -> Option<&GameRecord> {
        self.games.get(&app_id)
    }

    pub fn contains(&self, app_id: u32) -> bool {
        self.games.contains_key(&app_id)
    }

    /// Merges `update` into the record with the same app id, creating it if
    /// needed. Fields the update leaves as `None` keep their current value.
    pub fn upsert(&mut self, update: impl Into<GameUpdate>) -> &GameRecord {
        let update = update.into();
        let record = self
            .games
            .entry(update.app_id)
            .or_insert_with(|| GameRecord::new(update.app_id, String::new(), 0));
        update.apply(record);
        record
    }

    pub fn app_ids(&self) -> Vec<u32> {
        self.games.keys().copied().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &GameRecord> {
        self.games.values()
    }

    /// Case-insensitive name search, exact matches first.
    pub fn find_by_name(&self, query: &str) -> Vec<&GameRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<&GameRecord> = self
            .records()
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .collect();
        hits.sort_by_key(|g| (g.name.to_lowercase() != needle, g.name.to_lowercase()));
        hits
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    fn to_json(&self) -> JsonValue {
        let mut games = JsonValue::new_array();
        for record in self.records() {
            // pushing onto an array we just created cannot fail
            let _ = games.push(record_to_json(record));
        }
        let mut root = JsonValue::new_object();
        root["version"] = FORMAT_VERSION.into();
        root["games"] = games;
        root
    }

    fn from_json(root: &JsonValue) -> std::result::Result<Self, String> {
        if !root["games"].is_array() {
            return Err("missing \"games\" array".to_string());
        }
        let mut cache = Self::new();
        for (i, entry) in root["games"].members().enumerate() {
            let record = record_from_json(entry).map_err(|e| format!("entry {i}: {e}"))?;
            cache.upsert(record);
        }
        Ok(cache)
    }
}

fn optional<T: Into<JsonValue>>(value: Option<T>) -> JsonValue {
    match value {
        Some(v) => v.into(),
        None => JsonValue::Null,
    }
}

fn record_to_json(record: &GameRecord) -> JsonValue {
    let mut obj = JsonValue::new_object();
    obj["app_id"] = record.app_id.into();
    obj["name"] = record.name.as_str().into();
    obj["playtime_minutes"] = record.playtime_minutes.into();
    obj["price"] = optional(record.price);
    // display only; recomputed from price and playtime on load
    obj["ratio"] = optional(record.ratio().filter(|r| r.is_finite()));
    obj["currency"] = optional(record.currency.as_deref());
    obj["region"] = optional(record.region.as_deref());
    obj["note"] = optional(record.note.map(PriceNote::as_str));
    obj["last_updated"] = optional(record.last_updated.map(|t| t.to_rfc3339()));
    obj
}

fn record_from_json(obj: &JsonValue) -> std::result::Result<GameRecord, String> {
    let app_id = obj["app_id"].as_u32().ok_or("missing or invalid app_id")?;
    let name = obj["name"].as_str().unwrap_or_default();
    let playtime = obj["playtime_minutes"]
        .as_u32()
        .ok_or("missing or invalid playtime_minutes")?;

    let mut record = GameRecord::new(app_id, name, playtime);
    if !obj["price"].is_null() {
        let price = obj["price"].as_f64().ok_or("invalid price")?;
        if price < 0.0 || !price.is_finite() {
            return Err(format!("invalid price {price}"));
        }
        record.price = Some(price);
    }
    record.currency = obj["currency"].as_str().map(str::to_string);
    record.region = obj["region"].as_str().map(str::to_string);
    record.note = obj["note"].as_str().and_then(PriceNote::parse);
    record.last_updated = match obj["last_updated"].as_str() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| format!("invalid last_updated {raw:?}: {e}"))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    Ok(record)
}

/// The on-disk home of one account's `Cache`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    folder: PathBuf,
}

impl CacheStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.folder.join(GAME_STATS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.folder.join(FORMATTED_STATS_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Reads the cache file. A missing file is an empty cache; a corrupt one
    /// is an error so a later save cannot clobber it.
    pub fn load(&self) -> Result<Cache> {
        let path = self.path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No cache at {}, starting empty", path.display());
                return Ok(Cache::new());
            }
            Err(e) => return Err(e.into()),
        };

        let format_error = |reason: String| AppError::CacheFormat {
            path: path.display().to_string(),
            reason,
        };
        let root = json::parse(&text).map_err(|e| format_error(e.to_string()))?;
        let cache = Cache::from_json(&root).map_err(format_error)?;

        log::info!("Loaded {} cached games from {}", cache.len(), path.display());
        Ok(cache)
    }

    /// Writes to a temporary file then renames it over the cache file, so a
    /// crash mid-write leaves the previous cache intact.
    pub fn save(&self, cache: &Cache) -> Result<()> {
        std::fs::create_dir_all(&self.folder)?;
        let path = self.path();
        let tmp = self.folder.join(format!("{GAME_STATS_FILE}.tmp"));

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(cache.to_json().pretty(4).as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &path)?;

        log::debug!("Saved {} games to {}", cache.len(), path.display());
        Ok(())
    }

    pub fn write_report(&self, report: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.folder)?;
        let path = self.report_path();
        std::fs::write(&path, report)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_cache() -> Cache {
        let mut cache = Cache::new();
        let mut priced = GameRecord::new(620, "Portal 2", 600).with_price(19.5);
        priced.currency = Some("EUR".into());
        priced.region = Some("FR".into());
        priced.last_updated = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        cache.upsert(priced);
        cache.upsert(GameRecord::new(440, "Team Fortress 2", 1200).with_price(0.0));
        let mut unknown = GameRecord::new(10, "Counter-Strike", 45);
        unknown.note = Some(PriceNote::NoStorePage);
        cache.upsert(unknown);
        cache
    }

    #[test]
    fn upsert_is_idempotent() {
        let record = GameRecord::new(1, "Celeste", 500).with_price(19.99);
        let mut once = Cache::new();
        once.upsert(record.clone());
        let mut twice = once.clone();
        twice.upsert(record);
        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn upsert_preserves_unsupplied_fields() {
        let mut cache = Cache::new();
        cache.upsert(GameRecord::new(1, "Celeste", 500).with_price(19.99));
        let merged = cache
            .upsert(GameUpdate::new(1).playtime(800).name("Celeste"))
            .clone();
        assert_eq!(merged.playtime_minutes, 800);
        assert_eq!(merged.price, Some(19.99));
    }

    #[test]
    fn upsert_creates_missing_records() {
        let mut cache = Cache::new();
        cache.upsert(GameUpdate::new(7).name("Fresh").playtime(3));
        assert_eq!(cache.get(7).unwrap().name, "Fresh");
        assert_eq!(cache.get(7).unwrap().price, None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("main_76561198142605500"));
        let cache = sample_cache();

        store.save(&cache).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.app_ids(), vec![10, 440, 620]);
        assert_eq!(loaded, cache);
        assert!(!dir
            .path()
            .join("main_76561198142605500")
            .join("games_stats.json.tmp")
            .exists());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        assert!(!store.exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_not_an_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(AppError::CacheFormat { .. })));

        std::fs::write(store.path(), r#"{"games": [{"name": "no id"}]}"#).unwrap();
        assert!(matches!(store.load(), Err(AppError::CacheFormat { .. })));
    }

    #[test]
    fn ratio_is_written_for_display_and_null_when_infinite() {
        let json = sample_cache().to_json();
        let games: Vec<&JsonValue> = json["games"].members().collect();
        assert!(games[0]["ratio"].is_null()); // unknown price
        assert!(games[1]["ratio"].is_null()); // free
        assert_eq!(games[2]["ratio"].as_f64().map(|r| r.round()), Some(31.0));
        assert_eq!(games[2]["last_updated"].as_str(), Some("2026-03-01T12:00:00+00:00"));
        assert_eq!(games[2]["region"].as_str(), Some("FR"));
    }

    #[test]
    fn duplicate_entries_on_disk_collapse_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        std::fs::write(
            store.path(),
            r#"{"version": 1, "games": [
                {"app_id": 5, "name": "Old", "playtime_minutes": 1, "price": null},
                {"app_id": 5, "name": "New", "playtime_minutes": 2, "price": 4.0}
            ]}"#,
        )
        .unwrap();
        let cache = store.load().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(5).unwrap().name, "New");
        assert_eq!(cache.get(5).unwrap().price, Some(4.0));
    }

    #[test]
    fn find_by_name_prefers_exact_matches() {
        let mut cache = sample_cache();
        cache.upsert(GameRecord::new(400, "Portal", 90));
        let hits: Vec<u32> = cache.find_by_name("portal").iter().map(|g| g.app_id).collect();
        assert_eq!(hits, vec![400, 620]);
        assert!(cache.find_by_name("   ").is_empty());
    }
}
