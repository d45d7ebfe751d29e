use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Smallest price used as a divisor. Anything at or below it counts as free.
pub const PRICE_EPSILON: f64 = 1e-9;

/// Why a cached game has no usable price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceNote {
    NoStorePage,
    NotStandalone,
    LookupFailed,
}

impl PriceNote {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoStorePage => "no_store_page",
            Self::NotStandalone => "not_standalone",
            Self::LookupFailed => "lookup_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_store_page" => Some(Self::NoStorePage),
            "not_standalone" => Some(Self::NotStandalone),
            "lookup_failed" => Some(Self::LookupFailed),
            _ => None,
        }
    }

    pub const fn describe(self) -> &'static str {
        match self {
            Self::NoStorePage => "No store page",
            Self::NotStandalone => "Not standalone",
            Self::LookupFailed => "Price lookup failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub app_id: u32,
    pub name: String,
    pub playtime_minutes: u32,
    pub price: Option<f64>,
    pub currency: Option<String>,
    /// Store region (`cc`) the price was looked up in.
    pub region: Option<String>,
    pub note: Option<PriceNote>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl GameRecord {
    pub fn new(app_id: u32, name: impl Into<String>, playtime_minutes: u32) -> Self {
        Self {
            app_id,
            name: name.into(),
            playtime_minutes,
            price: None,
            currency: None,
            region: None,
            note: None,
            last_updated: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Minutes played per currency unit. Free games get `f64::INFINITY`,
    /// unknown prices get `None`.
    pub fn ratio(&self) -> Option<f64> {
        self.price
            .map(|price| compute_ratio(self.playtime_minutes, price))
    }

    pub fn is_free(&self) -> bool {
        self.price.is_some_and(|p| p <= PRICE_EPSILON)
    }

    /// No definitive store answer yet, the last one predates `cutoff`, or it
    /// came from another store region and so from another currency.
    pub fn needs_price(&self, cutoff: DateTime<Utc>, region: &str) -> bool {
        if self.region.as_deref() != Some(region) {
            return true;
        }
        self.last_updated.map_or(true, |updated| updated < cutoff)
    }
}

pub fn compute_ratio(playtime_minutes: u32, price: f64) -> f64 {
    if price <= PRICE_EPSILON {
        // free: a sentinel that sorts before every finite ratio
        return f64::INFINITY;
    }
    f64::from(playtime_minutes) / price
}

/// Descending by ratio: free games first, unknown prices last, ties by app id.
pub fn by_ratio_desc(a: &GameRecord, b: &GameRecord) -> Ordering {
    match (a.ratio(), b.ratio()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.app_id.cmp(&b.app_id))
}

/// A partial record for `Cache::upsert`. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameUpdate {
    pub app_id: u32,
    pub name: Option<String>,
    pub playtime_minutes: Option<u32>,
    pub price: Option<Option<f64>>,
    pub currency: Option<Option<String>>,
    pub region: Option<Option<String>>,
    pub note: Option<Option<PriceNote>>,
    pub last_updated: Option<Option<DateTime<Utc>>>,
}

impl GameUpdate {
    pub fn new(app_id: u32) -> Self {
        Self {
            app_id,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn playtime(mut self, minutes: u32) -> Self {
        self.playtime_minutes = Some(minutes);
        self
    }

    pub fn price(mut self, price: Option<f64>, currency: Option<String>) -> Self {
        self.price = Some(price);
        self.currency = Some(currency);
        self
    }

    pub fn note(mut self, note: Option<PriceNote>) -> Self {
        self.note = Some(note);
        self
    }

    /// Marks a definitive store answer given for `region` at `at`.
    pub fn answered(mut self, region: &str, at: DateTime<Utc>) -> Self {
        self.region = Some(Some(region.to_string()));
        self.last_updated = Some(Some(at));
        self
    }

    pub(crate) fn apply(self, record: &mut GameRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(minutes) = self.playtime_minutes {
            record.playtime_minutes = minutes;
        }
        if let Some(price) = self.price {
            record.price = price;
        }
        if let Some(currency) = self.currency {
            record.currency = currency;
        }
        if let Some(region) = self.region {
            record.region = region;
        }
        if let Some(note) = self.note {
            record.note = note;
        }
        if let Some(at) = self.last_updated {
            record.last_updated = at;
        }
    }
}

impl From<GameRecord> for GameUpdate {
    fn from(record: GameRecord) -> Self {
        Self {
            app_id: record.app_id,
            name: Some(record.name),
            playtime_minutes: Some(record.playtime_minutes),
            price: Some(record.price),
            currency: Some(record.currency),
            region: Some(record.region),
            note: Some(record.note),
            last_updated: Some(record.last_updated),
        }
    }
}
