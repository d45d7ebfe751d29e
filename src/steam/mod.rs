// !! Critical knowledge !!
//
// Steam updates playtime returned by the Web API:
// 1) When a game session ends, and
// 2) Every 30 minutes a game session is active.
//
// The store endpoint (appdetails) is separately rate limited, roughly 200
// requests per 5 minutes. When over the limit it answers `null` with a 200.

mod client;
mod parse;

pub use client::{SteamClient, DEFAULT_API_BASE, DEFAULT_STORE_BASE};
pub use parse::{parse_owned_games, parse_persona_name, parse_price};

use crate::config::Credential;
use crate::error::FetchError;
use crate::user::SteamId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedGame {
    pub app_id: u32,
    pub name: String,
    pub playtime_forever: u32,
}

impl OwnedGame {
    pub fn new(app_id: u32, name: impl Into<String>, playtime_forever: u32) -> Self {
        Self {
            app_id,
            name: name.into(),
            playtime_forever,
        }
    }
}

/// What the owned-games endpoint returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedLibrary {
    /// `game_count` as reported by Steam. Can exceed `games.len()`.
    pub reported_count: usize,
    pub games: Vec<OwnedGame>,
}

impl OwnedLibrary {
    pub fn shortfall(&self) -> usize {
        self.reported_count.saturating_sub(self.games.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PriceQuote {
    Paid { amount: f64, currency: String },
    Free,
    /// Sold only as part of a bundle or package.
    NotStandalone,
}

pub trait LibrarySource {
    fn owned_games(
        &self,
        credential: &Credential,
        steam_id: &SteamId,
    ) -> Result<OwnedLibrary, FetchError>;
}

pub trait PriceSource {
    fn price(&self, app_id: u32) -> Result<PriceQuote, FetchError>;

    /// Store region the quotes are for. Prices from different regions are in
    /// different currencies.
    fn region(&self) -> &str;
}
