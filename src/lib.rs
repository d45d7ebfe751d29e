//! Playtime-to-price statistics for a Steam library.
//!
//! The owned-games list and store prices are fetched from Steam, merged into
//! a per-account JSON cache, and reported as minutes played per currency unit.

pub mod cache;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod game;
pub mod pacing;
pub mod reconcile;
pub mod report;
pub mod steam;
pub mod user;

pub use cache::{Cache, CacheStore};
pub use config::{Credential, Settings};
pub use error::{AppError, FetchError, Result};
pub use game::{GameRecord, GameUpdate, PriceNote};
pub use reconcile::{compute_global_stats, ReconcileOptions, Reconciler, RefreshReport, StatsSummary};
