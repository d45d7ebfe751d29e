//! Cache-and-fetch reconciliation.
//!
//! Decides which games need a store lookup, paces and retries those lookups,
//! and merges the answers into the cache. Per-game failures never abort a
//! batch; progress is saved every `checkpoint_every` games and before any
//! early return.

use crate::cache::{Cache, CacheStore};
use crate::config::{Credential, Settings};
use crate::error::{AppError, FetchError, Result};
use crate::game::{GameRecord, GameUpdate, PriceNote, PRICE_EPSILON};
use crate::pacing::{Pacer, RetryPolicy, Sleeper, ThreadSleeper, Throttle};
use crate::steam::{LibrarySource, PriceQuote, PriceSource};
use crate::user::SteamId;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PAUSE_SLICE: Duration = Duration::from_millis(100);

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    pub retry: RetryPolicy,
    pub throttle: Throttle,
    pub stale_after: chrono::Duration,
    pub checkpoint_every: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ReconcileOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            retry: settings.retry.clone(),
            throttle: settings.throttle.clone(),
            stale_after: chrono::Duration::days(settings.stale_after_days.clamp(0, 36_500)),
            checkpoint_every: settings.checkpoint_every.max(1),
        }
    }
}

/// What a refresh did, for the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// `game_count` reported by Steam, when the library was fetched.
    pub library_count: Option<usize>,
    /// Games Steam counted but did not return.
    pub shortfall: usize,
    pub added: usize,
    pub priced: usize,
    /// Definitive "no price" answers (no store page, not sold standalone).
    pub unpriced: usize,
    pub up_to_date: usize,
    pub skipped: Vec<u32>,
}

impl std::fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(count) = self.library_count {
            write!(f, "{count} games in library")?;
            if self.shortfall > 0 {
                write!(f, " ({} not returned by Steam)", self.shortfall)?;
            }
            write!(f, ", {} new. ", self.added)?;
        }
        write!(
            f,
            "{} priced, {} without a store price, {} already up to date, {} skipped after repeated failures",
            self.priced,
            self.unpriced,
            self.up_to_date,
            self.skipped.len()
        )
    }
}

enum Outcome {
    Quoted(PriceQuote),
    NoStorePage,
    Skipped(FetchError),
    Abort(FetchError),
    Interrupted,
}

/// One outstanding price request.
enum RequestState {
    Pending { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Done(Outcome),
}

pub struct Reconciler<'a, L, P> {
    library: &'a L,
    prices: &'a P,
    store: &'a CacheStore,
    options: ReconcileOptions,
    sleeper: &'a dyn Sleeper,
    abort: Arc<AtomicBool>,
}

impl<'a, L: LibrarySource, P: PriceSource> Reconciler<'a, L, P> {
    pub fn new(
        library: &'a L,
        prices: &'a P,
        store: &'a CacheStore,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            library,
            prices,
            store,
            options,
            sleeper: &THREAD_SLEEPER,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// When `flag` turns true the current operation saves and returns
    /// `AppError::Interrupted`.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = flag;
        self
    }

    /// Merges the owned-games list into `cache`, then prices every game that
    /// has no fresh store answer.
    pub fn refresh_all(
        &self,
        cache: &mut Cache,
        steam_id: &SteamId,
        credential: &Credential,
    ) -> Result<RefreshReport> {
        let library = self.library.owned_games(credential, steam_id)?;
        let mut report = RefreshReport {
            library_count: Some(library.reported_count.max(library.games.len())),
            shortfall: library.shortfall(),
            ..RefreshReport::default()
        };
        if report.shortfall > 0 {
            log::warn!(
                "Steam reported {} games but returned {}; continuing with those",
                library.reported_count,
                library.games.len()
            );
        }

        for game in &library.games {
            if !cache.contains(game.app_id) {
                report.added += 1;
            }
            cache.upsert(
                GameUpdate::new(game.app_id)
                    .name(game.name.as_str())
                    .playtime(game.playtime_forever),
            );
        }
        self.store.save(cache)?;
        log::info!(
            "Merged {} owned games ({} new)",
            library.games.len(),
            report.added
        );

        let cutoff = Utc::now() - self.options.stale_after;
        let region = self.prices.region();
        let pending: Vec<u32> = library
            .games
            .iter()
            .map(|g| g.app_id)
            .filter(|&id| cache.get(id).is_some_and(|r| r.needs_price(cutoff, region)))
            .collect();
        report.up_to_date = library.games.len() - pending.len();

        self.price_batch(cache, &pending, &mut report)?;
        Ok(report)
    }

    /// Re-prices one game that is already cached and refreshes its playtime
    /// from the owned-games list. Never fetches games the cache doesn't know.
    pub fn refresh_one(
        &self,
        cache: &mut Cache,
        app_id: u32,
        steam_id: &SteamId,
        credential: &Credential,
    ) -> Result<GameRecord> {
        if !cache.contains(app_id) {
            return Err(AppError::NotCached(app_id));
        }

        match self.library.owned_games(credential, steam_id) {
            Ok(library) => {
                if let Some(game) = library.games.iter().find(|g| g.app_id == app_id) {
                    cache.upsert(GameUpdate::new(app_id).playtime(game.playtime_forever));
                }
            }
            Err(e @ FetchError::Unauthorized(_)) => return Err(e.into()),
            Err(e) => log::warn!("Could not refresh playtime for app {app_id}: {e}"),
        }

        let mut pacer = Pacer::new(Duration::ZERO);
        let outcome = self.fetch_price(app_id, &mut pacer);
        let mut report = RefreshReport::default();
        let result = self.apply_outcome(cache, app_id, outcome, &mut report);
        self.store.save(cache)?;
        result?;

        cache
            .get(app_id)
            .cloned()
            .ok_or(AppError::NotCached(app_id))
    }

    /// Re-prices every cached game without touching the library endpoint.
    pub fn refresh_cached(&self, cache: &mut Cache) -> Result<RefreshReport> {
        let ids = cache.app_ids();
        let mut report = RefreshReport::default();
        self.price_batch(cache, &ids, &mut report)?;
        Ok(report)
    }

    fn price_batch(&self, cache: &mut Cache, ids: &[u32], report: &mut RefreshReport) -> Result<()> {
        let total = ids.len();
        let mut pacer = Pacer::new(self.options.throttle.interval_for(total));
        if total > self.options.throttle.threshold {
            log::info!(
                "{total} games to price; pacing requests to respect the store rate limit"
            );
        }

        let mut since_checkpoint = 0;
        for (i, &app_id) in ids.iter().enumerate() {
            let name = cache.get(app_id).map(|g| g.name.clone()).unwrap_or_default();
            log::info!("[{}/{}] {}", i + 1, total, name);

            let outcome = self.fetch_price(app_id, &mut pacer);
            if let Err(e) = self.apply_outcome(cache, app_id, outcome, report) {
                self.store.save(cache)?;
                return Err(e);
            }

            since_checkpoint += 1;
            if since_checkpoint >= self.options.checkpoint_every {
                self.store.save(cache)?;
                since_checkpoint = 0;
            }
        }
        self.store.save(cache)
    }

    fn apply_outcome(
        &self,
        cache: &mut Cache,
        app_id: u32,
        outcome: Outcome,
        report: &mut RefreshReport,
    ) -> Result<()> {
        let now = Utc::now();
        let region = self.prices.region();
        match outcome {
            Outcome::Quoted(quote) => {
                let update = GameUpdate::new(app_id).answered(region, now);
                let update = match quote {
                    PriceQuote::Paid { amount, currency } => {
                        report.priced += 1;
                        update.price(Some(amount), Some(currency)).note(None)
                    }
                    PriceQuote::Free => {
                        report.priced += 1;
                        update.price(Some(0.0), None).note(None)
                    }
                    PriceQuote::NotStandalone => {
                        report.unpriced += 1;
                        update.note(Some(PriceNote::NotStandalone))
                    }
                };
                cache.upsert(update);
            }
            Outcome::NoStorePage => {
                report.unpriced += 1;
                cache.upsert(
                    GameUpdate::new(app_id)
                        .note(Some(PriceNote::NoStorePage))
                        .answered(region, now),
                );
            }
            Outcome::Skipped(err) => {
                log::warn!("Skipping app {app_id} after repeated failures: {err}");
                report.skipped.push(app_id);
                // keep whatever price we had
                if cache.get(app_id).is_some_and(|g| g.price.is_none()) {
                    cache.upsert(GameUpdate::new(app_id).note(Some(PriceNote::LookupFailed)));
                }
            }
            Outcome::Abort(err) => return Err(err.into()),
            Outcome::Interrupted => return Err(AppError::Interrupted),
        }
        Ok(())
    }

    fn fetch_price(&self, app_id: u32, pacer: &mut Pacer) -> Outcome {
        let policy = &self.options.retry;
        let mut state = RequestState::Pending { attempt: 1 };
        loop {
            state = match state {
                RequestState::Pending { attempt } => {
                    if !self.pause(pacer.wait_time()) {
                        return Outcome::Interrupted;
                    }
                    pacer.mark_call();
                    match self.prices.price(app_id) {
                        Ok(quote) => RequestState::Done(Outcome::Quoted(quote)),
                        Err(FetchError::NotFound(reason)) => {
                            log::info!("App {app_id}: {reason}");
                            RequestState::Done(Outcome::NoStorePage)
                        }
                        Err(err) if !err.is_retryable() => RequestState::Done(Outcome::Abort(err)),
                        Err(err) if attempt >= policy.max_attempts => {
                            RequestState::Done(Outcome::Skipped(err))
                        }
                        Err(err) => {
                            let delay =
                                policy.backoff(attempt, err == FetchError::RateLimited);
                            log::debug!(
                                "App {app_id} attempt {attempt} failed ({err}); retrying in {delay:?}"
                            );
                            RequestState::Backoff { attempt, delay }
                        }
                    }
                }
                RequestState::Backoff { attempt, delay } => {
                    if !self.pause(delay) {
                        return Outcome::Interrupted;
                    }
                    RequestState::Pending {
                        attempt: attempt + 1,
                    }
                }
                RequestState::Done(outcome) => return outcome,
            };
        }
    }

    /// Sleeps in short slices so an interrupt is noticed quickly. Returns
    /// false if interrupted.
    fn pause(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.interrupted() {
                return false;
            }
            let slice = remaining.min(PAUSE_SLICE);
            self.sleeper.sleep(slice);
            remaining -= slice;
        }
        !self.interrupted()
    }

    fn interrupted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub game_count: usize,
    pub total_spend: f64,
    pub total_playtime_minutes: u64,
    /// Mean minutes-per-unit over played games with a non-zero price.
    pub average_ratio: Option<f64>,
    pub median_ratio: Option<f64>,
    pub unknown_price_count: usize,
    pub free_count: usize,
    pub unplayed_count: usize,
}

/// Aggregates over the cache. No network access.
pub fn compute_global_stats(cache: &Cache) -> StatsSummary {
    let mut stats = StatsSummary {
        game_count: cache.len(),
        ..StatsSummary::default()
    };
    let mut ratios = Vec::new();

    for game in cache.records() {
        stats.total_playtime_minutes += u64::from(game.playtime_minutes);
        match game.price {
            None => stats.unknown_price_count += 1,
            Some(price) if price <= PRICE_EPSILON => stats.free_count += 1,
            Some(price) => {
                stats.total_spend += price;
                if game.playtime_minutes == 0 {
                    stats.unplayed_count += 1;
                } else if let Some(ratio) = game.ratio() {
                    ratios.push(ratio);
                }
            }
        }
    }

    if !ratios.is_empty() {
        stats.average_ratio = Some(ratios.iter().sum::<f64>() / ratios.len() as f64);
        ratios.sort_by(f64::total_cmp);
        let mid = ratios.len() / 2;
        stats.median_ratio = Some(if ratios.len() % 2 == 0 {
            (ratios[mid - 1] + ratios[mid]) / 2.0
        } else {
            ratios[mid]
        });
    }
    stats
}
