//! Tests for the blocking Steam client against a mock server.

use playtime_ratio::cache::{Cache, CacheStore};
use playtime_ratio::config::Credential;
use playtime_ratio::error::FetchError;
use playtime_ratio::pacing::Sleeper;
use playtime_ratio::reconcile::{ReconcileOptions, Reconciler};
use playtime_ratio::steam::{LibrarySource, PriceQuote, PriceSource, SteamClient};
use playtime_ratio::user::SteamId;
use wiremock::matchers::{method, path, query_param};
use std::time::Duration;
use wiremock::{Mock, MockServer, ResponseTemplate};

const STEAM_ID: &str = "76561198142605500";
const KEY: &str = "0123456789ABCDEF0123456789ABCDEF";

/// Blocking clients must be built and dropped off the async runtime.
fn client_for(base: &str) -> SteamClient {
    SteamClient::with_base_urls("FR", base, base).unwrap()
}

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

fn credential() -> Credential {
    Credential::new(KEY).unwrap()
}

fn steam_id() -> SteamId {
    SteamId::parse(STEAM_ID).unwrap()
}

const OWNED_GAMES: &str = r#"{"response": {"game_count": 2, "games": [
    {"appid": 440, "name": "Team Fortress 2", "playtime_forever": 1200},
    {"appid": 620, "name": "Portal 2", "playtime_forever": 600}
]}}"#;

async fn mount_owned_games(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/IPlayerService/GetOwnedGames/v0001/"))
        .and(query_param("key", KEY))
        .and(query_param("steamid", STEAM_ID))
        .and(query_param("include_appinfo", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(OWNED_GAMES, "application/json"),
        )
        .mount(server)
        .await;
}

async fn mount_price(server: &MockServer, app_id: &str, status: u16, body: &'static str) {
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", app_id))
        .and(query_param("cc", "FR"))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn owned_games_are_fetched_with_key_and_id() {
    let server = MockServer::start().await;
    mount_owned_games(&server).await;

    let base = server.uri();
    let library = tokio::task::spawn_blocking(move || {
        client_for(&base).owned_games(&credential(), &steam_id())
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(library.reported_count, 2);
    assert_eq!(library.games[0].app_id, 440);
    assert_eq!(library.games[1].playtime_forever, 600);
}

#[tokio::test]
async fn forbidden_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/IPlayerService/GetOwnedGames/v0001/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let base = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        client_for(&base).owned_games(&credential(), &steam_id())
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(FetchError::Unauthorized(_))));
}

#[tokio::test]
async fn price_statuses_are_classified() {
    let server = MockServer::start().await;
    mount_price(
        &server,
        "620",
        200,
        r#"{"620": {"success": true, "data": {"is_free": false,
            "price_overview": {"currency": "EUR", "initial": 999, "final": 999}}}}"#,
    )
    .await;
    mount_price(&server, "1", 429, "").await;
    mount_price(&server, "2", 503, "").await;
    mount_price(&server, "3", 200, "null").await;
    mount_price(&server, "4", 200, r#"{"4": {"success": false}}"#).await;

    let base = server.uri();
    let results = tokio::task::spawn_blocking(move || {
        let client = client_for(&base);
        [620, 1, 2, 3, 4].map(|id| client.price(id))
    })
    .await
    .unwrap();

    assert_eq!(
        results[0],
        Ok(PriceQuote::Paid {
            amount: 9.99,
            currency: "EUR".to_string()
        })
    );
    assert_eq!(results[1], Err(FetchError::RateLimited));
    assert!(matches!(results[2], Err(FetchError::Transient(_))));
    assert_eq!(results[3], Err(FetchError::RateLimited));
    assert!(matches!(results[4], Err(FetchError::NotFound(_))));
}

#[tokio::test]
async fn full_refresh_against_mock_steam() {
    let server = MockServer::start().await;
    mount_owned_games(&server).await;
    mount_price(
        &server,
        "440",
        200,
        r#"{"440": {"success": true, "data": {"is_free": true}}}"#,
    )
    .await;
    mount_price(
        &server,
        "620",
        200,
        r#"{"620": {"success": true, "data": {"is_free": false,
            "price_overview": {"currency": "EUR", "initial": 2000, "final": 500}}}}"#,
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().to_path_buf();
    let base = server.uri();

    let cache = tokio::task::spawn_blocking(move || {
        let client = client_for(&base);
        let store = CacheStore::new(folder);
        let mut cache = Cache::new();
        Reconciler::new(&client, &client, &store, ReconcileOptions::default())
            .with_sleeper(&NoSleep)
            .refresh_all(&mut cache, &steam_id(), &credential())
            .unwrap();
        assert_eq!(store.load().unwrap(), cache);
        cache
    })
    .await
    .unwrap();

    assert_eq!(cache.app_ids(), vec![440, 620]);
    assert_eq!(cache.get(440).unwrap().ratio(), Some(f64::INFINITY));
    assert_eq!(cache.get(620).unwrap().ratio(), Some(30.0));
    assert_eq!(cache.get(620).unwrap().currency.as_deref(), Some("EUR"));
    assert_eq!(cache.get(620).unwrap().region.as_deref(), Some("FR"));
}

#[tokio::test]
async fn persona_name_is_looked_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ISteamUser/GetPlayerSummaries/v0002/"))
        .and(query_param("steamids", STEAM_ID))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"response": {"players": [{"personaname": "gaben"}]}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let base = server.uri();
    let name =
        tokio::task::spawn_blocking(move || client_for(&base).persona_name(&credential(), &steam_id()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(name, "gaben");
}
