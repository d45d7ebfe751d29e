use super::parse::{parse_owned_games, parse_persona_name, parse_price};
use super::{LibrarySource, OwnedLibrary, PriceQuote, PriceSource};
use crate::config::Credential;
use crate::error::FetchError;
use crate::user::SteamId;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.steampowered.com";
pub const DEFAULT_STORE_BASE: &str = "https://store.steampowered.com";

const USER_AGENT: &str = concat!("playtime-ratio/", env!("CARGO_PKG_VERSION"));

/// Blocking client for the Steam Web API and the store's appdetails endpoint.
pub struct SteamClient {
    http: Client,
    api_base: String,
    store_base: String,
    country: String,
}

impl SteamClient {
    pub fn new(country: &str) -> Result<Self, FetchError> {
        Self::with_base_urls(country, DEFAULT_API_BASE, DEFAULT_STORE_BASE)
    }

    pub fn with_base_urls(
        country: &str,
        api_base: &str,
        store_base: &str,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            store_base: store_base.trim_end_matches('/').to_string(),
            country: country.to_string(),
        })
    }

    pub fn persona_name(
        &self,
        credential: &Credential,
        steam_id: &SteamId,
    ) -> Result<String, FetchError> {
        let response = self
            .http
            .get(format!(
                "{}/ISteamUser/GetPlayerSummaries/v0002/",
                self.api_base
            ))
            .query(&[
                ("key", credential.api_key()),
                ("steamids", steam_id.as_str()),
                ("format", "json"),
            ])
            .send()?;
        parse_persona_name(&body(response)?)
    }
}

/// Maps HTTP status to a classified failure and returns the body otherwise.
fn body(response: Response) -> Result<String, FetchError> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response.text()?),
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Unauthorized(
            format!("Steam rejected the API key ({status})"),
        )),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
            Err(FetchError::NotFound(format!("Steam answered {status}")))
        }
        _ => Err(FetchError::Transient(format!("Steam answered {status}"))),
    }
}

impl LibrarySource for SteamClient {
    fn owned_games(
        &self,
        credential: &Credential,
        steam_id: &SteamId,
    ) -> Result<OwnedLibrary, FetchError> {
        log::debug!("Fetching owned games for {steam_id}");
        let response = self
            .http
            .get(format!("{}/IPlayerService/GetOwnedGames/v0001/", self.api_base))
            .query(&[
                ("key", credential.api_key()),
                ("steamid", steam_id.as_str()),
                ("include_appinfo", "1"),
                ("include_played_free_games", "1"),
                ("format", "json"),
            ])
            .send()?;
        parse_owned_games(&body(response)?)
    }
}

impl PriceSource for SteamClient {
    fn price(&self, app_id: u32) -> Result<PriceQuote, FetchError> {
        log::debug!("Fetching store price for app {app_id}");
        let app_id_param = app_id.to_string();
        let response = self
            .http
            .get(format!("{}/api/appdetails", self.store_base))
            .query(&[
                ("appids", app_id_param.as_str()),
                ("cc", self.country.as_str()),
                ("filters", "basic,price_overview"),
            ])
            .send()?;
        parse_price(app_id, &body(response)?)
    }

    fn region(&self) -> &str {
        &self.country
    }
}
