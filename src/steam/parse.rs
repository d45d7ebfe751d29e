use super::{OwnedGame, OwnedLibrary, PriceQuote};
use crate::error::FetchError;
use json::JsonValue;

fn parse_body(text: &str) -> Result<JsonValue, FetchError> {
    // Steam sometimes answers with an HTML error page instead of JSON.
    json::parse(text).map_err(|e| {
        let preview: String = text.chars().take(80).collect();
        FetchError::Transient(format!("unparsable response ({e}): {preview:?}"))
    })
}

/// Parses `IPlayerService/GetOwnedGames`. Entries missing an app id are
/// dropped and show up as a shortfall against `game_count`.
pub fn parse_owned_games(text: &str) -> Result<OwnedLibrary, FetchError> {
    let parsed = parse_body(text)?;
    let response = &parsed["response"];

    // private profiles get an empty `response` object
    let Some(reported_count) = response["game_count"].as_usize() else {
        return Err(FetchError::NotFound(
            "no game list returned; the profile may be private".to_string(),
        ));
    };

    let games = response["games"]
        .members()
        .filter_map(|g| {
            let app_id = g["appid"].as_u32()?;
            let name = match g["name"].as_str() {
                Some(name) => name.to_string(),
                None => format!("App {app_id}"),
            };
            let playtime = g["playtime_forever"].as_u32().unwrap_or(0);
            Some(OwnedGame::new(app_id, name, playtime))
        })
        .collect();

    Ok(OwnedLibrary {
        reported_count,
        games,
    })
}

/// Parses `store.steampowered.com/api/appdetails` for a single app.
pub fn parse_price(app_id: u32, text: &str) -> Result<PriceQuote, FetchError> {
    let parsed = parse_body(text)?;
    if parsed.is_null() {
        return Err(FetchError::RateLimited);
    }

    let entry = &parsed[app_id.to_string().as_str()];
    let data = &entry["data"];
    if entry["success"].as_bool() != Some(true) || !data.is_object() {
        return Err(FetchError::NotFound(format!("app {app_id} has no store page")));
    }

    if data["is_free"].as_bool() == Some(true) {
        return Ok(PriceQuote::Free);
    }

    let overview = &data["price_overview"];
    let Some(cents) = overview["initial"].as_f64() else {
        return Ok(PriceQuote::NotStandalone);
    };
    let currency = overview["currency"].as_str().unwrap_or("???").to_string();
    Ok(PriceQuote::Paid {
        amount: cents / 100.0,
        currency,
    })
}

/// Parses `ISteamUser/GetPlayerSummaries` for the first player's persona.
pub fn parse_persona_name(text: &str) -> Result<String, FetchError> {
    let parsed = parse_body(text)?;
    parsed["response"]["players"][0]["personaname"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FetchError::NotFound("no player with that Steam ID".to_string()))
}
