use crate::game::Game;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

const OWNED_GAMES_URL: &str =
    "https://api.steampowered.com/IPlayerService/GetOwnedGames/v0001/";
const USER_AGENT: &str = "backloggr";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Steam API request timed out")]
    Timeout,
    #[error("could not reach the Steam API: {0}")]
    Connection(String),
    #[error("Steam API rejected the request (HTTP {0}); check your API key and SteamID")]
    Unauthorized(u16),
    #[error("Steam API returned an unexpected response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: OwnedGames,
}

#[derive(Debug, Deserialize)]
struct OwnedGames {
    games: Option<Vec<OwnedGame>>,
}

#[derive(Debug, Deserialize)]
struct OwnedGame {
    appid: u64,
    name: Option<String>,
    #[serde(default)]
    playtime_forever: u64,
    #[serde(default)]
    playtime_2weeks: u64,
    #[serde(default)]
    rtime_last_played: i64,
    #[serde(flatten, default)]
    extra: Map<String, Value>,
}

/// Single bounded attempt; every failure class collapses to "fetch
/// unavailable" at the call site and the previous snapshot stays valid.
pub fn fetch_owned_games(api_key: &str, steam_id: &str) -> Result<Vec<Game>, FetchError> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(15))
        .timeout_write(Duration::from_secs(15))
        .build();
    let result = agent
        .get(OWNED_GAMES_URL)
        .set("User-Agent", USER_AGENT)
        .query("key", api_key)
        .query("steamid", steam_id)
        .query("format", "json")
        .query("include_appinfo", "1")
        .call();

    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(code @ (401 | 403), _)) => {
            return Err(FetchError::Unauthorized(code));
        }
        Err(ureq::Error::Status(code, _)) => {
            return Err(FetchError::Connection(format!("HTTP {code}")));
        }
        Err(ureq::Error::Transport(transport)) => {
            let message = transport.to_string();
            if message.contains("timed out") {
                return Err(FetchError::Timeout);
            }
            return Err(FetchError::Connection(message));
        }
    };

    let body: Value = response
        .into_json()
        .map_err(|err| FetchError::Malformed(err.to_string()))?;
    parse_owned_games(body)
}

fn parse_owned_games(body: Value) -> Result<Vec<Game>, FetchError> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|err| FetchError::Malformed(err.to_string()))?;
    let Some(owned) = envelope.response.games else {
        return Err(FetchError::Malformed(
            "no games in response; is the profile public?".to_string(),
        ));
    };

    Ok(owned
        .into_iter()
        .map(|raw| Game {
            appid: raw.appid.to_string(),
            name: raw.name.unwrap_or_else(|| format!("App {}", raw.appid)),
            playtime_forever: raw.playtime_forever,
            playtime_2weeks: raw.playtime_2weeks,
            rtime_last_played: raw.rtime_last_played,
            platform: None,
            extra: raw.extra,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_appids_become_strings() {
        let body = json!({
            "response": {
                "game_count": 2,
                "games": [
                    {"appid": 10, "name": "Counter-Strike", "playtime_forever": 120},
                    {"appid": 400, "name": "Portal", "playtime_2weeks": 30,
                     "img_icon_url": "abc123"}
                ]
            }
        });
        let games = parse_owned_games(body).unwrap();
        assert_eq!(games[0].appid, "10");
        assert_eq!(games[0].playtime_forever, 120);
        assert_eq!(games[1].appid, "400");
        assert_eq!(games[1].playtime_2weeks, 30);
        assert_eq!(games[1].extra["img_icon_url"], "abc123");
    }

    #[test]
    fn missing_name_falls_back_to_appid() {
        let body = json!({
            "response": {"games": [{"appid": 10}]}
        });
        let games = parse_owned_games(body).unwrap();
        assert_eq!(games[0].name, "App 10");
    }

    #[test]
    fn empty_response_is_malformed() {
        let body = json!({"response": {}});
        assert!(matches!(
            parse_owned_games(body),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let body = json!({"games": []});
        assert!(matches!(
            parse_owned_games(body),
            Err(FetchError::Malformed(_))
        ));
    }
}
