use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use time::{macros::format_description, OffsetDateTime};

pub const MANUAL_PREFIX: &str = "manual_";
pub const STEAM_SOURCE: &str = "Steam";
pub const DEFAULT_PLATFORM: &str = "Other";

/// A game falls from "inactive" to "dropped" after this long without a session.
const DROP_AFTER_SECS: i64 = 180 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub appid: String,
    pub name: String,
    #[serde(default)]
    pub playtime_forever: u64,
    #[serde(default)]
    pub playtime_2weeks: u64,
    #[serde(default)]
    pub rtime_last_played: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    // Catalog fields we don't model (icon hashes etc.) survive a re-save.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Game {
    pub fn is_manual(&self) -> bool {
        self.appid.starts_with(MANUAL_PREFIX)
    }

    pub fn source_label(&self) -> String {
        if self.is_manual() {
            self.platform
                .clone()
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string())
        } else {
            STEAM_SOURCE.to_string()
        }
    }

    pub fn hours(&self) -> f64 {
        self.playtime_forever as f64 / 60.0
    }

    pub fn last_played_day(&self) -> Option<String> {
        format_day(self.rtime_last_played)
    }
}

/// `YYYY-MM-DD`, or None for the "never" sentinel (0) and nonsense values.
pub fn format_day(timestamp: i64) -> Option<String> {
    if timestamp <= 0 {
        return None;
    }
    let date = OffsetDateTime::from_unix_timestamp(timestamp).ok()?;
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Playing,
    Backlog,
    Dropped,
    Inactive,
    Completed,
    Hold,
}

impl Status {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "playing" => Some(Status::Playing),
            "backlog" => Some(Status::Backlog),
            "dropped" => Some(Status::Dropped),
            "inactive" => Some(Status::Inactive),
            "completed" => Some(Status::Completed),
            "hold" => Some(Status::Hold),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Playing => "playing",
            Status::Backlog => "backlog",
            Status::Dropped => "dropped",
            Status::Inactive => "inactive",
            Status::Completed => "completed",
            Status::Hold => "hold",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only two statuses a user may force; everything else is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    Completed,
    Hold,
}

impl OverrideStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "completed" => Some(OverrideStatus::Completed),
            "hold" => Some(OverrideStatus::Hold),
            _ => None,
        }
    }

    pub fn as_status(self) -> Status {
        match self {
            OverrideStatus::Completed => Status::Completed,
            OverrideStatus::Hold => Status::Hold,
        }
    }
}

pub type StatusOverrides = BTreeMap<String, OverrideStatus>;

/// Recomputed from raw counters on every query; only the two override
/// states are sticky. First match wins.
pub fn status(game: &Game, overrides: &StatusOverrides, now: i64) -> Status {
    if let Some(forced) = overrides.get(&game.appid) {
        return forced.as_status();
    }
    if game.playtime_2weeks > 0 {
        return Status::Playing;
    }
    if game.playtime_forever == 0 {
        return Status::Backlog;
    }
    if game.rtime_last_played > 0 && now - game.rtime_last_played > DROP_AFTER_SECS {
        return Status::Dropped;
    }
    Status::Inactive
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Catalog entries first, manual entries after, original order kept on
/// both sides. Appid uniqueness is guaranteed by the manual_ prefix.
pub fn merge(catalog: &[Game], manual: &[Game]) -> Vec<Game> {
    catalog.iter().chain(manual.iter()).cloned().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameMatch {
    Found(Game),
    NotFound,
    Ambiguous(Vec<Game>),
}

/// Exact case-insensitive match wins outright; otherwise fall back to a
/// substring scan so loose terms still resolve when unambiguous.
pub fn find_game_by_name(games: &[Game], term: &str) -> GameMatch {
    let needle = term.to_lowercase();
    if let Some(game) = games.iter().find(|g| g.name.to_lowercase() == needle) {
        return GameMatch::Found(game.clone());
    }

    let mut matches: Vec<Game> = games
        .iter()
        .filter(|g| g.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    match matches.len() {
        0 => GameMatch::NotFound,
        1 => GameMatch::Found(matches.remove(0)),
        _ => GameMatch::Ambiguous(matches),
    }
}

#[cfg(test)]
pub(crate) fn test_game(appid: &str, name: &str) -> Game {
    Game {
        appid: appid.to_string(),
        name: name.to_string(),
        playtime_forever: 0,
        playtime_2weeks: 0,
        rtime_last_played: 0,
        platform: None,
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn derived_status_never_yields_override_states() {
        let overrides = StatusOverrides::new();
        let mut game = test_game("10", "Portal");
        let cases = [
            (0u64, 0u64, 0i64),
            (120, 0, NOW - 1000),
            (120, 30, NOW - 1000),
            (120, 0, NOW - 200 * 24 * 60 * 60),
        ];
        for (forever, recent, last) in cases {
            game.playtime_forever = forever;
            game.playtime_2weeks = recent;
            game.rtime_last_played = last;
            let derived = status(&game, &overrides, NOW);
            assert!(matches!(
                derived,
                Status::Playing | Status::Backlog | Status::Dropped | Status::Inactive
            ));
        }
    }

    #[test]
    fn override_wins_over_any_counters() {
        let mut game = test_game("10", "Portal");
        game.playtime_2weeks = 500;
        let mut overrides = StatusOverrides::new();
        overrides.insert("10".to_string(), OverrideStatus::Completed);
        assert_eq!(status(&game, &overrides, NOW), Status::Completed);
        overrides.insert("10".to_string(), OverrideStatus::Hold);
        assert_eq!(status(&game, &overrides, NOW), Status::Hold);
    }

    #[test]
    fn recent_play_beats_backlog() {
        let mut game = test_game("10", "Portal");
        game.playtime_2weeks = 15;
        assert_eq!(status(&game, &StatusOverrides::new(), NOW), Status::Playing);
    }

    #[test]
    fn zero_playtime_is_backlog() {
        let game = test_game("10", "Portal");
        assert_eq!(status(&game, &StatusOverrides::new(), NOW), Status::Backlog);
    }

    #[test]
    fn stale_last_played_is_dropped() {
        let mut game = test_game("10", "Portal");
        game.playtime_forever = 600;
        game.rtime_last_played = NOW - 181 * 24 * 60 * 60;
        assert_eq!(status(&game, &StatusOverrides::new(), NOW), Status::Dropped);
    }

    #[test]
    fn played_but_never_stamped_is_inactive() {
        let mut game = test_game("10", "Portal");
        game.playtime_forever = 600;
        assert_eq!(
            status(&game, &StatusOverrides::new(), NOW),
            Status::Inactive
        );
    }

    #[test]
    fn exact_match_beats_substring_collection() {
        let games = vec![test_game("10", "Half-Life"), test_game("20", "Half-Life 2")];
        match find_game_by_name(&games, "half-life") {
            GameMatch::Found(game) => assert_eq!(game.name, "Half-Life"),
            other => panic!("expected exact match, got {other:?}"),
        }
    }

    #[test]
    fn substring_with_multiple_hits_is_ambiguous() {
        let games = vec![test_game("10", "Half-Life"), test_game("20", "Half-Life 2")];
        match find_game_by_name(&games, "half") {
            GameMatch::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn unknown_name_is_not_found() {
        let games = vec![test_game("10", "Half-Life")];
        assert_eq!(find_game_by_name(&games, "portal"), GameMatch::NotFound);
    }

    #[test]
    fn merge_keeps_order_and_stamps_sources() {
        let catalog = vec![test_game("10", "Portal")];
        let mut chess = test_game("manual_1", "Chess");
        chess.platform = Some("Board".to_string());
        let merged = merge(&catalog, &[chess]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].source_label(), "Steam");
        assert_eq!(merged[1].source_label(), "Board");
    }

    #[test]
    fn last_played_day_formats_or_absents() {
        let mut game = test_game("10", "Portal");
        assert_eq!(game.last_played_day(), None);
        game.rtime_last_played = 1_700_000_000;
        assert_eq!(game.last_played_day().as_deref(), Some("2023-11-14"));
    }
}
