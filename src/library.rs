use crate::game::{
    find_game_by_name, Game, GameMatch, OverrideStatus, DEFAULT_PLATFORM, MANUAL_PREFIX,
};
use crate::store::{ManualStore, OverrideStore, StoreError, TagStore};
use serde_json::Map;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("no game matches '{0}'")]
    NotFound(String),
    #[error("'{term}' matches {} games", .candidates.len())]
    Ambiguous { term: String, candidates: Vec<Game> },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Added,
    AlreadyTagged,
    Removed,
    NotTagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    NoOverride,
}

fn resolve(games: &[Game], term: &str) -> Result<Game, LibraryError> {
    match find_game_by_name(games, term) {
        GameMatch::Found(game) => Ok(game),
        GameMatch::NotFound => Err(LibraryError::NotFound(term.to_string())),
        GameMatch::Ambiguous(candidates) => Err(LibraryError::Ambiguous {
            term: term.to_string(),
            candidates,
        }),
    }
}

/// Duplicate adds are a notice, not an error, and write nothing.
pub fn add_tag(
    store: &TagStore,
    games: &[Game],
    term: &str,
    tag: &str,
) -> Result<(TagOutcome, Game), LibraryError> {
    let game = resolve(games, term)?;
    let mut tags = store.load()?;
    let entry = tags.entry(game.appid.clone()).or_default();
    if entry.iter().any(|existing| existing == tag) {
        return Ok((TagOutcome::AlreadyTagged, game));
    }
    entry.push(tag.to_string());
    store.save(&tags)?;
    Ok((TagOutcome::Added, game))
}

/// Removing the last tag also removes the appid key, keeping the file sparse.
pub fn remove_tag(
    store: &TagStore,
    games: &[Game],
    term: &str,
    tag: &str,
) -> Result<(TagOutcome, Game), LibraryError> {
    let game = resolve(games, term)?;
    let mut tags = store.load()?;
    let Some(entry) = tags.get_mut(&game.appid) else {
        return Ok((TagOutcome::NotTagged, game));
    };
    let Some(position) = entry.iter().position(|existing| existing == tag) else {
        return Ok((TagOutcome::NotTagged, game));
    };
    entry.remove(position);
    if entry.is_empty() {
        tags.remove(&game.appid);
    }
    store.save(&tags)?;
    Ok((TagOutcome::Removed, game))
}

pub fn set_status(
    store: &OverrideStore,
    games: &[Game],
    term: &str,
    value: &str,
) -> Result<(OverrideStatus, Game), LibraryError> {
    let forced = OverrideStatus::parse(value).ok_or_else(|| {
        LibraryError::InvalidArgument(format!(
            "invalid status '{value}': only 'completed' and 'hold' can be set manually"
        ))
    })?;
    let game = resolve(games, term)?;
    let mut overrides = store.load()?;
    overrides.insert(game.appid.clone(), forced);
    store.save(&overrides)?;
    Ok((forced, game))
}

pub fn clear_status(
    store: &OverrideStore,
    games: &[Game],
    term: &str,
) -> Result<(ClearOutcome, Game), LibraryError> {
    let game = resolve(games, term)?;
    let mut overrides = store.load()?;
    if overrides.remove(&game.appid).is_none() {
        return Ok((ClearOutcome::NoOverride, game));
    }
    store.save(&overrides)?;
    Ok((ClearOutcome::Cleared, game))
}

/// Max numeric manual_<n> suffix plus one; malformed suffixes are ignored.
pub fn next_manual_id(manual: &[Game]) -> String {
    let max = manual
        .iter()
        .filter_map(|game| game.appid.strip_prefix(MANUAL_PREFIX))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{MANUAL_PREFIX}{}", max + 1)
}

/// Name clash is checked against manual games only; a manual entry may
/// share a name with a Steam game.
pub fn add_manual_game(
    store: &ManualStore,
    name: &str,
    platform: Option<&str>,
) -> Result<Game, LibraryError> {
    let mut manual = store.load()?;
    if manual
        .iter()
        .any(|game| game.name.eq_ignore_ascii_case(name))
    {
        return Err(LibraryError::AlreadyExists(format!(
            "'{name}' already exists in the manual ledger"
        )));
    }

    let game = Game {
        appid: next_manual_id(&manual),
        name: name.to_string(),
        playtime_forever: 0,
        playtime_2weeks: 0,
        rtime_last_played: 0,
        platform: Some(platform.unwrap_or(DEFAULT_PLATFORM).to_string()),
        extra: Map::new(),
    };
    manual.push(game.clone());
    store.save(&manual)?;
    Ok(game)
}

pub fn remove_manual_game(store: &ManualStore, name: &str) -> Result<Game, LibraryError> {
    let mut manual = store.load()?;
    let Some(position) = manual
        .iter()
        .position(|game| game.name.eq_ignore_ascii_case(name))
    else {
        return Err(LibraryError::NotFound(name.to_string()));
    };
    let removed = manual.remove(position);
    store.save(&manual)?;
    Ok(removed)
}

/// Adds round(hours*60) minutes and stamps the session time. Cumulative:
/// each call models one more play session.
pub fn log_time(
    store: &ManualStore,
    catalog: &[Game],
    name: &str,
    hours_raw: &str,
    now: i64,
) -> Result<(Game, u64), LibraryError> {
    let hours: f64 = hours_raw.parse().map_err(|_| {
        LibraryError::InvalidArgument(format!("'{hours_raw}' is not a number of hours"))
    })?;
    if !hours.is_finite() || hours <= 0.0 {
        return Err(LibraryError::InvalidArgument(format!(
            "'{hours_raw}' is not a positive number of hours"
        )));
    }

    let mut manual = store.load()?;
    let Some(game) = manual
        .iter_mut()
        .find(|game| game.name.eq_ignore_ascii_case(name))
    else {
        if catalog
            .iter()
            .any(|game| game.name.eq_ignore_ascii_case(name))
        {
            return Err(LibraryError::InvalidArgument(format!(
                "'{name}' is a Steam game; its playtime is synced from Steam"
            )));
        }
        return Err(LibraryError::NotFound(name.to_string()));
    };

    let minutes = (hours * 60.0).round() as u64;
    game.playtime_forever += minutes;
    game.rtime_last_played = now;
    let updated = game.clone();
    store.save(&manual)?;
    Ok((updated, minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_game;
    use crate::store::TAGS_FILE;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn next_manual_id_starts_at_one() {
        assert_eq!(next_manual_id(&[]), "manual_1");
    }

    #[test]
    fn next_manual_id_takes_max_plus_one() {
        let manual = vec![test_game("manual_3", "A"), test_game("manual_7", "B")];
        assert_eq!(next_manual_id(&manual), "manual_8");
    }

    #[test]
    fn next_manual_id_ignores_malformed_suffixes() {
        let manual = vec![
            test_game("manual_2", "A"),
            test_game("manual_old", "B"),
            test_game("manual_", "C"),
        ];
        assert_eq!(next_manual_id(&manual), "manual_3");
    }

    #[test]
    fn add_tag_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = TagStore::new(dir.path());
        let games = vec![test_game("10", "Portal")];

        let (first, _) = add_tag(&store, &games, "Portal", "puzzle").unwrap();
        assert_eq!(first, TagOutcome::Added);
        let (second, _) = add_tag(&store, &games, "Portal", "puzzle").unwrap();
        assert_eq!(second, TagOutcome::AlreadyTagged);

        let tags = store.load().unwrap();
        assert_eq!(tags.get("10").map(Vec::len), Some(1));
    }

    #[test]
    fn tags_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let store = TagStore::new(dir.path());
        let games = vec![test_game("10", "Portal")];
        for tag in ["puzzle", "valve", "short"] {
            add_tag(&store, &games, "Portal", tag).unwrap();
        }
        let tags = store.load().unwrap();
        assert_eq!(tags["10"], ["puzzle", "valve", "short"]);
    }

    #[test]
    fn remove_last_tag_prunes_the_key() {
        let dir = TempDir::new().unwrap();
        let store = TagStore::new(dir.path());
        let games = vec![test_game("10", "Portal")];

        add_tag(&store, &games, "Portal", "puzzle").unwrap();
        let (outcome, _) = remove_tag(&store, &games, "Portal", "puzzle").unwrap();
        assert_eq!(outcome, TagOutcome::Removed);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn remove_absent_tag_is_a_notice() {
        let dir = TempDir::new().unwrap();
        let store = TagStore::new(dir.path());
        let games = vec![test_game("10", "Portal")];
        let (outcome, _) = remove_tag(&store, &games, "Portal", "puzzle").unwrap();
        assert_eq!(outcome, TagOutcome::NotTagged);
    }

    #[test]
    fn ambiguous_tag_target_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = TagStore::new(dir.path());
        let games = vec![test_game("10", "Half-Life"), test_game("20", "Half-Life 2")];

        let err = add_tag(&store, &games, "half", "fps").unwrap_err();
        match err {
            LibraryError::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
        assert!(!dir.path().join(TAGS_FILE).exists());
    }

    #[test]
    fn set_status_rejects_derived_only_values() {
        let dir = TempDir::new().unwrap();
        let store = OverrideStore::new(dir.path());
        let games = vec![test_game("10", "Portal")];
        let err = set_status(&store, &games, "Portal", "playing").unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn clear_status_reverts_to_derived() {
        let dir = TempDir::new().unwrap();
        let store = OverrideStore::new(dir.path());
        let games = vec![test_game("10", "Portal")];

        set_status(&store, &games, "Portal", "hold").unwrap();
        assert_eq!(store.load().unwrap().len(), 1);

        let (outcome, _) = clear_status(&store, &games, "Portal").unwrap();
        assert_eq!(outcome, ClearOutcome::Cleared);
        assert!(store.load().unwrap().is_empty());

        let (again, _) = clear_status(&store, &games, "Portal").unwrap();
        assert_eq!(again, ClearOutcome::NoOverride);
    }

    #[test]
    fn duplicate_manual_name_is_rejected_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let store = ManualStore::new(dir.path());
        add_manual_game(&store, "Chess", Some("Board")).unwrap();
        let err = add_manual_game(&store, "chess", None).unwrap_err();
        assert!(matches!(err, LibraryError::AlreadyExists(_)));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn manual_game_defaults_platform_and_zeroes_playtime() {
        let dir = TempDir::new().unwrap();
        let store = ManualStore::new(dir.path());
        let game = add_manual_game(&store, "Chess", None).unwrap();
        assert_eq!(game.appid, "manual_1");
        assert_eq!(game.platform.as_deref(), Some("Other"));
        assert_eq!(game.playtime_forever, 0);
        assert_eq!(game.rtime_last_played, 0);
    }

    #[test]
    fn remove_manual_game_ignores_catalog_names() {
        let dir = TempDir::new().unwrap();
        let store = ManualStore::new(dir.path());
        let err = remove_manual_game(&store, "Portal").unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }

    #[test]
    fn log_time_accumulates_minutes_and_stamps_session() {
        let dir = TempDir::new().unwrap();
        let store = ManualStore::new(dir.path());
        add_manual_game(&store, "Chess", None).unwrap();

        let (game, minutes) = log_time(&store, &[], "Chess", "1.5", NOW).unwrap();
        assert_eq!(minutes, 90);
        assert_eq!(game.playtime_forever, 90);
        assert_eq!(game.rtime_last_played, NOW);

        let (game, _) = log_time(&store, &[], "Chess", "0.5", NOW + 100).unwrap();
        assert_eq!(game.playtime_forever, 120);
        assert_eq!(game.rtime_last_played, NOW + 100);
    }

    #[test]
    fn log_time_rejects_garbage_without_mutating() {
        let dir = TempDir::new().unwrap();
        let store = ManualStore::new(dir.path());
        add_manual_game(&store, "Chess", None).unwrap();

        for raw in ["abc", "NaN", "inf", "-2"] {
            let err = log_time(&store, &[], "Chess", raw, NOW).unwrap_err();
            assert!(matches!(err, LibraryError::InvalidArgument(_)), "{raw}");
        }
        let manual = store.load().unwrap();
        assert_eq!(manual[0].playtime_forever, 0);
    }

    #[test]
    fn log_time_rejects_steam_games() {
        let dir = TempDir::new().unwrap();
        let store = ManualStore::new(dir.path());
        let catalog = vec![test_game("10", "Portal")];
        let err = log_time(&store, &catalog, "Portal", "1", NOW).unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));
    }
}
