use crate::game::{status, Game, Status, StatusOverrides};
use crate::store::TagIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Steam,
    Manual,
}

impl SourceFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Some(SourceFilter::All),
            "steam" => Some(SourceFilter::Steam),
            "manual" => Some(SourceFilter::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaytimeFilter {
    NotPlayed,
    Started,
    RecentlyActive,
    Under(f64),
    Over(f64),
    Between(f64, f64),
}

impl PlaytimeFilter {
    fn matches(self, game: &Game) -> bool {
        match self {
            PlaytimeFilter::NotPlayed => game.playtime_forever == 0,
            PlaytimeFilter::Started => game.hours() <= 2.0,
            PlaytimeFilter::RecentlyActive => game.playtime_2weeks > 0,
            PlaytimeFilter::Under(hours) => game.hours() < hours,
            PlaytimeFilter::Over(hours) => game.hours() > hours,
            PlaytimeFilter::Between(min, max) => {
                let hours = game.hours();
                hours >= min && hours <= max
            }
        }
    }
}

/// Raw playtime flags as supplied on the command line. They do not compose:
/// the first set flag in a fixed priority order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaytimeFlags {
    pub notplayed: bool,
    pub started: bool,
    pub recent: bool,
    pub under: Option<f64>,
    pub over: Option<f64>,
    pub between: Option<(f64, f64)>,
}

impl PlaytimeFlags {
    pub fn resolve(self) -> Option<PlaytimeFilter> {
        if self.notplayed {
            Some(PlaytimeFilter::NotPlayed)
        } else if self.started {
            Some(PlaytimeFilter::Started)
        } else if self.recent {
            Some(PlaytimeFilter::RecentlyActive)
        } else if let Some(hours) = self.under {
            Some(PlaytimeFilter::Under(hours))
        } else if let Some(hours) = self.over {
            Some(PlaytimeFilter::Over(hours))
        } else {
            self.between.map(|(min, max)| PlaytimeFilter::Between(min, max))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    PlaytimeDesc,
    PlaytimeAsc,
    Recent,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "name" => Some(SortKey::Name),
            "playtime" => Some(SortKey::PlaytimeDesc),
            "playtime-asc" => Some(SortKey::PlaytimeAsc),
            "recent" => Some(SortKey::Recent),
            _ => None,
        }
    }
}

/// One pass over the merged collection: filters in a fixed order, then an
/// optional stable sort, then a row limit. Stores are never touched.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub source: SourceFilter,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub status: Option<Status>,
    pub playtime: Option<PlaytimeFilter>,
    pub sort: Option<SortKey>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn apply(
        &self,
        games: &[Game],
        tags: &TagIndex,
        overrides: &StatusOverrides,
        now: i64,
    ) -> Vec<Game> {
        let mut result: Vec<Game> = games
            .iter()
            .filter(|game| match self.source {
                SourceFilter::All => true,
                SourceFilter::Steam => !game.is_manual(),
                SourceFilter::Manual => game.is_manual(),
            })
            .filter(|game| match &self.search {
                Some(term) => game.name.to_lowercase().contains(&term.to_lowercase()),
                None => true,
            })
            .filter(|game| match &self.tag {
                Some(tag) => tags
                    .get(&game.appid)
                    .is_some_and(|set| set.iter().any(|existing| existing == tag)),
                None => true,
            })
            .filter(|game| match self.status {
                Some(wanted) => status(game, overrides, now) == wanted,
                None => true,
            })
            .filter(|game| match self.playtime {
                Some(filter) => filter.matches(game),
                None => true,
            })
            .cloned()
            .collect();

        match self.sort {
            Some(SortKey::Name) => {
                result.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            }
            Some(SortKey::PlaytimeDesc) => {
                result.sort_by(|a, b| b.playtime_forever.cmp(&a.playtime_forever));
            }
            Some(SortKey::PlaytimeAsc) => {
                result.sort_by(|a, b| a.playtime_forever.cmp(&b.playtime_forever));
            }
            Some(SortKey::Recent) => {
                result.sort_by(|a, b| b.rtime_last_played.cmp(&a.rtime_last_played));
            }
            None => {}
        }

        if let Some(limit) = self.limit {
            result.truncate(limit);
        }
        result
    }
}
