use crate::{
    config::{self, AppConfig},
    export::{self, ExportRow},
    game::{self, find_game_by_name, merge, now_unix, Game, GameMatch, Status},
    library::{self, ClearOutcome, LibraryError, TagOutcome},
    query::{PlaytimeFlags, Query, SortKey, SourceFilter},
    steam,
    store::{ManualStore, OverrideStore, Snapshot, SnapshotStore, StoreError, TagStore},
};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::Path;

const MAX_CANDIDATES: usize = 10;

enum CliCommand {
    Setup,
    Sync,
    Tag { name: String, tag: String },
    Untag { name: String, tag: String },
    Tags { name: Option<String> },
    SetStatus { name: String, value: String },
    ClearStatus { name: String },
    AddGame { name: String, platform: Option<String> },
    RemoveGame { name: String },
    LogTime { name: String, hours: String },
    Stats,
    List(Box<ListOptions>),
    Help,
    Version,
}

#[derive(Default)]
struct ListOptions {
    source: SourceFilter,
    search: Option<String>,
    tag: Option<String>,
    status: Option<Status>,
    playtime: PlaytimeFlags,
    sort: Option<SortKey>,
    limit: Option<usize>,
    export_csv: Option<String>,
    export_json: Option<String>,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("backloggr v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Setup => {
            let dir = config::data_dir()?;
            config::run_setup(&dir)?;
            Ok(())
        }
        CliCommand::Sync => sync(),
        other => {
            let dir = config::data_dir()?;
            let stores = Stores::open(&dir);
            run_command(&stores, other)
        }
    }
}

struct Stores {
    snapshot: SnapshotStore,
    manual: ManualStore,
    tags: TagStore,
    overrides: OverrideStore,
}

impl Stores {
    fn open(data_dir: &Path) -> Self {
        Self {
            snapshot: SnapshotStore::new(data_dir),
            manual: ManualStore::new(data_dir),
            tags: TagStore::new(data_dir),
            overrides: OverrideStore::new(data_dir),
        }
    }

    // A corrupt snapshot is the one store failure we don't paper over:
    // the fix is a fresh sync, so say so.
    fn load_collection(&self) -> Result<(Vec<Game>, Vec<Game>)> {
        let snapshot = self.snapshot.load().map_err(|err| match err {
            StoreError::Corrupt { .. } => {
                anyhow::anyhow!("{err}; run 'backloggr sync' to rebuild the snapshot")
            }
            other => anyhow::Error::new(other),
        })?;
        let catalog = snapshot.map(|s| s.games).unwrap_or_default();
        let manual = self.manual.load()?;
        Ok((catalog, manual))
    }
}

fn run_command(stores: &Stores, command: CliCommand) -> Result<()> {
    let (catalog, manual) = stores.load_collection()?;
    let merged = merge(&catalog, &manual);

    match command {
        CliCommand::Tag { name, tag } => {
            match library::add_tag(&stores.tags, &merged, &name, &tag).map_err(describe)? {
                (TagOutcome::Added, game) => println!("Tagged '{}' with '{tag}'", game.name),
                (_, game) => println!("'{}' already has tag '{tag}'", game.name),
            }
            Ok(())
        }
        CliCommand::Untag { name, tag } => {
            match library::remove_tag(&stores.tags, &merged, &name, &tag).map_err(describe)? {
                (TagOutcome::Removed, game) => {
                    println!("Removed tag '{tag}' from '{}'", game.name);
                }
                (_, game) => println!("'{}' doesn't have tag '{tag}'", game.name),
            }
            Ok(())
        }
        CliCommand::Tags { name } => list_tags(stores, &merged, name.as_deref()),
        CliCommand::SetStatus { name, value } => {
            let (forced, game) =
                library::set_status(&stores.overrides, &merged, &name, &value).map_err(describe)?;
            println!("Marked '{}' as {}", game.name, forced.as_status());
            Ok(())
        }
        CliCommand::ClearStatus { name } => {
            match library::clear_status(&stores.overrides, &merged, &name).map_err(describe)? {
                (ClearOutcome::Cleared, game) => {
                    println!("Cleared status override for '{}'", game.name);
                }
                (ClearOutcome::NoOverride, game) => {
                    println!("'{}' has no status override", game.name);
                }
            }
            Ok(())
        }
        CliCommand::AddGame { name, platform } => {
            let game = library::add_manual_game(&stores.manual, &name, platform.as_deref())
                .map_err(describe)?;
            println!("Added '{}' ({}) on {}", game.name, game.appid, game.source_label());
            Ok(())
        }
        CliCommand::RemoveGame { name } => {
            let game = library::remove_manual_game(&stores.manual, &name).map_err(describe)?;
            println!("Removed '{}' ({})", game.name, game.appid);
            Ok(())
        }
        CliCommand::LogTime { name, hours } => {
            let (game, minutes) =
                library::log_time(&stores.manual, &catalog, &name, &hours, now_unix())
                    .map_err(describe)?;
            println!(
                "Logged {minutes} min for '{}' ({:.1}h total)",
                game.name,
                game.hours()
            );
            Ok(())
        }
        CliCommand::Stats => print_stats(stores, &merged),
        CliCommand::List(options) => list_games(stores, &merged, &options),
        CliCommand::Setup | CliCommand::Sync | CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn sync() -> Result<()> {
    let dir = config::data_dir()?;
    let config = match AppConfig::load(&dir)? {
        Some(config) if config.is_complete() => config,
        _ => bail!("No Steam credentials; run 'backloggr setup' first"),
    };

    let games = match steam::fetch_owned_games(&config.api_key, &config.steam_id) {
        Ok(games) => games,
        Err(err) => bail!("Sync failed: {err} (previous snapshot kept)"),
    };

    let snapshot = Snapshot {
        fetched_at: now_unix(),
        games,
    };
    SnapshotStore::new(&dir).save(&snapshot)?;
    println!("Synced {} games from Steam.", snapshot.games.len());
    Ok(())
}

fn list_tags(stores: &Stores, merged: &[Game], name: Option<&str>) -> Result<()> {
    let tags = stores.tags.load()?;
    match name {
        Some(term) => {
            let game = match find_game_by_name(merged, term) {
                GameMatch::Found(game) => game,
                GameMatch::NotFound => bail!("no game matches '{term}'"),
                GameMatch::Ambiguous(candidates) => {
                    print_candidates(term, &candidates);
                    bail!("'{term}' matches {} games", candidates.len());
                }
            };
            match tags.get(&game.appid) {
                Some(set) if !set.is_empty() => {
                    println!("{}: {}", game.name, set.join(", "));
                }
                _ => println!("'{}' has no tags", game.name),
            }
        }
        None => {
            if tags.is_empty() {
                println!("No tags yet.");
                return Ok(());
            }
            let names: HashMap<&str, &str> = merged
                .iter()
                .map(|game| (game.appid.as_str(), game.name.as_str()))
                .collect();
            for (appid, set) in &tags {
                let label = names.get(appid.as_str()).copied().unwrap_or(appid.as_str());
                println!("{label}: {}", set.join(", "));
            }
        }
    }
    Ok(())
}

fn print_stats(stores: &Stores, merged: &[Game]) -> Result<()> {
    let overrides = stores.overrides.load()?;
    let now = now_unix();

    let mut counts: HashMap<Status, usize> = HashMap::new();
    let mut total_hours = 0.0;
    for game in merged {
        *counts.entry(game::status(game, &overrides, now)).or_default() += 1;
        total_hours += game.hours();
    }
    let manual_count = merged.iter().filter(|game| game.is_manual()).count();

    println!("Games: {} ({} from Steam, {} manual)", merged.len(), merged.len() - manual_count, manual_count);
    println!("Total playtime: {total_hours:.1}h");
    for status in [
        Status::Playing,
        Status::Backlog,
        Status::Inactive,
        Status::Dropped,
        Status::Completed,
        Status::Hold,
    ] {
        let count = counts.get(&status).copied().unwrap_or(0);
        println!("  {:<9} {count}", status.as_str());
    }

    match stores.snapshot.load() {
        Ok(Some(snapshot)) => {
            let day =
                game::format_day(snapshot.fetched_at).unwrap_or_else(|| "unknown".to_string());
            println!("Last sync: {day}");
        }
        _ => println!("Last sync: never"),
    }
    Ok(())
}

fn list_games(stores: &Stores, merged: &[Game], options: &ListOptions) -> Result<()> {
    if merged.is_empty() {
        println!("Library is empty. Run 'backloggr setup' and 'backloggr sync',");
        println!("or add entries with 'backloggr addgame'.");
        return Ok(());
    }

    let tags = stores.tags.load()?;
    let overrides = stores.overrides.load()?;
    let now = now_unix();

    let query = Query {
        source: options.source,
        search: options.search.clone(),
        tag: options.tag.clone(),
        status: options.status,
        playtime: options.playtime.resolve(),
        sort: options.sort,
        limit: options.limit,
    };
    let filtered = query.apply(merged, &tags, &overrides, now);
    let rows = export::build_rows(&filtered, &tags, &overrides, now);

    let mut exported = false;
    if let Some(path) = &options.export_csv {
        export::export_csv(Path::new(path), &rows)?;
        println!("Exported {} games to {path}", rows.len());
        exported = true;
    }
    if let Some(path) = &options.export_json {
        export::export_json(Path::new(path), &rows)?;
        println!("Exported {} games to {path}", rows.len());
        exported = true;
    }
    if !exported {
        print_table(&rows);
    }
    Ok(())
}

fn print_table(rows: &[ExportRow]) {
    if rows.is_empty() {
        println!("No games match.");
        return;
    }

    let name_width = rows
        .iter()
        .map(|row| row.name.chars().count())
        .max()
        .unwrap_or(4)
        .clamp(4, 40);
    println!(
        "{:<name_width$}  {:>8}  {:<9}  {:<11}  {:<8}  TAGS",
        "NAME", "HOURS", "STATUS", "LAST PLAYED", "SOURCE"
    );
    for row in rows {
        println!(
            "{:<name_width$}  {:>8.2}  {:<9}  {:<11}  {:<8}  {}",
            clip(&row.name, name_width),
            row.hours,
            row.status.as_str(),
            row.last_played.as_deref().unwrap_or("Never"),
            clip(&row.source, 8),
            row.tags.join(", ")
        );
    }
    println!();
    println!("{} game(s)", rows.len());
}

fn clip(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// Ambiguity is never auto-resolved; show the candidates (capped) so the
// user can retype a longer name.
fn describe(err: LibraryError) -> anyhow::Error {
    if let LibraryError::Ambiguous { term, candidates } = &err {
        print_candidates(term, candidates);
    }
    anyhow::Error::new(err)
}

fn print_candidates(term: &str, candidates: &[Game]) {
    eprintln!("'{term}' matches several games:");
    for game in candidates.iter().take(MAX_CANDIDATES) {
        eprintln!("  {} ({})", game.name, game.appid);
    }
    if candidates.len() > MAX_CANDIDATES {
        eprintln!("  ...and {} more", candidates.len() - MAX_CANDIDATES);
    }
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    if matches!(
        args.first().map(|s| s.as_str()),
        Some("--help" | "-h" | "help")
    ) {
        return Ok(CliCommand::Help);
    }
    if matches!(
        args.first().map(|s| s.as_str()),
        Some("--version" | "-V" | "version")
    ) {
        return Ok(CliCommand::Version);
    }

    match args.first().map(|s| s.as_str()) {
        Some("setup") => expect_no_more(args, 1, CliCommand::Setup),
        Some("sync") => expect_no_more(args, 1, CliCommand::Sync),
        Some("stats") => expect_no_more(args, 1, CliCommand::Stats),
        Some("tag") => {
            let (name, tag) = two_values(args, "tag", "<name> <tag>")?;
            Ok(CliCommand::Tag { name, tag })
        }
        Some("untag") => {
            let (name, tag) = two_values(args, "untag", "<name> <tag>")?;
            Ok(CliCommand::Untag { name, tag })
        }
        Some("tags") => Ok(CliCommand::Tags {
            name: args.get(1).cloned(),
        }),
        Some("setstatus") => {
            let (name, value) = two_values(args, "setstatus", "<name> <completed|hold>")?;
            Ok(CliCommand::SetStatus { name, value })
        }
        Some("clearstatus") => {
            let name = one_value(args, "clearstatus", "<name>")?;
            Ok(CliCommand::ClearStatus { name })
        }
        Some("addgame") => parse_addgame(&args[1..]),
        Some("removegame") => {
            let name = one_value(args, "removegame", "<name>")?;
            Ok(CliCommand::RemoveGame { name })
        }
        Some("logtime") => {
            let (name, hours) = two_values(args, "logtime", "<name> <hours>")?;
            Ok(CliCommand::LogTime { name, hours })
        }
        _ => parse_list(args),
    }
}

fn expect_no_more(args: &[String], from: usize, command: CliCommand) -> Result<CliCommand> {
    if let Some(extra) = args.get(from) {
        bail!("Unexpected argument: {extra}");
    }
    Ok(command)
}

fn one_value(args: &[String], verb: &str, usage: &str) -> Result<String> {
    match (args.get(1), args.get(2)) {
        (Some(value), None) => Ok(value.clone()),
        _ => bail!("Usage: backloggr {verb} {usage}"),
    }
}

fn two_values(args: &[String], verb: &str, usage: &str) -> Result<(String, String)> {
    match (args.get(1), args.get(2), args.get(3)) {
        (Some(first), Some(second), None) => Ok((first.clone(), second.clone())),
        _ => bail!("Usage: backloggr {verb} {usage}"),
    }
}

fn parse_addgame(args: &[String]) -> Result<CliCommand> {
    let mut name = None;
    let mut platform = None;
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--platform=") {
            platform = Some(value.to_string());
        } else if arg == "--platform" {
            match iter.next() {
                Some(value) => platform = Some(value.clone()),
                None => bail!("--platform requires a value"),
            }
        } else if name.is_none() {
            name = Some(arg.clone());
        } else {
            bail!("Unexpected argument: {arg}");
        }
    }
    let Some(name) = name else {
        bail!("Usage: backloggr addgame <name> [--platform <platform>]");
    };
    Ok(CliCommand::AddGame { name, platform })
}

fn parse_list(args: &[String]) -> Result<CliCommand> {
    let mut options = ListOptions::default();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        let value = |iter: &mut std::iter::Peekable<std::slice::Iter<'_, String>>| {
            if let Some(inline) = inline.clone() {
                Ok(inline)
            } else {
                match iter.next() {
                    Some(next) => Ok(next.clone()),
                    None => Err(anyhow::anyhow!("{flag} requires a value")),
                }
            }
        };

        match flag {
            "--source" => {
                let raw = value(&mut iter)?;
                options.source = SourceFilter::parse(&raw)
                    .ok_or_else(|| anyhow::anyhow!("Unknown source: {raw} (steam, manual, all)"))?;
            }
            "--search" => options.search = Some(value(&mut iter)?),
            "--tag" => options.tag = Some(value(&mut iter)?),
            "--status" => {
                let raw = value(&mut iter)?;
                options.status = Some(Status::parse(&raw).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Unknown status: {raw} (playing, backlog, dropped, inactive, completed, hold)"
                    )
                })?);
            }
            "--notplayed" => options.playtime.notplayed = true,
            "--started" => options.playtime.started = true,
            "--recent" => options.playtime.recent = true,
            "--under" => options.playtime.under = Some(parse_hours(&value(&mut iter)?)?),
            "--over" => options.playtime.over = Some(parse_hours(&value(&mut iter)?)?),
            "--between" => {
                let min = parse_hours(&value(&mut iter)?)?;
                let max = match iter.next() {
                    Some(raw) => parse_hours(raw)?,
                    None => bail!("--between requires <min> <max>"),
                };
                options.playtime.between = Some((min, max));
            }
            "--sort" => {
                let raw = value(&mut iter)?;
                options.sort = Some(SortKey::parse(&raw).ok_or_else(|| {
                    anyhow::anyhow!("Unknown sort key: {raw} (name, playtime, playtime-asc, recent)")
                })?);
            }
            "--limit" => {
                let raw = value(&mut iter)?;
                options.limit = Some(
                    raw.parse()
                        .map_err(|_| anyhow::anyhow!("'{raw}' is not a row count"))?,
                );
            }
            "--export-csv" => options.export_csv = Some(value(&mut iter)?),
            "--export-json" => options.export_json = Some(value(&mut iter)?),
            other => bail!("Unknown option: {other} (see --help)"),
        }
    }

    Ok(CliCommand::List(Box::new(options)))
}

fn parse_hours(raw: &str) -> Result<f64> {
    let hours: f64 = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("'{raw}' is not a number of hours"))?;
    if !hours.is_finite() || hours < 0.0 {
        bail!("'{raw}' is not a number of hours");
    }
    Ok(hours)
}

fn print_help() {
    println!("backloggr v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  backloggr                         List the library");
    println!("  backloggr setup                   Store Steam API credentials");
    println!("  backloggr sync                    Fetch the owned-games snapshot");
    println!("  backloggr tag <name> <tag>        Add a tag");
    println!("  backloggr untag <name> <tag>      Remove a tag");
    println!("  backloggr tags [name]             Show tags");
    println!("  backloggr setstatus <name> <s>    Force status (completed | hold)");
    println!("  backloggr clearstatus <name>      Revert to derived status");
    println!("  backloggr addgame <name> [--platform <p>]");
    println!("  backloggr removegame <name>       Remove a manual game");
    println!("  backloggr logtime <name> <hours>  Log a play session");
    println!("  backloggr stats                   Library summary");
    println!();
    println!("List options:");
    println!("  --source <steam|manual|all>       Filter by origin");
    println!("  --search <term>                   Name substring match");
    println!("  --tag <tag>                       Exact tag membership");
    println!("  --status <status>                 Derived status equality");
    println!("  --notplayed | --started | --recent");
    println!("  --under <h> | --over <h> | --between <min> <max>");
    println!("  --sort <name|playtime|playtime-asc|recent>");
    println!("  --limit <n>                       Keep the first n rows");
    println!("  --export-csv <file>               Write the result as CSV");
    println!("  --export-json <file>              Write the result as JSON");
    println!("  -h, --help                        Show help");
    println!("  -V, --version                     Show version");
}
