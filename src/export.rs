use crate::game::{status, Game, Status, StatusOverrides};
use crate::store::TagIndex;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One rendered row of the final filtered collection, shared by the text
/// table and both export formats.
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub name: String,
    pub appid: String,
    pub hours: f64,
    pub last_played: Option<String>,
    pub status: Status,
    pub source: String,
    pub tags: Vec<String>,
}

pub fn build_rows(
    games: &[Game],
    tags: &TagIndex,
    overrides: &StatusOverrides,
    now: i64,
) -> Vec<ExportRow> {
    games
        .iter()
        .map(|game| ExportRow {
            name: game.name.clone(),
            appid: game.appid.clone(),
            hours: game.hours(),
            last_played: game.last_played_day(),
            status: status(game, overrides, now),
            source: game.source_label(),
            tags: tags.get(&game.appid).cloned().unwrap_or_default(),
        })
        .collect()
}

pub fn export_csv(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record([
            "name",
            "appid",
            "hours",
            "last_played",
            "status",
            "source",
            "tags",
        ])
        .context("write csv header")?;
    for row in rows {
        let hours = format!("{:.2}", row.hours);
        let tags = row.tags.join(", ");
        writer
            .write_record([
                row.name.as_str(),
                row.appid.as_str(),
                hours.as_str(),
                row.last_played.as_deref().unwrap_or("Never"),
                row.status.as_str(),
                row.source.as_str(),
                tags.as_str(),
            ])
            .context("write csv row")?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    name: &'a str,
    appid: &'a str,
    hours: f64,
    last_played: Option<&'a str>,
    status: &'a str,
    source: &'a str,
    tags: &'a [String],
}

pub fn export_json(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let records: Vec<JsonRecord<'_>> = rows
        .iter()
        .map(|row| JsonRecord {
            name: &row.name,
            appid: &row.appid,
            hours: (row.hours * 100.0).round() / 100.0,
            last_played: row.last_played.as_deref(),
            status: row.status.as_str(),
            source: &row.source,
            tags: &row.tags,
        })
        .collect();
    let raw = serde_json::to_string_pretty(&records).context("serialize export")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_game;
    use serde_json::Value;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    fn rows() -> Vec<ExportRow> {
        let mut portal = test_game("10", "Portal");
        portal.playtime_forever = 90;
        portal.rtime_last_played = 1_700_000_000;
        let chess = test_game("manual_1", "Chess");
        let mut tags = TagIndex::new();
        tags.insert(
            "10".to_string(),
            vec!["puzzle".to_string(), "valve".to_string()],
        );
        build_rows(&[portal, chess], &tags, &StatusOverrides::new(), NOW)
    }

    #[test]
    fn csv_renders_hours_dates_and_joined_tags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.csv");
        export_csv(&path, &rows()).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert_eq!(
            lines.next().unwrap(),
            "name,appid,hours,last_played,status,source,tags"
        );
        let portal = lines.next().unwrap();
        assert!(portal.contains("1.50"));
        assert!(portal.contains("2023-11-14"));
        assert!(portal.contains("\"puzzle, valve\""));
        let chess = lines.next().unwrap();
        assert!(chess.contains("Never"));
        assert!(chess.contains("backlog"));
    }

    #[test]
    fn json_uses_null_for_never_played() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        export_json(&path, &rows()).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        let records = parsed.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["hours"], 1.5);
        assert_eq!(records[0]["last_played"], "2023-11-14");
        assert_eq!(records[0]["tags"][0], "puzzle");
        assert_eq!(records[1]["last_played"], Value::Null);
        assert_eq!(records[1]["status"], "backlog");
        assert_eq!(records[1]["source"], "Other");
    }

    #[test]
    fn export_overwrites_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        export_json(&path, &rows()).unwrap();
        export_json(&path, &[]).unwrap();
        let parsed: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.as_array().unwrap().is_empty());
    }
}
