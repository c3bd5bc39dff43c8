// 📥 CSV Import - mentions, startups, sector signals
//
// Bad rows are skipped with a reason, never fatal to the file.
// List columns (sectors, stages) are ';'-separated.

use crate::entities::{ComponentInputs, Startup};
use crate::matching::{SectorSignal, SectorSignals};
use crate::mention::Mention;
use crate::sectors::SectorNormalizer;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Records loaded plus rows skipped as (line, reason)
#[derive(Debug)]
pub struct ImportReport<T> {
    pub records: Vec<T>,
    pub skipped: Vec<(usize, String)>,
}

impl<T> ImportReport<T> {
    fn new() -> Self {
        ImportReport {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, line: usize, reason: String) {
        warn!(line, reason = %reason, "csv row skipped");
        self.skipped.push((line, reason));
    }
}

// ============================================================================
// ROW SHAPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct MentionRow {
    text: String,
    source_url: String,
    observed_at: String,
    #[serde(default)]
    candidate: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    firm: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sectors: Option<String>,
    #[serde(default)]
    stages: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartupRow {
    id: String,
    name: String,
    #[serde(default)]
    sectors: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    team: Option<f64>,
    #[serde(default)]
    traction: Option<f64>,
    #[serde(default)]
    market: Option<f64>,
    #[serde(default)]
    product: Option<f64>,
    #[serde(default)]
    vision: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    sector: String,
    #[serde(default)]
    momentum: Option<f64>,
    #[serde(default)]
    recent_deals: Option<u32>,
    #[serde(default)]
    prior_deals: Option<u32>,
    #[serde(default)]
    hot: Option<bool>,
}

// ============================================================================
// LOADERS
// ============================================================================

pub fn load_mentions(csv_path: &Path) -> Result<ImportReport<Mention>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open mentions CSV: {:?}", csv_path))?;
    read_mentions(file)
}

pub fn read_mentions<R: Read>(reader: R) -> Result<ImportReport<Mention>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut report = ImportReport::new();

    for (i, result) in rdr.deserialize::<MentionRow>().enumerate() {
        let line = i + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                report.skip(line, e.to_string());
                continue;
            }
        };

        let observed_at = match parse_timestamp(&row.observed_at) {
            Some(ts) => ts,
            None => {
                report.skip(line, format!("unparseable observed_at '{}'", row.observed_at));
                continue;
            }
        };

        let mut mention = Mention::new(row.text, row.source_url, observed_at)
            .with_sectors(split_list(row.sectors.as_deref()))
            .with_stages(split_list(row.stages.as_deref()));

        if let Some(candidate) = non_empty(row.candidate) {
            mention = mention.with_candidate(candidate);
        }
        if let Some(context) = non_empty(row.context) {
            mention = mention.with_context(context);
        }
        if let Some(firm) = non_empty(row.firm) {
            mention = mention.with_firm(firm);
        }
        if let Some(url) = non_empty(row.url) {
            mention = mention.with_url(url);
        }
        if let Some(description) = non_empty(row.description) {
            mention = mention.with_description(description);
        }

        report.records.push(mention);
    }

    Ok(report)
}

pub fn load_startups(csv_path: &Path) -> Result<ImportReport<Startup>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open startups CSV: {:?}", csv_path))?;
    read_startups(file)
}

pub fn read_startups<R: Read>(reader: R) -> Result<ImportReport<Startup>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut report = ImportReport::new();

    for (i, result) in rdr.deserialize::<StartupRow>().enumerate() {
        let line = i + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                report.skip(line, e.to_string());
                continue;
            }
        };

        if row.id.trim().is_empty() {
            report.skip(line, "startup id is empty".to_string());
            continue;
        }

        let mut startup = Startup::new(row.id.trim(), row.name.trim());
        startup.raw_sectors = split_list(row.sectors.as_deref());
        startup.stage = non_empty(row.stage);
        startup.inputs = ComponentInputs {
            team: row.team,
            traction: row.traction,
            market: row.market,
            product: row.product,
            vision: row.vision,
        };

        report.records.push(startup);
    }

    Ok(report)
}

/// Sector momentum table: explicit momentum wins, else derived from deal counts
///
/// Rows are keyed by canonical sector so they line up with normalized startups.
pub fn load_signals(
    csv_path: &Path,
    default_momentum: f64,
    normalizer: &SectorNormalizer,
) -> Result<SectorSignals> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open signals CSV: {:?}", csv_path))?;
    read_signals(file, default_momentum, normalizer)
}

pub fn read_signals<R: Read>(
    reader: R,
    default_momentum: f64,
    normalizer: &SectorNormalizer,
) -> Result<SectorSignals> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut signals = SectorSignals::new(default_momentum);

    for (i, result) in rdr.deserialize::<SignalRow>().enumerate() {
        let row: SignalRow = result.with_context(|| format!("Bad signal row at line {}", i + 2))?;
        let Some(sector) = normalizer.canonicalize(&row.sector) else {
            warn!(line = i + 2, "signal row without sector skipped");
            continue;
        };

        let mut signal = match (row.momentum, row.recent_deals, row.prior_deals) {
            (Some(m), _, _) => SectorSignal::from_momentum(m),
            (None, Some(recent), prior) => SectorSignal::from_momentum(
                crate::matching::momentum_from_activity(recent, prior.unwrap_or(0)),
            ),
            (None, None, _) => SectorSignal::from_momentum(default_momentum),
        };
        if let Some(hot) = row.hot {
            signal.hot = hot;
        }

        signals.set(sector, signal);
    }

    Ok(signals)
}

// ============================================================================
// HELPERS
// ============================================================================

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// RFC 3339, or a bare YYYY-MM-DD date at midnight UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_mentions_skips_bad_rows() {
        let data = "\
text,source_url,observed_at,candidate,context,firm,url,sectors,stages,description
Sequoia Capital,https://a.example/1,2025-03-01T10:00:00Z,,led the round,Sequoia,https://sequoiacap.com,Fin Tech;AI,Seed;Series A,
Accel,https://b.example/2,not-a-date,,,,,,,
Sir Partner (Lightspeed),https://c.example/3,2025-03-02,Lightspeed,,,,,,Growth investor
";

        let report = read_mentions(data.as_bytes()).unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 3);

        let first = &report.records[0];
        assert_eq!(first.sectors, vec!["Fin Tech", "AI"]);
        assert_eq!(first.firm(), Some("Sequoia"));
        assert_eq!(first.context, "led the round");

        let third = &report.records[1];
        assert_eq!(third.candidate_name, "Lightspeed");
        assert_eq!(third.description.as_deref(), Some("Growth investor"));
    }

    #[test]
    fn test_read_startups_keeps_missing_inputs_as_none() {
        let data = "\
id,name,sectors,stage,team,traction,market,product,vision
s1,Acme,FinTech;fintech,Seed,80,,60,,
,Nameless,,,,,,,
";

        let report = read_startups(data.as_bytes()).unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        let s = &report.records[0];
        assert_eq!(s.inputs.team, Some(80.0));
        assert_eq!(s.inputs.traction, None);
        assert_eq!(s.inputs.missing_count(), 3);
        assert_eq!(s.stage.as_deref(), Some("Seed"));
    }

    #[test]
    fn test_read_signals() {
        let data = "\
sector,momentum,recent_deals,prior_deals,hot
AI,9.0,,,
fintech,,3,1,
crypto,,1,3,true
";

        let signals = read_signals(data.as_bytes(), 5.0, &SectorNormalizer::default()).unwrap();

        assert_eq!(signals.get("ai").momentum, 9.0);
        assert!(signals.get("ai").hot);
        assert!((signals.get("fintech").momentum - 7.5).abs() < 1e-9);
        assert!(signals.get("crypto").hot);
        assert_eq!(signals.get("unknown").momentum, 5.0);
    }

    #[test]
    fn test_signal_rows_keyed_by_canonical_sector() {
        let data = "\
sector,momentum
Fin Tech,9.0
Machine Learning,8.0
,4.0
";

        let signals = read_signals(data.as_bytes(), 5.0, &SectorNormalizer::default()).unwrap();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals.get("fintech").momentum, 9.0);
        assert_eq!(signals.get("ai").momentum, 8.0);
        assert!(signals.get("fintech").hot);
    }

    #[test]
    fn test_load_mentions_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentions.csv");
        std::fs::write(&path, "text,source_url,observed_at\nAccel,doc-1,2025-01-01\n").unwrap();

        let report = load_mentions(&path).unwrap();

        assert_eq!(report.records.len(), 1);
        assert!(load_mentions(&dir.path().join("missing.csv")).is_err());
    }
}
