// Matchmaker - batch runner
//
//   matchmaker import-mentions <mentions.csv>
//   matchmaker import-startups <startups.csv>
//   matchmaker extract <article.txt> <source-id>
//   matchmaker run [signals.csv]
//   matchmaker revalidate
//   matchmaker check-guard <current> [prior]
//   matchmaker events [event_type]
//
// MATCHMAKER_DB picks the database (default matchmaker.db),
// MATCHMAKER_CONFIG an optional JSON config file.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::env;
use std::fs;
use std::path::Path;

use matchmaker::{
    load_mentions, load_signals, load_startups, CandidateExtractor, GateContext, Pipeline,
    PipelineConfig, PipelineError, Repository, SectorSignals, SqliteStore,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchmaker=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    match command {
        "import-mentions" => run_import_mentions(arg(&args, 2, "mentions CSV path")?),
        "import-startups" => run_import_startups(arg(&args, 2, "startups CSV path")?),
        "extract" => run_extract(arg(&args, 2, "text file")?, arg(&args, 3, "source id")?),
        "run" => run_cycle(args.get(2).map(String::as_str)),
        "revalidate" => run_revalidate(),
        "check-guard" => run_check_guard(&args),
        "events" => run_events(args.get(2).map(String::as_str)),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => bail!("missing argument: {}", what),
    }
}

fn print_usage() {
    println!("🤝 Matchmaker {}", matchmaker::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  import-mentions <mentions.csv>   append investor mentions");
    println!("  import-startups <startups.csv>   load startups and raw scores");
    println!("  extract <article.txt> <source>   pull candidate names from text");
    println!("  run [signals.csv]                resolve, promote, score, match");
    println!("  revalidate                       re-run quality gate over mentions");
    println!("  check-guard <current> [prior]    dry-run the consistency guard");
    println!("  events [event_type]              show recent audit events");
}

fn load_config() -> Result<PipelineConfig> {
    match env::var("MATCHMAKER_CONFIG") {
        Ok(path) => Ok(PipelineConfig::from_file(&path)?),
        Err(_) => Ok(PipelineConfig::default()),
    }
}

fn open_pipeline() -> Result<Pipeline<SqliteStore>> {
    let db_path = env::var("MATCHMAKER_DB").unwrap_or_else(|_| "matchmaker.db".to_string());
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path))?;
    println!("✓ Database opened: {}", db_path);

    Ok(Pipeline::new(store, load_config()?)?)
}

fn run_import_mentions(csv_path: &str) -> Result<()> {
    println!("📥 Importing mentions");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let report = load_mentions(Path::new(csv_path))?;
    println!("✓ Parsed {} mentions ({} rows skipped)", report.records.len(), report.skipped.len());
    for (line, reason) in &report.skipped {
        println!("   ⚠️  line {}: {}", line, reason);
    }

    let pipeline = open_pipeline()?;
    let ingest = pipeline.ingest_mentions(&report.records)?;

    println!("\n✅ Recorded: {}", ingest.recorded);
    println!("   Duplicates: {}", ingest.duplicates);
    println!("   Malformed: {}", ingest.skipped);
    println!("   Gate rejects: {}", ingest.rejected);
    Ok(())
}

fn run_import_startups(csv_path: &str) -> Result<()> {
    println!("📥 Importing startups");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let report = load_startups(Path::new(csv_path))?;
    for (line, reason) in &report.skipped {
        println!("   ⚠️  line {}: {}", line, reason);
    }

    let pipeline = open_pipeline()?;
    let count = pipeline.import_startups(report.records)?;

    println!("\n✅ Stored {} startups", count);
    Ok(())
}

fn run_extract(text_path: &str, source_id: &str) -> Result<()> {
    println!("🔎 Extracting candidates from {}", text_path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let text = fs::read_to_string(text_path)
        .with_context(|| format!("Failed to read text file: {}", text_path))?;

    let extractor = CandidateExtractor::new()?;
    let mentions = extractor.to_mentions(&text, source_id, Utc::now());
    for m in &mentions {
        match &m.firm {
            Some(firm) => println!("   • {} ({})", m.candidate_name, firm),
            None => println!("   • {}", m.candidate_name),
        }
    }

    let pipeline = open_pipeline()?;
    let ingest = pipeline.ingest_mentions(&mentions)?;

    println!("\n✅ {} candidates found, {} new mentions recorded", mentions.len(), ingest.recorded);
    Ok(())
}

fn run_cycle(signals_path: Option<&str>) -> Result<()> {
    println!("🔁 Running match cycle");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = open_pipeline()?;
    let default_momentum = pipeline.config().matching.default_momentum;
    let signals = match signals_path {
        Some(path) => load_signals(Path::new(path), default_momentum, pipeline.normalizer())?,
        None => SectorSignals::new(default_momentum),
    };
    println!("✓ {} sector signals loaded", signals.len());

    match pipeline.run_cycle(&signals, Utc::now()) {
        Ok(report) => {
            println!("\n{}", report.regeneration.preflight);
            println!("{}", report.regeneration.precommit);
            println!("\n✅ {}", report.summary());
            let stats = &report.regeneration.stats;
            println!(
                "   inserted {} | refreshed {} | replaced {} | removed {}",
                stats.inserted, stats.refreshed, stats.replaced, stats.removed
            );
            Ok(())
        }
        Err(PipelineError::Blocked(verdict)) => {
            eprintln!("\n{}", verdict);
            eprintln!("   Live matches were left untouched.");
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

fn run_revalidate() -> Result<()> {
    println!("🛡️  Re-validating stored mentions");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = open_pipeline()?;
    let gate = pipeline.config().build_gate()?;
    let mentions = pipeline.store().all_mentions()?;

    let results = gate.validate_batch(mentions.iter().map(|m| {
        (
            m.candidate_name.as_str(),
            GateContext {
                firm: m.firm(),
                url: m.url(),
                snippet: &m.context,
            },
        )
    }));
    let summary = gate.batch_summary(&results);

    println!("{}", summary.summary());
    for (reason, count) in summary.top_reasons.iter().take(10) {
        println!("   {:>6}  {}", count, reason);
    }
    Ok(())
}

fn run_check_guard(args: &[String]) -> Result<()> {
    let current: u64 = arg(args, 2, "current count")?
        .parse()
        .context("current count must be a non-negative integer")?;
    let prior: Option<u64> = match args.get(3) {
        Some(value) => Some(value.parse().context("prior count must be a non-negative integer")?),
        None => None,
    };

    let verdict = load_config()?.build_guard().check_safe(current, prior);
    println!("{}", verdict);

    if !verdict.safe {
        std::process::exit(2);
    }
    Ok(())
}

fn run_events(event_type: Option<&str>) -> Result<()> {
    let pipeline = open_pipeline()?;
    let events = pipeline.store().recent_events(event_type, 50)?;

    println!("📜 {} recent events", events.len());
    for event in events {
        println!(
            "   {}  {:<18} {}:{}  {}",
            event.timestamp, event.event_type, event.entity_type, event.entity_id, event.data
        );
    }
    Ok(())
}
