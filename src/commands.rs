use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::corpus::CorpusSource;
use crate::database::Database;
use crate::embeddings::OpenAiClient;
use crate::hydration::{DocumentRecord, FlightRecord, HydratedResult, Subject};
use crate::ranking::audit_corpus;
use crate::search::{NO_RELEVANT_RESULTS, SearchOptions, SearchResponse, SemanticSearch};

/// Command-line overrides of the configured search settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchOverrides {
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub batch_size: Option<usize>,
}

impl SearchOverrides {
    /// Apply the overrides on top of the configured search section
    #[inline]
    pub fn resolve(&self, config: &Config) -> Result<SearchOptions> {
        let mut search = config.search.clone();
        if let Some(top_k) = self.top_k {
            search.set_top_k(top_k)?;
        }
        if let Some(min_score) = self.min_score {
            search.set_min_score(min_score)?;
        }
        if let Some(batch_size) = self.batch_size {
            search.set_batch_size(batch_size)?;
        }
        Ok(SearchOptions::from(&search))
    }
}

/// Run one semantic search and print the results
///
/// Returns a failure exit code when the search itself failed; an empty result
/// is a success.
#[inline]
pub async fn run_search(
    config_dir: &Path,
    query: &str,
    overrides: SearchOverrides,
    json: bool,
) -> Result<ExitCode> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let options = overrides.resolve(&config)?;

    let database = Database::open(&config)
        .await
        .context("Failed to open archive database")?;
    let engine = SemanticSearch::from_config(&config, database)?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling search");
                cancel.cancel();
            }
        })
    };

    let spinner = search_spinner(query);
    let outcome = engine.search(query, &options, &cancel).await;
    spinner.finish_and_clear();
    interrupt.abort();

    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            error!("Search failed: {}", e);
            eprintln!("{} {}", style("✗").red().bold(), e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&response).context("Failed to serialize results")?;
        println!("{}", rendered);
    } else {
        print_response(&response);
    }

    Ok(ExitCode::SUCCESS)
}

fn search_spinner(query: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = ProgressBar::new_spinner().with_style(style);
    spinner.set_message(format!("Searching for \"{}\"", query));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_response(response: &SearchResponse) {
    if response.is_empty() {
        println!("{}", style(NO_RELEVANT_RESULTS).yellow());
    } else {
        for (rank, result) in response.results.iter().enumerate() {
            println!("{}", render_result(rank + 1, result));
            println!();
        }
    }

    let stats = &response.stats;
    let mut summary = vec![format!(
        "{} results from {} records in {}ms",
        response.results.len(),
        stats.scanned,
        stats.elapsed_ms
    )];
    if !stats.skipped.is_empty() {
        summary.push(format!("{} unreadable records skipped", stats.skipped.total()));
    }
    if stats.dropped > 0 {
        summary.push(format!("{} deleted subjects dropped", stats.dropped));
    }
    println!("{}", style(summary.join(", ")).dim());
}

/// Relevance as a whole percentage, as shown on result cards
#[inline]
pub fn relevance_percent(score: f32) -> i64 {
    (f64::from(score) * 100.0).round() as i64
}

/// Render one result as a plain-text card
#[inline]
pub fn render_result(rank: usize, result: &HydratedResult) -> String {
    let relevance = format!("Relevance: {}%", relevance_percent(result.score));

    match &result.subject {
        Subject::Document(document) => render_document(rank, document, &result.snippet, &relevance),
        Subject::Flight(flight) => render_flight(rank, flight, &result.snippet, &relevance),
    }
}

fn render_document(rank: usize, document: &DocumentRecord, snippet: &str, relevance: &str) -> String {
    let mut lines = vec![format!(
        "{}. {} {}",
        rank,
        style("[Document]").magenta(),
        style(document.display_title()).bold()
    )];

    let summary = document
        .ai_summary
        .as_deref()
        .unwrap_or("No summary available.");
    lines.push(format!("   \"{}\"", summary));

    if !snippet.is_empty() {
        lines.push(format!("   {}", style(excerpt(snippet)).italic()));
    }

    let mut footer = vec![relevance.to_string(), format!("ID: {}", document.id)];
    if let Some(data_set) = &document.data_set {
        footer.push(format!("Data set: {}", data_set));
    }
    lines.push(format!("   {}", style(footer.join("  ")).dim()));

    lines.join("\n")
}

fn render_flight(rank: usize, flight: &FlightRecord, snippet: &str, relevance: &str) -> String {
    let route = format!(
        "{} → {}",
        flight.origin.as_deref().unwrap_or("Unknown"),
        flight.destination.as_deref().unwrap_or("Unknown")
    );
    let mut lines = vec![format!(
        "{}. {} {}",
        rank,
        style("[Flight Log]").blue(),
        style(route).bold()
    )];

    let date = flight
        .flight_date
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string());
    lines.push(format!(
        "   {} | Aircraft: {}",
        date,
        flight.aircraft.as_deref().unwrap_or("Unknown")
    ));

    if let Some(summary) = &flight.ai_summary {
        lines.push(format!("   {}", summary));
    } else if !snippet.is_empty() {
        lines.push(format!("   {}", style(excerpt(snippet)).italic()));
    }

    lines.push(format!(
        "   {}",
        style(format!("{}  ID: {}", relevance, flight.id)).dim()
    ));

    lines.join("\n")
}

/// First 200 characters of a snippet on one line
fn excerpt(snippet: &str) -> String {
    const MAX_CHARS: usize = 200;

    let flattened = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= MAX_CHARS {
        flattened
    } else {
        let cut: String = flattened.chars().take(MAX_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

/// Show connectivity, archive size and optionally a corpus defect audit
#[inline]
pub async fn show_status(config_dir: &Path, audit: bool) -> Result<()> {
    let config = Config::load(config_dir).unwrap_or_else(|e| {
        warn!("Ignoring unreadable configuration: {:#}", e);
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    });

    println!("{}", style("Archive Search Status").bold());
    println!("{}", "=".repeat(50));
    println!();

    println!("Database:");
    let database = match Database::open(&config).await {
        Ok(database) => {
            println!("   ✅ SQLite: {}", config.database_path().display());
            Some(database)
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to open - {:#}", e);
            None
        }
    };

    println!("Embedding provider:");
    match OpenAiClient::new(&config.embedding) {
        Ok(client) => {
            let ping = tokio::task::spawn_blocking(move || client.ping()).await;
            match ping {
                Ok(Ok(())) => println!(
                    "   ✅ {} ({})",
                    config.embedding.base_url, config.embedding.model
                ),
                Ok(Err(e)) => println!("   ⚠️  {}: {}", config.embedding.base_url, e),
                Err(e) => println!("   ❌ Connectivity check failed: {}", e),
            }
        }
        Err(e) => println!("   ❌ {}", e),
    }

    let Some(database) = database else {
        return Ok(());
    };

    println!();
    println!("Archive:");
    match database.counts().await {
        Ok(counts) => {
            println!("   📄 Documents: {}", counts.documents);
            println!("   ✈️  Flight logs: {}", counts.flights);
            println!("   🔢 Embeddings: {}", counts.embeddings);
        }
        Err(e) => println!("   ❌ Failed to count records: {:#}", e),
    }

    if audit {
        println!();
        println!("Corpus audit:");
        info!("Auditing corpus");

        let total = database.count().await.ok().flatten();
        let expected = config.embedding.dimensions.map(|d| d as usize);
        let cancel = CancellationToken::new();

        match audit_corpus(&database, expected, config.search.batch_size, &cancel).await {
            Ok(report) => {
                println!("   📊 Scanned: {}", report.scanned);
                if let Some(total) = total {
                    if total != report.scanned {
                        println!("   ⚠️  Row count changed during audit (now {})", total);
                    }
                }
                println!("   ✅ Valid: {}", report.valid);
                match report.dimension {
                    Some(dimension) => println!("   📐 Dimension: {}", dimension),
                    None => println!("   📐 Dimension: none"),
                }

                let skipped = &report.skipped;
                if skipped.is_empty() {
                    println!("   ✅ No defective records");
                } else {
                    println!("   ⚠️  Defective records: {}", skipped.total());
                    for (label, count) in [
                        ("Unparsable vector", skipped.unparsable_vector),
                        ("Dimension mismatch", skipped.dimension_mismatch),
                        ("Non-finite component", skipped.non_finite_component),
                        ("Zero vector", skipped.zero_norm),
                        ("Missing subject", skipped.missing_subject),
                        ("Ambiguous subject", skipped.ambiguous_subject),
                    ] {
                        if count > 0 {
                            println!("      {}: {}", label, count);
                        }
                    }
                }
            }
            Err(e) => println!("   ❌ Audit failed: {}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn document_result() -> HydratedResult {
        HydratedResult {
            corpus_record_id: 1,
            score: 0.8765,
            snippet: "Line one\n  line two".to_string(),
            subject: Subject::Document(DocumentRecord {
                id: 42,
                title: Some("Black book".to_string()),
                ai_summary: None,
                data_set: Some("Data Set 1".to_string()),
                file_type: None,
                created_at: None,
            }),
        }
    }

    #[test]
    fn relevance_rounds_to_whole_percent() {
        assert_eq!(relevance_percent(1.0), 100);
        assert_eq!(relevance_percent(0.8765), 88);
        assert_eq!(relevance_percent(0.25), 25);
        assert_eq!(relevance_percent(-0.5), -50);
    }

    #[test]
    fn document_card() {
        console::set_colors_enabled(false);
        let card = render_result(1, &document_result());

        assert!(card.starts_with("1. [Document] Black book"));
        assert!(card.contains("\"No summary available.\""));
        assert!(card.contains("Line one line two"));
        assert!(card.contains("Relevance: 88%"));
        assert!(card.contains("ID: 42"));
        assert!(card.contains("Data set: Data Set 1"));
    }

    #[test]
    fn flight_card() {
        console::set_colors_enabled(false);
        let result = HydratedResult {
            corpus_record_id: 2,
            score: 0.5,
            snippet: String::new(),
            subject: Subject::Flight(FlightRecord {
                id: 7,
                origin: Some("TEB".to_string()),
                destination: None,
                flight_date: NaiveDate::from_ymd_opt(2002, 9, 21),
                aircraft: Some("Boeing 727".to_string()),
                ai_summary: Some("Charter to Africa".to_string()),
            }),
        };

        let card = render_result(3, &result);
        assert!(card.starts_with("3. [Flight Log] TEB → Unknown"));
        assert!(card.contains("September 21, 2002 | Aircraft: Boeing 727"));
        assert!(card.contains("Charter to Africa"));
        assert!(card.contains("Relevance: 50%"));
    }

    #[test]
    fn long_snippets_are_shortened() {
        let snippet = "word ".repeat(100);
        let short = excerpt(&snippet);
        assert!(short.ends_with('…'));
        assert!(short.chars().count() <= 201);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn overrides_are_validated_against_config() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let config = Config::load(temp_dir.path()).expect("should load defaults");

        let options = SearchOverrides {
            top_k: Some(5),
            min_score: None,
            batch_size: Some(100),
        }
        .resolve(&config)
        .expect("overrides should be valid");
        assert_eq!(options.top_k, 5);
        assert_eq!(options.min_score, config.search.min_score);
        assert_eq!(options.batch_size, 100);

        let invalid = SearchOverrides {
            batch_size: Some(0),
            ..SearchOverrides::default()
        };
        assert!(invalid.resolve(&config).is_err());
    }
}
