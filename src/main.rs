use archive_search::Result;
use archive_search::commands::{SearchOverrides, run_search, show_status};
use archive_search::config::{get_config_dir, run_interactive_config, show_config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "archive-search")]
#[command(about = "Semantic search over an archive of documents and flight logs")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.archive-search)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding provider and search defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Search the archive by meaning rather than keywords
    Search {
        /// Natural-language query
        query: String,
        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum cosine similarity for a result to be shown
        #[arg(long, allow_negative_numbers = true)]
        min_score: Option<f32>,
        /// Corpus rows read per page
        #[arg(long)]
        batch_size: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show database and provider status
    Status {
        /// Scan the whole corpus for unreadable records
        #[arg(long)]
        audit: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Search {
            query,
            top_k,
            min_score,
            batch_size,
            json,
        } => {
            let overrides = SearchOverrides {
                top_k,
                min_score,
                batch_size,
            };
            return Ok(run_search(&config_dir, &query, overrides, json).await?);
        }
        Commands::Status { audit } => {
            show_status(&config_dir, audit).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn search_command_with_defaults() {
        let cli = Cli::try_parse_from(["archive-search", "search", "flights to the island"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                top_k,
                min_score,
                batch_size,
                json,
            } = parsed.command
            {
                assert_eq!(query, "flights to the island");
                assert_eq!(top_k, None);
                assert_eq!(min_score, None);
                assert_eq!(batch_size, None);
                assert!(!json);
            } else {
                panic!("expected search command");
            }
        }
    }

    #[test]
    fn search_command_with_overrides() {
        let cli = Cli::try_parse_from([
            "archive-search",
            "search",
            "deposition",
            "--top-k",
            "5",
            "--min-score",
            "-0.1",
            "--batch-size",
            "200",
            "--json",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                top_k,
                min_score,
                batch_size,
                json,
                ..
            } = parsed.command
            {
                assert_eq!(top_k, Some(5));
                assert_eq!(min_score, Some(-0.1));
                assert_eq!(batch_size, Some(200));
                assert!(json);
            } else {
                panic!("expected search command");
            }
        }
    }

    #[test]
    fn search_requires_query() {
        let cli = Cli::try_parse_from(["archive-search", "search"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn status_audit_flag() {
        let cli = Cli::try_parse_from(["archive-search", "status", "--audit"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status { audit: true }));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["archive-search", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["archive-search", "status", "--config-dir", "/tmp/archive"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/archive")));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["archive-search", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["archive-search", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
