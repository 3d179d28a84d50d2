#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::Path;

use super::{Config, ConfigError, EmbeddingConfig, SearchConfig};
use crate::embeddings::OpenAiClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Archive Search Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Configure the OpenAI-compatible endpoint used to embed search queries.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Search Defaults").bold().yellow());
    configure_search(&mut config.search)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_provider_connection(&config.embedding) {
        eprintln!("{}", style("✓ Embedding provider reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the embedding provider").yellow()
        );
        eprintln!(
            "You can continue, but make sure {} is set before searching.",
            config.embedding.api_key_env
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Provider:").bold().yellow());
    match config.embedding.base_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    match config.embedding.dimensions {
        Some(dimensions) => eprintln!("  Dimensions: {}", style(dimensions).cyan()),
        None => eprintln!("  Dimensions: {}", style("model default").dim()),
    }
    let key_source = if config.embedding.api_key.is_some() {
        "inline".to_string()
    } else {
        format!("${}", config.embedding.api_key_env)
    };
    let key_state = if config.embedding.resolve_api_key().is_some() {
        style("set").green()
    } else {
        style("missing").red()
    };
    eprintln!("  API Key: {} ({})", key_state, key_source);
    eprintln!(
        "  Timeouts: {}s request, {}s connect",
        style(config.embedding.timeout_secs).cyan(),
        style(config.embedding.connect_timeout_secs).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Search Defaults:").bold().yellow());
    eprintln!("  Top K: {}", style(config.search.top_k).cyan());
    eprintln!("  Min Score: {}", style(config.search.min_score).cyan());
    eprintln!("  Batch Size: {}", style(config.search.batch_size).cyan());
    match config.search.scan_timeout_secs {
        Some(secs) => eprintln!("  Scan Timeout: {}s", style(secs).cyan()),
        None => eprintln!("  Scan Timeout: {}", style("none").dim()),
    }

    eprintln!();
    eprintln!(
        "Database: {}",
        style(config.database_path().display()).dim()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Provider base URL")
        .default(embedding.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                base_url: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(embedding.api_key_env.clone())
        .interact_text()?;

    let timeout_secs: u64 = Input::new()
        .with_prompt("Request timeout in seconds")
        .default(embedding.timeout_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=120).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 120 seconds")
            }
        })
        .interact_text()?;

    embedding.set_base_url(base_url)?;
    embedding.set_model(model)?;
    embedding.set_api_key_env(api_key_env)?;
    embedding.set_timeout_secs(timeout_secs)?;

    Ok(())
}

fn configure_search(search: &mut SearchConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Results per search")
        .default(search.top_k)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            SearchConfig::default().set_top_k(*input)
        })
        .interact_text()?;

    let min_score: f32 = Input::new()
        .with_prompt("Minimum relevance score")
        .default(search.min_score)
        .validate_with(|input: &f32| -> Result<(), ConfigError> {
            SearchConfig::default().set_min_score(*input)
        })
        .interact_text()?;

    let batch_size: usize = Input::new()
        .with_prompt("Corpus scan batch size")
        .default(search.batch_size)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            SearchConfig::default().set_batch_size(*input)
        })
        .interact_text()?;

    search.set_top_k(top_k)?;
    search.set_min_score(min_score)?;
    search.set_batch_size(batch_size)?;

    Ok(())
}

fn test_provider_connection(embedding: &EmbeddingConfig) -> bool {
    match OpenAiClient::new(embedding) {
        Ok(client) => client.ping().is_ok(),
        Err(_) => false,
    }
}
