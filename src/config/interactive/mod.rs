#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Config, ConfigError, OllamaConfig, STORE_URI_ENV};
use crate::embeddings::OllamaClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!(
        "{}",
        style("🔧 Curriculum MCP Configuration Setup").bold().cyan()
    );
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for embedding generation.");
    eprintln!("Ingestion and search must use the same model.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Collection Configuration").bold().yellow());
    configure_collection(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match check_ollama(&config.ollama) {
        Ok(()) => eprintln!(
            "{}",
            style(format!("✓ Ollama is serving {}", config.ollama.model)).green()
        ),
        Err(e) => {
            eprintln!("{}", style(format!("⚠ Ollama check failed: {:#}", e)).yellow());
            eprintln!("You can continue, but ingestion and search need the model available.");
        }
    }

    if std::env::var(STORE_URI_ENV).is_err() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ {} is not set. Export it before running ingest, search or serve.",
                STORE_URI_ENV
            ))
            .yellow()
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

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  Window: {} chars, overlap {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  Table: {}", style(&config.store.table_name).cyan());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    match config.store_settings() {
        Ok(settings) => eprintln!("  {}: {}", STORE_URI_ENV, style(settings.uri).cyan()),
        Err(_) => eprintln!("  {}: {}", STORE_URI_ENV, style("not set").red()),
    }

    eprintln!();
    eprintln!(
        "PDF folder: {}",
        style(config.ingestion.pdf_folder.display()).cyan()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| {
            OllamaConfig {
                port: *input,
                ..OllamaConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model (ingestion and search share it)")
        .default(ollama.model.clone())
        .validate_with(|input: &String| {
            OllamaConfig {
                model: input.clone(),
                ..OllamaConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Vector size produced by the model")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| {
            OllamaConfig {
                embedding_dimension: *input,
                ..OllamaConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Chunks per embedding request")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| {
            OllamaConfig {
                batch_size: *input,
                ..OllamaConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    ollama
        .update(|c| {
            c.protocol = protocol;
            c.host = host;
            c.port = port;
            c.model = model;
            c.embedding_dimension = embedding_dimension;
            c.batch_size = batch_size;
        })
        .context("Ollama settings are inconsistent")
}

fn configure_collection(config: &mut Config) -> Result<()> {
    let table_name: String = Input::new()
        .with_prompt("Vector table name")
        .default(config.store.table_name.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if !input.is_empty()
                && input
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                Ok(())
            } else {
                Err("Use letters, digits, '_' or '-'")
            }
        })
        .interact_text()?;

    let pdf_folder: String = Input::new()
        .with_prompt("PDF folder")
        .default(config.ingestion.pdf_folder.display().to_string())
        .interact_text()?;

    config.store.table_name = table_name;
    config.ingestion.pdf_folder = PathBuf::from(pdf_folder);

    Ok(())
}

/// Reach Ollama and confirm the model has been pulled
fn check_ollama(ollama: &OllamaConfig) -> Result<()> {
    OllamaClient::new(ollama)?
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1)
        .validate_model()
}
