// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

mod api;
mod config;
mod error;
mod export;
mod logging;
mod models;
mod rates;
mod tui;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::CbrClient;
use crate::config::Config;
use crate::models::RateTable;
use crate::rates::{RateSync, RefreshSummary};

#[derive(Parser)]
#[command(name = "cbr-rates", version, about = "Daily CBR exchange rates for USD, EUR and CNY")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive rates table (default)
    Tui,
    /// Fetch the current rates and print them
    Fetch,
    /// Fetch the current rates and export them to CSV
    Export {
        /// Target file, defaults to <output_dir>/currency_rates_<YYYYMMDD>.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tui);
    logging::init(cli.verbose, matches!(command, Commands::Tui))?;

    if let Commands::InitConfig { force } = command {
        return init_config(&cli.config, force);
    }

    let config = config::load_config(&cli.config)?;
    let sync = Arc::new(build_sync(&config)?);

    match command {
        Commands::Tui => {
            let output_dir = config.output_dir.clone();
            tokio::task::spawn_blocking(move || tui::start_tui(sync, output_dir)).await??;
        }
        Commands::Fetch => {
            fetch_with_progress(&sync).await?;
            print_rates(&sync.snapshot().await);
        }
        Commands::Export { output } => {
            fetch_with_progress(&sync).await?;
            let path = output.unwrap_or_else(|| {
                config
                    .output_dir
                    .join(export::default_file_name(Local::now().date_naive()))
            });
            let summary = export::export_rates(&sync.snapshot().await, &path, Local::now().date_naive())?;
            println!("📁 CSV file created: {} ({} rows)", summary.path.display(), summary.rows);
        }
        Commands::InitConfig { .. } => unreachable!(),
    }

    Ok(())
}

fn build_sync(config: &Config) -> Result<RateSync> {
    let client = CbrClient::from_config(config).context("Failed to build HTTP client")?;
    let table = RateTable::new(&config.currencies);
    Ok(RateSync::new(Arc::new(client), table, config.timeout()))
}

async fn fetch_with_progress(sync: &RateSync) -> Result<RefreshSummary> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Fetching current exchange rates...");

    let result = sync.refresh_now().await;
    pb.finish_and_clear();

    let summary = result.context("Failed to fetch exchange rates")?;
    match summary.published {
        Some(published) => println!(
            "✅ Exchange rates fetched (published {})",
            published.format("%d.%m.%Y")
        ),
        None => println!("✅ Exchange rates fetched"),
    }
    Ok(summary)
}

fn print_rates(table: &RateTable) {
    if table.is_empty() {
        println!("No currencies configured");
        return;
    }

    println!("{:<20} {:>12} {:>10} {:>12}", "Валюта", "Курс (руб)", "Изменение", "Дата");
    for rate in table.iter() {
        let [name, value, change, date] = tui::format_row(rate);
        let name = if rate.nominal > 1 {
            format!("{} ({})", name, rate.nominal)
        } else {
            name
        };
        println!("{:<20} {:>12} {:>10} {:>12}", name, value, change, date);
    }

    if let Some(updated) = table.last_updated() {
        println!(
            "{} currencies, updated {}",
            table.len(),
            updated.format("%d.%m.%Y %H:%M:%S")
        );
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
    }
    config::save_config(&Config::default(), path)?;
    println!("✅ Configuration written to {}", path.display());
    Ok(())
}
