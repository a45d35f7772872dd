pub mod types;
pub mod config;
pub mod error;
pub mod color;
pub mod data;
pub mod join;
pub mod cache;
pub mod fetch;
pub mod panel;
pub mod render;
pub mod svg;
pub mod raster;
pub mod session;
pub mod server;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use session::{LoadOutcome, MonthController, Session};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth for one month to .svg, .png or .html
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Month name; defaults to the configured initial month
        #[arg(short, long)]
        month: Option<String>,
        #[arg(short, long, value_name = "FILE", default_value = "map.svg")]
        out: PathBuf,
    },
    /// Serve the interactive map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, month, out } => {
            println!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let month = month.clone().unwrap_or_else(|| app_config.map.initial_month.clone());
            let controller = MonthController::for_month(&month)
                .ok_or_else(|| anyhow!("Unknown month: {}", month))?;

            let session = Session::from_config(Arc::new(fetch::HttpFetcher::new()?), &app_config);

            // 1. Fetch, join and draw
            match session.load_month(controller.label()).await? {
                LoadOutcome::Rendered(summary) => println!(
                    "Joined {} of {} rows onto {} sub-districts",
                    summary.joined, summary.rows, summary.features
                ),
                LoadOutcome::Superseded { .. } => return Err(anyhow!("Load was superseded")),
            }

            // 2. Write in the format the extension asks for
            let state = session.state().read().await;
            let extension = out
                .extension()
                .and_then(|e| e.to_str())
                .map(|s| s.to_lowercase())
                .ok_or_else(|| anyhow!("Output file has no extension"))?;

            match extension.as_str() {
                "svg" => std::fs::write(out, svg::render_svg(&state.renderer))
                    .with_context(|| format!("Failed to write {:?}", out))?,
                "html" => std::fs::write(
                    out,
                    svg::render_page(&state.renderer, controller.label(), controller.position()),
                )
                .with_context(|| format!("Failed to write {:?}", out))?,
                "png" => raster::render_png(&state.renderer)
                    .save(out)
                    .with_context(|| format!("Failed to write {:?}", out))?,
                other => return Err(anyhow!("Unsupported output format: {}", other)),
            }

            println!("Wrote {:?}", out);
        }
        Commands::Serve { config } => {
            println!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let session = Session::from_config(Arc::new(fetch::HttpFetcher::new()?), &app_config);
            server::start_server(app_config, session).await?;
        }
    }

    Ok(())
}
