//! VM placement CLI
//!
//! A command-line tool for training the placement models, inspecting their
//! performance and requesting host recommendations.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{models, placement, status};
use std::path::PathBuf;

/// VM placement CLI
#[derive(Parser)]
#[command(name = "vmp")]
#[command(author, version, about = "CLI for the VM placement service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via VMP_API_URL env var)
    #[arg(long, env = "VMP_API_URL")]
    pub api_url: Option<String>,

    /// Output format (defaults to the config file setting, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train all models and publish a new snapshot
    Initialize,

    /// Show test metrics of the trained models
    Results,

    /// Rank models by R²
    Performance,

    /// Show feature importances of a tree-based model
    Features {
        /// Model name (defaults to Random Forest on the server)
        #[arg(long, short)]
        model: Option<String>,
    },

    /// Recommend a host for a VM
    Predict {
        /// CPU usage in percent
        #[arg(long)]
        cpu: f64,

        /// Memory in GB
        #[arg(long)]
        memory: f64,

        /// Network I/O in Gbps
        #[arg(long)]
        network_io: f64,

        /// Power draw in watts
        #[arg(long)]
        power: f64,

        /// VM name
        #[arg(long, default_value = "VM1")]
        vm: String,

        /// Weight of the cost objective
        #[arg(long)]
        cost_weight: Option<f64>,

        /// Weight of the energy objective
        #[arg(long)]
        energy_weight: Option<f64>,

        /// Weight of the load balance objective
        #[arg(long)]
        load_weight: Option<f64>,
    },

    /// Grid-search hyperparameters and publish the tuned snapshot
    Tune,

    /// Show the training dataset summary
    Dataset,

    /// List VM names known to the models
    Vms,

    /// Show service health
    Health,

    /// Score candidate hosts for a VM demand
    ScoreHosts {
        /// JSON file with `hosts`, `vm` and optional `weights`
        file: PathBuf,
    },

    /// Manage the CLI configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current configuration
    Show,

    /// Store the API URL
    SetUrl {
        /// API endpoint URL
        url: String,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let mut file_config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| {
            file_config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();
    let api_url = file_config.resolve_api_url(cli.api_url.as_deref());
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Initialize => models::initialize(&client, format).await?,
        Commands::Results => models::results(&client, format).await?,
        Commands::Performance => models::performance(&client, format).await?,
        Commands::Features { model } => models::features(&client, model, format).await?,
        Commands::Predict {
            cpu,
            memory,
            network_io,
            power,
            vm,
            cost_weight,
            energy_weight,
            load_weight,
        } => {
            let request = placement::build_request(
                cpu,
                memory,
                network_io,
                power,
                vm,
                [cost_weight, energy_weight, load_weight],
            );
            placement::predict(&client, request, format).await?;
        }
        Commands::Tune => models::tune(&client, format).await?,
        Commands::Dataset => status::dataset(&client, format).await?,
        Commands::Vms => status::vms(&client, format).await?,
        Commands::Health => status::health(&client, format).await?,
        Commands::ScoreHosts { file } => placement::score_hosts(&client, &file, format).await?,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => output::print_json(&file_config)?,
            ConfigCommands::SetUrl { url } => {
                url::Url::parse(&url)?;
                file_config.api_url = Some(url);
                let path = file_config.save()?;
                output::print_success(&format!("Saved {}", path.display()));
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
