// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use harvester_runtime::cli;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "harvester",
    about = "Harvester: progressive harvesting of lazily rendered pages",
    version,
    after_help = "Run 'harvester <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Suppress human-readable summaries
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a single page
    Harvest {
        /// Page URL
        url: String,
        /// JSON config file (defaults apply to missing keys)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,
        /// Stream harvest events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Harvest every URL in a file (one per line)
    Batch {
        /// File of URLs
        file: PathBuf,
        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the results here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Maximum concurrent pages
        #[arg(long, default_value = "2")]
        concurrency: usize,
        /// Pretty-print the results
        #[arg(long)]
        pretty: bool,
        /// Stream harvest events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Config file to validate
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also launch the browser and load a blank page
        #[arg(long)]
        launch: bool,
    },
    /// Print the effective configuration
    Config {
        /// Config file to merge over the defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "harvester_runtime=debug"
    } else {
        "harvester_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.quiet {
        std::env::set_var("HARVESTER_QUIET", "1");
    }
    init_tracing(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Harvest {
            url,
            config,
            output,
            pretty,
            events,
        } => cli::harvest_cmd::run(&url, config.as_deref(), output.as_deref(), pretty, events).await,
        Commands::Batch {
            file,
            config,
            output,
            concurrency,
            pretty,
            events,
        } => {
            cli::batch_cmd::run(
                &file,
                config.as_deref(),
                output.as_deref(),
                concurrency,
                pretty,
                events,
            )
            .await
        }
        Commands::Doctor { config, launch } => cli::doctor::run(config.as_deref(), launch).await,
        Commands::Config { config } => cli::config_cmd::run(config.as_deref()).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvester", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
