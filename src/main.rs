use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use specforge::settings::Settings;

mod cli;

#[derive(Parser)]
#[command(name = "specforge")]
#[command(about = "Turns a requirements document into a scaffolded, checked backend project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Perform a dry run without side effects")]
    dry_run: bool,

    #[arg(long, global = true, value_name = "FILE", help = "YAML configuration file")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Analyze a requirements document and generate the project")]
    Analyze {
        #[arg(help = "Requirements document (.docx, .txt, .md or .html)")]
        document: PathBuf,

        #[arg(long, help = "Directory to generate the project into")]
        output_dir: Option<PathBuf>,
    },

    #[command(about = "Serve the HTTP API")]
    Serve {
        #[arg(long, value_name = "HOST:PORT", help = "Address to listen on")]
        addr: Option<String>,
    },

    #[command(about = "Write a project plan (JSON) to disk")]
    Materialize {
        #[arg(help = "File containing the project plan")]
        plan_file: PathBuf,

        #[arg(long, help = "Directory to write the project into")]
        output_dir: Option<PathBuf>,
    },

    #[command(about = "Check and repair the Python files of a project")]
    Refine {
        #[arg(default_value = ".", help = "Project root")]
        dir: PathBuf,

        #[arg(long, help = "Maximum check/fix iterations per file")]
        max_iterations: Option<usize>,

        #[arg(long, help = "Number of files processed in parallel")]
        jobs: Option<usize>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Analyze {
            document,
            output_dir,
        } => cli::analyze(&document, output_dir, &settings, &config)?,
        Commands::Serve { addr } => cli::serve(addr, &settings, &config)?,
        Commands::Materialize {
            plan_file,
            output_dir,
        } => cli::materialize(&plan_file, output_dir, &settings, &config)?,
        Commands::Refine {
            dir,
            max_iterations,
            jobs,
        } => cli::refine(&dir, max_iterations, jobs, &settings, &config)?,
    }

    Ok(())
}
