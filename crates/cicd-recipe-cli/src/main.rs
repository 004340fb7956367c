//! CI/CD recipe CLI.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "recipe")]
#[command(about = "Synthesize the CI/CD recipe stacks", long_about = None)]
struct Cli {
    /// Path to the recipe configuration file (defaults to ./recipe.kdl when present)
    #[arg(long, env = "RECIPE_CONFIG", global = true)]
    config: Option<String>,

    /// Context value, highest precedence (repeatable)
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE", global = true)]
    context: Vec<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write templates and a manifest for the selected stacks
    Synth {
        /// Output directory
        #[arg(long, default_value = "cdk.out")]
        out: String,
        /// Stacks to synthesize (all when omitted)
        stacks: Vec<String>,
    },
    /// List stacks in deployment order
    List,
    /// Compare a fresh synthesis with an existing output directory
    Diff {
        /// Output directory holding the previous synthesis
        #[arg(long, default_value = "cdk.out")]
        out: String,
        /// Stacks to compare (all when omitted)
        stacks: Vec<String>,
    },
    /// Validate the configuration and every stack definition
    Validate {
        /// Path to the configuration file
        path: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Synth { out, stacks } => {
            let settings = commands::load_settings(cli.config.as_deref(), &cli.context)?;
            commands::synth::run(&settings, &out, &stacks)?;
        }
        Commands::List => {
            commands::list::run()?;
        }
        Commands::Diff { out, stacks } => {
            let settings = commands::load_settings(cli.config.as_deref(), &cli.context)?;
            commands::diff::run(&settings, &out, &stacks)?;
        }
        Commands::Validate { path } => {
            let path = path.or(cli.config);
            commands::validate(path.as_deref(), &cli.context)?;
        }
    }

    Ok(())
}
