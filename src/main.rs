use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use receiptify::config::Settings;
use receiptify::template::Template;
use receiptify::PluginManager;

/// Receiptify - receipt templates with Lua macro plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Plugin directory, overriding the one in the settings
    #[arg(short, long)]
    plugins: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expand every macro in a template file and print the result as JSON
    Expand {
        /// Template JSON file
        template: PathBuf,
    },
    /// Expand macros in a piece of text
    Eval {
        text: String,
    },
    /// List loaded plugins and their functions
    Plugins,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so expanded output can be piped
    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let settings = if let Some(path) = &args.settings {
        Settings::load_from_file(path)?
    } else {
        Settings::load_default()?
    };

    let plugin_dir = args.plugins.as_deref().or_else(|| settings.plugin_dir());
    let (plugins, report) =
        PluginManager::load(plugin_dir).context("Failed to start plugin host")?;

    match args.command {
        Command::Expand { template } => {
            let template = Template::load_from_file(&template)?;
            let expanded = template
                .expand(&plugins)
                .with_context(|| format!("Failed to expand template '{}'", template.name))?;
            println!("{}", serde_json::to_string_pretty(&expanded)?);
        }
        Command::Eval { text } => {
            let expanded = plugins
                .expand_text(&text)
                .context("Failed to expand text")?;
            println!("{expanded}");
        }
        Command::Plugins => {
            for manifest in plugins.manifests().sorted() {
                println!("{} {}", manifest.name, manifest.version);
                for function in &manifest.functions {
                    println!("  {function}");
                }
            }
            for failure in &report.failures {
                println!("{} ({}) failed: {}", failure.id, failure.origin, failure.error);
            }
        }
    }

    Ok(())
}
