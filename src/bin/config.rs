//! Extension Config CLI
//!
//! View and manage extension registry configuration.

use clap::{Parser, Subcommand};
use wms_extensions::ExtensionsConfig;

#[derive(Parser)]
#[command(name = "wms-ext-config")]
#[command(about = "View and manage WMS extension registry configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Show {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output as TOML
        #[arg(long)]
        toml: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new config file
    Init {
        /// Output path
        #[arg(short, long, default_value = "wms-extensions.toml")]
        output: String,
    },

    /// Validate configuration
    Validate {
        /// Config file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Show { config, toml, json } => {
            let cfg = ExtensionsConfig::load_from(config.as_deref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else if toml {
                println!("{}", ::toml::to_string_pretty(&cfg)?);
            } else {
                println!("📋 WMS Extension Registry Configuration\n");
                println!("Parser:");
                println!("  Require extension version: {}", cfg.parser.require_extension_version);
                println!("  Accept standalone elements: {}", cfg.parser.accept_standalone);

                println!("\nValidation:");
                println!("  Conflict policy: {:?}", cfg.validation.conflict_policy);

                println!("\nRegistry:");
                println!("  On duplicate: {:?}", cfg.registry.on_duplicate);

                println!("\nService:");
                if cfg.service.allowed_urls.is_empty() {
                    println!("  (no allowed URLs)");
                }
                for url in &cfg.service.allowed_urls {
                    println!("  - {}", url);
                }

                println!("\nOutput:");
                println!("  Format: {:?}", cfg.output.format);
            }
        }

        Commands::Init { output } => {
            let cfg = ExtensionsConfig::default();
            cfg.save(&output)?;
            println!("✅ Created config file: {}", output);
        }

        Commands::Validate { config } => match ExtensionsConfig::load_from(config.as_deref()) {
            Ok(cfg) => {
                println!("✅ Configuration is valid");
                println!("   Conflict policy: {:?}", cfg.validation.conflict_policy);
                println!("   Allowed URLs: {}", cfg.service.allowed_urls.len());
            }
            Err(e) => {
                eprintln!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
