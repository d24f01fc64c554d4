//! Extension Inspector CLI
//!
//! Checks capabilities documents and queries the extensions they declare.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use wms_extensions::{
    documentation_base, encode_document, ExtensionDescriptor, ExtensionRegistry, ExtensionsConfig, IngestReport,
    Ingestor,
};

#[derive(Parser)]
#[command(name = "wms-ext-inspect")]
#[command(about = "Validate and query WMS SupportedExtension declarations")]
struct Cli {
    /// Config file to load (optional)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate documents; exits non-zero if any record was dropped
    Check {
        /// Capabilities documents or directories of them
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print full ingest reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the extensions available per layer
    Layers {
        /// Capabilities document
        path: PathBuf,

        /// Only this layer
        #[arg(short, long)]
        layer: Option<String>,
    },

    /// Print accepted descriptors as JSON
    Show {
        /// Capabilities document
        path: PathBuf,

        /// Only descriptors of this extension
        #[arg(short, long)]
        extension: Option<String>,

        /// Extension version (with --extension)
        #[arg(short = 'V', long)]
        version: Option<String>,

        /// URL the document was requested from; resolves relative documentation links
        #[arg(long)]
        request_url: Option<String>,
    },

    /// Re-encode accepted descriptors as a capabilities document
    Encode {
        /// Capabilities document
        path: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ExtensionsConfig::load_from(cli.config.as_deref())?;
    let ingestor = Ingestor::new(&config);

    match cli.command {
        Commands::Check { paths, json } => {
            let files = collect_documents(&paths)?;
            if files.is_empty() {
                bail!("no .xml documents found");
            }

            let mut all_clean = true;
            let mut reports = Vec::new();
            for file in &files {
                let registry = ExtensionRegistry::new();
                match load(&ingestor, file, &registry) {
                    Ok(report) => {
                        all_clean &= report.is_clean();
                        if !json {
                            print_summary(file, &report);
                        }
                        reports.push(serde_json::json!({ "path": file, "report": report }));
                    }
                    Err(e) => {
                        all_clean = false;
                        println!("❌ {} - {:#}", file.display(), e);
                        reports.push(serde_json::json!({ "path": file, "error": format!("{:#}", e) }));
                    }
                }
            }

            if json {
                println!("{}", config.output.format.to_json(&reports)?);
            }
            if !all_clean {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Layers { path, layer } => {
            let registry = ExtensionRegistry::new();
            load(&ingestor, &path, &registry)?;

            let layers = match layer {
                Some(l) => vec![l],
                None => registry.layers(),
            };
            for layer in layers {
                println!("{}", layer);
                let descriptors = registry.by_layer(&layer);
                if descriptors.is_empty() {
                    println!("  (no extensions)");
                }
                for d in descriptors {
                    println!("  └─ {} ({} properties)", d.id(), d.properties.len());
                }
            }
            Ok(())
        }

        Commands::Show {
            path,
            extension,
            version,
            request_url,
        } => {
            let registry = ExtensionRegistry::new();
            load(&ingestor, &path, &registry)?;

            let descriptors: Vec<ExtensionDescriptor> = match &extension {
                Some(name) => registry
                    .by_extension(name, version.as_deref())
                    .iter()
                    .map(|d| d.as_ref().clone())
                    .collect(),
                None => registry.all().to_vec(),
            };

            let base = request_url
                .as_deref()
                .and_then(|url| documentation_base(&config.service, url));
            let output: Vec<_> = descriptors
                .iter()
                .map(|d| {
                    let resolved = d
                        .resolve_documentation(base.as_ref())
                        .map(|u| u.to_string())
                        .ok();
                    serde_json::json!({ "descriptor": d, "documentation": resolved })
                })
                .collect();

            println!("{}", config.output.format.to_json(&output)?);
            Ok(())
        }

        Commands::Encode { path, output } => {
            let registry = ExtensionRegistry::new();
            load(&ingestor, &path, &registry)?;

            let snapshot = registry.all();
            let xml = encode_document(snapshot.iter())?;
            match output {
                Some(out) => {
                    std::fs::write(&out, xml)?;
                    println!("✅ Wrote {} extension(s) to {:?}", snapshot.len(), out);
                }
                None => println!("{}", xml),
            }
            Ok(())
        }
    }
}

fn load(ingestor: &Ingestor, path: &Path, registry: &ExtensionRegistry) -> anyhow::Result<IngestReport> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    ingestor
        .ingest_reader(file, registry)
        .with_context(|| format!("ingesting {}", path.display()))
}

/// Expand directories into the `.xml` files beneath them
fn collect_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                let is_xml = entry.path().extension().map(|e| e == "xml").unwrap_or(false);
                if entry.file_type().is_file() && is_xml {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn print_summary(path: &Path, report: &IngestReport) {
    let status = if report.is_clean() { "✅" } else { "❌" };
    println!(
        "{} {} - {} of {} extension(s) registered",
        status,
        path.display(),
        report.registered,
        report.candidates
    );
    for e in &report.decode_errors {
        println!("   └─ line {}: {}", e.line, e.error);
    }
    for rejection in &report.rejected {
        for issue in &rejection.issues {
            println!("   └─ line {}: {}: {}", rejection.line, rejection.extension, issue);
        }
    }
    for warning in &report.warnings {
        println!("   ⚠ {}: {}", warning.extension, warning.issue);
    }
    for duplicate in &report.duplicates {
        println!("   └─ duplicate {} on layer {}", duplicate.extension, duplicate.layer);
    }
    for name in &report.unknown_capabilities {
        println!("   · skipped extended capability {}", name);
    }
}
