mod config;

use crate::config::get_storage;
use anyhow::{Context, Result, bail};
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use promptvc_core::prompt::{PromptVersion, SaveOptions};
use promptvc_core::registry::PromptRegistry;
use promptvc_core::snapshot::{export_snapshot, import_snapshot};
use promptvc_core::template::Renderer;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    display_name = "promptvc",
    bin_name = "promptvc",
    about = "Versioned prompt store with a sandboxed template renderer",
    long_about = "Stores numbered prompt versions per problem and model, tracks scores, \
    promotes one version to production and renders prompts as templates"
)]
struct Args {
    /// Database file to use instead of the configured one
    #[arg(short = 'p', long, global = true)]
    db_path: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Create the prompt store
    Init,
    /// Save a new prompt version
    #[command(group(ArgGroup::new("source").required(true).args(["content", "file"])))]
    Add {
        problem: String,
        model: String,
        #[arg(short = 'c', long)]
        content: Option<String>,
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
        #[arg(short = 's', long)]
        score: Option<f64>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        production: bool,
    },
    /// List every version of a prompt, most recent first
    List {
        problem: String,
        model: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the production prompt, or a specific version
    Get {
        problem: String,
        model: String,
        #[arg(long)]
        version: Option<u32>,
    },
    /// Make a version the production version
    Promote {
        problem: String,
        model: String,
        version: u32,
    },
    /// Record an evaluation score for a version
    Score {
        problem: String,
        model: String,
        version: u32,
        score: f64,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Delete one version, or all versions with --all
    Delete {
        problem: String,
        model: String,
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        version: Option<u32>,
        #[arg(long)]
        all: bool,
    },
    /// Render the production prompt, or a specific version
    Render {
        problem: String,
        model: String,
        #[arg(long)]
        version: Option<u32>,
        /// Template variables as key=value; values that parse as JSON are passed as JSON
        #[arg(short = 'a', long = "arg")]
        args: Vec<String>,
    },
    /// Write every version of a prompt to Markdown files
    Export {
        problem: String,
        model: String,
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
    /// Save every Markdown snapshot found in a directory
    Import {
        #[arg(short = 'i', long)]
        input: PathBuf,
    },
    /// Delete the prompt store
    Reset,
    /// Print shell completions
    Completions { shell: Shell },
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Commands::Completions { shell } = args.cmd {
        clap_complete::generate(shell, &mut Args::command(), "promptvc", &mut io::stdout());
        return Ok(());
    }

    let storage = get_storage(args.db_path);
    if let Commands::Reset = args.cmd {
        storage.reset().context("Failed to reset prompt store")?;
        println!("Removed prompt store at {}", storage.db_path().display());
        return Ok(());
    }

    storage.initialize().context("Failed to initialize prompt store")?;

    match args.cmd {
        Commands::Init => {
            println!("Initialized prompt store at {}", storage.db_path().display());
        }
        Commands::Add {
            problem,
            model,
            content,
            file,
            score,
            comment,
            production,
        } => {
            let prompt = match (content, file) {
                (Some(content), _) => content,
                (None, Some(file)) => fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read prompt from {}", file.display()))?,
                (None, None) => bail!("Either --content or --file is required"),
            };
            let options = SaveOptions {
                score,
                comment,
                production,
            };
            let version = storage.save(&problem, &model, &prompt, options)?;
            println!("Saved {}/{} version {}", problem, model, version);
        }
        Commands::List { problem, model, json } => {
            let versions = storage.get_all(&problem, &model)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else {
                for version in &versions {
                    println!("{}", format_version(version));
                }
            }
        }
        Commands::Get {
            problem,
            model,
            version,
        } => {
            let prompt = lookup_prompt(&storage, &problem, &model, version)?;
            println!("{}", prompt);
        }
        Commands::Promote {
            problem,
            model,
            version,
        } => {
            storage.set_production(&problem, &model, version)?;
            println!("Promoted {}/{} version {} to production", problem, model, version);
        }
        Commands::Score {
            problem,
            model,
            version,
            score,
            comment,
        } => {
            if !storage.update_score(&problem, &model, version, score, comment.as_deref())? {
                bail!("Version {} of {}/{} not found", version, problem, model);
            }
            println!("Scored {}/{} version {}", problem, model, version);
        }
        Commands::Delete {
            problem,
            model,
            version,
            all,
        } => match version {
            Some(version) if !all => {
                storage.delete(&problem, &model, version)?;
                println!("Deleted {}/{} version {}", problem, model, version);
            }
            _ => {
                storage.delete_all(&problem, &model)?;
                println!("Deleted all versions of {}/{}", problem, model);
            }
        },
        Commands::Render {
            problem,
            model,
            version,
            args,
        } => {
            let prompt = lookup_prompt(&storage, &problem, &model, version)?;
            let template = Renderer::new().compile(&prompt)?;
            let rendered = template.render(&parse_args(&args)?)?;
            println!("{}", rendered.trim());
        }
        Commands::Export { problem, model, output } => {
            let count = export_snapshot(&storage, &problem, &model, &output)?;
            println!("Exported {} versions to {}", count, output.display());
        }
        Commands::Import { input } => {
            let count = import_snapshot(&storage, &input)?;
            println!("Imported {} versions from {}", count, input.display());
        }
        Commands::Reset | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn lookup_prompt<R: PromptRegistry>(registry: &R, problem: &str, model: &str, version: Option<u32>) -> Result<String> {
    match version {
        Some(version) => match registry.get_prompt(problem, model, version)? {
            Some(prompt) => Ok(prompt),
            None => bail!("Version {} of {}/{} not found", version, problem, model),
        },
        None => match registry.get_production(problem, model)? {
            Some(prompt) => Ok(prompt),
            None => bail!("No production version for {}/{}", problem, model),
        },
    }
}

fn format_version(version: &PromptVersion) -> String {
    let marker = if version.production { "*" } else { " " };
    let score = version.score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
    let comment = version.comment.as_deref().unwrap_or("");
    let first_line = version.prompt.lines().next().unwrap_or("");
    format!("{} v{:<4} {:<6} {:<24} {}", marker, version.version, score, comment, first_line)
}

fn parse_args(args: &[String]) -> Result<Map<String, Value>> {
    let mut context = Map::new();
    for arg in args {
        let Some((key, raw)) = arg.split_once('=') else {
            bail!("Invalid argument '{}', expected key=value", arg);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}
