//! rulec command-line driver
//!
//! Loads a rule document (YAML or JSON, one rule or a list), compiles each
//! rule into its entity list and decision program, and publishes the
//! versioned artifacts into an output directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use rulec_compiler::Orchestrator;
use rulec_emitter::{ArtifactCatalog, DirCatalog};
use rulec_grammar::RuleConfig;

#[derive(Parser)]
#[command(name = "rulec")]
#[command(about = "Compile home-automation rules into entity lists and decision programs")]
#[command(version)]
struct Cli {
    /// Rule document to compile (YAML or JSON; one rule or a list)
    rules: PathBuf,

    /// Directory the versioned artifacts publish into
    #[arg(short, long, default_value = "artifacts")]
    out: PathBuf,

    /// Print the full automation/entity records as JSON
    #[arg(long)]
    json: bool,

    /// Log verbosity
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let text = fs::read_to_string(&cli.rules)
        .with_context(|| format!("reading rule document {}", cli.rules.display()))?;
    let rules = RuleConfig::from_yaml(&text).context("classifying rule document")?;
    info!(rules = rules.len(), "loaded rule document");

    let catalog = DirCatalog::new(&cli.out);
    let mut failed = 0usize;

    for rule in &rules {
        // A failed rule aborts only that rule.
        match Orchestrator::new(&catalog).compile(rule) {
            Ok(compiled) => {
                catalog.publish(&compiled.artifact)?;
                if cli.json {
                    let record = serde_json::json!({
                        "automation": compiled.automation,
                        "entities": compiled.entities,
                    });
                    println!("{}", serde_json::to_string_pretty(&record)?);
                } else {
                    println!(
                        "{}: {} entities -> {}",
                        rule.name,
                        compiled.entities.len(),
                        cli.out.join(compiled.artifact.file_name()).display()
                    );
                }
            }
            Err(e) => {
                failed += 1;
                error!(rule = %rule.name, error = %e, "compilation failed");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} rules failed to compile", rules.len());
    }
    Ok(())
}
