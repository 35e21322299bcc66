use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::compiler::compile;
use crate::engine::EngineBuilder;
use crate::execute::AbortHandle;
use crate::host::BackendKind;
use crate::runtime::Context;
use crate::trace::{Snapshot, TraceSink};

#[derive(Parser)]
#[command(name = "sandscript")]
#[command(about = "Sandscript - run scripts against a sandboxed context", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script and print its outcome as JSON
    Run {
        /// Script file
        file: PathBuf,

        /// Context bindings (.json or .toml)
        #[arg(short = 'c', long = "context")]
        context: Option<PathBuf>,

        /// Execution backend: isolate, in_process
        #[arg(short = 'b', long = "backend")]
        backend: Option<BackendKind>,

        /// Run time limit in milliseconds (0 disables it)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Include the trace in the output
        #[arg(long)]
        trace: bool,
    },

    /// Print the instrumented form of a script and its source map
    Compile {
        /// Script file
        file: PathBuf,

        /// Print a JSON document instead of plain text
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            file,
            context,
            backend,
            timeout_ms,
            trace,
        } => {
            let source = read_script(&file)?;
            let context = match context {
                Some(path) => load_context(&path)?,
                None => Context::new(),
            };

            let mut builder = EngineBuilder::new();
            if let Some(path) = cli.config {
                builder = builder.config_path(path);
            }
            if let Some(backend) = backend {
                builder = builder.backend(backend);
            }
            if let Some(timeout_ms) = timeout_ms {
                builder = builder.timeout_ms(timeout_ms);
            }
            let engine = builder.build()?;

            let abort = AbortHandle::new();
            let on_interrupt = abort.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.abort_with_reason("Interrupted");
                }
            });

            let sink = TraceSink::new();
            let result = engine
                .execute(&context, source, Some(sink.clone()), Some(abort))
                .await;

            let mut report = match &result {
                Ok(outcome) => outcome.to_json(),
                Err(err) => json!({ "status": "invalid", "error": err }),
            };
            if let Some(report) = report.as_object_mut() {
                let bindings: serde_json::Map<String, serde_json::Value> = context
                    .entries()
                    .into_iter()
                    .map(|(name, value)| (name, Snapshot::from(&value).to_json()))
                    .collect();
                report.insert("context".into(), serde_json::Value::Object(bindings));
                if trace {
                    report.insert("trace".into(), serde_json::to_value(sink.entries())?);
                }
            }
            println!("{}", serde_json::to_string_pretty(&report)?);

            match result {
                Ok(outcome) if outcome.is_completed() => {}
                _ => std::process::exit(1),
            }
        }

        Commands::Compile { file, json } => {
            let source = read_script(&file)?;
            let unit = compile(&source).with_context(|| format!("Failed to compile {}", file.display()))?;

            if json {
                let doc = json!({
                    "hash": unit.hash,
                    "statement_count": unit.statement_count,
                    "code": unit.code,
                    "source_map": unit.source_map,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
                return Ok(());
            }

            println!("{}", unit.code);
            println!();
            println!("Source map ({} mappings):", unit.source_map.len());
            for mapping in unit.source_map.mappings() {
                println!(
                    "  {}:{} -> {}:{}",
                    mapping.generated.line, mapping.generated.column, mapping.original.line, mapping.original.column
                );
            }
        }
    }

    Ok(())
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))
}

/// Context bindings from a JSON or TOML file, chosen by extension
pub fn load_context(path: &Path) -> Result<Context> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read context {}", path.display()))?;
    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text).with_context(|| format!("Invalid TOML in {}", path.display()))?,
        _ => serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?,
    };
    if !value.is_object() {
        anyhow::bail!("Context file {} must contain a table of bindings", path.display());
    }
    Ok(Context::from_json(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sandscript-{}-{}", uuid::Uuid::new_v4(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from([
            "sandscript",
            "run",
            "script.js",
            "--backend",
            "in-process",
            "--timeout-ms",
            "250",
            "--trace",
        ]);
        match cli.command {
            Commands::Run {
                file,
                backend,
                timeout_ms,
                trace,
                context,
            } => {
                assert_eq!(file, PathBuf::from("script.js"));
                assert_eq!(backend, Some(BackendKind::InProcess));
                assert_eq!(timeout_ms, Some(250));
                assert!(trace);
                assert!(context.is_none());
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["sandscript", "run", "a.js", "--backend", "v8"]).is_err());
    }

    #[test]
    fn test_load_json_context() {
        let path = write_temp("ctx.json", r#"{"user": {"name": "Ada"}, "count": 2}"#);
        let context = load_context(&path).unwrap();
        assert_eq!(context.get("count").and_then(|v| v.as_f64()), Some(2.0));
        assert_eq!(
            context.get("user").and_then(|v| v.to_json()),
            Some(json!({"name": "Ada"}))
        );
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_toml_context() {
        let path = write_temp("ctx.toml", "limit = 5\n\n[user]\nname = \"Ada\"\n");
        let context = load_context(&path).unwrap();
        assert_eq!(context.get("limit").and_then(|v| v.as_f64()), Some(5.0));
        assert_eq!(
            context.get("user").and_then(|v| v.to_json()),
            Some(json!({"name": "Ada"}))
        );
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_context_must_be_a_table() {
        let path = write_temp("ctx.json", "[1, 2]");
        assert!(load_context(&path).is_err());
        std::fs::remove_file(path).ok();
    }
}
