mod simulate;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskmesh_core::{init_tracing, AgentRole, ConfigManager, LoadBalancingStrategy, TaskMeshConfig};

use crate::simulate::SimulationPlan;

#[derive(Parser)]
#[command(name = "taskmesh")]
#[command(about = "TaskMesh CLI - role-aware task scheduling and load balancing", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to ./.taskmesh.toml, then ~/.taskmesh/config.toml)
    #[arg(short, long, global = true, env = "TASKMESH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated workload against the scheduler
    Simulate {
        /// Number of agents
        #[arg(short, long, default_value = "6")]
        agents: usize,

        /// Number of tasks to submit
        #[arg(short, long, default_value = "50")]
        tasks: usize,

        /// Placement strategy (overrides configuration)
        #[arg(short, long)]
        strategy: Option<LoadBalancingStrategy>,

        /// Worker pool size (overrides configuration)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Roles to spread agents and tasks over (comma-separated)
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_value = "developer,qa_engineer,devops_engineer"
        )]
        roles: Vec<AgentRole>,

        /// Concurrent task capacity per agent
        #[arg(long, default_value = "2")]
        capacity: usize,

        /// Shortest estimated task duration in seconds
        #[arg(long, default_value = "0.05")]
        min_duration: f64,

        /// Longest estimated task duration in seconds
        #[arg(long, default_value = "0.5")]
        max_duration: f64,

        /// Seed for workload generation and adaptive placement
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// List placement strategies
    Strategies,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Destination path
        #[arg(short, long, default_value = ".taskmesh.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct ConfigShowResult {
    source: String,
    config: TaskMeshConfig,
}

#[derive(Serialize)]
struct ConfigInitResult {
    path: String,
    status: String,
}

#[derive(Serialize)]
struct StrategyResult {
    name: String,
    configured: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match execute_command(&cli).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<ConfigManager> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    };
    manager.context("Failed to load configuration")
}

async fn execute_command(cli: &Cli) -> Result<serde_json::Value> {
    match &cli.command {
        // `config init` must work even when the existing file is broken.
        Commands::Config(ConfigCommands::Init { path, force }) => execute_config_init(path, *force),
        Commands::Config(ConfigCommands::Show) => {
            let manager = load_config(cli)?;
            execute_config_show(&manager)
        }
        Commands::Strategies => {
            let manager = load_config(cli)?;
            execute_strategies(manager.config())
        }
        Commands::Simulate {
            agents,
            tasks,
            strategy,
            workers,
            roles,
            capacity,
            min_duration,
            max_duration,
            seed,
            timeout,
        } => {
            let mut config = load_config(cli)?.into_config();
            if cli.verbose {
                config.logging.level = "debug".to_string();
            }
            init_tracing(&config.logging)?;

            if let Some(strategy) = strategy {
                config.scheduler.strategy = *strategy;
            }
            if let Some(workers) = workers {
                config.scheduler.max_workers = *workers;
            }
            config.scheduler.rng_seed.get_or_insert(*seed);

            if min_duration > max_duration {
                bail!("--min-duration must not exceed --max-duration");
            }
            let plan = SimulationPlan {
                agents: *agents,
                tasks: *tasks,
                roles: roles.clone(),
                capacity: *capacity,
                min_duration_secs: *min_duration,
                max_duration_secs: *max_duration,
                seed: *seed,
                timeout: Duration::from_secs(*timeout),
            };
            let report = simulate::run(config, &plan).await?;
            Ok(serde_json::to_value(report)?)
        }
    }
}

fn execute_config_show(manager: &ConfigManager) -> Result<serde_json::Value> {
    let result = ConfigShowResult {
        source: manager
            .config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string()),
        config: manager.config().clone(),
    };
    Ok(serde_json::to_value(result)?)
}

fn execute_config_init(path: &Path, force: bool) -> Result<serde_json::Value> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ConfigManager::create_default_config(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let result = ConfigInitResult {
        path: path.display().to_string(),
        status: "created".to_string(),
    };
    Ok(serde_json::to_value(result)?)
}

fn execute_strategies(config: &TaskMeshConfig) -> Result<serde_json::Value> {
    let strategies: Vec<StrategyResult> = LoadBalancingStrategy::ALL
        .iter()
        .map(|s| StrategyResult {
            name: s.as_str().to_string(),
            configured: *s == config.scheduler.strategy,
        })
        .collect();
    Ok(serde_json::to_value(strategies)?)
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            let mut out = String::new();
            render_pretty(value, 0, &mut out)?;
            print!("{}", out);
        }
    }
    Ok(())
}

fn render_pretty(value: &serde_json::Value, depth: usize, out: &mut String) -> Result<()> {
    use std::fmt::Write;

    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        writeln!(out, "{}{}: {}", indent, key_colored, s.green())?;
                    }
                    serde_json::Value::Number(n) => {
                        writeln!(out, "{}{}: {}", indent, key_colored, n.to_string().yellow())?;
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        writeln!(out, "{}{}: {}", indent, key_colored, val_colored)?;
                    }
                    serde_json::Value::Array(items) if items.iter().all(is_scalar) => {
                        let joined: Vec<String> = items.iter().map(scalar_text).collect();
                        writeln!(out, "{}{}: [{}]", indent, key_colored, joined.join(", ").green())?;
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        writeln!(out, "{}{}:", indent, key_colored)?;
                        render_pretty(val, depth + 1, out)?;
                    }
                    serde_json::Value::Null => {
                        writeln!(out, "{}{}: {}", indent, key_colored, "null".dimmed())?;
                    }
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                writeln!(out, "\n{}{}{}:", indent, "Item ".cyan(), (i + 1).to_string().yellow())?;
                render_pretty(item, depth, out)?;
            }
        }
        _ => {
            writeln!(out, "{}{}", indent, serde_json::to_string_pretty(value)?)?;
        }
    }
    Ok(())
}

fn is_scalar(value: &serde_json::Value) -> bool {
    !matches!(value, serde_json::Value::Array(_) | serde_json::Value::Object(_))
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("taskmesh.toml");

        let created = execute_config_init(&path, false).unwrap();
        assert_eq!(created["status"], "created");
        assert!(ConfigManager::from_path(&path).is_ok());

        assert!(execute_config_init(&path, false).is_err());
        assert!(execute_config_init(&path, true).is_ok());
    }

    #[test]
    fn strategies_mark_the_configured_one() {
        let config = TaskMeshConfig::default();
        let value = execute_strategies(&config).unwrap();
        let list = value.as_array().unwrap();
        assert_eq!(list.len(), LoadBalancingStrategy::ALL.len());
        let configured: Vec<_> = list
            .iter()
            .filter(|s| s["configured"] == true)
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(configured, vec!["adaptive"]);
    }

    #[test]
    fn pretty_output_lists_nested_arrays() {
        colored::control::set_override(false);
        let value = serde_json::json!({
            "by_agent": {
                "developer-0": { "capabilities": ["python", "rust"], "assigned": 3 }
            },
            "strategies": [{ "name": "round_robin" }],
            "seed": null
        });
        let mut out = String::new();
        render_pretty(&value, 0, &mut out).unwrap();

        assert!(out.contains("    capabilities: [python, rust]\n"), "{}", out);
        assert!(out.contains("    assigned: 3\n"), "{}", out);
        assert!(out.contains("strategies:\n"), "{}", out);
        assert!(out.contains("Item 1:\n  name: round_robin\n"), "{}", out);
        assert!(out.contains("seed: null\n"), "{}", out);
        assert!(!out.contains('"'), "{}", out);
    }

    #[test]
    fn cli_parses_simulation_flags() {
        let cli = Cli::try_parse_from([
            "taskmesh",
            "--output",
            "json",
            "simulate",
            "--agents",
            "3",
            "--strategy",
            "least-connections",
            "--roles",
            "developer,qa_engineer",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                agents,
                strategy,
                roles,
                ..
            } => {
                assert_eq!(agents, 3);
                assert_eq!(strategy, Some(LoadBalancingStrategy::LeastConnections));
                assert_eq!(roles, vec![AgentRole::Developer, AgentRole::QaEngineer]);
            }
            _ => panic!("expected simulate"),
        }
    }
}
