use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use taskrank_core::{
    ForestModel, PrioritizedTask, Prioritizer, ScorerHandle, Summary, TaskId,
    check_feature_order, extract_features, load_feature_names, parse_dependency_list,
    validate_features,
};

mod config;
mod state;
mod telemetry;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "taskrank",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TASKRANK_BUILD_SHA"), ")"),
    about = "Rank tasks by readiness and predicted priority"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank the tasks in a JSON file
    Prioritize {
        /// JSON array of task records
        #[arg(long)]
        tasks: PathBuf,

        /// Completed task ids, comma-separated (default: none)
        #[arg(long, default_value = "")]
        completed: String,

        /// Reference time, `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` (default: now)
        #[arg(long)]
        now: Option<String>,

        /// Print the annotated tasks as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        artifact: ArtifactArgs,
    },

    /// Show the feature vector extracted for each task
    Features {
        #[arg(long)]
        tasks: PathBuf,

        #[arg(long)]
        now: Option<String>,
    },

    /// Scoring artifact commands
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ModelCommand {
    /// Load the artifact and compare its feature ordering with the extractor's
    Check {
        #[command(flatten)]
        artifact: ArtifactArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config.toml
    Init,
    /// Print the effective configuration
    Show,
}

/// Overrides for the artifact paths in config.toml.
#[derive(Args, Debug, Default)]
struct ArtifactArgs {
    /// Model file (JSON decision forest)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Feature ordering file (JSON array of names)
    #[arg(long)]
    features: Option<PathBuf>,
}

impl ArtifactArgs {
    fn resolve(&self, cfg: &Config, home: &Path) -> (PathBuf, PathBuf) {
        (
            self.model.clone().unwrap_or_else(|| cfg.artifact_path(home)),
            self.features.clone().unwrap_or_else(|| cfg.features_path(home)),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let home = state::taskrank_home()?;
    let cfg = config::load_config(&home)?;
    telemetry::init_tracing(&cfg.log.filter);

    match cli.command {
        Command::Prioritize {
            tasks,
            completed,
            now,
            json,
            artifact,
        } => {
            let (model_path, features_path) = artifact.resolve(&cfg, &home);
            // Load once up front; a bad artifact disables the whole run.
            let prioritizer = Prioritizer::new(ScorerHandle::load(&model_path, &features_path));

            let task_list = state::read_tasks(&tasks)?;
            let completed: HashSet<TaskId> = parse_dependency_list(&completed)
                .context("parsing --completed")?
                .into_iter()
                .collect();
            let ranked = match now.as_deref() {
                Some(raw) => {
                    prioritizer.prioritize(&task_list, &completed, reference_time(Some(raw))?)
                }
                None => prioritizer.prioritize_now(&task_list, &completed),
            }
            .with_context(|| format!("model artifact: {}", model_path.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                print_ranking(&ranked);
            }
        }

        Command::Features { tasks, now } => {
            let task_list = state::read_tasks(&tasks)?;
            let now = reference_time(now.as_deref())?;

            println!("{:<8} {:<6} features", "id", "valid");
            for task in &task_list {
                let values = extract_features(task, now);
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                println!(
                    "{:<8} {:<6} [{}]",
                    task.label(),
                    validate_features(&values),
                    rendered.join(", ")
                );
            }
        }

        Command::Model { command } => match command {
            ModelCommand::Check { artifact } => {
                let (model_path, features_path) = artifact.resolve(&cfg, &home);
                check_model(&model_path, &features_path)?;
            }
        },

        Command::Config { command } => match command {
            ConfigCommand::Init => {
                let home = state::ensure_taskrank_home()?;
                config::init_config(&home)?;
            }
            ConfigCommand::Show => {
                println!("# {}", config::config_path(&home).display());
                println!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
                println!("# artifact: {}", cfg.artifact_path(&home).display());
                println!("# features: {}", cfg.features_path(&home).display());
            }
        },
    }

    Ok(())
}

/// `--now` as a date (midnight) or a full local timestamp; wall clock when absent.
fn reference_time(raw: Option<&str>) -> Result<NaiveDateTime> {
    let Some(raw) = raw else {
        return Ok(Local::now().naive_local());
    };
    let raw = raw.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::MIN));
    }
    bail!("invalid --now '{raw}' (expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)")
}

fn print_ranking(ranked: &[PrioritizedTask]) {
    println!(
        "{:<5} {:<8} {:<8} {:>7}  {}",
        "rank", "id", "status", "score", "name"
    );
    for (i, r) in ranked.iter().enumerate() {
        println!(
            "{:<5} {:<8} {:<8} {:>7.2}  {}",
            i + 1,
            r.task.label(),
            r.status,
            r.score,
            r.task.name
        );
        if let Some(err) = &r.error {
            println!("      ! {err}");
        }
    }
    println!("\n{}", Summary::of(ranked));
}

fn check_model(model_path: &Path, features_path: &Path) -> Result<()> {
    let model = ForestModel::load(model_path)
        .with_context(|| format!("loading {}", model_path.display()))?;
    println!(
        "Model: {} ({} trees, classes {:?})",
        model_path.display(),
        model.tree_count(),
        model.classes()
    );

    let names = load_feature_names(features_path)
        .with_context(|| format!("loading {}", features_path.display()))?;
    println!("Features: {} [{}]", features_path.display(), names.join(", "));

    match check_feature_order(&names) {
        Ok(()) => println!("Feature ordering matches the extractor."),
        Err(mismatch) => println!("Feature ordering differs (not enforced): {mismatch}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn reference_time_accepts_date_or_timestamp() {
        let d = reference_time(Some("2026-03-01")).unwrap();
        assert_eq!(d.date(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(d.hour(), 0);

        let t = reference_time(Some("2026-03-01T14:30:00")).unwrap();
        assert_eq!(t.hour(), 14);
        assert_eq!(t.minute(), 30);

        assert!(reference_time(Some("yesterday")).is_err());
    }

    #[test]
    fn artifact_flags_override_config() {
        let home = Path::new("/tmp/taskrank-home");
        let cfg = Config::default();

        let args = ArtifactArgs {
            model: Some(PathBuf::from("/models/m.json")),
            features: None,
        };
        let (model, features) = args.resolve(&cfg, home);
        assert_eq!(model, PathBuf::from("/models/m.json"));
        assert_eq!(features, home.join(config::DEFAULT_FEATURES_FILE));
    }

    #[test]
    fn cli_parses_prioritize() {
        let cli = Cli::try_parse_from([
            "taskrank",
            "prioritize",
            "--tasks",
            "tasks.json",
            "--completed",
            "1,2",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Prioritize {
                completed, json, ..
            } => {
                assert_eq!(completed, "1,2");
                assert!(json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
