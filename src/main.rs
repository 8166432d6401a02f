//! Train one binary classifier per ASL sign and write a run report.

use std::path::PathBuf;

use asl_classifier::alphabet::parse_label_list;
use asl_classifier::config::AppConfig;
use asl_classifier::dataset::WorkDir;
use asl_classifier::logging;
use asl_classifier::ml::backend::{BackendKind, backend_kind, dispatch};
use asl_classifier::pipeline::{BatchOptions, BatchTask, LabelOutcome, LabelProgress, LabelState};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    dataset: Option<PathBuf>,
    models: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    labels: Option<String>,
    backend: Option<BackendKind>,
    epochs: Option<usize>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("asl-classifier") {
        eprintln!("Logging disabled: {err}");
    }
    let mut config = AppConfig::resolve(options.config.as_deref()).map_err(|err| err.to_string())?;
    if let Some(dataset) = options.dataset {
        config.dataset_root = dataset;
    }
    if let Some(models) = options.models {
        config.models_dir = models;
    }
    if let Some(work_dir) = options.work_dir {
        config.work_dir = Some(work_dir);
    }
    if let Some(epochs) = options.epochs {
        config.training.epochs = epochs;
    }
    let labels = match &options.labels {
        Some(list) => parse_label_list(list).map_err(|err| err.to_string())?,
        None => config.label_set().map_err(|err| err.to_string())?,
    };
    config.validate().map_err(|err| err.to_string())?;
    if !config.dataset_root.is_dir() {
        return Err(format!(
            "Dataset root {} does not exist; run asl-download first",
            config.dataset_root.display()
        ));
    }

    let mut work = match &config.work_dir {
        Some(path) => WorkDir::at(path.clone()),
        None => WorkDir::temporary().map_err(|err| format!("Failed to create work dir: {err}"))?,
    };
    let batch = BatchOptions {
        dataset_root: config.dataset_root.clone(),
        models_dir: config.models_dir.clone(),
        labels,
    };
    let mut progress = |update: LabelProgress| print_progress(update);
    let task = BatchTask {
        options: &batch,
        train: config.train_options(),
        work: &mut work,
        progress: &mut progress,
    };
    let kind = backend_kind(options.backend.unwrap_or(config.backend));
    let report = dispatch(kind, task);

    let report_path = report.write().map_err(|err| err.to_string())?;
    for outcome in &report.outcomes {
        if let LabelOutcome::Failed { label, stage, reason } = outcome {
            println!("  {label}: failed while {stage:?}: {reason}");
        }
    }
    let trained = report.trained().count();
    println!(
        "Trained {trained}/{} labels. Report: {}",
        report.outcomes.len(),
        report_path.display()
    );
    Ok(())
}

fn print_progress(update: LabelProgress) {
    let state = match update.state {
        LabelState::Pending => return,
        LabelState::Materializing => "materializing",
        LabelState::Training => "training",
        LabelState::Persisted => "done",
        LabelState::Failed(_) => "failed",
    };
    println!("[{}/{}] {}: {state}", update.index + 1, update.total, update.label);
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let mut value = || {
            idx += 1;
            args.get(idx)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--dataset" => options.dataset = Some(PathBuf::from(value()?)),
            "--models" => options.models = Some(PathBuf::from(value()?)),
            "--work-dir" => options.work_dir = Some(PathBuf::from(value()?)),
            "--labels" => options.labels = Some(value()?),
            "--backend" => {
                let raw = value()?;
                options.backend = Some(raw.parse()?);
            }
            "--epochs" => {
                let raw = value()?;
                options.epochs = Some(
                    raw.parse::<usize>()
                        .map_err(|_| format!("Invalid --epochs value: {raw}"))?,
                );
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "asl-classifier",
        "",
        "Usage:",
        "  asl-classifier [options]",
        "",
        "Options:",
        "  --config <file>     Config file (default: asl_classifier.toml in the app dir).",
        "  --dataset <dir>     Dataset root with one folder per label.",
        "  --models <dir>      Output directory for models and the run report.",
        "  --work-dir <dir>    Scratch directory for partitions (default: temporary).",
        "  --labels <list>     Labels to train, e.g. abc019 (default: all 36).",
        "  --backend <name>    cpu or wgpu; ASL_BACKEND overrides.",
        "  --epochs <n>        Maximum epochs per label.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_overrides() {
        let options = parse_args(args(&[
            "--dataset", "data", "--labels", "ab", "--backend", "cpu", "--epochs", "4",
        ]))
        .unwrap();
        assert_eq!(options.dataset, Some(PathBuf::from("data")));
        assert_eq!(options.labels.as_deref(), Some("ab"));
        assert_eq!(options.backend, Some(BackendKind::Cpu));
        assert_eq!(options.epochs, Some(4));
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        assert!(parse_args(args(&["--models"])).unwrap_err().contains("requires a value"));
        assert!(parse_args(args(&["--nope"])).unwrap_err().starts_with("Unknown argument"));
        assert!(parse_args(args(&["--epochs", "x"])).is_err());
    }
}
