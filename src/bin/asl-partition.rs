//! Developer utility to materialize one label's binary partition and print
//! its class counts, split sizes and fingerprint.

use std::path::PathBuf;

use asl_classifier::alphabet::Label;
use asl_classifier::config::AppConfig;
use asl_classifier::dataset::split::{BinaryClass, LabeledFile, split_by_class};
use asl_classifier::dataset::{WorkDir, materialize};
use asl_classifier::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct CliOptions {
    config: Option<PathBuf>,
    dataset: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    label: Label,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("asl-partition") {
        eprintln!("Logging disabled: {err}");
    }
    let config = AppConfig::resolve(options.config.as_deref()).map_err(|err| err.to_string())?;
    let dataset_root = options.dataset.unwrap_or(config.dataset_root.clone());
    let mut work = match options.work_dir.or(config.work_dir.clone()) {
        Some(path) => WorkDir::at(path),
        None => WorkDir::temporary().map_err(|err| format!("Failed to create work dir: {err}"))?,
    };

    let partition =
        materialize(&dataset_root, options.label, &mut work).map_err(|err| err.to_string())?;
    let split = split_by_class(
        &partition.positive,
        &partition.negative,
        config.training.validation_split,
    );
    let count = |files: &[LabeledFile], class: BinaryClass| {
        files.iter().filter(|file| file.class == class).count()
    };
    println!("label: {}", partition.label);
    println!("work dir: {}", work.root().display());
    println!("positive: {}", partition.positive.len());
    println!("negative: {}", partition.negative.len());
    println!(
        "train: {} positive / {} negative",
        count(&split.train, BinaryClass::Positive),
        count(&split.train, BinaryClass::Negative)
    );
    println!(
        "validation: {} positive / {} negative",
        count(&split.validation, BinaryClass::Positive),
        count(&split.validation, BinaryClass::Negative)
    );
    println!("fingerprint: {}", partition.fingerprint);
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut config = None;
    let mut dataset = None;
    let mut work_dir = None;
    let mut label: Option<Label> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--dataset" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--dataset requires a value".to_string())?;
                dataset = Some(PathBuf::from(value));
            }
            "--work-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--work-dir requires a value".to_string())?;
                work_dir = Some(PathBuf::from(value));
            }
            "--label" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--label requires a value".to_string())?;
                label = Some(value.parse::<Label>().map_err(|err| err.to_string())?);
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let label = label.ok_or_else(|| "--label is required".to_string())?;
    Ok(CliOptions {
        config,
        dataset,
        work_dir,
        label,
    })
}

fn help_text() -> String {
    [
        "asl-partition",
        "",
        "Usage:",
        "  asl-partition --label <sign> [options]",
        "",
        "Options:",
        "  --config <file>    Config file (default: asl_classifier.toml in the app dir).",
        "  --dataset <dir>    Dataset root with one folder per label.",
        "  --work-dir <dir>   Keep the partition here (default: temporary, removed on exit).",
    ]
    .join("\n")
}
