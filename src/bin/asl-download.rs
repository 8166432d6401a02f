//! Download and extract the ASL dataset from the dataset host.

use std::path::PathBuf;

use asl_classifier::acquire::credentials::{KaggleCredentials, remember_in_keyring};
use asl_classifier::acquire::{CredentialResolver, CredentialSource, fetch_dataset};
use asl_classifier::config::AppConfig;
use asl_classifier::logging;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    credentials: Option<PathBuf>,
    dataset: Option<String>,
    output: Option<PathBuf>,
    sha256: Option<String>,
    cleanup: bool,
    remember: bool,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("asl-download") {
        eprintln!("Logging disabled: {err}");
    }
    let config = AppConfig::resolve(options.config.as_deref()).map_err(|err| err.to_string())?;
    let mut download = config.download.clone();
    if let Some(dataset) = options.dataset {
        download.dataset = dataset;
    }
    if let Some(output) = options.output {
        download.output_dir = output;
    }
    if options.sha256.is_some() {
        download.sha256 = options.sha256;
    }
    download.cleanup |= options.cleanup;

    let resolver = CredentialResolver::from_env().with_explicit_file(options.credentials);
    let (credentials, source): (KaggleCredentials, CredentialSource) =
        resolver.resolve().map_err(|err| err.to_string())?;
    println!("Using Kaggle credentials for '{}' ({source:?})", credentials.username);
    if options.remember && source != CredentialSource::Keyring {
        match remember_in_keyring(&credentials) {
            Ok(()) => println!("Saved credentials to the OS keyring"),
            Err(err) => eprintln!("Could not save credentials: {err}"),
        }
    }

    let result = fetch_dataset(&download, &credentials).map_err(|err| err.to_string())?;
    println!(
        "Extracted {} files ({} bytes, sha256 {})",
        result.extracted_files, result.archive_bytes, result.archive_sha256
    );
    println!("Dataset root: {}", result.dataset_root.display());
    for (class, count) in &result.census.classes {
        println!("  {class}: {count}");
    }
    let missing = result.census.missing_labels();
    if !missing.is_empty() {
        let names: String = missing.iter().map(|label| label.as_char()).collect();
        println!("Missing labels: {names}");
    }
    Ok(())
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
            "--credentials" => options.credentials = Some(PathBuf::from(value()?)),
            "--dataset" => options.dataset = Some(value()?),
            "--output" => options.output = Some(PathBuf::from(value()?)),
            "--sha256" => options.sha256 = Some(value()?),
            "--cleanup" => options.cleanup = true,
            "--remember" => options.remember = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "asl-download",
        "",
        "Usage:",
        "  asl-download [options]",
        "",
        "Options:",
        "  --config <file>        Config file (default: asl_classifier.toml in the app dir).",
        "  --credentials <file>   kaggle.json to use and install into ~/.kaggle.",
        "  --dataset <owner/name> Dataset to fetch (default: ayuraj/asl-dataset).",
        "  --output <dir>         Extraction directory (default: asl_dataset).",
        "  --sha256 <hex>         Expected archive digest.",
        "  --cleanup              Remove the output directory before extracting.",
        "  --remember             Store the resolved credentials in the OS keyring.",
        "",
        "Credentials are read from --credentials, KAGGLE_USERNAME/KAGGLE_KEY,",
        "$KAGGLE_CONFIG_DIR/kaggle.json or ~/.kaggle/kaggle.json, then the OS keyring.",
    ]
    .join("\n")
}
