//! Score an image with one or every trained sign model.

use std::path::PathBuf;

use asl_classifier::alphabet::Label;
use asl_classifier::config::AppConfig;
use asl_classifier::logging;
use asl_classifier::ml::backend::{BackendKind, BackendTask, backend_kind, dispatch};
use asl_classifier::ml::infer::{ClassifierSet, SignClassifier, load_query_image};
use burn::tensor::backend::AutodiffBackend;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct CliOptions {
    config: Option<PathBuf>,
    models: Option<PathBuf>,
    image: PathBuf,
    label: Option<Label>,
    backend: Option<BackendKind>,
    top: usize,
}

struct PredictTask {
    models_dir: PathBuf,
    image: PathBuf,
    label: Option<Label>,
}

impl BackendTask for PredictTask {
    type Output = Result<Vec<(Label, f32)>, String>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output {
        if let Some(label) = self.label {
            let classifier = SignClassifier::<B::InnerBackend>::load(&self.models_dir, label, &device)
                .map_err(|err| err.to_string())?;
            let size = classifier.metadata().image_size() as u32;
            let raster = load_query_image(&self.image, size).map_err(|err| err.to_string())?;
            return Ok(vec![(label, classifier.predict(&raster))]);
        }
        let set = ClassifierSet::<B::InnerBackend>::load_all(&self.models_dir, &device)
            .map_err(|err| err.to_string())?;
        let raster =
            load_query_image(&self.image, set.image_size() as u32).map_err(|err| err.to_string())?;
        Ok(set.rank(&raster))
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("asl-predict") {
        eprintln!("Logging disabled: {err}");
    }
    let config = AppConfig::resolve(options.config.as_deref()).map_err(|err| err.to_string())?;
    let task = PredictTask {
        models_dir: options.models.unwrap_or(config.models_dir.clone()),
        image: options.image,
        label: options.label,
    };
    let kind = backend_kind(options.backend.unwrap_or(config.backend));
    let scores = dispatch(kind, task)?;
    for (label, probability) in scores.iter().take(options.top) {
        println!("{label}: {probability:.4}");
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut config = None;
    let mut models = None;
    let mut image = None;
    let mut label = None;
    let mut backend = None;
    let mut top = 5usize;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--models" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--models requires a value".to_string())?;
                models = Some(PathBuf::from(value));
            }
            "--image" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--image requires a value".to_string())?;
                image = Some(PathBuf::from(value));
            }
            "--label" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--label requires a value".to_string())?;
                label = Some(value.parse::<Label>().map_err(|err| err.to_string())?);
            }
            "--backend" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--backend requires a value".to_string())?;
                backend = Some(value.parse::<BackendKind>()?);
            }
            "--top" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--top requires a value".to_string())?;
                top = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --top value: {value}"))?;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let image = image.ok_or_else(|| "--image is required".to_string())?;
    Ok(CliOptions {
        config,
        models,
        image,
        label,
        backend,
        top,
    })
}

fn help_text() -> String {
    [
        "asl-predict",
        "",
        "Usage:",
        "  asl-predict --image <file> [options]",
        "",
        "Options:",
        "  --config <file>   Config file (default: asl_classifier.toml in the app dir).",
        "  --models <dir>    Directory of trained models.",
        "  --label <sign>    Score with this sign's model only.",
        "  --backend <name>  cpu or wgpu; ASL_BACKEND overrides.",
        "  --top <n>         Number of ranked signs to print (default: 5).",
    ]
    .join("\n")
}
