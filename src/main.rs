use clap::{Arg, Command};
use fillscan::classifier::Classifier;
use fillscan::features::{FeatureExtractor, ImageMetadata};
use fillscan::image::PixelBuffer;
use fillscan::profile::ThresholdProfile;
use fillscan::rules::RulesEngine;
use log::LevelFilter;
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() {
    let matches = Command::new("fillscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Rule-based bin fill-level classifier")
        .long_about(
            "Classifies container images as full or empty from low-level visual\n\
             statistics: a fixed feature vector scored against a bank of weighted\n\
             rules, with a calibrated confidence estimate. No learned weights;\n\
             every threshold is inspectable and tunable.",
        )
        .arg(
            Arg::new("image")
                .short('i')
                .long("image")
                .value_name("FILE")
                .help("Image file to classify (decoded to RGB)"),
        )
        .arg(
            Arg::new("metadata")
                .short('m')
                .long("metadata")
                .value_name("FILE")
                .help("JSON metadata record to classify when pixels are unavailable"),
        )
        .arg(
            Arg::new("thresholds")
                .short('t')
                .long("thresholds")
                .value_name("FILE")
                .help("Threshold profile to load (YAML)"),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("NAME=VALUE")
                .action(clap::ArgAction::Append)
                .help("Override a single threshold (repeatable; unknown names are skipped)"),
        )
        .arg(
            Arg::new("generate-thresholds")
                .long("generate-thresholds")
                .value_name("FILE")
                .help("Write the built-in default threshold profile and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("reset-thresholds")
                .long("reset-thresholds")
                .help("Discard any loaded profile and restore the built-in defaults")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("show-thresholds")
                .long("show-thresholds")
                .help("Print the effective threshold profile")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("show-rules")
                .long("show-rules")
                .help("Print the per-rule breakdown for the classified input")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("high-precision")
                .long("high-precision")
                .help("Use the stricter high-precision calibration")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Emit the full classification result as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-rule traces")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-thresholds") {
        let profile = ThresholdProfile::default();
        if let Err(e) = profile.to_file(Path::new(path)) {
            eprintln!("Error writing threshold profile: {e}");
            process::exit(1);
        }
        println!("Default threshold profile written to {path}");
        return;
    }

    let profile = match matches.get_one::<String>("thresholds") {
        Some(path) => match ThresholdProfile::from_file(Path::new(path)) {
            Ok(profile) => profile,
            Err(e) => {
                eprintln!("Error loading threshold profile: {e}");
                process::exit(1);
            }
        },
        None => ThresholdProfile::default(),
    };
    let engine = Arc::new(RulesEngine::with_profile(profile));
    if matches.get_flag("reset-thresholds") {
        engine.reset_thresholds();
    }

    let overrides: Vec<(String, f64)> = matches
        .get_many::<String>("set")
        .unwrap_or_default()
        .map(|pair| parse_override(pair))
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            process::exit(1);
        });
    if !overrides.is_empty() {
        let outcome = engine.set_thresholds(&overrides);
        for name in &outcome.rejected {
            eprintln!("Warning: unknown threshold '{name}' skipped");
        }
    }

    if matches.get_flag("show-thresholds") {
        match serde_yaml::to_string(&engine.thresholds()) {
            Ok(yaml) => print!("{yaml}"),
            Err(e) => {
                eprintln!("Error serializing thresholds: {e}");
                process::exit(1);
            }
        }
        if matches.get_one::<String>("image").is_none()
            && matches.get_one::<String>("metadata").is_none()
        {
            return;
        }
    }

    let features = match (
        matches.get_one::<String>("image"),
        matches.get_one::<String>("metadata"),
    ) {
        (Some(path), _) => match PixelBuffer::from_file(Path::new(path)) {
            Ok(buf) => FeatureExtractor::from_pixels(&buf),
            Err(e) => {
                eprintln!("Error reading image: {e}");
                process::exit(1);
            }
        },
        (None, Some(path)) => {
            let meta: ImageMetadata = match std::fs::read_to_string(path)
                .map_err(anyhow::Error::from)
                .and_then(|content| serde_json::from_str(&content).map_err(Into::into))
            {
                Ok(meta) => meta,
                Err(e) => {
                    eprintln!("Error reading metadata record: {e}");
                    process::exit(1);
                }
            };
            FeatureExtractor::from_metadata(&meta)
        }
        (None, None) => {
            eprintln!("Error: provide --image or --metadata (see --help)");
            process::exit(1);
        }
    };

    let mut classifier = Classifier::new(Arc::clone(&engine));
    classifier.set_high_precision(matches.get_flag("high-precision"));
    let result = classifier.classify(&features);

    if matches.get_flag("show-rules") {
        println!("Rule breakdown:");
        for detail in engine.rule_details(&features) {
            let marker = if detail.fired { "*" } else { " " };
            println!(
                "  {marker} {:32} weight {:+.1}  score {:+.1}",
                detail.name, detail.weight, detail.score
            );
        }
        println!();
    }

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing result: {e}");
                process::exit(1);
            }
        }
    } else {
        println!(
            "{:?}  (confidence {:.3}, score {:+.3}, {}+/{}- rules)",
            result.label,
            result.confidence,
            result.score,
            result.positive_rules_count,
            result.negative_rules_count
        );
        if !result.evaluation.active_rules.is_empty() {
            println!("Active rules: {}", result.evaluation.active_rules.join(", "));
        }
    }
}

fn parse_override(pair: &str) -> anyhow::Result<(String, f64)> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{pair}'"))?;
    let value: f64 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid numeric value in '{pair}'"))?;
    Ok((name.to_string(), value))
}
