use anyhow::{Context, Result};
use std::path::PathBuf;

use facefinder::config::{Config, LogTarget};
use facefinder::export::{self, DetectionReport};
use facefinder::faces::{CropMode, FaceFinder};
use facefinder::logging;

/// Command line settings layered over the config file
#[derive(Debug, Default)]
struct Args {
    image: Option<PathBuf>,
    config_path: Option<PathBuf>,
    model: Option<PathBuf>,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
    min_size: Option<u32>,
    max_size: Option<u32>,
    shift_factor: Option<f32>,
    scale_factor: Option<f32>,
    iou_threshold: Option<f32>,
    min_confidence: Option<f32>,
    symmetric: bool,
    sequential: bool,
    log_file: bool,
}

const DEFAULT_IMAGE: &str = "./_test.jpg";

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Error: invalid value for {}: {}", flag, raw);
            std::process::exit(1);
        }
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("facefinder {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                parsed.config_path = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--model" | "-m" => {
                parsed.model = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--output" | "-o" => {
                parsed.output = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--report" | "-r" => {
                parsed.report = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--min-size" => {
                parsed.min_size = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--max-size" => {
                parsed.max_size = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--shift" => {
                parsed.shift_factor = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--scale" => {
                parsed.scale_factor = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--iou" => {
                parsed.iou_threshold = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--threshold" | "-t" => {
                parsed.min_confidence = Some(parse_value(&args, i, flag));
                i += 1;
            }
            "--symmetric" => parsed.symmetric = true,
            "--sequential" => parsed.sequential = true,
            "--log-file" => parsed.log_file = true,
            _ if flag.starts_with('-') => {
                eprintln!("Unknown argument: {}", flag);
                print_help();
                std::process::exit(1);
            }
            _ => {
                if parsed.image.is_some() {
                    eprintln!("Error: only one image may be given");
                    std::process::exit(1);
                }
                parsed.image = Some(PathBuf::from(flag));
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"facefinder - detect faces in an image and save each one as a JPEG

USAGE:
    facefinder [OPTIONS] [IMAGE]

IMAGE defaults to ./_test.jpg. Faces are written as 0.jpg, 1.jpg, ...

OPTIONS:
    --model, -m PATH      Cascade model file (default: ./facefinder.model)
    --output, -o DIR      Directory for face crops (default: .)
    --config, -c PATH     Path to config file
    --report, -r PATH     Write a detection report (.json or .csv)
    --min-size N          Smallest window edge in pixels (default: 100)
    --max-size N          Largest window edge in pixels (default: 600)
    --shift F             Window step as a fraction of its size (default: 0.15)
    --scale F             Window growth between scales (default: 1.1)
    --iou F               Overlap needed to merge detections (default: 0)
    --threshold, -t F     Minimum clustered score to keep a face (default: 5)
    --symmetric           Crop a square around each face
    --sequential          Scan on a single thread
    --log-file            Log to a rolling file instead of stderr
    --version, -V         Show version
    --help, -h            Show this help message

ENVIRONMENT:
    FACEFINDER_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/facefinder/config.toml"#
    );
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(path) = &args.model {
        config.model_path = path.clone();
    }
    if let Some(dir) = &args.output {
        config.output.directory = dir.clone();
    }

    let detection = &mut config.detection;
    if let Some(v) = args.min_size {
        detection.min_size = v;
    }
    if let Some(v) = args.max_size {
        detection.max_size = v;
    }
    if let Some(v) = args.shift_factor {
        detection.shift_factor = v;
    }
    if let Some(v) = args.scale_factor {
        detection.scale_factor = v;
    }
    if let Some(v) = args.iou_threshold {
        detection.iou_threshold = v;
    }
    if let Some(v) = args.min_confidence {
        detection.min_confidence = v;
    }
    if args.symmetric {
        detection.crop_mode = CropMode::Symmetric;
    }
    if args.sequential {
        detection.parallel = false;
    }

    if args.log_file {
        config.logging.target = LogTarget::File;
    }
}

fn main() -> Result<()> {
    let args = parse_args();

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    apply_overrides(&mut config, &args);

    logging::init(&config.logging)?;

    let finder = FaceFinder::from_model_file(&config.model_path, config.detection.clone())?;

    let image_path = args.image.unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE));
    let processed = finder.process_image(&image_path, &config.output)?;

    if let Some(report_path) = &args.report {
        export::export_report(&DetectionReport::new(&processed), report_path)
            .with_context(|| format!("Failed to write report {:?}", report_path))?;
    }

    tracing::info!(
        faces = processed.faces.len(),
        "Done in {:?}",
        processed.elapsed
    );

    Ok(())
}
