use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facelens_core::{
    codec, orientation, BoxRenderer, FaceBox, FaceDetector, FaceRecognizer, FaceRecord,
    FeatureVector,
};
use image::DynamicImage;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod matching;

use config::Config;

#[derive(Parser)]
#[command(name = "facelens", about = "Face detection, recognition and annotation")]
struct Cli {
    /// Directory containing the ONNX models (overrides FACELENS_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Font for box labels instead of the bundled one (overrides FACELENS_FONT_PATH)
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and print their records as JSON
    Detect {
        /// Image file, or `-` for stdin
        image: PathBuf,
    },
    /// Detect faces and print a feature vector per face as JSON
    Embed {
        /// Image file, or `-` for stdin
        image: PathBuf,
    },
    /// Write the image rotated into canonical orientation
    Orient {
        /// Image file, or `-` for stdin
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Draw boxes from a JSON file onto an image
    Render {
        /// Image file, or `-` for stdin
        image: PathBuf,
        /// JSON array of {x, y, width, height, label, score}
        #[arg(short, long)]
        boxes: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Append the score to each label
        #[arg(long)]
        debug: bool,
    },
    /// Label every face of a test image as a match for a reference face or not
    Match {
        /// Image of the reference face; its first detected face is used
        #[arg(long)]
        face: PathBuf,
        /// Image to search
        #[arg(long)]
        test: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Similarity threshold (overrides FACELENS_MATCH_THRESHOLD)
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Serialize)]
struct EmbeddedFace {
    face: FaceRecord,
    feature: FeatureVector,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(font) = cli.font {
        config.font_path = Some(font);
    }

    match cli.command {
        Commands::Detect { image } => {
            let mut detector = load_detector(&config)?;
            let faces = if is_stdin(&image) {
                detector.detect_bytes(&read_stdin()?).context("detecting faces in stdin")?
            } else {
                detector
                    .detect_path(&image)
                    .with_context(|| format!("detecting faces in {}", image.display()))?
            };
            tracing::info!(faces = faces.len(), "detect complete");
            println!("{}", serde_json::to_string_pretty(&faces)?);
        }
        Commands::Embed { image } => {
            let mut detector = load_detector(&config)?;
            let mut recognizer = load_recognizer(&config)?;
            let canonical = load_canonical(&image)?;

            let mut embedded = Vec::new();
            for face in detector.detect(&canonical)? {
                let feature = recognizer.extract_feature(&canonical, &face)?;
                embedded.push(EmbeddedFace { face, feature });
            }
            println!("{}", serde_json::to_string_pretty(&embedded)?);
        }
        Commands::Orient { image, output } => {
            let format = codec::format_for_path(&output)?;
            let canonical = load_canonical(&image)?;
            write_output(&output, &codec::encode(&canonical, format)?)?;
        }
        Commands::Render {
            image,
            boxes,
            output,
            debug,
        } => {
            let json = std::fs::read_to_string(&boxes)
                .with_context(|| format!("reading {}", boxes.display()))?;
            let boxes: Vec<FaceBox> = serde_json::from_str(&json).context("parsing boxes")?;
            let renderer = load_renderer(&config)?;
            let format = codec::format_for_path(&output)?;
            let same_format = !is_stdin(&image) && codec::format_for_path(&image).ok() == Some(format);
            let encoded = if same_format {
                renderer.render_file(&image, &boxes, debug)?
            } else {
                let mut canonical = load_canonical(&image)?;
                renderer.render(&mut canonical, &boxes, debug);
                codec::encode(&canonical, format)?
            };
            write_output(&output, &encoded)?;
        }
        Commands::Match {
            face,
            test,
            output,
            threshold,
            debug,
        } => {
            let threshold = threshold.unwrap_or(config.match_threshold);
            let format = codec::format_for_path(&output)?;
            let mut detector = load_detector(&config)?;
            let mut recognizer = load_recognizer(&config)?;
            let renderer = load_renderer(&config)?;

            let reference_image = load_canonical(&face)?;
            let reference_face = detector
                .detect(&reference_image)?
                .into_iter()
                .next()
                .with_context(|| format!("no face found in {}", face.display()))?;
            let reference = recognizer.extract_feature(&reference_image, &reference_face)?;
            drop(reference_image);

            let mut test_image = load_canonical(&test)?;
            let mut faces = Vec::new();
            for record in detector.detect(&test_image)? {
                let feature = recognizer.extract_feature(&test_image, &record)?;
                faces.push((record, feature));
            }

            let boxes = matching::label_faces(&reference, &faces, threshold);
            let matches = boxes.iter().filter(|b| b.label == matching::MATCH_LABEL).count();
            tracing::info!(faces = boxes.len(), matches, threshold, "match complete");

            renderer.render(&mut test_image, &boxes, debug);
            write_output(&output, &codec::encode(&test_image, format)?)?;
            println!("{}", serde_json::to_string_pretty(&boxes)?);
        }
    }

    Ok(())
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    std::io::stdin().read_to_end(&mut bytes).context("reading stdin")?;
    Ok(bytes)
}

/// Decode `path` (or stdin for `-`) in canonical orientation.
fn load_canonical(path: &Path) -> Result<DynamicImage> {
    if is_stdin(path) {
        return orientation::correct_orientation_bytes(&read_stdin()?).context("decoding stdin");
    }
    orientation::correct_orientation(path).with_context(|| format!("loading {}", path.display()))
}

fn load_detector(config: &Config) -> Result<FaceDetector> {
    let path = config.detector_model_path();
    let detector = FaceDetector::load(&path)
        .with_context(|| format!("loading detector {}", path.display()))?;
    Ok(match &config.scratch_dir {
        Some(dir) => detector.with_scratch_dir(dir),
        None => detector,
    })
}

fn load_recognizer(config: &Config) -> Result<FaceRecognizer> {
    let path = config.recognizer_model_path();
    FaceRecognizer::load(&path).with_context(|| format!("loading recognizer {}", path.display()))
}

fn load_renderer(config: &Config) -> Result<BoxRenderer> {
    match &config.font_path {
        Some(path) => BoxRenderer::with_font_file(path)
            .with_context(|| format!("loading font {}", path.display())),
        None => Ok(BoxRenderer::new()),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote image");
    Ok(())
}
