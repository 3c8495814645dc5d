use face_blur::{
    cli::{
        annotate, doctor, report, spawn_key_listener, AsciiRenderer, ConsoleObserver, PreviewTerminal,
    },
    common::config::DEFAULT_CONFIG_PATH,
    core::{
        recognizer::model_id_for,
        whitelist::{add_to_whitelist, list_images, remove_from_whitelist, AddOutcome},
    },
    process_video, BlurSettings, Config, DetectFaces, FaceBlurProcessor, FaceDetector, FaceRecognizer,
    JobControl, ProcessSummary, Whitelist, Workspace,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "face-blur")]
#[command(about = "Blur every face in a video except the whitelisted ones", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable development mode (keeps whitelist and output under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Blur non-whitelisted faces in a video
    Process {
        /// Input video
        #[arg(short, long)]
        input: PathBuf,
        /// Output video (default: <output_dir>/<name>_blurred_<timestamp>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Request the CUDA execution provider
        #[arg(long)]
        gpu: bool,
        /// Force CPU inference (wins over --gpu)
        #[arg(long)]
        cpu: bool,
        /// Override the whitelist match threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Show an ASCII preview; p pauses, q or Esc stops
        #[arg(long)]
        preview: bool,
    },
    /// Manage whitelisted faces
    Whitelist {
        #[command(subcommand)]
        command: WhitelistCommands,
    },
    /// Detect faces in a single image and save an annotated copy
    Detect {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,
        /// Annotated output image
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check tools, models and directories
    Doctor,
}

#[derive(Subcommand)]
enum WhitelistCommands {
    /// Add face images (cropped to the largest face)
    Add {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List whitelisted images
    List,
    /// Remove a whitelisted image by file name
    Remove { name: String },
    /// Recompute every embedding, ignoring the cache
    Rebuild,
    /// Write pairwise distances and an embeddings CSV for threshold tuning
    Report,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    if let Commands::Doctor = cli.command {
        let report = doctor::run_checks(&cli.config, cli.dev);
        println!("{}", report);
        if !report.passed() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut config = Config::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Commands::Process { input, output, gpu, cpu, threshold, preview } => {
            if gpu {
                config.performance.use_gpu = true;
            }
            if cpu {
                config.performance.use_gpu = false;
            }
            if let Some(threshold) = threshold {
                config.matching.threshold = threshold;
                config.validate()?;
            }

            let workspace = Workspace::new(&config, cli.dev)?;
            workspace.ensure_dirs()?;
            let output = output.unwrap_or_else(|| workspace.default_output_path(&input));

            let summary = run_process(&config, &workspace, &input, &output, preview)?;
            print_summary(&summary);
        }
        Commands::Whitelist { command } => {
            let workspace = Workspace::new(&config, cli.dev)?;
            run_whitelist(command, &config, &workspace)?;
        }
        Commands::Detect { input, output } => {
            let workspace = Workspace::new(&config, cli.dev)?;
            run_detect(&config, &workspace, &input, output)?;
        }
        Commands::Doctor => {}
    }

    Ok(())
}

fn run_process(
    config: &Config,
    workspace: &Workspace,
    input: &Path,
    output: &Path,
    preview: bool,
) -> Result<ProcessSummary> {
    println!("Loading models...");
    let detector = FaceDetector::new(config, workspace)?;
    let recognizer = FaceRecognizer::new(config, workspace)?;

    let whitelist = Whitelist::load(workspace.whitelist_dir(), &detector, &recognizer, &config.matching, false)?;
    println!("Whitelist: {} face(s), {} threshold {:.3}", whitelist.len(), whitelist.metric(), whitelist.threshold());

    let processor = FaceBlurProcessor::new(
        detector,
        recognizer,
        whitelist,
        BlurSettings::from(&config.blur),
        config.detector.confidence,
    );
    let control = JobControl::new();

    if !preview {
        let mut observer = ConsoleObserver::new(None);
        return Ok(process_video(input, output, &processor, &control, &mut observer)?);
    }

    let done = Arc::new(AtomicBool::new(false));
    let terminal = PreviewTerminal::enter().context("Failed to enable raw mode")?;
    let listener = spawn_key_listener(control.clone(), done.clone());

    let mut observer = ConsoleObserver::new(Some(AsciiRenderer::new(None, None)));
    let result = process_video(input, output, &processor, &control, &mut observer);

    done.store(true, Ordering::SeqCst);
    listener.join().ok();
    drop(terminal);

    for message in observer.take_deferred() {
        println!("{}", message);
    }
    Ok(result?)
}

fn print_summary(summary: &ProcessSummary) {
    println!();
    println!("═══════════════════════════════════════");
    if summary.stopped {
        println!("⏹  Stopped early");
    } else {
        println!("✅ Done");
    }
    println!("Frames:      {}", summary.frames_processed);
    println!("Faces:       {}", summary.faces.detected);
    println!("Blurred:     {}", summary.faces.blurred);
    println!("Whitelisted: {}", summary.faces.whitelisted);
    if summary.frame_errors > 0 {
        println!("Frame errors: {} (written unmodified)", summary.frame_errors);
    }
    println!("Time:        {:.1}s ({:.2} fps)", summary.elapsed.as_secs_f64(), summary.fps());
}

fn run_whitelist(command: WhitelistCommands, config: &Config, workspace: &Workspace) -> Result<()> {
    let dir = workspace.whitelist_dir();

    match command {
        WhitelistCommands::Add { images } => {
            let detector = FaceDetector::new(config, workspace)?;
            let mut failed = 0;
            for image in &images {
                match add_to_whitelist(image, dir, &detector) {
                    Ok(AddOutcome::Cropped { path, quality }) => {
                        println!("✅ {} (face cropped, {})", path.display(), quality.assessment());
                    }
                    Ok(AddOutcome::Copied { path }) => {
                        println!("⚠️  {} (no face detected, original copied)", path.display());
                    }
                    Err(e) => {
                        failed += 1;
                        println!("❌ {}: {}", image.display(), e);
                    }
                }
            }
            if failed == images.len() {
                anyhow::bail!("No images were added to the whitelist");
            }
        }
        WhitelistCommands::List => {
            let images = if dir.exists() { list_images(dir)? } else { Vec::new() };
            if images.is_empty() {
                println!("Whitelist at {} is empty.", dir.display());
            } else {
                println!("Whitelist at {}:", dir.display());
                for path in &images {
                    if let Some(name) = path.file_name() {
                        println!("  {}", name.to_string_lossy());
                    }
                }
                println!("{} image(s)", images.len());
            }
        }
        WhitelistCommands::Remove { name } => {
            remove_from_whitelist(dir, &name, &model_id_for(config, workspace))?;
            println!("Removed {} from whitelist.", name);
        }
        WhitelistCommands::Rebuild => {
            let detector = FaceDetector::new(config, workspace)?;
            let recognizer = FaceRecognizer::new(config, workspace)?;
            let whitelist = Whitelist::load(dir, &detector, &recognizer, &config.matching, true)?;
            println!("Rebuilt {} embedding(s).", whitelist.len());
        }
        WhitelistCommands::Report => {
            let detector = FaceDetector::new(config, workspace)?;
            let recognizer = FaceRecognizer::new(config, workspace)?;
            let whitelist = Whitelist::load(dir, &detector, &recognizer, &config.matching, false)?;

            print!("{}", report::similarity_report(&whitelist));
            let report_path = report::write_similarity_report(&whitelist, workspace.output_dir())?;
            let csv_path = report::export_embeddings_csv(&whitelist, workspace.output_dir())?;
            println!("\nSaved report to {}", report_path.display());
            println!("Saved embeddings to {}", csv_path.display());
        }
    }

    Ok(())
}

fn run_detect(config: &Config, workspace: &Workspace, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let detector = FaceDetector::new(config, workspace)?;
    let image = image::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .to_rgb8();

    let faces = detector.detect(&image)?;
    println!("Found {} face(s) in {}:", faces.len(), input.display());
    for (i, face) in faces.iter().enumerate() {
        println!(
            "  {}: ({:.0}, {:.0}) {:.0}x{:.0} confidence {:.3}",
            i + 1,
            face.x1,
            face.y1,
            face.width(),
            face.height(),
            face.confidence
        );
    }

    let renderer = AsciiRenderer::new(None, None);
    println!("{}", renderer.render_detections(&image, &faces));

    let output = output.unwrap_or_else(|| annotate::annotated_path(workspace.output_dir(), input));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    annotate::annotate_detections(&image, &faces).save(&output)?;
    println!("Saved annotated image to: {}", output.display());

    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
