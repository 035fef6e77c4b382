use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facedash_core::Settings;
use facedash_hw::Camera;
use std::path::PathBuf;

mod capture;
mod dashboard;
mod encode;
mod register;
mod status;
mod stop;

use stop::StopFlag;

#[derive(Parser)]
#[command(name = "facedash", about = "Face-recognition personal dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new person's dashboard profile
    Register(register::RegisterArgs),
    /// Capture enrollment images from the camera
    Capture(capture::CaptureArgs),
    /// Rebuild the face gallery from the captured images
    Encode,
    /// Show the dashboard for the currently recognized person
    Dashboard(dashboard::DashboardArgs),
    /// Manage registered people
    People {
        #[command(subcommand)]
        command: PeopleCommands,
    },
    /// Show daemon status
    Status,
    /// Run camera diagnostics
    Test {
        #[arg(long, env = "FACEDASH_CAMERA_DEVICE", default_value = "/dev/video0")]
        device: String,
        /// Save the captured frame to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PeopleCommands {
    /// List registered people and their gallery entries
    List,
    /// Remove a person's profile
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    let stop = StopFlag::install().context("installing Ctrl-C handler")?;

    match cli.command {
        Commands::Register(args) => {
            let profile = register::run(&settings, &args)?;
            if args.capture {
                capture_then_encode(&settings, &args.capture_args(&profile), &stop).await?;
            }
        }
        Commands::Capture(args) => capture_then_encode(&settings, &args, &stop).await?,
        Commands::Encode => run_encode(&settings, &stop).await?,
        Commands::Dashboard(args) => dashboard::run(&settings, &args, &stop).await?,
        Commands::People { command } => match command {
            PeopleCommands::List => register::list(&settings)?,
            PeopleCommands::Remove { name } => register::remove(&settings, &name)?,
        },
        Commands::Status => status::run().await?,
        Commands::Test { device, save } => run_test(&settings, &device, save)?,
    }

    Ok(())
}

async fn capture_then_encode(
    settings: &Settings,
    args: &capture::CaptureArgs,
    stop: &StopFlag,
) -> Result<()> {
    let outcome = capture::run(settings, args, stop).await?;
    if !outcome.is_complete() {
        println!(
            "Capture interrupted after {} of {} images; not encoding.",
            outcome.saved, outcome.requested
        );
        return Ok(());
    }
    println!("Face data collection completed for {}.", outcome.person);
    if args.options.no_encode {
        return Ok(());
    }
    run_encode(settings, stop).await
}

async fn run_encode(settings: &Settings, stop: &StopFlag) -> Result<()> {
    let job_settings = settings.clone();
    let job_stop = stop.clone();
    let summary =
        tokio::task::spawn_blocking(move || encode::run(&job_settings, &job_stop)).await??;
    println!(
        "Encoded {} faces for {} people in {:.1}s ({} images skipped) -> {}",
        summary.encodings,
        summary.people,
        summary.elapsed.as_secs_f64(),
        summary.skipped,
        summary.gallery_path.display()
    );
    if summary.gallery_path == settings.gallery_path() {
        status::notify_gallery_rebuilt().await;
    }
    Ok(())
}

fn run_test(settings: &Settings, device: &str, save: Option<PathBuf>) -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in &devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }

    let camera = Camera::open(device, 640, 480).with_context(|| format!("opening {device}"))?;
    let mut stream = camera.stream()?;
    stream.warm_up(5);
    let frame = stream.next_frame()?;
    println!(
        "{device}: {}x{} {:?}, brightness {:.1}{}",
        frame.width(),
        frame.height(),
        camera.pixel_format,
        frame.avg_brightness(),
        if frame.is_dark() { " (dark)" } else { "" }
    );

    match facedash_core::FaceDetector::load(&settings.scrfd_model_path()) {
        Ok(detector) => {
            let mut detector = detector.with_confidence_threshold(settings.detection_confidence);
            let faces = detector.detect(&frame.image)?;
            println!("Faces detected: {}", faces.len());
        }
        Err(e) => println!("Face detector unavailable: {e}"),
    }

    if let Some(path) = save {
        frame
            .image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Frame saved to {}", path.display());
    }
    Ok(())
}
