use anyhow::{bail, Context, Result};
use clap::Args;
use facedash_core::{profile, Dataset, ProfileStore, Settings};
use facedash_hw::{meminfo, Camera, FrameStream};
use std::time::{Duration, Instant};

use crate::stop::StopFlag;

const WARMUP: Duration = Duration::from_secs(2);
const COUNTDOWN_SECS: u64 = 3;
const MEMORY_CHECK_EVERY: usize = 25;
const MAX_CAPTURE_FAILURES: u32 = 10;

/// Camera and pacing options shared by `capture` and `register --capture`.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Number of images to capture
    #[arg(long, default_value_t = 250)]
    pub count: usize,
    /// Delay between saved images, in milliseconds
    #[arg(long, default_value_t = 400)]
    pub interval_ms: u64,
    #[arg(long, env = "FACEDASH_CAMERA_DEVICE", default_value = "/dev/video0")]
    pub device: String,
    /// Do not rebuild the gallery after a complete capture
    #[arg(long)]
    pub no_encode: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Person to capture (default: the most recently registered profile)
    #[arg(short, long)]
    pub name: Option<String>,
    #[command(flatten)]
    pub options: CaptureOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub person: String,
    pub saved: usize,
    pub requested: usize,
}

impl CaptureOutcome {
    pub fn is_complete(&self) -> bool {
        self.saved == self.requested
    }
}

/// Pick who to capture: the explicit name, else the latest registration.
pub fn resolve_person(settings: &Settings, name: Option<&str>) -> Result<String> {
    let profiles = ProfileStore::open(settings.people_path()).load()?;
    match name {
        Some(name) => {
            let name = name.trim();
            if profile::find_by_name(&profiles, name).is_none() {
                tracing::warn!(name, "no profile registered for this name; the dashboard will fall back to the first profile");
            }
            Ok(name.to_string())
        }
        None => {
            let latest = profile::latest(&profiles).with_context(|| {
                format!(
                    "no people registered in {}; run `facedash register` first",
                    settings.people_path().display()
                )
            })?;
            tracing::info!(name = %latest.name, "capturing for the most recently registered person");
            Ok(latest.name.clone())
        }
    }
}

/// Capture enrollment images until `count` are saved or `stop` is set.
pub async fn run(settings: &Settings, args: &CaptureArgs, stop: &StopFlag) -> Result<CaptureOutcome> {
    let person = resolve_person(settings, args.name.as_deref())?;
    let dataset = Dataset::new(settings.dataset_dir());
    dataset.person_dir(&person)?;
    meminfo::warn_if_low(meminfo::LOW_MEMORY_MB);

    let options = args.options.clone();
    let job_person = person.clone();
    let job_stop = stop.clone();
    let saved = tokio::task::spawn_blocking(move || -> Result<usize> {
        let camera = Camera::open(&options.device, 640, 480)
            .with_context(|| format!("opening camera {}", options.device))?;
        let mut stream = camera.stream()?;
        capture_loop(
            &mut stream,
            &dataset,
            &job_person,
            options.count,
            Duration::from_millis(options.interval_ms),
            &job_stop,
        )
    })
    .await??;

    let outcome = CaptureOutcome {
        person,
        saved,
        requested: args.options.count,
    };
    println!("Captured {} images for {}", outcome.saved, outcome.person);
    Ok(outcome)
}

fn capture_loop(
    stream: &mut FrameStream<'_>,
    dataset: &Dataset,
    person: &str,
    count: usize,
    interval: Duration,
    stop: &StopFlag,
) -> Result<usize> {
    let warmup_until = Instant::now() + WARMUP;
    while Instant::now() < warmup_until {
        if stop.is_set() {
            return Ok(0);
        }
        let _ = stream.next_frame();
    }

    println!("Capturing {count} images, one every {} ms. Press Ctrl-C to stop.", interval.as_millis());
    for n in (1..=COUNTDOWN_SECS).rev() {
        println!("Starting in {n}...");
        std::thread::sleep(Duration::from_secs(1));
        if stop.is_set() {
            return Ok(0);
        }
    }

    let mut saved = 0usize;
    let mut failures = 0u32;
    let mut last_saved: Option<Instant> = None;

    while saved < count {
        if stop.is_set() {
            tracing::info!(saved, "capture interrupted");
            break;
        }
        // Keep dequeuing so the saved frame is current, not a stale buffer.
        let frame = match stream.next_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "frame capture failed");
                if failures >= MAX_CAPTURE_FAILURES {
                    bail!("camera stopped delivering frames after {saved} images");
                }
                continue;
            }
        };

        let now = Instant::now();
        if last_saved.is_some_and(|t| now.duration_since(t) < interval) {
            continue;
        }

        let path = dataset.image_path(person, saved)?;
        frame
            .image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        saved += 1;
        last_saved = Some(now);
        println!("{} written ({saved}/{count})", path.display());

        if saved % MEMORY_CHECK_EVERY == 0 {
            meminfo::warn_if_low(meminfo::CRITICAL_MEMORY_MB);
        }
    }

    Ok(saved)
}
