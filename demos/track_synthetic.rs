use chisttrack_rs::{
    ChistTracker, Detection, PixelBuffer, PixelFormat, Rect, TrackerConfig, TrackletStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use std::{collections::HashMap, env, error::Error};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;
const DT: f32 = 0.033;

struct Walker {
    rect: Rect<f32>,
    velocity: (f32, f32),
    color: [u8; 3],
    /// Frames during which the walker is hidden from the detector.
    hidden: std::ops::Range<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_usage();
        return Ok(());
    }
    let num_objects = args
        .get(1)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(8);
    let num_frames = args
        .get(2)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(300);
    let format = match args.get(3).map(String::as_str) {
        None | Some("bgr24") => PixelFormat::Bgr24,
        Some("nv12") => PixelFormat::Nv12,
        Some("i420") => PixelFormat::I420,
        Some("gray") => PixelFormat::Gray,
        Some(other) => return Err(format!("Unsupported format: {other}").into()),
    };

    let config = TrackerConfig {
        input_color_format: format,
        ..TrackerConfig::default()
    };
    let mut tracker = ChistTracker::new(config)?;
    let mut rng = StdRng::seed_from_u64(2024);
    let mut walkers = make_walkers(num_objects, num_frames, &mut rng);

    let progress = ProgressBar::new(num_frames as u64);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )?
    .progress_chars("=>-");
    progress.set_style(style);
    progress.set_message("tracking");

    // walker index -> track id it was last reported under
    let mut assigned = HashMap::<usize, u64>::new();
    let mut id_switches = 0usize;
    for frame_id in 0..num_frames {
        let mut frame = PixelBuffer::new(WIDTH, HEIGHT, format)?;
        frame.fill_region(&frame.bounds(), &[96, 128, 128])?;
        let mut detections = Vec::new();
        for (i, walker) in walkers.iter_mut().enumerate() {
            frame.fill_region(&walker.rect, &walker.color)?;
            if !walker.hidden.contains(&frame_id) {
                detections.push(Detection::new(walker.rect, 0, i as i32));
            }
            step(walker);
        }

        let tracklets = tracker.track_objects(&frame, &detections, DT)?;
        for tracklet in tracklets.iter() {
            let Some(idx) = tracklet.association_idx() else {
                continue;
            };
            if tracklet.status() != TrackletStatus::Tracked {
                continue;
            }
            let previous = assigned.insert(idx as usize, tracklet.id());
            if previous.map_or(false, |id| id != tracklet.id()) {
                id_switches += 1;
                log::info!(
                    "frame {}: walker {} switched to track {}",
                    frame_id,
                    idx,
                    tracklet.id()
                );
            }
        }
        progress.inc(1);
    }
    progress.finish_with_message("done");

    let summary = tracker
        .tracklets()
        .iter()
        .map(|t| format!("{}:{:?}", t.id(), t.status()))
        .collect::<Vec<_>>();
    println!("frames: {}", tracker.frame_count());
    println!("id switches: {}", id_switches);
    println!("tracklets: {}", summary.join(" "));
    Ok(())
}

fn print_usage() {
    println!(
        "Usage: cargo run --example track_synthetic [num_objects] [num_frames] [format]\n\
Defaults:\n\
  num_objects: 8\n\
  num_frames: 300\n\
  format: bgr24 (bgr24 | nv12 | i420 | gray)"
    );
}

fn make_walkers(n: usize, num_frames: usize, rng: &mut StdRng) -> Vec<Walker> {
    (0..n)
        .map(|_| {
            let start = rng.gen_range(0..num_frames.max(1));
            let len = rng.gen_range(0..20);
            Walker {
                rect: Rect::new(
                    rng.gen_range(0.0..(WIDTH as f32 - 60.0)),
                    rng.gen_range(0.0..(HEIGHT as f32 - 120.0)),
                    rng.gen_range(30.0..60.0),
                    rng.gen_range(60.0..120.0),
                ),
                velocity: (rng.gen_range(-90.0..90.0), rng.gen_range(-45.0..45.0)),
                color: [rng.gen(), rng.gen(), rng.gen()],
                hidden: start..start + len,
            }
        })
        .collect()
}

/// Advances a walker one frame, bouncing off the frame edges.
fn step(walker: &mut Walker) {
    let rect = &mut walker.rect;
    let (mut vx, mut vy) = walker.velocity;
    if rect.x() + vx * DT < 0.0 || rect.right() + vx * DT > WIDTH as f32 {
        vx = -vx;
    }
    if rect.y() + vy * DT < 0.0 || rect.bottom() + vy * DT > HEIGHT as f32 {
        vy = -vy;
    }
    rect.set_x(rect.x() + vx * DT);
    rect.set_y(rect.y() + vy * DT);
    walker.velocity = (vx, vy);
}
