// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use hand_pose::data::PoseRecorder;
use hand_pose::replay::Recording;
use hand_pose::{HandPairTracker, Handedness, TrackerConfig};
use std::path::PathBuf;
use tracing::{info, warn};

/// Replay recorded hand landmarks through both hand trackers and export the poses.
#[derive(Debug, Parser)]
#[command(name = "hand_replay", version, about)]
struct Args {
    /// JSON recording of per-frame landmark detections.
    recording: PathBuf,

    /// TOML tracker settings. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the session folder. Defaults to Documents/HandPose.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => TrackerConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let output_dir = args.output_dir.clone().unwrap_or_else(default_output_dir);

    let recording = Recording::load(&args.recording)
        .with_context(|| format!("loading recording {}", args.recording.display()))?;
    info!(frames = recording.len(), "replaying {}", args.recording.display());

    let mut tracker = HandPairTracker::new(config);
    let mut recorder = PoseRecorder::new(&output_dir, None);

    for frame in recording.hand_frames() {
        let result = tracker.process_frame(&frame?);
        recorder.add_frame(result);
    }

    for handedness in [Handedness::Left, Handedness::Right] {
        let hand_tracker = tracker.tracker(handedness);
        let stats = hand_tracker.stats();
        if stats.length_samples == 0 {
            warn!(hand = handedness.name(), "no complete hand seen, bone lengths are defaults");
        }
        info!(
            hand = handedness.name(),
            scale = hand_tracker.scale(),
            evidence = hand_tracker.implausibility_evidence(),
            rejected = stats.rejected_detections,
            "tracking finished"
        );
    }

    let csv_paths = recorder.export_csv()?;
    let summary_path = recorder.export_summary(&tracker)?;
    for path in csv_paths.iter().chain(std::iter::once(&summary_path)) {
        println!("wrote {}", path.display());
    }

    Ok(())
}

fn default_output_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|p| p.join("HandPose")))
        .unwrap_or_else(|| PathBuf::from("./output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_only() {
        let args = Args::try_parse_from(["hand_replay", "session.json"]).unwrap();
        assert_eq!(args.recording, PathBuf::from("session.json"));
        assert!(args.config.is_none());
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn test_all_arguments() {
        let args = Args::try_parse_from([
            "hand_replay",
            "session.json",
            "--config",
            "config/tracker.toml",
            "--output-dir",
            "out",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("config/tracker.toml")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_missing_recording_rejected() {
        assert!(Args::try_parse_from(["hand_replay"]).is_err());
    }
}
