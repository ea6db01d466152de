// src/data.rs
use crate::lengths::BoneLengths;
use crate::pose::Hand;
use crate::topology::{locate, parent, Handedness, LANDMARK_COUNT};
use crate::tracking::{HandPairTracker, TrackingResult, TrackingStats};
use anyhow::Result;
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// One row per frame and tracked hand.
#[derive(Debug, Serialize)]
struct HandRecord {
    frame: usize,
    timestamp: f64,
    hand: &'static str,
    evidence: usize,
    flatness: f32,
    center_x: f32,
    center_y: f32,
    center_z: f32,
    normal_x: f32,
    normal_y: f32,
    normal_z: f32,

    // Knuckle / first joint / second joint angles in degrees
    index_knuckle: f32,
    index_joint1: f32,
    index_joint2: f32,
    middle_knuckle: f32,
    middle_joint1: f32,
    middle_joint2: f32,
    ring_knuckle: f32,
    ring_joint1: f32,
    ring_joint2: f32,
    little_knuckle: f32,
    little_joint1: f32,
    little_joint2: f32,
}

/// One row per frame, hand and landmark.
#[derive(Debug, Serialize)]
struct JointRecord {
    frame: usize,
    timestamp: f64,
    hand: &'static str,
    landmark: usize,
    name: String,
    parent: Option<usize>,
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Serialize)]
struct HandSummary {
    handedness: Handedness,
    frames_with_hand: usize,
    mean_evidence: f64,
    scale: f32,
    lengths: BoneLengths,
    stats: TrackingStats,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    session_name: String,
    total_frames: usize,
    rejected_frames: usize,
    hands: Vec<HandSummary>,
}

pub struct PoseRecorder {
    output_dir: PathBuf,
    session_name: String,
    results: Vec<TrackingResult>,
}

impl PoseRecorder {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
            results: Vec::new(),
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn add_frame(&mut self, result: TrackingResult) {
        self.results.push(result);
    }

    /// Writes `hands.csv` and `joints.csv` into the session directory.
    pub fn export_csv(&self) -> Result<Vec<PathBuf>> {
        let dir = self.session_dir();
        fs::create_dir_all(&dir)?;

        let hands_path = dir.join("hands.csv");
        let mut hands = Writer::from_writer(File::create(&hands_path)?);
        let joints_path = dir.join("joints.csv");
        let mut joints = Writer::from_writer(File::create(&joints_path)?);

        for (frame, result) in self.results.iter().enumerate() {
            for handedness in [Handedness::Left, Handedness::Right] {
                let Some(hand) = result.hand(handedness) else {
                    continue;
                };
                hands.serialize(Self::hand_record(frame, result, hand))?;
                for (landmark, position) in hand.landmarks().iter().enumerate() {
                    joints.serialize(JointRecord {
                        frame,
                        timestamp: result.timestamp,
                        hand: handedness.name(),
                        landmark,
                        name: landmark_name(landmark),
                        parent: parent(landmark),
                        x: position.x,
                        y: position.y,
                        z: position.z,
                    })?;
                }
            }
        }

        hands.flush()?;
        joints.flush()?;
        info!(frames = self.results.len(), path = %dir.display(), "exported hand csv");
        Ok(vec![hands_path, joints_path])
    }

    fn hand_record(frame: usize, result: &TrackingResult, hand: &Hand) -> HandRecord {
        let angles = hand.finger_angles.map(|triple| triple.map(f32::to_degrees));
        HandRecord {
            frame,
            timestamp: result.timestamp,
            hand: hand.handedness.name(),
            evidence: result.evidence(hand.handedness),
            flatness: result.quality.flatness,
            center_x: hand.center.x,
            center_y: hand.center.y,
            center_z: hand.center.z,
            normal_x: hand.palm_normal.x,
            normal_y: hand.palm_normal.y,
            normal_z: hand.palm_normal.z,
            index_knuckle: angles[0][0],
            index_joint1: angles[0][1],
            index_joint2: angles[0][2],
            middle_knuckle: angles[1][0],
            middle_joint1: angles[1][1],
            middle_joint2: angles[1][2],
            ring_knuckle: angles[2][0],
            ring_joint1: angles[2][1],
            ring_joint2: angles[2][2],
            little_knuckle: angles[3][0],
            little_joint1: angles[3][1],
            little_joint2: angles[3][2],
        }
    }

    /// Writes `summary.json` with per-hand statistics and the final bone lengths.
    pub fn export_summary(&self, tracker: &HandPairTracker) -> Result<PathBuf> {
        let dir = self.session_dir();
        fs::create_dir_all(&dir)?;

        let hands = [Handedness::Left, Handedness::Right]
            .into_iter()
            .map(|handedness| {
                let hand_tracker = tracker.tracker(handedness);
                let frames_with_hand = self.results.iter().filter(|r| r.hand(handedness).is_some()).count();
                let total_evidence: usize = self.results.iter().map(|r| r.evidence(handedness)).sum();
                HandSummary {
                    handedness,
                    frames_with_hand,
                    mean_evidence: if self.results.is_empty() {
                        0.0
                    } else {
                        total_evidence as f64 / self.results.len() as f64
                    },
                    scale: hand_tracker.scale(),
                    lengths: hand_tracker.average_lengths(),
                    stats: hand_tracker.stats().clone(),
                }
            })
            .collect();

        let summary = SessionSummary {
            session_name: self.session_name.clone(),
            total_frames: self.results.len(),
            rejected_frames: self.results.iter().filter(|r| !r.quality.is_usable()).count(),
            hands,
        };

        let path = dir.join("summary.json");
        fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        Ok(path)
    }
}

/// Column label for a landmark, e.g. `wrist` or `index_2`.
pub fn landmark_name(landmark: usize) -> String {
    match locate(landmark) {
        Some((finger, joint)) => format!("{}_{}", finger.name(), joint),
        None if landmark < LANDMARK_COUNT => "wrist".to_string(),
        None => format!("landmark_{}", landmark),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::detection::DetectionQuality;
    use nalgebra::Vector3;

    fn hand() -> Hand {
        let mut fingers = [[Vector3::zeros(); 4]; 5];
        for (f, finger) in fingers.iter_mut().enumerate() {
            for (j, joint) in finger.iter_mut().enumerate() {
                *joint = Vector3::new(f as f32 * 0.02, j as f32 * 0.03, -0.4);
            }
        }
        Hand {
            handedness: Handedness::Left,
            wrist: Vector3::new(0.0, -0.08, -0.4),
            fingers,
            finger_angles: [[std::f32::consts::FRAC_PI_2, 0.0, 0.0]; 4],
            palm_tangent: -Vector3::x(),
            up_direction: Vector3::y(),
            palm_normal: Vector3::z(),
            center: Vector3::new(0.01, 0.0, -0.4),
        }
    }

    fn result(timestamp: f64, left: Option<Hand>) -> TrackingResult {
        TrackingResult {
            timestamp,
            quality: DetectionQuality::default(),
            left,
            right: None,
            left_evidence: 1,
            right_evidence: 3,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hand_pose_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_landmark_names() {
        assert_eq!(landmark_name(0), "wrist");
        assert_eq!(landmark_name(4), "thumb_3");
        assert_eq!(landmark_name(9), "middle_0");
        assert_eq!(landmark_name(20), "little_3");
    }

    #[test]
    fn test_export_csv_rows() {
        let dir = scratch_dir("csv");
        let mut recorder = PoseRecorder::new(&dir, Some("test".to_string()));
        recorder.add_frame(result(0.0, Some(hand())));
        recorder.add_frame(result(0.033, None));
        recorder.add_frame(result(0.066, Some(hand())));

        let paths = recorder.export_csv().unwrap();
        let hands = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = hands.lines().collect();
        assert_eq!(lines.len(), 3, "header plus two hands");
        assert!(lines[0].starts_with("frame,timestamp,hand,evidence"));
        assert!(lines[1].starts_with("0,0.0,left,1,"));
        assert_eq!(lines[1].split(',').count(), lines[0].split(',').count());

        let joints = fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(joints.lines().count(), 1 + 2 * LANDMARK_COUNT);
        assert!(joints.lines().next().unwrap().starts_with("frame,timestamp,hand,landmark,name,parent,x"));
        assert!(joints.contains("2,0.066,left,20,little_3,19,"));
        assert!(joints.contains("0,0.0,left,0,wrist,,"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_export_summary() {
        let dir = scratch_dir("summary");
        let mut recorder = PoseRecorder::new(&dir, Some("test".to_string()));
        recorder.add_frame(result(0.0, Some(hand())));
        recorder.add_frame(result(0.033, None));

        let tracker = HandPairTracker::new(TrackerConfig::default());
        let path = recorder.export_summary(&tracker).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(summary["total_frames"], 2);
        assert_eq!(summary["hands"][0]["handedness"], "left");
        assert_eq!(summary["hands"][0]["frames_with_hand"], 1);
        assert_eq!(summary["hands"][1]["mean_evidence"], 3.0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_default_session_name() {
        let recorder = PoseRecorder::new("out", None);
        let name = recorder.session_dir();
        let name = name.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("session_"), "{}", name);
        assert_eq!(name.len(), "session_20240101_120000".len());
    }
}
