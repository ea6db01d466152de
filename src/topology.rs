// src/topology.rs
//! Fixed 21-landmark hand topology.
//!
//! Landmark 0 is the wrist. Fingers follow in thumb, index, middle, ring,
//! little order with four joints each, knuckle (finger root) first and tip last.

use serde::{Deserialize, Serialize};

pub const LANDMARK_COUNT: usize = 21;
pub const FINGER_COUNT: usize = 5;
pub const JOINTS_PER_FINGER: usize = 4;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const LITTLE_MCP: usize = 17;
pub const LITTLE_PIP: usize = 18;
pub const LITTLE_DIP: usize = 19;
pub const LITTLE_TIP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Little,
}

impl Finger {
    pub const ALL: [Finger; FINGER_COUNT] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Little,
    ];

    /// Fingers that attach to the palm through a knuckle on the knuckle line.
    pub const PALM: [Finger; 4] = [Finger::Index, Finger::Middle, Finger::Ring, Finger::Little];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Little => "little",
        }
    }

    /// Landmarks of this finger, root first.
    pub const fn landmarks(self) -> [usize; JOINTS_PER_FINGER] {
        FINGER_LANDMARKS[self as usize]
    }

    pub const fn landmark(self, joint: usize) -> usize {
        FINGER_LANDMARKS[self as usize][joint]
    }

    pub const fn knuckle(self) -> usize {
        self.landmark(0)
    }
}

pub const FINGER_LANDMARKS: [[usize; JOINTS_PER_FINGER]; FINGER_COUNT] = [
    [THUMB_CMC, THUMB_MCP, THUMB_IP, THUMB_TIP],
    [INDEX_MCP, INDEX_PIP, INDEX_DIP, INDEX_TIP],
    [MIDDLE_MCP, MIDDLE_PIP, MIDDLE_DIP, MIDDLE_TIP],
    [RING_MCP, RING_PIP, RING_DIP, RING_TIP],
    [LITTLE_MCP, LITTLE_PIP, LITTLE_DIP, LITTLE_TIP],
];

/// Parent landmark of every landmark; the wrist is the root.
pub const PARENTS: [Option<usize>; LANDMARK_COUNT] = [
    None,
    Some(WRIST),
    Some(THUMB_CMC),
    Some(THUMB_MCP),
    Some(THUMB_IP),
    Some(WRIST),
    Some(INDEX_MCP),
    Some(INDEX_PIP),
    Some(INDEX_DIP),
    Some(WRIST),
    Some(MIDDLE_MCP),
    Some(MIDDLE_PIP),
    Some(MIDDLE_DIP),
    Some(WRIST),
    Some(RING_MCP),
    Some(RING_PIP),
    Some(RING_DIP),
    Some(WRIST),
    Some(LITTLE_MCP),
    Some(LITTLE_PIP),
    Some(LITTLE_DIP),
];

pub const fn parent(landmark: usize) -> Option<usize> {
    PARENTS[landmark]
}

/// Finger and joint slot of a landmark, `None` for the wrist.
pub fn locate(landmark: usize) -> Option<(Finger, usize)> {
    if landmark == WRIST || landmark >= LANDMARK_COUNT {
        return None;
    }
    let offset = landmark - 1;
    Finger::from_index(offset / JOINTS_PER_FINGER).map(|finger| (finger, offset % JOINTS_PER_FINGER))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub const fn is_right(self) -> bool {
        matches!(self, Handedness::Right)
    }

    /// +1 for left hands, -1 for right hands. Applied to palm normals and joint rotations.
    pub const fn mirror(self) -> f32 {
        match self {
            Handedness::Left => 1.0,
            Handedness::Right => -1.0,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
        }
    }
}
