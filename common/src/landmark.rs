use serde::Deserialize;

/// Number of landmarks the hand model reports per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Landmark indices in the 21-point hand model.
pub mod index {
    pub const WRIST: usize = 0;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_TIP: usize = 20;

    /// The four non-thumb fingertips used by the pose classifiers.
    pub const FINGERTIPS: [usize; 4] = [INDEX_FINGER_TIP, MIDDLE_FINGER_TIP, RING_FINGER_TIP, PINKY_TIP];
}

/// A single tracked point. `x` and `y` are normalized to the image size with
/// `y` pointing down; `z` is depth relative to the wrist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// All landmarks of one detected hand.
#[derive(Debug, Clone)]
pub struct HandLandmarks {
    pub landmarks: [Landmark; HAND_LANDMARK_COUNT],
    /// Detector confidence, 0.0 to 1.0.
    pub score: f32,
    /// "Left" or "Right" as reported by the detector.
    pub handedness: String,
}

impl HandLandmarks {
    /// Build from a detector-provided list. Returns `None` unless exactly 21 points are given.
    pub fn from_points(points: &[Landmark], score: f32, handedness: impl Into<String>) -> Option<Self> {
        let landmarks: [Landmark; HAND_LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self {
            landmarks,
            score,
            handedness: handedness.into(),
        })
    }

    pub fn wrist(&self) -> Landmark {
        self.landmarks[index::WRIST]
    }

    pub fn fingertips(&self) -> impl Iterator<Item = Landmark> + '_ {
        index::FINGERTIPS.iter().map(|&i| self.landmarks[i])
    }
}
