use crate::landmark::HandLandmarks;

/// Fingertips must sit at least this far above the wrist for a raised hand.
pub const RAISED_HAND_MARGIN: f32 = 0.05;

/// Fingertips lower than `wrist.y - CLOSED_FIST_MARGIN` count as curled in.
pub const CLOSED_FIST_MARGIN: f32 = 0.02;

/// The two poses that raise an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    RaisedHand,
    ClosedFist,
}

impl Gesture {
    /// Label used in alert messages and the log file.
    pub fn label(self) -> &'static str {
        match self {
            Gesture::RaisedHand => "MÃO LEVANTADA",
            Gesture::ClosedFist => "PUNHO FECHADO",
        }
    }

    /// Severity reported to the alert server.
    pub fn severity(self) -> &'static str {
        match self {
            Gesture::ClosedFist => "Alta",
            Gesture::RaisedHand => "Normal",
        }
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// All four fingertips are clearly above the wrist (image y points down).
pub fn is_raised_hand(hand: &HandLandmarks) -> bool {
    let wrist_y = hand.wrist().y;
    hand.fingertips().all(|tip| tip.y < wrist_y - RAISED_HAND_MARGIN)
}

/// All four fingertips are level with or below the wrist.
pub fn is_closed_fist(hand: &HandLandmarks) -> bool {
    let wrist_y = hand.wrist().y;
    hand.fingertips().all(|tip| tip.y > wrist_y - CLOSED_FIST_MARGIN)
}

/// Raised hand takes precedence over closed fist.
pub fn classify(hand: &HandLandmarks) -> Option<Gesture> {
    if is_raised_hand(hand) {
        Some(Gesture::RaisedHand)
    } else if is_closed_fist(hand) {
        Some(Gesture::ClosedFist)
    } else {
        None
    }
}

/// First gesture found among the detected hands.
pub fn classify_any(hands: &[HandLandmarks]) -> Option<Gesture> {
    hands.iter().find_map(classify)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{index, Landmark, HAND_LANDMARK_COUNT};

    fn hand(wrist_y: f32, tip_ys: [f32; 4]) -> HandLandmarks {
        let mut points = [Landmark::new(0.5, wrist_y); HAND_LANDMARK_COUNT];
        for (&i, &y) in index::FINGERTIPS.iter().zip(tip_ys.iter()) {
            points[i] = Landmark::new(0.5, y);
        }
        HandLandmarks::from_points(&points, 0.9, "Right").unwrap()
    }

    #[test]
    fn fingertips_well_above_wrist_is_raised_hand() {
        let h = hand(0.8, [0.3, 0.25, 0.3, 0.4]);
        assert!(is_raised_hand(&h));
        assert!(!is_closed_fist(&h));
        assert_eq!(classify(&h), Some(Gesture::RaisedHand));
    }

    #[test]
    fn one_fingertip_inside_margin_is_not_raised() {
        // 0.77 is only 0.03 above the wrist
        let h = hand(0.8, [0.3, 0.3, 0.3, 0.77]);
        assert!(!is_raised_hand(&h));
    }

    #[test]
    fn fingertips_near_wrist_is_closed_fist() {
        let h = hand(0.6, [0.59, 0.6, 0.62, 0.65]);
        assert!(is_closed_fist(&h));
        assert_eq!(classify(&h), Some(Gesture::ClosedFist));
    }

    #[test]
    fn fingertips_below_wrist_is_closed_fist() {
        let h = hand(0.4, [0.5, 0.55, 0.6, 0.7]);
        assert_eq!(classify(&h), Some(Gesture::ClosedFist));
    }

    #[test]
    fn partially_open_hand_is_neither() {
        // index and middle raised, ring and pinky curled
        let h = hand(0.8, [0.3, 0.3, 0.81, 0.82]);
        assert_eq!(classify(&h), None);
    }

    #[test]
    fn fingertips_between_margins_is_neither() {
        // 0.04 above the wrist: too low for raised, too high for fist
        let h = hand(0.5, [0.46, 0.46, 0.46, 0.46]);
        assert_eq!(classify(&h), None);
    }

    #[test]
    fn classify_any_takes_first_gesture() {
        let open = hand(0.8, [0.3, 0.3, 0.81, 0.82]);
        let fist = hand(0.6, [0.6, 0.6, 0.6, 0.6]);
        assert_eq!(classify_any(&[open.clone(), fist]), Some(Gesture::ClosedFist));
        assert_eq!(classify_any(&[open]), None);
        assert_eq!(classify_any(&[]), None);
    }

    #[test]
    fn severity_and_labels() {
        assert_eq!(Gesture::ClosedFist.severity(), "Alta");
        assert_eq!(Gesture::RaisedHand.severity(), "Normal");
        assert_eq!(Gesture::RaisedHand.to_string(), "MÃO LEVANTADA");
    }
}
