use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::{BBox, Ltrb};
use crate::distance::DistanceEstimator;
use crate::projection::{inverse_map, ViewSpec};

/// Detector class, serialized by name (`"person"`, `"ball"`, anything else verbatim)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ClassLabel {
    Person,
    Ball,
    Other(String),
}

impl From<String> for ClassLabel {
    fn from(name: String) -> Self {
        match name.as_str() {
            "person" => ClassLabel::Person,
            "ball" | "sports ball" | "sports_ball" => ClassLabel::Ball,
            _ => ClassLabel::Other(name),
        }
    }
}

impl From<&str> for ClassLabel {
    fn from(name: &str) -> Self {
        name.to_string().into()
    }
}

impl From<ClassLabel> for String {
    fn from(label: ClassLabel) -> Self {
        label.to_string()
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLabel::Person => f.write_str("person"),
            ClassLabel::Ball => f.write_str("ball"),
            ClassLabel::Other(name) => f.write_str(name),
        }
    }
}

/// Detector output for one view, box in that view's pixel space
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawDetection {
    #[serde(rename = "c")]
    pub class: ClassLabel,
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl RawDetection {
    pub fn new<C: Into<ClassLabel>>(class: C, bbox: BBox<Ltrb>, confidence: f32) -> Self {
        Self {
            class: class.into(),
            bbox,
            confidence,
        }
    }
}

/// Detection placed on the sphere.
///
/// `yaw`/`pitch` locate the box center in degrees. `distance` is `None` for
/// classes without a known real size; such detections never win a selection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub class: ClassLabel,
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
    pub view: String,
    pub yaw: f32,
    pub pitch: f32,
    pub distance: Option<f32>,
}

impl Detection {
    pub fn locate(
        raw: RawDetection,
        view_name: &str,
        view: &ViewSpec,
        estimator: &DistanceEstimator,
    ) -> Self {
        let center = raw.bbox.as_xywh();
        let (yaw, pitch) = inverse_map((center.cx(), center.cy()), view);
        let distance = estimator.estimate(&raw.class, &raw.bbox);

        Self {
            class: raw.class,
            bbox: raw.bbox,
            confidence: raw.confidence,
            view: view_name.to_string(),
            yaw,
            pitch,
            distance,
        }
    }

    #[inline]
    pub fn is_person(&self) -> bool {
        self.class == ClassLabel::Person
    }

    #[inline]
    pub fn is_ball(&self) -> bool {
        self.class == ClassLabel::Ball
    }
}

#[cfg(test)]
pub(crate) fn located(class: ClassLabel, yaw: f32, pitch: f32, distance: Option<f32>, confidence: f32) -> Detection {
    Detection {
        class,
        bbox: BBox::ltrb(0.0, 0.0, 10.0, 10.0),
        confidence,
        view: "test".into(),
        yaw,
        pitch,
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn class_labels_by_name() {
        assert_eq!(ClassLabel::from("person"), ClassLabel::Person);
        assert_eq!(ClassLabel::from("sports ball"), ClassLabel::Ball);
        assert_eq!(ClassLabel::from("car"), ClassLabel::Other("car".into()));
        assert_eq!(ClassLabel::Ball.to_string(), "ball");
    }

    #[test]
    fn raw_detection_json() {
        let raw: RawDetection =
            serde_json::from_str(r#"{"c":"person","bbox":[10,20,30,60],"p":0.9}"#).unwrap();

        assert_eq!(raw.class, ClassLabel::Person);
        assert_eq!(raw.bbox, BBox::ltrb(10.0, 20.0, 30.0, 60.0));
        assert_abs_diff_eq!(raw.confidence, 0.9);

        let text = serde_json::to_string(&raw).unwrap();
        assert!(text.contains(r#""c":"person""#));
    }

    #[test]
    fn centered_box_takes_view_direction() {
        let view = ViewSpec::new(90.0, 0.0, 90.0, (641, 481));
        let raw = RawDetection::new("person", BBox::ltrb(300.0, 140.0, 340.0, 340.0), 0.8);
        let det = Detection::locate(raw, "right", &view, &DistanceEstimator::new(1000.0));

        assert_eq!(det.view, "right");
        assert_abs_diff_eq!(det.yaw, 90.0, epsilon = 1e-3);
        assert_abs_diff_eq!(det.pitch, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(det.distance.unwrap(), 1.7 * 1000.0 / 200.0, epsilon = 1e-4);
        assert!(det.is_person());
    }

    #[test]
    fn unknown_class_has_no_distance() {
        let view = ViewSpec::new(0.0, 0.0, 90.0, (64, 48));
        let raw = RawDetection::new("car", BBox::ltrb(0.0, 0.0, 10.0, 10.0), 0.9);
        let det = Detection::locate(raw, "front", &view, &DistanceEstimator::new(500.0));

        assert_eq!(det.distance, None);
        assert!(!det.is_person() && !det.is_ball());
    }
}
