use crate::bbox::{BBox, Ltrb};
use crate::detection::ClassLabel;
use crate::projection::ViewSpec;

use std::collections::HashMap;

const PERSON_HEIGHT_M: f32 = 1.7;
const BALL_DIAMETER_M: f32 = 0.22;

/// Pinhole range estimate from a box height and the class's real size.
#[derive(Debug, Clone)]
pub struct DistanceEstimator {
    focal_length: f32,
    known_sizes: HashMap<ClassLabel, f32>,
}

impl DistanceEstimator {
    /// `focal_length` in pixels of the view the boxes come from.
    pub fn new(focal_length: f32) -> Self {
        let mut known_sizes = HashMap::new();
        known_sizes.insert(ClassLabel::Person, PERSON_HEIGHT_M);
        known_sizes.insert(ClassLabel::Ball, BALL_DIAMETER_M);

        Self {
            focal_length,
            known_sizes,
        }
    }

    /// Vertical focal length of a rendered view.
    pub fn for_view(view: &ViewSpec) -> Self {
        let half_height = (view.height as f32 - 1.0).max(1.0) / 2.0;
        Self::new(half_height / (view.fov.to_radians() / 2.0).tan())
    }

    pub fn with_size(mut self, class: ClassLabel, meters: f32) -> Self {
        self.known_sizes.insert(class, meters);
        self
    }

    #[inline]
    pub fn focal_length(&self) -> f32 {
        self.focal_length
    }

    pub fn estimate(&self, class: &ClassLabel, bbox: &BBox<Ltrb>) -> Option<f32> {
        let size = self.known_sizes.get(class)?;
        let pixels = bbox.height();

        if pixels > 0.0 && pixels.is_finite() {
            Some(size * self.focal_length / pixels)
        } else {
            None
        }
    }
}
