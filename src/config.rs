use crate::detector::DetectorConfig;
use crate::error::Error;
use crate::projection::ViewSpec;
use crate::sampler::NamedView;
use crate::smoother::SmoothingConfig;
use crate::strategy::ExecutionStrategy;

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to set a pipeline up. Missing JSON fields take defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Detection views, rendered in this order.
    pub views: Vec<NamedView>,
    /// View shown until the first goalkeeper is found.
    pub default_view: String,
    /// Field of view in degrees, shared by detection views and output.
    pub fov: f32,
    /// `(width, height)` of every rendered view.
    pub output_size: (usize, usize),
    pub strategy: ExecutionStrategy,
    pub max_workers: usize,
    pub smoothing: SmoothingConfig,
    pub detector: DetectorConfig,
    /// Focal length in pixels for distance estimates; derived from the view if unset.
    pub focal_length: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            views: vec![
                NamedView::new("front", 0.0, 0.0),
                NamedView::new("right", 90.0, 0.0),
                NamedView::new("back", 180.0, 0.0),
                NamedView::new("left", 270.0, 0.0),
            ],
            default_view: "front".into(),
            fov: 90.0,
            output_size: (640, 480),
            strategy: ExecutionStrategy::Accelerated,
            max_workers: 6,
            smoothing: SmoothingConfig::default(),
            detector: DetectorConfig::default(),
            focal_length: None,
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Setup time checks; per-view checks are repeated by the sampler.
    pub fn validate(&self) -> Result<(), Error> {
        if self.views.is_empty() {
            return Err(Error::config("view set is empty"));
        }

        ViewSpec::new(0.0, 0.0, self.fov, self.output_size).validate()?;

        if !self.views.iter().any(|v| v.name == self.default_view) {
            return Err(Error::UnknownView(self.default_view.clone()));
        }

        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be at least 1"));
        }

        let s = &self.smoothing;
        if !(0.0..1.0).contains(&s.smoothing_factor) {
            return Err(Error::config(format!(
                "smoothing_factor must be in [0, 1), got {}",
                s.smoothing_factor
            )));
        }

        if !(s.max_yaw_change >= 0.0 && s.max_pitch_change >= 0.0) {
            return Err(Error::config("max angle changes must be non-negative"));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(Error::config(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.detector.confidence_threshold
            )));
        }

        if let Some(f) = self.focal_length {
            if !(f > 0.0 && f.is_finite()) {
                return Err(Error::config(format!("bad focal length {}", f)));
            }
        }

        Ok(())
    }
}
