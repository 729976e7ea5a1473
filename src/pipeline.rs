//! Per-frame driver: views, detection, selection, smoothing, output render.

use crate::config::Config;
use crate::detection::Detection;
use crate::detector::{Detector, DetectorConfig};
use crate::distance::DistanceEstimator;
use crate::error::Error;
use crate::frame::{SphericalFrame, ViewImage};
use crate::projection::{render_at, ViewSpec};
use crate::sampler::MultiViewSampler;
use crate::selector::{self, TrackingResult};
use crate::smoother::{CameraSmoother, CameraState};

use tracing::debug;

/// Where a frame's output image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    /// Aimed at this frame's goalkeeper.
    Tracked,
    /// No goalkeeper this frame, the previous aim was held.
    HeldAim,
    /// No goalkeeper seen yet, the default detection view was used.
    DefaultView,
}

#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub image: ViewImage,
    pub source: OutputSource,
    pub camera: Option<CameraState>,
    pub tracking: Option<TrackingResult>,
    pub detections: Vec<Detection>,
}

/// Turns spherical frames into a goalkeeper-following perspective stream.
///
/// Owns the only cross-frame state, the camera aim. Exactly one output image
/// is produced per input frame.
pub struct GoalkeeperPipeline {
    sampler: MultiViewSampler,
    smoother: CameraSmoother,
    filter: DetectorConfig,
    estimator: DistanceEstimator,
    fov: f32,
    output_size: (usize, usize),
    default_view: String,
    camera: Option<CameraState>,
    frame_index: u64,
}

impl GoalkeeperPipeline {
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let sampler = MultiViewSampler::new(
            &config.views,
            config.output_size,
            config.fov,
            config.strategy,
            config.max_workers,
        )?;

        let estimator = match config.focal_length {
            Some(f) => DistanceEstimator::new(f),
            None => DistanceEstimator::for_view(&ViewSpec::new(
                0.0,
                0.0,
                config.fov,
                config.output_size,
            )),
        };

        Ok(Self {
            sampler,
            smoother: CameraSmoother::new(config.smoothing),
            filter: config.detector.clone(),
            estimator,
            fov: config.fov,
            output_size: config.output_size,
            default_view: config.default_view.clone(),
            camera: None,
            frame_index: 0,
        })
    }

    #[inline]
    pub fn camera(&self) -> Option<CameraState> {
        self.camera
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn sampler(&self) -> &MultiViewSampler {
        &self.sampler
    }

    /// Forgets the aim, the next frame without a goalkeeper shows the default view.
    pub fn reset(&mut self) {
        self.camera = None;
    }

    /// Runs the detector over `views` and places accepted boxes on the sphere.
    fn locate<D: Detector + ?Sized>(
        &self,
        views: &[(String, ViewImage)],
        detector: &mut D,
    ) -> Result<Vec<Detection>, Error> {
        let mut located = Vec::new();

        for (name, image) in views {
            let spec = self
                .sampler
                .view(name)
                .ok_or_else(|| Error::UnknownView(name.clone()))?;

            for raw in detector.detect(name, image.view())? {
                if self.filter.accepts(&raw) {
                    located.push(Detection::locate(raw, name, spec, &self.estimator));
                }
            }
        }

        Ok(located)
    }

    /// Output render for an aim. Pitch is negated here, relative to the
    /// detection angles.
    fn render_aim(&self, frame: &SphericalFrame, aim: CameraState) -> Result<ViewImage, Error> {
        render_at(frame, aim.yaw, -aim.pitch, self.fov, self.output_size)
    }

    pub fn process<D: Detector + ?Sized>(
        &mut self,
        frame: &SphericalFrame,
        detector: &mut D,
    ) -> Result<FrameOutput, Error> {
        let index = self.frame_index;

        self.sampler.precompute(frame.shape())?;
        let mut views = self.sampler.render_all(frame)?;

        detector.begin_frame(index);
        let detections = self.locate(&views, detector)?;
        let tracking = selector::track(&detections);

        let (image, source) = match (&tracking, self.camera) {
            (Some(result), previous) => {
                let aim = self
                    .smoother
                    .step(CameraState::new(result.yaw, result.pitch), previous);
                self.camera = Some(aim);

                debug!(
                    "Frame {}: goalkeeper in {} view, aiming at yaw {:.1} pitch {:.1}",
                    index, result.detection.view, aim.yaw, aim.pitch
                );

                (self.render_aim(frame, aim)?, OutputSource::Tracked)
            }

            (None, Some(aim)) => {
                debug!(
                    "Frame {}: no goalkeeper, holding yaw {:.1} pitch {:.1}",
                    index, aim.yaw, aim.pitch
                );

                (self.render_aim(frame, aim)?, OutputSource::HeldAim)
            }

            (None, None) => {
                debug!(
                    "Frame {}: no goalkeeper, showing {} view",
                    index, self.default_view
                );

                let pos = views
                    .iter()
                    .position(|(name, _)| *name == self.default_view)
                    .ok_or_else(|| Error::UnknownView(self.default_view.clone()))?;

                (views.swap_remove(pos).1, OutputSource::DefaultView)
            }
        };

        self.frame_index += 1;

        Ok(FrameOutput {
            image,
            source,
            camera: self.camera,
            tracking,
            detections,
        })
    }
}
