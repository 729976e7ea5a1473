//! Rate-limited exponential smoothing of the camera aim.

use serde_derive::{Deserialize, Serialize};

/// Aim of the output camera in degrees, carried from one frame to the next.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub yaw: f32,
    pub pitch: f32,
}

impl CameraState {
    #[inline]
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    pub max_yaw_change: f32,
    pub max_pitch_change: f32,
    /// Share of the previous aim kept each frame, in `[0, 1)`.
    pub smoothing_factor: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            max_yaw_change: 15.0,
            max_pitch_change: 10.0,
            smoothing_factor: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CameraSmoother {
    config: SmoothingConfig,
}

impl CameraSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Next aim towards `target`.
    ///
    /// Without a previous aim the target is returned as is. Otherwise each axis
    /// moves by the clamped difference scaled by `1 - smoothing_factor`. Yaw is
    /// not unwrapped, a jump across the seam is clamped like any other.
    pub fn step(&self, target: CameraState, previous: Option<CameraState>) -> CameraState {
        let prev = match previous {
            Some(prev) => prev,
            None => return target,
        };

        let cfg = &self.config;
        let keep = 1.0 - cfg.smoothing_factor;

        let dyaw = (target.yaw - prev.yaw).clamp(-cfg.max_yaw_change, cfg.max_yaw_change);
        let dpitch = (target.pitch - prev.pitch).clamp(-cfg.max_pitch_change, cfg.max_pitch_change);

        CameraState {
            yaw: prev.yaw + dyaw * keep,
            pitch: prev.pitch + dpitch * keep,
        }
    }
}
