//! Goalkeeper-following perspective camera for spherical video.
//!
//! Each [`SphericalFrame`] is sampled into a few fixed perspective views, the
//! views go through an external [`Detector`], the detections are placed back
//! on the sphere, a goalkeeper (pulled a little towards the ball) is chosen,
//! the aim is smoothed and a single perspective frame is rendered around it.

pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod distance;
pub mod error;
pub mod frame;
pub mod math;
pub mod pipeline;
pub mod projection;
pub mod sampler;
pub mod selector;
pub mod smoother;
pub mod strategy;

pub use config::Config;
pub use detection::{ClassLabel, Detection, RawDetection};
pub use detector::{Detector, DetectorConfig, ReplayDetector};
pub use error::Error;
pub use frame::{SphericalFrame, ViewImage};
pub use pipeline::{FrameOutput, GoalkeeperPipeline, OutputSource};
pub use projection::{compute_mapping, inverse_map, render_at, render_view, MappingTable, ViewSpec};
pub use sampler::{MultiViewSampler, NamedView};
pub use selector::TrackingResult;
pub use smoother::{CameraSmoother, CameraState, SmoothingConfig};
pub use strategy::{ExecutionStrategy, RenderStrategy};
