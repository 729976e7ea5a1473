use crate::detection::{ClassLabel, RawDetection};
use crate::error::Error;

use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Object detector run on every rendered view.
///
/// Boxes are returned in the pixel space of the image passed in.
pub trait Detector {
    /// Called once before the views of frame `index` are handed out.
    fn begin_frame(&mut self, _index: u64) {}

    fn detect(&mut self, view: &str, image: ArrayView3<'_, u8>) -> Result<Vec<RawDetection>, Error>;
}

impl<F> Detector for F
where
    F: FnMut(&str, ArrayView3<'_, u8>) -> Result<Vec<RawDetection>, Error>,
{
    fn detect(&mut self, view: &str, image: ArrayView3<'_, u8>) -> Result<Vec<RawDetection>, Error> {
        self(view, image)
    }
}

/// Which raw detections enter selection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Detections must be strictly more confident than this.
    pub confidence_threshold: f32,
    pub classes: Vec<ClassLabel>,
}

impl DetectorConfig {
    pub fn new(confidence_threshold: f32, classes: Vec<ClassLabel>) -> Self {
        Self {
            confidence_threshold,
            classes,
        }
    }

    #[inline]
    pub fn accepts(&self, det: &RawDetection) -> bool {
        det.confidence > self.confidence_threshold && self.classes.contains(&det.class)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new(0.75, vec![ClassLabel::Person, ClassLabel::Ball])
    }
}

/// Plays back detections recorded per frame and view.
///
/// One record per line, `<frame>:<view>:<json array of RawDetection>`. Lines
/// that are empty or start with `#` are skipped; views without a record yield
/// no detections.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    records: HashMap<(u64, String), Vec<RawDetection>>,
    frame: u64,
}

impl ReplayDetector {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut records = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let bad = || Error::Detector(format!("malformed record on line {}", lineno + 1));
            let mut parts = line.splitn(3, ':');
            let frame = parts
                .next()
                .and_then(|f| f.trim().parse::<u64>().ok())
                .ok_or_else(bad)?;
            let view = parts.next().ok_or_else(bad)?.trim().to_string();
            let dets: Vec<RawDetection> = serde_json::from_str(parts.next().ok_or_else(bad)?)?;

            records
                .entry((frame, view))
                .or_insert_with(Vec::new)
                .extend(dets);
        }

        Ok(Self { records, frame: 0 })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn begin_frame(&mut self, index: u64) {
        self.frame = index;
    }

    fn detect(&mut self, view: &str, _image: ArrayView3<'_, u8>) -> Result<Vec<RawDetection>, Error> {
        Ok(self
            .records
            .get(&(self.frame, view.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
