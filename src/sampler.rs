use crate::error::Error;
use crate::frame::{SphericalFrame, ViewImage};
use crate::projection::{compute_mapping, MappingTable, ViewSpec};
use crate::strategy::{select_strategy, ExecutionStrategy, RenderStrategy};

use serde_derive::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Named fixed direction sampled from every frame for detection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamedView {
    pub name: String,
    pub yaw: f32,
    pub pitch: f32,
}

impl NamedView {
    pub fn new<S: ToString>(name: S, yaw: f32, pitch: f32) -> Self {
        Self {
            name: name.to_string(),
            yaw,
            pitch,
        }
    }
}

struct TableCache {
    shape: (usize, usize),
    tables: Vec<Arc<MappingTable>>,
}

/// Renders a configured set of perspective views out of spherical frames.
///
/// Mapping tables are cached for one sphere resolution at a time. Rendering a
/// frame of any other resolution fails with [`Error::NotReady`] until
/// [`MultiViewSampler::precompute`] has run for it.
pub struct MultiViewSampler {
    names: Vec<String>,
    specs: Vec<ViewSpec>,
    strategy: Box<dyn RenderStrategy>,
    cache: Option<TableCache>,
}

impl MultiViewSampler {
    pub fn new(
        views: &[NamedView],
        output_size: (usize, usize),
        fov: f32,
        preference: ExecutionStrategy,
        max_workers: usize,
    ) -> Result<Self, Error> {
        if views.is_empty() {
            return Err(Error::config("view set is empty"));
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(views.len());
        let mut specs = Vec::with_capacity(views.len());

        for view in views {
            if view.name.is_empty() {
                return Err(Error::config("view name is empty"));
            }

            if !seen.insert(view.name.as_str()) {
                return Err(Error::config(format!("duplicate view name {:?}", view.name)));
            }

            let spec = ViewSpec::new(view.yaw, view.pitch, fov, output_size);
            spec.validate()
                .map_err(|e| Error::config(format!("view {:?}: {}", view.name, e)))?;

            names.push(view.name.clone());
            specs.push(spec);
        }

        let strategy = select_strategy(preference, views.len(), max_workers)?;

        Ok(Self {
            names,
            specs,
            strategy,
            cache: None,
        })
    }

    /// Builds the mapping tables for `shape` (`width, height`); no-op if cached.
    pub fn precompute(&mut self, shape: (usize, usize)) -> Result<(), Error> {
        if self.is_ready(shape) {
            return Ok(());
        }

        debug!(
            "Precomputing {} mapping tables for {}x{}",
            self.specs.len(),
            shape.0,
            shape.1
        );

        let tables = self
            .specs
            .iter()
            .map(|spec| compute_mapping(shape, spec).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        self.cache = Some(TableCache { shape, tables });

        Ok(())
    }

    #[inline]
    pub fn is_ready(&self, shape: (usize, usize)) -> bool {
        matches!(&self.cache, Some(c) if c.shape == shape)
    }

    /// Renders every view of `frame`, in configuration order.
    pub fn render_all(&self, frame: &SphericalFrame) -> Result<Vec<(String, ViewImage)>, Error> {
        let tables = match &self.cache {
            Some(c) if c.shape == frame.shape() => &c.tables,
            _ => {
                return Err(Error::NotReady {
                    width: frame.width(),
                    height: frame.height(),
                })
            }
        };

        let images = self.strategy.render(frame, tables)?;

        Ok(self.names.iter().cloned().zip(images).collect())
    }

    /// Cached table for `name` at the current resolution.
    pub fn table(&self, name: &str) -> Option<Arc<MappingTable>> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.cache.as_ref().map(|c| c.tables[idx].clone())
    }

    pub fn view(&self, name: &str) -> Option<&ViewSpec> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.specs.get(idx)
    }

    pub fn views(&self) -> impl Iterator<Item = (&str, &ViewSpec)> {
        self.names.iter().map(String::as_str).zip(self.specs.iter())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    #[inline]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}
