use crate::error::Error;
use crate::frame::{SphericalFrame, ViewImage};
use crate::projection::{render_view, MappingTable};

use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Renders every table against one frame, results in table order.
///
/// Implementations are interchangeable: the same frame and tables give the
/// same images up to resampling tolerance.
pub trait RenderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(
        &self,
        frame: &SphericalFrame,
        tables: &[Arc<MappingTable>],
    ) -> Result<Vec<ViewImage>, Error>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Accelerated,
    Parallel,
    Sequential,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::Accelerated
    }
}

#[derive(Debug, Default)]
pub struct Sequential;

impl RenderStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn render(
        &self,
        frame: &SphericalFrame,
        tables: &[Arc<MappingTable>],
    ) -> Result<Vec<ViewImage>, Error> {
        tables.iter().map(|t| render_view(frame, t)).collect()
    }
}

/// Fixed size worker pool, built once and reused for every frame.
pub struct Pooled {
    pool: rayon::ThreadPool,
}

impl Pooled {
    pub fn new(workers: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("gkview-render-{}", idx))
            .build()
            .map_err(|e| Error::config(format!("unable to start render pool: {}", e)))?;

        Ok(Self { pool })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl RenderStrategy for Pooled {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn render(
        &self,
        frame: &SphericalFrame,
        tables: &[Arc<MappingTable>],
    ) -> Result<Vec<ViewImage>, Error> {
        self.pool
            .install(|| tables.par_iter().map(|t| render_view(frame, t)).collect())
    }
}

#[cfg(feature = "opencv")]
mod cuda {
    use super::RenderStrategy;
    use crate::error::Error;
    use crate::frame::{SphericalFrame, ViewImage};
    use crate::projection::MappingTable;

    use ndarray::prelude::*;
    use opencv::{core, cudawarping, imgproc, prelude::*};
    use std::sync::{Arc, Mutex};

    /// Device copies of the mapping tables currently in use.
    struct DeviceMaps {
        tables: Vec<Arc<MappingTable>>,
        maps: Vec<(core::GpuMat, core::GpuMat)>,
    }

    impl DeviceMaps {
        fn matches(&self, tables: &[Arc<MappingTable>]) -> bool {
            self.tables.len() == tables.len()
                && self.tables.iter().zip(tables).all(|(a, b)| Arc::ptr_eq(a, b))
        }
    }

    /// OpenCV CUDA remap.
    ///
    /// The frame is uploaded with its first column repeated past the last one
    /// and remapped with `BORDER_REPLICATE`: horizontal reads wrap across the
    /// seam, vertical reads clamp at the poles, as on the CPU.
    pub struct CudaRemap {
        cache: Mutex<Option<DeviceMaps>>,
    }

    impl CudaRemap {
        pub fn probe() -> Option<Self> {
            match core::get_cuda_enabled_device_count() {
                Ok(count) if count > 0 => Some(CudaRemap {
                    cache: Mutex::new(None),
                }),
                _ => None,
            }
        }
    }

    fn upload_map(map: ArrayView2<'_, f32>) -> Result<core::GpuMat, Error> {
        let rows = map.nrows() as i32;
        let data = map.as_standard_layout();
        let data = data
            .as_slice()
            .ok_or_else(|| Error::config("mapping table not contiguous"))?;
        let mat = Mat::from_slice(data)?.reshape(1, rows)?;

        let mut gpu = core::GpuMat::default()?;
        gpu.upload(&mat)?;

        Ok(gpu)
    }

    /// Frame with column 0 appended as column `width`.
    fn upload_wrapped(frame: &SphericalFrame) -> Result<core::GpuMat, Error> {
        let pixels = frame.pixels();
        let wrapped = ndarray::concatenate(Axis(1), &[pixels.view(), pixels.slice(s![.., 0..1, ..])])
            .map_err(|e| Error::config(format!("unable to wrap frame: {}", e)))?;
        let bytes = wrapped
            .as_slice()
            .ok_or_else(|| Error::config("frame not contiguous"))?;

        let src = Mat::from_slice(bytes)?.reshape(frame.channels() as i32, frame.height() as i32)?;
        let mut gpu = core::GpuMat::default()?;
        gpu.upload(&src)?;

        Ok(gpu)
    }

    impl RenderStrategy for CudaRemap {
        fn name(&self) -> &'static str {
            "accelerated"
        }

        fn render(
            &self,
            frame: &SphericalFrame,
            tables: &[Arc<MappingTable>],
        ) -> Result<Vec<ViewImage>, Error> {
            for table in tables {
                table.check(frame)?;
            }

            let mut cache = self
                .cache
                .lock()
                .map_err(|_| Error::config("device map cache poisoned"))?;

            if !cache.as_ref().map_or(false, |c| c.matches(tables)) {
                let maps = tables
                    .iter()
                    .map(|t| Ok((upload_map(t.u())?, upload_map(t.v())?)))
                    .collect::<Result<Vec<_>, Error>>()?;

                *cache = Some(DeviceMaps {
                    tables: tables.to_vec(),
                    maps,
                });
            }

            let maps = cache
                .as_ref()
                .map(|c| &c.maps)
                .ok_or_else(|| Error::config("device maps missing"))?;

            let gpu_src = upload_wrapped(frame)?;
            let channels = frame.channels();
            let mut stream = core::Stream::default()?;

            tables
                .iter()
                .zip(maps)
                .map(|(table, (xmap, ymap))| {
                    let (h, w) = table.u().dim();

                    let mut gpu_dst = core::GpuMat::default()?;
                    cudawarping::remap(
                        &gpu_src,
                        &mut gpu_dst,
                        xmap,
                        ymap,
                        imgproc::INTER_LINEAR,
                        core::BORDER_REPLICATE,
                        core::Scalar::default(),
                        &mut stream,
                    )?;

                    let mut dst = Mat::default();
                    gpu_dst.download(&mut dst)?;

                    Array3::from_shape_vec((h, w, channels), dst.data_bytes()?.to_vec())
                        .map_err(|e| Error::config(format!("bad device output: {}", e)))
                })
                .collect()
        }
    }
}

#[cfg(feature = "opencv")]
fn probe_accelerator() -> Option<Box<dyn RenderStrategy>> {
    cuda::CudaRemap::probe().map(|s| Box::new(s) as Box<dyn RenderStrategy>)
}

#[cfg(not(feature = "opencv"))]
fn probe_accelerator() -> Option<Box<dyn RenderStrategy>> {
    None
}

/// Picks the strategy once, at configuration time.
///
/// A missing accelerator is not an error: the choice falls back to the pool
/// when more than one worker is allowed, otherwise to sequential rendering.
pub fn select_strategy(
    preference: ExecutionStrategy,
    views: usize,
    max_workers: usize,
) -> Result<Box<dyn RenderStrategy>, Error> {
    let workers = views.min(max_workers).max(1);

    if preference == ExecutionStrategy::Accelerated {
        if let Some(strategy) = probe_accelerator() {
            info!("Rendering views on CUDA device");
            return Ok(strategy);
        }

        warn!("No CUDA device available, falling back to CPU rendering");
    }

    if preference != ExecutionStrategy::Sequential && workers > 1 {
        info!("Rendering views on CPU with {} workers", workers);
        Ok(Box::new(Pooled::new(workers)?))
    } else {
        info!("Rendering views sequentially on CPU");
        Ok(Box::new(Sequential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{compute_mapping, ViewSpec};
    use ndarray::prelude::*;

    fn checker_frame() -> SphericalFrame {
        let pixels = Array3::from_shape_fn((90, 180, 3), |(r, c, ch)| {
            let cell = ((r / 9) + (c / 9)) % 2;
            (cell * 200 + ch * 20 + (c % 7)) as u8
        });

        SphericalFrame::new(pixels).unwrap()
    }

    fn tables(frame: &SphericalFrame) -> Vec<Arc<MappingTable>> {
        [(0.0, 0.0), (90.0, 0.0), (180.0, 0.0), (270.0, 0.0), (0.0, 60.0)]
            .iter()
            .map(|&(yaw, pitch)| {
                let view = ViewSpec::new(yaw, pitch, 90.0, (48, 36));
                Arc::new(compute_mapping(frame.shape(), &view).unwrap())
            })
            .collect()
    }

    fn max_abs_diff(a: &ViewImage, b: &ViewImage) -> u8 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (i16::from(*x) - i16::from(*y)).unsigned_abs() as u8)
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn strategies_agree() {
        let frame = checker_frame();
        let tables = tables(&frame);

        let reference = Sequential.render(&frame, &tables).unwrap();
        let pooled = Pooled::new(3).unwrap().render(&frame, &tables).unwrap();
        let selected = select_strategy(ExecutionStrategy::Accelerated, tables.len(), 4)
            .unwrap()
            .render(&frame, &tables)
            .unwrap();

        assert_eq!(reference.len(), tables.len());
        for ((a, b), c) in reference.iter().zip(&pooled).zip(&selected) {
            assert_eq!(a.dim(), (36, 48, 3));
            assert!(max_abs_diff(a, b) <= 1);
            assert!(max_abs_diff(a, c) <= 2);
        }
    }

    #[test]
    fn pool_size_is_bounded_by_views() {
        let s = select_strategy(ExecutionStrategy::Parallel, 2, 6).unwrap();
        assert_eq!(s.name(), "parallel");

        let s = select_strategy(ExecutionStrategy::Parallel, 4, 1).unwrap();
        assert_eq!(s.name(), "sequential");

        let s = select_strategy(ExecutionStrategy::Sequential, 4, 6).unwrap();
        assert_eq!(s.name(), "sequential");

        assert_eq!(Pooled::new(2).unwrap().workers(), 2);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn missing_accelerator_falls_back_to_cpu() {
        let s = select_strategy(ExecutionStrategy::Accelerated, 4, 6).unwrap();
        assert_eq!(s.name(), "parallel");

        let s = select_strategy(ExecutionStrategy::Accelerated, 1, 6).unwrap();
        assert_eq!(s.name(), "sequential");
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn device_remap_clamps_at_the_poles() {
        let accel = match cuda::CudaRemap::probe() {
            Some(accel) => accel,
            None => return,
        };

        // Bright zenith row, dark nadir row: a wrapping border would blend them.
        let pixels = Array3::from_shape_fn((90, 180, 3), |(r, c, _)| match r {
            0 => 255,
            89 => 0,
            _ => (c % 50) as u8 + 100,
        });
        let frame = SphericalFrame::new(pixels).unwrap();
        let nadir = vec![Arc::new(
            compute_mapping(frame.shape(), &ViewSpec::new(30.0, 60.0, 90.0, (48, 36))).unwrap(),
        )];

        let reference = Sequential.render(&frame, &nadir).unwrap();
        for _ in 0..2 {
            let device = accel.render(&frame, &nadir).unwrap();
            assert!(max_abs_diff(&reference[0], &device[0]) <= 1);
        }
    }

    #[test]
    fn tables_from_another_resolution_fail() {
        let frame = checker_frame();
        let view = ViewSpec::new(0.0, 0.0, 90.0, (8, 8));
        let other = vec![Arc::new(compute_mapping((360, 180), &view).unwrap())];

        assert!(Sequential.render(&frame, &other).is_err());
        assert!(Pooled::new(2).unwrap().render(&frame, &other).is_err());
    }
}
