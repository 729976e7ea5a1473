use crate::error::Error;
use ndarray::prelude::*;

/// A rendered perspective view, `height x width x channels`.
pub type ViewImage = Array3<u8>;

/// One decoded equirectangular frame, `height x width x channels`.
#[derive(Debug, Clone)]
pub struct SphericalFrame {
    pixels: Array3<u8>,
}

impl SphericalFrame {
    pub fn new(pixels: Array3<u8>) -> Result<Self, Error> {
        let (h, w, c) = pixels.dim();
        if h == 0 || w == 0 || c == 0 {
            return Err(Error::config(format!(
                "degenerate spherical frame {}x{}x{}",
                w, h, c
            )));
        }

        Ok(Self { pixels })
    }

    /// Wraps a tightly packed interleaved buffer.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, Error> {
        let pixels = Array3::from_shape_vec((height, width, channels), data)
            .map_err(|e| Error::config(format!("bad frame buffer: {}", e)))?;

        Self::new(pixels)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    /// `(width, height)` of the sphere, the key mapping tables are built for.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    #[inline]
    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }
}
