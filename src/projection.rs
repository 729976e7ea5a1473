//! Equirectangular to perspective projection.
//!
//! A view looks along `+z` with `+y` up and `+x` to the right. Its ray grid is
//! rotated by `R = R_yaw * R_pitch`, i.e. the pitch rotation (about `x`) is
//! applied to each ray first and the yaw rotation (about `y`) second. With this
//! composition a positive pitch tilts the view towards the lower half of the
//! sphere. The resulting direction is converted to longitude/latitude and then
//! to source pixel coordinates of the spherical frame.

use crate::error::Error;
use crate::frame::{SphericalFrame, ViewImage};
use crate::math::{clamp_pitch, linspace, normalize_yaw, wrap_index};

use nalgebra as na;
use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Direction, field of view (degrees) and output resolution of a perspective view.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ViewSpec {
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub width: usize,
    pub height: usize,
}

impl ViewSpec {
    pub fn new(yaw: f32, pitch: f32, fov: f32, (width, height): (usize, usize)) -> Self {
        Self {
            yaw,
            pitch,
            fov,
            width,
            height,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        // The ray grid spans both view edges, so each axis needs two samples.
        if self.width < 2 || self.height < 2 {
            return Err(Error::config(format!(
                "degenerate view size {}x{}",
                self.width, self.height
            )));
        }

        if !self.fov.is_finite() || self.fov <= 0.0 || self.fov >= 180.0 {
            return Err(Error::config(format!(
                "field of view must be in (0, 180) degrees, got {}",
                self.fov
            )));
        }

        if !self.yaw.is_finite() || !self.pitch.is_finite() {
            return Err(Error::config("view angles must be finite"));
        }

        if clamp_pitch(self.pitch) != self.pitch {
            return Err(Error::config(format!(
                "pitch must be in [-90, 90] degrees, got {}",
                self.pitch
            )));
        }

        Ok(())
    }

    /// Sub-pixel center of the output image.
    #[inline]
    pub fn center_pixel(&self) -> (f32, f32) {
        (
            (self.width as f32 - 1.0) / 2.0,
            (self.height as f32 - 1.0) / 2.0,
        )
    }

    #[inline]
    fn focal_z(&self) -> f64 {
        1.0 / (f64::from(self.fov).to_radians() / 2.0).tan()
    }

    fn rotation(&self) -> na::Rotation3<f64> {
        let yaw = na::Rotation3::from_axis_angle(&na::Vector3::y_axis(), f64::from(self.yaw).to_radians());
        let pitch =
            na::Rotation3::from_axis_angle(&na::Vector3::x_axis(), f64::from(self.pitch).to_radians());

        yaw * pitch
    }
}

/// Per output pixel source coordinates for one view at one sphere resolution.
///
/// Built once, then shared read-only between renders.
#[derive(Debug, Clone)]
pub struct MappingTable {
    sphere: (usize, usize),
    view: ViewSpec,
    u: Array2<f32>,
    v: Array2<f32>,
}

impl MappingTable {
    /// `(width, height)` of the spherical frames this table is valid for.
    #[inline]
    pub fn sphere_shape(&self) -> (usize, usize) {
        self.sphere
    }

    #[inline]
    pub fn view(&self) -> &ViewSpec {
        &self.view
    }

    /// Horizontal source coordinates, `height x width` of the view.
    #[inline]
    pub fn u(&self) -> ArrayView2<'_, f32> {
        self.u.view()
    }

    /// Vertical source coordinates, `height x width` of the view.
    #[inline]
    pub fn v(&self) -> ArrayView2<'_, f32> {
        self.v.view()
    }

    #[inline]
    pub fn matches(&self, frame: &SphericalFrame) -> bool {
        self.sphere == frame.shape()
    }

    pub(crate) fn check(&self, frame: &SphericalFrame) -> Result<(), Error> {
        if self.matches(frame) {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: self.sphere,
                actual: frame.shape(),
            })
        }
    }
}

/// Rotated ray for the normalized image point `(x, y)` as `(lon, lat)` in radians.
#[inline]
fn ray_to_lonlat(rot: &na::Rotation3<f64>, x: f64, y: f64, z: f64) -> (f64, f64) {
    let ray = rot * na::Vector3::new(x, y, z).normalize();

    (ray.x.atan2(ray.z), ray.y.clamp(-1.0, 1.0).asin())
}

pub fn compute_mapping(sphere: (usize, usize), view: &ViewSpec) -> Result<MappingTable, Error> {
    let (sw, sh) = sphere;
    if sw == 0 || sh == 0 {
        return Err(Error::config(format!("degenerate sphere size {}x{}", sw, sh)));
    }
    view.validate()?;

    let rot = view.rotation();
    let z = view.focal_z();
    let (sw, sh) = (sw as f64, sh as f64);

    let xs: Vec<f64> = linspace(-1.0, 1.0, view.width).collect();
    let mut u = Array2::zeros((view.height, view.width));
    let mut v = Array2::zeros((view.height, view.width));

    for (row, y) in linspace(1.0, -1.0, view.height).enumerate() {
        for (col, &x) in xs.iter().enumerate() {
            let (lon, lat) = ray_to_lonlat(&rot, x, y, z);

            u[[row, col]] = ((lon / PI + 1.0) / 2.0 * sw) as f32;
            v[[row, col]] = ((0.5 - lat / PI) * sh) as f32;
        }
    }

    Ok(MappingTable {
        sphere,
        view: *view,
        u,
        v,
    })
}

/// Bilinear sample at `(u, v)`, wrapping horizontally and clamping vertically.
#[inline]
fn sample_bilinear(src: &ArrayView3<'_, u8>, u: f32, v: f32, mut dst: ArrayViewMut1<'_, u8>) {
    let (h, w, _) = src.dim();

    let x0 = u.floor();
    let y0 = v.floor();
    let ax = u - x0;
    let ay = v - y0;

    let x0 = x0 as i64;
    let y0 = y0 as i64;
    let (c0, c1) = (wrap_index(x0, w), wrap_index(x0 + 1, w));
    let max_row = h as i64 - 1;
    let (r0, r1) = (y0.clamp(0, max_row) as usize, (y0 + 1).clamp(0, max_row) as usize);

    for (ch, px) in dst.iter_mut().enumerate() {
        let top = f32::from(src[[r0, c0, ch]]) * (1.0 - ax) + f32::from(src[[r0, c1, ch]]) * ax;
        let bottom = f32::from(src[[r1, c0, ch]]) * (1.0 - ax) + f32::from(src[[r1, c1, ch]]) * ax;

        *px = (top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8;
    }
}

pub fn render_view(frame: &SphericalFrame, table: &MappingTable) -> Result<ViewImage, Error> {
    table.check(frame)?;

    let src = frame.pixels();
    let (h, w) = table.u.dim();
    let mut out = Array3::zeros((h, w, frame.channels()));

    for row in 0..h {
        for col in 0..w {
            sample_bilinear(
                &src,
                table.u[[row, col]],
                table.v[[row, col]],
                out.slice_mut(s![row, col, ..]),
            );
        }
    }

    Ok(out)
}

/// Renders a single view for an arbitrary direction with a freshly computed table.
pub fn render_at(
    frame: &SphericalFrame,
    yaw: f32,
    pitch: f32,
    fov: f32,
    size: (usize, usize),
) -> Result<ViewImage, Error> {
    let view = ViewSpec::new(yaw, pitch, fov, size);
    let table = compute_mapping(frame.shape(), &view)?;

    render_view(frame, &table)
}

/// Global `(yaw, pitch)` in degrees of a pixel inside a rendered view.
///
/// Shares the frustum and rotation of [`compute_mapping`], so the view's
/// center pixel maps back onto `(view.yaw, view.pitch)`, yaw normalized.
pub fn inverse_map((px, py): (f32, f32), view: &ViewSpec) -> (f32, f32) {
    let ndc = |p: f32, n: usize| 2.0 * f64::from(p) / (n.max(2) - 1) as f64 - 1.0;

    let x = ndc(px, view.width);
    let y = -ndc(py, view.height);
    let (lon, lat) = ray_to_lonlat(&view.rotation(), x, y, view.focal_z());

    (
        normalize_yaw(lon.to_degrees()) as f32,
        clamp_pitch(-lat.to_degrees()) as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gradient_frame(w: usize, h: usize) -> SphericalFrame {
        let pixels = Array3::from_shape_fn((h, w, 3), |(r, c, ch)| match ch {
            0 => (c * 255 / (w - 1)) as u8,
            1 => (r * 255 / (h - 1)) as u8,
            _ => 128,
        });

        SphericalFrame::new(pixels).unwrap()
    }

    #[test]
    fn view_centers_invert_to_their_own_direction() {
        let dirs = [
            (0.0, 0.0),
            (90.0, 0.0),
            (180.0, 0.0),
            (270.0, 0.0),
            (45.0, 30.0),
            (-120.0, -45.0),
        ];

        for &(yaw, pitch) in &dirs {
            for &size in &[(640, 480), (641, 481), (64, 48)] {
                let view = ViewSpec::new(yaw, pitch, 90.0, size);
                let (y, p) = inverse_map(view.center_pixel(), &view);

                assert_abs_diff_eq!(y, normalize_yaw(yaw), epsilon = 1e-3);
                assert_abs_diff_eq!(p, pitch, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn front_view_center_hits_middle_of_sphere() {
        let view = ViewSpec::new(0.0, 0.0, 90.0, (65, 49));
        let table = compute_mapping((400, 200), &view).unwrap();

        assert_abs_diff_eq!(table.u()[[24, 32]], 200.0, epsilon = 1e-3);
        assert_abs_diff_eq!(table.v()[[24, 32]], 100.0, epsilon = 1e-3);
        // Top row samples above the horizon, left column west of center.
        assert!(table.v()[[0, 32]] < 100.0);
        assert!(table.u()[[24, 0]] < 200.0);
        // The horizontal edge of a 90 degree view sits 45 degrees off axis.
        assert_abs_diff_eq!(table.u()[[24, 0]], 150.0, epsilon = 1e-3);
    }

    #[test]
    fn positive_pitch_looks_below_the_horizon() {
        let view = ViewSpec::new(0.0, 30.0, 90.0, (33, 33));
        let table = compute_mapping((360, 180), &view).unwrap();

        // lat = -30 degrees -> v = (0.5 + 30/180) * 180
        assert_abs_diff_eq!(table.v()[[16, 16]], 120.0, epsilon = 1e-3);
    }

    #[test]
    fn rotation_order_is_pitch_then_yaw() {
        // Corner ray of a yawed and pitched view differs between R_yaw*R_pitch
        // and R_pitch*R_yaw; pin the former.
        let view = ViewSpec::new(90.0, 30.0, 90.0, (3, 3));
        let table = compute_mapping((360, 180), &view).unwrap();

        let z = 1.0 / (45.0f64.to_radians()).tan();
        let ray = na::Vector3::new(-1.0, 1.0, z).normalize();
        let (s, c) = 30.0f64.to_radians().sin_cos();
        let pitched = na::Vector3::new(ray.x, c * ray.y - s * ray.z, s * ray.y + c * ray.z);
        let yawed = na::Vector3::new(pitched.z, pitched.y, -pitched.x);
        let lon = yawed.x.atan2(yawed.z);
        let lat = yawed.y.asin();

        assert_abs_diff_eq!(table.u()[[0, 0]], ((lon / PI + 1.0) / 2.0 * 360.0) as f32, epsilon = 1e-3);
        assert_abs_diff_eq!(table.v()[[0, 0]], ((0.5 - lat / PI) * 180.0) as f32, epsilon = 1e-3);
    }

    #[test]
    fn mapping_is_deterministic() {
        let view = ViewSpec::new(33.0, -12.0, 75.0, (40, 30));
        let a = compute_mapping((256, 128), &view).unwrap();
        let b = compute_mapping((256, 128), &view).unwrap();

        assert_eq!(a.u(), b.u());
        assert_eq!(a.v(), b.v());
    }

    #[test]
    fn degenerate_inputs_are_config_errors() {
        let ok = ViewSpec::new(0.0, 0.0, 90.0, (10, 10));
        assert!(matches!(compute_mapping((0, 10), &ok), Err(Error::Config(_))));
        assert!(matches!(compute_mapping((10, 0), &ok), Err(Error::Config(_))));

        for bad in [
            ViewSpec::new(0.0, 0.0, 0.0, (10, 10)),
            ViewSpec::new(0.0, 0.0, 180.0, (10, 10)),
            ViewSpec::new(0.0, 0.0, -5.0, (10, 10)),
            ViewSpec::new(0.0, 0.0, 90.0, (0, 10)),
            ViewSpec::new(0.0, 0.0, 90.0, (10, 0)),
            ViewSpec::new(40.0, 0.0, 90.0, (1, 10)),
            ViewSpec::new(40.0, 0.0, 90.0, (10, 1)),
            ViewSpec::new(0.0, 91.0, 90.0, (10, 10)),
        ] {
            assert!(matches!(compute_mapping((10, 10), &bad), Err(Error::Config(_))));
        }
    }

    #[test]
    fn seam_columns_are_adjacent() {
        // A view aimed at the back straddles the seam: its center column
        // lands on u == width, its neighbours on either side of the wrap.
        let view = ViewSpec::new(180.0, 0.0, 90.0, (65, 49));
        let table = compute_mapping((400, 200), &view).unwrap();

        let left = table.u()[[24, 31]];
        let right = table.u()[[24, 33]];
        assert!(left > 390.0 && left <= 400.0, "{}", left);
        assert!(right >= 0.0 && right < 10.0, "{}", right);

        // Sampling across the seam blends the last and first columns.
        let mut pixels = Array3::zeros((4, 8, 1));
        pixels.slice_mut(s![.., 0, ..]).fill(200);
        pixels.slice_mut(s![.., 7, ..]).fill(100);
        let frame = SphericalFrame::new(pixels).unwrap();

        let mut out = Array1::zeros(1);
        sample_bilinear(&frame.pixels(), 7.5, 1.0, out.view_mut());
        assert_eq!(out[0], 150);
        sample_bilinear(&frame.pixels(), -0.5, 1.0, out.view_mut());
        assert_eq!(out[0], 150);
    }

    #[test]
    fn poles_clamp_vertically() {
        let mut pixels = Array3::zeros((4, 8, 1));
        pixels.slice_mut(s![0, .., ..]).fill(10);
        pixels.slice_mut(s![3, .., ..]).fill(240);
        let frame = SphericalFrame::new(pixels).unwrap();

        let mut out = Array1::zeros(1);
        sample_bilinear(&frame.pixels(), 2.0, -3.0, out.view_mut());
        assert_eq!(out[0], 10);
        sample_bilinear(&frame.pixels(), 2.0, 4.0, out.view_mut());
        assert_eq!(out[0], 240);
    }

    #[test]
    fn render_view_has_view_resolution() {
        let frame = gradient_frame(128, 64);
        let view = ViewSpec::new(0.0, 0.0, 90.0, (32, 24));
        let table = compute_mapping(frame.shape(), &view).unwrap();

        let img = render_view(&frame, &table).unwrap();
        assert_eq!(img.dim(), (24, 32, 3));

        // Red grows left to right, green top to bottom.
        assert!(img[[12, 0, 0]] < img[[12, 31, 0]]);
        assert!(img[[0, 16, 1]] < img[[23, 16, 1]]);
        assert_eq!(img[[12, 16, 2]], 128);
    }

    #[test]
    fn render_rejects_foreign_resolution() {
        let frame = gradient_frame(128, 64);
        let table = compute_mapping((256, 128), &ViewSpec::new(0.0, 0.0, 90.0, (8, 8))).unwrap();

        assert!(matches!(
            render_view(&frame, &table),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn render_at_matches_explicit_table() {
        let frame = gradient_frame(128, 64);
        let view = ViewSpec::new(-60.0, 10.0, 70.0, (20, 16));
        let table = compute_mapping(frame.shape(), &view).unwrap();

        assert_eq!(
            render_at(&frame, -60.0, 10.0, 70.0, (20, 16)).unwrap(),
            render_view(&frame, &table).unwrap()
        );
    }
}
