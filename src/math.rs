use num_traits::Float;

/// Wraps a yaw angle in degrees into (-180, 180].
pub fn normalize_yaw<F: Float>(yaw: F) -> F {
    let full = F::from(360.0).unwrap();
    let half = F::from(180.0).unwrap();

    let mut y = yaw % full;
    if y <= -half {
        y = y + full;
    } else if y > half {
        y = y - full;
    }

    y
}

#[inline]
pub fn clamp_pitch<F: Float>(pitch: F) -> F {
    let limit = F::from(90.0).unwrap();
    pitch.max(-limit).min(limit)
}

/// Linear blend `a * (1 - w) + b * w`.
#[inline]
pub fn lerp<F: Float>(a: F, b: F, w: F) -> F {
    a * (F::one() - w) + b * w
}

/// `n` evenly spaced samples over `[start, end]`, endpoints included.
pub fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (end - start) / (n - 1) as f64
    } else {
        0.0
    };

    (0..n).map(move |i| start + step * i as f64)
}

/// Floor modulo, always in `0..n`.
#[inline]
pub fn wrap_index(i: i64, n: usize) -> usize {
    i.rem_euclid(n as i64) as usize
}
