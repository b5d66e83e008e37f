use glam::Vec3;

use crate::rng::RandomSource;

/// Lengths below this are treated as zero when normalizing or dividing.
pub const EPSILON: f32 = 1.0e-6;

/// Smooth interpolation - port of GLSL smoothstep
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span.abs() < EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// GLSL-style `mix(a, b, t)` for scalars.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Fraction of the remaining distance covered in `dt` by an exponential
/// approach with the given rate (per second).
#[inline]
pub fn approach_factor(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate.max(0.0) * dt.max(0.0)).exp()
}

/// Normalize `v`, or return `None` when it is too short to have a direction.
#[inline]
pub fn try_normalize(v: Vec3) -> Option<Vec3> {
    let len = v.length();
    if len > EPSILON && len.is_finite() {
        Some(v / len)
    } else {
        None
    }
}

/// Clamp the length of `v` to `max_len`.
#[inline]
pub fn clamp_length(v: Vec3, max_len: f32) -> Vec3 {
    let len = v.length();
    if len > max_len && len > EPSILON {
        v * (max_len / len)
    } else {
        v
    }
}

/// True when every component is finite.
#[inline]
pub fn is_finite_vec(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Uniform sample in [-1, 1].
#[inline]
pub fn signed_unit(rng: &mut dyn RandomSource) -> f32 {
    rng.next_f32() * 2.0 - 1.0
}

/// Uniform sample inside an axis-aligned box of the given half extent.
pub fn random_in_box(rng: &mut dyn RandomSource, half_extent: Vec3) -> Vec3 {
    Vec3::new(
        signed_unit(rng) * half_extent.x,
        signed_unit(rng) * half_extent.y,
        signed_unit(rng) * half_extent.z,
    )
}

/// Uniform sample inside a sphere of the given radius.
///
/// Direction from a normalized cube sample (retried a bounded number of
/// times), radius from the cube root of a uniform draw.
pub fn random_in_sphere(rng: &mut dyn RandomSource, radius: f32) -> Vec3 {
    random_unit_vector(rng) * rng.next_f32().cbrt() * radius
}

/// Random direction. Falls back to +X if every attempt lands near the origin.
pub fn random_unit_vector(rng: &mut dyn RandomSource) -> Vec3 {
    for _ in 0..8 {
        let v = Vec3::new(signed_unit(rng), signed_unit(rng), signed_unit(rng));
        let len2 = v.length_squared();
        if len2 > 1.0e-4 && len2 <= 1.0 {
            return v / len2.sqrt();
        }
    }
    Vec3::X
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRandom;

    #[test]
    fn test_try_normalize_rejects_zero() {
        assert!(try_normalize(Vec3::ZERO).is_none());
        assert!(try_normalize(Vec3::splat(f32::NAN)).is_none());
        let n = try_normalize(Vec3::new(3.0, 0.0, 4.0)).unwrap();
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_smoothstep_degenerate_edges() {
        assert_eq!(smoothstep(0.5, 0.5, 0.4), 0.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.6), 1.0);
    }

    #[test]
    fn test_random_in_sphere_inside() {
        let mut rng = SeededRandom::new(7);
        for _ in 0..500 {
            let p = random_in_sphere(&mut rng, 2.0);
            assert!(p.length() <= 2.0 + 1e-4, "sample outside sphere: {:?}", p);
        }
    }

    #[test]
    fn test_random_in_flat_box_keeps_z() {
        let mut rng = SeededRandom::new(3);
        for _ in 0..100 {
            let p = random_in_box(&mut rng, Vec3::new(1.0, 0.5, 0.0));
            assert_eq!(p.z, 0.0);
            assert!(p.x.abs() <= 1.0 && p.y.abs() <= 0.5);
        }
    }
}
