//! WGS84 geodetic, Earth-fixed (ECEF) and local East-North-Up conversions.
//!
//! The filter never works in curved coordinates: a `LocalFrame` anchored at
//! the reference origin maps GPS fixes into ENU meters and back.

use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

pub const WGS84_SEMI_MAJOR_AXIS_M: f64 = 6_378_137.0;
pub const WGS84_INVERSE_FLATTENING: f64 = 298.257_223_563;
pub const WGS84_FLATTENING: f64 = 1.0 / WGS84_INVERSE_FLATTENING;
pub const WGS84_FIRST_ECCENTRICITY_SQUARED: f64 =
    1.0 - (1.0 - WGS84_FLATTENING) * (1.0 - WGS84_FLATTENING);

const GEODETIC_ITERATIONS: usize = 6;

/// Geodetic coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lla {
    /// Longitude [degrees]
    pub lon_deg: f64,
    /// Latitude [degrees]
    pub lat_deg: f64,
    /// Height above the ellipsoid [meters]
    pub alt_m: f64,
}

impl Lla {
    pub fn new(lon_deg: f64, lat_deg: f64, alt_m: f64) -> Self {
        Self {
            lon_deg,
            lat_deg,
            alt_m,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lon_deg.is_finite() && self.lat_deg.is_finite() && self.alt_m.is_finite()
    }
}

/// Prime vertical radius of curvature at geodetic latitude `lat_rad`
fn prime_vertical_radius(lat_rad: f64) -> f64 {
    let s = lat_rad.sin();
    WGS84_SEMI_MAJOR_AXIS_M / (1.0 - WGS84_FIRST_ECCENTRICITY_SQUARED * s * s).sqrt()
}

/// Convert geodetic coordinates to Earth-Centered-Earth-Fixed meters
pub fn geodetic_to_ecef(lla: &Lla) -> Vector3<f64> {
    let lon = lla.lon_deg.to_radians();
    let lat = lla.lat_deg.to_radians();
    let (s_lon, c_lon) = lon.sin_cos();
    let (s_lat, c_lat) = lat.sin_cos();

    let n = prime_vertical_radius(lat);

    Vector3::new(
        (n + lla.alt_m) * c_lat * c_lon,
        (n + lla.alt_m) * c_lat * s_lon,
        (n * (1.0 - WGS84_FIRST_ECCENTRICITY_SQUARED) + lla.alt_m) * s_lat,
    )
}

/// Convert ECEF meters back to geodetic coordinates
///
/// Fixed-point iteration on latitude starting from the spherical guess;
/// the height uses the form that stays well conditioned near the poles.
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> Lla {
    let e2 = WGS84_FIRST_ECCENTRICITY_SQUARED;
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    let mut lat = ecef.z.atan2(p * (1.0 - e2));
    for _ in 0..GEODETIC_ITERATIONS {
        let n = prime_vertical_radius(lat);
        lat = (ecef.z + e2 * n * lat.sin()).atan2(p);
    }

    let (s_lat, c_lat) = lat.sin_cos();
    let alt = p * c_lat + ecef.z * s_lat
        - WGS84_SEMI_MAJOR_AXIS_M * (1.0 - e2 * s_lat * s_lat).sqrt();

    Lla::new(lon.to_degrees(), lat.to_degrees(), alt)
}

/// Rotation taking ECEF axes onto local East-North-Up axes at (lat, lon)
///
/// Rotation by longitude about Z followed by colatitude about the new east axis.
pub fn ecef_to_enu_rotation(lat_deg: f64, lon_deg: f64) -> Rotation3<f64> {
    let (s_lat, c_lat) = lat_deg.to_radians().sin_cos();
    let (s_lon, c_lon) = lon_deg.to_radians().sin_cos();

    #[rustfmt::skip]
    let m = Matrix3::new(
        -s_lon,          c_lon,         0.0,
        -s_lat * c_lon, -s_lat * s_lon, c_lat,
         c_lat * c_lon,  c_lat * s_lon, s_lat,
    );
    Rotation3::from_matrix_unchecked(m)
}

/// Local tangent frame anchored at a fixed geodetic origin
#[derive(Clone, Debug)]
pub struct LocalFrame {
    origin: Lla,
    origin_ecef: Vector3<f64>,
    ecef_to_enu: Rotation3<f64>,
}

impl LocalFrame {
    pub fn new(origin: Lla) -> Self {
        Self {
            origin,
            origin_ecef: geodetic_to_ecef(&origin),
            ecef_to_enu: ecef_to_enu_rotation(origin.lat_deg, origin.lon_deg),
        }
    }

    pub fn origin(&self) -> &Lla {
        &self.origin
    }

    /// ENU offset [meters] of a geodetic point from the origin
    pub fn to_enu(&self, lla: &Lla) -> Vector3<f64> {
        self.ecef_to_enu * (geodetic_to_ecef(lla) - self.origin_ecef)
    }

    /// Geodetic coordinates of an ENU offset from the origin
    pub fn to_geodetic(&self, enu: &Vector3<f64>) -> Lla {
        let ecef = self.origin_ecef + self.ecef_to_enu.inverse() * enu;
        ecef_to_geodetic(&ecef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equator_prime_meridian() {
        let ecef = geodetic_to_ecef(&Lla::new(0.0, 0.0, 0.0));
        assert_relative_eq!(ecef, Vector3::new(WGS84_SEMI_MAJOR_AXIS_M, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_north_pole_uses_polar_radius() {
        let ecef = geodetic_to_ecef(&Lla::new(0.0, 90.0, 0.0));
        let b = WGS84_SEMI_MAJOR_AXIS_M * (1.0 - WGS84_FLATTENING);
        assert!(ecef.x.abs() < 1e-6);
        assert!((ecef.z - b).abs() < 1e-6);
    }

    #[test]
    fn test_altitude_extends_along_normal() {
        let ecef = geodetic_to_ecef(&Lla::new(90.0, 0.0, 100.0));
        assert_relative_eq!(ecef.y, WGS84_SEMI_MAJOR_AXIS_M + 100.0, epsilon = 1e-6);
        assert!(ecef.x.abs() < 1e-6);
    }

    #[test]
    fn test_geodetic_round_trip() {
        let points = [
            Lla::new(-110.9, 32.2, 720.0),
            Lla::new(151.2, -33.9, 12.0),
            Lla::new(10.0, 78.0, -40.0),
        ];
        for lla in points {
            let back = ecef_to_geodetic(&geodetic_to_ecef(&lla));
            assert_relative_eq!(back.lat_deg, lla.lat_deg, epsilon = 1e-9);
            assert_relative_eq!(back.lon_deg, lla.lon_deg, epsilon = 1e-9);
            assert_relative_eq!(back.alt_m, lla.alt_m, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_enu_rotation_is_orthonormal() {
        let r = ecef_to_enu_rotation(32.2, -110.9);
        let m = r.matrix();
        assert_relative_eq!(m * m.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_enu_axes_at_origin() {
        // At (0, 0): east = +Y ecef, north = +Z ecef, up = +X ecef
        let r = ecef_to_enu_rotation(0.0, 0.0);
        assert_relative_eq!(r * Vector3::y(), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(r * Vector3::z(), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(r * Vector3::x(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_local_frame_directions() {
        let frame = LocalFrame::new(Lla::new(-110.9, 32.2, 700.0));

        let up = frame.to_enu(&Lla::new(-110.9, 32.2, 710.0));
        assert_relative_eq!(up, Vector3::new(0.0, 0.0, 10.0), epsilon = 1e-6);

        let north = frame.to_enu(&Lla::new(-110.9, 32.201, 700.0));
        assert!(north.y > 100.0 && north.y < 112.0);
        assert!(north.x.abs() < 1e-6);

        let east = frame.to_enu(&Lla::new(-110.899, 32.2, 700.0));
        assert!(east.x > 80.0 && east.x < 100.0);
        assert!(east.y.abs() < 1e-3);
    }

    #[test]
    fn test_local_frame_round_trip() {
        let frame = LocalFrame::new(Lla::new(2.35, 48.85, 35.0));
        let enu = Vector3::new(120.0, -45.0, 3.5);
        let lla = frame.to_geodetic(&enu);
        assert_relative_eq!(frame.to_enu(&lla), enu, epsilon = 1e-5);
        assert_relative_eq!(frame.to_enu(frame.origin()), Vector3::zeros(), epsilon = 1e-9);
    }
}
