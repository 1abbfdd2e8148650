//! Coordinate frames and geodesy.
//!
//! ECEF ↔ geodetic ↔ local ENU transforms on the WGS84 ellipsoid, the
//! geometric range with Sagnac correction, ECI → ECEF rotation (IAU 1976
//! precession + dominant terms of the IERS 1980 nutation series) and the
//! analytic sun/moon positions feeding the phase windup and tide models.

use crate::constants::*;
use crate::time::{timeadd, timediff, epoch2time, utc2gmst, GTime};
use nalgebra::{Matrix3, Vector3};
use std::sync::Mutex;

/// Earth rotation parameter set interpolated at one epoch.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ErpVal {
    /// Pole offset x (rad)
    pub xp: f64,
    /// Pole offset y (rad)
    pub yp: f64,
    /// UT1 - UTC (s)
    pub ut1_utc: f64,
    /// Length of day variation (s/day)
    pub lod: f64,
}

/// ECEF position to geodetic `(lat rad, lon rad, height m)`.
pub fn ecef2pos(r: &Vector3<f64>) -> Vector3<f64> {
    let e2 = FE_WGS84 * (2.0 - FE_WGS84);
    let r2 = r[0] * r[0] + r[1] * r[1];
    let mut z = r[2];
    let mut zk = 0.0;
    let mut v = RE_WGS84;
    let mut sinp = 0.0;

    while (z - zk).abs() >= 1E-4 {
        zk = z;
        sinp = z / (r2 + z * z).sqrt();
        v = RE_WGS84 / (1.0 - e2 * sinp * sinp).sqrt();
        z = r[2] + v * e2 * sinp;
    }
    let lat = if r2 > 1E-12 {
        (z / r2.sqrt()).atan()
    } else if r[2] > 0.0 {
        std::f64::consts::FRAC_PI_2
    } else {
        -std::f64::consts::FRAC_PI_2
    };
    let lon = if r2 > 1E-12 { r[1].atan2(r[0]) } else { 0.0 };
    let h = (r2 + z * z).sqrt() - v;
    Vector3::new(lat, lon, if r2 > 1E-12 { h } else { r[2].abs() - v * (1.0 - e2) })
}

/// Geodetic `(lat, lon, h)` to ECEF.
pub fn pos2ecef(pos: &Vector3<f64>) -> Vector3<f64> {
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();
    let e2 = FE_WGS84 * (2.0 - FE_WGS84);
    let v = RE_WGS84 / (1.0 - e2 * sinp * sinp).sqrt();

    Vector3::new(
        (v + pos[2]) * cosp * cosl,
        (v + pos[2]) * cosp * sinl,
        (v * (1.0 - e2) + pos[2]) * sinp,
    )
}

/// Rotation from ECEF to local ENU at geodetic `pos`.
pub fn xyz2enu(pos: &Vector3<f64>) -> Matrix3<f64> {
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();

    Matrix3::new(
        -sinl, cosl, 0.0, //
        -sinp * cosl, -sinp * sinl, cosp, //
        cosp * cosl, cosp * sinl, sinp,
    )
}

/// ECEF vector to local ENU components at `pos`.
pub fn ecef2enu(pos: &Vector3<f64>, r: &Vector3<f64>) -> Vector3<f64> {
    xyz2enu(pos) * r
}

/// Local ENU components at `pos` back to an ECEF vector.
pub fn enu2ecef(pos: &Vector3<f64>, e: &Vector3<f64>) -> Vector3<f64> {
    xyz2enu(pos).transpose() * e
}

/// Rotate an ECEF covariance into ENU.
pub fn covenu(pos: &Vector3<f64>, p: &Matrix3<f64>) -> Matrix3<f64> {
    let e = xyz2enu(pos);
    e * p * e.transpose()
}

/// Rotate an ENU covariance into ECEF.
pub fn covecef(pos: &Vector3<f64>, q: &Matrix3<f64>) -> Matrix3<f64> {
    let e = xyz2enu(pos);
    e.transpose() * q * e
}

/// Geometric range satellite → receiver with the Sagnac correction, and
/// the receiver-to-satellite unit line of sight. `None` below Earth radius.
pub fn geodist(rs: &Vector3<f64>, rr: &Vector3<f64>) -> Option<(f64, Vector3<f64>)> {
    if rs.norm() < RE_WGS84 {
        return None;
    }
    let d = rs - rr;
    let r = d.norm();
    let e = d / r;
    Some((r + OMGE * (rs[0] * rr[1] - rs[1] * rr[0]) / CLIGHT, e))
}

/// Dilution of precision `[gdop, pdop, hdop, vdop]` from satellite
/// azimuth/elevation pairs above `elmin`. Zeros with fewer than four
/// usable satellites or a singular geometry.
pub fn dops(azels: &[[f64; 2]], elmin: f64) -> [f64; 4] {
    use nalgebra::DMatrix;
    let rows: Vec<[f64; 4]> = azels
        .iter()
        .filter(|a| a[1] >= elmin)
        .map(|a| {
            let cosel = a[1].cos();
            [cosel * a[0].sin(), cosel * a[0].cos(), a[1].sin(), 1.0]
        })
        .collect();
    if rows.len() < 4 {
        return [0.0; 4];
    }
    let h = DMatrix::from_fn(rows.len(), 4, |i, j| rows[i][j]);
    let Some(q) = (h.transpose() * &h).try_inverse() else {
        return [0.0; 4];
    };
    [
        (q[(0, 0)] + q[(1, 1)] + q[(2, 2)] + q[(3, 3)]).sqrt(),
        (q[(0, 0)] + q[(1, 1)] + q[(2, 2)]).sqrt(),
        (q[(0, 0)] + q[(1, 1)]).sqrt(),
        q[(2, 2)].sqrt(),
    ]
}

/// Azimuth/elevation (rad) of a line of sight `e` (ECEF) seen from
/// geodetic `pos`. Azimuth in `[0, 2π)`, elevation `π/2` at zenith.
pub fn satazel(pos: &Vector3<f64>, e: &Vector3<f64>) -> (f64, f64) {
    if pos[2] <= -RE_WGS84 {
        return (0.0, std::f64::consts::FRAC_PI_2);
    }
    let enu = ecef2enu(pos, e);
    let mut az = if enu.xy().norm_squared() < 1E-12 {
        0.0
    } else {
        enu[0].atan2(enu[1])
    };
    if az < 0.0 {
        az += 2.0 * std::f64::consts::PI;
    }
    (az, enu[2].asin())
}

fn rx(t: f64) -> Matrix3<f64> {
    let (s, c) = t.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

fn ry(t: f64) -> Matrix3<f64> {
    let (s, c) = t.sin_cos();
    Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

fn rz(t: f64) -> Matrix3<f64> {
    let (s, c) = t.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Delaunay fundamental arguments of the IERS 1980 series (rad).
fn ast_args(t: f64) -> [f64; 5] {
    // arcsec polynomials, IERS Conventions 1980
    const FC: [[f64; 4]; 5] = [
        [485866.733, 1717915922.633, 31.310, 0.064],
        [1287099.804, 129596581.224, -0.577, -0.012],
        [335778.877, 1739527263.137, -13.257, 0.011],
        [1072261.307, 1602961601.328, -6.891, 0.019],
        [450160.280, -6962890.539, 7.455, 0.008],
    ];
    let mut f = [0.0; 5];
    for i in 0..5 {
        let a = FC[i][0] + FC[i][1] * t + FC[i][2] * t * t + FC[i][3] * t * t * t;
        f[i] = (a * AS2R) % (2.0 * std::f64::consts::PI);
    }
    f
}

/// Dominant terms of the IAU 1980 nutation series → `(dpsi, deps)` in rad.
fn nut_iau1980(t: f64, f: &[f64; 5]) -> (f64, f64) {
    // (l, l', F, D, Om, psi, psi_t, eps, eps_t) amplitudes in 0.1 mas
    const NUT: [[f64; 9]; 9] = [
        [0.0, 0.0, 0.0, 0.0, 1.0, -171996.0, -174.2, 92025.0, 8.9],
        [0.0, 0.0, 2.0, -2.0, 2.0, -13187.0, -1.6, 5736.0, -3.1],
        [0.0, 0.0, 2.0, 0.0, 2.0, -2274.0, -0.2, 977.0, -0.5],
        [0.0, 0.0, 0.0, 0.0, 2.0, 2062.0, 0.2, -895.0, 0.5],
        [0.0, 1.0, 0.0, 0.0, 0.0, 1426.0, -3.4, 54.0, -0.1],
        [1.0, 0.0, 0.0, 0.0, 0.0, 712.0, 0.1, -7.0, 0.0],
        [0.0, 1.0, 2.0, -2.0, 2.0, -517.0, 1.2, 224.0, -0.6],
        [0.0, 0.0, 2.0, 0.0, 1.0, -386.0, -0.4, 200.0, 0.0],
        [1.0, 0.0, 2.0, 0.0, 2.0, -301.0, 0.0, 129.0, -0.1],
    ];
    let mut dpsi = 0.0;
    let mut deps = 0.0;
    for row in NUT.iter() {
        let mut ang = 0.0;
        for j in 0..5 {
            ang += row[j] * f[j];
        }
        dpsi += (row[5] + row[6] * t) * ang.sin();
        deps += (row[7] + row[8] * t) * ang.cos();
    }
    (1E-4 * dpsi * AS2R, 1E-4 * deps * AS2R)
}

/// ECI to ECEF rotation at UTC `tutc` with Earth rotation parameters.
/// Returns the rotation and Greenwich apparent sidereal time (rad).
pub fn eci2ecef(tutc: GTime, erpv: &ErpVal) -> (Matrix3<f64>, f64) {
    let ep2000 = epoch2time(&[2000.0, 1.0, 1.0, 12.0, 0.0, 0.0]);
    let tgps = crate::time::utc2gpst(tutc);
    let t = (timediff(tgps, ep2000) + 19.0 + 32.184) / 86400.0 / 36525.0;
    let t2 = t * t;
    let t3 = t2 * t;

    let f = ast_args(t);

    // IAU 1976 precession
    let ze = (2306.2181 * t + 0.30188 * t2 + 0.017998 * t3) * AS2R;
    let th = (2004.3109 * t - 0.42665 * t2 - 0.041833 * t3) * AS2R;
    let z = (2306.2181 * t + 1.09468 * t2 + 0.018203 * t3) * AS2R;
    let eps = (84381.448 - 46.8150 * t - 0.00059 * t2 + 0.001813 * t3) * AS2R;
    let p = rz(-z) * ry(th) * rz(-ze);

    // IAU 1980 nutation
    let (dpsi, deps) = nut_iau1980(t, &f);
    let n = rx(-eps - deps) * rz(-dpsi) * rx(eps);

    // Greenwich apparent sidereal time
    let gmst = utc2gmst(tutc, erpv.ut1_utc);
    let gast = gmst
        + dpsi * eps.cos()
        + (0.00264 * f[4].sin() + 0.000063 * (2.0 * f[4]).sin()) * AS2R;

    let w = ry(-erpv.xp) * rx(-erpv.yp);
    (w * rz(gast) * n * p, gast)
}

/// Sun and moon positions in ECEF (m) at UTC `tutc`, and GMST (rad).
/// The previous result is cached on the input time.
pub fn sunmoonpos(tutc: GTime, erpv: &ErpVal) -> (Vector3<f64>, Vector3<f64>, f64) {
    type Cache = Option<(GTime, ErpVal, Vector3<f64>, Vector3<f64>, f64)>;
    static LAST: Mutex<Cache> = Mutex::new(None);

    if let Some((t0, e0, rs, rm, gmst)) = *LAST.lock().unwrap() {
        if t0 == tutc && e0 == *erpv {
            return (rs, rm, gmst);
        }
    }
    let tut = timeadd(tutc, erpv.ut1_utc);
    let ep2000 = epoch2time(&[2000.0, 1.0, 1.0, 12.0, 0.0, 0.0]);
    let t = timediff(tut, ep2000) / 86400.0 / 36525.0;
    let f = ast_args(t);

    let eps = (23.439291 - 0.0130042 * t) * D2R;
    let (sine, cose) = eps.sin_cos();

    // sun, Montenbruck & Gill low precision
    let ms = (357.5277233 + 35999.05034 * t) * D2R;
    let ls = (280.460 + 36000.770 * t + 1.914666471 * ms.sin() + 0.019994643 * (2.0 * ms).sin())
        * D2R;
    let rs = AU * (1.000140612 - 0.016708617 * ms.cos() - 0.000139589 * (2.0 * ms).cos());
    let rsun_eci = Vector3::new(
        rs * ls.cos(),
        rs * cose * ls.sin(),
        rs * sine * ls.sin(),
    );

    // moon
    let lm = (218.32 + 481267.883 * t
        + 6.29 * f[0].sin()
        - 1.27 * (f[0] - 2.0 * f[3]).sin()
        + 0.66 * (2.0 * f[3]).sin()
        + 0.21 * (2.0 * f[0]).sin()
        - 0.19 * f[1].sin()
        - 0.11 * (2.0 * f[2]).sin())
        * D2R;
    let pm = (5.13 * f[2].sin() + 0.28 * (f[0] + f[2]).sin()
        - 0.28 * (f[2] - f[0]).sin()
        - 0.17 * (f[2] - 2.0 * f[3]).sin())
        * D2R;
    let rm = RE_WGS84
        / ((0.9508
            + 0.0518 * f[0].cos()
            + 0.0095 * (f[0] - 2.0 * f[3]).cos()
            + 0.0078 * (2.0 * f[3]).cos()
            + 0.0028 * (2.0 * f[0]).cos())
            * D2R)
            .sin();
    let rmoon_eci = Vector3::new(
        rm * pm.cos() * lm.cos(),
        rm * (cose * pm.cos() * lm.sin() - sine * pm.sin()),
        rm * (sine * pm.cos() * lm.sin() + cose * pm.sin()),
    );

    let (u, gmst) = eci2ecef(tutc, erpv);
    let rsun = u * rsun_eci;
    let rmoon = u * rmoon_eci;

    *LAST.lock().unwrap() = Some((tutc, *erpv, rsun, rmoon, gmst));
    (rsun, rmoon, gmst)
}

/// Degrees to `[deg, min, sec]` keeping the sign on the degree field.
pub fn deg2dms(deg: f64, ndec: i32) -> [f64; 3] {
    let sign = if deg < 0.0 { -1.0 } else { 1.0 };
    let mut a = deg.abs();
    let unit = 10f64.powi(-ndec);

    let mut dms = [0.0; 3];
    dms[0] = a.floor();
    a = (a - dms[0]) * 60.0;
    dms[1] = a.floor();
    a = (a - dms[1]) * 60.0;
    dms[2] = (a / unit).floor() * unit;
    if dms[2] >= 60.0 {
        dms[2] = 0.0;
        dms[1] += 1.0;
        if dms[1] >= 60.0 {
            dms[1] = 0.0;
            dms[0] += 1.0;
        }
    }
    dms[0] *= sign;
    dms
}

/// `[deg, min, sec]` back to decimal degrees.
pub fn dms2deg(dms: &[f64; 3]) -> f64 {
    let sign = if dms[0] < 0.0 { -1.0 } else { 1.0 };
    sign * (dms[0].abs() + dms[1] / 60.0 + dms[2] / 3600.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::epoch2time;

    #[test]
    fn pos_round_trip() {
        for pos in [
            Vector3::new(35.0 * D2R, 139.0 * D2R, 50.0),
            Vector3::new(-45.0 * D2R, -60.0 * D2R, 1200.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(80.0 * D2R, 10.0 * D2R, -30.0),
        ] {
            let back = ecef2pos(&pos2ecef(&pos));
            assert!((back[0] - pos[0]).abs() < 1E-9, "{pos:?}");
            assert!((back[1] - pos[1]).abs() < 1E-9, "{pos:?}");
            assert!((back[2] - pos[2]).abs() < 1E-4, "{pos:?}");
        }
    }

    #[test]
    fn enu_round_trip() {
        let pos = Vector3::new(35.0 * D2R, 139.0 * D2R, 0.0);
        let r = Vector3::new(1.0, -2.0, 3.0);
        let back = enu2ecef(&pos, &ecef2enu(&pos, &r));
        assert!((back - r).norm() < 1E-12);
    }

    #[test]
    fn zenith_satellite() {
        let pos = Vector3::new(35.0 * D2R, 139.0 * D2R, 0.0);
        let up = enu2ecef(&pos, &Vector3::new(0.0, 0.0, 1.0));
        let (_, el) = satazel(&pos, &up);
        assert!((el - std::f64::consts::FRAC_PI_2).abs() < 1E-9);
        let north = enu2ecef(&pos, &Vector3::new(0.0, 1.0, 0.0));
        let (az, el) = satazel(&pos, &north);
        assert!(az.abs() < 1E-9);
        assert!(el.abs() < 1E-9);
    }

    #[test]
    fn sagnac_sign() {
        // satellite east of the receiver: signal chases Earth rotation
        let rr = pos2ecef(&Vector3::new(0.0, 0.0, 0.0));
        let rs = pos2ecef(&Vector3::new(0.0, 30.0 * D2R, 20_000_000.0));
        let (r, e) = geodist(&rs, &rr).unwrap();
        assert!(r > (rs - rr).norm());
        assert!((e.norm() - 1.0).abs() < 1E-12);
    }

    #[test]
    fn sun_direction_plausible() {
        // northern winter: sun below the equator plane
        let t = epoch2time(&[2023.0, 12.0, 21.0, 12.0, 0.0, 0.0]);
        let (rsun, rmoon, _) = sunmoonpos(t, &ErpVal::default());
        let lat = (rsun[2] / rsun.norm()).asin() * R2D;
        assert!((lat + 23.44).abs() < 0.5, "sun lat {lat}");
        assert!((rsun.norm() - AU).abs() / AU < 0.02);
        let dm = rmoon.norm();
        assert!(dm > 3.3E8 && dm < 4.1E8, "moon distance {dm}");
    }

    #[test]
    fn dms() {
        let dms = deg2dms(-35.5125, 4);
        assert_eq!(dms[0], -35.0);
        assert_eq!(dms[1], 30.0);
        assert!((dms[2] - 45.0).abs() < 1E-9);
        assert!((dms2deg(&dms) + 35.5125).abs() < 1E-12);
    }
}
