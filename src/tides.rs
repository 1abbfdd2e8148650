//! Earth tide displacement of the receiver: solid tide from sun/moon
//! and the pole tide from ERP.

use crate::config::TideCorr;
use crate::constants::{AS2R, RE_WGS84};
use crate::coords::{ecef2pos, sunmoonpos, xyz2enu, ErpVal};
use crate::time::{epoch2time, timediff, GTime};
use nalgebra::{Matrix3, Vector3};

const GME: f64 = 3.986004415E14;
const GMS: f64 = 1.327124E20;
const GMM: f64 = 4.902801E12;

fn sqr(x: f64) -> f64 {
    x * x
}

// degree 2 + 3 in-phase displacement by one perturbing body
fn tide_pl(eu: &Vector3<f64>, rp: &Vector3<f64>, gmp: f64, pos: &Vector3<f64>) -> Vector3<f64> {
    const H3: f64 = 0.292;
    const L3: f64 = 0.015;

    let r = rp.norm();
    if r <= 0.0 {
        return Vector3::zeros();
    }
    let ep = rp / r;
    let k2 = gmp / GME * sqr(RE_WGS84) * sqr(RE_WGS84) / (r * r * r);
    let k3 = k2 * RE_WGS84 / r;

    let latp = ep[2].asin();
    let lonp = ep[1].atan2(ep[0]);
    let cosp = latp.cos();
    let sinl = pos[0].sin();
    let cosl = pos[0].cos();

    // degree 2, latitude dependent Love/Shida numbers
    let p = (3.0 * sinl * sinl - 1.0) / 2.0;
    let h2 = 0.6078 - 0.0006 * p;
    let l2 = 0.0847 + 0.0002 * p;
    let a = ep.dot(eu);
    let mut dp = k2 * 3.0 * l2 * a;
    let mut du = k2 * (h2 * (1.5 * a * a - 0.5) - 3.0 * l2 * sqr(a));

    // degree 3
    dp += k3 * L3 * (7.5 * a * a - 1.5);
    du += k3 * (H3 * (2.5 * a * a * a - 1.5 * a) - L3 * (7.5 * a * a - 1.5) * a);

    // out-of-phase, radial only
    du += 3.0 / 4.0 * 0.0025 * k2 * (2.0 * latp).sin() * (2.0 * pos[0]).sin()
        * (pos[1] - lonp).sin();
    du += 3.0 / 4.0 * 0.0022 * k2 * cosp * cosp * cosl * cosl
        * (2.0 * (pos[1] - lonp)).sin();

    dp * ep + du * eu
}

// solid earth tide, step 1 time domain + step 2 K1 radial term
fn tide_solid(
    rsun: &Vector3<f64>,
    rmoon: &Vector3<f64>,
    pos: &Vector3<f64>,
    e: &Matrix3<f64>,
    gmst: f64,
) -> Vector3<f64> {
    let eu = Vector3::new(e[(2, 0)], e[(2, 1)], e[(2, 2)]);
    let dr1 = tide_pl(&eu, rsun, GMS, pos);
    let dr2 = tide_pl(&eu, rmoon, GMM, pos);

    let sin2l = (2.0 * pos[0]).sin();
    let du = -0.012 * sin2l * (gmst + pos[1]).sin();
    dr1 + dr2 + du * eu
}

// IERS mean pole (mas), cubic until 2010.0 then linear
fn iers_mean_pole(tut: GTime) -> (f64, f64) {
    let ep2000 = epoch2time(&[2000.0, 1.0, 1.0, 12.0, 0.0, 0.0]);
    let y = timediff(tut, ep2000) / 86400.0 / 365.25;
    if y < 10.0 {
        (
            55.974 + y * (1.8243 + y * (0.18413 + y * 0.007024)),
            346.346 + y * (1.7896 + y * (-0.10729 - y * 0.000908)),
        )
    } else {
        (23.513 + 7.6141 * y, 358.891 - 0.6287 * y)
    }
}

// pole tide, IERS conventions eq. 7.26, result in ENU meters
fn tide_pole(tut: GTime, pos: &Vector3<f64>, erpv: &ErpVal) -> Vector3<f64> {
    let (xp_bar, yp_bar) = iers_mean_pole(tut);

    // wobble parameters (arcsec)
    let m1 = erpv.xp / AS2R - xp_bar * 1E-3;
    let m2 = -erpv.yp / AS2R + yp_bar * 1E-3;

    let cosl = pos[1].cos();
    let sinl = pos[1].sin();
    Vector3::new(
        9E-3 * pos[0].sin() * (m1 * sinl - m2 * cosl),
        -9E-3 * (2.0 * pos[0]).cos() * (m1 * cosl + m2 * sinl),
        -33E-3 * (2.0 * pos[0]).sin() * (m1 * cosl + m2 * sinl),
    )
}

/// Tidal displacement of a station at `rr` (ECEF, m) at `tutc`.
pub fn tidedisp(tutc: GTime, rr: &Vector3<f64>, tide: TideCorr, erpv: &ErpVal) -> Vector3<f64> {
    if tide == TideCorr::Off || rr.norm() <= 0.0 {
        return Vector3::zeros();
    }
    let pos = ecef2pos(rr);
    let e = xyz2enu(&pos);

    let (rsun, rmoon, gmst) = sunmoonpos(tutc, erpv);
    let mut dr = tide_solid(&rsun, &rmoon, &pos, &e, gmst);

    if tide == TideCorr::SolidPole {
        let tut = crate::time::timeadd(tutc, erpv.ut1_utc);
        let denu = tide_pole(tut, &pos, erpv);
        dr += e.transpose() * denu;
    }
    dr
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::D2R;
    use crate::coords::pos2ecef;
    use crate::time::gpst2utc;

    #[test]
    fn solid_tide_is_centimeter_scale() {
        let t = gpst2utc(epoch2time(&[2023.0, 6.0, 1.0, 12.0, 0.0, 0.0]));
        let pos = Vector3::new(35.0 * D2R, 139.0 * D2R, 0.0);
        let rr = pos2ecef(&pos);
        let dr = tidedisp(t, &rr, TideCorr::Solid, &ErpVal::default());
        let n = dr.norm();
        assert!(n > 0.001 && n < 0.6, "solid tide {n}");
    }

    #[test]
    fn off_means_zero() {
        let t = gpst2utc(epoch2time(&[2023.0, 6.0, 1.0, 12.0, 0.0, 0.0]));
        let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 0.0));
        assert_eq!(tidedisp(t, &rr, TideCorr::Off, &ErpVal::default()), Vector3::zeros());
    }

    #[test]
    fn pole_tide_changes_the_displacement() {
        let t = gpst2utc(epoch2time(&[2023.0, 6.0, 1.0, 12.0, 0.0, 0.0]));
        let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 0.0));
        let erpv = ErpVal {
            xp: 0.1 * AS2R,
            yp: 0.3 * AS2R,
            ..Default::default()
        };
        let solid = tidedisp(t, &rr, TideCorr::Solid, &erpv);
        let both = tidedisp(t, &rr, TideCorr::SolidPole, &erpv);
        assert!((both - solid).norm() > 1E-4);
    }
}
