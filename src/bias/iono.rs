//! Ionosphere models: Klobuchar broadcast, pierce point geometry and
//! IONEX TEC grids.

use crate::constants::{CLIGHT, D2R, FREQ1, PI, R2D, RE_WGS84};
use crate::nav::{Nav, Tec};
use crate::time::{time2gpst, timediff, GTime};
use log::debug;

/// Broadcast model error factor.
const ERR_BRDCI: f64 = 0.5;

/// TECU to L1 meters.
const K_TEC: f64 = 40.30E16 / (FREQ1 * FREQ1);

// 2004/1/1 broadcast parameters, used when the header carried none
const ION_DEFAULT: [f64; 8] = [
    0.1118E-7, -0.7451E-8, -0.5961E-7, 0.1192E-6, 0.1167E+6, -0.2294E+6, -0.1311E+6, 0.1049E+7,
];

fn sqr(x: f64) -> f64 {
    x * x
}

/// Klobuchar broadcast ionosphere model.
///
/// `pos` geodetic (rad, rad, m), `azel` (rad). Returns the L1 slant
/// delay (m) and its variance; zero below the horizon.
pub fn ionmodel(time: GTime, ion: &[f64; 8], pos: &[f64; 3], azel: &[f64; 2]) -> (f64, f64) {
    if pos[2] < -1E3 || azel[1] <= 0.0 {
        return (0.0, 0.0);
    }
    let ion = if ion.iter().map(|v| v * v).sum::<f64>() <= 0.0 {
        &ION_DEFAULT
    } else {
        ion
    };
    // earth centered angle (semi-circle)
    let psi = 0.0137 / (azel[1] / PI + 0.11) - 0.022;

    // subionospheric latitude/longitude (semi-circle)
    let phi = (pos[0] / PI + psi * azel[0].cos()).clamp(-0.416, 0.416);
    let lam = pos[1] / PI + psi * azel[0].sin() / (phi * PI).cos();

    // geomagnetic latitude (semi-circle)
    let phi = phi + 0.064 * ((lam - 1.617) * PI).cos();

    // local time (s)
    let (_, tow) = time2gpst(time);
    let tt = 43200.0 * lam + tow;
    let tt = tt - (tt / 86400.0).floor() * 86400.0;

    // slant factor
    let f = 1.0 + 16.0 * (0.53 - azel[1] / PI).powi(3);

    let amp = (ion[0] + phi * (ion[1] + phi * (ion[2] + phi * ion[3]))).max(0.0);
    let per = (ion[4] + phi * (ion[5] + phi * (ion[6] + phi * ion[7]))).max(72000.0);
    let x = 2.0 * PI * (tt - 50400.0) / per;

    let delay = CLIGHT
        * f
        * if x.abs() < 1.57 {
            5E-9 + amp * (1.0 + x * x * (-0.5 + x * x / 24.0))
        } else {
            5E-9
        };
    (delay, sqr(delay * ERR_BRDCI))
}

/// Ionospheric pierce point.
///
/// Returns the geodetic position `(lat, lon, hion)` (rad, rad, m) of the
/// intersection with the single layer at height `hion` above the sphere
/// of radius `re`, and the slant factor `1/cos(z')`.
pub fn ionppp(pos: &[f64; 3], azel: &[f64; 2], re: f64, hion: f64) -> ([f64; 3], f64) {
    let rp = re / (re + hion) * azel[1].cos();
    let ap = PI / 2.0 - azel[1] - rp.asin();
    let sinap = ap.sin();
    let tanap = ap.tan();
    let cosaz = azel[0].cos();

    let latp = (pos[0].sin() * ap.cos() + pos[0].cos() * sinap * cosaz).asin();
    let lonp = if (pos[0] > 70.0 * D2R && tanap * cosaz > (PI / 2.0 - pos[0]).tan())
        || (pos[0] < -70.0 * D2R && -tanap * cosaz > (PI / 2.0 + pos[0]).tan())
    {
        // polar cap crossing
        pos[1] + PI - (sinap * azel[0].sin() / latp.cos()).asin()
    } else {
        pos[1] + (sinap * azel[0].sin() / latp.cos()).asin()
    };
    ([latp, lonp, hion], 1.0 / (1.0 - rp * rp).sqrt())
}

/// Single layer mapping function at 350 km (vertical to slant).
///
/// Returns 1 when the receiver sits at or above the layer.
pub fn ionmapf(pos: &[f64; 3], azel: &[f64; 2]) -> f64 {
    const HION: f64 = 350E3;
    if pos[2] >= HION {
        return 1.0;
    }
    let zp = ((RE_WGS84 + pos[2]) / (RE_WGS84 + HION) * (PI / 2.0 - azel[1]).sin()).asin();
    1.0 / zp.cos()
}

fn data_at(tec: &Tec, i: i64, j: i64, k: usize) -> Option<f64> {
    if i < 0 || j < 0 || i as usize >= tec.ndata[0] || j as usize >= tec.ndata[1] {
        return None;
    }
    let v = tec.data[i as usize + tec.ndata[0] * (j as usize + tec.ndata[1] * k)];
    (v > 0.0).then_some(v)
}

fn rms_at(tec: &Tec, i: i64, j: i64, k: usize) -> f64 {
    if i < 0 || j < 0 || i as usize >= tec.ndata[0] || j as usize >= tec.ndata[1] {
        return 0.0;
    }
    tec.rms[i as usize + tec.ndata[0] * (j as usize + tec.ndata[1] * k)] as f64
}

// bilinear vertical TEC at a pierce point, nearest-neighbor on a corner
// with missing data
fn interptec(tec: &Tec, k: usize, posp: &[f64; 3]) -> Option<(f64, f64)> {
    if tec.lats[2] == 0.0 || tec.lons[2] == 0.0 {
        return None;
    }
    let dlat = posp[0] * R2D - tec.lats[0];
    let mut dlon = posp[1] * R2D - tec.lons[0];
    if tec.lons[2] > 0.0 {
        dlon -= (dlon / 360.0).floor() * 360.0;
    } else {
        dlon += (-dlon / 360.0).floor() * 360.0;
    }
    let a = dlat / tec.lats[2];
    let b = dlon / tec.lons[2];
    let (i, a) = (a.floor() as i64, a - a.floor());
    let (j, b) = (b.floor() as i64, b - b.floor());

    let d = [
        data_at(tec, i, j, k),
        data_at(tec, i + 1, j, k),
        data_at(tec, i, j + 1, k),
        data_at(tec, i + 1, j + 1, k),
    ];
    let r = [
        rms_at(tec, i, j, k),
        rms_at(tec, i + 1, j, k),
        rms_at(tec, i, j + 1, k),
        rms_at(tec, i + 1, j + 1, k),
    ];
    match d {
        [Some(d0), Some(d1), Some(d2), Some(d3)] => {
            let v = (1.0 - a) * (1.0 - b) * d0
                + a * (1.0 - b) * d1
                + (1.0 - a) * b * d2
                + a * b * d3;
            let rm = (1.0 - a) * (1.0 - b) * r[0]
                + a * (1.0 - b) * r[1]
                + (1.0 - a) * b * r[2]
                + a * b * r[3];
            Some((v, rm))
        },
        _ => {
            // nearest valid quadrant
            let near = if a <= 0.5 && b <= 0.5 {
                0
            } else if a > 0.5 && b <= 0.5 {
                1
            } else if a <= 0.5 {
                2
            } else {
                3
            };
            if let Some(v) = d[near] {
                return Some((v, r[near]));
            }
            let valid: Vec<(f64, f64)> = d
                .iter()
                .zip(r.iter())
                .filter_map(|(dv, &rv)| dv.map(|v| (v, rv)))
                .collect();
            if valid.is_empty() {
                return None;
            }
            let n = valid.len() as f64;
            Some((
                valid.iter().map(|v| v.0).sum::<f64>() / n,
                valid.iter().map(|v| v.1).sum::<f64>() / n,
            ))
        },
    }
}

// slant delay from one TEC epoch
fn iondelay(tec: &Tec, pos: &[f64; 3], azel: &[f64; 2]) -> Option<(f64, f64)> {
    let mut delay = 0.0;
    let mut var = 0.0;
    for k in 0..tec.ndata[2] {
        let hion = (tec.hgts[0] + tec.hgts[2] * k as f64) * 1E3;
        let (posp, fs) = ionppp(pos, azel, tec.rb * 1E3, hion);
        let (vtec, rms) = interptec(tec, k, &posp)?;
        delay += K_TEC * fs * vtec;
        var += sqr(K_TEC * fs * rms);
    }
    if delay == 0.0 {
        return None;
    }
    Some((delay, var))
}

/// IONEX TEC grid ionosphere: linear temporal interpolation between the
/// bracketing grids, bilinear in space. Returns `(L1 slant delay, var)`.
pub fn iontec(time: GTime, nav: &Nav, pos: &[f64; 3], azel: &[f64; 2]) -> Option<(f64, f64)> {
    if pos[2] < -1E3 || azel[1] <= 0.0 {
        return Some((0.0, 0.0));
    }
    if nav.tec.is_empty() {
        return None;
    }
    let i = nav
        .tec
        .partition_point(|t| timediff(t.time, time) <= 0.0);
    if i == 0 || i >= nav.tec.len() {
        debug!("iontec: time out of tec grid: {time}");
        return None;
    }
    let (t0, t1) = (&nav.tec[i - 1], &nav.tec[i]);
    let dt = timediff(t1.time, t0.time);
    if dt == 0.0 {
        return None;
    }
    let a = timediff(time, t0.time) / dt;

    let (d0, v0) = iondelay(t0, pos, azel)?;
    let (d1, v1) = iondelay(t1, pos, azel)?;
    Some((d0 * (1.0 - a) + d1 * a, v0 * (1.0 - a) + v1 * a))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::{epoch2time, timeadd};

    #[test]
    fn klobuchar_daytime_larger_than_night() {
        let pos = [35.0 * D2R, 139.0 * D2R, 50.0];
        let azel = [0.0, 60.0 * D2R];
        // 2023-06-01, 14:00 vs 02:00 local (Japan ~ UTC+9)
        let day = epoch2time(&[2023.0, 6.0, 1.0, 5.0, 0.0, 0.0]);
        let night = epoch2time(&[2023.0, 6.0, 1.0, 17.0, 0.0, 0.0]);
        let (dd, vd) = ionmodel(day, &ION_DEFAULT, &pos, &azel);
        let (dn, _) = ionmodel(night, &ION_DEFAULT, &pos, &azel);
        assert!(dd > dn, "day {dd} night {dn}");
        assert!(dd > 0.5 && dd < 30.0);
        assert!(vd > 0.0);
    }

    #[test]
    fn klobuchar_below_horizon_is_zero() {
        let pos = [35.0 * D2R, 139.0 * D2R, 50.0];
        let t = epoch2time(&[2023.0, 6.0, 1.0, 5.0, 0.0, 0.0]);
        assert_eq!(ionmodel(t, &ION_DEFAULT, &pos, &[0.0, -0.01]), (0.0, 0.0));
    }

    #[test]
    fn pierce_point_zenith_is_overhead() {
        let pos = [35.0 * D2R, 139.0 * D2R, 0.0];
        let (posp, fp) = ionppp(&pos, &[0.0, PI / 2.0], 6378E3, 350E3);
        assert!((posp[0] - pos[0]).abs() < 1E-9);
        assert!((posp[1] - pos[1]).abs() < 1E-9);
        assert!((fp - 1.0).abs() < 1E-12);
    }

    #[test]
    fn pierce_point_slant_factor_grows_at_low_elevation() {
        let pos = [35.0 * D2R, 139.0 * D2R, 0.0];
        let (_, f30) = ionppp(&pos, &[0.0, 30.0 * D2R], 6378E3, 350E3);
        let (_, f10) = ionppp(&pos, &[0.0, 10.0 * D2R], 6378E3, 350E3);
        assert!(f10 > f30 && f30 > 1.0);
    }

    fn flat_tec(time: GTime, tecu: f64) -> Tec {
        let ndata = [11, 11, 1];
        Tec {
            time,
            ndata,
            rb: 6371.0,
            lats: [20.0, 70.0, 5.0],
            lons: [110.0, 160.0, 5.0],
            hgts: [350.0, 350.0, 0.0],
            data: vec![tecu; ndata[0] * ndata[1]],
            rms: vec![1.0; ndata[0] * ndata[1]],
        }
    }

    #[test]
    fn tec_grid_temporal_interpolation() {
        let t0 = epoch2time(&[2023.0, 6.0, 1.0, 0.0, 0.0, 0.0]);
        let mut nav = Nav::new();
        nav.tec.push(flat_tec(t0, 10.0));
        nav.tec.push(flat_tec(timeadd(t0, 7200.0), 20.0));

        let pos = [35.0 * D2R, 139.0 * D2R, 0.0];
        let azel = [0.0, PI / 2.0];
        let (d, v) = iontec(timeadd(t0, 3600.0), &nav, &pos, &azel).unwrap();
        // halfway: 15 TECU at zenith
        assert!((d - K_TEC * 15.0).abs() < 1E-6, "delay {d}");
        assert!(v > 0.0);
        // outside the table
        assert!(iontec(timeadd(t0, -60.0), &nav, &pos, &azel).is_none());
    }
}
