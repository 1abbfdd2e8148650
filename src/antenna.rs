//! Antenna phase center models and carrier phase windup.

use crate::constants::{FREQ1, FREQ2, PI, R2D, RE_WGS84};
use crate::coords::{ecef2pos, sunmoonpos, xyz2enu, ErpVal};
use crate::ephemeris::SatPos;
use crate::nav::{Nav, Pcv};
use crate::obs::ObsData;
use crate::signal::NFREQ;
use crate::time::{gpst2utc, GTime};
use log::debug;
use nalgebra::Vector3;

// elevation/nadir variation table lookup, 5 degree grid
fn interpvar(ang: f64, var: &[f64; 19]) -> f64 {
    let a = ang / 5.0;
    let i = a.floor() as i64;
    if i < 0 {
        return var[0];
    }
    if i >= 18 {
        return var[18];
    }
    let i = i as usize;
    var[i] * (1.0 - a + i as f64) + var[i + 1] * (a - i as f64)
}

// yaw-steered satellite body frame from position and the sun direction
fn sat_yaw_frame(
    rs: &[f64; 3],
    rsun: &Vector3<f64>,
) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let r = Vector3::new(rs[0], rs[1], rs[2]);
    let ez = (-r).try_normalize(1E-12)?;
    let es = (rsun - r).try_normalize(1E-12)?;
    let ey = ez.cross(&es).try_normalize(1E-12)?;
    let ex = ey.cross(&ez);
    Some((ex, ey, ez))
}

/// Satellite antenna phase center offset in ECEF (m), as the iono-free
/// combination of the per frequency offsets. Zero when no model is
/// loaded or the sun geometry degenerates.
pub fn satantoff(time: GTime, rs: &[f64; 3], sat: usize, nav: &Nav) -> [f64; 3] {
    let Some(pcv) = nav.satpcv(sat, time) else {
        return [0.0; 3];
    };
    let (rsun, _, _) = sunmoonpos(gpst2utc(time), &ErpVal::default());
    let Some((ex, ey, ez)) = sat_yaw_frame(rs, &rsun) else {
        return [0.0; 3];
    };
    let gamma = (FREQ1 / FREQ2) * (FREQ1 / FREQ2);
    let c1 = gamma / (gamma - 1.0);
    let c2 = -1.0 / (gamma - 1.0);

    let mut dant = [0.0; 3];
    for i in 0..3 {
        let d1 = pcv.off[0][0] * ex[i] + pcv.off[0][1] * ey[i] + pcv.off[0][2] * ez[i];
        let d2 = pcv.off[1][0] * ex[i] + pcv.off[1][1] * ey[i] + pcv.off[1][2] * ez[i];
        dant[i] = c1 * d1 + c2 * d2;
    }
    dant
}

/// Receiver antenna model: phase center offset projected on the line of
/// sight plus the elevation-dependent variation, per frequency. `del`
/// is the ENU antenna delta, positive up.
pub fn antmodel(pcv: &Pcv, del: &[f64; 3], azel: &[f64; 2], with_pcv: bool) -> [f64; NFREQ] {
    let cosel = azel[1].cos();
    let e = [azel[0].sin() * cosel, azel[0].cos() * cosel, azel[1].sin()];

    let mut dant = [0.0; NFREQ];
    for i in 0..NFREQ {
        let off = [
            pcv.off[i][0] + del[0],
            pcv.off[i][1] + del[1],
            pcv.off[i][2] + del[2],
        ];
        dant[i] = -(off[0] * e[0] + off[1] * e[1] + off[2] * e[2])
            + if with_pcv {
                interpvar(90.0 - azel[1] * R2D, &pcv.var[i])
            } else {
                0.0
            };
    }
    dant
}

/// Satellite antenna variation at a nadir angle (rad), per frequency.
pub fn antmodel_s(pcv: &Pcv, nadir: f64) -> [f64; NFREQ] {
    let mut dant = [0.0; NFREQ];
    for i in 0..NFREQ {
        dant[i] = interpvar(nadir * R2D, &pcv.var[i]);
    }
    dant
}

/// Carrier phase windup correction (cycles).
///
/// `phw` carries the previous value; the new one stays on the same
/// integer cycle sheet. `None` when the geometry degenerates, leaving
/// the accumulator untouched.
pub fn windupcorr(time: GTime, rs: &[f64; 3], rr: &[f64; 3], phw: &mut f64) -> Option<()> {
    let (rsun, _, _) = sunmoonpos(gpst2utc(time), &ErpVal::default());
    let (exs, eys, _ezs) = sat_yaw_frame(rs, &rsun)?;

    // receiver frame: x north, y west
    let rrv = Vector3::new(rr[0], rr[1], rr[2]);
    let pos = ecef2pos(&rrv);
    let e = xyz2enu(&pos);
    let exr = Vector3::new(e[(1, 0)], e[(1, 1)], e[(1, 2)]);
    let eyr = -Vector3::new(e[(0, 0)], e[(0, 1)], e[(0, 2)]);

    let rsv = Vector3::new(rs[0], rs[1], rs[2]);
    let ek = (rrv - rsv).try_normalize(1E-12)?;
    let eks = ek.cross(&eys);
    let ekr = ek.cross(&eyr);

    let ds = exs - ek * ek.dot(&exs) - eks;
    let dr = exr - ek * ek.dot(&exr) + ekr;
    let cosp = (ds.dot(&dr) / ds.norm() / dr.norm()).clamp(-1.0, 1.0);
    let mut ph = cosp.acos() / 2.0 / PI;
    if ek.dot(&ds.cross(&dr)) < 0.0 {
        ph = -ph;
    }
    *phw = ph + (*phw - ph + 0.5).floor();
    Some(())
}

/// Zero out positions of Block IIA satellites in Earth eclipse; their
/// yaw attitude is unpredictable there.
pub fn testeclipse(obs: &[ObsData], nav: &Nav, rs: &mut [SatPos]) {
    if obs.is_empty() {
        return;
    }
    let (rsun, _, _) = sunmoonpos(gpst2utc(obs[0].time), &ErpVal::default());
    let Some(esun) = rsun.try_normalize(1E-12) else {
        return;
    };
    for (ob, sp) in obs.iter().zip(rs.iter_mut()) {
        if let Some(pcv) = nav.satpcv(ob.sat, ob.time) {
            if !pcv.type_.is_empty() && !pcv.type_.contains("BLOCK IIA") {
                continue;
            }
        }
        let r = Vector3::new(sp.rs[0], sp.rs[1], sp.rs[2]);
        let rn = r.norm();
        if rn <= 0.0 {
            continue;
        }
        let cosa = (r.dot(&esun) / rn).clamp(-1.0, 1.0);
        let ang = cosa.acos();
        if ang < PI / 2.0 || rn * ang.sin() > RE_WGS84 {
            continue;
        }
        debug!("eclipsing sat excluded: {} sat={}", ob.time, ob.sat);
        sp.rs[..3].fill(0.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::D2R;
    use crate::time::epoch2time;

    #[test]
    fn variation_table_interpolates_and_clamps() {
        let mut var = [0.0; 19];
        for (i, v) in var.iter_mut().enumerate() {
            *v = i as f64 * 0.001;
        }
        assert!((interpvar(0.0, &var)).abs() < 1E-12);
        assert!((interpvar(7.5, &var) - 0.0015).abs() < 1E-12);
        assert!((interpvar(120.0, &var) - 0.018).abs() < 1E-12);
        assert!((interpvar(-5.0, &var)).abs() < 1E-12);
    }

    #[test]
    fn receiver_offset_projects_on_line_of_sight() {
        let pcv = Pcv {
            off: [[0.0, 0.0, 0.1]; NFREQ], // 10 cm up
            ..Default::default()
        };
        let del = [0.0; 3];
        // zenith: full up offset seen as -0.1 m range change
        let d = antmodel(&pcv, &del, &[0.0, 90.0 * D2R], false);
        assert!((d[0] + 0.1).abs() < 1E-9);
        // horizon: no up projection
        let d = antmodel(&pcv, &del, &[0.0, 0.001], false);
        assert!(d[0].abs() < 1E-3);
    }

    #[test]
    fn windup_stays_on_cycle_sheet() {
        let t = epoch2time(&[2023.0, 6.0, 1.0, 12.0, 0.0, 0.0]);
        let rs = [26560E3, 0.0, 0.0];
        let rr = [RE_WGS84, 0.0, 0.0];
        let mut phw = 0.0;
        windupcorr(t, &rs, &rr, &mut phw).unwrap();
        let first = phw;
        assert!(first.abs() < 0.5);
        // seeding the accumulator 3 cycles away keeps the integer sheet
        let mut phw3 = first + 3.0;
        windupcorr(t, &rs, &rr, &mut phw3).unwrap();
        assert!((phw3 - first - 3.0).abs() < 1E-9);
    }

    #[test]
    fn eclipse_zeroes_block_iia_behind_earth() {
        let t = epoch2time(&[2023.0, 6.0, 1.0, 12.0, 0.0, 0.0]);
        let (rsun, _, _) = sunmoonpos(gpst2utc(t), &ErpVal::default());
        let esun = rsun.normalize();
        let sat = crate::sv::satno(crate::sv::Sys::Gps, 9).unwrap();
        let mut nav = Nav::new();
        nav.pcvs.push(Pcv {
            sat,
            type_: "BLOCK IIA".into(),
            ..Default::default()
        });
        let obs = vec![ObsData {
            time: t,
            sat,
            ..Default::default()
        }];
        // directly behind the earth on the anti-sun axis
        let r = -esun * 26560E3;
        let mut rs = vec![SatPos {
            rs: [r[0], r[1], r[2], 0.0, 0.0, 0.0],
            svh: 0,
            ..Default::default()
        }];
        testeclipse(&obs, &nav, &mut rs);
        assert_eq!(&rs[0].rs[..3], &[0.0, 0.0, 0.0]);
    }
}
