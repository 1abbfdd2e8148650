//! SBAS fast/long term corrections and ionosphere grid.

use super::{ephpos, SatPos};
use crate::bias::iono::ionppp;
use crate::constants::{CLIGHT, R2D};
use crate::nav::{Nav, SbsSatCorr};
use crate::time::{timediff, GTime};
use log::debug;

/// Max age of a fast correction (s).
const MAXSBSAGEF: f64 = 30.0;
/// Max age of a long term correction (s).
const MAXSBSAGEL: f64 = 1800.0;

/// Ionosphere single layer height used by SBAS (m).
const HION_SBS: f64 = 350E3;
/// Earth radius used by the SBAS pierce point model (m).
const RE_SBS: f64 = 6378.1363E3;

/// UDRE index to variance (m²), DO-229.
const VAR_UDRE: [f64; 14] = [
    0.052, 0.0924, 0.1444, 0.283, 0.4678, 0.8315, 1.2992, 1.8709, 2.5465, 3.326, 5.1968, 20.787,
    230.9661, 2078.695,
];

/// GIVE index to variance (m²), DO-229.
const VAR_GIVE: [f64; 15] = [
    0.0084, 0.0333, 0.0749, 0.1331, 0.2079, 0.2994, 0.4075, 0.5322, 0.6735, 0.8315, 1.1974,
    1.8709, 3.326, 20.787, 187.0826,
];

/// Variance of a UDRE index; `None` for "not monitored" / "do not use".
pub fn varicorr(udre: i32) -> Option<f64> {
    VAR_UDRE.get(udre as usize).copied()
}

fn varigp(give: i32) -> Option<f64> {
    VAR_GIVE.get(give as usize).copied()
}

// apply the fast + long term correction to a broadcast state
fn sbssatcorr(time: GTime, corr: &SbsSatCorr, sp: &mut SatPos) -> Option<()> {
    // long term orbit/clock
    let tl = timediff(time, corr.lcor.t0);
    if corr.lcor.t0.is_zero() || tl.abs() > MAXSBSAGEL {
        debug!("sbas long term correction expired: {time} sat={}", corr.sat);
        return None;
    }
    for i in 0..3 {
        sp.rs[i] += corr.lcor.dpos[i] + corr.lcor.dvel[i] * tl;
    }
    let ddts = corr.lcor.daf0 + corr.lcor.daf1 * tl;

    // fast pseudorange correction
    let tf = timediff(time, corr.fcor.t0);
    if corr.fcor.t0.is_zero() || tf.abs() > MAXSBSAGEF {
        debug!("sbas fast correction expired: {time} sat={}", corr.sat);
        return None;
    }
    let prc = corr.fcor.prc + corr.fcor.rrc * tf;

    sp.dts[0] += ddts + prc / CLIGHT;
    sp.var = varicorr(corr.fcor.udre)?;
    Some(())
}

/// Satellite position with SBAS fast/long corrections applied.
///
/// Falls back to plain broadcast when no correction slot carries this
/// satellite; an expired or unusable correction is a hard failure.
pub fn satpos_sbas(time: GTime, teph: GTime, sat: usize, nav: &Nav) -> Option<SatPos> {
    let Some(corr) = nav.sbssat.sats.iter().find(|c| c.sat == sat) else {
        return ephpos(time, teph, sat, nav, -1);
    };
    let mut sp = ephpos(time, teph, sat, nav, corr.lcor.iode)?;
    sbssatcorr(time, corr, &mut sp)?;
    Some(sp)
}

/// SBAS grid ionosphere correction.
///
/// Bilinear interpolation of the four IGPs around the pierce point,
/// scaled by the slant factor. Returns `(L1 slant delay (m), variance)`.
pub fn sbsioncorr(time: GTime, pos: &[f64; 3], azel: &[f64; 2], nav: &Nav) -> Option<(f64, f64)> {
    if pos[2] < -1E3 || azel[1] <= 0.0 {
        return Some((0.0, 0.0));
    }
    let (posp, fp) = ionppp(pos, azel, RE_SBS, HION_SBS);
    let latp = posp[0] * R2D;
    let lonp = posp[1] * R2D;

    // 5 degree cell corners
    let lat0 = (latp / 5.0).floor() * 5.0;
    let lon0 = (lonp / 5.0).floor() * 5.0;
    let x = (lonp - lon0) / 5.0;
    let y = (latp - lat0) / 5.0;
    let w = [
        (1.0 - x) * (1.0 - y),
        x * (1.0 - y),
        (1.0 - x) * y,
        x * y,
    ];
    let corners = [
        (lat0, lon0),
        (lat0, lon0 + 5.0),
        (lat0 + 5.0, lon0),
        (lat0 + 5.0, lon0 + 5.0),
    ];

    let mut delay = 0.0;
    let mut var = 0.0;
    for (k, &(lat, lon)) in corners.iter().enumerate() {
        let igp = nav
            .sbsion
            .iter()
            .flat_map(|band| band.igps.iter())
            .find(|g| {
                (g.lat - lat).abs() < 0.1 && (g.lon - lon).abs() < 0.1 && !g.t0.is_zero()
            })?;
        if timediff(time, igp.t0).abs() > 600.0 {
            debug!("sbas igp expired: {time} lat={lat} lon={lon}");
            return None;
        }
        delay += w[k] * igp.delay;
        var += w[k] * varigp(igp.give)?;
    }
    Some((fp * delay, fp * fp * var))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::D2R;
    use crate::nav::{SbsFcor, SbsIgp, SbsIon, SbsLcor, SEph};
    use crate::sv::{satno, Sys};
    use crate::time::{gpst2time, timeadd};

    #[test]
    fn fast_and_long_corrections_apply() {
        let sat = satno(Sys::Gps, 4).unwrap();
        let t0 = gpst2time(2200, 3600.0);
        let mut nav = Nav::new();
        nav.eph.push(crate::nav::Eph {
            sat,
            iode: 33,
            toe: t0,
            toc: t0,
            a: 26560E3,
            e: 0.01,
            i0: 0.96,
            ..Default::default()
        });
        nav.sbssat.sats.push(SbsSatCorr {
            sat,
            fcor: SbsFcor {
                t0: timeadd(t0, -5.0),
                prc: 1.5,
                rrc: 0.0,
                udre: 3,
                ..Default::default()
            },
            lcor: SbsLcor {
                t0: timeadd(t0, -60.0),
                iode: 33,
                dpos: [2.0, 0.0, 0.0],
                dvel: [0.0; 3],
                daf0: 1E-8,
                daf1: 0.0,
            },
        });
        let plain = ephpos(t0, t0, sat, &nav, 33).unwrap();
        let sp = satpos_sbas(t0, t0, sat, &nav).unwrap();
        assert!((sp.rs[0] - plain.rs[0] - 2.0).abs() < 1E-9);
        assert!((sp.dts[0] - plain.dts[0] - 1E-8 - 1.5 / crate::constants::CLIGHT).abs() < 1E-15);
        assert!((sp.var - VAR_UDRE[3]).abs() < 1E-12);
    }

    #[test]
    fn missing_slot_falls_back_to_broadcast() {
        let sat = satno(Sys::Sbs, 138).unwrap();
        let t0 = gpst2time(2200, 0.0);
        let mut nav = Nav::new();
        nav.seph.push(SEph {
            sat,
            t0,
            pos: [42164E3, 0.0, 0.0],
            ..Default::default()
        });
        let sp = satpos_sbas(t0, t0, sat, &nav).unwrap();
        assert!((sp.rs[0] - 42164E3).abs() < 1.0);
        assert_eq!(sp.svh, 0);
    }

    #[test]
    fn expired_fast_correction_rejected() {
        let sat = satno(Sys::Gps, 4).unwrap();
        let t0 = gpst2time(2200, 3600.0);
        let mut nav = Nav::new();
        nav.eph.push(crate::nav::Eph {
            sat,
            iode: 33,
            toe: t0,
            toc: t0,
            a: 26560E3,
            e: 0.01,
            i0: 0.96,
            ..Default::default()
        });
        nav.sbssat.sats.push(SbsSatCorr {
            sat,
            fcor: SbsFcor {
                t0: timeadd(t0, -MAXSBSAGEF - 1.0),
                prc: 1.5,
                udre: 3,
                ..Default::default()
            },
            lcor: SbsLcor {
                t0,
                iode: 33,
                ..Default::default()
            },
        });
        assert!(satpos_sbas(t0, t0, sat, &nav).is_none());
    }

    #[test]
    fn grid_interpolation_center_of_cell() {
        let t0 = gpst2time(2200, 0.0);
        let mut nav = Nav::new();
        let mut band = SbsIon::default();
        for (lat, lon, delay) in [
            (35.0, 135.0, 2.0),
            (35.0, 140.0, 4.0),
            (40.0, 135.0, 6.0),
            (40.0, 140.0, 8.0),
        ] {
            band.igps.push(SbsIgp {
                t0,
                lat,
                lon,
                give: 2,
                delay,
            });
        }
        nav.sbsion.push(band);

        // zenith from the cell center pierces the layer at the center
        let pos = [37.5 * D2R, 137.5 * D2R, 0.0];
        let azel = [0.0, 90.0 * D2R];
        let (delay, var) = sbsioncorr(t0, &pos, &azel, &nav).unwrap();
        assert!((delay - 5.0).abs() < 1E-9, "delay {delay}");
        assert!((var - VAR_GIVE[2]).abs() < 1E-12);
    }
}
