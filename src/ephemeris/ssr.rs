//! SSR orbit/clock corrections (RTCM state space representation).

use super::{ephpos, SatPos};
use crate::antenna::satantoff;
use crate::config::EphOpt;
use crate::constants::CLIGHT;
use crate::nav::Nav;
use crate::time::{timediff, GTime};
use log::{debug, warn};

/// Max age of SSR orbit and clock corrections (s).
const MAXAGESSR: f64 = 90.0;
/// Max age of the high rate clock correction (s).
const MAXAGESSR_HRCLK: f64 = 10.0;
/// Max SSR orbit correction magnitude (m).
const MAXECORSSR: f64 = 10.0;
/// Max SSR clock correction magnitude (m).
const MAXCCORSSR: f64 = 1E-6 * CLIGHT;

/// Default variance when the URA slot is unset (m).
const DEFURASSR: f64 = 0.15;

fn sqr(x: f64) -> f64 {
    x * x
}

// SSR URA value (RTCM DF389 encoding) to variance
fn var_urassr(ura: i32) -> f64 {
    if ura <= 0 {
        return sqr(DEFURASSR);
    }
    if ura >= 63 {
        return sqr(5.4665);
    }
    let std = (3f64.powi((ura >> 3) & 7) * (1.0 + (ura & 7) as f64 / 4.0) - 1.0) * 1E-3;
    sqr(std)
}

/// Satellite position with SSR orbit/clock corrections applied.
///
/// The radial/along/cross deltas are rotated into ECEF with the orbit
/// normal basis from the broadcast state at the correction's IODE.
/// `EphOpt::SsrCom` additionally shifts the antenna phase center to the
/// center of mass.
pub fn satpos_ssr(
    time: GTime,
    teph: GTime,
    sat: usize,
    ephopt: EphOpt,
    nav: &Nav,
) -> Option<SatPos> {
    let ssr = &nav.ssr[sat - 1];
    if ssr.t0[0].is_zero() || ssr.t0[1].is_zero() {
        debug!("no ssr correction: {time} sat={sat}");
        return None;
    }
    // ages referenced to the middle of the update interval
    let mut t1 = timediff(time, ssr.t0[0]);
    let mut t2 = timediff(time, ssr.t0[1]);
    let t3 = timediff(time, ssr.t0[2]);
    if ssr.udi[0] >= 1.0 {
        t1 -= ssr.udi[0] / 2.0;
    }
    if ssr.udi[1] >= 1.0 {
        t2 -= ssr.udi[1] / 2.0;
    }
    if t1.abs() > MAXAGESSR || t2.abs() > MAXAGESSR {
        debug!("age of ssr error: {time} sat={sat} t={t1:.0} {t2:.0}");
        return None;
    }
    if ssr.iod[0] != ssr.iod[1] {
        debug!("inconsistent ssr iod: {time} sat={sat}");
        return None;
    }
    let deph = [
        ssr.deph[0] + ssr.ddeph[0] * t1,
        ssr.deph[1] + ssr.ddeph[1] * t1,
        ssr.deph[2] + ssr.ddeph[2] * t1,
    ];
    let mut dclk = ssr.dclk[0] + ssr.dclk[1] * t2 + ssr.dclk[2] * t2 * t2;

    // high rate clock, only with a matching issue of data
    if !ssr.t0[2].is_zero() && ssr.iod[2] == ssr.iod[0] && t3.abs() < MAXAGESSR_HRCLK {
        dclk += ssr.hrclk;
    }
    if (deph[0] * deph[0] + deph[1] * deph[1] + deph[2] * deph[2]).sqrt() > MAXECORSSR
        || dclk.abs() > MAXCCORSSR
    {
        warn!("invalid ssr correction: {time} sat={sat} deph={deph:?} dclk={dclk:.3}");
        return None;
    }

    let mut sp = ephpos(time, teph, sat, nav, ssr.iode)?;

    // radial/along/cross basis from position and velocity
    let r = [sp.rs[0], sp.rs[1], sp.rs[2]];
    let v = [sp.rs[3], sp.rs[4], sp.rs[5]];
    let vn = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if vn <= 0.0 {
        return None;
    }
    let ea = [v[0] / vn, v[1] / vn, v[2] / vn];
    let rc = [
        r[1] * v[2] - r[2] * v[1],
        r[2] * v[0] - r[0] * v[2],
        r[0] * v[1] - r[1] * v[0],
    ];
    let rcn = (rc[0] * rc[0] + rc[1] * rc[1] + rc[2] * rc[2]).sqrt();
    if rcn <= 0.0 {
        warn!("invalid ssr orbit basis: {time} sat={sat}");
        return None;
    }
    let ec = [rc[0] / rcn, rc[1] / rcn, rc[2] / rcn];
    let er = [
        ea[1] * ec[2] - ea[2] * ec[1],
        ea[2] * ec[0] - ea[0] * ec[2],
        ea[0] * ec[1] - ea[1] * ec[0],
    ];

    let dant = if ephopt == EphOpt::SsrCom {
        satantoff(time, &r, sat, nav)
    } else {
        [0.0; 3]
    };
    for i in 0..3 {
        sp.rs[i] += -(er[i] * deph[0] + ea[i] * deph[1] + ec[i] * deph[2]) + dant[i];
    }
    // t_sat = t_brdc + dclk; sign matches the broadcast clock convention
    sp.dts[0] += dclk / CLIGHT;
    sp.var = var_urassr(ssr.ura);
    Some(sp)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nav::Eph;
    use crate::sv::{satno, Sys};
    use crate::time::{gpst2time, timeadd};

    fn nav_with_eph(sat: usize, t0: GTime, iode: i32) -> Nav {
        let mut nav = Nav::new();
        nav.eph.push(Eph {
            sat,
            iode,
            toe: t0,
            toc: t0,
            a: 26560E3,
            e: 0.01,
            i0: 0.96,
            ..Default::default()
        });
        nav
    }

    #[test]
    fn radial_correction_moves_along_position_axis() {
        let sat = satno(Sys::Gps, 12).unwrap();
        let t0 = gpst2time(2200, 7200.0);
        let mut nav = nav_with_eph(sat, t0, 50);
        {
            let ssr = &mut nav.ssr[sat - 1];
            ssr.t0 = [t0; 6];
            ssr.iod = [7; 6];
            ssr.iode = 50;
            ssr.deph = [1.0, 0.0, 0.0];
            ssr.dclk = [0.5, 0.0, 0.0];
        }
        let plain = ephpos(t0, t0, sat, &nav, 50).unwrap();
        let sp = satpos_ssr(t0, t0, sat, EphOpt::SsrApc, &nav).unwrap();

        let dr = [
            sp.rs[0] - plain.rs[0],
            sp.rs[1] - plain.rs[1],
            sp.rs[2] - plain.rs[2],
        ];
        let rn = (plain.rs[0].powi(2) + plain.rs[1].powi(2) + plain.rs[2].powi(2)).sqrt();
        // radial +1 m moves the satellite toward the geocenter projection
        let along_r =
            (dr[0] * plain.rs[0] + dr[1] * plain.rs[1] + dr[2] * plain.rs[2]) / rn;
        assert!((along_r.abs() - 1.0).abs() < 0.05, "radial {along_r}");
        assert!((sp.dts[0] - plain.dts[0] - 0.5 / CLIGHT).abs() < 1E-15);
        assert!((sp.var - sqr(DEFURASSR)).abs() < 1E-12);
    }

    #[test]
    fn stale_correction_rejected() {
        let sat = satno(Sys::Gps, 12).unwrap();
        let t0 = gpst2time(2200, 7200.0);
        let mut nav = nav_with_eph(sat, t0, 50);
        {
            let ssr = &mut nav.ssr[sat - 1];
            ssr.t0 = [timeadd(t0, -(MAXAGESSR + 1.0)); 6];
            ssr.iod = [7; 6];
            ssr.iode = 50;
        }
        assert!(satpos_ssr(t0, t0, sat, EphOpt::SsrApc, &nav).is_none());
    }

    #[test]
    fn oversized_correction_rejected() {
        let sat = satno(Sys::Gps, 12).unwrap();
        let t0 = gpst2time(2200, 7200.0);
        let mut nav = nav_with_eph(sat, t0, 50);
        {
            let ssr = &mut nav.ssr[sat - 1];
            ssr.t0 = [t0; 6];
            ssr.iod = [7; 6];
            ssr.iode = 50;
            ssr.deph = [MAXECORSSR + 0.1, 0.0, 0.0];
        }
        assert!(satpos_ssr(t0, t0, sat, EphOpt::SsrApc, &nav).is_none());
    }

    #[test]
    fn iod_mismatch_rejected() {
        let sat = satno(Sys::Gps, 12).unwrap();
        let t0 = gpst2time(2200, 7200.0);
        let mut nav = nav_with_eph(sat, t0, 50);
        {
            let ssr = &mut nav.ssr[sat - 1];
            ssr.t0 = [t0; 6];
            ssr.iod = [7, 8, 7, 7, 7, 7];
            ssr.iode = 50;
        }
        assert!(satpos_ssr(t0, t0, sat, EphOpt::SsrApc, &nav).is_none());
    }

    #[test]
    fn ura_encoding() {
        assert!((var_urassr(0) - sqr(0.15)).abs() < 1E-12);
        assert!(var_urassr(63) > sqr(5.0));
        // class 1 value 0: (3^1 * 1 - 1) mm
        assert!((var_urassr(8) - sqr(2E-3)).abs() < 1E-12);
    }
}
