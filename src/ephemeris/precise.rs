//! Precise SP3/CLK products.
//!
//! Neville polynomial interpolation of the orbit series, linear
//! interpolation of the clock series, extrapolation error inflation at
//! the table edges and the conventional relativity term.

use super::SatPos;
use crate::antenna::satantoff;
use crate::constants::{CLIGHT, OMGE};
use crate::nav::Nav;
use crate::time::{timeadd, timediff, GTime};
use log::debug;

/// Interpolation polynomial order + 1.
const NMAX: usize = 10;
/// Max time span outside the product table (s).
const MAXDTE: f64 = 900.0;
/// Clock extrapolation error growth (m/s).
const EXTERR_CLK: f64 = 1E-3;
/// Orbit extrapolation error growth (m/s²).
const EXTERR_EPH: f64 = 5E-7;

fn sqr(x: f64) -> f64 {
    x * x
}

// Neville's algorithm, consumes y
fn interppol(x: &[f64], y: &mut [f64]) -> f64 {
    let n = x.len();
    for j in 1..n {
        for i in 0..n - j {
            y[i] = (x[i + j] * y[i] - x[i] * y[i + 1]) / (x[i + j] - x[i]);
        }
    }
    y[0]
}

// position + clock from the SP3 series
fn pephpos(time: GTime, sat: usize, nav: &Nav) -> Option<([f64; 3], f64, f64)> {
    let peph = &nav.peph;
    if peph.len() < NMAX + 1
        || timediff(time, peph[0].time) < -MAXDTE
        || timediff(time, peph[peph.len() - 1].time) > MAXDTE
    {
        debug!("no precise ephemeris: {time} sat={sat}");
        return None;
    }
    // bracketing index, then a window of NMAX+1 epochs around it
    let index = peph.partition_point(|p| timediff(p.time, time) < 0.0);
    let mut i = index.saturating_sub((NMAX + 1) / 2);
    if i + NMAX >= peph.len() {
        i = peph.len() - NMAX - 1;
    }

    let mut t = [0.0; NMAX + 1];
    let mut p = [[0.0; NMAX + 1]; 3];
    for j in 0..=NMAX {
        let pos = &peph[i + j].pos[sat - 1];
        if pos[0] * pos[0] + pos[1] * pos[1] + pos[2] * pos[2] <= 0.0 {
            return None;
        }
        t[j] = timediff(peph[i + j].time, time);
        // undo earth rotation over the interpolation interval
        let (sinl, cosl) = (OMGE * t[j]).sin_cos();
        p[0][j] = cosl * pos[0] - sinl * pos[1];
        p[1][j] = sinl * pos[0] + cosl * pos[1];
        p[2][j] = pos[2];
    }
    let rs = [
        interppol(&t, &mut p[0]),
        interppol(&t, &mut p[1]),
        interppol(&t, &mut p[2]),
    ];

    let sd = &peph[index.min(peph.len() - 1)].std[sat - 1];
    let mut std = (sqr(sd[0] as f64) + sqr(sd[1] as f64) + sqr(sd[2] as f64)).sqrt();
    if t[0] > 0.0 {
        std += EXTERR_EPH * sqr(t[0]) / 2.0;
    } else if t[NMAX] < 0.0 {
        std += EXTERR_EPH * sqr(t[NMAX]) / 2.0;
    }

    // SP3 clock as fallback when no CLK product is loaded
    let k = index.clamp(1, peph.len() - 1);
    let c = [peph[k - 1].pos[sat - 1][3], peph[k].pos[sat - 1][3]];
    let t0 = timediff(time, peph[k - 1].time);
    let t1 = timediff(time, peph[k].time);
    let dts = if c[0] != 0.0 && c[1] != 0.0 {
        (c[1] * t0 - c[0] * t1) / (t0 - t1)
    } else if c[0] != 0.0 {
        c[0]
    } else {
        c[1]
    };
    Some((rs, dts, sqr(std)))
}

// clock from the CLK series
fn pephclk(time: GTime, sat: usize, nav: &Nav) -> Option<(f64, f64)> {
    let pclk = &nav.pclk;
    if pclk.len() < 2
        || timediff(time, pclk[0].time) < -MAXDTE
        || timediff(time, pclk[pclk.len() - 1].time) > MAXDTE
    {
        return None;
    }
    let index = pclk
        .partition_point(|p| timediff(p.time, time) < 0.0)
        .clamp(1, pclk.len() - 1);

    let t = [
        timediff(time, pclk[index - 1].time),
        timediff(time, pclk[index].time),
    ];
    let c = [pclk[index - 1].clk[sat - 1], pclk[index].clk[sat - 1]];

    let (dts, std) = if t[0] <= 0.0 {
        if c[0] == 0.0 {
            return None;
        }
        (c[0], pclk[index - 1].std[sat - 1] as f64 * CLIGHT - EXTERR_CLK * t[0])
    } else if t[1] >= 0.0 {
        if c[1] == 0.0 {
            return None;
        }
        (c[1], pclk[index].std[sat - 1] as f64 * CLIGHT + EXTERR_CLK * t[1])
    } else {
        if c[0] == 0.0 || c[1] == 0.0 {
            return None;
        }
        let dts = (c[1] * t[0] - c[0] * t[1]) / (t[0] - t[1]);
        let i = if t[0] < -t[1] { 0 } else { 1 };
        (
            dts,
            pclk[index - 1 + i].std[sat - 1] as f64 * CLIGHT + EXTERR_CLK * t[i].abs(),
        )
    };
    Some((dts, sqr(std)))
}

/// Satellite position, velocity and clock from precise products.
///
/// The CLK series supplies the clock when loaded; otherwise the SP3
/// clock column is used, and a missing clock is reported as zero so the
/// caller can fall back to the broadcast one. With `antoff` the
/// center-of-mass position is shifted to the antenna phase center.
pub fn peph2pos(time: GTime, sat: usize, nav: &Nav, antoff: bool) -> Option<SatPos> {
    let tt = 1E-3;

    let (rss, dts0, varp) = pephpos(time, sat, nav)?;
    let clk0 = pephclk(time, sat, nav);
    let (rst, dts1, _) = pephpos(timeadd(time, tt), sat, nav)?;
    let clk1 = pephclk(timeadd(time, tt), sat, nav);

    let (mut dtss, mut dtst, varc) = match (clk0, clk1) {
        (Some((c0, vc)), Some((c1, _))) => (c0, c1, vc),
        _ => (dts0, dts1, 0.0),
    };

    let mut out = SatPos {
        svh: 0,
        var: varp + varc,
        ..Default::default()
    };
    for i in 0..3 {
        out.rs[i] = rss[i];
        out.rs[i + 3] = (rst[i] - rss[i]) / tt;
    }
    if antoff {
        let dant = satantoff(time, &rss, sat, nav);
        for i in 0..3 {
            out.rs[i] += dant[i];
        }
    }
    if dtss != 0.0 {
        // conventional periodic relativity correction
        let rel = 2.0
            * (out.rs[0] * out.rs[3] + out.rs[1] * out.rs[4] + out.rs[2] * out.rs[5])
            / CLIGHT
            / CLIGHT;
        dtst = (dtst - dtss) / tt;
        dtss -= rel;
        out.dts = [dtss, dtst];
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nav::PEph;
    use crate::sv::{satno, Sys};
    use crate::time::gpst2time;

    // circular orbit sampled every 900 s; interpolation must recover an
    // interior point to well below a meter
    #[test]
    fn interpolates_circular_orbit() {
        let sat = satno(Sys::Gps, 8).unwrap();
        let mut nav = Nav::new();
        let r = 26560E3;
        let n = (crate::constants::MU_GPS / (r * r * r)).sqrt();
        let t0 = gpst2time(2200, 0.0);
        for k in 0..16 {
            let t = k as f64 * 900.0;
            let mut pe = PEph::new(timeadd(t0, t));
            let a = n * t;
            pe.pos[sat - 1] = [r * a.cos(), r * a.sin(), 0.0, 1E-4];
            nav.peph.push(pe);
        }
        let t = 6000.0; // between samples
        let sp = peph2pos(timeadd(t0, t), sat, &nav, false).unwrap();
        let a = n * t;
        // the stored orbit is inertial-circular while the samples are
        // treated as ECEF; compare against the same rotation treatment
        let mut tt = [0.0; NMAX + 1];
        let mut px = [0.0; NMAX + 1];
        let mut py = [0.0; NMAX + 1];
        let index = nav
            .peph
            .partition_point(|p| timediff(p.time, timeadd(t0, t)) < 0.0);
        let i0 = index - (NMAX + 1) / 2;
        for j in 0..=NMAX {
            let tk = (i0 + j) as f64 * 900.0 - t;
            tt[j] = tk;
            let ak = n * ((i0 + j) as f64 * 900.0);
            let (sinl, cosl) = (OMGE * tk).sin_cos();
            px[j] = cosl * r * ak.cos() - sinl * r * ak.sin();
            py[j] = sinl * r * ak.cos() + cosl * r * ak.sin();
        }
        let ex = interppol(&tt, &mut px);
        let ey = interppol(&tt, &mut py);
        assert!((sp.rs[0] - ex).abs() < 1E-3, "x {} vs {}", sp.rs[0], ex);
        assert!((sp.rs[1] - ey).abs() < 1E-3);
        let _ = a;
        // SP3 clock column picked up, relativity applied
        assert!((sp.dts[0] - 1E-4).abs() < 1E-6);
        assert_eq!(sp.svh, 0);
    }

    #[test]
    fn rejects_outside_table() {
        let sat = satno(Sys::Gps, 8).unwrap();
        let mut nav = Nav::new();
        let t0 = gpst2time(2200, 0.0);
        for k in 0..12 {
            let mut pe = PEph::new(timeadd(t0, k as f64 * 900.0));
            pe.pos[sat - 1] = [26560E3, 0.0, 0.0, 0.0];
            nav.peph.push(pe);
        }
        assert!(peph2pos(timeadd(t0, -MAXDTE - 1.0), sat, &nav, false).is_none());
        assert!(peph2pos(timeadd(t0, 11.0 * 900.0 + MAXDTE + 1.0), sat, &nav, false).is_none());
    }

    #[test]
    fn neville_recovers_polynomial() {
        // exact for a cubic
        let x = [-3.0, -2.0, -1.0, 0.5, 1.5, 2.5];
        let f = |t: f64| 1.0 + 2.0 * t - 0.5 * t * t + 0.25 * t * t * t;
        let mut y: Vec<f64> = x.iter().map(|&t| f(t)).collect();
        let v = interppol(&x, &mut y);
        assert!((v - f(0.0)).abs() < 1E-10);
    }
}
