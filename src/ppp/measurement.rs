//! PPP measurement model: corrected observables, residual stacking and
//! the prefit/postfit screening gates.

use super::{ib, ic, id_dcb, ii, it, nf, Rtk, THRES_REJECT};
use crate::antenna::{antmodel, antmodel_s, windupcorr};
use crate::bias::iono::{ionmapf, ionmodel, iontec};
use crate::bias::tropo::{tropmodel, tropmapf, REL_HUMI};
use crate::config::{Config, IonoOpt, TropOpt};
use crate::constants::{CLIGHT, FREQ1, PI, R2D};
use crate::coords::{ecef2pos, geodist, satazel};
use crate::ephemeris::{sbsioncorr, SatPos};
use crate::nav::{Nav, Pcv};
use crate::obs::ObsData;
use crate::signal::NFREQ;
use crate::sv::{satexclude, satsys, Sys};
use crate::time::GTime;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Vector3};

/// GLONASS inter-frequency code bias variance (m²).
const VAR_GLO_IFB: f64 = 0.6 * 0.6;

fn sqr(x: f64) -> f64 {
    x * x
}

// receiver clock slot of a constellation
fn sysslot(sys: Sys) -> usize {
    match sys {
        Sys::Glo => 1,
        Sys::Gal => 2,
        Sys::Qzs => 3,
        Sys::Bds => 4,
        Sys::Irn => 5,
        _ => 0,
    }
}

// measurement variance per row
fn varerr(sys: Sys, el: f64, snr: f64, f: usize, code: bool, rcvstd: f64, opt: &Config) -> f64 {
    let mut fact = match sys {
        Sys::Glo => 1.5,
        Sys::Sbs => 3.0,
        _ => 1.0,
    };
    if code {
        fact *= opt.err.eratio[f.min(NFREQ - 1)];
    }
    if opt.ionoopt == IonoOpt::Iflc {
        fact *= 3.0;
    }
    let sinel = el.sin();
    let mut var = sqr(opt.err.a) + sqr(opt.err.b / sinel);
    if opt.err.d > 0.0 && opt.err.snr_max > 0.0 {
        var += sqr(opt.err.d) * 10f64.powf(0.1 * (opt.err.snr_max - snr).max(0.0));
    }
    var *= sqr(fact);
    if opt.err.e > 0.0 {
        var += sqr(opt.err.e * rcvstd);
    }
    var
}

/// Phase and code observables corrected for antenna phase centers,
/// phase windup and P1-C1/P2-C2 receiver code biases, plus their
/// ionosphere-free combinations (all in meters, zero when unusable).
pub(crate) fn corr_meas(
    ob: &ObsData,
    nav: &Nav,
    azel: &[f64; 2],
    opt: &Config,
    dantr: &[f64; NFREQ],
    dants: &[f64; NFREQ],
    phw: f64,
) -> ([f64; NFREQ], [f64; NFREQ], f64, f64) {
    let mut l = [0.0; NFREQ];
    let mut p = [0.0; NFREQ];
    let mut freq = [0.0; NFREQ];
    let sys = satsys(ob.sat).map(|(s, _)| s);

    for i in 0..NFREQ {
        freq[i] = nav.sat2freq(ob.sat, ob.code[i]);
        if freq[i] == 0.0 || ob.l[i] == 0.0 || ob.p[i] == 0.0 {
            continue;
        }
        if !opt.snrmask.test(0, i, azel[1], ob.snr[i]) {
            continue;
        }
        l[i] = ob.l[i] * CLIGHT / freq[i] - dants[i] - dantr[i] - phw * CLIGHT / freq[i];
        p[i] = ob.p[i] - dants[i] - dantr[i];

        // C1->P1, C2->P2 receiver code bias alignment
        if matches!(sys, Some(Sys::Gps) | Some(Sys::Glo)) {
            match ob.code[i].obs() {
                "1C" => p[i] += nav.cbias[ob.sat - 1][1],
                "2C" => p[i] += nav.cbias[ob.sat - 1][2],
                _ => {}
            }
        }
    }
    if freq[0] == 0.0 || freq[1] == 0.0 || l[0] == 0.0 || l[1] == 0.0 || p[0] == 0.0 || p[1] == 0.0
    {
        return (l, p, 0.0, 0.0);
    }
    let c1 = sqr(freq[0]) / (sqr(freq[0]) - sqr(freq[1]));
    let c2 = -sqr(freq[1]) / (sqr(freq[0]) - sqr(freq[1]));
    (l, p, c1 * l[0] + c2 * l[1], c1 * p[0] + c2 * p[1])
}

// slant troposphere delay, gradient jacobians and variance
fn model_trop(
    time: GTime,
    pos: &[f64; 3],
    azel: &[f64; 2],
    x: &DVector<f64>,
    opt: &Config,
) -> Option<(f64, [f64; 3], f64)> {
    match opt.tropopt {
        TropOpt::Off => Some((0.0, [0.0; 3], 0.0)),
        TropOpt::Saas | TropOpt::Sbas => {
            let (dtrp, var) = tropmodel(time, pos, azel, REL_HUMI);
            Some((dtrp, [0.0; 3], var))
        }
        TropOpt::Est | TropOpt::Estg => {
            let i = it(opt);
            let zazel = [0.0, PI / 2.0];
            let (zhd, _) = tropmodel(time, pos, &zazel, 0.0);
            let (m_h, mut m_w) = tropmapf(time, pos, azel);
            let mut dtdx = [0.0; 3];
            if opt.tropopt == TropOpt::Estg && azel[1] > 0.0 {
                let cotz = 1.0 / azel[1].tan();
                let grad_n = m_w * cotz * azel[0].cos();
                let grad_e = m_w * cotz * azel[0].sin();
                m_w += grad_n * x[i + 1] + grad_e * x[i + 2];
                dtdx[1] = grad_n * (x[i] - zhd);
                dtdx[2] = grad_e * (x[i] - zhd);
            }
            dtdx[0] = m_w;
            Some((m_h * zhd + m_w * (x[i] - zhd), dtdx, sqr(0.01)))
        }
    }
}

// vertical (Est) or slant (models) L1 ionosphere delay and variance
fn model_iono(
    time: GTime,
    pos: &[f64; 3],
    azel: &[f64; 2],
    sat: usize,
    x: &DVector<f64>,
    nav: &Nav,
    opt: &Config,
) -> Option<(f64, f64)> {
    match opt.ionoopt {
        IonoOpt::Brdc => Some(ionmodel(time, &nav.ion_gps, pos, azel)),
        IonoOpt::Tec => iontec(time, nav, pos, azel),
        IonoOpt::Sbas => sbsioncorr(time, pos, azel, nav),
        IonoOpt::Est => {
            let dion = x[ii(sat, opt)];
            (dion != 0.0).then_some((dion, 0.0))
        }
        IonoOpt::Iflc | IonoOpt::Off => Some((0.0, 0.0)),
    }
}

// satellite antenna phase center variation from the nadir angle
fn satantpcv(rs: &[f64; 6], rr: &[f64; 3], pcv: &Pcv) -> [f64; NFREQ] {
    let sp = Vector3::new(rs[0], rs[1], rs[2]);
    let ru = Vector3::new(rr[0], rr[1], rr[2]) - sp;
    let rz = -sp;
    let cosa = (ru.dot(&rz) / (ru.norm() * rz.norm())).clamp(-1.0, 1.0);
    antmodel_s(pcv, cosa.acos())
}

/// Measurement residuals of one filter iteration.
pub struct Residuals {
    /// Innovations (m)
    pub v: DVector<f64>,
    /// Design matrix, one row per measurement
    pub h: DMatrix<f64>,
    /// Diagonal measurement covariance
    pub r: DMatrix<f64>,
}

/// Phase and code residuals against the state vector `x`.
///
/// `post == 0` applies the prefit innovation gates and returns the
/// stacked system, or `None` when nothing survives. `post > 0` screens
/// postfit residuals: the worst measurement beyond 4 sigma excludes its
/// satellite via `exc` and yields `None` so the caller retries.
#[allow(clippy::too_many_arguments)]
pub fn ppp_res(
    post: usize,
    obs: &[ObsData],
    rs: &[SatPos],
    dr: &Vector3<f64>,
    nav: &Nav,
    x: &DVector<f64>,
    rtk: &mut Rtk,
    exc: &mut [bool],
) -> Option<Residuals> {
    let opt = rtk.opt.clone();
    let nx = x.len();
    let nfreq = nf(&opt);
    let time = obs[0].time;

    let rr = [x[0] + dr[0], x[1] + dr[1], x[2] + dr[2]];
    let rrv = Vector3::new(rr[0], rr[1], rr[2]);
    let posv = ecef2pos(&rrv);
    let pos = [posv[0], posv[1], posv[2]];

    let mut v = Vec::new();
    let mut var = Vec::new();
    let mut h = Vec::new();
    // postfit outlier candidates: (obs index, carrier, residual)
    let mut ve: Vec<(usize, usize, f64)> = Vec::new();

    for (i, ob) in obs.iter().enumerate() {
        let sat = ob.sat;
        rtk.ssat[sat - 1].vs = false;
        rtk.ssat[sat - 1].vsat = [false; NFREQ];

        let sp = Vector3::new(rs[i].rs[0], rs[i].rs[1], rs[i].rs[2]);
        let Some((r, e)) = geodist(&sp, &rrv) else {
            exc[i] = true;
            continue;
        };
        let (az, el) = satazel(&posv, &e);
        rtk.ssat[sat - 1].azel = [az, el];
        if el < opt.elmin {
            exc[i] = true;
            continue;
        }
        let Some((sys, _)) = satsys(sat) else {
            exc[i] = true;
            continue;
        };
        if satexclude(sat, rs[i].var, rs[i].svh, opt.navsys, &opt.exsats) || exc[i] {
            exc[i] = true;
            continue;
        }
        rtk.ssat[sat - 1].vs = true;

        let Some((dtrp, dtdx, vart)) = model_trop(time, &pos, &[az, el], x, &opt) else {
            continue;
        };
        let Some((dion, vari)) = model_iono(time, &pos, &[az, el], sat, x, nav, &opt) else {
            continue;
        };

        // antenna phase centers and phase windup
        let dants = if opt.posopt.satpcv {
            match nav.satpcv(sat, time) {
                Some(pcv) => satantpcv(&rs[i].rs, &rr, pcv),
                None => [0.0; NFREQ],
            }
        } else {
            [0.0; NFREQ]
        };
        let dantr = antmodel(&opt.pcvr[0], &opt.antdel[0], &[az, el], opt.posopt.recpcv);
        if opt.posopt.windup {
            let rs3 = [rs[i].rs[0], rs[i].rs[1], rs[i].rs[2]];
            let mut phw = rtk.ssat[sat - 1].phw;
            if windupcorr(time, &rs3, &rr, &mut phw).is_none() {
                continue;
            }
            rtk.ssat[sat - 1].phw = phw;
        }
        let (l, p, lc, pc) = corr_meas(
            ob,
            nav,
            &[az, el],
            &opt,
            &dantr,
            &dants,
            rtk.ssat[sat - 1].phw,
        );

        // stacked rows {L1,P1,L2,P2,...} or {Lc,Pc}
        for j in 0..2 * nfreq {
            let fi = j / 2;
            let code = j % 2 == 1;
            let (y, freq, cmap) = if opt.ionoopt == IonoOpt::Iflc {
                (if code { pc } else { lc }, FREQ1, 0.0)
            } else {
                let freq = nav.sat2freq(sat, ob.code[fi]);
                if freq == 0.0 {
                    continue;
                }
                let c = sqr(FREQ1 / freq) * ionmapf(&pos, &[az, el]);
                (
                    if code { p[fi] } else { l[fi] },
                    freq,
                    if code { c } else { -c },
                )
            };
            if y == 0.0 {
                continue;
            }
            let mut hrow = vec![0.0; nx];
            for k in 0..3 {
                hrow[k] = -e[k];
            }
            let slot = sysslot(sys);
            let cdtr = x[ic(slot, &opt)];
            hrow[ic(slot, &opt)] = 1.0;

            if matches!(opt.tropopt, TropOpt::Est | TropOpt::Estg) {
                let ng = if opt.tropopt == TropOpt::Estg { 3 } else { 1 };
                for (k, d) in dtdx.iter().enumerate().take(ng) {
                    hrow[it(&opt) + k] = *d;
                }
            }
            if opt.ionoopt == IonoOpt::Est {
                hrow[ii(sat, &opt)] = cmap;
            }
            let mut dcb = 0.0;
            if fi == 2 && code && opt.nf >= 3 {
                dcb = x[id_dcb(&opt)];
                hrow[id_dcb(&opt)] = 1.0;
            }
            let mut bias = 0.0;
            if !code {
                bias = x[ib(sat, fi, &opt)];
                if bias == 0.0 {
                    continue;
                }
                hrow[ib(sat, fi, &opt)] = 1.0;
            }
            let res = y - (r + cdtr - CLIGHT * rs[i].dts[0] + dtrp + cmap * dion + dcb + bias);
            if code {
                rtk.ssat[sat - 1].resp[fi] = res;
            } else {
                rtk.ssat[sat - 1].resc[fi] = res;
            }
            // receiver reported standard deviation, RINEX quantization
            let rcvstd = if code {
                0.01 * 2f64.powi(ob.pstd[fi] as i32)
            } else {
                ob.lstd[fi] as f64 * 0.004 * CLIGHT / freq
            };
            let mut vr = varerr(sys, el, ob.snr[fi], fi, code, rcvstd, &opt)
                + vart
                + sqr(cmap) * vari
                + rs[i].var;
            if sys == Sys::Glo && code {
                vr += VAR_GLO_IFB;
            }
            debug!(
                "{time} ({post}) sat={sat} {}{} res={res:9.4} sig={:9.4} el={:4.1}",
                if code { "P" } else { "L" },
                fi + 1,
                vr.sqrt(),
                el * R2D
            );

            // prefit innovation gate
            let gate = opt.maxinno[if code { 1 } else { 0 }];
            if post == 0 && gate > 0.0 && res.abs() > gate {
                warn!("{time} outlier rejected sat={sat} f={fi} res={res:.3}");
                exc[i] = true;
                rtk.ssat[sat - 1].rejc[fi] += 1;
                continue;
            }
            if post > 0 && res.abs() > vr.sqrt() * THRES_REJECT {
                ve.push((i, fi, res));
            }
            if !code {
                rtk.ssat[sat - 1].vsat[fi] = true;
            }
            v.push(res);
            var.push(vr);
            h.extend_from_slice(&hrow);
        }
    }
    // worst postfit residual excludes its satellite for the next pass
    if post > 0 {
        if let Some(&(iw, fw, vw)) = ve
            .iter()
            .max_by(|a, b| a.2.abs().partial_cmp(&b.2.abs()).unwrap_or(std::cmp::Ordering::Equal))
        {
            let sat = obs[iw].sat;
            warn!("{time} outlier ({post}) rejected sat={sat} f={fw} res={vw:.3}");
            exc[iw] = true;
            rtk.ssat[sat - 1].rejc[fw] += 1;
            return None;
        }
    }
    let nv = v.len();
    if nv == 0 {
        return None;
    }
    let mut rm = DMatrix::zeros(nv, nv);
    for (i, &s) in var.iter().enumerate() {
        rm[(i, i)] = s;
    }
    Some(Residuals {
        v: DVector::from_vec(v),
        h: DMatrix::from_row_slice(nv, nx, &h),
        r: rm,
    })
}
