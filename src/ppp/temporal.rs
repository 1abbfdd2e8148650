//! Temporal update of the PPP filter state blocks.

use super::measurement::corr_meas;
use super::{ib, ic, id_dcb, ii, it, nf, slip, Rtk, TrackEvent, NSYS};
use super::{VAR_CLK, VAR_POS, VAR_VEL};
use crate::config::{ArMode, EphOpt, IonoOpt, Mode, TropOpt};
use crate::constants::{CLIGHT, D2R, PI};
use crate::coords::{covecef, ecef2pos};
use crate::bias::iono::ionmapf;
use crate::bias::tropo::{tropmodel, REL_HUMI};
use crate::nav::Nav;
use crate::obs::ObsData;
use crate::signal::NFREQ;
use crate::sv::MAXSAT;
use crate::time::time2gpst;
use log::{debug, warn};
use nalgebra::{DMatrix, Matrix3, Vector3};

const VAR_GRA: f64 = 0.01 * 0.01;
const VAR_IONO: f64 = 60.0 * 60.0;
const VAR_DCB: f64 = 30.0 * 30.0;

/// Default ionosphere reset gap (epochs), `-GAP_RESION=n` overrides.
const GAP_RESION: i64 = 120;

fn sqr(x: f64) -> f64 {
    x * x
}

// position, velocity and acceleration states
fn udpos_ppp(rtk: &mut Rtk) {
    let opt = rtk.opt.clone();

    if opt.mode == Mode::PppFixed {
        for i in 0..3 {
            rtk.initx(opt.ru[i], 1E-8, i);
        }
        return;
    }
    // first epoch seeds from the single point solution
    if rtk.x.rows(0, 3).norm() <= 0.0 {
        for i in 0..3 {
            rtk.initx(rtk.sol.rr[i], VAR_POS, i);
        }
        if opt.dynamics {
            for i in 3..6 {
                rtk.initx(rtk.sol.rr[i], VAR_VEL, i);
            }
            for i in 6..9 {
                rtk.initx(1E-6, super::VAR_ACC, i);
            }
        }
    }
    if opt.mode == Mode::PppStatic {
        for i in 0..3 {
            rtk.p[(i, i)] += sqr(opt.prn.pos) * rtk.tt.abs();
        }
        return;
    }
    if !opt.dynamics {
        for i in 0..3 {
            rtk.initx(rtk.sol.rr[i], VAR_POS, i);
        }
        return;
    }
    // kinematic with dynamics
    let var = (rtk.p[(0, 0)] + rtk.p[(1, 1)] + rtk.p[(2, 2)]) / 3.0;
    if var > VAR_POS {
        warn!("udpos_ppp: reset position, variance too large: var={var:.1}");
        for i in 0..3 {
            rtk.initx(rtk.sol.rr[i], VAR_POS, i);
        }
        for i in 3..6 {
            rtk.initx(rtk.sol.rr[i], VAR_VEL, i);
        }
        for i in 6..9 {
            rtk.initx(1E-6, super::VAR_ACC, i);
        }
        return;
    }
    // state transition within the 9-state dynamics block
    let dt = rtk.tt;
    let mut f = DMatrix::<f64>::identity(9, 9);
    for i in 0..6 {
        f[(i, i + 3)] = dt;
    }
    if var < opt.thresar[1] {
        for i in 0..3 {
            f[(i, i + 6)] = dt * dt / 2.0;
        }
    }
    let x9 = &f * rtk.x.rows(0, 9);
    rtk.x.rows_mut(0, 9).copy_from(&x9);
    let prow = &f * rtk.p.rows(0, 9);
    rtk.p.rows_mut(0, 9).copy_from(&prow);
    let pcol = rtk.p.columns(0, 9) * f.transpose();
    rtk.p.columns_mut(0, 9).copy_from(&pcol);

    // acceleration process noise, ENU rotated into ECEF
    let q = Matrix3::from_diagonal(&Vector3::new(
        sqr(opt.prn.acch) * dt.abs(),
        sqr(opt.prn.acch) * dt.abs(),
        sqr(opt.prn.accv) * dt.abs(),
    ));
    let pos = ecef2pos(&Vector3::new(rtk.x[0], rtk.x[1], rtk.x[2]));
    let qv = covecef(&pos, &q);
    for i in 0..3 {
        for j in 0..3 {
            rtk.p[(i + 6, j + 6)] += qv[(i, j)];
        }
    }
}

// receiver clocks, white noise reseeded from the single point solution
fn udclk_ppp(rtk: &mut Rtk) {
    let opt = rtk.opt.clone();
    for s in 0..NSYS {
        let dtr = if opt.sateph == EphOpt::Prec || s == 0 {
            // precise clock products are aligned to GPST, inter system
            // biases are not observable there
            rtk.sol.dtr[0]
        } else {
            rtk.sol.dtr[0] + rtk.sol.dtr[s]
        };
        rtk.initx(CLIGHT * dtr, VAR_CLK, ic(s, &opt));
    }
}

// zenith troposphere delay and optional gradients
fn udtrop_ppp(rtk: &mut Rtk) {
    let opt = rtk.opt.clone();
    let i = it(&opt);

    if rtk.x[i] == 0.0 {
        let pos = ecef2pos(&Vector3::new(rtk.sol.rr[0], rtk.sol.rr[1], rtk.sol.rr[2]));
        let azel = [0.0, PI / 2.0];
        let (ztd, var) = tropmodel(rtk.sol.time, &[pos[0], pos[1], pos[2]], &azel, REL_HUMI);
        rtk.initx(ztd, var, i);
        if opt.tropopt == TropOpt::Estg {
            for j in i + 1..i + 3 {
                rtk.initx(1E-6, VAR_GRA, j);
            }
        }
    } else {
        rtk.p[(i, i)] += sqr(opt.prn.trop) * rtk.tt.abs();
        if opt.tropopt == TropOpt::Estg {
            for j in i + 1..i + 3 {
                rtk.p[(j, j)] += sqr(opt.prn.trop * 0.1) * rtk.tt.abs();
            }
        }
    }
}

// per satellite slant ionosphere
fn udiono_ppp(rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) {
    let opt = rtk.opt.clone();
    let gap = opt.ppp_ext_flag("-GAP_RESION").unwrap_or(GAP_RESION);

    for sat in 1..=MAXSAT {
        let j = ii(sat, &opt);
        if rtk.x[j] != 0.0 && rtk.ssat[sat - 1].outc[0] as i64 > gap {
            rtk.x[j] = 0.0;
        }
    }
    let pos = ecef2pos(&Vector3::new(rtk.sol.rr[0], rtk.sol.rr[1], rtk.sol.rr[2]));
    for ob in obs {
        let j = ii(ob.sat, &opt);
        if rtk.x[j] == 0.0 {
            let f1 = nav.sat2freq(ob.sat, ob.code[0]);
            let f2 = nav.sat2freq(ob.sat, ob.code[1]);
            if ob.p[0] == 0.0 || ob.p[1] == 0.0 || f1 == 0.0 || f2 == 0.0 || f1 == f2 {
                continue;
            }
            // vertical delay from the dual frequency code split
            let ion = (ob.p[0] - ob.p[1]) / (1.0 - sqr(f1 / f2))
                / ionmapf(&[pos[0], pos[1], pos[2]], &rtk.ssat[ob.sat - 1].azel);
            rtk.initx(ion, VAR_IONO, j);
            debug!("udiono_ppp: sat={} ion={ion:.3}", ob.sat);
        } else {
            let sinel = rtk.ssat[ob.sat - 1].azel[1].max(5.0 * D2R).sin();
            rtk.p[(j, j)] += sqr(opt.prn.iono / sinel) * rtk.tt.abs();
        }
    }
}

// L5 receiver code bias, one constant state
fn uddcb_ppp(rtk: &mut Rtk) {
    let i = id_dcb(&rtk.opt.clone());
    if rtk.x[i] == 0.0 {
        rtk.initx(1E-6, VAR_DCB, i);
    }
}

// carrier phase ambiguities
fn udbias_ppp(rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) {
    let opt = rtk.opt.clone();
    let nfreq = nf(&opt);

    // day-boundary receiver clock jump
    let clk_jump = opt.posopt.clkjump && {
        let (_, tow) = time2gpst(obs[0].time);
        tow.round() as i64 % 86400 == 0
    };
    if clk_jump {
        warn!("udbias_ppp: day boundary clock jump: {}", obs[0].time);
    }

    slip::detecs(rtk, obs, nav);

    for f in 0..nfreq {
        // expire on outage, instantaneous mode or clock jump
        for sat in 1..=MAXSAT {
            let j = ib(sat, f, &opt);
            if rtk.x[j] != 0.0
                && (rtk.ssat[sat - 1].outc[f] as usize > opt.maxout
                    || opt.modear == ArMode::Inst
                    || clk_jump)
            {
                rtk.initx(0.0, 0.0, j);
            }
        }
        let mut bias = vec![0.0; obs.len()];
        let mut slipped = vec![false; obs.len()];
        let mut offset = 0.0;
        let mut k = 0usize;

        for (i, ob) in obs.iter().enumerate() {
            let j = ib(ob.sat, f, &opt);
            let azel = rtk.ssat[ob.sat - 1].azel;
            let (l, p, lc, pc) = corr_meas(ob, nav, &azel, &opt, &[0.0; NFREQ], &[0.0; NFREQ], 0.0);

            if opt.ionoopt == IonoOpt::Iflc {
                slipped[i] =
                    rtk.ssat[ob.sat - 1].slip[0] & 1 != 0 || rtk.ssat[ob.sat - 1].slip[1] & 1 != 0;
                if lc != 0.0 && pc != 0.0 {
                    bias[i] = lc - pc;
                }
            } else if l[f] != 0.0 && p[f] != 0.0 {
                slipped[i] = rtk.ssat[ob.sat - 1].slip[f] & 1 != 0;
                let f1 = nav.sat2freq(ob.sat, ob.code[0]);
                let ff = nav.sat2freq(ob.sat, ob.code[f]);
                if f1 == 0.0 || ff == 0.0 {
                    continue;
                }
                // slant iono from the dual frequency code split
                let ion = if f > 0 && ob.p[0] != 0.0 && ob.p[f] != 0.0 && f1 != ff {
                    (ob.p[0] - ob.p[f]) / (1.0 - sqr(f1 / ff))
                } else {
                    let f2 = nav.sat2freq(ob.sat, ob.code[1]);
                    if ob.p[0] != 0.0 && ob.p[1] != 0.0 && f2 != 0.0 && f2 != f1 {
                        (ob.p[0] - ob.p[1]) / (1.0 - sqr(f1 / f2))
                    } else {
                        0.0
                    }
                };
                bias[i] = l[f] - p[f] + 2.0 * ion * sqr(f1 / ff);
            }
            // a detected slip drops the old ambiguity entirely
            if slipped[i] && rtk.x[j] != 0.0 {
                rtk.initx(0.0, 0.0, j);
            }
            if rtk.x[j] == 0.0 || slipped[i] || bias[i] == 0.0 {
                continue;
            }
            offset += bias[i] - rtk.x[j];
            k += 1;
        }
        // phase-code coherence: a common jump moves every existing bias
        if k >= 2 && (offset / k as f64).abs() > 0.0005 * CLIGHT {
            let db = offset / k as f64;
            for sat in 1..=MAXSAT {
                let j = ib(sat, f, &opt);
                if rtk.x[j] != 0.0 {
                    rtk.x[j] += db;
                }
            }
            warn!(
                "udbias_ppp: phase-code jump corrected: {} n={k} dbias={db:.3}",
                obs[0].time
            );
        }
        for (i, ob) in obs.iter().enumerate() {
            let j = ib(ob.sat, f, &opt);
            rtk.p[(j, j)] += sqr(opt.prn.bias) * rtk.tt.abs();
            if rtk.x[j] != 0.0 || bias[i] == 0.0 {
                continue;
            }
            rtk.initx(bias[i], sqr(opt.std.bias), j);
            rtk.ssat[ob.sat - 1].lock[f] = 0;
            rtk.ssat[ob.sat - 1].transition(f, TrackEvent::Reseeded);
            debug!("udbias_ppp: sat={} f={f} bias={:.3}", ob.sat, bias[i]);
        }
    }
}

/// Temporal update of every state block for this epoch.
pub(crate) fn udstate_ppp(rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) {
    udpos_ppp(rtk);
    udclk_ppp(rtk);
    if matches!(rtk.opt.tropopt, TropOpt::Est | TropOpt::Estg) {
        udtrop_ppp(rtk);
    }
    if rtk.opt.ionoopt == IonoOpt::Est {
        udiono_ppp(rtk, obs, nav);
    }
    if rtk.opt.nf >= 3 {
        uddcb_ppp(rtk);
    }
    udbias_ppp(rtk, obs, nav);
}
