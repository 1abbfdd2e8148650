//! Cycle slip detection: receiver LLI flags, geometry-free phase and
//! Melbourne-Wübbena jumps.

use super::{nf, Rtk, TrackEvent};
use crate::constants::CLIGHT;
use crate::nav::Nav;
use crate::obs::{ObsData, LLI_HALFC, LLI_SLIP};
use log::debug;

/// Melbourne-Wübbena jump threshold (m).
pub const THRES_MW_JUMP: f64 = 10.0;

// geometry-free phase combination (m)
fn gfmeas(ob: &ObsData, nav: &Nav) -> f64 {
    let f1 = nav.sat2freq(ob.sat, ob.code[0]);
    let f2 = nav.sat2freq(ob.sat, ob.code[1]);
    if f1 == 0.0 || f2 == 0.0 || ob.l[0] == 0.0 || ob.l[1] == 0.0 {
        return 0.0;
    }
    (ob.l[0] / f1 - ob.l[1] / f2) * CLIGHT
}

// Melbourne-Wübbena combination (m)
fn mwmeas(ob: &ObsData, nav: &Nav) -> f64 {
    let f1 = nav.sat2freq(ob.sat, ob.code[0]);
    let f2 = nav.sat2freq(ob.sat, ob.code[1]);
    if f1 == 0.0 || f2 == 0.0 || ob.l[0] == 0.0 || ob.l[1] == 0.0 || ob.p[0] == 0.0
        || ob.p[1] == 0.0
    {
        return 0.0;
    }
    (ob.l[0] - ob.l[1]) * CLIGHT / (f1 - f2) - (f1 * ob.p[0] + f2 * ob.p[1]) / (f1 + f2)
}

// receiver loss-of-lock flags
fn detslp_ll(rtk: &mut Rtk, obs: &[ObsData]) {
    let nfreq = nf(&rtk.opt);
    for ob in obs {
        let ssat = &mut rtk.ssat[ob.sat - 1];
        for f in 0..nfreq.min(ob.lli.len()) {
            if ob.l[f] == 0.0 || ob.lli[f] & (LLI_SLIP | LLI_HALFC) == 0 {
                continue;
            }
            debug!(
                "detslp_ll: slip detected {} sat={} f={} lli={:#x}",
                ob.time, ob.sat, f, ob.lli[f]
            );
            ssat.slip[f] |= 1;
        }
    }
}

// geometry-free phase jump
fn detslp_gf(rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) {
    let thres = rtk.opt.thresslip;
    for ob in obs {
        let g1 = gfmeas(ob, nav);
        if g1 == 0.0 {
            continue;
        }
        let ssat = &mut rtk.ssat[ob.sat - 1];
        let g0 = ssat.gf;
        ssat.gf = g1;
        if g0 != 0.0 && (g1 - g0).abs() > thres {
            debug!(
                "detslp_gf: slip detected {} sat={} gf={:.3}->{:.3}",
                ob.time, ob.sat, g0, g1
            );
            ssat.slip[0] |= 1;
            ssat.slip[1] |= 1;
        }
    }
}

// Melbourne-Wübbena jump; catches simultaneous equal slips on both
// carriers that geometry-free misses
fn detslp_mw(rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) {
    for ob in obs {
        let w1 = mwmeas(ob, nav);
        if w1 == 0.0 {
            continue;
        }
        let ssat = &mut rtk.ssat[ob.sat - 1];
        let w0 = ssat.mw;
        ssat.mw = w1;
        if w0 != 0.0 && (w1 - w0).abs() > THRES_MW_JUMP {
            debug!(
                "detslp_mw: slip detected {} sat={} mw={:.3}->{:.3}",
                ob.time, ob.sat, w0, w1
            );
            ssat.slip[0] |= 1;
            ssat.slip[1] |= 1;
        }
    }
}

/// Run all slip detectors for the epoch. Clears the previous epoch's
/// flags, updates the per satellite stored combinations and drives the
/// tracking state machine.
pub(crate) fn detecs(rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) {
    let nfreq = nf(&rtk.opt);
    for ob in obs {
        let ssat = &mut rtk.ssat[ob.sat - 1];
        for f in 0..nfreq {
            ssat.slip[f] = 0;
        }
    }
    detslp_ll(rtk, obs);
    detslp_gf(rtk, obs, nav);
    detslp_mw(rtk, obs, nav);

    for ob in obs {
        let ssat = &mut rtk.ssat[ob.sat - 1];
        for f in 0..nfreq {
            // first phase observation wakes the carrier up
            if ob.l.get(f).copied().unwrap_or(0.0) != 0.0 {
                ssat.transition(f, TrackEvent::Observed);
            }
            if ssat.slip[f] & 1 != 0 {
                ssat.slipc[f] += 1;
                ssat.transition(f, TrackEvent::Slip);
            }
            // repeated epochs of the same carrier keep the history
            if ob.l.get(f).copied().unwrap_or(0.0) != 0.0 {
                ssat.pt[f] = ob.time;
                ssat.ph[f] = ob.l[f];
            }
        }
    }
}
