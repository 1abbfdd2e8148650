//! Precise point positioning estimator.
//!
//! One extended Kalman filter per receiver: position (plus optional
//! dynamics), per constellation receiver clocks, zenith troposphere and
//! gradients, per satellite slant ionosphere, an L5 receiver DCB and
//! per satellite/frequency carrier ambiguities. The temporal update,
//! slip detection and the measurement stack live in the submodules.

pub mod ar;
mod measurement;
mod slip;
mod temporal;

pub use ar::{AmbiguityResolver, NoOpResolver};
pub use measurement::ppp_res;

use crate::antenna::testeclipse;
use crate::config::{Config, IonoOpt, TropOpt};
use crate::constants::CLIGHT;
use crate::ephemeris::satposs;
use crate::error::Error;
use crate::matrix::filter;
use crate::nav::Nav;
use crate::obs::ObsData;
use crate::signal::NFREQ;
use crate::solution::{Sol, SolStatus};
use crate::sv::MAXSAT;
use crate::tides::tidedisp;
use crate::time::{gpst2utc, timediff, GTime};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Vector3};

/// Constellation clock slots: GPS, GLO, GAL, QZS, BDS, IRN.
pub const NSYS: usize = 6;

/// Filter iterations per epoch.
const MAX_ITER: usize = 8;

/// Postfit residual rejection threshold (sigmas).
const THRES_REJECT: f64 = 4.0;

pub(crate) const VAR_POS: f64 = 60.0 * 60.0;
pub(crate) const VAR_VEL: f64 = 10.0 * 10.0;
pub(crate) const VAR_ACC: f64 = 10.0 * 10.0;
pub(crate) const VAR_CLK: f64 = 60.0 * 60.0;

/// 3D sigma below which a resolved solution is accepted as fixed (m).
const THRES_FIX_STD: f64 = 0.15;

/// Tracking state of one satellite carrier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TrackState {
    #[default]
    Idle = 0,
    Tracked = 1,
    Slipped = 2,
    Fixed = 3,
    Held = 4,
}

/// Per satellite estimator status.
#[derive(Debug, Clone)]
pub struct SSat {
    /// Valid this epoch
    pub vs: bool,
    /// Azimuth/elevation (rad)
    pub azel: [f64; 2],
    /// Postfit pseudorange residuals (m)
    pub resp: [f64; NFREQ],
    /// Postfit carrier residuals (m)
    pub resc: [f64; NFREQ],
    /// Carrier used in the solution
    pub vsat: [bool; NFREQ],
    pub snr: [f64; NFREQ],
    pub fix: [TrackState; NFREQ],
    /// Slip flags this epoch (bit 0 slip, bit 1 half cycle)
    pub slip: [u8; NFREQ],
    pub lock: [i32; NFREQ],
    /// Carrier outage count
    pub outc: [u32; NFREQ],
    pub slipc: [u32; NFREQ],
    pub rejc: [u32; NFREQ],
    /// Geometry-free phase of the previous epoch (m)
    pub gf: f64,
    /// Melbourne-Wübbena of the previous epoch (m)
    pub mw: f64,
    /// Phase windup accumulator (cycles)
    pub phw: f64,
    /// Previous observation time per carrier
    pub pt: [GTime; NFREQ],
    /// Previous carrier phase per carrier (cycles)
    pub ph: [f64; NFREQ],
}

impl Default for SSat {
    fn default() -> Self {
        Self {
            vs: false,
            azel: [0.0; 2],
            resp: [0.0; NFREQ],
            resc: [0.0; NFREQ],
            vsat: [false; NFREQ],
            snr: [0.0; NFREQ],
            fix: [TrackState::Idle; NFREQ],
            slip: [0; NFREQ],
            lock: [0; NFREQ],
            outc: [0; NFREQ],
            slipc: [0; NFREQ],
            rejc: [0; NFREQ],
            gf: 0.0,
            mw: 0.0,
            phw: 0.0,
            pt: [GTime::default(); NFREQ],
            ph: [0.0; NFREQ],
        }
    }
}

impl SSat {
    /// Drive the per carrier state machine one step.
    pub(crate) fn transition(&mut self, f: usize, ev: TrackEvent) {
        use TrackEvent::*;
        use TrackState::*;
        self.fix[f] = match (self.fix[f], ev) {
            (Idle, Observed) => Tracked,
            (s, Observed) => s,
            (_, Slip) => Slipped,
            (Slipped, Reseeded) => Tracked,
            (s, Reseeded) => s,
            (Tracked, ArFixed) => Fixed,
            (s, ArFixed) => s,
            (Fixed, HoldReached) => Held,
            (s, HoldReached) => s,
        };
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) enum TrackEvent {
    Observed,
    Slip,
    Reseeded,
    ArFixed,
    HoldReached,
}

// number of carriers carried as states
pub(crate) fn nf(opt: &Config) -> usize {
    if opt.ionoopt == IonoOpt::Iflc {
        1
    } else {
        opt.nf.min(NFREQ)
    }
}

pub(crate) fn np(opt: &Config) -> usize {
    if opt.dynamics {
        9
    } else {
        3
    }
}

pub(crate) fn nt(opt: &Config) -> usize {
    match opt.tropopt {
        TropOpt::Est => 1,
        TropOpt::Estg => 3,
        _ => 0,
    }
}

pub(crate) fn ni(opt: &Config) -> usize {
    if opt.ionoopt == IonoOpt::Est {
        MAXSAT
    } else {
        0
    }
}

pub(crate) fn nd(opt: &Config) -> usize {
    if opt.nf >= 3 {
        1
    } else {
        0
    }
}

/// Total filter dimension.
pub fn nx(opt: &Config) -> usize {
    np(opt) + NSYS + nt(opt) + ni(opt) + nd(opt) + nf(opt) * MAXSAT
}

/// Receiver clock state index for constellation slot `s` (0..NSYS).
pub fn ic(s: usize, opt: &Config) -> usize {
    np(opt) + s
}

/// First troposphere state index.
pub fn it(opt: &Config) -> usize {
    np(opt) + NSYS
}

/// Slant ionosphere state index of a satellite.
pub fn ii(sat: usize, opt: &Config) -> usize {
    np(opt) + NSYS + nt(opt) + sat - 1
}

/// L5 receiver DCB state index.
pub fn id_dcb(opt: &Config) -> usize {
    np(opt) + NSYS + nt(opt) + ni(opt)
}

/// Ambiguity state index of a satellite carrier.
pub fn ib(sat: usize, f: usize, opt: &Config) -> usize {
    np(opt) + NSYS + nt(opt) + ni(opt) + nd(opt) + MAXSAT * f + sat - 1
}

/// PPP estimator context. One filter, not safe for concurrent epochs.
#[derive(Debug, Clone)]
pub struct Rtk {
    pub sol: Sol,
    /// Time difference to the previous epoch (s)
    pub tt: f64,
    /// Float states and covariance
    pub x: DVector<f64>,
    pub p: DMatrix<f64>,
    /// Fixed states and covariance from ambiguity resolution
    pub xa: DVector<f64>,
    pub pa: DMatrix<f64>,
    /// Consecutive fix count
    pub nfix: usize,
    pub ssat: Vec<SSat>,
    /// Short status messages of the last epoch
    pub errbuf: Vec<String>,
    pub opt: Config,
}

impl Rtk {
    pub fn new(opt: Config) -> Self {
        let n = nx(&opt);
        Self {
            sol: Sol::default(),
            tt: 0.0,
            x: DVector::zeros(n),
            p: DMatrix::zeros(n, n),
            xa: DVector::zeros(n),
            pa: DMatrix::zeros(n, n),
            nfix: 0,
            ssat: vec![SSat::default(); MAXSAT],
            errbuf: Vec::new(),
            opt,
        }
    }

    /// Number of float states.
    pub fn nx(&self) -> usize {
        self.x.len()
    }

    /// (Re)initialize one state: value, variance, decoupled from the
    /// rest of the filter.
    pub(crate) fn initx(&mut self, x0: f64, var: f64, i: usize) {
        self.x[i] = x0;
        for j in 0..self.x.len() {
            self.p[(i, j)] = 0.0;
            self.p[(j, i)] = 0.0;
        }
        self.p[(i, i)] = var;
    }

    pub(crate) fn errmsg(&mut self, time: GTime, msg: String) {
        debug!("{time} {msg}");
        if self.errbuf.len() < 100 {
            self.errbuf.push(msg);
        }
    }
}

/// Precise point positioning for one observation epoch.
///
/// `rtk.sol` must carry the single point seed (position and receiver
/// clocks) of this epoch before the call; on success it is replaced by
/// the PPP solution with status [SolStatus::Ppp] or [SolStatus::Fix].
/// A filter fault leaves the prior state and reports `SolStatus::None`.
pub fn pppos(
    rtk: &mut Rtk,
    obs: &[ObsData],
    nav: &Nav,
    resolver: &mut dyn AmbiguityResolver,
) -> Result<(), Error> {
    if obs.is_empty() {
        return Err(Error::NotEnoughObservations(0));
    }
    let time = obs[0].time;
    rtk.errbuf.clear();
    rtk.tt = if rtk.sol.time.is_zero() {
        0.0
    } else {
        timediff(time, rtk.sol.time)
    };
    debug!("pppos: {time} nobs={}", obs.len());

    // satellite positions and clocks at transmission time
    let mut rs = satposs(time, obs, nav, rtk.opt.sateph);
    if rtk.opt.posopt.rejeclipse {
        testeclipse(obs, nav, &mut rs);
    }

    // temporal update of all state blocks
    temporal::udstate_ppp(rtk, obs, nav);

    // earth tide displacement of the receiver
    let dr = if rtk.opt.tidecorr != crate::config::TideCorr::Off {
        let erpv = nav.erp.geterp(time);
        let rr = Vector3::new(rtk.x[0], rtk.x[1], rtk.x[2]);
        tidedisp(gpst2utc(time), &rr, rtk.opt.tidecorr, &erpv)
    } else {
        Vector3::zeros()
    };

    let mut xp = rtk.x.clone();
    let mut pp = rtk.p.clone();
    let mut exc = vec![false; obs.len()];
    let mut stat = SolStatus::Single;

    for iter in 0..MAX_ITER {
        xp.copy_from(&rtk.x);
        pp.copy_from(&rtk.p);

        // prefit residuals with the innovation gate
        let Some(res) = ppp_res(0, obs, &rs, &dr, nav, &xp, rtk, &mut exc) else {
            rtk.errmsg(time, "no valid residuals".into());
            break;
        };
        if let Err(e) = filter(&mut xp, &mut pp, &res.h, &res.v, &res.r) {
            rtk.errmsg(time, format!("filter error: {e}"));
            rtk.sol.stat = SolStatus::None;
            return Err(Error::FilterFault(format!("{time} measurement update: {e}")));
        }
        // postfit screening; worst outlier excluded and retried
        if ppp_res(iter + 1, obs, &rs, &dr, nav, &xp, rtk, &mut exc).is_some() {
            rtk.x.copy_from(&xp);
            rtk.p.copy_from(&pp);
            stat = SolStatus::Ppp;
            break;
        }
        if iter + 1 == MAX_ITER {
            rtk.errmsg(time, format!("ppp iteration overflow ({MAX_ITER} iters)"));
        }
    }

    if stat != SolStatus::Ppp {
        rtk.sol.stat = SolStatus::None;
        return Ok(());
    }

    // ambiguity resolution hook
    let mut fixed = false;
    if resolver.resolve(rtk, obs, nav) {
        let std3d = (rtk.pa[(0, 0)] + rtk.pa[(1, 1)] + rtk.pa[(2, 2)]).max(0.0).sqrt();
        if std3d < THRES_FIX_STD {
            fixed = true;
            rtk.nfix += 1;
        } else {
            warn!("ppp ar: fixed solution too noisy: {time} std={std3d:.3}");
            rtk.nfix = 0;
        }
    } else {
        rtk.nfix = 0;
    }

    update_solution(rtk, time, if fixed { SolStatus::Fix } else { SolStatus::Ppp });
    update_track_states(rtk, obs, fixed);
    Ok(())
}

// fill rtk.sol from the filter state
fn update_solution(rtk: &mut Rtk, time: GTime, stat: SolStatus) {
    let opt = rtk.opt.clone();
    let (x, p) = if stat == SolStatus::Fix {
        (&rtk.xa, &rtk.pa)
    } else {
        (&rtk.x, &rtk.p)
    };
    rtk.sol.time = time;
    rtk.sol.stat = stat;
    for i in 0..3 {
        rtk.sol.rr[i] = x[i];
        rtk.sol.rr[i + 3] = if opt.dynamics { x[i + 3] } else { 0.0 };
    }
    rtk.sol.qr = [
        p[(0, 0)] as f32,
        p[(1, 1)] as f32,
        p[(2, 2)] as f32,
        p[(0, 1)] as f32,
        p[(1, 2)] as f32,
        p[(2, 0)] as f32,
    ];
    rtk.sol.dtr[0] = x[ic(0, &opt)] / CLIGHT;
    for s in 1..NSYS {
        rtk.sol.dtr[s] = (x[ic(s, &opt)] - x[ic(0, &opt)]) / CLIGHT;
    }
    rtk.sol.ns = rtk
        .ssat
        .iter()
        .filter(|s| s.vs && s.vsat.iter().any(|&v| v))
        .count() as u8;
}

// lock/outage counters and the per carrier state machine
fn update_track_states(rtk: &mut Rtk, obs: &[ObsData], fixed: bool) {
    let nfreq = nf(&rtk.opt);
    let minfix = rtk.opt.minfix;
    let hold = rtk.opt.modear == crate::config::ArMode::FixHold;
    let nfix = rtk.nfix;

    for ob in obs {
        let ssat = &mut rtk.ssat[ob.sat - 1];
        for f in 0..nfreq {
            ssat.snr[f] = ob.snr[f];
            if !ssat.vsat[f] {
                continue;
            }
            ssat.lock[f] += 1;
            ssat.outc[f] = 0;
            if fixed {
                ssat.transition(f, TrackEvent::ArFixed);
                if hold && nfix >= minfix {
                    ssat.transition(f, TrackEvent::HoldReached);
                }
            }
        }
    }
    // every carrier unused this epoch ages toward an ambiguity reset
    for ssat in rtk.ssat.iter_mut() {
        for f in 0..nfreq {
            if !ssat.vsat[f] {
                ssat.outc[f] = ssat.outc[f].saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test;
