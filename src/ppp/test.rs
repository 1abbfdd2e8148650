use super::ar::NoOpResolver;
use super::*;
use crate::config::{Config, EphOpt, IonoOpt, PosOpt, TropOpt};
use crate::constants::{CLIGHT, D2R};
use crate::coords::{geodist, pos2ecef};
use crate::ephemeris::satposs;
use crate::nav::{Eph, Nav};
use crate::signal::Code;
use crate::sv::{satno, Sys};
use crate::time::gpst2time;
use nalgebra::Vector3;

// 24 satellite GPS-like constellation, circular orbits, toe at `time`
pub(crate) fn synthetic_nav(time: GTime) -> Nav {
    let mut nav = Nav::new();
    for plane in 0..6usize {
        for slot in 0..4usize {
            let prn = plane * 4 + slot + 1;
            let Some(sat) = satno(Sys::Gps, prn) else {
                continue;
            };
            nav.eph.push(Eph {
                sat,
                toe: time,
                toc: time,
                a: 26560E3,
                e: 0.0,
                i0: 55.0 * D2R,
                omg0: plane as f64 * 60.0 * D2R,
                omg: 0.0,
                m0: (slot as f64 * 90.0 + plane as f64 * 15.0) * D2R,
                sva: 0,
                ..Default::default()
            });
        }
    }
    nav
}

// dual frequency code observations consistent with the broadcast orbits,
// the receiver position and a receiver clock offset
pub(crate) fn synthetic_obs(time: GTime, nav: &Nav, rr: &Vector3<f64>, dtr: f64) -> Vec<ObsData> {
    let mut obs: Vec<ObsData> = (1..=24)
        .filter_map(|prn| satno(Sys::Gps, prn))
        .map(|sat| {
            let mut ob = ObsData {
                time,
                sat,
                snr: [45.0; crate::obs::NOBS],
                ..Default::default()
            };
            ob.code[0] = Code::L1C;
            ob.code[1] = Code::L2W;
            ob.p[0] = 2.4E7;
            ob.p[1] = 2.4E7;
            ob
        })
        .collect();

    // fixed point of the transmission time iteration in satposs
    for _ in 0..4 {
        let rs = satposs(time, &obs, nav, EphOpt::Brdc);
        for (i, ob) in obs.iter_mut().enumerate() {
            let sp = Vector3::new(rs[i].rs[0], rs[i].rs[1], rs[i].rs[2]);
            if let Some((r, _)) = geodist(&sp, rr) {
                let p = r + CLIGHT * dtr - CLIGHT * rs[i].dts[0];
                ob.p[0] = p;
                ob.p[1] = p;
            }
        }
    }
    obs
}

pub(crate) fn code_only_config() -> Config {
    let mut opt = Config::ppp_kinematic(2);
    opt.ionoopt = IonoOpt::Off;
    opt.tropopt = TropOpt::Off;
    opt.posopt = PosOpt::default();
    opt
}

#[test]
fn state_layout_is_disjoint() {
    let opt = Config::ppp_kinematic(2);
    assert_eq!(np(&opt), 3);
    assert_eq!(ic(0, &opt), 3);
    assert_eq!(it(&opt), 3 + NSYS);
    assert_eq!(ii(1, &opt), it(&opt) + 3);
    assert_eq!(ii(MAXSAT, &opt) + 1, ib(1, 0, &opt));
    assert_eq!(ib(1, 1, &opt), ib(1, 0, &opt) + MAXSAT);
    assert_eq!(nx(&opt), ib(MAXSAT, 1, &opt) + 1);
}

#[test]
fn static_epoch_recovers_position() {
    let time = gpst2time(2200, 345600.0);
    let nav = synthetic_nav(time);
    let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 100.0));
    let dtr = 1.0E-7;
    let obs = synthetic_obs(time, &nav, &rr, dtr);

    let mut rtk = Rtk::new(code_only_config());
    rtk.sol.rr = [rr[0] + 3.0, rr[1] - 2.0, rr[2] + 2.0, 0.0, 0.0, 0.0];
    rtk.sol.dtr[0] = dtr;

    pppos(&mut rtk, &obs, &nav, &mut NoOpResolver).unwrap();

    assert_eq!(rtk.sol.stat, SolStatus::Ppp);
    for i in 0..3 {
        assert!(
            (rtk.sol.rr[i] - rr[i]).abs() < 1E-2,
            "axis {i}: {} vs {}",
            rtk.sol.rr[i],
            rr[i]
        );
    }
    let opt = rtk.opt.clone();
    assert!((rtk.x[ic(0, &opt)] - CLIGHT * dtr).abs() < 1E-2);
}

#[test]
fn prefit_gate_excludes_outlier() {
    let time = gpst2time(2200, 345600.0);
    let nav = synthetic_nav(time);
    let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 100.0));
    let mut obs = synthetic_obs(time, &nav, &rr, 1.0E-7);

    // corrupt L1 code of the first satellite well past the gate
    obs[0].p[0] += 100.0;
    let sat = obs[0].sat;

    let mut rtk = Rtk::new(code_only_config());
    rtk.sol.rr = [rr[0] + 3.0, rr[1] - 2.0, rr[2] + 2.0, 0.0, 0.0, 0.0];
    rtk.sol.dtr[0] = 1.0E-7;

    pppos(&mut rtk, &obs, &nav, &mut NoOpResolver).unwrap();

    assert_eq!(rtk.sol.stat, SolStatus::Ppp);
    assert!(rtk.ssat[sat - 1].rejc[0] >= 1);
    for i in 0..3 {
        assert!((rtk.sol.rr[i] - rr[i]).abs() < 1E-2);
    }
}

#[test]
fn cycle_slip_resets_ambiguity() {
    let time = gpst2time(2200, 345600.0);
    let nav = synthetic_nav(time);
    let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 100.0));
    let sat = satno(Sys::Gps, 5).unwrap();
    let opt = Config::ppp_kinematic(2);

    let lam1 = CLIGHT / nav.sat2freq(sat, Code::L1C);
    let mut ob = ObsData {
        time,
        sat,
        ..Default::default()
    };
    ob.code[0] = Code::L1C;
    ob.code[1] = Code::L2W;
    ob.l = {
        let mut l = [0.0; crate::obs::NOBS];
        l[0] = 100.0;
        l[1] = 80.0;
        l
    };
    ob.p[0] = 2.0E7;
    ob.p[1] = 2.0E7;

    let mut rtk = Rtk::new(opt.clone());
    rtk.sol.rr = [rr[0], rr[1], rr[2], 0.0, 0.0, 0.0];
    rtk.tt = 30.0;

    temporal::udstate_ppp(&mut rtk, &[ob], &nav);
    let j = ib(sat, 0, &opt);
    let bias0 = 100.0 * lam1 - 2.0E7;
    assert!((rtk.x[j] - bias0).abs() < 1E-6);
    assert_eq!(rtk.ssat[sat - 1].fix[0], TrackState::Tracked);

    // five cycle jump on L1, well past the geometry-free threshold
    let mut ob2 = ob;
    ob2.l[0] += 5.0;
    temporal::udstate_ppp(&mut rtk, &[ob2], &nav);

    assert_eq!(rtk.ssat[sat - 1].slipc[0], 1);
    let bias1 = 105.0 * lam1 - 2.0E7;
    assert!((rtk.x[j] - bias1).abs() < 1E-6);
    assert_eq!(rtk.ssat[sat - 1].fix[0], TrackState::Tracked);
}

#[test]
fn outage_expires_ambiguity() {
    let nav = Nav::new();
    let opt = Config::ppp_kinematic(2);
    let sat = satno(Sys::Gps, 7).unwrap();
    let j = ib(sat, 0, &opt);

    let mut rtk = Rtk::new(opt.clone());
    let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 100.0));
    rtk.sol.rr = [rr[0], rr[1], rr[2], 0.0, 0.0, 0.0];
    rtk.initx(12.3, 1.0, j);
    rtk.ssat[sat - 1].outc[0] = rtk.opt.maxout as u32 + 1;

    temporal::udstate_ppp(&mut rtk, &[], &nav);
    assert_eq!(rtk.x[j], 0.0);
}

#[test]
fn track_state_machine_follows_events() {
    let mut s = SSat::default();
    assert_eq!(s.fix[0], TrackState::Idle);
    s.transition(0, TrackEvent::Observed);
    assert_eq!(s.fix[0], TrackState::Tracked);
    s.transition(0, TrackEvent::Slip);
    assert_eq!(s.fix[0], TrackState::Slipped);
    // a slipped carrier is not fixable until reseeded
    s.transition(0, TrackEvent::ArFixed);
    assert_eq!(s.fix[0], TrackState::Slipped);
    s.transition(0, TrackEvent::Reseeded);
    assert_eq!(s.fix[0], TrackState::Tracked);
    s.transition(0, TrackEvent::ArFixed);
    assert_eq!(s.fix[0], TrackState::Fixed);
    s.transition(0, TrackEvent::HoldReached);
    assert_eq!(s.fix[0], TrackState::Held);
}
