//! Observation records.

use crate::signal::{Code, NEXOBS, NFREQ};
use crate::time::{timediff, GTime};
use itertools::Itertools;

/// Observation buckets carried per record.
pub const NOBS: usize = NFREQ + NEXOBS;

/// Loss of lock: slip declared by the receiver.
pub const LLI_SLIP: u8 = 0x01;
/// Loss of lock: opposite half-cycle ambiguity possible.
pub const LLI_HALFC: u8 = 0x02;

/// One satellite's observation at one epoch and receiver.
#[derive(Debug, Copy, Clone)]
pub struct ObsData {
    /// Receiver sampling time (GPST)
    pub time: GTime,
    /// External event mark time, zero when absent
    pub eventime: GTime,
    /// Satellite number (1..=MAXSAT)
    pub sat: usize,
    /// Receiver index (1 rover, 2 base)
    pub rcv: u8,
    /// Signal strength per bucket (dB-Hz, 0 = absent)
    pub snr: [f64; NOBS],
    /// Loss of lock indicator per bucket
    pub lli: [u8; NOBS],
    /// Observation code per bucket
    pub code: [Code; NOBS],
    /// Carrier phase (cycles, 0 = absent)
    pub l: [f64; NOBS],
    /// Pseudorange (m, 0 = absent)
    pub p: [f64; NOBS],
    /// Doppler (Hz)
    pub d: [f64; NOBS],
    /// Receiver carrier std hint, quantized index
    pub lstd: [u8; NOBS],
    /// Receiver code std hint, quantized index
    pub pstd: [u8; NOBS],
}

impl Default for ObsData {
    fn default() -> Self {
        Self {
            time: GTime::default(),
            eventime: GTime::default(),
            sat: 0,
            rcv: 1,
            snr: [0.0; NOBS],
            lli: [0; NOBS],
            code: [Code::None; NOBS],
            l: [0.0; NOBS],
            p: [0.0; NOBS],
            d: [0.0; NOBS],
            lstd: [0; NOBS],
            pstd: [0; NOBS],
        }
    }
}

/// Sort records by (time, receiver, satellite) and drop duplicates with
/// the same key. Returns the number of distinct epochs.
pub fn sortobs(obs: &mut Vec<ObsData>) -> usize {
    obs.sort_by(|a, b| {
        let dt = timediff(a.time, b.time);
        if dt.abs() > 1E-9 {
            return dt.partial_cmp(&0.0).unwrap_or(std::cmp::Ordering::Equal);
        }
        (a.rcv, a.sat).cmp(&(b.rcv, b.sat))
    });
    obs.dedup_by(|a, b| {
        timediff(a.time, b.time).abs() < 1E-9 && a.rcv == b.rcv && a.sat == b.sat
    });

    obs.iter()
        .map(|o| (o.time.time, (o.time.sec * 1E9) as i64))
        .dedup()
        .count()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::gpst2time;

    fn rec(tow: f64, sat: usize, rcv: u8) -> ObsData {
        ObsData {
            time: gpst2time(2200, tow),
            sat,
            rcv,
            ..Default::default()
        }
    }

    #[test]
    fn sort_and_dedup() {
        let mut obs = vec![
            rec(2.0, 7, 1),
            rec(1.0, 5, 1),
            rec(1.0, 3, 1),
            rec(1.0, 3, 1), // duplicate
            rec(1.0, 3, 2),
        ];
        let epochs = sortobs(&mut obs);
        assert_eq!(epochs, 2);
        assert_eq!(obs.len(), 4);
        assert_eq!(obs[0].sat, 3);
        assert_eq!(obs[1].sat, 5);
        assert_eq!((obs[2].rcv, obs[2].sat), (2, 3));
        assert_eq!(obs[3].sat, 7);
    }
}
