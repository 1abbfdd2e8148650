//! Observation signal codes.
//!
//! [Code] enumerates the RINEX 3 observation codes. A code plus the
//! constellation resolves to a frequency index bucket `0..=4` and to a
//! carrier frequency (with the FDMA channel number for GLONASS).

use crate::constants::*;
use crate::error::Error;
use crate::sv::Sys;
use std::sync::RwLock;

/// Number of frequency buckets carried per satellite.
pub const NFREQ: usize = 3;

/// Extra observation buckets past [NFREQ].
pub const NEXOBS: usize = 2;

macro_rules! codes {
    ($($name:ident => $obs:literal),+ $(,)?) => {
        /// RINEX 3 observation code (`1C` = L1 C/A, `5Q` = L5 Q, ...).
        #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[allow(clippy::upper_case_acronyms)]
        pub enum Code {
            /// No observation
            #[default]
            None,
            $(#[doc = $obs] $name),+
        }

        impl Code {
            /// All defined codes, in declaration order.
            pub const ALL: &'static [Code] = &[$(Code::$name),+];

            /// Two character RINEX 3 attribute (`"1C"`, `"2W"`, ...).
            pub fn obs(&self) -> &'static str {
                match self {
                    Code::None => "",
                    $(Code::$name => $obs),+
                }
            }
        }

        /// Parse a two character observation attribute.
        pub fn obs2code(obs: &str) -> Result<Code, Error> {
            match obs {
                $($obs => Ok(Code::$name),)+
                _ => Err(Error::InvalidId(obs.to_string())),
            }
        }
    };
}

codes! {
    L1C => "1C", L1P => "1P", L1W => "1W", L1Y => "1Y", L1M => "1M",
    L1N => "1N", L1S => "1S", L1L => "1L", L1E => "1E", L1A => "1A",
    L1B => "1B", L1X => "1X", L1Z => "1Z", L1D => "1D", L1I => "1I",
    L1Q => "1Q",
    L2C => "2C", L2D => "2D", L2S => "2S", L2L => "2L", L2X => "2X",
    L2P => "2P", L2W => "2W", L2Y => "2Y", L2M => "2M", L2N => "2N",
    L2I => "2I", L2Q => "2Q",
    L3I => "3I", L3Q => "3Q", L3X => "3X",
    L4A => "4A", L4B => "4B", L4X => "4X",
    L5I => "5I", L5Q => "5Q", L5X => "5X", L5A => "5A", L5B => "5B",
    L5C => "5C", L5D => "5D", L5P => "5P", L5Z => "5Z",
    L6A => "6A", L6B => "6B", L6C => "6C", L6X => "6X", L6Z => "6Z",
    L6S => "6S", L6L => "6L", L6E => "6E", L6I => "6I", L6Q => "6Q",
    L7I => "7I", L7Q => "7Q", L7X => "7X", L7D => "7D", L7P => "7P",
    L7Z => "7Z",
    L8L => "8L", L8Q => "8Q", L8X => "8X", L8D => "8D", L8P => "8P",
    L9A => "9A", L9B => "9B", L9C => "9C", L9X => "9X",
}

/// Two character attribute for a code (empty for [Code::None]).
pub fn code2obs(code: Code) -> &'static str {
    code.obs()
}

fn band(code: Code) -> char {
    code.obs().chars().next().unwrap_or('\0')
}

/// Carrier frequency of a code in Hz. `fcn` is the GLONASS FDMA channel
/// (-7..=6), ignored elsewhere. Returns 0.0 for unsupported combinations.
pub fn code2freq(sys: Sys, code: Code, fcn: i32) -> f64 {
    match (sys, band(code)) {
        (Sys::Gps, '1') | (Sys::Qzs, '1') | (Sys::Sbs, '1') | (Sys::Gal, '1') => FREQ1,
        (Sys::Gps, '2') | (Sys::Qzs, '2') => FREQ2,
        (Sys::Gps, '5') | (Sys::Qzs, '5') | (Sys::Sbs, '5') | (Sys::Gal, '5') => FREQ5,
        (Sys::Gal, '7') => FREQ7,
        (Sys::Gal, '8') | (Sys::Qzs, '8') => FREQ8,
        (Sys::Gal, '6') | (Sys::Qzs, '6') => FREQ6,
        (Sys::Glo, '1') => FREQ1_GLO + DFRQ1_GLO * fcn as f64,
        (Sys::Glo, '2') => FREQ2_GLO + DFRQ2_GLO * fcn as f64,
        (Sys::Glo, '3') => FREQ3_GLO,
        (Sys::Glo, '4') => 1.600995E9,
        (Sys::Glo, '6') => 1.248060E9,
        (Sys::Bds, '1') => FREQ1,
        (Sys::Bds, '2') => FREQ1_CMP,
        (Sys::Bds, '5') => FREQ5,
        (Sys::Bds, '6') => FREQ3_CMP,
        (Sys::Bds, '7') => FREQ2_CMP,
        (Sys::Bds, '8') => FREQ8,
        (Sys::Irn, '5') => FREQ5,
        (Sys::Irn, '9') => FREQ9,
        _ => 0.0,
    }
}

/// Frequency index bucket `0..=4` of a code within a constellation.
pub fn code2idx(sys: Sys, code: Code) -> Option<usize> {
    let idx = match (sys, band(code)) {
        (Sys::Gps, '1') | (Sys::Qzs, '1') | (Sys::Sbs, '1') | (Sys::Gal, '1') => 0,
        (Sys::Gps, '2') | (Sys::Qzs, '2') => 1,
        (Sys::Gps, '5') | (Sys::Qzs, '5') | (Sys::Gal, '5') => 2,
        (Sys::Sbs, '5') => 1,
        (Sys::Gal, '7') => 1,
        (Sys::Gal, '6') | (Sys::Qzs, '6') => 3,
        (Sys::Gal, '8') | (Sys::Qzs, '8') | (Sys::Bds, '8') => 4,
        (Sys::Glo, '1') | (Sys::Glo, '4') => 0,
        (Sys::Glo, '2') | (Sys::Glo, '6') => 1,
        (Sys::Glo, '3') => 2,
        (Sys::Bds, '2') | (Sys::Bds, '1') => 0,
        (Sys::Bds, '7') => 1,
        (Sys::Bds, '5') => 2,
        (Sys::Bds, '6') => 3,
        (Sys::Irn, '5') => 0,
        (Sys::Irn, '9') => 1,
        _ => return None,
    };
    Some(idx)
}

/// Default per band code priorities, most preferred first.
const DEFAULT_PRIS: [[&str; 5]; 7] = [
    // GPS
    ["CPYWMNSL", "PYWCMNDLSX", "IQX", "", ""],
    // GLONASS
    ["PC", "PC", "IQX", "", ""],
    // Galileo
    ["CABXZ", "IQX", "IQX", "ABCXZ", "IQX"],
    // QZSS
    ["CLSXZ", "LSX", "IQXDPZ", "LSXEZ", ""],
    // SBAS
    ["C", "IQX", "", "", ""],
    // BDS
    ["IQXDPAN", "IQXDPZ", "DPX", "IQXA", "DPX"],
    // IRNSS
    ["ABCX", "BCX", "", "", ""],
];

fn sys_row(sys: Sys) -> Option<usize> {
    Some(match sys {
        Sys::Gps => 0,
        Sys::Glo => 1,
        Sys::Gal => 2,
        Sys::Qzs => 3,
        Sys::Sbs => 4,
        Sys::Bds => 5,
        Sys::Irn => 6,
        Sys::Leo => return None,
    })
}

/// Code priority table, highest priority first per `(system, band)` slot.
/// A process wide default instance backs [setcodepri]/[getcodepri];
/// configure it before any estimator is running.
#[derive(Debug, Clone)]
pub struct CodePriorities {
    table: [[String; 5]; 7],
}

impl Default for CodePriorities {
    fn default() -> Self {
        let mut table: [[String; 5]; 7] = Default::default();
        for (i, row) in DEFAULT_PRIS.iter().enumerate() {
            for (j, s) in row.iter().enumerate() {
                table[i][j] = s.to_string();
            }
        }
        Self { table }
    }
}

impl CodePriorities {
    /// Replace the priority string of `(sys, idx)`.
    pub fn set(&mut self, sys: Sys, idx: usize, pri: &str) {
        if idx >= 5 {
            return;
        }
        if let Some(row) = sys_row(sys) {
            self.table[row][idx] = pri.to_string();
        }
    }

    /// Priority of a code, 0 (unusable) to 15 (most preferred).
    pub fn get(&self, sys: Sys, code: Code) -> u8 {
        let Some(idx) = code2idx(sys, code) else {
            return 0;
        };
        let Some(row) = sys_row(sys) else { return 0 };
        let attr = code.obs().chars().nth(1).unwrap_or('\0');
        match self.table[row][idx].find(attr) {
            Some(pos) => (14 - pos.min(13)) as u8 + 1,
            None => 0,
        }
    }
}

static CODEPRIS: RwLock<Option<CodePriorities>> = RwLock::new(None);

/// Override a priority string in the process wide table.
pub fn setcodepri(sys: Sys, idx: usize, pri: &str) {
    let mut guard = CODEPRIS.write().unwrap();
    guard
        .get_or_insert_with(CodePriorities::default)
        .set(sys, idx, pri);
}

/// Priority of a code from the process wide table.
pub fn getcodepri(sys: Sys, code: Code) -> u8 {
    let guard = CODEPRIS.read().unwrap();
    match guard.as_ref() {
        Some(p) => p.get(sys, code),
        None => CodePriorities::default().get(sys, code),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::{FREQ1, FREQ1_GLO, FREQ2};

    #[test]
    fn obs_round_trip() {
        for &code in Code::ALL {
            assert_eq!(obs2code(code.obs()).unwrap(), code, "{code:?}");
        }
        assert!(obs2code("0Z").is_err());
    }

    #[test]
    fn frequencies() {
        assert_eq!(code2freq(Sys::Gps, Code::L1C, 0), FREQ1);
        assert_eq!(code2freq(Sys::Gps, Code::L2W, 0), FREQ2);
        // GLONASS FDMA channel shifts G1 by 562.5 kHz per slot
        assert_eq!(code2freq(Sys::Glo, Code::L1C, 0), FREQ1_GLO);
        assert_eq!(code2freq(Sys::Glo, Code::L1C, 2), FREQ1_GLO + 1.1250E6);
        assert_eq!(code2freq(Sys::Bds, Code::L2I, 0), 1.561098E9);
        assert_eq!(code2freq(Sys::Gps, Code::L7I, 0), 0.0);
    }

    #[test]
    fn frequency_buckets() {
        assert_eq!(code2idx(Sys::Gps, Code::L1C), Some(0));
        assert_eq!(code2idx(Sys::Gps, Code::L2W), Some(1));
        assert_eq!(code2idx(Sys::Gps, Code::L5Q), Some(2));
        assert_eq!(code2idx(Sys::Gal, Code::L7Q), Some(1));
        assert_eq!(code2idx(Sys::Gal, Code::L8X), Some(4));
        assert_eq!(code2idx(Sys::Bds, Code::L2I), Some(0));
        assert_eq!(code2idx(Sys::Gps, Code::L9A), None);
    }

    #[test]
    fn priorities() {
        let pris = CodePriorities::default();
        // 1C preferred over 1W on GPS L1
        assert!(pris.get(Sys::Gps, Code::L1C) > pris.get(Sys::Gps, Code::L1W));
        assert_eq!(pris.get(Sys::Gps, Code::L7I), 0);
        let mut pris = pris;
        pris.set(Sys::Gps, 0, "WC");
        assert!(pris.get(Sys::Gps, Code::L1W) > pris.get(Sys::Gps, Code::L1C));
    }
}
