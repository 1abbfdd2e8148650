//! Satellite identity.
//!
//! Satellites are keyed by a dense number `1..=MAXSAT`, packed per
//! constellation block in the order GPS, GLONASS, Galileo, QZSS, BDS,
//! IRNSS, LEO, SBAS. Conversions to and from `(Sys, prn)` and the human
//! readable ids (`G01`, `R07`, `C21`, `S138`, ...) are bijective inside
//! each block.

use crate::constants::MAX_VAR_EPH;
use crate::error::Error;
use log::warn;

pub const MINPRNGPS: usize = 1;
pub const MAXPRNGPS: usize = 32;
pub const MINPRNGLO: usize = 1;
pub const MAXPRNGLO: usize = 27;
pub const MINPRNGAL: usize = 1;
pub const MAXPRNGAL: usize = 36;
pub const MINPRNQZS: usize = 193;
pub const MAXPRNQZS: usize = 202;
pub const MINPRNCMP: usize = 1;
pub const MAXPRNCMP: usize = 63;
pub const MINPRNIRN: usize = 1;
pub const MAXPRNIRN: usize = 14;
pub const MINPRNLEO: usize = 1;
pub const MAXPRNLEO: usize = 10;
pub const MINPRNSBS: usize = 120;
pub const MAXPRNSBS: usize = 158;

pub const NSATGPS: usize = MAXPRNGPS - MINPRNGPS + 1;
pub const NSATGLO: usize = MAXPRNGLO - MINPRNGLO + 1;
pub const NSATGAL: usize = MAXPRNGAL - MINPRNGAL + 1;
pub const NSATQZS: usize = MAXPRNQZS - MINPRNQZS + 1;
pub const NSATCMP: usize = MAXPRNCMP - MINPRNCMP + 1;
pub const NSATIRN: usize = MAXPRNIRN - MINPRNIRN + 1;
pub const NSATLEO: usize = MAXPRNLEO - MINPRNLEO + 1;
pub const NSATSBS: usize = MAXPRNSBS - MINPRNSBS + 1;

/// Total number of satellite slots.
pub const MAXSAT: usize =
    NSATGPS + NSATGLO + NSATGAL + NSATQZS + NSATCMP + NSATIRN + NSATLEO + NSATSBS;

/// Constellation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sys {
    #[default]
    Gps,
    Glo,
    Gal,
    Qzs,
    Bds,
    Irn,
    Leo,
    Sbs,
}

pub const SYS_GPS: u32 = 0x01;
pub const SYS_SBS: u32 = 0x02;
pub const SYS_GLO: u32 = 0x04;
pub const SYS_GAL: u32 = 0x08;
pub const SYS_QZS: u32 = 0x10;
pub const SYS_CMP: u32 = 0x20;
pub const SYS_IRN: u32 = 0x40;
pub const SYS_LEO: u32 = 0x80;
pub const SYS_ALL: u32 = 0xFF;

impl Sys {
    /// Bit mask used by the `navsys` configuration word.
    pub fn mask(&self) -> u32 {
        match self {
            Self::Gps => SYS_GPS,
            Self::Glo => SYS_GLO,
            Self::Gal => SYS_GAL,
            Self::Qzs => SYS_QZS,
            Self::Bds => SYS_CMP,
            Self::Irn => SYS_IRN,
            Self::Leo => SYS_LEO,
            Self::Sbs => SYS_SBS,
        }
    }

    /// One letter id used by the human readable satellite ids.
    pub fn letter(&self) -> char {
        match self {
            Self::Gps => 'G',
            Self::Glo => 'R',
            Self::Gal => 'E',
            Self::Qzs => 'J',
            Self::Bds => 'C',
            Self::Irn => 'I',
            Self::Leo => 'L',
            Self::Sbs => 'S',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        Some(match c.to_ascii_uppercase() {
            'G' => Self::Gps,
            'R' => Self::Glo,
            'E' => Self::Gal,
            'J' => Self::Qzs,
            'C' => Self::Bds,
            'I' => Self::Irn,
            'L' => Self::Leo,
            'S' => Self::Sbs,
            _ => return None,
        })
    }

    fn prn_range(&self) -> (usize, usize) {
        match self {
            Self::Gps => (MINPRNGPS, MAXPRNGPS),
            Self::Glo => (MINPRNGLO, MAXPRNGLO),
            Self::Gal => (MINPRNGAL, MAXPRNGAL),
            Self::Qzs => (MINPRNQZS, MAXPRNQZS),
            Self::Bds => (MINPRNCMP, MAXPRNCMP),
            Self::Irn => (MINPRNIRN, MAXPRNIRN),
            Self::Leo => (MINPRNLEO, MAXPRNLEO),
            Self::Sbs => (MINPRNSBS, MAXPRNSBS),
        }
    }

    fn block_offset(&self) -> usize {
        match self {
            Self::Gps => 0,
            Self::Glo => NSATGPS,
            Self::Gal => NSATGPS + NSATGLO,
            Self::Qzs => NSATGPS + NSATGLO + NSATGAL,
            Self::Bds => NSATGPS + NSATGLO + NSATGAL + NSATQZS,
            Self::Irn => NSATGPS + NSATGLO + NSATGAL + NSATQZS + NSATCMP,
            Self::Leo => NSATGPS + NSATGLO + NSATGAL + NSATQZS + NSATCMP + NSATIRN,
            Self::Sbs => {
                NSATGPS + NSATGLO + NSATGAL + NSATQZS + NSATCMP + NSATIRN + NSATLEO
            },
        }
    }
}

impl std::fmt::Display for Sys {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Gps => write!(f, "GPS"),
            Self::Glo => write!(f, "GLONASS"),
            Self::Gal => write!(f, "Galileo"),
            Self::Qzs => write!(f, "QZSS"),
            Self::Bds => write!(f, "BeiDou"),
            Self::Irn => write!(f, "IRNSS"),
            Self::Leo => write!(f, "LEO"),
            Self::Sbs => write!(f, "SBAS"),
        }
    }
}

/// Dense satellite number from `(sys, prn)`, `None` when the prn lies
/// outside the constellation's allocation.
pub fn satno(sys: Sys, prn: usize) -> Option<usize> {
    let (min, max) = sys.prn_range();
    if prn < min || prn > max {
        return None;
    }
    Some(sys.block_offset() + prn - min + 1)
}

/// Recover `(sys, prn)` from a dense satellite number.
pub fn satsys(sat: usize) -> Option<(Sys, usize)> {
    if sat == 0 || sat > MAXSAT {
        return None;
    }
    let mut idx = sat - 1;
    for sys in [
        Sys::Gps,
        Sys::Glo,
        Sys::Gal,
        Sys::Qzs,
        Sys::Bds,
        Sys::Irn,
        Sys::Leo,
        Sys::Sbs,
    ] {
        let (min, max) = sys.prn_range();
        let n = max - min + 1;
        if idx < n {
            return Some((sys, min + idx));
        }
        idx -= n;
    }
    None
}

/// Parse a human readable id (`G01`, `R07`, `S138`, ...).
pub fn satid2no(id: &str) -> Result<usize, Error> {
    let id = id.trim();
    let mut chars = id.chars();
    let head = chars.next().ok_or_else(|| Error::InvalidId(id.into()))?;

    if head.is_ascii_digit() {
        // plain satellite number
        let sat: usize = id.parse().map_err(|_| Error::InvalidId(id.into()))?;
        if sat >= 1 && sat <= MAXSAT {
            return Ok(sat);
        }
        return Err(Error::InvalidId(id.into()));
    }
    let sys = Sys::from_letter(head).ok_or_else(|| Error::InvalidId(id.into()))?;
    let num: usize = chars
        .as_str()
        .parse()
        .map_err(|_| Error::InvalidId(id.into()))?;
    // QZSS ids count from J01 = prn 193
    let prn = match sys {
        Sys::Qzs => num + MINPRNQZS - 1,
        _ => num,
    };
    satno(sys, prn).ok_or_else(|| Error::InvalidId(id.into()))
}

/// Canonical human readable id for a satellite number.
pub fn satno2id(sat: usize) -> Option<String> {
    let (sys, prn) = satsys(sat)?;
    Some(match sys {
        Sys::Qzs => format!("J{:02}", prn - MINPRNQZS + 1),
        Sys::Sbs => format!("S{:03}", prn),
        _ => format!("{}{:02}", sys.letter(), prn),
    })
}

/// Satellite screening used ahead of every measurement: health, user
/// exclusion mask, constellation mask and ephemeris variance gate.
/// `exsats[sat-1]`: 0 default, 1 excluded, 2 force included.
pub fn satexclude(sat: usize, var: f64, svh: i32, navsys: u32, exsats: &[u8]) -> bool {
    if svh < 0 {
        return true; // no ephemeris
    }
    let Some((sys, _)) = satsys(sat) else {
        return true;
    };
    match exsats.get(sat - 1) {
        Some(1) => return true,
        Some(2) => return false,
        _ => {},
    }
    if sys.mask() & navsys == 0 {
        return true;
    }
    // QZSS LEX health bit does not affect positioning
    let svh = if sys == Sys::Qzs { svh & 0xFE } else { svh };
    if svh != 0 {
        warn!("unhealthy satellite: sat={sat} svh={svh:02X}");
        return true;
    }
    if var > MAX_VAR_EPH {
        warn!("invalid ura satellite: sat={sat} ura={:.2}", var.sqrt());
        return true;
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[test]
    fn dense_packing_is_bijective() {
        let mut seen = vec![false; MAXSAT + 1];
        for sys in [
            Sys::Gps,
            Sys::Glo,
            Sys::Gal,
            Sys::Qzs,
            Sys::Bds,
            Sys::Irn,
            Sys::Leo,
            Sys::Sbs,
        ] {
            let (min, max) = sys.prn_range();
            for prn in min..=max {
                let sat = satno(sys, prn).unwrap();
                assert!(!seen[sat], "slot reused: {sys} {prn}");
                seen[sat] = true;
                assert_eq!(satsys(sat), Some((sys, prn)));
            }
        }
        assert!(seen[1..].iter().all(|&s| s), "unallocated slots");
    }

    #[rstest]
    #[case("G01")]
    #[case("G32")]
    #[case("R07")]
    #[case("E36")]
    #[case("J02")]
    #[case("C21")]
    #[case("I05")]
    #[case("S138")]
    fn id_round_trip(#[case] id: &str) {
        let sat = satid2no(id).unwrap();
        assert_eq!(satno2id(sat).unwrap(), id);
    }

    #[test]
    fn out_of_range_prn() {
        assert!(satno(Sys::Gps, 0).is_none());
        assert!(satno(Sys::Gps, 33).is_none());
        assert!(satno(Sys::Sbs, 119).is_none());
        assert!(satid2no("G33").is_err());
        assert!(satid2no("X01").is_err());
    }

    #[test]
    fn exclusion_rules() {
        let sat = satno(Sys::Gps, 5).unwrap();
        let mut exsats = vec![0u8; MAXSAT];
        assert!(!satexclude(sat, 1.0, 0, SYS_ALL, &exsats));
        assert!(satexclude(sat, 1.0, -1, SYS_ALL, &exsats)); // no eph
        assert!(satexclude(sat, 1.0, 1, SYS_ALL, &exsats)); // unhealthy
        assert!(satexclude(sat, 1.0, 0, SYS_GLO, &exsats)); // masked out
        assert!(satexclude(sat, MAX_VAR_EPH * 2.0, 0, SYS_ALL, &exsats));
        exsats[sat - 1] = 1;
        assert!(satexclude(sat, 1.0, 0, SYS_ALL, &exsats));
        exsats[sat - 1] = 2;
        assert!(!satexclude(sat, 1.0, 1, SYS_ALL, &exsats)); // forced in
    }
}
