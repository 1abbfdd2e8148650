//! Processing options.

use crate::nav::Pcv;
use crate::signal::NFREQ;
use crate::sv::{MAXSAT, SYS_ALL};

/// Positioning mode.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Standalone single point positioning
    #[default]
    Single,
    /// Code differential
    Dgps,
    /// Carrier based kinematic
    Kinematic,
    /// Carrier based static
    Static,
    /// Moving baseline
    MovingBase,
    /// Fixed rover position (residual analysis)
    Fixed,
    /// Precise point positioning, kinematic
    PppKinematic,
    /// Precise point positioning, static
    PppStatic,
    /// Precise point positioning, fixed position
    PppFixed,
}

impl Mode {
    /// True for any PPP flavor.
    pub fn is_ppp(&self) -> bool {
        matches!(self, Self::PppKinematic | Self::PppStatic | Self::PppFixed)
    }
}

/// Satellite ephemeris source.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EphOpt {
    /// Broadcast ephemeris
    #[default]
    Brdc,
    /// Precise SP3/CLK products
    Prec,
    /// Broadcast + SBAS fast/long corrections
    Sbas,
    /// Broadcast + SSR, antenna phase center datum
    SsrApc,
    /// Broadcast + SSR, center of mass datum
    SsrCom,
}

/// Ionosphere handling.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IonoOpt {
    Off,
    /// Klobuchar broadcast model
    #[default]
    Brdc,
    /// SBAS grid
    Sbas,
    /// Dual frequency ionosphere free combination
    Iflc,
    /// Estimated as slant states
    Est,
    /// IONEX TEC grid
    Tec,
}

/// Troposphere handling.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TropOpt {
    Off,
    /// Saastamoinen model
    #[default]
    Saas,
    /// SBAS model variance
    Sbas,
    /// Estimated zenith delay
    Est,
    /// Estimated zenith delay + horizontal gradients
    Estg,
}

/// Integer ambiguity resolution mode.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArMode {
    #[default]
    Off,
    /// Continuous
    Cont,
    /// Instantaneous (ambiguities reset every epoch)
    Inst,
    /// Fix and hold once resolved
    FixHold,
}

/// Earth tide corrections applied to the receiver position.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TideCorr {
    #[default]
    Off,
    /// Solid Earth tide
    Solid,
    /// Solid + pole tide
    SolidPole,
}

/// SNR mask: per frequency thresholds at 5° elevation steps (0..90°).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnrMask {
    /// Enabled for (rover, base)
    pub ena: [bool; 2],
    /// Thresholds (dB-Hz) per frequency, 19 nodes at 5° steps
    pub mask: [[f64; 19]; NFREQ],
}

impl Default for SnrMask {
    fn default() -> Self {
        Self {
            ena: [false; 2],
            mask: [[0.0; 19]; NFREQ],
        }
    }
}

impl SnrMask {
    /// True when `snr` (dB-Hz) at elevation `el` (rad) passes the mask for
    /// frequency `f` and receiver `rcv` (0 rover, 1 base). Thresholds are
    /// interpolated between the 5° nodes.
    pub fn test(&self, rcv: usize, f: usize, el: f64, snr: f64) -> bool {
        if !self.ena.get(rcv).copied().unwrap_or(false) || f >= NFREQ {
            return true;
        }
        let eld = el.to_degrees().clamp(0.0, 90.0);
        let i = ((eld / 5.0) as usize).min(17);
        let a = (eld - i as f64 * 5.0) / 5.0;
        let thres = self.mask[f][i] * (1.0 - a) + self.mask[f][i + 1] * a;
        snr >= thres
    }
}

/// Measurement error model coefficients. The per row variance is
/// `sysfact²·codephasefact²·iflcfact²·(a² + b²/sin²(el)
///  + d²·10^(0.1·(snr_max−snr))) + e²·rcvstd²`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorModel {
    /// Code/phase variance ratio per frequency
    pub eratio: [f64; NFREQ],
    /// a: base phase error (m)
    pub a: f64,
    /// b: elevation dependent phase error (m)
    pub b: f64,
    /// c: baseline dependent (m / 10 km), unused in PPP
    pub c: f64,
    /// Doppler error (Hz)
    pub doppler: f64,
    /// SNR at which the SNR term vanishes (dB-Hz)
    pub snr_max: f64,
    /// d: SNR dependent error (m)
    pub d: f64,
    /// e: receiver std hint scale
    pub e: f64,
}

impl Default for ErrorModel {
    fn default() -> Self {
        Self {
            eratio: [300.0; NFREQ],
            a: 0.003,
            b: 0.003,
            c: 0.0,
            doppler: 1.0,
            snr_max: 52.0,
            d: 0.0,
            e: 0.0,
        }
    }
}

/// Process noise standard deviations.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessNoise {
    /// prn[0]: carrier phase bias (cycle)
    pub bias: f64,
    /// prn[1]: vertical ionosphere (m/√s)
    pub iono: f64,
    /// prn[2]: zenith troposphere (m/√s)
    pub trop: f64,
    /// prn[3]: horizontal acceleration (m/s²/√s)
    pub acch: f64,
    /// prn[4]: vertical acceleration (m/s²/√s)
    pub accv: f64,
    /// prn[5]: static position random walk (m/√s)
    pub pos: f64,
}

impl Default for ProcessNoise {
    fn default() -> Self {
        Self {
            bias: 1E-4,
            iono: 1E-3,
            trop: 1E-4,
            acch: 1E-1,
            accv: 1E-2,
            pos: 0.0,
        }
    }
}

/// Initial state standard deviations.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InitialStd {
    /// Carrier phase bias (m)
    pub bias: f64,
    /// Vertical ionosphere (m)
    pub iono: f64,
    /// Zenith troposphere (m)
    pub trop: f64,
}

impl Default for InitialStd {
    fn default() -> Self {
        Self {
            bias: 30.0,
            iono: 0.03,
            trop: 0.3,
        }
    }
}

/// Precise model switches.
#[derive(Debug, Copy, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosOpt {
    /// Satellite antenna phase center model
    pub satpcv: bool,
    /// Receiver antenna phase center model
    pub recpcv: bool,
    /// Carrier phase windup correction
    pub windup: bool,
    /// Exclude eclipsing Block IIA satellites
    pub rejeclipse: bool,
    /// Handle receiver clock day boundary jumps
    pub clkjump: bool,
}

/// Processing options.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Number of frequencies used (1..=NFREQ)
    pub nf: usize,
    /// Constellation mask, see [crate::sv]
    pub navsys: u32,
    /// Elevation cutoff (rad)
    pub elmin: f64,
    pub snrmask: SnrMask,
    pub sateph: EphOpt,
    pub ionoopt: IonoOpt,
    pub tropopt: TropOpt,
    /// Receiver dynamics (velocity/acceleration states)
    pub dynamics: bool,
    pub tidecorr: TideCorr,
    /// Filter iterations per epoch
    pub niter: usize,
    pub modear: ArMode,
    /// Consecutive fixes before hold
    pub minfix: usize,
    /// Outage count resetting an ambiguity
    pub maxout: usize,
    /// Min lock count before an ambiguity joins AR
    pub minlock: usize,
    /// AR validation thresholds; `thresar[0]` ratio test,
    /// `thresar[1]` position variance gate for dynamics
    pub thresar: [f64; 8],
    /// Geometry free slip threshold (m)
    pub thresslip: f64,
    /// Max age between observation and ephemeris reference (s)
    pub maxtdiff: f64,
    /// Prefit innovation gates (m): [phase, code]
    pub maxinno: [f64; 2],
    /// Suppress output above this 3-D sigma (m), 0 = no gate
    pub maxsolstd: f64,
    pub err: ErrorModel,
    pub prn: ProcessNoise,
    pub std: InitialStd,
    /// Satellite clock stability (s/s), inter-epoch clock drift guard
    pub sclkstab: f64,
    pub posopt: PosOpt,
    /// Per satellite exclusion: 0 default, 1 excluded, 2 forced in
    pub exsats: Vec<u8>,
    /// Receiver antenna models (rover, base)
    pub pcvr: [Pcv; 2],
    /// Antenna delta ENU (rover, base)
    pub antdel: [[f64; 3]; 2],
    /// Fixed rover position, ECEF (Mode::PppFixed / Mode::Fixed)
    pub ru: [f64; 3],
    /// Extended PPP options (`-GAP_RESION=n` ...)
    pub pppopt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Single,
            nf: 2,
            navsys: SYS_ALL,
            elmin: 15.0_f64.to_radians(),
            snrmask: SnrMask::default(),
            sateph: EphOpt::Brdc,
            ionoopt: IonoOpt::Brdc,
            tropopt: TropOpt::Saas,
            dynamics: false,
            tidecorr: TideCorr::Off,
            niter: 1,
            modear: ArMode::Off,
            minfix: 10,
            maxout: 5,
            minlock: 0,
            thresar: [3.0, 0.05, 0.0, 1E-9, 1E-5, 0.0, 0.0, 0.0],
            thresslip: 0.05,
            maxtdiff: 30.0,
            maxinno: [30.0, 30.0],
            maxsolstd: 0.0,
            err: ErrorModel::default(),
            prn: ProcessNoise::default(),
            std: InitialStd::default(),
            sclkstab: 5E-12,
            posopt: PosOpt::default(),
            exsats: vec![0; MAXSAT],
            pcvr: [Pcv::default(), Pcv::default()],
            antdel: [[0.0; 3]; 2],
            ru: [0.0; 3],
            pppopt: String::new(),
        }
    }
}

impl Config {
    /// Preset for kinematic PPP on `nf` frequencies.
    pub fn ppp_kinematic(nf: usize) -> Self {
        Self {
            mode: Mode::PppKinematic,
            nf: nf.clamp(1, NFREQ),
            ionoopt: IonoOpt::Est,
            tropopt: TropOpt::Estg,
            posopt: PosOpt {
                satpcv: true,
                recpcv: true,
                windup: true,
                rejeclipse: true,
                clkjump: false,
            },
            ..Default::default()
        }
    }

    /// Preset for static PPP on `nf` frequencies.
    pub fn ppp_static(nf: usize) -> Self {
        Self {
            mode: Mode::PppStatic,
            ..Self::ppp_kinematic(nf)
        }
    }

    /// Parse an integer extension flag like `-GAP_RESION=200` out of
    /// [Config::pppopt].
    pub fn ppp_ext_flag(&self, key: &str) -> Option<i64> {
        for token in self.pppopt.split_whitespace() {
            if let Some(rest) = token.strip_prefix(key) {
                if let Some(v) = rest.strip_prefix('=') {
                    return v.parse().ok();
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snr_mask_interpolates() {
        let mut m = SnrMask::default();
        m.ena[0] = true;
        m.mask[0] = [30.0; 19];
        m.mask[0][6] = 40.0; // 30°
        m.mask[0][7] = 20.0; // 35°
        assert!(!m.test(0, 0, 30.0_f64.to_radians(), 35.0));
        assert!(m.test(0, 0, 35.0_f64.to_radians(), 35.0));
        // halfway: threshold 30
        assert!(m.test(0, 0, 32.5_f64.to_radians(), 30.5));
        // disabled receiver always passes
        assert!(m.test(1, 0, 0.1, 0.0));
    }

    #[test]
    fn ppp_ext_flags() {
        let mut cfg = Config::ppp_kinematic(2);
        cfg.pppopt = "-GAP_RESION=200 -OTHER=1".into();
        assert_eq!(cfg.ppp_ext_flag("-GAP_RESION"), Some(200));
        assert_eq!(cfg.ppp_ext_flag("-MISSING"), None);
    }
}
