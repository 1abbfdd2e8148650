//! Navigation data arenas.
//!
//! [Nav] aggregates every correction product the engine consumes:
//! broadcast ephemerides of all flavors, precise orbit/clock series,
//! ionosphere grids, Earth rotation parameters, code biases, antenna
//! models, SBAS correction sets and per satellite SSR slots. Decoders
//! (RINEX, RTCM, receiver binaries) live outside this crate and fill
//! these arenas through plain struct construction.

use crate::coords::ErpVal;
use crate::signal::{Code, NFREQ};
use crate::sv::{Sys, MAXSAT, NSATGLO};
use crate::time::{timediff, GTime};

/// Kepler broadcast ephemeris (GPS/QZSS/Galileo/BDS/IRNSS).
#[derive(Debug, Copy, Clone, Default)]
pub struct Eph {
    pub sat: usize,
    /// Issue of data, ephemeris / clock
    pub iode: i32,
    pub iodc: i32,
    /// SV accuracy index (URA / SISA)
    pub sva: i32,
    /// Health bits (0 = healthy)
    pub svh: i32,
    /// GPS/QZS week number
    pub week: i32,
    /// Galileo: data source (bit 0 I/NAV, bit 1 F/NAV); BDS: GEO flag bit
    pub code: i32,
    pub toe: GTime,
    pub toc: GTime,
    pub ttr: GTime,
    /// Semi-major axis (m)
    pub a: f64,
    pub e: f64,
    pub i0: f64,
    pub omg0: f64,
    pub omg: f64,
    pub m0: f64,
    pub deln: f64,
    pub omgd: f64,
    pub idot: f64,
    pub crc: f64,
    pub crs: f64,
    pub cuc: f64,
    pub cus: f64,
    pub cic: f64,
    pub cis: f64,
    /// Time of ephemeris, seconds in week
    pub toes: f64,
    /// Fit interval (h)
    pub fit: f64,
    /// Clock polynomial
    pub f0: f64,
    pub f1: f64,
    pub f2: f64,
    /// Group delays (s): tgd[0] L1/L2 or B1/B3, tgd[1] extra per system
    pub tgd: [f64; 4],
}

/// GLONASS broadcast ephemeris in PZ-90.
#[derive(Debug, Copy, Clone, Default)]
pub struct GEph {
    pub sat: usize,
    pub iode: i32,
    /// Frequency channel number (-7..=6)
    pub frq: i32,
    pub svh: i32,
    pub sva: i32,
    pub age: i32,
    pub toe: GTime,
    pub tof: GTime,
    /// Position/velocity/acceleration (m, m/s, m/s²)
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub acc: [f64; 3],
    /// Clock bias τ (s)
    pub taun: f64,
    /// Relative frequency bias γ
    pub gamn: f64,
    /// L1-L2 delay (s)
    pub dtaun: f64,
}

/// SBAS (GEO) broadcast ephemeris.
#[derive(Debug, Copy, Clone, Default)]
pub struct SEph {
    pub sat: usize,
    pub t0: GTime,
    pub tof: GTime,
    pub sva: i32,
    pub svh: i32,
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub acc: [f64; 3],
    pub af0: f64,
    pub af1: f64,
}

/// Almanac, kept for completeness of the arena model.
#[derive(Debug, Copy, Clone, Default)]
pub struct Alm {
    pub sat: usize,
    pub svh: i32,
    pub svconf: i32,
    pub week: i32,
    pub toa: GTime,
    pub a: f64,
    pub e: f64,
    pub i0: f64,
    pub omg0: f64,
    pub omg: f64,
    pub m0: f64,
    pub omgd: f64,
    pub toas: f64,
    pub f0: f64,
    pub f1: f64,
}

/// One precise ephemeris epoch (SP3): per satellite position + clock,
/// with standard deviations.
#[derive(Debug, Clone)]
pub struct PEph {
    pub time: GTime,
    /// `pos[sat-1] = [x, y, z (m), clock (s)]`
    pub pos: Vec<[f64; 4]>,
    pub std: Vec<[f32; 4]>,
    /// Velocity + clock rate, zero when the product has none
    pub vel: Vec<[f64; 4]>,
    pub vst: Vec<[f32; 4]>,
}

impl PEph {
    pub fn new(time: GTime) -> Self {
        Self {
            time,
            pos: vec![[0.0; 4]; MAXSAT],
            std: vec![[0.0; 4]; MAXSAT],
            vel: vec![[0.0; 4]; MAXSAT],
            vst: vec![[0.0; 4]; MAXSAT],
        }
    }
}

/// One precise clock epoch (CLK).
#[derive(Debug, Clone)]
pub struct PClk {
    pub time: GTime,
    /// `clk[sat-1]` (s), zero when absent
    pub clk: Vec<f64>,
    pub std: Vec<f32>,
}

impl PClk {
    pub fn new(time: GTime) -> Self {
        Self {
            time,
            clk: vec![0.0; MAXSAT],
            std: vec![0.0; MAXSAT],
        }
    }
}

/// SBAS fast correction slot.
#[derive(Debug, Copy, Clone, Default)]
pub struct SbsFcor {
    pub t0: GTime,
    /// Pseudorange correction (m)
    pub prc: f64,
    /// Range rate correction (m/s)
    pub rrc: f64,
    pub dt: f64,
    pub iodf: i32,
    pub udre: i32,
    pub ai: i32,
}

/// SBAS long term correction slot.
#[derive(Debug, Copy, Clone, Default)]
pub struct SbsLcor {
    pub t0: GTime,
    pub iode: i32,
    pub dpos: [f64; 3],
    pub dvel: [f64; 3],
    pub daf0: f64,
    pub daf1: f64,
}

/// SBAS satellite correction (fast + long term).
#[derive(Debug, Copy, Clone, Default)]
pub struct SbsSatCorr {
    pub sat: usize,
    pub fcor: SbsFcor,
    pub lcor: SbsLcor,
}

/// SBAS satellite correction set.
#[derive(Debug, Clone, Default)]
pub struct SbsSat {
    pub iodp: i32,
    pub sats: Vec<SbsSatCorr>,
}

/// SBAS ionosphere grid point.
#[derive(Debug, Copy, Clone, Default)]
pub struct SbsIgp {
    pub t0: GTime,
    /// Latitude/longitude (deg)
    pub lat: f64,
    pub lon: f64,
    /// Give index
    pub give: i32,
    /// Vertical delay (m)
    pub delay: f64,
}

/// SBAS ionosphere correction band.
#[derive(Debug, Clone, Default)]
pub struct SbsIon {
    pub iodi: i32,
    pub igps: Vec<SbsIgp>,
}

/// SSR correction slot for one satellite.
/// `t0/udi/iod` index: 0 orbit, 1 clock, 2 high rate clock, 3 URA,
/// 4 code bias, 5 phase bias.
#[derive(Debug, Clone, Default)]
pub struct Ssr {
    pub t0: [GTime; 6],
    pub udi: [f64; 6],
    pub iod: [i32; 6],
    /// Issue of broadcast ephemeris the deltas refer to
    pub iode: i32,
    pub iodcrc: i32,
    pub ura: i32,
    /// Reference datum (0 ITRF, 1 regional)
    pub refd: i32,
    /// Radial/along/cross orbit delta (m)
    pub deph: [f64; 3],
    /// Orbit delta rate (m/s)
    pub ddeph: [f64; 3],
    /// Clock polynomial delta (m, m/s, m/s²)
    pub dclk: [f64; 3],
    /// High rate clock (m)
    pub hrclk: f64,
    /// Code biases per [Code] discriminant (m)
    pub cbias: Vec<f32>,
    pub update: bool,
}

impl Ssr {
    pub fn new() -> Self {
        Self {
            cbias: vec![0.0; Code::ALL.len() + 1],
            ..Default::default()
        }
    }
}

/// IONEX TEC grid at one epoch.
#[derive(Debug, Clone, Default)]
pub struct Tec {
    pub time: GTime,
    /// Grid dimensions (lat, lon, height)
    pub ndata: [usize; 3],
    /// Earth radius used by the product (km)
    pub rb: f64,
    /// `{start, end, step}` per axis (deg, deg, km)
    pub lats: [f64; 3],
    pub lons: [f64; 3],
    pub hgts: [f64; 3],
    /// TEC values (TECU), `data[i + ndata[0]*(j + ndata[1]*k)]`
    pub data: Vec<f64>,
    /// RMS values (TECU)
    pub rms: Vec<f32>,
}

/// One Earth rotation parameter record.
#[derive(Debug, Copy, Clone, Default)]
pub struct ErpData {
    /// Modified Julian day
    pub mjd: f64,
    /// Pole offsets (rad) and rates (rad/day)
    pub xp: f64,
    pub yp: f64,
    pub xpr: f64,
    pub ypr: f64,
    pub ut1_utc: f64,
    pub lod: f64,
}

/// Earth rotation parameter table.
#[derive(Debug, Clone, Default)]
pub struct Erp {
    pub data: Vec<ErpData>,
}

impl Erp {
    /// Interpolate parameters at `time` (GPST). Zero outside the table.
    pub fn geterp(&self, time: GTime) -> ErpVal {
        if self.data.is_empty() {
            return ErpVal::default();
        }
        let ep2000 = crate::time::epoch2time(&[2000.0, 1.0, 1.0, 12.0, 0.0, 0.0]);
        let mjd = 51544.5 + timediff(crate::time::gpst2utc(time), ep2000) / 86400.0;

        let d = &self.data;
        if mjd <= d[0].mjd {
            let e = &d[0];
            return ErpVal { xp: e.xp, yp: e.yp, ut1_utc: e.ut1_utc, lod: e.lod };
        }
        if mjd >= d[d.len() - 1].mjd {
            let e = &d[d.len() - 1];
            return ErpVal { xp: e.xp, yp: e.yp, ut1_utc: e.ut1_utc, lod: e.lod };
        }
        let i = d.partition_point(|e| e.mjd < mjd);
        let (a, b) = (&d[i - 1], &d[i]);
        let k = (mjd - a.mjd) / (b.mjd - a.mjd);
        ErpVal {
            xp: a.xp + k * (b.xp - a.xp),
            yp: a.yp + k * (b.yp - a.yp),
            ut1_utc: a.ut1_utc + k * (b.ut1_utc - a.ut1_utc),
            lod: a.lod + k * (b.lod - a.lod),
        }
    }
}

/// Antenna phase center model (satellite or receiver).
#[derive(Debug, Clone, Default)]
pub struct Pcv {
    /// Satellite number, 0 for a receiver antenna
    pub sat: usize,
    /// Antenna descriptor (receiver) or block type (satellite)
    pub type_: String,
    /// Serial number or radome code
    pub code: String,
    pub ts: GTime,
    pub te: GTime,
    /// Phase center offset per frequency: satellite body frame (satellite)
    /// or ENU (receiver), meters
    pub off: [[f64; 3]; NFREQ],
    /// Phase center variation per frequency, zenith/nadir 0..90° in 5°
    /// steps, meters
    pub var: [[f64; 19]; NFREQ],
}

/// Navigation data arenas.
#[derive(Debug, Clone)]
pub struct Nav {
    pub eph: Vec<Eph>,
    pub geph: Vec<GEph>,
    pub seph: Vec<SEph>,
    pub alm: Vec<Alm>,
    pub peph: Vec<PEph>,
    pub pclk: Vec<PClk>,
    pub tec: Vec<Tec>,
    pub erp: Erp,
    /// Klobuchar α/β (GPS), and per constellation equivalents
    pub ion_gps: [f64; 8],
    pub ion_qzs: [f64; 8],
    pub ion_cmp: [f64; 8],
    pub ion_irn: [f64; 8],
    /// NeQuick coefficients (Galileo)
    pub ion_gal: [f64; 4],
    /// UTC conversion parameters per constellation (a0, a1, tot, week, ...)
    pub utc_gps: [f64; 8],
    pub utc_glo: [f64; 8],
    pub utc_gal: [f64; 8],
    pub utc_qzs: [f64; 8],
    pub utc_cmp: [f64; 8],
    pub utc_irn: [f64; 9],
    pub utc_sbs: [f64; 8],
    /// GLONASS frequency channel per prn slot
    pub glo_fcn: [Option<i8>; NSATGLO],
    /// Satellite DCB (m): `[P1-P2, P1-C1, P2-C2]` per satellite
    pub cbias: [[f64; 3]; MAXSAT],
    /// Receiver DCB (m) per receiver (rover, base)
    pub rbias: [[f64; 3]; 2],
    /// Satellite antenna models
    pub pcvs: Vec<Pcv>,
    pub sbssat: SbsSat,
    pub sbsion: Vec<SbsIon>,
    /// SSR slot per satellite, `ssr[sat-1]`
    pub ssr: Vec<Ssr>,
    /// Geoid undulation at the rover, used by NMEA/GPX emission (m)
    pub geoidh: f64,
}

impl Default for Nav {
    fn default() -> Self {
        Self {
            eph: Vec::new(),
            geph: Vec::new(),
            seph: Vec::new(),
            alm: Vec::new(),
            peph: Vec::new(),
            pclk: Vec::new(),
            tec: Vec::new(),
            erp: Erp::default(),
            ion_gps: [0.0; 8],
            ion_qzs: [0.0; 8],
            ion_cmp: [0.0; 8],
            ion_irn: [0.0; 8],
            ion_gal: [0.0; 4],
            utc_gps: [0.0; 8],
            utc_glo: [0.0; 8],
            utc_gal: [0.0; 8],
            utc_qzs: [0.0; 8],
            utc_cmp: [0.0; 8],
            utc_irn: [0.0; 9],
            utc_sbs: [0.0; 8],
            glo_fcn: [None; NSATGLO],
            cbias: [[0.0; 3]; MAXSAT],
            rbias: [[0.0; 3]; 2],
            pcvs: Vec::new(),
            sbssat: SbsSat::default(),
            sbsion: Vec::new(),
            ssr: (0..MAXSAT).map(|_| Ssr::new()).collect(),
            geoidh: 0.0,
        }
    }
}

impl Nav {
    pub fn new() -> Self {
        Self::default()
    }

    /// GLONASS frequency channel of a satellite, from the FCN table with
    /// broadcast ephemeris fallback.
    pub fn glo_frq(&self, sat: usize) -> Option<i32> {
        let (sys, prn) = crate::sv::satsys(sat)?;
        if sys != Sys::Glo {
            return None;
        }
        if let Some(fcn) = self.glo_fcn[prn - 1] {
            return Some(fcn as i32);
        }
        self.geph
            .iter()
            .find(|g| g.sat == sat)
            .map(|g| g.frq)
    }

    /// Carrier frequency of an observation code, GLONASS FDMA channels
    /// resolved through the FCN table. Zero for an unknown pairing.
    pub fn sat2freq(&self, sat: usize, code: Code) -> f64 {
        let Some((sys, _)) = crate::sv::satsys(sat) else {
            return 0.0;
        };
        let fcn = if sys == Sys::Glo {
            match self.glo_frq(sat) {
                Some(f) => f,
                None => return 0.0,
            }
        } else {
            0
        };
        crate::signal::code2freq(sys, code, fcn)
    }

    /// Satellite antenna model lookup.
    pub fn satpcv(&self, sat: usize, time: GTime) -> Option<&Pcv> {
        self.pcvs.iter().find(|p| {
            p.sat == sat
                && (p.ts.is_zero() || timediff(p.ts, time) <= 0.0)
                && (p.te.is_zero() || timediff(p.te, time) >= 0.0)
        })
    }
}
