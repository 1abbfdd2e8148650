//! Solution records and text emission: LLH/XYZ/ENU lines, NMEA
//! sentences and the per-satellite residual dump.

use crate::constants::{CLIGHT, R2D};
use crate::coords::{covenu, deg2dms, dops, ecef2enu, ecef2pos};
use crate::ppp::SSat;
use crate::signal::NFREQ;
use crate::sv::{satno2id, satsys, Sys};
use crate::time::{gpst2utc, time2epoch, time2gpst, time2str, timeadd, GTime};
use nalgebra::{Matrix3, Vector3};
use std::fmt::Write as _;

/// Solution status, ordered from worst to best.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Default)]
pub enum SolStatus {
    #[default]
    None,
    Dr,
    Single,
    Sbas,
    Dgps,
    Ppp,
    Float,
    Fix,
}

impl SolStatus {
    /// NMEA 0183 GGA quality flag.
    fn nmea_quality(self) -> u8 {
        match self {
            SolStatus::None => 0,
            SolStatus::Single => 1,
            SolStatus::Dgps => 2,
            SolStatus::Ppp => 3,
            SolStatus::Fix => 4,
            SolStatus::Float => 5,
            SolStatus::Dr => 6,
            SolStatus::Sbas => 9,
        }
    }

    /// Tag used by the GPX `<fix>` extension.
    pub fn gpx_fix(self) -> &'static str {
        match self {
            SolStatus::Fix => "fix",
            SolStatus::Float => "float",
            SolStatus::Sbas => "sbas",
            SolStatus::Dgps => "dgps",
            SolStatus::Ppp => "ppp",
            _ => "3d",
        }
    }
}

/// One epoch solution.
#[derive(Debug, Copy, Clone, Default)]
pub struct Sol {
    pub time: GTime,
    pub eventime: GTime,
    /// ECEF position (m) and velocity (m/s)
    pub rr: [f64; 6],
    /// Position covariance triangle `{xx, yy, zz, xy, yz, zx}` (m²)
    pub qr: [f32; 6],
    /// Velocity covariance triangle
    pub qv: [f32; 6],
    /// Receiver clock offsets (s): GPS, GLO-GPS, GAL-GPS, QZS-GPS,
    /// BDS-GPS, IRN-GPS
    pub dtr: [f64; 6],
    pub stat: SolStatus,
    /// Satellites used
    pub ns: u8,
    /// Age of differential (s)
    pub age: f32,
    /// AR validation ratio
    pub ratio: f32,
}

impl Sol {
    /// 3D position sigma (m).
    pub fn std_3d(&self) -> f64 {
        (self.qr[0] as f64 + self.qr[1] as f64 + self.qr[2] as f64)
            .max(0.0)
            .sqrt()
    }

    fn qr_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.qr[0] as f64, self.qr[3] as f64, self.qr[5] as f64, //
            self.qr[3] as f64, self.qr[1] as f64, self.qr[4] as f64, //
            self.qr[5] as f64, self.qr[4] as f64, self.qr[2] as f64,
        )
    }
}

/// Output position format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SolFormat {
    #[default]
    Llh,
    Xyz,
    Enu,
    Nmea,
}

/// Output time system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TimeSys {
    #[default]
    Gpst,
    Utc,
    Jst,
}

/// Solution output options.
#[derive(Debug, Clone)]
pub struct SolOpt {
    pub posf: SolFormat,
    pub times: TimeSys,
    /// Calendar time instead of week/TOW
    pub timef: bool,
    /// Time decimals
    pub timeu: usize,
    /// Latitude/longitude as deg-min-sec instead of decimal degrees
    pub degf: bool,
    pub outhead: bool,
    /// Geodetic instead of ellipsoidal height
    pub height_geodetic: bool,
    pub sep: String,
    /// Suppress output when the 3D sigma exceeds this (m, 0 = off)
    pub maxsolstd: f64,
    /// NMEA talker id
    pub nmeaintv: f64,
}

impl Default for SolOpt {
    fn default() -> Self {
        Self {
            posf: SolFormat::Llh,
            times: TimeSys::Gpst,
            timef: true,
            timeu: 3,
            degf: false,
            outhead: true,
            height_geodetic: false,
            sep: " ".into(),
            maxsolstd: 0.0,
            nmeaintv: 0.0,
        }
    }
}

fn sol_time(time: GTime, opt: &SolOpt) -> GTime {
    match opt.times {
        TimeSys::Gpst => time,
        TimeSys::Utc => gpst2utc(time),
        TimeSys::Jst => timeadd(gpst2utc(time), 9.0 * 3600.0),
    }
}

fn format_time(time: GTime, opt: &SolOpt) -> String {
    let t = sol_time(time, opt);
    if opt.timef {
        time2str(t, opt.timeu)
    } else {
        let (week, tow) = time2gpst(t);
        format!("{week:4}{}{tow:.prec$}", opt.sep, prec = opt.timeu)
    }
}

fn format_deg(deg: f64, opt: &SolOpt) -> String {
    if opt.degf {
        let dms = deg2dms(deg, 7);
        format!(
            "{:4.0}{}{:02.0}{}{:010.7}",
            dms[0], opt.sep, dms[1], opt.sep, dms[2]
        )
    } else {
        format!("{deg:13.9}")
    }
}

/// Column header line for the configured format.
pub fn outsolhead(opt: &SolOpt) -> String {
    let s = &opt.sep;
    let time = if opt.timef {
        "GPST".to_string()
    } else {
        format!("week{s}tow")
    };
    match opt.posf {
        SolFormat::Llh => format!(
            "%  {time}{s}latitude(deg){s}longitude(deg){s}height(m){s}Q{s}ns{s}sdn(m){s}sde(m){s}sdu(m){s}sdne(m){s}sdeu(m){s}sdun(m){s}age(s){s}ratio\n"
        ),
        SolFormat::Xyz => format!(
            "%  {time}{s}x-ecef(m){s}y-ecef(m){s}z-ecef(m){s}Q{s}ns{s}sdx(m){s}sdy(m){s}sdz(m){s}sdxy(m){s}sdyz(m){s}sdzx(m){s}age(s){s}ratio\n"
        ),
        SolFormat::Enu => format!(
            "%  {time}{s}e-baseline(m){s}n-baseline(m){s}u-baseline(m){s}Q{s}ns{s}sde(m){s}sdn(m){s}sdu(m){s}sden(m){s}sdnu(m){s}sdue(m){s}age(s){s}ratio\n"
        ),
        SolFormat::Nmea => String::new(),
    }
}

fn sqrt_signed(v: f64) -> f64 {
    if v < 0.0 {
        -(-v).sqrt()
    } else {
        v.sqrt()
    }
}

fn quality(sol: &Sol) -> u8 {
    match sol.stat {
        SolStatus::Fix => 1,
        SolStatus::Float => 2,
        SolStatus::Sbas => 3,
        SolStatus::Dgps => 4,
        SolStatus::Single => 5,
        SolStatus::Ppp => 6,
        SolStatus::Dr => 7,
        SolStatus::None => 0,
    }
}

/// One solution line in the configured format. Empty when the solution
/// is suppressed by the `maxsolstd` gate or carries no position.
pub fn outsol(sol: &Sol, opt: &SolOpt, rb: &[f64; 3], geoidh: f64) -> String {
    if sol.stat == SolStatus::None {
        return String::new();
    }
    if opt.maxsolstd > 0.0 && sol.std_3d() > opt.maxsolstd {
        return String::new();
    }
    let s = &opt.sep;
    let ts = format_time(sol.time, opt);
    let rr = Vector3::new(sol.rr[0], sol.rr[1], sol.rr[2]);

    match opt.posf {
        SolFormat::Llh => {
            let pos = ecef2pos(&rr);
            let qenu = covenu(&pos, &sol.qr_matrix());
            let h = if opt.height_geodetic {
                pos[2] - geoidh
            } else {
                pos[2]
            };
            format!(
                "{ts}{s}{}{s}{}{s}{h:10.4}{s}{:3}{s}{:3}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:6.2}{s}{:6.1}\n",
                format_deg(pos[0] * R2D, opt),
                format_deg(pos[1] * R2D, opt),
                quality(sol),
                sol.ns,
                qenu[(1, 1)].max(0.0).sqrt(),
                qenu[(0, 0)].max(0.0).sqrt(),
                qenu[(2, 2)].max(0.0).sqrt(),
                sqrt_signed(qenu[(0, 1)]),
                sqrt_signed(qenu[(0, 2)]),
                sqrt_signed(qenu[(1, 2)]),
                sol.age,
                sol.ratio
            )
        },
        SolFormat::Xyz => format!(
            "{ts}{s}{:14.4}{s}{:14.4}{s}{:14.4}{s}{:3}{s}{:3}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:6.2}{s}{:6.1}\n",
            sol.rr[0],
            sol.rr[1],
            sol.rr[2],
            quality(sol),
            sol.ns,
            (sol.qr[0] as f64).max(0.0).sqrt(),
            (sol.qr[1] as f64).max(0.0).sqrt(),
            (sol.qr[2] as f64).max(0.0).sqrt(),
            sqrt_signed(sol.qr[3] as f64),
            sqrt_signed(sol.qr[4] as f64),
            sqrt_signed(sol.qr[5] as f64),
            sol.age,
            sol.ratio
        ),
        SolFormat::Enu => {
            let rbv = Vector3::new(rb[0], rb[1], rb[2]);
            if rbv.norm() <= 0.0 {
                return String::new();
            }
            let pos = ecef2pos(&rbv);
            let enu = ecef2enu(&pos, &(rr - rbv));
            let qenu = covenu(&pos, &sol.qr_matrix());
            format!(
                "{ts}{s}{:14.4}{s}{:14.4}{s}{:14.4}{s}{:3}{s}{:3}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:8.4}{s}{:6.2}{s}{:6.1}\n",
                enu[0],
                enu[1],
                enu[2],
                quality(sol),
                sol.ns,
                qenu[(0, 0)].max(0.0).sqrt(),
                qenu[(1, 1)].max(0.0).sqrt(),
                qenu[(2, 2)].max(0.0).sqrt(),
                sqrt_signed(qenu[(0, 1)]),
                sqrt_signed(qenu[(1, 2)]),
                sqrt_signed(qenu[(0, 2)]),
                sol.age,
                sol.ratio
            )
        },
        SolFormat::Nmea => {
            let mut out = outnmea_rmc(sol);
            out.push_str(&outnmea_gga(sol, geoidh));
            out
        },
    }
}

fn nmea_checksum(body: &str) -> String {
    let sum = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{sum:02X}\r\n")
}

/// NMEA GGA sentence.
pub fn outnmea_gga(sol: &Sol, geoidh: f64) -> String {
    if sol.stat == SolStatus::None {
        return nmea_checksum("GPGGA,,,,,,,,,,,,,,");
    }
    let ep = time2epoch(gpst2utc(sol.time));
    let rr = Vector3::new(sol.rr[0], sol.rr[1], sol.rr[2]);
    let pos = ecef2pos(&rr);
    let dms1 = deg2dms((pos[0] * R2D).abs(), 7);
    let dms2 = deg2dms((pos[1] * R2D).abs(), 7);

    let body = format!(
        "GPGGA,{:02.0}{:02.0}{:05.2},{:02.0}{:010.7},{},{:03.0}{:010.7},{},{},{:02},{:.1},{:.3},M,{:.3},M,{:.1},",
        ep[3],
        ep[4],
        ep[5],
        dms1[0],
        dms1[1] + dms1[2] / 60.0,
        if pos[0] >= 0.0 { "N" } else { "S" },
        dms2[0],
        dms2[1] + dms2[2] / 60.0,
        if pos[1] >= 0.0 { "E" } else { "W" },
        sol.stat.nmea_quality(),
        sol.ns,
        1.0,
        pos[2] - geoidh,
        geoidh,
        sol.age
    );
    nmea_checksum(&body)
}

/// NMEA RMC sentence.
pub fn outnmea_rmc(sol: &Sol) -> String {
    const KNOT: f64 = 1852.0 / 3600.0;
    if sol.stat == SolStatus::None {
        return nmea_checksum("GPRMC,,,,,,,,,,,,");
    }
    let ep = time2epoch(gpst2utc(sol.time));
    let rr = Vector3::new(sol.rr[0], sol.rr[1], sol.rr[2]);
    let pos = ecef2pos(&rr);
    let enuv = ecef2enu(&pos, &Vector3::new(sol.rr[3], sol.rr[4], sol.rr[5]));
    let vel = enuv.norm();
    let dir = if vel >= 1.0 {
        let mut d = enuv[0].atan2(enuv[1]) * R2D;
        if d < 0.0 {
            d += 360.0;
        }
        d
    } else {
        0.0
    };
    let dms1 = deg2dms((pos[0] * R2D).abs(), 7);
    let dms2 = deg2dms((pos[1] * R2D).abs(), 7);
    let mode = match sol.stat {
        SolStatus::Dgps | SolStatus::Sbas | SolStatus::Float | SolStatus::Fix | SolStatus::Ppp => {
            "D"
        },
        SolStatus::Dr => "E",
        _ => "A",
    };
    let yy = ep[0] - (ep[0] / 100.0).floor() * 100.0;
    let body = format!(
        "GPRMC,{:02.0}{:02.0}{:05.2},A,{:02.0}{:010.7},{},{:03.0}{:010.7},{},{:4.2},{:4.2},{:02.0}{:02.0}{:02.0},,,{}",
        ep[3],
        ep[4],
        ep[5],
        dms1[0],
        dms1[1] + dms1[2] / 60.0,
        if pos[0] >= 0.0 { "N" } else { "S" },
        dms2[0],
        dms2[1] + dms2[2] / 60.0,
        if pos[1] >= 0.0 { "E" } else { "W" },
        vel / KNOT,
        dir,
        ep[2],
        ep[1],
        yy,
        mode
    );
    nmea_checksum(&body)
}

// per constellation NMEA system id for GSA/GSV grouping
fn nmea_talker(sys: Sys) -> &'static str {
    match sys {
        Sys::Gps | Sys::Sbs => "GP",
        Sys::Glo => "GL",
        Sys::Gal => "GA",
        Sys::Qzs => "GQ",
        Sys::Bds => "GB",
        _ => "GN",
    }
}

fn nmea_prn(sat: usize) -> Option<usize> {
    let (sys, prn) = satsys(sat)?;
    Some(match sys {
        Sys::Sbs => prn - 87, // 120..158 -> 33..71
        _ => prn,
    })
}

/// NMEA GSA sentences, one per constellation in use.
pub fn outnmea_gsa(sol: &Sol, ssat: &[SSat]) -> String {
    if sol.stat == SolStatus::None {
        return String::new();
    }
    let mut out = String::new();
    for sys in [Sys::Gps, Sys::Glo, Sys::Gal, Sys::Qzs, Sys::Bds] {
        let mut prns = Vec::new();
        let mut azels = Vec::new();
        for (i, ss) in ssat.iter().enumerate() {
            if !ss.vs || satsys(i + 1).map(|(s, _)| s) != Some(sys) {
                continue;
            }
            if let Some(p) = nmea_prn(i + 1) {
                prns.push(p);
                azels.push([ss.azel[0], ss.azel[1]]);
            }
        }
        if prns.is_empty() {
            continue;
        }
        let dop = dops(&azels, 0.0);
        let mut body = format!("{}GSA,A,3", nmea_talker(sys));
        for i in 0..12 {
            if i < prns.len() {
                let _ = write!(body, ",{:02}", prns[i]);
            } else {
                body.push(',');
            }
        }
        let _ = write!(body, ",{:3.1},{:3.1},{:3.1}", dop[1], dop[2], dop[3]);
        out.push_str(&nmea_checksum(&body));
    }
    out
}

/// NMEA GSV sentences, four satellites each.
pub fn outnmea_gsv(sol: &Sol, ssat: &[SSat]) -> String {
    if sol.stat == SolStatus::None {
        return String::new();
    }
    let mut out = String::new();
    for sys in [Sys::Gps, Sys::Glo, Sys::Gal, Sys::Qzs, Sys::Bds] {
        let mut sats = Vec::new();
        for (i, ss) in ssat.iter().enumerate() {
            if ss.azel[1] <= 0.0 || satsys(i + 1).map(|(s, _)| s) != Some(sys) {
                continue;
            }
            if let Some(p) = nmea_prn(i + 1) {
                sats.push((p, ss.azel, ss.snr[0]));
            }
        }
        if sats.is_empty() {
            continue;
        }
        let nmsg = (sats.len() + 3) / 4;
        for m in 0..nmsg {
            let mut body = format!(
                "{}GSV,{},{},{:02}",
                nmea_talker(sys),
                nmsg,
                m + 1,
                sats.len()
            );
            for k in 0..4 {
                let i = m * 4 + k;
                if i < sats.len() {
                    let (prn, azel, snr) = sats[i];
                    let _ = write!(
                        body,
                        ",{:02},{:02.0},{:03.0},{:02.0}",
                        prn,
                        azel[1] * R2D,
                        azel[0] * R2D,
                        snr
                    );
                } else {
                    body.push_str(",,,,");
                }
            }
            out.push_str(&nmea_checksum(&body));
        }
    }
    out
}

/// Per-satellite residual lines, `$SAT,week,tow,id,frq,az,el,resp,resc,
/// vsat,snr,fix,slip,lock,outc,slipc,rejc`.
pub fn outsolstat(sol: &Sol, ssat: &[SSat], nf: usize) -> String {
    if sol.stat == SolStatus::None {
        return String::new();
    }
    let (week, tow) = time2gpst(sol.time);
    let mut out = String::new();
    for (i, ss) in ssat.iter().enumerate() {
        if !ss.vs {
            continue;
        }
        let Some(id) = satno2id(i + 1) else { continue };
        for f in 0..nf.min(NFREQ) {
            let _ = writeln!(
                out,
                "$SAT,{week},{tow:.3},{id},{},{:.1},{:.1},{:.4},{:.4},{},{:.0},{},{},{},{},{},{}",
                f + 1,
                ss.azel[0] * R2D,
                ss.azel[1] * R2D,
                ss.resp[f],
                ss.resc[f],
                u8::from(ss.vsat[f]),
                ss.snr[f],
                ss.fix[f] as u8,
                ss.slip[f] & 3,
                ss.lock[f],
                ss.outc[f],
                ss.slipc[f],
                ss.rejc[f]
            );
        }
    }
    out
}

/// Solution buffer with the `maxsolstd` suppression gate.
#[derive(Debug, Default)]
pub struct SolBuf {
    pub data: Vec<Sol>,
    pub maxsolstd: f64,
}

impl SolBuf {
    pub fn new(maxsolstd: f64) -> Self {
        Self {
            data: Vec::new(),
            maxsolstd,
        }
    }

    /// Append a solution unless the 3D sigma gate rejects it. Returns
    /// whether the solution was kept.
    pub fn push(&mut self, sol: Sol) -> bool {
        if sol.stat == SolStatus::None {
            return false;
        }
        if self.maxsolstd > 0.0 && sol.std_3d() > self.maxsolstd {
            return false;
        }
        self.data.push(sol);
        true
    }
}

/// Receiver clock composition helper: dtr of a constellation in seconds.
pub fn sol_dtr(sol: &Sol, sys: Sys) -> f64 {
    match sys {
        Sys::Gps | Sys::Sbs | Sys::Leo => sol.dtr[0],
        Sys::Glo => sol.dtr[0] + sol.dtr[1],
        Sys::Gal => sol.dtr[0] + sol.dtr[2],
        Sys::Qzs => sol.dtr[0] + sol.dtr[3],
        Sys::Bds => sol.dtr[0] + sol.dtr[4],
        Sys::Irn => sol.dtr[0] + sol.dtr[5],
    }
}

/// Clock offsets scaled to meters for diagnostics.
pub fn sol_dtr_m(sol: &Sol, sys: Sys) -> f64 {
    sol_dtr(sol, sys) * CLIGHT
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::D2R;
    use crate::coords::pos2ecef;
    use crate::time::epoch2time;

    fn sol_at(lat: f64, lon: f64, h: f64) -> Sol {
        let rr = pos2ecef(&Vector3::new(lat * D2R, lon * D2R, h));
        Sol {
            time: epoch2time(&[2023.0, 6.0, 1.0, 1.0, 2.0, 3.0]),
            rr: [rr[0], rr[1], rr[2], 0.0, 0.0, 0.0],
            qr: [0.01, 0.01, 0.04, 0.0, 0.0, 0.0],
            stat: SolStatus::Ppp,
            ns: 9,
            ..Default::default()
        }
    }

    #[test]
    fn llh_line_round_trips_position() {
        let sol = sol_at(35.5, 139.25, 100.0);
        let line = outsol(&sol, &SolOpt::default(), &[0.0; 3], 0.0);
        let fields: Vec<&str> = line.split_whitespace().collect();
        // "yyyy/mm/dd hh:mm:ss.sss lat lon h Q ns ..."
        let lat: f64 = fields[2].parse().unwrap();
        let lon: f64 = fields[3].parse().unwrap();
        let h: f64 = fields[4].parse().unwrap();
        assert!((lat - 35.5).abs() < 1E-8);
        assert!((lon - 139.25).abs() < 1E-8);
        assert!((h - 100.0).abs() < 1E-3);
        assert_eq!(fields[5], "6"); // PPP quality
    }

    #[test]
    fn gga_round_trips_lat_lon() {
        let sol = sol_at(35.123456789, 139.987654321, 50.0);
        let line = outnmea_gga(&sol, 0.0);
        assert!(line.starts_with("$GPGGA,"));
        assert!(line.ends_with("\r\n"));
        // checksum verifies
        let body = &line[1..line.find('*').unwrap()];
        let cs = u8::from_str_radix(&line[line.find('*').unwrap() + 1..].trim(), 16).unwrap();
        assert_eq!(body.bytes().fold(0u8, |a, b| a ^ b), cs);
        // parse ddmm.mmmmmmm back
        let f: Vec<&str> = body.split(',').collect();
        let lat_f: f64 = f[2].parse().unwrap();
        let lat = (lat_f / 100.0).floor() + (lat_f % 100.0) / 60.0;
        assert!((lat - 35.123456789).abs() < 1E-7, "lat {lat}");
        let lon_f: f64 = f[4].parse().unwrap();
        let lon = (lon_f / 100.0).floor() + (lon_f % 100.0) / 60.0;
        assert!((lon - 139.987654321).abs() < 1E-7, "lon {lon}");
    }

    #[test]
    fn maxsolstd_gate_suppresses_noisy_solutions() {
        let mut buf = SolBuf::new(0.1);
        let mut good = sol_at(35.0, 139.0, 0.0); // sigma ~ 0.24 m
        good.qr = [1E-4, 1E-4, 1E-4, 0.0, 0.0, 0.0];
        let noisy = sol_at(35.0, 139.0, 0.0);
        assert!(buf.push(good));
        assert!(!buf.push(noisy));
        assert_eq!(buf.data.len(), 1);

        let opt = SolOpt {
            maxsolstd: 0.1,
            ..Default::default()
        };
        assert!(outsol(&noisy, &opt, &[0.0; 3], 0.0).is_empty());
    }

    #[test]
    fn enu_baseline_output() {
        let base = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 0.0));
        let mut sol = sol_at(35.0, 139.0, 0.0);
        // move rover 10 m up from the base
        let posb = ecef2pos(&base);
        let up = crate::coords::enu2ecef(&posb, &Vector3::new(0.0, 0.0, 10.0));
        sol.rr[0] = base[0] + up[0];
        sol.rr[1] = base[1] + up[1];
        sol.rr[2] = base[2] + up[2];
        let opt = SolOpt {
            posf: SolFormat::Enu,
            ..Default::default()
        };
        let line = outsol(&sol, &opt, &[base[0], base[1], base[2]], 0.0);
        let fields: Vec<&str> = line.split_whitespace().collect();
        let e: f64 = fields[2].parse().unwrap();
        let n: f64 = fields[3].parse().unwrap();
        let u: f64 = fields[4].parse().unwrap();
        assert!(e.abs() < 1E-4 && n.abs() < 1E-4);
        assert!((u - 10.0).abs() < 1E-4);
    }
}
