//! GPX 1.1 converter for solution records.
//!
//! Emits one `<trk><trkseg>` with all solutions and, optionally, a
//! `<wpt>` per solution. Solution quality rides in the nonstandard
//! `<fix>` values `fix float sbas dgps ppp 3d`.

use crate::constants::{D2R, R2D};
use crate::coords::{ecef2pos, pos2ecef};
use crate::solution::{Sol, SolStatus};
use crate::time::{epoch2time, gpst2utc, time2epoch};
use log::debug;
use nalgebra::Vector3;
use std::fmt::Write as _;

/// Converter failure, one variant per process exit code.
#[derive(Debug, thiserror::Error)]
pub enum ConvError {
    #[error("solution read error: {0}")]
    Read(#[source] std::io::Error),
    #[error("solution format error at line {0}")]
    Format(usize),
    #[error("no solution data")]
    NoData,
    #[error("output write error: {0}")]
    Write(#[source] std::io::Error),
}

impl ConvError {
    /// Process exit code, 0 is success.
    pub fn code(&self) -> i32 {
        match self {
            ConvError::Read(_) => -1,
            ConvError::Format(_) => -2,
            ConvError::NoData => -3,
            ConvError::Write(_) => -4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpxOpt {
    /// Emit the track segment
    pub outtrk: bool,
    /// Emit one waypoint per solution
    pub outpnt: bool,
    /// Altitude above the geoid instead of the ellipsoid
    pub height_geodetic: bool,
    /// Geoid height at the site (m), used with [Self::height_geodetic]
    pub geoidh: f64,
    /// Keep only this quality flag, 0 keeps all
    pub qflag: u8,
}

impl Default for GpxOpt {
    fn default() -> Self {
        Self {
            outtrk: true,
            outpnt: false,
            height_geodetic: false,
            geoidh: 0.0,
            qflag: 0,
        }
    }
}

fn quality(stat: SolStatus) -> u8 {
    match stat {
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

fn iso_time(sol: &Sol) -> String {
    let ep = time2epoch(gpst2utc(sol.time));
    format!(
        "{:04.0}-{:02.0}-{:02.0}T{:02.0}:{:02.0}:{:06.3}Z",
        ep[0], ep[1], ep[2], ep[3], ep[4], ep[5]
    )
}

fn point(out: &mut String, tag: &str, sol: &Sol, opt: &GpxOpt) {
    let rr = Vector3::new(sol.rr[0], sol.rr[1], sol.rr[2]);
    let pos = ecef2pos(&rr);
    let ele = if opt.height_geodetic {
        pos[2] - opt.geoidh
    } else {
        pos[2]
    };
    let _ = writeln!(
        out,
        "<{tag} lat=\"{:.9}\" lon=\"{:.9}\"><ele>{ele:.4}</ele><time>{}</time><fix>{}</fix></{tag}>",
        pos[0] * R2D,
        pos[1] * R2D,
        iso_time(sol),
        sol.stat.gpx_fix()
    );
}

/// Render solutions as a GPX 1.1 document.
pub fn sol2gpx(sols: &[Sol], opt: &GpxOpt) -> Result<String, ConvError> {
    let kept: Vec<&Sol> = sols
        .iter()
        .filter(|s| s.stat != SolStatus::None)
        .filter(|s| opt.qflag == 0 || quality(s.stat) == opt.qflag)
        .collect();
    if kept.is_empty() {
        return Err(ConvError::NoData);
    }
    debug!("sol2gpx: {} solutions", kept.len());
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<gpx version=\"1.1\" creator=\"gnss-ppk {}\" xmlns=\"http://www.topografix.com/GPX/1/1\">",
        env!("CARGO_PKG_VERSION")
    );
    if opt.outpnt {
        for sol in &kept {
            point(&mut out, "wpt", sol, opt);
        }
    }
    if opt.outtrk {
        out.push_str("<trk>\n<trkseg>\n");
        for sol in &kept {
            point(&mut out, "trkpt", sol, opt);
        }
        out.push_str("</trkseg>\n</trk>\n");
    }
    out.push_str("</gpx>\n");
    Ok(out)
}

fn parse_sol_time(date: &str, clock: &str) -> Option<crate::time::GTime> {
    let mut ep = [0.0; 6];
    for (i, v) in date.split('/').take(3).enumerate() {
        ep[i] = v.parse().ok()?;
    }
    for (i, v) in clock.split(':').take(3).enumerate() {
        ep[3 + i] = v.parse().ok()?;
    }
    if ep[1] < 1.0 || ep[1] > 12.0 || ep[2] < 1.0 || ep[2] > 31.0 {
        return None;
    }
    Some(epoch2time(&ep))
}

/// Read an LLH solution file as written by [crate::solution::outsol].
pub fn readsol(path: &str) -> Result<Vec<Sol>, ConvError> {
    let text = std::fs::read_to_string(path).map_err(ConvError::Read)?;
    let mut sols = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('$') {
            continue;
        }
        let f: Vec<&str> = line.split_whitespace().collect();
        let parsed = (|| {
            if f.len() < 7 {
                return None;
            }
            let time = parse_sol_time(f[0], f[1])?;
            let lat: f64 = f[2].parse().ok()?;
            let lon: f64 = f[3].parse().ok()?;
            let h: f64 = f[4].parse().ok()?;
            let q: u8 = f[5].parse().ok()?;
            let ns: u8 = f[6].parse().ok()?;
            let rr = pos2ecef(&Vector3::new(lat * D2R, lon * D2R, h));
            let stat = match q {
                1 => SolStatus::Fix,
                2 => SolStatus::Float,
                3 => SolStatus::Sbas,
                4 => SolStatus::Dgps,
                5 => SolStatus::Single,
                6 => SolStatus::Ppp,
                7 => SolStatus::Dr,
                _ => return None,
            };
            Some(Sol {
                time,
                rr: [rr[0], rr[1], rr[2], 0.0, 0.0, 0.0],
                stat,
                ns,
                ..Default::default()
            })
        })();
        match parsed {
            Some(sol) => sols.push(sol),
            None => return Err(ConvError::Format(lineno + 1)),
        }
    }
    Ok(sols)
}

/// Convert a solution file to GPX. Every [ConvError] maps to one of the
/// converter exit codes.
pub fn convgpx(infile: &str, outfile: &str, opt: &GpxOpt) -> Result<(), ConvError> {
    let sols = readsol(infile)?;
    let gpx = sol2gpx(&sols, opt)?;
    std::fs::write(outfile, gpx).map_err(ConvError::Write)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::epoch2time;

    fn sol_at(lat: f64, lon: f64, h: f64, stat: SolStatus) -> Sol {
        let rr = pos2ecef(&Vector3::new(lat * D2R, lon * D2R, h));
        Sol {
            time: epoch2time(&[2023.0, 6.0, 1.0, 0.0, 0.0, 30.0]),
            rr: [rr[0], rr[1], rr[2], 0.0, 0.0, 0.0],
            stat,
            ns: 8,
            ..Default::default()
        }
    }

    #[test]
    fn track_contains_all_solutions() {
        let sols = vec![
            sol_at(35.0, 139.0, 10.0, SolStatus::Float),
            sol_at(35.0, 139.0, 10.0, SolStatus::Float),
            sol_at(35.0, 139.0, 10.0, SolStatus::Float),
        ];
        let gpx = sol2gpx(&sols, &GpxOpt::default()).unwrap();
        assert_eq!(gpx.matches("<trk>").count(), 1);
        assert_eq!(gpx.matches("<trkpt ").count(), 3);
        assert_eq!(gpx.matches("<fix>float</fix>").count(), 3);
        assert!(gpx.contains("<ele>10.0000</ele>"));
        assert!(gpx.contains("lat=\"35.000000000\""));
        assert!(!gpx.contains("<wpt"));
    }

    #[test]
    fn waypoints_and_geoid_height() {
        let opt = GpxOpt {
            outpnt: true,
            outtrk: false,
            height_geodetic: true,
            geoidh: 36.5,
            ..Default::default()
        };
        let gpx = sol2gpx(&[sol_at(35.0, 139.0, 46.5, SolStatus::Ppp)], &opt).unwrap();
        assert!(gpx.contains("<wpt "));
        assert!(!gpx.contains("<trk>"));
        assert!(gpx.contains("<ele>10.0000</ele>"));
        assert!(gpx.contains("<fix>ppp</fix>"));
    }

    #[test]
    fn empty_input_is_no_data() {
        let e = sol2gpx(&[], &GpxOpt::default()).unwrap_err();
        assert_eq!(e.code(), -3);
        // quality filter can empty the set too
        let opt = GpxOpt {
            qflag: 1,
            ..Default::default()
        };
        let sols = [sol_at(35.0, 139.0, 0.0, SolStatus::Single)];
        assert_eq!(sol2gpx(&sols, &opt).unwrap_err().code(), -3);
    }

    #[test]
    fn solution_file_round_trip() {
        use crate::solution::{outsol, outsolhead, SolOpt};
        let dir = std::env::temp_dir();
        let inp = dir.join(format!("gnss-ppk-gpx-{}.pos", std::process::id()));
        let out = dir.join(format!("gnss-ppk-gpx-{}.gpx", std::process::id()));
        let opt = SolOpt::default();
        let mut text = outsolhead(&opt);
        for _ in 0..3 {
            text.push_str(&outsol(
                &sol_at(35.0, 139.0, 10.0, SolStatus::Float),
                &opt,
                &[0.0; 3],
                0.0,
            ));
        }
        std::fs::write(&inp, text).unwrap();

        convgpx(
            inp.to_str().unwrap(),
            out.to_str().unwrap(),
            &GpxOpt::default(),
        )
        .unwrap();
        let gpx = std::fs::read_to_string(&out).unwrap();
        assert_eq!(gpx.matches("<trkpt ").count(), 3);
        assert!(gpx.contains("<fix>float</fix>"));
        let _ = std::fs::remove_file(&inp);
        let _ = std::fs::remove_file(&out);
    }

    #[test]
    fn broken_lines_report_the_format_code() {
        let dir = std::env::temp_dir();
        let inp = dir.join(format!("gnss-ppk-gpx-bad-{}.pos", std::process::id()));
        std::fs::write(&inp, "2023/06/01 00:00:30.000 not a number\n").unwrap();
        let e = readsol(inp.to_str().unwrap()).unwrap_err();
        assert_eq!(e.code(), -2);
        let _ = std::fs::remove_file(&inp);

        assert_eq!(readsol("/no/such/file.pos").unwrap_err().code(), -1);
    }
}
