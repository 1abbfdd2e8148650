//! GNSS time scales.
//!
//! All internal math runs in GPS time. [GTime] carries a whole second count
//! since the GPS epoch (1980-01-06 00:00:00 GPST) plus a fractional
//! remainder kept in `[0, 1)`, which preserves sub nanosecond precision
//! over the full constellation era.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// GPS epoch expressed as unix seconds.
const GPS0_UNIX: i64 = 315_964_800;

/// Seconds per week.
pub const WEEK_SECONDS: f64 = 604800.0;

/// Leap second table: (year, month, day) of the UTC day the new offset
/// takes effect, and GPST-UTC seconds from that instant on.
const LEAPS: [(i32, u8, u8, f64); 18] = [
    (2017, 1, 1, 18.0),
    (2015, 7, 1, 17.0),
    (2012, 7, 1, 16.0),
    (2009, 1, 1, 15.0),
    (2006, 1, 1, 14.0),
    (1999, 1, 1, 13.0),
    (1997, 7, 1, 12.0),
    (1996, 1, 1, 11.0),
    (1994, 7, 1, 10.0),
    (1993, 7, 1, 9.0),
    (1992, 7, 1, 8.0),
    (1991, 1, 1, 7.0),
    (1990, 1, 1, 6.0),
    (1988, 1, 1, 5.0),
    (1985, 7, 1, 4.0),
    (1983, 7, 1, 3.0),
    (1982, 7, 1, 2.0),
    (1981, 7, 1, 1.0),
];

/// Fixed GPST-BDT offset in seconds.
const GPST_BDT_OFFSET: f64 = 14.0;

/// Time point on the GPS time scale.
#[derive(Debug, Copy, Clone, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GTime {
    /// Whole seconds since the GPS epoch.
    pub time: i64,
    /// Fractional second, `0.0 <= sec < 1.0`.
    pub sec: f64,
}

impl GTime {
    /// Build from whole seconds + fraction, normalizing the fraction.
    pub fn new(time: i64, sec: f64) -> Self {
        let mut t = Self { time, sec };
        t.normalize();
        t
    }

    fn normalize(&mut self) {
        let floor = self.sec.floor();
        self.time += floor as i64;
        self.sec -= floor;
    }

    /// True for the zero (unset) time.
    pub fn is_zero(&self) -> bool {
        self.time == 0 && self.sec == 0.0
    }
}

impl std::fmt::Display for GTime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", time2str(*self, 3))
    }
}

/// Calendar epoch `[year, month, day, hour, min, sec]` to [GTime].
/// Years before 1970 collapse to the zero time.
pub fn epoch2time(ep: &[f64; 6]) -> GTime {
    const DOY: [i64; 12] = [1, 32, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

    let (year, mon, day) = (ep[0] as i64, ep[1] as i64, ep[2] as i64);
    if year < 1970 || !(1..=12).contains(&mon) {
        return GTime::default();
    }
    // days since 1970-01-01
    let mut days = (year - 1970) * 365 + (year - 1969) / 4 + DOY[(mon - 1) as usize] + day - 2;
    if year % 4 == 0 && mon >= 3 {
        days += 1;
    }
    let sec_int = ep[5].floor();
    let unix = days * 86400 + ep[3] as i64 * 3600 + ep[4] as i64 * 60 + sec_int as i64;
    GTime {
        time: unix - GPS0_UNIX,
        sec: ep[5] - sec_int,
    }
}

/// [GTime] to calendar epoch `[year, month, day, hour, min, sec]`.
pub fn time2epoch(t: GTime) -> [f64; 6] {
    // month lengths over the 1970-based 4 year cycle (leap year third)
    const MDAY: [i64; 48] = [
        31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31,
        30, 31, 31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 28, 31, 30, 31, 30, 31, 31,
        30, 31, 30, 31,
    ];
    let unix = t.time + GPS0_UNIX;
    let days = unix.div_euclid(86400);
    let secs = unix.rem_euclid(86400);

    let mut day = days % 1461;
    let mut mon = 0usize;
    while mon < 48 {
        if day >= MDAY[mon] {
            day -= MDAY[mon];
            mon += 1;
        } else {
            break;
        }
    }
    [
        (1970 + days / 1461 * 4) as f64 + (mon / 12) as f64,
        (mon % 12 + 1) as f64,
        (day + 1) as f64,
        (secs / 3600) as f64,
        (secs % 3600 / 60) as f64,
        (secs % 60) as f64 + t.sec,
    ]
}

/// Add seconds to a time point.
pub fn timeadd(t: GTime, sec: f64) -> GTime {
    GTime::new(t.time, t.sec + sec)
}

/// Difference `t1 - t2` in seconds.
pub fn timediff(t1: GTime, t2: GTime) -> f64 {
    (t1.time - t2.time) as f64 + t1.sec - t2.sec
}

/// GPS week + time of week to [GTime].
pub fn gpst2time(week: i32, tow: f64) -> GTime {
    let floor = tow.floor();
    GTime {
        time: week as i64 * 604800 + floor as i64,
        sec: tow - floor,
    }
}

/// [GTime] to GPS week + time of week.
pub fn time2gpst(t: GTime) -> (i32, f64) {
    let week = t.time.div_euclid(604800);
    (week as i32, t.time.rem_euclid(604800) as f64 + t.sec)
}

/// GPST to UTC using the built-in leap table.
pub fn gpst2utc(t: GTime) -> GTime {
    for &(y, m, d, leap) in LEAPS.iter() {
        let tu = timeadd(t, -leap);
        if timediff(tu, epoch2time(&[y as f64, m as f64, d as f64, 0.0, 0.0, 0.0])) >= 0.0 {
            return tu;
        }
    }
    t
}

/// UTC to GPST. A UTC instant exactly on a leap boundary takes the offset
/// effective from that boundary.
pub fn utc2gpst(t: GTime) -> GTime {
    for &(y, m, d, leap) in LEAPS.iter() {
        if timediff(t, epoch2time(&[y as f64, m as f64, d as f64, 0.0, 0.0, 0.0])) >= 0.0 {
            return timeadd(t, leap);
        }
    }
    t
}

/// GPST to BeiDou time.
pub fn gpst2bdt(t: GTime) -> GTime {
    timeadd(t, -GPST_BDT_OFFSET)
}

/// BeiDou time to GPST.
pub fn bdt2gpst(t: GTime) -> GTime {
    timeadd(t, GPST_BDT_OFFSET)
}

/// Day of year (1.0 at Jan 1st 00:00).
pub fn time2doy(t: GTime) -> f64 {
    let mut ep = time2epoch(t);
    ep[1] = 1.0;
    ep[2] = 1.0;
    ep[3] = 0.0;
    ep[4] = 0.0;
    ep[5] = 0.0;
    timediff(t, epoch2time(&ep)) / 86400.0 + 1.0
}

/// Format as `yyyy/mm/dd hh:mm:ss.sss` with `n` fractional digits.
pub fn time2str(t: GTime, n: usize) -> String {
    let n = n.min(12);
    let mut t = t;
    // carry when the fraction rounds up to a full second
    if t.sec >= 1.0 - 0.5 / 10f64.powi(n as i32) {
        t.time += 1;
        t.sec = 0.0;
    }
    let ep = time2epoch(t);
    if n == 0 {
        format!(
            "{:04.0}/{:02.0}/{:02.0} {:02.0}:{:02.0}:{:02.0}",
            ep[0], ep[1], ep[2], ep[3], ep[4], ep[5].floor()
        )
    } else {
        format!(
            "{:04.0}/{:02.0}/{:02.0} {:02.0}:{:02.0}:{:0w$.n$}",
            ep[0],
            ep[1],
            ep[2],
            ep[3],
            ep[4],
            ep[5],
            w = n + 3,
            n = n
        )
    }
}

/// Greenwich mean sidereal time (rad) from UT1.
pub fn utc2gmst(t: GTime, ut1_utc: f64) -> f64 {
    let tut = timeadd(t, ut1_utc);
    let ep2000 = epoch2time(&[2000.0, 1.0, 1.0, 12.0, 0.0, 0.0]);

    let mut tut0 = tut;
    let ep = time2epoch(tut);
    let sod = ep[3] * 3600.0 + ep[4] * 60.0 + ep[5];
    tut0 = timeadd(tut0, -sod);

    let t1 = timediff(tut0, ep2000) / 86400.0 / 36525.0;
    let t2 = t1 * t1;
    let t3 = t2 * t1;
    let gmst0 = 24110.54841 + 8640184.812866 * t1 + 0.093104 * t2 - 6.2E-6 * t3;
    let gmst = gmst0 + 1.002737909350795 * sod;

    (gmst / 86400.0).fract() * 2.0 * std::f64::consts::PI
}

// adjustable wall clock, for time tag replay
static TIME_OFFSET: Mutex<f64> = Mutex::new(0.0);

/// Current time in UTC, shifted by any [timeset] adjustment.
pub fn timeget() -> GTime {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let t = GTime::new(now.as_secs() as i64 - GPS0_UNIX, now.subsec_nanos() as f64 * 1E-9);
    let off = *TIME_OFFSET.lock().unwrap();
    timeadd(t, off)
}

/// Pin the wall clock reported by [timeget] to `t` (UTC). Call before any
/// stream or estimator is created; not safe against concurrent users.
pub fn timeset(t: GTime) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let cur = GTime::new(now.as_secs() as i64 - GPS0_UNIX, now.subsec_nanos() as f64 * 1E-9);
    *TIME_OFFSET.lock().unwrap() = timediff(t, cur);
}
