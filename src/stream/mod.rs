//! Stream multiplexer.
//!
//! One uniform five-op surface (`open`, `close`, `read`, `write`,
//! `status`) over serial ports, plain and time-tagged files, TCP, NTRIP,
//! UDP, FTP/HTTP downloads and an in-memory FIFO. All reads and writes
//! are non-blocking: they move whatever bytes are available and return.
//! Transport faults never propagate as errors past `open`; they live in
//! the stream state and message.

mod file;
mod ftp;
mod membuf;
mod ntrip;
mod serial;
mod tcp;
mod udp;

pub use file::strsync;

use crate::error::Error;
use crate::time::{epoch2time, time2epoch, time2gpst, timediff, GTime};
use log::debug;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

/// Transport selector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Serial,
    File,
    TcpSvr,
    TcpCli,
    NtripSvr,
    NtripCli,
    NtripCaster,
    UdpSvr,
    UdpCli,
    Ftp,
    Http,
    MemBuf,
}

/// Requested direction(s).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
    ReadWrite,
}

impl StreamMode {
    pub fn readable(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }
    pub fn writable(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Stream state word.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(i8)]
pub enum StreamState {
    /// Transport fault, reconnecting where supported
    Error = -1,
    #[default]
    Closed = 0,
    /// Waiting for a connection
    Wait = 1,
    Active = 2,
}

/// Process wide stream options, see [strsetopt].
#[derive(Debug, Clone)]
pub struct StreamOpts {
    /// Inactive timeout (ms), 0 disables
    pub toinact: u64,
    /// Reconnect interval (ms)
    pub tirecon: u64,
    /// Rate averaging window (ms)
    pub tirate: u64,
    /// I/O buffer size (bytes)
    pub buffsize: usize,
    /// File swap margin (s)
    pub fswapmargin: u32,
    /// Download directory for FTP/HTTP
    pub localdir: String,
    /// HTTP/NTRIP proxy `addr:port`, empty for none
    pub proxyaddr: String,
}

impl Default for StreamOpts {
    fn default() -> Self {
        Self {
            toinact: 10_000,
            tirecon: 10_000,
            tirate: 1_000,
            buffsize: 32_768,
            fswapmargin: 30,
            localdir: String::new(),
            proxyaddr: String::new(),
        }
    }
}

static OPTS: RwLock<Option<StreamOpts>> = RwLock::new(None);

/// Replace the global stream options. Call before opening streams.
pub fn strsetopt(opts: StreamOpts) {
    *OPTS.write().unwrap_or_else(|e| e.into_inner()) = Some(opts);
}

pub(crate) fn getopts() -> StreamOpts {
    OPTS.read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .unwrap_or_default()
}

/// Transport implementation behind a [Stream].
pub(crate) trait Backend: Send {
    fn read(&mut self, buf: &mut [u8]) -> usize;
    fn write(&mut self, buf: &[u8]) -> usize;
    fn state(&self) -> StreamState;
    fn message(&self) -> String {
        String::new()
    }
    fn close(&mut self) {}
    /// Current replayed time-tag tick (ms), tag-replay files only.
    fn tick_f(&self) -> Option<i64> {
        None
    }
    /// Become a replay slave: shift the replay clock by `offset` ms.
    fn sync_to(&mut self, _offset: i64) {}
}

struct Inner {
    backend: Box<dyn Backend>,
    state: StreamState,
    inb: u64,
    outb: u64,
    inr: f64,
    outr: f64,
    // rate window accumulators
    tick_i: Instant,
    tick_o: Instant,
    inbt: u64,
    outbt: u64,
}

/// Stream status snapshot.
#[derive(Debug, Clone, Default)]
pub struct StreamStatus {
    pub state: StreamState,
    /// Total bytes received / sent
    pub inb: u64,
    pub outb: u64,
    /// Receive / send rate (bps) over the rate window
    pub inr: f64,
    pub outr: f64,
    pub msg: String,
}

/// One open stream. Thread safe: the internal mutex serializes reads,
/// writes and status queries.
pub struct Stream {
    kind: StreamKind,
    mode: StreamMode,
    path: String,
    inner: Mutex<Inner>,
}

impl Stream {
    /// Open a stream. Configuration faults (bad path, unresolvable host,
    /// unknown option) surface here; transport faults after open live in
    /// the status word.
    pub fn open(kind: StreamKind, mode: StreamMode, path: &str) -> Result<Self, Error> {
        debug!("stropen: {kind:?} mode={mode:?} path={path}");
        let backend: Box<dyn Backend> = match kind {
            StreamKind::Serial => Box::new(serial::SerialStream::open(path, mode)?),
            StreamKind::File => Box::new(file::FileStream::open(path, mode)?),
            StreamKind::TcpSvr => Box::new(tcp::TcpServer::open(path)?),
            StreamKind::TcpCli => Box::new(tcp::TcpClient::open(path)?),
            StreamKind::NtripSvr | StreamKind::NtripCli => {
                Box::new(ntrip::Ntrip::open(path, kind == StreamKind::NtripCli)?)
            }
            StreamKind::NtripCaster => Box::new(ntrip::Caster::open(path)?),
            StreamKind::UdpSvr => Box::new(udp::UdpStream::open_server(path)?),
            StreamKind::UdpCli => Box::new(udp::UdpStream::open_client(path)?),
            StreamKind::Ftp => Box::new(ftp::FtpStream::open(path, false)?),
            StreamKind::Http => Box::new(ftp::FtpStream::open(path, true)?),
            StreamKind::MemBuf => Box::new(membuf::MemBuf::open(path)?),
        };
        Ok(Self {
            kind,
            mode,
            path: path.to_string(),
            inner: Mutex::new(Inner {
                state: backend.state(),
                backend,
                inb: 0,
                outb: 0,
                inr: 0.0,
                outr: 0.0,
                tick_i: Instant::now(),
                tick_o: Instant::now(),
                inbt: 0,
                outbt: 0,
            }),
        })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read whatever bytes are available, without blocking on the device.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if !self.mode.readable() {
            return 0;
        }
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let n = g.backend.read(buf);
        g.state = g.backend.state();
        g.inb += n as u64;
        g.inbt += n as u64;
        let window = getopts().tirate.max(1);
        let ms = g.tick_i.elapsed().as_millis() as u64;
        if ms >= window {
            g.inr = 8000.0 * g.inbt as f64 / ms as f64;
            g.inbt = 0;
            g.tick_i = Instant::now();
        }
        n
    }

    /// Write as many bytes as the transport accepts right now.
    pub fn write(&self, buf: &[u8]) -> usize {
        if !self.mode.writable() {
            return 0;
        }
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let n = g.backend.write(buf);
        g.state = g.backend.state();
        g.outb += n as u64;
        g.outbt += n as u64;
        let window = getopts().tirate.max(1);
        let ms = g.tick_o.elapsed().as_millis() as u64;
        if ms >= window {
            g.outr = 8000.0 * g.outbt as f64 / ms as f64;
            g.outbt = 0;
            g.tick_o = Instant::now();
        }
        n
    }

    pub fn status(&self) -> StreamStatus {
        let g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        StreamStatus {
            state: g.state,
            inb: g.inb,
            outb: g.outb,
            inr: g.inr,
            outr: g.outr,
            msg: g.backend.message(),
        }
    }

    /// Close the stream and join any worker thread. The handle must not
    /// be used afterwards.
    pub fn close(&self) {
        debug!("strclose: {:?} {}", self.kind, self.path);
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.backend.close();
        g.state = StreamState::Closed;
    }

    pub(crate) fn with_backend<T>(&self, f: impl FnOnce(&mut dyn Backend) -> T) -> T {
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(g.backend.as_mut())
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

fn repstr(s: &mut String, pat: &str, rep: &str) -> bool {
    if !s.contains(pat) {
        return false;
    }
    *s = s.replace(pat, rep);
    true
}

/// Keyword substitution in a stream path.
///
/// `%Y %y %m %d %h %M %S` calendar fields, `%n` day of year, `%W %D` GPS
/// week and day of week, `%H` hour letter `a..x`, `%ha %hb %hc` 3/6/12
/// hour session starts, `%t` quarter hour, `%r`/`%b` rover and base ids.
/// `time` zero leaves the time keywords untouched.
pub fn reppath(path: &str, time: GTime, rov: &str, base: &str) -> String {
    let mut out = path.to_string();
    if !out.contains('%') {
        return out;
    }
    if !rov.is_empty() {
        repstr(&mut out, "%r", rov);
    }
    if !base.is_empty() {
        repstr(&mut out, "%b", base);
    }
    if time.is_zero() {
        return out;
    }
    let ep = time2epoch(time);
    let (week, tow) = time2gpst(time);
    let dow = (tow / 86400.0).floor() as i64;
    let ep0 = [ep[0], 1.0, 1.0, 0.0, 0.0, 0.0];
    let doy = (timediff(time, epoch2time(&ep0)) / 86400.0).floor() as i64 + 1;
    let h = ep[3] as i64;
    // longer keywords first, %ha/%hb/%hc shadow %h
    repstr(&mut out, "%ha", &format!("{:02}", h / 3 * 3));
    repstr(&mut out, "%hb", &format!("{:02}", h / 6 * 6));
    repstr(&mut out, "%hc", &format!("{:02}", h / 12 * 12));
    repstr(&mut out, "%Y", &format!("{:04}", ep[0] as i64));
    repstr(&mut out, "%y", &format!("{:02}", ep[0] as i64 % 100));
    repstr(&mut out, "%m", &format!("{:02}", ep[1] as i64));
    repstr(&mut out, "%d", &format!("{:02}", ep[2] as i64));
    repstr(&mut out, "%h", &format!("{h:02}"));
    repstr(&mut out, "%M", &format!("{:02}", ep[4] as i64));
    repstr(&mut out, "%S", &format!("{:02}", ep[5].floor() as i64));
    repstr(&mut out, "%n", &format!("{doy:03}"));
    repstr(&mut out, "%W", &format!("{week:04}"));
    repstr(&mut out, "%D", &format!("{dow}"));
    repstr(
        &mut out,
        "%H",
        &((b'a' + (h.clamp(0, 23) as u8)) as char).to_string(),
    );
    repstr(&mut out, "%t", &format!("{:02}", ep[4] as i64 / 15 * 15));
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::epoch2time;

    #[test]
    fn reppath_expands_all_keywords() {
        let t = epoch2time(&[2023.0, 7.0, 14.0, 13.0, 47.0, 5.0]);
        let out = reppath("%Y/%y/%m/%d/%h/%M/%S/%n/%H/%ha/%hb/%hc/%t/%r/%b", t, "ROV", "BAS");
        assert_eq!(out, "2023/23/07/14/13/47/05/195/n/12/12/12/45/ROV/BAS");
    }

    #[test]
    fn reppath_keeps_plain_paths() {
        let t = epoch2time(&[2023.0, 7.0, 14.0, 13.0, 47.0, 5.0]);
        assert_eq!(reppath("/data/log.bin", t, "", ""), "/data/log.bin");
    }

    #[test]
    fn reppath_week_and_dow() {
        // 2023-07-14 is a Friday in GPS week 2270
        let t = epoch2time(&[2023.0, 7.0, 14.0, 0.0, 0.0, 0.0]);
        let out = reppath("%W-%D", t, "", "");
        assert_eq!(out, "2270-5");
    }

    #[test]
    fn membuf_round_trip_through_stream() {
        let s = Stream::open(StreamKind::MemBuf, StreamMode::ReadWrite, "4096").unwrap();
        assert_eq!(s.write(b"hello stream"), 12);
        let mut buf = [0u8; 64];
        assert_eq!(s.read(&mut buf), 12);
        assert_eq!(&buf[..12], b"hello stream");
        assert_eq!(s.status().inb, 12);
        assert_eq!(s.status().outb, 12);
    }

    #[test]
    fn write_denied_on_read_only_stream() {
        let s = Stream::open(StreamKind::MemBuf, StreamMode::Read, "64").unwrap();
        assert_eq!(s.write(b"x"), 0);
        assert_eq!(s.status().outb, 0);
    }
}
