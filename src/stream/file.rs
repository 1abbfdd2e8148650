//! Plain and time-tagged file streams.
//!
//! A companion `<path>.tag` file records when each block of the data
//! file was written, so a recorded stream can later be replayed at the
//! original pace (scaled by `::xSPEED`, skewed by `::+OFF`). Output
//! files can rotate on a wall-clock interval (`::S=HRS`) using
//! [reppath] keyword substitution.

use super::{getopts, reppath, Backend, Stream, StreamKind, StreamMode, StreamState};
use crate::error::Error;
use crate::time::{time2gpst, timeadd, timeget, utc2gpst, GTime};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::Instant;

/// Tag header length, magic plus version padded with zeros.
const TAG_HEADER_LEN: usize = 60;
/// Queued blocks between the caller and the tag writer thread.
const TAG_QUEUE: usize = 256;

#[derive(Debug, PartialEq)]
struct FileSpec {
    path: String,
    timetag: bool,
    /// Replay start skew (s)
    off: f64,
    /// Replay speed factor
    speed: f64,
    /// Swap interval (h), 0 disables
    swapintv: f64,
    /// Tag file position width (bytes)
    poswidth: usize,
}

// PATH[::T][::+OFF][::xSPEED][::S=HRS][::P={4|8}]
fn parse_path(path: &str) -> Result<FileSpec, Error> {
    let mut it = path.split("::");
    let base = it
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::config(format!("invalid file path: {path}")))?;
    let mut spec = FileSpec {
        path: base.to_string(),
        timetag: false,
        off: 0.0,
        speed: 1.0,
        swapintv: 0.0,
        poswidth: 4,
    };
    for d in it {
        if d == "T" {
            spec.timetag = true;
        } else if let Some(v) = d.strip_prefix('+') {
            spec.off = v
                .parse()
                .map_err(|_| Error::config(format!("invalid replay offset: {d}")))?;
        } else if let Some(v) = d.strip_prefix('x') {
            spec.speed = v
                .parse()
                .map_err(|_| Error::config(format!("invalid replay speed: {d}")))?;
            if spec.speed <= 0.0 {
                return Err(Error::config(format!("invalid replay speed: {d}")));
            }
        } else if let Some(v) = d.strip_prefix("S=") {
            spec.swapintv = v
                .parse()
                .map_err(|_| Error::config(format!("invalid swap interval: {d}")))?;
        } else if let Some(v) = d.strip_prefix("P=") {
            spec.poswidth = match v {
                "4" => 4,
                "8" => 8,
                _ => return Err(Error::config(format!("invalid tag position width: {d}"))),
            };
        } else {
            return Err(Error::config(format!("unknown file option: {d}")));
        }
    }
    Ok(spec)
}

fn write_tag_header(tag: &mut File, poswidth: usize, time: GTime) -> std::io::Result<()> {
    let magic = format!(
        "TIMETAG gnss-ppk {} P{poswidth}",
        env!("CARGO_PKG_VERSION")
    );
    let mut head = [0u8; TAG_HEADER_LEN];
    let n = magic.len().min(TAG_HEADER_LEN);
    head[..n].copy_from_slice(&magic.as_bytes()[..n]);
    tag.write_all(&head)?;
    tag.write_all(&0u32.to_le_bytes())?; // start tick
    tag.write_all(&time.time.to_le_bytes())?;
    tag.write_all(&time.sec.to_le_bytes())?;
    Ok(())
}

/// Returns the recorded file position width. `::P=` on the replay path
/// only matters for tag files whose header predates the width marker.
fn read_tag_header(tag: &mut impl Read, fallback: usize) -> Result<(usize, u32, GTime), Error> {
    let bad = || Error::MalformedInput("truncated time-tag header".into());
    let mut head = [0u8; TAG_HEADER_LEN];
    tag.read_exact(&mut head).map_err(|_| bad())?;
    if !head.starts_with(b"TIMETAG") {
        return Err(Error::MalformedInput("not a time-tag file".into()));
    }
    let text = String::from_utf8_lossy(&head);
    let poswidth = if text.contains("P8") {
        8
    } else if text.contains("P4") {
        4
    } else {
        fallback
    };
    let mut b4 = [0u8; 4];
    let mut b8 = [0u8; 8];
    tag.read_exact(&mut b4).map_err(|_| bad())?;
    let tick0 = u32::from_le_bytes(b4);
    tag.read_exact(&mut b8).map_err(|_| bad())?;
    let time = i64::from_le_bytes(b8);
    tag.read_exact(&mut b8).map_err(|_| bad())?;
    let sec = f64::from_le_bytes(b8);
    Ok((poswidth, tick0, GTime::new(time, sec)))
}

fn read_tag_pair(tag: &mut impl Read, poswidth: usize) -> Option<(u32, u64)> {
    let mut b4 = [0u8; 4];
    tag.read_exact(&mut b4).ok()?;
    let tick = u32::from_le_bytes(b4);
    let fpos = if poswidth == 8 {
        let mut b8 = [0u8; 8];
        tag.read_exact(&mut b8).ok()?;
        u64::from_le_bytes(b8)
    } else {
        tag.read_exact(&mut b4).ok()?;
        u32::from_le_bytes(b4) as u64
    };
    Some((tick, fpos))
}

/// Tag-paced reader state.
struct Replay {
    tag: BufReader<File>,
    start: Instant,
    tick0: u32,
    /// Start skew plus any [Backend::sync_to] shifts (ms)
    off_ms: i64,
    speed: f64,
    /// Data available up to this position
    limit: u64,
    pos: u64,
    /// Tick of the last released block, relative to tick0
    tick: i64,
    /// Pair read ahead of the replay clock
    pending: Option<(u32, u64)>,
}

/// Tag writer handle; blocks are written off the caller's thread.
struct TagWriter {
    tx: SyncSender<(u32, Vec<u8>)>,
    worker: JoinHandle<()>,
    start: Instant,
}

pub(crate) struct FileStream {
    spec: FileSpec,
    /// Data file (read side, or primary write side)
    fp: Option<File>,
    /// Old file kept open across a swap boundary
    fp_sec: Option<File>,
    replay: Option<Replay>,
    tagw: Option<TagWriter>,
    /// GPS tow at the previous swap check, <0 before the first write
    tow_p: f64,
    state: StreamState,
    msg: String,
}

impl FileStream {
    pub fn open(path: &str, mode: StreamMode) -> Result<Self, Error> {
        let spec = parse_path(path)?;
        debug!("file open: {} mode={mode:?} timetag={}", spec.path, spec.timetag);
        let mut s = Self {
            spec,
            fp: None,
            fp_sec: None,
            replay: None,
            tagw: None,
            tow_p: -1.0,
            state: StreamState::Active,
            msg: String::new(),
        };
        if mode.readable() {
            s.open_read()?;
        } else {
            s.open_write()?;
        }
        Ok(s)
    }

    fn open_read(&mut self) -> Result<(), Error> {
        let path = reppath(&self.spec.path, utc2gpst(timeget()), "", "");
        let fp = File::open(&path)?;
        self.msg = path;
        if self.spec.timetag {
            let mut tag = BufReader::new(File::open(format!("{}.tag", self.msg))?);
            let (pw, tick0, _) = read_tag_header(&mut tag, self.spec.poswidth)?;
            self.spec.poswidth = pw;
            self.replay = Some(Replay {
                tag,
                start: Instant::now(),
                tick0,
                off_ms: (self.spec.off * 1000.0) as i64,
                speed: self.spec.speed,
                limit: 0,
                pos: 0,
                tick: 0,
                pending: None,
            });
        }
        self.fp = Some(fp);
        Ok(())
    }

    fn open_write(&mut self) -> Result<(), Error> {
        let path = reppath(&self.spec.path, utc2gpst(timeget()), "", "");
        let fp = File::create(&path)?;
        self.msg = path;
        if self.spec.timetag {
            let mut data = fp;
            let mut tag = File::create(format!("{}.tag", self.msg))?;
            write_tag_header(&mut tag, self.spec.poswidth, timeget())?;
            let poswidth = self.spec.poswidth;
            let (tx, rx) = sync_channel::<(u32, Vec<u8>)>(TAG_QUEUE);
            let worker = std::thread::spawn(move || {
                let mut fpos: u64 = 0;
                for (tick, bytes) in rx {
                    if data.write_all(&bytes).is_err() {
                        break;
                    }
                    fpos += bytes.len() as u64;
                    let mut rec = tick.to_le_bytes().to_vec();
                    if poswidth == 8 {
                        rec.extend_from_slice(&fpos.to_le_bytes());
                    } else {
                        rec.extend_from_slice(&(fpos as u32).to_le_bytes());
                    }
                    if tag.write_all(&rec).is_err() {
                        break;
                    }
                }
                let _ = data.flush();
                let _ = tag.flush();
            });
            self.tagw = Some(TagWriter {
                tx,
                worker,
                start: Instant::now(),
            });
        } else {
            self.fp = Some(fp);
        }
        Ok(())
    }

    /// Rotate the output file when the wall clock crosses a swap
    /// boundary. The old file stays open as a secondary writer for
    /// `fswapmargin` seconds past the boundary.
    fn check_swap(&mut self) {
        if self.spec.swapintv <= 0.0 {
            return;
        }
        let intv = self.spec.swapintv * 3600.0;
        let margin = getopts().fswapmargin as f64;
        let time = utc2gpst(timeget());
        let (_, tow) = time2gpst(time);
        if self.tow_p >= 0.0
            && ((tow + margin) / intv).floor() != ((self.tow_p + margin) / intv).floor()
        {
            let path = reppath(&self.spec.path, timeadd(time, margin), "", "");
            debug!("file swap: {} -> {path}", self.msg);
            match File::create(&path) {
                Ok(fp) => {
                    self.fp_sec = self.fp.take();
                    self.fp = Some(fp);
                    self.msg = path;
                }
                Err(e) => {
                    warn!("file swap failed: {path}: {e}");
                    self.state = StreamState::Error;
                    self.msg = e.to_string();
                }
            }
        }
        if self.fp_sec.is_some()
            && self.tow_p >= 0.0
            && ((tow - margin) / intv).floor() != ((self.tow_p - margin) / intv).floor()
        {
            self.fp_sec = None;
        }
        self.tow_p = tow;
    }
}

impl Backend for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(fp) = self.fp.as_mut() else {
            return 0;
        };
        if let Some(rp) = self.replay.as_mut() {
            // release blocks whose recorded tick the replay clock passed
            let elapsed = (rp.start.elapsed().as_millis() as f64 * rp.speed) as i64 + rp.off_ms;
            loop {
                let pair = rp
                    .pending
                    .take()
                    .or_else(|| read_tag_pair(&mut rp.tag, self.spec.poswidth));
                match pair {
                    Some((tick, fpos)) if tick.wrapping_sub(rp.tick0) as i64 <= elapsed => {
                        rp.limit = fpos;
                        rp.tick = tick.wrapping_sub(rp.tick0) as i64;
                    }
                    Some(pair) => {
                        rp.pending = Some(pair);
                        break;
                    }
                    None => break,
                }
            }
            let avail = (rp.limit.saturating_sub(rp.pos) as usize).min(buf.len());
            if avail == 0 {
                return 0;
            }
            let n = fp.read(&mut buf[..avail]).unwrap_or(0);
            rp.pos += n as u64;
            n
        } else {
            fp.read(buf).unwrap_or(0)
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if let Some(tw) = self.tagw.as_ref() {
            let tick = tw.start.elapsed().as_millis() as u32;
            return match tw.tx.try_send((tick, buf.to_vec())) {
                Ok(()) => buf.len(),
                Err(TrySendError::Full(_)) => 0,
                Err(TrySendError::Disconnected(_)) => {
                    self.state = StreamState::Error;
                    self.msg = "tag writer stopped".into();
                    0
                }
            };
        }
        self.check_swap();
        if let Some(fp) = self.fp_sec.as_mut() {
            let _ = fp.write_all(buf);
        }
        match self.fp.as_mut().map(|fp| fp.write(buf)) {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                self.state = StreamState::Error;
                self.msg = e.to_string();
                0
            }
            None => 0,
        }
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn message(&self) -> String {
        self.msg.clone()
    }

    fn close(&mut self) {
        if let Some(tw) = self.tagw.take() {
            drop(tw.tx);
            let _ = tw.worker.join();
        }
        if let Some(fp) = self.fp.as_mut() {
            let _ = fp.flush();
        }
        self.fp = None;
        self.fp_sec = None;
        self.state = StreamState::Closed;
    }

    fn tick_f(&self) -> Option<i64> {
        self.replay.as_ref().map(|rp| rp.tick)
    }

    fn sync_to(&mut self, offset: i64) {
        if let Some(rp) = self.replay.as_mut() {
            rp.off_ms += offset;
        }
    }
}

/// Align a slave tag-replay stream to a master: the slave's replay
/// clock is shifted so both release blocks recorded at the same tick
/// together. No effect on non-file streams.
pub fn strsync(master: &Stream, slave: &Stream) {
    if master.kind() != StreamKind::File || slave.kind() != StreamKind::File {
        return;
    }
    let Some(mt) = master.with_backend(|b| b.tick_f()) else {
        return;
    };
    slave.with_backend(|b| {
        if let Some(st) = b.tick_f() {
            b.sync_to(mt - st);
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn tmp(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("gnss-ppk-{}-{name}", std::process::id()));
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn decorators_parse() {
        let s = parse_path("/data/rov.rtcm::T::+30::x5::S=24::P=8").unwrap();
        assert_eq!(s.path, "/data/rov.rtcm");
        assert!(s.timetag);
        assert_eq!(s.off, 30.0);
        assert_eq!(s.speed, 5.0);
        assert_eq!(s.swapintv, 24.0);
        assert_eq!(s.poswidth, 8);
        assert!(parse_path("f.bin::x0").is_err());
        assert!(parse_path("f.bin::Q").is_err());
        assert!(parse_path("::T").is_err());
    }

    fn read_retry(r: &mut FileStream, buf: &mut [u8]) -> usize {
        for _ in 0..200 {
            let n = r.read(buf);
            if n > 0 {
                return n;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        0
    }

    #[test]
    fn tag_write_then_paced_replay() {
        let path = tmp("replay.bin");
        {
            let mut w = FileStream::open(&format!("{path}::T"), StreamMode::Write).unwrap();
            assert_eq!(w.write(b"first"), 5);
            std::thread::sleep(Duration::from_millis(120));
            assert_eq!(w.write(b"second"), 6);
            w.close();
        }
        let t0 = Instant::now();
        let mut r = FileStream::open(&format!("{path}::T"), StreamMode::Read).unwrap();
        let mut buf = [0u8; 32];
        let n = read_retry(&mut r, &mut buf);
        assert_eq!(&buf[..n], b"first");
        // the 120 ms gap holds the second block back
        assert_eq!(r.read(&mut buf), 0);
        let n = read_retry(&mut r, &mut buf);
        assert_eq!(&buf[..n], b"second");
        assert!(t0.elapsed() >= Duration::from_millis(100));
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{path}.tag"));
    }

    #[test]
    fn replay_offset_skips_the_wait() {
        let path = tmp("offset.bin");
        {
            let mut w = FileStream::open(&format!("{path}::T"), StreamMode::Write).unwrap();
            w.write(b"abc");
            std::thread::sleep(Duration::from_millis(80));
            w.write(b"def");
            w.close();
        }
        // +1 s start skew puts the clock past both ticks immediately
        let mut r = FileStream::open(&format!("{path}::T::+1"), StreamMode::Read).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(r.read(&mut buf), 6);
        assert_eq!(&buf[..6], b"abcdef");
        assert!(r.tick_f().unwrap() >= 80);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{path}.tag"));
    }

    #[test]
    fn eight_byte_positions_round_trip() {
        let path = tmp("p8.bin");
        {
            let mut w = FileStream::open(&format!("{path}::T::P=8"), StreamMode::Write).unwrap();
            w.write(b"wide");
            w.close();
        }
        // width comes from the tag header, not the replay path
        let mut r = FileStream::open(&format!("{path}::T::+1"), StreamMode::Read).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(r.read(&mut buf), 4);
        assert_eq!(&buf[..4], b"wide");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{path}.tag"));
    }

    #[test]
    fn plain_file_round_trip() {
        let path = tmp("plain.bin");
        {
            let mut w = FileStream::open(&path, StreamMode::Write).unwrap();
            assert_eq!(w.write(b"no tags here"), 12);
            w.close();
        }
        let mut r = FileStream::open(&path, StreamMode::Read).unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(r.read(&mut buf), 12);
        assert_eq!(r.read(&mut buf), 0); // eof
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn strsync_shifts_the_slave_clock() {
        let pa = tmp("master.bin");
        let pb = tmp("slave.bin");
        for p in [&pa, &pb] {
            let mut w = FileStream::open(&format!("{p}::T"), StreamMode::Write).unwrap();
            w.write(b"x");
            std::thread::sleep(Duration::from_millis(60));
            w.write(b"y");
            w.close();
        }
        // master starts 1 s ahead, slave at zero
        let master = Stream::open(StreamKind::File, StreamMode::Read, &format!("{pa}::T::+1")).unwrap();
        let slave = Stream::open(StreamKind::File, StreamMode::Read, &format!("{pb}::T")).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(master.read(&mut buf), 2);
        let mut first = 0;
        for _ in 0..100 {
            first = slave.read(&mut buf);
            if first > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(first, 1); // second block held without the sync
        strsync(&master, &slave);
        let mut second = 0;
        for _ in 0..100 {
            second = slave.read(&mut buf);
            if second > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(second, 1);
        assert_eq!(&buf[..1], b"y");
        let _ = std::fs::remove_file(&pa);
        let _ = std::fs::remove_file(format!("{pa}.tag"));
        let _ = std::fs::remove_file(&pb);
        let _ = std::fs::remove_file(format!("{pb}.tag"));
    }
}
