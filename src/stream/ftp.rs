//! FTP/HTTP download stream.
//!
//! A background thread fetches the keyword-expanded remote path into
//! the configured local directory with an external `wget`, optionally
//! decompresses it, and the stream "read" then yields the local path
//! once. Downloads reschedule on the `::T=` interval.

use super::{getopts, reppath, Backend, StreamState};
use crate::error::Error;
use crate::time::{timeadd, timeget, utc2gpst};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const STATE_WAIT: i8 = 0;
const STATE_DONE: i8 = 1;
const STATE_ERROR: i8 = -1;

#[derive(Debug, Clone, PartialEq)]
struct FtpSpec {
    user: String,
    passwd: String,
    /// `addr/path` with reppath keywords
    remote: String,
    /// path time offset (s), interval (s), download offset (s), retry (s)
    topts: [f64; 4],
}

// [USER[:PASS]@]ADDR/PATH[::T=POFF,TINT,TOFF,TRET]
fn parse_path(path: &str) -> Result<FtpSpec, Error> {
    let (main, topt) = match path.split_once("::T=") {
        Some((m, t)) => (m, Some(t)),
        None => (path, None),
    };
    let (auth, remote) = match main.rsplit_once('@') {
        Some((a, r)) => (a, r),
        None => ("", main),
    };
    let (user, passwd) = match auth.split_once(':') {
        Some((u, p)) => (u.to_string(), p.to_string()),
        None => (auth.to_string(), String::new()),
    };
    if remote.is_empty() || !remote.contains('/') {
        return Err(Error::config(format!("invalid download path: {path}")));
    }
    let mut topts = [0.0, 3600.0, 0.0, 600.0];
    if let Some(t) = topt {
        for (i, v) in t.split(',').take(4).enumerate() {
            topts[i] = v
                .parse()
                .map_err(|_| Error::config(format!("invalid download schedule: {t}")))?;
        }
    }
    Ok(FtpSpec {
        user,
        passwd,
        remote: remote.to_string(),
        topts,
    })
}

/// Local name after external decompression, None when the file is
/// stored uncompressed.
fn uncompressed_name(local: &Path) -> Option<PathBuf> {
    let name = local.file_name()?.to_str()?;
    for ext in [".gz", ".Z", ".zip", ".tar"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return Some(local.with_file_name(stem));
        }
    }
    // Hatanaka compact RINEX
    if let Some(stem) = name.strip_suffix(".crx") {
        return Some(local.with_file_name(format!("{stem}.rnx")));
    }
    if name.len() > 1 && name.ends_with('d') && name.contains('.') {
        let mut s = name.to_string();
        s.replace_range(s.len() - 1.., "o");
        return Some(local.with_file_name(s));
    }
    None
}

fn uncompress(local: &Path) -> std::io::Result<PathBuf> {
    let Some(out) = uncompressed_name(local) else {
        return Ok(local.to_path_buf());
    };
    let name = local.to_string_lossy();
    let dir = local.parent().unwrap_or(Path::new("."));
    let status = if name.ends_with(".gz") || name.ends_with(".Z") {
        Command::new("gzip").arg("-df").arg(local).status()?
    } else if name.ends_with(".zip") {
        Command::new("unzip")
            .args(["-o", "-d"])
            .arg(dir)
            .arg(local)
            .status()?
    } else if name.ends_with(".tar") {
        Command::new("tar")
            .arg("-xf")
            .arg(local)
            .arg("-C")
            .arg(dir)
            .status()?
    } else {
        Command::new("crx2rnx").arg("-f").arg(local).status()?
    };
    if !status.success() {
        return Err(std::io::Error::other(format!("uncompress failed: {name}")));
    }
    Ok(out)
}

fn local_dir() -> PathBuf {
    let dir = getopts().localdir;
    if dir.is_empty() {
        std::env::temp_dir()
    } else {
        PathBuf::from(dir)
    }
}

fn fetch(spec: FtpSpec, is_http: bool, state: Arc<AtomicI8>, out: Arc<Mutex<String>>) {
    let time = timeadd(utc2gpst(timeget()), -spec.topts[0]);
    let remote = reppath(&spec.remote, time, "", "");
    let Some(name) = remote.rsplit('/').next().filter(|n| !n.is_empty()) else {
        state.store(STATE_ERROR, Ordering::SeqCst);
        return;
    };
    let local = local_dir().join(name);
    // skip the transfer when the target is already on disk
    let done = uncompressed_name(&local).unwrap_or_else(|| local.clone());
    if done.exists() {
        debug!("download skipped, local file exists: {}", done.display());
        *out.lock().unwrap_or_else(|e| e.into_inner()) = done.to_string_lossy().into_owned();
        state.store(STATE_DONE, Ordering::SeqCst);
        return;
    }
    let proto = if is_http { "http" } else { "ftp" };
    let url = if !is_http && !spec.user.is_empty() {
        format!("{proto}://{}:{}@{remote}", spec.user, spec.passwd)
    } else {
        format!("{proto}://{remote}")
    };
    let mut cmd = Command::new("wget");
    cmd.args(["-q", "-O"]).arg(&local).arg("-T").arg("30");
    let proxy = getopts().proxyaddr;
    if !proxy.is_empty() {
        cmd.arg("-e")
            .arg("use_proxy=yes")
            .arg("-e")
            .arg(format!("{proto}_proxy=http://{proxy}"));
    }
    cmd.arg(&url);
    debug!("download start: {url} -> {}", local.display());
    match cmd.status() {
        Ok(st) if st.success() => match uncompress(&local) {
            Ok(done) => {
                *out.lock().unwrap_or_else(|e| e.into_inner()) =
                    done.to_string_lossy().into_owned();
                state.store(STATE_DONE, Ordering::SeqCst);
            }
            Err(e) => {
                warn!("uncompress error: {e}");
                state.store(STATE_ERROR, Ordering::SeqCst);
            }
        },
        r => {
            warn!("download failed: {url} ({r:?})");
            let _ = std::fs::remove_file(&local);
            state.store(STATE_ERROR, Ordering::SeqCst);
        }
    }
}

pub(crate) struct FtpStream {
    spec: FtpSpec,
    is_http: bool,
    state: Arc<AtomicI8>,
    local: Arc<Mutex<String>>,
    worker: Option<JoinHandle<()>>,
    /// Local path already delivered for the current cycle
    emitted: bool,
    /// Next scheduled fetch, None while one is in flight
    next_at: Option<Instant>,
}

impl FtpStream {
    pub fn open(path: &str, is_http: bool) -> Result<Self, Error> {
        let spec = parse_path(path)?;
        let mut s = Self {
            spec,
            is_http,
            state: Arc::new(AtomicI8::new(STATE_WAIT)),
            local: Arc::new(Mutex::new(String::new())),
            worker: None,
            emitted: false,
            next_at: None,
        };
        s.spawn();
        Ok(s)
    }

    fn spawn(&mut self) {
        self.state.store(STATE_WAIT, Ordering::SeqCst);
        self.emitted = false;
        self.next_at = None;
        let spec = self.spec.clone();
        let is_http = self.is_http;
        let state = Arc::clone(&self.state);
        let out = Arc::clone(&self.local);
        self.worker = Some(std::thread::spawn(move || fetch(spec, is_http, state, out)));
    }

    fn schedule(&mut self, delay_s: f64) {
        if self.next_at.is_none() && delay_s > 0.0 {
            self.next_at = Some(Instant::now() + Duration::from_secs_f64(delay_s));
        }
    }
}

impl Backend for FtpStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if let Some(at) = self.next_at {
            if Instant::now() >= at && self.worker.as_ref().map_or(true, |w| w.is_finished()) {
                self.worker = None;
                self.spawn();
            }
            return 0;
        }
        match self.state.load(Ordering::SeqCst) {
            STATE_DONE if !self.emitted => {
                self.emitted = true;
                self.schedule(self.spec.topts[1]);
                let path = self.local.lock().unwrap_or_else(|e| e.into_inner());
                let n = path.len().min(buf.len());
                buf[..n].copy_from_slice(&path.as_bytes()[..n]);
                n
            }
            STATE_DONE => {
                self.schedule(self.spec.topts[1]);
                0
            }
            STATE_ERROR => {
                // retry, or wait out the full interval when retry is off
                let t = self.spec.topts;
                self.schedule(if t[3] > 0.0 { t[3] } else { t[1].max(1.0) });
                0
            }
            _ => 0,
        }
    }

    fn write(&mut self, _buf: &[u8]) -> usize {
        0 // download streams are read-only
    }

    fn state(&self) -> StreamState {
        match self.state.load(Ordering::SeqCst) {
            STATE_DONE => StreamState::Active,
            STATE_ERROR => StreamState::Error,
            _ => StreamState::Wait,
        }
    }

    fn message(&self) -> String {
        self.local
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn close(&mut self) {
        // the fetch thread finishes on its own; detach it
        self.worker = None;
        self.next_at = None;
    }
}
