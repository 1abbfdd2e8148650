//! NTRIP 1.0 transports over TCP: client (corrections downlink),
//! server (source uplink to a caster) and a single-mountpoint caster.

use super::tcp::{TcpClient, TcpServer};
use super::{getopts, Backend, StreamState};
use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use std::io::{Read, Write};
use std::net::TcpStream;

const AGENT: &str = concat!("NTRIP gnss-ppk/", env!("CARGO_PKG_VERSION"));
/// Response buffer cap during the handshake.
const MAX_RSP: usize = 32_768;
/// Escalated reconnect wait cap (ms) after repeated refusals.
const MAX_RECON: u64 = 60_000;
const DEFAULT_PORT: u16 = 2101;

struct NtripPath {
    user: String,
    passwd: String,
    host: String,
    port: u16,
    mnt: String,
    /// STR record (server) or source table (caster)
    str_: String,
}

// [USER[:PASS]@]ADDR[:PORT]/MOUNT[:STR]
fn parse_path(path: &str) -> Result<NtripPath, Error> {
    let (creds, rest) = match path.rsplit_once('@') {
        Some((c, r)) => (c, r),
        None => ("", path),
    };
    let (user, passwd) = match creds.split_once(':') {
        Some((u, p)) => (u, p),
        None => (creds, ""),
    };
    let (hostport, mntstr) = rest.split_once('/').unwrap_or((rest, ""));
    let (mnt, str_) = mntstr.split_once(':').unwrap_or((mntstr, ""));
    let (host, port) = match hostport.rsplit_once(':') {
        Some((h, p)) => (
            h,
            p.parse::<u16>()
                .map_err(|_| Error::config(format!("invalid ntrip port: {p}")))?,
        ),
        None => (hostport, DEFAULT_PORT),
    };
    Ok(NtripPath {
        user: user.into(),
        passwd: passwd.into(),
        host: host.into(),
        port,
        mnt: mnt.into(),
        str_: str_.into(),
    })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    /// Request sent, collecting the response header
    Handshake,
    Streaming,
    /// Source table pass-through (client with empty mountpoint)
    SourceTable,
    Done,
}

pub(crate) struct Ntrip {
    tcp: TcpClient,
    path: NtripPath,
    client: bool,
    phase: Phase,
    rsp: Vec<u8>,
    /// Stream bytes that arrived glued to the response header
    pending: Vec<u8>,
    msg: String,
}

impl Ntrip {
    pub fn open(path: &str, client: bool) -> Result<Self, Error> {
        let p = parse_path(path)?;
        if p.host.is_empty() {
            return Err(Error::config(format!("ntrip needs a host: {path}")));
        }
        let tcp = TcpClient::open(&format!("{}:{}", p.host, p.port))?;
        Ok(Self {
            tcp,
            path: p,
            client,
            phase: Phase::Handshake,
            rsp: Vec::new(),
            pending: Vec::new(),
            msg: String::new(),
        })
    }

    fn send_request(&mut self) {
        let req = if self.client {
            let mut r = format!(
                "GET /{} HTTP/1.0\r\nUser-Agent: {AGENT}\r\n",
                self.path.mnt
            );
            if !self.path.user.is_empty() {
                let cred = BASE64.encode(format!("{}:{}", self.path.user, self.path.passwd));
                r.push_str(&format!("Authorization: Basic {cred}\r\n"));
            }
            r.push_str("\r\n");
            r
        } else {
            format!(
                "SOURCE {} /{}\r\nSource-Agent: {AGENT}\r\nSTR: {}\r\n\r\n",
                self.path.passwd, self.path.mnt, self.path.str_
            )
        };
        debug!("ntrip request: {}:{}/{}", self.path.host, self.path.port, self.path.mnt);
        self.tcp.write(req.as_bytes());
        self.phase = Phase::Handshake;
        self.rsp.clear();
    }

    // advance the handshake with whatever bytes the socket has
    fn poll(&mut self) {
        if self.tcp.take_connected() {
            self.send_request();
        }
        if self.phase != Phase::Handshake {
            return;
        }
        let mut buf = [0u8; 1024];
        loop {
            let n = self.tcp.read(&mut buf);
            if n == 0 {
                break;
            }
            self.rsp.extend_from_slice(&buf[..n]);
            if self.rsp.len() > MAX_RSP {
                self.tcp.disconnect("oversized response");
                return;
            }
        }
        let text = String::from_utf8_lossy(&self.rsp).into_owned();
        if !self.client {
            // server handshake: OK / ERROR single line
            if text.contains("OK") {
                self.phase = Phase::Streaming;
                self.msg = "source accepted".into();
            } else if text.contains("ERROR") {
                warn!("ntrip server refused: {}", text.trim());
                self.msg = text.trim().to_string();
                self.tcp.disconnect("source refused");
            }
            return;
        }
        if let Some(end) = text.find("ICY 200 OK") {
            let after = end + "ICY 200 OK".len();
            // skip the header terminator, keep glued stream bytes
            let body = match self.rsp[after..].windows(2).position(|w| w == b"\r\n") {
                Some(i) => after + i + 2,
                None => self.rsp.len(),
            };
            self.pending = self.rsp.split_off(body);
            self.rsp.clear();
            self.phase = Phase::Streaming;
            self.msg = "icy 200 ok".into();
            self.tcp.tirecon = getopts().tirecon; // success resets escalation
        } else if text.contains("SOURCETABLE 200 OK") {
            if self.path.mnt.is_empty() {
                self.pending = std::mem::take(&mut self.rsp);
                self.phase = Phase::SourceTable;
                self.msg = "sourcetable".into();
            } else {
                // mountpoint unknown: back off harder every refusal
                self.tcp.tirecon = (self.tcp.tirecon * 5 / 4).min(MAX_RECON);
                warn!(
                    "ntrip: no mountpoint {} (retry in {} ms)",
                    self.path.mnt, self.tcp.tirecon
                );
                self.msg = format!("no mountpoint {}", self.path.mnt);
                self.tcp.disconnect("no mountpoint");
            }
        } else if text.contains("HTTP/") && text.contains("\r\n\r\n") {
            let line = text.lines().next().unwrap_or("").to_string();
            warn!("ntrip error response: {line}");
            self.msg = line;
            self.tcp.disconnect("http error");
        }
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }
}

impl Backend for Ntrip {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.phase == Phase::Done {
            return 0;
        }
        self.poll();
        match self.phase {
            Phase::Streaming => {
                if !self.pending.is_empty() {
                    return self.drain_pending(buf);
                }
                self.tcp.read(buf)
            }
            Phase::SourceTable => {
                let n = if !self.pending.is_empty() {
                    self.drain_pending(buf)
                } else {
                    self.tcp.read(buf)
                };
                // the table is delivered once, then the stream ends;
                // the caster hanging up ends it too
                if String::from_utf8_lossy(&buf[..n]).contains("ENDSOURCETABLE")
                    || (n == 0 && self.tcp.state() != StreamState::Active)
                {
                    self.tcp.close();
                    self.phase = Phase::Done;
                }
                n
            }
            _ => 0,
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if self.phase == Phase::Done {
            return 0;
        }
        self.poll();
        if self.phase == Phase::Streaming {
            self.tcp.write(buf)
        } else {
            0
        }
    }

    fn state(&self) -> StreamState {
        match self.phase {
            Phase::Done => StreamState::Closed,
            Phase::Streaming | Phase::SourceTable => self.tcp.state(),
            Phase::Handshake => match self.tcp.state() {
                StreamState::Active => StreamState::Wait, // header not in yet
                s => s,
            },
        }
    }

    fn message(&self) -> String {
        if self.msg.is_empty() {
            self.tcp.message()
        } else {
            self.msg.clone()
        }
    }

    fn close(&mut self) {
        self.tcp.close();
        self.phase = Phase::Done;
    }
}

struct CasterCli {
    sock: TcpStream,
    req: Vec<u8>,
    authed: bool,
}

/// Single-mountpoint NTRIP caster.
pub(crate) struct Caster {
    svr: TcpServer,
    path: NtripPath,
    clients: Vec<CasterCli>,
    msg: String,
}

impl Caster {
    /// `[USER[:PASS]@][:PORT]/MOUNT[:SRCTBL]`.
    pub fn open(path: &str) -> Result<Self, Error> {
        let p = parse_path(path)?;
        if p.mnt.is_empty() {
            return Err(Error::config(format!("caster needs a mountpoint: {path}")));
        }
        let svr = TcpServer::open_port(p.port)?;
        Ok(Self {
            svr,
            path: p,
            clients: Vec::new(),
            msg: String::new(),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.svr.local_port()
    }

    fn sourcetable(&self) -> String {
        let body = format!("STR;{};{}\r\nENDSOURCETABLE\r\n", self.path.mnt, self.path.str_);
        format!(
            "SOURCETABLE 200 OK\r\nServer: {AGENT}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
    }

    fn poll(&mut self) {
        // adopt newly accepted sockets from the listener
        for sock in self.svr.take_clients() {
            self.clients.push(CasterCli {
                sock,
                req: Vec::new(),
                authed: false,
            });
        }
        let table = self.sourcetable();
        let mut drop_list = Vec::new();
        for (i, cli) in self.clients.iter_mut().enumerate() {
            if cli.authed {
                continue;
            }
            let mut buf = [0u8; 1024];
            match cli.sock.read(&mut buf) {
                Ok(0) => {
                    drop_list.push(i);
                    continue;
                }
                Ok(n) => cli.req.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => {
                    drop_list.push(i);
                    continue;
                }
            }
            let req = String::from_utf8_lossy(&cli.req).into_owned();
            if !req.contains("\r\n\r\n") {
                if cli.req.len() > 4096 {
                    drop_list.push(i);
                }
                continue;
            }
            let mount_ok = req
                .lines()
                .next()
                .map(|l| {
                    let mut it = l.split_whitespace();
                    it.next() == Some("GET")
                        && it.next().map(|u| u.trim_start_matches('/')) == Some(self.path.mnt.as_str())
                })
                .unwrap_or(false);
            if !mount_ok {
                debug!("caster: mountpoint mismatch, sending sourcetable");
                let _ = cli.sock.write_all(table.as_bytes());
                drop_list.push(i);
                continue;
            }
            let cred = BASE64.encode(format!("{}:{}", self.path.user, self.path.passwd));
            let authed = self.path.user.is_empty()
                || req
                    .lines()
                    .any(|l| l.starts_with("Authorization: Basic") && l.ends_with(&cred));
            if !authed {
                warn!("caster: authorization failed");
                let _ = cli.sock.write_all(b"HTTP/1.0 401 Unauthorized\r\n\r\n");
                drop_list.push(i);
                continue;
            }
            let _ = cli.sock.write_all(b"ICY 200 OK\r\n");
            cli.authed = true;
            cli.req.clear();
        }
        for i in drop_list.into_iter().rev() {
            self.clients.swap_remove(i);
        }
        self.msg = format!("{} client(s)", self.clients.iter().filter(|c| c.authed).count());
    }
}

impl Backend for Caster {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.poll();
        let mut dead = Vec::new();
        let mut got = 0;
        for (i, cli) in self.clients.iter_mut().enumerate() {
            if !cli.authed {
                continue;
            }
            match cli.sock.read(buf) {
                Ok(0) => dead.push(i),
                Ok(n) => {
                    got = n;
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => dead.push(i),
            }
        }
        for i in dead.into_iter().rev() {
            self.clients.swap_remove(i);
        }
        got
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        self.poll();
        let mut dead = Vec::new();
        let mut sent = 0;
        for (i, cli) in self.clients.iter_mut().enumerate() {
            if !cli.authed {
                continue;
            }
            match cli.sock.write(buf) {
                Ok(n) => sent = sent.max(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => dead.push(i),
            }
        }
        for i in dead.into_iter().rev() {
            self.clients.swap_remove(i);
        }
        sent
    }

    fn state(&self) -> StreamState {
        if self.clients.iter().any(|c| c.authed) {
            StreamState::Active
        } else {
            StreamState::Wait
        }
    }

    fn message(&self) -> String {
        self.msg.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn pump<T>(mut f: impl FnMut() -> Option<T>) -> T {
        for _ in 0..200 {
            if let Some(v) = f() {
                return v;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("loopback timed out");
    }

    #[test]
    fn caster_relays_to_authenticated_client() {
        let mut caster = Caster::open("u:p@:0/RTCM3:cors").unwrap();
        let port = caster.local_port();
        let mut cli = Ntrip::open(&format!("u:p@127.0.0.1:{port}/RTCM3"), true).unwrap();

        let mut buf = [0u8; 256];
        let n = pump(|| {
            caster.write(b"corr frame");
            let n = cli.read(&mut buf);
            (n > 0).then_some(n)
        });
        assert_eq!(&buf[..n], b"corr frame");
        assert_eq!(caster.state(), StreamState::Active);
    }

    #[test]
    fn caster_answers_unknown_mountpoint_with_sourcetable() {
        let mut caster = Caster::open(":0/GOOD:table-entry").unwrap();
        let port = caster.local_port();
        // empty mountpoint asks for the source table
        let mut cli = Ntrip::open(&format!("127.0.0.1:{port}/"), true).unwrap();

        let mut buf = [0u8; 1024];
        let mut text = String::new();
        pump(|| {
            caster.poll();
            let n = cli.read(&mut buf);
            text.push_str(&String::from_utf8_lossy(&buf[..n]));
            text.contains("ENDSOURCETABLE").then_some(())
        });
        assert!(text.contains("STR;GOOD"));
        assert_eq!(cli.state(), StreamState::Closed);
    }

    #[test]
    fn caster_rejects_bad_credentials() {
        let mut caster = Caster::open("u:secret@:0/RTCM3").unwrap();
        let port = caster.local_port();
        let mut cli = Ntrip::open(&format!("u:wrong@127.0.0.1:{port}/RTCM3"), true).unwrap();

        let mut buf = [0u8; 256];
        pump(|| {
            caster.poll();
            cli.read(&mut buf);
            cli.message().contains("401").then_some(())
        });
    }

    #[test]
    fn path_parsing() {
        let p = parse_path("user:pw@caster.example.com:2102/MNT:extra").unwrap();
        assert_eq!(p.user, "user");
        assert_eq!(p.passwd, "pw");
        assert_eq!(p.host, "caster.example.com");
        assert_eq!(p.port, 2102);
        assert_eq!(p.mnt, "MNT");
        assert_eq!(p.str_, "extra");

        let p = parse_path("caster.example.com/MNT").unwrap();
        assert_eq!(p.port, DEFAULT_PORT);
        assert!(p.user.is_empty());
    }
}
