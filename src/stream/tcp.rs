//! TCP transports: a server fanning out to up to 32 clients and a
//! client with the shared reconnect discipline.

use super::{getopts, Backend, StreamState};
use crate::error::Error;
use log::{debug, warn};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Connected clients per server socket.
const MAX_CLI: usize = 32;

fn parse_addr(path: &str) -> Result<(String, u16), Error> {
    let (host, port) = path
        .rsplit_once(':')
        .ok_or_else(|| Error::config(format!("invalid tcp path: {path}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::config(format!("invalid tcp port: {port}")))?;
    Ok((host.to_string(), port))
}

pub(crate) struct TcpServer {
    listener: TcpListener,
    clients: Vec<TcpStream>,
    state: StreamState,
    msg: String,
}

impl TcpServer {
    /// `:PORT`.
    pub fn open(path: &str) -> Result<Self, Error> {
        let (_, port) = parse_addr(path)?;
        Self::open_port(port)
    }

    pub fn open_port(port: u16) -> Result<Self, Error> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        debug!("tcp server listening: port={port}");
        Ok(Self {
            listener,
            clients: Vec::new(),
            state: StreamState::Wait,
            msg: format!("listening :{port}"),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Drain newly accepted sockets; used by the NTRIP caster which
    /// runs its own per-client handshake.
    pub(super) fn take_clients(&mut self) -> Vec<TcpStream> {
        self.poll_accept();
        std::mem::take(&mut self.clients)
    }

    fn poll_accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((sock, peer)) => {
                    if self.clients.len() >= MAX_CLI {
                        warn!("tcp server full, refusing {peer}");
                        continue; // socket dropped, connection refused
                    }
                    let _ = sock.set_nonblocking(true);
                    let _ = sock.set_nodelay(true);
                    debug!("tcp server accept: {peer}");
                    self.msg = format!("{peer}");
                    self.clients.push(sock);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("tcp server accept error: {e}");
                    break;
                }
            }
        }
        self.state = if self.clients.is_empty() {
            StreamState::Wait
        } else {
            StreamState::Active
        };
    }
}

impl Backend for TcpServer {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.poll_accept();
        let mut dead = Vec::new();
        let mut got = 0;
        for (i, cli) in self.clients.iter_mut().enumerate() {
            match cli.read(buf) {
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
        self.poll_accept();
        let mut dead = Vec::new();
        let mut sent = 0;
        for (i, cli) in self.clients.iter_mut().enumerate() {
            match cli.write(buf) {
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
        self.state
    }

    fn message(&self) -> String {
        self.msg.clone()
    }
}

pub(crate) struct TcpClient {
    host: String,
    port: u16,
    sock: Option<TcpStream>,
    state: StreamState,
    /// Set on disconnect; gates the next attempt by `tirecon`
    tick_discon: Option<Instant>,
    tick_active: Instant,
    /// Reconnect wait (ms); NTRIP escalates this on refusal
    pub(super) tirecon: u64,
    /// One-shot flag raised on every successful connect
    connected_event: bool,
    msg: String,
}

impl TcpClient {
    /// `ADDR:PORT`.
    pub fn open(path: &str) -> Result<Self, Error> {
        let (host, port) = parse_addr(path)?;
        if host.is_empty() {
            return Err(Error::config(format!("tcp client needs a host: {path}")));
        }
        Ok(Self {
            host,
            port,
            sock: None,
            state: StreamState::Wait,
            tick_discon: None,
            tick_active: Instant::now(),
            tirecon: getopts().tirecon,
            connected_event: false,
            msg: String::new(),
        })
    }

    /// True while a connection is up; attempts one when allowed.
    pub(super) fn poll_connect(&mut self) -> bool {
        if self.sock.is_some() {
            return true;
        }
        if let Some(t) = self.tick_discon {
            if (t.elapsed().as_millis() as u64) < self.tirecon.max(1) {
                return false;
            }
        }
        let addr = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(mut it) => match it.next() {
                Some(a) => a,
                None => {
                    self.fail("unresolvable host");
                    return false;
                }
            },
            Err(e) => {
                self.fail(&e.to_string());
                return false;
            }
        };
        match TcpStream::connect_timeout(&addr, Duration::from_millis(100)) {
            Ok(sock) => {
                let _ = sock.set_nonblocking(true);
                let _ = sock.set_nodelay(true);
                debug!("tcp client connected: {addr}");
                self.sock = Some(sock);
                self.state = StreamState::Active;
                self.tick_active = Instant::now();
                self.connected_event = true;
                self.msg = format!("connected {addr}");
                true
            }
            Err(e) => {
                self.fail(&e.to_string());
                false
            }
        }
    }

    fn fail(&mut self, why: &str) {
        debug!("tcp client connect failed: {}:{} {why}", self.host, self.port);
        self.tick_discon = Some(Instant::now());
        self.state = StreamState::Wait;
        self.msg = format!("waiting... ({why})");
    }

    pub(super) fn disconnect(&mut self, why: &str) {
        debug!("tcp client disconnect: {}:{} {why}", self.host, self.port);
        self.sock = None;
        self.tick_discon = Some(Instant::now());
        self.state = StreamState::Wait;
        self.msg = format!("waiting... ({why})");
    }

    /// Consumes the connect event raised by [Self::poll_connect].
    pub(super) fn take_connected(&mut self) -> bool {
        std::mem::take(&mut self.connected_event)
    }
}

impl Backend for TcpClient {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.poll_connect() {
            return 0;
        }
        let toinact = getopts().toinact;
        let r = self.sock.as_mut().map(|s| s.read(buf));
        match r {
            Some(Ok(0)) => {
                self.disconnect("connection closed");
                0
            }
            Some(Ok(n)) => {
                self.tick_active = Instant::now();
                n
            }
            Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if toinact > 0 && self.tick_active.elapsed().as_millis() as u64 > toinact {
                    self.disconnect("inactive timeout");
                }
                0
            }
            Some(Err(e)) => {
                self.disconnect(&e.to_string());
                0
            }
            None => 0,
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if !self.poll_connect() {
            return 0;
        }
        let r = self.sock.as_mut().map(|s| s.write(buf));
        match r {
            Some(Ok(n)) => {
                self.tick_active = Instant::now();
                n
            }
            Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Some(Err(e)) => {
                self.disconnect(&e.to_string());
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
        self.sock = None;
        self.state = StreamState::Closed;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pump(cli: &mut TcpClient, svr: &mut TcpServer, buf: &mut [u8]) -> usize {
        for _ in 0..100 {
            cli.poll_connect();
            let n = svr.read(buf);
            if n > 0 {
                return n;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        0
    }

    #[test]
    fn client_to_server_loopback() {
        let mut svr = TcpServer::open_port(0).unwrap();
        let port = svr.local_port();
        let mut cli = TcpClient::open(&format!("127.0.0.1:{port}")).unwrap();

        // connection is established lazily on first i/o
        let mut buf = [0u8; 64];
        for _ in 0..100 {
            if cli.poll_connect() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(cli.write(b"rtcm bytes"), 10);
        let n = pump(&mut cli, &mut svr, &mut buf);
        assert_eq!(&buf[..n], b"rtcm bytes");
        assert_eq!(svr.state(), StreamState::Active);
    }

    #[test]
    fn reconnect_waits_for_interval() {
        let mut cli = TcpClient::open("127.0.0.1:1").unwrap();
        cli.tirecon = 60_000;
        assert!(!cli.poll_connect()); // refused, enters wait
        assert_eq!(cli.state(), StreamState::Wait);
        // immediately after the failure the gate holds the retry
        assert!(!cli.poll_connect());
    }

    #[test]
    fn bad_path_rejected_at_open() {
        assert!(TcpClient::open("no-port-here").is_err());
        assert!(TcpClient::open(":2101").is_err());
    }
}
