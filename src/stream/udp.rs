//! UDP transport. The server side is receive-only, the client side is
//! send-only; datagram boundaries are not preserved across reads.

use super::{Backend, StreamState};
use crate::error::Error;
use log::{debug, warn};
use std::net::{ToSocketAddrs, UdpSocket};

pub(crate) struct UdpStream {
    sock: UdpSocket,
    /// Client target, None for a server
    peer: Option<std::net::SocketAddr>,
    state: StreamState,
    msg: String,
}

impl UdpStream {
    /// `:PORT`, receive only.
    pub fn open_server(path: &str) -> Result<Self, Error> {
        let port: u16 = path
            .trim_start_matches(':')
            .parse()
            .map_err(|_| Error::config(format!("invalid udp server path: {path}")))?;
        let sock = UdpSocket::bind(("0.0.0.0", port))?;
        sock.set_nonblocking(true)?;
        debug!("udp server bound: port={port}");
        Ok(Self {
            sock,
            peer: None,
            state: StreamState::Active,
            msg: format!("bound :{port}"),
        })
    }

    /// `ADDR:PORT`, send only. A broadcast address enables SO_BROADCAST.
    pub fn open_client(path: &str) -> Result<Self, Error> {
        let (host, port) = path
            .rsplit_once(':')
            .ok_or_else(|| Error::config(format!("invalid udp client path: {path}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::config(format!("invalid udp port: {port}")))?;
        let peer = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::config(format!("unresolvable host: {host}")))?;
        let sock = UdpSocket::bind(("0.0.0.0", 0))?;
        sock.set_nonblocking(true)?;
        if host == "255.255.255.255" || host.ends_with(".255") {
            sock.set_broadcast(true)?;
        }
        debug!("udp client ready: peer={peer}");
        Ok(Self {
            sock,
            peer: Some(peer),
            state: StreamState::Active,
            msg: format!("-> {peer}"),
        })
    }
}

impl Backend for UdpStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.peer.is_some() {
            return 0; // client side is write-only
        }
        match self.sock.recv_from(buf) {
            Ok((n, _)) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                warn!("udp recv error: {e}");
                self.state = StreamState::Error;
                self.msg = e.to_string();
                0
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let Some(peer) = self.peer else {
            return 0; // server side is read-only
        };
        match self.sock.send_to(buf, peer) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                warn!("udp send error: {e}");
                self.state = StreamState::Error;
                self.msg = e.to_string();
                0
            }
        }
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn message(&self) -> String {
        self.msg.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn datagram_loopback() {
        let mut svr = UdpStream::open_server(":0").unwrap();
        let port = svr.sock.local_addr().unwrap().port();
        let mut cli = UdpStream::open_client(&format!("127.0.0.1:{port}")).unwrap();

        assert_eq!(cli.write(b"ppp corrections"), 15);
        // localhost delivery is fast but not instantaneous
        let mut buf = [0u8; 64];
        let mut n = 0;
        for _ in 0..50 {
            n = svr.read(&mut buf);
            if n > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(&buf[..n], b"ppp corrections");
    }

    #[test]
    fn server_rejects_writes_client_rejects_reads() {
        let mut svr = UdpStream::open_server(":0").unwrap();
        assert_eq!(svr.write(b"x"), 0);
        let mut cli = UdpStream::open_client("127.0.0.1:2101").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(cli.read(&mut buf), 0);
    }
}
