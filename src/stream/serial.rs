//! Serial port transport with an optional TCP fan-out of received bytes.

use super::tcp::TcpServer;
use super::{Backend, StreamMode, StreamState};
use crate::error::Error;
use log::{debug, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

#[derive(Debug, PartialEq)]
struct SerialPath {
    dev: String,
    brate: u32,
    bsize: DataBits,
    parity: Parity,
    stopb: StopBits,
    fctr: FlowControl,
    /// Fan received bytes out as a TCP server on this port
    tcpport: Option<u16>,
}

// PORT[:brate[:bsize[:parity[:stopb[:fctr]]]]][#tcpport]
fn parse_path(path: &str) -> Result<SerialPath, Error> {
    let (main, tcp) = match path.split_once('#') {
        Some((m, t)) => (
            m,
            Some(
                t.parse::<u16>()
                    .map_err(|_| Error::config(format!("invalid fan-out port: {t}")))?,
            ),
        ),
        None => (path, None),
    };
    let mut it = main.split(':');
    let port = it
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::config(format!("invalid serial path: {path}")))?;
    let dev = if port.starts_with('/') {
        port.to_string()
    } else {
        format!("/dev/{port}")
    };
    let brate = match it.next() {
        Some(b) => b
            .parse()
            .map_err(|_| Error::config(format!("invalid baud rate: {b}")))?,
        None => 9600,
    };
    let bsize = match it.next() {
        None | Some("8") => DataBits::Eight,
        Some("7") => DataBits::Seven,
        Some(b) => return Err(Error::config(format!("invalid byte size: {b}"))),
    };
    let parity = match it.next() {
        None | Some("n") | Some("N") => Parity::None,
        Some("o") | Some("O") => Parity::Odd,
        Some("e") | Some("E") => Parity::Even,
        Some(p) => return Err(Error::config(format!("invalid parity: {p}"))),
    };
    let stopb = match it.next() {
        None | Some("1") => StopBits::One,
        Some("2") => StopBits::Two,
        Some(s) => return Err(Error::config(format!("invalid stop bits: {s}"))),
    };
    let fctr = match it.next() {
        None | Some("off") => FlowControl::None,
        Some("rts") => FlowControl::Hardware,
        Some(f) => return Err(Error::config(format!("invalid flow control: {f}"))),
    };
    Ok(SerialPath {
        dev,
        brate,
        bsize,
        parity,
        stopb,
        fctr,
        tcpport: tcp,
    })
}

pub(crate) struct SerialStream {
    port: Box<dyn SerialPort>,
    fan: Option<TcpServer>,
    state: StreamState,
    msg: String,
}

impl SerialStream {
    pub fn open(path: &str, _mode: StreamMode) -> Result<Self, Error> {
        let p = parse_path(path)?;
        debug!("serial open: {} {} bps", p.dev, p.brate);
        let port = serialport::new(p.dev.clone(), p.brate)
            .data_bits(p.bsize)
            .parity(p.parity)
            .stop_bits(p.stopb)
            .flow_control(p.fctr)
            .timeout(Duration::from_millis(1))
            .open()?;
        let fan = match p.tcpport {
            Some(port) => Some(TcpServer::open_port(port)?),
            None => None,
        };
        Ok(Self {
            port,
            fan,
            state: StreamState::Active,
            msg: format!("{} {} bps", p.dev, p.brate),
        })
    }
}

impl Backend for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.port.read(buf) {
            Ok(n) => {
                if let Some(fan) = self.fan.as_mut() {
                    fan.write(&buf[..n]);
                }
                n
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                0
            }
            Err(e) => {
                warn!("serial read error: {e}");
                self.state = StreamState::Error;
                self.msg = e.to_string();
                0
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        match self.port.write(buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                0
            }
            Err(e) => {
                warn!("serial write error: {e}");
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
    fn full_path_parses() {
        let p = parse_path("ttyUSB0:115200:8:n:1:rts#2000").unwrap();
        assert_eq!(p.dev, "/dev/ttyUSB0");
        assert_eq!(p.brate, 115200);
        assert_eq!(p.parity, Parity::None);
        assert_eq!(p.fctr, FlowControl::Hardware);
        assert_eq!(p.tcpport, Some(2000));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let p = parse_path("/dev/ttyACM1").unwrap();
        assert_eq!(p.dev, "/dev/ttyACM1");
        assert_eq!(p.brate, 9600);
        assert_eq!(p.bsize, DataBits::Eight);
        assert_eq!(p.stopb, StopBits::One);
        assert_eq!(p.tcpport, None);
    }

    #[test]
    fn bad_fields_rejected() {
        assert!(parse_path("ttyS0:fast").is_err());
        assert!(parse_path("ttyS0:9600:9").is_err());
        assert!(parse_path("ttyS0:9600:8:x").is_err());
        assert!(parse_path("").is_err());
    }
}
