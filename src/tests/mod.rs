//! Cross-module scenario tests. Module-level behavior is covered next
//! to each module; these exercise the public surface end to end.

use crate::constants::D2R;
use crate::coords::pos2ecef;
use crate::ppp::test::{code_only_config, synthetic_nav, synthetic_obs};
use crate::prelude::*;
use log::LevelFilter;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

#[test]
fn static_epoch_feeds_a_gpx_track() {
    init_logger();
    let time = gpst2time(2200, 345600.0);
    let nav = synthetic_nav(time);
    let rr = pos2ecef(&Vector3::new(35.0 * D2R, 139.0 * D2R, 100.0));
    let obs = synthetic_obs(time, &nav, &rr, 1.0E-7);

    let mut rtk = Rtk::new(code_only_config());
    rtk.sol.rr = [rr[0] + 3.0, rr[1] - 2.0, rr[2] + 2.0, 0.0, 0.0, 0.0];
    rtk.sol.dtr[0] = 1.0E-7;
    pppos(&mut rtk, &obs, &nav, &mut NoOpResolver).unwrap();
    assert_eq!(rtk.sol.stat, SolStatus::Ppp);

    let mut buf = SolBuf::new(0.0);
    assert!(buf.push(rtk.sol));
    let gpx = sol2gpx(&buf.data, &GpxOpt::default()).unwrap();
    assert_eq!(gpx.matches("<trk>").count(), 1);
    assert_eq!(gpx.matches("<trkpt ").count(), 1);
    assert!(gpx.contains("<fix>ppp</fix>"));
}

#[test]
fn recorded_stream_replays_in_order() {
    init_logger();
    let path = std::env::temp_dir().join(format!(
        "gnss-ppk-scenario-{}.bin",
        std::process::id()
    ));
    let spec = format!("{}::T", path.display());
    {
        let w = Stream::open(StreamKind::File, StreamMode::Write, &spec).unwrap();
        for i in 0..5u8 {
            assert_eq!(w.write(&[b'0' + i; 4]), 4);
            std::thread::sleep(Duration::from_millis(10));
        }
        w.close();
    }

    let r = Stream::open(StreamKind::File, StreamMode::Read, &format!("{spec}::x10")).unwrap();
    let mut got = Vec::new();
    let mut buf = [0u8; 64];
    for _ in 0..500 {
        let n = r.read(&mut buf);
        got.extend_from_slice(&buf[..n]);
        if got.len() >= 20 {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(got.len(), 20);
    assert!(got.starts_with(b"0000"));
    assert!(got.ends_with(b"4444"));
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(format!("{}.tag", path.display()));
}

#[test]
fn membuf_stream_is_thread_safe() {
    init_logger();
    let s = Arc::new(Stream::open(StreamKind::MemBuf, StreamMode::ReadWrite, "8192").unwrap());
    let w = Arc::clone(&s);
    let writer = std::thread::spawn(move || {
        for i in 0..100u32 {
            let line = format!("$GPGGA,{i:06}\r\n");
            while w.write(line.as_bytes()) == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    });

    let mut got = String::new();
    let mut buf = [0u8; 256];
    for _ in 0..10_000 {
        let n = s.read(&mut buf);
        got.push_str(&String::from_utf8_lossy(&buf[..n]));
        if got.matches("\r\n").count() >= 100 {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    writer.join().unwrap();
    assert!(got.starts_with("$GPGGA,000000\r\n"));
    assert!(got.ends_with("$GPGGA,000099\r\n"));
    assert_eq!(got.matches("\r\n").count(), 100);
}
