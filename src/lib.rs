#![doc = include_str!("../README.md")]

pub mod antenna;
pub mod bias;
pub mod config;
pub mod constants;
pub mod coords;
pub mod ephemeris;
pub mod error;
pub mod gpx;
pub mod matrix;
pub mod nav;
pub mod obs;
pub mod ppp;
pub mod signal;
pub mod solution;
pub mod stream;
pub mod sv;
pub mod tides;
pub mod time;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::config::{ArMode, Config, EphOpt, IonoOpt, Mode, TropOpt};
    pub use crate::ephemeris::{satpos, satposs, SatPos};
    pub use crate::error::Error;
    pub use crate::gpx::{convgpx, sol2gpx, GpxOpt};
    pub use crate::nav::Nav;
    pub use crate::obs::ObsData;
    pub use crate::ppp::{pppos, AmbiguityResolver, NoOpResolver, Rtk, SSat};
    pub use crate::signal::{Code, NFREQ};
    pub use crate::solution::{outsol, outsolhead, Sol, SolBuf, SolFormat, SolOpt, SolStatus};
    pub use crate::stream::{
        reppath, strsetopt, strsync, Stream, StreamKind, StreamMode, StreamOpts, StreamState,
    };
    pub use crate::sv::{satno, satsys, Sys};
    pub use crate::time::{epoch2time, gpst2time, time2gpst, timeadd, timediff, GTime};
    // re-export
    pub use nalgebra::Vector3;
}

// pub export
pub use error::Error;
