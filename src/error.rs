use thiserror::Error;

/// Crate wide error taxonomy. Per-satellite faults are absorbed by the
/// estimator (the satellite is excluded), per-epoch faults surface as a
/// [crate::solution::SolStatus::None] solution, I/O faults live in the
/// stream status word. Only configuration faults propagate out of `open`.
#[derive(Debug, Error)]
pub enum Error {
    /// Byte stream did not parse as the expected format.
    #[error("format error: {0}")]
    MalformedInput(String),

    /// No ephemeris / observation / correction for this satellite.
    #[error("missing data for sat {0}")]
    MissingData(u8),

    /// Kepler iteration overflow or a non normalizable vector.
    #[error("orbit integration fault")]
    IntegrationFault,

    /// Matrix inversion failed inside the measurement update.
    #[error("failed to invert matrix")]
    MatrixInversion,

    /// Matrix operands do not line up.
    #[error("internal error: invalid matrix setup")]
    MatrixDimension,

    /// Least squares requires at least as many rows as unknowns.
    #[error("not enough rows to form least squares")]
    LsqUnderdetermined,

    /// The EKF aborted; prior state is kept and the epoch is marked invalid.
    #[error("filter fault: {0}")]
    FilterFault(String),

    /// Too few valid measurement rows survived screening.
    #[error("not enough valid observations ({0})")]
    NotEnoughObservations(usize),

    /// Socket or file error; the stream enters the error state and
    /// reconnects where the transport supports it.
    #[error("stream i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// Unresolvable host, bad path or unknown option. Returned from `open`,
    /// never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serial port layer error.
    #[error("serial port failure: {0}")]
    Serial(#[from] serialport::Error),

    /// Invalid satellite identifier or observation code.
    #[error("invalid id: {0}")]
    InvalidId(String),
}

impl Error {
    /// Build a [Error::Configuration] from anything printable.
    pub(crate) fn config<T: std::fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }
}
