//! Integer ambiguity resolution hook.
//!
//! PPP ambiguities absorb receiver and satellite phase biases, so fixing
//! them to integers needs external products or a network solution. The
//! estimator only defines the seam: after every successful float update
//! it hands the filter to an [AmbiguityResolver], and accepts the fixed
//! states when the resolver reports success and the fixed position is
//! tight enough.

use super::Rtk;
use crate::nav::Nav;
use crate::obs::ObsData;

/// Resolves carrier phase ambiguities on top of the float filter.
///
/// On success the implementation fills `rtk.xa`/`rtk.pa` with the fixed
/// states and covariance and returns `true`. The float states in
/// `rtk.x`/`rtk.p` must not be touched unless the resolver implements
/// fix-and-hold, in which case it may feed the fixed ambiguities back as
/// tight pseudo-measurements.
pub trait AmbiguityResolver {
    fn resolve(&mut self, rtk: &mut Rtk, obs: &[ObsData], nav: &Nav) -> bool;
}

/// Float-only operation: never resolves.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoOpResolver;

impl AmbiguityResolver for NoOpResolver {
    fn resolve(&mut self, _rtk: &mut Rtk, _obs: &[ObsData], _nav: &Nav) -> bool {
        false
    }
}
