//! Atmospheric delay models.
//!
//! Each model returns a `(delay, variance)` pair in meters; the
//! estimator consumes both sides.

pub mod iono;
pub mod tropo;

pub use iono::{ionmapf, ionmodel, ionppp, iontec};
pub use tropo::{tropmapf, tropmodel};
