//! Physical constants shared by the positioning engine.

/// Speed of light in m.s⁻¹
pub const CLIGHT: f64 = 299792458.0;

/// Earth angular velocity, in WGS84 frame rad/s
pub const OMGE: f64 = 7.2921151467E-5;

/// Earth angular velocity, GLONASS PZ-90 frame rad/s
pub const OMGE_GLO: f64 = 7.292115E-5;

/// Earth angular velocity, BDS BDC frame rad/s
pub const OMGE_CMP: f64 = 7.292115E-5;

/// Earth angular velocity, Galileo GTRF frame rad/s
pub const OMGE_GAL: f64 = 7.2921151467E-5;

/// Earth gravitational constant (m³ s⁻²), IS-GPS-200 value
pub const MU_GPS: f64 = 3.9860050E14;

/// Earth gravitational constant (m³ s⁻²), PZ-90 value
pub const MU_GLO: f64 = 3.9860044E14;

/// Earth gravitational constant (m³ s⁻²), Galileo OS-SIS-ICD value
pub const MU_GAL: f64 = 3.986004418E14;

/// Earth gravitational constant (m³ s⁻²), BDS-SIS-ICD value
pub const MU_CMP: f64 = 3.986004418E14;

/// Sun gravitational constant (m³ s⁻²)
pub const MU_SUN: f64 = 1.32712440018E20;

/// Moon gravitational constant (m³ s⁻²)
pub const MU_MOON: f64 = 4.902801E12;

/// WGS84 ellipsoid semi-major axis (m)
pub const RE_WGS84: f64 = 6378137.0;

/// WGS84 ellipsoid flattening
pub const FE_WGS84: f64 = 1.0 / 298.257223563;

/// GLONASS PZ-90 ellipsoid semi-major axis (m)
pub const RE_GLO: f64 = 6378136.0;

/// GLONASS J2 zonal harmonic coefficient
pub const J2_GLO: f64 = 1.0826257E-3;

/// Astronomical unit (m)
pub const AU: f64 = 149597870691.0;

/// Sun radius (m)
pub const RE_SUN: f64 = 696000E3;

/// π
pub const PI: f64 = core::f64::consts::PI;

/// Arc seconds to radians
pub const AS2R: f64 = core::f64::consts::PI / 180.0 / 3600.0;

/// Degrees to radians
pub const D2R: f64 = core::f64::consts::PI / 180.0;

/// Radians to degrees
pub const R2D: f64 = 180.0 / core::f64::consts::PI;

/// L1/E1/B1C carrier frequency (Hz)
pub const FREQ1: f64 = 1.57542E9;

/// L2 carrier frequency (Hz)
pub const FREQ2: f64 = 1.22760E9;

/// L5/E5a/B2a carrier frequency (Hz)
pub const FREQ5: f64 = 1.17645E9;

/// E6/L6 carrier frequency (Hz)
pub const FREQ6: f64 = 1.27875E9;

/// E5b/B2b carrier frequency (Hz)
pub const FREQ7: f64 = 1.20714E9;

/// E5a+b carrier frequency (Hz)
pub const FREQ8: f64 = 1.191795E9;

/// S-band (IRNSS SPS) carrier frequency (Hz)
pub const FREQ9: f64 = 2.492028E9;

/// GLONASS G1 base frequency (Hz)
pub const FREQ1_GLO: f64 = 1.60200E9;

/// GLONASS G1 FDMA channel spacing (Hz)
pub const DFRQ1_GLO: f64 = 0.56250E6;

/// GLONASS G2 base frequency (Hz)
pub const FREQ2_GLO: f64 = 1.24600E9;

/// GLONASS G2 FDMA channel spacing (Hz)
pub const DFRQ2_GLO: f64 = 0.43750E6;

/// GLONASS G3 CDMA frequency (Hz)
pub const FREQ3_GLO: f64 = 1.202025E9;

/// BDS B1I carrier frequency (Hz)
pub const FREQ1_CMP: f64 = 1.561098E9;

/// BDS B2I/B2b carrier frequency (Hz)
pub const FREQ2_CMP: f64 = 1.20714E9;

/// BDS B3I carrier frequency (Hz)
pub const FREQ3_CMP: f64 = 1.26852E9;

/// Error floor of GLONASS broadcast ephemeris (m)
pub const ERREPH_GLO: f64 = 5.0;

/// Std deviation of broadcast clock when precise clock is unavailable (m)
pub const STD_BRDCCLK: f64 = 30.0;

/// Std deviation of Galileo ephemeris when SISA is unavailable (m)
pub const STD_GAL_NAPA: f64 = 500.0;

/// Maximum satellite position variance accepted by the estimator (m²)
pub const MAX_VAR_EPH: f64 = 300.0 * 300.0;
