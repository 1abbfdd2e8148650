//! Troposphere: Saastamoinen zenith model and Niell mapping functions.

use crate::constants::{PI, R2D};
use crate::time::{time2doy, GTime};

/// Saastamoinen model error (m).
const ERR_SAAS: f64 = 0.3;

/// Relative humidity assumed by the zenith model.
pub const REL_HUMI: f64 = 0.7;

fn sqr(x: f64) -> f64 {
    x * x
}

/// Saastamoinen troposphere model with the standard atmosphere.
///
/// `pos` geodetic (rad, rad, m), `humi` relative humidity (0 disables
/// the wet part). Returns the slant delay (m) and its variance; zero
/// outside -100 m..10 km height or below the horizon.
pub fn tropmodel(_time: GTime, pos: &[f64; 3], azel: &[f64; 2], humi: f64) -> (f64, f64) {
    const TEMP0: f64 = 15.0; // sea level temperature (C)
    if pos[2] < -100.0 || pos[2] > 1E4 || azel[1] <= 0.0 {
        return (0.0, 0.0);
    }
    let hgt = pos[2].max(0.0);

    // standard atmosphere
    let pres = 1013.25 * (1.0 - 2.2557E-5 * hgt).powf(5.2568);
    let temp = TEMP0 - 6.5E-3 * hgt + 273.16;
    let e = 6.108 * humi * ((17.15 * temp - 4684.0) / (temp - 38.45)).exp();

    let z = PI / 2.0 - azel[1];
    let trph =
        0.0022768 * pres / (1.0 - 0.00266 * (2.0 * pos[0]).cos() - 0.00028 * hgt / 1E3) / z.cos();
    let trpw = 0.002277 * (1255.0 / temp + 0.05) * e / z.cos();

    let var = sqr(ERR_SAAS / (azel[1].sin() + 0.1));
    (trph + trpw, var)
}

// Niell coefficients per 15 degree latitude band (15..75)
#[rustfmt::skip]
const COEF: [[f64; 5]; 9] = [
    [1.2769934E-3, 1.2683230E-3, 1.2465397E-3, 1.2196049E-3, 1.2045996E-3],
    [2.9153695E-3, 2.9152299E-3, 2.9288445E-3, 2.9022565E-3, 2.9024912E-3],
    [62.610505E-3, 62.837393E-3, 63.721774E-3, 63.824265E-3, 64.258455E-3],

    [0.0000000E-0, 1.2709626E-5, 2.6523662E-5, 3.4000452E-5, 4.1202191E-5],
    [0.0000000E-0, 2.1414979E-5, 3.0160779E-5, 7.2562722E-5, 11.723375E-5],
    [0.0000000E-0, 9.0128400E-5, 4.3497037E-5, 84.795348E-5, 170.37206E-5],

    [5.8021897E-4, 5.6794847E-4, 5.8118019E-4, 5.9727542E-4, 6.1641693E-4],
    [1.4275268E-3, 1.5138625E-3, 1.4572752E-3, 1.5007428E-3, 1.7599082E-3],
    [4.3472961E-2, 4.6729510E-2, 4.3908931E-2, 4.4626982E-2, 5.4736038E-2],
];

// dry mapping height correction
const AHT: [f64; 3] = [2.53E-5, 5.49E-3, 1.14E-3];

// continued fraction form of the mapping function
fn mapf(el: f64, a: f64, b: f64, c: f64) -> f64 {
    let sinel = el.sin();
    (1.0 + a / (1.0 + b / (1.0 + c))) / (sinel + a / (sinel + b / (sinel + c)))
}

// latitude band interpolation, clamped at the 15/75 degree edges
fn interpc(coef: &[f64; 5], lat: f64) -> f64 {
    let i = (lat / 15.0).floor() as i64;
    if i < 1 {
        return coef[0];
    }
    if i > 4 {
        return coef[4];
    }
    let i = i as usize;
    coef[i - 1] * (1.0 - lat / 15.0 + i as f64) + coef[i] * (lat / 15.0 - i as f64)
}

/// Niell mapping functions.
///
/// Returns `(dry, wet)` mapping factors; the dry factor carries the
/// ellipsoidal height correction. Zero outside -1 km..20 km height or
/// below the horizon.
pub fn tropmapf(time: GTime, pos: &[f64; 3], azel: &[f64; 2]) -> (f64, f64) {
    if pos[2] < -1E3 || pos[2] > 20E3 || azel[1] <= 0.0 {
        return (0.0, 0.0);
    }
    let el = azel[1];
    let lat = pos[0] * R2D;
    let hgt = pos[2];

    // annual phase from doy 28, southern hemisphere shifted half a year
    let y = (time2doy(time) - 28.0) / 365.25 + if lat < 0.0 { 0.5 } else { 0.0 };
    let cosy = (2.0 * PI * y).cos();
    let lat = lat.abs();

    let mut ah = [0.0; 3];
    let mut aw = [0.0; 3];
    for i in 0..3 {
        ah[i] = interpc(&COEF[i], lat) - interpc(&COEF[i + 3], lat) * cosy;
        aw[i] = interpc(&COEF[i + 6], lat);
    }
    let dm = (1.0 / el.sin() - mapf(el, AHT[0], AHT[1], AHT[2])) * hgt / 1E3;
    (mapf(el, ah[0], ah[1], ah[2]) + dm, mapf(el, aw[0], aw[1], aw[2]))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::D2R;
    use crate::time::epoch2time;

    #[test]
    fn zenith_delay_near_2_4_meters_at_sea_level() {
        let t = epoch2time(&[2023.0, 6.0, 1.0, 0.0, 0.0, 0.0]);
        let pos = [45.0 * D2R, 10.0 * D2R, 0.0];
        let (zen, var) = tropmodel(t, &pos, &[0.0, PI / 2.0], REL_HUMI);
        assert!(zen > 2.3 && zen < 2.6, "ztd {zen}");
        assert!(var > 0.0);
    }

    #[test]
    fn delay_decreases_with_height() {
        let t = epoch2time(&[2023.0, 6.0, 1.0, 0.0, 0.0, 0.0]);
        let azel = [0.0, PI / 2.0];
        let (z0, _) = tropmodel(t, &[45.0 * D2R, 10.0 * D2R, 0.0], &azel, REL_HUMI);
        let (z3, _) = tropmodel(t, &[45.0 * D2R, 10.0 * D2R, 3000.0], &azel, REL_HUMI);
        assert!(z3 < z0);
        // out of model range
        assert_eq!(
            tropmodel(t, &[45.0 * D2R, 10.0 * D2R, 2E4], &azel, REL_HUMI),
            (0.0, 0.0)
        );
    }

    #[test]
    fn mapping_is_one_at_zenith_and_grows_down() {
        let t = epoch2time(&[2023.0, 6.0, 1.0, 0.0, 0.0, 0.0]);
        let pos = [45.0 * D2R, 10.0 * D2R, 100.0];
        let (mh90, mw90) = tropmapf(t, &pos, &[0.0, PI / 2.0]);
        assert!((mh90 - 1.0).abs() < 0.01, "dry {mh90}");
        assert!((mw90 - 1.0).abs() < 0.01);
        let (mh10, mw10) = tropmapf(t, &pos, &[0.0, 10.0 * D2R]);
        // close to the secant of the zenith angle
        assert!(mh10 > 5.0 && mh10 < 6.2, "dry@10 {mh10}");
        assert!(mw10 > 5.0 && mw10 < 6.2);
    }

    #[test]
    fn seasonal_term_changes_dry_mapping() {
        let pos = [45.0 * D2R, 10.0 * D2R, 100.0];
        let azel = [0.0, 10.0 * D2R];
        let (mh_w, _) = tropmapf(epoch2time(&[2023.0, 1.0, 28.0, 0.0, 0.0, 0.0]), &pos, &azel);
        let (mh_s, _) = tropmapf(epoch2time(&[2023.0, 7.0, 28.0, 0.0, 0.0, 0.0]), &pos, &azel);
        assert!((mh_w - mh_s).abs() > 1E-4);
    }
}
