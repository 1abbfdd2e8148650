//! Linear algebra kernel.
//!
//! Thin layer over [nalgebra] dynamic matrices: least squares, the EKF
//! measurement update in compressed state space, and the forward/backward
//! smoother combination. Matrices are owned values; none of these
//! functions alias their operands.

use crate::error::Error;
use nalgebra::{DMatrix, DVector};

/// Matrix inverse, [Error::MatrixInversion] when singular.
pub fn matinv(a: &DMatrix<f64>) -> Result<DMatrix<f64>, Error> {
    a.clone().try_inverse().ok_or(Error::MatrixInversion)
}

/// Least squares `min ‖y − A·x‖`: returns the estimate and its cofactor
/// `Q = (AᵀA)⁻¹`. `A` is `m×n` with `m >= n`.
pub fn lsq(a: &DMatrix<f64>, y: &DVector<f64>) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
    if a.nrows() != y.len() {
        return Err(Error::MatrixDimension);
    }
    if a.nrows() < a.ncols() {
        return Err(Error::LsqUnderdetermined);
    }
    let at = a.transpose();
    let q = matinv(&(&at * a))?;
    let x = &q * (&at * y);
    Ok((x, q))
}

/// Indices of states currently present in the filter: nonzero value and
/// positive diagonal variance.
pub fn active_states(x: &DVector<f64>, p: &DMatrix<f64>) -> Vec<usize> {
    (0..x.len())
        .filter(|&i| x[i] != 0.0 && p[(i, i)] > 0.0)
        .collect()
}

/// EKF measurement update in compressed state space.
///
/// `x` (n), `P` (n×n) are updated in place from innovations `v` (m),
/// design matrix `H` (m×n) and measurement covariance `R` (m×m). Only the
/// active states (see [active_states]) take part; the rest keep their
/// prior. The posterior covariance is re-symmetrized.
pub fn filter(
    x: &mut DVector<f64>,
    p: &mut DMatrix<f64>,
    h: &DMatrix<f64>,
    v: &DVector<f64>,
    r: &DMatrix<f64>,
) -> Result<(), Error> {
    let n = x.len();
    let m = v.len();
    if h.nrows() != m || h.ncols() != n || p.nrows() != n || r.nrows() != m {
        return Err(Error::MatrixDimension);
    }
    let ix = active_states(x, p);
    let k = ix.len();
    if k == 0 {
        return Err(Error::FilterFault("no active states".into()));
    }
    let x_ = DVector::from_fn(k, |i, _| x[ix[i]]);
    let p_ = DMatrix::from_fn(k, k, |i, j| p[(ix[i], ix[j])]);
    let h_ = DMatrix::from_fn(m, k, |i, j| h[(i, ix[j])]);

    let ht = h_.transpose();
    let s = &h_ * &p_ * &ht + r;
    let s_inv = s.try_inverse().ok_or(Error::MatrixInversion)?;
    let gain = &p_ * &ht * s_inv;

    let xp = &x_ + &gain * v;
    let mut pp = &p_ - &gain * &h_ * &p_;
    // enforce symmetry lost to rounding
    pp = (&pp + pp.transpose()) * 0.5;

    for (i, &si) in ix.iter().enumerate() {
        x[si] = xp[i];
        for (j, &sj) in ix.iter().enumerate() {
            p[(si, sj)] = pp[(i, j)];
        }
    }
    Ok(())
}

/// Fixed-interval smoother combining a forward and a backward solution:
/// `xs = Qs·(Qf⁻¹·xf + Qb⁻¹·xb)`, `Qs = (Qf⁻¹ + Qb⁻¹)⁻¹`.
pub fn smoother(
    xf: &DVector<f64>,
    qf: &DMatrix<f64>,
    xb: &DVector<f64>,
    qb: &DMatrix<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
    let inv_f = matinv(qf)?;
    let inv_b = matinv(qb)?;
    let qs = matinv(&(&inv_f + &inv_b))?;
    let xs = &qs * (&inv_f * xf + &inv_b * xb);
    Ok((xs, qs))
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn inverse_round_trip() {
        let mut rng = SmallRng::seed_from_u64(7);
        let n = 6;
        // diagonally dominant, always well conditioned
        let a = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                10.0 + rng.random::<f64>()
            } else {
                rng.random::<f64>() - 0.5
            }
        });
        let back = matinv(&matinv(&a).unwrap()).unwrap();
        assert!((&back - &a).amax() < 1E-10);
    }

    #[test]
    fn lsq_exact_fit() {
        // y = 2 + 3 t, noiseless
        let t: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let a = DMatrix::from_fn(5, 2, |i, j| if j == 0 { 1.0 } else { t[i] });
        let y = DVector::from_fn(5, |i, _| 2.0 + 3.0 * t[i]);
        let (x, _) = lsq(&a, &y).unwrap();
        assert!((x[0] - 2.0).abs() < 1E-12);
        assert!((x[1] - 3.0).abs() < 1E-12);
    }

    #[test]
    fn lsq_underdetermined() {
        let a = DMatrix::zeros(2, 3);
        let y = DVector::zeros(2);
        assert!(matches!(lsq(&a, &y), Err(Error::LsqUnderdetermined)));
    }

    #[test]
    fn filter_updates_only_active_states() {
        let mut x = DVector::from_vec(vec![1.0, 0.0, 2.0]);
        let mut p = DMatrix::from_diagonal(&DVector::from_vec(vec![100.0, 0.0, 100.0]));
        // one measurement of state 0
        let h = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        let v = DVector::from_vec(vec![0.5]);
        let r = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0]));
        filter(&mut x, &mut p, &h, &v, &r).unwrap();
        assert!(x[0] > 1.0);
        assert_eq!(x[1], 0.0); // never introduced
        assert_eq!(x[2], 2.0);
        assert!(p[(0, 0)] < 100.0);
    }

    #[test]
    fn covariance_stays_symmetric() {
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 8;
        let m = 12;
        let mut x = DVector::from_fn(n, |_, _| 1.0 + rng.random::<f64>());
        let s = DMatrix::from_fn(n, n, |_, _| rng.random::<f64>() - 0.5);
        let mut p = &s * s.transpose() + DMatrix::<f64>::identity(n, n) * 10.0;
        let h = DMatrix::from_fn(m, n, |_, _| rng.random::<f64>() - 0.5);
        let v = DVector::from_fn(m, |_, _| rng.random::<f64>() - 0.5);
        let r = DMatrix::<f64>::identity(m, m) * 2.0;
        filter(&mut x, &mut p, &h, &v, &r).unwrap();

        let asym = (&p - p.transpose()).amax();
        assert!(asym / p.trace() < 1E-12, "asymmetry {asym}");
    }

    #[test]
    fn smoother_combines_information() {
        let xf = DVector::from_vec(vec![1.0]);
        let qf = DMatrix::from_vec(1, 1, vec![2.0]);
        let xb = DVector::from_vec(vec![3.0]);
        let qb = DMatrix::from_vec(1, 1, vec![2.0]);
        let (xs, qs) = smoother(&xf, &qf, &xb, &qb).unwrap();
        assert!((xs[0] - 2.0).abs() < 1E-12);
        assert!((qs[(0, 0)] - 1.0).abs() < 1E-12);
    }
}
