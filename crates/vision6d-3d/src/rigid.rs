//! Rigid alignment utilities (Kabsch / Umeyama)

use glam::{DMat3, DVec3};
use nalgebra::Matrix3;
use thiserror::Error;

/// Error type for Umeyama rigid alignment operations.
#[derive(Debug, Error, PartialEq)]
pub enum UmeyamaError {
    /// Source and destination arrays must have the same length
    #[error("Source ({0}) and destination ({1}) arrays must have the same length")]
    MismatchedInputLengths(usize, usize),

    /// At least one point pair is needed
    #[error("Cannot align empty point sets")]
    EmptyInput,

    /// The SVD of the cross-covariance did not produce U and V
    #[error("SVD of the cross-covariance failed")]
    SvdFailed,
}

/// Umeyama/Kabsch algorithm without scale.
///
/// Returns `(R, t)` minimizing `Σ ||dst_i - (R src_i + t)||²` with `det(R) = +1`.
pub fn umeyama(src: &[DVec3], dst: &[DVec3]) -> Result<(DMat3, DVec3), UmeyamaError> {
    if src.len() != dst.len() {
        return Err(UmeyamaError::MismatchedInputLengths(src.len(), dst.len()));
    }
    if src.is_empty() {
        return Err(UmeyamaError::EmptyInput);
    }
    let n = src.len() as f64;

    let mu_s = src.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;
    let mu_d = dst.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;

    // H[row][col] += Dest[row] * Source[col]
    let mut h = Matrix3::<f64>::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        let sc = *s - mu_s;
        let dc = *d - mu_d;
        for r in 0..3 {
            for c in 0..3 {
                h[(r, c)] += dc[r] * sc[c];
            }
        }
    }
    h /= n;

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(UmeyamaError::SvdFailed),
    };

    let d = (u * v_t).determinant();
    let r_na = if d < 0.0 {
        // Handle Reflection: flip the axis of the smallest singular value
        let smallest = svd.singular_values.imin();
        let mut diag = nalgebra::Vector3::new(1.0, 1.0, 1.0);
        diag[smallest] = -1.0;
        let correction = Matrix3::from_diagonal(&diag);
        u * correction * v_t
    } else {
        u * v_t
    };

    let r = DMat3::from_cols_array(&[
        r_na[(0, 0)],
        r_na[(1, 0)],
        r_na[(2, 0)],
        r_na[(0, 1)],
        r_na[(1, 1)],
        r_na[(2, 1)],
        r_na[(0, 2)],
        r_na[(1, 2)],
        r_na[(2, 2)],
    ]);
    let t = mu_d - r * mu_s;
    Ok((r, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::so3::SO3;

    #[test]
    fn test_umeyama_recovers_transform() -> Result<(), UmeyamaError> {
        let r_true = SO3::exp(DVec3::new(0.2, -0.4, 0.7)).matrix();
        let t_true = DVec3::new(1.0, -2.0, 3.0);
        let src = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(0.5, 0.3, -0.2),
        ];
        let dst: Vec<DVec3> = src.iter().map(|&p| r_true * p + t_true).collect();
        let (r, t) = umeyama(&src, &dst)?;
        assert!(r.abs_diff_eq(r_true, 1e-9));
        assert!(t.abs_diff_eq(t_true, 1e-9));
        Ok(())
    }

    #[test]
    fn test_umeyama_errors() {
        assert_eq!(
            umeyama(&[DVec3::ZERO], &[]),
            Err(UmeyamaError::MismatchedInputLengths(1, 0))
        );
        assert_eq!(umeyama(&[], &[]), Err(UmeyamaError::EmptyInput));
    }
}
