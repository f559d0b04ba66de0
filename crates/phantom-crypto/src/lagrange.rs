//! Lagrange coefficients at zero for a set of 1-based share indices.
//!
//! `λ_i = Π_{j≠i} j / (j - i)`. The common-denominator form keeps it to one
//! field inversion per call: with `d_i = i·Π_{j≠i}(j - i)` every
//! coefficient is `(Π j)·(Π_{j≠i} d_j) / Π d_j`.

use curve25519_dalek::scalar::Scalar;

use crate::error::{CryptoError, Result};

pub fn coefficients_at_zero(indices: &[u32]) -> Result<Vec<Scalar>> {
    if indices.is_empty() {
        return Err(CryptoError::InsufficientShares { have: 0, need: 1 });
    }
    if let Some(&zero) = indices.iter().find(|&&i| i == 0) {
        return Err(CryptoError::InvalidShareIndex(zero));
    }
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(CryptoError::DuplicateShareIndex(w[0]));
    }
    if indices.len() == 1 {
        return Ok(vec![Scalar::ONE]);
    }

    let xs: Vec<Scalar> = indices.iter().map(|&i| Scalar::from(i)).collect();
    let xi: Scalar = xs.iter().product();

    let d: Vec<Scalar> = xs
        .iter()
        .enumerate()
        .map(|(i, x_i)| {
            xs.iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(*x_i, |acc, (_, x_j)| acc * (x_j - x_i))
        })
        .collect();

    // prefix[i] = Π_{j<i} d_j, then fold in the suffix products.
    let mut rho = vec![Scalar::ONE; d.len()];
    for i in 1..d.len() {
        rho[i] = rho[i - 1] * d[i - 1];
    }
    let mut suffix = Scalar::ONE;
    for i in (0..d.len()).rev() {
        rho[i] *= suffix;
        suffix *= d[i];
    }

    let delta = xi * suffix.invert();
    Ok(rho.into_iter().map(|r| delta * r).collect())
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    fn naive(indices: &[u32]) -> Vec<Scalar> {
        indices
            .iter()
            .map(|&i| {
                let xi = Scalar::from(i);
                indices
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| {
                        let xj = Scalar::from(j);
                        xj * (xj - xi).invert()
                    })
                    .product()
            })
            .collect()
    }

    #[test]
    fn matches_naive_formula() {
        for set in [vec![1, 2, 3], vec![2, 4, 5], vec![1, 5], vec![3, 1, 4, 2, 5]] {
            assert_eq!(coefficients_at_zero(&set).unwrap(), naive(&set));
        }
    }

    #[test]
    fn interpolates_constant_term() {
        // f(x) = a0 + a1 x + a2 x^2
        let a: Vec<Scalar> = (0..3).map(|_| Scalar::random(&mut OsRng)).collect();
        let f = |x: u32| {
            let x = Scalar::from(x);
            a[0] + a[1] * x + a[2] * x * x
        };
        let idx = [2u32, 3, 5];
        let lambdas = coefficients_at_zero(&idx).unwrap();
        let recovered: Scalar = idx.iter().zip(&lambdas).map(|(&i, l)| f(i) * l).sum();
        assert_eq!(recovered, a[0]);
    }

    #[test]
    fn rejects_bad_index_sets() {
        assert!(coefficients_at_zero(&[]).is_err());
        assert_eq!(
            coefficients_at_zero(&[0, 1]),
            Err(CryptoError::InvalidShareIndex(0))
        );
        assert_eq!(
            coefficients_at_zero(&[1, 2, 2]),
            Err(CryptoError::DuplicateShareIndex(2))
        );
    }
}
