// Scalar reference kernels shared by the f32 and f64 paths of CpuBackend.

use num_traits::{AsPrimitive, Float};

use crate::backend::MatmulDims;

const GELU_COEFF: f64 = 0.044715;
// sqrt(2 / pi)
const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;

/// Row-major `a[m, k] @ b[k, n]`.
pub(crate) fn gemm<T: Float>(a: &[T], b: &[T], dims: MatmulDims) -> Vec<T> {
    let MatmulDims { m, k, n } = dims;
    let mut c = vec![T::zero(); m * n];
    for i in 0..m {
        let row_c = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let row_b = &b[p * n..(p + 1) * n];
            for (c_ij, &b_pj) in row_c.iter_mut().zip(row_b) {
                *c_ij = *c_ij + a_ip * b_pj;
            }
        }
    }
    c
}

/// Add `bias[i]` to every element of row `i`.
pub(crate) fn add_row_bias<T: Float>(x: &mut [T], bias: &[T], n: usize) {
    if n == 0 {
        return;
    }
    for (row, &b) in x.chunks_mut(n).zip(bias) {
        for v in row {
            *v = *v + b;
        }
    }
}

pub(crate) fn relu<T: Float>(x: T) -> T {
    x.max(T::zero())
}

/// Tanh approximation of GELU.
pub(crate) fn gelu<T>(x: T) -> T
where
    T: Float + 'static,
    f64: AsPrimitive<T>,
{
    let half: T = 0.5f64.as_();
    let c: T = SQRT_2_OVER_PI.as_();
    let coeff: T = GELU_COEFF.as_();
    let u = c * (x + coeff * x * x * x);
    half * x * (T::one() + u.tanh())
}

/// Derivative of [`gelu`] with respect to its input.
pub(crate) fn gelu_grad<T>(x: T) -> T
where
    T: Float + 'static,
    f64: AsPrimitive<T>,
{
    let half: T = 0.5f64.as_();
    let three: T = 3.0f64.as_();
    let c: T = SQRT_2_OVER_PI.as_();
    let coeff: T = GELU_COEFF.as_();
    let t = (c * (x + coeff * x * x * x)).tanh();
    let du = c * (T::one() + three * coeff * x * x);
    half * (T::one() + t) + half * x * (T::one() - t * t) * du
}

/// Sum each row of a row-major `[rows, cols]` matrix.
pub(crate) fn row_sums<T: Float>(x: &[T], rows: usize, cols: usize) -> Vec<T> {
    if cols == 0 {
        return vec![T::zero(); rows];
    }
    x.chunks(cols)
        .map(|row| row.iter().fold(T::zero(), |acc, &v| acc + v))
        .collect()
}

/// Sum each column of a row-major `[rows, cols]` matrix.
pub(crate) fn col_sums<T: Float>(x: &[T], cols: usize) -> Vec<T> {
    let mut sums = vec![T::zero(); cols];
    if cols == 0 {
        return sums;
    }
    for row in x.chunks(cols) {
        for (s, &v) in sums.iter_mut().zip(row) {
            *s = *s + v;
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gemm_basic() {
        // [1,2;3,4] @ [5,6;7,8] = [19,22;43,50]
        let c = gemm(
            &[1.0f32, 2.0, 3.0, 4.0],
            &[5.0, 6.0, 7.0, 8.0],
            MatmulDims { m: 2, k: 2, n: 2 },
        );
        assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_gemm_rectangular() {
        // [1,2,3] @ [1;1;1] = [6]
        let c = gemm(&[1.0f64, 2.0, 3.0], &[1.0, 1.0, 1.0], MatmulDims { m: 1, k: 3, n: 1 });
        assert_eq!(c, vec![6.0]);
    }

    #[test]
    fn test_add_row_bias() {
        let mut x = vec![0.0f64; 6];
        add_row_bias(&mut x, &[1.0, 2.0], 3);
        assert_eq!(x, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_gelu_values() {
        assert_relative_eq!(gelu(0.0f64), 0.0);
        // tanh approximation of GELU(1)
        assert_relative_eq!(gelu(1.0f64), 0.841_191_990_608_276_8, epsilon = 1e-12);
        assert!(gelu(-10.0f32).abs() < 1e-6);
    }

    #[test]
    fn test_gelu_grad_matches_finite_difference() {
        for &x in &[-2.0f64, -0.5, 0.0, 0.3, 1.7] {
            let h = 1e-6;
            let fd = (gelu(x + h) - gelu(x - h)) / (2.0 * h);
            assert_relative_eq!(gelu_grad(x), fd, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_gelu_f32_tracks_f64() {
        for &x in &[-3.0f32, -1.0, 0.25, 2.0] {
            assert_relative_eq!(gelu(x) as f64, gelu(x as f64), epsilon = 1e-6);
            assert_relative_eq!(gelu_grad(x) as f64, gelu_grad(x as f64), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_relu() {
        assert_eq!(relu(-1.5f32), 0.0);
        assert_eq!(relu(2.5f32), 2.5);
    }

    #[test]
    fn test_sums() {
        let x = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(row_sums(&x, 2, 3), vec![6.0, 15.0]);
        assert_eq!(row_sums::<f32>(&[], 2, 0), vec![0.0, 0.0]);
        assert_eq!(col_sums(&x, 3), vec![5.0, 7.0, 9.0]);
    }
}
