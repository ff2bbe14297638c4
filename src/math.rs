use num_complex::Complex64;
use sprs::CsMat;

pub const J: Complex64 = Complex64 { re: 0.0, im: 1.0 };

#[macro_export]
macro_rules! cmplx {
    () => {
        num_complex::Complex64::new(0.0, 0.0)
    };
    ($arg1:expr) => {
        num_complex::Complex64::new($arg1, 0.0)
    };
    ($arg1:expr, $arg2:expr) => {
        num_complex::Complex64::new($arg1, $arg2)
    };
}

/// Returns element `(i, j)` of a sparse matrix, zero if not stored.
pub fn entry<T: Copy + Default>(mat: &CsMat<T>, i: usize, j: usize) -> T {
    mat.get(i, j).copied().unwrap_or_default()
}

/// Computes the infinity norm: `max(abs(a))`.
pub fn norm_inf(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |max, v| f64::max(max, v.abs()))
}
