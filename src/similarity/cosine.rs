//! Cosine and Pearson similarity, both clamped at 0

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
#[cfg(target_arch = "x86_64")]
use std::sync::OnceLock;

use super::Scalar;

#[cfg(target_arch = "x86_64")]
static HAS_AVX2_FMA: OnceLock<bool> = OnceLock::new();

#[cfg(target_arch = "x86_64")]
fn has_avx2_fma() -> bool {
    *HAS_AVX2_FMA.get_or_init(|| is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma"))
}

/// `(dot, |a|², |b|²)` for f32 vectors of equal length.
#[inline]
fn dot_and_norms_f32(a: &[f32], b: &[f32]) -> (f64, f64, f64) {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if has_avx2_fma() && a.len() >= 8 {
            return unsafe { dot_and_norms_avx2(a, b) };
        }
    }
    dot_and_norms(a, b)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn dot_and_norms_avx2(a: &[f32], b: &[f32]) -> (f64, f64, f64) {
    use super::euclidean::horizontal_sum_avx2;

    let n = a.len();
    let chunks = n / 8;
    let mut dot = _mm256_setzero_ps();
    let mut norm_a = _mm256_setzero_ps();
    let mut norm_b = _mm256_setzero_ps();

    for i in 0..chunks {
        let offset = i * 8;
        let a_vec = _mm256_loadu_ps(a.as_ptr().add(offset));
        let b_vec = _mm256_loadu_ps(b.as_ptr().add(offset));
        // FMA 累加点积与范数
        dot = _mm256_fmadd_ps(a_vec, b_vec, dot);
        norm_a = _mm256_fmadd_ps(a_vec, a_vec, norm_a);
        norm_b = _mm256_fmadd_ps(b_vec, b_vec, norm_b);
    }

    let mut dot = horizontal_sum_avx2(dot) as f64;
    let mut norm_a = horizontal_sum_avx2(norm_a) as f64;
    let mut norm_b = horizontal_sum_avx2(norm_b) as f64;
    for i in chunks * 8..n {
        let (x, y) = (a[i] as f64, b[i] as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot, norm_a, norm_b)
}

fn dot_and_norms<T: Scalar>(a: &[T], b: &[T]) -> (f64, f64, f64) {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x.as_f64(), y.as_f64());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot, norm_a, norm_b)
}

/// NaN for zero-norm input; the caller treats NaN as incomparable.
#[inline]
fn finish(dot: f64, norm_a: f64, norm_b: f64) -> f64 {
    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (dot / denom).max(0.0)
}

pub fn cosine_similarity_f32(a: &[f32], b: &[f32]) -> f64 {
    let (dot, norm_a, norm_b) = dot_and_norms_f32(a, b);
    finish(dot, norm_a, norm_b)
}

pub fn cosine_similarity<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    let (dot, norm_a, norm_b) = dot_and_norms(a, b);
    finish(dot, norm_a, norm_b)
}

/// Correlation of the mean-centred vectors.
pub fn pearson_similarity<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    let len = a.len();
    if len == 0 {
        return f64::NAN;
    }
    let mean_a = a.iter().map(|x| x.as_f64()).sum::<f64>() / len as f64;
    let mean_b = b.iter().map(|x| x.as_f64()).sum::<f64>() / len as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x.as_f64() - mean_a;
        let dy = y.as_f64() - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    finish(cov, var_a, var_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity_f32(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0f64, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_negative_cosine_is_clamped() {
        assert_eq!(cosine_similarity(&[1.0f64, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_zero_vector_is_nan() {
        assert!(cosine_similarity_f32(&[0.0, 0.0], &[1.0, 1.0]).is_nan());
    }

    #[test]
    fn test_simd_path_matches_generic() {
        let a: Vec<f32> = (0..19).map(|i| (i as f32).sin()).collect();
        let b: Vec<f32> = (0..19).map(|i| (i as f32).cos()).collect();
        let fast = cosine_similarity_f32(&a, &b);
        let slow = cosine_similarity(&a, &b);
        assert!((fast - slow).abs() < 1e-5);
    }

    #[test]
    fn test_pearson() {
        let a = [1.0f64, 2.0, 3.0, 4.0];
        let b = [2.0f64, 4.0, 6.0, 8.0];
        assert!((pearson_similarity(&a, &b) - 1.0).abs() < 1e-12);
        let c = [4.0f64, 3.0, 2.0, 1.0];
        assert_eq!(pearson_similarity(&a, &c), 0.0);
        // constant vector has no variance
        assert!(pearson_similarity(&a, &[5.0, 5.0, 5.0, 5.0]).is_nan());
    }
}
