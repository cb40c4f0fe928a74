//! Euclidean distance and the derived similarity `1 / (1 + d)`

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::Scalar;

/// Squared L2 distance. Callers check that the lengths match.
#[inline]
pub fn euclidean_distance_squared_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    {
        unsafe { euclidean_distance_squared_avx2(a, b) }
    }

    #[cfg(all(target_arch = "x86_64", not(target_feature = "avx2")))]
    {
        if is_x86_feature_detected!("avx2") && a.len() >= 8 {
            unsafe { euclidean_distance_squared_avx2(a, b) }
        } else {
            euclidean_distance_squared_scalar(a, b)
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        euclidean_distance_squared_scalar(a, b)
    }
}

/// AVX2: 8 lanes per step, scalar remainder
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn euclidean_distance_squared_avx2(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 8;

    let mut sum_vec = _mm256_setzero_ps();
    for i in 0..chunks {
        let offset = i * 8;
        let a_vec = _mm256_loadu_ps(a.as_ptr().add(offset));
        let b_vec = _mm256_loadu_ps(b.as_ptr().add(offset));
        let diff = _mm256_sub_ps(a_vec, b_vec);
        sum_vec = _mm256_add_ps(sum_vec, _mm256_mul_ps(diff, diff));
    }

    let mut sum = horizontal_sum_avx2(sum_vec);
    for i in chunks * 8..n {
        let diff = a[i] - b[i];
        sum += diff * diff;
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub(super) unsafe fn horizontal_sum_avx2(v: __m256) -> f32 {
    // 高低 128 位相加后再做水平求和
    let high = _mm256_extractf128_ps(v, 1);
    let low = _mm256_castps256_ps128(v);
    let sum128 = _mm_add_ps(high, low);

    let shuf = _mm_movehdup_ps(sum128);
    let sum64 = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(shuf, sum64);
    let sum32 = _mm_add_ss(sum64, shuf2);
    _mm_cvtss_f32(sum32)
}

fn euclidean_distance_squared_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Squared distance accumulated in f64 for long/double arrays.
pub fn euclidean_distance_squared<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let diff = x.as_f64() - y.as_f64();
            diff * diff
        })
        .sum()
}

#[inline]
pub fn distance_to_similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

pub fn euclidean_similarity_f32(a: &[f32], b: &[f32]) -> f64 {
    distance_to_similarity((euclidean_distance_squared_f32(a, b) as f64).sqrt())
}

pub fn euclidean_similarity<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    distance_to_similarity(euclidean_distance_squared(a, b).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_squared() {
        assert_eq!(euclidean_distance_squared_f32(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(euclidean_distance_squared(&[0i64, 0], &[3, 4]), 25.0);
    }

    #[test]
    fn test_simd_matches_scalar() {
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..37).map(|i| (37 - i) as f32 * 0.25).collect();
        let fast = euclidean_distance_squared_f32(&a, &b);
        let slow = euclidean_distance_squared_scalar(&a, &b);
        assert!((fast - slow).abs() / slow < 1e-5);
    }

    #[test]
    fn test_similarity_range() {
        assert_eq!(euclidean_similarity_f32(&[1.0, 2.0], &[1.0, 2.0]), 1.0);
        assert_eq!(euclidean_similarity(&[0.0f64, 0.0], &[3.0, 4.0]), 1.0 / 6.0);
        let s = euclidean_similarity_f32(&[1e10, -1e10], &[-1e10, 1e10]);
        assert!(s > 0.0 && s < 1e-9);
    }
}
