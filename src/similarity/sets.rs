//! Set similarities over sorted, deduplicated long arrays

/// Size of the intersection of two ascending slices.
pub fn intersection_size(a: &[i64], b: &[i64]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// `|A ∩ B| / |A ∪ B|`, NaN when both sets are empty.
pub fn jaccard(a: &[i64], b: &[i64]) -> f64 {
    let intersection = intersection_size(a, b);
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return f64::NAN;
    }
    intersection as f64 / union as f64
}

/// `|A ∩ B| / min(|A|, |B|)`, NaN when either set is empty.
pub fn overlap(a: &[i64], b: &[i64]) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return f64::NAN;
    }
    intersection_size(a, b) as f64 / smaller as f64
}

/// Sort and dedup in place so the merge functions above apply.
pub fn normalize(values: &mut Vec<i64>) {
    values.sort_unstable();
    values.dedup();
}
