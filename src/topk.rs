//! Top-k selection: the `k` largest values of a slice, largest first.
//!
//! Ordering is `f32::total_cmp`, so NaNs and signed zeros have a fixed place
//! and every variant returns the same values. Inputs are never mutated.

use std::cmp::Ordering;

use crate::error::{KernelError, Result};

/// One selected element and its position in the input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TopK {
    pub index: usize,
    pub value: f32,
}

#[inline]
fn descending(a: &f32, b: &f32) -> Ordering {
    b.total_cmp(a)
}

#[inline]
fn check_k(k: usize, len: usize) -> Result<()> {
    if k > len {
        return Err(KernelError::KTooLarge { k, len });
    }
    Ok(())
}

/// Largest and second largest in one pass; `None` for fewer than two values.
pub fn top_k_two(v: &[f32]) -> Option<(f32, f32)> {
    let (&a, &b) = (v.first()?, v.get(1)?);
    let (mut first, mut second) = if a.total_cmp(&b).is_ge() { (a, b) } else { (b, a) };
    for &x in &v[2..] {
        if x.total_cmp(&first).is_gt() {
            second = first;
            first = x;
        } else if x.total_cmp(&second).is_gt() {
            second = x;
        }
    }
    Some((first, second))
}

/// Copy, sort descending, truncate.
pub fn top_k_sort(v: &[f32], k: usize) -> Result<Vec<f32>> {
    check_k(k, v.len())?;
    let mut sorted = v.to_vec();
    sorted.sort_unstable_by(descending);
    sorted.truncate(k);
    Ok(sorted)
}

/// Sorts an index permutation instead of the values. Equal values keep
/// input order.
pub fn top_k_sort_indices(v: &[f32], k: usize) -> Result<Vec<TopK>> {
    check_k(k, v.len())?;
    let mut order: Vec<usize> = (0..v.len()).collect();
    order.sort_by(|&i, &j| descending(&v[i], &v[j]));
    Ok(order
        .into_iter()
        .take(k)
        .map(|index| TopK {
            index,
            value: v[index],
        })
        .collect())
}

/// Single pass keeping a sorted buffer of the best `k` seen so far.
pub fn top_k_insertion(v: &[f32], k: usize) -> Result<Vec<f32>> {
    check_k(k, v.len())?;
    let mut best: Vec<f32> = Vec::with_capacity(k + 1);
    if k == 0 {
        return Ok(best);
    }
    for &x in v {
        if best.len() == k {
            if let Some(last) = best.last() {
                if x.total_cmp(last).is_le() {
                    continue;
                }
            }
            best.pop();
        }
        let pos = best.partition_point(|y| y.total_cmp(&x).is_ge());
        best.insert(pos, x);
    }
    Ok(best)
}

/// Quickselect partition around the k-th largest, then sort the prefix.
pub fn top_k_select(v: &[f32], k: usize) -> Result<Vec<f32>> {
    check_k(k, v.len())?;
    if k == 0 {
        return Ok(Vec::new());
    }
    let mut work = v.to_vec();
    work.select_nth_unstable_by(k - 1, descending);
    work.truncate(k);
    work.sort_unstable_by(descending);
    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type TopKFn = fn(&[f32], usize) -> Result<Vec<f32>>;

    fn sort_indices_values(v: &[f32], k: usize) -> Result<Vec<f32>> {
        Ok(top_k_sort_indices(v, k)?.into_iter().map(|t| t.value).collect())
    }

    const VARIANTS: &[(&str, TopKFn)] = &[
        ("sort", top_k_sort),
        ("sort_indices", sort_indices_values),
        ("insertion", top_k_insertion),
        ("select", top_k_select),
    ];

    #[test]
    fn sequence_top_five() {
        let v: Vec<f32> = (1..=10).map(|i| i as f32).collect();
        for (name, func) in VARIANTS {
            assert_eq!(func(&v, 5).unwrap(), [10.0, 9.0, 8.0, 7.0, 6.0], "{name}");
        }
        let with_index = top_k_sort_indices(&v, 2).unwrap();
        assert_eq!(
            with_index,
            [
                TopK { index: 9, value: 10.0 },
                TopK { index: 8, value: 9.0 }
            ]
        );
    }

    #[test]
    fn k_bounds() {
        let v = [3.0f32, 1.0, 2.0];
        for (name, func) in VARIANTS {
            assert_eq!(func(&v, 0).unwrap(), Vec::<f32>::new(), "{name}");
            assert_eq!(func(&v, 3).unwrap(), [3.0, 2.0, 1.0], "{name}");
            assert_eq!(
                func(&v, 4).unwrap_err(),
                KernelError::KTooLarge { k: 4, len: 3 },
                "{name}"
            );
        }
        assert_eq!(top_k_sort(&[], 0).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn two_largest() {
        assert_eq!(top_k_two(&[]), None);
        assert_eq!(top_k_two(&[1.0]), None);
        assert_eq!(top_k_two(&[1.0, 2.0]), Some((2.0, 1.0)));
        assert_eq!(top_k_two(&[5.0, 1.0, 9.0, 9.0, 3.0]), Some((9.0, 9.0)));
        assert_eq!(top_k_two(&[-1.0, -7.0, -3.0]), Some((-1.0, -3.0)));
    }

    #[test]
    fn duplicates_keep_input_order_in_indices() {
        let v = [4.0f32, 7.0, 4.0, 7.0];
        let got: Vec<usize> = top_k_sort_indices(&v, 4)
            .unwrap()
            .into_iter()
            .map(|t| t.index)
            .collect();
        assert_eq!(got, [1, 3, 0, 2]);
    }

    proptest! {
        #[test]
        fn variants_agree_with_full_sort(
            values in proptest::collection::vec(-1.0e3f32..1.0e3, 0..=200),
            k_seed in any::<usize>(),
        ) {
            let k = k_seed % (values.len() + 1);
            let snapshot = values.clone();
            let mut expected = values.clone();
            expected.sort_by(|a, b| b.total_cmp(a));
            expected.truncate(k);
            for (name, func) in VARIANTS {
                let got = func(&values, k).unwrap();
                prop_assert_eq!(&got, &expected, "{}", name);
            }
            prop_assert_eq!(&values, &snapshot);

            if values.len() >= 2 {
                let (first, second) = top_k_two(&values).unwrap();
                let mut sorted = values.clone();
                sorted.sort_by(|a, b| b.total_cmp(a));
                prop_assert_eq!((first, second), (sorted[0], sorted[1]));
            }
        }

        #[test]
        fn indices_point_at_values(values in proptest::collection::vec(-10.0f32..10.0, 1..=100)) {
            let k = values.len() / 2;
            for entry in top_k_sort_indices(&values, k).unwrap() {
                prop_assert_eq!(values[entry.index], entry.value);
            }
        }
    }
}
