//! Train/dev partitioning of sample indices.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{NerFeedError, Result};

/// Disjoint train and dev index sets covering `0..n_samples`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    /// In sampling order.
    pub train: Vec<usize>,
    /// Ascending.
    pub dev: Vec<usize>,
}

/// Draw `floor(train_ratio * n_samples)` indices without replacement for
/// training; the remaining indices form the dev set.
pub fn split_train_dev(
    n_samples: usize,
    train_ratio: f64,
    rng: &mut oorandom::Rand64,
) -> Result<SplitIndices> {
    if !(0.0..=1.0).contains(&train_ratio) {
        return Err(NerFeedError::InvalidConfig(format!(
            "train_ratio must be within [0, 1], got {train_ratio}"
        )));
    }
    let n_train = ((train_ratio * n_samples as f64).floor() as usize).min(n_samples);

    // Partial Fisher-Yates: the first n_train slots end up a uniform sample.
    let mut pool: Vec<usize> = (0..n_samples).collect();
    for i in 0..n_train {
        let j = rng.rand_range(i as u64..n_samples as u64) as usize;
        pool.swap(i, j);
    }
    let mut dev = pool.split_off(n_train);
    dev.sort_unstable();

    info!(train = pool.len(), dev = dev.len(), "train/dev split drawn");
    Ok(SplitIndices { train: pool, dev })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_disjoint_and_complete() {
        let mut rng = oorandom::Rand64::new(11);
        let split = split_train_dev(103, 0.8, &mut rng).unwrap();

        assert_eq!(split.train.len(), 82);
        assert_eq!(split.train.len() + split.dev.len(), 103);

        let train: HashSet<_> = split.train.iter().copied().collect();
        let dev: HashSet<_> = split.dev.iter().copied().collect();
        assert_eq!(train.len(), split.train.len());
        assert!(train.is_disjoint(&dev));
        assert!(train.union(&dev).all(|&i| i < 103));
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let a = split_train_dev(50, 0.5, &mut oorandom::Rand64::new(3)).unwrap();
        let b = split_train_dev(50, 0.5, &mut oorandom::Rand64::new(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_edge_ratios() {
        let mut rng = oorandom::Rand64::new(1);
        let all = split_train_dev(10, 1.0, &mut rng).unwrap();
        assert_eq!(all.train.len(), 10);
        assert!(all.dev.is_empty());

        let none = split_train_dev(10, 0.0, &mut rng).unwrap();
        assert!(none.train.is_empty());
        assert_eq!(none.dev, (0..10).collect::<Vec<_>>());

        let empty = split_train_dev(0, 0.8, &mut rng).unwrap();
        assert!(empty.train.is_empty() && empty.dev.is_empty());
    }

    #[test]
    fn test_ratio_out_of_range() {
        let mut rng = oorandom::Rand64::new(1);
        assert!(split_train_dev(10, -0.1, &mut rng).is_err());
    }
}
