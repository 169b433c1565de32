//! Random train/val/test partitioning for exports.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::AnnoportError;
use crate::model::ImageId;

/// Percentage split of a dataset's images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitRatios {
    pub train: u32,
    pub val: u32,
    pub test: u32,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 80,
            val: 10,
            test: 10,
        }
    }
}

impl SplitRatios {
    pub fn new(train: u32, val: u32, test: u32) -> Self {
        Self { train, val, test }
    }

    /// Ratios must cover the whole dataset exactly once.
    pub fn validate(&self) -> Result<(), AnnoportError> {
        let sum = self.train + self.val + self.test;
        if sum != 100 {
            return Err(AnnoportError::InvalidSplit {
                message: format!(
                    "train/val/test percentages must sum to 100, got {}/{}/{} = {}",
                    self.train, self.val, self.test, sum
                ),
            });
        }
        Ok(())
    }
}

/// Image ids partitioned into the three subsets.
#[derive(Clone, Debug, Default)]
pub struct DatasetSplit {
    pub train: Vec<ImageId>,
    pub val: Vec<ImageId>,
    pub test: Vec<ImageId>,
}

impl DatasetSplit {
    /// The non-empty subsets with their conventional directory names.
    pub fn named_subsets(&self) -> Vec<(&'static str, &[ImageId])> {
        [
            ("train", self.train.as_slice()),
            ("val", self.val.as_slice()),
            ("test", self.test.as_slice()),
        ]
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .collect()
    }
}

/// Shuffles the images and cuts them into train/val/test.
///
/// Cut points truncate toward zero, so the test subset absorbs whatever
/// rounding leaves over. A seed makes the partition reproducible; without
/// one the thread rng decides.
pub fn split_images(
    images: &[ImageId],
    ratios: &SplitRatios,
    seed: Option<u64>,
) -> Result<DatasetSplit, AnnoportError> {
    ratios.validate()?;

    let mut shuffled = images.to_vec();
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);
    } else {
        let mut rng = rand::rng();
        shuffled.shuffle(&mut rng);
    }

    let total = shuffled.len();
    let train_count = total * ratios.train as usize / 100;
    let val_count = total * ratios.val as usize / 100;

    // train_count + val_count never exceeds total once the ratios sum
    // to 100, so both cuts are in bounds.
    let test: Vec<ImageId> = shuffled.split_off(train_count + val_count);
    let val: Vec<ImageId> = shuffled.split_off(train_count);
    let train = shuffled;

    Ok(DatasetSplit { train, val, test })
}
