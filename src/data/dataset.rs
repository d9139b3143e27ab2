//! Burn Dataset implementation for gameweek windows
//!
//! Wraps a [`SequenceSet`] as training samples and provides the
//! train/test and validation splits used by the trainer.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::features::SequenceSet;

/// A single window flattened for batching
#[derive(Debug, Clone)]
pub struct WindowSample {
    /// `window_length * feature_count` values, row-major
    pub sequence: Vec<f32>,
    pub target: f32,
}

/// Dataset of windows with a fixed shape
#[derive(Debug, Clone)]
pub struct WindowDataset {
    samples: Vec<WindowSample>,
    window_length: usize,
    feature_count: usize,
}

impl WindowDataset {
    pub fn from_sequences(set: &SequenceSet) -> Self {
        let samples = set
            .windows
            .iter()
            .map(|w| WindowSample {
                sequence: w.sequence.iter().flatten().copied().collect(),
                target: w.target,
            })
            .collect();

        WindowDataset {
            samples,
            window_length: set.window_length,
            feature_count: set.feature_count,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }
}

impl Dataset<WindowSample> for WindowDataset {
    fn get(&self, index: usize) -> Option<WindowSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Shuffled train/test split
///
/// The test part gets `ceil(n * test_fraction)` windows.
pub fn train_test_split(set: &SequenceSet, test_fraction: f32, seed: u64) -> (SequenceSet, SequenceSet) {
    let n = set.len();
    let n_test = ((n as f32 * test_fraction).ceil() as usize).min(n);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test, train) = indices.split_at(n_test);
    log::info!("Split {} windows: train={}, test={}", n, train.len(), test.len());

    (set.select(train), set.select(test))
}

/// Hold out the last `fraction` of windows for validation, without shuffling
pub fn validation_split(set: &SequenceSet, fraction: f32) -> (SequenceSet, SequenceSet) {
    let n = set.len();
    let split_at = ((n as f32 * (1.0 - fraction)) as usize).min(n);
    let indices: Vec<usize> = (0..n).collect();
    let (train, val) = indices.split_at(split_at);
    (set.select(train), set.select(val))
}

/// Batch of windows for training
#[derive(Debug, Clone)]
pub struct WindowBatch<B: Backend> {
    /// Input windows: [batch, window_length, feature_count]
    pub sequences: Tensor<B, 3>,
    /// Target points: [batch, 1]
    pub targets: Tensor<B, 2>,
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct WindowBatcher<B: Backend> {
    device: B::Device,
    feature_count: usize,
}

impl<B: Backend> WindowBatcher<B> {
    pub fn new(device: B::Device, feature_count: usize) -> Self {
        WindowBatcher {
            device,
            feature_count,
        }
    }
}

impl<B: Backend> Batcher<B, WindowSample, WindowBatch<B>> for WindowBatcher<B> {
    fn batch(&self, items: Vec<WindowSample>, _device: &B::Device) -> WindowBatch<B> {
        let batch_size = items.len();
        let seq_len = items
            .first()
            .map(|s| s.sequence.len() / self.feature_count.max(1))
            .unwrap_or(0);

        let mut sequence_data = Vec::with_capacity(batch_size * seq_len * self.feature_count);
        let mut target_data = Vec::with_capacity(batch_size);
        for sample in &items {
            sequence_data.extend_from_slice(&sample.sequence);
            target_data.push(sample.target);
        }

        let sequences = Tensor::<B, 1>::from_floats(sequence_data.as_slice(), &self.device)
            .reshape([batch_size, seq_len, self.feature_count]);
        let targets = Tensor::<B, 1>::from_floats(target_data.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        WindowBatch { sequences, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Window;
    use crate::PlayerId;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn set(n: usize) -> SequenceSet {
        SequenceSet {
            windows: (0..n)
                .map(|i| Window {
                    player_id: PlayerId(i as i64),
                    sequence: vec![vec![i as f32, 1.0], vec![i as f32, 2.0], vec![i as f32, 3.0]],
                    target: i as f32,
                    target_gameweek: 4,
                })
                .collect(),
            window_length: 3,
            feature_count: 2,
        }
    }

    #[test]
    fn test_train_test_split_is_seeded_partition() {
        let full = set(10);
        let (train, test) = train_test_split(&full, 0.2, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<f32> = train.targets().into_iter().chain(test.targets()).collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, (0..10).map(|i| i as f32).collect::<Vec<_>>());

        let (train2, test2) = train_test_split(&full, 0.2, 42);
        assert_eq!(train.targets(), train2.targets());
        assert_eq!(test.targets(), test2.targets());
    }

    #[test]
    fn test_validation_split_takes_tail() {
        let (train, val) = validation_split(&set(10), 0.2);
        assert_eq!(train.targets(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(val.targets(), vec![8.0, 9.0]);

        let (train, val) = validation_split(&set(3), 0.0);
        assert_eq!(train.len(), 3);
        assert!(val.is_empty());
    }

    #[test]
    fn test_batch_shapes() {
        let dataset = WindowDataset::from_sequences(&set(4));
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.get(1).unwrap().sequence, vec![1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);

        let device = Default::default();
        let batcher = WindowBatcher::<TestBackend>::new(device, dataset.feature_count());
        let items: Vec<WindowSample> = (0..4).filter_map(|i| dataset.get(i)).collect();
        let batch = batcher.batch(items, &Default::default());

        assert_eq!(batch.sequences.dims(), [4, 3, 2]);
        assert_eq!(batch.targets.dims(), [4, 1]);
    }
}
