//! Caching acoustic scorer: binds the model to one utterance's features

use ndarray::{Array1, Array2, Axis};

use crate::acoustic::AcousticModel;
use crate::config::DecoderConfig;
use crate::error::{DecodeError, Result};

/// Acoustic-score provider for one decode attempt.
///
/// Evaluates the network in chunks of `frames_per_chunk` input frames and
/// caches the resulting log-likelihood rows, so repeated lookups for the
/// same frame during search never recompute the network. The cache lives
/// exactly as long as the decode call that owns this scorer.
pub struct CachingScorer<'a> {
    acoustic: &'a AcousticModel,
    features: &'a Array2<f32>,
    subsample: usize,
    chunk_frames: usize,
    num_frames: usize,
    cache: Vec<Option<Array1<f32>>>,
}

impl<'a> CachingScorer<'a> {
    pub fn new(
        acoustic: &'a AcousticModel,
        features: &'a Array2<f32>,
        config: &DecoderConfig,
    ) -> Self {
        let subsample = config.frame_subsampling_factor;
        let num_frames = features.nrows().div_ceil(subsample);
        Self {
            acoustic,
            features,
            subsample,
            chunk_frames: config.frames_per_chunk / subsample,
            num_frames,
            cache: vec![None; num_frames],
        }
    }

    /// Number of scoreable (subsampled) frames
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Log-likelihood of `pdf` at output frame `frame`
    pub fn loglike(&mut self, frame: usize, pdf: usize) -> Result<f32> {
        if frame >= self.num_frames {
            return Err(DecodeError::scoring(format!(
                "Frame {} out of range ({} frames ready)",
                frame, self.num_frames
            )));
        }
        if self.cache[frame].is_none() {
            self.compute_chunk(frame)?;
        }
        let row = self.cache[frame]
            .as_ref()
            .ok_or_else(|| DecodeError::scoring("Scorer cache miss after chunk computation"))?;
        row.get(pdf).copied().ok_or_else(|| {
            DecodeError::scoring(format!(
                "Pdf {} out of range ({} outputs)",
                pdf,
                row.len()
            ))
        })
    }

    /// Evaluate the chunk containing `frame` and fill the cache
    fn compute_chunk(&mut self, frame: usize) -> Result<()> {
        let start = (frame / self.chunk_frames) * self.chunk_frames;
        let end = (start + self.chunk_frames).min(self.num_frames);

        // Gather the subsampled input rows for this chunk
        let mut input = Array2::zeros((end - start, self.features.ncols()));
        for (i, t) in (start..end).enumerate() {
            input
                .row_mut(i)
                .assign(&self.features.row(t * self.subsample));
        }

        let activations = self.acoustic.forward(&input)?;
        for (i, t) in (start..end).enumerate() {
            self.cache[t] = Some(log_softmax(activations.index_axis(Axis(0), i).to_owned()));
        }
        Ok(())
    }
}

/// Numerically stable log-softmax over one activation row
fn log_softmax(row: Array1<f32>) -> Array1<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum: f32 = row.iter().map(|v| (v - max).exp()).sum::<f32>().ln();
    row.mapv(|v| v - max - log_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::Component;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn identity_model(dim: usize) -> AcousticModel {
        let weights = Array2::eye(dim);
        let bias = Array1::zeros(dim);
        AcousticModel::from_components(dim, vec![Component::Linear { weights, bias }]).unwrap()
    }

    fn config(subsample: usize, chunk: usize) -> DecoderConfig {
        DecoderConfig {
            frame_subsampling_factor: subsample,
            frames_per_chunk: chunk,
            ..Default::default()
        }
    }

    #[test]
    fn test_frame_count_with_subsampling() {
        let model = identity_model(2);
        let features = Array2::zeros((7, 2));
        let scorer = CachingScorer::new(&model, &features, &config(3, 51));
        assert_eq!(scorer.num_frames(), 3);

        let features = Array2::zeros((0, 2));
        let scorer = CachingScorer::new(&model, &features, &config(3, 51));
        assert_eq!(scorer.num_frames(), 0);
    }

    #[test]
    fn test_loglikes_are_normalized() {
        let model = identity_model(2);
        let features = array![[5.0, 1.0]];
        let mut scorer = CachingScorer::new(&model, &features, &config(1, 51));

        let a = scorer.loglike(0, 0).unwrap();
        let b = scorer.loglike(0, 1).unwrap();
        // Probabilities sum to one and favor the dominant activation
        assert_abs_diff_eq!(a.exp() + b.exp(), 1.0, epsilon = 1e-5);
        assert!(a > b);
    }

    #[test]
    fn test_repeated_lookup_hits_cache() {
        let model = identity_model(2);
        let features = array![[1.0, 0.0], [0.0, 1.0]];
        let mut scorer = CachingScorer::new(&model, &features, &config(1, 51));

        let first = scorer.loglike(1, 0).unwrap();
        let second = scorer.loglike(1, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_range_frame_is_error() {
        let model = identity_model(2);
        let features = array![[1.0, 0.0]];
        let mut scorer = CachingScorer::new(&model, &features, &config(1, 51));
        assert!(scorer.loglike(5, 0).is_err());
    }

    #[test]
    fn test_dimension_mismatch_surfaces_from_network() {
        let model = identity_model(3);
        let features = array![[1.0, 0.0]];
        let mut scorer = CachingScorer::new(&model, &features, &config(1, 51));
        assert!(matches!(
            scorer.loglike(0, 0),
            Err(DecodeError::Scoring(_))
        ));
    }
}
