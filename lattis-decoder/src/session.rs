//! Decode sessions: the single-utterance and batch decode paths
//!
//! Both paths funnel into one per-utterance primitive that owns a fresh
//! decoder and scorer for exactly one attempt; they differ only in where
//! features come from and when the lattice sink is opened.

use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DecoderConfig;
use crate::context::ModelContext;
use crate::decoder::LatticeDecoder;
use crate::error::Result;
use crate::features::{matrix_from_flat, FeatureArchiveReader};
use crate::lattice::LatticeWriter;
use crate::scorer::CachingScorer;

/// Aggregate counters across the decode attempts of one call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeStats {
    pub num_success: usize,
    pub num_fail: usize,
    pub total_likelihood: f64,
    pub total_frames: u64,
}

/// Per-utterance result, surfaced to the caller rather than dropped
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    pub success: bool,
    /// Negated best-path cost; 0 for failed attempts
    pub likelihood: f64,
    /// Scoreable (subsampled) frames processed; 0 for failed attempts
    pub frames: u64,
    /// Best-path word ids
    pub words: Vec<u32>,
    /// Best path rendered through the symbol table
    pub text: String,
    /// Why no lattice was produced; `None` on success
    pub reason: Option<String>,
}

impl DecodeOutcome {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            likelihood: 0.0,
            frames: 0,
            words: Vec::new(),
            text: String::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Decode service over one loaded model context.
///
/// The context is shared read-only; each decode call owns its decoder,
/// scorer and sink exclusively, so concurrent calls on clones of the
/// same session (or sessions over the same context) do not interfere.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lattis_decoder::{DecodeSession, DecoderConfig, ModelContext};
///
/// let context = Arc::new(ModelContext::load(
///     "exp/final.mdl",
///     "exp/graph.fst.txt",
///     "exp/words.txt",
/// )?);
/// let session = DecodeSession::new(context, DecoderConfig::default())?;
///
/// let stats = session.decode_archive("feats.ark", "lat.ark")?;
/// println!("{} succeeded, {} failed", stats.num_success, stats.num_fail);
/// # Ok::<(), lattis_decoder::DecodeError>(())
/// ```
#[derive(Clone)]
pub struct DecodeSession {
    context: Arc<ModelContext>,
    config: DecoderConfig,
}

impl DecodeSession {
    /// Build a session, validating the configuration up front
    pub fn new(context: Arc<ModelContext>, config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { context, config })
    }

    /// Session with the stock configuration
    pub fn with_defaults(context: Arc<ModelContext>) -> Self {
        Self {
            context,
            config: DecoderConfig::default(),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode one utterance supplied as a caller-owned flat buffer
    /// (row-major, `frame_count` x `dimension`), appending the lattice
    /// to `out_path`.
    pub fn decode_buffer<P: AsRef<Path>>(
        &self,
        out_path: P,
        utterance_id: &str,
        buffer: &[f32],
        frame_count: usize,
        dimension: usize,
    ) -> Result<DecodeOutcome> {
        let features = matrix_from_flat(buffer, frame_count, dimension)?;
        self.decode_utterance(out_path, utterance_id, &features)
    }

    /// Decode one in-memory utterance into its own sink
    pub fn decode_utterance<P: AsRef<Path>>(
        &self,
        out_path: P,
        utterance_id: &str,
        features: &Array2<f32>,
    ) -> Result<DecodeOutcome> {
        let mut writer = LatticeWriter::open(out_path)?;
        let mut stats = DecodeStats::default();
        let outcome = self.decode_one(&mut writer, utterance_id, features, &mut stats)?;
        writer.flush()?;
        Ok(outcome)
    }

    /// Decode every utterance of a keyed feature archive, in archive
    /// order, into one sink opened once for the whole batch.
    ///
    /// A single utterance's failure is counted and iteration continues;
    /// an unopenable archive or sink fails the batch before any
    /// utterance is attempted.
    pub fn decode_archive<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        feature_path: P,
        out_path: Q,
    ) -> Result<DecodeStats> {
        let mut reader = FeatureArchiveReader::open(feature_path.as_ref())?;
        let mut writer = LatticeWriter::open(out_path.as_ref())?;
        let mut stats = DecodeStats::default();

        while let Some((key, features)) = reader.read_next()? {
            self.decode_one(&mut writer, &key, &features, &mut stats)?;
        }
        writer.flush()?;

        info!(
            "Batch done: {} succeeded, {} failed, overall log-likelihood per frame {}",
            stats.num_success,
            stats.num_fail,
            if stats.total_frames > 0 {
                stats.total_likelihood / stats.total_frames as f64
            } else {
                0.0
            }
        );
        Ok(stats)
    }

    /// The shared per-utterance decode primitive. Owns a fresh decoder
    /// and scorer for this attempt; search and scoring failures are
    /// counted per utterance, only sink errors propagate.
    fn decode_one(
        &self,
        writer: &mut LatticeWriter,
        utterance_id: &str,
        features: &Array2<f32>,
        stats: &mut DecodeStats,
    ) -> Result<DecodeOutcome> {
        info!(
            "Utterance {}: frame count = {}, dimension = {}",
            utterance_id,
            features.nrows(),
            features.ncols()
        );

        if features.nrows() == 0 {
            warn!("Zero-length utterance: {}", utterance_id);
            stats.num_fail += 1;
            return Ok(DecodeOutcome::failure("zero-length utterance"));
        }

        let mut scorer = CachingScorer::new(self.context.acoustic_model(), features, &self.config);
        let frames = scorer.num_frames() as u64;
        let decoder =
            LatticeDecoder::new(self.context.graph(), self.context.transition_model(), &self.config);

        let lattice = match decoder.decode(&mut scorer) {
            Ok(lattice) => lattice,
            Err(e) => {
                warn!("Decoding utterance {} failed: {}", utterance_id, e);
                stats.num_fail += 1;
                return Ok(DecodeOutcome::failure(e.to_string()));
            }
        };

        if lattice.is_empty() {
            warn!("No decode path found for utterance {}", utterance_id);
            stats.num_fail += 1;
            return Ok(DecodeOutcome::failure("no decode path found"));
        }

        let lattice = if self.config.determinize_lattice {
            lattice.determinize()
        } else {
            lattice
        };
        let Some(best) = lattice.best_path() else {
            // Determinization of a non-empty lattice cannot empty it
            stats.num_fail += 1;
            return Ok(DecodeOutcome::failure("lattice emptied unexpectedly"));
        };

        let likelihood = -f64::from(best.total_cost());
        let words = best.words.clone();
        let text = self.context.symbols().render(&words);
        info!("{} -> {}", utterance_id, text);
        info!(
            "Log-likelihood per frame for {} is {}",
            utterance_id,
            likelihood / frames as f64
        );

        writer.write(utterance_id, &lattice)?;

        stats.num_success += 1;
        stats.total_likelihood += likelihood;
        stats.total_frames += frames;

        Ok(DecodeOutcome {
            success: true,
            likelihood,
            frames,
            words,
            text,
            reason: None,
        })
    }
}
