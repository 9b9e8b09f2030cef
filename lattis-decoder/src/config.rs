//! Decoder configuration shared by the single-utterance and batch paths

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DecodeError, Result};

/// Search and scoring parameters for lattice decoding.
///
/// The defaults reproduce the tuning the bridge has always shipped with;
/// callers that need different pruning behaviour construct one of these
/// explicitly (or load it from a TOML file) and pass it to
/// [`DecodeSession::new`](crate::session::DecodeSession::new).
///
/// # Example
///
/// ```
/// use lattis_decoder::DecoderConfig;
///
/// let mut config = DecoderConfig::default();
/// config.beam = 12.0;
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Pruning beam relative to the best token per frame
    pub beam: f32,

    /// Beam for keeping competing paths in the output lattice
    pub lattice_beam: f32,

    /// Upper bound on simultaneously alive decoder tokens
    pub max_active: usize,

    /// Lower bound on alive tokens; beam pruning never cuts below this
    pub min_active: usize,

    /// Multiplier on acoustic log-likelihoods relative to graph weights
    pub acoustic_scale: f32,

    /// Input frames evaluated per acoustic-scorer chunk.
    /// Must be a multiple of `frame_subsampling_factor`.
    pub frames_per_chunk: usize,

    /// The acoustic model emits one output per this many input frames
    pub frame_subsampling_factor: usize,

    /// Write compact (determinized) lattices instead of raw ones
    pub determinize_lattice: bool,

    /// Accept the best alive path when no final state is reached
    pub allow_partial: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam: 15.0,
            lattice_beam: 8.0,
            max_active: 7000,
            min_active: 200,
            acoustic_scale: 1.0,
            frames_per_chunk: 51, // multiple of the subsampling factor
            frame_subsampling_factor: 3,
            determinize_lattice: true,
            allow_partial: true,
        }
    }
}

impl DecoderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DecodeError::config(format!("Failed to read config file: {}", e)))?;

        let config: DecoderConfig = toml::from_str(&contents)
            .map_err(|e| DecodeError::config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check parameter combinations before a session is built
    pub fn validate(&self) -> Result<()> {
        if !self.beam.is_finite() || self.beam <= 0.0 {
            return Err(DecodeError::config(format!(
                "beam must be positive, got {}",
                self.beam
            )));
        }
        if !self.lattice_beam.is_finite() || self.lattice_beam <= 0.0 {
            return Err(DecodeError::config(format!(
                "lattice_beam must be positive, got {}",
                self.lattice_beam
            )));
        }
        if self.max_active == 0 {
            return Err(DecodeError::config("max_active must be at least 1"));
        }
        if self.min_active > self.max_active {
            return Err(DecodeError::config(format!(
                "min_active ({}) exceeds max_active ({})",
                self.min_active, self.max_active
            )));
        }
        if !self.acoustic_scale.is_finite() || self.acoustic_scale <= 0.0 {
            return Err(DecodeError::config(format!(
                "acoustic_scale must be positive, got {}",
                self.acoustic_scale
            )));
        }
        if self.frame_subsampling_factor == 0 {
            return Err(DecodeError::config("frame_subsampling_factor must be at least 1"));
        }
        if self.frames_per_chunk == 0 || self.frames_per_chunk % self.frame_subsampling_factor != 0
        {
            return Err(DecodeError::config(format!(
                "frames_per_chunk ({}) must be a positive multiple of frame_subsampling_factor ({})",
                self.frames_per_chunk, self.frame_subsampling_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        DecoderConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_negative_beam() {
        let config = DecoderConfig {
            beam: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_min_active_above_max_active() {
        let config = DecoderConfig {
            min_active: 10,
            max_active: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_chunk_not_multiple_of_subsampling() {
        let config = DecoderConfig {
            frames_per_chunk: 50,
            frame_subsampling_factor: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decoder.toml");
        std::fs::write(&path, "beam = 10.0\nmax_active = 500\n").unwrap();

        let config = DecoderConfig::from_file(&path).unwrap();
        assert_eq!(config.beam, 10.0);
        assert_eq!(config.max_active, 500);
        // Unspecified fields fall back to defaults
        assert_eq!(config.frame_subsampling_factor, 3);
    }
}
