//! Model file I/O: one stream holding the transition model followed by
//! the acoustic model, in auto-detected binary or text form.
//!
//! Binary files start with a `\0B` marker followed by a bincode payload.
//! Text files are line oriented with section markers:
//!
//! ```text
//! <transition-model>
//! num-pdfs 2
//! 1 0
//! 2 1
//! </transition-model>
//! <acoustic-model>
//! input-dim 2
//! <linear> 2 2
//! 1 0
//! 0 1
//! <bias>
//! 0 0
//! <batchnorm> 2
//! 0 0
//! 1 1
//! <dropout> 0.1
//! </acoustic-model>
//! ```

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::acoustic::{AcousticModel, Component};
use crate::error::{DecodeError, Result};
use crate::transition::TransitionModel;

/// Marker prefix for binary model files
pub const BINARY_MAGIC: &[u8; 2] = b"\0B";

/// The two artifacts read from a single model stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub transition: TransitionModel,
    pub acoustic: AcousticModel,
}

impl ModelFile {
    /// Read a model file, auto-detecting binary vs text
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            DecodeError::model_load(format!(
                "Failed to read model file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        if bytes.starts_with(BINARY_MAGIC) {
            bincode::deserialize(&bytes[BINARY_MAGIC.len()..])
                .map_err(|e| DecodeError::model_load(format!("Bad binary model file: {}", e)))
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|e| DecodeError::model_load(format!("Model file is not UTF-8: {}", e)))?;
            Self::parse_text(&text)
        }
    }

    /// Write the binary form (marker + bincode payload)
    pub fn write_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let payload = bincode::serialize(self)
            .map_err(|e| DecodeError::model_load(format!("Failed to serialize model: {}", e)))?;
        let mut bytes = Vec::with_capacity(BINARY_MAGIC.len() + payload.len());
        bytes.extend_from_slice(BINARY_MAGIC);
        bytes.extend_from_slice(&payload);
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    fn parse_text(text: &str) -> Result<Self> {
        let mut cursor = LineCursor::new(text);

        cursor.expect("<transition-model>")?;
        let num_pdfs = cursor.keyed_value("num-pdfs")?;
        let mut entries = Vec::new();
        loop {
            let line = cursor.next_line("transition entry or </transition-model>")?;
            if line == "</transition-model>" {
                break;
            }
            let mut parts = line.split_whitespace();
            let label: u32 = parse_field(parts.next(), "transition label")?;
            let pdf: usize = parse_field(parts.next(), "transition pdf")?;
            entries.push((label, pdf));
        }
        let transition = TransitionModel::from_entries(entries, num_pdfs)?;

        cursor.expect("<acoustic-model>")?;
        let input_dim = cursor.keyed_value("input-dim")?;
        let mut components = Vec::new();
        let mut dim = input_dim;
        loop {
            let line = cursor.next_line("component tag or </acoustic-model>")?;
            if line == "</acoustic-model>" {
                break;
            }
            let mut parts = line.split_whitespace();
            let tag = parts.next().unwrap_or_default();
            match tag {
                "<linear>" => {
                    let rows: usize = parse_field(parts.next(), "linear rows")?;
                    let cols: usize = parse_field(parts.next(), "linear cols")?;
                    let mut weights = Array2::zeros((rows, cols));
                    for r in 0..rows {
                        let row = cursor.float_row(cols, "linear weight row")?;
                        for (c, v) in row.into_iter().enumerate() {
                            weights[[r, c]] = v;
                        }
                    }
                    cursor.expect("<bias>")?;
                    let bias = Array1::from_vec(cursor.float_row(rows, "linear bias")?);
                    components.push(Component::Linear { weights, bias });
                    dim = rows;
                }
                "<batchnorm>" => {
                    let bn_dim: usize = parse_field(parts.next(), "batchnorm dim")?;
                    if bn_dim != dim {
                        return Err(DecodeError::model_load(format!(
                            "Batchnorm dim {} does not match current dim {}",
                            bn_dim, dim
                        )));
                    }
                    let mean = Array1::from_vec(cursor.float_row(bn_dim, "batchnorm mean")?);
                    let var = Array1::from_vec(cursor.float_row(bn_dim, "batchnorm var")?);
                    components.push(Component::BatchNorm {
                        mean,
                        var,
                        test_mode: false,
                    });
                }
                "<dropout>" => {
                    let proportion: f32 = parse_field(parts.next(), "dropout proportion")?;
                    components.push(Component::Dropout {
                        proportion,
                        test_mode: false,
                    });
                }
                other => {
                    return Err(DecodeError::model_load(format!(
                        "Unknown acoustic component tag '{}'",
                        other
                    )));
                }
            }
        }
        let acoustic = AcousticModel::from_components(input_dim, components)?;

        Ok(Self {
            transition,
            acoustic,
        })
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> Result<T> {
    field
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DecodeError::model_load(format!("Missing or invalid {}", what)))
}

/// Cursor over non-empty trimmed lines of a text model file
struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        Self { lines, pos: 0 }
    }

    fn next_line(&mut self, what: &str) -> Result<&'a str> {
        let line = self.lines.get(self.pos).copied().ok_or_else(|| {
            DecodeError::model_load(format!("Unexpected end of model file, expected {}", what))
        })?;
        self.pos += 1;
        Ok(line)
    }

    fn expect(&mut self, tag: &str) -> Result<()> {
        let line = self.next_line(tag)?;
        if line != tag {
            return Err(DecodeError::model_load(format!(
                "Expected '{}' but found '{}'",
                tag, line
            )));
        }
        Ok(())
    }

    /// Parse a `key value` line, returning the value
    fn keyed_value<T: std::str::FromStr>(&mut self, key: &str) -> Result<T> {
        let line = self.next_line(key)?;
        let mut parts = line.split_whitespace();
        if parts.next() != Some(key) {
            return Err(DecodeError::model_load(format!(
                "Expected '{} <value>' but found '{}'",
                key, line
            )));
        }
        parse_field(parts.next(), key)
    }

    fn float_row(&mut self, expected: usize, what: &str) -> Result<Vec<f32>> {
        let line = self.next_line(what)?;
        let values: Vec<f32> = line
            .split_whitespace()
            .map(|s| s.parse())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| DecodeError::model_load(format!("Bad float in {}: {}", what, e)))?;
        if values.len() != expected {
            return Err(DecodeError::model_load(format!(
                "Expected {} values in {}, found {}",
                expected,
                what,
                values.len()
            )));
        }
        Ok(values)
    }
}
