//! Feature matrices and the keyed feature archive format
//!
//! Archive format: one entry per utterance,
//!
//! ```text
//! utt1  [
//!   0.1 0.2 0.3
//!   0.4 0.5 0.6 ]
//! ```
//!
//! A `]` directly after the opening line denotes a zero-frame matrix.

use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{DecodeError, Result};

/// Materialize a caller-supplied flat buffer (row-major, frame-major)
/// into a (frames x dim) matrix.
pub fn matrix_from_flat(buf: &[f32], frame_count: usize, dimension: usize) -> Result<Array2<f32>> {
    let expected = frame_count
        .checked_mul(dimension)
        .ok_or_else(|| DecodeError::invalid_input("frame_count * dimension overflows"))?;
    if buf.len() != expected {
        return Err(DecodeError::invalid_input(format!(
            "Feature buffer holds {} values but frame_count {} x dimension {} requires {}",
            buf.len(),
            frame_count,
            dimension,
            expected
        )));
    }

    Array2::from_shape_vec((frame_count, dimension), buf.to_vec())
        .map_err(|e| DecodeError::invalid_input(format!("Bad feature buffer shape: {}", e)))
}

/// Sequential reader over a keyed feature archive
pub struct FeatureArchiveReader {
    reader: BufReader<File>,
    path: String,
    lineno: usize,
}

impl FeatureArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            DecodeError::archive(format!(
                "Failed to open feature archive {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.as_ref().display().to_string(),
            lineno: 0,
        })
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.lineno += 1;
        Ok(Some(line))
    }

    fn malformed(&self, msg: &str) -> DecodeError {
        DecodeError::archive(format!("{} at {}:{}", msg, self.path, self.lineno))
    }

    /// Read the next `(key, features)` entry, `None` at end of archive.
    /// Entries are returned strictly in archive order.
    pub fn read_next(&mut self) -> Result<Option<(String, Array2<f32>)>> {
        // Header line: `key  [`
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        let mut parts = header.split_whitespace();
        let key = parts
            .next()
            .ok_or_else(|| self.malformed("Missing utterance key"))?
            .to_string();
        if parts.next() != Some("[") {
            return Err(self.malformed("Expected '[' after utterance key"));
        }

        let mut rows: Vec<Vec<f32>> = Vec::new();
        let mut dim: Option<usize> = None;

        // Remaining tokens on the header line may already close the matrix
        let rest: Vec<&str> = parts.collect();
        let mut done = false;
        if !rest.is_empty() {
            done = self.consume_row(&rest, &mut rows, &mut dim)?;
        }

        while !done {
            let line = self
                .next_line()?
                .ok_or_else(|| self.malformed("Archive ends inside a matrix"))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            done = self.consume_row(&fields, &mut rows, &mut dim)?;
        }

        let dim = dim.unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        let num_rows = rows.len();
        for row in rows {
            data.extend(row);
        }
        let matrix = Array2::from_shape_vec((num_rows, dim), data)
            .map_err(|e| self.malformed(&format!("Inconsistent matrix shape: {}", e)))?;

        Ok(Some((key, matrix)))
    }

    /// Parse one row of fields; returns true when the closing `]` was seen
    fn consume_row(
        &self,
        fields: &[&str],
        rows: &mut Vec<Vec<f32>>,
        dim: &mut Option<usize>,
    ) -> Result<bool> {
        let (values, done) = match fields.last() {
            Some(&"]") => (&fields[..fields.len() - 1], true),
            _ => (fields, false),
        };

        if !values.is_empty() {
            let row: Vec<f32> = values
                .iter()
                .map(|s| s.parse())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| self.malformed(&format!("Bad float in feature row: {}", e)))?;

            match dim {
                None => *dim = Some(row.len()),
                Some(d) if *d != row.len() => {
                    return Err(self.malformed(&format!(
                        "Feature row width {} differs from previous rows ({})",
                        row.len(),
                        d
                    )));
                }
                Some(_) => {}
            }
            rows.push(row);
        }

        Ok(done)
    }
}

/// Writer producing the keyed feature archive format
pub struct FeatureArchiveWriter {
    writer: BufWriter<File>,
}

impl FeatureArchiveWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| {
            DecodeError::archive(format!(
                "Failed to create feature archive {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, key: &str, features: &Array2<f32>) -> Result<()> {
        writeln!(self.writer, "{}  [", key)?;
        if features.nrows() == 0 {
            writeln!(self.writer, "]")?;
            return Ok(());
        }
        for (i, row) in features.rows().into_iter().enumerate() {
            let line = row
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if i + 1 == features.nrows() {
                writeln!(self.writer, "  {} ]", line)?;
            } else {
                writeln!(self.writer, "  {}", line)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
