//! Lattices and the keyed lattice archive sink

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::warn;

use crate::error::{DecodeError, Result};

/// One scored word-sequence hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct LatticePath {
    pub words: Vec<u32>,
    pub graph_cost: f32,
    pub acoustic_cost: f32,
}

impl LatticePath {
    pub fn total_cost(&self) -> f32 {
        self.graph_cost + self.acoustic_cost
    }
}

/// A weighted set of competing word-sequence hypotheses for one
/// utterance, ordered cheapest first.
#[derive(Debug, Clone, Default)]
pub struct Lattice {
    paths: Vec<LatticePath>,
}

impl Lattice {
    pub fn from_paths(mut paths: Vec<LatticePath>) -> Self {
        sort_paths(&mut paths);
        Self { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[LatticePath] {
        &self.paths
    }

    /// Cheapest hypothesis
    pub fn best_path(&self) -> Option<&LatticePath> {
        self.paths.first()
    }

    /// Compaction transform: keep only the cheapest path per distinct
    /// word sequence.
    pub fn determinize(self) -> Lattice {
        let mut best: HashMap<Vec<u32>, LatticePath> = HashMap::new();
        for path in self.paths {
            match best.get(&path.words) {
                Some(existing) if existing.total_cost() <= path.total_cost() => {}
                _ => {
                    best.insert(path.words.clone(), path);
                }
            }
        }
        let mut paths: Vec<LatticePath> = best.into_values().collect();
        sort_paths(&mut paths);
        Lattice { paths }
    }
}

fn sort_paths(paths: &mut [LatticePath]) {
    // Total order even with float costs, so archive output is stable
    paths.sort_by(|a, b| {
        a.total_cost()
            .partial_cmp(&b.total_cost())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.words.cmp(&b.words))
    });
}

/// Keyed lattice archive sink, opened once per decode call or batch.
///
/// Entry format:
///
/// ```text
/// utt-1
/// <graph_cost> <acoustic_cost> <word ids...>
/// .
/// ```
///
/// At most one entry is written per utterance id; duplicates are skipped
/// with a warning.
pub struct LatticeWriter {
    writer: BufWriter<File>,
    written: HashSet<String>,
}

impl LatticeWriter {
    /// Open the sink for writing. Failure here is fatal for the whole
    /// decode call or batch.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| {
            DecodeError::sink(format!(
                "Could not open table for writing lattices: {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: HashSet::new(),
        })
    }

    pub fn write(&mut self, key: &str, lattice: &Lattice) -> Result<()> {
        if !self.written.insert(key.to_string()) {
            warn!("Skipping duplicate lattice entry for utterance {}", key);
            return Ok(());
        }

        writeln!(self.writer, "{}", key)?;
        for path in lattice.paths() {
            let words = path
                .words
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if words.is_empty() {
                writeln!(self.writer, "{} {}", path.graph_cost, path.acoustic_cost)?;
            } else {
                writeln!(
                    self.writer,
                    "{} {} {}",
                    path.graph_cost, path.acoustic_cost, words
                )?;
            }
        }
        writeln!(self.writer, ".")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for LatticeWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Reader over a lattice archive, used by consumers and tests
pub struct LatticeArchiveReader {
    reader: BufReader<File>,
}

impl LatticeArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            DecodeError::archive(format!(
                "Failed to open lattice archive {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    pub fn read_next(&mut self) -> Result<Option<(String, Lattice)>> {
        let key = loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                break trimmed.to_string();
            }
        };

        let mut paths = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(DecodeError::archive(format!(
                    "Lattice archive ends inside entry '{}'",
                    key
                )));
            }
            let trimmed = line.trim();
            if trimmed == "." {
                break;
            }
            if trimmed.is_empty() {
                continue;
            }

            let mut parts = trimmed.split_whitespace();
            let graph_cost: f32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    DecodeError::archive(format!("Bad lattice path line in '{}'", key))
                })?;
            let acoustic_cost: f32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    DecodeError::archive(format!("Bad lattice path line in '{}'", key))
                })?;
            let words: Vec<u32> = parts
                .map(|s| s.parse())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    DecodeError::archive(format!("Bad word id in entry '{}': {}", key, e))
                })?;

            paths.push(LatticePath {
                words,
                graph_cost,
                acoustic_cost,
            });
        }

        Ok(Some((key, Lattice::from_paths(paths))))
    }

    /// Drain the archive into a key -> lattice map (test helper for
    /// order-independent assertions)
    pub fn read_all(&mut self) -> Result<Vec<(String, Lattice)>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
