//! Word symbol table: bidirectional word <-> integer id mapping

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DecodeError, Result};

/// Vocabulary table mapping human-readable words to the integer labels
/// used on decode-graph arcs and in lattices.
///
/// Text format: one `word id` pair per line, whitespace separated
/// (the companion `words.txt` convention of FST toolkits).
#[derive(Debug)]
pub struct SymbolTable {
    word_by_id: HashMap<u32, String>,
    id_by_word: HashMap<String, u32>,
}

impl SymbolTable {
    /// Read a symbol table from its text file
    pub fn read_text<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            DecodeError::symbol_table(format!(
                "Failed to open symbol table {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let reader = BufReader::new(file);
        let mut word_by_id = HashMap::new();
        let mut id_by_word = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                DecodeError::symbol_table(format!("Failed to read line {}: {}", lineno + 1, e))
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let word = parts.next().ok_or_else(|| {
                DecodeError::symbol_table(format!("Malformed symbol entry at line {}", lineno + 1))
            })?;
            let id: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    DecodeError::symbol_table(format!(
                        "Missing or invalid id for '{}' at line {}",
                        word,
                        lineno + 1
                    ))
                })?;

            if word_by_id.insert(id, word.to_string()).is_some() {
                return Err(DecodeError::symbol_table(format!(
                    "Duplicate symbol id {} at line {}",
                    id,
                    lineno + 1
                )));
            }
            id_by_word.insert(word.to_string(), id);
        }

        if word_by_id.is_empty() {
            return Err(DecodeError::symbol_table("Symbol table is empty"));
        }

        Ok(Self {
            word_by_id,
            id_by_word,
        })
    }

    /// Look up the word for an id
    pub fn word(&self, id: u32) -> Option<&str> {
        self.word_by_id.get(&id).map(|s| s.as_str())
    }

    /// Look up the id for a word
    pub fn id(&self, word: &str) -> Option<u32> {
        self.id_by_word.get(word).copied()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.word_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_by_id.is_empty()
    }

    /// Render a word-id sequence as text. Ids missing from the table are
    /// rendered as `<unk:ID>` so a gap is visible instead of silently
    /// dropped.
    pub fn render(&self, ids: &[u32]) -> String {
        ids.iter()
            .map(|&id| match self.word(id) {
                Some(w) => w.to_string(),
                None => format!("<unk:{}>", id),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
