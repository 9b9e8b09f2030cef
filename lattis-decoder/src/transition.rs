//! Transition model: decode-graph labels to acoustic output indices

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DecodeError, Result};

/// Maps each non-epsilon decode-graph label to the acoustic-model output
/// (pdf) index that scores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionModel {
    pdf_by_label: HashMap<u32, usize>,
    num_pdfs: usize,
}

impl TransitionModel {
    /// Build from explicit (label, pdf) entries.
    ///
    /// `num_pdfs` is the acoustic model's output dimension; every entry
    /// must point inside it.
    pub fn from_entries(entries: Vec<(u32, usize)>, num_pdfs: usize) -> Result<Self> {
        if num_pdfs == 0 {
            return Err(DecodeError::model_load(
                "Transition model declares zero pdfs",
            ));
        }

        let mut pdf_by_label = HashMap::with_capacity(entries.len());
        for (label, pdf) in entries {
            if label == 0 {
                return Err(DecodeError::model_load(
                    "Transition entry for epsilon label 0 is not allowed",
                ));
            }
            if pdf >= num_pdfs {
                return Err(DecodeError::model_load(format!(
                    "Transition entry maps label {} to pdf {} but only {} pdfs exist",
                    label, pdf, num_pdfs
                )));
            }
            if pdf_by_label.insert(label, pdf).is_some() {
                return Err(DecodeError::model_load(format!(
                    "Duplicate transition entry for label {}",
                    label
                )));
            }
        }

        if pdf_by_label.is_empty() {
            return Err(DecodeError::model_load("Transition model has no entries"));
        }

        Ok(Self {
            pdf_by_label,
            num_pdfs,
        })
    }

    /// Acoustic output index for a graph label
    pub fn pdf_for_label(&self, label: u32) -> Option<usize> {
        self.pdf_by_label.get(&label).copied()
    }

    /// Number of acoustic outputs this model indexes into
    pub fn num_pdfs(&self) -> usize {
        self.num_pdfs
    }

    /// Number of mapped labels
    pub fn num_labels(&self) -> usize {
        self.pdf_by_label.len()
    }
}
