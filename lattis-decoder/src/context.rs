//! Model context: the load-once bundle shared by all decode sessions

use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::acoustic::AcousticModel;
use crate::error::{DecodeError, Result};
use crate::graph::DecodeGraph;
use crate::model::ModelFile;
use crate::symbols::SymbolTable;
use crate::transition::TransitionModel;

/// One loaded, ready-to-decode model bundle.
///
/// All four artifacts are populated before a context is handed out and
/// are immutable afterwards, so a context can be shared read-only
/// (`Arc<ModelContext>`) across any number of concurrent decode calls.
#[derive(Debug)]
pub struct ModelContext {
    transition: TransitionModel,
    acoustic: AcousticModel,
    graph: DecodeGraph,
    symbols: SymbolTable,
}

impl ModelContext {
    /// Load a context from its three artifact files: the combined
    /// transition+acoustic model stream, the decode graph, and the
    /// graph's companion word symbol table.
    ///
    /// The acoustic model is normalized for inference before first use:
    /// batch-norm and dropout are forced into test mode and the collapse
    /// pass merges redundant computation. Any parse failure aborts the
    /// load; a partially loaded context is never returned.
    pub fn load<P, Q, R>(model_path: P, graph_path: Q, symbols_path: R) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
    {
        info!("Initializing with model {}", model_path.as_ref().display());

        let ModelFile {
            transition,
            mut acoustic,
        } = ModelFile::read(model_path.as_ref())?;
        acoustic.set_inference_mode();
        acoustic.collapse();
        info!("Acoustic model loaded");

        if acoustic.output_dim() != transition.num_pdfs() {
            return Err(DecodeError::model_load(format!(
                "Acoustic model emits {} outputs but the transition model indexes {} pdfs",
                acoustic.output_dim(),
                transition.num_pdfs()
            )));
        }

        let graph = DecodeGraph::read_text(graph_path.as_ref())?;
        info!("Decode graph loaded ({} states)", graph.num_states());

        // Every non-epsilon graph label must be scoreable
        let unmapped: BTreeSet<u32> = graph
            .labels()
            .filter(|&l| transition.pdf_for_label(l).is_none())
            .collect();
        if !unmapped.is_empty() {
            return Err(DecodeError::graph_load(format!(
                "Graph labels without transition-model entries: {:?}",
                unmapped
            )));
        }

        let symbols = SymbolTable::read_text(symbols_path.as_ref())?;
        info!("Word symbol table loaded ({} entries)", symbols.len());

        Ok(Self {
            transition,
            acoustic,
            graph,
            symbols,
        })
    }

    pub fn transition_model(&self) -> &TransitionModel {
        &self.transition
    }

    pub fn acoustic_model(&self) -> &AcousticModel {
        &self.acoustic
    }

    pub fn graph(&self) -> &DecodeGraph {
        &self.graph
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Human-readable description of the acoustic model topology
    pub fn info(&self) -> String {
        self.acoustic.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let model = dir.join("final.mdl");
        let graph = dir.join("graph.fst.txt");
        let symbols = dir.join("words.txt");

        std::fs::write(
            &model,
            "<transition-model>\nnum-pdfs 2\n1 0\n2 1\n</transition-model>\n\
             <acoustic-model>\ninput-dim 2\n<linear> 2 2\n1 0\n0 1\n<bias>\n0 0\n\
             <dropout> 0.2\n</acoustic-model>\n",
        )
        .unwrap();
        std::fs::write(&graph, "0 1 1 0.5\n1 2 2 0.5\n2 0.0\n").unwrap();
        std::fs::write(&symbols, "<eps> 0\nyes 1\nno 2\n").unwrap();

        (model, graph, symbols)
    }

    #[test]
    fn test_load_populates_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (model, graph, symbols) = fixture(dir.path());

        let context = ModelContext::load(&model, &graph, &symbols).unwrap();
        assert_eq!(context.transition_model().num_pdfs(), 2);
        assert_eq!(context.acoustic_model().output_dim(), 2);
        assert_eq!(context.graph().num_states(), 3);
        assert_eq!(context.symbols().len(), 3);

        // Dropout collapsed away after inference normalization
        assert_eq!(context.acoustic_model().num_components(), 1);

        let info = context.info();
        assert!(info.contains("input-dim: 2"));
    }

    #[test]
    fn test_load_rejects_unmapped_graph_label() {
        let dir = tempfile::tempdir().unwrap();
        let (model, graph, symbols) = fixture(dir.path());
        std::fs::write(&graph, "0 1 7 0.5\n1 0.0\n").unwrap();

        let err = ModelContext::load(&model, &graph, &symbols).unwrap_err();
        assert!(matches!(err, DecodeError::GraphLoad(_)));
    }

    #[test]
    fn test_load_fails_on_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (model, graph, _) = fixture(dir.path());
        let missing = dir.path().join("nope.txt");

        assert!(ModelContext::load(&model, &graph, &missing).is_err());
    }
}
