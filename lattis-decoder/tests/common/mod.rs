//! Shared fixtures: a tiny two-word model bundle on disk

use std::path::PathBuf;
use std::sync::Arc;

use lattis_decoder::ModelContext;

pub const DIM: usize = 40;

pub struct Fixture {
    // Keeps the backing directory alive for the test's duration
    pub dir: tempfile::TempDir,
    pub model: PathBuf,
    pub graph: PathBuf,
    pub symbols: PathBuf,
}

/// Write a model bundle where pdf 0 listens to feature column 0 and
/// pdf 1 to feature column 1. The graph accepts "yes" then "no", each
/// with a duration self-loop.
pub fn build() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("final.mdl");
    let graph = dir.path().join("graph.fst.txt");
    let symbols = dir.path().join("words.txt");

    let mut text = String::from("<transition-model>\nnum-pdfs 2\n1 0\n2 1\n</transition-model>\n");
    text.push_str(&format!("<acoustic-model>\ninput-dim {}\n<linear> 2 {}\n", DIM, DIM));
    for pdf in 0..2 {
        let row: Vec<String> = (0..DIM)
            .map(|c| if c == pdf { "1".to_string() } else { "0".to_string() })
            .collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    text.push_str("<bias>\n0 0\n</acoustic-model>\n");
    std::fs::write(&model, text).unwrap();

    std::fs::write(&graph, "0 1 1 0.5\n1 1 1 0.1\n1 2 2 0.5\n2 2 2 0.1\n2 0.0\n").unwrap();
    std::fs::write(&symbols, "<eps> 0\nyes 1\nno 2\n").unwrap();

    Fixture {
        dir,
        model,
        graph,
        symbols,
    }
}

pub fn load_context(fixture: &Fixture) -> Arc<ModelContext> {
    Arc::new(ModelContext::load(&fixture.model, &fixture.graph, &fixture.symbols).unwrap())
}

/// Flat row-major buffer whose first half favors "yes" (pdf 0) and
/// second half favors "no" (pdf 1)
pub fn yes_no_buffer(frame_count: usize) -> Vec<f32> {
    let mut buf = vec![0.0f32; frame_count * DIM];
    for t in 0..frame_count {
        let hot = if t < frame_count / 2 { 0 } else { 1 };
        buf[t * DIM + hot] = 5.0;
    }
    buf
}
