//! Lattice beam-search decoder over the decode graph
//!
//! Time-synchronous token passing: per scoreable frame each alive token
//! expands along non-epsilon arcs, paying the arc's graph weight plus the
//! scaled negated acoustic log-likelihood of the arc label's pdf. Epsilon
//! arcs (label 0) are expanded without consuming a frame. Self-loop arcs
//! model duration: they are scored like any other arc but do not append
//! their label to the word history again.
//!
//! Tokens are Viterbi-merged per state (cheapest survives), pruned by
//! `beam` around the best token and clamped to `max_active`/`min_active`.
//! Survivors within `lattice_beam` of the best final cost become the raw
//! lattice. Everything here is deterministic for fixed inputs: token maps
//! are ordered by state id and merges require strict improvement.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::DecoderConfig;
use crate::error::{DecodeError, Result};
use crate::graph::DecodeGraph;
use crate::lattice::{Lattice, LatticePath};
use crate::scorer::CachingScorer;
use crate::transition::TransitionModel;

/// Backpointer arena entry: one emitted word and its predecessor
struct BackPtr {
    prev: Option<usize>,
    word: u32,
}

#[derive(Clone, Copy)]
struct Token {
    history: Option<usize>,
    graph_cost: f32,
    acoustic_cost: f32,
}

impl Token {
    fn cost(&self) -> f32 {
        self.graph_cost + self.acoustic_cost
    }
}

/// Per-utterance graph-search decoder. Constructed fresh for every
/// decode attempt and dropped with it.
pub struct LatticeDecoder<'a> {
    graph: &'a DecodeGraph,
    transition: &'a TransitionModel,
    config: &'a DecoderConfig,
}

impl<'a> LatticeDecoder<'a> {
    pub fn new(
        graph: &'a DecodeGraph,
        transition: &'a TransitionModel,
        config: &'a DecoderConfig,
    ) -> Self {
        Self {
            graph,
            transition,
            config,
        }
    }

    /// Run the search against one utterance's scorer. An empty lattice
    /// means the search found no viable path (a per-utterance failure,
    /// not an error).
    pub fn decode(&self, scorer: &mut CachingScorer) -> Result<Lattice> {
        let num_frames = scorer.num_frames();
        let mut arena: Vec<BackPtr> = Vec::new();

        let mut cur: BTreeMap<usize, Token> = BTreeMap::new();
        cur.insert(
            self.graph.start(),
            Token {
                history: None,
                graph_cost: 0.0,
                acoustic_cost: 0.0,
            },
        );
        self.expand_epsilon(&mut cur);

        for t in 0..num_frames {
            let mut next: BTreeMap<usize, Token> = BTreeMap::new();

            for (&state, token) in &cur {
                for arc in self.graph.arcs_from(state) {
                    if arc.label == 0 {
                        continue;
                    }
                    let pdf = self.transition.pdf_for_label(arc.label).ok_or_else(|| {
                        DecodeError::scoring(format!(
                            "Graph label {} has no transition-model entry",
                            arc.label
                        ))
                    })?;
                    let loglike = scorer.loglike(t, pdf)?;

                    let history = if arc.next_state == state {
                        token.history
                    } else {
                        arena.push(BackPtr {
                            prev: token.history,
                            word: arc.label,
                        });
                        Some(arena.len() - 1)
                    };
                    let candidate = Token {
                        history,
                        graph_cost: token.graph_cost + arc.weight,
                        acoustic_cost: token.acoustic_cost
                            - loglike * self.config.acoustic_scale,
                    };
                    relax(&mut next, arc.next_state, candidate);
                }
            }

            self.expand_epsilon(&mut next);
            self.prune(&mut next);

            if next.is_empty() {
                warn!("No tokens survived frame {} of {}", t, num_frames);
                return Ok(Lattice::default());
            }
            cur = next;
        }

        self.extract_lattice(&cur, &arena, num_frames)
    }

    /// Relax epsilon arcs to a fixpoint without consuming a frame
    fn expand_epsilon(&self, tokens: &mut BTreeMap<usize, Token>) {
        let mut worklist: Vec<usize> = tokens.keys().copied().collect();
        while let Some(state) = worklist.pop() {
            let Some(token) = tokens.get(&state).copied() else {
                continue;
            };
            for arc in self.graph.arcs_from(state) {
                if arc.label != 0 {
                    continue;
                }
                let candidate = Token {
                    history: token.history,
                    graph_cost: token.graph_cost + arc.weight,
                    acoustic_cost: token.acoustic_cost,
                };
                if relax(tokens, arc.next_state, candidate) {
                    worklist.push(arc.next_state);
                }
            }
        }
    }

    /// Beam pruning with active-token bounds
    fn prune(&self, tokens: &mut BTreeMap<usize, Token>) {
        if tokens.is_empty() {
            return;
        }

        let mut ranked: Vec<(usize, Token)> = tokens.iter().map(|(&s, &t)| (s, t)).collect();
        ranked.sort_by(|a, b| {
            a.1.cost()
                .partial_cmp(&b.1.cost())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let best = ranked[0].1.cost();
        let within_beam = ranked
            .iter()
            .take_while(|(_, t)| t.cost() <= best + self.config.beam)
            .count();

        // Beam pruning never cuts below min_active; max_active caps the
        // survivor count either way.
        let keep = within_beam
            .max(self.config.min_active.min(ranked.len()))
            .min(self.config.max_active);

        if keep < ranked.len() {
            debug!("Pruning {} of {} active tokens", ranked.len() - keep, ranked.len());
            ranked.truncate(keep);
            *tokens = ranked.into_iter().collect();
        }
    }

    fn extract_lattice(
        &self,
        tokens: &BTreeMap<usize, Token>,
        arena: &[BackPtr],
        num_frames: usize,
    ) -> Result<Lattice> {
        // End tokens: final states with their final weight folded in,
        // or every alive token when partial paths are allowed.
        let mut ends: Vec<Token> = tokens
            .iter()
            .filter_map(|(&state, &token)| {
                self.graph.final_weight(state).map(|w| Token {
                    history: token.history,
                    graph_cost: token.graph_cost + w,
                    acoustic_cost: token.acoustic_cost,
                })
            })
            .collect();

        if ends.is_empty() {
            if !self.config.allow_partial {
                warn!("No final state reached after {} frames", num_frames);
                return Ok(Lattice::default());
            }
            warn!(
                "No final state reached after {} frames, keeping partial paths",
                num_frames
            );
            ends = tokens.values().copied().collect();
        }

        let best = ends
            .iter()
            .map(Token::cost)
            .fold(f32::INFINITY, f32::min);

        let paths: Vec<LatticePath> = ends
            .into_iter()
            .filter(|t| t.cost() <= best + self.config.lattice_beam)
            .map(|t| LatticePath {
                words: trace_words(arena, t.history),
                graph_cost: t.graph_cost,
                acoustic_cost: t.acoustic_cost,
            })
            .collect();

        Ok(Lattice::from_paths(paths))
    }
}

/// Keep the cheapest token per state; returns true if the candidate won
fn relax(tokens: &mut BTreeMap<usize, Token>, state: usize, candidate: Token) -> bool {
    match tokens.get(&state) {
        Some(existing) if existing.cost() <= candidate.cost() => false,
        _ => {
            tokens.insert(state, candidate);
            true
        }
    }
}

fn trace_words(arena: &[BackPtr], mut history: Option<usize>) -> Vec<u32> {
    let mut words = Vec::new();
    while let Some(idx) = history {
        words.push(arena[idx].word);
        history = arena[idx].prev;
    }
    words.reverse();
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::{AcousticModel, Component};
    use ndarray::{Array1, Array2};

    // Two-word graph with duration self-loops:
    //   0 --1--> 1 (loop 1), 1 --2--> 2 (loop 2), 2 final
    fn fixture_graph(dir: &std::path::Path) -> DecodeGraph {
        let path = dir.join("g.fst.txt");
        std::fs::write(
            &path,
            "0 1 1 0.5\n1 1 1 0.1\n1 2 2 0.5\n2 2 2 0.1\n2 0.0\n",
        )
        .unwrap();
        DecodeGraph::read_text(&path).unwrap()
    }

    fn fixture_transition() -> TransitionModel {
        TransitionModel::from_entries(vec![(1, 0), (2, 1)], 2).unwrap()
    }

    // Identity network: features are already per-pdf scores
    fn fixture_acoustic() -> AcousticModel {
        AcousticModel::from_components(
            2,
            vec![Component::Linear {
                weights: Array2::eye(2),
                bias: Array1::zeros(2),
            }],
        )
        .unwrap()
    }

    fn fast_config() -> DecoderConfig {
        DecoderConfig {
            frame_subsampling_factor: 1,
            frames_per_chunk: 10,
            min_active: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_decodes_expected_word_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture_graph(dir.path());
        let transition = fixture_transition();
        let acoustic = fixture_acoustic();
        let config = fast_config();

        // Two frames favoring pdf 0, two favoring pdf 1
        let features = ndarray::array![
            [5.0, 0.0],
            [5.0, 0.0],
            [0.0, 5.0],
            [0.0, 5.0]
        ];
        let mut scorer = CachingScorer::new(&acoustic, &features, &config);
        let decoder = LatticeDecoder::new(&graph, &transition, &config);

        let lattice = decoder.decode(&mut scorer).unwrap();
        assert!(!lattice.is_empty());
        assert_eq!(lattice.best_path().unwrap().words, vec![1, 2]);
    }

    #[test]
    fn test_dead_end_yields_empty_lattice() {
        let dir = tempfile::tempdir().unwrap();
        // No self-loops: after two frames no arcs remain
        let path = dir.path().join("dead.fst.txt");
        std::fs::write(&path, "0 1 1 0.0\n1 2 2 0.0\n2 0.0\n").unwrap();
        let graph = DecodeGraph::read_text(&path).unwrap();

        let transition = fixture_transition();
        let acoustic = fixture_acoustic();
        let config = fast_config();

        let features = Array2::zeros((4, 2));
        let mut scorer = CachingScorer::new(&acoustic, &features, &config);
        let decoder = LatticeDecoder::new(&graph, &transition, &config);

        let lattice = decoder.decode(&mut scorer).unwrap();
        assert!(lattice.is_empty());
    }

    #[test]
    fn test_partial_path_when_final_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture_graph(dir.path());
        let transition = fixture_transition();
        let acoustic = fixture_acoustic();
        let config = fast_config();

        // One frame: only the first word is reachable, state 1 not final
        let features = ndarray::array![[5.0, 0.0]];
        let mut scorer = CachingScorer::new(&acoustic, &features, &config);
        let decoder = LatticeDecoder::new(&graph, &transition, &config);

        let lattice = decoder.decode(&mut scorer).unwrap();
        assert!(!lattice.is_empty());
        assert_eq!(lattice.best_path().unwrap().words, vec![1]);
    }

    #[test]
    fn test_partial_disallowed_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture_graph(dir.path());
        let transition = fixture_transition();
        let acoustic = fixture_acoustic();
        let config = DecoderConfig {
            allow_partial: false,
            ..fast_config()
        };

        let features = ndarray::array![[5.0, 0.0]];
        let mut scorer = CachingScorer::new(&acoustic, &features, &config);
        let decoder = LatticeDecoder::new(&graph, &transition, &config);

        let lattice = decoder.decode(&mut scorer).unwrap();
        assert!(lattice.is_empty());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture_graph(dir.path());
        let transition = fixture_transition();
        let acoustic = fixture_acoustic();
        let config = fast_config();

        let features = ndarray::array![[1.0, 0.5], [0.5, 1.0], [0.0, 2.0]];
        let decoder = LatticeDecoder::new(&graph, &transition, &config);

        let mut scorer1 = CachingScorer::new(&acoustic, &features, &config);
        let mut scorer2 = CachingScorer::new(&acoustic, &features, &config);
        let a = decoder.decode(&mut scorer1).unwrap();
        let b = decoder.decode(&mut scorer2).unwrap();

        assert_eq!(a.num_paths(), b.num_paths());
        for (pa, pb) in a.paths().iter().zip(b.paths().iter()) {
            assert_eq!(pa.words, pb.words);
            assert_eq!(pa.graph_cost, pb.graph_cost);
            assert_eq!(pa.acoustic_cost, pb.acoustic_cost);
        }
    }
}
