//! Decode graph: a weighted finite-state acceptor over word labels

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DecodeError, Result};

/// One outgoing transition. Label 0 is epsilon (consumes no frame and
/// emits no word).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphArc {
    pub next_state: usize,
    pub label: u32,
    pub weight: f32,
}

/// Weighted finite-state acceptor encoding valid label sequences and
/// their prior costs.
///
/// Text format follows the FST convention: arc lines are
/// `from to label [weight]`, final-state lines are `state [weight]`, and
/// the source state of the first line is the start state.
#[derive(Debug)]
pub struct DecodeGraph {
    start: usize,
    arcs: Vec<Vec<GraphArc>>,
    final_weights: Vec<Option<f32>>,
}

impl DecodeGraph {
    /// Read a graph from its text file
    pub fn read_text<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            DecodeError::graph_load(format!(
                "Failed to open graph {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let reader = BufReader::new(file);
        let mut start = None;
        let mut arc_list: Vec<(usize, GraphArc)> = Vec::new();
        let mut finals: Vec<(usize, f32)> = Vec::new();
        let mut max_state = 0usize;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                DecodeError::graph_load(format!("Failed to read line {}: {}", lineno + 1, e))
            })?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }

            let bad_line = || {
                DecodeError::graph_load(format!(
                    "Malformed graph line {}: '{}'",
                    lineno + 1,
                    line.trim()
                ))
            };

            match fields.len() {
                // state [weight] -- final state
                1 | 2 => {
                    let state: usize = fields[0].parse().map_err(|_| bad_line())?;
                    let weight: f32 = match fields.get(1) {
                        Some(w) => w.parse().map_err(|_| bad_line())?,
                        None => 0.0,
                    };
                    max_state = max_state.max(state);
                    finals.push((state, weight));
                    if start.is_none() {
                        start = Some(state);
                    }
                }
                // from to label [weight] -- arc
                3 | 4 => {
                    let from: usize = fields[0].parse().map_err(|_| bad_line())?;
                    let to: usize = fields[1].parse().map_err(|_| bad_line())?;
                    let label: u32 = fields[2].parse().map_err(|_| bad_line())?;
                    let weight: f32 = match fields.get(3) {
                        Some(w) => w.parse().map_err(|_| bad_line())?,
                        None => 0.0,
                    };
                    max_state = max_state.max(from).max(to);
                    arc_list.push((
                        from,
                        GraphArc {
                            next_state: to,
                            label,
                            weight,
                        },
                    ));
                    if start.is_none() {
                        start = Some(from);
                    }
                }
                _ => return Err(bad_line()),
            }
        }

        let start =
            start.ok_or_else(|| DecodeError::graph_load("Graph file contains no states"))?;

        let num_states = max_state + 1;
        let mut arcs = vec![Vec::new(); num_states];
        for (from, arc) in arc_list {
            arcs[from].push(arc);
        }

        let mut final_weights = vec![None; num_states];
        for (state, weight) in finals {
            final_weights[state] = Some(weight);
        }

        Ok(Self {
            start,
            arcs,
            final_weights,
        })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn num_states(&self) -> usize {
        self.arcs.len()
    }

    pub fn arcs_from(&self, state: usize) -> &[GraphArc] {
        &self.arcs[state]
    }

    /// Final weight of a state, `None` if the state is not final
    pub fn final_weight(&self, state: usize) -> Option<f32> {
        self.final_weights.get(state).copied().flatten()
    }

    /// Iterator over every non-epsilon label in the graph, used for
    /// load-time validation against the transition model.
    pub fn labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.arcs
            .iter()
            .flatten()
            .map(|a| a.label)
            .filter(|&l| l != 0)
    }
}
