//! Lattis speech-decoding core
//!
//! Loads an acoustic/search model bundle once and decodes utterances
//! against it, producing recognition lattices in a keyed archive.
//!
//! ## Layout
//!
//! - Model artifacts: [`TransitionModel`], [`AcousticModel`],
//!   [`DecodeGraph`], [`SymbolTable`], bundled by [`ModelContext`]
//! - Handle registry for sharing contexts across a foreign boundary
//! - [`DecodeSession`]: single-utterance and batch decode paths over one
//!   shared read-only context
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lattis_decoder::{DecodeSession, ModelContext};
//!
//! let context = Arc::new(ModelContext::load(
//!     "exp/final.mdl",
//!     "exp/graph.fst.txt",
//!     "exp/words.txt",
//! )?);
//!
//! let session = DecodeSession::with_defaults(context);
//! let outcome = session.decode_buffer("lat.ark", "utt-1", &[0.0; 4000], 100, 40)?;
//! println!("{}: {}", outcome.success, outcome.text);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acoustic;
pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod features;
pub mod graph;
pub mod lattice;
pub mod model;
pub mod registry;
pub mod scorer;
pub mod session;
pub mod symbols;
pub mod transition;

pub use acoustic::AcousticModel;
pub use config::DecoderConfig;
pub use context::ModelContext;
pub use decoder::LatticeDecoder;
pub use error::{DecodeError, Result};
pub use features::{matrix_from_flat, FeatureArchiveReader, FeatureArchiveWriter};
pub use graph::DecodeGraph;
pub use lattice::{Lattice, LatticeArchiveReader, LatticePath, LatticeWriter};
pub use model::ModelFile;
pub use registry::Handle;
pub use scorer::CachingScorer;
pub use session::{DecodeOutcome, DecodeSession, DecodeStats};
pub use symbols::SymbolTable;
pub use transition::TransitionModel;
