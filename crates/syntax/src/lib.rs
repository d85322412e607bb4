//! Syntax side of document synchronization.
//!
//! A [`SyntaxFile`] is the parsed view of one document. Its [`SyntaxTree`] is
//! produced by a [`SyntaxEngine`], either from scratch or incrementally by
//! reusing the blocks untouched by an edit. Files are looked up from documents
//! through a [`FileBinding`].

mod binding;
mod engine;
mod error;
mod file;
mod metrics;
mod tree;


pub use binding::{FileBinding, FileRegistry};
pub use engine::{BlockEngine, SyntaxEngine};
pub use error::ReparseError;
pub use file::{FileId, SyntaxFile};
pub use metrics::{ReparseKind, ReparseMetrics};
pub use tree::{Block, BlockKind, SyntaxTree};
