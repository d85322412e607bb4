use quill_worker::Cancelled;
use thiserror::Error;

/// Reasons a reparse did not produce a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReparseError {
	/// Cooperative cancellation; the caller retries later.
	#[error("reparse cancelled")]
	Cancelled,
	/// The engine rejected the text.
	#[error("parse failed: {0}")]
	Parse(String),
	/// Reparse work panicked.
	#[error("reparse panicked: {0}")]
	Panicked(String),
}

impl From<Cancelled> for ReparseError {
	fn from(_: Cancelled) -> Self {
		Self::Cancelled
	}
}
