use std::ops::Range;

use thiserror::Error;

use crate::DocumentId;

/// Errors returned by document mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
	/// The document is flagged read-only.
	#[error("document {0} is read-only")]
	ReadOnly(DocumentId),
	/// The edit range does not fit the current text.
	#[error("edit range {range:?} out of bounds for document {id} of length {len}")]
	OutOfBounds {
		/// Document being edited.
		id: DocumentId,
		/// Requested char range.
		range: Range<usize>,
		/// Char length at the time of the edit.
		len: usize,
	},
}
