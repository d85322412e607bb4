use quill_primitives::DocumentId;
use thiserror::Error;

/// Contract violations by callers of the commit core.
///
/// Runtime conditions (cancellation, reparse failures, deferral) are reported
/// through [`crate::CommitStatus`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
	#[error("must be called on the dispatch thread")]
	NotDispatchThread,
	#[error("write intent required to commit {0}")]
	NoWriteIntent(DocumentId),
	#[error("cannot register all-committed actions while they are being drained")]
	ReentrantAllCommitted,
	#[error("cannot reparse {0}: a commit or full reparse is already in progress")]
	ReentrantReparse(DocumentId),
	#[error("{0} must be committed before starting a syntax transaction")]
	Uncommitted(DocumentId),
	#[error("commit session is disposed")]
	Disposed,
	#[error("invariant violated for {document}: {message}")]
	InvariantViolation { document: DocumentId, message: String },
}
