use quill_syntax::ReparseError;

/// Outcome of one commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
	/// The document is committed (it may already have been).
	Completed,
	/// A syntax transaction is in flight; re-check later.
	Deferred,
	/// Reparse was cancelled; the document stays uncommitted.
	Cancelled,
	/// A finish processor returned false; the document stays uncommitted.
	Aborted,
	/// Reparse failed; the file tree was dropped and the document force-reloaded.
	Failed(ReparseError),
}

impl CommitStatus {
	pub fn is_completed(&self) -> bool {
		matches!(self, Self::Completed)
	}
}
