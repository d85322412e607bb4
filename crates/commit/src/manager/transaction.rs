//! Syntax-originated edits mirrored into documents.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use quill_primitives::{Document, EditError, HostedDocument};
use quill_worker::CancelToken;

use super::{CommitManager, REASON_TRANSACTION_FINISHED};
use crate::CommitError;
use crate::synchronizer::PsiEdit;

/// Open syntax transaction on one document.
///
/// Edits recorded with [`Self::replace`] are applied to the document when the
/// transaction finishes (or earlier via
/// [`CommitManager::do_postponed_operations_and_unblock_document`]). Until
/// then the document is blocked and commits of it are deferred.
#[must_use = "dropping the transaction flushes it immediately"]
pub struct PsiTransaction<'a> {
	manager: &'a CommitManager,
	document: Arc<Document>,
	finished: bool,
}

impl PsiTransaction<'_> {
	pub fn document(&self) -> &Arc<Document> {
		&self.document
	}

	/// Records a replacement in document char coordinates as of the moment
	/// it is applied (after every earlier recorded edit).
	pub fn replace(&self, range: Range<usize>, text: impl Into<String>) {
		let edit = PsiEdit { range, text: text.into() };
		if !self.manager.synchronizer.record(self.document.id(), edit) {
			tracing::warn!(doc_id = ?self.document.id(), "commit.transaction.record_without_transaction");
		}
	}

	/// Closes the transaction and mirrors any unflushed edits.
	pub fn finish(mut self) -> Result<(), EditError> {
		self.finished = true;
		self.manager.end_psi_transaction(&self.document)
	}
}

impl Drop for PsiTransaction<'_> {
	fn drop(&mut self) {
		if !self.finished
			&& let Err(err) = self.manager.end_psi_transaction(&self.document)
		{
			tracing::warn!(doc_id = ?self.document.id(), error = %err, "commit.transaction.flush_failed");
		}
	}
}

impl CommitManager {
	/// Opens a syntax transaction. The document must be committed.
	pub fn start_psi_transaction(&self, document: &impl HostedDocument) -> Result<PsiTransaction<'_>, CommitError> {
		self.ensure_live()?;
		let document = document.top_level();
		if !self.lock.has_write_intent() {
			return Err(CommitError::NoWriteIntent(document.id()));
		}
		if !self.is_committed(document) {
			return Err(CommitError::Uncommitted(document.id()));
		}
		let depth = self.synchronizer.begin(document.id());
		tracing::trace!(doc_id = ?document.id(), depth, "commit.transaction.start");
		Ok(PsiTransaction {
			manager: self,
			document: document.clone(),
			finished: false,
		})
	}

	pub fn is_in_synchronization(&self, document: &impl HostedDocument) -> bool {
		self.synchronizer.is_in_synchronization(document.top_level().id())
	}

	pub fn is_document_affected_by_transactions(&self, document: &impl HostedDocument) -> bool {
		self.synchronizer.is_document_affected_by_transactions(document.top_level().id())
	}

	/// True while recorded syntax edits have not reached the document text.
	pub fn is_document_blocked_by_psi(&self, document: &impl HostedDocument) -> bool {
		self.synchronizer.is_document_blocked(document.top_level().id())
	}

	/// Mirrors recorded syntax edits into the document now, leaving the
	/// transaction open.
	pub fn do_postponed_operations_and_unblock_document(&self, document: &impl HostedDocument) -> Result<(), EditError> {
		let document = document.top_level();
		let edits = self.synchronizer.take_postponed(document.id());
		self.apply_psi_edits(document, edits)
	}

	fn end_psi_transaction(&self, document: &Arc<Document>) -> Result<(), EditError> {
		let edits = self.synchronizer.end(document.id());
		let result = self.apply_psi_edits(document, edits);
		if !self.synchronizer.is_document_affected_by_transactions(document.id())
			&& !self.is_committed(document)
			&& document.is_event_system_enabled()
			&& self.cfg.auto_commit
		{
			self.schedule_async_commit(document, Cow::Borrowed(REASON_TRANSACTION_FINISHED), self.dispatcher.current_modality());
		}
		result
	}

	/// Applies `edits` with the document in synchronization, then brings the
	/// file tree up to the new text so the pair stays committed.
	fn apply_psi_edits(&self, document: &Arc<Document>, edits: Vec<PsiEdit>) -> Result<(), EditError> {
		if edits.is_empty() {
			return Ok(());
		}
		let id = document.id();
		let count = edits.len();
		let _sync = self.synchronizer.enter_sync(id);
		self.lock.write_action(|| {
			for edit in edits {
				document.replace(edit.range, &edit.text)?;
			}
			Ok::<(), EditError>(())
		})?;

		if let Some(file) = self.binding.file_for_document(id) {
			let frozen = document.freeze();
			let cancel = CancelToken::new();
			let tree = match file.tree() {
				Some(old) => self.engine.reparse(&old, &frozen.text, &cancel),
				None => self.engine.parse(&frozen.text, &cancel),
			};
			match tree {
				Ok(tree) => file.install(tree, frozen.stamp),
				Err(err) => {
					tracing::warn!(doc_id = ?id, error = %err, "commit.transaction.tree_update_failed");
					file.invalidate();
				}
			}
		}
		tracing::trace!(doc_id = ?id, edits = count, "commit.transaction.flushed");
		Ok(())
	}
}
