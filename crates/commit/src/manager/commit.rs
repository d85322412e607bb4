//! Commit paths: synchronous, asynchronous finish, forced reload, and full
//! reparse.

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use quill_primitives::{Document, HostedDocument};
use quill_syntax::{ReparseError, SyntaxFile};
use quill_worker::{CancelToken, Modality, panic_message};

use super::scope::DocScope;
use super::{CommitManager, REASON_COMMIT_ALL, REASON_COMMIT_DOCUMENT, run_guarded};
use crate::processor::{CommitJob, CommitResult};
use crate::{CommitError, CommitStatus};

/// Result of applying finish processors inside the write action.
enum Applied {
	Committed,
	Aborted,
	/// Finish processors succeeded but the document moved past the parsed stamp.
	Diverged { parsed: u64, current: u64 },
	/// A finish processor panicked.
	Panicked(String),
}

impl CommitManager {
	/// Commits `document` now unless it is already committed.
	///
	/// Event-system documents require write intent.
	pub fn commit_document(&self, document: &impl HostedDocument) -> Result<CommitStatus, CommitError> {
		self.ensure_live()?;
		let document = document.top_level();
		if document.is_event_system_enabled() && !self.lock.has_write_intent() {
			return Err(CommitError::NoWriteIntent(document.id()));
		}
		if self.is_committed(document) {
			return Ok(CommitStatus::Completed);
		}
		self.commit_now(document, REASON_COMMIT_DOCUMENT)
	}

	/// Commits every uncommitted document, from the dispatch thread.
	pub fn commit_all_documents(&self) -> Result<(), CommitError> {
		self.ensure_live()?;
		self.ensure_dispatch_thread()?;

		let documents = self.uncommitted.documents();
		tracing::trace!(count = documents.len(), "commit.all.start");
		for document in &documents {
			let id = document.id();
			if !self.uncommitted.contains(id) {
				if document.is_event_system_enabled() {
					self.invariant_violation(id, "listed as uncommitted but committed before commit_all reached it".into())?;
				} else {
					tracing::debug!(doc_id = ?id, "commit.all.lost_race");
				}
				continue;
			}
			let status = self.commit_now(document, REASON_COMMIT_ALL)?;
			tracing::trace!(doc_id = ?id, ?status, "commit.all.step");
		}
		self.drain_if_all_committed();
		Ok(())
	}

	/// Discards uncommitted state and drops the file tree; the tree is rebuilt
	/// from the document text on next access.
	pub fn force_reload(&self, document: &impl HostedDocument) {
		let document = document.top_level();
		self.reload(document, None);
		self.after_commit(document);
	}

	/// Reparses `file` from scratch from its own text, bypassing incremental
	/// reparse.
	///
	/// # Errors
	///
	/// [`CommitError::ReentrantReparse`] if a commit or full reparse is already
	/// running for the same document.
	pub fn reparse_file_from_text(&self, file: &Arc<SyntaxFile>) -> Result<CommitStatus, CommitError> {
		self.ensure_live()?;
		let id = file.document_id();
		if !self.lock.has_write_intent() {
			return Err(CommitError::NoWriteIntent(id));
		}
		if self.committing.lock().contains(&id) {
			return Err(CommitError::ReentrantReparse(id));
		}
		let Some(_scope) = DocScope::acquire(&self.full_reparse, id) else {
			return Err(CommitError::ReentrantReparse(id));
		};

		let (text, stamp) = match (file.tree(), file.installed_stamp()) {
			(Some(tree), Some(stamp)) => (tree.text().clone(), stamp),
			_ => match self.binding.document_for_file(file.id()) {
				Some(document) => {
					let frozen = document.freeze();
					(frozen.text, frozen.stamp)
				}
				None => return Ok(CommitStatus::Completed),
			},
		};

		let cancel = CancelToken::new();
		let result = catch_unwind(AssertUnwindSafe(|| self.engine.parse(&text, &cancel))).unwrap_or_else(|payload| Err(ReparseError::Panicked(panic_message(&*payload))));
		match result {
			Ok(tree) => {
				let len = tree.len_chars();
				self.lock.write_action(|| file.install(tree, stamp));
				self.hooks.update_pointer_targets(id, len);
				tracing::debug!(doc_id = ?id, path = %file.path().display(), len, "commit.full_reparse.done");
				Ok(CommitStatus::Completed)
			}
			Err(err) => {
				tracing::error!(doc_id = ?id, path = %file.path().display(), error = %err, "commit.full_reparse.failed");
				file.invalidate();
				Ok(CommitStatus::Failed(err))
			}
		}
	}

	/// Synchronous commit of an uncommitted top-level document.
	pub(super) fn commit_now(&self, document: &Arc<Document>, reason: &'static str) -> Result<CommitStatus, CommitError> {
		let id = document.id();
		if self.synchronizer.is_document_affected_by_transactions(id) {
			tracing::trace!(doc_id = ?id, "commit.deferred.transaction");
			return Ok(CommitStatus::Deferred);
		}

		let status = {
			let Some(_scope) = DocScope::acquire(&self.committing, id) else {
				tracing::debug!(doc_id = ?id, "commit.deferred.in_progress");
				return Ok(CommitStatus::Deferred);
			};
			match self.prepare_job(document, Cow::Borrowed(reason)) {
				Some(job) => {
					let result = catch_unwind(AssertUnwindSafe(|| self.processor.commit_synchronously(&job)))
						.unwrap_or_else(|payload| Err(ReparseError::Panicked(panic_message(&*payload))));
					self.finish_commit(&job, result)?
				}
				None => {
					self.uncommitted.remove(id);
					tracing::debug!(doc_id = ?id, "commit.no_file");
					CommitStatus::Completed
				}
			}
		};
		self.after_commit(document);
		Ok(status)
	}

	/// Builds a job for the document's current text, fastening pointer belts
	/// first. `None` when no file is bound.
	pub(super) fn prepare_job(&self, document: &Arc<Document>, reason: Cow<'static, str>) -> Option<CommitJob> {
		let id = document.id();
		let file = self.binding.file_for_document(id)?;
		if let Some(events) = self.uncommitted.with_info(id, |info| info.pending_events().to_vec()) {
			self.hooks.fasten_belts(id, &events);
		}
		Some(CommitJob {
			document: document.clone(),
			file,
			snapshot: document.freeze(),
			skip_incremental: self.uncommitted.skip_incremental(id),
			reason,
			cancel: CancelToken::new(),
		})
	}

	/// Hands the document to the processor for a background commit.
	pub(super) fn schedule_async_commit(&self, document: &Arc<Document>, reason: Cow<'static, str>, modality: Modality) {
		let Some(job) = self.prepare_job(document, reason) else {
			return;
		};
		tracing::trace!(doc_id = ?document.id(), reason = %job.reason, ?modality, "commit.async.request");
		self.processor.commit_asynchronously(self.handle(), job, modality);
	}

	/// Applies a background result on the dispatch thread.
	pub(super) fn finish_async(&self, job: CommitJob, result: CommitResult) {
		let document = job.document.clone();
		let id = document.id();
		if self.is_committed(&document) {
			tracing::debug!(doc_id = ?id, stamp = job.snapshot.stamp, "commit.finish.already_committed");
			return;
		}
		if self.synchronizer.is_document_affected_by_transactions(id) {
			tracing::trace!(doc_id = ?id, "commit.deferred.transaction");
			return;
		}

		let status = {
			let Some(_scope) = DocScope::acquire(&self.committing, id) else {
				tracing::debug!(doc_id = ?id, "commit.deferred.in_progress");
				return;
			};
			match self.finish_commit(&job, result) {
				Ok(status) => status,
				Err(err) => {
					tracing::error!(doc_id = ?id, error = %err, "commit.finish.failed");
					return;
				}
			}
		};
		tracing::trace!(doc_id = ?id, ?status, reason = %job.reason, "commit.async.finished");
		self.after_commit(&document);
	}

	/// Applies a processor result. Finish processors run in order under a
	/// write action; the first one returning false aborts the commit.
	fn finish_commit(&self, job: &CommitJob, result: CommitResult) -> Result<CommitStatus, CommitError> {
		let id = job.document_id();
		let finishers = match result {
			Ok(finishers) => finishers,
			Err(ReparseError::Cancelled) => {
				tracing::trace!(doc_id = ?id, "commit.cancelled");
				return Ok(CommitStatus::Cancelled);
			}
			Err(err) => return Ok(self.commit_exception(job, err)),
		};

		let parsed = job.snapshot.stamp;
		let applied = self.lock.write_action(|| {
			for (idx, finish) in finishers.into_iter().enumerate() {
				match catch_unwind(AssertUnwindSafe(finish)) {
					Ok(true) => {}
					Ok(false) => {
						tracing::debug!(doc_id = ?id, step = idx, "commit.finish.aborted");
						return Applied::Aborted;
					}
					Err(payload) => return Applied::Panicked(panic_message(&*payload)),
				}
			}
			if !self.uncommitted.remove_if_unchanged(id, parsed) {
				return Applied::Diverged {
					parsed,
					current: job.document.modification_stamp(),
				};
			}
			if let Some(len) = job.file.text_len() {
				self.hooks.update_pointer_targets(id, len);
			}
			Applied::Committed
		});

		match applied {
			Applied::Committed => Ok(CommitStatus::Completed),
			Applied::Aborted => Ok(CommitStatus::Aborted),
			Applied::Panicked(message) => Ok(self.commit_exception(job, ReparseError::Panicked(message))),
			Applied::Diverged { parsed, current } => {
				self.invariant_violation(id, format!("committed at stamp {parsed} but still uncommitted at stamp {current}"))?;
				Ok(CommitStatus::Completed)
			}
		}
	}

	/// Logs a failed commit with its diagnostics and reloads the document.
	fn commit_exception(&self, job: &CommitJob, err: ReparseError) -> CommitStatus {
		tracing::error!(
			doc_id = ?job.document_id(),
			event_system = job.document.is_event_system_enabled(),
			path = %job.file.path().display(),
			document_len = job.document.len_chars(),
			tree_len = ?job.file.text_len(),
			reason = %job.reason,
			error = %err,
			"commit.exception"
		);
		self.reload(&job.document, Some(job.file.clone()));
		CommitStatus::Failed(err)
	}

	fn reload(&self, document: &Arc<Document>, file: Option<Arc<SyntaxFile>>) {
		let id = document.id();
		self.processor.cancel(id);
		if let Some(file) = file.or_else(|| self.binding.file_for_document(id)) {
			file.invalidate();
		}
		let had_info = self.uncommitted.remove(id).is_some();
		tracing::debug!(doc_id = ?id, had_info, "commit.force_reload");
	}

	/// Runs the document's pending actions once it is committed, then drains
	/// the global queue if nothing is left uncommitted.
	pub(super) fn after_commit(&self, document: &Arc<Document>) {
		if !self.is_committed(document) {
			return;
		}
		self.run_pending_actions(document);
		if document.is_event_system_enabled() {
			self.schedule_drain();
		}
	}

	/// Takes the document's pending actions and runs them. Actions of
	/// event-system documents always run on the dispatch thread.
	pub(super) fn run_pending_actions(&self, document: &Arc<Document>) {
		let actions = self.pending.take(document.id());
		if actions.is_empty() {
			return;
		}
		tracing::trace!(doc_id = ?document.id(), count = actions.len(), "commit.pending_actions.run");
		if document.is_event_system_enabled() && !self.dispatcher.is_dispatch_thread() {
			let modality = self.dispatcher.current_modality();
			for action in actions {
				self.dispatcher.invoke_later(modality, move || run_guarded(action, "pending_action"));
			}
		} else {
			for action in actions {
				run_guarded(action, "pending_action");
			}
		}
	}
}
