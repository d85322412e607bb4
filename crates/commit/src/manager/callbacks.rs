//! Callback scheduling keyed to commit completion.

use std::borrow::Cow;

use parking_lot::Mutex;
use quill_primitives::HostedDocument;
use quill_worker::Modality;

use super::{CommitManager, REASON_PERFORM_WHEN_ALL_COMMITTED, SessionHandle, run_guarded};
use crate::CommitError;
use crate::queue::{Action, ActionKey, AllCommittedQueue};

/// Leaves the draining state on every exit path.
struct DrainGuard<'a>(&'a Mutex<AllCommittedQueue>);

impl Drop for DrainGuard<'_> {
	fn drop(&mut self) {
		self.0.lock().end_drain();
	}
}

impl CommitManager {
	/// Runs `action` now if the document is committed, otherwise after its
	/// next successful commit.
	pub fn perform_for_committed_document(&self, document: &impl HostedDocument, action: impl FnOnce() + Send + 'static) {
		let document = document.top_level();
		if self.is_committed(document) {
			action();
			return;
		}
		let id = document.id();
		self.pending.push(id, Box::new(action));
		// A commit finishing between the check and the push has already
		// drained the queue; nothing else would run this action.
		if self.is_committed(document) {
			self.run_pending_actions(document);
			return;
		}
		tracing::trace!(doc_id = ?id, queued = self.pending.len(id), "commit.pending_action.queued");
	}

	/// Number of actions waiting for the document's next commit.
	pub fn pending_action_count(&self, document: &impl HostedDocument) -> usize {
		self.pending.len(document.top_level().id())
	}

	/// Number of actions waiting for every document to be committed.
	pub fn all_committed_action_count(&self) -> usize {
		self.all_committed.lock().len()
	}

	/// Runs `action` now and returns true if nothing is uncommitted; otherwise
	/// replaces whatever was registered under `key` and returns false.
	///
	/// # Errors
	///
	/// [`CommitError::ReentrantAllCommitted`] when called while the queue is
	/// draining, [`CommitError::NotDispatchThread`] off the dispatch thread.
	pub fn cancel_and_run_when_all_committed(&self, key: impl Into<ActionKey>, action: impl FnOnce() + Send + 'static) -> Result<bool, CommitError> {
		self.ensure_live()?;
		self.ensure_dispatch_thread()?;
		self.all_committed.lock().check_registration()?;
		if self.is_all_committed() {
			action();
			return Ok(true);
		}
		let key = key.into();
		tracing::trace!(?key, "commit.all_committed.queued");
		self.all_committed.lock().replace(key, Box::new(action))?;
		Ok(false)
	}

	/// Like [`Self::cancel_and_run_when_all_committed`] without a key. When
	/// `modality` is a write-safe modal state, every uncommitted event-system
	/// document is re-submitted for an asynchronous commit under it, so a
	/// modal loop that never runs non-modal work still gets its commits.
	pub fn perform_when_all_committed(&self, action: impl FnOnce() + Send + 'static, modality: Modality) -> Result<bool, CommitError> {
		self.ensure_live()?;
		self.ensure_dispatch_thread()?;
		self.all_committed.lock().check_registration()?;
		if self.is_all_committed() {
			action();
			return Ok(true);
		}
		self.all_committed.lock().append(Box::new(action))?;

		if modality != Modality::NonModal && modality.is_write_safe() {
			for document in self.uncommitted.documents() {
				if document.is_event_system_enabled() {
					self.schedule_async_commit(&document, Cow::Borrowed(REASON_PERFORM_WHEN_ALL_COMMITTED), modality);
				}
			}
		}
		Ok(false)
	}

	/// Posts `action` to the dispatcher; when it comes up it runs if every
	/// document is committed and re-posts itself otherwise. Never runs once
	/// the session is disposed.
	pub fn perform_later_when_all_committed(&self, modality: Modality, action: impl FnOnce() + Send + 'static) {
		self.handle().post_when_all_committed(modality, Box::new(action));
	}

	fn is_all_committed(&self) -> bool {
		!self.uncommitted.has_event_system_documents() && !self.is_commit_in_progress()
	}

	/// Drains the global queue now on the dispatch thread, or posts the drain
	/// there.
	pub(super) fn schedule_drain(&self) {
		if self.dispatcher.is_dispatch_thread() {
			self.drain_if_all_committed();
			return;
		}
		if self.all_committed.lock().is_empty() {
			return;
		}
		let handle = self.handle();
		self.dispatcher.invoke_later(Modality::NonModal, move || {
			if let Some(manager) = handle.upgrade() {
				manager.drain_if_all_committed();
			}
		});
	}

	pub(super) fn drain_if_all_committed(&self) {
		if self.is_disposed() || !self.is_all_committed() {
			return;
		}
		let actions = {
			let mut queue = self.all_committed.lock();
			if queue.is_empty() || queue.is_draining() {
				return;
			}
			queue.begin_drain()
		};
		let _guard = DrainGuard(&self.all_committed);
		tracing::trace!(count = actions.len(), "commit.all_committed.drain");
		for action in actions {
			run_guarded(action, "all_committed_action");
		}
	}
}

impl SessionHandle {
	fn post_when_all_committed(&self, modality: Modality, action: Action) {
		let handle = self.clone();
		self.dispatcher.invoke_later(modality, move || {
			let Some(manager) = handle.upgrade() else {
				tracing::trace!("commit.perform_later.disposed");
				return;
			};
			if manager.uncommitted.has_event_system_documents() {
				handle.post_when_all_committed(modality, action);
			} else {
				action();
			}
		});
	}
}
