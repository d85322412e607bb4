//! Document ⇄ syntax commit orchestration.
//!
//! [`CommitManager`] is one session's state: the uncommitted set, the
//! per-document and global callback queues, the synchronizer, and the
//! in-progress marks. It listens to every tracked document and schedules
//! commits on the injected [`CommitProcessor`].
//!
//! Threading: documents may be edited from any thread; everything that runs
//! callbacks or drains queues is confined to the [`Dispatcher`] thread.

mod callbacks;
mod commit;
mod scope;
mod transaction;
mod wait;


use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use quill_primitives::{Document, DocumentEvent, DocumentId, DocumentListener, DocumentWindow, FrozenDocument, HostedDocument, Rope};
use quill_syntax::{BlockEngine, FileBinding, SyntaxEngine};
use quill_worker::{Dispatcher, Modality, panic_message};
use rustc_hash::FxHashSet;
pub use transaction::PsiTransaction;

use crate::anchors::{NoopHooks, PointerHooks};
use crate::processor::{BackgroundCommitProcessor, CommitJob, CommitProcessor, CommitResult};
use crate::queue::{Action, AllCommittedQueue, PendingActions};
use crate::uncommitted::{UncommittedInfo, UncommittedSet};
use crate::{CommitCfg, CommitError, InvariantPolicy, ModelLock, Synchronizer};

/// Reason attached to commits scheduled by a document edit.
pub const REASON_DOCUMENT_CHANGED: &str = "document changed";
/// Reason attached to commits re-requested under a write-safe modal state.
pub const REASON_PERFORM_WHEN_ALL_COMMITTED: &str = "re-added because perform_when_all_committed(...) was called";
/// Reason attached to commits scheduled when a syntax transaction closes.
pub const REASON_TRANSACTION_FINISHED: &str = "syntax transaction finished";
const REASON_COMMIT_DOCUMENT: &str = "commit_document";
const REASON_COMMIT_ALL: &str = "commit_all_documents";

/// Weak, cloneable reference to a session, safe to hold from background work.
///
/// Upgrading fails once the session is dropped or disposed.
#[derive(Clone)]
pub struct SessionHandle {
	session: Weak<CommitManager>,
	dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionHandle").field("alive", &self.upgrade().is_some()).finish()
	}
}

impl SessionHandle {
	pub fn upgrade(&self) -> Option<Arc<CommitManager>> {
		self.session.upgrade().filter(|m| !m.is_disposed())
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	/// Hands a background reparse result to the dispatch thread, where the
	/// session applies it under a write action.
	pub fn post_finish(&self, job: CommitJob, result: CommitResult, modality: Modality) {
		let handle = self.clone();
		self.dispatcher.invoke_later(modality, move || {
			if let Some(manager) = handle.upgrade() {
				manager.finish_async(job, result);
			}
		});
	}
}

struct SessionListener {
	session: Weak<CommitManager>,
}

impl DocumentListener for SessionListener {
	fn before_change(&self, document: &Arc<Document>, event: &DocumentEvent) {
		if let Some(manager) = self.session.upgrade() {
			manager.before_document_change(document, event);
		}
	}

	fn after_change(&self, document: &Arc<Document>, event: &DocumentEvent) {
		if let Some(manager) = self.session.upgrade() {
			manager.after_document_change(document, event);
		}
	}
}

pub struct CommitManagerBuilder {
	dispatcher: Arc<Dispatcher>,
	binding: Arc<dyn FileBinding>,
	cfg: CommitCfg,
	engine: Option<Arc<dyn SyntaxEngine>>,
	processor: Option<Arc<dyn CommitProcessor>>,
	hooks: Option<Arc<dyn PointerHooks>>,
}

impl CommitManagerBuilder {
	pub fn cfg(mut self, cfg: CommitCfg) -> Self {
		self.cfg = cfg;
		self
	}

	pub fn engine(mut self, engine: Arc<dyn SyntaxEngine>) -> Self {
		self.engine = Some(engine);
		self
	}

	/// Overrides the default [`BackgroundCommitProcessor`].
	pub fn processor(mut self, processor: Arc<dyn CommitProcessor>) -> Self {
		self.processor = Some(processor);
		self
	}

	pub fn hooks(mut self, hooks: Arc<dyn PointerHooks>) -> Self {
		self.hooks = Some(hooks);
		self
	}

	pub fn build(self) -> Arc<CommitManager> {
		let engine = self.engine.unwrap_or_else(|| Arc::new(BlockEngine));
		let processor = self
			.processor
			.unwrap_or_else(|| Arc::new(BackgroundCommitProcessor::new(engine.clone(), self.cfg.max_concurrency)));
		let hooks = self.hooks.unwrap_or_else(|| Arc::new(NoopHooks));
		tracing::debug!(cfg = ?self.cfg, "commit.session.open");

		Arc::new_cyclic(|weak| CommitManager {
			lock: ModelLock::new(self.dispatcher.clone()),
			dispatcher: self.dispatcher,
			cfg: self.cfg,
			binding: self.binding,
			engine,
			processor,
			hooks,
			synchronizer: Synchronizer::new(),
			uncommitted: UncommittedSet::default(),
			pending: PendingActions::default(),
			all_committed: Mutex::new(AllCommittedQueue::default()),
			tracked: DashMap::new(),
			listener: Arc::new(SessionListener { session: weak.clone() }),
			committing: Mutex::new(FxHashSet::default()),
			full_reparse: Mutex::new(FxHashSet::default()),
			disposed: AtomicBool::new(false),
			weak: weak.clone(),
		})
	}
}

/// One session of document/syntax synchronization.
pub struct CommitManager {
	cfg: CommitCfg,
	dispatcher: Arc<Dispatcher>,
	lock: ModelLock,
	binding: Arc<dyn FileBinding>,
	engine: Arc<dyn SyntaxEngine>,
	processor: Arc<dyn CommitProcessor>,
	hooks: Arc<dyn PointerHooks>,
	synchronizer: Synchronizer,
	uncommitted: UncommittedSet,
	pending: PendingActions,
	all_committed: Mutex<AllCommittedQueue>,
	tracked: DashMap<DocumentId, Arc<Document>>,
	listener: Arc<dyn DocumentListener>,
	/// Documents with a commit being applied.
	committing: Mutex<FxHashSet<DocumentId>>,
	/// Documents being reparsed by [`Self::reparse_file_from_text`].
	full_reparse: Mutex<FxHashSet<DocumentId>>,
	disposed: AtomicBool,
	weak: Weak<CommitManager>,
}

impl std::fmt::Debug for CommitManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CommitManager")
			.field("tracked", &self.tracked.len())
			.field("uncommitted", &self.uncommitted.len())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

impl CommitManager {
	pub fn builder(dispatcher: Arc<Dispatcher>, binding: Arc<dyn FileBinding>) -> CommitManagerBuilder {
		CommitManagerBuilder {
			dispatcher,
			binding,
			cfg: CommitCfg::default(),
			engine: None,
			processor: None,
			hooks: None,
		}
	}

	pub fn handle(&self) -> SessionHandle {
		SessionHandle {
			session: self.weak.clone(),
			dispatcher: self.dispatcher.clone(),
		}
	}

	pub fn cfg(&self) -> &CommitCfg {
		&self.cfg
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	pub fn model_lock(&self) -> &ModelLock {
		&self.lock
	}

	pub fn synchronizer(&self) -> &Synchronizer {
		&self.synchronizer
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}

	fn ensure_live(&self) -> Result<(), CommitError> {
		if self.is_disposed() {
			return Err(CommitError::Disposed);
		}
		Ok(())
	}

	fn ensure_dispatch_thread(&self) -> Result<(), CommitError> {
		if !self.dispatcher.is_dispatch_thread() {
			return Err(CommitError::NotDispatchThread);
		}
		Ok(())
	}

	/// Starts listening to `document`. Edits are tracked only while a file is
	/// bound to it.
	pub fn track(&self, document: &Arc<Document>) {
		if self.is_disposed() {
			return;
		}
		if self.tracked.insert(document.id(), document.clone()).is_none() {
			document.add_listener(self.listener.clone());
			tracing::trace!(doc_id = ?document.id(), event_system = document.is_event_system_enabled(), "commit.track");
		}
	}

	/// Drops every per-document side table for a closed document.
	pub fn on_document_close(&self, document: &impl HostedDocument) {
		let document = document.top_level();
		let id = document.id();
		if let Some((_, doc)) = self.tracked.remove(&id) {
			doc.remove_listener(&self.listener);
		}
		self.processor.cancel(id);
		self.uncommitted.remove(id);
		let dropped = self.pending.take(id).len();
		self.synchronizer.forget(id);
		self.hooks.forget(id);
		tracing::debug!(doc_id = ?id, dropped_actions = dropped, "commit.document.closed");
		if document.is_event_system_enabled() {
			self.schedule_drain();
		}
	}

	/// Tears the session down. Queued callbacks are dropped without running
	/// and later dispatcher work for this session does nothing.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.processor.cancel_all();
		for doc in self.tracked.iter() {
			doc.remove_listener(&self.listener);
		}
		self.tracked.clear();
		self.uncommitted.clear();
		self.pending.clear();
		self.all_committed.lock().clear();
		tracing::debug!("commit.session.disposed");
	}

	/// True iff the backing document is in synchronization or not uncommitted.
	pub fn is_committed(&self, document: &impl HostedDocument) -> bool {
		let id = document.top_level().id();
		self.synchronizer.is_in_synchronization(id) || !self.uncommitted.contains(id)
	}

	pub fn is_uncommitted(&self, document: &impl HostedDocument) -> bool {
		!self.is_committed(document)
	}

	pub fn has_uncommitted_documents(&self) -> bool {
		!self.uncommitted.is_empty()
	}

	pub fn uncommitted_documents(&self) -> Vec<Arc<Document>> {
		self.uncommitted.documents()
	}

	/// True while any commit is being applied.
	pub fn is_commit_in_progress(&self) -> bool {
		!self.committing.lock().is_empty()
	}

	pub fn is_full_reparse_in_progress(&self, document: &impl HostedDocument) -> bool {
		self.full_reparse.lock().contains(&document.top_level().id())
	}

	/// Runs `f` against the document's uncommitted info, if it has one.
	pub fn uncommitted_info<R>(&self, document: &impl HostedDocument, f: impl FnOnce(&UncommittedInfo) -> R) -> Option<R> {
		self.uncommitted.with_info(document.top_level().id(), f)
	}

	/// True if the next commit bypasses incremental reparse.
	pub fn skips_incremental_reparse(&self, document: &impl HostedDocument) -> bool {
		self.uncommitted.skip_incremental(document.top_level().id())
	}

	/// Text the syntax tree corresponds to: the frozen snapshot while
	/// uncommitted, the live text otherwise.
	pub fn last_committed_text(&self, document: &impl HostedDocument) -> Rope {
		self.last_committed(document.top_level()).text
	}

	pub fn last_committed_stamp(&self, document: &impl HostedDocument) -> u64 {
		self.last_committed(document.top_level()).stamp
	}

	/// Last committed view of an injected window.
	pub fn last_committed_window(&self, window: &DocumentWindow) -> FrozenDocument {
		let host = window.top_level();
		self.uncommitted
			.with_info(host.id(), |info| info.frozen_window(window))
			.unwrap_or_else(|| {
				let frozen = host.freeze();
				frozen.slice(window.id(), window.clamped_range(frozen.len_chars()))
			})
	}

	fn last_committed(&self, document: &Arc<Document>) -> FrozenDocument {
		let id = document.id();
		if let Some(frozen) = self.uncommitted.with_info(id, |info| info.frozen().clone()) {
			return frozen;
		}
		if self.uncommitted.contains(id)
			&& let Some(file) = self.binding.file_for_document(id)
			&& let (Some(tree), Some(stamp)) = (file.tree(), file.installed_stamp())
		{
			return FrozenDocument {
				id,
				text: tree.text().clone(),
				stamp,
			};
		}
		document.freeze()
	}

	fn before_document_change(&self, document: &Arc<Document>, _event: &DocumentEvent) {
		let id = document.id();
		if self.is_disposed() || self.synchronizer.is_in_synchronization(id) || self.binding.file_for_document(id).is_none() {
			return;
		}
		if self.uncommitted.before_change(document) {
			tracing::trace!(doc_id = ?id, stamp = document.modification_stamp(), "commit.uncommitted.enter");
		}
	}

	fn after_document_change(&self, document: &Arc<Document>, event: &DocumentEvent) {
		let id = document.id();
		if self.is_disposed() || self.synchronizer.is_in_synchronization(id) || self.binding.file_for_document(id).is_none() {
			return;
		}
		self.uncommitted.after_change(document, event, self.cfg.large_replace_threshold);
		if document.is_event_system_enabled() && self.cfg.auto_commit {
			self.schedule_async_commit(document, Cow::Borrowed(REASON_DOCUMENT_CHANGED), self.dispatcher.current_modality());
		}
	}

	/// Logs a broken bookkeeping invariant; fails under [`InvariantPolicy::Fail`].
	fn invariant_violation(&self, document: DocumentId, message: String) -> Result<(), CommitError> {
		tracing::error!(doc_id = ?document, %message, policy = ?self.cfg.invariant_policy, "commit.invariant_violated");
		match self.cfg.invariant_policy {
			InvariantPolicy::Log => Ok(()),
			InvariantPolicy::Fail => Err(CommitError::InvariantViolation { document, message }),
		}
	}
}

/// Runs a queued callback, containing panics.
fn run_guarded(action: Action, what: &'static str) {
	if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
		tracing::error!(callback = what, panic = %panic_message(&*payload), "commit.callback.panicked");
	}
}
