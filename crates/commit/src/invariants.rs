use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use quill_primitives::Rope;
use quill_syntax::{BlockEngine, ReparseError, SyntaxEngine, SyntaxFile, SyntaxTree};
use quill_worker::{CancelToken, Modality};

use crate::testing::{Harness, Scripted};
use crate::{CommitCfg, CommitError, CommitManager, CommitStatus, InvariantPolicy, REASON_PERFORM_WHEN_ALL_COMMITTED, REASON_TRANSACTION_FINISHED};

mod catalog;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn log() -> Log {
	Arc::new(Mutex::new(Vec::new()))
}

fn push(log: &Log, entry: &'static str) -> impl FnOnce() + Send + 'static {
	let log = log.clone();
	move || log.lock().push(entry)
}

/// Engine that tries a nested full reparse of `file` from inside `parse`.
#[derive(Default)]
struct ReentrantEngine {
	manager: OnceLock<Weak<CommitManager>>,
	file: OnceLock<Arc<SyntaxFile>>,
	nested: Mutex<Option<Result<CommitStatus, CommitError>>>,
}

impl SyntaxEngine for ReentrantEngine {
	fn parse(&self, text: &Rope, cancel: &CancelToken) -> Result<SyntaxTree, ReparseError> {
		let first = self.nested.lock().is_none();
		if first
			&& let (Some(manager), Some(file)) = (self.manager.get().and_then(Weak::upgrade), self.file.get())
		{
			let outcome = manager.reparse_file_from_text(file);
			*self.nested.lock() = Some(outcome);
		}
		BlockEngine.parse(text, cancel)
	}
}

/// Must not call the processor for a document that is already committed.
///
/// - Enforced in: `CommitManager::commit_document`
/// - Failure symptom: Redundant reparses on every caller that commits defensively.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_commit_of_committed_document_is_noop() {
	let h = Harness::new();
	let doc = h.open("alpha\nbeta\n");

	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Completed));
	assert_eq!(h.processor.sync_calls(), 0);

	doc.insert(0, "x").unwrap();
	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Completed));
	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Completed));
	assert_eq!(h.processor.sync_calls(), 1);
}

/// Must leave the file tree text equal to the document text after a completed commit.
///
/// - Enforced in: `install_processor`, `CommitManager::finish_commit`
/// - Failure symptom: Syntax queries answer against text the user no longer sees.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_completed_commit_matches_document_text() {
	let h = Harness::new();
	let doc = h.open("fn main() {}\n");

	doc.insert(12, "\nlet x = 1;").unwrap();
	doc.delete(0..3).unwrap();
	assert!(h.manager.is_uncommitted(&doc));

	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Completed));
	assert!(h.manager.is_committed(&doc));
	assert_eq!(h.tree_text(&doc), Some(doc.text().to_string()));
	assert_eq!(h.file(&doc).and_then(|f| f.installed_stamp()), Some(doc.modification_stamp()));
}

/// Must keep the pre-edit snapshot of the first edit while further edits pile up.
///
/// - Enforced in: `UncommittedSet::before_change`, `UncommittedSet::after_change`
/// - Failure symptom: Incremental reparse diffs against the wrong base and reuses stale blocks.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_coalesced_edits_keep_first_snapshot() {
	let h = Harness::new();
	let doc = h.open("one\ntwo\n");
	let original_stamp = doc.modification_stamp();

	doc.insert(0, "a").unwrap();
	doc.insert(0, "b").unwrap();
	doc.insert(0, "c").unwrap();

	let (events, frozen_text, frozen_stamp) = h
		.manager
		.uncommitted_info(&doc, |info| (info.pending_events().len(), info.frozen().text.to_string(), info.frozen().stamp))
		.unwrap();
	assert_eq!(events, 3);
	assert_eq!(frozen_text, "one\ntwo\n");
	assert_eq!(frozen_stamp, original_stamp);
	assert_eq!(h.manager.last_committed_text(&doc).to_string(), "one\ntwo\n");
	assert_eq!(h.processor.requests_for(doc.id()).len(), 3);
}

/// Must run per-document actions in registration order, each exactly once.
///
/// - Enforced in: `PendingActions::take`, `CommitManager::after_commit`
/// - Failure symptom: Dependent callbacks observe each other's effects out of order.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_pending_actions_run_in_order_once() {
	let h = Harness::new();
	let doc = h.open("text\n");
	let ran = log();

	doc.insert(0, "x").unwrap();
	h.manager.perform_for_committed_document(&doc, push(&ran, "a1"));
	h.manager.perform_for_committed_document(&doc, push(&ran, "a2"));
	h.manager.perform_for_committed_document(&doc, push(&ran, "a3"));
	assert!(ran.lock().is_empty());
	assert_eq!(h.manager.pending_action_count(&doc), 3);

	h.manager.commit_document(&doc).unwrap();
	assert_eq!(*ran.lock(), vec!["a1", "a2", "a3"]);

	doc.insert(0, "y").unwrap();
	h.manager.commit_document(&doc).unwrap();
	assert_eq!(ran.lock().len(), 3);
}

/// Must drain the global queue exactly once, after the last event-system document commits.
///
/// - Enforced in: `CommitManager::drain_if_all_committed`
/// - Failure symptom: "All committed" callbacks fire early against stale trees, or twice.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_global_queue_drains_once_after_last_commit() {
	let h = Harness::new();
	let first = h.open("first\n");
	let second = h.open("second\n");
	let count = Arc::new(AtomicUsize::new(0));

	first.insert(0, "1").unwrap();
	second.insert(0, "2").unwrap();
	let c = count.clone();
	let ran_now = h
		.manager
		.perform_when_all_committed(
			move || {
				c.fetch_add(1, Ordering::SeqCst);
			},
			Modality::NonModal,
		)
		.unwrap();
	assert!(!ran_now);

	h.manager.commit_document(&first).unwrap();
	assert_eq!(count.load(Ordering::SeqCst), 0);

	h.manager.commit_document(&second).unwrap();
	assert_eq!(count.load(Ordering::SeqCst), 1);

	h.settle();
	h.manager.commit_all_documents().unwrap();
	assert_eq!(count.load(Ordering::SeqCst), 1);
	assert_eq!(h.manager.all_committed_action_count(), 0);
}

/// Must reject all-committed registrations from inside a drain.
///
/// - Enforced in: `AllCommittedQueue::check_registration`
/// - Failure symptom: Callbacks that re-register themselves loop forever.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_registration_during_drain_is_rejected() {
	let h = Harness::new();
	let doc = h.open("body\n");
	let nested = Arc::new(Mutex::new(None));

	doc.insert(0, "x").unwrap();
	let manager = h.manager.clone();
	let seen = nested.clone();
	h.manager
		.cancel_and_run_when_all_committed("outer", move || {
			*seen.lock() = Some(manager.perform_when_all_committed(|| {}, Modality::NonModal));
		})
		.unwrap();

	h.manager.commit_document(&doc).unwrap();
	assert_eq!(*nested.lock(), Some(Err(CommitError::ReentrantAllCommitted)));

	// The queue leaves the draining state afterwards.
	assert_eq!(h.manager.perform_when_all_committed(|| {}, Modality::NonModal), Ok(true));
}

/// Must force a full reparse after a whole-text replacement above the threshold.
///
/// - Enforced in: `UncommittedSet::after_change`
/// - Failure symptom: Incremental diffing of huge rewrites stalls the background pool.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_large_replace_skips_incremental() {
	let h = Harness::new();
	let large = h.open("short\n");
	let small = h.open("short\n");

	large.set_text(&"x".repeat(200_000)).unwrap();
	small.set_text("still short\n").unwrap();

	assert!(h.manager.skips_incremental_reparse(&large));
	assert!(!h.manager.skips_incremental_reparse(&small));

	assert_eq!(h.manager.commit_document(&large), Ok(CommitStatus::Completed));
	assert!(!h.manager.skips_incremental_reparse(&large));
	assert_eq!(h.file(&large).and_then(|f| f.text_len()), Some(200_000));
}

/// Must re-request commits under a write-safe modal state so waiting callbacks can fire.
///
/// - Enforced in: `CommitManager::perform_when_all_committed`
/// - Failure symptom: A modal dialog waiting for commits hangs forever.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_modal_wait_requests_commits_under_modality() {
	let h = Harness::new();
	let first = h.open("one\n");
	let second = h.open("two\n");
	first.insert(0, "a").unwrap();
	second.insert(0, "b").unwrap();
	h.processor.clear_requests();

	let modal = h.dispatcher.enter_modal();
	let ran_at = Arc::new(Mutex::new(None));
	let dispatcher = h.dispatcher.clone();
	let slot = ran_at.clone();
	let ran_now = h
		.manager
		.perform_when_all_committed(move || *slot.lock() = Some(dispatcher.current_modality()), modal)
		.unwrap();
	assert!(!ran_now);

	let requests = h.processor.requests();
	assert_eq!(requests.len(), 2);
	for request in &requests {
		assert_eq!(request.reason, REASON_PERFORM_WHEN_ALL_COMMITTED);
		assert_eq!(request.modality, modal);
	}

	h.settle();
	assert_eq!(*ran_at.lock(), Some(modal));
	assert!(!h.manager.has_uncommitted_documents());
	h.dispatcher.exit_modal();
	h.settle();
}

/// Must report a document that stays uncommitted after a successful commit.
///
/// - Enforced in: `CommitManager::finish_commit`
/// - Failure symptom: Bookkeeping drifts silently and callbacks wait forever.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_diverged_commit_logs_by_default() {
	let h = Harness::new();
	let doc = h.open("abc\n");
	doc.insert(0, "x").unwrap();

	let target = doc.clone();
	h.processor.script(Scripted::Finish(vec![Box::new(move || {
		target.insert(0, "late").is_ok()
	})]));

	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Completed));
	assert!(h.manager.is_uncommitted(&doc));
}

/// Must report a document that stays uncommitted after a successful commit.
///
/// - Enforced in: `CommitManager::finish_commit`
/// - Failure symptom: Bookkeeping drifts silently and callbacks wait forever.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_diverged_commit_fails_under_fail_policy() {
	let h = Harness::with_cfg(CommitCfg {
		invariant_policy: InvariantPolicy::Fail,
		..CommitCfg::default()
	});
	let doc = h.open("abc\n");
	doc.insert(0, "x").unwrap();

	let target = doc.clone();
	h.processor.script(Scripted::Finish(vec![Box::new(move || {
		target.insert(0, "late").is_ok()
	})]));

	let result = h.manager.commit_document(&doc);
	assert!(matches!(result, Err(CommitError::InvariantViolation { document, .. }) if document == doc.id()));
	assert!(!h.manager.is_commit_in_progress());
}

/// Must reload the document after a commit failure and still run its pending actions.
///
/// - Enforced in: `CommitManager::finish_commit`, `CommitManager::reload`
/// - Failure symptom: A document stays uncommitted after a parser bug and blocks every waiter.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_commit_failure_reloads() {
	let h = Harness::new();
	let doc = h.open("abc\n");
	let ran = log();

	doc.insert(0, "x").unwrap();
	h.manager.perform_for_committed_document(&doc, push(&ran, "after"));
	h.processor.script(Scripted::Fail(ReparseError::Parse("bad token".into())));

	let status = h.manager.commit_document(&doc).unwrap();
	assert_eq!(status, CommitStatus::Failed(ReparseError::Parse("bad token".into())));
	assert!(h.manager.is_committed(&doc));
	assert!(h.file(&doc).is_some_and(|f| f.tree().is_none()));
	assert_eq!(*ran.lock(), vec!["after"]);
	assert_eq!(h.processor.queued(), 0);
}

/// Must never run session callbacks after dispose.
///
/// - Enforced in: `SessionHandle::upgrade`
/// - Failure symptom: Callbacks touch torn-down project state.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_perform_later_never_runs_after_dispose() {
	let h = Harness::new();
	let doc = h.open("abc\n");
	let ran = log();

	doc.insert(0, "x").unwrap();
	h.manager.perform_later_when_all_committed(Modality::NonModal, push(&ran, "later"));
	h.manager.dispose();
	h.settle();

	assert!(ran.lock().is_empty());
	assert_eq!(h.dispatcher.pending(), 0);
	assert_eq!(h.manager.commit_document(&doc), Err(CommitError::Disposed));
}

/// Must reject a full reparse that starts while the same document is committing or reparsing.
///
/// - Enforced in: `CommitManager::reparse_file_from_text`
/// - Failure symptom: Two installs race and the tree ends up built from interleaved text.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_full_reparse_rejected_during_commit() {
	let h = Harness::new();
	let doc = h.open("abc\n");
	let file = h.file(&doc).unwrap();
	let nested = Arc::new(Mutex::new(None));

	doc.insert(0, "x").unwrap();
	let manager = h.manager.clone();
	let seen = nested.clone();
	h.processor.script(Scripted::Finish(vec![Box::new(move || {
		*seen.lock() = Some(manager.reparse_file_from_text(&file));
		true
	})]));

	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Completed));
	assert_eq!(*nested.lock(), Some(Err(CommitError::ReentrantReparse(doc.id()))));
}

/// Must reject a full reparse that starts while the same document is committing or reparsing.
///
/// - Enforced in: `CommitManager::reparse_file_from_text`
/// - Failure symptom: Two installs race and the tree ends up built from interleaved text.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_full_reparse_rejected_from_engine() {
	let h = Harness::new();
	let engine = Arc::new(ReentrantEngine::default());
	let manager = CommitManager::builder(h.dispatcher.clone(), h.registry.clone())
		.engine(engine.clone())
		.processor(h.processor.clone())
		.build();
	let doc = quill_primitives::Document::new("line\n");
	let file = h.registry.register(&doc, "reentrant.txt");
	let _ = engine.manager.set(Arc::downgrade(&manager));
	let _ = engine.file.set(file.clone());

	assert_eq!(manager.reparse_file_from_text(&file), Ok(CommitStatus::Completed));
	assert_eq!(*engine.nested.lock(), Some(Err(CommitError::ReentrantReparse(doc.id()))));
	assert!(!manager.is_full_reparse_in_progress(&doc));
	assert_eq!(file.tree().map(|t| t.text().to_string()), Some("line\n".to_string()));
}

/// Must defer commits of documents with an open syntax transaction.
///
/// - Enforced in: `CommitManager::commit_now`, `CommitManager::finish_async`
/// - Failure symptom: Recorded syntax edits apply to a tree that no longer matches them.
#[cfg_attr(test, tokio::test)]
pub(crate) async fn test_commit_deferred_inside_transaction() {
	let h = Harness::new();
	let doc = h.open("body\n");

	let tx = h.manager.start_psi_transaction(&doc).unwrap();
	tx.replace(0..0, "// ");
	doc.insert(doc.len_chars(), "tail\n").unwrap();
	assert!(h.manager.is_uncommitted(&doc));

	assert_eq!(h.manager.commit_document(&doc), Ok(CommitStatus::Deferred));
	h.settle();
	assert!(h.manager.is_uncommitted(&doc));

	tx.finish().unwrap();
	assert_eq!(doc.text().to_string(), "// body\ntail\n");
	let last = h.processor.requests_for(doc.id()).pop().unwrap();
	assert_eq!(last.reason, REASON_TRANSACTION_FINISHED);

	h.settle();
	assert!(h.manager.is_committed(&doc));
	assert_eq!(h.tree_text(&doc), Some("// body\ntail\n".to_string()));
}
