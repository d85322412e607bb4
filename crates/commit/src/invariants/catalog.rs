//! Invariant catalog for [`crate::CommitManager`].
#![allow(dead_code)]

/// Must not call the processor for a document that is already committed.
///
/// - Enforced in: [`crate::CommitManager::commit_document`]
/// - Tested by: [`crate::invariants::test_commit_of_committed_document_is_noop`]
/// - Failure symptom: Redundant reparses on every caller that commits defensively.
pub(crate) const COMMIT_IDEMPOTENT: () = ();

/// Must leave the file tree text equal to the document text after a completed commit.
///
/// - Enforced in: [`crate::install_processor`], `CommitManager::finish_commit`
/// - Tested by: [`crate::invariants::test_completed_commit_matches_document_text`]
/// - Failure symptom: Syntax queries answer against text the user no longer sees.
pub(crate) const COMMIT_ROUND_TRIP: () = ();

/// Must keep the pre-edit snapshot of the first edit while further edits pile up.
///
/// - Enforced in: `UncommittedSet::before_change`, `UncommittedSet::after_change`
/// - Tested by: [`crate::invariants::test_coalesced_edits_keep_first_snapshot`]
/// - Failure symptom: Incremental reparse diffs against the wrong base and reuses stale blocks.
pub(crate) const COALESCED_SNAPSHOT: () = ();

/// Must run per-document actions in registration order, each exactly once.
///
/// - Enforced in: `PendingActions::take`, `CommitManager::after_commit`
/// - Tested by: [`crate::invariants::test_pending_actions_run_in_order_once`]
/// - Failure symptom: Dependent callbacks observe each other's effects out of order.
pub(crate) const PENDING_ACTION_ORDER: () = ();

/// Must drain the global queue exactly once, after the last event-system document commits.
///
/// - Enforced in: `CommitManager::drain_if_all_committed`
/// - Tested by: [`crate::invariants::test_global_queue_drains_once_after_last_commit`]
/// - Failure symptom: "All committed" callbacks fire early against stale trees, or twice.
pub(crate) const GLOBAL_DRAIN_ONCE: () = ();

/// Must reject all-committed registrations from inside a drain.
///
/// - Enforced in: `AllCommittedQueue::check_registration`
/// - Tested by: [`crate::invariants::test_registration_during_drain_is_rejected`]
/// - Failure symptom: Callbacks that re-register themselves loop forever.
pub(crate) const NO_REENTRANT_ALL_COMMITTED: () = ();

/// Must force a full reparse after a whole-text replacement above the threshold.
///
/// - Enforced in: `UncommittedSet::after_change`
/// - Tested by: [`crate::invariants::test_large_replace_skips_incremental`]
/// - Failure symptom: Incremental diffing of huge rewrites stalls the background pool.
pub(crate) const LARGE_REPLACE_FULL_REPARSE: () = ();

/// Must re-request commits under a write-safe modal state so waiting callbacks can fire.
///
/// - Enforced in: [`crate::CommitManager::perform_when_all_committed`]
/// - Tested by: [`crate::invariants::test_modal_wait_requests_commits_under_modality`]
/// - Failure symptom: A modal dialog waiting for commits hangs forever.
pub(crate) const MODAL_COMMITS_NOT_STARVED: () = ();

/// Must report a document that stays uncommitted after a successful commit.
///
/// - Enforced in: `CommitManager::finish_commit`
/// - Tested by: [`crate::invariants::test_diverged_commit_logs_by_default`], [`crate::invariants::test_diverged_commit_fails_under_fail_policy`]
/// - Failure symptom: Bookkeeping drifts silently and callbacks wait forever.
pub(crate) const DIVERGENCE_REPORTED: () = ();

/// Must reload the document after a commit failure and still run its pending actions.
///
/// - Enforced in: `CommitManager::finish_commit`, `CommitManager::reload`
/// - Tested by: [`crate::invariants::test_commit_failure_reloads`]
/// - Failure symptom: A document stays uncommitted after a parser bug and blocks every waiter.
pub(crate) const FAILURE_RELOADS: () = ();

/// Must never run session callbacks after dispose.
///
/// - Enforced in: [`crate::SessionHandle::upgrade`]
/// - Tested by: [`crate::invariants::test_perform_later_never_runs_after_dispose`]
/// - Failure symptom: Callbacks touch torn-down project state.
pub(crate) const NOTHING_RUNS_AFTER_DISPOSE: () = ();

/// Must reject a full reparse that starts while the same document is committing or reparsing.
///
/// - Enforced in: [`crate::CommitManager::reparse_file_from_text`]
/// - Tested by: [`crate::invariants::test_full_reparse_rejected_during_commit`], [`crate::invariants::test_full_reparse_rejected_from_engine`]
/// - Failure symptom: Two installs race and the tree ends up built from interleaved text.
pub(crate) const NO_REENTRANT_FULL_REPARSE: () = ();

/// Must defer commits of documents with an open syntax transaction.
///
/// - Enforced in: `CommitManager::commit_now`, `CommitManager::finish_async`
/// - Tested by: [`crate::invariants::test_commit_deferred_inside_transaction`]
/// - Failure symptom: Recorded syntax edits apply to a tree that no longer matches them.
pub(crate) const TRANSACTION_DEFERS_COMMIT: () = ();
