//! Blocking waits for commits from background threads.

use std::sync::Arc;

use quill_worker::{CancelToken, Cancelled, Latch};

use super::CommitManager;

impl CommitManager {
	/// Commits everything from a background thread by posting a commit-all to
	/// the dispatcher and waiting for it. Polls `cancel` while waiting and
	/// returns false if it fires (or the session is disposed) first.
	pub fn commit_all_documents_under_progress(&self, cancel: &CancelToken) -> bool {
		if self.dispatcher.is_dispatch_thread() {
			if let Err(err) = self.commit_all_documents() {
				tracing::error!(error = %err, "commit.under_progress.failed");
			}
			return true;
		}

		let latch = Arc::new(Latch::new(1));
		let released = latch.clone();
		let handle = self.handle();
		self.dispatcher.invoke_later(self.dispatcher.current_modality(), move || {
			if let Some(manager) = handle.upgrade()
				&& let Err(err) = manager.commit_all_documents()
			{
				tracing::error!(error = %err, "commit.under_progress.failed");
			}
			released.count_down();
		});

		let interval = self.cfg.progress_poll_interval();
		while !latch.wait_timeout(interval) {
			if cancel.is_cancelled() || self.is_disposed() {
				tracing::debug!("commit.under_progress.cancelled");
				return false;
			}
		}
		true
	}

	/// Runs `f` under a read action once no event-system document is
	/// uncommitted, committing from the dispatcher as often as needed.
	pub fn commit_and_run_read_action<R>(&self, cancel: &CancelToken, f: impl FnOnce() -> R) -> Result<R, Cancelled> {
		if self.dispatcher.is_dispatch_thread() {
			if let Err(err) = self.commit_all_documents() {
				tracing::error!(error = %err, "commit.read_action.commit_failed");
			}
			return Ok(self.lock.read_action(f));
		}

		let mut pending = f;
		loop {
			let attempt = self.lock.read_action(|| {
				if self.uncommitted.has_event_system_documents() {
					Err(pending)
				} else {
					Ok(pending())
				}
			});
			match attempt {
				Ok(value) => return Ok(value),
				Err(back) => pending = back,
			}
			if !self.commit_all_documents_under_progress(cancel) {
				return Err(Cancelled);
			}
		}
	}
}
