//! Commit processors.
//!
//! A [`CommitProcessor`] turns a [`CommitJob`] into an ordered list of
//! [`FinishProcessor`]s. The manager applies them itself, under a write
//! action, for both the synchronous and the asynchronous path.

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use quill_primitives::{Document, DocumentId, FrozenDocument};
use quill_syntax::{ReparseError, ReparseKind, ReparseMetrics, SyntaxEngine, SyntaxFile, SyntaxTree};
use quill_worker::{CancelToken, GenerationClock, Modality, TaskClass, join_error_panic_message, panic_message};
use tokio::sync::Semaphore;

use crate::SessionHandle;

/// One step of applying a commit. Returning false aborts the remaining steps
/// and leaves the document uncommitted.
pub type FinishProcessor = Box<dyn FnOnce() -> bool + Send + 'static>;

pub type CommitResult = Result<Vec<FinishProcessor>, ReparseError>;

/// Everything a processor needs to reparse one document.
#[derive(Debug, Clone)]
pub struct CommitJob {
	pub document: Arc<Document>,
	pub file: Arc<SyntaxFile>,
	/// Text to reparse, frozen when the job was created.
	pub snapshot: FrozenDocument,
	/// Bypass incremental reparse (huge whole-text replacement).
	pub skip_incremental: bool,
	pub reason: Cow<'static, str>,
	pub cancel: CancelToken,
}

impl CommitJob {
	pub fn document_id(&self) -> DocumentId {
		self.document.id()
	}

	pub fn kind(&self) -> ReparseKind {
		if self.skip_incremental || !self.file.is_valid() {
			ReparseKind::Full
		} else {
			ReparseKind::Incremental
		}
	}
}

/// Pluggable commit strategy.
pub trait CommitProcessor: Send + Sync {
	/// Reparses on the calling thread.
	fn commit_synchronously(&self, job: &CommitJob) -> CommitResult;

	/// Reparses in the background and hands the result to
	/// [`SessionHandle::post_finish`].
	fn commit_asynchronously(&self, session: SessionHandle, job: CommitJob, modality: Modality);

	/// Cancels background work for one document.
	fn cancel(&self, document: DocumentId) {
		let _ = document;
	}

	/// Cancels all background work.
	fn cancel_all(&self) {}
}

/// Produces the job's new tree, incrementally when the file has one.
pub fn reparse_job(engine: &dyn SyntaxEngine, job: &CommitJob) -> Result<SyntaxTree, ReparseError> {
	job.cancel.check()?;
	match job.file.tree() {
		Some(old) if !job.skip_incremental => engine.reparse(&old, &job.snapshot.text, &job.cancel),
		_ => engine.parse(&job.snapshot.text, &job.cancel),
	}
}

/// Installs `tree` if the document still has the text it was parsed from.
pub fn install_processor(job: &CommitJob, tree: SyntaxTree) -> FinishProcessor {
	let document = job.document.clone();
	let file = job.file.clone();
	let stamp = job.snapshot.stamp;
	Box::new(move || {
		let current = document.modification_stamp();
		if current != stamp {
			tracing::debug!(doc_id = ?document.id(), parsed = stamp, current, "commit.finish.stale_text");
			return false;
		}
		file.install(tree, stamp);
		true
	})
}

/// Bounds for the per-kind reparse budget derived from recorded metrics.
pub const MIN_REPARSE_BUDGET: Duration = Duration::from_millis(5);
pub const MAX_REPARSE_BUDGET: Duration = Duration::from_secs(2);

/// Production processor: reparses on the blocking pool with bounded
/// concurrency and single-flight per document.
pub struct BackgroundCommitProcessor {
	engine: Arc<dyn SyntaxEngine>,
	permits: Arc<Semaphore>,
	inflight: Arc<DashMap<DocumentId, CancelToken>>,
	clock: GenerationClock,
	metrics: Arc<Mutex<ReparseMetrics>>,
}

impl BackgroundCommitProcessor {
	pub fn new(engine: Arc<dyn SyntaxEngine>, max_concurrency: usize) -> Self {
		Self {
			engine,
			permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
			inflight: Arc::new(DashMap::new()),
			clock: GenerationClock::new(),
			metrics: Arc::new(Mutex::new(ReparseMetrics::new())),
		}
	}

	pub fn metrics(&self) -> ReparseMetrics {
		self.metrics.lock().clone()
	}

	/// Documents with a background reparse queued or running.
	pub fn inflight(&self) -> usize {
		self.inflight.len()
	}

	/// Time a reparse of `kind` is expected to take. Without samples this is
	/// [`MAX_REPARSE_BUDGET`].
	pub fn reparse_budget(&self, kind: ReparseKind) -> Duration {
		self.metrics.lock().predict_duration(kind, MIN_REPARSE_BUDGET, MAX_REPARSE_BUDGET)
	}

	fn run(engine: &dyn SyntaxEngine, metrics: &Mutex<ReparseMetrics>, job: &CommitJob) -> CommitResult {
		let kind = job.kind();
		let budget = metrics.lock().predict_duration(kind, MIN_REPARSE_BUDGET, MAX_REPARSE_BUDGET);
		let started = Instant::now();
		let result = catch_unwind(AssertUnwindSafe(|| reparse_job(engine, job))).unwrap_or_else(|payload| Err(ReparseError::Panicked(panic_message(&*payload))));

		let cancelled = matches!(result, Err(ReparseError::Cancelled));
		let failed = result.is_err() && !cancelled;
		let reuse = match &result {
			Ok(tree) if !tree.blocks().is_empty() => tree.reused_blocks() as f64 / tree.blocks().len() as f64,
			_ => 0.0,
		};
		let elapsed = started.elapsed();
		if elapsed > budget {
			tracing::debug!(doc_id = ?job.document_id(), ?kind, ?elapsed, ?budget, "commit.reparse.slow");
		}
		metrics.lock().record(kind, elapsed, cancelled, failed, reuse);

		result.map(|tree| vec![install_processor(job, tree)])
	}
}

impl CommitProcessor for BackgroundCommitProcessor {
	fn commit_synchronously(&self, job: &CommitJob) -> CommitResult {
		self.cancel(job.document_id());
		Self::run(&*self.engine, &self.metrics, job)
	}

	fn commit_asynchronously(&self, session: SessionHandle, job: CommitJob, modality: Modality) {
		let doc_id = job.document_id();
		let token = CancelToken::with_generation(self.clock.next());
		let job = CommitJob { cancel: token.clone(), ..job };
		if let Some(previous) = self.inflight.insert(doc_id, token) {
			previous.cancel();
			tracing::trace!(?doc_id, generation = previous.generation(), "commit.async.superseded");
		}
		tracing::trace!(?doc_id, reason = %job.reason, generation = job.cancel.generation(), "commit.async.spawn");

		let engine = self.engine.clone();
		let metrics = self.metrics.clone();
		let permits = self.permits.clone();
		let inflight = self.inflight.clone();
		quill_worker::spawn(TaskClass::Background, async move {
			let result = match permits.acquire_owned().await {
				Ok(permit) => {
					let work = job.clone();
					let handle = quill_worker::spawn_blocking(TaskClass::Reparse, move || {
						let _permit = permit;
						Self::run(&*engine, &metrics, &work)
					});
					match handle.await {
						Ok(result) => result,
						Err(err) => Err(ReparseError::Panicked(join_error_panic_message(err).unwrap_or_else(|| "reparse task aborted".to_string()))),
					}
				}
				Err(_) => Err(ReparseError::Cancelled),
			};
			let generation = job.cancel.generation();
			inflight.remove_if(&doc_id, |_, token| token.generation() == generation);
			session.post_finish(job, result, modality);
		});
	}

	fn cancel(&self, document: DocumentId) {
		if let Some((_, token)) = self.inflight.remove(&document) {
			token.cancel();
		}
	}

	fn cancel_all(&self) {
		self.inflight.retain(|_, token| {
			token.cancel();
			false
		});
	}
}
