//! Test doubles for the commit core.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use quill_primitives::{Document, DocumentId};
use quill_syntax::{BlockEngine, FileBinding, FileRegistry, ReparseError, SyntaxFile};
use quill_worker::{CancelToken, Dispatcher, Modality};

use crate::{CommitCfg, CommitJob, CommitManager, CommitProcessor, CommitResult, FinishProcessor, SessionHandle, install_processor, reparse_job};

/// One recorded [`CommitProcessor::commit_asynchronously`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncRequest {
	pub document: DocumentId,
	pub reason: String,
	pub modality: Modality,
}

/// Scripted outcome for the next commit (sync or async, in call order).
pub enum Scripted {
	/// Reparse fails with this error.
	Fail(ReparseError),
	/// A single finish processor that aborts.
	Abort,
	/// Reparse normally, then run these finish processors after the install.
	Finish(Vec<FinishProcessor>),
	/// The processor itself panics with this message.
	Panic(&'static str),
}

struct Queued {
	session: SessionHandle,
	job: CommitJob,
	modality: Modality,
}

/// Processor that reparses inline with [`BlockEngine`], records every
/// request, and holds asynchronous jobs until [`Self::complete_async`].
#[derive(Default)]
pub struct FakeCommitProcessor {
	engine: BlockEngine,
	sync_calls: AtomicUsize,
	requests: Mutex<Vec<AsyncRequest>>,
	queued: Mutex<Vec<Queued>>,
	script: Mutex<VecDeque<Scripted>>,
}

impl FakeCommitProcessor {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn sync_calls(&self) -> usize {
		self.sync_calls.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<AsyncRequest> {
		self.requests.lock().clone()
	}

	pub fn requests_for(&self, document: DocumentId) -> Vec<AsyncRequest> {
		self.requests.lock().iter().filter(|r| r.document == document).cloned().collect()
	}

	pub fn clear_requests(&self) {
		self.requests.lock().clear();
	}

	/// Asynchronous jobs waiting for [`Self::complete_async`].
	pub fn queued(&self) -> usize {
		self.queued.lock().len()
	}

	pub fn script(&self, step: Scripted) {
		self.script.lock().push_back(step);
	}

	/// Reparses every queued job and posts the results to the dispatcher.
	/// Only the newest job per document runs; older ones report cancellation.
	pub fn complete_async(&self) -> usize {
		let queued = std::mem::take(&mut *self.queued.lock());
		let count = queued.len();
		for (idx, q) in queued.iter().enumerate() {
			let superseded = queued[idx + 1..].iter().any(|later| later.job.document_id() == q.job.document_id());
			let result = if superseded { Err(ReparseError::Cancelled) } else { self.outcome(&q.job) };
			q.session.post_finish(q.job.clone(), result, q.modality);
		}
		count
	}

	fn outcome(&self, job: &CommitJob) -> CommitResult {
		let step = self.script.lock().pop_front();
		match step {
			Some(Scripted::Fail(err)) => Err(err),
			Some(Scripted::Abort) => Ok(vec![Box::new(|| false)]),
			Some(Scripted::Panic(message)) => panic!("{message}"),
			Some(Scripted::Finish(extra)) => {
				let tree = reparse_job(&self.engine, job)?;
				let mut finishers = vec![install_processor(job, tree)];
				finishers.extend(extra);
				Ok(finishers)
			}
			None => {
				let tree = reparse_job(&self.engine, job)?;
				Ok(vec![install_processor(job, tree)])
			}
		}
	}
}

impl CommitProcessor for FakeCommitProcessor {
	fn commit_synchronously(&self, job: &CommitJob) -> CommitResult {
		self.sync_calls.fetch_add(1, Ordering::SeqCst);
		self.outcome(job)
	}

	fn commit_asynchronously(&self, session: SessionHandle, job: CommitJob, modality: Modality) {
		self.requests.lock().push(AsyncRequest {
			document: job.document_id(),
			reason: job.reason.to_string(),
			modality,
		});
		self.queued.lock().push(Queued { session, job, modality });
	}

	fn cancel(&self, document: DocumentId) {
		self.queued.lock().retain(|q| q.job.document_id() != document);
	}

	fn cancel_all(&self) {
		self.queued.lock().clear();
	}
}

/// A session wired to a [`FakeCommitProcessor`] and a [`FileRegistry`], with
/// the dispatcher bound to the constructing thread.
pub struct Harness {
	pub dispatcher: Arc<Dispatcher>,
	pub registry: Arc<FileRegistry>,
	pub processor: Arc<FakeCommitProcessor>,
	pub manager: Arc<CommitManager>,
}

impl Default for Harness {
	fn default() -> Self {
		Self::with_cfg(CommitCfg::default())
	}
}

impl Harness {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cfg(cfg: CommitCfg) -> Self {
		let dispatcher = Dispatcher::new();
		let registry = FileRegistry::new();
		let processor = FakeCommitProcessor::new();
		let manager = CommitManager::builder(dispatcher.clone(), registry.clone())
			.cfg(cfg)
			.processor(processor.clone())
			.build();
		Self {
			dispatcher,
			registry,
			processor,
			manager,
		}
	}

	/// Opens a tracked event-system document with a parsed file.
	pub fn open(&self, text: &str) -> Arc<Document> {
		self.attach(Document::new(text))
	}

	/// Opens a tracked free-threaded document with a parsed file.
	pub fn open_free_threaded(&self, text: &str) -> Arc<Document> {
		self.attach(Document::free_threaded(text))
	}

	fn attach(&self, document: Arc<Document>) -> Arc<Document> {
		let file = self.registry.register(&document, format!("doc{}.txt", document.id().0));
		let _ = file.ensure_tree(&document.freeze(), &BlockEngine, &CancelToken::new());
		self.manager.track(&document);
		document
	}

	pub fn file(&self, document: &Arc<Document>) -> Option<Arc<SyntaxFile>> {
		self.registry.file_for_document(document.id())
	}

	pub fn tree_text(&self, document: &Arc<Document>) -> Option<String> {
		self.file(document)?.tree().map(|t| t.text().to_string())
	}

	/// Completes queued background commits and pumps the dispatcher until
	/// neither has work left.
	pub fn settle(&self) {
		for _ in 0..32 {
			let completed = self.processor.complete_async();
			let report = self.dispatcher.pump();
			if completed == 0 && report.ran == 0 {
				return;
			}
		}
	}
}
