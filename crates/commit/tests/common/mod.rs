#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quill_commit::{BackgroundCommitProcessor, CommitCfg, CommitManager};
use quill_primitives::Document;
use quill_syntax::{BlockEngine, FileBinding, FileRegistry, SyntaxEngine};
use quill_worker::{CancelToken, Dispatcher};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Session driven by the production background processor.
pub struct Session {
	pub dispatcher: Arc<Dispatcher>,
	pub registry: Arc<FileRegistry>,
	pub processor: Arc<BackgroundCommitProcessor>,
	pub manager: Arc<CommitManager>,
}

impl Session {
	pub fn new(cfg: CommitCfg) -> Self {
		init_tracing();
		let dispatcher = Dispatcher::new();
		let registry = FileRegistry::new();
		let engine: Arc<dyn SyntaxEngine> = Arc::new(BlockEngine);
		let processor = Arc::new(BackgroundCommitProcessor::new(engine.clone(), cfg.max_concurrency));
		let manager = CommitManager::builder(dispatcher.clone(), registry.clone())
			.cfg(cfg)
			.engine(engine)
			.processor(processor.clone())
			.build();
		Self {
			dispatcher,
			registry,
			processor,
			manager,
		}
	}

	pub fn open(&self, name: &str, text: &str) -> Arc<Document> {
		let document = Document::new(text);
		let file = self.registry.register(&document, name);
		let _ = file.ensure_tree(&document.freeze(), &BlockEngine, &CancelToken::new());
		self.manager.track(&document);
		document
	}

	pub fn tree_text(&self, document: &Arc<Document>) -> Option<String> {
		let file = self.registry.file_for_document(document.id())?;
		file.tree().map(|t| t.text().to_string())
	}

	/// Pumps the dispatcher until every document is committed.
	pub fn wait_all_committed(&self) -> bool {
		self.dispatcher.pump_until(WAIT, || !self.manager.has_uncommitted_documents())
	}
}
