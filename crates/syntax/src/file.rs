use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use quill_primitives::{DocumentId, FrozenDocument};
use quill_worker::CancelToken;

use crate::{ReparseError, SyntaxEngine, SyntaxTree};

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a syntax file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u64);

#[derive(Default)]
struct FileState {
	tree: Option<SyntaxTree>,
	/// Document stamp the installed tree corresponds to.
	stamp: Option<u64>,
}

/// Parsed view of one document.
///
/// The tree is dropped by [`Self::invalidate`] and rebuilt lazily from the
/// document text by [`Self::ensure_tree`].
pub struct SyntaxFile {
	id: FileId,
	path: PathBuf,
	document: DocumentId,
	state: RwLock<FileState>,
}

impl std::fmt::Debug for SyntaxFile {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyntaxFile")
			.field("id", &self.id)
			.field("path", &self.path)
			.field("document", &self.document)
			.field("stamp", &self.installed_stamp())
			.finish()
	}
}

impl SyntaxFile {
	pub fn new(path: impl Into<PathBuf>, document: DocumentId) -> Arc<Self> {
		Arc::new(Self {
			id: FileId(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)),
			path: path.into(),
			document,
			state: RwLock::new(FileState::default()),
		})
	}

	pub fn id(&self) -> FileId {
		self.id
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn document_id(&self) -> DocumentId {
		self.document
	}

	pub fn tree(&self) -> Option<SyntaxTree> {
		self.state.read().tree.clone()
	}

	pub fn is_valid(&self) -> bool {
		self.state.read().tree.is_some()
	}

	pub fn installed_stamp(&self) -> Option<u64> {
		self.state.read().stamp
	}

	/// Char length of the installed tree's text.
	pub fn text_len(&self) -> Option<usize> {
		self.state.read().tree.as_ref().map(SyntaxTree::len_chars)
	}

	pub fn install(&self, tree: SyntaxTree, stamp: u64) {
		let mut state = self.state.write();
		state.tree = Some(tree);
		state.stamp = Some(stamp);
	}

	/// Drops the tree; the next [`Self::ensure_tree`] rebuilds it from scratch.
	pub fn invalidate(&self) {
		let mut state = self.state.write();
		state.tree = None;
		state.stamp = None;
		tracing::debug!(file = ?self.id, doc_id = ?self.document, "syntax.file.invalidated");
	}

	/// Returns the installed tree, parsing `source` from scratch when none is
	/// installed.
	pub fn ensure_tree(&self, source: &FrozenDocument, engine: &dyn SyntaxEngine, cancel: &CancelToken) -> Result<SyntaxTree, ReparseError> {
		if let Some(tree) = self.tree() {
			return Ok(tree);
		}
		let tree = engine.parse(&source.text, cancel)?;
		let mut state = self.state.write();
		if let Some(existing) = state.tree.clone() {
			return Ok(existing);
		}
		state.tree = Some(tree.clone());
		state.stamp = Some(source.stamp);
		Ok(tree)
	}
}
