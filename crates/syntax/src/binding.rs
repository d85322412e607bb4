use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use quill_primitives::{Document, DocumentId};

use crate::{FileId, SyntaxFile};

/// Bidirectional document ⇄ file lookup.
pub trait FileBinding: Send + Sync {
	fn file_for_document(&self, id: DocumentId) -> Option<Arc<SyntaxFile>>;
	fn document_for_file(&self, id: FileId) -> Option<Arc<Document>>;
}

/// In-memory [`FileBinding`] with explicit registration.
///
/// Entries live until [`Self::unregister`]; nothing is evicted implicitly.
#[derive(Default)]
pub struct FileRegistry {
	files: DashMap<DocumentId, Arc<SyntaxFile>>,
	documents: DashMap<FileId, Arc<Document>>,
}

impl FileRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Binds a file to `document`, returning the existing file if already bound.
	pub fn register(&self, document: &Arc<Document>, path: impl Into<PathBuf>) -> Arc<SyntaxFile> {
		let file = self
			.files
			.entry(document.id())
			.or_insert_with(|| SyntaxFile::new(path, document.id()))
			.clone();
		self.documents.insert(file.id(), document.clone());
		file
	}

	/// Removes the binding for a closed document.
	pub fn unregister(&self, id: DocumentId) -> Option<Arc<SyntaxFile>> {
		let (_, file) = self.files.remove(&id)?;
		self.documents.remove(&file.id());
		Some(file)
	}

	pub fn len(&self) -> usize {
		self.files.len()
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}
}

impl FileBinding for FileRegistry {
	fn file_for_document(&self, id: DocumentId) -> Option<Arc<SyntaxFile>> {
		self.files.get(&id).map(|f| f.clone())
	}

	fn document_for_file(&self, id: FileId) -> Option<Arc<Document>> {
		self.documents.get(&id).map(|d| d.clone())
	}
}
