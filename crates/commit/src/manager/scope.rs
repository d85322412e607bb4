use parking_lot::Mutex;
use quill_primitives::DocumentId;
use rustc_hash::FxHashSet;

/// Per-document "operation in progress" mark, released on every exit path.
pub(super) struct DocScope<'a> {
	set: &'a Mutex<FxHashSet<DocumentId>>,
	id: DocumentId,
}

impl<'a> DocScope<'a> {
	/// Returns `None` if the document is already marked.
	pub(super) fn acquire(set: &'a Mutex<FxHashSet<DocumentId>>, id: DocumentId) -> Option<Self> {
		let inserted = set.lock().insert(id);
		inserted.then(|| Self { set, id })
	}
}

impl Drop for DocScope<'_> {
	fn drop(&mut self) {
		self.set.lock().remove(&self.id);
	}
}
