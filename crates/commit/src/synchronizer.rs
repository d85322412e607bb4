//! Syntax → document mirror bookkeeping.
//!
//! Syntax-originated edits are recorded inside a transaction and later
//! mirrored into the document text in one atomic step. While the mirror write
//! runs the document is "in synchronization" and counts as committed; while
//! recorded edits are still unflushed the document is blocked.

use std::ops::Range;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quill_primitives::DocumentId;

/// One recorded syntax-side edit, in document char coordinates at the time
/// it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsiEdit {
	pub range: Range<usize>,
	pub text: String,
}

#[derive(Debug, Default)]
struct Transaction {
	depth: usize,
	edits: Vec<PsiEdit>,
}

#[derive(Debug, Default)]
pub struct Synchronizer {
	in_sync: DashMap<DocumentId, usize>,
	transactions: DashMap<DocumentId, Transaction>,
}

impl Synchronizer {
	pub fn new() -> Self {
		Self::default()
	}

	/// True while recorded edits are being mirrored into the document.
	pub fn is_in_synchronization(&self, id: DocumentId) -> bool {
		self.in_sync.contains_key(&id)
	}

	/// True while a transaction is open for the document.
	pub fn is_document_affected_by_transactions(&self, id: DocumentId) -> bool {
		self.transactions.contains_key(&id)
	}

	/// True while recorded edits wait to be mirrored.
	pub fn is_document_blocked(&self, id: DocumentId) -> bool {
		self.transactions.get(&id).is_some_and(|t| !t.edits.is_empty())
	}

	pub(crate) fn begin(&self, id: DocumentId) -> usize {
		let mut tx = self.transactions.entry(id).or_default();
		tx.depth += 1;
		tx.depth
	}

	/// Returns false if no transaction is open for `id`.
	pub(crate) fn record(&self, id: DocumentId, edit: PsiEdit) -> bool {
		match self.transactions.get_mut(&id) {
			Some(mut tx) => {
				tx.edits.push(edit);
				true
			}
			None => false,
		}
	}

	pub(crate) fn take_postponed(&self, id: DocumentId) -> Vec<PsiEdit> {
		self.transactions.get_mut(&id).map(|mut tx| std::mem::take(&mut tx.edits)).unwrap_or_default()
	}

	/// Closes one nesting level; returns the edits still unflushed when the
	/// outermost level closes.
	pub(crate) fn end(&self, id: DocumentId) -> Vec<PsiEdit> {
		match self.transactions.entry(id) {
			Entry::Occupied(mut e) => {
				let tx = e.get_mut();
				tx.depth = tx.depth.saturating_sub(1);
				if tx.depth == 0 { e.remove().edits } else { Vec::new() }
			}
			Entry::Vacant(_) => Vec::new(),
		}
	}

	pub(crate) fn enter_sync(&self, id: DocumentId) -> SyncScope<'_> {
		*self.in_sync.entry(id).or_insert(0) += 1;
		SyncScope { sync: self, id }
	}

	pub(crate) fn forget(&self, id: DocumentId) {
		self.transactions.remove(&id);
		self.in_sync.remove(&id);
	}
}

/// Marks a document in synchronization until dropped.
pub(crate) struct SyncScope<'a> {
	sync: &'a Synchronizer,
	id: DocumentId,
}

impl Drop for SyncScope<'_> {
	fn drop(&mut self) {
		if let Entry::Occupied(mut e) = self.sync.in_sync.entry(self.id) {
			*e.get_mut() -= 1;
			if *e.get() == 0 {
				e.remove();
			}
		}
	}
}
