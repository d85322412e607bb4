//! Smart-pointer hooks.
//!
//! The commit core calls [`PointerHooks::fasten_belts`] before a reparse
//! starts and [`PointerHooks::update_pointer_targets`] once the new tree is
//! installed. [`AnchorRegistry`] keeps char-offset anchors valid across both.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use quill_primitives::{Document, DocumentEvent, DocumentId};
use rustc_hash::FxHashMap;

pub trait PointerHooks: Send + Sync {
	/// Called before reparse with the edits pending since the last commit.
	fn fasten_belts(&self, document: DocumentId, events: &[DocumentEvent]);

	/// Called after a new tree of `tree_len` chars is installed.
	fn update_pointer_targets(&self, document: DocumentId, tree_len: usize);

	/// Called when the document is closed.
	fn forget(&self, document: DocumentId) {
		let _ = document;
	}
}

/// Hooks that do nothing.
#[derive(Debug, Default)]
pub struct NoopHooks;

impl PointerHooks for NoopHooks {
	fn fasten_belts(&self, _document: DocumentId, _events: &[DocumentEvent]) {}

	fn update_pointer_targets(&self, _document: DocumentId, _tree_len: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(u64);

#[derive(Debug, Clone, Copy)]
struct Anchor {
	offset: usize,
	/// Stamp of the text `offset` refers to.
	stamp: u64,
}

/// Offset anchors remapped through pending edits.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
	next: AtomicU64,
	documents: DashMap<DocumentId, FxHashMap<AnchorId, Anchor>>,
}

impl AnchorRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Anchors `offset` in the document's current text.
	pub fn create(&self, document: &Document, offset: usize) -> AnchorId {
		let id = AnchorId(self.next.fetch_add(1, Ordering::Relaxed));
		let anchor = Anchor {
			offset: offset.min(document.len_chars()),
			stamp: document.modification_stamp(),
		};
		self.documents.entry(document.id()).or_default().insert(id, anchor);
		id
	}

	pub fn offset(&self, document: DocumentId, id: AnchorId) -> Option<usize> {
		self.documents.get(&document)?.get(&id).map(|a| a.offset)
	}

	pub fn remove(&self, document: DocumentId, id: AnchorId) -> bool {
		self.documents.get_mut(&document).is_some_and(|mut anchors| anchors.remove(&id).is_some())
	}

	pub fn len(&self, document: DocumentId) -> usize {
		self.documents.get(&document).map_or(0, |a| a.len())
	}
}

impl PointerHooks for AnchorRegistry {
	fn fasten_belts(&self, document: DocumentId, events: &[DocumentEvent]) {
		let Some(mut anchors) = self.documents.get_mut(&document) else {
			return;
		};
		for anchor in anchors.values_mut() {
			for event in events {
				if event.stamp_before >= anchor.stamp {
					anchor.offset = event.shift_offset(anchor.offset);
					anchor.stamp = event.stamp_after;
				}
			}
		}
		tracing::trace!(doc_id = ?document, anchors = anchors.len(), events = events.len(), "commit.anchors.fastened");
	}

	fn update_pointer_targets(&self, document: DocumentId, tree_len: usize) {
		if let Some(mut anchors) = self.documents.get_mut(&document) {
			for anchor in anchors.values_mut() {
				anchor.offset = anchor.offset.min(tree_len);
			}
		}
	}

	fn forget(&self, document: DocumentId) {
		self.documents.remove(&document);
	}
}
