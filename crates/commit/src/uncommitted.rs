//! Uncommitted-document tracking.
//!
//! Membership in [`UncommittedSet`] is the single source of truth for "this
//! document diverged from its syntax tree". Event-system documents carry an
//! [`UncommittedInfo`]; free-threaded documents carry only the bare entry.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use quill_primitives::{Document, DocumentEvent, DocumentId, DocumentWindow, FrozenDocument};
use rustc_hash::FxHashMap;

/// Side record of an event-system document that diverged from its tree.
#[derive(Debug)]
pub struct UncommittedInfo {
	frozen: FrozenDocument,
	pending_events: Vec<DocumentEvent>,
	frozen_windows: Mutex<FxHashMap<DocumentId, FrozenDocument>>,
}

impl UncommittedInfo {
	pub(crate) fn new(frozen: FrozenDocument) -> Self {
		Self {
			frozen,
			pending_events: Vec::new(),
			frozen_windows: Mutex::new(FxHashMap::default()),
		}
	}

	/// Text and stamp from before the first uncommitted edit.
	pub fn frozen(&self) -> &FrozenDocument {
		&self.frozen
	}

	/// Edits since the snapshot, in application order.
	pub fn pending_events(&self) -> &[DocumentEvent] {
		&self.pending_events
	}

	pub(crate) fn push(&mut self, event: DocumentEvent) {
		self.pending_events.push(event);
	}

	/// Range of the current text that may differ from the snapshot.
	///
	/// Everything before `start` and everything after `end` is unchanged
	/// (the suffix shifted by the net length delta).
	pub fn changed_range(&self) -> Option<Range<usize>> {
		self.pending_events.iter().fold(None, |acc, e| {
			Some(match acc {
				None => e.offset..e.new_end(),
				Some(r) => e.shift_offset(r.start).min(e.offset)..e.shift_offset(r.end).max(e.new_end()),
			})
		})
	}

	/// Snapshot of `window` as of the frozen host text, cached per window.
	///
	/// The window's live range is mapped back through every pending event it
	/// has already moved through.
	pub fn frozen_window(&self, window: &DocumentWindow) -> FrozenDocument {
		self.frozen_windows
			.lock()
			.entry(window.id())
			.or_insert_with(|| {
				let placement = window.placement();
				let range = self
					.pending_events
					.iter()
					.rev()
					.filter(|e| e.stamp_after <= placement.stamp)
					.fold(placement.range, |range, e| e.unshift_range(range));
				self.frozen.slice(window.id(), range)
			})
			.clone()
	}
}

#[derive(Debug)]
pub(crate) struct UncommittedEntry {
	pub(crate) document: Arc<Document>,
	pub(crate) info: Option<UncommittedInfo>,
	/// Set by a whole-text replacement above the large-replace threshold.
	pub(crate) skip_incremental: bool,
}

impl UncommittedEntry {
	fn new(document: &Arc<Document>) -> Self {
		let info = document.is_event_system_enabled().then(|| UncommittedInfo::new(document.freeze()));
		Self {
			document: document.clone(),
			info,
			skip_incremental: false,
		}
	}
}

#[derive(Debug, Default)]
pub(crate) struct UncommittedSet {
	entries: DashMap<DocumentId, UncommittedEntry>,
}

impl UncommittedSet {
	/// Snapshots the document on its first dirtying edit. Returns true if the
	/// document just became uncommitted.
	pub(crate) fn before_change(&self, document: &Arc<Document>) -> bool {
		let mut inserted = false;
		self.entries.entry(document.id()).or_insert_with(|| {
			inserted = true;
			UncommittedEntry::new(document)
		});
		inserted
	}

	/// Appends `event`, creating the entry if `before_change` was missed.
	pub(crate) fn after_change(&self, document: &Arc<Document>, event: &DocumentEvent, large_replace_threshold: usize) -> bool {
		let mut inserted = false;
		let mut entry = self.entries.entry(document.id()).or_insert_with(|| {
			inserted = true;
			UncommittedEntry::new(document)
		});
		if let Some(info) = entry.info.as_mut() {
			info.push(event.clone());
		}
		if event.is_whole_text_replaced() && event.len_after() > large_replace_threshold {
			entry.skip_incremental = true;
		}
		inserted
	}

	pub(crate) fn contains(&self, id: DocumentId) -> bool {
		self.entries.contains_key(&id)
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub(crate) fn documents(&self) -> Vec<Arc<Document>> {
		self.entries.iter().map(|e| e.document.clone()).collect()
	}

	pub(crate) fn has_event_system_documents(&self) -> bool {
		self.entries.iter().any(|e| e.document.is_event_system_enabled())
	}

	pub(crate) fn skip_incremental(&self, id: DocumentId) -> bool {
		self.entries.get(&id).is_some_and(|e| e.skip_incremental)
	}

	pub(crate) fn with_info<R>(&self, id: DocumentId, f: impl FnOnce(&UncommittedInfo) -> R) -> Option<R> {
		let entry = self.entries.get(&id)?;
		entry.info.as_ref().map(f)
	}

	pub(crate) fn remove(&self, id: DocumentId) -> Option<UncommittedEntry> {
		self.entries.remove(&id).map(|(_, e)| e)
	}

	/// Removes the entry only if the document has not been edited past
	/// `stamp`. Returns false if the entry survived.
	pub(crate) fn remove_if_unchanged(&self, id: DocumentId, stamp: u64) -> bool {
		self.entries.remove_if(&id, |_, e| e.document.modification_stamp() == stamp);
		!self.entries.contains_key(&id)
	}

	pub(crate) fn clear(&self) {
		self.entries.clear();
	}
}
