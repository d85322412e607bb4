use std::ops::Range;
use std::sync::Arc;

use crate::{Document, DocumentId};

/// A single raw text edit applied to a [`Document`].
///
/// Offsets and lengths are in chars. `old_fragment` is the replaced text,
/// `new_fragment` the inserted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
	pub document: DocumentId,
	pub offset: usize,
	pub old_fragment: String,
	pub new_fragment: String,
	/// Char length of the whole document before the edit.
	pub len_before: usize,
	pub stamp_before: u64,
	/// Stamp after the edit. Equal to `stamp_before` in `before_change`.
	pub stamp_after: u64,
}

impl DocumentEvent {
	/// Char length of the replaced text.
	pub fn old_len(&self) -> usize {
		self.old_fragment.chars().count()
	}

	/// Char length of the inserted text.
	pub fn new_len(&self) -> usize {
		self.new_fragment.chars().count()
	}

	/// End offset of the replaced range, in pre-edit coordinates.
	pub fn old_end(&self) -> usize {
		self.offset + self.old_len()
	}

	/// End offset of the inserted range, in post-edit coordinates.
	pub fn new_end(&self) -> usize {
		self.offset + self.new_len()
	}

	/// Returns true when the edit replaced the entire previous text.
	pub fn is_whole_text_replaced(&self) -> bool {
		self.offset == 0 && self.old_len() == self.len_before
	}

	/// Char length of the document after the edit.
	pub fn len_after(&self) -> usize {
		self.len_before - self.old_len() + self.new_len()
	}

	/// Maps a pre-edit offset into post-edit coordinates.
	///
	/// Offsets inside the replaced range collapse to the start of the edit.
	pub fn shift_offset(&self, offset: usize) -> usize {
		if offset <= self.offset {
			offset
		} else if offset >= self.old_end() {
			offset - self.old_len() + self.new_len()
		} else {
			self.offset
		}
	}

	/// Maps a post-edit range back into pre-edit coordinates.
	///
	/// Bounds inside the inserted text widen to cover the replaced text.
	pub fn unshift_range(&self, range: Range<usize>) -> Range<usize> {
		let start = if range.start <= self.offset {
			range.start
		} else if range.start >= self.new_end() {
			range.start - self.new_len() + self.old_len()
		} else {
			self.offset
		};
		let end = if range.end <= self.offset {
			range.end
		} else if range.end >= self.new_end() {
			range.end - self.new_len() + self.old_len()
		} else {
			self.old_end()
		};
		start..end.max(start)
	}
}

/// Observer of document mutations.
///
/// Callbacks run on the mutating thread with no text lock held, inside the
/// document's edit serialization. They must not block: marking state dirty
/// is expected to be O(1).
pub trait DocumentListener: Send + Sync {
	fn before_change(&self, document: &Arc<Document>, event: &DocumentEvent) {
		let _ = (document, event);
	}

	fn after_change(&self, document: &Arc<Document>, event: &DocumentEvent);
}
