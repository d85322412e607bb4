use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Document, DocumentEvent, DocumentId, DocumentListener};

/// Anything that resolves to a top-level backing [`Document`].
pub trait HostedDocument {
	/// Dereferences window indirection down to the backing document.
	fn top_level(&self) -> &Arc<Document>;
}

impl HostedDocument for Arc<Document> {
	fn top_level(&self) -> &Arc<Document> {
		self
	}
}

/// Host range of a window and the host stamp it is expressed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
	pub range: Range<usize>,
	pub stamp: u64,
}

/// Host listener moving the window range through edits.
#[derive(Debug)]
struct Tracker {
	placement: Mutex<Placement>,
}

impl DocumentListener for Tracker {
	fn after_change(&self, _document: &Arc<Document>, event: &DocumentEvent) {
		let mut placement = self.placement.lock();
		let start = event.shift_offset(placement.range.start);
		let end = event.shift_offset(placement.range.end).max(start);
		placement.range = start..end;
		placement.stamp = event.stamp_after;
	}
}

struct Inner {
	id: DocumentId,
	host: Arc<Document>,
	tracker: Arc<Tracker>,
	listener: Arc<dyn DocumentListener>,
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.host.remove_listener(&self.listener);
	}
}

/// Injected-language sub-document covering a char range of its host.
///
/// Windows carry their own identity but never own text; reads go through
/// the host. The range follows host edits; an edit touching the end of the
/// window grows it.
#[derive(Clone)]
pub struct DocumentWindow {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for DocumentWindow {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentWindow")
			.field("id", &self.inner.id)
			.field("host", &self.inner.host.id())
			.field("placement", &self.placement())
			.finish()
	}
}

impl DocumentWindow {
	pub fn new(host: Arc<Document>, range: Range<usize>) -> Self {
		let (tracker, listener) = {
			// No edit may land between reading the stamp and attaching.
			let _edit = host.edit.lock();
			let tracker = Arc::new(Tracker {
				placement: Mutex::new(Placement {
					range,
					stamp: host.modification_stamp(),
				}),
			});
			let listener: Arc<dyn DocumentListener> = tracker.clone();
			host.add_listener(listener.clone());
			(tracker, listener)
		};
		Self {
			inner: Arc::new(Inner {
				id: DocumentId::next(),
				host,
				tracker,
				listener,
			}),
		}
	}

	pub fn id(&self) -> DocumentId {
		self.inner.id
	}

	/// Current range in host coordinates.
	pub fn host_range(&self) -> Range<usize> {
		self.inner.tracker.placement.lock().range.clone()
	}

	/// Current range together with the host stamp it belongs to.
	pub fn placement(&self) -> Placement {
		self.inner.tracker.placement.lock().clone()
	}

	/// Host range clamped to a host of `len` chars.
	pub fn clamped_range(&self, len: usize) -> Range<usize> {
		clamp(self.host_range(), len)
	}

	/// Current window text, read through the host.
	pub fn text(&self) -> String {
		let content = self.inner.host.text();
		let range = self.clamped_range(content.len_chars());
		content.slice(range).to_string()
	}
}

/// Clamps `range` to a text of `len` chars.
fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
	let end = range.end.min(len);
	range.start.min(end)..end
}

impl HostedDocument for DocumentWindow {
	fn top_level(&self) -> &Arc<Document> {
		&self.inner.host
	}
}
