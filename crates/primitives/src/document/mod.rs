//! Document - the mutable text buffer kept in sync with its syntax tree.
//!
//! A [`Document`] owns rope-backed text and a monotonic modification stamp.
//! Every mutation fires [`DocumentListener::before_change`] and
//! [`DocumentListener::after_change`] with no text lock held, so listeners
//! may read the document (for example to freeze a snapshot). Mutations are
//! serialized per document: validate, notify, apply and notify again happen
//! as one step with respect to other editing threads.
//!
//! Documents come in two flavors:
//! - **Event-system enabled**: regular editor documents that participate in
//!   the UI-confined commit protocol.
//! - **Free-threaded**: background documents that may be mutated and
//!   committed from any thread.


use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{ReentrantMutex, RwLock};
use ropey::Rope;

use crate::{DocumentEvent, DocumentListener, EditError};

/// Counter for generating unique document IDs.
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
	/// Generates a new unique document ID.
	pub fn next() -> Self {
		Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Immutable copy of a document's text and stamp at one instant.
///
/// Cheap to create: the rope is shared structurally.
#[derive(Debug, Clone)]
pub struct FrozenDocument {
	pub id: DocumentId,
	pub text: Rope,
	pub stamp: u64,
}

impl FrozenDocument {
	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	/// Freezes a char range of this snapshot, clamped to its length.
	pub fn slice(&self, id: DocumentId, range: Range<usize>) -> FrozenDocument {
		let end = range.end.min(self.text.len_chars());
		let start = range.start.min(end);
		FrozenDocument {
			id,
			text: Rope::from(self.text.slice(start..end)),
			stamp: self.stamp,
		}
	}
}

/// A mutable text buffer with change notification.
pub struct Document {
	id: DocumentId,
	content: RwLock<Rope>,
	/// Held across a whole edit. Reentrant so a listener may edit the same
	/// document from its callback.
	pub(crate) edit: ReentrantMutex<()>,
	/// Monotonic, incremented once per applied edit.
	stamp: AtomicU64,
	event_system: bool,
	readonly: AtomicBool,
	listeners: RwLock<Vec<Arc<dyn DocumentListener>>>,
}

impl fmt::Debug for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document")
			.field("id", &self.id)
			.field("stamp", &self.modification_stamp())
			.field("event_system", &self.event_system)
			.field("len", &self.len_chars())
			.finish()
	}
}

impl Document {
	/// Creates an event-system enabled document.
	pub fn new(text: &str) -> Arc<Self> {
		Arc::new(Self::with_flags(text, true))
	}

	/// Creates a free-threaded document outside the UI commit protocol.
	pub fn free_threaded(text: &str) -> Arc<Self> {
		Arc::new(Self::with_flags(text, false))
	}

	fn with_flags(text: &str, event_system: bool) -> Self {
		Self {
			id: DocumentId::next(),
			content: RwLock::new(Rope::from_str(text)),
			edit: ReentrantMutex::new(()),
			stamp: AtomicU64::new(0),
			event_system,
			readonly: AtomicBool::new(false),
			listeners: RwLock::new(Vec::new()),
		}
	}

	pub fn id(&self) -> DocumentId {
		self.id
	}

	/// Returns a structural copy of the current text.
	pub fn text(&self) -> Rope {
		self.content.read().clone()
	}

	pub fn len_chars(&self) -> usize {
		self.content.read().len_chars()
	}

	pub fn modification_stamp(&self) -> u64 {
		self.stamp.load(Ordering::Acquire)
	}

	pub fn is_event_system_enabled(&self) -> bool {
		self.event_system
	}

	pub fn is_readonly(&self) -> bool {
		self.readonly.load(Ordering::Relaxed)
	}

	pub fn set_readonly(&self, readonly: bool) {
		self.readonly.store(readonly, Ordering::Relaxed);
	}

	/// Captures text and stamp together.
	pub fn freeze(&self) -> FrozenDocument {
		let content = self.content.read();
		FrozenDocument {
			id: self.id,
			text: content.clone(),
			stamp: self.modification_stamp(),
		}
	}

	pub fn add_listener(&self, listener: Arc<dyn DocumentListener>) {
		self.listeners.write().push(listener);
	}

	/// Removes a listener previously added with [`Self::add_listener`].
	pub fn remove_listener(&self, listener: &Arc<dyn DocumentListener>) {
		self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
	}

	pub fn insert(self: &Arc<Self>, offset: usize, text: &str) -> Result<DocumentEvent, EditError> {
		self.replace(offset..offset, text)
	}

	pub fn delete(self: &Arc<Self>, range: Range<usize>) -> Result<DocumentEvent, EditError> {
		self.replace(range, "")
	}

	/// Replaces the whole text in one edit.
	pub fn set_text(self: &Arc<Self>, text: &str) -> Result<DocumentEvent, EditError> {
		let _edit = self.edit.lock();
		let len = self.len_chars();
		self.replace(0..len, text)
	}

	/// Replaces a char range and notifies listeners.
	///
	/// # Errors
	///
	/// Returns [`EditError::ReadOnly`] for read-only documents and
	/// [`EditError::OutOfBounds`] when the range does not fit the text.
	pub fn replace(self: &Arc<Self>, range: Range<usize>, text: &str) -> Result<DocumentEvent, EditError> {
		if self.is_readonly() {
			return Err(EditError::ReadOnly(self.id));
		}

		let _edit = self.edit.lock();
		let mut event = {
			let content = self.content.read();
			let len = content.len_chars();
			if range.start > range.end || range.end > len {
				return Err(EditError::OutOfBounds { id: self.id, range, len });
			}
			let stamp = self.modification_stamp();
			DocumentEvent {
				document: self.id,
				offset: range.start,
				old_fragment: content.slice(range.clone()).to_string(),
				new_fragment: text.to_owned(),
				len_before: len,
				stamp_before: stamp,
				stamp_after: stamp,
			}
		};

		if event.old_fragment.is_empty() && event.new_fragment.is_empty() {
			return Ok(event);
		}

		let listeners = self.listeners.read().clone();
		for listener in &listeners {
			listener.before_change(self, &event);
		}

		{
			let mut content = self.content.write();
			content.remove(range.clone());
			content.insert(range.start, text);
			event.stamp_after = self.stamp.fetch_add(1, Ordering::AcqRel) + 1;
		}
		tracing::trace!(doc_id = ?self.id, offset = event.offset, stamp = event.stamp_after, "document.changed");

		for listener in &listeners {
			listener.after_change(self, &event);
		}
		Ok(event)
	}
}
