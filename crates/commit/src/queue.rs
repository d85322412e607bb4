//! Post-commit callback queues.
//!
//! * [`PendingActions`]: per-document FIFO, drained after that document's
//!   next successful commit.
//! * [`AllCommittedQueue`]: keyed actions drained once no event-system
//!   document is uncommitted. Unkeyed actions share one composite slot.

use std::borrow::Cow;

use indexmap::IndexMap;
use parking_lot::Mutex;
use quill_primitives::DocumentId;
use rustc_hash::FxHashMap;

use crate::CommitError;

pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Key of an all-committed action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKey {
	Named(Cow<'static, str>),
	/// Composite slot holding every unkeyed action.
	Composite,
}

impl From<&'static str> for ActionKey {
	fn from(key: &'static str) -> Self {
		Self::Named(Cow::Borrowed(key))
	}
}

impl From<String> for ActionKey {
	fn from(key: String) -> Self {
		Self::Named(Cow::Owned(key))
	}
}

/// Actions are `Send` but not `Sync`, so the map sits behind one mutex.
#[derive(Default)]
pub(crate) struct PendingActions {
	by_document: Mutex<FxHashMap<DocumentId, Vec<Action>>>,
}

impl PendingActions {
	pub(crate) fn push(&self, id: DocumentId, action: Action) {
		self.by_document.lock().entry(id).or_default().push(action);
	}

	pub(crate) fn take(&self, id: DocumentId) -> Vec<Action> {
		self.by_document.lock().remove(&id).unwrap_or_default()
	}

	pub(crate) fn len(&self, id: DocumentId) -> usize {
		self.by_document.lock().get(&id).map_or(0, Vec::len)
	}

	pub(crate) fn clear(&self) {
		self.by_document.lock().clear();
	}
}

#[derive(Default)]
enum State {
	#[default]
	Idle,
	/// The queue is being drained; registrations are rejected.
	Draining,
}

#[derive(Default)]
pub(crate) struct AllCommittedQueue {
	/// Named keys hold exactly one action; the composite key holds many.
	slots: IndexMap<ActionKey, Vec<Action>>,
	state: State,
}

impl AllCommittedQueue {
	pub(crate) fn is_draining(&self) -> bool {
		matches!(self.state, State::Draining)
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	pub(crate) fn len(&self) -> usize {
		self.slots.values().map(Vec::len).sum()
	}

	pub(crate) fn check_registration(&self) -> Result<(), CommitError> {
		if self.is_draining() {
			return Err(CommitError::ReentrantAllCommitted);
		}
		Ok(())
	}

	/// Replaces any action registered under `key`, keeping its position.
	pub(crate) fn replace(&mut self, key: ActionKey, action: Action) -> Result<(), CommitError> {
		self.check_registration()?;
		match key {
			ActionKey::Composite => self.append(action),
			key => {
				self.slots.insert(key, vec![action]);
				Ok(())
			}
		}
	}

	pub(crate) fn append(&mut self, action: Action) -> Result<(), CommitError> {
		self.check_registration()?;
		self.slots.entry(ActionKey::Composite).or_default().push(action);
		Ok(())
	}

	/// Takes every action in registration order and enters the draining
	/// state. Must be paired with [`Self::end_drain`].
	pub(crate) fn begin_drain(&mut self) -> Vec<Action> {
		self.state = State::Draining;
		std::mem::take(&mut self.slots).into_values().flatten().collect()
	}

	pub(crate) fn end_drain(&mut self) {
		self.state = State::Idle;
	}

	pub(crate) fn clear(&mut self) {
		self.slots.clear();
	}
}
