//! Model read/write lock.
//!
//! The dispatch thread always holds write intent. Write actions are reentrant
//! on the writing thread, and read actions nested inside them run without
//! taking the lock again.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use quill_worker::Dispatcher;

pub struct ModelLock {
	dispatcher: Arc<Dispatcher>,
	lock: RwLock<()>,
	writer: Mutex<Option<ThreadId>>,
}

impl ModelLock {
	pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
		Self {
			dispatcher,
			lock: RwLock::new(()),
			writer: Mutex::new(None),
		}
	}

	fn is_writer(&self) -> bool {
		*self.writer.lock() == Some(thread::current().id())
	}

	/// Returns true if the current thread may start model mutations.
	pub fn has_write_intent(&self) -> bool {
		self.dispatcher.is_dispatch_thread() || self.is_writer()
	}

	pub fn is_write_action(&self) -> bool {
		self.is_writer()
	}

	pub fn write_action<R>(&self, f: impl FnOnce() -> R) -> R {
		if self.is_writer() {
			return f();
		}
		let _guard = self.lock.write();
		*self.writer.lock() = Some(thread::current().id());
		let _reset = WriterReset(&self.writer);
		f()
	}

	pub fn read_action<R>(&self, f: impl FnOnce() -> R) -> R {
		if self.is_writer() {
			return f();
		}
		let _guard = self.lock.read_recursive();
		f()
	}
}

struct WriterReset<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for WriterReset<'_> {
	fn drop(&mut self) {
		*self.0.lock() = None;
	}
}
