//! UI-confined dispatch queue.
//!
//! The dispatcher is bound to the thread that created it. Any thread may post
//! work with [`Dispatcher::invoke_later`]; only the owning thread runs it, from
//! [`Dispatcher::pump`]. Each pump is one round: work posted while the round
//! is running waits for the next pump, so self-rescheduling tasks cannot spin
//! the loop.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::Modality;
use crate::panic::panic_message;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queued {
	seq: u64,
	modality: Modality,
	task: Task,
}

#[derive(Default)]
struct DispatchState {
	queue: VecDeque<Queued>,
	seq_next: u64,
	modal_depth: u32,
}

impl DispatchState {
	/// Removes the oldest task posted before `limit` that may run now.
	fn take_eligible(&mut self, limit: u64) -> Option<Queued> {
		let depth = self.modal_depth;
		let idx = self.queue.iter().position(|q| q.seq < limit && q.modality.allows(depth))?;
		self.queue.remove(idx)
	}
}

/// Outcome of one [`Dispatcher::pump`] round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
	pub ran: usize,
	pub panicked: usize,
	/// Tasks still queued after the round (ineligible or posted mid-round).
	pub pending: usize,
}

/// Single-threaded FIFO executor for UI-confined work.
pub struct Dispatcher {
	owner: ThreadId,
	state: Mutex<DispatchState>,
	posted: Condvar,
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Dispatcher")
			.field("owner", &self.owner)
			.field("pending", &state.queue.len())
			.field("modal_depth", &state.modal_depth)
			.finish()
	}
}

impl Dispatcher {
	/// Creates a dispatcher owned by the calling thread.
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			owner: std::thread::current().id(),
			state: Mutex::new(DispatchState::default()),
			posted: Condvar::new(),
		})
	}

	pub fn is_dispatch_thread(&self) -> bool {
		std::thread::current().id() == self.owner
	}

	/// Current modality of the UI loop.
	pub fn current_modality(&self) -> Modality {
		match self.state.lock().modal_depth {
			0 => Modality::NonModal,
			d => Modality::Modal(d),
		}
	}

	/// Opens a modal level and returns its modality.
	pub fn enter_modal(&self) -> Modality {
		let mut state = self.state.lock();
		state.modal_depth += 1;
		Modality::Modal(state.modal_depth)
	}

	/// Closes the innermost modal level.
	pub fn exit_modal(&self) {
		let mut state = self.state.lock();
		state.modal_depth = state.modal_depth.saturating_sub(1);
		drop(state);
		self.posted.notify_all();
	}

	/// Posts work to run on the owning thread once `modality` allows it.
	pub fn invoke_later(&self, modality: Modality, task: impl FnOnce() + Send + 'static) {
		let mut state = self.state.lock();
		let seq = state.seq_next;
		state.seq_next = state.seq_next.wrapping_add(1);
		state.queue.push_back(Queued {
			seq,
			modality,
			task: Box::new(task),
		});
		drop(state);
		tracing::trace!(seq, ?modality, "dispatch.posted");
		self.posted.notify_all();
	}

	pub fn pending(&self) -> usize {
		self.state.lock().queue.len()
	}

	/// Runs every eligible task posted before this call, in FIFO order.
	///
	/// # Panics
	///
	/// Panics when called off the owning thread.
	pub fn pump(&self) -> DispatchReport {
		assert!(self.is_dispatch_thread(), "Dispatcher::pump called off the dispatch thread");

		let limit = self.state.lock().seq_next;
		let mut report = DispatchReport::default();
		loop {
			let Some(queued) = self.state.lock().take_eligible(limit) else {
				break;
			};
			report.ran += 1;
			if let Err(payload) = catch_unwind(AssertUnwindSafe(queued.task)) {
				report.panicked += 1;
				tracing::error!(seq = queued.seq, panic = %panic_message(&*payload), "dispatch.task_panicked");
			}
		}
		report.pending = self.pending();
		report
	}

	/// Pumps repeatedly until `done` returns true or `timeout` elapses.
	///
	/// Sleeps on the post notification between rounds, so background
	/// completions posted from other threads wake it promptly.
	pub fn pump_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
		let deadline = Instant::now() + timeout;
		loop {
			self.pump();
			if done() {
				return true;
			}
			let now = Instant::now();
			if now >= deadline {
				return false;
			}
			let mut state = self.state.lock();
			let depth = state.modal_depth;
			if !state.queue.iter().any(|q| q.modality.allows(depth)) {
				self.posted.wait_for(&mut state, (deadline - now).min(Duration::from_millis(20)));
			}
		}
	}
}
