use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Count-down latch with timed waits.
///
/// Blocking callers wait in short slices so they can poll a cancellation
/// token between slices instead of parking indefinitely.
#[derive(Debug)]
pub struct Latch {
	count: Mutex<usize>,
	released: Condvar,
}

impl Latch {
	pub fn new(count: usize) -> Self {
		Self {
			count: Mutex::new(count),
			released: Condvar::new(),
		}
	}

	pub fn count_down(&self) {
		let mut count = self.count.lock();
		*count = count.saturating_sub(1);
		if *count == 0 {
			self.released.notify_all();
		}
	}

	pub fn is_released(&self) -> bool {
		*self.count.lock() == 0
	}

	/// Waits up to `timeout`; returns true once the latch reached zero.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let mut count = self.count.lock();
		if *count == 0 {
			return true;
		}
		self.released.wait_for(&mut count, timeout);
		*count == 0
	}
}
