use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Marker error for work abandoned through a [`CancelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Monotonic generation clock for superseding in-flight work.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Cooperative cancellation handle, optionally tagged with a generation.
///
/// Long-running work polls [`Self::check`] at safe points and bails out with
/// [`Cancelled`]; nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
	generation: u64,
	cancel: CancellationToken,
}

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a token stamped with a generation from a [`GenerationClock`].
	pub fn with_generation(generation: u64) -> Self {
		Self {
			generation,
			cancel: CancellationToken::new(),
		}
	}

	pub const fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Returns `Err(Cancelled)` once cancellation was requested.
	pub fn check(&self) -> Result<(), Cancelled> {
		if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
	}

	/// Future resolving when cancellation is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}

	/// Creates a child token in the same generation; cancelling the parent
	/// cancels the child, not the other way around.
	pub fn child(&self) -> Self {
		Self {
			generation: self.generation,
			cancel: self.cancel.child_token(),
		}
	}
}
