//! Reparse metrics.
//!
//! Tracks per-kind EMAs for duration, cancellation, failure, and block reuse,
//! and derives an expected duration budget from them.

use std::collections::HashMap;
use std::time::Duration;

/// Smoothing factor for Exponential Moving Average.
/// alpha = 2 / (N + 1). For N=10, alpha ~= 0.18.
const EMA_ALPHA: f64 = 0.2;

/// Whether a reparse started from scratch or from a previous tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReparseKind {
	Full,
	Incremental,
}

#[derive(Debug, Clone, Default)]
struct Ema {
	value: f64,
	initialized: bool,
}

impl Ema {
	fn update(&mut self, next: f64) {
		if self.initialized {
			self.value = EMA_ALPHA * next + (1.0 - EMA_ALPHA) * self.value;
		} else {
			self.value = next;
			self.initialized = true;
		}
	}
}

#[derive(Debug, Clone, Default)]
struct Entry {
	duration_ms: Ema,
	cancel_rate: Ema,
	failure_rate: Ema,
	reuse_ratio: Ema,
	samples: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReparseMetrics {
	entries: HashMap<ReparseKind, Entry>,
}

impl ReparseMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records one finished reparse. `reuse` is the fraction of blocks carried
	/// over, ignored for cancelled or failed attempts.
	pub fn record(&mut self, kind: ReparseKind, elapsed: Duration, cancelled: bool, failed: bool, reuse: f64) {
		let entry = self.entries.entry(kind).or_default();
		entry.samples += 1;
		entry.duration_ms.update(elapsed.as_secs_f64() * 1000.0);
		entry.cancel_rate.update(if cancelled { 1.0 } else { 0.0 });
		entry.failure_rate.update(if failed { 1.0 } else { 0.0 });
		if !cancelled && !failed {
			entry.reuse_ratio.update(reuse.clamp(0.0, 1.0));
		}
	}

	pub fn samples(&self, kind: ReparseKind) -> u64 {
		self.entries.get(&kind).map_or(0, |e| e.samples)
	}

	pub fn avg_duration(&self, kind: ReparseKind) -> Option<Duration> {
		self.entries.get(&kind).map(|e| Duration::from_secs_f64(e.duration_ms.value / 1000.0))
	}

	pub fn cancel_rate(&self, kind: ReparseKind) -> f64 {
		self.entries.get(&kind).map_or(0.0, |e| e.cancel_rate.value)
	}

	pub fn failure_rate(&self, kind: ReparseKind) -> f64 {
		self.entries.get(&kind).map_or(0.0, |e| e.failure_rate.value)
	}

	pub fn reuse_ratio(&self, kind: ReparseKind) -> f64 {
		self.entries.get(&kind).map_or(0.0, |e| e.reuse_ratio.value)
	}

	/// Expected duration budget: 2.5x the EMA, scaled up when work keeps
	/// getting cancelled (superseded edits mean the real cost is higher).
	pub fn predict_duration(&self, kind: ReparseKind, min: Duration, max: Duration) -> Duration {
		let Some(entry) = self.entries.get(&kind) else {
			return max;
		};
		let scale = 1.0 + (entry.cancel_rate.value * 2.0);
		let budget_ms = entry.duration_ms.value * 2.5 * scale;
		Duration::from_secs_f64(budget_ms / 1000.0).clamp(min, max)
	}
}
