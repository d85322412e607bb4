/// What a spawned task is for. Carried into the task's tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Async orchestration: waiting for permits, handing results back.
	Background,
	/// CPU-bound reparse work on the blocking pool.
	Reparse,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Background => "background",
			Self::Reparse => "reparse",
		}
	}
}
