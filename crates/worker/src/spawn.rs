use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::TaskClass;

const GLOBAL_WORKER_THREADS: usize = 2;

/// Shared runtime for callers outside any tokio context, such as the
/// dispatcher thread.
fn global_runtime() -> &'static Runtime {
	static GLOBAL: OnceLock<Runtime> = OnceLock::new();
	GLOBAL.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(GLOBAL_WORKER_THREADS)
			.thread_name("quill-worker")
			.build()
			.expect("failed to build the shared quill-worker runtime")
	})
}

fn handle() -> Handle {
	Handle::try_current().unwrap_or_else(|_| global_runtime().handle().clone())
}

/// Spawns `fut` on the ambient runtime (or the shared one) inside a
/// `worker.task` span tagged with `class`.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let span = tracing::trace_span!("worker.task", class = class.as_str());
	handle().spawn(fut.instrument(span))
}

/// Runs `f` on the blocking pool inside a `worker.blocking` span.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let span = tracing::trace_span!("worker.blocking", class = class.as_str());
	handle().spawn_blocking(move || span.in_scope(f))
}
