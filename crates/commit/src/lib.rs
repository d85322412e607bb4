//! Document ⇄ syntax commit core.
//!
//! Keeps each [`quill_primitives::Document`] and its parsed
//! [`quill_syntax::SyntaxFile`] reconciled:
//!
//! * edits mark a document uncommitted and snapshot its pre-edit text
//!   ([`UncommittedInfo`]);
//! * a [`CommitProcessor`] reparses, synchronously or in the background;
//! * [`CommitManager`] applies the result on the dispatch thread and runs
//!   callbacks waiting for the document, or for every document, to commit.

mod access;
mod anchors;
mod config;
mod error;
mod manager;
mod processor;
mod queue;
mod status;
mod synchronizer;
mod uncommitted;

#[cfg(test)]
mod invariants;
// Only the integration tests install a subscriber.
#[cfg(test)]
use tracing_subscriber as _;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use access::ModelLock;
pub use anchors::{AnchorId, AnchorRegistry, NoopHooks, PointerHooks};
pub use config::{CommitCfg, ConfigError, DEFAULT_LARGE_REPLACE_THRESHOLD, InvariantPolicy};
pub use error::CommitError;
pub use manager::{
	CommitManager, CommitManagerBuilder, PsiTransaction, REASON_DOCUMENT_CHANGED, REASON_PERFORM_WHEN_ALL_COMMITTED, REASON_TRANSACTION_FINISHED, SessionHandle,
};
pub use processor::{
	BackgroundCommitProcessor, CommitJob, CommitProcessor, CommitResult, FinishProcessor, MAX_REPARSE_BUDGET, MIN_REPARSE_BUDGET, install_processor, reparse_job,
};
pub use queue::ActionKey;
pub use status::CommitStatus;
pub use synchronizer::{PsiEdit, Synchronizer};
pub use uncommitted::UncommittedInfo;
