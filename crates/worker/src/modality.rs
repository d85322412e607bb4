/// Which class of deferred UI work may run right now.
///
/// Work posted with a modality runs only while the dispatcher's current modal
/// depth does not exceed it: `NonModal` work waits for every modal dialog to
/// close, `Modal(d)` work runs inside dialogs up to depth `d`, and `Any` work
/// always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
	NonModal,
	Modal(u32),
	Any,
}

impl Modality {
	/// Returns true if work tagged with `self` may run at `depth`.
	pub const fn allows(self, depth: u32) -> bool {
		match self {
			Self::Any => true,
			Self::NonModal => depth == 0,
			Self::Modal(d) => depth <= d,
		}
	}

	/// Returns true if write actions may be started from work tagged with
	/// this modality.
	///
	/// `Any` work can interleave with an arbitrary dialog's event loop, so
	/// writes from it are never safe.
	pub const fn is_write_safe(self) -> bool {
		!matches!(self, Self::Any)
	}

	pub const fn depth(self) -> Option<u32> {
		match self {
			Self::NonModal => Some(0),
			Self::Modal(d) => Some(d),
			Self::Any => None,
		}
	}
}
