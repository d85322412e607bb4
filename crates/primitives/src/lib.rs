//! Core document types shared by the syntax and commit layers.

/// Text buffer with change notification.
pub mod document;
/// Edit errors.
pub mod edit;
/// Change events and listeners.
pub mod event;
/// Injected-language windows over a host document.
pub mod window;

pub use document::{Document, DocumentId, FrozenDocument};
pub use edit::EditError;
pub use event::{DocumentEvent, DocumentListener};
pub use ropey::{Rope, RopeSlice};
pub use window::{DocumentWindow, HostedDocument, Placement};
