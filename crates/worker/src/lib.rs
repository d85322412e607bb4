//! Worker runtime primitives shared by the syntax and commit layers.
//!
//! * [`spawn`] / [`spawn_blocking`] route work onto a shared runtime.
//! * [`CancelToken`] carries cooperative cancellation into reparse work.
//! * [`Dispatcher`] is the single UI-confined queue; everything that must run
//!   "on the UI thread" is posted here and executed by [`Dispatcher::pump`].

mod class;
mod dispatch;
mod latch;
mod modality;
mod panic;
mod spawn;
mod token;

pub use class::TaskClass;
pub use dispatch::{DispatchReport, Dispatcher};
pub use latch::Latch;
pub use modality::Modality;
pub use panic::{join_error_panic_message, panic_message};
pub use spawn::{spawn, spawn_blocking};
pub use token::{CancelToken, Cancelled, GenerationClock};
