//! State notification plumbing
//!
//! Each derived slot has exactly one owning controller. Owners announce
//! replacements through the [`StateDispatcher`]; dependent components
//! recompute their own slot in response.

pub mod dispatcher;
pub mod events;

pub use dispatcher::{StateDispatcher, StateSubscriber};
pub use events::StateEvent;
