//! Automatic failover.
//!
//! Providers that go down are taken out of rotation for a cooldown period.
//! Once the cooldown elapses, the next probe decides whether the provider
//! returns to rotation or starts another cooldown.

mod controller;
mod state;

pub use controller::{FailoverController, FailoverOutcome};
pub use state::{FailoverPhase, FailoverState, FailoverTable};
