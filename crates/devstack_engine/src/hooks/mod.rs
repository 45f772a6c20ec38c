//! Provisioning lifecycle hooks.
//!
//! Observers registered on [`ProvisionHooks`] receive every
//! [`ProvisionEvent`] an apply emits, in order, on the task driving the
//! apply.

mod api;
mod events;

pub use api::{HookRegistrationError, ProvisionHooks};
pub use events::ProvisionEvent;
