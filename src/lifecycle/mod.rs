//! Task lifecycle: running state, descriptors, status indicator content, the
//! controller-side state machine, and worker-side indicator ownership.
//!
//! ## Contents
//! - [`RunningState`], [`StateCell`] four-state projection with listeners
//! - [`TaskDescriptor`], [`TaskData`] what gets launched
//! - [`StatusSpec`], [`StatusOverrides`], [`Importance`] indicator content
//! - [`LifecycleController`] actor owning the controller's shadow state
//! - [`Announcer`] show / update / re-announce / retire on the worker side

mod announcer;
mod controller;
mod descriptor;
mod state;
mod status;

pub use announcer::Announcer;
pub(crate) use controller::probe;
pub use controller::LifecycleController;
pub use descriptor::{TaskData, TaskDescriptor};
pub use state::{RunningState, StateCell, StateListener};
pub use status::{Importance, StatusOverrides, StatusSpec};
