//! Connection state machine.
//!
//! - [`state`] - state references, definitions and flattened tables
//! - [`versions`] - which states each protocol version declares
//! - [`transitions`] - what each accepted message does
//! - [`machine`] - the dispatcher that ties them together

mod context;
pub mod machine;
pub mod state;
mod transitions;
pub mod versions;

pub use context::MachineContext;
pub use machine::StateMachine;
pub use state::{GuardFn, State, StateDefinition, StateReference, StateTable, TransitionFn};
