//! `nodes` crate: the `StepHandler` trait, the handler registry, and the
//! built-in service handlers.
//!
//! Every integration, built-in or host-provided, implements
//! [`StepHandler`]. The engine crate dispatches execution through the
//! [`HandlerRegistry`].

pub mod builtin;
pub mod context;
pub mod credentials;
pub mod error;
pub mod mock;
pub mod registry;
pub mod step;
pub mod traits;

pub use context::{is_empty_output, result_key, ExecutionContext, TRIGGER_DATA_KEY};
pub use credentials::Credentials;
pub use error::StepError;
pub use registry::{HandlerKey, HandlerRegistry};
pub use step::{Step, StepKind};
pub use traits::StepHandler;
