//! Domain layer
//!
//! Contains the session state machine and the worker reference rows it binds to.

pub mod session;
pub mod worker;
