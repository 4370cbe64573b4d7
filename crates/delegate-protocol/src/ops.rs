//! Per-step message payloads.

pub mod bootstrap;
pub mod compile;
pub mod register;

pub use bootstrap::{BootstrapCode, BootstrapRequest, BootstrapResponse};
pub use compile::{CompileRequest, CompileResponse};
pub use register::{RegistrationRequest, RegistrationResponse};
