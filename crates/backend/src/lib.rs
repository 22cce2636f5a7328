//! Rendering backend integration.
//!
//! Defines the [`RenderBackend`] and [`BackendSupervisor`] seams the queue
//! engine consumes, and their production implementations:
//!
//! - [`sdapi::SdApi`] -- HTTP client for the Stable Diffusion WebUI API.
//! - [`supervisor::ProcessSupervisor`] -- launches the WebUI process and
//!   waits until its API answers.

pub mod backend;
pub mod error;
pub mod sdapi;
pub mod supervisor;

pub use backend::{BackendSupervisor, RenderBackend};
pub use error::{BackendError, SupervisorError};
