//! In-process post-processing layer for XR frame submission.
//!
//! Sits between an application and its runtime, intercepting the frame
//! lifecycle to sharpen each submitted eye view in place with a
//! contrast-adaptive compute filter, optionally followed by FakeHDR and
//! levels passes. The layer is a guest in the host process: it never fails a
//! frame, degrading to logged pass-through whenever an image cannot be
//! processed.
//!
//! - [`session`] holds the process-wide [`session::Layer`] entry points.
//! - [`frame`] defines the host-facing protocol types and swapchain
//!   bookkeeping.
//! - [`gpu`] owns format negotiation, scratch textures, shaders and the
//!   per-view dispatch chain.
//! - [`config`] resolves the effect configuration.

pub mod config;
pub mod frame;
pub mod gpu;
pub mod session;

pub mod logging;
