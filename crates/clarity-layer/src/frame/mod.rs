//! Host-facing frame protocol types.
//!
//! This module is responsible for:
//! - the opaque handle and sub-image types the interception adapter decodes
//! - the capability traits the core depends on (`FrameSource`,
//!   `CompositionHooks`)
//! - per-swapchain image bookkeeping (`SwapchainImageTracker`)

mod source;
mod tracker;
mod types;

pub use source::{CompositionHooks, FrameSource, ImageList};
pub use tracker::SwapchainImageTracker;
pub use types::{
    CompositionLayer, FrameEndInfo, GraphicsBinding, ImageRect, LayerError, ProjectionLayer,
    ProjectionView, SessionCreateInfo, SessionCreateInfoExt, SessionHandle, SubImage,
    SwapchainHandle,
};
