use super::types::SwapchainHandle;

/// An enumerated swapchain image slot.
///
/// `None` models a runtime that reports an image count but hands back an
/// empty slot; such entries are skipped at processing time.
pub type ImageList = Vec<Option<wgpu::Texture>>;

/// Capability interface onto the host runtime.
///
/// The interception adapter that actually forwards calls to the underlying
/// runtime implements this; the core pipeline never depends on the
/// interception mechanism itself. Enumeration is the one operation the core
/// initiates on its own (lazy re-enumeration when a swapchain was created
/// outside the observed creation hook).
pub trait FrameSource {
    /// Enumerates the native textures backing `swapchain`, in image-index
    /// order. `None` when the swapchain is unknown or enumeration failed.
    fn enumerate_images(&self, swapchain: SwapchainHandle) -> Option<ImageList>;
}

/// Ordered serialization hooks of the composition framework collaborator.
///
/// When present, `pre_composition` is invoked before any frame-end work and
/// `post_composition` after all of it, regardless of whether any view was
/// processed.
pub trait CompositionHooks {
    fn pre_composition(&mut self);
    fn post_composition(&mut self);
}
