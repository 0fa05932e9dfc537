use std::fmt;

/// Opaque session handle issued by the host runtime.
///
/// Handle values are relied upon to be unique process-wide; bookkeeping tables
/// are keyed by value, not by owning session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Opaque swapchain handle issued by the host runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SwapchainHandle(pub u64);

/// Integer pixel rectangle inside a swapchain image (top-left origin).
///
/// A zero extent means "the full image"; consumers fall back to the texture's
/// own dimensions (some runtimes omit the extent).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ImageRect {
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageRect {
    pub const fn new(offset_x: u32, offset_y: u32, width: u32, height: u32) -> Self {
        Self { offset_x, offset_y, width, height }
    }

    /// Resolves the effective extent, substituting full texture dimensions for
    /// a zero width/height.
    pub fn resolve_extent(&self, tex_width: u32, tex_height: u32) -> (u32, u32) {
        let w = if self.width == 0 { tex_width } else { self.width };
        let h = if self.height == 0 { tex_height } else { self.height };
        (w, h)
    }
}

/// Reference to the exact region of a swapchain image a view was rendered
/// into: (swapchain, array slice, rectangle).
#[derive(Debug, Copy, Clone)]
pub struct SubImage {
    pub swapchain: SwapchainHandle,
    pub array_index: u32,
    pub rect: ImageRect,
}

/// One eye view inside a projection layer.
#[derive(Debug, Copy, Clone)]
pub struct ProjectionView {
    pub sub_image: SubImage,
}

/// A projection composition layer (the only kind this pipeline processes).
#[derive(Debug, Clone)]
pub struct ProjectionLayer {
    pub views: Vec<ProjectionView>,
}

/// Composition layer submitted at frame end.
///
/// Only the first `Projection` layer is examined; quad and other layer kinds
/// pass through untouched.
#[derive(Debug, Clone)]
pub enum CompositionLayer {
    Projection(ProjectionLayer),
    Quad,
    Other,
}

/// Frame-end submission payload, as decoded by the interception adapter.
#[derive(Debug, Clone, Default)]
pub struct FrameEndInfo {
    pub layers: Vec<CompositionLayer>,
}

impl FrameEndInfo {
    /// First projection layer in submission order, if any.
    pub fn first_projection(&self) -> Option<&ProjectionLayer> {
        self.layers.iter().find_map(|layer| match layer {
            CompositionLayer::Projection(p) => Some(p),
            _ => None,
        })
    }
}

/// Graphics device/context pair negotiated by the host.
///
/// Both handles are borrowed from the application: cloning a `wgpu` handle
/// shares the underlying object, it does not create a device.
#[derive(Debug, Clone)]
pub struct GraphicsBinding {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// One tagged record on the session creation parameter chain.
///
/// Intermediate layers may legally re-wrap or extend the chain, so consumers
/// search it for the first record of the capability they understand instead
/// of assuming a position.
#[derive(Debug, Clone)]
pub enum SessionCreateInfoExt {
    GraphicsBinding(GraphicsBinding),
    /// A record of a type this layer does not interpret.
    Unknown,
}

/// Session creation parameters: the extensible record chain only — everything
/// else about session creation stays with the host.
#[derive(Debug, Clone, Default)]
pub struct SessionCreateInfo {
    pub chain: Vec<SessionCreateInfoExt>,
}

impl SessionCreateInfo {
    /// Walks the chain for the first graphics binding record.
    pub fn find_graphics_binding(&self) -> Option<&GraphicsBinding> {
        self.chain.iter().find_map(|ext| match ext {
            SessionCreateInfoExt::GraphicsBinding(binding) => Some(binding),
            SessionCreateInfoExt::Unknown => None,
        })
    }
}

/// The only host-visible failure this layer produces: structurally invalid
/// creation parameters. Everything else degrades to a logged skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// A session with this handle is already registered.
    DuplicateSession(SessionHandle),
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::DuplicateSession(handle) => {
                write!(f, "session {:#x} is already registered", handle.0)
            }
        }
    }
}

impl std::error::Error for LayerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_extent_falls_back_to_full_dimensions() {
        let rect = ImageRect::new(8, 8, 0, 0);
        assert_eq!(rect.resolve_extent(1024, 768), (1024, 768));
    }

    #[test]
    fn nonzero_extent_is_kept() {
        let rect = ImageRect::new(0, 0, 640, 480);
        assert_eq!(rect.resolve_extent(1024, 768), (640, 480));
    }

    #[test]
    fn first_projection_skips_other_layer_kinds() {
        let info = FrameEndInfo {
            layers: vec![
                CompositionLayer::Quad,
                CompositionLayer::Projection(ProjectionLayer { views: vec![] }),
                CompositionLayer::Projection(ProjectionLayer {
                    views: vec![ProjectionView {
                        sub_image: SubImage {
                            swapchain: SwapchainHandle(1),
                            array_index: 0,
                            rect: ImageRect::default(),
                        },
                    }],
                }),
            ],
        };
        // First projection wins even when a later one has more views.
        let first = info.first_projection().unwrap();
        assert!(first.views.is_empty());
    }

    #[test]
    fn graphics_binding_walk_ignores_unknown_records() {
        let info = SessionCreateInfo {
            chain: vec![SessionCreateInfoExt::Unknown, SessionCreateInfoExt::Unknown],
        };
        assert!(info.find_graphics_binding().is_none());
    }
}
