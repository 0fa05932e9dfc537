//! Pixel format negotiation for the pass chain.
//!
//! Compute passes need the scratch textures bound as both a sampled view and
//! a write-only storage view, which constrains the usable formats to a small
//! whitelist of 8-bit and 16-bit-float color formats. sRGB swapchain variants
//! are handled by creating the scratch textures in the linear (UNORM)
//! equivalent; texture copies between a format and its sRGB variant are
//! permitted, so copy-in/copy-out needs no conversion pass.

use wgpu::TextureFormat;

/// Source formats the dispatch engine accepts. Anything else is a per-frame
/// skip, never an error.
pub const SUPPORTED_FORMATS: &[TextureFormat] = &[
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba8UnormSrgb,
    TextureFormat::Bgra8Unorm,
    TextureFormat::Bgra8UnormSrgb,
    TextureFormat::Rgba16Float,
];

pub fn is_supported(format: TextureFormat) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

/// Linear equivalent used for the pooled scratch textures and their views.
///
/// Returns `None` for formats outside the whitelist.
pub fn scratch_format(format: TextureFormat) -> Option<TextureFormat> {
    match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
            Some(TextureFormat::Rgba8Unorm)
        }
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
            Some(TextureFormat::Bgra8Unorm)
        }
        TextureFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
        _ => None,
    }
}

/// WGSL storage-texture format token for kernel specialization.
pub fn storage_token(scratch: TextureFormat) -> Option<&'static str> {
    match scratch {
        TextureFormat::Rgba8Unorm => Some("rgba8unorm"),
        TextureFormat::Bgra8Unorm => Some("bgra8unorm"),
        TextureFormat::Rgba16Float => Some("rgba16float"),
        _ => None,
    }
}

/// Device features a given scratch format needs beyond the baseline.
///
/// BGRA storage texture access is an optional capability; without it the
/// BGRA formats are treated as unsupported at dispatch time.
pub fn required_features(scratch: TextureFormat) -> wgpu::Features {
    match scratch {
        TextureFormat::Bgra8Unorm => wgpu::Features::BGRA8UNORM_STORAGE,
        _ => wgpu::Features::empty(),
    }
}
