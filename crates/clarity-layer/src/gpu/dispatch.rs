use crate::config::EffectConfig;
use crate::frame::ImageRect;
use crate::gpu::format;
use crate::gpu::pool::{PoolKey, TempTexturePool};
use crate::gpu::shaders::{
    CasConstants, FakeHdrConstants, LevelsConstants, RectConstants, ShaderCache,
};
use crate::gpu::timing::GpuTimer;

const WORKGROUP: u32 = 16;

/// Everything one `process` call needs from the owning session.
pub struct PassContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub config: &'a EffectConfig,
    pub shaders: &'a mut ShaderCache,
    pub timer: &'a mut Option<GpuTimer>,
    pub pool: &'a mut TempTexturePool,
}

/// One view's target: a swapchain image slice plus its sub-rectangle.
pub struct FrameTarget<'a> {
    pub texture: &'a wgpu::Texture,
    pub array_index: u32,
    pub rect: ImageRect,
    pub key: PoolKey,
}

/// Why a view was left untouched this frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ShadersUnavailable,
    UnsupportedFormat(wgpu::TextureFormat),
    MissingStorageFeature(wgpu::TextureFormat),
    Multisampled,
    RectOutOfBounds,
    PipelineUnavailable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Total compute passes dispatched (primary chain plus secondaries).
    Processed { passes: u32 },
    Skipped(SkipReason),
}

/// Number of sharpening passes for a configured sharpness value.
///
/// At most 1.0 of strength applies per pass; values above 1.0 buy extra
/// passes, capped at four total.
pub fn primary_pass_count(sharpness: f32) -> u32 {
    if sharpness <= 1.0 {
        1
    } else {
        1 + (((sharpness - 1.0).ceil()) as u32).min(3)
    }
}

fn groups(extent: u32) -> u32 {
    extent.div_ceil(WORKGROUP)
}

/// Runs the full post-processing chain for one view and submits it.
///
/// Unprocessable frames (unknown format, multisampled target, shaders not
/// available) are skipped; the caller decides how loudly to report that.
pub fn process(ctx: &mut PassContext<'_>, target: &FrameTarget<'_>) -> Outcome {
    if !ctx.shaders.ensure(ctx.device) {
        return Outcome::Skipped(SkipReason::ShadersUnavailable);
    }

    let source_format = target.texture.format();
    if !format::is_supported(source_format) {
        return Outcome::Skipped(SkipReason::UnsupportedFormat(source_format));
    }
    let Some(scratch) = format::scratch_format(source_format) else {
        return Outcome::Skipped(SkipReason::UnsupportedFormat(source_format));
    };
    if !ctx.device.features().contains(format::required_features(scratch)) {
        return Outcome::Skipped(SkipReason::MissingStorageFeature(scratch));
    }
    if target.texture.sample_count() != 1 {
        return Outcome::Skipped(SkipReason::Multisampled);
    }

    let full_w = target.texture.width();
    let full_h = target.texture.height();
    let (ext_x, ext_y) = target.rect.resolve_extent(full_w, full_h);
    let (off_x, off_y) = (target.rect.offset_x, target.rect.offset_y);
    if off_x >= full_w || off_y >= full_h {
        return Outcome::Skipped(SkipReason::RectOutOfBounds);
    }
    // Hosts occasionally report a rect that spills past the image edge.
    let ext_x = ext_x.min(full_w - off_x);
    let ext_y = ext_y.min(full_h - off_y);

    // Clone out the Arc-backed handles so the cache borrow does not outlive
    // this block.
    let (cas_cb, rect_cb, fake_hdr_cb, levels_cb) = {
        let Some(buffers) = ctx.shaders.buffers() else {
            return Outcome::Skipped(SkipReason::ShadersUnavailable);
        };
        (
            buffers.cas.clone(),
            buffers.rect.clone(),
            buffers.fake_hdr.clone(),
            buffers.levels.clone(),
        )
    };
    let (cas_layout, cas_pipeline, fake_hdr_pipe, levels_pipe) = {
        let Some(set) = ctx.shaders.pipelines_for(ctx.device, scratch) else {
            return Outcome::Skipped(SkipReason::PipelineUnavailable);
        };
        (
            set.cas_layout.clone(),
            set.cas.clone(),
            set.fake_hdr.as_ref().map(|(l, p)| (l.clone(), p.clone())),
            set.levels.as_ref().map(|(l, p)| (l.clone(), p.clone())),
        )
    };
    let (scratch_in, scratch_out) = {
        let Some(temps) = ctx.pool.acquire(ctx.device, target.key, full_w, full_h, source_format)
        else {
            return Outcome::Skipped(SkipReason::UnsupportedFormat(source_format));
        };
        (temps.input.clone(), temps.output.clone())
    };

    let strength = ctx.config.sharpness.min(1.0);
    let cas = CasConstants::new(strength, full_w, full_h);
    let rect = RectConstants {
        flags: 0,
        off_x,
        off_y,
        ext_x,
        ext_y,
        _pad: [0; 3],
    };
    ctx.queue.write_buffer(&cas_cb, 0, bytemuck::bytes_of(&cas));
    ctx.queue.write_buffer(&rect_cb, 0, bytemuck::bytes_of(&rect));

    // Availability tracks both the config switch and shader health: the
    // cache only loads a secondary that was requested and still compiles.
    let run_fake_hdr = ctx.shaders.fake_hdr_available() && fake_hdr_pipe.is_some();
    if run_fake_hdr {
        let fh = &ctx.config.fake_hdr;
        let constants = FakeHdrConstants {
            power: fh.power,
            radius1: fh.radius1,
            radius2: fh.radius2,
            _pad: 0.0,
            off_x,
            off_y,
            ext_x,
            ext_y,
        };
        if let Some(buffer) = &fake_hdr_cb {
            ctx.queue.write_buffer(buffer, 0, bytemuck::bytes_of(&constants));
        }
    }
    let run_levels = ctx.shaders.levels_available() && levels_pipe.is_some();
    if run_levels {
        let lv = &ctx.config.levels;
        let constants = LevelsConstants {
            in_black: lv.in_black,
            in_white: lv.in_white,
            out_black: lv.out_black,
            out_white: lv.out_white,
            gamma: lv.gamma,
            _pad: [0.0; 3],
        };
        if let Some(buffer) = &levels_cb {
            ctx.queue.write_buffer(buffer, 0, bytemuck::bytes_of(&constants));
        }
    }

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("clarity frame"),
        });

    // Sub-rect copy-in, preserving the rectangle's position inside the
    // scratch texture so both address spaces line up.
    encoder.copy_texture_to_texture(
        wgpu::TexelCopyTextureInfo {
            texture: target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: off_x,
                y: off_y,
                z: target.array_index,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyTextureInfo {
            texture: &scratch_in,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: off_x,
                y: off_y,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width: ext_x,
            height: ext_y,
            depth_or_array_layers: 1,
        },
    );

    // Timestamps bracket the compute passes only; the copies are host
    // traffic the cost report should not include.
    if let Some(timer) = ctx.timer.as_mut() {
        timer.begin_frame(&mut encoder);
    }

    let mut current = &scratch_in;
    let mut other = &scratch_out;
    let mut passes = 0u32;

    let mut run_pass = |encoder: &mut wgpu::CommandEncoder,
                        label: &str,
                        pipeline: &wgpu::ComputePipeline,
                        layout: &wgpu::BindGroupLayout,
                        constants: &wgpu::Buffer,
                        rect_constants: Option<&wgpu::Buffer>,
                        src: &wgpu::Texture,
                        dst: &wgpu::Texture,
                        grid_w: u32,
                        grid_h: u32| {
        let src_view = src.create_view(&wgpu::TextureViewDescriptor::default());
        let dst_view = dst.create_view(&wgpu::TextureViewDescriptor::default());
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&src_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&dst_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: constants.as_entire_binding(),
            },
        ];
        if let Some(rect_constants) = rect_constants {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: rect_constants.as_entire_binding(),
            });
        }
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        });

        // One pass scope per dispatch keeps the previous output's storage
        // view released before it is rebound as a sampled source.
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups(grid_w), groups(grid_h), 1);
    };

    for _ in 0..primary_pass_count(ctx.config.sharpness) {
        run_pass(
            &mut encoder,
            "clarity cas pass",
            &cas_pipeline,
            &cas_layout,
            &cas_cb,
            Some(&rect_cb),
            current,
            other,
            ext_x,
            ext_y,
        );
        std::mem::swap(&mut current, &mut other);
        passes += 1;
    }

    if run_fake_hdr {
        if let (Some((layout, pipeline)), Some(buffer)) = (&fake_hdr_pipe, &fake_hdr_cb) {
            run_pass(
                &mut encoder,
                "clarity fakehdr pass",
                pipeline,
                layout,
                buffer,
                None,
                current,
                other,
                ext_x,
                ext_y,
            );
            std::mem::swap(&mut current, &mut other);
            passes += 1;
        }
    }

    if run_levels {
        if let (Some((layout, pipeline)), Some(buffer)) = (&levels_pipe, &levels_cb) {
            // Pointwise pass without rectangle constants; cover the whole
            // scratch texture so the sub-rect is included at any offset.
            run_pass(
                &mut encoder,
                "clarity levels pass",
                pipeline,
                layout,
                buffer,
                None,
                current,
                other,
                full_w,
                full_h,
            );
            std::mem::swap(&mut current, &mut other);
            passes += 1;
        }
    }

    if let Some(timer) = ctx.timer.as_mut() {
        timer.end_frame(&mut encoder);
    }

    // Copy the processed rectangle back into the swapchain image slice.
    encoder.copy_texture_to_texture(
        wgpu::TexelCopyTextureInfo {
            texture: current,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: off_x,
                y: off_y,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyTextureInfo {
            texture: target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: off_x,
                y: off_y,
                z: target.array_index,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width: ext_x,
            height: ext_y,
            depth_or_array_layers: 1,
        },
    );

    ctx.queue.submit(Some(encoder.finish()));
    if let Some(timer) = ctx.timer.as_mut() {
        timer.after_submit();
        timer.harvest(ctx.device);
    }

    Outcome::Processed { passes }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── pass count ──

    #[test]
    fn single_pass_up_to_full_strength() {
        assert_eq!(primary_pass_count(0.0), 1);
        assert_eq!(primary_pass_count(0.6), 1);
        assert_eq!(primary_pass_count(1.0), 1);
    }

    #[test]
    fn extra_passes_above_full_strength() {
        assert_eq!(primary_pass_count(1.9), 2);
        assert_eq!(primary_pass_count(2.0), 2);
        assert_eq!(primary_pass_count(3.4), 4);
    }

    #[test]
    fn pass_count_caps_at_four() {
        assert_eq!(primary_pass_count(10.0), 4);
        assert_eq!(primary_pass_count(100.0), 4);
    }

    // ── grid sizing ──

    #[test]
    fn workgroup_grid_rounds_up() {
        assert_eq!(groups(1), 1);
        assert_eq!(groups(16), 1);
        assert_eq!(groups(17), 2);
        assert_eq!(groups(2048), 128);
    }
}
