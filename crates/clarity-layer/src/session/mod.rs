//! Session registry and frame-end orchestration.
//!
//! One [`Layer`] instance lives for the process. It owns the swapchain
//! bookkeeping shared across sessions and a per-session state record holding
//! the graphics binding, the resolved effect configuration and the lazily
//! built GPU resources. Every host-facing entry point is infallible except
//! session creation with a duplicate handle; anything else that cannot be
//! honored degrades to a logged skip.

use std::collections::HashMap;

use crate::config::{self, EffectConfig};
use crate::frame::{
    CompositionHooks, FrameEndInfo, FrameSource, GraphicsBinding, LayerError, SessionCreateInfo,
    SessionHandle, SwapchainHandle, SwapchainImageTracker,
};
use crate::gpu::{
    dispatch, FrameTarget, GpuTimer, Outcome, PassContext, PoolKey, ShaderCache, SkipReason,
    TempTexturePool,
};

/// Per-session record. A session created without a recognizable graphics
/// binding stays registered but inert: its frames pass through untouched.
struct SessionState {
    binding: Option<GraphicsBinding>,
    config: EffectConfig,
    shaders: ShaderCache,
    timer: Option<GpuTimer>,
    /// Set once the timer has been created (or found unsupported).
    timer_probed: bool,
    /// Frames seen so far; the first `config.debug_frames_max` report skips
    /// and outcomes at info level.
    frames_seen: u64,
}

impl SessionState {
    fn verbose(&self) -> bool {
        self.frames_seen < self.config.debug_frames_max as u64
    }

    /// Creates the frame timer on first use; a device without timestamp
    /// support is only probed once.
    fn ensure_timer(&mut self, binding: &GraphicsBinding) {
        if !self.timer_probed {
            self.timer_probed = true;
            self.timer = GpuTimer::new(&binding.device, &binding.queue);
        }
    }
}

/// Process-wide layer state.
pub struct Layer {
    source: Box<dyn FrameSource>,
    hooks: Option<Box<dyn CompositionHooks>>,
    sessions: HashMap<SessionHandle, SessionState>,
    tracker: SwapchainImageTracker,
    pool: TempTexturePool,
}

impl Layer {
    pub fn new(source: Box<dyn FrameSource>, hooks: Option<Box<dyn CompositionHooks>>) -> Self {
        Self {
            source,
            hooks,
            sessions: HashMap::new(),
            tracker: SwapchainImageTracker::new(),
            pool: TempTexturePool::new(),
        }
    }

    /// Registers a session, resolving its configuration once.
    ///
    /// Resolution also creates (or migrates) the per-user configuration file
    /// so users have something to edit. A session whose creation chain
    /// carries no graphics binding is registered inert.
    pub fn create_session(
        &mut self,
        handle: SessionHandle,
        info: &SessionCreateInfo,
    ) -> Result<(), LayerError> {
        let sources = config::ConfigSources::from_process();
        self.create_session_with_config(handle, info, config::resolve(&sources))
    }

    /// Like [`create_session`](Self::create_session) but with a caller-built
    /// configuration; used by tests and embedding hosts.
    pub fn create_session_with_config(
        &mut self,
        handle: SessionHandle,
        info: &SessionCreateInfo,
        config: EffectConfig,
    ) -> Result<(), LayerError> {
        if self.sessions.contains_key(&handle) {
            return Err(LayerError::DuplicateSession(handle));
        }

        let binding = info.find_graphics_binding().cloned();
        match &binding {
            Some(_) => log::info!(
                "session {:#x} registered (sharpness {}, fakehdr {}, levels {})",
                handle.0,
                config.sharpness,
                config.fake_hdr.enabled,
                config.levels.enabled
            ),
            None => log::info!(
                "session {:#x} has no graphics binding; passing frames through",
                handle.0
            ),
        }

        let shaders = ShaderCache::new(&config);
        self.sessions.insert(
            handle,
            SessionState {
                binding,
                config,
                shaders,
                timer: None,
                timer_probed: false,
                frames_seen: 0,
            },
        );
        Ok(())
    }

    /// Drops a session's GPU resources and configuration.
    pub fn destroy_session(&mut self, handle: SessionHandle) {
        if self.sessions.remove(&handle).is_some() {
            log::info!("session {:#x} destroyed", handle.0);
        }
    }

    /// Observes swapchain creation and caches its backing images eagerly.
    ///
    /// Eager enumeration only happens for sessions with a graphics binding;
    /// the tracker re-enumerates lazily if this hook was never observed.
    pub fn create_swapchain(&mut self, session: SessionHandle, swapchain: SwapchainHandle) {
        let has_binding = self
            .sessions
            .get(&session)
            .is_some_and(|s| s.binding.is_some());
        if !has_binding {
            return;
        }
        match self.source.enumerate_images(swapchain) {
            Some(images) => self.tracker.on_create(swapchain, images),
            None => log::warn!(
                "swapchain {:#x}: image enumeration failed at creation",
                swapchain.0
            ),
        }
    }

    /// Erases swapchain bookkeeping and retires its scratch textures.
    pub fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) {
        self.tracker.on_destroy(swapchain);
        self.pool.retire_swapchain(swapchain);
    }

    pub fn acquire_image(&mut self, swapchain: SwapchainHandle, index: u32) {
        self.tracker.on_acquire(swapchain, index);
    }

    pub fn release_image(&mut self, swapchain: SwapchainHandle) {
        self.tracker.on_release(swapchain);
    }

    /// Frame-end hook: processes every view of the first projection layer.
    ///
    /// Always brackets the work with the composition hooks when present, even
    /// when nothing is processed.
    pub fn end_frame(&mut self, session: SessionHandle, info: &FrameEndInfo) {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.pre_composition();
        }
        self.process_frame(session, info);
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.post_composition();
        }
    }

    fn process_frame(&mut self, session: SessionHandle, info: &FrameEndInfo) {
        let Some(state) = self.sessions.get_mut(&session) else {
            return;
        };
        let Some(binding) = state.binding.clone() else {
            return;
        };
        state.ensure_timer(&binding);
        let verbose = state.verbose();
        state.frames_seen += 1;

        let Some(projection) = info.first_projection() else {
            if verbose {
                log::info!("frame end without a projection layer; nothing to process");
            }
            return;
        };

        for (view_index, view) in projection.views.iter().enumerate() {
            let sub = &view.sub_image;

            let Some(image_index) = self.tracker.last_released(sub.swapchain) else {
                report_skip(verbose, view_index, "no released image recorded yet");
                continue;
            };
            let Some(images) = self.tracker.resolve(sub.swapchain, self.source.as_ref()) else {
                report_skip(verbose, view_index, "swapchain images unavailable");
                continue;
            };
            let Some(Some(texture)) = images.get(image_index as usize) else {
                report_skip(verbose, view_index, "released index out of range or empty");
                continue;
            };
            if sub.array_index >= texture.depth_or_array_layers() {
                report_skip(verbose, view_index, "array slice out of range");
                continue;
            }

            let target = FrameTarget {
                texture,
                array_index: sub.array_index,
                rect: sub.rect,
                key: PoolKey {
                    swapchain: sub.swapchain,
                    array_index: sub.array_index,
                },
            };
            let mut ctx = PassContext {
                device: &binding.device,
                queue: &binding.queue,
                config: &state.config,
                shaders: &mut state.shaders,
                timer: &mut state.timer,
                pool: &mut self.pool,
            };
            match dispatch::process(&mut ctx, &target) {
                Outcome::Processed { passes } => {
                    if verbose {
                        log::info!("view {view_index}: processed with {passes} passes");
                    }
                }
                Outcome::Skipped(reason) => {
                    report_skip(verbose, view_index, &skip_text(reason));
                }
            }
        }
    }

    /// Process teardown: drops every session and all shared bookkeeping.
    pub fn shutdown(&mut self) {
        self.sessions.clear();
        self.tracker.clear();
        self.pool.clear();
    }
}

fn report_skip(verbose: bool, view_index: usize, reason: &str) {
    if verbose {
        log::info!("view {view_index} skipped: {reason}");
    } else {
        log::debug!("view {view_index} skipped: {reason}");
    }
}

fn skip_text(reason: SkipReason) -> String {
    match reason {
        SkipReason::ShadersUnavailable => "shaders unavailable".to_owned(),
        SkipReason::UnsupportedFormat(format) => format!("unsupported format {format:?}"),
        SkipReason::MissingStorageFeature(format) => {
            format!("device lacks storage support for {format:?}")
        }
        SkipReason::Multisampled => "multisampled target".to_owned(),
        SkipReason::RectOutOfBounds => "view rectangle outside the image".to_owned(),
        SkipReason::PipelineUnavailable => "pipeline build failed".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ImageList, SessionCreateInfoExt};

    struct NullSource;

    impl FrameSource for NullSource {
        fn enumerate_images(&self, _swapchain: SwapchainHandle) -> Option<ImageList> {
            None
        }
    }

    const SESSION: SessionHandle = SessionHandle(0xA);

    #[test]
    fn duplicate_session_is_rejected() {
        let mut layer = Layer::new(Box::new(NullSource), None);
        let info = SessionCreateInfo::default();
        layer
            .create_session_with_config(SESSION, &info, EffectConfig::default())
            .unwrap();
        assert_eq!(
            layer.create_session_with_config(SESSION, &info, EffectConfig::default()),
            Err(LayerError::DuplicateSession(SESSION))
        );
    }

    #[test]
    fn handle_can_be_reused_after_destroy() {
        let mut layer = Layer::new(Box::new(NullSource), None);
        let info = SessionCreateInfo::default();
        layer
            .create_session_with_config(SESSION, &info, EffectConfig::default())
            .unwrap();
        layer.destroy_session(SESSION);
        assert!(layer
            .create_session_with_config(SESSION, &info, EffectConfig::default())
            .is_ok());
    }

    #[test]
    fn sessions_without_binding_are_inert() {
        let mut layer = Layer::new(Box::new(NullSource), None);
        let info = SessionCreateInfo {
            chain: vec![SessionCreateInfoExt::Unknown],
        };
        layer
            .create_session_with_config(SESSION, &info, EffectConfig::default())
            .unwrap();
        // Must not panic or touch the tracker.
        layer.end_frame(SESSION, &FrameEndInfo::default());
        layer.create_swapchain(SESSION, SwapchainHandle(1));
    }

    #[test]
    fn end_frame_for_unknown_session_is_a_no_op() {
        let mut layer = Layer::new(Box::new(NullSource), None);
        layer.end_frame(SessionHandle(0xDEAD), &FrameEndInfo::default());
    }

    struct CountingHooks {
        calls: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl CompositionHooks for CountingHooks {
        fn pre_composition(&mut self) {
            self.calls.borrow_mut().push("pre");
        }
        fn post_composition(&mut self) {
            self.calls.borrow_mut().push("post");
        }
    }

    #[test]
    fn hooks_bracket_every_frame_even_unprocessed_ones() {
        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let hooks = CountingHooks { calls: calls.clone() };
        let mut layer = Layer::new(Box::new(NullSource), Some(Box::new(hooks)));
        layer.end_frame(SessionHandle(0xDEAD), &FrameEndInfo::default());
        assert_eq!(*calls.borrow(), vec!["pre", "post"]);
    }
}
