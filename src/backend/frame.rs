// Frame cycle - acquire / record / submit / present
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  acquire ──> wait fence ──> record ──> submit ──> present ──> idle    │
// │  (signals    (image's cmd   (payload    (waits      (waits            │
// │   acquired)   buffer free)   replayed)   acquired)   render done)     │
// └──────────────────────────────────────────────────────────────────────┘
//
// Two indices rotate independently:
// - frame_index: whatever image the driver hands back (may be out of order)
// - semaphore_index: our own ring of semaphore pairs, advanced after present
//
// The GPU side is abstracted behind `PresentTarget` so the protocol can be
// driven without a device.

use ash::prelude::VkResult;
use ash::vk;
use std::time::Duration;

use super::error::{checkpoint, require, FrameError, SurfaceStatus};

/// A finalized list of draw commands, replayed into the active command
/// buffer between begin/end render pass. Mutable so a payload can rotate
/// its own per-frame buffers while recording.
pub trait DrawPayload {
    fn record(&mut self, command_buffer: vk::CommandBuffer, render_area: vk::Extent2D) -> anyhow::Result<()>;
}

/// GPU operations the frame cycle needs from a swapchain resource set.
///
/// Indices handed to these methods are always in range for the current set.
pub trait PresentTarget {
    /// Number of swapchain images (N). Zero before the first build.
    fn image_count(&self) -> usize;

    /// Pixel size the current resource set was built for.
    fn size(&self) -> (u32, u32);

    /// Replace the resource set. Must not release old resources while the GPU
    /// still references them.
    fn rebuild(&mut self, width: u32, height: u32) -> anyhow::Result<()>;

    /// Returns (image index, suboptimal).
    fn acquire(&mut self, semaphore_index: usize, timeout: u64) -> VkResult<(u32, bool)>;

    fn wait_for_fence(&mut self, frame_index: u32, timeout: u64) -> VkResult<()>;

    fn reset_fence(&mut self, frame_index: u32) -> VkResult<()>;

    /// Reset the image's command buffer and record a full render pass.
    fn record(
        &mut self,
        frame_index: u32,
        clear_color: [f32; 4],
        payload: &mut dyn DrawPayload,
    ) -> anyhow::Result<()>;

    /// Submit waiting on the acquired semaphore, signaling render-complete and
    /// the image's fence.
    fn submit(&mut self, frame_index: u32, semaphore_index: usize) -> VkResult<()>;

    /// Present waiting on the render-complete semaphore. Returns suboptimal.
    fn present(&mut self, frame_index: u32, semaphore_index: usize) -> VkResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// Result of a frame-cycle step. Fatal faults are `Err(FrameError)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum FrameStatus {
    Ok,
    /// Swapchain no longer matches the surface; rebuild before the next frame.
    NeedsRebuild,
}

/// What the outer loop should do this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Zero-area surface: don't touch the swapchain at all.
    Skip,
    /// Rebuild to this size, then render.
    Rebuild { width: u32, height: u32 },
    Render,
}

/// Frame-cycle bookkeeping: indices, staleness and phase.
#[derive(Debug)]
pub struct FrameCycle {
    frame_index: u32,
    semaphore_index: usize,
    stale: bool,
    phase: FramePhase,
    timeout: u64,
}

impl FrameCycle {
    /// `timeout` bounds the acquire and fence waits; `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            frame_index: 0,
            semaphore_index: 0,
            stale: false,
            phase: FramePhase::Idle,
            timeout: timeout
                .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
                .unwrap_or(u64::MAX),
        }
    }

    #[cfg(test)]
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    #[cfg(test)]
    pub fn semaphore_index(&self) -> usize {
        self.semaphore_index
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    #[cfg(test)]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Indices restart at zero for a fresh resource set.
    fn reset(&mut self) {
        self.frame_index = 0;
        self.semaphore_index = 0;
        self.stale = false;
        self.phase = FramePhase::Idle;
    }

    fn status(&self) -> FrameStatus {
        if self.stale {
            FrameStatus::NeedsRebuild
        } else {
            FrameStatus::Ok
        }
    }

    fn render<T: PresentTarget + ?Sized>(
        &mut self,
        target: &mut T,
        clear_color: [f32; 4],
        payload: &mut dyn DrawPayload,
    ) -> Result<FrameStatus, FrameError> {
        let image_count = target.image_count();
        if image_count == 0 {
            self.stale = true;
            return Ok(FrameStatus::NeedsRebuild);
        }
        debug_assert!(self.semaphore_index < image_count);

        // ─────────────────────────────────────────────────────────────────
        // Acquire
        // ─────────────────────────────────────────────────────────────────
        self.phase = FramePhase::Acquiring;
        let acquired = match target.acquire(self.semaphore_index, self.timeout) {
            Ok((index, false)) => Some((index, SurfaceStatus::Current)),
            Ok((index, true)) => Some((index, SurfaceStatus::Suboptimal)),
            Err(code) => {
                let status = checkpoint(code, "acquire_next_image").inspect_err(|_| {
                    self.phase = FramePhase::Idle;
                })?;
                debug_assert!(status.is_stale());
                None
            }
        };

        let Some((index, status)) = acquired else {
            // Out of date: nothing recorded, nothing submitted
            self.stale = true;
            self.phase = FramePhase::Idle;
            return Ok(FrameStatus::NeedsRebuild);
        };

        if status.is_stale() {
            // Degrade, don't drop: render this frame, rebuild afterwards
            self.stale = true;
        }

        if index as usize >= image_count {
            self.phase = FramePhase::Idle;
            return Err(FrameError::InvalidImageIndex {
                index,
                count: image_count,
            });
        }
        self.frame_index = index;

        // ─────────────────────────────────────────────────────────────────
        // Record
        // ─────────────────────────────────────────────────────────────────
        self.phase = FramePhase::Recording;
        let recorded = require(target.wait_for_fence(index, self.timeout), "wait_for_fences")
            .and_then(|_| require(target.reset_fence(index), "reset_fences"))
            .and_then(|_| {
                target
                    .record(index, clear_color, payload)
                    .map_err(FrameError::Record)
            })
            .and_then(|_| require(target.submit(index, self.semaphore_index), "queue_submit"));

        if let Err(e) = recorded {
            self.phase = FramePhase::Idle;
            return Err(e);
        }

        self.phase = FramePhase::Submitted;
        Ok(self.status())
    }

    fn present<T: PresentTarget + ?Sized>(&mut self, target: &mut T) -> Result<FrameStatus, FrameError> {
        if self.stale {
            // Resources are known to be invalid; the rebuild comes first
            self.phase = FramePhase::Idle;
            return Ok(FrameStatus::NeedsRebuild);
        }
        if self.phase != FramePhase::Submitted {
            return Ok(FrameStatus::Ok);
        }

        self.phase = FramePhase::Presenting;
        let status = match target.present(self.frame_index, self.semaphore_index) {
            Ok(false) => SurfaceStatus::Current,
            Ok(true) => SurfaceStatus::Suboptimal,
            Err(code) => checkpoint(code, "queue_present").inspect_err(|_| {
                self.phase = FramePhase::Idle;
            })?,
        };
        self.phase = FramePhase::Idle;

        match status {
            SurfaceStatus::OutOfDate => {
                self.stale = true;
            }
            SurfaceStatus::Suboptimal => {
                // The image was still presented, so its semaphore pair is spent
                self.stale = true;
                self.advance_semaphore(target.image_count());
            }
            SurfaceStatus::Current => {
                self.advance_semaphore(target.image_count());
            }
        }
        Ok(self.status())
    }

    fn advance_semaphore(&mut self, image_count: usize) {
        self.semaphore_index = (self.semaphore_index + 1) % image_count.max(1);
    }
}

/// Frame cycle bound to the resource set it drives.
///
/// Must be driven from a single thread; wrap it in a mutex if frames are
/// issued from more than one.
pub struct Presenter<T: PresentTarget> {
    target: T,
    cycle: FrameCycle,
}

impl<T: PresentTarget> Presenter<T> {
    pub fn new(target: T, timeout: Option<Duration>) -> Self {
        Self {
            target,
            cycle: FrameCycle::new(timeout),
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    #[cfg(test)]
    pub fn cycle(&self) -> &FrameCycle {
        &self.cycle
    }

    #[cfg(test)]
    pub fn is_stale(&self) -> bool {
        self.cycle.is_stale()
    }

    /// Force a rebuild on the next iteration (e.g. settings changed).
    pub fn mark_stale(&mut self) {
        self.cycle.mark_stale();
    }

    /// Decide what to do with a surface of the given pixel size.
    pub fn plan(&self, width: u32, height: u32) -> LoopAction {
        if width == 0 || height == 0 {
            return LoopAction::Skip;
        }
        if self.cycle.is_stale()
            || self.target.image_count() == 0
            || self.target.size() != (width, height)
        {
            return LoopAction::Rebuild { width, height };
        }
        LoopAction::Render
    }

    /// (Re)build the resource set and restart both index rings.
    pub fn create_or_resize(&mut self, width: u32, height: u32) -> Result<(), FrameError> {
        log::debug!("Rebuilding swapchain resources: {}x{}", width, height);
        self.target
            .rebuild(width, height)
            .map_err(FrameError::Rebuild)?;
        self.cycle.reset();
        Ok(())
    }

    pub fn render_frame(
        &mut self,
        payload: &mut dyn DrawPayload,
        clear_color: [f32; 4],
    ) -> Result<FrameStatus, FrameError> {
        self.cycle.render(&mut self.target, clear_color, payload)
    }

    pub fn present_frame(&mut self) -> Result<FrameStatus, FrameError> {
        self.cycle.present(&mut self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Rebuild(u32, u32),
        Acquire { semaphore: usize },
        WaitFence(u32),
        ResetFence(u32),
        Record(u32),
        Submit { frame: u32, semaphore: usize },
        Present { frame: u32, semaphore: usize },
    }

    /// Scripted target: acquire/present results are popped from queues,
    /// defaulting to success with images handed out round-robin.
    struct MockTarget {
        images: usize,
        size: (u32, u32),
        calls: Vec<Call>,
        acquire_results: VecDeque<VkResult<(u32, bool)>>,
        present_results: VecDeque<VkResult<bool>>,
        fence_result: VkResult<()>,
        next_image: u32,
        rebuilds: usize,
    }

    impl MockTarget {
        fn new(images: usize) -> Self {
            Self {
                images,
                size: (0, 0),
                calls: Vec::new(),
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                fence_result: Ok(()),
                next_image: 0,
                rebuilds: 0,
            }
        }

        fn submits(&self) -> Vec<&Call> {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::Submit { .. }))
                .collect()
        }
    }

    impl PresentTarget for MockTarget {
        fn image_count(&self) -> usize {
            if self.rebuilds == 0 {
                0
            } else {
                self.images
            }
        }

        fn size(&self) -> (u32, u32) {
            self.size
        }

        fn rebuild(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
            self.calls.push(Call::Rebuild(width, height));
            self.size = (width, height);
            self.rebuilds += 1;
            self.next_image = 0;
            Ok(())
        }

        fn acquire(&mut self, semaphore_index: usize, _timeout: u64) -> VkResult<(u32, bool)> {
            self.calls.push(Call::Acquire {
                semaphore: semaphore_index,
            });
            self.acquire_results.pop_front().unwrap_or_else(|| {
                let image = self.next_image;
                self.next_image = (self.next_image + 1) % self.images as u32;
                Ok((image, false))
            })
        }

        fn wait_for_fence(&mut self, frame_index: u32, _timeout: u64) -> VkResult<()> {
            self.calls.push(Call::WaitFence(frame_index));
            self.fence_result
        }

        fn reset_fence(&mut self, frame_index: u32) -> VkResult<()> {
            self.calls.push(Call::ResetFence(frame_index));
            Ok(())
        }

        fn record(
            &mut self,
            frame_index: u32,
            _clear_color: [f32; 4],
            payload: &mut dyn DrawPayload,
        ) -> anyhow::Result<()> {
            self.calls.push(Call::Record(frame_index));
            payload.record(vk::CommandBuffer::null(), vk::Extent2D { width: 800, height: 600 })
        }

        fn submit(&mut self, frame_index: u32, semaphore_index: usize) -> VkResult<()> {
            self.calls.push(Call::Submit {
                frame: frame_index,
                semaphore: semaphore_index,
            });
            Ok(())
        }

        fn present(&mut self, frame_index: u32, semaphore_index: usize) -> VkResult<bool> {
            self.calls.push(Call::Present {
                frame: frame_index,
                semaphore: semaphore_index,
            });
            self.present_results.pop_front().unwrap_or(Ok(false))
        }
    }

    /// Counts how often it was replayed
    #[derive(Default)]
    struct NoDraw {
        recorded: usize,
    }

    impl DrawPayload for NoDraw {
        fn record(&mut self, _: vk::CommandBuffer, _: vk::Extent2D) -> anyhow::Result<()> {
            self.recorded += 1;
            Ok(())
        }
    }

    const CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

    fn built(images: usize) -> Presenter<MockTarget> {
        let mut presenter = Presenter::new(MockTarget::new(images), None);
        presenter.create_or_resize(800, 600).unwrap();
        presenter.target_mut().calls.clear();
        presenter
    }

    fn frame(presenter: &mut Presenter<MockTarget>) -> (FrameStatus, FrameStatus) {
        let rendered = presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap();
        let presented = presenter.present_frame().unwrap();
        (rendered, presented)
    }

    #[test]
    fn test_successful_frame_call_order() {
        let mut presenter = built(2);
        assert_eq!(frame(&mut presenter), (FrameStatus::Ok, FrameStatus::Ok));

        assert_eq!(
            presenter.target().calls,
            vec![
                Call::Acquire { semaphore: 0 },
                Call::WaitFence(0),
                Call::ResetFence(0),
                Call::Record(0),
                Call::Submit { frame: 0, semaphore: 0 },
                Call::Present { frame: 0, semaphore: 0 },
            ]
        );
        assert_eq!(presenter.cycle().phase(), FramePhase::Idle);
    }

    #[test]
    fn test_payload_replayed_once_per_recorded_frame() {
        let mut presenter = built(2);
        let mut payload = NoDraw::default();
        presenter.render_frame(&mut payload, CLEAR).unwrap();
        presenter.present_frame().unwrap();
        assert_eq!(payload.recorded, 1);

        presenter
            .target_mut()
            .acquire_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        presenter.render_frame(&mut payload, CLEAR).unwrap();
        assert_eq!(payload.recorded, 1);
    }

    #[test]
    fn test_semaphore_index_wraps_every_image_count() {
        let mut presenter = built(2);
        let mut observed = Vec::new();
        for _ in 0..5 {
            observed.push(presenter.cycle().semaphore_index());
            frame(&mut presenter);
        }
        assert_eq!(observed, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_frame_index_follows_driver_not_semaphore() {
        let mut presenter = built(3);
        for image in [2, 0, 0, 1] {
            presenter
                .target_mut()
                .acquire_results
                .push_back(Ok((image, false)));
        }
        let mut frames = Vec::new();
        let mut semaphores = Vec::new();
        for _ in 0..4 {
            frame(&mut presenter);
            frames.push(presenter.cycle().frame_index());
        }
        for call in &presenter.target().calls {
            if let Call::Submit { semaphore, .. } = call {
                semaphores.push(*semaphore);
            }
        }
        assert_eq!(frames, vec![2, 0, 0, 1]);
        assert_eq!(semaphores, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_indices_stay_in_range() {
        for images in 2..=4 {
            let mut presenter = built(images);
            for _ in 0..(images * 5 + 1) {
                frame(&mut presenter);
                assert!((presenter.cycle().frame_index() as usize) < images);
                assert!(presenter.cycle().semaphore_index() < images);
            }
        }
    }

    #[test]
    fn test_present_waits_on_the_submitted_semaphore() {
        let mut presenter = built(3);
        for _ in 0..7 {
            frame(&mut presenter);
        }
        let calls = &presenter.target().calls;
        let mut last_submit = None;
        for call in calls {
            match call {
                Call::Submit { frame, semaphore } => last_submit = Some((*frame, *semaphore)),
                Call::Present { frame, semaphore } => {
                    assert_eq!(last_submit.take(), Some((*frame, *semaphore)));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_out_of_date_acquire_touches_nothing() {
        let mut presenter = built(2);
        frame(&mut presenter);
        frame(&mut presenter);
        presenter.target_mut().calls.clear();
        presenter
            .target_mut()
            .acquire_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let rendered = presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap();
        assert_eq!(rendered, FrameStatus::NeedsRebuild);
        assert!(presenter.is_stale());
        assert_eq!(presenter.target().calls, vec![Call::Acquire { semaphore: 0 }]);
        assert!(presenter.target().submits().is_empty());

        let presented = presenter.present_frame().unwrap();
        assert_eq!(presented, FrameStatus::NeedsRebuild);
        assert_eq!(presenter.target().calls.len(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_renders_but_skips_present() {
        let mut presenter = built(2);
        presenter
            .target_mut()
            .acquire_results
            .push_back(Ok((1, true)));

        let rendered = presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap();
        assert_eq!(rendered, FrameStatus::NeedsRebuild);
        assert_eq!(presenter.target().submits().len(), 1);
        assert_eq!(presenter.cycle().frame_index(), 1);

        assert_eq!(presenter.present_frame().unwrap(), FrameStatus::NeedsRebuild);
        assert!(!presenter
            .target()
            .calls
            .iter()
            .any(|c| matches!(c, Call::Present { .. })));
        assert_eq!(presenter.cycle().semaphore_index(), 0);
    }

    #[test]
    fn test_out_of_date_present_does_not_advance() {
        let mut presenter = built(2);
        presenter
            .target_mut()
            .present_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert_eq!(
            frame(&mut presenter),
            (FrameStatus::Ok, FrameStatus::NeedsRebuild)
        );
        assert!(presenter.is_stale());
        assert_eq!(presenter.cycle().semaphore_index(), 0);
    }

    #[test]
    fn test_suboptimal_present_advances_and_flags() {
        let mut presenter = built(2);
        presenter.target_mut().present_results.push_back(Ok(true));

        assert_eq!(
            frame(&mut presenter),
            (FrameStatus::Ok, FrameStatus::NeedsRebuild)
        );
        assert!(presenter.is_stale());
        assert_eq!(presenter.cycle().semaphore_index(), 1);
    }

    #[test]
    fn test_out_of_date_on_third_frame_scenario() {
        let mut presenter = built(2);
        frame(&mut presenter);
        frame(&mut presenter);
        let submits_before = presenter.target().submits().len();

        presenter
            .target_mut()
            .acquire_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let (rendered, presented) = frame(&mut presenter);

        assert_eq!(rendered, FrameStatus::NeedsRebuild);
        assert_eq!(presented, FrameStatus::NeedsRebuild);
        assert!(presenter.is_stale());
        assert_eq!(presenter.target().submits().len(), submits_before);
        assert_eq!(presenter.plan(800, 600), LoopAction::Rebuild { width: 800, height: 600 });
    }

    #[test]
    fn test_fatal_acquire_is_an_error() {
        let mut presenter = built(2);
        presenter
            .target_mut()
            .acquire_results
            .push_back(Err(vk::Result::ERROR_DEVICE_LOST));

        let err = presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Device { result: vk::Result::ERROR_DEVICE_LOST, .. }
        ));
        assert!(presenter.target().submits().is_empty());
        assert_eq!(presenter.cycle().phase(), FramePhase::Idle);
    }

    #[test]
    fn test_fence_timeout_is_reported() {
        let mut presenter = Presenter::new(MockTarget::new(2), Some(Duration::from_millis(5)));
        presenter.create_or_resize(640, 480).unwrap();
        presenter.target_mut().fence_result = Err(vk::Result::TIMEOUT);

        let err = presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap_err();
        assert!(matches!(err, FrameError::Timeout { op: "wait_for_fences" }));
        assert!(presenter.target().submits().is_empty());
    }

    #[test]
    fn test_timeout_is_converted_to_nanoseconds() {
        assert_eq!(FrameCycle::new(None).timeout, u64::MAX);
        assert_eq!(
            FrameCycle::new(Some(Duration::from_millis(250))).timeout,
            250_000_000
        );
    }

    #[test]
    fn test_invalid_image_index_is_rejected() {
        let mut presenter = built(2);
        presenter
            .target_mut()
            .acquire_results
            .push_back(Ok((5, false)));

        let err = presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap_err();
        assert!(matches!(err, FrameError::InvalidImageIndex { index: 5, count: 2 }));
    }

    #[test]
    fn test_rebuild_resets_indices_and_staleness() {
        let mut presenter = built(2);
        frame(&mut presenter);
        presenter
            .target_mut()
            .acquire_results
            .push_back(Ok((1, true)));
        frame(&mut presenter);
        assert!(presenter.is_stale());

        presenter.create_or_resize(800, 600).unwrap();
        assert!(!presenter.is_stale());
        assert_eq!(presenter.cycle().frame_index(), 0);
        assert_eq!(presenter.cycle().semaphore_index(), 0);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut presenter = built(2);
        presenter.create_or_resize(1024, 768).unwrap();
        presenter.create_or_resize(1024, 768).unwrap();

        assert_eq!(presenter.target().size(), (1024, 768));
        assert!(!presenter.is_stale());
        assert_eq!(presenter.plan(1024, 768), LoopAction::Render);
    }

    #[test]
    fn test_resize_between_frames_triggers_rebuild() {
        let mut presenter = built(2);
        assert_eq!(presenter.plan(800, 600), LoopAction::Render);
        frame(&mut presenter);

        assert_eq!(
            presenter.plan(1024, 768),
            LoopAction::Rebuild { width: 1024, height: 768 }
        );
        presenter.create_or_resize(1024, 768).unwrap();
        assert_eq!(presenter.plan(1024, 768), LoopAction::Render);
        assert_eq!(presenter.target().calls.last(), Some(&Call::Rebuild(1024, 768)));
    }

    #[test]
    fn test_zero_area_skips() {
        let presenter = built(2);
        assert_eq!(presenter.plan(0, 600), LoopAction::Skip);
        assert_eq!(presenter.plan(800, 0), LoopAction::Skip);
    }

    #[test]
    fn test_first_iteration_builds() {
        let presenter = Presenter::new(MockTarget::new(2), None);
        assert_eq!(
            presenter.plan(1280, 720),
            LoopAction::Rebuild { width: 1280, height: 720 }
        );
    }

    #[test]
    fn test_render_without_resources_requests_rebuild() {
        let mut presenter = Presenter::new(MockTarget::new(2), None);
        assert_eq!(
            presenter.render_frame(&mut NoDraw::default(), CLEAR).unwrap(),
            FrameStatus::NeedsRebuild
        );
        assert!(presenter.target().calls.is_empty());
    }

    #[test]
    fn test_present_without_submit_is_noop() {
        let mut presenter = built(2);
        assert_eq!(presenter.present_frame().unwrap(), FrameStatus::Ok);
        assert!(presenter.target().calls.is_empty());
    }

    #[test]
    fn test_mark_stale_forces_rebuild() {
        let mut presenter = built(2);
        presenter.mark_stale();
        assert_eq!(
            presenter.plan(800, 600),
            LoopAction::Rebuild { width: 800, height: 600 }
        );
    }
}
