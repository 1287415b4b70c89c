//! Frame synchronization ring and the per-frame draw protocol
//!
//! A [`FrameRing`] holds N slots, each with its own command buffer, semaphores
//! and fence. [`run_frame`] drives one slot through
//! wait → acquire → reset → record → submit → present, against any
//! [`FrameDevice`]. The real device implementation lives in the renderer; tests
//! drive the same protocol against a mock that tracks fence state.
//!
//! Ordering rules enforced here:
//! - a slot's command buffer is only reset after its fence has been waited on
//! - a stale acquire abandons the frame before the fence is reset, so the slot
//!   stays signaled and the ring index does not move
//! - the ring advances once per frame that reaches submission

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Raw handles of one ring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// Command buffer recorded for this slot
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by image acquisition, waited on by submission
    pub image_available: vk::Semaphore,
    /// Signaled by submission, waited on by presentation
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's GPU work completes
    pub in_flight: vk::Fence,
}

/// Next ring position after `index` in a ring of `count` slots
pub fn next_index(index: usize, count: usize) -> usize {
    (index + 1) % count
}

/// Rotating set of frame slots with exactly one active entry
#[derive(Debug, Clone)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    index: usize,
}

impl FrameRing {
    /// Build a ring over `slots`, starting at slot 0
    pub fn new(slots: Vec<FrameSlot>) -> VulkanResult<Self> {
        if slots.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "frame ring needs at least one slot".to_string(),
            });
        }
        Ok(Self { slots, index: 0 })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring has at least one slot
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the active slot
    pub fn index(&self) -> usize {
        self.index
    }

    /// The active slot
    pub fn current(&self) -> FrameSlot {
        self.slots[self.index]
    }

    /// Rotate to the next slot
    pub fn advance(&mut self) {
        self.index = next_index(self.index, self.slots.len());
    }

    /// All slots in ring order
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }
}

/// Outcome of one draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Commands were submitted and the image queued for presentation
    Presented,
    /// The swapchain was stale on acquire; nothing was submitted
    Skipped,
}

/// Where the current frame is being recorded
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    /// Active slot
    pub slot: FrameSlot,
    /// Ring index of the active slot
    pub frame_index: usize,
    /// Acquired swapchain image
    pub image_index: u32,
}

/// Device operations the frame protocol is built from
pub trait FrameDevice {
    /// Block until `fence` is signaled
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()>;

    /// Acquire the next presentable image, returning `(index, suboptimal)`
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<(u32, bool)>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()>;

    /// Reset and begin `command_buffer`, then open the render pass on `image_index`
    fn begin_frame_commands(&mut self, command_buffer: vk::CommandBuffer, image_index: u32) -> VulkanResult<()>;

    /// Close the render pass and finish recording
    fn end_frame_commands(&mut self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Submit the slot's command buffer to the graphics queue
    fn submit(&mut self, slot: &FrameSlot) -> VulkanResult<()>;

    /// Queue `image_index` for presentation, returning whether the swapchain is suboptimal
    fn present(&mut self, slot: &FrameSlot, image_index: u32) -> VulkanResult<bool>;

    /// Rebuild the swapchain and everything sized from it
    fn recreate_swapchain(&mut self) -> VulkanResult<()>;

    /// Whether the window reported a resize since the last call
    fn surface_resized(&mut self) -> bool {
        false
    }
}

fn is_stale(err: &VulkanError) -> bool {
    matches!(
        err,
        VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR)
    )
}

/// Run one frame on the ring's active slot
///
/// `record` is called between render pass begin and end. Only a stale swapchain
/// is handled here; every other error is returned to the caller unchanged.
pub fn run_frame<D, F>(device: &mut D, ring: &mut FrameRing, record: F) -> VulkanResult<FrameStatus>
where
    D: FrameDevice + ?Sized,
    F: FnOnce(&mut D, FrameTarget) -> VulkanResult<()>,
{
    let slot = ring.current();
    let frame_index = ring.index();

    device.wait_for_fence(slot.in_flight)?;

    let image_index = match device.acquire_next_image(slot.image_available) {
        Ok((index, suboptimal)) => {
            if suboptimal {
                log::debug!("Acquired image {} from a suboptimal swapchain", index);
            }
            index
        }
        Err(err) if matches!(err, VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
            log::warn!("Swapchain out of date on acquire, skipping frame {}", frame_index);
            device.recreate_swapchain()?;
            return Ok(FrameStatus::Skipped);
        }
        Err(err) => return Err(err),
    };

    device.reset_fence(slot.in_flight)?;
    device.begin_frame_commands(slot.command_buffer, image_index)?;
    record(
        device,
        FrameTarget {
            slot,
            frame_index,
            image_index,
        },
    )?;
    device.end_frame_commands(slot.command_buffer)?;
    device.submit(&slot)?;
    ring.advance();

    let stale = match device.present(&slot, image_index) {
        Ok(suboptimal) => suboptimal,
        Err(err) if is_stale(&err) => true,
        Err(err) => return Err(err),
    };
    if stale || device.surface_resized() {
        log::info!("Swapchain stale after present, recreating");
        device.recreate_swapchain()?;
    }

    Ok(FrameStatus::Presented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::collections::{HashMap, VecDeque};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FenceState {
        Signaled,
        Unsignaled,
        /// Submitted work not yet observed complete by the host
        Pending,
    }

    /// Device double that tracks fence state and records protocol violations
    struct MockFrameDevice {
        fences: HashMap<vk::Fence, FenceState>,
        fence_of: HashMap<vk::CommandBuffer, vk::Fence>,
        acquire_results: VecDeque<VulkanResult<(u32, bool)>>,
        present_results: VecDeque<VulkanResult<bool>>,
        next_image: u32,
        image_count: u32,
        violations: Vec<String>,
        submissions: usize,
        recreations: usize,
        resets: Vec<vk::CommandBuffer>,
    }

    impl MockFrameDevice {
        fn new(ring: &FrameRing) -> Self {
            let mut fences = HashMap::new();
            let mut fence_of = HashMap::new();
            for slot in ring.slots() {
                fences.insert(slot.in_flight, FenceState::Signaled);
                fence_of.insert(slot.command_buffer, slot.in_flight);
            }
            Self {
                fences,
                fence_of,
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                next_image: 0,
                image_count: 3,
                violations: Vec::new(),
                submissions: 0,
                recreations: 0,
                resets: Vec::new(),
            }
        }

        fn fence_state(&self, fence: vk::Fence) -> FenceState {
            self.fences[&fence]
        }
    }

    impl FrameDevice for MockFrameDevice {
        fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
            match self.fences[&fence] {
                FenceState::Unsignaled => self.violations.push(format!("wait on unsubmitted fence {fence:?}")),
                FenceState::Pending | FenceState::Signaled => {
                    self.fences.insert(fence, FenceState::Signaled);
                }
            }
            Ok(())
        }

        fn acquire_next_image(&mut self, _signal: vk::Semaphore) -> VulkanResult<(u32, bool)> {
            if let Some(result) = self.acquire_results.pop_front() {
                return result;
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, false))
        }

        fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
            if self.fences[&fence] == FenceState::Pending {
                self.violations.push(format!("reset of in-flight fence {fence:?}"));
            }
            self.fences.insert(fence, FenceState::Unsignaled);
            Ok(())
        }

        fn begin_frame_commands(&mut self, command_buffer: vk::CommandBuffer, _image_index: u32) -> VulkanResult<()> {
            let fence = self.fence_of[&command_buffer];
            if self.fences[&fence] == FenceState::Pending {
                self.violations.push(format!("reset of in-flight command buffer {command_buffer:?}"));
            }
            self.resets.push(command_buffer);
            Ok(())
        }

        fn end_frame_commands(&mut self, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
            Ok(())
        }

        fn submit(&mut self, slot: &FrameSlot) -> VulkanResult<()> {
            if self.fences[&slot.in_flight] != FenceState::Unsignaled {
                self.violations.push(format!("submit with non-reset fence {:?}", slot.in_flight));
            }
            self.fences.insert(slot.in_flight, FenceState::Pending);
            self.submissions += 1;
            Ok(())
        }

        fn present(&mut self, _slot: &FrameSlot, _image_index: u32) -> VulkanResult<bool> {
            self.present_results.pop_front().unwrap_or(Ok(false))
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.recreations += 1;
            Ok(())
        }
    }

    fn ring(count: usize) -> FrameRing {
        let slots = (0..count as u64)
            .map(|i| FrameSlot {
                command_buffer: vk::CommandBuffer::from_raw(0x100 + i),
                image_available: vk::Semaphore::from_raw(0x200 + i),
                render_finished: vk::Semaphore::from_raw(0x300 + i),
                in_flight: vk::Fence::from_raw(0x400 + i),
            })
            .collect();
        FrameRing::new(slots).unwrap()
    }

    fn draw(device: &mut MockFrameDevice, ring: &mut FrameRing) -> FrameStatus {
        run_frame(device, ring, |_, _| Ok(())).unwrap()
    }

    /// After N+1 draws the active index is (N+1) mod N
    #[test]
    fn test_index_after_n_plus_one_draws() {
        for count in 1..=4 {
            let mut ring = ring(count);
            let mut device = MockFrameDevice::new(&ring);
            for _ in 0..=count {
                assert_eq!(draw(&mut device, &mut ring), FrameStatus::Presented);
            }
            assert_eq!(ring.index(), (count + 1) % count);
        }
    }

    /// Rotation is a pure modulo increment
    #[test]
    fn test_next_index_wraps() {
        assert_eq!(next_index(0, 2), 1);
        assert_eq!(next_index(1, 2), 0);
        assert_eq!(next_index(0, 1), 0);
    }

    /// A slot's command buffer is never reset while its fence is pending
    #[test]
    fn test_no_reset_while_in_flight() {
        let mut ring = ring(2);
        let mut device = MockFrameDevice::new(&ring);
        for _ in 0..10 {
            draw(&mut device, &mut ring);
        }
        assert!(device.violations.is_empty(), "{:?}", device.violations);
        assert_eq!(device.submissions, 10);
        assert_eq!(device.resets.len(), 10);
    }

    /// The mock flags a reset that skips the fence wait
    #[test]
    fn test_mock_detects_premature_reset() {
        let ring = ring(1);
        let mut device = MockFrameDevice::new(&ring);
        let slot = ring.current();
        device.reset_fence(slot.in_flight).unwrap();
        device.submit(&slot).unwrap();
        device.begin_frame_commands(slot.command_buffer, 0).unwrap();
        assert_eq!(device.violations.len(), 1);
    }

    /// A stale acquire skips the frame without submitting or advancing
    #[test]
    fn test_out_of_date_acquire_skips_frame() {
        let mut ring = ring(2);
        let mut device = MockFrameDevice::new(&ring);
        device
            .acquire_results
            .push_back(Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR)));

        let mut recorded = false;
        let status = run_frame(&mut device, &mut ring, |_, _| {
            recorded = true;
            Ok(())
        })
        .unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert!(!recorded);
        assert_eq!(ring.index(), 0);
        assert_eq!(device.submissions, 0);
        assert_eq!(device.recreations, 1);
        // Fence left signaled so the retry does not block forever
        assert_eq!(device.fence_state(ring.current().in_flight), FenceState::Signaled);

        assert_eq!(draw(&mut device, &mut ring), FrameStatus::Presented);
        assert_eq!(ring.index(), 1);
        assert!(device.violations.is_empty());
    }

    /// A suboptimal acquire still renders
    #[test]
    fn test_suboptimal_acquire_renders() {
        let mut ring = ring(2);
        let mut device = MockFrameDevice::new(&ring);
        device.acquire_results.push_back(Ok((1, true)));
        assert_eq!(draw(&mut device, &mut ring), FrameStatus::Presented);
        assert_eq!(device.recreations, 0);
    }

    /// Stale present results trigger recreation after the frame is counted
    #[test]
    fn test_stale_present_recreates() {
        let mut ring = ring(2);
        let mut device = MockFrameDevice::new(&ring);
        device.present_results.push_back(Ok(true));
        device
            .present_results
            .push_back(Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR)));

        draw(&mut device, &mut ring);
        draw(&mut device, &mut ring);
        assert_eq!(device.recreations, 2);
        assert_eq!(ring.index(), 0);
    }

    /// Non-swapchain present failures are fatal but the submitted frame still counts
    #[test]
    fn test_fatal_present_error() {
        let mut ring = ring(2);
        let mut device = MockFrameDevice::new(&ring);
        device
            .present_results
            .push_back(Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));

        let result = run_frame(&mut device, &mut ring, |_, _| Ok(()));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
        assert_eq!(ring.index(), 1);
        assert_eq!(device.recreations, 0);
    }

    /// Fatal acquire failures propagate without advancing
    #[test]
    fn test_fatal_acquire_error() {
        let mut ring = ring(2);
        let mut device = MockFrameDevice::new(&ring);
        device
            .acquire_results
            .push_back(Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR)));

        assert!(run_frame(&mut device, &mut ring, |_, _| Ok(())).is_err());
        assert_eq!(ring.index(), 0);
        assert_eq!(device.submissions, 0);
    }

    /// The recorder sees the slot that will be submitted
    #[test]
    fn test_record_sees_active_slot() {
        let mut ring = ring(3);
        let mut device = MockFrameDevice::new(&ring);
        draw(&mut device, &mut ring);

        let expected = ring.current();
        run_frame(&mut device, &mut ring, |_, target| {
            assert_eq!(target.frame_index, 1);
            assert_eq!(target.slot, expected);
            Ok(())
        })
        .unwrap();
    }

    /// Empty rings are rejected
    #[test]
    fn test_empty_ring_rejected() {
        assert!(FrameRing::new(Vec::new()).is_err());
    }
}
