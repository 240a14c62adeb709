//! Drives the frame scheduler through a scripted stand-in for the device.

use std::collections::VecDeque;

use ash::vk;
use vfighter::app::{FixedTimestep, Spinner};
use vfighter::renderer::frame::classify_acquire;
use vfighter::renderer::{
    AcquireOutcome, FrameDriver, FrameOutcome, FrameScheduler, ResourceKind, ResourceTracker, Scene,
    SurfaceStatus,
};
use vfighter::Result;

const PER_IMAGE: [ResourceKind; 3] = [
    ResourceKind::ImageView,
    ResourceKind::Framebuffer,
    ResourceKind::Semaphore,
];

/// Stands in for the device. Fences complete as soon as they are waited on.
struct ScriptedDriver {
    tracker: ResourceTracker,
    image_count: u32,
    next_image: u32,
    rebuild_counts: VecDeque<u32>,
    acquires: VecDeque<AcquireOutcome>,
    presents: VecDeque<SurfaceStatus>,
    in_flight: Vec<bool>,
    waited: Vec<bool>,
    armed: Vec<bool>,
    recorded: Vec<(usize, u32)>,
    rotations: Vec<glam::Quat>,
    rebuilds: usize,
}

impl ScriptedDriver {
    fn new(depth: usize, image_count: u32) -> Self {
        let tracker = ResourceTracker::new();
        for kind in PER_IMAGE {
            tracker.created_n(kind, image_count as usize);
        }
        tracker.created(ResourceKind::Swapchain);
        tracker.created_n(ResourceKind::Fence, depth);
        Self {
            tracker,
            image_count,
            next_image: 0,
            rebuild_counts: VecDeque::new(),
            acquires: VecDeque::new(),
            presents: VecDeque::new(),
            in_flight: vec![false; depth],
            waited: vec![false; depth],
            armed: vec![false; depth],
            recorded: Vec::new(),
            rotations: Vec::new(),
            rebuilds: 0,
        }
    }

    fn teardown(&mut self) {
        assert!(self.in_flight.iter().all(|busy| !busy));
        for kind in PER_IMAGE {
            self.tracker.destroyed_n(kind, self.image_count as usize);
        }
        self.tracker.destroyed(ResourceKind::Swapchain);
        self.tracker.destroyed_n(ResourceKind::Fence, self.in_flight.len());
    }
}

impl FrameDriver for ScriptedDriver {
    fn acquire(&mut self) -> Result<AcquireOutcome> {
        if let Some(outcome) = self.acquires.pop_front() {
            return Ok(outcome);
        }
        let image = self.next_image % self.image_count;
        self.next_image += 1;
        Ok(AcquireOutcome::Ready {
            image,
            suboptimal: false,
        })
    }

    fn wait_fence(&mut self, slot: usize) -> Result<()> {
        self.in_flight[slot] = false;
        self.waited[slot] = true;
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        assert!(self.waited[slot], "slot {slot} reset before its fence was waited on");
        self.waited[slot] = false;
        self.armed[slot] = true;
        Ok(())
    }

    fn record(&mut self, slot: usize, image: u32, scene: &Scene) -> Result<()> {
        assert!(self.armed[slot], "slot {slot} recorded without a fence wait");
        assert!(!self.in_flight[slot]);
        assert!(image < self.image_count);
        self.recorded.push((slot, image));
        self.rotations.push(scene.model_rotation);
        Ok(())
    }

    fn submit(&mut self, slot: usize, _image: u32) -> Result<()> {
        assert!(self.armed[slot]);
        self.armed[slot] = false;
        self.in_flight[slot] = true;
        Ok(())
    }

    fn present(&mut self, _image: u32) -> Result<SurfaceStatus> {
        Ok(self.presents.pop_front().unwrap_or(SurfaceStatus::Optimal))
    }

    fn rebuild_swapchain(&mut self) -> Result<()> {
        assert!(
            self.in_flight.iter().all(|busy| !busy),
            "swapchain rebuilt while a slot was in flight"
        );
        for kind in PER_IMAGE {
            self.tracker.destroyed_n(kind, self.image_count as usize);
        }
        if let Some(count) = self.rebuild_counts.pop_front() {
            self.image_count = count;
        }
        for kind in PER_IMAGE {
            self.tracker.created_n(kind, self.image_count as usize);
        }
        self.next_image = 0;
        self.rebuilds += 1;
        Ok(())
    }
}

fn assert_per_image_matches(driver: &ScriptedDriver) {
    for kind in PER_IMAGE {
        assert_eq!(driver.tracker.live(kind), driver.image_count as usize, "{kind:?}");
    }
}

#[test]
fn slots_rotate_and_every_slot_is_waited_before_reuse() {
    let mut driver = ScriptedDriver::new(2, 3);
    let mut scheduler = FrameScheduler::new(2);
    let scene = Scene::default();

    for _ in 0..7 {
        assert_eq!(scheduler.tick(&mut driver, &scene).unwrap(), FrameOutcome::Presented);
    }

    let slots: Vec<usize> = driver.recorded.iter().map(|&(slot, _)| slot).collect();
    assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0]);
    let images: Vec<u32> = driver.recorded.iter().map(|&(_, image)| image).collect();
    assert_eq!(images, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(scheduler.frames_presented(), 7);
    assert_eq!(scheduler.recreations(), 0);
}

#[test]
fn out_of_date_acquire_skips_the_frame() {
    let mut driver = ScriptedDriver::new(2, 3);
    driver.acquires.push_back(AcquireOutcome::OutOfDate);
    driver.rebuild_counts.push_back(4);
    let mut scheduler = FrameScheduler::new(2);

    let outcome = scheduler.tick(&mut driver, &Scene::default()).unwrap();
    assert_eq!(outcome, FrameOutcome::Recreated { presented: false });
    assert!(driver.recorded.is_empty());
    assert_eq!(scheduler.ring().frames(), 0);
    assert_eq!(scheduler.frames_presented(), 0);
    assert_eq!(driver.image_count, 4);
    assert_per_image_matches(&driver);

    assert_eq!(
        scheduler.tick(&mut driver, &Scene::default()).unwrap(),
        FrameOutcome::Presented
    );
    assert_eq!(driver.recorded, vec![(0, 0)]);
}

#[test]
fn suboptimal_acquire_presents_then_recreates() {
    let mut driver = ScriptedDriver::new(2, 3);
    driver.acquires.push_back(AcquireOutcome::Ready {
        image: 1,
        suboptimal: true,
    });
    driver.rebuild_counts.push_back(2);
    let mut scheduler = FrameScheduler::new(2);

    let outcome = scheduler.tick(&mut driver, &Scene::default()).unwrap();
    assert_eq!(outcome, FrameOutcome::Recreated { presented: true });
    assert_eq!(driver.recorded, vec![(0, 1)]);
    assert_eq!(scheduler.frames_presented(), 1);
    assert_eq!(driver.rebuilds, 1);
    assert_per_image_matches(&driver);
}

#[test]
fn stale_present_recreates_after_draining_every_slot() {
    for status in [SurfaceStatus::Suboptimal, SurfaceStatus::OutOfDate] {
        let mut driver = ScriptedDriver::new(3, 3);
        let mut scheduler = FrameScheduler::new(3);
        let scene = Scene::default();

        scheduler.tick(&mut driver, &scene).unwrap();
        scheduler.tick(&mut driver, &scene).unwrap();
        driver.presents.push_back(status);
        driver.rebuild_counts.push_back(5);

        let outcome = scheduler.tick(&mut driver, &scene).unwrap();
        assert_eq!(outcome, FrameOutcome::Recreated { presented: true });
        assert_eq!(scheduler.recreations(), 1);
        assert_per_image_matches(&driver);

        // Drained fences stay signalled, so the next tick can reuse slot 0.
        assert_eq!(scheduler.tick(&mut driver, &scene).unwrap(), FrameOutcome::Presented);
        assert_eq!(driver.recorded.last(), Some(&(0, 0)));
    }
}

#[test]
fn driver_failures_propagate() {
    struct Broken;
    impl FrameDriver for Broken {
        fn acquire(&mut self) -> Result<AcquireOutcome> {
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST))
        }
        fn wait_fence(&mut self, _slot: usize) -> Result<()> {
            unreachable!()
        }
        fn reset_fence(&mut self, _slot: usize) -> Result<()> {
            unreachable!()
        }
        fn record(&mut self, _slot: usize, _image: u32, _scene: &Scene) -> Result<()> {
            unreachable!()
        }
        fn submit(&mut self, _slot: usize, _image: u32) -> Result<()> {
            unreachable!()
        }
        fn present(&mut self, _image: u32) -> Result<SurfaceStatus> {
            unreachable!()
        }
        fn rebuild_swapchain(&mut self) -> Result<()> {
            unreachable!()
        }
    }

    let mut scheduler = FrameScheduler::new(2);
    let err = scheduler.tick(&mut Broken, &Scene::default()).unwrap_err();
    assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
    assert_eq!(scheduler.ring().frames(), 0);
}

#[test]
fn rotating_scene_survives_repeated_recreation_without_leaks() {
    let mut driver = ScriptedDriver::new(2, 3);
    let mut scheduler = FrameScheduler::new(2);
    let mut timestep = FixedTimestep::default();
    let mut spinner = Spinner::default();

    for tick in 0..120 {
        match tick % 40 {
            10 => driver.acquires.push_back(AcquireOutcome::OutOfDate),
            20 => driver.presents.push_back(SurfaceStatus::Suboptimal),
            30 => driver.presents.push_back(SurfaceStatus::OutOfDate),
            _ => {}
        }
        driver.rebuild_counts.push_back(2 + (tick % 3) as u32);

        spinner.step(timestep.advance(timestep.step()));
        scheduler.tick(&mut driver, &spinner.scene()).unwrap();
        assert_per_image_matches(&driver);
    }

    assert_eq!(scheduler.recreations(), 9);
    assert_eq!(scheduler.frames_presented(), 117);
    assert!(driver.rotations.windows(2).all(|pair| pair[0] != pair[1]));

    scheduler.drain(&mut driver).unwrap();
    driver.teardown();
    assert_eq!(driver.tracker.total_live(), 0, "{:?}", driver.tracker);
}
