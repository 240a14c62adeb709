//! Full bring-up, 120 rendered frames and teardown against a real device.
//!
//! Needs an X11 display, a Vulkan driver and the shaders in `shaders/`
//! compiled to SPIR-V, so it only runs with `cargo test -- --ignored`.
#![cfg(target_os = "linux")]

use std::path::{Path, PathBuf};

use vfighter::prelude::*;
use vfighter::renderer::{LightingBlock, NormalVertex};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::x11::EventLoopBuilderExtX11,
    window::{Window, WindowId},
};

const TICKS: usize = 120;

struct Case {
    name: &'static str,
    config: RendererConfig,
    geometry: StaticGeometry,
}

fn shader_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

fn lit_triangle() -> StaticGeometry {
    let normal = [0.0, 0.0, -1.0];
    StaticGeometry::mesh(&[
        NormalVertex {
            position: [-1.0, -1.0, 0.0],
            normal,
        },
        NormalVertex {
            position: [1.0, -1.0, 0.0],
            normal,
        },
        NormalVertex {
            position: [0.0, 1.0, 0.0],
            normal,
        },
    ])
}

fn cases(cache_root: &Path) -> Vec<Case> {
    let base = |name: &str| {
        RendererConfig::default()
            .with_shader_dir(shader_dir())
            .with_pipeline_cache_path(cache_root.join(name).join("pipelinecache.bin"))
    };
    vec![
        Case {
            name: "push_constant_quad",
            config: base("push_constant_quad"),
            geometry: StaticGeometry::demo_quad(),
        },
        Case {
            name: "frame_uniform_quad",
            config: base("frame_uniform_quad")
                .with_transforms(TransformDelivery::FrameUniform)
                .with_frames_in_flight(3),
            geometry: StaticGeometry::demo_quad(),
        },
        Case {
            name: "lit_mesh",
            config: base("lit_mesh")
                .with_transforms(TransformDelivery::FrameUniform)
                .with_staging_capacity(4096)
                .with_lighting(LightingBlock {
                    ambient: [0.2, 0.2, 0.2, 1.0],
                    ..LightingBlock::default()
                }),
            geometry: lit_triangle(),
        },
    ]
}

/// Renders a spinning scene, saves the cache, drops the renderer and checks
/// that nothing was left alive.
fn run_case(window: &Window, case: Case) -> std::result::Result<(), String> {
    let cache_file = case.config.pipeline_cache_path.clone();
    let fail = |e: RenderError| format!("{}: {e}", case.name);

    let native = NativeWindow::from_window(window).map_err(fail)?;
    let mut renderer = Renderer::with_geometry(case.config, native, case.geometry).map_err(fail)?;
    let tracker = renderer.tracker();
    if tracker.total_live() == 0 {
        return Err(format!("{}: no handles tracked after bring-up", case.name));
    }

    let mut spinner = Spinner::default();
    for _ in 0..TICKS {
        spinner.step(1);
        renderer.render(&spinner.scene()).map_err(fail)?;
    }
    if renderer.frames_presented() == 0 {
        return Err(format!("{}: nothing was presented", case.name));
    }

    renderer.save_caches().map_err(fail)?;
    drop(renderer);

    if tracker.total_live() != 0 {
        return Err(format!("{}: live handles after drop: {tracker:?}", case.name));
    }
    match std::fs::metadata(&cache_file) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(format!("{}: {} is empty", case.name, cache_file.display())),
        Err(e) => Err(format!("{}: {}: {e}", case.name, cache_file.display())),
    }
}

struct Harness {
    cases: Vec<Case>,
    failures: Vec<String>,
    ran: usize,
}

impl ApplicationHandler for Harness {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attributes = Window::default_attributes()
            .with_title("vfighter gpu test")
            .with_inner_size(PhysicalSize::new(1600, 900));
        match event_loop.create_window(attributes) {
            Ok(window) => {
                for case in self.cases.drain(..) {
                    self.ran += 1;
                    if let Err(failure) = run_case(&window, case) {
                        self.failures.push(failure);
                    }
                }
            }
            Err(e) => self.failures.push(format!("window creation failed: {e}")),
        }
        event_loop.exit();
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, _event: WindowEvent) {}
}

#[test]
#[ignore = "needs an X11 display, a Vulkan driver and compiled shaders"]
fn renders_and_tears_down_without_leaks() {
    let _ = env_logger::builder().is_test(true).try_init();
    let cache_root = tempfile::tempdir().unwrap();

    let event_loop = EventLoop::builder().with_x11().with_any_thread(true).build().unwrap();
    let mut harness = Harness {
        cases: cases(cache_root.path()),
        failures: Vec::new(),
        ran: 0,
    };
    event_loop.run_app(&mut harness).unwrap();

    assert_eq!(harness.ran, 3);
    assert!(harness.failures.is_empty(), "{:#?}", harness.failures);
}
