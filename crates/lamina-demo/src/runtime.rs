use anyhow::{Context, Result};
use log::{error, trace, warn};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use lamina_engine::device::{Gpu, GpuInit, SurfaceErrorAction};
use lamina_engine::gl::ContextConfig;
use lamina_engine::paint::Color;
use lamina_engine::time::{FrameClock, FrameTime};
use lamina_engine::{Graphics, GraphicsConfig};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub clear_color: Color,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lamina".to_string(),
            initial_size: LogicalSize::new(960.0, 600.0),
            clear_color: Color::from_rgba8(24, 26, 32, 255),
        }
    }
}

/// Application side of the loop: builds the layer tree once, then edits it
/// before every painted frame.
pub trait Scene {
    fn build(&mut self, graphics: &mut Graphics) -> Result<()>;

    fn frame(&mut self, _graphics: &mut Graphics, _time: FrameTime) {}
}

pub struct Runtime;

impl Runtime {
    pub fn run<S>(config: RuntimeConfig, gpu_init: GpuInit, scene: S) -> Result<()>
    where
        S: Scene + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            gpu_init,
            scene,
            window: None,
            graphics: None,
            exit_requested: false,
        };
        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;
        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState<S: Scene> {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    scene: S,
    window: Option<WindowEntry>,
    graphics: Option<Graphics>,
    exit_requested: bool,
}

impl<S: Scene> AppState<S> {
    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = event_loop.create_window(attrs).context("failed to create window")?;
        let scale = window.scale_factor() as f32;
        let gpu_init = self.gpu_init.clone();

        let entry = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()?;

        let backend = entry.with_gpu(|gpu| gpu.create_backend());
        let config = GraphicsConfig {
            context: ContextConfig {
                scale_factor: scale,
                ..ContextConfig::default()
            },
            clear_color: self.config.clear_color,
        };
        let mut graphics = Graphics::new(Box::new(backend), config)?;
        let size = entry.with_gpu(|gpu| gpu.size());
        graphics.update_layout(size.width as f32 / scale, size.height as f32 / scale);
        self.scene.build(&mut graphics)?;

        entry.with_window(|w| w.request_redraw());
        self.window = Some(entry);
        self.graphics = Some(graphics);
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let (Some(entry), Some(graphics)) = (self.window.as_mut(), self.graphics.as_mut()) else {
            return;
        };
        entry.with_gpu_mut(|gpu| gpu.resize(size));
        let scale = graphics.context().scale_factor();
        graphics.update_layout(size.width as f32 / scale, size.height as f32 / scale);
    }

    fn redraw(&mut self) {
        let (Some(entry), Some(graphics)) = (self.window.as_mut(), self.graphics.as_mut()) else {
            return;
        };
        let scene = &mut self.scene;
        let mut fatal = false;
        entry.with_mut(|fields| {
            let time = fields.clock.tick();
            scene.frame(graphics, time);
            match fields.gpu.render(graphics, time.dt) {
                Ok(stats) => trace!("frame {}: {stats:?}", time.frame_index),
                Err(SurfaceErrorAction::Fatal) => {
                    error!("surface lost beyond recovery");
                    fatal = true;
                }
                Err(action) => warn!("frame {} skipped: {action:?}", time.frame_index),
            }
        });
        if fatal {
            self.exit_requested = true;
        }
    }
}

impl<S: Scene> ApplicationHandler for AppState<S> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window(event_loop) {
            error!("failed to create window: {e:#}");
            self.exit_requested = true;
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.window {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.graphics = None;
                self.window = None;
                self.exit_requested = true;
            }
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = self.window.as_ref().map(|e| e.with_window(|w| w.inner_size()));
                if let Some(size) = size {
                    self.resize(size);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
        if self.exit_requested {
            event_loop.exit();
        }
    }
}
