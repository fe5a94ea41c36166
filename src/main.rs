use glam::Vec3;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use winit::{
    event::*,
    event_loop::EventLoop,
    keyboard::{KeyCode, ModifiersState, PhysicalKey},
    window::{CursorGrabMode, Window},
};

// Import from the library crate
use splatwalk::{
    audio::SilentBackend,
    config::Config,
    controller::{self, frame_loop::DEFAULT_LEVEL},
    events::AppEvent,
    logging,
    model::ModelState,
    persistence::MemoryStore,
    view::TracingScene,
};

use controller::input::InputEvent;
use controller::look::{LockError, LockRequest, LookMode};
use controller::FrameLoopContext;

type Context = FrameLoopContext<TracingScene, SilentBackend>;

struct App {
    window: Arc<Window>,
    ctx: Context,
    modifiers: ModifiersState,
    start: Instant,
}

impl App {
    fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();
        let mut ctx = FrameLoopContext::new(Config::default(), TracingScene::new(), Box::new(MemoryStore::new()), LookMode::Desktop);
        ctx.camera.set_aspect(size.width, size.height);

        // No splat collision natively, a floor keeps the player and balls in view
        if let Some(physics) = ctx.physics.as_mut() {
            physics.world_mut().add_fixed_box(Vec3::new(0.0, -1.0, 0.0), Vec3::new(200.0, 0.5, 200.0), 0.3, 0.8);
        }

        // Characters have no model to load here
        for id in ctx.spawn_level(DEFAULT_LEVEL) {
            ctx.roster.set_model_state(&id, ModelState::Loaded);
        }

        // Without pointer lock the cursor is released here
        {
            let window = window.clone();
            ctx.events.subscribe(move |event| {
                if matches!(event, AppEvent::LookDisengaged) {
                    release_cursor(&window);
                }
                info!(?event, "app event");
            });
        }

        ctx.init_audio(SilentBackend);

        Self {
            window,
            ctx,
            modifiers: ModifiersState::empty(),
            start: Instant::now(),
        }
    }

    fn input(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event: KeyEvent { state, physical_key, repeat, .. }, .. } => {
                if let PhysicalKey::Code(code) = physical_key {
                    // Matches the DOM `KeyboardEvent.code` strings
                    let name = format!("{code:?}");
                    match state {
                        ElementState::Pressed => {
                            if *code == KeyCode::KeyM && !repeat {
                                let muted = self.ctx.toggle_mute();
                                info!(muted, "mute toggled");
                            }
                            let ctrl = self.modifiers.control_key();
                            self.ctx.handle_input(&InputEvent::KeyDown { code: name, ctrl });
                            if *code == KeyCode::Escape {
                                self.ctx.release_lock();
                            }
                        }
                        ElementState::Released => {
                            self.ctx.handle_input(&InputEvent::KeyUp { code: name });
                        }
                    }
                }
                true
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
                true
            }
            WindowEvent::MouseInput { state: ElementState::Pressed, button: MouseButton::Left, .. } => {
                self.lock_cursor();
                true
            }
            WindowEvent::Focused(false) => {
                self.ctx.handle_input(&InputEvent::FocusLost);
                true
            }
            _ => false,
        }
    }

    fn lock_cursor(&mut self) {
        if self.ctx.request_lock() != LockRequest::RequestPointerLock {
            return;
        }
        // Locked is unsupported on some platforms, Confined is the fallback
        let grabbed = self
            .window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
        match grabbed {
            Ok(()) => {
                self.window.set_cursor_visible(false);
                self.ctx.pointer_lock_changed(true);
            }
            Err(e) => {
                warn!("cursor grab failed: {e}");
                self.ctx.lock_rejected(LockError::Other);
            }
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.ctx.camera.set_aspect(new_size.width, new_size.height);
        }
    }

    fn handle_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.ctx.mouse_moved(dx as f32, dy as f32);
    }

    fn update(&mut self) {
        let report = self.ctx.update(self.start.elapsed().as_secs_f64());
        if report.shot {
            let eye = self.ctx.camera.eye;
            info!(x = eye.x, y = eye.y, z = eye.z, balls = self.ctx.projectiles.len(), "shot fired");
        }
    }
}

fn release_cursor(window: &Window) {
    if let Err(e) = window.set_cursor_grab(CursorGrabMode::None) {
        warn!("cursor release failed: {e}");
    }
    window.set_cursor_visible(true);
}

fn main() {
    logging::init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("could not create event loop: {e}");
            return;
        }
    };
    let window_attributes = Window::default_attributes()
        .with_title("splatwalk - Native")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
    let window = match event_loop.create_window(window_attributes) {
        Ok(window) => Arc::new(window),
        Err(e) => {
            error!("could not create window: {e}");
            return;
        }
    };

    let mut app = App::new(window);

    let result = event_loop.run(move |event, elwt| {
        match event {
            Event::WindowEvent {
                ref event,
                window_id,
            } if window_id == app.window.id() => {
                if !app.input(event) {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(physical_size) => {
                            app.resize(*physical_size);
                        }
                        WindowEvent::RedrawRequested => {
                            app.update();
                        }
                        _ => {}
                    }
                }
            }
            Event::DeviceEvent { event: DeviceEvent::MouseMotion { delta }, .. } => {
                app.handle_mouse_motion(delta.0, delta.1);
            }
            Event::AboutToWait => {
                app.window.request_redraw();
            }
            _ => {}
        }
    });
    if let Err(e) = result {
        error!("event loop exited with error: {e}");
    }
}
