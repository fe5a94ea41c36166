// Re-export all public modules so they can be used from main.rs
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod persistence;

// MVC Architecture
pub mod model;
pub mod view;
pub mod controller;

#[cfg(target_arch = "wasm32")]
use std::{cell::{Cell, RefCell}, rc::Rc};

#[cfg(target_arch = "wasm32")]
use glam::Vec3;
#[cfg(target_arch = "wasm32")]
use tracing::{debug, error, info, warn};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{closure::Closure, prelude::wasm_bindgen, JsCast, JsValue};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::{spawn_local, JsFuture};
#[cfg(target_arch = "wasm32")]
use web_sys::{Document, Event, KeyboardEvent, MouseEvent, TouchEvent, TouchList, Window};

#[cfg(target_arch = "wasm32")]
use audio::web::WebAudioBackend;
#[cfg(target_arch = "wasm32")]
use config::Config;
#[cfg(target_arch = "wasm32")]
use controller::frame_loop::DEFAULT_LEVEL;
#[cfg(target_arch = "wasm32")]
use controller::input::{wasm::{is_text_target, keyboard_event_to_input}, InputEvent, KeyAction, VerticalButton};
#[cfg(target_arch = "wasm32")]
use controller::look::{LockError, LockFailure, LockRequest, LookMode, ScreenRect, TouchPoint};
#[cfg(target_arch = "wasm32")]
use controller::FrameLoopContext;
#[cfg(target_arch = "wasm32")]
use events::AppEvent;
#[cfg(target_arch = "wasm32")]
use model::{CharacterDef, ModelState};
#[cfg(target_arch = "wasm32")]
use persistence::LocalStorageStore;
#[cfg(target_arch = "wasm32")]
use view::SceneBridge;

#[cfg(target_arch = "wasm32")]
type App = FrameLoopContext<SceneBridge, WebAudioBackend>;
#[cfg(target_arch = "wasm32")]
type SharedApp = Rc<RefCell<App>>;

/// Elements whose touches never drive camera look.
#[cfg(target_arch = "wasm32")]
const RESERVED_IDS: [&str; 3] = ["movement-joystick", "up-btn", "down-btn"];

/// Clicks inside these never re-engage look after chat.
#[cfg(target_arch = "wasm32")]
const UI_SELECTOR: &str = ".chat-interface, #portal-hint, #character-hint, #mobile-controls, #camera-info, #audio-control";

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    logging::init();
    info!("splatwalk loaded");
}

/// Wire the core to the page. `bridge` is the JS renderer; `touch` selects
/// touch look instead of pointer lock.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn launch(bridge: SceneBridge, touch: bool) -> Result<AppHandle, JsValue> {
    let window = web_sys::window().ok_or_else(|| js_error("no global `window`"))?;
    let document = window.document().ok_or_else(|| js_error("no document on window"))?;

    let mode = if touch { LookMode::Touch } else { LookMode::Desktop };
    let store = Box::new(LocalStorageStore::new(&window));
    let mut ctx = FrameLoopContext::new(Config::default(), bridge.clone(), store, mode);
    subscribe_ui(&mut ctx, &bridge, &document);
    let app: SharedApp = Rc::new(RefCell::new(ctx));

    load_splat(&app, &bridge);
    spawn_characters(&app, &bridge);
    load_environment(&app, &bridge);
    load_sounds(&app, &window);

    setup_input_listeners(&document, &window, &app)?;
    if touch {
        setup_touch_listeners(&document, &app)?;
    }
    setup_vertical_buttons(&document, &app)?;

    let f = RcCellCallback::new(window.clone(), {
        let app = app.clone();
        let window = window.clone();
        move || {
            let now = window.performance().map(|p| p.now()).unwrap_or(0.0) / 1000.0;
            let Ok(mut app) = app.try_borrow_mut() else {
                warn!("frame skipped, app state busy");
                return;
            };
            let report = app.update(now);
            if report.capped {
                debug!(steps = report.steps, "physics behind wall clock");
            }
            let knob = app.joystick.knob_offset();
            app.scene.set_joystick_knob(knob.x, knob.y);
        }
    });
    f.start();

    info!(?mode, "viewer launched");
    Ok(AppHandle { app, document, window })
}

/// Handle returned to the page for its buttons and chat form.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct AppHandle {
    app: SharedApp,
    document: Document,
    window: Window,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl AppHandle {
    /// Start button / canvas click.
    pub fn lock(&self) {
        request_lock(&self.app, &self.document, &self.window);
    }

    pub fn unlock(&self) {
        if let Ok(mut app) = self.app.try_borrow_mut() {
            if app.release_lock() {
                self.document.exit_pointer_lock();
            }
        }
    }

    /// Tap on the interaction hint.
    pub fn interact(&self) {
        if let Ok(mut app) = self.app.try_borrow_mut() {
            app.interact();
        }
    }

    #[wasm_bindgen(js_name = sendChat)]
    pub fn send_chat(&self, message: &str) {
        let Ok(mut app) = self.app.try_borrow_mut() else {
            return;
        };
        if let Some(reply) = app.send_chat(message) {
            app.scene.append_chat_line(&reply);
        }
    }

    #[wasm_bindgen(js_name = closeChat)]
    pub fn close_chat(&self) {
        if let Ok(mut app) = self.app.try_borrow_mut() {
            app.close_chat();
        }
    }

    #[wasm_bindgen(js_name = toggleUi)]
    pub fn toggle_ui(&self) {
        if let Ok(mut app) = self.app.try_borrow_mut() {
            app.toggle_ui();
        }
    }

    /// Returns the new mute state.
    #[wasm_bindgen(js_name = toggleMute)]
    pub fn toggle_mute(&self) -> bool {
        match self.app.try_borrow_mut() {
            Ok(mut app) => app.toggle_mute(),
            Err(_) => false,
        }
    }

    #[wasm_bindgen(js_name = isMuted)]
    pub fn is_muted(&self) -> bool {
        self.app.try_borrow().map(|app| app.audio.is_muted()).unwrap_or(false)
    }

    /// Held key codes, for the key highlight widget.
    #[wasm_bindgen(js_name = pressedKeys)]
    pub fn pressed_keys(&self) -> js_sys::Array {
        match self.app.try_borrow() {
            Ok(app) => app.input.pressed_keys().iter().map(|k| JsValue::from_str(k)).collect(),
            Err(_) => js_sys::Array::new(),
        }
    }

    /// `[x, y, z, yaw, pitch]` of the camera.
    #[wasm_bindgen(js_name = cameraInfo)]
    pub fn camera_info(&self) -> Vec<f32> {
        match self.app.try_borrow() {
            Ok(app) => {
                let c = &app.camera;
                vec![c.eye.x, c.eye.y, c.eye.z, c.yaw, c.pitch]
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Core notifications mirrored onto the page.
#[cfg(target_arch = "wasm32")]
fn subscribe_ui(ctx: &mut App, bridge: &SceneBridge, document: &Document) {
    let bridge = bridge.clone();
    let document = document.clone();
    ctx.events.subscribe(move |event| match event {
        AppEvent::LookEngaged => bridge.set_crosshair(true),
        AppEvent::LookDisengaged => {
            bridge.set_crosshair(false);
            if document.pointer_lock_element().is_some() {
                document.exit_pointer_lock();
            }
        }
        AppEvent::InteractionHint(text) => bridge.set_interaction_hint(text.clone()),
        AppEvent::CharacterAttention { character_id } => bridge.play_character_wave(character_id),
        AppEvent::ChatOpened { name, transcript, .. } => {
            let lines: js_sys::Array = transcript.iter().map(|l| JsValue::from_str(l)).collect();
            bridge.show_chat(name, &lines);
        }
        AppEvent::ChatClosed => bridge.hide_chat(),
        AppEvent::UiVisibilityChanged { visible } => bridge.set_ui_visible(*visible),
        AppEvent::MuteChanged { muted } => debug!(muted, "mute changed"),
        AppEvent::AudioInitialized | AppEvent::StartChat { .. } => {}
    });
}

#[cfg(target_arch = "wasm32")]
fn spawn_characters(app: &SharedApp, bridge: &SceneBridge) {
    let defs: Vec<CharacterDef> = {
        let mut ctx = app.borrow_mut();
        let ids = ctx.spawn_level(DEFAULT_LEVEL);
        ids.iter().filter_map(|id| ctx.roster.get(id).map(|c| c.def.clone())).collect()
    };

    for def in defs {
        let p = def.position;
        let promise = bridge.load_character(&def.id, &def.model_url, p.x, p.y, p.z, def.rotation.y);
        let app = app.clone();
        spawn_local(async move {
            let state = match JsFuture::from(promise).await {
                Ok(loaded) if loaded.as_bool() == Some(true) => ModelState::Loaded,
                Ok(_) => ModelState::Failed,
                Err(e) => {
                    warn!("model for {} failed to load: {e:?}", def.id);
                    ModelState::Failed
                }
            };
            app.borrow_mut().roster.set_model_state(&def.id, state);
        });
    }
}

#[cfg(target_arch = "wasm32")]
fn load_splat(app: &SharedApp, bridge: &SceneBridge) {
    let splat = app.borrow().config.splat.clone();
    let (p, r) = (splat.position, splat.rotation_euler);
    let promise = bridge.load_splat(&splat.url, splat.scale, p.x, p.y, p.z, r.x, r.y, r.z);
    spawn_local(async move {
        match JsFuture::from(promise).await {
            Ok(_) => info!(url = %splat.url, "splat scene ready"),
            Err(e) => warn!("splat scene failed to load: {e:?}"),
        }
    });
}

/// Optional static collision mesh for the splat environment. Vertices come
/// back untransformed and are placed in splat space by the core.
#[cfg(target_arch = "wasm32")]
fn load_environment(app: &SharedApp, bridge: &SceneBridge) {
    let (url, matrix, visible) = {
        let ctx = app.borrow();
        if ctx.physics.is_none() {
            return;
        }
        let Some(url) = ctx.config.env.glb_url.clone() else {
            info!("no environment collision mesh configured");
            return;
        };
        let matrix = ctx.config.env.collision_transform(&ctx.config.splat).to_cols_array();
        (url, matrix, ctx.config.env.visible_in_debug)
    };

    let promise = bridge.load_collision_mesh(&url, &matrix, visible);
    let app = app.clone();
    spawn_local(async move {
        let (vertices, indices) = match JsFuture::from(promise).await.and_then(|mesh| read_mesh(&mesh)) {
            Ok(mesh) => mesh,
            Err(e) => {
                warn!("environment collision unavailable: {e:?}");
                return;
            }
        };
        match app.borrow_mut().add_environment_mesh(&vertices, &indices) {
            Ok(true) => info!(vertices = vertices.len(), "environment collision ready"),
            Ok(false) => debug!("physics disabled, environment collision skipped"),
            Err(e) => warn!("environment collision rejected: {e}"),
        }
    });
}

#[cfg(target_arch = "wasm32")]
fn read_mesh(mesh: &JsValue) -> Result<(Vec<Vec3>, Vec<u32>), JsValue> {
    let vertices = js_sys::Float32Array::new(&js_sys::Reflect::get(mesh, &JsValue::from_str("vertices"))?).to_vec();
    let indices = js_sys::Uint32Array::new(&js_sys::Reflect::get(mesh, &JsValue::from_str("indices"))?).to_vec();
    let vertices = vertices.chunks_exact(3).map(|v| Vec3::new(v[0], v[1], v[2])).collect();
    Ok((vertices, indices))
}

#[cfg(target_arch = "wasm32")]
fn load_sounds(app: &SharedApp, window: &Window) {
    let (name, url) = {
        let ctx = app.borrow();
        if !ctx.config.enable_audio {
            return;
        }
        (ctx.config.ambience.name.clone(), ctx.config.ambience.url.clone())
    };
    let app = app.clone();
    let window = window.clone();
    spawn_local(async move {
        match fetch_bytes(&window, &url).await {
            Ok(bytes) => app.borrow_mut().audio.store_raw(&name, bytes),
            Err(e) => {
                warn!("could not fetch sound {name}: {e:?}");
                return;
            }
        }
        // the context may already exist if the user interacted during the fetch
        let ctx = app.borrow().audio.backend().map(|b| b.context());
        if let Some(ctx) = ctx {
            decode_pending(&app, &ctx).await;
        }
    });
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(window: &Window, url: &str) -> Result<Vec<u8>, JsValue> {
    let response: web_sys::Response = JsFuture::from(window.fetch_with_str(url)).await?.dyn_into()?;
    if !response.ok() {
        return Err(js_error(format!("HTTP {} for {url}", response.status())));
    }
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

/// First user gesture: create and resume the audio context, decode what was
/// fetched so far, start the ambience.
#[cfg(target_arch = "wasm32")]
fn unlock_audio(app: &SharedApp) {
    {
        let Ok(ctx) = app.try_borrow() else {
            return;
        };
        if !ctx.config.enable_audio || ctx.audio.is_initialized() {
            return;
        }
    }
    let backend = match WebAudioBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            warn!("audio unavailable: {e}");
            return;
        }
    };
    let audio_ctx = backend.context();
    if !app.borrow_mut().init_audio(backend) {
        return;
    }
    let app = app.clone();
    spawn_local(async move {
        if let Err(e) = audio::web::resume(&audio_ctx).await {
            warn!("audio context did not resume: {e}");
        }
        decode_pending(&app, &audio_ctx).await;
    });
}

#[cfg(target_arch = "wasm32")]
async fn decode_pending(app: &SharedApp, audio_ctx: &web_sys::AudioContext) {
    let pending = app.borrow().audio.pending_decodes();
    for (name, bytes) in pending {
        match audio::web::decode(audio_ctx, &bytes).await {
            Ok(buffer) => app.borrow_mut().audio.set_decoded(&name, buffer),
            Err(e) => warn!("could not decode sound {name}: {e}"),
        }
    }
    app.borrow_mut().start_ambience();
}

#[cfg(target_arch = "wasm32")]
fn request_lock(app: &SharedApp, document: &Document, window: &Window) {
    let request = match app.try_borrow_mut() {
        Ok(mut ctx) => ctx.request_lock(),
        Err(_) => return,
    };
    if request == LockRequest::RequestPointerLock {
        request_pointer_lock(app.clone(), document.clone(), window.clone());
    }
}

/// `requestPointerLock` returns a promise in current browsers and nothing in
/// older ones; both shapes are handled.
#[cfg(target_arch = "wasm32")]
fn request_pointer_lock(app: SharedApp, document: Document, window: Window) {
    let Some(target) = document.body() else {
        return;
    };
    let result = js_sys::Reflect::get(&target, &JsValue::from_str("requestPointerLock"))
        .and_then(|f| f.dyn_into::<js_sys::Function>().map_err(JsValue::from))
        .and_then(|f| f.call0(&target));
    match result {
        Ok(value) => {
            if let Ok(promise) = value.dyn_into::<js_sys::Promise>() {
                spawn_local(async move {
                    if let Err(err) = JsFuture::from(promise).await {
                        lock_failed(app, document, window, &err);
                    }
                });
            }
        }
        Err(err) => lock_failed(app, document, window, &err),
    }
}

#[cfg(target_arch = "wasm32")]
fn lock_failed(app: SharedApp, document: Document, window: Window, err: &JsValue) {
    let name = js_sys::Reflect::get(err, &JsValue::from_str("name"))
        .ok()
        .and_then(|n| n.as_string());
    let error = if name.as_deref() == Some("SecurityError") {
        LockError::Security
    } else {
        LockError::Other
    };
    let failure = app.borrow_mut().lock_rejected(error);
    if let LockFailure::RetryAfter(ms) = failure {
        let retry_window = window.clone();
        let retry = Closure::once_into_js(move || {
            let request = app.borrow_mut().retry_lock();
            if request == LockRequest::RequestPointerLock {
                request_pointer_lock(app, document, retry_window);
            }
        });
        if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(retry.unchecked_ref(), ms as i32) {
            warn!("could not schedule pointer lock retry: {e:?}");
        }
    }
}

/// Setup keyboard, focus, pointer lock and audio gesture listeners
#[cfg(target_arch = "wasm32")]
fn setup_input_listeners(document: &Document, window: &Window, app: &SharedApp) -> Result<(), JsValue> {
    // Keyboard down
    {
        let app = app.clone();
        let keydown = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            let Ok(mut ctx) = app.try_borrow_mut() else {
                return;
            };
            let action = ctx.handle_input(&keyboard_event_to_input(&e, true));
            if matches!(action, KeyAction::Trigger | KeyAction::ToggleUi) {
                e.prevent_default();
            }
        }) as Box<dyn FnMut(KeyboardEvent)>);
        window.add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref())?;
        keydown.forget();
    }

    // Keyboard up
    {
        let app = app.clone();
        let keyup = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            if let Ok(mut ctx) = app.try_borrow_mut() {
                ctx.handle_input(&keyboard_event_to_input(&e, false));
            }
        }) as Box<dyn FnMut(KeyboardEvent)>);
        window.add_event_listener_with_callback("keyup", keyup.as_ref().unchecked_ref())?;
        keyup.forget();
    }

    // Text fields own the keyboard while focused
    for (kind, focused) in [("focusin", true), ("focusout", false)] {
        let app = app.clone();
        let focus = Closure::wrap(Box::new(move |e: Event| {
            let is_text = e
                .target()
                .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
                .is_some_and(|el| is_text_target(&el));
            if is_text {
                if let Ok(mut ctx) = app.try_borrow_mut() {
                    ctx.handle_input(&InputEvent::TextFocus(focused));
                }
            }
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback(kind, focus.as_ref().unchecked_ref())?;
        focus.forget();
    }

    // Focus loss - clear all keys
    {
        let app = app.clone();
        let blur = Closure::wrap(Box::new(move |_e: Event| {
            if let Ok(mut ctx) = app.try_borrow_mut() {
                ctx.handle_input(&InputEvent::FocusLost);
            }
        }) as Box<dyn FnMut(Event)>);
        window.add_event_listener_with_callback("blur", blur.as_ref().unchecked_ref())?;
        blur.forget();
    }

    // Visibility change - clear all keys
    {
        let app = app.clone();
        let doc = document.clone();
        let visibility = Closure::wrap(Box::new(move |_e: Event| {
            if let Ok(mut ctx) = app.try_borrow_mut() {
                ctx.handle_input(&InputEvent::VisibilityChanged { visible: !doc.hidden() });
            }
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("visibilitychange", visibility.as_ref().unchecked_ref())?;
        visibility.forget();
    }

    // Pointer lock change
    {
        let app = app.clone();
        let doc = document.clone();
        let plc = Closure::wrap(Box::new(move |_e: Event| {
            if let Ok(mut ctx) = app.try_borrow_mut() {
                ctx.pointer_lock_changed(doc.pointer_lock_element().is_some());
            }
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("pointerlockchange", plc.as_ref().unchecked_ref())?;
        plc.forget();
    }

    // Pointer lock error
    {
        let app = app.clone();
        let ple = Closure::wrap(Box::new(move |_e: Event| {
            if let Ok(mut ctx) = app.try_borrow_mut() {
                ctx.look.on_pointer_lock_error();
            }
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("pointerlockerror", ple.as_ref().unchecked_ref())?;
        ple.forget();
    }

    // Mouse move
    {
        let app = app.clone();
        let mm = Closure::wrap(Box::new(move |e: MouseEvent| {
            if let Ok(mut ctx) = app.try_borrow_mut() {
                ctx.mouse_moved(e.movement_x() as f32, e.movement_y() as f32);
            }
        }) as Box<dyn FnMut(MouseEvent)>);
        document.add_event_listener_with_callback("mousemove", mm.as_ref().unchecked_ref())?;
        mm.forget();
    }

    // Pointer lock released for chat comes back on the next click outside the UI
    {
        let app = app.clone();
        let doc = document.clone();
        let win = window.clone();
        let click = Closure::wrap(Box::new(move |e: MouseEvent| {
            let on_ui = e
                .target()
                .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
                .is_some_and(|el| matches!(el.closest(UI_SELECTOR), Ok(Some(_))));
            if on_ui {
                return;
            }
            let request = app.try_borrow_mut().ok().and_then(|mut ctx| ctx.take_reengage());
            if request == Some(LockRequest::RequestPointerLock) {
                request_pointer_lock(app.clone(), doc.clone(), win.clone());
            }
        }) as Box<dyn FnMut(MouseEvent)>);
        document.add_event_listener_with_callback("click", click.as_ref().unchecked_ref())?;
        click.forget();
    }

    // Audio needs a user gesture before the context may start
    for kind in ["click", "keydown", "touchstart"] {
        let app = app.clone();
        let gesture = Closure::wrap(Box::new(move |_e: Event| {
            unlock_audio(&app);
        }) as Box<dyn FnMut(Event)>);
        window.add_event_listener_with_callback(kind, gesture.as_ref().unchecked_ref())?;
        gesture.forget();
    }

    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn reserved_regions(document: &Document) -> Vec<ScreenRect> {
    RESERVED_IDS
        .iter()
        .filter_map(|id| document.get_element_by_id(id))
        .map(|el| {
            let r = el.get_bounding_client_rect();
            ScreenRect::new(r.left() as f32, r.top() as f32, r.right() as f32, r.bottom() as f32)
        })
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn touch_points(list: &TouchList) -> Vec<TouchPoint> {
    (0..list.length())
        .filter_map(|i| list.get(i))
        .map(|t| TouchPoint::new(t.identifier(), t.client_x() as f32, t.client_y() as f32))
        .collect()
}

/// Camera-look touches on the document, movement on the joystick element.
#[cfg(target_arch = "wasm32")]
fn setup_touch_listeners(document: &Document, app: &SharedApp) -> Result<(), JsValue> {
    let joystick_touch: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));

    // Look
    {
        let app = app.clone();
        let doc = document.clone();
        let start = Closure::wrap(Box::new(move |e: TouchEvent| {
            let touches = touch_points(&e.changed_touches());
            if let Ok(mut ctx) = app.try_borrow_mut() {
                if ctx.touch_started(&touches, &reserved_regions(&doc)) {
                    e.prevent_default();
                }
            }
        }) as Box<dyn FnMut(TouchEvent)>);
        document.add_event_listener_with_callback("touchstart", start.as_ref().unchecked_ref())?;
        start.forget();
    }
    {
        let app = app.clone();
        let doc = document.clone();
        let joystick_touch = joystick_touch.clone();
        let moved = Closure::wrap(Box::new(move |e: TouchEvent| {
            let touches = touch_points(&e.touches());
            let Ok(mut ctx) = app.try_borrow_mut() else {
                return;
            };
            if let Some(t) = joystick_touch.get().and_then(|id| touches.iter().find(|t| t.id == id)) {
                ctx.joystick.drag(t.x, t.y);
            }
            if ctx.touch_moved(&touches, &reserved_regions(&doc)) {
                e.prevent_default();
            }
        }) as Box<dyn FnMut(TouchEvent)>);
        document.add_event_listener_with_callback("touchmove", moved.as_ref().unchecked_ref())?;
        moved.forget();
    }
    for kind in ["touchend", "touchcancel"] {
        let app = app.clone();
        let joystick_touch = joystick_touch.clone();
        let end = Closure::wrap(Box::new(move |e: TouchEvent| {
            let ended: Vec<i32> = touch_points(&e.changed_touches()).iter().map(|t| t.id).collect();
            let Ok(mut ctx) = app.try_borrow_mut() else {
                return;
            };
            if joystick_touch.get().is_some_and(|id| ended.contains(&id)) {
                joystick_touch.set(None);
                ctx.joystick.release();
            }
            ctx.touch_ended(&ended);
        }) as Box<dyn FnMut(TouchEvent)>);
        document.add_event_listener_with_callback(kind, end.as_ref().unchecked_ref())?;
        end.forget();
    }

    // Joystick
    if let Some(stick) = document.get_element_by_id("movement-joystick") {
        let app = app.clone();
        let el = stick.clone();
        let press = Closure::wrap(Box::new(move |e: TouchEvent| {
            e.prevent_default();
            let Some(t) = touch_points(&e.changed_touches()).into_iter().next() else {
                return;
            };
            let r = el.get_bounding_client_rect();
            let (cx, cy) = ((r.left() + r.width() / 2.0) as f32, (r.top() + r.height() / 2.0) as f32);
            if let Ok(mut ctx) = app.try_borrow_mut() {
                joystick_touch.set(Some(t.id));
                ctx.joystick.press(cx, cy, t.x, t.y);
            }
        }) as Box<dyn FnMut(TouchEvent)>);
        stick.add_event_listener_with_callback("touchstart", press.as_ref().unchecked_ref())?;
        press.forget();
    }

    Ok(())
}

/// Up/down buttons, held with mouse or touch.
#[cfg(target_arch = "wasm32")]
fn setup_vertical_buttons(document: &Document, app: &SharedApp) -> Result<(), JsValue> {
    let buttons = [("up-btn", VerticalButton::Up), ("down-btn", VerticalButton::Down)];
    let kinds = [
        ("mousedown", true),
        ("touchstart", true),
        ("mouseup", false),
        ("mouseleave", false),
        ("touchend", false),
        ("touchcancel", false),
    ];
    for (id, button) in buttons {
        let Some(el) = document.get_element_by_id(id) else {
            debug!("no {id} element, vertical button disabled");
            continue;
        };
        for (kind, pressed) in kinds {
            let app = app.clone();
            let handler = Closure::wrap(Box::new(move |e: Event| {
                e.prevent_default();
                if let Ok(mut ctx) = app.try_borrow_mut() {
                    ctx.handle_input(&InputEvent::VerticalButton { button, pressed });
                }
            }) as Box<dyn FnMut(Event)>);
            el.add_event_listener_with_callback(kind, handler.as_ref().unchecked_ref())?;
            handler.forget();
        }
    }
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn js_error<E: Into<String>>(msg: E) -> JsValue {
    JsValue::from_str(&msg.into())
}

/// Self-rescheduling requestAnimationFrame loop.
#[cfg(target_arch = "wasm32")]
struct RcCellCallback {
    inner: Rc<RefCell<Box<dyn FnMut()>>>,
    window: Window,
}

#[cfg(target_arch = "wasm32")]
impl RcCellCallback {
    fn new(window: Window, f: impl FnMut() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Box::new(f))),
            window,
        }
    }

    fn start(self) {
        let inner = self.inner.clone();
        let window = self.window.clone();

        let callback = Rc::new(RefCell::new(None::<Closure<dyn FnMut()>>));
        let callback_clone = callback.clone();

        *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
            inner.borrow_mut().as_mut()();

            // Recursively schedule next frame
            if let Some(cb) = callback_clone.borrow().as_ref() {
                if let Err(e) = window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                    error!("requestAnimationFrame failed, loop stopped: {e:?}");
                }
            }
        }) as Box<dyn FnMut()>));

        if let Some(cb) = callback.borrow().as_ref() {
            if let Err(e) = self.window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                error!("requestAnimationFrame failed, loop not started: {e:?}");
            }
        }

        // Leak the closure to keep it alive
        std::mem::forget(callback);
    }
}
