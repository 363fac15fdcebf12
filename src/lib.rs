mod app_ui;
pub mod bounds;
pub mod camera;
pub mod catalog;
pub mod config;
pub mod defaults;
mod egui;
pub mod error;
pub mod frame_loop;
pub mod light;
pub mod model;
pub mod resources;
pub mod scene;
mod state;
mod texture;
pub mod viewer;

use crate::{
    error::ViewerError, frame_loop::FrameLoop, model::ModelData, state::State,
    viewer::LoadRequest,
};
use std::sync::Arc;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

/// Messages delivered to the event loop from background work.
pub enum ViewerEvent {
    /// Render state finished its async setup (web only; desktop blocks).
    #[cfg(target_arch = "wasm32")]
    Ready(State),
    ModelLoaded {
        request: LoadRequest,
        result: Result<ModelData, ViewerError>,
    },
}

pub struct App {
    proxy: EventLoopProxy<ViewerEvent>,
    state: Option<State>,
    frame_loop: FrameLoop,
    started: bool,
}

impl App {
    pub fn new(event_loop: &EventLoop<ViewerEvent>) -> Self {
        Self {
            proxy: event_loop.create_proxy(),
            state: None,
            frame_loop: FrameLoop::new(),
            started: false,
        }
    }

    fn install(&mut self, mut state: State) {
        #[cfg(target_arch = "wasm32")]
        {
            let size = state.window().inner_size();
            state.resize(size.width, size.height);
        }

        self.frame_loop.start(state.window().as_ref());
        dispatch_loads(&self.proxy, &mut state);
        self.state = Some(state);
    }
}

fn dispatch_loads(proxy: &EventLoopProxy<ViewerEvent>, state: &mut State) {
    for request in state.take_load_requests() {
        spawn_load(proxy.clone(), request);
    }
}

// Fetching and parsing stay off the event loop; the GPU upload happens
// when the result comes back as a `ModelLoaded` event.
#[cfg(not(target_arch = "wasm32"))]
fn spawn_load(proxy: EventLoopProxy<ViewerEvent>, request: LoadRequest) {
    std::thread::spawn(move || {
        let result = pollster::block_on(model::load_model_data(&request.path));
        if proxy
            .send_event(ViewerEvent::ModelLoaded { request, result })
            .is_err()
        {
            log::debug!("Event loop closed before a model load finished");
        }
    });
}

#[cfg(target_arch = "wasm32")]
fn spawn_load(proxy: EventLoopProxy<ViewerEvent>, request: LoadRequest) {
    wasm_bindgen_futures::spawn_local(async move {
        let result = model::load_model_data(&request.path).await;
        if proxy
            .send_event(ViewerEvent::ModelLoaded { request, result })
            .is_err()
        {
            log::debug!("Event loop closed before a model load finished");
        }
    });
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("glance");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Unable to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Desktop can simply block on the async setup.
        #[cfg(not(target_arch = "wasm32"))]
        {
            match pollster::block_on(State::new(window)) {
                Ok(state) => self.install(state),
                Err(e) => {
                    log::error!("Unable to initialize the viewer: {:#}", e);
                    event_loop.exit();
                }
            }
        }

        // The browser cannot block, so setup runs in the background and
        // arrives later as a `Ready` event.
        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match State::new(window).await {
                    Ok(state) => {
                        if proxy.send_event(ViewerEvent::Ready(state)).is_err() {
                            log::error!("Event loop closed during setup");
                        }
                    }
                    Err(e) => log::error!("Unable to initialize the viewer: {:#}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            ViewerEvent::Ready(state) => self.install(state),
            ViewerEvent::ModelLoaded { request, result } => match &mut self.state {
                Some(state) => {
                    let outcome = state.finish_load(request, result);
                    log::debug!("Load finished: {:?}", outcome);
                }
                None => log::warn!("Model {} arrived before the renderer", request.path),
            },
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        if state.input(event_loop, &event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.frame_loop.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let window = state.window().clone();
                let rendered = self.frame_loop.run_frame(window.as_ref(), || {
                    state.update();
                    state.render()
                });

                match rendered {
                    Some(Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                        let size = window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Some(Err(e)) => log::error!("Unable to render {}", e),
                    _ => {}
                }

                dispatch_loads(&self.proxy, state);
            }
            _ => {}
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn,glance=info"))
        .init();
    #[cfg(target_arch = "wasm32")]
    console_log::init_with_level(log::Level::Info)?;

    let event_loop = EventLoop::<ViewerEvent>::with_user_event().build()?;
    let mut app = App::new(&event_loop);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    console_error_panic_hook::set_once();
    run().unwrap_throw();

    Ok(())
}
