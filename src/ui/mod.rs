use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::window::{Window, WindowId};
use softbuffer::Surface;

use crate::catalog::Catalog;
use crate::controller::{Intent, ViewerController, ViewerOptions};
use crate::decoder::{ImageDecoder, ViewportSize};
use crate::session::SessionStore;
use crate::ui::state::{ViewerState, key_action};

pub mod render;
pub mod state;

/// Wakes the event loop from decode workers.
#[derive(Debug)]
pub enum UserEvent {
    PrefetchReady,
}

/// Everything needed to build the controller once a window exists.
pub struct Launch {
    pub catalog: Arc<Catalog>,
    pub output_dir: PathBuf,
    pub start_index: usize,
    pub store: SessionStore,
    pub window_size: (u32, u32),
}

// ---------------------------------------------------------------------------
// Application handler (winit 0.30 style)
// ---------------------------------------------------------------------------

pub struct App {
    pub launch: Option<Launch>,
    pub proxy: EventLoopProxy<UserEvent>,
    pub state: Option<ViewerState>,
    pub window: Option<Arc<Window>>,
    pub context: Option<softbuffer::Context<Arc<Window>>>,
    pub surface: Option<Surface<Arc<Window>, Arc<Window>>>,
}

impl App {
    pub fn new(launch: Launch, proxy: EventLoopProxy<UserEvent>) -> Self {
        Self {
            launch: Some(launch),
            proxy,
            state: None,
            window: None,
            context: None,
            surface: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop, launch: Launch) -> Result<(), String> {
        let (w, h) = launch.window_size;
        let attrs = Window::default_attributes()
            .with_title("Image Picker")
            .with_inner_size(LogicalSize::new(w, h));
        let window = Arc::new(event_loop.create_window(attrs).map_err(|e| e.to_string())?);
        let context = softbuffer::Context::new(Arc::clone(&window)).map_err(|e| e.to_string())?;
        let mut surface = Surface::new(&context, Arc::clone(&window)).map_err(|e| e.to_string())?;

        let size = window.inner_size();
        if let (Some(nw), Some(nh)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) {
            surface.resize(nw, nh).map_err(|e| e.to_string())?;
        }
        let proxy = self.proxy.clone();
        let controller = ViewerController::with_waker(
            launch.catalog,
            Arc::new(ImageDecoder),
            ViewerOptions {
                output_dir: launch.output_dir,
                start_index: launch.start_index,
                viewport: ViewportSize::new(size.width, size.height),
                store: Some(launch.store),
            },
            Some(Arc::new(move || {
                let _ = proxy.send_event(UserEvent::PrefetchReady);
            })),
        )
        .map_err(|e| e.to_string())?;

        window.request_redraw();
        self.state = Some(ViewerState::new(controller));
        self.window = Some(window);
        self.context = Some(context);
        self.surface = Some(surface);
        Ok(())
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(launch) = self.launch.take() else {
            return;
        };
        if let Err(e) = self.start(event_loop, launch) {
            log::error!("Could not start viewer: {}", e);
            event_loop.exit();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::PrefetchReady => {
                if let (Some(state), Some(window)) = (self.state.as_mut(), self.window.as_ref()) {
                    if state.on_prefetch_ready() {
                        window.request_redraw();
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let (Some(state), Some(window)) = (self.state.as_mut(), self.window.as_ref()) else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                state.apply(Intent::Quit);
                event_loop.exit();
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                let w = width.max(1);
                let h = height.max(1);
                if let (Some(surface), Some(nw), Some(nh)) =
                    (self.surface.as_mut(), NonZeroU32::new(w), NonZeroU32::new(h))
                {
                    if let Err(e) = surface.resize(nw, nh) {
                        log::error!("Failed to resize surface: {}", e);
                    }
                }
                state.apply(Intent::Resize(ViewportSize::new(w, h)));
                window.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let Some(action) = key_action(&event.logical_key, event.repeat) else {
                    return;
                };
                state.handle(action, window);
                if state.controller.is_closed() {
                    event_loop.exit();
                    return;
                }
                window.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                if let Some(ref mut surface) = self.surface {
                    let size = window.inner_size();
                    let fb_w = size.width.max(1);
                    let fb_h = size.height.max(1);
                    match surface.buffer_mut() {
                        Ok(mut buffer) => {
                            state.render(&mut buffer, fb_w, fb_h);
                            if let Err(e) = buffer.present() {
                                log::error!("Failed to present frame: {}", e);
                            }
                        }
                        Err(e) => log::error!("Failed to get frame buffer: {}", e),
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
    }
}
