//! Live Face Swap - Main Entry Point

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;

use live_face_swap::app::{AppError, WINDOW_TITLE};
use live_face_swap::settings::AppSettings;
use live_face_swap::telemetry::{init_logging, LogConfig, UiLogRecord};
use live_face_swap::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const DEFAULT_WIDTH: u32 = 1600;
const DEFAULT_HEIGHT: u32 = 900;

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized,
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
    /// Startup failed or the app has shut down
    Finished,
}

struct FaceSwapApp {
    state: AppState,
    settings: Option<AppSettings>,
    log_receiver: Option<Receiver<UiLogRecord>>,
    next_redraw_at: Instant,
    startup_error: Option<AppError>,
}

impl FaceSwapApp {
    fn new(
        settings: AppSettings,
        log_receiver: Option<Receiver<UiLogRecord>>,
    ) -> Self {
        Self {
            state: AppState::Uninitialized,
            settings: Some(settings),
            log_receiver,
            next_redraw_at: Instant::now(),
            startup_error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        log::debug!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let settings = self.settings.take().unwrap_or_default();
        let app = pollster::block_on(App::new(
            window.clone(),
            settings,
            self.log_receiver.take(),
        ))?;

        log::debug!("Press ESC to exit, F11 for fullscreen, Space to start or stop the camera");
        self.state = AppState::Running { window, app };
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let AppState::Running { app, .. } = &mut self.state {
            app.shutdown();
        }
        self.state = AppState::Finished;
        event_loop.exit();
    }
}

impl ApplicationHandler for FaceSwapApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.state, AppState::Uninitialized) {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("Startup failed: {}", e);
            self.startup_error = Some(e);
            self.state = AppState::Finished;
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running { window, app } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::debug!("Close requested");
                self.shutdown(event_loop);
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !egui_consumed => match key_code {
                KeyCode::Escape => self.shutdown(event_loop),
                KeyCode::F11 => {
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                    } else {
                        window.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                    }
                }
                KeyCode::Space => app.toggle_camera(),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
            }

            WindowEvent::RedrawRequested => {
                app.update();

                match app.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        log::debug!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory");
                        self.shutdown(event_loop);
                    }
                    Err(e) => {
                        log::debug!("Surface error: {:?}", e);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, app } = &self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        let now = Instant::now();
        if now >= self.next_redraw_at {
            window.request_redraw();
            self.next_redraw_at = now + app.frame_interval();
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_redraw_at));
    }
}

fn show_startup_error(error: &AppError) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(WINDOW_TITLE)
        .set_description(error.to_string())
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

fn main() -> ExitCode {
    let log_receiver = match init_logging(&LogConfig::default()) {
        Ok(receiver) => Some(receiver),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    log::info!("Live Face Swap v{}", env!("CARGO_PKG_VERSION"));

    let settings = AppSettings::load();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = FaceSwapApp::new(settings, log_receiver);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(error) = &app.startup_error {
        show_startup_error(error);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
