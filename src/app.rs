//! Application state: wgpu surface, egui, camera and swap worker
//!
//! Each tick pulls the newest camera frame, hands it to the swap worker when
//! one is not already running and shows the newest result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::Level;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::{CameraCapture, CameraFrame};
use crate::settings::AppSettings;
use crate::sources::{SourceLibrary, SUPPORTED_EXTENSIONS};
use crate::swap::{
    FaceSwapper, LoadStatus, ResultTracker, SwapError, SwapJob, SwapWorker,
};
use crate::telemetry::{FrameRateCounter, LatencyTracker, UiLogRecord};
use crate::ui::{self, ControlPanel, ControlPanelState, DialogQueue, ImagePreview, StatusBar, UiAction};

pub const WINDOW_TITLE: &str = "InSwapper Live Face Swap";

const SOURCE_PREVIEW_SIZE: egui::Vec2 = egui::vec2(600.0, 450.0);
const CAMERA_PREVIEW_SIZE: egui::Vec2 = egui::vec2(800.0, 600.0);

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("Surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("Failed to start swap worker: {0}")]
    Worker(#[from] SwapError),
}

/// Main application state
pub struct App {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    settings: AppSettings,

    // Face swap
    worker: SwapWorker,
    load_status: LoadStatus,
    loading_started: Instant,
    shown_results: ResultTracker,

    // Camera capture
    camera: Option<CameraCapture>,
    last_camera_frame: Option<u64>,

    sources: SourceLibrary,

    // UI
    control_panel: ControlPanel,
    source_preview: ImagePreview,
    camera_preview: ImagePreview,
    status_bar: StatusBar,
    dialogs: DialogQueue,
    log_receiver: Option<Receiver<UiLogRecord>>,

    // Frame timing
    fps: FrameRateCounter,
    swap_latency: LatencyTracker,
}

impl App {
    /// Create the graphics context and start loading the face models
    pub async fn new(
        window: Arc<Window>,
        settings: AppSettings,
        log_receiver: Option<Receiver<UiLogRecord>>,
    ) -> Result<Self, AppError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(AppError::NoAdapter)?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Face Swap Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(AppError::NoSurfaceFormat)?;

        let present_mode = if surface_caps
            .present_modes
            .contains(&wgpu::PresentMode::Mailbox)
        {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };
        log::debug!("Surface format {:?}, present mode {:?}", surface_format, present_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let egui_ctx = egui::Context::default();
        ui::apply_theme(&egui_ctx);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let swapper = Arc::new(FaceSwapper::with_onnx_models(settings.model_config()));
        let worker = SwapWorker::new(swapper)?;

        let mut status_bar = StatusBar::new();
        status_bar.set_info("Loading face models...");

        let mut control_panel = ControlPanel::new();
        control_panel.set_cameras(CameraCapture::list_cameras());

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            egui_ctx,
            egui_state,
            egui_renderer,
            settings,
            worker,
            load_status: LoadStatus::Loading,
            loading_started: Instant::now(),
            shown_results: ResultTracker::new(),
            camera: None,
            last_camera_frame: None,
            sources: SourceLibrary::new(),
            control_panel,
            source_preview: ImagePreview::new(
                "source_preview",
                SOURCE_PREVIEW_SIZE,
                "Waiting for a source image...",
            ),
            camera_preview: ImagePreview::new(
                "camera_preview",
                CAMERA_PREVIEW_SIZE,
                "Waiting for face detection...",
            ),
            status_bar,
            dialogs: DialogQueue::new(),
            log_receiver,
            fps: FrameRateCounter::default(),
            swap_latency: LatencyTracker::default(),
        })
    }

    /// Handle a window event, returning true if egui consumed it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Interval between camera polls and redraws
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.settings.frame_interval_ms)
    }

    pub fn is_camera_running(&self) -> bool {
        self.camera.is_some()
    }

    /// Start the camera if stopped, stop it if running
    pub fn toggle_camera(&mut self) {
        if self.camera.is_some() {
            self.stop_camera();
        } else {
            self.start_camera();
        }
    }

    fn models_settled(&self) -> bool {
        !matches!(self.load_status, LoadStatus::Loading)
    }

    pub fn start_camera(&mut self) {
        if self.camera.is_some() {
            return;
        }
        if !self.models_settled() {
            log::debug!("Camera start ignored while models load");
            return;
        }

        let index = self.settings.camera_index;
        match CameraCapture::new(index, self.settings.resolution) {
            Ok(capture) => {
                let (width, height) = capture.resolution();
                log::info!("Camera started: {} ({}x{})", capture.name(), width, height);
                self.camera = Some(capture);
                self.last_camera_frame = None;
                self.reset_swap_results();
                self.fps.reset();
                self.swap_latency.clear();
            }
            Err(e) => {
                log::warn!("{}", e);
                self.dialogs.error("Camera", e.to_string());
            }
        }
    }

    /// Stop the camera and release the device
    pub fn stop_camera(&mut self) {
        let Some(mut camera) = self.camera.take() else {
            return;
        };
        camera.stop();
        self.reset_swap_results();
        self.camera_preview.clear();
        self.camera_preview.set_status("Camera stopped");
        self.fps.reset();
        log::info!("Camera stopped");
    }

    /// Release everything and persist settings
    pub fn shutdown(&mut self) {
        self.stop_camera();
        self.worker.stop();
        if let Err(e) = self.settings.save() {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    /// Advance one timer tick: logs, model state, camera and swap
    pub fn update(&mut self) {
        let now = Instant::now();
        self.drain_log_records(now);
        self.poll_load_status();
        self.update_camera();
    }

    fn drain_log_records(&mut self, now: Instant) {
        let Some(receiver) = &self.log_receiver else {
            return;
        };
        for record in receiver.try_iter() {
            match record.level {
                Level::Error => self.dialogs.warning("Warning", record.message),
                level => self.status_bar.push(level, record.message, now),
            }
        }
    }

    fn poll_load_status(&mut self) {
        if self.models_settled() {
            return;
        }
        self.load_status = self.worker.swapper().load_status();
        match &self.load_status {
            LoadStatus::Loading => {}
            LoadStatus::Ready => {
                self.status_bar.set_info("Models loaded");
                self.egui_ctx.request_repaint();
            }
            LoadStatus::Failed(_) => {
                self.status_bar.set_info("Models unavailable, preview runs without face swap");
            }
        }
    }

    fn swap_active(&self) -> bool {
        self.settings.swap_enabled && self.sources.selected().is_some()
    }

    fn update_camera(&mut self) {
        let Some(camera) = &self.camera else { return };
        let Some(frame) = camera.latest_frame() else { return };

        if self.last_camera_frame.is_some_and(|last| frame.frame_number <= last) {
            return;
        }
        self.last_camera_frame = Some(frame.frame_number);
        self.fps.tick(frame.timestamp);

        if self.swap_active() {
            self.submit_swap(frame);
            self.show_latest_swap();
        } else {
            self.camera_preview.set_image(&self.egui_ctx, &frame.image);
            let status = if self.settings.swap_enabled {
                "Select a source image"
            } else {
                "Face swap disabled"
            };
            self.camera_preview.set_status(status);
        }
    }

    fn submit_swap(&mut self, frame: CameraFrame) {
        let Some(source) = self.sources.selected() else {
            return;
        };
        // Raw frames until the first swap result arrives
        if !self.shown_results.has_result() {
            self.camera_preview.set_image(&self.egui_ctx, &frame.image);
        }
        if self.worker.is_busy() {
            return;
        }

        self.worker.try_submit(SwapJob {
            source,
            frame: frame.image,
            frame_number: frame.frame_number,
            generation: self.shown_results.generation(),
        });
    }

    /// Drop the current swap result and ignore any still in flight
    fn reset_swap_results(&mut self) {
        self.shown_results.reset();
        self.worker.clear_result();
    }

    fn show_latest_swap(&mut self) {
        let Some(result) = self.worker.latest_result() else {
            return;
        };
        if !self.shown_results.accept(&result) {
            return;
        }

        self.camera_preview.set_image(&self.egui_ctx, &result.image);
        self.camera_preview.set_status(result.status.description());
        if result.status.is_swapped() {
            self.swap_latency.record(result.elapsed);
        }
    }

    fn add_source_images(&mut self) {
        let Some(paths) = rfd::FileDialog::new()
            .set_title("Select source images")
            .add_filter("Images", &SUPPORTED_EXTENSIONS)
            .pick_files()
        else {
            return;
        };
        self.load_source_images(paths);
    }

    fn load_source_images(&mut self, paths: Vec<PathBuf>) {
        for path in paths {
            if let Err(e) = self.sources.load_file(&path) {
                log::warn!("{}", e);
                self.dialogs.warning("Warning", e.to_string());
            }
        }
        self.refresh_source_preview();
    }

    fn refresh_source_preview(&mut self) {
        match (self.sources.selected(), self.sources.selected_name()) {
            (Some(image), Some(name)) => {
                let status = format!("{} ({}x{})", name, image.width(), image.height());
                self.source_preview.set_image(&self.egui_ctx, &image);
                self.source_preview.set_status(status);
            }
            _ => {
                self.source_preview.clear();
                self.source_preview.set_status("Waiting for a source image...");
            }
        }
    }

    fn apply_action(&mut self, action: UiAction) {
        match action {
            UiAction::AddSourceImages => self.add_source_images(),
            UiAction::SelectSource(name) => {
                if self.sources.select(&name) {
                    log::info!("Source image: {}", name);
                    self.refresh_source_preview();
                }
            }
            UiAction::SetResolution(resolution) => self.settings.resolution = resolution,
            UiAction::SetCameraIndex(index) => self.settings.camera_index = index,
            UiAction::RefreshCameras => {
                self.control_panel.set_cameras(CameraCapture::list_cameras());
            }
            UiAction::ToggleCamera => self.toggle_camera(),
            UiAction::SetSwapEnabled(enabled) => {
                self.settings.swap_enabled = enabled;
                self.reset_swap_results();
                log::info!("Face swap {}", if enabled { "enabled" } else { "disabled" });
            }
        }
    }

    fn build_ui(&mut self, ctx: &egui::Context) -> Vec<UiAction> {
        let now = Instant::now();

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.status_bar.show(ui, now);
        });

        let source_names: Vec<&str> = self.sources.names().collect();
        let state = ControlPanelState {
            source_names,
            selected_source: self.sources.selected_name(),
            resolution: self.settings.resolution,
            camera_index: self.settings.camera_index,
            camera_running: self.camera.is_some(),
            camera_available: self.models_settled(),
            swap_enabled: self.settings.swap_enabled,
            fps: self.fps.fps(),
            swap_latency_ms: self.swap_latency.last_ms(),
            swap_average_ms: self.swap_latency.average_ms(),
        };

        let control_panel = &mut self.control_panel;
        let actions = egui::SidePanel::left("controls")
            .resizable(false)
            .exact_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .show(ui, |ui| control_panel.render(ui, &state))
                    .inner
            })
            .inner;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| ui.heading(WINDOW_TITLE));
            ui.add_space(8.0);

            let available = ui.available_size();
            let column_width = (available.x - 24.0).max(0.0);
            let source_space = egui::vec2(column_width * 0.4, available.y - 40.0);
            let camera_space = egui::vec2(column_width * 0.6, available.y - 40.0);

            ui.horizontal_top(|ui| {
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new("Source image").strong());
                    self.source_preview.show(ui, source_space, "No source image");
                });
                ui.add_space(16.0);
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new("Live preview").strong());
                    self.camera_preview.show(ui, camera_space, "Camera stopped");
                });
            });
        });

        if matches!(self.load_status, LoadStatus::Loading) {
            let elapsed = self.loading_started.elapsed().as_secs_f32();
            egui::Window::new("Loading")
                .title_bar(false)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading face models...");
                    });
                    ui.add(
                        egui::ProgressBar::new((elapsed % 2.0) / 2.0)
                            .desired_width(240.0)
                            .animate(true),
                    );
                });
        }

        self.dialogs.show(ctx);

        actions
    }

    /// Render a frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        let raw_input = self.egui_state.take_egui_input(&self.window);
        let ctx = self.egui_ctx.clone();
        let mut actions = Vec::new();
        let full_output = ctx.run(raw_input, |ctx| {
            actions = self.build_ui(ctx);
        });

        for action in actions {
            self.apply_action(action);
        }

        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.08,
                            g: 0.08,
                            b: 0.08,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer
                .render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
