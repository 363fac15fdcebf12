use crate::app_ui::{self, UiAction, UiStatus};
use crate::camera::{Camera, Projection};
use crate::config::ViewerConfig;
use crate::egui::EguiRenderer;
use crate::error::ViewerError;
use crate::light::LightRig;
use crate::model::{self, DrawModel, GpuMesh, ModelData, ModelVertex, Vertex};
use crate::resources;
use crate::texture::DepthTexture;
use crate::viewer::{LoadOutcome, LoadRequest, Viewer};
use cgmath::prelude::*;
use cgmath::Matrix4;
use egui_wgpu::ScreenDescriptor;
use std::{iter, sync::Arc};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::Window;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniform {
    model: [[f32; 4]; 4],
}

fn uniform_layout(device: &wgpu::Device, label: &str, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn uniform_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

/// Picks an sRGB format when there is one, otherwise the first format the
/// surface offers. Fails if the adapter cannot present to the surface at all.
fn surface_settings(
    caps: &wgpu::SurfaceCapabilities,
) -> anyhow::Result<(wgpu::TextureFormat, wgpu::PresentMode, wgpu::CompositeAlphaMode)> {
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .or_else(|| caps.formats.first().copied())
        .ok_or_else(|| anyhow::anyhow!("surface reports no supported texture formats"))?;
    let present_mode = caps
        .present_modes
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("surface reports no present modes"))?;
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("surface reports no alpha modes"))?;
    Ok((format, present_mode, alpha_mode))
}

fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // glTF materials may be double sided
            cull_mode: None,
            // Setting this to anything other than Fill requires Features::NON_FILL_POLYGON_MODE
            polygon_mode: wgpu::PolygonMode::Fill,
            // Requires Features::DEPTH_CLIP_CONTROL
            unclipped_depth: false,
            // Requires Features::CONSERVATIVE_RASTERIZATION
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

pub struct State {
    // Put egui_renderer first so it gets dropped before GPU resources
    egui_renderer: EguiRenderer,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    is_surface_configured: bool,
    render_pipeline: wgpu::RenderPipeline,
    camera_uniform: CameraUniform,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    light_bind_group: wgpu::BindGroup,
    transform_buffer: wgpu::Buffer,
    transform_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    depth_texture: DepthTexture,
    window: Arc<Window>,
    clear_color: wgpu::Color,
    viewer: Viewer<GpuMesh>,
    load_requests: Vec<LoadRequest>,
    loading_path: Option<String>,
    mouse_pressed: bool,
    last_cursor: Option<PhysicalPosition<f64>>,
    last_frame: web_time::Instant,
    delta_time: web_time::Duration,
}

impl State {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<State> {
        let viewer_config = ViewerConfig::load().await?;
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let backend = adapter.get_info().backend;
        log::info!("Render backend: {}", backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let (surface_format, present_mode, alpha_mode) = surface_settings(&surface_caps)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let depth_texture = DepthTexture::new(&device, &config, "Depth Texture");

        let mut viewer = Viewer::new(&viewer_config, size.width, size.height)?;
        let initial_request = viewer.reload();

        let mut camera_uniform = CameraUniform::new();
        camera_uniform.update_view_proj(&viewer.camera, &viewer.projection);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group_layout = uniform_layout(
            &device,
            "camera_bind_group_layout",
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        );
        let camera_bind_group = uniform_bind_group(
            &device,
            "camera_bind_group",
            &camera_bind_group_layout,
            &camera_buffer,
        );

        // Lights never change after startup
        let lights = LightRig::studio();
        log::info!("Added {} lights", lights.num_lights());
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light_buffer"),
            contents: bytemuck::cast_slice(&[lights.sync_to_gpu()]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let light_bind_group_layout =
            uniform_layout(&device, "light_bind_group_layout", wgpu::ShaderStages::FRAGMENT);
        let light_bind_group = uniform_bind_group(
            &device,
            "light_bind_group",
            &light_bind_group_layout,
            &light_buffer,
        );

        let transform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("model_transform_buffer"),
            contents: bytemuck::cast_slice(&[ModelUniform {
                model: Matrix4::identity().into(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let transform_bind_group_layout = uniform_layout(
            &device,
            "model_transform_bind_group_layout",
            wgpu::ShaderStages::VERTEX,
        );
        let transform_bind_group = uniform_bind_group(
            &device,
            "model_transform_bind_group",
            &transform_bind_group_layout,
            &transform_buffer,
        );

        let material_layout = model::material_bind_group_layout(&device);

        let shader_source = resources::load_string(crate::defaults::SHADER_PATH).await?;
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some("Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        };

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[
                    &camera_bind_group_layout,
                    &light_bind_group_layout,
                    &transform_bind_group_layout,
                    &material_layout,
                ],
                push_constant_ranges: &[],
            });

        let render_pipeline = create_render_pipeline(
            &device,
            &render_pipeline_layout,
            config.format,
            Some(DepthTexture::DEPTH_FORMAT),
            &[ModelVertex::desc()],
            shader,
        );

        let egui_renderer = EguiRenderer::new(&device, config.format, &window);

        let mut state = Self {
            egui_renderer,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            render_pipeline,
            camera_uniform,
            camera_buffer,
            camera_bind_group,
            light_bind_group,
            transform_buffer,
            transform_bind_group,
            material_layout,
            depth_texture,
            window,
            clear_color: wgpu::Color::BLACK,
            viewer,
            load_requests: Vec::new(),
            loading_path: None,
            mouse_pressed: false,
            last_cursor: None,
            last_frame: web_time::Instant::now(),
            delta_time: web_time::Duration::ZERO,
        };
        state.set_clear_color(viewer_config.background_color);
        state.queue_load(initial_request);

        Ok(state)
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.is_surface_configured = true;
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = DepthTexture::new(&self.device, &self.config, "Depth Texture");
            self.viewer.resize(width, height);
        }
    }

    /// Returns true when the event was consumed by the UI or the camera.
    pub fn input(&mut self, event_loop: &ActiveEventLoop, event: &WindowEvent) -> bool {
        if self.egui_renderer.handle_input(&self.window, event) {
            return true;
        }

        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.viewer.controller.handle_mouse_scroll(delta);
                true
            }
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.mouse_pressed =
                    *state == ElementState::Pressed && !self.egui_renderer.wants_pointer_input();
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (true, Some(last)) = (self.mouse_pressed, self.last_cursor) {
                    self.viewer
                        .controller
                        .handle_mouse(position.x - last.x, position.y - last.y);
                }
                self.last_cursor = Some(*position);
                self.mouse_pressed
            }
            WindowEvent::CursorLeft { .. } => {
                self.last_cursor = None;
                false
            }
            _ => false,
        }
    }

    pub fn update(&mut self) {
        let now = web_time::Instant::now();
        self.delta_time = now - self.last_frame;
        self.last_frame = now;

        self.viewer.tick();

        self.camera_uniform
            .update_view_proj(&self.viewer.camera, &self.viewer.projection);
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[self.camera_uniform]),
        );

        if let Some(model) = self.viewer.model() {
            let uniform = ModelUniform {
                model: model.transform().into(),
            };
            self.queue
                .write_buffer(&self.transform_buffer, 0, bytemuck::cast_slice(&[uniform]));
        }
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = wgpu::Color {
            r: color[0].clamp(0.0, 1.0) as f64,
            g: color[1].clamp(0.0, 1.0) as f64,
            b: color[2].clamp(0.0, 1.0) as f64,
            a: color[3].clamp(0.0, 1.0) as f64,
        };
    }

    fn queue_load(&mut self, request: LoadRequest) {
        self.loading_path = Some(request.path.clone());
        self.load_requests.push(request);
    }

    /// Loads the host should start, oldest first.
    pub fn take_load_requests(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.load_requests)
    }

    /// Uploads a finished load and hands it to the viewer. Results for
    /// superseded requests are dropped before touching the GPU.
    pub fn finish_load(
        &mut self,
        request: LoadRequest,
        result: Result<ModelData, ViewerError>,
    ) -> LoadOutcome {
        if !self.viewer.is_current(request.id) {
            log::warn!(
                "Ignoring superseded load of {} (request {})",
                request.path,
                request.id
            );
            return LoadOutcome::Stale;
        }

        let result =
            result.map(|data| model::upload(&self.device, &self.material_layout, &request.path, data));
        let outcome = self.viewer.complete_load(&request, result);
        self.loading_path = None;
        outcome
    }

    fn handle_action(&mut self, action: UiAction) {
        let request = match action {
            UiAction::None => return,
            UiAction::Previous => self.viewer.previous(),
            UiAction::Next => self.viewer.next(),
        };
        self.queue_load(request);
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.surface.get_current_texture()?;
        if output.suboptimal {
            return Err(wgpu::SurfaceError::Outdated);
        }

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(model) = self.viewer.model() {
                render_pass.set_pipeline(&self.render_pipeline);
                render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
                render_pass.set_bind_group(1, &self.light_bind_group, &[]);
                render_pass.set_bind_group(2, &self.transform_bind_group, &[]);
                render_pass.draw_model(model);
            }
        }

        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        let catalog = self.viewer.catalog();
        let status = UiStatus {
            title: self.viewer.title(),
            state: self.viewer.state(),
            loading_path: self.loading_path.as_deref(),
            position: catalog.index(),
            count: catalog.len(),
            delta_time_ms: self.delta_time.as_secs_f32() * 1000.0,
        };
        let action = self.egui_renderer.draw(
            &self.device,
            &self.queue,
            &mut encoder,
            &self.window,
            &view,
            screen_descriptor,
            |ctx| app_ui::app_ui(ctx, &status),
        );

        self.queue.submit(iter::once(encoder.finish()));
        output.present();

        self.handle_action(action);

        Ok(())
    }
}
