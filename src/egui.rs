use egui::Context;
use egui_wgpu::Renderer;
use egui_wgpu::ScreenDescriptor;
use egui_wgpu::wgpu::{
    CommandEncoder, Device, LoadOp, Operations, Queue, RenderPassColorAttachment,
    RenderPassDescriptor, StoreOp, TextureFormat, TextureView,
};
use egui_winit::State;
use winit::event::WindowEvent;
use winit::window::Window;

/// egui drawn in its own pass on top of the 3D scene.
pub struct EguiRenderer {
    context: Context,
    state: State,
    renderer: Renderer,
}

impl EguiRenderer {
    pub fn new(device: &Device, output_color_format: TextureFormat, window: &Window) -> EguiRenderer {
        let context = Context::default();
        let viewport_id = context.viewport_id();
        let state = State::new(context.clone(), viewport_id, &window, None, None, None);

        // No depth attachment: the overlay always draws over the model
        let renderer = Renderer::new(device, output_color_format, None, 1, false);

        EguiRenderer {
            context,
            state,
            renderer,
        }
    }

    /// Feeds a window event to egui. Returns true when egui used it, in
    /// which case the camera should ignore it.
    pub fn handle_input(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// True while the pointer is over a UI element.
    pub fn wants_pointer_input(&self) -> bool {
        self.context.wants_pointer_input()
    }

    pub fn draw<T: Default>(
        &mut self,
        device: &Device,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        window: &Window,
        window_surface_view: &TextureView,
        screen_descriptor: ScreenDescriptor,
        mut run_ui: impl FnMut(&Context) -> T,
    ) -> T {
        let mut ui_output = T::default();
        let raw_input = self.state.take_egui_input(window);
        let full_output = self.context.run(raw_input, |ctx| {
            ui_output = run_ui(ctx);
        });

        self.state
            .handle_platform_output(window, full_output.platform_output);

        let tris = self
            .context
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.renderer
            .update_buffers(device, queue, encoder, &tris, &screen_descriptor);

        let mut rpass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: window_surface_view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Load,
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                label: Some("egui overlay pass"),
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.renderer.render(&mut rpass, &tris, &screen_descriptor);
        drop(rpass);

        for x in &full_output.textures_delta.free {
            self.renderer.free_texture(x)
        }

        ui_output
    }
}
