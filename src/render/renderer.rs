use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::material::{Material, DEPTH_FORMAT};
use super::sequencer::{record_eye, EyeRecorder};
use super::shared::{CameraUniform, ObjectUniform};
use super::texture::{GpuTexture, TextureImage};
use super::timer::{GpuTimer, TimerError, TimingReport};
use crate::mesh::MeshData;
use crate::scene::{SceneDescription, SceneInstance};
use crate::stereo::{Eye, EyeView, ViewportRect};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

/// wgpu renderer drawing the scene once per eye, each eye in its own pass.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    material: Material,
    cameras: [EyeCamera; 2],
    meshes: Vec<MeshBuffers>,
    scene_instances: Vec<SceneInstance>,
    instances: Vec<InstanceBinding>,
    texture_sets: HashMap<(usize, usize), wgpu::BindGroup>,
    timer: Option<GpuTimer>,
}

impl Renderer {
    /// Initializes the device, uploads every scene asset and builds the pipeline.
    pub async fn new(window: Arc<Window>, scene: &SceneDescription) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let timestamps = adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            warn!("adapter does not support timestamp queries; benchmarking is disabled");
            wgpu::Features::empty()
        };

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("stereo-device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no supported formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        // Vsync would hide GPU time behind the display interval.
        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, wgpu::PresentMode::Immediate | wgpu::PresentMode::Mailbox))
            .unwrap_or(wgpu::PresentMode::Fifo);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        debug!("surface configured: {surface_format:?} {present_mode:?}");

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let material = Material::new(&device, surface_format).await?;

        let cameras = Eye::ALL.map(|eye| EyeCamera::new(&device, &material, eye));

        let meshes = scene
            .meshes
            .iter()
            .map(|asset| {
                let data = asset
                    .load()
                    .with_context(|| format!("failed to load mesh {}", asset.name))?;
                Ok(MeshBuffers::from_mesh(&device, &data, &asset.name))
            })
            .collect::<Result<Vec<_>>>()?;

        let textures = scene
            .textures
            .iter()
            .map(|asset| {
                let image = TextureImage::load(&asset.source)
                    .with_context(|| format!("failed to load texture {}", asset.name))?;
                GpuTexture::upload(&device, &queue, &image, asset.kind, &asset.name)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut texture_sets = HashMap::new();
        for instance in &scene.instances {
            let key = (instance.color_texture, instance.normal_texture);
            texture_sets.entry(key).or_insert_with(|| {
                material.texture_bind_group(
                    &device,
                    &textures[key.0].view,
                    &textures[key.1].view,
                    &format!("{}-textures", instance.name),
                )
            });
        }

        let instances = scene
            .instances
            .iter()
            .map(|instance| InstanceBinding::new(&device, &material, instance))
            .collect();

        let timer = timestamps.then(|| GpuTimer::new(&device, &queue));

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            material,
            cameras,
            meshes,
            scene_instances: scene.instances.clone(),
            instances,
            texture_sets,
            timer,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Current swap chain size; eye layouts must be computed against this.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn timestamps_supported(&self) -> bool {
        self.timer.is_some()
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Draws the first eye, then the second, and presents.
    ///
    /// With `benchmark` set and no benchmark pending, the two passes are
    /// bracketed with timestamps whose values arrive later via [`poll_timer`].
    ///
    /// [`poll_timer`]: Renderer::poll_timer
    pub fn render(&mut self, views: &[EyeView; 2], benchmark: bool) -> Result<(), wgpu::SurfaceError> {
        for view in views {
            let uniform = CameraUniform::new(view.view_proj);
            self.queue
                .write_buffer(&self.cameras[view.eye.index()].buffer, 0, bytes_of(&uniform));
        }

        let output = self.surface.get_current_texture()?;
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stereo-encoder"),
            });

        let timed = self
            .timer
            .as_mut()
            .is_some_and(|timer| timer.begin_frame(benchmark));

        let [first, second] = views;
        self.encode_eye(&mut encoder, &target, first, timed);
        let mut timing = self.timer_step(|timer| timer.first_eye_recorded(), timed);

        self.encode_eye(&mut encoder, &target, second, timed);
        if timing.is_ok() {
            timing = self.timer_step(|timer| timer.second_eye_recorded(&mut encoder), timed);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        if timing.is_ok() {
            timing = self.timer_step(|timer| timer.after_submit(), timed);
        }
        if let Err(err) = timing {
            warn!("benchmark dropped: {err}");
            if let Some(timer) = self.timer.as_mut() {
                timer.abandon();
            }
        }

        output.present();
        Ok(())
    }

    /// Returns the benchmark result once the device has handed it back.
    pub fn poll_timer(&mut self) -> Option<Result<TimingReport, TimerError>> {
        self.timer.as_mut()?.poll(&self.device)
    }

    fn timer_step(
        &mut self,
        step: impl FnOnce(&mut GpuTimer) -> Result<(), TimerError>,
        timed: bool,
    ) -> Result<(), TimerError> {
        match self.timer.as_mut() {
            Some(timer) if timed => step(timer),
            _ => Ok(()),
        }
    }

    fn encode_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        view: &EyeView,
        timed: bool,
    ) {
        // The first pass clears the whole target; the second keeps its pixels.
        let first = view.eye == Eye::Left;
        let color_load = if first {
            wgpu::LoadOp::Clear(CLEAR_COLOR)
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if first {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };
        let timestamp_writes = self
            .timer
            .as_ref()
            .and_then(|timer| timer.pass_writes(timed, view.eye));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(match view.eye {
                Eye::Left => "first-eye-pass",
                Eye::Right => "second-eye-pass",
            }),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.material.pipeline);

        let mut recorder = PassRecorder {
            pass: &mut pass,
            renderer: self,
        };
        record_eye(&mut recorder, view, &self.scene_instances);
    }
}

struct PassRecorder<'a, 'p> {
    pass: &'a mut wgpu::RenderPass<'p>,
    renderer: &'a Renderer,
}

impl EyeRecorder for PassRecorder<'_, '_> {
    fn set_viewport(&mut self, rect: ViewportRect) {
        let size = self.renderer.size;
        let x = rect.x.min(size.width);
        let y = rect.y.min(size.height);
        let width = rect.width.min(size.width - x);
        let height = rect.height.min(size.height - y);
        self.pass
            .set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
        self.pass.set_scissor_rect(x, y, width, height);
    }

    fn bind_camera(&mut self, eye: Eye) {
        self.pass
            .set_bind_group(0, &self.renderer.cameras[eye.index()].bind_group, &[]);
    }

    fn bind_material(&mut self, instance_index: usize, instance: &SceneInstance) {
        let renderer = self.renderer;
        self.pass
            .set_bind_group(1, &renderer.instances[instance_index].bind_group, &[]);
        let key = (instance.color_texture, instance.normal_texture);
        if let Some(textures) = renderer.texture_sets.get(&key) {
            self.pass.set_bind_group(2, textures, &[]);
        }
    }

    fn draw_mesh(&mut self, mesh: usize) {
        let Some(mesh) = self.renderer.meshes.get(mesh) else {
            return;
        };
        self.pass.set_vertex_buffer(0, mesh.vertex.slice(..));
        self.pass
            .set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed(0..mesh.index_count, 0, 0..1);
    }
}

struct EyeCamera {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl EyeCamera {
    fn new(device: &wgpu::Device, material: &Material, eye: Eye) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}-camera-uniform", eye.label())),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}-camera-bind-group", eye.label())),
            layout: &material.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }
}

/// Static world transform of one scene instance.
struct InstanceBinding {
    _buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl InstanceBinding {
    fn new(device: &wgpu::Device, material: &Material, instance: &SceneInstance) -> Self {
        let uniform = ObjectUniform::new(instance.transform.matrix());
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-object-uniform", instance.name)),
            contents: bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}-object-bind-group", instance.name)),
            layout: &material.object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            _buffer: buffer,
            bind_group,
        }
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
