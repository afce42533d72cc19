//! wgpu backend
//!
//! Each GPU renderer draws a full-screen triangle into its own offscreen
//! texture; the host composites that texture. Data textures hold raw `f32`
//! bits: `R32Float` where the adapter can sample it, otherwise `Rgba8Uint`
//! with the four bytes reassembled in the shader.

pub mod plot;
pub mod waterfall;

use crate::error::{DisplayError, Result};
use crate::render::Size;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Format of the offscreen render targets
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const FLOAT_PRELUDE: &str = r#"
fn load_value(t: texture_2d<f32>, coord: vec2<i32>) -> f32 {
    return textureLoad(t, coord, 0).r;
}
"#;

const PACKED_PRELUDE: &str = r#"
fn load_value(t: texture_2d<u32>, coord: vec2<i32>) -> f32 {
    let b = textureLoad(t, coord, 0);
    return bitcast<f32>(b.r | (b.g << 8u) | (b.b << 16u) | (b.a << 24u));
}
"#;

/// How `f32` data is laid out in textures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelEncoding {
    Float,
    /// Little-endian bytes of the `f32` in the four channels of an
    /// `Rgba8Uint` texel
    Packed,
}

impl TexelEncoding {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            TexelEncoding::Float => wgpu::TextureFormat::R32Float,
            TexelEncoding::Packed => wgpu::TextureFormat::Rgba8Uint,
        }
    }

    fn sample_type(self) -> wgpu::TextureSampleType {
        match self {
            TexelEncoding::Float => wgpu::TextureSampleType::Float { filterable: false },
            TexelEncoding::Packed => wgpu::TextureSampleType::Uint,
        }
    }

    fn wgsl_type(self) -> &'static str {
        match self {
            TexelEncoding::Float => "texture_2d<f32>",
            TexelEncoding::Packed => "texture_2d<u32>",
        }
    }

    /// Texel bytes for `values`. Both encodings store the same four bytes per
    /// value.
    pub fn encode(values: &[f32]) -> &[u8] {
        bytemuck::cast_slice(values)
    }

    /// Complete shader source: decode prelude plus `template` with its
    /// `DATA_TEXTURE` placeholders resolved
    pub fn shader_source(self, template: &str) -> String {
        let prelude = match self {
            TexelEncoding::Float => FLOAT_PRELUDE,
            TexelEncoding::Packed => PACKED_PRELUDE,
        };
        format!("{}\n{}", prelude, template.replace("DATA_TEXTURE", self.wgsl_type()))
    }
}

/// CPU mirror of the packed decode in the shader
pub fn unpack_texel([r, g, b, a]: [u8; 4]) -> f32 {
    f32::from_bits(r as u32 | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24)
}

/// A device and queue plus what the renderers need to know about them
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoding: TexelEncoding,
    max_texture_dimension: u32,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Wrap a host-provided device. `float_textures` says whether `R32Float`
    /// can be sampled.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, float_textures: bool) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            tracing::warn!(?reason, %message, "GPU device lost");
            flag.store(true, Ordering::SeqCst);
        });

        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        Self {
            device,
            queue,
            encoding: if float_textures {
                TexelEncoding::Float
            } else {
                TexelEncoding::Packed
            },
            max_texture_dimension,
            lost,
        }
    }

    /// Acquire a device without a surface
    pub fn headless() -> Result<Self> {
        futures::executor::block_on(Self::request_headless())
    }

    async fn request_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DisplayError::GpuUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        let float_textures = adapter
            .get_texture_format_features(wgpu::TextureFormat::R32Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::TEXTURE_BINDING);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("spectrum-view device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| DisplayError::GpuUnavailable(e.to_string()))?;

        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            float_textures,
            "GPU context acquired"
        );
        Ok(Self::new(device, queue, float_textures))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn encoding(&self) -> TexelEncoding {
        self.encoding
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Flag the context as unusable, for hosts that learn about loss from
    /// their own surface errors
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        let max = self.max_texture_dimension;
        if width > max || height > max {
            return Err(DisplayError::GpuUnavailable(format!(
                "{}x{} exceeds the {} texel texture limit",
                width, height, max
            )));
        }
        Ok(())
    }
}

/// Source of fresh GPU contexts, consulted at startup and after device loss
pub trait GpuProvider {
    fn acquire(&self) -> Option<Rc<GpuContext>>;
}

/// Provider that requests a headless device from the default instance
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessGpu;

impl GpuProvider for HeadlessGpu {
    fn acquire(&self) -> Option<Rc<GpuContext>> {
        match GpuContext::headless() {
            Ok(context) => Some(Rc::new(context)),
            Err(e) => {
                tracing::warn!(error = %e, "No GPU context");
                None
            }
        }
    }
}

/// Render target a renderer draws into, reallocated on resize
pub(crate) struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Size,
}

impl OffscreenTarget {
    pub(crate) fn ensure<'a>(
        slot: &'a mut Option<OffscreenTarget>,
        context: &GpuContext,
        label: &str,
        size: Size,
    ) -> Result<&'a OffscreenTarget> {
        context.check_dimensions(size.width, size.height)?;
        if slot.as_ref().is_none_or(|target| target.size != size) {
            let texture = context.device().create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            *slot = Some(OffscreenTarget { texture, view, size });
        }
        slot.as_ref()
            .ok_or_else(|| DisplayError::GpuUnavailable("render target missing".to_string()))
    }

    pub(crate) fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub(crate) fn create_data_texture(
    context: &GpuContext,
    label: &str,
    width: u32,
    height: u32,
) -> Result<wgpu::Texture> {
    context.check_dimensions(width, height)?;
    let format = context.encoding().format();
    Ok(context.device().create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[format],
    }))
}

/// Write a `width` x `height` block of 4-byte texels at (`x`, `y`)
pub(crate) fn write_texels(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    data: &[u8],
) {
    if width == 0 || height == 0 {
        return;
    }
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn data_texture_entry(binding: u32, encoding: TexelEncoding) -> wgpu::BindGroupLayoutEntry {
    texture_entry(binding, encoding.sample_type())
}

pub(crate) fn create_uniform_buffer(context: &GpuContext, label: &str, size: usize) -> wgpu::Buffer {
    context.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Full-screen-triangle pipeline writing [`TARGET_FORMAT`]
pub(crate) fn create_pipeline(
    context: &GpuContext,
    label: &str,
    source: String,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let device = context.device();
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Run one full-screen pass into `target`
pub(crate) fn run_pass(
    context: &GpuContext,
    label: &str,
    target: &OffscreenTarget,
    pipeline: Option<(&wgpu::RenderPipeline, &wgpu::BindGroup)>,
    clear: [u8; 4],
) {
    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });

    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color(clear)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some((pipeline, bind_group)) = pipeline {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    context.queue().submit(Some(encoder.finish()));
}

pub(crate) fn rgba_f32([r, g, b, a]: [u8; 4]) -> [f32; 4] {
    [r, g, b, a].map(|c| c as f32 / 255.0)
}

fn clear_color(rgba: [u8; 4]) -> wgpu::Color {
    let [r, g, b, a] = rgba_f32(rgba).map(f64::from);
    wgpu::Color { r, g, b, a }
}
