//! GPU instantaneous plot: the averaged magnitudes live in a one-row data
//! texture and a full-screen fragment pass shades the curve per pixel.

use super::{
    GpuContext, OffscreenTarget, TexelEncoding, create_data_texture, create_pipeline,
    create_uniform_buffer, data_texture_entry, rgba_f32, run_pass, uniform_entry, write_texels,
};
use crate::coords::ViewSnapshot;
use crate::error::{DisplayError, Result};
use crate::render::{DrawStatus, LevelRange, PlotStyle, Size};
use std::rc::Rc;

pub(crate) const SHADER: &str = include_str!("shaders/plot.wgsl");

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PlotUniforms {
    /// width, height, bins, stroke width
    pub dims: [f32; 4],
    /// bin position at the left target edge, bins per pixel, min dB, max dB
    pub mapping: [f32; 4],
    pub background: [f32; 4],
    pub fill: [f32; 4],
    pub stroke: [f32; 4],
}

impl PlotUniforms {
    pub fn new(style: &PlotStyle, bins: usize, view: &ViewSnapshot, levels: LevelRange, size: Size) -> Self {
        let (bin_at_left, bins_per_pixel) = if bins == 0 || view.bandwidth <= 0.0 || view.pixels_per_hertz() <= 0.0 {
            (0.0, 0.0)
        } else {
            let bin_width = view.bandwidth / bins as f64;
            let data_left = view.center_frequency - view.bandwidth / 2.0;
            (
                (view.left_visible_frequency() - data_left) / bin_width - 0.5,
                1.0 / (view.pixels_per_hertz() * bin_width),
            )
        };

        Self {
            dims: [size.width as f32, size.height as f32, bins as f32, style.stroke_width],
            mapping: [bin_at_left as f32, bins_per_pixel as f32, levels.min_db, levels.max_db],
            background: rgba_f32(style.background),
            fill: rgba_f32(style.fill),
            stroke: rgba_f32(style.stroke),
        }
    }
}

struct Magnitudes {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    bins: u32,
}

pub struct GpuPlot {
    context: Rc<GpuContext>,
    style: PlotStyle,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    magnitudes: Option<Magnitudes>,
    target: Option<OffscreenTarget>,
    scratch: Vec<f32>,
}

impl GpuPlot {
    pub fn new(context: Rc<GpuContext>, style: PlotStyle) -> Result<Self> {
        if context.is_lost() {
            return Err(DisplayError::GpuUnavailable("device lost".to_string()));
        }

        let encoding = context.encoding();
        let layout = context
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("plot bind group layout"),
                entries: &[uniform_entry(0), data_texture_entry(1, encoding)],
            });
        let pipeline = create_pipeline(&context, "plot", encoding.shader_source(SHADER), &layout);
        let uniforms = create_uniform_buffer(&context, "plot uniforms", size_of::<PlotUniforms>());

        Ok(Self {
            context,
            style,
            layout,
            pipeline,
            uniforms,
            magnitudes: None,
            target: None,
            scratch: Vec::new(),
        })
    }

    /// Replace the uploaded curve
    pub fn upload(&mut self, values: &[f32]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let bins = values.len() as u32;
        if self.magnitudes.as_ref().is_none_or(|m| m.bins != bins) {
            let texture = create_data_texture(&self.context, "plot magnitudes", bins, 1)?;
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = self.context.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("plot bind group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                ],
            });
            self.magnitudes = Some(Magnitudes {
                texture,
                bind_group,
                bins,
            });
        }

        self.scratch.clear();
        self.scratch.extend(values.iter().copied().map(shader_level));

        if let Some(magnitudes) = &self.magnitudes {
            write_texels(
                self.context.queue(),
                &magnitudes.texture,
                0,
                0,
                bins,
                1,
                TexelEncoding::encode(&self.scratch),
            );
        }
        Ok(())
    }

    pub fn draw(&mut self, bin_count: usize, view: &ViewSnapshot, levels: LevelRange, size: Size) -> DrawStatus {
        if self.context.is_lost() {
            return DrawStatus::DeviceLost;
        }
        if size.is_empty() {
            return DrawStatus::Idle;
        }

        let target = match OffscreenTarget::ensure(&mut self.target, &self.context, "plot target", size) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(error = %e, "Plot target unavailable");
                return DrawStatus::Idle;
            }
        };

        let bound = self
            .magnitudes
            .as_ref()
            .filter(|m| bin_count > 0 && m.bins as usize == bin_count);

        let status = match bound {
            Some(magnitudes) => {
                let uniforms = PlotUniforms::new(&self.style, bin_count, view, levels, size);
                self.context
                    .queue()
                    .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
                run_pass(
                    &self.context,
                    "plot pass",
                    target,
                    Some((&self.pipeline, &magnitudes.bind_group)),
                    self.style.background,
                );
                DrawStatus::Drawn
            }
            None => {
                run_pass(&self.context, "plot clear", target, None, self.style.background);
                DrawStatus::Idle
            }
        };

        if self.context.is_lost() {
            DrawStatus::DeviceLost
        } else {
            status
        }
    }

    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.target.as_ref().map(OffscreenTarget::texture)
    }
}

/// Levels as the shader sees them: NaN sinks to the floor, infinities become
/// the largest finite values
fn shader_level(db: f32) -> f32 {
    if db.is_nan() {
        f32::MIN
    } else {
        db.clamp(f32::MIN, f32::MAX)
    }
}
