//! GPU waterfall
//!
//! The history arena is mirrored into a `bins x capacity` data texture, one
//! row per slot, and the captured center frequencies into a `1 x capacity`
//! texture. Frequencies are stored relative to an `f64` origin so that `f32`
//! keeps sub-hertz resolution at any tuning. The shader maps each target row
//! to its slot and samples it against the frequency it was captured at.

use super::{
    GpuContext, OffscreenTarget, TexelEncoding, create_data_texture, create_pipeline,
    create_uniform_buffer, data_texture_entry, rgba_f32, run_pass, texture_entry, uniform_entry,
    write_texels,
};
use crate::coords::ViewSnapshot;
use crate::error::{DisplayError, Result};
use crate::gradient::{ColorGradient, LUT_SIZE, UNKNOWN_COLOR};
use crate::history::HistoryRingBuffer;
use crate::render::{DrawStatus, LevelRange, Size};
use std::rc::Rc;

pub(crate) const SHADER: &str = include_str!("shaders/waterfall.wgsl");

/// Stored in place of an unknown capture frequency
pub const UNKNOWN_FREQUENCY: f32 = f32::MAX;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct WaterfallUniforms {
    /// width, height, bins, capacity
    pub dims: [f32; 4],
    /// newest slot, filled rows, unused, unused
    pub rows: [u32; 4],
    /// left visible frequency, hertz per pixel, bandwidth, view center; the
    /// frequencies relative to the origin
    pub frequency: [f32; 4],
    pub unknown: [f32; 4],
    /// min dB, max dB, unused, unused
    pub levels: [f32; 4],
}

impl WaterfallUniforms {
    pub fn new(
        history: &HistoryRingBuffer,
        origin: f64,
        view: &ViewSnapshot,
        levels: LevelRange,
        size: Size,
    ) -> Self {
        let hertz_per_pixel = if view.pixels_per_hertz() > 0.0 {
            1.0 / view.pixels_per_hertz()
        } else {
            0.0
        };

        Self {
            dims: [
                size.width as f32,
                size.height as f32,
                history.bin_count() as f32,
                history.capacity() as f32,
            ],
            rows: [
                history.last_written().unwrap_or(0) as u32,
                history.len() as u32,
                0,
                0,
            ],
            frequency: [
                (view.left_visible_frequency() - origin) as f32,
                hertz_per_pixel as f32,
                view.bandwidth as f32,
                (view.center_frequency - origin) as f32,
            ],
            unknown: rgba_f32(UNKNOWN_COLOR),
            levels: [levels.min_db, levels.max_db, 0.0, 0.0],
        }
    }
}

/// Texel value for a captured frequency
pub fn frequency_texel(frequency: f64, origin: f64) -> f32 {
    let relative = (frequency - origin) as f32;
    if relative.is_finite() {
        relative
    } else {
        UNKNOWN_FREQUENCY
    }
}

struct HistoryTextures {
    magnitudes: wgpu::Texture,
    frequencies: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    bins: u32,
}

pub struct GpuWaterfall {
    context: Rc<GpuContext>,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    lut: wgpu::TextureView,
    textures: Option<HistoryTextures>,
    /// Reference for the stored frequencies, set from the first known one
    origin: Option<f64>,
    target: Option<OffscreenTarget>,
    scratch: Vec<f32>,
}

impl GpuWaterfall {
    pub fn new(context: Rc<GpuContext>, gradient: &ColorGradient) -> Result<Self> {
        if context.is_lost() {
            return Err(DisplayError::GpuUnavailable("device lost".to_string()));
        }

        let encoding = context.encoding();
        let layout = context
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("waterfall bind group layout"),
                entries: &[
                    uniform_entry(0),
                    data_texture_entry(1, encoding),
                    data_texture_entry(2, encoding),
                    texture_entry(3, wgpu::TextureSampleType::Float { filterable: false }),
                ],
            });
        let pipeline = create_pipeline(&context, "waterfall", encoding.shader_source(SHADER), &layout);
        let uniforms = create_uniform_buffer(&context, "waterfall uniforms", size_of::<WaterfallUniforms>());
        let lut = Self::create_lut(&context, gradient);

        Ok(Self {
            context,
            layout,
            pipeline,
            uniforms,
            lut,
            textures: None,
            origin: None,
            target: None,
            scratch: Vec::new(),
        })
    }

    fn create_lut(context: &GpuContext, gradient: &ColorGradient) -> wgpu::TextureView {
        let texture = context.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("waterfall gradient"),
            size: wgpu::Extent3d {
                width: LUT_SIZE as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_texels(
            context.queue(),
            &texture,
            0,
            0,
            LUT_SIZE as u32,
            1,
            bytemuck::cast_slice(gradient.lut()),
        );
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn ensure_textures(&mut self, history: &HistoryRingBuffer) -> Result<bool> {
        let bins = history.bin_count() as u32;
        if self.textures.as_ref().is_some_and(|t| t.bins == bins) {
            return Ok(false);
        }

        let capacity = history.capacity() as u32;
        let magnitudes = create_data_texture(&self.context, "waterfall history", bins, capacity)?;
        let frequencies = create_data_texture(&self.context, "waterfall frequencies", 1, capacity)?;
        let magnitude_view = magnitudes.create_view(&wgpu::TextureViewDescriptor::default());
        let frequency_view = frequencies.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.context.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("waterfall bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&magnitude_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&frequency_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.lut),
                },
            ],
        });

        self.textures = Some(HistoryTextures {
            magnitudes,
            frequencies,
            bind_group,
            bins,
        });
        Ok(true)
    }

    /// Upload every slot. Used after a reallocation or a backend rebuild.
    pub fn upload_history(&mut self, history: &HistoryRingBuffer) -> Result<()> {
        if history.bin_count() == 0 {
            return Ok(());
        }
        self.ensure_textures(history)?;
        self.origin = history.frequencies().iter().copied().find(|f| f.is_finite());

        let bins = history.bin_count() as u32;
        let capacity = history.capacity() as u32;
        self.scratch.clear();
        self.scratch.extend(history.arena().iter().copied().map(shader_level));
        if let Some(textures) = &self.textures {
            write_texels(
                self.context.queue(),
                &textures.magnitudes,
                0,
                0,
                bins,
                capacity,
                TexelEncoding::encode(&self.scratch),
            );
        }
        self.upload_frequencies(history);
        Ok(())
    }

    /// Upload the single slot just written
    pub fn upload_row(&mut self, history: &HistoryRingBuffer, slot: usize) -> Result<()> {
        if self.ensure_textures(history)? {
            return self.upload_history(history);
        }
        let Some(row) = history.slot(slot) else {
            return Ok(());
        };

        if self.origin.is_none() && row.center_frequency.is_finite() {
            self.origin = Some(row.center_frequency);
            self.upload_frequencies(history);
        }

        self.scratch.clear();
        self.scratch.extend(row.magnitudes.iter().copied().map(shader_level));
        let frequency = [frequency_texel(row.center_frequency, self.origin())];

        if let Some(textures) = &self.textures {
            let queue = self.context.queue();
            write_texels(
                queue,
                &textures.magnitudes,
                0,
                slot as u32,
                textures.bins,
                1,
                TexelEncoding::encode(&self.scratch),
            );
            write_texels(
                queue,
                &textures.frequencies,
                0,
                slot as u32,
                1,
                1,
                TexelEncoding::encode(&frequency),
            );
        }
        Ok(())
    }

    fn upload_frequencies(&self, history: &HistoryRingBuffer) {
        let origin = self.origin();
        let texels: Vec<f32> = history
            .frequencies()
            .iter()
            .map(|&f| frequency_texel(f, origin))
            .collect();
        if let Some(textures) = &self.textures {
            write_texels(
                self.context.queue(),
                &textures.frequencies,
                0,
                0,
                1,
                texels.len() as u32,
                TexelEncoding::encode(&texels),
            );
        }
    }

    fn origin(&self) -> f64 {
        self.origin.unwrap_or(0.0)
    }

    pub fn draw(
        &mut self,
        history: &HistoryRingBuffer,
        view: &ViewSnapshot,
        levels: LevelRange,
        size: Size,
    ) -> DrawStatus {
        if self.context.is_lost() {
            return DrawStatus::DeviceLost;
        }
        let size = Size::new(size.width, size.height.min(history.capacity() as u32));
        if size.is_empty() {
            return DrawStatus::Idle;
        }

        let target = match OffscreenTarget::ensure(&mut self.target, &self.context, "waterfall target", size) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(error = %e, "Waterfall target unavailable");
                return DrawStatus::Idle;
            }
        };

        let bound = self
            .textures
            .as_ref()
            .filter(|t| !history.is_empty() && t.bins as usize == history.bin_count());

        match bound {
            Some(textures) => {
                let uniforms = WaterfallUniforms::new(history, self.origin.unwrap_or(0.0), view, levels, size);
                self.context
                    .queue()
                    .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
                run_pass(
                    &self.context,
                    "waterfall pass",
                    target,
                    Some((&self.pipeline, &textures.bind_group)),
                    UNKNOWN_COLOR,
                );
            }
            None => run_pass(&self.context, "waterfall clear", target, None, UNKNOWN_COLOR),
        }

        if self.context.is_lost() {
            DrawStatus::DeviceLost
        } else {
            DrawStatus::Drawn
        }
    }

    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.target.as_ref().map(OffscreenTarget::texture)
    }
}

fn shader_level(db: f32) -> f32 {
    if db.is_nan() {
        f32::MIN
    } else {
        db.clamp(f32::MIN, f32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::DerivedLayout;
    use crate::frame::Frame;

    fn view(center: f64) -> ViewSnapshot {
        ViewSnapshot {
            layout: DerivedLayout {
                left_frequency: center - 0.5e6,
                pixels_per_hertz: 500.0 / 1e6,
                visible_pixel_width: 500.0,
            },
            center_frequency: center,
            bandwidth: 1e6,
            zoom: 1.0,
            scroll: 0.0,
        }
    }

    #[test]
    fn test_frequency_texels_are_relative() {
        let origin = 2.4e9;
        assert_eq!(frequency_texel(2.4e9 + 12_345.0, origin), 12_345.0);
        assert_eq!(frequency_texel(2.4e9 - 1e6, origin), -1e6);
        assert_eq!(frequency_texel(f64::NAN, origin), UNKNOWN_FREQUENCY);
    }

    #[test]
    fn test_uniforms_describe_history_and_view() {
        let mut history = HistoryRingBuffer::new(8);
        for i in 0..3 {
            history.push(&Frame::new(100e6 + i as f64 * 1e3, vec![-60.0f32; 64]));
        }

        let uniforms = WaterfallUniforms::new(&history, 100e6, &view(100.01e6), LevelRange::default(), Size::new(500, 8));
        assert_eq!(uniforms.dims, [500.0, 8.0, 64.0, 8.0]);
        assert_eq!(uniforms.rows[..2], [2u32, 3]);
        assert_eq!(uniforms.frequency[0], -490e3);
        assert_eq!(uniforms.frequency[1], 2000.0);
        assert_eq!(uniforms.frequency[2], 1e6);
        assert_eq!(uniforms.frequency[3], 10e3);
        assert_eq!(uniforms.unknown, rgba_f32(UNKNOWN_COLOR));
        assert_eq!(size_of::<WaterfallUniforms>(), 80);
    }

    /// CPU model of the shader's lookup for one fragment
    fn shader_bin(uniforms: &WaterfallUniforms, captured: f32, x: f32) -> Option<usize> {
        let [left, hertz_per_pixel, bandwidth, view_center] = uniforms.frequency;
        let captured = if captured.abs() >= 3.0e38 { view_center } else { captured };
        let frequency = left + x * hertz_per_pixel;
        let position = (frequency - (captured - bandwidth * 0.5)) / bandwidth * uniforms.dims[2];
        (position >= 0.0 && position < uniforms.dims[2]).then_some(position as usize)
    }

    #[test]
    fn test_shader_lookup_matches_raster() {
        use crate::render::raster::waterfall::row_bin;

        let mut history = HistoryRingBuffer::new(4);
        history.push(&Frame::new(100.02e6, vec![-60.0f32; 500]));
        history.push(&Frame::new(f64::NAN, vec![-60.0f32; 500]));

        let origin = 100.02e6;
        let view = view(100e6);
        let uniforms = WaterfallUniforms::new(&history, origin, &view, LevelRange::default(), Size::new(500, 4));

        for slot in 0..2 {
            let row = history.slot(slot).unwrap();
            let captured = frequency_texel(row.center_frequency, origin);
            for x in [0usize, 9, 10, 11, 250, 499] {
                let center = x as f64 + 0.5;
                assert_eq!(
                    shader_bin(&uniforms, captured, center as f32),
                    row_bin(&view, &row, center),
                    "slot {} x {}",
                    slot,
                    x
                );
            }
        }
    }
}
