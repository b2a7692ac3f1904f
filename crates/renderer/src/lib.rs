//! wgpu renderer for the layered wallpaper.
//!
//! One GPU instance/device serves every monitor; each monitor contributes a
//! render target (its layer-shell surface) and each layer a texture. A frame
//! for one monitor is a sequence of quad draws in z-order with premultiplied
//! alpha blending:
//!
//! ```text
//!   Daemon ──▶ Renderer::render(target, frame, &[LayerDraw])
//!                   │ per layer: LayerUniforms (rect, uv, offset, blur…)
//!                   ▼
//!          surface pass ──▶ present ──▶ (frame callback arms next frame)
//! ```
//!
//! Blur runs either as a single-pass gaussian inside the layer shader or,
//! when the separable path is enabled, as a horizontal pass into an
//! offscreen target followed by a vertical pass onto the surface. The
//! parallax offset is applied on the first pass only, so it lands exactly
//! once either way.

mod placement;
mod types;

pub use placement::{compute_placement, Placement};
pub use types::{DrawParams, FitMode, OverflowMode, TileMode, Tint};

use std::collections::HashMap;
use std::path::Path;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),
    #[error("GPU initialisation failed: {0}")]
    Init(String),
    #[error("renderer has no device yet")]
    NotReady,
    #[error("unknown render target")]
    UnknownTarget,
    #[error("unknown texture")]
    UnknownTexture,
    #[error("failed to load image '{path}': {reason}")]
    Texture { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Renderer-wide toggles, resolved from config/env by the daemon.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub vsync: bool,
    /// Two-pass separable blur through an offscreen target.
    pub separable_blur: bool,
    /// Downscale factor for the blur target, in (0, 1].
    pub blur_downscale: f32,
    /// Apply parallax via the vertex uniform; when off the offset is baked
    /// into the UV window before upload.
    pub uniform_offset: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            vsync: true,
            separable_blur: false,
            blur_downscale: 1.0,
            uniform_offset: true,
        }
    }
}

/// Stable handle to an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

/// Stable handle to a per-monitor render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u32);

/// One layer's draw request for one frame.
#[derive(Debug, Clone)]
pub struct LayerDraw {
    pub texture: TextureHandle,
    /// Parallax offset in screen pixels.
    pub offset_x: f32,
    pub offset_y: f32,
    pub opacity: f32,
    pub blur: f32,
    pub params: DrawParams,
}

/// Per-frame knobs.
#[derive(Debug, Clone)]
pub struct FrameParams {
    pub clear: [f32; 4],
    /// When set, the previous frame is kept and faded by this colour
    /// instead of being cleared (motion trails).
    pub fade: Option<[f32; 4]>,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            clear: [0.0, 0.0, 0.0, 1.0],
            fade: None,
        }
    }
}

/// Blur radius in texels, forced into the supported kernel range. The full
/// kernel is `2 * radius + 1` wide: odd, at least 3, at most 31.
pub fn blur_kernel_radius(amount: f32) -> u32 {
    (amount.max(1.0).min(15.0)).round() as u32
}

const UNIFORM_STRIDE: u64 = 256;
const MAX_DRAWS: u64 = 128;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct LayerUniforms {
    rect: [f32; 4],
    uv_rect: [f32; 4],
    offset: [f32; 2],
    opacity: f32,
    blur_amount: f32,
    tint: [f32; 4],
    flags: [f32; 4],
    texel: [f32; 2],
    pad: [f32; 2],
}

const BLUR_SINGLE: f32 = 0.0;
const BLUR_HORIZONTAL: f32 = 1.0;
const BLUR_VERTICAL: f32 = 2.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SolidUniforms {
    color: [f32; 4],
}

struct LayerTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    // One bind group per sampler combination, created on first use.
    bind_groups: HashMap<u8, wgpu::BindGroup>,
}

struct BlurTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct Target {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    blur: Option<BlurTarget>,
}

struct Gpu {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    layer_pipeline: wgpu::RenderPipeline,
    solid_pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    solid_buffer: wgpu::Buffer,
    solid_bind_group: wgpu::BindGroup,
    /// Indexed by `tile_x as u8 | (tile_y as u8) << 1`.
    samplers: [wgpu::Sampler; 4],
}

pub struct Renderer {
    instance: wgpu::Instance,
    gpu: Option<Gpu>,
    targets: HashMap<TargetId, Target>,
    textures: HashMap<TextureHandle, LayerTexture>,
    next_target: u32,
    next_texture: u32,
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        Self {
            instance,
            gpu: None,
            targets: HashMap::new(),
            textures: HashMap::new(),
            next_target: 1,
            next_texture: 1,
            options,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Creates a render target for one monitor surface. The first target
    /// also selects the adapter and creates the device.
    pub fn create_target<H>(&mut self, handle: &H, width: u32, height: u32) -> Result<TargetId>
    where
        H: HasDisplayHandle + HasWindowHandle,
    {
        let raw_display_handle = handle
            .display_handle()
            .map_err(|err| RenderError::Init(format!("display handle: {err}")))?
            .as_raw();
        let raw_window_handle = handle
            .window_handle()
            .map_err(|err| RenderError::Init(format!("window handle: {err}")))?
            .as_raw();
        let surface = unsafe {
            self.instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle,
                    raw_window_handle,
                })
        }
        .map_err(|err| RenderError::Init(format!("surface creation: {err}")))?;

        if self.gpu.is_none() {
            self.gpu = Some(init_gpu(&self.instance, &surface)?);
        }
        let gpu = self.gpu.as_ref().expect("gpu initialised above");

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = if caps.formats.contains(&gpu.format) {
            gpu.format
        } else {
            caps.formats
                .first()
                .copied()
                .ok_or_else(|| RenderError::Init("surface reports no formats".into()))?
        };
        let present_mode = pick_present_mode(&caps.present_modes, self.options.vsync);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        let id = TargetId(self.next_target);
        self.next_target += 1;
        let mut target = Target {
            surface,
            config,
            blur: None,
        };
        if self.options.separable_blur {
            target.blur = Some(create_blur_target(gpu, &target.config, self.options.blur_downscale));
        }
        self.targets.insert(id, target);
        tracing::debug!(target = id.0, width, height, ?format, "created render target");
        Ok(id)
    }

    pub fn destroy_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    pub fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> Result<()> {
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotReady)?;
        let target = self.targets.get_mut(&id).ok_or(RenderError::UnknownTarget)?;
        target.config.width = width.max(1);
        target.config.height = height.max(1);
        target.surface.configure(&gpu.device, &target.config);
        if self.options.separable_blur {
            target.blur = Some(create_blur_target(gpu, &target.config, self.options.blur_downscale));
        }
        Ok(())
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        if self.options.vsync == vsync {
            return;
        }
        self.options.vsync = vsync;
        let Some(gpu) = self.gpu.as_ref() else {
            return;
        };
        for target in self.targets.values_mut() {
            let caps = target.surface.get_capabilities(&gpu.adapter);
            target.config.present_mode = pick_present_mode(&caps.present_modes, vsync);
            target.surface.configure(&gpu.device, &target.config);
        }
    }

    /// Decodes and uploads an image as a premultiplied RGBA8 texture.
    pub fn load_texture(&mut self, path: &Path) -> Result<(TextureHandle, u32, u32)> {
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotReady)?;
        let image = image::open(path)
            .map_err(|err| RenderError::Texture {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let mut pixels = image.into_raw();
        // Premultiply so the whole pipeline blends premultiplied alpha.
        for px in pixels.chunks_exact_mut(4) {
            let alpha = px[3] as u32;
            px[0] = ((px[0] as u32 * alpha) / 255) as u8;
            px[1] = ((px[1] as u32 * alpha) / 255) as u8;
            px[2] = ((px[2] as u32 * alpha) / 255) as u8;
        }

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("layer texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            handle,
            LayerTexture {
                _texture: texture,
                view,
                width,
                height,
                bind_groups: HashMap::new(),
            },
        );
        tracing::debug!(path = %path.display(), width, height, "uploaded texture");
        Ok((handle, width, height))
    }

    pub fn drop_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle);
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(&handle)
            .map(|texture| (texture.width, texture.height))
    }

    /// Renders one monitor's layer stack and presents.
    pub fn render(
        &mut self,
        id: TargetId,
        frame: &FrameParams,
        layers: &[LayerDraw],
    ) -> Result<()> {
        let gpu = self.gpu.as_ref().ok_or(RenderError::NotReady)?;
        let target = self.targets.get_mut(&id).ok_or(RenderError::UnknownTarget)?;

        // Ensure texture bind groups exist before borrowing for the pass.
        for draw in layers {
            let sampler_index = sampler_index(draw.params.tile_x, draw.params.tile_y);
            let texture = self
                .textures
                .get_mut(&draw.texture)
                .ok_or(RenderError::UnknownTexture)?;
            if !texture.bind_groups.contains_key(&sampler_index) {
                let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("layer bind group"),
                    layout: &gpu.texture_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&texture.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                &gpu.samplers[sampler_index as usize],
                            ),
                        },
                    ],
                });
                texture.bind_groups.insert(sampler_index, bind_group);
            }
        }

        let surface_texture = target.surface.get_current_texture()?;
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let screen_w = target.config.width as f32;
        let screen_h = target.config.height as f32;

        // Stage all uniforms first; draws reference them by dynamic offset.
        let mut slots: Vec<(usize, LayerUniforms, Option<LayerUniforms>)> = Vec::new();
        for (index, draw) in layers.iter().enumerate() {
            if (slots.len() as u64 + 1) * 2 > MAX_DRAWS {
                tracing::warn!(dropped = layers.len() - index, "layer draw budget exceeded");
                break;
            }
            let texture = self.textures.get(&draw.texture).ok_or(RenderError::UnknownTexture)?;
            let separable = self.options.separable_blur && draw.blur > 0.5 && target.blur.is_some();
            let uniforms = build_layer_uniforms(
                draw,
                texture,
                screen_w,
                screen_h,
                &self.options,
                if separable { BLUR_HORIZONTAL } else { BLUR_SINGLE },
            );
            let second_pass = separable.then(|| {
                let blur = target.blur.as_ref().expect("separable implies blur target");
                LayerUniforms {
                    rect: [-1.0, -1.0, 1.0, 1.0],
                    uv_rect: [0.0, 0.0, 1.0, 1.0],
                    offset: [0.0, 0.0],
                    opacity: 1.0,
                    blur_amount: draw.blur,
                    tint: [1.0, 1.0, 1.0, 0.0],
                    flags: [0.0, 0.0, BLUR_VERTICAL, 0.0],
                    texel: [1.0 / blur.width as f32, 1.0 / blur.height as f32],
                    pad: [0.0, 0.0],
                }
            });
            slots.push((index, uniforms, second_pass));
        }

        let mut offset_cursor = 0u64;
        let mut offsets: Vec<(u32, Option<u32>)> = Vec::with_capacity(slots.len());
        for (_, uniforms, second) in &slots {
            gpu.queue.write_buffer(
                &gpu.uniform_buffer,
                offset_cursor,
                bytemuck::bytes_of(uniforms),
            );
            let first = offset_cursor as u32;
            offset_cursor += UNIFORM_STRIDE;
            let second_offset = second.map(|uniforms| {
                gpu.queue.write_buffer(
                    &gpu.uniform_buffer,
                    offset_cursor,
                    bytemuck::bytes_of(&uniforms),
                );
                let offset = offset_cursor as u32;
                offset_cursor += UNIFORM_STRIDE;
                offset
            });
            offsets.push((first, second_offset));
        }
        if let Some(fade) = frame.fade {
            gpu.queue.write_buffer(
                &gpu.solid_buffer,
                0,
                bytemuck::bytes_of(&SolidUniforms { color: fade }),
            );
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        let mut surface_cleared = false;
        let clear_color = wgpu::Color {
            r: frame.clear[0] as f64,
            g: frame.clear[1] as f64,
            b: frame.clear[2] as f64,
            a: frame.clear[3] as f64,
        };

        // Trails keep the old frame and fade it instead of clearing.
        if frame.fade.is_some() {
            let mut pass = begin_surface_pass(&mut encoder, &surface_view, true, clear_color);
            pass.set_pipeline(&gpu.solid_pipeline);
            pass.set_bind_group(0, &gpu.solid_bind_group, &[]);
            pass.draw(0..4, 0..1);
            surface_cleared = true;
        }

        let mut pending: Vec<(usize, u32)> = Vec::new();
        for (slot, (index, _, second)) in slots.iter().enumerate() {
            let (first_offset, second_offset) = offsets[slot];
            match second {
                None => pending.push((*index, first_offset)),
                Some(_) => {
                    // Flush batched direct draws so z-order is preserved,
                    // then run the two blur passes.
                    if !pending.is_empty() {
                        draw_layer_batch(
                            gpu,
                            &mut encoder,
                            &surface_view,
                            &self.textures,
                            layers,
                            &pending,
                            !surface_cleared,
                            clear_color,
                        );
                        surface_cleared = true;
                        pending.clear();
                    }
                    let blur = target.blur.as_ref().expect("separable implies blur target");
                    {
                        let mut pass =
                            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                                label: Some("blur horizontal pass"),
                                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                    view: &blur.view,
                                    resolve_target: None,
                                    ops: wgpu::Operations {
                                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                                        store: wgpu::StoreOp::Store,
                                    },
                                    depth_slice: None,
                                })],
                                depth_stencil_attachment: None,
                                timestamp_writes: None,
                                occlusion_query_set: None,
                            });
                        pass.set_pipeline(&gpu.layer_pipeline);
                        pass.set_bind_group(0, &gpu.uniform_bind_group, &[first_offset]);
                        let draw = &layers[*index];
                        let texture = &self.textures[&draw.texture];
                        let sampler = sampler_index(draw.params.tile_x, draw.params.tile_y);
                        pass.set_bind_group(1, &texture.bind_groups[&sampler], &[]);
                        pass.draw(0..4, 0..1);
                    }
                    {
                        let mut pass = begin_surface_pass(
                            &mut encoder,
                            &surface_view,
                            !surface_cleared,
                            clear_color,
                        );
                        surface_cleared = true;
                        pass.set_pipeline(&gpu.layer_pipeline);
                        pass.set_bind_group(
                            0,
                            &gpu.uniform_bind_group,
                            &[second_offset.expect("second pass has an offset")],
                        );
                        pass.set_bind_group(1, &blur.bind_group, &[]);
                        pass.draw(0..4, 0..1);
                    }
                }
            }
        }
        if !pending.is_empty() || !surface_cleared {
            draw_layer_batch(
                gpu,
                &mut encoder,
                &surface_view,
                &self.textures,
                layers,
                &pending,
                !surface_cleared,
                clear_color,
            );
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }
}

fn build_layer_uniforms(
    draw: &LayerDraw,
    texture: &LayerTexture,
    screen_w: f32,
    screen_h: f32,
    options: &RenderOptions,
    blur_mode: f32,
) -> LayerUniforms {
    let placement = compute_placement(
        screen_w,
        screen_h,
        texture.width as f32,
        texture.height as f32,
        &draw.params,
    );
    let offset_uv = [
        draw.offset_x * placement.uv_per_px[0],
        draw.offset_y * placement.uv_per_px[1],
    ];
    let (mut uv_rect, offset) = if options.uniform_offset {
        (placement.uv, offset_uv)
    } else {
        // Uniform path disabled: bake the translation into the window.
        let mut uv = placement.uv;
        uv[0] += offset_uv[0];
        uv[2] += offset_uv[0];
        uv[1] += offset_uv[1];
        uv[3] += offset_uv[1];
        (uv, [0.0, 0.0])
    };
    // Wrap modes repeat naturally; nothing to adjust for tiling axes.
    if draw.params.tile_x {
        uv_rect[0] = uv_rect[0].rem_euclid(1.0);
        uv_rect[2] = uv_rect[0] + (placement.uv[2] - placement.uv[0]);
    }

    let discard_x = draw.params.overflow == OverflowMode::None && !draw.params.tile_x;
    let discard_y = draw.params.overflow == OverflowMode::None && !draw.params.tile_y;
    LayerUniforms {
        rect: placement.rect,
        uv_rect,
        offset,
        opacity: draw.opacity.clamp(0.0, 1.0),
        blur_amount: if draw.blur > 0.0 {
            blur_kernel_radius(draw.blur) as f32
        } else {
            0.0
        },
        tint: [
            draw.params.tint.r,
            draw.params.tint.g,
            draw.params.tint.b,
            draw.params.tint.strength.clamp(0.0, 1.0),
        ],
        flags: [
            if discard_x { 1.0 } else { 0.0 },
            if discard_y { 1.0 } else { 0.0 },
            blur_mode,
            0.0,
        ],
        texel: [1.0 / texture.width as f32, 1.0 / texture.height as f32],
        pad: [0.0, 0.0],
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_layer_batch(
    gpu: &Gpu,
    encoder: &mut wgpu::CommandEncoder,
    surface_view: &wgpu::TextureView,
    textures: &HashMap<TextureHandle, LayerTexture>,
    layers: &[LayerDraw],
    batch: &[(usize, u32)],
    clear: bool,
    clear_color: wgpu::Color,
) {
    let mut pass = begin_surface_pass(encoder, surface_view, clear, clear_color);
    pass.set_pipeline(&gpu.layer_pipeline);
    for (index, offset) in batch {
        let draw = &layers[*index];
        let Some(texture) = textures.get(&draw.texture) else {
            continue;
        };
        let sampler = sampler_index(draw.params.tile_x, draw.params.tile_y);
        let Some(bind_group) = texture.bind_groups.get(&sampler) else {
            continue;
        };
        pass.set_bind_group(0, &gpu.uniform_bind_group, &[*offset]);
        pass.set_bind_group(1, bind_group, &[]);
        pass.draw(0..4, 0..1);
    }
}

fn begin_surface_pass<'a>(
    encoder: &'a mut wgpu::CommandEncoder,
    view: &'a wgpu::TextureView,
    clear: bool,
    clear_color: wgpu::Color,
) -> wgpu::RenderPass<'a> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("surface pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: if clear {
                    wgpu::LoadOp::Clear(clear_color)
                } else {
                    wgpu::LoadOp::Load
                },
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn sampler_index(tile_x: bool, tile_y: bool) -> u8 {
    (tile_x as u8) | ((tile_y as u8) << 1)
}

fn pick_present_mode(modes: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        // Fifo is always available and the most stable on Wayland stacks.
        wgpu::PresentMode::Fifo
    } else {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, wgpu::PresentMode::Mailbox))
            .or_else(|| {
                modes
                    .iter()
                    .copied()
                    .find(|mode| matches!(mode, wgpu::PresentMode::Immediate))
            })
            .unwrap_or(wgpu::PresentMode::Fifo)
    }
}

fn init_gpu(instance: &wgpu::Instance, surface: &wgpu::Surface<'_>) -> Result<Gpu> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        // Low power keeps the wallpaper friendly to interactive GPU users.
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: Some(surface),
        force_fallback_adapter: false,
    }))
    .map_err(|err| RenderError::Init(format!("no suitable GPU adapter: {err}")))?;

    let info = adapter.get_info();
    tracing::debug!(name = %info.name, backend = ?info.backend, "selected GPU adapter");

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("hyprlax device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::downlevel_defaults(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| RenderError::Init(format!("device creation: {err}")))?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|format| format.is_srgb())
        .unwrap_or(caps.formats[0]);

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("layer uniforms"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<LayerUniforms>() as u64),
            },
            count: None,
        }],
    });
    let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("layer texture"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let layer_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("layer shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/layer.wgsl").into()),
    });
    let solid_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("solid shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/solid.wgsl").into()),
    });

    let layer_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layer pipeline layout"),
        bind_group_layouts: &[&uniform_layout, &texture_layout],
        push_constant_ranges: &[],
    });

    let premultiplied = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    };

    let layer_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("layer pipeline"),
        layout: Some(&layer_pipeline_layout),
        vertex: wgpu::VertexState {
            module: &layer_module,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &layer_module,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(premultiplied),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    let solid_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("solid pipeline layout"),
        bind_group_layouts: &[&device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("solid uniforms"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<SolidUniforms>() as u64,
                        ),
                    },
                    count: None,
                }],
            },
        )],
        push_constant_ranges: &[],
    });

    let solid_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("solid pipeline"),
        layout: Some(&solid_pipeline_layout),
        vertex: wgpu::VertexState {
            module: &solid_module,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &solid_module,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(premultiplied),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("layer uniform buffer"),
        size: UNIFORM_STRIDE * MAX_DRAWS,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("layer uniform bind group"),
        layout: &uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &uniform_buffer,
                offset: 0,
                size: wgpu::BufferSize::new(std::mem::size_of::<LayerUniforms>() as u64),
            }),
        }],
    });

    let solid_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("solid uniform buffer"),
        size: std::mem::size_of::<SolidUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let solid_layout = solid_pipeline.get_bind_group_layout(0);
    let solid_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("solid bind group"),
        layout: &solid_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: solid_buffer.as_entire_binding(),
        }],
    });

    let sampler_for = |tile_x: bool, tile_y: bool| {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("layer sampler"),
            address_mode_u: if tile_x {
                wgpu::AddressMode::Repeat
            } else {
                wgpu::AddressMode::ClampToEdge
            },
            address_mode_v: if tile_y {
                wgpu::AddressMode::Repeat
            } else {
                wgpu::AddressMode::ClampToEdge
            },
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    };
    let samplers = [
        sampler_for(false, false),
        sampler_for(true, false),
        sampler_for(false, true),
        sampler_for(true, true),
    ];

    Ok(Gpu {
        adapter,
        device,
        queue,
        format,
        layer_pipeline,
        solid_pipeline,
        texture_layout,
        uniform_buffer,
        uniform_bind_group,
        solid_buffer,
        solid_bind_group,
        samplers,
    })
}

fn create_blur_target(gpu: &Gpu, config: &wgpu::SurfaceConfiguration, downscale: f32) -> BlurTarget {
    let downscale = downscale.clamp(0.1, 1.0);
    let width = ((config.width as f32 * downscale) as u32).max(1);
    let height = ((config.height as f32 * downscale) as u32).max(1);
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("blur target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: gpu.format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("blur bind group"),
        layout: &gpu.texture_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&gpu.samplers[0]),
            },
        ],
    });
    BlurTarget {
        _texture: texture,
        view,
        bind_group,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_radius_clamps_to_supported_range() {
        // Kernel width 2r+1 must be odd, >= 3, <= 31.
        assert_eq!(blur_kernel_radius(0.0), 1);
        assert_eq!(blur_kernel_radius(0.4), 1);
        assert_eq!(blur_kernel_radius(5.0), 5);
        assert_eq!(blur_kernel_radius(100.0), 15);
        for amount in [0.0, 1.0, 3.7, 9.2, 50.0] {
            let width = blur_kernel_radius(amount) * 2 + 1;
            assert!(width % 2 == 1 && (3..=31).contains(&width));
        }
    }

    #[test]
    fn sampler_index_covers_combinations() {
        assert_eq!(sampler_index(false, false), 0);
        assert_eq!(sampler_index(true, false), 1);
        assert_eq!(sampler_index(false, true), 2);
        assert_eq!(sampler_index(true, true), 3);
    }

    #[test]
    fn present_mode_honours_vsync() {
        let modes = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];
        assert_eq!(pick_present_mode(&modes, true), wgpu::PresentMode::Fifo);
        assert_eq!(pick_present_mode(&modes, false), wgpu::PresentMode::Mailbox);
        assert_eq!(
            pick_present_mode(&[wgpu::PresentMode::Fifo], false),
            wgpu::PresentMode::Fifo
        );
    }
}
