/// Fixed shader catalog consumed from pre-built bundles
pub mod shaders;

use crate::gfx;
use crate::os;
use crate::Error;

use gfx::as_u8_slice;

use maths_rs::Vec2f;
use maths_rs::Vec4f;

use shaders::{FragmentShaderId, ShaderBundle, ShaderCatalog, VertexShaderId};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Size of the per-frame vertex ring and its mirrored transfer buffer
pub const VERTEX_BUFFER_SIZE: u32 = 1 << 20;

/// Blend modes supported for 2d drawing
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BlendMode {
    None,
    Blend,
    Add,
    Mod,
    Mul,
}

impl BlendMode {
    fn blend_state(&self) -> gfx::ColorAttachmentBlendState {
        use gfx::BlendFactor::*;
        use gfx::BlendOp::*;
        let (enable, src_color, dst_color, color_op, src_alpha, dst_alpha, alpha_op) = match self {
            BlendMode::None => (false, One, Zero, Add, One, Zero, Add),
            BlendMode::Blend => (true, SrcAlpha, OneMinusSrcAlpha, Add, One, OneMinusSrcAlpha, Add),
            BlendMode::Add => (true, SrcAlpha, One, Add, Zero, One, Add),
            BlendMode::Mod => (true, Zero, SrcColor, Add, Zero, One, Add),
            BlendMode::Mul => (true, DstColor, OneMinusSrcAlpha, Add, DstAlpha, OneMinusSrcAlpha, Add),
        };
        gfx::ColorAttachmentBlendState {
            blend_enable: enable,
            src_color_blend_factor: src_color,
            dst_color_blend_factor: dst_color,
            color_blend_op: color_op,
            src_alpha_blend_factor: src_alpha,
            dst_alpha_blend_factor: dst_alpha,
            alpha_blend_op: alpha_op,
            color_write_mask: gfx::ColorComponentFlags::ALL,
        }
    }
}

/// Filtering applied when a texture is stretched
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ScaleMode {
    Nearest,
    Linear,
    Best,
}

/// Addressing outside the 0..1 uv range
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AddressMode {
    Clamp,
    Wrap,
}

/// How a 2d texture's contents are produced
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TextureAccess {
    /// Uploaded rarely through `update_texture`
    Static,
    /// Locked and rewritten frequently, keeps a host side shadow
    Streaming,
    /// Usable as a render target via `set_render_target`
    Target,
}

struct Texture2dInner {
    texture: gfx::Texture,
    width: u32,
    height: u32,
    format: gfx::TextureFormat,
    fragment_shader: FragmentShaderId,
    access: TextureAccess,
    scale_mode: Cell<ScaleMode>,
    address_mode: Cell<AddressMode>,
    // streaming shadow
    pixels: RefCell<Vec<u8>>,
    pitch: usize,
    locked_rect: Cell<os::Rect<i32>>,
}

/// A texture owned by the 2d renderer
#[derive(Clone)]
pub struct Texture2d {
    inner: Rc<Texture2dInner>,
}

impl Texture2d {
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn set_scale_mode(&self, mode: ScaleMode) {
        self.inner.scale_mode.set(mode);
    }

    pub fn scale_mode(&self) -> ScaleMode {
        self.inner.scale_mode.get()
    }

    pub fn set_address_mode(&self, mode: AddressMode) {
        self.inner.address_mode.set(mode);
    }
}

/// Key for the graphics pipeline cache; pipelines are shared between draws with
/// matching state
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    blend_mode: BlendMode,
    vertex_shader: VertexShaderId,
    fragment_shader: FragmentShaderId,
    primitive_type: gfx::PrimitiveType,
    attachment_format: gfx::TextureFormat,
}

#[repr(C)]
struct ShaderUniformData {
    mvp: [[f32; 4]; 4],
    color: [f32; 4],
    texture_size: [f32; 2],
    padding: [f32; 2],
}

struct DrawData {
    first: u32,
    count: u32,
    texture: Option<Texture2d>,
    blend: BlendMode,
}

enum RenderCommand {
    SetDrawColor { color: Vec4f },
    SetViewport { viewport: gfx::Viewport },
    SetClipRect { rect: gfx::ScissorRect, enabled: bool },
    Clear { color: Vec4f },
    DrawPoints(DrawData),
    DrawLines(DrawData),
    Geometry(DrawData),
    NoOp,
}

struct SwapchainState {
    texture: Option<gfx::Texture>,
    format: gfx::TextureFormat,
    width: u32,
    height: u32,
    composition: gfx::SwapchainComposition,
    present_mode: gfx::PresentMode,
}

struct FrameState {
    command_buffer: gfx::CommandBuffer,
    render_pass: Option<gfx::RenderPass>,
    render_target: Option<Texture2d>,
    load_op: gfx::LoadOp,
    clear_color: gfx::Color,
    viewport: gfx::Viewport,
    scissor: gfx::ScissorRect,
    scissor_enabled: bool,
    draw_color: Vec4f,
}

/// A linear 2d renderer above the portable gpu api. Draw calls are queued,
/// adjacent compatible draws are merged, and everything is flushed at `present`.
pub struct Renderer2d {
    device: gfx::Device,
    window: Rc<dyn os::Window>,
    shaders: ShaderCatalog,
    pipeline_cache: HashMap<PipelineKey, gfx::GraphicsPipeline>,
    present_fence: Option<gfx::Fence>,
    swapchain: SwapchainState,
    vertex_buffer: gfx::Buffer,
    vertex_transfer_buffer: gfx::TransferBuffer,
    vertex_data: Vec<f32>,
    commands: Vec<RenderCommand>,
    state: FrameState,
    samplers: Vec<gfx::Sampler>,
    color_scale: f32,
    linear_colors: bool,
}

fn to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

impl Renderer2d {
    pub fn new(
        device: gfx::Device,
        window: Rc<dyn os::Window>,
        bundle: &ShaderBundle,
    ) -> Result<Self, Error> {
        let shaders = ShaderCatalog::new(&device, bundle)?;

        let vertex_buffer = device.create_buffer(&gfx::BufferInfo {
            usage: gfx::BufferUsage::VERTEX,
            size: VERTEX_BUFFER_SIZE,
        })?;
        let vertex_transfer_buffer = device.create_transfer_buffer(&gfx::TransferBufferInfo {
            usage: gfx::TransferBufferUsage::Upload,
            size: VERTEX_BUFFER_SIZE,
        })?;

        // 3 x 2 sampler table, scale modes by address modes, filled once and
        // indexed per draw
        let mut samplers = Vec::new();
        for scale_mode in [ScaleMode::Nearest, ScaleMode::Linear, ScaleMode::Best] {
            for address_mode in [AddressMode::Clamp, AddressMode::Wrap] {
                let gpu_address = match address_mode {
                    AddressMode::Clamp => gfx::SamplerAddressMode::ClampToEdge,
                    AddressMode::Wrap => gfx::SamplerAddressMode::Repeat,
                };
                let (filter, anisotropy) = match scale_mode {
                    ScaleMode::Nearest => (gfx::Filter::Nearest, 0),
                    ScaleMode::Linear => (gfx::Filter::Linear, 0),
                    ScaleMode::Best => (gfx::Filter::Linear, 16),
                };
                samplers.push(device.create_sampler(&gfx::SamplerInfo {
                    min_filter: filter,
                    mag_filter: filter,
                    address_mode_u: gpu_address,
                    address_mode_v: gpu_address,
                    address_mode_w: gpu_address,
                    anisotropy_enable: anisotropy > 0,
                    max_anisotropy: anisotropy,
                    ..gfx::SamplerInfo::default()
                })?);
            }
        }

        let composition = gfx::SwapchainComposition::Sdr;
        let present_mode = gfx::PresentMode::Vsync;
        device.claim_window(window.as_ref(), composition, present_mode)?;

        let command_buffer = device.acquire_command_buffer()?;
        let size = window.size();

        let mut renderer = Renderer2d {
            shaders,
            pipeline_cache: HashMap::new(),
            present_fence: None,
            swapchain: SwapchainState {
                texture: None,
                format: gfx::TextureFormat::B8G8R8A8,
                width: size.x,
                height: size.y,
                composition,
                present_mode,
            },
            vertex_buffer,
            vertex_transfer_buffer,
            vertex_data: Vec::new(),
            commands: Vec::new(),
            state: FrameState {
                command_buffer,
                render_pass: None,
                render_target: None,
                load_op: gfx::LoadOp::Load,
                clear_color: gfx::Color::default(),
                viewport: gfx::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: size.x as f32,
                    height: size.y as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                },
                scissor: gfx::ScissorRect {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 0,
                },
                scissor_enabled: false,
                draw_color: Vec4f::new(1.0, 1.0, 1.0, 1.0),
            },
            samplers,
            color_scale: 1.0,
            linear_colors: matches!(
                composition,
                gfx::SwapchainComposition::SdrLinear | gfx::SwapchainComposition::Hdr
            ),
            device,
            window,
        };
        renderer.renew_swapchain();
        Ok(renderer)
    }

    /// The sampler used for a scale/address mode pair; stable for the lifetime of
    /// the renderer
    pub fn sampler_for(&self, scale_mode: ScaleMode, address_mode: AddressMode) -> &gfx::Sampler {
        &self.samplers[scale_mode as usize * 2 + address_mode as usize]
    }

    /// Number of distinct pipelines constructed so far
    pub fn pipeline_cache_size(&self) -> usize {
        self.pipeline_cache.len()
    }

    /// Total vertex bytes queued for the current frame
    pub fn queued_vertex_bytes(&self) -> usize {
        self.vertex_data.len() * std::mem::size_of::<f32>()
    }

    /// Scale applied to draw colours, for rendering into scaled colour spaces
    pub fn set_color_scale(&mut self, scale: f32) {
        self.color_scale = scale;
    }

    fn convert_color(&self, color: Vec4f) -> Vec4f {
        let mut c = color;
        if self.linear_colors {
            c.x = to_linear(c.x);
            c.y = to_linear(c.y);
            c.z = to_linear(c.z);
        }
        c.x *= self.color_scale;
        c.y *= self.color_scale;
        c.z *= self.color_scale;
        c
    }

    pub fn set_draw_color(&mut self, color: Vec4f) {
        let color = self.convert_color(color);
        self.commands.push(RenderCommand::SetDrawColor { color });
    }

    pub fn set_viewport(&mut self, rect: os::Rect<i32>) {
        self.commands.push(RenderCommand::SetViewport {
            viewport: gfx::Viewport::from(rect),
        });
    }

    /// Set or clear the clip rectangle applied to subsequent draws
    pub fn set_clip_rect(&mut self, rect: Option<os::Rect<i32>>) {
        match rect {
            Some(rect) => self.commands.push(RenderCommand::SetClipRect {
                rect: gfx::ScissorRect::from(rect),
                enabled: true,
            }),
            None => self.commands.push(RenderCommand::SetClipRect {
                rect: gfx::ScissorRect {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 0,
                },
                enabled: false,
            }),
        }
    }

    /// Queue a clear of the whole target. The clear becomes the load op of the
    /// next render pass, restarting the pass if one is already open.
    pub fn clear(&mut self, color: Vec4f) {
        let color = self.convert_color(color);
        self.commands.push(RenderCommand::Clear { color });
    }

    fn push_draw_vertices(&mut self, floats: &[f32]) -> Option<u32> {
        let first = (self.vertex_data.len() * std::mem::size_of::<f32>()) as u32;
        let bytes = floats.len() * std::mem::size_of::<f32>();
        if first as usize + bytes > VERTEX_BUFFER_SIZE as usize {
            log::error!("draw2d: vertex buffer overflow, dropping draw");
            return None;
        }
        self.vertex_data.extend_from_slice(floats);
        Some(first)
    }

    pub fn draw_points(&mut self, points: &[Vec2f], blend: BlendMode) {
        if points.is_empty() {
            return;
        }
        let mut verts = Vec::with_capacity(points.len() * 2);
        for p in points {
            verts.push(0.5 + p.x);
            verts.push(0.5 + p.y);
        }
        if let Some(first) = self.push_draw_vertices(&verts) {
            self.commands.push(RenderCommand::DrawPoints(DrawData {
                first,
                count: points.len() as u32,
                texture: None,
                blend,
            }));
        }
    }

    /// Queue a joined run of line segments through all the given points
    pub fn draw_lines(&mut self, points: &[Vec2f], blend: BlendMode) {
        if points.len() < 2 {
            return;
        }
        let mut verts = Vec::with_capacity(points.len() * 2);
        for p in points {
            verts.push(0.5 + p.x);
            verts.push(0.5 + p.y);
        }
        if let Some(first) = self.push_draw_vertices(&verts) {
            self.commands.push(RenderCommand::DrawLines(DrawData {
                first,
                count: points.len() as u32,
                texture: None,
                blend,
            }));
        }
    }

    /// Queue a single two-point segment; adjacent segments with the same blend
    /// mode are merged into one draw
    pub fn draw_line(&mut self, start: Vec2f, end: Vec2f, blend: BlendMode) {
        self.draw_lines(&[start, end], blend);
    }

    /// Queue triangle geometry with per-vertex colours, optionally textured and
    /// indexed. Colours are linearized and scaled the same way draw colours are.
    pub fn geometry(
        &mut self,
        texture: Option<&Texture2d>,
        positions: &[Vec2f],
        colors: &[Vec4f],
        uvs: &[Vec2f],
        indices: Option<&[u16]>,
        blend: BlendMode,
    ) {
        let count = indices.map(|i| i.len()).unwrap_or(positions.len());
        if count == 0 {
            return;
        }
        let floats_per_vertex = if texture.is_some() { 8 } else { 6 };
        let mut verts = Vec::with_capacity(count * floats_per_vertex);
        for i in 0..count {
            let j = match indices {
                Some(indices) => indices[i] as usize,
                None => i,
            };
            verts.push(positions[j].x);
            verts.push(positions[j].y);

            let color = self.convert_color(colors[j]);
            verts.push(color.x);
            verts.push(color.y);
            verts.push(color.z);
            verts.push(colors[j].w);

            if let Some(texture) = texture {
                verts.push(uvs[j].x * texture.inner.width as f32);
                verts.push(uvs[j].y * texture.inner.height as f32);
            }
        }
        if let Some(first) = self.push_draw_vertices(&verts) {
            self.commands.push(RenderCommand::Geometry(DrawData {
                first,
                count: count as u32,
                texture: texture.cloned(),
                blend,
            }));
        }
    }

    /// Route subsequent draws into a target texture instead of the swapchain
    pub fn set_render_target(&mut self, target: Option<&Texture2d>) {
        if let Some(target) = target {
            if target.inner.access != TextureAccess::Target {
                log::error!("draw2d: texture was not created with TextureAccess::Target");
                return;
            }
        }
        self.state.render_target = target.cloned();
    }

    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: gfx::TextureFormat,
        access: TextureAccess,
    ) -> Result<Texture2d, Error> {
        if !matches!(
            format,
            gfx::TextureFormat::B8G8R8A8 | gfx::TextureFormat::R8G8B8A8
        ) {
            return Err(Error::new(format!(
                "draw2d: texture format {:?} not supported",
                format
            )));
        }

        let mut usage = gfx::TextureUsage::SAMPLER;
        if access == TextureAccess::Target {
            usage |= gfx::TextureUsage::COLOR_TARGET;
        }

        let texture = self.device.create_texture(&gfx::TextureInfo {
            texture_type: gfx::TextureType::Texture2D,
            format,
            width,
            height,
            depth: 1,
            layer_count: 1,
            level_count: 1,
            sample_count: gfx::SampleCount::One,
            usage,
        })?;

        let pitch = width as usize * format.texel_block_size() as usize;
        let pixels = if access == TextureAccess::Streaming {
            vec![0u8; pitch * height as usize]
        } else {
            Vec::new()
        };

        Ok(Texture2d {
            inner: Rc::new(Texture2dInner {
                texture,
                width,
                height,
                format,
                fragment_shader: FragmentShaderId::TextureRgba,
                access,
                scale_mode: Cell::new(ScaleMode::Nearest),
                address_mode: Cell::new(AddressMode::Clamp),
                pixels: RefCell::new(pixels),
                pitch,
                locked_rect: Cell::new(os::Rect {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 0,
                }),
            }),
        })
    }

    /// Upload pixels into a region of a texture. A single-use transfer buffer of
    /// exactly the region's size stages the copy.
    pub fn update_texture(
        &mut self,
        texture: &Texture2d,
        rect: os::Rect<i32>,
        pixels: &[u8],
        pitch: usize,
    ) -> Result<(), Error> {
        let bpp = texture.inner.format.texel_block_size() as usize;
        let row_size = bpp * rect.width as usize;
        let data_size = row_size * rect.height as usize;

        let transfer_buffer = self.device.create_transfer_buffer(&gfx::TransferBufferInfo {
            usage: gfx::TransferBufferUsage::Upload,
            size: data_size as u32,
        })?;

        let output = self.device.map_transfer_buffer(&transfer_buffer, false);
        if output.is_null() {
            return Err(Error::new("draw2d: could not map texture transfer buffer"));
        }
        unsafe {
            if pitch == row_size {
                std::ptr::copy_nonoverlapping(pixels.as_ptr(), output, data_size);
            } else {
                let mut output = output;
                let mut input = pixels.as_ptr();
                for _ in 0..rect.height {
                    std::ptr::copy_nonoverlapping(input, output, row_size);
                    output = output.add(row_size);
                    input = input.add(pitch);
                }
            }
        }
        self.device.unmap_transfer_buffer(&transfer_buffer);

        let copy_pass = self.state.command_buffer.begin_copy_pass()?;
        copy_pass.upload_to_texture(
            &gfx::TextureTransferInfo {
                transfer_buffer,
                offset: 0,
                image_pitch: rect.width as u32,
                image_height: rect.height as u32,
            },
            &gfx::TextureRegion {
                texture_slice: gfx::TextureSlice {
                    texture: texture.inner.texture.clone(),
                    mip_level: 0,
                    layer: 0,
                },
                x: rect.x as u32,
                y: rect.y as u32,
                z: 0,
                w: rect.width as u32,
                h: rect.height as u32,
                d: 1,
            },
            true,
        );
        copy_pass.end();
        Ok(())
    }

    /// Borrow a region of a streaming texture's host shadow for writing
    pub fn lock_texture(
        &mut self,
        texture: &Texture2d,
        rect: os::Rect<i32>,
    ) -> Result<(*mut u8, usize), Error> {
        if texture.inner.access != TextureAccess::Streaming {
            return Err(Error::new("draw2d: only streaming textures can be locked"));
        }
        texture.inner.locked_rect.set(rect);
        let bpp = texture.inner.format.texel_block_size() as usize;
        let mut pixels = texture.inner.pixels.borrow_mut();
        let offset = rect.y as usize * texture.inner.pitch + rect.x as usize * bpp;
        Ok((
            unsafe { pixels.as_mut_ptr().add(offset) },
            texture.inner.pitch,
        ))
    }

    /// Push the locked region of a streaming texture's shadow to the gpu
    pub fn unlock_texture(&mut self, texture: &Texture2d) -> Result<(), Error> {
        if texture.inner.access != TextureAccess::Streaming {
            return Err(Error::new("draw2d: only streaming textures can be locked"));
        }
        let rect = texture.inner.locked_rect.get();
        let bpp = texture.inner.format.texel_block_size() as usize;
        let offset = rect.y as usize * texture.inner.pitch + rect.x as usize * bpp;
        let pitch = texture.inner.pitch;
        let pixels = texture.inner.pixels.borrow();
        let slice = pixels[offset..].to_vec();
        drop(pixels);
        self.update_texture(texture, rect, &slice, pitch)
    }

    fn restart_render_pass(&mut self) -> Result<(), Error> {
        if let Some(pass) = self.state.render_pass.take() {
            pass.end();
        }

        let target = match &self.state.render_target {
            Some(target) => target.inner.texture.clone(),
            None => match &self.swapchain.texture {
                Some(texture) => texture.clone(),
                None => return Err(Error::new("draw2d: render target texture is missing")),
            },
        };

        let pass = self.state.command_buffer.begin_render_pass(
            &[gfx::ColorAttachmentInfo {
                texture_slice: gfx::TextureSlice {
                    texture: target,
                    mip_level: 0,
                    layer: 0,
                },
                clear_color: self.state.clear_color,
                load_op: self.state.load_op,
                store_op: gfx::StoreOp::Store,
                cycle: false,
            }],
            None,
        )?;

        if self.state.viewport.width > 0.0 && self.state.viewport.height > 0.0 {
            pass.set_viewport(&self.state.viewport);
        }
        if self.state.scissor_enabled {
            pass.set_scissor(&self.state.scissor);
        }

        // a clear only applies to the pass that opens after it
        self.state.load_op = gfx::LoadOp::Load;
        self.state.render_pass = Some(pass);
        Ok(())
    }

    fn push_uniforms(&self, texture: Option<&Texture2d>) {
        let w = self.state.viewport.width;
        let h = self.state.viewport.height;
        let mut uniforms = ShaderUniformData {
            mvp: [[0.0; 4]; 4],
            color: [
                self.state.draw_color.x,
                self.state.draw_color.y,
                self.state.draw_color.z,
                self.state.draw_color.w,
            ],
            texture_size: [0.0, 0.0],
            padding: [0.0, 0.0],
        };
        uniforms.mvp[0][0] = 2.0 / w;
        uniforms.mvp[1][1] = -2.0 / h;
        uniforms.mvp[2][2] = 1.0;
        uniforms.mvp[3][0] = -1.0;
        uniforms.mvp[3][1] = 1.0;
        uniforms.mvp[3][3] = 1.0;

        if let Some(texture) = texture {
            uniforms.texture_size = [texture.inner.width as f32, texture.inner.height as f32];
        }

        self.state
            .command_buffer
            .push_vertex_uniform_data(0, as_u8_slice(&uniforms));
    }

    fn pipeline_for(&mut self, key: PipelineKey) -> Result<&gfx::GraphicsPipeline, Error> {
        if !self.pipeline_cache.contains_key(&key) {
            let vertex_shader = self.shaders.vertex(key.vertex_shader);
            let fragment_shader = self.shaders.fragment(key.fragment_shader);

            let float_size = std::mem::size_of::<f32>() as u32;
            let (stride, attributes) = match key.vertex_shader {
                VertexShaderId::LinePoint => (
                    2 * float_size,
                    vec![gfx::VertexAttribute {
                        location: 0,
                        binding: 0,
                        format: gfx::VertexElementFormat::Vector2,
                        offset: 0,
                    }],
                ),
                VertexShaderId::TriColor => (
                    6 * float_size,
                    vec![
                        gfx::VertexAttribute {
                            location: 0,
                            binding: 0,
                            format: gfx::VertexElementFormat::Vector2,
                            offset: 0,
                        },
                        gfx::VertexAttribute {
                            location: 1,
                            binding: 0,
                            format: gfx::VertexElementFormat::Vector4,
                            offset: 2 * float_size,
                        },
                    ],
                ),
                VertexShaderId::TriTexture => (
                    8 * float_size,
                    vec![
                        gfx::VertexAttribute {
                            location: 0,
                            binding: 0,
                            format: gfx::VertexElementFormat::Vector2,
                            offset: 0,
                        },
                        gfx::VertexAttribute {
                            location: 1,
                            binding: 0,
                            format: gfx::VertexElementFormat::Vector4,
                            offset: 2 * float_size,
                        },
                        gfx::VertexAttribute {
                            location: 2,
                            binding: 0,
                            format: gfx::VertexElementFormat::Vector2,
                            offset: 6 * float_size,
                        },
                    ],
                ),
            };

            let pipeline = self.device.create_graphics_pipeline(&gfx::GraphicsPipelineInfo {
                vertex_shader,
                fragment_shader,
                vertex_input_state: gfx::VertexInputState {
                    vertex_bindings: vec![gfx::VertexBinding {
                        binding: 0,
                        stride,
                        input_rate: gfx::VertexInputRate::Vertex,
                        step_rate: 0,
                    }],
                    vertex_attributes: attributes,
                },
                primitive_type: key.primitive_type,
                rasterizer_state: gfx::RasterizerState::default(),
                multisample_state: gfx::MultisampleState::default(),
                depth_stencil_state: gfx::DepthStencilState::default(),
                blend_constants: [0.0; 4],
                attachment_info: gfx::AttachmentInfo {
                    color_attachment_descriptions: vec![gfx::ColorAttachmentDescription {
                        format: key.attachment_format,
                        blend_state: key.blend_mode.blend_state(),
                    }],
                    depth_stencil_format: None,
                },
            })?;
            self.pipeline_cache.insert(key, pipeline);
        }
        Ok(&self.pipeline_cache[&key])
    }

    fn draw(
        &mut self,
        data: &DrawData,
        count: u32,
        primitive_type: gfx::PrimitiveType,
    ) -> Result<(), Error> {
        if self.state.render_pass.is_none() {
            self.restart_render_pass()?;
        }

        let (vertex_shader, fragment_shader) = if primitive_type == gfx::PrimitiveType::TriangleList
        {
            match &data.texture {
                Some(texture) => (VertexShaderId::TriTexture, texture.inner.fragment_shader),
                None => (VertexShaderId::TriColor, FragmentShaderId::Color),
            }
        } else {
            (VertexShaderId::LinePoint, FragmentShaderId::Color)
        };

        let attachment_format = match &self.state.render_target {
            Some(target) => target.inner.format,
            None => self.swapchain.format,
        };

        let key = PipelineKey {
            blend_mode: data.blend,
            vertex_shader,
            fragment_shader,
            primitive_type,
            attachment_format,
        };
        let pipeline = self.pipeline_for(key)?.clone();

        let pass = match &self.state.render_pass {
            Some(pass) => pass,
            None => return Err(Error::new("draw2d: no render pass")),
        };

        pass.bind_graphics_pipeline(&pipeline);

        if let Some(texture) = &data.texture {
            let sampler = self
                .sampler_for(texture.inner.scale_mode.get(), texture.inner.address_mode.get())
                .clone();
            pass.bind_fragment_samplers(
                0,
                &[gfx::TextureSamplerBinding {
                    texture: texture.inner.texture.clone(),
                    sampler,
                }],
            );
        }

        pass.bind_vertex_buffers(
            0,
            &[gfx::BufferBinding {
                buffer: self.vertex_buffer.clone(),
                offset: data.first,
            }],
        );

        self.push_uniforms(data.texture.as_ref());

        let primitive_count = match primitive_type {
            gfx::PrimitiveType::PointList => count,
            gfx::PrimitiveType::LineList => count / 2,
            gfx::PrimitiveType::LineStrip => count - 1,
            gfx::PrimitiveType::TriangleList => count / 3,
            gfx::PrimitiveType::TriangleStrip => count.saturating_sub(2),
        };

        if let Some(pass) = &self.state.render_pass {
            pass.draw_primitives(0, primitive_count);
        }
        Ok(())
    }

    fn upload_vertices(&mut self) -> Result<(), Error> {
        if self.vertex_data.is_empty() {
            return Ok(());
        }
        let byte_len = self.vertex_data.len() * std::mem::size_of::<f32>();

        let staging = self
            .device
            .map_transfer_buffer(&self.vertex_transfer_buffer, true);
        if staging.is_null() {
            return Err(Error::new("draw2d: could not map vertex transfer buffer"));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.vertex_data.as_ptr() as *const u8,
                staging,
                byte_len,
            );
        }
        self.device.unmap_transfer_buffer(&self.vertex_transfer_buffer);

        let pass = self.state.command_buffer.begin_copy_pass()?;
        pass.upload_to_buffer(
            &gfx::TransferBufferLocation {
                transfer_buffer: self.vertex_transfer_buffer.clone(),
                offset: 0,
            },
            &gfx::BufferRegion {
                buffer: self.vertex_buffer.clone(),
                offset: 0,
                size: byte_len as u32,
            },
            true,
        );
        pass.end();
        Ok(())
    }

    fn run_command_queue(&mut self) -> Result<(), Error> {
        self.upload_vertices()?;

        self.state.load_op = gfx::LoadOp::Load;

        if self.state.render_target.is_none() && self.swapchain.texture.is_none() {
            self.commands.clear();
            self.vertex_data.clear();
            return Err(Error::new("draw2d: render target texture is missing"));
        }

        let commands = std::mem::take(&mut self.commands);
        let mut i = 0;
        while i < commands.len() {
            match &commands[i] {
                RenderCommand::SetDrawColor { color } => {
                    self.state.draw_color = *color;
                }

                RenderCommand::SetViewport { viewport } => {
                    self.state.viewport = *viewport;
                    if viewport.width > 0.0 && viewport.height > 0.0 {
                        if let Some(pass) = &self.state.render_pass {
                            pass.set_viewport(viewport);
                        }
                    }
                }

                RenderCommand::SetClipRect { rect, enabled } => {
                    self.state.scissor = *rect;
                    self.state.scissor_enabled = *enabled;
                    if *enabled {
                        if let Some(pass) = &self.state.render_pass {
                            pass.set_scissor(rect);
                        }
                    }
                }

                RenderCommand::Clear { color } => {
                    self.state.clear_color = gfx::Color {
                        r: color.x,
                        g: color.y,
                        b: color.z,
                        a: color.w,
                    };
                    self.state.load_op = gfx::LoadOp::Clear;
                    // the load op only applies at pass begin, restart so the
                    // clear takes effect now
                    if self.state.render_pass.is_some() {
                        self.restart_render_pass()?;
                    }
                }

                RenderCommand::DrawLines(data) => {
                    if data.count > 2 {
                        // joined lines cannot be grouped
                        self.draw(data, data.count, gfx::PrimitiveType::LineStrip)?;
                    } else {
                        // group adjacent non joined segments with the same blend mode
                        let mut count = data.count;
                        let mut last = i;
                        for (j, next) in commands.iter().enumerate().skip(i + 1) {
                            match next {
                                RenderCommand::DrawLines(next)
                                    if next.count == 2 && next.blend == data.blend =>
                                {
                                    count += next.count;
                                    last = j;
                                }
                                _ => break,
                            }
                        }
                        self.draw(data, count, gfx::PrimitiveType::LineList)?;
                        i = last;
                    }
                }

                RenderCommand::DrawPoints(data) | RenderCommand::Geometry(data) => {
                    // runs of the same command with the same texture and blend
                    // mode combine into a single draw call
                    let is_points = matches!(&commands[i], RenderCommand::DrawPoints(_));
                    let mut count = data.count;
                    let mut last = i;
                    for (j, next) in commands.iter().enumerate().skip(i + 1) {
                        let next = match (is_points, next) {
                            (true, RenderCommand::DrawPoints(next)) => next,
                            (false, RenderCommand::Geometry(next)) => next,
                            _ => break,
                        };
                        let same_texture = match (&data.texture, &next.texture) {
                            (None, None) => true,
                            (Some(a), Some(b)) => Rc::ptr_eq(&a.inner, &b.inner),
                            _ => false,
                        };
                        if !same_texture || next.blend != data.blend {
                            break;
                        }
                        count += next.count;
                        last = j;
                    }

                    let primitive_type = if is_points {
                        gfx::PrimitiveType::PointList
                    } else {
                        gfx::PrimitiveType::TriangleList
                    };
                    self.draw(data, count, primitive_type)?;
                    i = last;
                }

                RenderCommand::NoOp => {}
            }
            i += 1;
        }

        // a trailing clear with no draws after it still needs a pass to land in
        if self.state.load_op == gfx::LoadOp::Clear && self.state.render_pass.is_none() {
            self.restart_render_pass()?;
        }

        if let Some(pass) = self.state.render_pass.take() {
            pass.end();
        }

        self.vertex_data.clear();
        Ok(())
    }

    fn renew_swapchain(&mut self) {
        self.swapchain.texture = None;
        if let Some((texture, width, height)) = self
            .state
            .command_buffer
            .acquire_swapchain_texture(self.window.as_ref())
        {
            self.swapchain.width = width;
            self.swapchain.height = height;
            self.swapchain.texture = Some(texture);
            if let Ok(format) = self.device.swapchain_texture_format(self.window.as_ref()) {
                self.swapchain.format = format;
            }
        }
    }

    /// Flush the queued frame, present it, and rotate the per-frame fence pair:
    /// the fence acquired for this submission is waited on and released at the
    /// start of the frame after next.
    pub fn present(&mut self) -> Result<(), Error> {
        let run_result = self.run_command_queue();

        let next_fence = self.state.command_buffer.submit_and_acquire_fence()?;

        if let Some(previous) = self.present_fence.take() {
            self.device.wait_for_fences(true, &[&previous]);
            self.device.release_fence(previous);
        }
        self.present_fence = Some(next_fence);

        self.state.command_buffer = self.device.acquire_command_buffer()?;
        self.renew_swapchain();

        run_result
    }
}

impl Drop for Renderer2d {
    fn drop(&mut self) {
        if let Some(fence) = self.present_fence.take() {
            self.device.wait_for_fences(true, &[&fence]);
            self.device.release_fence(fence);
        }
        if let Some(pass) = self.state.render_pass.take() {
            pass.end();
        }
        self.state.command_buffer.submit();
        self.device.unclaim_window(self.window.as_ref());
    }
}
