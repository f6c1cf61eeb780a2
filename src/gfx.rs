/// Implements the portable interface with a Direct3d12 backend
pub mod d3d12;

/// Implements the portable interface with a no-op bookkeeping backend
pub mod null;

use crate::os;
use crate::Error;

use serde::{Deserialize, Serialize};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Maximum number of colour attachments a render pass may bind.
pub const MAX_COLOR_TARGET_BINDINGS: usize = 4;

/// Maximum number of read-write storage textures a compute pass may bind.
pub const MAX_COMPUTE_WRITE_TEXTURES: u32 = 8;

/// Maximum number of read-write storage buffers a compute pass may bind.
pub const MAX_COMPUTE_WRITE_BUFFERS: u32 = 8;

bitflags! {
    /// Shader blob formats a backend can consume. A backend is only selectable when
    /// at least one of its advertised formats was requested at device creation.
    pub struct ShaderFormat: u32 {
        const SECRET = 1 << 0;
        const SPIRV = 1 << 1;
        const DXBC = 1 << 2;
        const DXIL = 1 << 3;
        const MSL = 1 << 4;
        const METALLIB = 1 << 5;
        /// HLSL source text, compiled by the backend at shader-create time
        const HLSL = 1 << 6;
    }

    /// Ways a texture may be used on the GPU
    pub struct TextureUsage: u32 {
        const SAMPLER = 1 << 0;
        const COLOR_TARGET = 1 << 1;
        const DEPTH_STENCIL_TARGET = 1 << 2;
        const GRAPHICS_STORAGE_READ = 1 << 3;
        const COMPUTE_STORAGE_READ = 1 << 4;
        const COMPUTE_STORAGE_WRITE = 1 << 5;
    }

    /// Ways a device buffer may be used on the GPU
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const INDIRECT = 1 << 3;
        const GRAPHICS_STORAGE_READ = 1 << 4;
        const COMPUTE_STORAGE_READ = 1 << 5;
        const COMPUTE_STORAGE_WRITE = 1 << 6;
    }

    /// Channels written by a colour attachment
    pub struct ColorComponentFlags: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const ALL = Self::R.bits | Self::G.bits | Self::B.bits | Self::A.bits;
    }
}

/// Identifies which compiled-in backend a device runs on
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DriverId {
    D3d12,
    Null,
}

/// Format for texture resources
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum TextureFormat {
    Invalid,
    R8G8B8A8,
    B8G8R8A8,
    B5G6R5,
    B5G5R5A1,
    B4G4R4A4,
    R10G10B10A2,
    R16G16,
    R16G16B16A16,
    R8,
    A8,
    Bc1,
    Bc2,
    Bc3,
    Bc7,
    R8G8Snorm,
    R8G8B8A8Snorm,
    R16Sfloat,
    R16G16Sfloat,
    R16G16B16A16Sfloat,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32A32Sfloat,
    R8Uint,
    R8G8Uint,
    R8G8B8A8Uint,
    R16Uint,
    R16G16Uint,
    R16G16B16A16Uint,
    R8G8B8A8Srgb,
    B8G8R8A8Srgb,
    Bc3Srgb,
    Bc7Srgb,
    D16Unorm,
    D24Unorm,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

impl TextureFormat {
    /// Returns the byte size of one texel block for this format
    pub fn texel_block_size(&self) -> u32 {
        match self {
            TextureFormat::Bc1 => 8,
            TextureFormat::Bc2
            | TextureFormat::Bc3
            | TextureFormat::Bc7
            | TextureFormat::Bc3Srgb
            | TextureFormat::Bc7Srgb => 16,
            TextureFormat::R8 | TextureFormat::A8 | TextureFormat::R8Uint => 1,
            TextureFormat::B5G6R5
            | TextureFormat::B4G4R4A4
            | TextureFormat::B5G5R5A1
            | TextureFormat::R16Sfloat
            | TextureFormat::R8G8Snorm
            | TextureFormat::R8G8Uint
            | TextureFormat::R16Uint => 2,
            TextureFormat::R8G8B8A8
            | TextureFormat::B8G8R8A8
            | TextureFormat::R8G8B8A8Srgb
            | TextureFormat::B8G8R8A8Srgb
            | TextureFormat::R32Sfloat
            | TextureFormat::R16G16
            | TextureFormat::R16G16Sfloat
            | TextureFormat::R8G8B8A8Snorm
            | TextureFormat::R10G10B10A2
            | TextureFormat::R8G8B8A8Uint
            | TextureFormat::R16G16Uint => 4,
            TextureFormat::R16G16B16A16Sfloat
            | TextureFormat::R16G16B16A16
            | TextureFormat::R32G32Sfloat
            | TextureFormat::R16G16B16A16Uint => 8,
            TextureFormat::R32G32B32A32Sfloat => 16,
            _ => {
                log::error!("gfx: unrecognized texture format {:?}", self);
                0
            }
        }
    }

    /// Returns true for unsigned integer formats, which cannot be sampled
    pub fn is_integer_format(&self) -> bool {
        matches!(
            self,
            TextureFormat::R8Uint
                | TextureFormat::R8G8Uint
                | TextureFormat::R8G8B8A8Uint
                | TextureFormat::R16Uint
                | TextureFormat::R16G16Uint
                | TextureFormat::R16G16B16A16Uint
        )
    }

    /// Returns true for depth and depth-stencil formats
    pub fn is_depth_format(&self) -> bool {
        matches!(
            self,
            TextureFormat::D16Unorm
                | TextureFormat::D24Unorm
                | TextureFormat::D32Sfloat
                | TextureFormat::D24UnormS8Uint
                | TextureFormat::D32SfloatS8Uint
        )
    }
}

/// Dimensionality of a texture
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TextureType {
    Texture2D,
    Texture2DArray,
    Cube,
    Texture3D,
}

/// Direction of a transfer buffer
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TransferBufferUsage {
    Upload,
    Download,
}

/// The stage to which a shader blob binds itself
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Primitive topology for draw calls
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

/// Multisample counts supported by render targets
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum SampleCount {
    One,
    Two,
    Four,
    Eight,
}

impl SampleCount {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleCount::One => 1,
            SampleCount::Two => 2,
            SampleCount::Four => 4,
            SampleCount::Eight => 8,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

/// Source and destination factors for colour and alpha blending. In the D3D12
/// backend the colour-channel and alpha-channel native mappings differ for the
/// colour-valued enumerants; both tables live with that backend.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FillMode {
    Fill,
    Line,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// Format of a single vertex attribute
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VertexElementFormat {
    Uint,
    Float,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Byte4,
    Short2,
    Short4,
    NormalizedShort2,
    NormalizedShort4,
    HalfVector2,
    HalfVector4,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SamplerAddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IndexElementSize {
    U16,
    U32,
}

/// The action applied to an attachment at render-pass begin
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PresentMode {
    Immediate,
    Vsync,
    Mailbox,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SwapchainComposition {
    Sdr,
    /// SDR with an sRGB render-target view over the same swapchain storage
    SdrLinear,
    Hdr,
    HdrAdvanced,
}

/// An rgba colour with floating point channels
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Structure to specify viewport coordinates on a render pass.
#[derive(Copy, Clone, Debug)]
pub struct Viewport {
    /// Top left x coordinate.
    pub x: f32,
    /// Top left y coordinate.
    pub y: f32,
    /// Width of the viewport rectangle.
    pub width: f32,
    /// Height of the viewport rectangle (Y is down).
    pub height: f32,
    /// Minimum depth of the viewport. Ranges between 0 and 1.
    pub min_depth: f32,
    /// Maximum depth of the viewport. Ranges between 0 and 1.
    pub max_depth: f32,
}

/// Structure to specify scissor rect coordinates on a render pass.
#[derive(Copy, Clone, Debug)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<os::Rect<i32>> for Viewport {
    fn from(rect: os::Rect<i32>) -> Viewport {
        Viewport {
            x: rect.x as f32,
            y: rect.y as f32,
            width: rect.width as f32,
            height: rect.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl From<os::Rect<i32>> for ScissorRect {
    fn from(rect: os::Rect<i32>) -> ScissorRect {
        ScissorRect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Information to create a texture through `Device::create_texture`
#[derive(Clone, Debug)]
pub struct TextureInfo {
    pub texture_type: TextureType,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub level_count: u32,
    pub sample_count: SampleCount,
    pub usage: TextureUsage,
}

impl Default for TextureInfo {
    fn default() -> Self {
        TextureInfo {
            texture_type: TextureType::Texture2D,
            format: TextureFormat::R8G8B8A8,
            width: 1,
            height: 1,
            depth: 1,
            layer_count: 1,
            level_count: 1,
            sample_count: SampleCount::One,
            usage: TextureUsage::SAMPLER,
        }
    }
}

/// Information to create a device buffer
#[derive(Clone, Copy, Debug)]
pub struct BufferInfo {
    pub usage: BufferUsage,
    pub size: u32,
}

/// Information to create a host-visible transfer buffer
#[derive(Clone, Copy, Debug)]
pub struct TransferBufferInfo {
    pub usage: TransferBufferUsage,
    pub size: u32,
}

/// Information to create an immutable sampler
#[derive(Clone, Copy, Debug)]
pub struct SamplerInfo {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub anisotropy_enable: bool,
    pub max_anisotropy: u32,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        SamplerInfo {
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            anisotropy_enable: false,
            max_anisotropy: 0,
            min_lod: 0.0,
            max_lod: 1000.0,
        }
    }
}

/// Information to create a shader. The resource counts declare how many descriptors
/// of each category the stage expects; they participate in root-signature layout.
#[derive(Clone)]
pub struct ShaderInfo<'a> {
    pub code: &'a [u8],
    pub entry_point: &'a str,
    pub format: ShaderFormat,
    pub stage: ShaderStage,
    pub sampler_count: u32,
    pub storage_texture_count: u32,
    pub storage_buffer_count: u32,
    pub uniform_buffer_count: u32,
}

/// Describes a buffer slot consumed by the input assembler
#[derive(Clone, Copy, Debug)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub step_rate: u32,
}

/// Describes one vertex attribute within a binding
#[derive(Clone, Copy, Debug)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexElementFormat,
    pub offset: u32,
}

#[derive(Clone, Default, Debug)]
pub struct VertexInputState {
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Copy, Debug)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        RasterizerState {
            fill_mode: FillMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MultisampleState {
    pub multisample_count: SampleCount,
    pub sample_mask: u32,
}

impl Default for MultisampleState {
    fn default() -> Self {
        MultisampleState {
            multisample_count: SampleCount::One,
            sample_mask: u32::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
}

impl Default for StencilOpState {
    fn default() -> Self {
        StencilOpState {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub compare_op: CompareOp,
    pub stencil_test_enable: bool,
    pub front_stencil_state: StencilOpState,
    pub back_stencil_state: StencilOpState,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test_enable: false,
            depth_write_enable: false,
            compare_op: CompareOp::Always,
            stencil_test_enable: false,
            front_stencil_state: StencilOpState::default(),
            back_stencil_state: StencilOpState::default(),
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColorAttachmentBlendState {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorComponentFlags,
}

impl Default for ColorAttachmentBlendState {
    fn default() -> Self {
        ColorAttachmentBlendState {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorComponentFlags::ALL,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColorAttachmentDescription {
    pub format: TextureFormat,
    pub blend_state: ColorAttachmentBlendState,
}

#[derive(Clone, Default, Debug)]
pub struct AttachmentInfo {
    pub color_attachment_descriptions: Vec<ColorAttachmentDescription>,
    pub depth_stencil_format: Option<TextureFormat>,
}

/// Information to create a graphics pipeline
#[derive(Clone)]
pub struct GraphicsPipelineInfo<'a> {
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub vertex_input_state: VertexInputState,
    pub primitive_type: PrimitiveType,
    pub rasterizer_state: RasterizerState,
    pub multisample_state: MultisampleState,
    pub depth_stencil_state: DepthStencilState,
    pub blend_constants: [f32; 4],
    pub attachment_info: AttachmentInfo,
}

/// Information to create a compute pipeline
#[derive(Clone)]
pub struct ComputePipelineInfo<'a> {
    pub code: &'a [u8],
    pub entry_point: &'a str,
    pub format: ShaderFormat,
    pub read_only_storage_texture_count: u32,
    pub read_only_storage_buffer_count: u32,
    pub read_write_storage_texture_count: u32,
    pub read_write_storage_buffer_count: u32,
    pub uniform_buffer_count: u32,
    pub thread_count_x: u32,
    pub thread_count_y: u32,
    pub thread_count_z: u32,
}

/// A subresource of a texture: one mip level of one array layer
#[derive(Clone)]
pub struct TextureSlice {
    pub texture: Texture,
    pub mip_level: u32,
    pub layer: u32,
}

/// A texel offset within a texture slice
#[derive(Clone)]
pub struct TextureLocation {
    pub texture_slice: TextureSlice,
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// A texel region within a texture slice
#[derive(Clone)]
pub struct TextureRegion {
    pub texture_slice: TextureSlice,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub w: u32,
    pub h: u32,
    pub d: u32,
}

/// Pixel layout of image data within a transfer buffer
#[derive(Clone)]
pub struct TextureTransferInfo {
    pub transfer_buffer: TransferBuffer,
    pub offset: u32,
    /// Number of pixels per row, 0 meaning tightly packed
    pub image_pitch: u32,
    /// Number of rows per image slice, 0 meaning tightly packed
    pub image_height: u32,
}

#[derive(Clone)]
pub struct TransferBufferLocation {
    pub transfer_buffer: TransferBuffer,
    pub offset: u32,
}

#[derive(Clone)]
pub struct BufferRegion {
    pub buffer: Buffer,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone)]
pub struct BufferLocation {
    pub buffer: Buffer,
    pub offset: u32,
}

/// A vertex or index buffer bound with a byte offset
#[derive(Clone)]
pub struct BufferBinding {
    pub buffer: Buffer,
    pub offset: u32,
}

/// A texture paired with the sampler used to read it
#[derive(Clone)]
pub struct TextureSamplerBinding {
    pub texture: Texture,
    pub sampler: Sampler,
}

#[derive(Clone)]
pub struct StorageTextureReadWriteBinding {
    pub texture_slice: TextureSlice,
    pub cycle: bool,
}

#[derive(Clone)]
pub struct StorageBufferReadWriteBinding {
    pub buffer: Buffer,
    pub cycle: bool,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct DepthStencilValue {
    pub depth: f32,
    pub stencil: u32,
}

/// A colour attachment for `CommandBuffer::begin_render_pass`
#[derive(Clone)]
pub struct ColorAttachmentInfo {
    pub texture_slice: TextureSlice,
    pub clear_color: Color,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub cycle: bool,
}

/// A depth-stencil attachment for `CommandBuffer::begin_render_pass`
#[derive(Clone)]
pub struct DepthStencilAttachmentInfo {
    pub texture_slice: TextureSlice,
    pub depth_stencil_clear_value: DepthStencilValue,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub cycle: bool,
}

/// Utility function to take any sized type and return a u8 slice.
/// This can be useful to pass uniform data to `CommandBuffer::push_vertex_uniform_data`.
pub fn as_u8_slice<T: Sized>(p: &T) -> &[u8] {
    unsafe {
        ::std::slice::from_raw_parts((p as *const T) as *const u8, ::std::mem::size_of::<T>())
    }
}

/// Per-stage descriptor counts carried by shaders into pipelines
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct StageResourceCounts {
    pub samplers: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub storage_textures: u32,
}

// Per-backend resource payloads. One variant per compiled-in backend; the typed
// wrapper structs below are the public handles.

#[derive(Clone)]
pub(crate) enum TextureRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::Texture),
    Null(null::Texture),
}

#[derive(Clone)]
pub(crate) enum BufferRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::Buffer),
    Null(null::Buffer),
}

#[derive(Clone)]
pub(crate) enum TransferBufferRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::TransferBuffer),
    Null(null::TransferBuffer),
}

#[derive(Clone)]
pub(crate) enum SamplerRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::Sampler),
    Null(null::Sampler),
}

#[derive(Clone)]
pub(crate) enum ShaderRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::Shader),
    Null(null::Shader),
}

#[derive(Clone)]
pub(crate) enum GraphicsPipelineRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::GraphicsPipeline),
    Null(null::GraphicsPipeline),
}

#[derive(Clone)]
pub(crate) enum ComputePipelineRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::ComputePipeline),
    Null(null::ComputePipeline),
}

#[derive(Clone)]
pub(crate) enum FenceRes {
    #[cfg(target_os = "windows")]
    D3d12(d3d12::Fence),
    Null(null::Fence),
}

/// A GPU texture. Swapchain back-buffer textures are owned by their claimed window;
/// the handles returned by `acquire_swapchain_texture` are borrowed views that stay
/// valid only while the window remains claimed.
#[derive(Clone)]
pub struct Texture {
    pub(crate) info: TextureInfo,
    pub(crate) res: TextureRes,
}

impl Texture {
    pub fn info(&self) -> &TextureInfo {
        &self.info
    }
}

/// A device-local GPU buffer (vertex, index, uniform, indirect, storage)
#[derive(Clone)]
pub struct Buffer {
    pub(crate) usage: BufferUsage,
    pub(crate) size: u32,
    pub(crate) res: BufferRes,
}

impl Buffer {
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// A host-visible buffer used to stage uploads and downloads
#[derive(Clone)]
pub struct TransferBuffer {
    pub(crate) usage: TransferBufferUsage,
    pub(crate) size: u32,
    pub(crate) res: TransferBufferRes,
}

impl TransferBuffer {
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// An immutable filter / address-mode / anisotropy descriptor
#[derive(Clone)]
pub struct Sampler {
    pub(crate) res: SamplerRes,
}

/// An opaque compiled shader blob tagged by stage and resource counts
#[derive(Clone)]
pub struct Shader {
    pub(crate) stage: ShaderStage,
    pub(crate) counts: StageResourceCounts,
    pub(crate) res: ShaderRes,
}

/// The compiled intersection of shaders and fixed-function state
#[derive(Clone)]
pub struct GraphicsPipeline {
    pub(crate) primitive_type: PrimitiveType,
    pub(crate) vertex_counts: StageResourceCounts,
    pub(crate) fragment_counts: StageResourceCounts,
    pub(crate) res: GraphicsPipelineRes,
}

/// A compute shader plus its root layout
#[derive(Clone)]
pub struct ComputePipeline {
    pub(crate) counts: StageResourceCounts,
    pub(crate) read_write_storage_texture_count: u32,
    pub(crate) read_write_storage_buffer_count: u32,
    pub(crate) res: ComputePipelineRes,
}

/// A monotonically-increasing completion counter used to observe GPU progress
pub struct Fence {
    pub(crate) res: FenceRes,
}

/// Object safe interface implemented once per backend; the public `Device` and
/// `CommandBuffer` wrappers validate and then delegate here. Each backend keeps its
/// single command recorder internally, matching the one-global-command-buffer model.
pub(crate) trait Backend {
    fn as_any(&self) -> &dyn Any;

    // resources
    fn create_texture(&mut self, info: &TextureInfo) -> Result<TextureRes, Error>;
    fn create_buffer(&mut self, info: &BufferInfo) -> Result<BufferRes, Error>;
    fn create_transfer_buffer(&mut self, info: &TransferBufferInfo)
        -> Result<TransferBufferRes, Error>;
    fn create_sampler(&mut self, info: &SamplerInfo) -> Result<SamplerRes, Error>;
    fn create_shader(&mut self, info: &ShaderInfo) -> Result<ShaderRes, Error>;
    fn create_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> Result<GraphicsPipelineRes, Error>;
    fn create_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> Result<ComputePipelineRes, Error>;
    fn set_buffer_name(&mut self, buffer: &Buffer, name: &str);
    fn set_texture_name(&mut self, texture: &Texture, name: &str);

    // feature queries
    fn supports_texture_format(
        &self,
        format: TextureFormat,
        texture_type: TextureType,
        usage: TextureUsage,
    ) -> bool;
    fn get_best_sample_count(
        &self,
        format: TextureFormat,
        desired: SampleCount,
    ) -> SampleCount;

    // command recording
    fn acquire_command_buffer(&mut self) -> Result<(), Error>;
    fn push_uniform_data(&mut self, stage: ShaderStage, slot: u32, data: &[u8]);
    fn begin_render_pass(
        &mut self,
        color_attachments: &[ColorAttachmentInfo],
        depth_stencil_attachment: Option<&DepthStencilAttachmentInfo>,
    );
    fn end_render_pass(&mut self);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, scissor: &ScissorRect);
    fn bind_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline);
    fn bind_vertex_buffers(&mut self, first_binding: u32, bindings: &[BufferBinding]);
    fn bind_index_buffer(&mut self, binding: &BufferBinding, index_element_size: IndexElementSize);
    fn bind_samplers(
        &mut self,
        stage: ShaderStage,
        first_slot: u32,
        bindings: &[TextureSamplerBinding],
    );
    fn bind_storage_textures(&mut self, stage: ShaderStage, first_slot: u32, slices: &[TextureSlice]);
    fn bind_storage_buffers(&mut self, stage: ShaderStage, first_slot: u32, buffers: &[Buffer]);
    fn draw_primitives(&mut self, vertex_start: u32, primitive_count: u32);
    fn draw_indexed_primitives(
        &mut self,
        base_vertex: u32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
    );
    fn draw_primitives_indirect(&mut self, buffer: &Buffer, offset: u32, draw_count: u32, stride: u32);
    fn draw_indexed_primitives_indirect(
        &mut self,
        buffer: &Buffer,
        offset: u32,
        draw_count: u32,
        stride: u32,
    );
    fn begin_compute_pass(
        &mut self,
        storage_texture_bindings: &[StorageTextureReadWriteBinding],
        storage_buffer_bindings: &[StorageBufferReadWriteBinding],
    );
    fn end_compute_pass(&mut self);
    fn bind_compute_pipeline(&mut self, pipeline: &ComputePipeline);
    fn bind_compute_storage_textures(&mut self, first_slot: u32, slices: &[TextureSlice]);
    fn bind_compute_storage_buffers(&mut self, first_slot: u32, buffers: &[Buffer]);
    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);
    fn dispatch_compute_indirect(&mut self, buffer: &Buffer, offset: u32);
    fn begin_copy_pass(&mut self);
    fn end_copy_pass(&mut self);
    fn upload_to_texture(&mut self, source: &TextureTransferInfo, destination: &TextureRegion, cycle: bool);
    fn upload_to_buffer(&mut self, source: &TransferBufferLocation, destination: &BufferRegion, cycle: bool);
    fn copy_texture_to_texture(
        &mut self,
        source: &TextureLocation,
        destination: &TextureLocation,
        w: u32,
        h: u32,
        d: u32,
        cycle: bool,
    );
    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferLocation,
        destination: &BufferLocation,
        size: u32,
        cycle: bool,
    );
    fn generate_mipmaps(&mut self, texture: &Texture);
    fn download_from_texture(&mut self, source: &TextureRegion, destination: &TextureTransferInfo);
    fn download_from_buffer(&mut self, source: &BufferRegion, destination: &TransferBufferLocation);
    fn blit(&mut self, source: &TextureRegion, destination: &TextureRegion, filter: Filter, cycle: bool);
    fn insert_debug_label(&mut self, text: &str);
    fn push_debug_group(&mut self, name: &str);
    fn pop_debug_group(&mut self);

    // transfer buffer mapping
    fn map_transfer_buffer(&mut self, buffer: &TransferBuffer, cycle: bool) -> *mut u8;
    fn unmap_transfer_buffer(&mut self, buffer: &TransferBuffer);

    // swapchain
    fn supports_swapchain_composition(
        &self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
    ) -> bool;
    fn supports_present_mode(&self, window: &dyn os::Window, present_mode: PresentMode) -> bool;
    fn claim_window(
        &mut self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> Result<(), Error>;
    fn unclaim_window(&mut self, window: &dyn os::Window);
    fn set_swapchain_parameters(
        &mut self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> Result<(), Error>;
    fn swapchain_texture_format(&self, window: &dyn os::Window) -> Result<TextureFormat, Error>;
    fn acquire_swapchain_texture(&mut self, window: &dyn os::Window) -> Option<(Texture, u32, u32)>;

    // submission and synchronisation
    fn submit(&mut self);
    fn submit_and_acquire_fence(&mut self) -> Result<FenceRes, Error>;
    fn wait(&mut self);
    fn wait_for_fences(&mut self, wait_all: bool, fences: &[&Fence]);
    fn query_fence(&self, fence: &Fence) -> bool;
    fn release_fence(&mut self, fence: &Fence);

    fn destroy(&mut self);
}

/// One registry row per compiled-in backend, in priority order. A backend whose
/// `exposed_by_default` flag is false is implemented but unselected: it only
/// participates in selection when named explicitly.
struct Bootstrap {
    name: &'static str,
    id: DriverId,
    shader_formats: ShaderFormat,
    exposed_by_default: bool,
    prepare: fn() -> bool,
    create: fn(&DeviceInfo) -> Result<Box<dyn Backend>, Error>,
}

fn bootstraps() -> Vec<Bootstrap> {
    vec![
        #[cfg(target_os = "windows")]
        Bootstrap {
            name: "D3D12",
            id: DriverId::D3d12,
            shader_formats: ShaderFormat::DXBC | ShaderFormat::HLSL,
            // D3D12 support is still maturing, opt in by name
            exposed_by_default: false,
            prepare: d3d12::prepare,
            create: d3d12::create_backend,
        },
        Bootstrap {
            name: "null",
            id: DriverId::Null,
            shader_formats: ShaderFormat::all(),
            exposed_by_default: true,
            prepare: null::prepare,
            create: null::create_backend,
        },
    ]
}

/// Recognized options for device creation
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    /// Shader blob formats the caller can supply; a backend must advertise at
    /// least one of them to be selectable
    pub shader_formats: ShaderFormat,
    /// Enables argument and state validation on every public entry point
    pub debug_mode: bool,
    /// Prefer an integrated adapter over a discrete one
    pub prefer_low_power: bool,
    /// Force a backend by registry name
    pub driver: Option<String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        DeviceInfo {
            shader_formats: ShaderFormat::SPIRV,
            debug_mode: true,
            prefer_low_power: false,
            driver: None,
        }
    }
}

pub(crate) struct DeviceShared {
    pub(crate) backend: RefCell<Box<dyn Backend>>,
    driver: DriverId,
    shader_formats: ShaderFormat,
    debug_mode: bool,
}

/// Process-wide handle to a configured backend. Cheap to clone; all child objects
/// keep the device alive. Single threaded with respect to any one device.
#[derive(Clone)]
pub struct Device {
    pub(crate) shared: Rc<DeviceShared>,
}

impl Device {
    /// Select a backend from the registry and construct a device on it. Selection
    /// takes the first entry that matches `driver` when supplied, overlaps the
    /// requested shader formats and probes successfully.
    pub fn create(info: &DeviceInfo) -> Result<Device, Error> {
        let table = bootstraps();
        let mut selected = None;

        if let Some(name) = &info.driver {
            for boot in &table {
                if boot.name.eq_ignore_ascii_case(name)
                    && boot.shader_formats.intersects(info.shader_formats)
                    && (boot.prepare)()
                {
                    selected = Some(boot);
                    break;
                }
            }
            if selected.is_none() {
                log::error!("gfx: requested backend {} unsupported!", name);
                return Err(Error::new(format!("requested backend {} unsupported", name)));
            }
        } else {
            for boot in &table {
                if boot.exposed_by_default
                    && boot.shader_formats.intersects(info.shader_formats)
                    && (boot.prepare)()
                {
                    selected = Some(boot);
                    break;
                }
            }
        }

        let boot = match selected {
            Some(boot) => boot,
            None => {
                log::error!("gfx: no supported backend found!");
                return Err(Error::new("no supported backend found"));
            }
        };

        let backend = (boot.create)(info)?;
        Ok(Device {
            shared: Rc::new(DeviceShared {
                backend: RefCell::new(backend),
                driver: boot.id,
                shader_formats: boot.shader_formats & info.shader_formats,
                debug_mode: info.debug_mode,
            }),
        })
    }

    /// Returns the identifier of the backend this device runs on
    pub fn driver(&self) -> DriverId {
        self.shared.driver
    }

    /// Returns the shader formats accepted by this device, the intersection of the
    /// requested set and the backend's supported set
    pub fn shader_formats(&self) -> ShaderFormat {
        self.shared.shader_formats
    }

    pub fn debug_mode(&self) -> bool {
        self.shared.debug_mode
    }

    /// Explicitly tear the device down. All child objects must already be released;
    /// dropping the last handle has the same effect.
    pub fn destroy(self) {
        self.shared.backend.borrow_mut().destroy();
    }

    pub fn supports_texture_format(
        &self,
        format: TextureFormat,
        texture_type: TextureType,
        usage: TextureUsage,
    ) -> bool {
        self.shared
            .backend
            .borrow()
            .supports_texture_format(format, texture_type, usage)
    }

    /// Returns the highest supported sample count not exceeding `desired` for `format`
    pub fn get_best_sample_count(
        &self,
        format: TextureFormat,
        desired: SampleCount,
    ) -> SampleCount {
        self.shared
            .backend
            .borrow()
            .get_best_sample_count(format, desired)
    }

    pub fn create_texture(&self, info: &TextureInfo) -> Result<Texture, Error> {
        if self.shared.debug_mode {
            self.validate_texture_info(info)?;
        }
        let res = self.shared.backend.borrow_mut().create_texture(info)?;
        Ok(Texture {
            info: info.clone(),
            res,
        })
    }

    pub fn create_buffer(&self, info: &BufferInfo) -> Result<Buffer, Error> {
        if self.shared.debug_mode && info.size == 0 {
            return Err(validation_error("buffer size must be >= 1"));
        }
        let res = self.shared.backend.borrow_mut().create_buffer(info)?;
        Ok(Buffer {
            usage: info.usage,
            size: info.size,
            res,
        })
    }

    pub fn create_transfer_buffer(&self, info: &TransferBufferInfo) -> Result<TransferBuffer, Error> {
        if self.shared.debug_mode && info.size == 0 {
            return Err(validation_error("transfer buffer size must be >= 1"));
        }
        let res = self
            .shared
            .backend
            .borrow_mut()
            .create_transfer_buffer(info)?;
        Ok(TransferBuffer {
            usage: info.usage,
            size: info.size,
            res,
        })
    }

    pub fn create_sampler(&self, info: &SamplerInfo) -> Result<Sampler, Error> {
        let res = self.shared.backend.borrow_mut().create_sampler(info)?;
        Ok(Sampler { res })
    }

    pub fn create_shader(&self, info: &ShaderInfo) -> Result<Shader, Error> {
        if self.shared.debug_mode && !info.format.intersects(self.shared.shader_formats) {
            return Err(validation_error("incompatible shader format for gpu backend"));
        }
        let res = self.shared.backend.borrow_mut().create_shader(info)?;
        Ok(Shader {
            stage: info.stage,
            counts: StageResourceCounts {
                samplers: info.sampler_count,
                uniform_buffers: info.uniform_buffer_count,
                storage_buffers: info.storage_buffer_count,
                storage_textures: info.storage_texture_count,
            },
            res,
        })
    }

    pub fn create_graphics_pipeline(
        &self,
        info: &GraphicsPipelineInfo,
    ) -> Result<GraphicsPipeline, Error> {
        // Automatically swap out the depth format if it's unsupported,
        // mirroring the texture creation fallback.
        let mut info = info.clone();
        if let Some(format) = info.attachment_info.depth_stencil_format {
            if !self.supports_texture_format(
                format,
                TextureType::Texture2D,
                TextureUsage::DEPTH_STENCIL_TARGET,
            ) {
                let new_format = match format {
                    TextureFormat::D24Unorm => TextureFormat::D32Sfloat,
                    TextureFormat::D32Sfloat => TextureFormat::D24Unorm,
                    TextureFormat::D24UnormS8Uint => TextureFormat::D32SfloatS8Uint,
                    TextureFormat::D32SfloatS8Uint => TextureFormat::D24UnormS8Uint,
                    _ => TextureFormat::D16Unorm,
                };
                log::warn!(
                    "gfx: requested unsupported depth format {:?}, falling back to {:?}!",
                    format,
                    new_format
                );
                info.attachment_info.depth_stencil_format = Some(new_format);
            }
        }

        if self.shared.debug_mode {
            if info.vertex_shader.stage != ShaderStage::Vertex {
                return Err(validation_error("vertex_shader is not a vertex stage shader"));
            }
            if info.fragment_shader.stage != ShaderStage::Fragment {
                return Err(validation_error(
                    "fragment_shader is not a fragment stage shader",
                ));
            }
            if info.attachment_info.color_attachment_descriptions.len() > MAX_COLOR_TARGET_BINDINGS {
                return Err(validation_error(
                    "color attachment count exceeds MAX_COLOR_TARGET_BINDINGS",
                ));
            }
        }

        let res = self
            .shared
            .backend
            .borrow_mut()
            .create_graphics_pipeline(&info)?;
        Ok(GraphicsPipeline {
            primitive_type: info.primitive_type,
            vertex_counts: info.vertex_shader.counts,
            fragment_counts: info.fragment_shader.counts,
            res,
        })
    }

    pub fn create_compute_pipeline(
        &self,
        info: &ComputePipelineInfo,
    ) -> Result<ComputePipeline, Error> {
        if self.shared.debug_mode {
            if !info.format.intersects(self.shared.shader_formats) {
                return Err(validation_error("incompatible shader format for gpu backend"));
            }
            if info.read_write_storage_texture_count > MAX_COMPUTE_WRITE_TEXTURES {
                return Err(validation_error(
                    "compute pipeline read-write texture count cannot be higher than 8!",
                ));
            }
            if info.read_write_storage_buffer_count > MAX_COMPUTE_WRITE_BUFFERS {
                return Err(validation_error(
                    "compute pipeline read-write buffer count cannot be higher than 8!",
                ));
            }
            if info.thread_count_x == 0 || info.thread_count_y == 0 || info.thread_count_z == 0 {
                return Err(validation_error(
                    "compute pipeline thread count dimensions must be at least 1!",
                ));
            }
        }
        let res = self
            .shared
            .backend
            .borrow_mut()
            .create_compute_pipeline(info)?;
        Ok(ComputePipeline {
            counts: StageResourceCounts {
                samplers: 0,
                uniform_buffers: info.uniform_buffer_count,
                storage_buffers: info.read_only_storage_buffer_count,
                storage_textures: info.read_only_storage_texture_count,
            },
            read_write_storage_texture_count: info.read_write_storage_texture_count,
            read_write_storage_buffer_count: info.read_write_storage_buffer_count,
            res,
        })
    }

    /// Attach a debug name to a buffer, visible in native capture tools
    pub fn set_buffer_name(&self, buffer: &Buffer, name: &str) {
        self.shared.backend.borrow_mut().set_buffer_name(buffer, name);
    }

    /// Attach a debug name to a texture, visible in native capture tools
    pub fn set_texture_name(&self, texture: &Texture, name: &str) {
        self.shared
            .backend
            .borrow_mut()
            .set_texture_name(texture, name);
    }

    // Resources release when their last handle drops; these mirror the release
    // half of the creation surface for callers that want the symmetry.
    pub fn release_texture(&self, texture: Texture) {
        drop(texture);
    }

    pub fn release_buffer(&self, buffer: Buffer) {
        drop(buffer);
    }

    pub fn release_transfer_buffer(&self, transfer_buffer: TransferBuffer) {
        drop(transfer_buffer);
    }

    pub fn release_sampler(&self, sampler: Sampler) {
        drop(sampler);
    }

    pub fn release_shader(&self, shader: Shader) {
        drop(shader);
    }

    pub fn release_graphics_pipeline(&self, pipeline: GraphicsPipeline) {
        drop(pipeline);
    }

    pub fn release_compute_pipeline(&self, pipeline: ComputePipeline) {
        drop(pipeline);
    }

    /// Map a transfer buffer into host address space; the returned pointer covers
    /// the full buffer size. May block until the region is safe to write.
    pub fn map_transfer_buffer(&self, buffer: &TransferBuffer, cycle: bool) -> *mut u8 {
        self.shared
            .backend
            .borrow_mut()
            .map_transfer_buffer(buffer, cycle)
    }

    pub fn unmap_transfer_buffer(&self, buffer: &TransferBuffer) {
        self.shared.backend.borrow_mut().unmap_transfer_buffer(buffer);
    }

    pub fn supports_swapchain_composition(
        &self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
    ) -> bool {
        self.shared
            .backend
            .borrow()
            .supports_swapchain_composition(window, composition)
    }

    pub fn supports_present_mode(&self, window: &dyn os::Window, present_mode: PresentMode) -> bool {
        self.shared
            .backend
            .borrow()
            .supports_present_mode(window, present_mode)
    }

    /// Register a swapchain on a window. Fails if the window is already claimed or
    /// the composition's colour space is not supported for presentation.
    pub fn claim_window(
        &self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> Result<(), Error> {
        self.shared
            .backend
            .borrow_mut()
            .claim_window(window, composition, present_mode)
    }

    /// Tear down a window's swapchain, returning its property bag to the pre-claim state
    pub fn unclaim_window(&self, window: &dyn os::Window) {
        self.shared.backend.borrow_mut().unclaim_window(window);
    }

    pub fn set_swapchain_parameters(
        &self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> Result<(), Error> {
        self.shared
            .backend
            .borrow_mut()
            .set_swapchain_parameters(window, composition, present_mode)
    }

    pub fn swapchain_texture_format(&self, window: &dyn os::Window) -> Result<TextureFormat, Error> {
        self.shared.backend.borrow().swapchain_texture_format(window)
    }

    /// Acquire the device's command buffer in a fresh recording state
    pub fn acquire_command_buffer(&self) -> Result<CommandBuffer, Error> {
        self.shared.backend.borrow_mut().acquire_command_buffer()?;
        Ok(CommandBuffer {
            inner: Rc::new(CommandBufferInner {
                device: self.clone(),
                render_pass_in_progress: Cell::new(false),
                compute_pass_in_progress: Cell::new(false),
                copy_pass_in_progress: Cell::new(false),
                graphics_pipeline_bound: Cell::new(false),
                compute_pipeline_bound: Cell::new(false),
                submitted: Cell::new(false),
            }),
        })
    }

    /// Block until all submitted GPU work has completed
    pub fn wait(&self) {
        self.shared.backend.borrow_mut().wait();
    }

    /// Block until all (or any, when `wait_all` is false) of the fences signal
    pub fn wait_for_fences(&self, wait_all: bool, fences: &[&Fence]) {
        self.shared
            .backend
            .borrow_mut()
            .wait_for_fences(wait_all, fences);
    }

    /// Non-blocking check of a fence's completion state
    pub fn query_fence(&self, fence: &Fence) -> bool {
        self.shared.backend.borrow().query_fence(fence)
    }

    pub fn release_fence(&self, fence: Fence) {
        self.shared.backend.borrow_mut().release_fence(&fence);
    }

    fn validate_texture_info(&self, info: &TextureInfo) -> Result<(), Error> {
        const MAX_2D_DIMENSION: u32 = 16384;
        const MAX_3D_DIMENSION: u32 = 2048;

        // Common checks for all texture types
        if info.width == 0 || info.height == 0 || info.depth == 0 {
            return Err(validation_error(
                "for any texture: width, height, and depth must be >= 1",
            ));
        }
        if info.layer_count == 0 {
            return Err(validation_error("for any texture: layer_count must be >= 1"));
        }
        if info.level_count == 0 {
            return Err(validation_error("for any texture: level_count must be >= 1"));
        }
        if info.usage.contains(TextureUsage::GRAPHICS_STORAGE_READ)
            && info.usage.contains(TextureUsage::SAMPLER)
        {
            return Err(validation_error(
                "for any texture: usage cannot contain both GRAPHICS_STORAGE_READ and SAMPLER",
            ));
        }
        if info.format.is_integer_format() && info.usage.contains(TextureUsage::SAMPLER) {
            return Err(validation_error(
                "for any texture: usage cannot contain SAMPLER for textures with an integer format",
            ));
        }

        match info.texture_type {
            TextureType::Cube => {
                if info.width != info.height {
                    return Err(validation_error(
                        "for cube textures: width and height must be identical",
                    ));
                }
                if info.width > MAX_2D_DIMENSION || info.height > MAX_2D_DIMENSION {
                    return Err(validation_error(
                        "for cube textures: width and height must be <= 16384",
                    ));
                }
                if info.depth > 1 {
                    return Err(validation_error("for cube textures: depth must be 1"));
                }
                if info.layer_count != 6 {
                    return Err(validation_error("for cube textures: layer_count must be 6"));
                }
                if info.sample_count > SampleCount::One {
                    return Err(validation_error("for cube textures: sample_count must be 1"));
                }
                if !self.supports_texture_format(info.format, TextureType::Cube, info.usage) {
                    return Err(validation_error(
                        "for cube textures: the format is unsupported for the given usage",
                    ));
                }
            }
            TextureType::Texture3D => {
                if info.width > MAX_3D_DIMENSION
                    || info.height > MAX_3D_DIMENSION
                    || info.depth > MAX_3D_DIMENSION
                {
                    return Err(validation_error(
                        "for 3D textures: width, height, and depth must be <= 2048",
                    ));
                }
                if info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
                    return Err(validation_error(
                        "for 3D textures: usage must not contain DEPTH_STENCIL_TARGET",
                    ));
                }
                if info.layer_count > 1 {
                    return Err(validation_error("for 3D textures: layer_count must be 1"));
                }
                if info.sample_count > SampleCount::One {
                    return Err(validation_error("for 3D textures: sample_count must be 1"));
                }
                if !self.supports_texture_format(info.format, TextureType::Texture3D, info.usage) {
                    return Err(validation_error(
                        "for 3D textures: the format is unsupported for the given usage",
                    ));
                }
            }
            TextureType::Texture2DArray => {
                if info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
                    return Err(validation_error(
                        "for array textures: usage must not contain DEPTH_STENCIL_TARGET",
                    ));
                }
                if info.sample_count > SampleCount::One {
                    return Err(validation_error("for array textures: sample_count must be 1"));
                }
                if !self.supports_texture_format(info.format, TextureType::Texture2D, info.usage) {
                    return Err(validation_error(
                        "for array textures: the format is unsupported for the given usage",
                    ));
                }
            }
            TextureType::Texture2D => {
                if info.sample_count > SampleCount::One && info.level_count > 1 {
                    return Err(validation_error(
                        "for 2D multisample textures: level_count must be 1",
                    ));
                }
                if !self.supports_texture_format(info.format, TextureType::Texture2D, info.usage) {
                    return Err(validation_error(
                        "for 2D textures: the format is unsupported for the given usage",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn validation_error(msg: &str) -> Error {
    log::error!("gfx: {}", msg);
    Error::new(msg)
}

pub(crate) struct CommandBufferInner {
    device: Device,
    render_pass_in_progress: Cell<bool>,
    compute_pass_in_progress: Cell<bool>,
    copy_pass_in_progress: Cell<bool>,
    graphics_pipeline_bound: Cell<bool>,
    compute_pipeline_bound: Cell<bool>,
    submitted: Cell<bool>,
}

/// Short-lived recorder for GPU commands. States per buffer:
/// `Recording -> PassActive{Render|Compute|Copy} -> Recording -> ... -> Submitted`.
/// At most one pass may be in progress at any time and a submitted buffer is inert.
#[derive(Clone)]
pub struct CommandBuffer {
    inner: Rc<CommandBufferInner>,
}

impl CommandBuffer {
    fn device(&self) -> &Device {
        &self.inner.device
    }

    fn debug_mode(&self) -> bool {
        self.inner.device.shared.debug_mode
    }

    fn any_pass_in_progress(&self) -> bool {
        self.inner.render_pass_in_progress.get()
            || self.inner.compute_pass_in_progress.get()
            || self.inner.copy_pass_in_progress.get()
    }

    fn check_not_submitted(&self) -> Result<(), Error> {
        if self.inner.submitted.get() {
            return Err(validation_error("command buffer already submitted!"));
        }
        Ok(())
    }

    fn check_no_pass_in_progress(&self) -> Result<(), Error> {
        if self.any_pass_in_progress() {
            return Err(validation_error("pass already in progress!"));
        }
        Ok(())
    }

    pub fn submitted(&self) -> bool {
        self.inner.submitted.get()
    }

    /// Push data for the vertex-stage uniform slot; accepted only inside a render
    /// pass with a graphics pipeline bound
    pub fn push_vertex_uniform_data(&self, slot: u32, data: &[u8]) {
        if self.debug_mode() {
            if self.check_not_submitted().is_err() {
                return;
            }
            if !self.inner.render_pass_in_progress.get() || !self.inner.graphics_pipeline_bound.get()
            {
                let _ = validation_error(
                    "vertex uniform data requires a render pass with a graphics pipeline bound!",
                );
                return;
            }
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .push_uniform_data(ShaderStage::Vertex, slot, data);
    }

    /// Push data for the fragment-stage uniform slot
    pub fn push_fragment_uniform_data(&self, slot: u32, data: &[u8]) {
        if self.debug_mode() {
            if self.check_not_submitted().is_err() {
                return;
            }
            if !self.inner.render_pass_in_progress.get() || !self.inner.graphics_pipeline_bound.get()
            {
                let _ = validation_error(
                    "fragment uniform data requires a render pass with a graphics pipeline bound!",
                );
                return;
            }
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .push_uniform_data(ShaderStage::Fragment, slot, data);
    }

    /// Push data for the compute-stage uniform slot
    pub fn push_compute_uniform_data(&self, slot: u32, data: &[u8]) {
        if self.debug_mode() {
            if self.check_not_submitted().is_err() {
                return;
            }
            if !self.inner.compute_pass_in_progress.get() || !self.inner.compute_pipeline_bound.get()
            {
                let _ = validation_error(
                    "compute uniform data requires a compute pass with a compute pipeline bound!",
                );
                return;
            }
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .push_uniform_data(ShaderStage::Compute, slot, data);
    }

    /// Insert a single debug label into the command stream
    pub fn insert_debug_label(&self, text: &str) {
        if self.debug_mode() && self.check_not_submitted().is_err() {
            return;
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .insert_debug_label(text);
    }

    pub fn push_debug_group(&self, name: &str) {
        if self.debug_mode() && self.check_not_submitted().is_err() {
            return;
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .push_debug_group(name);
    }

    pub fn pop_debug_group(&self) {
        if self.debug_mode() && self.check_not_submitted().is_err() {
            return;
        }
        self.device().shared.backend.borrow_mut().pop_debug_group();
    }

    /// Begin a render pass over the given attachments. Permitted only while
    /// recording with no other pass active.
    pub fn begin_render_pass(
        &self,
        color_attachments: &[ColorAttachmentInfo],
        depth_stencil_attachment: Option<&DepthStencilAttachmentInfo>,
    ) -> Result<RenderPass, Error> {
        if color_attachments.len() > MAX_COLOR_TARGET_BINDINGS {
            return Err(validation_error(
                "color attachment count exceeds MAX_COLOR_TARGET_BINDINGS",
            ));
        }
        if self.debug_mode() {
            self.check_not_submitted()?;
            self.check_no_pass_in_progress()?;
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .begin_render_pass(color_attachments, depth_stencil_attachment);
        self.inner.render_pass_in_progress.set(true);
        Ok(RenderPass { cmd: self.clone() })
    }

    /// Begin a compute pass, declaring the read-write resources it may write
    pub fn begin_compute_pass(
        &self,
        storage_texture_bindings: &[StorageTextureReadWriteBinding],
        storage_buffer_bindings: &[StorageBufferReadWriteBinding],
    ) -> Result<ComputePass, Error> {
        if storage_texture_bindings.len() as u32 > MAX_COMPUTE_WRITE_TEXTURES {
            return Err(validation_error("storage texture binding count exceeds limit"));
        }
        if storage_buffer_bindings.len() as u32 > MAX_COMPUTE_WRITE_BUFFERS {
            return Err(validation_error("storage buffer binding count exceeds limit"));
        }
        if self.debug_mode() {
            self.check_not_submitted()?;
            self.check_no_pass_in_progress()?;
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .begin_compute_pass(storage_texture_bindings, storage_buffer_bindings);
        self.inner.compute_pass_in_progress.set(true);
        Ok(ComputePass { cmd: self.clone() })
    }

    /// Begin a copy pass for upload, download and copy operations
    pub fn begin_copy_pass(&self) -> Result<CopyPass, Error> {
        if self.debug_mode() {
            self.check_not_submitted()?;
            self.check_no_pass_in_progress()?;
        }
        self.device().shared.backend.borrow_mut().begin_copy_pass();
        self.inner.copy_pass_in_progress.set(true);
        Ok(CopyPass { cmd: self.clone() })
    }

    /// Blit a texture region onto another with filtering, outside any pass
    pub fn blit(
        &self,
        source: &TextureRegion,
        destination: &TextureRegion,
        filter: Filter,
        cycle: bool,
    ) {
        if self.debug_mode() {
            if self.check_not_submitted().is_err() {
                return;
            }
            let src = &source.texture_slice.texture.info;
            let dst = &destination.texture_slice.texture.info;
            if !src.usage.contains(TextureUsage::SAMPLER) {
                let _ = validation_error("blit source texture must be created with SAMPLER usage");
                return;
            }
            if !dst.usage.contains(TextureUsage::COLOR_TARGET) {
                let _ =
                    validation_error("blit destination texture must be created with COLOR_TARGET usage");
                return;
            }
            if src.layer_count > 1 || dst.layer_count > 1 {
                let _ = validation_error("blit textures must have a layer_count of 1");
                return;
            }
            if src.depth > 1 || dst.depth > 1 {
                let _ = validation_error("blit textures must have a depth of 1");
                return;
            }
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .blit(source, destination, filter, cycle);
    }

    /// Ask the command buffer for the current back buffer of a claimed window,
    /// enlisting the window for presentation at submit. Returns the texture and
    /// its extent.
    pub fn acquire_swapchain_texture(
        &self,
        window: &dyn os::Window,
    ) -> Option<(Texture, u32, u32)> {
        if self.debug_mode() && self.check_not_submitted().is_err() {
            return None;
        }
        self.device()
            .shared
            .backend
            .borrow_mut()
            .acquire_swapchain_texture(window)
    }

    /// Submit recorded work for execution and present any enlisted windows.
    /// Permitted only while recording with no pass active; the buffer is inert
    /// afterwards.
    pub fn submit(&self) {
        if self.debug_mode() {
            if self.check_not_submitted().is_err() {
                return;
            }
            if self.any_pass_in_progress() {
                let _ =
                    validation_error("cannot submit command buffer while a pass is in progress!");
                return;
            }
        }
        self.inner.submitted.set(true);
        self.device().shared.backend.borrow_mut().submit();
    }

    /// Submit and return a fence that signals when this submission completes
    pub fn submit_and_acquire_fence(&self) -> Result<Fence, Error> {
        if self.debug_mode() {
            self.check_not_submitted()?;
            if self.any_pass_in_progress() {
                return Err(validation_error(
                    "cannot submit command buffer while a pass is in progress!",
                ));
            }
        }
        self.inner.submitted.set(true);
        let res = self
            .device()
            .shared
            .backend
            .borrow_mut()
            .submit_and_acquire_fence()?;
        Ok(Fence { res })
    }
}

/// A bracketed region of a command buffer recording rasterization work
pub struct RenderPass {
    cmd: CommandBuffer,
}

impl RenderPass {
    fn check_in_progress(&self) -> bool {
        if self.cmd.debug_mode() && !self.cmd.inner.render_pass_in_progress.get() {
            let _ = validation_error("render pass not in progress!");
            return false;
        }
        true
    }

    fn check_graphics_pipeline_bound(&self) -> bool {
        if self.cmd.debug_mode() && !self.cmd.inner.graphics_pipeline_bound.get() {
            let _ = validation_error("graphics pipeline not bound!");
            return false;
        }
        true
    }

    pub fn set_viewport(&self, viewport: &Viewport) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .set_viewport(viewport);
    }

    pub fn set_scissor(&self, scissor: &ScissorRect) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .set_scissor(scissor);
    }

    /// Bind a graphics pipeline; draws flush its descriptor state lazily
    pub fn bind_graphics_pipeline(&self, pipeline: &GraphicsPipeline) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_graphics_pipeline(pipeline);
        self.cmd.inner.graphics_pipeline_bound.set(true);
    }

    pub fn bind_vertex_buffers(&self, first_binding: u32, bindings: &[BufferBinding]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_vertex_buffers(first_binding, bindings);
    }

    pub fn bind_index_buffer(&self, binding: &BufferBinding, index_element_size: IndexElementSize) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_index_buffer(binding, index_element_size);
    }

    pub fn bind_vertex_samplers(&self, first_slot: u32, bindings: &[TextureSamplerBinding]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_samplers(ShaderStage::Vertex, first_slot, bindings);
    }

    pub fn bind_vertex_storage_textures(&self, first_slot: u32, slices: &[TextureSlice]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_storage_textures(ShaderStage::Vertex, first_slot, slices);
    }

    pub fn bind_vertex_storage_buffers(&self, first_slot: u32, buffers: &[Buffer]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_storage_buffers(ShaderStage::Vertex, first_slot, buffers);
    }

    pub fn bind_fragment_samplers(&self, first_slot: u32, bindings: &[TextureSamplerBinding]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_samplers(ShaderStage::Fragment, first_slot, bindings);
    }

    pub fn bind_fragment_storage_textures(&self, first_slot: u32, slices: &[TextureSlice]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_storage_textures(ShaderStage::Fragment, first_slot, slices);
    }

    pub fn bind_fragment_storage_buffers(&self, first_slot: u32, buffers: &[Buffer]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_storage_buffers(ShaderStage::Fragment, first_slot, buffers);
    }

    /// Draw `primitive_count` primitives starting at `vertex_start`
    pub fn draw_primitives(&self, vertex_start: u32, primitive_count: u32) {
        if !self.check_in_progress() || !self.check_graphics_pipeline_bound() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .draw_primitives(vertex_start, primitive_count);
    }

    pub fn draw_indexed_primitives(
        &self,
        base_vertex: u32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
    ) {
        if !self.check_in_progress() || !self.check_graphics_pipeline_bound() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .draw_indexed_primitives(base_vertex, start_index, primitive_count, instance_count);
    }

    pub fn draw_primitives_indirect(&self, buffer: &Buffer, offset: u32, draw_count: u32, stride: u32) {
        if !self.check_in_progress() || !self.check_graphics_pipeline_bound() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .draw_primitives_indirect(buffer, offset, draw_count, stride);
    }

    pub fn draw_indexed_primitives_indirect(
        &self,
        buffer: &Buffer,
        offset: u32,
        draw_count: u32,
        stride: u32,
    ) {
        if !self.check_in_progress() || !self.check_graphics_pipeline_bound() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .draw_indexed_primitives_indirect(buffer, offset, draw_count, stride);
    }

    /// End the pass, clearing the pass flag and the graphics-pipeline-bound flag
    pub fn end(self) {
        if self.cmd.debug_mode() && !self.cmd.inner.render_pass_in_progress.get() {
            let _ = validation_error("render pass not in progress!");
            return;
        }
        self.cmd.device().shared.backend.borrow_mut().end_render_pass();
        self.cmd.inner.render_pass_in_progress.set(false);
        self.cmd.inner.graphics_pipeline_bound.set(false);
    }
}

/// A bracketed region of a command buffer recording compute dispatches
pub struct ComputePass {
    cmd: CommandBuffer,
}

impl ComputePass {
    fn check_in_progress(&self) -> bool {
        if self.cmd.debug_mode() && !self.cmd.inner.compute_pass_in_progress.get() {
            let _ = validation_error("compute pass not in progress!");
            return false;
        }
        true
    }

    fn check_compute_pipeline_bound(&self) -> bool {
        if self.cmd.debug_mode() && !self.cmd.inner.compute_pipeline_bound.get() {
            let _ = validation_error("compute pipeline not bound!");
            return false;
        }
        true
    }

    pub fn bind_compute_pipeline(&self, pipeline: &ComputePipeline) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_compute_pipeline(pipeline);
        self.cmd.inner.compute_pipeline_bound.set(true);
    }

    pub fn bind_compute_storage_textures(&self, first_slot: u32, slices: &[TextureSlice]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_compute_storage_textures(first_slot, slices);
    }

    pub fn bind_compute_storage_buffers(&self, first_slot: u32, buffers: &[Buffer]) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .bind_compute_storage_buffers(first_slot, buffers);
    }

    pub fn dispatch_compute(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        if !self.check_in_progress() || !self.check_compute_pipeline_bound() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .dispatch_compute(group_count_x, group_count_y, group_count_z);
    }

    pub fn dispatch_compute_indirect(&self, buffer: &Buffer, offset: u32) {
        if !self.check_in_progress() || !self.check_compute_pipeline_bound() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .dispatch_compute_indirect(buffer, offset);
    }

    /// End the pass, clearing the pass flag and the compute-pipeline-bound flag
    pub fn end(self) {
        if self.cmd.debug_mode() && !self.cmd.inner.compute_pass_in_progress.get() {
            let _ = validation_error("compute pass not in progress!");
            return;
        }
        self.cmd.device().shared.backend.borrow_mut().end_compute_pass();
        self.cmd.inner.compute_pass_in_progress.set(false);
        self.cmd.inner.compute_pipeline_bound.set(false);
    }
}

/// A bracketed region of a command buffer recording transfer operations
pub struct CopyPass {
    cmd: CommandBuffer,
}

impl CopyPass {
    fn check_in_progress(&self) -> bool {
        if self.cmd.debug_mode() && !self.cmd.inner.copy_pass_in_progress.get() {
            let _ = validation_error("copy pass not in progress!");
            return false;
        }
        true
    }

    pub fn upload_to_texture(
        &self,
        source: &TextureTransferInfo,
        destination: &TextureRegion,
        cycle: bool,
    ) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .upload_to_texture(source, destination, cycle);
    }

    pub fn upload_to_buffer(
        &self,
        source: &TransferBufferLocation,
        destination: &BufferRegion,
        cycle: bool,
    ) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .upload_to_buffer(source, destination, cycle);
    }

    pub fn copy_texture_to_texture(
        &self,
        source: &TextureLocation,
        destination: &TextureLocation,
        w: u32,
        h: u32,
        d: u32,
        cycle: bool,
    ) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .copy_texture_to_texture(source, destination, w, h, d, cycle);
    }

    pub fn copy_buffer_to_buffer(
        &self,
        source: &BufferLocation,
        destination: &BufferLocation,
        size: u32,
        cycle: bool,
    ) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .copy_buffer_to_buffer(source, destination, size, cycle);
    }

    pub fn generate_mipmaps(&self, texture: &Texture) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .generate_mipmaps(texture);
    }

    pub fn download_from_texture(&self, source: &TextureRegion, destination: &TextureTransferInfo) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .download_from_texture(source, destination);
    }

    pub fn download_from_buffer(&self, source: &BufferRegion, destination: &TransferBufferLocation) {
        if !self.check_in_progress() {
            return;
        }
        self.cmd
            .device()
            .shared
            .backend
            .borrow_mut()
            .download_from_buffer(source, destination);
    }

    /// End the pass, clearing the pass flag
    pub fn end(self) {
        if self.cmd.debug_mode() && !self.cmd.inner.copy_pass_in_progress.get() {
            let _ = validation_error("copy pass not in progress!");
            return;
        }
        self.cmd.device().shared.backend.borrow_mut().end_copy_pass();
        self.cmd.inner.copy_pass_in_progress.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_device(debug_mode: bool) -> Device {
        Device::create(&DeviceInfo {
            shader_formats: ShaderFormat::SPIRV | ShaderFormat::DXBC,
            debug_mode,
            prefer_low_power: false,
            driver: Some("null".to_string()),
        })
        .unwrap()
    }

    fn test_shader(device: &Device, stage: ShaderStage, uniform_buffers: u32, samplers: u32) -> Shader {
        device
            .create_shader(&ShaderInfo {
                code: &[0u8; 16],
                entry_point: "main",
                format: ShaderFormat::SPIRV,
                stage,
                sampler_count: samplers,
                storage_texture_count: 0,
                storage_buffer_count: 0,
                uniform_buffer_count: uniform_buffers,
            })
            .unwrap()
    }

    fn test_pipeline(device: &Device) -> GraphicsPipeline {
        let vs = test_shader(device, ShaderStage::Vertex, 1, 0);
        let fs = test_shader(device, ShaderStage::Fragment, 0, 1);
        device
            .create_graphics_pipeline(&GraphicsPipelineInfo {
                vertex_shader: &vs,
                fragment_shader: &fs,
                vertex_input_state: VertexInputState::default(),
                primitive_type: PrimitiveType::TriangleList,
                rasterizer_state: RasterizerState::default(),
                multisample_state: MultisampleState::default(),
                depth_stencil_state: DepthStencilState::default(),
                blend_constants: [0.0; 4],
                attachment_info: AttachmentInfo {
                    color_attachment_descriptions: vec![ColorAttachmentDescription {
                        format: TextureFormat::B8G8R8A8,
                        blend_state: ColorAttachmentBlendState::default(),
                    }],
                    depth_stencil_format: None,
                },
            })
            .unwrap()
    }

    #[test]
    fn registry_selects_null_by_default() {
        let device = Device::create(&DeviceInfo {
            shader_formats: ShaderFormat::SPIRV,
            debug_mode: true,
            prefer_low_power: false,
            driver: None,
        })
        .unwrap();
        assert_eq!(device.driver(), DriverId::Null);
    }

    #[test]
    fn registry_rejects_unknown_name() {
        let result = Device::create(&DeviceInfo {
            shader_formats: ShaderFormat::SPIRV,
            debug_mode: true,
            prefer_low_power: false,
            driver: Some("gl".to_string()),
        });
        assert!(result.is_err());
    }

    #[test]
    fn registry_requires_format_overlap() {
        let result = Device::create(&DeviceInfo {
            shader_formats: ShaderFormat::empty(),
            debug_mode: true,
            prefer_low_power: false,
            driver: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn device_stores_format_intersection() {
        let device = null_device(true);
        assert_eq!(
            device.shader_formats(),
            ShaderFormat::SPIRV | ShaderFormat::DXBC
        );
    }

    #[test]
    fn at_most_one_pass_in_progress() {
        let device = null_device(true);
        let cmd = device.acquire_command_buffer().unwrap();

        let render = cmd.begin_render_pass(&[], None).unwrap();
        assert!(cmd.begin_compute_pass(&[], &[]).is_err());
        assert!(cmd.begin_copy_pass().is_err());
        render.end();

        let copy = cmd.begin_copy_pass().unwrap();
        assert!(cmd.begin_render_pass(&[], None).is_err());
        copy.end();

        cmd.submit();
        assert!(cmd.submitted());
    }

    #[test]
    fn submitted_buffer_is_inert() {
        let device = null_device(true);
        let cmd = device.acquire_command_buffer().unwrap();
        cmd.submit();

        assert!(cmd.begin_render_pass(&[], None).is_err());
        assert!(cmd.begin_compute_pass(&[], &[]).is_err());
        assert!(cmd.begin_copy_pass().is_err());
        assert!(cmd.submit_and_acquire_fence().is_err());
        assert!(!cmd.inner.render_pass_in_progress.get());
    }

    #[test]
    fn submit_with_pass_in_progress_is_rejected() {
        let device = null_device(true);
        let cmd = device.acquire_command_buffer().unwrap();
        let render = cmd.begin_render_pass(&[], None).unwrap();
        cmd.submit();
        assert!(!cmd.submitted());
        render.end();
        cmd.submit();
        assert!(cmd.submitted());
    }

    #[test]
    fn pass_end_clears_pipeline_bound_flag() {
        let device = null_device(true);
        let pipeline = test_pipeline(&device);
        let cmd = device.acquire_command_buffer().unwrap();

        let render = cmd.begin_render_pass(&[], None).unwrap();
        render.bind_graphics_pipeline(&pipeline);
        assert!(cmd.inner.graphics_pipeline_bound.get());
        render.end();
        assert!(!cmd.inner.graphics_pipeline_bound.get());
    }

    #[test]
    fn pipeline_carries_shader_resource_counts() {
        let device = null_device(true);
        let pipeline = test_pipeline(&device);
        assert_eq!(pipeline.vertex_counts.uniform_buffers, 1);
        assert_eq!(pipeline.vertex_counts.samplers, 0);
        assert_eq!(pipeline.fragment_counts.samplers, 1);
        assert_eq!(pipeline.fragment_counts.uniform_buffers, 0);
    }

    #[test]
    fn cube_texture_validation() {
        let device = null_device(true);
        // S5: non square cube texture is rejected under debug mode
        let result = device.create_texture(&TextureInfo {
            texture_type: TextureType::Cube,
            width: 256,
            height: 128,
            layer_count: 6,
            ..TextureInfo::default()
        });
        assert!(result.is_err());

        let result = device.create_texture(&TextureInfo {
            texture_type: TextureType::Cube,
            width: 256,
            height: 256,
            layer_count: 6,
            ..TextureInfo::default()
        });
        assert!(result.is_ok());

        // without debug mode creation is delegated
        let device = null_device(false);
        let result = device.create_texture(&TextureInfo {
            texture_type: TextureType::Cube,
            width: 256,
            height: 128,
            layer_count: 6,
            ..TextureInfo::default()
        });
        assert!(result.is_ok());
    }

    #[test]
    fn texture_validation_rules() {
        let device = null_device(true);

        // zero extent
        assert!(device
            .create_texture(&TextureInfo {
                width: 0,
                ..TextureInfo::default()
            })
            .is_err());

        // sampler + graphics storage read are mutually exclusive
        assert!(device
            .create_texture(&TextureInfo {
                usage: TextureUsage::SAMPLER | TextureUsage::GRAPHICS_STORAGE_READ,
                ..TextureInfo::default()
            })
            .is_err());

        // integer formats cannot be sampled
        assert!(device
            .create_texture(&TextureInfo {
                format: TextureFormat::R8G8B8A8Uint,
                usage: TextureUsage::SAMPLER,
                ..TextureInfo::default()
            })
            .is_err());

        // 3d textures cannot be depth stencil targets
        assert!(device
            .create_texture(&TextureInfo {
                texture_type: TextureType::Texture3D,
                format: TextureFormat::D32Sfloat,
                usage: TextureUsage::DEPTH_STENCIL_TARGET,
                ..TextureInfo::default()
            })
            .is_err());

        // multisampled 2d textures must have a single level
        assert!(device
            .create_texture(&TextureInfo {
                sample_count: SampleCount::Four,
                level_count: 2,
                usage: TextureUsage::COLOR_TARGET,
                ..TextureInfo::default()
            })
            .is_err());
    }

    #[test]
    fn compute_pipeline_validation() {
        let device = null_device(true);
        let base = ComputePipelineInfo {
            code: &[0u8; 16],
            entry_point: "main",
            format: ShaderFormat::SPIRV,
            read_only_storage_texture_count: 0,
            read_only_storage_buffer_count: 0,
            read_write_storage_texture_count: 0,
            read_write_storage_buffer_count: 0,
            uniform_buffer_count: 0,
            thread_count_x: 8,
            thread_count_y: 8,
            thread_count_z: 1,
        };

        assert!(device.create_compute_pipeline(&base).is_ok());
        assert!(device
            .create_compute_pipeline(&ComputePipelineInfo {
                read_write_storage_texture_count: 9,
                ..base.clone()
            })
            .is_err());
        assert!(device
            .create_compute_pipeline(&ComputePipelineInfo {
                thread_count_y: 0,
                ..base.clone()
            })
            .is_err());
        assert!(device
            .create_compute_pipeline(&ComputePipelineInfo {
                format: ShaderFormat::METALLIB,
                ..base
            })
            .is_err());
    }

    #[test]
    fn incompatible_shader_format_is_rejected() {
        let device = null_device(true);
        let result = device.create_shader(&ShaderInfo {
            code: &[0u8; 4],
            entry_point: "main",
            format: ShaderFormat::MSL,
            stage: ShaderStage::Vertex,
            sampler_count: 0,
            storage_texture_count: 0,
            storage_buffer_count: 0,
            uniform_buffer_count: 0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn texel_block_sizes() {
        assert_eq!(TextureFormat::R8.texel_block_size(), 1);
        assert_eq!(TextureFormat::B5G6R5.texel_block_size(), 2);
        assert_eq!(TextureFormat::B8G8R8A8.texel_block_size(), 4);
        assert_eq!(TextureFormat::R16G16B16A16Sfloat.texel_block_size(), 8);
        assert_eq!(TextureFormat::R32G32B32A32Sfloat.texel_block_size(), 16);
        assert_eq!(TextureFormat::Bc1.texel_block_size(), 8);
        assert_eq!(TextureFormat::Bc7.texel_block_size(), 16);
    }

    #[test]
    fn depth_format_fallback_swaps() {
        let device = null_device(true);
        let vs = test_shader(&device, ShaderStage::Vertex, 0, 0);
        let fs = test_shader(&device, ShaderStage::Fragment, 0, 0);
        // the null backend reports depth formats other than D32 as unsupported,
        // so D24 falls back to D32
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineInfo {
            vertex_shader: &vs,
            fragment_shader: &fs,
            vertex_input_state: VertexInputState::default(),
            primitive_type: PrimitiveType::TriangleList,
            rasterizer_state: RasterizerState::default(),
            multisample_state: MultisampleState::default(),
            depth_stencil_state: DepthStencilState::default(),
            blend_constants: [0.0; 4],
            attachment_info: AttachmentInfo {
                color_attachment_descriptions: vec![],
                depth_stencil_format: Some(TextureFormat::D24Unorm),
            },
        });
        assert!(pipeline.is_ok());
    }
}
