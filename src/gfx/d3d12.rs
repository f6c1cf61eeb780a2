#![cfg(target_os = "windows")]

use super::*;
use crate::os;
use crate::Error;

use windows::{
    core::*, Win32::Foundation::*, Win32::Graphics::Direct3D::Fxc::*, Win32::Graphics::Direct3D::*,
    Win32::Graphics::Direct3D12::*, Win32::Graphics::Dxgi::Common::*, Win32::Graphics::Dxgi::*,
    Win32::System::Threading::*, Win32::System::WindowsProgramming::*,
};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ffi::CString;
use std::rc::Rc;

const WINDOW_PROPERTY_DATA: &str = "landline.gfx.d3d12.window_data";
const SWAPCHAIN_BUFFER_COUNT: u32 = 2;
const MAX_ROOT_SIGNATURE_PARAMETERS: u32 = 64;
const MAX_UNIFORM_BUFFER_POOL_SIZE: usize = 16;
const MAX_UNIFORM_BUFFERS: u32 = 14;
const MAX_SAMPLERS: u32 = 16;
const MAX_STORAGE_BUFFERS: u32 = 64;
const MAX_STORAGE_TEXTURES: u32 = 64;
const UNIFORM_BUFFER_SIZE: u32 = 32768;
const UNIFORM_BUFFER_ALIGNMENT: u32 = 256;

// shader visible view heap regions, one per root table category
const UNIFORM_REGION: u32 = 0;
const STORAGE_BUFFER_REGION: u32 = UNIFORM_REGION + MAX_UNIFORM_BUFFERS;
const STORAGE_TEXTURE_REGION: u32 = STORAGE_BUFFER_REGION + MAX_STORAGE_BUFFERS;
const TEXTURE_SRV_REGION: u32 = STORAGE_TEXTURE_REGION + MAX_STORAGE_TEXTURES;
const VIEW_HEAP_SIZE: u32 = TEXTURE_SRV_REGION + MAX_SAMPLERS;
const SAMPLER_HEAP_SIZE: u32 = MAX_SAMPLERS;

// D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING
const DEFAULT_4_COMPONENT_MAPPING: u32 = 0x1688;

/* Conversions */

const fn to_dxgi_format(format: TextureFormat) -> DXGI_FORMAT {
    match format {
        TextureFormat::Invalid => DXGI_FORMAT_UNKNOWN,
        TextureFormat::R8G8B8A8 => DXGI_FORMAT_R8G8B8A8_UNORM,
        TextureFormat::B8G8R8A8 => DXGI_FORMAT_B8G8R8A8_UNORM,
        TextureFormat::B5G6R5 => DXGI_FORMAT_B5G6R5_UNORM,
        TextureFormat::B5G5R5A1 => DXGI_FORMAT_B5G5R5A1_UNORM,
        TextureFormat::B4G4R4A4 => DXGI_FORMAT_B4G4R4A4_UNORM,
        TextureFormat::R10G10B10A2 => DXGI_FORMAT_R10G10B10A2_UNORM,
        TextureFormat::R16G16 => DXGI_FORMAT_R16G16_UNORM,
        TextureFormat::R16G16B16A16 => DXGI_FORMAT_R16G16B16A16_UNORM,
        TextureFormat::R8 => DXGI_FORMAT_R8_UNORM,
        TextureFormat::A8 => DXGI_FORMAT_A8_UNORM,
        TextureFormat::Bc1 => DXGI_FORMAT_BC1_UNORM,
        TextureFormat::Bc2 => DXGI_FORMAT_BC2_UNORM,
        TextureFormat::Bc3 => DXGI_FORMAT_BC3_UNORM,
        TextureFormat::Bc7 => DXGI_FORMAT_BC7_UNORM,
        TextureFormat::R8G8Snorm => DXGI_FORMAT_R8G8_SNORM,
        TextureFormat::R8G8B8A8Snorm => DXGI_FORMAT_R8G8B8A8_SNORM,
        TextureFormat::R16Sfloat => DXGI_FORMAT_R16_FLOAT,
        TextureFormat::R16G16Sfloat => DXGI_FORMAT_R16G16_FLOAT,
        TextureFormat::R16G16B16A16Sfloat => DXGI_FORMAT_R16G16B16A16_FLOAT,
        TextureFormat::R32Sfloat => DXGI_FORMAT_R32_FLOAT,
        TextureFormat::R32G32Sfloat => DXGI_FORMAT_R32G32_FLOAT,
        TextureFormat::R32G32B32A32Sfloat => DXGI_FORMAT_R32G32B32A32_FLOAT,
        TextureFormat::R8Uint => DXGI_FORMAT_R8_UINT,
        TextureFormat::R8G8Uint => DXGI_FORMAT_R8G8_UINT,
        TextureFormat::R8G8B8A8Uint => DXGI_FORMAT_R8G8B8A8_UINT,
        TextureFormat::R16Uint => DXGI_FORMAT_R16_UINT,
        TextureFormat::R16G16Uint => DXGI_FORMAT_R16G16_UINT,
        TextureFormat::R16G16B16A16Uint => DXGI_FORMAT_R16G16B16A16_UINT,
        TextureFormat::R8G8B8A8Srgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        TextureFormat::B8G8R8A8Srgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        TextureFormat::Bc3Srgb => DXGI_FORMAT_BC3_UNORM_SRGB,
        TextureFormat::Bc7Srgb => DXGI_FORMAT_BC7_UNORM_SRGB,
        TextureFormat::D16Unorm => DXGI_FORMAT_D16_UNORM,
        TextureFormat::D24Unorm => DXGI_FORMAT_D24_UNORM_S8_UINT,
        TextureFormat::D32Sfloat => DXGI_FORMAT_D32_FLOAT,
        TextureFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
        TextureFormat::D32SfloatS8Uint => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
    }
}

const fn to_dxgi_vertex_format(format: VertexElementFormat) -> DXGI_FORMAT {
    match format {
        VertexElementFormat::Uint => DXGI_FORMAT_R32_UINT,
        VertexElementFormat::Float => DXGI_FORMAT_R32_FLOAT,
        VertexElementFormat::Vector2 => DXGI_FORMAT_R32G32_FLOAT,
        VertexElementFormat::Vector3 => DXGI_FORMAT_R32G32B32_FLOAT,
        VertexElementFormat::Vector4 => DXGI_FORMAT_R32G32B32A32_FLOAT,
        VertexElementFormat::Color => DXGI_FORMAT_R8G8B8A8_UNORM,
        VertexElementFormat::Byte4 => DXGI_FORMAT_R8G8B8A8_UINT,
        VertexElementFormat::Short2 => DXGI_FORMAT_R16G16_SINT,
        VertexElementFormat::Short4 => DXGI_FORMAT_R16G16B16A16_SINT,
        VertexElementFormat::NormalizedShort2 => DXGI_FORMAT_R16G16_SNORM,
        VertexElementFormat::NormalizedShort4 => DXGI_FORMAT_R16G16B16A16_SNORM,
        VertexElementFormat::HalfVector2 => DXGI_FORMAT_R16G16_FLOAT,
        VertexElementFormat::HalfVector4 => DXGI_FORMAT_R16G16B16A16_FLOAT,
    }
}

const fn to_d3d12_blend_factor(factor: BlendFactor) -> D3D12_BLEND {
    match factor {
        BlendFactor::Zero => D3D12_BLEND_ZERO,
        BlendFactor::One => D3D12_BLEND_ONE,
        BlendFactor::SrcColor => D3D12_BLEND_SRC_COLOR,
        BlendFactor::OneMinusSrcColor => D3D12_BLEND_INV_SRC_COLOR,
        BlendFactor::DstColor => D3D12_BLEND_DEST_COLOR,
        BlendFactor::OneMinusDstColor => D3D12_BLEND_INV_DEST_COLOR,
        BlendFactor::SrcAlpha => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstAlpha => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::OneMinusDstAlpha => D3D12_BLEND_INV_DEST_ALPHA,
        BlendFactor::ConstantColor => D3D12_BLEND_BLEND_FACTOR,
        BlendFactor::OneMinusConstantColor => D3D12_BLEND_INV_BLEND_FACTOR,
        BlendFactor::SrcAlphaSaturate => D3D12_BLEND_SRC_ALPHA_SAT,
    }
}

// The alpha channel cannot consume colour-valued factors, so the colour
// enumerants remap onto their alpha equivalents. This matches the other
// backends and must be preserved verbatim.
const fn to_d3d12_blend_factor_alpha(factor: BlendFactor) -> D3D12_BLEND {
    match factor {
        BlendFactor::Zero => D3D12_BLEND_ZERO,
        BlendFactor::One => D3D12_BLEND_ONE,
        BlendFactor::SrcColor => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::OneMinusSrcColor => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstColor => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::OneMinusDstColor => D3D12_BLEND_INV_DEST_ALPHA,
        BlendFactor::SrcAlpha => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstAlpha => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::OneMinusDstAlpha => D3D12_BLEND_INV_DEST_ALPHA,
        BlendFactor::ConstantColor => D3D12_BLEND_BLEND_FACTOR,
        BlendFactor::OneMinusConstantColor => D3D12_BLEND_INV_BLEND_FACTOR,
        BlendFactor::SrcAlphaSaturate => D3D12_BLEND_SRC_ALPHA_SAT,
    }
}

const fn to_d3d12_blend_op(op: BlendOp) -> D3D12_BLEND_OP {
    match op {
        BlendOp::Add => D3D12_BLEND_OP_ADD,
        BlendOp::Subtract => D3D12_BLEND_OP_SUBTRACT,
        BlendOp::ReverseSubtract => D3D12_BLEND_OP_REV_SUBTRACT,
        BlendOp::Min => D3D12_BLEND_OP_MIN,
        BlendOp::Max => D3D12_BLEND_OP_MAX,
    }
}

const fn to_d3d12_compare_op(op: CompareOp) -> D3D12_COMPARISON_FUNC {
    match op {
        CompareOp::Never => D3D12_COMPARISON_FUNC_NEVER,
        CompareOp::Less => D3D12_COMPARISON_FUNC_LESS,
        CompareOp::Equal => D3D12_COMPARISON_FUNC_EQUAL,
        CompareOp::LessOrEqual => D3D12_COMPARISON_FUNC_LESS_EQUAL,
        CompareOp::Greater => D3D12_COMPARISON_FUNC_GREATER,
        CompareOp::NotEqual => D3D12_COMPARISON_FUNC_NOT_EQUAL,
        CompareOp::GreaterOrEqual => D3D12_COMPARISON_FUNC_GREATER_EQUAL,
        CompareOp::Always => D3D12_COMPARISON_FUNC_ALWAYS,
    }
}

const fn to_d3d12_stencil_op(op: StencilOp) -> D3D12_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D12_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D12_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D12_STENCIL_OP_REPLACE,
        StencilOp::IncrementAndClamp => D3D12_STENCIL_OP_INCR_SAT,
        StencilOp::DecrementAndClamp => D3D12_STENCIL_OP_DECR_SAT,
        StencilOp::Invert => D3D12_STENCIL_OP_INVERT,
        StencilOp::IncrementAndWrap => D3D12_STENCIL_OP_INCR,
        StencilOp::DecrementAndWrap => D3D12_STENCIL_OP_DECR,
    }
}

const fn to_d3d12_cull_mode(mode: CullMode) -> D3D12_CULL_MODE {
    match mode {
        CullMode::None => D3D12_CULL_MODE_NONE,
        CullMode::Front => D3D12_CULL_MODE_FRONT,
        CullMode::Back => D3D12_CULL_MODE_BACK,
    }
}

const fn to_d3d12_fill_mode(mode: FillMode) -> D3D12_FILL_MODE {
    match mode {
        FillMode::Fill => D3D12_FILL_MODE_SOLID,
        FillMode::Line => D3D12_FILL_MODE_WIREFRAME,
    }
}

const fn to_d3d12_input_classification(rate: VertexInputRate) -> D3D12_INPUT_CLASSIFICATION {
    match rate {
        VertexInputRate::Vertex => D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
        VertexInputRate::Instance => D3D12_INPUT_CLASSIFICATION_PER_INSTANCE_DATA,
    }
}

const fn to_d3d12_primitive_topology(primitive_type: PrimitiveType) -> D3D_PRIMITIVE_TOPOLOGY {
    match primitive_type {
        PrimitiveType::PointList => D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
        PrimitiveType::LineList => D3D_PRIMITIVE_TOPOLOGY_LINELIST,
        PrimitiveType::LineStrip => D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
        PrimitiveType::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveType::TriangleStrip => D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
    }
}

const fn primitive_verts(primitive_type: PrimitiveType, primitive_count: u32) -> u32 {
    match primitive_type {
        PrimitiveType::PointList => primitive_count,
        PrimitiveType::LineList => primitive_count * 2,
        PrimitiveType::LineStrip => primitive_count + 1,
        PrimitiveType::TriangleList => primitive_count * 3,
        PrimitiveType::TriangleStrip => primitive_count + 2,
    }
}

const fn swapchain_format(composition: SwapchainComposition) -> DXGI_FORMAT {
    match composition {
        SwapchainComposition::Sdr => DXGI_FORMAT_B8G8R8A8_UNORM,
        // flip model swapchains cannot be created as an srgb format, the render
        // target view over the buffers uses the srgb variant instead
        SwapchainComposition::SdrLinear => DXGI_FORMAT_B8G8R8A8_UNORM,
        SwapchainComposition::Hdr => DXGI_FORMAT_R16G16B16A16_FLOAT,
        SwapchainComposition::HdrAdvanced => DXGI_FORMAT_R10G10B10A2_UNORM,
    }
}

const fn swapchain_color_space(composition: SwapchainComposition) -> DXGI_COLOR_SPACE_TYPE {
    match composition {
        SwapchainComposition::Sdr => DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709,
        SwapchainComposition::SdrLinear => DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709,
        SwapchainComposition::Hdr => DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709,
        SwapchainComposition::HdrAdvanced => DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020,
    }
}

const fn shader_profile(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vs_5_1",
        ShaderStage::Fragment => "ps_5_1",
        ShaderStage::Compute => "cs_5_1",
    }
}

fn to_d3d12_filter(info: &SamplerInfo) -> D3D12_FILTER {
    if info.anisotropy_enable {
        return D3D12_FILTER_ANISOTROPIC;
    }
    match (info.min_filter, info.mag_filter) {
        (Filter::Nearest, Filter::Nearest) => D3D12_FILTER_MIN_MAG_MIP_POINT,
        (Filter::Nearest, Filter::Linear) => D3D12_FILTER_MIN_POINT_MAG_LINEAR_MIP_POINT,
        (Filter::Linear, Filter::Nearest) => D3D12_FILTER_MIN_LINEAR_MAG_MIP_POINT,
        (Filter::Linear, Filter::Linear) => D3D12_FILTER_MIN_MAG_MIP_LINEAR,
    }
}

const fn to_d3d12_address_mode(mode: SamplerAddressMode) -> D3D12_TEXTURE_ADDRESS_MODE {
    match mode {
        SamplerAddressMode::Repeat => D3D12_TEXTURE_ADDRESS_MODE_WRAP,
        SamplerAddressMode::MirroredRepeat => D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
        SamplerAddressMode::ClampToEdge => D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    let trans = std::mem::ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
        pResource: Some(resource.clone()),
        StateBefore: state_before,
        StateAfter: state_after,
        Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
    });
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 { Transition: trans },
    }
}

/* Resources */

#[derive(Clone)]
pub struct Texture {
    pub(crate) resource: ID3D12Resource,
    pub(crate) desc: D3D12_RESOURCE_DESC,
    // kept alive for the lifetime of rtv_handle
    pub(crate) rtv_heap: Option<ID3D12DescriptorHeap>,
    pub(crate) rtv_handle: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub(crate) is_render_target: bool,
}

#[derive(Clone)]
pub struct Buffer {
    pub(crate) resource: ID3D12Resource,
    pub(crate) size: u32,
}

#[derive(Clone)]
pub struct TransferBuffer {
    pub(crate) resource: ID3D12Resource,
    pub(crate) size: u32,
}

#[derive(Clone)]
pub struct Sampler {
    pub(crate) desc: D3D12_SAMPLER_DESC,
}

#[derive(Clone)]
pub struct Shader {
    pub(crate) bytecode: Rc<Vec<u8>>,
}

/// Root parameter index assigned to each descriptor table category, in the
/// synthesis order CBV, UAV storage buffers, UAV storage textures, samplers
#[derive(Clone, Copy, Default)]
pub(crate) struct RootSlots {
    pub uniform_table: Option<u32>,
    pub storage_buffer_table: Option<u32>,
    pub storage_texture_table: Option<u32>,
    pub sampler_table: Option<u32>,
}

#[derive(Clone)]
pub struct GraphicsPipeline {
    pub(crate) pipeline_state: ID3D12PipelineState,
    pub(crate) root_signature: ID3D12RootSignature,
    pub(crate) slots: RootSlots,
    pub(crate) primitive_type: PrimitiveType,
    pub(crate) blend_constants: [f32; 4],
    pub(crate) stencil_ref: u32,
    // stride per input slot, consumed when vertex buffers are bound
    pub(crate) vertex_strides: Rc<Vec<(u32, u32)>>,
}

#[derive(Clone)]
pub struct ComputePipeline {
    pub(crate) pipeline_state: ID3D12PipelineState,
    pub(crate) root_signature: ID3D12RootSignature,
    pub(crate) slots: RootSlots,
}

#[derive(Clone)]
pub struct Fence {
    pub(crate) fence: ID3D12Fence,
    pub(crate) value: u64,
}

/// A pooled host-visible ring segment leased to the command buffer while recording
#[derive(Clone)]
struct UniformBuffer {
    resource: ID3D12Resource,
    mapped: *mut u8,
    size: u32,
    write_offset: u32,
    draw_offset: u32,
}

struct WindowData {
    swapchain: IDXGISwapChain3,
    #[allow(dead_code)]
    rtv_heap: ID3D12DescriptorHeap,
    textures: Vec<super::Texture>,
    frame_counter: Cell<u32>,
    present_mode: Cell<PresentMode>,
    composition: Cell<SwapchainComposition>,
    active: Cell<bool>,
}

/// The device's single command recorder in its current form
struct CommandRecorder {
    queue: ID3D12CommandQueue,
    allocator: ID3D12CommandAllocator,
    list: ID3D12GraphicsCommandList,
    fence: ID3D12Fence,
    fence_value: u64,
    fence_event: HANDLE,

    view_heap: ID3D12DescriptorHeap,
    sampler_heap: ID3D12DescriptorHeap,
    view_increment: u32,
    sampler_increment: u32,

    active_windows: Vec<Rc<WindowData>>,
    color_attachments: Vec<Texture>,

    current_graphics: Option<GraphicsPipeline>,
    current_graphics_counts: (StageResourceCounts, StageResourceCounts),
    current_compute: Option<ComputePipeline>,

    // with ALL visibility both stages share one register space, so vertex and
    // fragment uniform slots lease from the same array
    uniform_buffers: Vec<Option<UniformBuffer>>,
    used_uniform_buffers: Vec<UniformBuffer>,

    need_vertex_uniform_bind: bool,
    need_fragment_uniform_bind: bool,
    need_vertex_sampler_bind: bool,
    need_fragment_sampler_bind: bool,
    need_vertex_resource_bind: bool,
    need_fragment_resource_bind: bool,
}

pub(crate) struct Renderer {
    #[allow(dead_code)]
    factory: IDXGIFactory4,
    #[allow(dead_code)]
    adapter: IDXGIAdapter1,
    device: ID3D12Device,
    supports_tearing: bool,
    #[allow(dead_code)]
    debug_mode: bool,
    cmd: RefCell<CommandRecorder>,
    uniform_buffer_pool: RefCell<Vec<UniformBuffer>>,
}

/// Probe for a usable adapter and feature level without creating lasting state
pub fn prepare() -> bool {
    unsafe {
        let factory: IDXGIFactory4 = match CreateDXGIFactory2(0) {
            Ok(factory) => factory,
            Err(_) => {
                log::warn!("gfx::d3d12: could not create dxgi factory");
                return false;
            }
        };
        let adapter = match get_hardware_adapter(&factory, false) {
            Ok(adapter) => adapter,
            Err(_) => {
                log::warn!("gfx::d3d12: failed to find adapter for d3d12 device");
                return false;
            }
        };
        let mut device: Option<ID3D12Device> = None;
        if D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_1, &mut device).is_err() {
            log::warn!("gfx::d3d12: could not create device with feature level 11_1");
            return false;
        }
        true
    }
}

fn get_hardware_adapter(factory: &IDXGIFactory4, prefer_low_power: bool) -> Result<IDXGIAdapter1> {
    unsafe {
        if let Ok(factory6) = factory.cast::<IDXGIFactory6>() {
            let preference = if prefer_low_power {
                DXGI_GPU_PREFERENCE_MINIMUM_POWER
            } else {
                DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE
            };
            if let Ok(adapter) = factory6.EnumAdapterByGpuPreference::<IDXGIAdapter1>(0, preference)
            {
                return Ok(adapter);
            }
        }

        for i in 0.. {
            let adapter = factory.EnumAdapters1(i)?;
            let desc = adapter.GetDesc1()?;
            if (DXGI_ADAPTER_FLAG::from(desc.Flags) & DXGI_ADAPTER_FLAG_SOFTWARE)
                != DXGI_ADAPTER_FLAG_NONE
            {
                // Skip the basic render driver adapter.
                continue;
            }
            if D3D12CreateDevice(
                &adapter,
                D3D_FEATURE_LEVEL_11_1,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
            .is_ok()
            {
                return Ok(adapter);
            }
        }
    }
    unreachable!()
}

pub(crate) fn create_backend(info: &DeviceInfo) -> std::result::Result<Box<dyn Backend>, Error> {
    unsafe {
        let mut dxgi_factory_flags: u32 = 0;
        if info.debug_mode {
            let mut debug: Option<ID3D12Debug> = None;
            if let Some(debug) = D3D12GetDebugInterface(&mut debug).ok().and_then(|_| debug) {
                debug.EnableDebugLayer();
                log::info!("gfx::d3d12: enabling debug layer");
            }
            dxgi_factory_flags = DXGI_CREATE_FACTORY_DEBUG;
        }

        let factory: IDXGIFactory4 = CreateDXGIFactory2(dxgi_factory_flags)?;

        // check for explicit tearing support
        let mut supports_tearing = BOOL::from(false);
        if let Ok(factory5) = factory.cast::<IDXGIFactory5>() {
            if factory5
                .CheckFeatureSupport(
                    DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                    &mut supports_tearing as *mut BOOL as *mut c_void,
                    std::mem::size_of::<BOOL>() as u32,
                )
                .is_err()
            {
                supports_tearing = BOOL::from(false);
            }
        }

        let adapter = get_hardware_adapter(&factory, info.prefer_low_power)?;

        let mut d3d12_device: Option<ID3D12Device> = None;
        D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_1, &mut d3d12_device)?;
        let device = match d3d12_device {
            Some(device) => device,
            None => return Err(Error::new("gfx::d3d12: failed to create d3d12 device")),
        };

        let queue_desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            ..Default::default()
        };
        let queue: ID3D12CommandQueue = device.CreateCommandQueue(&queue_desc)?;

        let allocator: ID3D12CommandAllocator =
            device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?;
        let list: ID3D12GraphicsCommandList =
            device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None)?;

        // the list is created open, cycle it once so the recorder starts from a
        // clean reset
        list.Close()?;
        allocator.Reset()?;
        list.Reset(&allocator, None)?;

        let fence: ID3D12Fence = device.CreateFence(0, D3D12_FENCE_FLAG_NONE)?;
        let fence_event = CreateEventA(std::ptr::null_mut(), false, false, None);

        let view_heap: ID3D12DescriptorHeap =
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: VIEW_HEAP_SIZE,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
                ..Default::default()
            })?;
        let sampler_heap: ID3D12DescriptorHeap =
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: SAMPLER_HEAP_SIZE,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
                ..Default::default()
            })?;

        let view_increment =
            device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV);
        let sampler_increment =
            device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER);

        Ok(Box::new(Renderer {
            factory,
            adapter,
            device,
            supports_tearing: supports_tearing.as_bool(),
            debug_mode: info.debug_mode,
            cmd: RefCell::new(CommandRecorder {
                queue,
                allocator,
                list,
                fence,
                fence_value: 1,
                fence_event,
                view_heap,
                sampler_heap,
                view_increment,
                sampler_increment,
                active_windows: Vec::new(),
                color_attachments: Vec::new(),
                current_graphics: None,
                current_graphics_counts: Default::default(),
                current_compute: None,
                uniform_buffers: vec![None; MAX_UNIFORM_BUFFERS as usize],
                used_uniform_buffers: Vec::new(),
                need_vertex_uniform_bind: false,
                need_fragment_uniform_bind: false,
                need_vertex_sampler_bind: false,
                need_fragment_sampler_bind: false,
                need_vertex_resource_bind: false,
                need_fragment_resource_bind: false,
            }),
            uniform_buffer_pool: RefCell::new(Vec::new()),
        }))
    }
}

fn fetch_window_data(window: &dyn os::Window) -> Option<Rc<WindowData>> {
    window.properties().get::<WindowData>(WINDOW_PROPERTY_DATA)
}

impl CommandRecorder {
    fn view_cpu_handle(&self, slot: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let base = unsafe { self.view_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: base.ptr + (slot * self.view_increment) as usize,
        }
    }

    fn view_gpu_handle(&self, slot: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        let base = unsafe { self.view_heap.GetGPUDescriptorHandleForHeapStart() };
        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: base.ptr + (slot * self.view_increment) as u64,
        }
    }

    fn sampler_cpu_handle(&self, slot: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let base = unsafe { self.sampler_heap.GetCPUDescriptorHandleForHeapStart() };
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: base.ptr + (slot * self.sampler_increment) as usize,
        }
    }

    fn sampler_gpu_handle(&self, slot: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        let base = unsafe { self.sampler_heap.GetGPUDescriptorHandleForHeapStart() };
        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: base.ptr + (slot * self.sampler_increment) as u64,
        }
    }

    /// Flush any raised bind flags before a draw, using the root slots recorded
    /// when the pipeline's signature was synthesized
    fn bind_graphics_resources(&mut self) {
        let pipeline = match &self.current_graphics {
            Some(pipeline) => pipeline.clone(),
            None => return,
        };
        let (vertex_counts, fragment_counts) = self.current_graphics_counts;

        if self.need_vertex_uniform_bind || self.need_fragment_uniform_bind {
            if let Some(slot) = pipeline.slots.uniform_table {
                unsafe {
                    self.list
                        .SetGraphicsRootDescriptorTable(slot, self.view_gpu_handle(UNIFORM_REGION));
                }
            }
            self.need_vertex_uniform_bind = false;
            self.need_fragment_uniform_bind = false;
        }

        if self.need_vertex_resource_bind || self.need_fragment_resource_bind {
            let resource_count = vertex_counts.storage_buffers
                + vertex_counts.storage_textures
                + fragment_counts.storage_buffers
                + fragment_counts.storage_textures;
            if resource_count > 0 {
                if let Some(slot) = pipeline.slots.storage_buffer_table {
                    unsafe {
                        self.list.SetGraphicsRootDescriptorTable(
                            slot,
                            self.view_gpu_handle(STORAGE_BUFFER_REGION),
                        );
                    }
                }
                if let Some(slot) = pipeline.slots.storage_texture_table {
                    unsafe {
                        self.list.SetGraphicsRootDescriptorTable(
                            slot,
                            self.view_gpu_handle(STORAGE_TEXTURE_REGION),
                        );
                    }
                }
            }
            self.need_vertex_resource_bind = false;
            self.need_fragment_resource_bind = false;
        }

        if self.need_vertex_sampler_bind || self.need_fragment_sampler_bind {
            if vertex_counts.samplers + fragment_counts.samplers > 0 {
                if let Some(slot) = pipeline.slots.sampler_table {
                    unsafe {
                        self.list
                            .SetGraphicsRootDescriptorTable(slot, self.sampler_gpu_handle(0));
                    }
                }
            }
            self.need_vertex_sampler_bind = false;
            self.need_fragment_sampler_bind = false;
        }
    }
}

impl Renderer {
    fn log_error(&self, msg: &str, err: &windows::core::Error) {
        log::error!("gfx::d3d12: {}! error: {}", msg, err.message().to_string_lossy());
    }

    fn create_committed_buffer(
        &self,
        heap_type: D3D12_HEAP_TYPE,
        size: u64,
        initial_state: D3D12_RESOURCE_STATES,
    ) -> std::result::Result<ID3D12Resource, Error> {
        let mut buffer: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &D3D12_HEAP_PROPERTIES {
                    Type: heap_type,
                    CreationNodeMask: 1,
                    VisibleNodeMask: 1,
                    ..Default::default()
                },
                D3D12_HEAP_FLAG_NONE,
                &D3D12_RESOURCE_DESC {
                    Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
                    Width: size,
                    Height: 1,
                    DepthOrArraySize: 1,
                    MipLevels: 1,
                    Format: DXGI_FORMAT_UNKNOWN,
                    SampleDesc: DXGI_SAMPLE_DESC {
                        Count: 1,
                        Quality: 0,
                    },
                    Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
                    ..Default::default()
                },
                initial_state,
                std::ptr::null(),
                &mut buffer,
            )?;
        }
        buffer.ok_or_else(|| Error::new("gfx::d3d12: failed to create buffer"))
    }

    fn create_uniform_buffer(&self, size: u32) -> std::result::Result<UniformBuffer, Error> {
        let resource =
            self.create_committed_buffer(D3D12_HEAP_TYPE_UPLOAD, size as u64, D3D12_RESOURCE_STATE_GENERIC_READ)?;
        let mut mapped = std::ptr::null_mut();
        unsafe {
            resource.Map(0, std::ptr::null(), &mut mapped)?;
        }
        Ok(UniformBuffer {
            resource,
            mapped: mapped as *mut u8,
            size,
            write_offset: 0,
            draw_offset: 0,
        })
    }

    /// Lease a uniform buffer from the size-classed device pool, or allocate one.
    /// Block sizes are powers of two up to `UNIFORM_BUFFER_SIZE`.
    fn acquire_uniform_buffer(&self, size: u32) -> std::result::Result<UniformBuffer, Error> {
        let class = size
            .max(UNIFORM_BUFFER_ALIGNMENT)
            .next_power_of_two()
            .min(UNIFORM_BUFFER_SIZE);
        let mut pool = self.uniform_buffer_pool.borrow_mut();
        if let Some(index) = pool.iter().position(|buffer| buffer.size >= class) {
            let mut buffer = pool.swap_remove(index);
            buffer.write_offset = 0;
            buffer.draw_offset = 0;
            return Ok(buffer);
        }
        drop(pool);
        self.create_uniform_buffer(class)
    }

    fn return_uniform_buffers(&self, used: &mut Vec<UniformBuffer>) {
        let mut pool = self.uniform_buffer_pool.borrow_mut();
        for mut buffer in used.drain(..) {
            buffer.write_offset = 0;
            buffer.draw_offset = 0;
            if pool.len() < MAX_UNIFORM_BUFFER_POOL_SIZE {
                pool.push(buffer);
            }
        }
    }

    /// One descriptor table per non-empty category, in the order
    /// CBV -> UAV storage buffers -> UAV storage textures -> SAMPLER. Each table
    /// holds a single range covering all descriptors for the category starting at
    /// register 0. All parameters use ALL visibility.
    fn create_root_signature(
        &self,
        sampler_count: u32,
        uniform_buffer_count: u32,
        storage_buffer_count: u32,
        storage_texture_count: u32,
    ) -> std::result::Result<(ID3D12RootSignature, RootSlots), Error> {
        let mut ranges: Vec<D3D12_DESCRIPTOR_RANGE> = Vec::new();
        let mut slots = RootSlots::default();
        let mut parameter_count: u32 = 0;

        let mut push_range =
            |ranges: &mut Vec<D3D12_DESCRIPTOR_RANGE>,
             parameter_count: &mut u32,
             range_type: D3D12_DESCRIPTOR_RANGE_TYPE,
             count: u32|
             -> std::result::Result<Option<u32>, Error> {
                if count == 0 {
                    return Ok(None);
                }
                if *parameter_count >= MAX_ROOT_SIGNATURE_PARAMETERS {
                    log::error!("gfx::d3d12: too many root signature arguments");
                    return Err(Error::new("too many root signature arguments"));
                }
                ranges.push(D3D12_DESCRIPTOR_RANGE {
                    RangeType: range_type,
                    NumDescriptors: count,
                    BaseShaderRegister: 0,
                    RegisterSpace: 0,
                    OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
                });
                let slot = *parameter_count;
                *parameter_count += 1;
                Ok(Some(slot))
            };

        slots.uniform_table = push_range(
            &mut ranges,
            &mut parameter_count,
            D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
            uniform_buffer_count,
        )?;
        slots.storage_buffer_table = push_range(
            &mut ranges,
            &mut parameter_count,
            D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
            storage_buffer_count,
        )?;
        slots.storage_texture_table = push_range(
            &mut ranges,
            &mut parameter_count,
            D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
            storage_texture_count,
        )?;
        slots.sampler_table = push_range(
            &mut ranges,
            &mut parameter_count,
            D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
            sampler_count,
        )?;

        let parameters: Vec<D3D12_ROOT_PARAMETER> = ranges
            .iter()
            .map(|range| D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                        NumDescriptorRanges: 1,
                        pDescriptorRanges: range,
                    },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            })
            .collect();

        let desc = D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: if parameters.is_empty() {
                std::ptr::null()
            } else {
                parameters.as_ptr()
            },
            NumStaticSamplers: 0,
            pStaticSamplers: std::ptr::null(),
            Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };

        let mut serialized = None;
        let mut error_blob = None;
        let result = unsafe {
            D3D12SerializeRootSignature(
                &desc,
                D3D_ROOT_SIGNATURE_VERSION_1,
                &mut serialized,
                &mut error_blob,
            )
        };
        if let Err(err) = result {
            if let Some(error_blob) = &error_blob {
                let msg = unsafe {
                    let ptr = error_blob.GetBufferPointer() as *const u8;
                    let len = error_blob.GetBufferSize();
                    String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).to_string()
                };
                log::error!("gfx::d3d12: failed to serialize root signature: {}", msg);
            }
            return Err(err.into());
        }
        let serialized =
            serialized.ok_or_else(|| Error::new("gfx::d3d12: failed to serialize root signature"))?;

        let root_signature = unsafe {
            self.device.CreateRootSignature(
                0,
                serialized.GetBufferPointer(),
                serialized.GetBufferSize(),
            )?
        };
        Ok((root_signature, slots))
    }

    fn create_shader_bytecode(
        &self,
        stage: ShaderStage,
        format: ShaderFormat,
        code: &[u8],
        entry_point: &str,
    ) -> std::result::Result<Vec<u8>, Error> {
        if format.contains(ShaderFormat::HLSL) {
            let entry = CString::new(entry_point)
                .map_err(|_| Error::new("gfx::d3d12: invalid shader entry point name"))?;
            let target = CString::new(shader_profile(stage))
                .map_err(|_| Error::new("gfx::d3d12: invalid shader profile"))?;
            let mut blob = None;
            let mut error_blob = None;
            let result = unsafe {
                D3DCompile(
                    code.as_ptr() as *const c_void,
                    code.len(),
                    PSTR(std::ptr::null_mut()),
                    std::ptr::null(),
                    None,
                    PSTR(entry.as_ptr() as _),
                    PSTR(target.as_ptr() as _),
                    0,
                    0,
                    &mut blob,
                    &mut error_blob,
                )
            };
            if let Err(err) = result {
                // surface the compiler's error blob verbatim
                if let Some(error_blob) = &error_blob {
                    let msg = unsafe {
                        let ptr = error_blob.GetBufferPointer() as *const u8;
                        let len = error_blob.GetBufferSize();
                        String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).to_string()
                    };
                    log::error!("gfx::d3d12: {}", msg);
                }
                return Err(err.into());
            }
            let blob =
                blob.ok_or_else(|| Error::new("gfx::d3d12: shader compile produced no blob"))?;
            let bytes = unsafe {
                let ptr = blob.GetBufferPointer() as *const u8;
                let len = blob.GetBufferSize();
                std::slice::from_raw_parts(ptr, len).to_vec()
            };
            Ok(bytes)
        } else if format.contains(ShaderFormat::DXBC) {
            Ok(code.to_vec())
        } else {
            log::error!("gfx::d3d12: incompatible shader format for d3d12");
            Err(Error::new("incompatible shader format for d3d12"))
        }
    }

    fn create_swapchain(
        &self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> std::result::Result<WindowData, Error> {
        let hwnd = HWND(window.native_handle());
        let format = swapchain_format(composition);
        let color_space = swapchain_color_space(composition);

        let swapchain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: 0,
            Height: 0,
            Format: format,
            Stereo: BOOL::from(false),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: SWAPCHAIN_BUFFER_COUNT,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: if self.supports_tearing {
                DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
            } else {
                0
            },
        };

        let swapchain = unsafe {
            let cmd = self.cmd.borrow();
            self.factory.CreateSwapChainForHwnd(
                &cmd.queue,
                hwnd,
                &swapchain_desc,
                std::ptr::null(),
                None,
            )?
        };
        let swapchain: IDXGISwapChain3 = swapchain.cast()?;

        let color_space_support = unsafe { swapchain.CheckColorSpaceSupport(color_space)? };
        if (color_space_support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32) == 0 {
            log::error!("gfx::d3d12: requested colorspace is unsupported!");
            return Err(Error::new("requested colorspace is unsupported"));
        }
        unsafe {
            swapchain.SetColorSpace1(color_space)?;
        }

        // The swapchain's parent is a separate factory from the one used to
        // create it and only that parent can set the window association, so
        // fetch it to suppress the built-in alt-enter handling.
        unsafe {
            match swapchain.GetParent::<IDXGIFactory1>() {
                Ok(parent) => {
                    if let Err(err) = parent.MakeWindowAssociation(hwnd, DXGI_MWA_NO_WINDOW_CHANGES)
                    {
                        log::warn!(
                            "gfx::d3d12: MakeWindowAssociation failed: {}",
                            err.message().to_string_lossy()
                        );
                    }
                }
                Err(err) => {
                    log::warn!(
                        "gfx::d3d12: could not get swapchain parent: {}",
                        err.message().to_string_lossy()
                    );
                }
            }
        }

        // A flip model swapchain can't be created with an srgb format, the render
        // target view takes the srgb variant instead.
        let rtv_format = if composition == SwapchainComposition::SdrLinear {
            DXGI_FORMAT_B8G8R8A8_UNORM_SRGB
        } else {
            format
        };

        let rtv_heap: ID3D12DescriptorHeap = unsafe {
            self.device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: SWAPCHAIN_BUFFER_COUNT,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                ..Default::default()
            })?
        };
        let rtv_increment = unsafe {
            self.device
                .GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV)
        };
        let rtv_base = unsafe { rtv_heap.GetCPUDescriptorHandleForHeapStart() };

        let mut textures = Vec::new();
        for i in 0..SWAPCHAIN_BUFFER_COUNT {
            let back_buffer: ID3D12Resource = unsafe { swapchain.GetBuffer(i)? };
            let handle = D3D12_CPU_DESCRIPTOR_HANDLE {
                ptr: rtv_base.ptr + (i * rtv_increment) as usize,
            };
            let rtv_desc = D3D12_RENDER_TARGET_VIEW_DESC {
                Format: rtv_format,
                ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
                ..Default::default()
            };
            unsafe {
                self.device
                    .CreateRenderTargetView(&back_buffer, &rtv_desc, &handle);
            }
            let desc = unsafe { back_buffer.GetDesc() };
            textures.push(super::Texture {
                info: TextureInfo {
                    texture_type: TextureType::Texture2D,
                    format: match composition {
                        SwapchainComposition::Sdr => TextureFormat::B8G8R8A8,
                        SwapchainComposition::SdrLinear => TextureFormat::B8G8R8A8Srgb,
                        SwapchainComposition::Hdr => TextureFormat::R16G16B16A16Sfloat,
                        SwapchainComposition::HdrAdvanced => TextureFormat::R10G10B10A2,
                    },
                    width: desc.Width as u32,
                    height: desc.Height,
                    depth: 1,
                    layer_count: 1,
                    level_count: 1,
                    sample_count: SampleCount::One,
                    usage: TextureUsage::COLOR_TARGET,
                },
                res: TextureRes::D3d12(Texture {
                    resource: back_buffer,
                    desc,
                    rtv_heap: None,
                    rtv_handle: handle,
                    is_render_target: true,
                }),
            });
        }

        Ok(WindowData {
            swapchain,
            rtv_heap,
            textures,
            frame_counter: Cell::new(0),
            present_mode: Cell::new(present_mode),
            composition: Cell::new(composition),
            active: Cell::new(false),
        })
    }
}

fn texture(res: &super::Texture) -> &Texture {
    match &res.res {
        TextureRes::D3d12(texture) => texture,
        _ => panic!("gfx::d3d12: texture belongs to another backend"),
    }
}

fn buffer(res: &super::Buffer) -> &Buffer {
    match &res.res {
        BufferRes::D3d12(buffer) => buffer,
        _ => panic!("gfx::d3d12: buffer belongs to another backend"),
    }
}

fn transfer_buffer(res: &super::TransferBuffer) -> &TransferBuffer {
    match &res.res {
        TransferBufferRes::D3d12(buffer) => buffer,
        _ => panic!("gfx::d3d12: transfer buffer belongs to another backend"),
    }
}

fn sampler(res: &super::Sampler) -> &Sampler {
    match &res.res {
        SamplerRes::D3d12(sampler) => sampler,
        _ => panic!("gfx::d3d12: sampler belongs to another backend"),
    }
}

fn shader(res: &super::Shader) -> &Shader {
    match &res.res {
        ShaderRes::D3d12(shader) => shader,
        _ => panic!("gfx::d3d12: shader belongs to another backend"),
    }
}

fn graphics_pipeline(res: &super::GraphicsPipeline) -> &GraphicsPipeline {
    match &res.res {
        GraphicsPipelineRes::D3d12(pipeline) => pipeline,
        _ => panic!("gfx::d3d12: pipeline belongs to another backend"),
    }
}

fn compute_pipeline(res: &super::ComputePipeline) -> &ComputePipeline {
    match &res.res {
        ComputePipelineRes::D3d12(pipeline) => pipeline,
        _ => panic!("gfx::d3d12: pipeline belongs to another backend"),
    }
}

fn fence(res: &super::Fence) -> &Fence {
    match &res.res {
        FenceRes::D3d12(fence) => fence,
        _ => panic!("gfx::d3d12: fence belongs to another backend"),
    }
}

impl Backend for Renderer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn create_texture(&mut self, info: &TextureInfo) -> std::result::Result<TextureRes, Error> {
        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if info.usage.contains(TextureUsage::COLOR_TARGET) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
        }
        if info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
        }
        if info.usage.contains(TextureUsage::COMPUTE_STORAGE_WRITE) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }

        let dimension = match info.texture_type {
            TextureType::Texture3D => D3D12_RESOURCE_DIMENSION_TEXTURE3D,
            _ => D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        };
        let depth_or_array_size = match info.texture_type {
            TextureType::Texture3D => info.depth,
            _ => info.layer_count,
        };

        let desc = D3D12_RESOURCE_DESC {
            Dimension: dimension,
            Alignment: 0,
            Width: info.width as u64,
            Height: info.height,
            DepthOrArraySize: depth_or_array_size as u16,
            MipLevels: info.level_count as u16,
            Format: to_dxgi_format(info.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: info.sample_count.as_u32(),
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: flags,
        };

        // transient transfer destinations start in COPY_DEST, everything else in COMMON
        let initial_state = if info.usage.is_empty() {
            D3D12_RESOURCE_STATE_COPY_DEST
        } else {
            D3D12_RESOURCE_STATE_COMMON
        };

        let mut resource: Option<ID3D12Resource> = None;
        let result = unsafe {
            self.device.CreateCommittedResource(
                &D3D12_HEAP_PROPERTIES {
                    Type: D3D12_HEAP_TYPE_DEFAULT,
                    CreationNodeMask: 1,
                    VisibleNodeMask: 1,
                    ..Default::default()
                },
                D3D12_HEAP_FLAG_NONE,
                &desc,
                initial_state,
                std::ptr::null(),
                &mut resource,
            )
        };
        if let Err(err) = result {
            self.log_error("could not create texture", &err);
            return Err(err.into());
        }
        let resource =
            resource.ok_or_else(|| Error::new("gfx::d3d12: failed to create texture"))?;

        // colour and depth targets get a view heap of their own so passes can
        // bind them directly
        let mut rtv_heap = None;
        let mut rtv_handle = D3D12_CPU_DESCRIPTOR_HANDLE::default();
        let is_render_target = info
            .usage
            .intersects(TextureUsage::COLOR_TARGET | TextureUsage::DEPTH_STENCIL_TARGET);
        if info.usage.contains(TextureUsage::COLOR_TARGET) {
            let heap: ID3D12DescriptorHeap = unsafe {
                self.device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    NumDescriptors: 1,
                    Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                    ..Default::default()
                })?
            };
            rtv_handle = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
            unsafe {
                self.device
                    .CreateRenderTargetView(&resource, std::ptr::null(), &rtv_handle);
            }
            rtv_heap = Some(heap);
        } else if info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
            let heap: ID3D12DescriptorHeap = unsafe {
                self.device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    NumDescriptors: 1,
                    Type: D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
                    ..Default::default()
                })?
            };
            rtv_handle = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
            unsafe {
                self.device
                    .CreateDepthStencilView(&resource, std::ptr::null(), &rtv_handle);
            }
            rtv_heap = Some(heap);
        }

        Ok(TextureRes::D3d12(Texture {
            desc: unsafe { resource.GetDesc() },
            resource,
            rtv_heap,
            rtv_handle,
            is_render_target,
        }))
    }

    fn create_buffer(&mut self, info: &BufferInfo) -> std::result::Result<BufferRes, Error> {
        let resource = self.create_committed_buffer(
            D3D12_HEAP_TYPE_DEFAULT,
            info.size as u64,
            D3D12_RESOURCE_STATE_COMMON,
        )?;
        Ok(BufferRes::D3d12(Buffer {
            resource,
            size: info.size,
        }))
    }

    fn create_transfer_buffer(
        &mut self,
        info: &TransferBufferInfo,
    ) -> std::result::Result<TransferBufferRes, Error> {
        let (heap_type, initial_state) = match info.usage {
            TransferBufferUsage::Upload => {
                (D3D12_HEAP_TYPE_UPLOAD, D3D12_RESOURCE_STATE_GENERIC_READ)
            }
            TransferBufferUsage::Download => {
                (D3D12_HEAP_TYPE_READBACK, D3D12_RESOURCE_STATE_COPY_DEST)
            }
        };
        let resource = self.create_committed_buffer(heap_type, info.size as u64, initial_state)?;
        Ok(TransferBufferRes::D3d12(TransferBuffer {
            resource,
            size: info.size,
        }))
    }

    fn create_sampler(&mut self, info: &SamplerInfo) -> std::result::Result<SamplerRes, Error> {
        Ok(SamplerRes::D3d12(Sampler {
            desc: D3D12_SAMPLER_DESC {
                Filter: to_d3d12_filter(info),
                AddressU: to_d3d12_address_mode(info.address_mode_u),
                AddressV: to_d3d12_address_mode(info.address_mode_v),
                AddressW: to_d3d12_address_mode(info.address_mode_w),
                MipLODBias: 0.0,
                MaxAnisotropy: info.max_anisotropy,
                ComparisonFunc: D3D12_COMPARISON_FUNC_NEVER,
                BorderColor: [0.0; 4],
                MinLOD: info.min_lod,
                MaxLOD: info.max_lod,
            },
        }))
    }

    fn create_shader(&mut self, info: &ShaderInfo) -> std::result::Result<ShaderRes, Error> {
        let bytecode =
            self.create_shader_bytecode(info.stage, info.format, info.code, info.entry_point)?;
        Ok(ShaderRes::D3d12(Shader {
            bytecode: Rc::new(bytecode),
        }))
    }

    fn create_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> std::result::Result<GraphicsPipelineRes, Error> {
        let vert = shader(info.vertex_shader);
        let frag = shader(info.fragment_shader);
        let vertex_counts = info.vertex_shader.counts;
        let fragment_counts = info.fragment_shader.counts;

        // a graphics signature is shared between the stages, sized by the
        // element-wise maximum of their counts
        let (root_signature, slots) = self.create_root_signature(
            vertex_counts.samplers.max(fragment_counts.samplers),
            vertex_counts
                .uniform_buffers
                .max(fragment_counts.uniform_buffers),
            vertex_counts
                .storage_buffers
                .max(fragment_counts.storage_buffers),
            vertex_counts
                .storage_textures
                .max(fragment_counts.storage_textures),
        )?;

        // semantics follow the TEXCOORD<location> convention of the shader toolchain
        let input_element_descs: Vec<D3D12_INPUT_ELEMENT_DESC> = info
            .vertex_input_state
            .vertex_attributes
            .iter()
            .map(|attribute| {
                let binding = info
                    .vertex_input_state
                    .vertex_bindings
                    .iter()
                    .find(|binding| binding.binding == attribute.binding);
                D3D12_INPUT_ELEMENT_DESC {
                    SemanticName: PSTR(b"TEXCOORD\0".as_ptr() as _),
                    SemanticIndex: attribute.location,
                    Format: to_dxgi_vertex_format(attribute.format),
                    InputSlot: attribute.binding,
                    AlignedByteOffset: attribute.offset,
                    InputSlotClass: binding
                        .map(|b| to_d3d12_input_classification(b.input_rate))
                        .unwrap_or(D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA),
                    InstanceDataStepRate: binding.map(|b| b.step_rate).unwrap_or(0),
                }
            })
            .collect();

        let rasterizer = D3D12_RASTERIZER_DESC {
            FillMode: to_d3d12_fill_mode(info.rasterizer_state.fill_mode),
            CullMode: to_d3d12_cull_mode(info.rasterizer_state.cull_mode),
            FrontCounterClockwise: BOOL::from(
                info.rasterizer_state.front_face == FrontFace::CounterClockwise,
            ),
            DepthBias: if info.rasterizer_state.depth_bias_enable {
                info.rasterizer_state.depth_bias_constant_factor.round() as i32
            } else {
                0
            },
            DepthBiasClamp: if info.rasterizer_state.depth_bias_enable {
                info.rasterizer_state.depth_bias_clamp
            } else {
                0.0
            },
            SlopeScaledDepthBias: if info.rasterizer_state.depth_bias_enable {
                info.rasterizer_state.depth_bias_slope_factor
            } else {
                0.0
            },
            DepthClipEnable: BOOL::from(true),
            MultisampleEnable: BOOL::from(false),
            AntialiasedLineEnable: BOOL::from(false),
            ForcedSampleCount: 0,
            ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
        };

        let identity_blend = D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: BOOL::from(false),
            LogicOpEnable: BOOL::from(false),
            SrcBlend: D3D12_BLEND_ONE,
            DestBlend: D3D12_BLEND_ZERO,
            BlendOp: D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: D3D12_BLEND_ONE,
            DestBlendAlpha: D3D12_BLEND_ZERO,
            BlendOpAlpha: D3D12_BLEND_OP_ADD,
            LogicOp: D3D12_LOGIC_OP_NOOP,
            RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
        };
        let mut blend = D3D12_BLEND_DESC {
            AlphaToCoverageEnable: BOOL::from(false),
            IndependentBlendEnable: BOOL::from(false),
            RenderTarget: [identity_blend; 8],
        };
        let color_attachments = &info.attachment_info.color_attachment_descriptions;
        for (i, attachment) in color_attachments.iter().enumerate() {
            let state = &attachment.blend_state;
            blend.RenderTarget[i] = D3D12_RENDER_TARGET_BLEND_DESC {
                BlendEnable: BOOL::from(state.blend_enable),
                LogicOpEnable: BOOL::from(false),
                SrcBlend: to_d3d12_blend_factor(state.src_color_blend_factor),
                DestBlend: to_d3d12_blend_factor(state.dst_color_blend_factor),
                BlendOp: to_d3d12_blend_op(state.color_blend_op),
                SrcBlendAlpha: to_d3d12_blend_factor_alpha(state.src_alpha_blend_factor),
                DestBlendAlpha: to_d3d12_blend_factor_alpha(state.dst_alpha_blend_factor),
                BlendOpAlpha: to_d3d12_blend_op(state.alpha_blend_op),
                LogicOp: D3D12_LOGIC_OP_NOOP,
                RenderTargetWriteMask: state.color_write_mask.bits() as u8,
            };
            if i > 0 {
                blend.IndependentBlendEnable = BOOL::from(true);
            }
        }

        let ds = &info.depth_stencil_state;
        let depth_stencil = D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: BOOL::from(ds.depth_test_enable),
            DepthWriteMask: if ds.depth_write_enable {
                D3D12_DEPTH_WRITE_MASK_ALL
            } else {
                D3D12_DEPTH_WRITE_MASK_ZERO
            },
            DepthFunc: to_d3d12_compare_op(ds.compare_op),
            StencilEnable: BOOL::from(ds.stencil_test_enable),
            StencilReadMask: ds.compare_mask as u8,
            StencilWriteMask: ds.write_mask as u8,
            FrontFace: D3D12_DEPTH_STENCILOP_DESC {
                StencilFailOp: to_d3d12_stencil_op(ds.front_stencil_state.fail_op),
                StencilDepthFailOp: to_d3d12_stencil_op(ds.front_stencil_state.depth_fail_op),
                StencilPassOp: to_d3d12_stencil_op(ds.front_stencil_state.pass_op),
                StencilFunc: to_d3d12_compare_op(ds.front_stencil_state.compare_op),
            },
            BackFace: D3D12_DEPTH_STENCILOP_DESC {
                StencilFailOp: to_d3d12_stencil_op(ds.back_stencil_state.fail_op),
                StencilDepthFailOp: to_d3d12_stencil_op(ds.back_stencil_state.depth_fail_op),
                StencilPassOp: to_d3d12_stencil_op(ds.back_stencil_state.pass_op),
                StencilFunc: to_d3d12_compare_op(ds.back_stencil_state.compare_op),
            },
        };

        let mut desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: Some(root_signature.clone()),
            VS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: vert.bytecode.as_ptr() as *const c_void,
                BytecodeLength: vert.bytecode.len(),
            },
            PS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: frag.bytecode.as_ptr() as *const c_void,
                BytecodeLength: frag.bytecode.len(),
            },
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: if input_element_descs.is_empty() {
                    std::ptr::null()
                } else {
                    input_element_descs.as_ptr()
                },
                NumElements: input_element_descs.len() as u32,
            },
            RasterizerState: rasterizer,
            BlendState: blend,
            DepthStencilState: depth_stencil,
            SampleMask: info.multisample_state.sample_mask,
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: color_attachments.len() as u32,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: info.multisample_state.multisample_count.as_u32(),
                Quality: 0,
            },
            DSVFormat: info
                .attachment_info
                .depth_stencil_format
                .map(to_dxgi_format)
                .unwrap_or(DXGI_FORMAT_UNKNOWN),
            ..Default::default()
        };
        for (i, attachment) in color_attachments.iter().enumerate() {
            desc.RTVFormats[i] = to_dxgi_format(attachment.format);
        }

        let pipeline_state = match unsafe { self.device.CreateGraphicsPipelineState(&desc) } {
            Ok(pipeline_state) => pipeline_state,
            Err(err) => {
                self.log_error("could not create graphics pipeline state", &err);
                return Err(err.into());
            }
        };

        let vertex_strides = info
            .vertex_input_state
            .vertex_bindings
            .iter()
            .map(|binding| (binding.binding, binding.stride))
            .collect();

        Ok(GraphicsPipelineRes::D3d12(GraphicsPipeline {
            pipeline_state,
            root_signature,
            slots,
            primitive_type: info.primitive_type,
            blend_constants: info.blend_constants,
            stencil_ref: info.depth_stencil_state.reference,
            vertex_strides: Rc::new(vertex_strides),
        }))
    }

    fn create_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> std::result::Result<ComputePipelineRes, Error> {
        let bytecode = self.create_shader_bytecode(
            ShaderStage::Compute,
            info.format,
            info.code,
            info.entry_point,
        )?;
        let (root_signature, slots) = self.create_root_signature(
            0,
            info.uniform_buffer_count,
            info.read_only_storage_buffer_count + info.read_write_storage_buffer_count,
            info.read_only_storage_texture_count + info.read_write_storage_texture_count,
        )?;

        let desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: Some(root_signature.clone()),
            CS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: bytecode.as_ptr() as *const c_void,
                BytecodeLength: bytecode.len(),
            },
            ..Default::default()
        };
        let pipeline_state = match unsafe { self.device.CreateComputePipelineState(&desc) } {
            Ok(pipeline_state) => pipeline_state,
            Err(err) => {
                self.log_error("could not create compute pipeline state", &err);
                return Err(err.into());
            }
        };

        Ok(ComputePipelineRes::D3d12(ComputePipeline {
            pipeline_state,
            root_signature,
            slots,
        }))
    }

    fn set_buffer_name(&mut self, buf: &super::Buffer, name: &str) {
        unsafe {
            let _ = buffer(buf).resource.SetName(name);
        }
    }

    fn set_texture_name(&mut self, tex: &super::Texture, name: &str) {
        unsafe {
            let _ = texture(tex).resource.SetName(name);
        }
    }

    fn supports_texture_format(
        &self,
        format: TextureFormat,
        texture_type: TextureType,
        usage: TextureUsage,
    ) -> bool {
        let mut support = D3D12_FEATURE_DATA_FORMAT_SUPPORT {
            Format: to_dxgi_format(format),
            ..Default::default()
        };
        let result = unsafe {
            self.device.CheckFeatureSupport(
                D3D12_FEATURE_FORMAT_SUPPORT,
                &mut support as *mut _ as *mut c_void,
                std::mem::size_of::<D3D12_FEATURE_DATA_FORMAT_SUPPORT>() as u32,
            )
        };
        if result.is_err() {
            return false;
        }

        let support1 = support.Support1;
        if texture_type == TextureType::Texture3D
            && (support1 & D3D12_FORMAT_SUPPORT1_TEXTURE3D) == D3D12_FORMAT_SUPPORT1_NONE
        {
            return false;
        }
        if texture_type == TextureType::Cube
            && (support1 & D3D12_FORMAT_SUPPORT1_TEXTURECUBE) == D3D12_FORMAT_SUPPORT1_NONE
        {
            return false;
        }
        if usage.contains(TextureUsage::SAMPLER)
            && (support1 & D3D12_FORMAT_SUPPORT1_SHADER_SAMPLE) == D3D12_FORMAT_SUPPORT1_NONE
        {
            return false;
        }
        if usage.contains(TextureUsage::COLOR_TARGET)
            && (support1 & D3D12_FORMAT_SUPPORT1_RENDER_TARGET) == D3D12_FORMAT_SUPPORT1_NONE
        {
            return false;
        }
        if usage.contains(TextureUsage::DEPTH_STENCIL_TARGET)
            && (support1 & D3D12_FORMAT_SUPPORT1_DEPTH_STENCIL) == D3D12_FORMAT_SUPPORT1_NONE
        {
            return false;
        }
        if usage.intersects(TextureUsage::COMPUTE_STORAGE_WRITE | TextureUsage::COMPUTE_STORAGE_READ)
            && (support1 & D3D12_FORMAT_SUPPORT1_TYPED_UNORDERED_ACCESS_VIEW)
                == D3D12_FORMAT_SUPPORT1_NONE
        {
            return false;
        }
        true
    }

    fn get_best_sample_count(&self, format: TextureFormat, desired: SampleCount) -> SampleCount {
        let candidates = [
            SampleCount::Eight,
            SampleCount::Four,
            SampleCount::Two,
            SampleCount::One,
        ];
        for candidate in candidates {
            if candidate > desired {
                continue;
            }
            let mut levels = D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS {
                Format: to_dxgi_format(format),
                SampleCount: candidate.as_u32(),
                ..Default::default()
            };
            let result = unsafe {
                self.device.CheckFeatureSupport(
                    D3D12_FEATURE_MULTISAMPLE_QUALITY_LEVELS,
                    &mut levels as *mut _ as *mut c_void,
                    std::mem::size_of::<D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS>() as u32,
                )
            };
            if result.is_ok() && levels.NumQualityLevels > 0 {
                return candidate;
            }
        }
        SampleCount::One
    }

    fn acquire_command_buffer(&mut self) -> std::result::Result<(), Error> {
        // the recorder is reset at submit time, nothing to do between frames
        Ok(())
    }

    fn push_uniform_data(&mut self, _stage: ShaderStage, slot: u32, data: &[u8]) {
        if slot >= MAX_UNIFORM_BUFFERS {
            log::error!("gfx::d3d12: uniform slot {} out of range", slot);
            return;
        }

        let needs_new = {
            let cmd = self.cmd.borrow();
            match &cmd.uniform_buffers[slot as usize] {
                Some(lease) => lease.write_offset + data.len() as u32 > lease.size,
                None => true,
            }
        };
        if needs_new {
            let lease = match self.acquire_uniform_buffer(UNIFORM_BUFFER_SIZE) {
                Ok(lease) => lease,
                Err(err) => {
                    log::error!("gfx::d3d12: could not lease uniform buffer: {:?}", err);
                    return;
                }
            };
            let mut cmd = self.cmd.borrow_mut();
            // a full lease stays alive on the used list until the submit fence proves
            // the gpu is done reading it
            if let Some(old) = cmd.uniform_buffers[slot as usize].replace(lease) {
                cmd.used_uniform_buffers.push(old);
            }
        }

        let mut cmd = self.cmd.borrow_mut();
        let lease = cmd.uniform_buffers[slot as usize].as_mut().expect("leased above");
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                lease.mapped.add(lease.write_offset as usize),
                data.len(),
            );
        }
        lease.draw_offset = lease.write_offset;
        let aligned = (data.len() as u32 + UNIFORM_BUFFER_ALIGNMENT - 1)
            & !(UNIFORM_BUFFER_ALIGNMENT - 1);
        lease.write_offset += aligned;

        // refresh the descriptor so the next flush sees the new draw offset
        let location = unsafe { lease.resource.GetGPUVirtualAddress() } + lease.draw_offset as u64;
        let cbv_desc = D3D12_CONSTANT_BUFFER_VIEW_DESC {
            BufferLocation: location,
            SizeInBytes: UNIFORM_BUFFER_ALIGNMENT.max(aligned),
        };
        let handle = cmd.view_cpu_handle(UNIFORM_REGION + slot);
        unsafe {
            self.device.CreateConstantBufferView(&cbv_desc, &handle);
        }

        cmd.need_vertex_uniform_bind = true;
        cmd.need_fragment_uniform_bind = true;
    }

    fn begin_render_pass(
        &mut self,
        color_attachments: &[ColorAttachmentInfo],
        depth_stencil_attachment: Option<&DepthStencilAttachmentInfo>,
    ) {
        let mut cmd = self.cmd.borrow_mut();

        // The framebuffer cannot be larger than the smallest attachment.
        let mut framebuffer_width = u32::MAX;
        let mut framebuffer_height = u32::MAX;

        for attachment in color_attachments {
            let tex = texture(&attachment.texture_slice.texture);
            let w = (tex.desc.Width as u32) >> attachment.texture_slice.mip_level;
            let h = tex.desc.Height >> attachment.texture_slice.mip_level;
            framebuffer_width = framebuffer_width.min(w);
            framebuffer_height = framebuffer_height.min(h);
            if !tex.is_render_target {
                log::error!("gfx::d3d12: color attachment texture was not designated as a target!");
                return;
            }
        }
        if let Some(attachment) = depth_stencil_attachment {
            let tex = texture(&attachment.texture_slice.texture);
            let w = (tex.desc.Width as u32) >> attachment.texture_slice.mip_level;
            let h = tex.desc.Height >> attachment.texture_slice.mip_level;
            framebuffer_width = framebuffer_width.min(w);
            framebuffer_height = framebuffer_height.min(h);
            if !tex.is_render_target {
                log::error!(
                    "gfx::d3d12: depth stencil attachment texture was not designated as a target!"
                );
                return;
            }
        }

        let mut rtv_handles: Vec<D3D12_CPU_DESCRIPTOR_HANDLE> = Vec::new();
        for attachment in color_attachments {
            let tex = texture(&attachment.texture_slice.texture).clone();

            unsafe {
                let barrier = transition_barrier(
                    &tex.resource,
                    D3D12_RESOURCE_STATE_PRESENT,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                );
                cmd.list.ResourceBarrier(1, &barrier);
                let _: D3D12_RESOURCE_TRANSITION_BARRIER =
                    std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);
            }

            if attachment.load_op == LoadOp::Clear {
                let clear_color = [
                    attachment.clear_color.r,
                    attachment.clear_color.g,
                    attachment.clear_color.b,
                    attachment.clear_color.a,
                ];
                unsafe {
                    cmd.list.ClearRenderTargetView(
                        tex.rtv_handle,
                        clear_color.as_ptr(),
                        0,
                        std::ptr::null(),
                    );
                }
            }

            rtv_handles.push(tex.rtv_handle);
            cmd.color_attachments.push(tex);
        }

        let dsv_handle = depth_stencil_attachment.map(|attachment| {
            let tex = texture(&attachment.texture_slice.texture);
            if attachment.load_op == LoadOp::Clear {
                unsafe {
                    cmd.list.ClearDepthStencilView(
                        tex.rtv_handle,
                        D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL,
                        attachment.depth_stencil_clear_value.depth,
                        attachment.depth_stencil_clear_value.stencil as u8,
                        0,
                        std::ptr::null(),
                    );
                }
            }
            tex.rtv_handle
        });

        unsafe {
            cmd.list.OMSetRenderTargets(
                rtv_handles.len() as u32,
                if rtv_handles.is_empty() {
                    std::ptr::null()
                } else {
                    rtv_handles.as_ptr()
                },
                false,
                match &dsv_handle {
                    Some(handle) => handle,
                    None => std::ptr::null(),
                },
            );
        }

        // sensible full-framebuffer defaults until the caller sets its own
        if framebuffer_width != u32::MAX {
            let viewport = D3D12_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: framebuffer_width as f32,
                Height: framebuffer_height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };
            let scissor = RECT {
                left: 0,
                top: 0,
                right: framebuffer_width as i32,
                bottom: framebuffer_height as i32,
            };
            unsafe {
                cmd.list.RSSetViewports(1, &viewport);
                cmd.list.RSSetScissorRects(1, &scissor);
            }
        }
    }

    fn end_render_pass(&mut self) {
        let mut cmd = self.cmd.borrow_mut();
        let attachments = std::mem::take(&mut cmd.color_attachments);
        for tex in attachments {
            unsafe {
                let barrier = transition_barrier(
                    &tex.resource,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                    D3D12_RESOURCE_STATE_PRESENT,
                );
                cmd.list.ResourceBarrier(1, &barrier);
                let _: D3D12_RESOURCE_TRANSITION_BARRIER =
                    std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);
            }
        }
        cmd.current_graphics = None;
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let cmd = self.cmd.borrow();
        let d3d12_viewport = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        unsafe {
            cmd.list.RSSetViewports(1, &d3d12_viewport);
        }
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        let cmd = self.cmd.borrow();
        let rect = RECT {
            left: scissor.x,
            top: scissor.y,
            right: scissor.x + scissor.width,
            bottom: scissor.y + scissor.height,
        };
        unsafe {
            cmd.list.RSSetScissorRects(1, &rect);
        }
    }

    fn bind_graphics_pipeline(&mut self, pipeline: &super::GraphicsPipeline) {
        let leases: Vec<(u32, UniformBuffer)> = {
            let cmd = self.cmd.borrow();
            let uniform_count = pipeline
                .vertex_counts
                .uniform_buffers
                .max(pipeline.fragment_counts.uniform_buffers);
            (0..uniform_count)
                .filter(|slot| cmd.uniform_buffers[*slot as usize].is_none())
                .map(|slot| (slot, self.acquire_uniform_buffer(UNIFORM_BUFFER_SIZE)))
                .filter_map(|(slot, lease)| match lease {
                    Ok(lease) => Some((slot, lease)),
                    Err(err) => {
                        log::error!("gfx::d3d12: could not lease uniform buffer: {:?}", err);
                        None
                    }
                })
                .collect()
        };

        let mut cmd = self.cmd.borrow_mut();
        let native = graphics_pipeline(pipeline).clone();

        unsafe {
            cmd.list.SetPipelineState(&native.pipeline_state);
            cmd.list.SetGraphicsRootSignature(&native.root_signature);
            cmd.list
                .IASetPrimitiveTopology(to_d3d12_primitive_topology(pipeline.primitive_type));
            cmd.list.OMSetBlendFactor(native.blend_constants.as_ptr());
            cmd.list.OMSetStencilRef(native.stencil_ref);

            let mut heaps = [Some(cmd.view_heap.clone()), Some(cmd.sampler_heap.clone())];
            cmd.list.SetDescriptorHeaps(heaps.len() as u32, heaps.as_mut_ptr());
        }

        // pre-seed the uniform descriptor table from lazily acquired pooled buffers
        for (slot, lease) in leases {
            let location = unsafe { lease.resource.GetGPUVirtualAddress() };
            let cbv_desc = D3D12_CONSTANT_BUFFER_VIEW_DESC {
                BufferLocation: location,
                SizeInBytes: lease.size,
            };
            let handle = cmd.view_cpu_handle(UNIFORM_REGION + slot);
            unsafe {
                self.device.CreateConstantBufferView(&cbv_desc, &handle);
            }
            cmd.uniform_buffers[slot as usize] = Some(lease);
        }

        cmd.current_graphics = Some(native);
        cmd.current_graphics_counts = (pipeline.vertex_counts, pipeline.fragment_counts);
        cmd.need_vertex_uniform_bind = true;
        cmd.need_fragment_uniform_bind = true;
        cmd.need_vertex_sampler_bind = true;
        cmd.need_fragment_sampler_bind = true;
        cmd.need_vertex_resource_bind = true;
        cmd.need_fragment_resource_bind = true;
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, bindings: &[BufferBinding]) {
        let cmd = self.cmd.borrow();
        let strides = cmd
            .current_graphics
            .as_ref()
            .map(|pipeline| pipeline.vertex_strides.clone());
        for (i, binding) in bindings.iter().enumerate() {
            let slot = first_binding + i as u32;
            let stride = strides
                .as_ref()
                .and_then(|strides| {
                    strides
                        .iter()
                        .find(|(binding_slot, _)| *binding_slot == slot)
                        .map(|(_, stride)| *stride)
                })
                .unwrap_or(0);
            let buf = buffer(&binding.buffer);
            let view = D3D12_VERTEX_BUFFER_VIEW {
                BufferLocation: unsafe { buf.resource.GetGPUVirtualAddress() }
                    + binding.offset as u64,
                SizeInBytes: buf.size - binding.offset,
                StrideInBytes: stride,
            };
            unsafe {
                cmd.list.IASetVertexBuffers(slot, 1, &view);
            }
        }
    }

    fn bind_index_buffer(&mut self, binding: &BufferBinding, index_element_size: IndexElementSize) {
        let cmd = self.cmd.borrow();
        let buf = buffer(&binding.buffer);
        let view = D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: unsafe { buf.resource.GetGPUVirtualAddress() } + binding.offset as u64,
            SizeInBytes: buf.size - binding.offset,
            Format: match index_element_size {
                IndexElementSize::U16 => DXGI_FORMAT_R16_UINT,
                IndexElementSize::U32 => DXGI_FORMAT_R32_UINT,
            },
        };
        unsafe {
            cmd.list.IASetIndexBuffer(&view);
        }
    }

    fn bind_samplers(
        &mut self,
        stage: ShaderStage,
        first_slot: u32,
        bindings: &[TextureSamplerBinding],
    ) {
        let mut cmd = self.cmd.borrow_mut();
        for (i, binding) in bindings.iter().enumerate() {
            let slot = first_slot + i as u32;
            if slot >= MAX_SAMPLERS {
                log::error!("gfx::d3d12: sampler slot {} out of range", slot);
                return;
            }
            let handle = cmd.sampler_cpu_handle(slot);
            unsafe {
                self.device.CreateSampler(&sampler(&binding.sampler).desc, &handle);
            }
            // stage the paired texture view alongside the sampler
            let tex = texture(&binding.texture);
            let srv_desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                Format: tex.desc.Format,
                ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
                Shader4ComponentMapping: DEFAULT_4_COMPONENT_MAPPING,
                Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2D: D3D12_TEX2D_SRV {
                        MostDetailedMip: 0,
                        MipLevels: tex.desc.MipLevels as u32,
                        PlaneSlice: 0,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            };
            let srv_handle = cmd.view_cpu_handle(TEXTURE_SRV_REGION + slot);
            unsafe {
                self.device
                    .CreateShaderResourceView(&tex.resource, &srv_desc, &srv_handle);
            }
        }
        match stage {
            ShaderStage::Vertex => cmd.need_vertex_sampler_bind = true,
            ShaderStage::Fragment => cmd.need_fragment_sampler_bind = true,
            ShaderStage::Compute => {}
        }
    }

    fn bind_storage_textures(&mut self, stage: ShaderStage, first_slot: u32, slices: &[TextureSlice]) {
        let mut cmd = self.cmd.borrow_mut();
        for (i, slice) in slices.iter().enumerate() {
            let slot = first_slot + i as u32;
            if slot >= MAX_STORAGE_TEXTURES {
                log::error!("gfx::d3d12: storage texture slot {} out of range", slot);
                return;
            }
            let tex = texture(&slice.texture);
            let uav_desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                Format: tex.desc.Format,
                ViewDimension: D3D12_UAV_DIMENSION_TEXTURE2D,
                Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture2D: D3D12_TEX2D_UAV {
                        MipSlice: slice.mip_level,
                        PlaneSlice: 0,
                    },
                },
            };
            let handle = cmd.view_cpu_handle(STORAGE_TEXTURE_REGION + slot);
            unsafe {
                self.device
                    .CreateUnorderedAccessView(&tex.resource, None, &uav_desc, &handle);
            }
        }
        match stage {
            ShaderStage::Vertex => cmd.need_vertex_resource_bind = true,
            ShaderStage::Fragment => cmd.need_fragment_resource_bind = true,
            ShaderStage::Compute => {}
        }
    }

    fn bind_storage_buffers(&mut self, stage: ShaderStage, first_slot: u32, buffers: &[super::Buffer]) {
        let mut cmd = self.cmd.borrow_mut();
        for (i, buf) in buffers.iter().enumerate() {
            let slot = first_slot + i as u32;
            if slot >= MAX_STORAGE_BUFFERS {
                log::error!("gfx::d3d12: storage buffer slot {} out of range", slot);
                return;
            }
            let native = buffer(buf);
            let uav_desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                Format: DXGI_FORMAT_R32_TYPELESS,
                ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Buffer: D3D12_BUFFER_UAV {
                        FirstElement: 0,
                        NumElements: native.size / 4,
                        StructureByteStride: 0,
                        CounterOffsetInBytes: 0,
                        Flags: D3D12_BUFFER_UAV_FLAG_RAW,
                    },
                },
            };
            let handle = cmd.view_cpu_handle(STORAGE_BUFFER_REGION + slot);
            unsafe {
                self.device
                    .CreateUnorderedAccessView(&native.resource, None, &uav_desc, &handle);
            }
        }
        match stage {
            ShaderStage::Vertex => cmd.need_vertex_resource_bind = true,
            ShaderStage::Fragment => cmd.need_fragment_resource_bind = true,
            ShaderStage::Compute => {}
        }
    }

    fn draw_primitives(&mut self, vertex_start: u32, primitive_count: u32) {
        let mut cmd = self.cmd.borrow_mut();
        cmd.bind_graphics_resources();
        let primitive_type = match &cmd.current_graphics {
            Some(pipeline) => pipeline.primitive_type,
            None => return,
        };
        unsafe {
            cmd.list
                .IASetPrimitiveTopology(to_d3d12_primitive_topology(primitive_type));
            cmd.list.DrawInstanced(
                primitive_verts(primitive_type, primitive_count),
                1,
                vertex_start,
                0,
            );
        }
    }

    fn draw_indexed_primitives(
        &mut self,
        base_vertex: u32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
    ) {
        let mut cmd = self.cmd.borrow_mut();
        cmd.bind_graphics_resources();
        let primitive_type = match &cmd.current_graphics {
            Some(pipeline) => pipeline.primitive_type,
            None => return,
        };
        unsafe {
            cmd.list
                .IASetPrimitiveTopology(to_d3d12_primitive_topology(primitive_type));
            cmd.list.DrawIndexedInstanced(
                primitive_verts(primitive_type, primitive_count),
                instance_count,
                start_index,
                base_vertex as i32,
                0,
            );
        }
    }

    fn draw_primitives_indirect(
        &mut self,
        _buffer: &super::Buffer,
        _offset: u32,
        _draw_count: u32,
        _stride: u32,
    ) {
        log::error!("gfx::d3d12: indirect draws are not implemented by this backend yet");
    }

    fn draw_indexed_primitives_indirect(
        &mut self,
        _buffer: &super::Buffer,
        _offset: u32,
        _draw_count: u32,
        _stride: u32,
    ) {
        log::error!("gfx::d3d12: indirect draws are not implemented by this backend yet");
    }

    fn begin_compute_pass(
        &mut self,
        storage_texture_bindings: &[StorageTextureReadWriteBinding],
        storage_buffer_bindings: &[StorageBufferReadWriteBinding],
    ) {
        let slices: Vec<TextureSlice> = storage_texture_bindings
            .iter()
            .map(|binding| binding.texture_slice.clone())
            .collect();
        let buffers: Vec<super::Buffer> = storage_buffer_bindings
            .iter()
            .map(|binding| binding.buffer.clone())
            .collect();
        self.bind_storage_textures(ShaderStage::Compute, 0, &slices);
        self.bind_storage_buffers(ShaderStage::Compute, 0, &buffers);
    }

    fn end_compute_pass(&mut self) {
        self.cmd.borrow_mut().current_compute = None;
    }

    fn bind_compute_pipeline(&mut self, pipeline: &super::ComputePipeline) {
        let mut cmd = self.cmd.borrow_mut();
        let native = compute_pipeline(pipeline).clone();
        unsafe {
            cmd.list.SetPipelineState(&native.pipeline_state);
            cmd.list.SetComputeRootSignature(&native.root_signature);
            let mut heaps = [Some(cmd.view_heap.clone()), Some(cmd.sampler_heap.clone())];
            cmd.list.SetDescriptorHeaps(heaps.len() as u32, heaps.as_mut_ptr());

            if let Some(slot) = native.slots.uniform_table {
                cmd.list
                    .SetComputeRootDescriptorTable(slot, cmd.view_gpu_handle(UNIFORM_REGION));
            }
            if let Some(slot) = native.slots.storage_buffer_table {
                cmd.list
                    .SetComputeRootDescriptorTable(slot, cmd.view_gpu_handle(STORAGE_BUFFER_REGION));
            }
            if let Some(slot) = native.slots.storage_texture_table {
                cmd.list.SetComputeRootDescriptorTable(
                    slot,
                    cmd.view_gpu_handle(STORAGE_TEXTURE_REGION),
                );
            }
        }
        cmd.current_compute = Some(native);
    }

    fn bind_compute_storage_textures(&mut self, first_slot: u32, slices: &[TextureSlice]) {
        self.bind_storage_textures(ShaderStage::Compute, first_slot, slices);
    }

    fn bind_compute_storage_buffers(&mut self, first_slot: u32, buffers: &[super::Buffer]) {
        self.bind_storage_buffers(ShaderStage::Compute, first_slot, buffers);
    }

    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        let cmd = self.cmd.borrow();
        if cmd.current_compute.is_none() {
            return;
        }
        unsafe {
            cmd.list.Dispatch(group_count_x, group_count_y, group_count_z);
        }
    }

    fn dispatch_compute_indirect(&mut self, _buffer: &super::Buffer, _offset: u32) {
        log::error!("gfx::d3d12: indirect dispatch is not implemented by this backend yet");
    }

    fn begin_copy_pass(&mut self) {}

    fn end_copy_pass(&mut self) {}

    fn upload_to_texture(
        &mut self,
        source: &TextureTransferInfo,
        destination: &TextureRegion,
        _cycle: bool,
    ) {
        let cmd = self.cmd.borrow();
        let dst = texture(&destination.texture_slice.texture);
        let src = transfer_buffer(&source.transfer_buffer);

        let block_size = destination.texture_slice.texture.info.format.texel_block_size();
        let pixels_per_row = if source.image_pitch > 0 {
            source.image_pitch
        } else {
            destination.w
        };

        let subresource = destination.texture_slice.mip_level
            + destination.texture_slice.layer * dst.desc.MipLevels as u32;

        let dst_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: Some(dst.resource.clone()),
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                SubresourceIndex: subresource,
            },
        };
        let src_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: Some(src.resource.clone()),
            Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                    Offset: source.offset as u64,
                    Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                        Format: dst.desc.Format,
                        Width: destination.w,
                        Height: destination.h,
                        Depth: destination.d.max(1),
                        RowPitch: pixels_per_row * block_size,
                    },
                },
            },
        };

        unsafe {
            let barrier = transition_barrier(
                &dst.resource,
                D3D12_RESOURCE_STATE_COMMON,
                D3D12_RESOURCE_STATE_COPY_DEST,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);

            cmd.list.CopyTextureRegion(
                &dst_location,
                destination.x,
                destination.y,
                destination.z,
                &src_location,
                std::ptr::null(),
            );

            let barrier = transition_barrier(
                &dst.resource,
                D3D12_RESOURCE_STATE_COPY_DEST,
                D3D12_RESOURCE_STATE_COMMON,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);
        }
    }

    fn upload_to_buffer(
        &mut self,
        source: &TransferBufferLocation,
        destination: &BufferRegion,
        _cycle: bool,
    ) {
        let cmd = self.cmd.borrow();
        let dst = buffer(&destination.buffer);
        let src = transfer_buffer(&source.transfer_buffer);
        unsafe {
            let barrier = transition_barrier(
                &dst.resource,
                D3D12_RESOURCE_STATE_COMMON,
                D3D12_RESOURCE_STATE_COPY_DEST,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);

            cmd.list.CopyBufferRegion(
                &dst.resource,
                destination.offset as u64,
                &src.resource,
                source.offset as u64,
                destination.size as u64,
            );

            let barrier = transition_barrier(
                &dst.resource,
                D3D12_RESOURCE_STATE_COPY_DEST,
                D3D12_RESOURCE_STATE_COMMON,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);
        }
    }

    fn copy_texture_to_texture(
        &mut self,
        source: &TextureLocation,
        destination: &TextureLocation,
        w: u32,
        h: u32,
        d: u32,
        _cycle: bool,
    ) {
        let cmd = self.cmd.borrow();
        let src = texture(&source.texture_slice.texture);
        let dst = texture(&destination.texture_slice.texture);

        let src_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: Some(src.resource.clone()),
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                SubresourceIndex: source.texture_slice.mip_level
                    + source.texture_slice.layer * src.desc.MipLevels as u32,
            },
        };
        let dst_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: Some(dst.resource.clone()),
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                SubresourceIndex: destination.texture_slice.mip_level
                    + destination.texture_slice.layer * dst.desc.MipLevels as u32,
            },
        };
        let src_box = D3D12_BOX {
            left: source.x,
            top: source.y,
            front: source.z,
            right: source.x + w,
            bottom: source.y + h,
            back: source.z + d.max(1),
        };
        unsafe {
            cmd.list.CopyTextureRegion(
                &dst_location,
                destination.x,
                destination.y,
                destination.z,
                &src_location,
                &src_box,
            );
        }
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferLocation,
        destination: &BufferLocation,
        size: u32,
        _cycle: bool,
    ) {
        let cmd = self.cmd.borrow();
        unsafe {
            cmd.list.CopyBufferRegion(
                &buffer(&destination.buffer).resource,
                destination.offset as u64,
                &buffer(&source.buffer).resource,
                source.offset as u64,
                size as u64,
            );
        }
    }

    fn generate_mipmaps(&mut self, _texture: &super::Texture) {
        log::error!("gfx::d3d12: mipmap generation is not implemented by this backend yet");
    }

    fn download_from_texture(&mut self, source: &TextureRegion, destination: &TextureTransferInfo) {
        let cmd = self.cmd.borrow();
        let src = texture(&source.texture_slice.texture);
        let dst = transfer_buffer(&destination.transfer_buffer);

        let block_size = source.texture_slice.texture.info.format.texel_block_size();
        let pixels_per_row = if destination.image_pitch > 0 {
            destination.image_pitch
        } else {
            source.w
        };

        let src_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: Some(src.resource.clone()),
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                SubresourceIndex: source.texture_slice.mip_level
                    + source.texture_slice.layer * src.desc.MipLevels as u32,
            },
        };
        let dst_location = D3D12_TEXTURE_COPY_LOCATION {
            pResource: Some(dst.resource.clone()),
            Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                    Offset: destination.offset as u64,
                    Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                        Format: src.desc.Format,
                        Width: source.w,
                        Height: source.h,
                        Depth: source.d.max(1),
                        RowPitch: pixels_per_row * block_size,
                    },
                },
            },
        };
        let src_box = D3D12_BOX {
            left: source.x,
            top: source.y,
            front: source.z,
            right: source.x + source.w,
            bottom: source.y + source.h,
            back: source.z + source.d.max(1),
        };

        unsafe {
            let barrier = transition_barrier(
                &src.resource,
                D3D12_RESOURCE_STATE_COMMON,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);

            cmd.list
                .CopyTextureRegion(&dst_location, 0, 0, 0, &src_location, &src_box);

            let barrier = transition_barrier(
                &src.resource,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
                D3D12_RESOURCE_STATE_COMMON,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);
        }
    }

    fn download_from_buffer(&mut self, source: &BufferRegion, destination: &TransferBufferLocation) {
        let cmd = self.cmd.borrow();
        let src = buffer(&source.buffer);
        let dst = transfer_buffer(&destination.transfer_buffer);
        unsafe {
            let barrier = transition_barrier(
                &src.resource,
                D3D12_RESOURCE_STATE_COMMON,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);

            cmd.list.CopyBufferRegion(
                &dst.resource,
                destination.offset as u64,
                &src.resource,
                source.offset as u64,
                source.size as u64,
            );

            let barrier = transition_barrier(
                &src.resource,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
                D3D12_RESOURCE_STATE_COMMON,
            );
            cmd.list.ResourceBarrier(1, &barrier);
            let _ = std::mem::ManuallyDrop::into_inner(barrier.Anonymous.Transition);
        }
    }

    fn blit(
        &mut self,
        _source: &TextureRegion,
        _destination: &TextureRegion,
        _filter: Filter,
        _cycle: bool,
    ) {
        log::error!("gfx::d3d12: blit is not implemented by this backend yet");
    }

    fn insert_debug_label(&mut self, _text: &str) {}

    fn push_debug_group(&mut self, _name: &str) {}

    fn pop_debug_group(&mut self) {}

    fn map_transfer_buffer(&mut self, buf: &super::TransferBuffer, _cycle: bool) -> *mut u8 {
        let native = transfer_buffer(buf);
        let mut mapped = std::ptr::null_mut();
        let result = unsafe { native.resource.Map(0, std::ptr::null(), &mut mapped) };
        if let Err(err) = result {
            self.log_error("could not map transfer buffer", &err);
            return std::ptr::null_mut();
        }
        mapped as *mut u8
    }

    fn unmap_transfer_buffer(&mut self, buf: &super::TransferBuffer) {
        unsafe {
            transfer_buffer(buf).resource.Unmap(0, std::ptr::null());
        }
    }

    fn supports_swapchain_composition(
        &self,
        _window: &dyn os::Window,
        composition: SwapchainComposition,
    ) -> bool {
        // HDR compositions additionally require colour space support that can only
        // be checked against a realized swapchain
        matches!(
            composition,
            SwapchainComposition::Sdr | SwapchainComposition::SdrLinear
        )
    }

    fn supports_present_mode(&self, _window: &dyn os::Window, present_mode: PresentMode) -> bool {
        match present_mode {
            PresentMode::Vsync => true,
            PresentMode::Immediate => self.supports_tearing,
            PresentMode::Mailbox => false,
        }
    }

    fn claim_window(
        &mut self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> std::result::Result<(), Error> {
        if fetch_window_data(window).is_some() {
            log::warn!("gfx::d3d12: window already claimed!");
            return Err(Error::new("window already claimed"));
        }
        match self.create_swapchain(window, composition, present_mode) {
            Ok(data) => {
                window
                    .properties()
                    .set(WINDOW_PROPERTY_DATA, Rc::new(data));
                Ok(())
            }
            Err(err) => {
                log::error!("gfx::d3d12: could not create swapchain, failed to claim window!");
                Err(err)
            }
        }
    }

    fn unclaim_window(&mut self, window: &dyn os::Window) {
        let data = match fetch_window_data(window) {
            Some(data) => data,
            None => {
                log::warn!("gfx::d3d12: window already unclaimed!");
                return;
            }
        };
        if data.active.get() {
            log::warn!("gfx::d3d12: unclaiming a window enlisted for presentation");
        }
        window.properties().clear(WINDOW_PROPERTY_DATA);
    }

    fn set_swapchain_parameters(
        &mut self,
        window: &dyn os::Window,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> std::result::Result<(), Error> {
        if fetch_window_data(window).is_none() {
            return Err(Error::new("window has not been claimed"));
        }
        // recreate the swapchain under the new parameters
        window.properties().clear(WINDOW_PROPERTY_DATA);
        let data = self.create_swapchain(window, composition, present_mode)?;
        window.properties().set(WINDOW_PROPERTY_DATA, Rc::new(data));
        Ok(())
    }

    fn swapchain_texture_format(
        &self,
        window: &dyn os::Window,
    ) -> std::result::Result<TextureFormat, Error> {
        match fetch_window_data(window) {
            Some(data) => Ok(match data.composition.get() {
                SwapchainComposition::Sdr => TextureFormat::B8G8R8A8,
                SwapchainComposition::SdrLinear => TextureFormat::B8G8R8A8Srgb,
                SwapchainComposition::Hdr => TextureFormat::R16G16B16A16Sfloat,
                SwapchainComposition::HdrAdvanced => TextureFormat::R10G10B10A2,
            }),
            None => {
                log::error!("gfx::d3d12: cannot get swapchain format, window has not been claimed!");
                Err(Error::new("window has not been claimed"))
            }
        }
    }

    fn acquire_swapchain_texture(
        &mut self,
        window: &dyn os::Window,
    ) -> Option<(super::Texture, u32, u32)> {
        let data = fetch_window_data(window)?;
        if !data.active.get() {
            data.active.set(true);
            self.cmd.borrow_mut().active_windows.push(data.clone());
        }
        let tex = data.textures[data.frame_counter.get() as usize].clone();
        let width = tex.info.width;
        let height = tex.info.height;
        Some((tex, width, height))
    }

    fn submit(&mut self) {
        let mut cmd = self.cmd.borrow_mut();

        unsafe {
            if let Err(err) = cmd.list.Close() {
                self.log_error("could not close command list", &err);
            }
            let command_list = ID3D12CommandList::from(&cmd.list);
            cmd.queue.ExecuteCommandLists(1, &mut Some(command_list));
        }

        // present every window the command buffer touched and unlink it
        let windows = std::mem::take(&mut cmd.active_windows);
        for window in windows {
            window.active.set(false);
            unsafe {
                let result = match window.present_mode.get() {
                    PresentMode::Immediate if self.supports_tearing => window
                        .swapchain
                        .Present(0, DXGI_PRESENT_ALLOW_TEARING),
                    _ => window.swapchain.Present(1, 0),
                };
                if !result.is_ok() {
                    log::warn!("gfx::d3d12: present failed");
                }
                window
                    .frame_counter
                    .set(window.swapchain.GetCurrentBackBufferIndex());
            }
        }

        // the next-expected fence value advances even when the signal fails, the
        // per-frame fence rotation above this layer depends on it
        let fence_to_wait_for = cmd.fence_value;
        unsafe {
            if let Err(err) = cmd.queue.Signal(&cmd.fence, fence_to_wait_for) {
                self.log_error("could not signal command queue", &err);
            }
        }
        cmd.fence_value += 1;

        unsafe {
            if cmd.fence.GetCompletedValue() < fence_to_wait_for {
                if cmd
                    .fence
                    .SetEventOnCompletion(fence_to_wait_for, cmd.fence_event)
                    .is_err()
                {
                    log::error!("gfx::d3d12: failed to set fence completion event!");
                } else {
                    WaitForSingleObject(cmd.fence_event, INFINITE);
                }
            }
        }

        unsafe {
            if let Err(err) = cmd.allocator.Reset() {
                self.log_error("could not reset command allocator", &err);
            }
            if let Err(err) = cmd.list.Reset(&cmd.allocator, None) {
                self.log_error("could not reset command list", &err);
            }
        }

        // leases return to the pool once the fence wait has proven the gpu is done
        let mut used = std::mem::take(&mut cmd.used_uniform_buffers);
        for lease in cmd.uniform_buffers.iter_mut() {
            if let Some(lease) = lease.take() {
                used.push(lease);
            }
        }
        cmd.current_graphics = None;
        cmd.current_compute = None;
        drop(cmd);
        self.return_uniform_buffers(&mut used);
    }

    fn submit_and_acquire_fence(&mut self) -> std::result::Result<FenceRes, Error> {
        let (fence, value) = {
            let cmd = self.cmd.borrow();
            (cmd.fence.clone(), cmd.fence_value)
        };
        self.submit();
        Ok(FenceRes::D3d12(Fence { fence, value }))
    }

    fn wait(&mut self) {
        let cmd = self.cmd.borrow();
        let last_signalled = cmd.fence_value - 1;
        unsafe {
            if cmd.fence.GetCompletedValue() < last_signalled {
                if cmd
                    .fence
                    .SetEventOnCompletion(last_signalled, cmd.fence_event)
                    .is_ok()
                {
                    WaitForSingleObject(cmd.fence_event, INFINITE);
                }
            }
        }
    }

    fn wait_for_fences(&mut self, wait_all: bool, fences: &[&super::Fence]) {
        let cmd = self.cmd.borrow();
        for f in fences {
            let native = fence(f);
            unsafe {
                if native.fence.GetCompletedValue() < native.value {
                    if native
                        .fence
                        .SetEventOnCompletion(native.value, cmd.fence_event)
                        .is_ok()
                    {
                        WaitForSingleObject(cmd.fence_event, INFINITE);
                    }
                    if !wait_all {
                        return;
                    }
                }
            }
        }
    }

    fn query_fence(&self, f: &super::Fence) -> bool {
        let native = fence(f);
        unsafe { native.fence.GetCompletedValue() >= native.value }
    }

    fn release_fence(&mut self, _fence: &super::Fence) {}

    fn destroy(&mut self) {
        self.wait();
        let cmd = self.cmd.borrow();
        unsafe {
            CloseHandle(cmd.fence_event);
        }
    }
}
