use crate::gfx;
use crate::Error;

/// Fixed vertex shader set used by the 2d renderer
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum VertexShaderId {
    LinePoint,
    TriColor,
    TriTexture,
}

pub const NUM_VERTEX_SHADERS: usize = 3;

/// Fixed fragment shader set used by the 2d renderer
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FragmentShaderId {
    Color,
    TextureRgba,
}

pub const NUM_FRAGMENT_SHADERS: usize = 2;

/// One compiled representation of a shader, tagged by its blob format
#[derive(Clone)]
pub struct ShaderModuleSource {
    pub format: gfx::ShaderFormat,
    pub code: Vec<u8>,
}

/// Every representation the offline shader toolchain produced for one entry:
/// one byte array per target format, all sharing an entry point name
#[derive(Clone, Default)]
pub struct ShaderSources {
    pub entry_point: String,
    pub modules: Vec<ShaderModuleSource>,
}

/// The renderer's complete pre-built shader bundle, supplied by the embedder.
/// Indexed by `VertexShaderId` / `FragmentShaderId` order.
pub struct ShaderBundle {
    pub vertex: [ShaderSources; NUM_VERTEX_SHADERS],
    pub fragment: [ShaderSources; NUM_FRAGMENT_SHADERS],
}

struct ShaderMeta {
    samplers: u32,
    uniform_buffers: u32,
}

// resource counts are part of the toolchain contract and never vary per format
const VERTEX_SHADER_META: [ShaderMeta; NUM_VERTEX_SHADERS] = [
    // LinePoint
    ShaderMeta {
        samplers: 0,
        uniform_buffers: 1,
    },
    // TriColor
    ShaderMeta {
        samplers: 0,
        uniform_buffers: 1,
    },
    // TriTexture
    ShaderMeta {
        samplers: 0,
        uniform_buffers: 1,
    },
];

const FRAGMENT_SHADER_META: [ShaderMeta; NUM_FRAGMENT_SHADERS] = [
    // Color
    ShaderMeta {
        samplers: 0,
        uniform_buffers: 0,
    },
    // TextureRgba
    ShaderMeta {
        samplers: 1,
        uniform_buffers: 0,
    },
];

fn compile_shader(
    device: &gfx::Device,
    sources: &ShaderSources,
    stage: gfx::ShaderStage,
    meta: &ShaderMeta,
) -> Result<gfx::Shader, Error> {
    let module = sources
        .modules
        .iter()
        .find(|module| module.format.intersects(device.shader_formats()));
    let module = match module {
        Some(module) => module,
        None => {
            log::error!("draw2d: no shader source matches the device's accepted formats");
            return Err(Error::new("no shader source for gpu backend"));
        }
    };

    device.create_shader(&gfx::ShaderInfo {
        code: &module.code,
        entry_point: &sources.entry_point,
        format: module.format,
        stage,
        sampler_count: meta.samplers,
        storage_texture_count: 0,
        storage_buffer_count: 0,
        uniform_buffer_count: meta.uniform_buffers,
    })
}

/// The renderer's compiled shaders, created once at construction
pub(crate) struct ShaderCatalog {
    vertex: Vec<gfx::Shader>,
    fragment: Vec<gfx::Shader>,
}

impl ShaderCatalog {
    pub fn new(device: &gfx::Device, bundle: &ShaderBundle) -> Result<Self, Error> {
        let mut vertex = Vec::with_capacity(NUM_VERTEX_SHADERS);
        for (sources, meta) in bundle.vertex.iter().zip(VERTEX_SHADER_META.iter()) {
            vertex.push(compile_shader(
                device,
                sources,
                gfx::ShaderStage::Vertex,
                meta,
            )?);
        }
        let mut fragment = Vec::with_capacity(NUM_FRAGMENT_SHADERS);
        for (sources, meta) in bundle.fragment.iter().zip(FRAGMENT_SHADER_META.iter()) {
            fragment.push(compile_shader(
                device,
                sources,
                gfx::ShaderStage::Fragment,
                meta,
            )?);
        }
        Ok(ShaderCatalog { vertex, fragment })
    }

    pub fn vertex(&self, id: VertexShaderId) -> &gfx::Shader {
        &self.vertex[id as usize]
    }

    pub fn fragment(&self, id: FragmentShaderId) -> &gfx::Shader {
        &self.fragment[id as usize]
    }
}
