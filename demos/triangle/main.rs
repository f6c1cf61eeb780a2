use landline::draw2d;
use landline::gfx;
use landline::os;

use draw2d::shaders::{ShaderBundle, ShaderModuleSource, ShaderSources};
use draw2d::{BlendMode, Renderer2d};

use maths_rs::Vec2f;
use maths_rs::Vec4f;

use std::rc::Rc;

/// Loads one shader entry of the renderer bundle. Bundles are produced by the
/// offline shader toolchain as one blob per target format; pass a directory of
/// `<name>.spv` files to use real ones, otherwise placeholder blobs are fed to
/// whichever backend accepts them.
fn load_sources(dir: Option<&str>, name: &str) -> ShaderSources {
    let code = dir
        .map(|dir| format!("{}/{}.spv", dir, name))
        .and_then(|path| std::fs::read(path).ok())
        .unwrap_or_else(|| vec![0u8; 16]);
    ShaderSources {
        entry_point: "main".to_string(),
        modules: vec![ShaderModuleSource {
            format: gfx::ShaderFormat::SPIRV,
            code,
        }],
    }
}

fn main() {
    env_logger::init();

    let shader_dir = std::env::args().nth(1);
    let shader_dir = shader_dir.as_deref();

    let device = gfx::Device::create(&gfx::DeviceInfo {
        shader_formats: gfx::ShaderFormat::SPIRV,
        debug_mode: true,
        prefer_low_power: false,
        driver: None,
    })
    .expect("failed to create gpu device");
    println!("created device on {:?}", device.driver());

    let bundle = ShaderBundle {
        vertex: [
            load_sources(shader_dir, "linepoint_vert"),
            load_sources(shader_dir, "tri_color_vert"),
            load_sources(shader_dir, "tri_texture_vert"),
        ],
        fragment: [
            load_sources(shader_dir, "color_frag"),
            load_sources(shader_dir, "texture_rgba_frag"),
        ],
    };

    let window = Rc::new(os::headless::Window::new(640, 480));
    let mut renderer =
        Renderer2d::new(device, window, &bundle).expect("failed to create 2d renderer");

    let positions = [
        Vec2f::new(320.0, 120.0),
        Vec2f::new(480.0, 360.0),
        Vec2f::new(160.0, 360.0),
    ];
    let colors = [
        Vec4f::new(1.0, 0.0, 0.0, 1.0),
        Vec4f::new(0.0, 1.0, 0.0, 1.0),
        Vec4f::new(0.0, 0.0, 1.0, 1.0),
    ];

    for frame in 0..8 {
        renderer.clear(Vec4f::new(0.1, 0.1, 0.1, 1.0));
        renderer.geometry(None, &positions, &colors, &[], None, BlendMode::None);
        renderer.present().expect("present failed");
        println!(
            "frame {} drawn, {} pipeline(s) cached",
            frame,
            renderer.pipeline_cache_size()
        );
    }
}
