use landline::draw2d;
use landline::gfx;
use landline::os;

use draw2d::shaders::{ShaderBundle, ShaderModuleSource, ShaderSources};
use draw2d::{AddressMode, BlendMode, Renderer2d, ScaleMode, TextureAccess};

use maths_rs::Vec2f;
use maths_rs::Vec4f;

use std::rc::Rc;

fn create_device() -> gfx::Device {
    gfx::Device::create(&gfx::DeviceInfo {
        shader_formats: gfx::ShaderFormat::SPIRV,
        debug_mode: true,
        prefer_low_power: false,
        driver: Some("null".to_string()),
    })
    .unwrap()
}

fn test_sources() -> ShaderSources {
    ShaderSources {
        entry_point: "main".to_string(),
        modules: vec![ShaderModuleSource {
            format: gfx::ShaderFormat::SPIRV,
            code: vec![0u8; 16],
        }],
    }
}

fn test_bundle() -> ShaderBundle {
    ShaderBundle {
        vertex: [test_sources(), test_sources(), test_sources()],
        fragment: [test_sources(), test_sources()],
    }
}

fn create_renderer() -> (Renderer2d, gfx::null::Stats, Rc<os::headless::Window>) {
    let device = create_device();
    let stats = gfx::null::stats(&device).unwrap();
    let window = Rc::new(os::headless::Window::new(640, 480));
    let renderer = Renderer2d::new(device, window.clone(), &test_bundle()).unwrap();
    (renderer, stats, window)
}

#[test]
fn clear_only_frames() {
    let (mut renderer, stats, window) = create_renderer();

    let mut expected_counter = 0;
    for _ in 0..3 {
        assert_eq!(
            gfx::null::window_frame_counter(window.as_ref()),
            Some(expected_counter)
        );
        renderer.clear(Vec4f::new(0.25, 0.5, 0.75, 1.0));
        renderer.present().unwrap();
        expected_counter = (expected_counter + 1) % 2;
    }

    assert_eq!(
        stats.last_clear_color(),
        Some(gfx::Color {
            r: 0.25,
            g: 0.5,
            b: 0.75,
            a: 1.0
        })
    );
    // no draws were issued, every frame was a bare clear pass
    assert_eq!(stats.draw_calls(), 0);
    assert_eq!(stats.render_passes(), 3);
}

#[test]
fn triangle_draw_uses_one_cached_pipeline() {
    let (mut renderer, stats, _window) = create_renderer();

    let positions = [
        Vec2f::new(0.0, 0.0),
        Vec2f::new(10.0, 0.0),
        Vec2f::new(0.0, 10.0),
    ];
    let colors = [Vec4f::new(1.0, 0.0, 0.0, 1.0); 3];

    renderer.geometry(None, &positions, &colors, &[], None, BlendMode::None);
    renderer.present().unwrap();

    // the pipeline cache grows by exactly one and the draw is issued with
    // vertex count 3
    assert_eq!(renderer.pipeline_cache_size(), 1);
    assert_eq!(stats.draw_calls(), 1);
    assert_eq!(stats.last_draw_vertex_count(), Some(3));

    // the same state on the next frame reuses the pipeline
    renderer.geometry(None, &positions, &colors, &[], None, BlendMode::None);
    renderer.present().unwrap();
    assert_eq!(renderer.pipeline_cache_size(), 1);
    assert_eq!(stats.draw_calls(), 2);
}

#[test]
fn adjacent_points_coalesce_into_one_draw() {
    let (mut renderer, stats, _window) = create_renderer();

    for i in 0..50 {
        renderer.draw_points(&[Vec2f::new(i as f32, i as f32)], BlendMode::None);
    }
    renderer.present().unwrap();

    assert_eq!(stats.draw_calls(), 1);
    assert_eq!(stats.last_draw_vertex_count(), Some(50));
}

#[test]
fn blend_mode_changes_break_batches() {
    let (mut renderer, stats, _window) = create_renderer();

    renderer.draw_points(&[Vec2f::new(0.0, 0.0)], BlendMode::None);
    renderer.draw_points(&[Vec2f::new(1.0, 0.0)], BlendMode::None);
    renderer.draw_points(&[Vec2f::new(2.0, 0.0)], BlendMode::Blend);
    renderer.present().unwrap();

    assert_eq!(stats.draw_calls(), 2);
    let draws = stats.draws();
    assert_eq!(draws[0].vertex_count, 2);
    assert_eq!(draws[1].vertex_count, 1);
}

#[test]
fn two_vertex_segments_merge_but_joined_lines_do_not() {
    let (mut renderer, stats, _window) = create_renderer();

    renderer.draw_line(Vec2f::new(0.0, 0.0), Vec2f::new(1.0, 0.0), BlendMode::None);
    renderer.draw_line(Vec2f::new(1.0, 0.0), Vec2f::new(2.0, 0.0), BlendMode::None);
    renderer.draw_line(Vec2f::new(2.0, 0.0), Vec2f::new(3.0, 0.0), BlendMode::None);
    renderer.present().unwrap();

    // three segments fold into a single line-list draw of six vertices
    assert_eq!(stats.draw_calls(), 1);
    assert_eq!(stats.last_draw_vertex_count(), Some(6));

    // a joined run goes out alone as a line strip
    let joined = [
        Vec2f::new(0.0, 0.0),
        Vec2f::new(1.0, 1.0),
        Vec2f::new(2.0, 0.0),
        Vec2f::new(3.0, 1.0),
    ];
    renderer.draw_lines(&joined, BlendMode::None);
    renderer.draw_line(Vec2f::new(5.0, 0.0), Vec2f::new(6.0, 0.0), BlendMode::None);
    renderer.present().unwrap();

    assert_eq!(stats.draw_calls(), 3);
    let draws = stats.draws();
    assert_eq!(draws[1].vertex_count, 4); // line strip of 4 vertices
    assert_eq!(draws[2].vertex_count, 2);
}

#[test]
fn uploaded_bytes_match_queued_vertices_and_offsets_stay_in_range() {
    let (mut renderer, stats, _window) = create_renderer();

    for i in 0..10 {
        renderer.draw_points(&[Vec2f::new(i as f32, 0.0)], BlendMode::None);
    }
    let positions = [
        Vec2f::new(0.0, 0.0),
        Vec2f::new(4.0, 0.0),
        Vec2f::new(0.0, 4.0),
    ];
    let colors = [Vec4f::new(0.0, 1.0, 0.0, 1.0); 3];
    renderer.geometry(None, &positions, &colors, &[], None, BlendMode::Blend);

    let queued = renderer.queued_vertex_bytes() as u64;
    renderer.present().unwrap();

    assert_eq!(stats.buffer_upload_bytes(), queued);
    for draw in stats.draws() {
        assert!(draw.vertex_buffer_offset < draw2d::VERTEX_BUFFER_SIZE);
    }
}

#[test]
fn samplers_are_stable_across_frames() {
    let (mut renderer, _stats, _window) = create_renderer();

    let before = renderer.sampler_for(ScaleMode::Linear, AddressMode::Wrap) as *const gfx::Sampler;
    renderer.clear(Vec4f::new(0.0, 0.0, 0.0, 1.0));
    renderer.present().unwrap();
    let after = renderer.sampler_for(ScaleMode::Linear, AddressMode::Wrap) as *const gfx::Sampler;

    assert_eq!(before, after);
}

#[test]
fn pipeline_cache_is_keyed_on_state() {
    let (mut renderer, _stats, _window) = create_renderer();

    let positions = [
        Vec2f::new(0.0, 0.0),
        Vec2f::new(4.0, 0.0),
        Vec2f::new(0.0, 4.0),
    ];
    let colors = [Vec4f::new(1.0, 1.0, 1.0, 1.0); 3];

    renderer.geometry(None, &positions, &colors, &[], None, BlendMode::None);
    renderer.geometry(None, &positions, &colors, &[], None, BlendMode::Blend);
    renderer.draw_points(&[Vec2f::new(0.0, 0.0)], BlendMode::None);
    renderer.present().unwrap();
    assert_eq!(renderer.pipeline_cache_size(), 3);

    // repeating the same states allocates nothing new
    renderer.geometry(None, &positions, &colors, &[], None, BlendMode::Blend);
    renderer.draw_points(&[Vec2f::new(1.0, 1.0)], BlendMode::None);
    renderer.present().unwrap();
    assert_eq!(renderer.pipeline_cache_size(), 3);
}

#[test]
fn textured_geometry_batches_on_texture_identity() {
    let (mut renderer, stats, _window) = create_renderer();

    let texture_a = renderer
        .create_texture(4, 4, gfx::TextureFormat::B8G8R8A8, TextureAccess::Static)
        .unwrap();
    let texture_b = renderer
        .create_texture(4, 4, gfx::TextureFormat::B8G8R8A8, TextureAccess::Static)
        .unwrap();

    let positions = [
        Vec2f::new(0.0, 0.0),
        Vec2f::new(4.0, 0.0),
        Vec2f::new(0.0, 4.0),
    ];
    let colors = [Vec4f::new(1.0, 1.0, 1.0, 1.0); 3];
    let uvs = [
        Vec2f::new(0.0, 0.0),
        Vec2f::new(1.0, 0.0),
        Vec2f::new(0.0, 1.0),
    ];

    renderer.geometry(Some(&texture_a), &positions, &colors, &uvs, None, BlendMode::Blend);
    renderer.geometry(Some(&texture_a), &positions, &colors, &uvs, None, BlendMode::Blend);
    renderer.geometry(Some(&texture_b), &positions, &colors, &uvs, None, BlendMode::Blend);
    renderer.present().unwrap();

    // the first two share a texture and merge, the third does not
    assert_eq!(stats.draw_calls(), 2);
    let draws = stats.draws();
    assert_eq!(draws[0].vertex_count, 6);
    assert_eq!(draws[1].vertex_count, 3);
}

#[test]
fn update_texture_respects_pitch() {
    let (mut renderer, stats, _window) = create_renderer();

    let texture = renderer
        .create_texture(4, 4, gfx::TextureFormat::R8G8B8A8, TextureAccess::Static)
        .unwrap();

    // tightly packed
    let pixels = vec![0xffu8; 4 * 4 * 4];
    renderer
        .update_texture(
            &texture,
            os::Rect {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
            &pixels,
            4 * 4,
        )
        .unwrap();

    // wider source pitch than the destination row
    let padded = vec![0xffu8; 4 * 8 * 4];
    renderer
        .update_texture(
            &texture,
            os::Rect {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
            &padded,
            8 * 4,
        )
        .unwrap();

    assert_eq!(stats.texture_uploads(), 2);
    assert_eq!(stats.copy_passes(), 2);
}

#[test]
fn streaming_textures_upload_on_unlock() {
    let (mut renderer, stats, _window) = create_renderer();

    let texture = renderer
        .create_texture(8, 8, gfx::TextureFormat::R8G8B8A8, TextureAccess::Streaming)
        .unwrap();

    let rect = os::Rect {
        x: 0,
        y: 0,
        width: 8,
        height: 2,
    };
    let (pixels, pitch) = renderer.lock_texture(&texture, rect).unwrap();
    assert_eq!(pitch, 8 * 4);
    unsafe {
        std::ptr::write_bytes(pixels, 0xab, pitch * 2);
    }
    renderer.unlock_texture(&texture).unwrap();

    assert_eq!(stats.texture_uploads(), 1);

    // static textures cannot be locked
    let static_texture = renderer
        .create_texture(8, 8, gfx::TextureFormat::R8G8B8A8, TextureAccess::Static)
        .unwrap();
    assert!(renderer.lock_texture(&static_texture, rect).is_err());
}

#[test]
fn render_target_switches_the_attachment() {
    let (mut renderer, stats, _window) = create_renderer();

    let target = renderer
        .create_texture(32, 32, gfx::TextureFormat::B8G8R8A8, TextureAccess::Target)
        .unwrap();

    renderer.set_render_target(Some(&target));
    renderer.clear(Vec4f::new(1.0, 0.0, 0.0, 1.0));
    renderer.draw_points(&[Vec2f::new(1.0, 1.0)], BlendMode::None);
    renderer.present().unwrap();
    renderer.set_render_target(None);

    assert_eq!(stats.draw_calls(), 1);

    // a non target texture is rejected
    let plain = renderer
        .create_texture(8, 8, gfx::TextureFormat::B8G8R8A8, TextureAccess::Static)
        .unwrap();
    renderer.set_render_target(Some(&plain));
}

#[test]
fn clear_restarts_an_open_render_pass() {
    let (mut renderer, stats, _window) = create_renderer();

    renderer.draw_points(&[Vec2f::new(0.0, 0.0)], BlendMode::None);
    renderer.clear(Vec4f::new(0.0, 0.0, 1.0, 1.0));
    renderer.draw_points(&[Vec2f::new(1.0, 1.0)], BlendMode::None);
    renderer.present().unwrap();

    // the clear forces the pass to restart so its load op lands
    assert_eq!(stats.render_passes(), 2);
    assert_eq!(stats.draw_calls(), 2);
    assert_eq!(
        stats.last_clear_color(),
        Some(gfx::Color {
            r: 0.0,
            g: 0.0,
            b: 1.0,
            a: 1.0
        })
    );
}

#[test]
fn fences_rotate_one_frame_behind() {
    let (mut renderer, stats, _window) = create_renderer();

    let base = stats.fence_value();
    for _ in 0..3 {
        renderer.clear(Vec4f::new(0.0, 0.0, 0.0, 1.0));
        renderer.present().unwrap();
    }
    // one submission per frame, each consuming exactly one fence value
    assert_eq!(stats.fence_value(), base + 3);
}
