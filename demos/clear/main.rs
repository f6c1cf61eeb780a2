use landline::gfx;
use landline::os;

/// Claims a window and pushes a few clear-only frames through the device,
/// cycling the back buffer each time.
fn main() {
    env_logger::init();

    let driver = std::env::args().nth(1);
    let device = gfx::Device::create(&gfx::DeviceInfo {
        shader_formats: gfx::ShaderFormat::SPIRV | gfx::ShaderFormat::DXBC,
        debug_mode: true,
        prefer_low_power: false,
        driver,
    })
    .expect("failed to create gpu device");
    println!("created device on {:?}", device.driver());

    let window = os::headless::Window::new(640, 480);
    device
        .claim_window(
            &window,
            gfx::SwapchainComposition::Sdr,
            gfx::PresentMode::Vsync,
        )
        .expect("failed to claim window");

    let clear_colors = [
        gfx::Color {
            r: 1.0,
            g: 0.0,
            b: 1.0,
            a: 1.0,
        },
        gfx::Color {
            r: 1.0,
            g: 1.0,
            b: 0.0,
            a: 1.0,
        },
        gfx::Color {
            r: 0.0,
            g: 1.0,
            b: 1.0,
            a: 1.0,
        },
        gfx::Color {
            r: 0.0,
            g: 1.0,
            b: 0.0,
            a: 1.0,
        },
    ];

    for frame in 0..8 {
        let cmd = device
            .acquire_command_buffer()
            .expect("failed to acquire command buffer");
        let (texture, width, height) = cmd
            .acquire_swapchain_texture(&window)
            .expect("failed to acquire swapchain texture");

        let pass = cmd
            .begin_render_pass(
                &[gfx::ColorAttachmentInfo {
                    texture_slice: gfx::TextureSlice {
                        texture,
                        mip_level: 0,
                        layer: 0,
                    },
                    clear_color: clear_colors[frame % clear_colors.len()],
                    load_op: gfx::LoadOp::Clear,
                    store_op: gfx::StoreOp::Store,
                    cycle: false,
                }],
                None,
            )
            .expect("failed to begin render pass");
        pass.end();

        cmd.submit();
        println!("frame {} cleared {}x{}", frame, width, height);
    }

    device.unclaim_window(&window);
}
