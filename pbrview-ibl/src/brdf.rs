use std::time::Instant;

use glam::{UVec2, Vec4};
use pbrview::{
    types::gpu::{ImageDesc, ImageFormat, ImageLayout, ImageUsage, SamplerDesc, SubresourceRange, ViewDimension, Viewport},
    GpuBackend, PipelineDesc, Program, Texture, VertexInput, FENCE_TIMEOUT,
};

use crate::{create_texture, IblError};

/// Two channels, scale and bias applied to F0.
pub const BRDF_LUT_FORMAT: ImageFormat = ImageFormat::Rg16Float;

/// Renders the split-sum BRDF integration LUT into a `dim` x `dim` texture.
///
/// A single full-screen triangle is drawn; the integration happens in the
/// fragment shader.
pub fn generate_brdf_lut<B: GpuBackend>(backend: &B, dim: u32) -> Result<Texture<B>, IblError> {
    profiling::scope!("generate_brdf_lut");
    let start = Instant::now();

    let mut texture = create_texture(
        backend,
        &ImageDesc {
            label: "brdf lut",
            format: BRDF_LUT_FORMAT,
            size: UVec2::splat(dim),
            mip_levels: 1,
            layers: 1,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED,
            cube: false,
        },
        ViewDimension::D2,
        &SamplerDesc::clamped("brdf lut", 1.0),
    )?;

    if let Err(e) = render(backend, &texture, dim) {
        texture.destroy(backend);
        return Err(e);
    }
    texture.layout = ImageLayout::ShaderReadOnly;

    log::info!("generating BRDF LUT took {:.2?}", start.elapsed());
    Ok(texture)
}

fn render<B: GpuBackend>(backend: &B, texture: &Texture<B>, dim: u32) -> Result<(), IblError> {
    let pipeline = backend.create_pipeline(&PipelineDesc {
        label: "brdf lut",
        program: Program::BrdfLut,
        color_format: BRDF_LUT_FORMAT,
        vertex_input: VertexInput::None,
        push_constant_size: 0,
        texture: None,
    })?;

    let submitted = (|| {
        let mut cmd = backend.begin_commands("brdf lut")?;
        let range = SubresourceRange::single(0, 0);
        backend.image_barrier(&mut cmd, &texture.image, range, ImageLayout::Undefined, ImageLayout::ColorAttachment);
        backend.begin_render_pass(&mut cmd, &texture.view, Vec4::new(0.0, 0.0, 0.0, 1.0));
        backend.set_viewport(&mut cmd, &Viewport::square(dim as f32));
        backend.bind_pipeline(&mut cmd, &pipeline);
        backend.draw(&mut cmd, 3, 1, 0, 0);
        backend.end_render_pass(&mut cmd);
        backend.image_barrier(
            &mut cmd,
            &texture.image,
            range,
            ImageLayout::ColorAttachment,
            ImageLayout::ShaderReadOnly,
        );
        backend.submit_and_wait(cmd, FENCE_TIMEOUT)
    })();

    backend.destroy_pipeline(pipeline);
    Ok(submitted?)
}

#[cfg(test)]
mod tests {
    use pbrview::{
        headless::HeadlessCommand,
        types::gpu::{ImageFormat, ImageLayout},
        HeadlessBackend,
    };

    use super::generate_brdf_lut;

    #[test]
    fn lut_is_one_triangle_into_a_sampled_target() {
        let backend = HeadlessBackend::new();
        let lut = generate_brdf_lut(&backend, 512).unwrap();

        assert_eq!(lut.format, ImageFormat::Rg16Float);
        assert_eq!(lut.size.x, 512);
        assert_eq!(lut.layout, ImageLayout::ShaderReadOnly);
        assert_eq!(backend.image_layout(&lut.image, 0, 0), Some(ImageLayout::ShaderReadOnly));

        let stats = backend.stats();
        assert_eq!((stats.submits, stats.render_passes, stats.draws), (1, 1, 1));
        assert!(backend
            .history()
            .iter()
            .any(|c| matches!(c, HeadlessCommand::Draw { vertex_count: 3, instance_count: 1, .. })));

        // The pipeline is only needed while rendering.
        let live = backend.live_resources();
        assert_eq!((live.images, live.views, live.samplers, live.pipelines), (1, 1, 1, 0));
    }
}
