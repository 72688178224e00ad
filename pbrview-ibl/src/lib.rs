//! Precomputation of the lookup textures used for image based lighting.
//!
//! Three textures are produced from an environment cubemap:
//! - a BRDF integration LUT, independent of the environment
//! - a diffuse irradiance cube
//! - a prefiltered specular cube, one roughness step per mip level
//!
//! All work is rendered offscreen through the [`pbrview::GpuBackend`] and waited on
//! before returning.

use pbrview::{
    types::gpu::{ImageDesc, ImageLayout, ImageViewDesc, SamplerDesc, SubresourceRange, ViewDimension},
    GpuBackend, GpuError, Texture,
};
use thiserror::Error;

mod brdf;
mod cubemap;
mod environment;

pub use brdf::{generate_brdf_lut, BRDF_LUT_FORMAT};
pub use cubemap::{
    face_matrices, face_projection, generate_cubemap, skybox_cube, CubemapKind, IrradiancePushBlock,
    PrefilterPushBlock,
};
pub use environment::{load_environment_ktx2, EnvironmentMaps, IblSettings};

#[derive(Debug, Error)]
pub enum IblError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("failed to parse ktx2 container")]
    Ktx(#[from] ktx2::ParseError),
    #[error("unsupported ktx2 format {0}, expected uncompressed R16G16B16A16_SFLOAT")]
    UnsupportedKtxFormat(String),
    #[error("environment must be a cubemap with 6 faces, found {faces} faces and {layers} layers")]
    NotACubemap { faces: u32, layers: u32 },
    #[error("ktx2 level {level} holds {actual} bytes, expected {expected}")]
    TruncatedKtxLevel { level: usize, expected: usize, actual: usize },
}

/// Creates an image with a view over all of it and a sampler, cleaning up on failure.
pub(crate) fn create_texture<B: GpuBackend>(
    backend: &B,
    desc: &ImageDesc<'_>,
    dimension: ViewDimension,
    sampler: &SamplerDesc<'_>,
) -> Result<Texture<B>, GpuError> {
    let image = backend.create_image(desc)?;
    let view = match backend.create_image_view(
        &image,
        &ImageViewDesc {
            label: desc.label,
            dimension,
            range: SubresourceRange::all(desc.mip_levels, desc.layers),
        },
    ) {
        Ok(view) => view,
        Err(e) => {
            backend.destroy_image(image);
            return Err(e);
        }
    };
    let sampler = match backend.create_sampler(sampler) {
        Ok(sampler) => sampler,
        Err(e) => {
            backend.destroy_image_view(view);
            backend.destroy_image(image);
            return Err(e);
        }
    };
    Ok(Texture {
        image,
        view,
        sampler,
        format: desc.format,
        size: desc.size,
        mip_levels: desc.mip_levels,
        layer_count: desc.layers,
        layout: ImageLayout::Undefined,
    })
}
