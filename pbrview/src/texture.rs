use glam::UVec2;
use pbrview_types::{
    gpu::{
        mip_extent, mip_levels, BufferImageCopy, Filter, ImageBlit, ImageDesc, ImageFormat, ImageLayout, ImageUsage,
        ImageViewDesc, SamplerDesc, SubresourceRange, ViewDimension,
    },
    TextureSampler,
};

use crate::{
    backend::{GpuBackend, GpuError, FENCE_TIMEOUT},
    buffer::create_staging_buffer,
};

/// Anisotropy requested for material textures.
pub const MAX_ANISOTROPY: u16 = 8;

/// A sampleable image together with its view and sampler.
///
/// Textures are not freed on drop, [`Texture::destroy`] must be called with the
/// backend that created them.
pub struct Texture<B: GpuBackend> {
    pub image: B::Image,
    pub view: B::ImageView,
    pub sampler: B::Sampler,
    pub format: ImageFormat,
    pub size: UVec2,
    pub mip_levels: u32,
    pub layer_count: u32,
    pub layout: ImageLayout,
}

/// Expands tightly packed RGB8 texels to RGBA8 with opaque alpha.
pub fn expand_rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for texel in rgb.chunks_exact(3) {
        rgba.extend_from_slice(texel);
        rgba.push(u8::MAX);
    }
    rgba
}

impl<B: GpuBackend> Texture<B> {
    /// Uploads RGBA8 texels and generates a full mip chain by successive blits.
    ///
    /// Level 0 is copied from a staging buffer and every further level is
    /// blitted from the one above it at half resolution. Blocks until both the
    /// upload and the mip generation have completed.
    pub fn from_rgba8(
        backend: &B,
        label: &str,
        pixels: &[u8],
        size: UVec2,
        sampler: &TextureSampler,
    ) -> Result<Self, GpuError> {
        profiling::scope!("Texture::from_rgba8");

        let expected = size.x as usize * size.y as usize * 4;
        if pixels.len() != expected {
            return Err(GpuError::Validation {
                label: label.to_owned(),
                message: format!("{} bytes of texels for a {size} RGBA8 image, expected {expected}", pixels.len()),
            });
        }

        let mip_levels = mip_levels(size.x, size.y);
        let image = backend.create_image(&ImageDesc {
            label,
            format: ImageFormat::Rgba8Unorm,
            size,
            mip_levels,
            layers: 1,
            usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST,
            cube: false,
        })?;

        let result = Self::upload_and_generate_mips(backend, label, &image, pixels, size, mip_levels)
            .and_then(|()| Self::create_view_and_sampler(backend, label, &image, mip_levels, sampler));
        let (view, sampler) = match result {
            Ok(parts) => parts,
            Err(e) => {
                backend.destroy_image(image);
                return Err(e);
            }
        };

        log::debug!("created texture {label:?} {size} with {mip_levels} mips");

        Ok(Self {
            image,
            view,
            sampler,
            format: ImageFormat::Rgba8Unorm,
            size,
            mip_levels,
            layer_count: 1,
            layout: ImageLayout::ShaderReadOnly,
        })
    }

    fn upload_and_generate_mips(
        backend: &B,
        label: &str,
        image: &B::Image,
        pixels: &[u8],
        size: UVec2,
        mip_levels: u32,
    ) -> Result<(), GpuError> {
        let staging = create_staging_buffer(backend, "texture staging buffer", pixels)?;

        let uploaded = (|| {
            let mut cmd = backend.begin_commands(label)?;
            let base = SubresourceRange::single(0, 0);
            backend.image_barrier(&mut cmd, image, base, ImageLayout::Undefined, ImageLayout::TransferDst);
            backend.copy_buffer_to_image(
                &mut cmd,
                &staging.buffer,
                image,
                &BufferImageCopy {
                    buffer_offset: 0,
                    mip: 0,
                    layer: 0,
                    extent: size,
                },
            );
            backend.image_barrier(&mut cmd, image, base, ImageLayout::TransferDst, ImageLayout::TransferSrc);
            backend.submit_and_wait(cmd, FENCE_TIMEOUT)
        })();
        staging.destroy(backend);
        uploaded?;

        profiling::scope!("generating mipmaps");
        let mut cmd = backend.begin_commands(label)?;
        for mip in 1..mip_levels {
            let level = SubresourceRange::single(mip, 0);
            backend.image_barrier(&mut cmd, image, level, ImageLayout::Undefined, ImageLayout::TransferDst);
            backend.blit_image(
                &mut cmd,
                image,
                image,
                &ImageBlit {
                    src_mip: mip - 1,
                    src_layer: 0,
                    src_extent: mip_extent(size, mip - 1),
                    dst_mip: mip,
                    dst_layer: 0,
                    dst_extent: mip_extent(size, mip),
                    filter: Filter::Linear,
                },
            );
            backend.image_barrier(&mut cmd, image, level, ImageLayout::TransferDst, ImageLayout::TransferSrc);
        }
        backend.image_barrier(
            &mut cmd,
            image,
            SubresourceRange::all(mip_levels, 1),
            ImageLayout::TransferSrc,
            ImageLayout::ShaderReadOnly,
        );
        backend.submit_and_wait(cmd, FENCE_TIMEOUT)
    }

    fn create_view_and_sampler(
        backend: &B,
        label: &str,
        image: &B::Image,
        mip_levels: u32,
        sampler: &TextureSampler,
    ) -> Result<(B::ImageView, B::Sampler), GpuError> {
        let view = backend.create_image_view(
            image,
            &ImageViewDesc {
                label,
                dimension: ViewDimension::D2,
                range: SubresourceRange::all(mip_levels, 1),
            },
        )?;
        let sampler = backend.create_sampler(&SamplerDesc {
            label,
            mag_filter: sampler.mag_filter,
            min_filter: sampler.min_filter,
            mipmap_filter: Filter::Linear,
            address_mode_u: sampler.address_mode_u,
            address_mode_v: sampler.address_mode_v,
            address_mode_w: sampler.address_mode_w,
            max_anisotropy: Some(MAX_ANISOTROPY),
            max_lod: mip_levels as f32,
        });
        match sampler {
            Ok(sampler) => Ok((view, sampler)),
            Err(e) => {
                backend.destroy_image_view(view);
                Err(e)
            }
        }
    }

    pub fn destroy(self, backend: &B) {
        backend.destroy_sampler(self.sampler);
        backend.destroy_image_view(self.view);
        backend.destroy_image(self.image);
    }
}
