use glam::UVec2;
use gltf::{
    image::Format,
    texture::{MagFilter, MinFilter, WrappingMode},
};
use image::{DynamicImage, ImageBuffer, Rgb, Rgba};
use pbrview::{
    texture::expand_rgb_to_rgba,
    types::{
        gpu::{AddressMode, Filter},
        TextureSampler,
    },
    GpuBackend, Model, Texture,
};

use crate::GltfLoadError;

fn min_filter(filter: Option<MinFilter>) -> Filter {
    match filter {
        Some(MinFilter::Linear | MinFilter::NearestMipmapLinear | MinFilter::LinearMipmapLinear) => Filter::Linear,
        Some(MinFilter::Nearest | MinFilter::NearestMipmapNearest | MinFilter::LinearMipmapNearest) | None => {
            Filter::Nearest
        }
    }
}

fn mag_filter(filter: Option<MagFilter>) -> Filter {
    match filter {
        Some(MagFilter::Linear) => Filter::Linear,
        Some(MagFilter::Nearest) | None => Filter::Nearest,
    }
}

fn address_mode(mode: WrappingMode) -> AddressMode {
    match mode {
        WrappingMode::ClampToEdge => AddressMode::ClampToEdge,
        WrappingMode::MirroredRepeat => AddressMode::MirroredRepeat,
        WrappingMode::Repeat => AddressMode::Repeat,
    }
}

/// Translates a glTF sampler. The W axis follows V.
pub fn sampler_from_gltf(sampler: &gltf::texture::Sampler) -> TextureSampler {
    TextureSampler {
        mag_filter: mag_filter(sampler.mag_filter()),
        min_filter: min_filter(sampler.min_filter()),
        address_mode_u: address_mode(sampler.wrap_s()),
        address_mode_v: address_mode(sampler.wrap_t()),
        address_mode_w: address_mode(sampler.wrap_t()),
    }
}

fn expand_channels(pixels: &[u8], channels: usize) -> Vec<u8> {
    pixels
        .chunks_exact(channels)
        .flat_map(|texel| match *texel {
            [r] => [r, r, r, u8::MAX],
            [r, g, ..] => [r, g, 0, u8::MAX],
            [] => [0, 0, 0, u8::MAX],
        })
        .collect()
}

fn narrow_u16(pixels: &[u8]) -> Vec<u8> {
    bytemuck::pod_collect_to_vec::<u8, u16>(pixels)
        .into_iter()
        .map(|v| (v >> 8) as u8)
        .collect()
}

/// Converts decoded glTF image data to tightly packed RGBA8.
pub fn convert_to_rgba8(index: usize, data: &gltf::image::Data) -> Result<Vec<u8>, GltfLoadError> {
    let invalid = |reason: &str| GltfLoadError::InvalidImage {
        image: index,
        reason: reason.to_owned(),
    };
    let (width, height) = (data.width, data.height);

    let rgba = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => expand_rgb_to_rgba(&data.pixels),
        Format::R8 => expand_channels(&data.pixels, 1),
        Format::R8G8 => expand_channels(&data.pixels, 2),
        Format::R16 => expand_channels(&narrow_u16(&data.pixels), 1),
        Format::R16G16 => expand_channels(&narrow_u16(&data.pixels), 2),
        Format::R16G16B16 => {
            let texels = bytemuck::pod_collect_to_vec::<u8, u16>(&data.pixels);
            let buffer = ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, texels)
                .ok_or_else(|| invalid("pixel data does not match dimensions"))?;
            DynamicImage::ImageRgb16(buffer).to_rgba8().into_raw()
        }
        Format::R16G16B16A16 => {
            let texels = bytemuck::pod_collect_to_vec::<u8, u16>(&data.pixels);
            let buffer = ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, texels)
                .ok_or_else(|| invalid("pixel data does not match dimensions"))?;
            DynamicImage::ImageRgba16(buffer).to_rgba8().into_raw()
        }
        Format::R32G32B32FLOAT => {
            let texels = bytemuck::pod_collect_to_vec::<u8, f32>(&data.pixels);
            let buffer = ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, texels)
                .ok_or_else(|| invalid("pixel data does not match dimensions"))?;
            DynamicImage::ImageRgb32F(buffer).to_rgba8().into_raw()
        }
        Format::R32G32B32A32FLOAT => {
            let texels = bytemuck::pod_collect_to_vec::<u8, f32>(&data.pixels);
            let buffer = ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, texels)
                .ok_or_else(|| invalid("pixel data does not match dimensions"))?;
            DynamicImage::ImageRgba32F(buffer).to_rgba8().into_raw()
        }
    };

    if rgba.len() != width as usize * height as usize * 4 {
        return Err(invalid("pixel data does not match dimensions"));
    }
    Ok(rgba)
}

/// Uploads every document texture in order, so material texture indices stay valid.
pub(crate) fn load_textures<B: GpuBackend>(
    backend: &B,
    model: &mut Model<B>,
    document: &gltf::Document,
    images: &[gltf::image::Data],
) -> Result<(), GltfLoadError> {
    profiling::scope!("load textures");
    for texture in document.textures() {
        let image_index = texture.source().index();
        let data = &images[image_index];
        let pixels = convert_to_rgba8(image_index, data)?;
        let sampler = texture
            .sampler()
            .index()
            .and_then(|idx| model.texture_samplers.get(idx).copied())
            .unwrap_or_default();

        let label = texture.name().unwrap_or("gltf texture");
        let uploaded = Texture::from_rgba8(
            backend,
            label,
            &pixels,
            UVec2::new(data.width, data.height),
            &sampler,
        )?;
        model.textures.push(uploaded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gltf::texture::{MagFilter, MinFilter, WrappingMode};
    use pbrview::types::gpu::{AddressMode, Filter};

    use super::{address_mode, convert_to_rgba8, expand_channels, mag_filter, min_filter, narrow_u16};
    use crate::GltfLoadError;

    #[test]
    fn mipmapped_min_filters_collapse_to_their_mip_mode() {
        assert_eq!(min_filter(None), Filter::Nearest);
        assert_eq!(min_filter(Some(MinFilter::Nearest)), Filter::Nearest);
        assert_eq!(min_filter(Some(MinFilter::Linear)), Filter::Linear);
        assert_eq!(min_filter(Some(MinFilter::NearestMipmapNearest)), Filter::Nearest);
        assert_eq!(min_filter(Some(MinFilter::LinearMipmapNearest)), Filter::Nearest);
        assert_eq!(min_filter(Some(MinFilter::NearestMipmapLinear)), Filter::Linear);
        assert_eq!(min_filter(Some(MinFilter::LinearMipmapLinear)), Filter::Linear);
    }

    #[test]
    fn mag_filter_and_wrapping() {
        assert_eq!(mag_filter(None), Filter::Nearest);
        assert_eq!(mag_filter(Some(MagFilter::Linear)), Filter::Linear);
        assert_eq!(address_mode(WrappingMode::Repeat), AddressMode::Repeat);
        assert_eq!(address_mode(WrappingMode::MirroredRepeat), AddressMode::MirroredRepeat);
        assert_eq!(address_mode(WrappingMode::ClampToEdge), AddressMode::ClampToEdge);
    }

    #[test]
    fn single_and_dual_channel_expansion() {
        assert_eq!(expand_channels(&[7, 9], 1), [7, 7, 7, 255, 9, 9, 9, 255]);
        assert_eq!(expand_channels(&[1, 2], 2), [1, 2, 0, 255]);
    }

    #[test]
    fn sixteen_bit_keeps_high_byte() {
        let bytes: Vec<u8> = [0xABCDu16, 0x0100].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(narrow_u16(&bytes), [0xAB, 0x01]);
    }

    #[test]
    fn dimensions_past_u32_texel_bytes_are_rejected() {
        let data = gltf::image::Data {
            pixels: Vec::new(),
            format: gltf::image::Format::R8G8B8A8,
            width: 1 << 16,
            height: 1 << 16,
        };
        assert!(matches!(
            convert_to_rgba8(3, &data),
            Err(GltfLoadError::InvalidImage { image: 3, .. })
        ));
    }
}
