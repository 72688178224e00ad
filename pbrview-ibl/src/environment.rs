use std::time::Instant;

use glam::UVec2;
use pbrview::{
    buffer::create_staging_buffer,
    types::gpu::{
        mip_extent, BufferImageCopy, ImageDesc, ImageFormat, ImageLayout, ImageUsage, SamplerDesc, SubresourceRange,
        ViewDimension,
    },
    GpuBackend, GpuError, Model, Texture, FENCE_TIMEOUT,
};

use crate::{
    brdf::generate_brdf_lut,
    create_texture,
    cubemap::{generate_cubemap, CubemapKind},
    IblError,
};

/// Sizes and sample counts of the generated lighting textures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IblSettings {
    pub brdf_lut_size: u32,
    pub irradiance_size: u32,
    pub prefiltered_size: u32,
    /// GGX samples taken per texel of the prefiltered cube.
    pub prefilter_samples: u32,
}

impl Default for IblSettings {
    fn default() -> Self {
        Self {
            brdf_lut_size: 512,
            irradiance_size: 64,
            prefiltered_size: 512,
            prefilter_samples: 32,
        }
    }
}

/// The three lookup textures a PBR pass samples for image based lighting.
pub struct EnvironmentMaps<B: GpuBackend> {
    pub brdf_lut: Texture<B>,
    pub irradiance: Texture<B>,
    pub prefiltered: Texture<B>,
}

impl<B: GpuBackend> EnvironmentMaps<B> {
    /// Generates the BRDF LUT and both convolved cubes of `environment`.
    pub fn generate(
        backend: &B,
        settings: &IblSettings,
        environment: &Texture<B>,
        skybox: &Model<B>,
    ) -> Result<Self, IblError> {
        profiling::scope!("EnvironmentMaps::generate");
        let start = Instant::now();

        let brdf_lut = generate_brdf_lut(backend, settings.brdf_lut_size)?;
        let irradiance = match generate_cubemap(
            backend,
            CubemapKind::Irradiance,
            settings.irradiance_size,
            settings.prefilter_samples,
            environment,
            skybox,
        ) {
            Ok(cube) => cube,
            Err(e) => {
                brdf_lut.destroy(backend);
                return Err(e);
            }
        };
        let prefiltered = match generate_cubemap(
            backend,
            CubemapKind::PrefilteredEnvironment,
            settings.prefiltered_size,
            settings.prefilter_samples,
            environment,
            skybox,
        ) {
            Ok(cube) => cube,
            Err(e) => {
                brdf_lut.destroy(backend);
                irradiance.destroy(backend);
                return Err(e);
            }
        };

        log::info!("environment maps generated in {:.2?}", start.elapsed());
        Ok(Self {
            brdf_lut,
            irradiance,
            prefiltered,
        })
    }

    /// Mip levels of the prefiltered cube, which shaders map roughness onto.
    pub fn prefiltered_mip_levels(&self) -> u32 {
        self.prefiltered.mip_levels
    }

    pub fn destroy(self, backend: &B) {
        self.brdf_lut.destroy(backend);
        self.irradiance.destroy(backend);
        self.prefiltered.destroy(backend);
    }
}

/// Uploads a cube whose levels each hold six tightly packed faces in layer order.
pub(crate) fn upload_cube<B: GpuBackend>(
    backend: &B,
    label: &str,
    format: ImageFormat,
    size: UVec2,
    levels: &[&[u8]],
) -> Result<Texture<B>, IblError> {
    let mip_levels = levels.len() as u32;
    let mut texture = create_texture(
        backend,
        &ImageDesc {
            label,
            format,
            size,
            mip_levels,
            layers: 6,
            usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            cube: true,
        },
        ViewDimension::Cube,
        &SamplerDesc::clamped(label, mip_levels as f32),
    )?;

    let uploaded = (|| -> Result<(), GpuError> {
        let data: Vec<u8> = levels.concat();
        let staging = create_staging_buffer(backend, "environment staging buffer", &data)?;

        let submitted = (|| -> Result<(), GpuError> {
            let range = SubresourceRange::all(mip_levels, 6);
            let mut cmd = backend.begin_commands(label)?;
            backend.image_barrier(&mut cmd, &texture.image, range, ImageLayout::Undefined, ImageLayout::TransferDst);
            let mut offset = 0;
            for (mip, level) in levels.iter().enumerate() {
                let extent = mip_extent(size, mip as u32);
                let face_size = level.len() as u64 / 6;
                for face in 0..6 {
                    backend.copy_buffer_to_image(
                        &mut cmd,
                        &staging.buffer,
                        &texture.image,
                        &BufferImageCopy {
                            buffer_offset: offset + face * face_size,
                            mip: mip as u32,
                            layer: face as u32,
                            extent,
                        },
                    );
                }
                offset += level.len() as u64;
            }
            backend.image_barrier(
                &mut cmd,
                &texture.image,
                range,
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly,
            );
            backend.submit_and_wait(cmd, FENCE_TIMEOUT)
        })();
        staging.destroy(backend);
        submitted
    })();

    match uploaded {
        Ok(()) => {
            texture.layout = ImageLayout::ShaderReadOnly;
            Ok(texture)
        }
        Err(e) => {
            texture.destroy(backend);
            Err(e.into())
        }
    }
}

/// Loads an uncompressed `R16G16B16A16_SFLOAT` KTX2 cubemap with all of its levels.
pub fn load_environment_ktx2<B: GpuBackend>(backend: &B, data: &[u8]) -> Result<Texture<B>, IblError> {
    profiling::scope!("load_environment_ktx2");

    let reader = ktx2::Reader::new(data)?;
    let header = reader.header();

    if header.format != Some(ktx2::Format::R16G16B16A16_SFLOAT) || header.supercompression_scheme.is_some() {
        return Err(IblError::UnsupportedKtxFormat(format!(
            "{:?} with supercompression {:?}",
            header.format, header.supercompression_scheme
        )));
    }
    if header.face_count != 6 || header.layer_count > 1 {
        return Err(IblError::NotACubemap {
            faces: header.face_count,
            layers: header.layer_count,
        });
    }

    let size = UVec2::new(header.pixel_width, header.pixel_height.max(1));
    let bytes_per_texel = ImageFormat::Rgba16Float.bytes_per_texel() as usize;
    let mut levels = Vec::with_capacity(header.level_count.max(1) as usize);
    for (level, data) in reader.levels().enumerate() {
        let extent = mip_extent(size, level as u32);
        let expected = extent.x as usize * extent.y as usize * bytes_per_texel * 6;
        if data.len() < expected {
            return Err(IblError::TruncatedKtxLevel {
                level,
                expected,
                actual: data.len(),
            });
        }
        levels.push(&data[..expected]);
    }

    log::debug!(
        "loading {}x{} environment cube with {} levels",
        size.x,
        size.y,
        levels.len()
    );
    upload_cube(backend, "environment cube", ImageFormat::Rgba16Float, size, &levels)
}

#[cfg(test)]
pub(crate) mod tests {
    use glam::UVec2;
    use pbrview::{
        headless::HeadlessCommand,
        types::gpu::{mip_levels, ImageFormat, ImageLayout},
        HeadlessBackend, Texture,
    };

    use super::{load_environment_ktx2, upload_cube, EnvironmentMaps, IblSettings};
    use crate::{cubemap::skybox_cube, IblError};

    const R16G16B16A16_SFLOAT: u32 = 97;
    const R8G8B8A8_UNORM: u32 = 37;

    /// A cube of half float texels, every face a different solid color.
    pub(crate) fn solid_environment(backend: &HeadlessBackend, dim: u32) -> Texture<HeadlessBackend> {
        let levels = cube_levels(dim);
        let slices: Vec<&[u8]> = levels.iter().map(Vec::as_slice).collect();
        upload_cube(backend, "environment", ImageFormat::Rgba16Float, UVec2::splat(dim), &slices).unwrap()
    }

    fn cube_levels(dim: u32) -> Vec<Vec<u8>> {
        (0..mip_levels(dim, dim))
            .map(|mip| {
                let texels = (dim >> mip).max(1).pow(2) as usize;
                (0..6u16).flat_map(|face| face.to_le_bytes().repeat(4 * texels)).collect()
            })
            .collect()
    }

    /// Writes a minimal KTX2 container holding `levels`.
    fn ktx2_file(vk_format: u32, dim: u32, faces: u32, levels: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];
        let type_size = 2;
        for value in [vk_format, type_size, dim, dim, 0, 0, faces, levels.len() as u32, 0] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        // No data format descriptor, key/value data or supercompression data.
        out.extend_from_slice(&[0; 32]);

        let index_len = levels.len() * 24;
        let mut offset = (out.len() + index_len) as u64;
        for level in levels {
            let len = level.len() as u64;
            for value in [offset, len, len] {
                out.extend_from_slice(&value.to_le_bytes());
            }
            offset += len;
        }
        for level in levels {
            out.extend_from_slice(level);
        }
        out
    }

    #[test]
    fn ktx2_cube_is_uploaded_face_by_face() {
        let backend = HeadlessBackend::new();
        let levels = cube_levels(4);
        let file = ktx2_file(R16G16B16A16_SFLOAT, 4, 6, &levels);

        let cube = load_environment_ktx2(&backend, &file).unwrap();
        assert_eq!(cube.mip_levels, 3);
        assert_eq!(cube.layer_count, 6);
        assert_eq!(cube.layout, ImageLayout::ShaderReadOnly);

        let copies = backend
            .history()
            .iter()
            .filter(|c| matches!(c, HeadlessCommand::CopyBufferToImage { .. }))
            .count();
        assert_eq!(copies, 6 * 3);
        // Face three of level one holds the value 3 in every channel.
        let face = backend.image_contents(&cube.image, 1, 3).unwrap();
        assert_eq!(face.len(), 2 * 2 * 8);
        assert!(face.chunks_exact(2).all(|c| c == 3u16.to_le_bytes()));
        assert_eq!(backend.live_resources().buffers, 0);
    }

    #[test]
    fn ktx2_with_other_formats_is_rejected() {
        let backend = HeadlessBackend::new();
        let levels = vec![vec![0; 4 * 4 * 4 * 6]];
        let file = ktx2_file(R8G8B8A8_UNORM, 4, 6, &levels);
        assert!(matches!(
            load_environment_ktx2(&backend, &file),
            Err(IblError::UnsupportedKtxFormat(_))
        ));
        assert_eq!(backend.live_resources().images, 0);
    }

    #[test]
    fn ktx2_needs_six_faces() {
        let backend = HeadlessBackend::new();
        let levels = vec![vec![0; 4 * 4 * 8]];
        let file = ktx2_file(R16G16B16A16_SFLOAT, 4, 1, &levels);
        assert!(matches!(
            load_environment_ktx2(&backend, &file),
            Err(IblError::NotACubemap { faces: 1, .. })
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let backend = HeadlessBackend::new();
        assert!(matches!(
            load_environment_ktx2(&backend, b"not a ktx2 file at all"),
            Err(IblError::Ktx(_))
        ));
    }

    #[test]
    fn environment_maps_bundle_all_three_textures() {
        let backend = HeadlessBackend::new();
        let environment = solid_environment(&backend, 8);
        let skybox = skybox_cube(&backend).unwrap();
        let settings = IblSettings {
            brdf_lut_size: 8,
            irradiance_size: 4,
            prefiltered_size: 8,
            prefilter_samples: 4,
        };

        let maps = EnvironmentMaps::generate(&backend, &settings, &environment, &skybox).unwrap();
        assert_eq!(maps.brdf_lut.size, UVec2::splat(8));
        assert_eq!(maps.irradiance.mip_levels, 3);
        assert_eq!(maps.prefiltered_mip_levels(), 4);
        assert_eq!(maps.irradiance.format, ImageFormat::Rgba32Float);
        assert_eq!(maps.prefiltered.format, ImageFormat::Rgba16Float);

        // Faces are cleared to the offscreen color before the (non rasterizing) draw.
        let texel = backend.image_contents(&maps.irradiance.image, 0, 0).unwrap();
        let blue = f32::from_le_bytes([texel[8], texel[9], texel[10], texel[11]]);
        assert_eq!(blue, 0.2);

        maps.destroy(&backend);
        assert_eq!(backend.live_resources().pipelines, 0);
    }

    #[test]
    fn default_settings() {
        let settings = IblSettings::default();
        assert_eq!(
            (
                settings.brdf_lut_size,
                settings.irradiance_size,
                settings.prefiltered_size,
                settings.prefilter_samples
            ),
            (512, 64, 512, 32)
        );
    }
}
