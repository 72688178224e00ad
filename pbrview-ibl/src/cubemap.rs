use std::{
    f32::consts::{FRAC_PI_2, PI},
    time::Instant,
};

use arrayvec::ArrayVec;
use glam::{Mat4, UVec2, Vec3, Vec4};
use pbrview::{
    types::{
        gpu::{
            mip_extent, mip_levels, ImageCopy, ImageDesc, ImageFormat, ImageLayout, ImageUsage, ImageViewDesc,
            SamplerDesc, SubresourceRange, ViewDimension, Viewport,
        },
        Vertex,
    },
    GpuBackend, GpuError, Model, PipelineDesc, Program, Texture, VertexInput, FENCE_TIMEOUT,
};

use crate::{create_texture, IblError};

/// Clear color of the offscreen target each face is rendered into.
const OFFSCREEN_CLEAR: Vec4 = Vec4::new(0.0, 0.0, 0.2, 0.0);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CubemapKind {
    Irradiance,
    PrefilteredEnvironment,
}

impl CubemapKind {
    pub fn format(self) -> ImageFormat {
        match self {
            Self::Irradiance => ImageFormat::Rgba32Float,
            Self::PrefilteredEnvironment => ImageFormat::Rgba16Float,
        }
    }

    pub fn program(self) -> Program {
        match self {
            Self::Irradiance => Program::Irradiance,
            Self::PrefilteredEnvironment => Program::PrefilterEnvironment,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Irradiance => "irradiance cube",
            Self::PrefilteredEnvironment => "prefiltered cube",
        }
    }

    fn push_constant_size(self) -> u32 {
        match self {
            Self::Irradiance => std::mem::size_of::<IrradiancePushBlock>() as u32,
            Self::PrefilteredEnvironment => std::mem::size_of::<PrefilterPushBlock>() as u32,
        }
    }
}

/// Push constants of the irradiance convolution.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IrradiancePushBlock {
    pub mvp: Mat4,
    /// Azimuthal step of the hemisphere walk.
    pub delta_phi: f32,
    /// Polar step of the hemisphere walk.
    pub delta_theta: f32,
    pub _padding: [f32; 2],
}

impl IrradiancePushBlock {
    pub fn new(mvp: Mat4) -> Self {
        Self {
            mvp,
            delta_phi: 2.0 * PI / 180.0,
            delta_theta: 0.5 * PI / 64.0,
            _padding: [0.0; 2],
        }
    }
}

/// Push constants of the GGX prefilter.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrefilterPushBlock {
    pub mvp: Mat4,
    pub roughness: f32,
    pub num_samples: u32,
    pub _padding: [u32; 2],
}

impl PrefilterPushBlock {
    /// Roughness rises linearly from 0 at the base level to 1 at the last.
    pub fn new(mvp: Mat4, mip: u32, num_mips: u32, num_samples: u32) -> Self {
        let roughness = match num_mips {
            0 | 1 => 0.0,
            _ => mip as f32 / (num_mips - 1) as f32,
        };
        Self {
            mvp,
            roughness,
            num_samples,
            _padding: [0; 2],
        }
    }
}

/// View rotations for the +X, -X, +Y, -Y, +Z and -Z faces, in layer order.
pub fn face_matrices() -> ArrayVec<Mat4, 6> {
    let mut faces = ArrayVec::new();
    faces.push(Mat4::from_rotation_y(FRAC_PI_2) * Mat4::from_rotation_x(PI));
    faces.push(Mat4::from_rotation_y(-FRAC_PI_2) * Mat4::from_rotation_x(PI));
    faces.push(Mat4::from_rotation_x(-FRAC_PI_2));
    faces.push(Mat4::from_rotation_x(FRAC_PI_2));
    faces.push(Mat4::from_rotation_x(PI));
    faces.push(Mat4::from_rotation_z(PI));
    faces
}

/// Ninety degree square frustum covering exactly one face.
pub fn face_projection() -> Mat4 {
    Mat4::perspective_rh(FRAC_PI_2, 1.0, 0.1, 512.0)
}

/// A unit cube around the origin, drawn to sample the environment in every direction.
pub fn skybox_cube<B: GpuBackend>(backend: &B) -> Result<Model<B>, GpuError> {
    let vertices: Vec<Vertex> = (0..8)
        .map(|corner| {
            let pick = |bit: u32| if corner & bit == 0 { -1.0 } else { 1.0 };
            Vertex::from_position(Vec3::new(pick(1), pick(2), pick(4)))
        })
        .collect();
    #[rustfmt::skip]
    let indices: [u32; 36] = [
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    Model::from_geometry(backend, "skybox", &vertices, &indices)
}

/// Convolves `environment` into a cube with a full mip chain.
///
/// Every face of every mip is rendered into one offscreen target and then
/// copied into the cube, one blocking submission per face.
pub fn generate_cubemap<B: GpuBackend>(
    backend: &B,
    kind: CubemapKind,
    dim: u32,
    num_samples: u32,
    environment: &Texture<B>,
    skybox: &Model<B>,
) -> Result<Texture<B>, IblError> {
    profiling::scope!("generate_cubemap");
    let start = Instant::now();

    let num_mips = mip_levels(dim, dim);
    let label = kind.label();
    let mut cube = create_texture(
        backend,
        &ImageDesc {
            label,
            format: kind.format(),
            size: UVec2::splat(dim),
            mip_levels: num_mips,
            layers: 6,
            usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            cube: true,
        },
        ViewDimension::Cube,
        &SamplerDesc::clamped(label, num_mips as f32),
    )?;

    let offscreen = match backend.create_image(&ImageDesc {
        label: "cubemap offscreen target",
        format: kind.format(),
        size: UVec2::splat(dim),
        mip_levels: 1,
        layers: 1,
        usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC,
        cube: false,
    }) {
        Ok(image) => image,
        Err(e) => {
            cube.destroy(backend);
            return Err(e.into());
        }
    };

    let result = render_faces(backend, kind, dim, num_mips, num_samples, environment, skybox, &cube, &offscreen);
    backend.destroy_image(offscreen);
    if let Err(e) = result {
        cube.destroy(backend);
        return Err(e);
    }
    cube.layout = ImageLayout::ShaderReadOnly;

    log::info!(
        "generating {dim}x{dim} {label} with {num_mips} mip levels took {:.2?}",
        start.elapsed()
    );
    Ok(cube)
}

#[allow(clippy::too_many_arguments)]
fn render_faces<B: GpuBackend>(
    backend: &B,
    kind: CubemapKind,
    dim: u32,
    num_mips: u32,
    num_samples: u32,
    environment: &Texture<B>,
    skybox: &Model<B>,
    cube: &Texture<B>,
    offscreen: &B::Image,
) -> Result<(), IblError> {
    let target = backend.create_image_view(
        offscreen,
        &ImageViewDesc {
            label: "cubemap offscreen target",
            dimension: ViewDimension::D2,
            range: SubresourceRange::single(0, 0),
        },
    )?;
    let pipeline = match backend.create_pipeline(&PipelineDesc {
        label: kind.label(),
        program: kind.program(),
        color_format: kind.format(),
        vertex_input: VertexInput::Model,
        push_constant_size: kind.push_constant_size(),
        texture: Some((&environment.view, &environment.sampler)),
    }) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            backend.destroy_image_view(target);
            return Err(e.into());
        }
    };

    let result = (|| {
        let cube_range = SubresourceRange::all(num_mips, 6);
        let offscreen_range = SubresourceRange::single(0, 0);

        let mut cmd = backend.begin_commands(kind.label())?;
        backend.image_barrier(&mut cmd, &cube.image, cube_range, ImageLayout::Undefined, ImageLayout::TransferDst);
        backend.image_barrier(
            &mut cmd,
            offscreen,
            offscreen_range,
            ImageLayout::Undefined,
            ImageLayout::ColorAttachment,
        );
        backend.submit_and_wait(cmd, FENCE_TIMEOUT)?;

        let projection = face_projection();
        let faces = face_matrices();
        for mip in 0..num_mips {
            let extent = mip_extent(UVec2::splat(dim), mip);
            for (face, face_matrix) in faces.iter().enumerate() {
                let mvp = projection * *face_matrix;
                let mut cmd = backend.begin_commands(kind.label())?;

                backend.begin_render_pass(&mut cmd, &target, OFFSCREEN_CLEAR);
                backend.set_viewport(&mut cmd, &Viewport::square(extent.x as f32));
                backend.bind_pipeline(&mut cmd, &pipeline);
                match kind {
                    CubemapKind::Irradiance => {
                        backend.push_constants(&mut cmd, 0, bytemuck::bytes_of(&IrradiancePushBlock::new(mvp)))
                    }
                    CubemapKind::PrefilteredEnvironment => backend.push_constants(
                        &mut cmd,
                        0,
                        bytemuck::bytes_of(&PrefilterPushBlock::new(mvp, mip, num_mips, num_samples)),
                    ),
                }
                skybox.draw(backend, &mut cmd);
                backend.end_render_pass(&mut cmd);

                backend.image_barrier(
                    &mut cmd,
                    offscreen,
                    offscreen_range,
                    ImageLayout::ColorAttachment,
                    ImageLayout::TransferSrc,
                );
                backend.copy_image(
                    &mut cmd,
                    offscreen,
                    &cube.image,
                    &ImageCopy {
                        src_mip: 0,
                        src_layer: 0,
                        dst_mip: mip,
                        dst_layer: face as u32,
                        extent,
                    },
                );
                backend.image_barrier(
                    &mut cmd,
                    offscreen,
                    offscreen_range,
                    ImageLayout::TransferSrc,
                    ImageLayout::ColorAttachment,
                );
                backend.submit_and_wait(cmd, FENCE_TIMEOUT)?;
            }
        }

        let mut cmd = backend.begin_commands(kind.label())?;
        backend.image_barrier(
            &mut cmd,
            &cube.image,
            cube_range,
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
        );
        backend.submit_and_wait(cmd, FENCE_TIMEOUT)
    })();

    backend.destroy_pipeline(pipeline);
    backend.destroy_image_view(target);
    Ok(result?)
}
