//! The capability interface every GPU backend provides.
//!
//! Commands are recorded into an opaque [`GpuBackend::Commands`] object and
//! only execute once handed to [`GpuBackend::submit_and_wait`], which blocks
//! until the device has finished the work.

use std::{fmt::Debug, time::Duration};

use glam::Vec4;
use pbrview_types::gpu::{
    find_memory_type, BufferDesc, BufferImageCopy, ImageBlit, ImageCopy, ImageDesc, ImageFormat, ImageLayout,
    ImageViewDesc, MemoryFlags, SamplerDesc, SubresourceRange, Viewport,
};
use thiserror::Error;

/// How long a blocking submission may take before it is considered lost.
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no memory type with {flags:?} is allowed by type bits {type_bits:#x}")]
    NoSuitableMemoryType { type_bits: u32, flags: MemoryFlags },
    #[error("write of {len} bytes at offset {offset} overflows buffer {label:?} of {size} bytes")]
    OutOfBounds { label: String, offset: u64, len: u64, size: u64 },
    #[error("buffer {0:?} is not host visible")]
    NotHostVisible(String),
    #[error("{kind} handle is stale or belongs to another device")]
    InvalidHandle { kind: &'static str },
    #[error("submission {label:?} did not complete within {timeout:?}")]
    Timeout { label: String, timeout: Duration },
    #[error("validation failed in {label:?}: {message}")]
    Validation { label: String, message: String },
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Fixed-function shader programs the runtime knows how to drive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Program {
    /// Full-screen triangle integrating the split-sum BRDF.
    BrdfLut,
    /// Cosine-weighted hemisphere convolution of an environment cube.
    Irradiance,
    /// GGX importance-sampled convolution of an environment cube.
    PrefilterEnvironment,
}

/// Vertex data a pipeline consumes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexInput {
    /// Vertices are generated in the shader.
    None,
    /// The interleaved [`pbrview_types::Vertex`] layout.
    Model,
}

pub struct PipelineDesc<'a, B: GpuBackend> {
    pub label: &'a str,
    pub program: Program,
    pub color_format: ImageFormat,
    pub vertex_input: VertexInput,
    /// Bytes of push constants visible to both vertex and fragment stages.
    pub push_constant_size: u32,
    /// Texture bound to the fragment stage, if the program samples one.
    pub texture: Option<(&'a B::ImageView, &'a B::Sampler)>,
}

pub trait GpuBackend: Sized {
    type Buffer: Debug;
    type Image: Debug;
    type ImageView: Debug;
    type Sampler: Debug;
    type Pipeline: Debug;
    type Commands;

    /// Properties of each memory type the device exposes, by index.
    fn memory_types(&self) -> &[MemoryFlags];

    /// Index of the first memory type permitted by `type_bits` that has every flag in `flags`.
    fn memory_type_index(&self, type_bits: u32, flags: MemoryFlags) -> Result<u32, GpuError> {
        find_memory_type(self.memory_types(), type_bits, flags)
            .ok_or(GpuError::NoSuitableMemoryType { type_bits, flags })
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, GpuError>;
    fn destroy_buffer(&self, buffer: Self::Buffer);
    /// Writes through a host mapping of the buffer and flushes it.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    fn create_image(&self, desc: &ImageDesc<'_>) -> Result<Self::Image, GpuError>;
    fn destroy_image(&self, image: Self::Image);
    fn create_image_view(&self, image: &Self::Image, desc: &ImageViewDesc<'_>) -> Result<Self::ImageView, GpuError>;
    fn destroy_image_view(&self, view: Self::ImageView);
    fn create_sampler(&self, desc: &SamplerDesc<'_>) -> Result<Self::Sampler, GpuError>;
    fn destroy_sampler(&self, sampler: Self::Sampler);
    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<Self::Pipeline, GpuError>;
    fn destroy_pipeline(&self, pipeline: Self::Pipeline);

    fn begin_commands(&self, label: &str) -> Result<Self::Commands, GpuError>;
    fn copy_buffer(&self, cmd: &mut Self::Commands, src: &Self::Buffer, dst: &Self::Buffer, size: u64);
    fn copy_buffer_to_image(
        &self,
        cmd: &mut Self::Commands,
        src: &Self::Buffer,
        dst: &Self::Image,
        region: &BufferImageCopy,
    );
    fn image_barrier(
        &self,
        cmd: &mut Self::Commands,
        image: &Self::Image,
        range: SubresourceRange,
        old: ImageLayout,
        new: ImageLayout,
    );
    fn blit_image(&self, cmd: &mut Self::Commands, src: &Self::Image, dst: &Self::Image, region: &ImageBlit);
    fn copy_image(&self, cmd: &mut Self::Commands, src: &Self::Image, dst: &Self::Image, region: &ImageCopy);

    fn begin_render_pass(&self, cmd: &mut Self::Commands, target: &Self::ImageView, clear: Vec4);
    fn end_render_pass(&self, cmd: &mut Self::Commands);
    fn set_viewport(&self, cmd: &mut Self::Commands, viewport: &Viewport);
    fn bind_pipeline(&self, cmd: &mut Self::Commands, pipeline: &Self::Pipeline);
    fn push_constants(&self, cmd: &mut Self::Commands, offset: u32, data: &[u8]);
    fn bind_vertex_buffer(&self, cmd: &mut Self::Commands, buffer: &Self::Buffer, offset: u64);
    /// Binds a buffer of `u32` indices.
    fn bind_index_buffer(&self, cmd: &mut Self::Commands, buffer: &Self::Buffer, offset: u64);
    fn draw(
        &self,
        cmd: &mut Self::Commands,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn draw_indexed(
        &self,
        cmd: &mut Self::Commands,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Submits recorded work and blocks until it completes or `timeout` elapses.
    fn submit_and_wait(&self, cmd: Self::Commands, timeout: Duration) -> Result<(), GpuError>;
}
