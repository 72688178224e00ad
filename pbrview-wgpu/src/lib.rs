//! [`GpuBackend`] implementation on top of wgpu.
//!
//! Commands are recorded into a list of operations holding shared handles and
//! replayed into a [`wgpu::CommandEncoder`] at submission. wgpu tracks resource
//! state itself, so image barriers are accepted and dropped.
//!
//! Host visible buffers keep a host copy of their contents. Buffer to image
//! copies out of such buffers are performed with [`wgpu::Queue::write_texture`],
//! which has no row alignment requirements.
//!
//! ```no_run
//! # async fn run() -> Result<(), pbrview_wgpu::WgpuBackendError> {
//! let iad = pbrview_wgpu::create_iad(None, None).await?;
//! let backend = pbrview_wgpu::WgpuBackend::new(&iad);
//! # Ok(()) }
//! ```

use std::{
    ops::Range,
    sync::Arc,
    time::{Duration, Instant},
};

use glam::{UVec2, Vec4};
use parking_lot::Mutex;
use pbrview::{
    types::gpu::{
        BufferDesc, BufferImageCopy, ImageBlit, ImageCopy, ImageDesc, ImageFormat, ImageLayout, ImageViewDesc,
        MemoryFlags, SamplerDesc, SubresourceRange, Viewport,
    },
    GpuBackend, GpuError, PipelineDesc,
};
use wgpu::{
    BufferDescriptor, Color, CommandEncoder, CommandEncoderDescriptor, Device, Extent3d, ImageCopyBuffer,
    ImageCopyTexture, ImageDataLayout, IndexFormat, LoadOp, Operations, Origin3d, Queue, RenderPassColorAttachment,
    RenderPassDescriptor, SamplerDescriptor, ShaderStages, StoreOp, TextureAspect, TextureDescriptor, TextureDimension,
    TextureView, TextureViewDescriptor,
};

mod blit;
mod convert;
mod error_scope;
mod pipeline;
pub mod setup;

pub use setup::{create_iad, InstanceAdapterDevice, WgpuBackendError};

use blit::Blitter;
use convert::{address_mode, align_copy, buffer_usages, filter_mode, texture_format, texture_usages, view_dimension};
use error_scope::ValidationScope;
use pipeline::{build_program_pipeline, ProgramPipeline, ShaderModules};

pub(crate) type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

#[derive(Debug)]
pub struct WgpuBuffer {
    inner: Arc<wgpu::Buffer>,
    label: String,
    size: u64,
    /// Host copy of the contents, present for host visible buffers.
    shadow: Option<Arc<Mutex<Vec<u8>>>>,
}

#[derive(Debug)]
pub struct WgpuImage {
    inner: Arc<wgpu::Texture>,
    format: ImageFormat,
    size: UVec2,
}

impl WgpuImage {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.inner
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }
}

#[derive(Debug)]
pub struct WgpuImageView {
    inner: Arc<TextureView>,
}

impl WgpuImageView {
    pub fn view(&self) -> &TextureView {
        &self.inner
    }
}

#[derive(Debug)]
pub struct WgpuSampler {
    inner: Arc<wgpu::Sampler>,
}

#[derive(Debug)]
pub struct WgpuPipeline {
    inner: Arc<ProgramPipeline>,
}

#[derive(Debug)]
enum Op {
    CopyBuffer {
        src: Arc<wgpu::Buffer>,
        dst: Arc<wgpu::Buffer>,
        size: u64,
    },
    CopyBufferToImage {
        src: Arc<wgpu::Buffer>,
        shadow: Option<Arc<Mutex<Vec<u8>>>>,
        dst: Arc<wgpu::Texture>,
        bytes_per_texel: u32,
        region: BufferImageCopy,
    },
    Blit {
        src: Arc<wgpu::Texture>,
        dst: Arc<wgpu::Texture>,
        region: ImageBlit,
    },
    CopyImage {
        src: Arc<wgpu::Texture>,
        dst: Arc<wgpu::Texture>,
        region: ImageCopy,
    },
    BeginRenderPass {
        target: Arc<TextureView>,
        clear: Vec4,
    },
    EndRenderPass,
    SetViewport(Viewport),
    BindPipeline(Arc<ProgramPipeline>),
    PushConstants {
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer {
        buffer: Arc<wgpu::Buffer>,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: Arc<wgpu::Buffer>,
        offset: u64,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

pub struct WgpuCommands {
    label: String,
    ops: Vec<Op>,
}

pub struct WgpuBackend {
    device: Arc<Device>,
    queue: Arc<Queue>,
    memory_types: Vec<MemoryFlags>,
    blitter: Blitter,
    shaders: ShaderModules,
}

fn texture_copy(texture: &wgpu::Texture, mip: u32, layer: u32) -> ImageCopyTexture<'_> {
    ImageCopyTexture {
        texture,
        mip_level: mip,
        origin: Origin3d { x: 0, y: 0, z: layer },
        aspect: TextureAspect::All,
    }
}

fn extent(size: UVec2) -> Extent3d {
    Extent3d {
        width: size.x,
        height: size.y,
        depth_or_array_layers: 1,
    }
}

fn validation(label: &str, message: impl Into<String>) -> GpuError {
    GpuError::Validation {
        label: label.to_owned(),
        message: message.into(),
    }
}

/// Records the operations between a begin and end render pass.
fn record_pass<'a>(
    encoder: &'a mut CommandEncoder,
    label: &str,
    target: &'a TextureView,
    clear: Vec4,
    ops: &'a [Op],
) {
    let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: Operations {
                load: LoadOp::Clear(Color {
                    r: clear.x as f64,
                    g: clear.y as f64,
                    b: clear.z as f64,
                    a: clear.w as f64,
                }),
                store: StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    for op in ops {
        match op {
            Op::SetViewport(v) => rpass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth),
            Op::BindPipeline(pipeline) => {
                rpass.set_pipeline(&pipeline.pipeline);
                if let Some(bg) = &pipeline.bind_group {
                    rpass.set_bind_group(0, bg, &[]);
                }
            }
            Op::PushConstants { offset, data } => rpass.set_push_constants(ShaderStages::VERTEX_FRAGMENT, *offset, data),
            Op::BindVertexBuffer { buffer, offset } => rpass.set_vertex_buffer(0, buffer.slice(*offset..)),
            Op::BindIndexBuffer { buffer, offset } => rpass.set_index_buffer(buffer.slice(*offset..), IndexFormat::Uint32),
            Op::Draw { vertices, instances } => rpass.draw(vertices.clone(), instances.clone()),
            Op::DrawIndexed {
                indices,
                base_vertex,
                instances,
            } => rpass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            other => log::warn!("{label}: {other:?} is not allowed inside a render pass"),
        }
    }
}

impl WgpuBackend {
    pub fn new(iad: &InstanceAdapterDevice) -> Self {
        Self::from_device(Arc::clone(&iad.device), Arc::clone(&iad.queue))
    }

    /// Wraps an existing device. It must have been created with [`setup::REQUIRED_FEATURES`].
    pub fn from_device(device: Arc<Device>, queue: Arc<Queue>) -> Self {
        profiling::scope!("WgpuBackend::from_device");
        let blitter = Blitter::new(&device);
        let shaders = ShaderModules::new(&device);
        Self {
            device,
            queue,
            memory_types: vec![
                MemoryFlags::DEVICE_LOCAL,
                MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
            ],
            blitter,
            shaders,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    fn encoder(&self, label: &str) -> CommandEncoder {
        self.device
            .create_command_encoder(&CommandEncoderDescriptor { label: Some(label) })
    }

    fn replay(&self, cmd: &WgpuCommands) -> Result<wgpu::SubmissionIndex, GpuError> {
        let label = cmd.label.as_str();
        let ops = &cmd.ops;
        let mut encoder = self.encoder(label);

        let mut i = 0;
        while i < ops.len() {
            match &ops[i] {
                Op::BeginRenderPass { target, clear } => {
                    let end = ops[i..]
                        .iter()
                        .position(|op| matches!(op, Op::EndRenderPass))
                        .map(|p| i + p)
                        .ok_or_else(|| validation(label, "render pass is never ended"))?;
                    record_pass(&mut encoder, label, target, *clear, &ops[i + 1..end]);
                    i = end;
                }
                Op::CopyBuffer { src, dst, size } => encoder.copy_buffer_to_buffer(src, 0, dst, 0, align_copy(*size)),
                Op::CopyBufferToImage {
                    src,
                    shadow,
                    dst,
                    bytes_per_texel,
                    region,
                } => {
                    let row = region.extent.x * bytes_per_texel;
                    let layout = |offset| ImageDataLayout {
                        offset,
                        bytes_per_row: Some(row),
                        rows_per_image: Some(region.extent.y),
                    };
                    match shadow {
                        Some(shadow) => {
                            // Queue writes land before the next submission, so flush what came before.
                            let previous = std::mem::replace(&mut encoder, self.encoder(label));
                            self.queue.submit(Some(previous.finish()));

                            let start = region.buffer_offset as usize;
                            let len = row as usize * region.extent.y as usize;
                            let data = shadow.lock();
                            let texels = data
                                .get(start..start + len)
                                .ok_or_else(|| validation(label, "buffer to image copy reads past the end of the buffer"))?;
                            self.queue.write_texture(
                                texture_copy(dst, region.mip, region.layer),
                                texels,
                                layout(0),
                                extent(region.extent),
                            );
                        }
                        None => encoder.copy_buffer_to_texture(
                            ImageCopyBuffer {
                                buffer: src,
                                layout: layout(region.buffer_offset),
                            },
                            texture_copy(dst, region.mip, region.layer),
                            extent(region.extent),
                        ),
                    }
                }
                Op::Blit { src, dst, region } => self.blitter.blit(&self.device, &mut encoder, src, dst, region),
                Op::CopyImage { src, dst, region } => encoder.copy_texture_to_texture(
                    texture_copy(src, region.src_mip, region.src_layer),
                    texture_copy(dst, region.dst_mip, region.dst_layer),
                    extent(region.extent),
                ),
                other => log::warn!("{label}: {other:?} is only allowed inside a render pass"),
            }
            i += 1;
        }

        Ok(self.queue.submit(Some(encoder.finish())))
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Image = WgpuImage;
    type ImageView = WgpuImageView;
    type Sampler = WgpuSampler;
    type Pipeline = WgpuPipeline;
    type Commands = WgpuCommands;

    fn memory_types(&self) -> &[MemoryFlags] {
        &self.memory_types
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, GpuError> {
        let size = align_copy(desc.size.max(1));
        let scope = ValidationScope::new(&self.device, desc.label);
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some(desc.label),
            size,
            usage: buffer_usages(desc.usage, desc.memory),
            mapped_at_creation: false,
        });
        scope.end()?;

        let shadow = desc
            .memory
            .contains(MemoryFlags::HOST_VISIBLE)
            .then(|| Arc::new(Mutex::new(vec![0; size as usize])));
        Ok(WgpuBuffer {
            inner: Arc::new(buffer),
            label: desc.label.to_owned(),
            size: desc.size,
            shadow,
        })
    }

    fn destroy_buffer(&self, buffer: Self::Buffer) {
        buffer.inner.destroy();
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let shadow = buffer
            .shadow
            .as_ref()
            .ok_or_else(|| GpuError::NotHostVisible(buffer.label.clone()))?;
        let len = data.len() as u64;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= buffer.size)
            .ok_or_else(|| GpuError::OutOfBounds {
                label: buffer.label.clone(),
                offset,
                len,
                size: buffer.size,
            })?;

        let mut shadow = shadow.lock();
        shadow[offset as usize..end as usize].copy_from_slice(data);
        let start = offset / wgpu::COPY_BUFFER_ALIGNMENT * wgpu::COPY_BUFFER_ALIGNMENT;
        let aligned_end = align_copy(end).min(shadow.len() as u64);
        self.queue
            .write_buffer(&buffer.inner, start, &shadow[start as usize..aligned_end as usize]);
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc<'_>) -> Result<Self::Image, GpuError> {
        if desc.cube && desc.layers != 6 {
            return Err(validation(desc.label, format!("cube image has {} layers", desc.layers)));
        }
        let scope = ValidationScope::new(&self.device, desc.label);
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some(desc.label),
            size: Extent3d {
                width: desc.size.x,
                height: desc.size.y,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: texture_format(desc.format),
            usage: texture_usages(desc.usage),
            view_formats: &[],
        });
        scope.end()?;
        Ok(WgpuImage {
            inner: Arc::new(texture),
            format: desc.format,
            size: desc.size,
        })
    }

    fn destroy_image(&self, image: Self::Image) {
        image.inner.destroy();
    }

    fn create_image_view(&self, image: &Self::Image, desc: &ImageViewDesc<'_>) -> Result<Self::ImageView, GpuError> {
        let scope = ValidationScope::new(&self.device, desc.label);
        let view = image.inner.create_view(&TextureViewDescriptor {
            label: Some(desc.label),
            format: None,
            dimension: Some(view_dimension(desc.dimension)),
            aspect: TextureAspect::All,
            base_mip_level: desc.range.base_mip,
            mip_level_count: Some(desc.range.mip_count),
            base_array_layer: desc.range.base_layer,
            array_layer_count: Some(desc.range.layer_count),
        });
        scope.end()?;
        Ok(WgpuImageView { inner: Arc::new(view) })
    }

    fn destroy_image_view(&self, view: Self::ImageView) {
        drop(view);
    }

    fn create_sampler(&self, desc: &SamplerDesc<'_>) -> Result<Self::Sampler, GpuError> {
        let all_linear = [desc.mag_filter, desc.min_filter, desc.mipmap_filter]
            .iter()
            .all(|&f| f == pbrview::types::gpu::Filter::Linear);
        let anisotropy_clamp = desc.max_anisotropy.filter(|_| all_linear).unwrap_or(1);

        let scope = ValidationScope::new(&self.device, desc.label);
        let sampler = self.device.create_sampler(&SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: address_mode(desc.address_mode_u),
            address_mode_v: address_mode(desc.address_mode_v),
            address_mode_w: address_mode(desc.address_mode_w),
            mag_filter: filter_mode(desc.mag_filter),
            min_filter: filter_mode(desc.min_filter),
            mipmap_filter: filter_mode(desc.mipmap_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: desc.max_lod,
            compare: None,
            anisotropy_clamp,
            border_color: None,
        });
        scope.end()?;
        Ok(WgpuSampler {
            inner: Arc::new(sampler),
        })
    }

    fn destroy_sampler(&self, sampler: Self::Sampler) {
        drop(sampler);
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<Self::Pipeline, GpuError> {
        let scope = ValidationScope::new(&self.device, desc.label);
        let pipeline = build_program_pipeline(
            &self.device,
            &self.shaders,
            desc.label,
            desc.program,
            texture_format(desc.color_format),
            desc.vertex_input,
            desc.push_constant_size,
            desc.texture.map(|(view, sampler)| (&*view.inner, &*sampler.inner)),
        );
        scope.end()?;
        Ok(WgpuPipeline {
            inner: Arc::new(pipeline),
        })
    }

    fn destroy_pipeline(&self, pipeline: Self::Pipeline) {
        drop(pipeline);
    }

    fn begin_commands(&self, label: &str) -> Result<Self::Commands, GpuError> {
        Ok(WgpuCommands {
            label: label.to_owned(),
            ops: Vec::new(),
        })
    }

    fn copy_buffer(&self, cmd: &mut Self::Commands, src: &Self::Buffer, dst: &Self::Buffer, size: u64) {
        cmd.ops.push(Op::CopyBuffer {
            src: Arc::clone(&src.inner),
            dst: Arc::clone(&dst.inner),
            size,
        });
    }

    fn copy_buffer_to_image(
        &self,
        cmd: &mut Self::Commands,
        src: &Self::Buffer,
        dst: &Self::Image,
        region: &BufferImageCopy,
    ) {
        cmd.ops.push(Op::CopyBufferToImage {
            src: Arc::clone(&src.inner),
            shadow: src.shadow.clone(),
            dst: Arc::clone(&dst.inner),
            bytes_per_texel: dst.format.bytes_per_texel(),
            region: *region,
        });
    }

    fn image_barrier(
        &self,
        _cmd: &mut Self::Commands,
        _image: &Self::Image,
        _range: SubresourceRange,
        _old: ImageLayout,
        _new: ImageLayout,
    ) {
    }

    fn blit_image(&self, cmd: &mut Self::Commands, src: &Self::Image, dst: &Self::Image, region: &ImageBlit) {
        cmd.ops.push(Op::Blit {
            src: Arc::clone(&src.inner),
            dst: Arc::clone(&dst.inner),
            region: *region,
        });
    }

    fn copy_image(&self, cmd: &mut Self::Commands, src: &Self::Image, dst: &Self::Image, region: &ImageCopy) {
        cmd.ops.push(Op::CopyImage {
            src: Arc::clone(&src.inner),
            dst: Arc::clone(&dst.inner),
            region: *region,
        });
    }

    fn begin_render_pass(&self, cmd: &mut Self::Commands, target: &Self::ImageView, clear: Vec4) {
        cmd.ops.push(Op::BeginRenderPass {
            target: Arc::clone(&target.inner),
            clear,
        });
    }

    fn end_render_pass(&self, cmd: &mut Self::Commands) {
        cmd.ops.push(Op::EndRenderPass);
    }

    fn set_viewport(&self, cmd: &mut Self::Commands, viewport: &Viewport) {
        cmd.ops.push(Op::SetViewport(*viewport));
    }

    fn bind_pipeline(&self, cmd: &mut Self::Commands, pipeline: &Self::Pipeline) {
        cmd.ops.push(Op::BindPipeline(Arc::clone(&pipeline.inner)));
    }

    fn push_constants(&self, cmd: &mut Self::Commands, offset: u32, data: &[u8]) {
        cmd.ops.push(Op::PushConstants {
            offset,
            data: data.to_vec(),
        });
    }

    fn bind_vertex_buffer(&self, cmd: &mut Self::Commands, buffer: &Self::Buffer, offset: u64) {
        cmd.ops.push(Op::BindVertexBuffer {
            buffer: Arc::clone(&buffer.inner),
            offset,
        });
    }

    fn bind_index_buffer(&self, cmd: &mut Self::Commands, buffer: &Self::Buffer, offset: u64) {
        cmd.ops.push(Op::BindIndexBuffer {
            buffer: Arc::clone(&buffer.inner),
            offset,
        });
    }

    fn draw(
        &self,
        cmd: &mut Self::Commands,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        cmd.ops.push(Op::Draw {
            vertices: first_vertex..first_vertex + vertex_count,
            instances: first_instance..first_instance + instance_count,
        });
    }

    fn draw_indexed(
        &self,
        cmd: &mut Self::Commands,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        cmd.ops.push(Op::DrawIndexed {
            indices: first_index..first_index + index_count,
            base_vertex: vertex_offset,
            instances: first_instance..first_instance + instance_count,
        });
    }

    fn submit_and_wait(&self, cmd: Self::Commands, timeout: Duration) -> Result<(), GpuError> {
        profiling::scope!("submit_and_wait");
        let start = Instant::now();

        let scope = ValidationScope::new(&self.device, &cmd.label);
        let waited = self.replay(&cmd).map(|index| {
            self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        });
        let validated = scope.end();
        waited?;
        validated?;

        let elapsed = start.elapsed();
        if elapsed > timeout {
            return Err(GpuError::Timeout {
                label: cmd.label,
                timeout,
            });
        }
        log::trace!("{}: {} operations completed in {:.2?}", cmd.label, cmd.ops.len(), elapsed);
        Ok(())
    }
}
