//! A GPU backend that lives entirely in host memory.
//!
//! Resources are plain byte vectors and commands execute on the CPU at
//! submission. Image layouts are tracked per subresource and every command is
//! validated against them, which makes this backend useful for testing the
//! ordering of transfers and barriers without a device. Rasterization is not
//! performed; render targets only receive their clear color.

use std::time::Duration;

use glam::{UVec2, Vec4};
use half::f16;
use parking_lot::Mutex;
use pbrview_types::gpu::{
    mip_extent, BufferDesc, BufferImageCopy, BufferUsage, Filter, ImageBlit, ImageCopy, ImageDesc, ImageFormat,
    ImageLayout, ImageUsage, ImageViewDesc, MemoryFlags, SamplerDesc, SubresourceRange, ViewDimension, Viewport,
};
use rustc_hash::FxHashMap;

use crate::backend::{GpuBackend, GpuError, PipelineDesc, Program, VertexInput};

type FastHashMap<K, V> = FxHashMap<K, V>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessBuffer(u32);
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessImage(u32);
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessImageView(u32);
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessSampler(u32);
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessPipeline(u32);

/// A recorded command, kept in the execution history after submission.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessCommand {
    CopyBuffer {
        src: HeadlessBuffer,
        dst: HeadlessBuffer,
        size: u64,
    },
    CopyBufferToImage {
        src: HeadlessBuffer,
        dst: HeadlessImage,
        region: BufferImageCopy,
    },
    Barrier {
        image: HeadlessImage,
        range: SubresourceRange,
        old: ImageLayout,
        new: ImageLayout,
    },
    Blit {
        src: HeadlessImage,
        dst: HeadlessImage,
        region: ImageBlit,
    },
    CopyImage {
        src: HeadlessImage,
        dst: HeadlessImage,
        region: ImageCopy,
    },
    BeginRenderPass {
        target: HeadlessImageView,
        clear: Vec4,
    },
    EndRenderPass,
    SetViewport(Viewport),
    BindPipeline(HeadlessPipeline),
    PushConstants {
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer {
        buffer: HeadlessBuffer,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: HeadlessBuffer,
        offset: u64,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
}

pub struct HeadlessCommands {
    label: String,
    commands: Vec<HeadlessCommand>,
}

impl HeadlessCommands {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands recorded so far, in order.
    pub fn commands(&self) -> &[HeadlessCommand] {
        &self.commands
    }
}

/// Counters accumulated over every successful submission.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HeadlessStats {
    pub submits: u32,
    pub draws: u32,
    pub indices_drawn: u64,
    pub blits: u32,
    pub copies: u32,
    pub barriers: u32,
    pub render_passes: u32,
}

/// Number of resources of each kind that have not been destroyed yet.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LiveResources {
    pub buffers: usize,
    pub images: usize,
    pub views: usize,
    pub samplers: usize,
    pub pipelines: usize,
}

struct BufferState {
    label: String,
    usage: BufferUsage,
    host_visible: bool,
    data: Vec<u8>,
}

struct ImageState {
    label: String,
    format: ImageFormat,
    size: UVec2,
    mip_levels: u32,
    layers: u32,
    usage: ImageUsage,
    /// Indexed by `layer * mip_levels + mip`.
    texels: Vec<Vec<u8>>,
    layouts: Vec<ImageLayout>,
}

impl ImageState {
    fn subresource(&self, mip: u32, layer: u32) -> Option<usize> {
        (mip < self.mip_levels && layer < self.layers).then_some((layer * self.mip_levels + mip) as usize)
    }
}

struct ViewState {
    image: HeadlessImage,
    range: SubresourceRange,
}

struct PipelineState {
    program: Program,
    vertex_input: VertexInput,
    push_constant_size: u32,
}

#[derive(Default)]
struct State {
    next_id: u32,
    buffers: FastHashMap<u32, BufferState>,
    images: FastHashMap<u32, ImageState>,
    views: FastHashMap<u32, ViewState>,
    samplers: FastHashMap<u32, String>,
    pipelines: FastHashMap<u32, PipelineState>,
    history: Vec<HeadlessCommand>,
    stats: HeadlessStats,
}

impl State {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Transient state while replaying one submission.
#[derive(Default)]
struct Replay {
    in_pass: bool,
    pipeline: Option<HeadlessPipeline>,
    vertex_buffer: Option<HeadlessBuffer>,
    index_buffer: Option<(HeadlessBuffer, u64)>,
}

pub struct HeadlessBackend {
    memory_types: Vec<MemoryFlags>,
    state: Mutex<State>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            memory_types: vec![
                MemoryFlags::DEVICE_LOCAL,
                MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
            ],
            state: Mutex::new(State::default()),
        }
    }

    /// Every command executed so far, in submission order.
    pub fn history(&self) -> Vec<HeadlessCommand> {
        self.state.lock().history.clone()
    }

    /// Forgets the recorded commands and resets the counters.
    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.stats = HeadlessStats::default();
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.lock().stats
    }

    pub fn live_resources(&self) -> LiveResources {
        let state = self.state.lock();
        LiveResources {
            buffers: state.buffers.len(),
            images: state.images.len(),
            views: state.views.len(),
            samplers: state.samplers.len(),
            pipelines: state.pipelines.len(),
        }
    }

    pub fn buffer_contents(&self, buffer: &HeadlessBuffer) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer.0).map(|b| b.data.clone())
    }

    pub fn image_contents(&self, image: &HeadlessImage, mip: u32, layer: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let image = state.images.get(&image.0)?;
        image.subresource(mip, layer).map(|idx| image.texels[idx].clone())
    }

    pub fn image_layout(&self, image: &HeadlessImage, mip: u32, layer: u32) -> Option<ImageLayout> {
        let state = self.state.lock();
        let image = state.images.get(&image.0)?;
        image.subresource(mip, layer).map(|idx| image.layouts[idx])
    }

    /// Program a pipeline was created for.
    pub fn pipeline_program(&self, pipeline: &HeadlessPipeline) -> Option<Program> {
        self.state.lock().pipelines.get(&pipeline.0).map(|p| p.program)
    }

    fn record(cmd: &mut HeadlessCommands, command: HeadlessCommand) {
        log::trace!("{}: recording {:?}", cmd.label, command);
        cmd.commands.push(command);
    }
}

fn validation(label: &str, message: impl Into<String>) -> GpuError {
    GpuError::Validation {
        label: label.to_owned(),
        message: message.into(),
    }
}

fn encode_texel(format: ImageFormat, color: Vec4) -> Vec<u8> {
    match format {
        ImageFormat::Rgba8Unorm => color
            .to_array()
            .iter()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect(),
        ImageFormat::Rg16Float => [color.x, color.y]
            .iter()
            .flat_map(|&c| f16::from_f32(c).to_bits().to_le_bytes())
            .collect(),
        ImageFormat::Rgba16Float => color
            .to_array()
            .iter()
            .flat_map(|&c| f16::from_f32(c).to_bits().to_le_bytes())
            .collect(),
        ImageFormat::Rgba32Float => bytemuck::bytes_of(&color.to_array()).to_vec(),
    }
}

fn blit_texels(format: ImageFormat, src: &[u8], src_size: UVec2, dst: &mut [u8], dst_size: UVec2, filter: Filter) {
    let bpt = format.bytes_per_texel() as usize;
    let scale_x = src_size.x as f32 / dst_size.x as f32;
    let scale_y = src_size.y as f32 / dst_size.y as f32;
    let row = |y: u32| (y * src_size.x) as usize;

    for y in 0..dst_size.y {
        for x in 0..dst_size.x {
            let out = ((y * dst_size.x + x) as usize) * bpt;
            let sx = (x as f32 + 0.5) * scale_x - 0.5;
            let sy = (y as f32 + 0.5) * scale_y - 0.5;

            if filter == Filter::Linear && format == ImageFormat::Rgba8Unorm {
                let x0 = (sx.floor().max(0.0) as u32).min(src_size.x - 1);
                let y0 = (sy.floor().max(0.0) as u32).min(src_size.y - 1);
                let x1 = (x0 + 1).min(src_size.x - 1);
                let y1 = (y0 + 1).min(src_size.y - 1);
                let fx = (sx - x0 as f32).clamp(0.0, 1.0);
                let fy = (sy - y0 as f32).clamp(0.0, 1.0);
                for c in 0..bpt {
                    let texel = |tx: u32, ty: u32| src[(row(ty) + tx as usize) * bpt + c] as f32;
                    let top = texel(x0, y0) * (1.0 - fx) + texel(x1, y0) * fx;
                    let bottom = texel(x0, y1) * (1.0 - fx) + texel(x1, y1) * fx;
                    dst[out + c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
                }
            } else {
                let tx = (sx.round().max(0.0) as u32).min(src_size.x - 1);
                let ty = (sy.round().max(0.0) as u32).min(src_size.y - 1);
                let from = (row(ty) + tx as usize) * bpt;
                dst[out..out + bpt].copy_from_slice(&src[from..from + bpt]);
            }
        }
    }
}

impl State {
    fn image(&self, label: &str, image: HeadlessImage) -> Result<&ImageState, GpuError> {
        self.images
            .get(&image.0)
            .ok_or_else(|| validation(label, format!("image {} does not exist", image.0)))
    }

    fn image_mut(&mut self, label: &str, image: HeadlessImage) -> Result<&mut ImageState, GpuError> {
        self.images
            .get_mut(&image.0)
            .ok_or_else(|| validation(label, format!("image {} does not exist", image.0)))
    }

    fn buffer(&self, label: &str, buffer: HeadlessBuffer) -> Result<&BufferState, GpuError> {
        self.buffers
            .get(&buffer.0)
            .ok_or_else(|| validation(label, format!("buffer {} does not exist", buffer.0)))
    }

    fn expect_layout(
        &self,
        label: &str,
        image: HeadlessImage,
        mip: u32,
        layer: u32,
        expected: ImageLayout,
    ) -> Result<usize, GpuError> {
        let state = self.image(label, image)?;
        let idx = state.subresource(mip, layer).ok_or_else(|| {
            validation(
                label,
                format!("image {:?} has no mip {mip} layer {layer}", state.label),
            )
        })?;
        if state.layouts[idx] != expected {
            return Err(validation(
                label,
                format!(
                    "image {:?} mip {mip} layer {layer} is in {:?}, expected {:?}",
                    state.label, state.layouts[idx], expected
                ),
            ));
        }
        Ok(idx)
    }

    fn execute(&mut self, label: &str, replay: &mut Replay, command: &HeadlessCommand) -> Result<(), GpuError> {
        match *command {
            HeadlessCommand::CopyBuffer { src, dst, size } => {
                let src_state = self.buffer(label, src)?;
                if !src_state.usage.contains(BufferUsage::TRANSFER_SRC) || size > src_state.data.len() as u64 {
                    return Err(validation(label, format!("invalid copy source {:?}", src_state.label)));
                }
                let data = src_state.data[..size as usize].to_vec();
                let dst_state = self
                    .buffers
                    .get_mut(&dst.0)
                    .ok_or_else(|| validation(label, "copy destination does not exist"))?;
                if !dst_state.usage.contains(BufferUsage::TRANSFER_DST) || size > dst_state.data.len() as u64 {
                    return Err(validation(label, format!("invalid copy destination {:?}", dst_state.label)));
                }
                dst_state.data[..size as usize].copy_from_slice(&data);
                self.stats.copies += 1;
            }
            HeadlessCommand::CopyBufferToImage { src, dst, region } => {
                let idx = self.expect_layout(label, dst, region.mip, region.layer, ImageLayout::TransferDst)?;
                let image = self.image(label, dst)?;
                let extent = mip_extent(image.size, region.mip);
                if region.extent != extent {
                    return Err(validation(
                        label,
                        format!("copy extent {} does not match mip extent {extent}", region.extent),
                    ));
                }
                let len = (extent.x * extent.y * image.format.bytes_per_texel()) as usize;
                let src_state = self.buffer(label, src)?;
                let start = region.buffer_offset as usize;
                let data = src_state
                    .data
                    .get(start..start + len)
                    .ok_or_else(|| validation(label, "buffer to image copy reads past the end of the buffer"))?
                    .to_vec();
                self.image_mut(label, dst)?.texels[idx] = data;
                self.stats.copies += 1;
            }
            HeadlessCommand::Barrier { image, range, old, new } => {
                let state = self.image_mut(label, image)?;
                let image_label = state.label.clone();
                for layer in range.layers() {
                    for mip in range.mips() {
                        let idx = state.subresource(mip, layer).ok_or_else(|| {
                            validation(label, format!("barrier range exceeds image {image_label:?}"))
                        })?;
                        if old != ImageLayout::Undefined && state.layouts[idx] != old {
                            return Err(validation(
                                label,
                                format!(
                                    "barrier expects image {image_label:?} mip {mip} layer {layer} in {old:?}, \
                                     found {:?}",
                                    state.layouts[idx]
                                ),
                            ));
                        }
                        state.layouts[idx] = new;
                    }
                }
                self.stats.barriers += 1;
            }
            HeadlessCommand::Blit { src, dst, region } => {
                let src_idx = self.expect_layout(label, src, region.src_mip, region.src_layer, ImageLayout::TransferSrc)?;
                let dst_idx = self.expect_layout(label, dst, region.dst_mip, region.dst_layer, ImageLayout::TransferDst)?;
                let src_state = self.image(label, src)?;
                let format = src_state.format;
                let src_size = mip_extent(src_state.size, region.src_mip);
                if region.src_extent != src_size {
                    return Err(validation(label, "blit source extent does not match the mip level"));
                }
                let texels = src_state.texels[src_idx].clone();
                let dst_state = self.image_mut(label, dst)?;
                if dst_state.format != format || region.dst_extent != mip_extent(dst_state.size, region.dst_mip) {
                    return Err(validation(label, "blit destination does not match the source format or mip level"));
                }
                blit_texels(
                    format,
                    &texels,
                    src_size,
                    &mut dst_state.texels[dst_idx],
                    region.dst_extent,
                    region.filter,
                );
                self.stats.blits += 1;
            }
            HeadlessCommand::CopyImage { src, dst, region } => {
                let src_idx = self.expect_layout(label, src, region.src_mip, region.src_layer, ImageLayout::TransferSrc)?;
                let dst_idx = self.expect_layout(label, dst, region.dst_mip, region.dst_layer, ImageLayout::TransferDst)?;
                let src_state = self.image(label, src)?;
                let format = src_state.format;
                let src_size = mip_extent(src_state.size, region.src_mip);
                if region.extent.cmpgt(src_size).any() {
                    return Err(validation(label, "image copy region exceeds the source"));
                }
                let src_texels = src_state.texels[src_idx].clone();
                let dst_state = self.image_mut(label, dst)?;
                let dst_size = mip_extent(dst_state.size, region.dst_mip);
                if dst_state.format != format || region.extent.cmpgt(dst_size).any() {
                    return Err(validation(label, "image copy region exceeds the destination"));
                }
                let bpt = format.bytes_per_texel() as usize;
                let row_len = region.extent.x as usize * bpt;
                for y in 0..region.extent.y as usize {
                    let from = y * src_size.x as usize * bpt;
                    let to = y * dst_size.x as usize * bpt;
                    dst_state.texels[dst_idx][to..to + row_len].copy_from_slice(&src_texels[from..from + row_len]);
                }
                self.stats.copies += 1;
            }
            HeadlessCommand::BeginRenderPass { target, clear } => {
                if replay.in_pass {
                    return Err(validation(label, "render pass begun inside another render pass"));
                }
                let view = self
                    .views
                    .get(&target.0)
                    .ok_or_else(|| validation(label, "render target view does not exist"))?;
                let (image, range) = (view.image, view.range);
                let idx = self.expect_layout(
                    label,
                    image,
                    range.base_mip,
                    range.base_layer,
                    ImageLayout::ColorAttachment,
                )?;
                let state = self.image_mut(label, image)?;
                if !state.usage.contains(ImageUsage::COLOR_ATTACHMENT) {
                    return Err(validation(label, format!("image {:?} is not a color attachment", state.label)));
                }
                let texel = encode_texel(state.format, clear);
                for chunk in state.texels[idx].chunks_exact_mut(texel.len()) {
                    chunk.copy_from_slice(&texel);
                }
                replay.in_pass = true;
                self.stats.render_passes += 1;
            }
            HeadlessCommand::EndRenderPass => {
                if !replay.in_pass {
                    return Err(validation(label, "render pass ended without being begun"));
                }
                replay.in_pass = false;
                replay.pipeline = None;
            }
            HeadlessCommand::SetViewport(viewport) => {
                if viewport.width <= 0.0 || viewport.height <= 0.0 {
                    return Err(validation(label, "viewport has no area"));
                }
            }
            HeadlessCommand::BindPipeline(pipeline) => {
                if !self.pipelines.contains_key(&pipeline.0) {
                    return Err(validation(label, "bound pipeline does not exist"));
                }
                replay.pipeline = Some(pipeline);
            }
            HeadlessCommand::PushConstants { offset, ref data } => {
                let pipeline = replay
                    .pipeline
                    .and_then(|p| self.pipelines.get(&p.0))
                    .ok_or_else(|| validation(label, "push constants without a bound pipeline"))?;
                if offset as usize + data.len() > pipeline.push_constant_size as usize {
                    return Err(validation(
                        label,
                        format!(
                            "push constant range {}..{} exceeds {} bytes",
                            offset,
                            offset as usize + data.len(),
                            pipeline.push_constant_size
                        ),
                    ));
                }
            }
            HeadlessCommand::BindVertexBuffer { buffer, .. } => {
                let state = self.buffer(label, buffer)?;
                if !state.usage.contains(BufferUsage::VERTEX) {
                    return Err(validation(label, format!("buffer {:?} is not a vertex buffer", state.label)));
                }
                replay.vertex_buffer = Some(buffer);
            }
            HeadlessCommand::BindIndexBuffer { buffer, offset } => {
                let state = self.buffer(label, buffer)?;
                if !state.usage.contains(BufferUsage::INDEX) {
                    return Err(validation(label, format!("buffer {:?} is not an index buffer", state.label)));
                }
                replay.index_buffer = Some((buffer, offset));
            }
            HeadlessCommand::Draw { vertex_count, .. } => {
                self.check_draw(label, replay, false)?;
                self.stats.draws += 1;
                self.stats.indices_drawn += vertex_count as u64;
            }
            HeadlessCommand::DrawIndexed {
                index_count,
                first_index,
                ..
            } => {
                self.check_draw(label, replay, true)?;
                let (buffer, offset) = replay
                    .index_buffer
                    .ok_or_else(|| validation(label, "indexed draw without an index buffer"))?;
                let available = (self.buffer(label, buffer)?.data.len() as u64).saturating_sub(offset) / 4;
                if first_index as u64 + index_count as u64 > available {
                    return Err(validation(
                        label,
                        format!("indexed draw reads indices {first_index}..{} of {available}", first_index + index_count),
                    ));
                }
                self.stats.draws += 1;
                self.stats.indices_drawn += index_count as u64;
            }
        }
        Ok(())
    }

    fn check_draw(&self, label: &str, replay: &Replay, indexed: bool) -> Result<(), GpuError> {
        if !replay.in_pass {
            return Err(validation(label, "draw outside of a render pass"));
        }
        let pipeline = replay
            .pipeline
            .and_then(|p| self.pipelines.get(&p.0))
            .ok_or_else(|| validation(label, "draw without a bound pipeline"))?;
        if pipeline.vertex_input == VertexInput::Model && replay.vertex_buffer.is_none() {
            return Err(validation(label, "pipeline consumes vertices but no vertex buffer is bound"));
        }
        if indexed && pipeline.vertex_input == VertexInput::None {
            return Err(validation(label, "indexed draw on a pipeline without vertex input"));
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Image = HeadlessImage;
    type ImageView = HeadlessImageView;
    type Sampler = HeadlessSampler;
    type Pipeline = HeadlessPipeline;
    type Commands = HeadlessCommands;

    fn memory_types(&self) -> &[MemoryFlags] {
        &self.memory_types
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, GpuError> {
        let memory_type = self.memory_type_index(!0, desc.memory)?;
        let host_visible = self.memory_types[memory_type as usize].contains(MemoryFlags::HOST_VISIBLE);
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.buffers.insert(
            id,
            BufferState {
                label: desc.label.to_owned(),
                usage: desc.usage,
                host_visible,
                data: vec![0; desc.size as usize],
            },
        );
        log::trace!("created buffer {:?} ({} bytes, memory type {memory_type})", desc.label, desc.size);
        Ok(HeadlessBuffer(id))
    }

    fn destroy_buffer(&self, buffer: Self::Buffer) {
        self.state.lock().buffers.remove(&buffer.0);
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        let buffer = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(GpuError::InvalidHandle { kind: "buffer" })?;
        if !buffer.host_visible {
            return Err(GpuError::NotHostVisible(buffer.label.clone()));
        }
        let end = offset + data.len() as u64;
        if end > buffer.data.len() as u64 {
            return Err(GpuError::OutOfBounds {
                label: buffer.label.clone(),
                offset,
                len: data.len() as u64,
                size: buffer.data.len() as u64,
            });
        }
        buffer.data[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc<'_>) -> Result<Self::Image, GpuError> {
        if desc.cube && desc.layers != 6 {
            return Err(validation(desc.label, "cube images need exactly 6 layers"));
        }
        if desc.mip_levels == 0 || desc.layers == 0 || desc.size.cmpeq(UVec2::ZERO).any() {
            return Err(validation(desc.label, "image has no texels"));
        }
        let bpt = desc.format.bytes_per_texel();
        let mut texels = Vec::with_capacity((desc.mip_levels * desc.layers) as usize);
        for _layer in 0..desc.layers {
            for mip in 0..desc.mip_levels {
                let extent = mip_extent(desc.size, mip);
                texels.push(vec![0; (extent.x * extent.y * bpt) as usize]);
            }
        }
        let subresources = texels.len();

        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.images.insert(
            id,
            ImageState {
                label: desc.label.to_owned(),
                format: desc.format,
                size: desc.size,
                mip_levels: desc.mip_levels,
                layers: desc.layers,
                usage: desc.usage,
                texels,
                layouts: vec![ImageLayout::Undefined; subresources],
            },
        );
        log::trace!(
            "created image {:?} {:?} {} with {} mips and {} layers",
            desc.label,
            desc.format,
            desc.size,
            desc.mip_levels,
            desc.layers
        );
        Ok(HeadlessImage(id))
    }

    fn destroy_image(&self, image: Self::Image) {
        self.state.lock().images.remove(&image.0);
    }

    fn create_image_view(&self, image: &Self::Image, desc: &ImageViewDesc<'_>) -> Result<Self::ImageView, GpuError> {
        let mut state = self.state.lock();
        let image_state = state
            .images
            .get(&image.0)
            .ok_or(GpuError::InvalidHandle { kind: "image" })?;
        let range = desc.range;
        if range.mips().end > image_state.mip_levels || range.layers().end > image_state.layers {
            return Err(validation(desc.label, "view range exceeds the image"));
        }
        if desc.dimension == ViewDimension::Cube && range.layer_count != 6 {
            return Err(validation(desc.label, "cube views need exactly 6 layers"));
        }
        let id = state.allocate_id();
        state.views.insert(id, ViewState { image: *image, range });
        Ok(HeadlessImageView(id))
    }

    fn destroy_image_view(&self, view: Self::ImageView) {
        self.state.lock().views.remove(&view.0);
    }

    fn create_sampler(&self, desc: &SamplerDesc<'_>) -> Result<Self::Sampler, GpuError> {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.samplers.insert(id, desc.label.to_owned());
        Ok(HeadlessSampler(id))
    }

    fn destroy_sampler(&self, sampler: Self::Sampler) {
        self.state.lock().samplers.remove(&sampler.0);
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<Self::Pipeline, GpuError> {
        let mut state = self.state.lock();
        if let Some((view, sampler)) = desc.texture {
            if !state.views.contains_key(&view.0) || !state.samplers.contains_key(&sampler.0) {
                return Err(GpuError::InvalidHandle { kind: "pipeline texture" });
            }
        }
        let id = state.allocate_id();
        state.pipelines.insert(
            id,
            PipelineState {
                program: desc.program,
                vertex_input: desc.vertex_input,
                push_constant_size: desc.push_constant_size,
            },
        );
        log::trace!("created pipeline {:?} for {:?}", desc.label, desc.program);
        Ok(HeadlessPipeline(id))
    }

    fn destroy_pipeline(&self, pipeline: Self::Pipeline) {
        self.state.lock().pipelines.remove(&pipeline.0);
    }

    fn begin_commands(&self, label: &str) -> Result<Self::Commands, GpuError> {
        Ok(HeadlessCommands {
            label: label.to_owned(),
            commands: Vec::new(),
        })
    }

    fn copy_buffer(&self, cmd: &mut Self::Commands, src: &Self::Buffer, dst: &Self::Buffer, size: u64) {
        Self::record(
            cmd,
            HeadlessCommand::CopyBuffer {
                src: *src,
                dst: *dst,
                size,
            },
        );
    }

    fn copy_buffer_to_image(
        &self,
        cmd: &mut Self::Commands,
        src: &Self::Buffer,
        dst: &Self::Image,
        region: &BufferImageCopy,
    ) {
        Self::record(
            cmd,
            HeadlessCommand::CopyBufferToImage {
                src: *src,
                dst: *dst,
                region: *region,
            },
        );
    }

    fn image_barrier(
        &self,
        cmd: &mut Self::Commands,
        image: &Self::Image,
        range: SubresourceRange,
        old: ImageLayout,
        new: ImageLayout,
    ) {
        Self::record(
            cmd,
            HeadlessCommand::Barrier {
                image: *image,
                range,
                old,
                new,
            },
        );
    }

    fn blit_image(&self, cmd: &mut Self::Commands, src: &Self::Image, dst: &Self::Image, region: &ImageBlit) {
        Self::record(
            cmd,
            HeadlessCommand::Blit {
                src: *src,
                dst: *dst,
                region: *region,
            },
        );
    }

    fn copy_image(&self, cmd: &mut Self::Commands, src: &Self::Image, dst: &Self::Image, region: &ImageCopy) {
        Self::record(
            cmd,
            HeadlessCommand::CopyImage {
                src: *src,
                dst: *dst,
                region: *region,
            },
        );
    }

    fn begin_render_pass(&self, cmd: &mut Self::Commands, target: &Self::ImageView, clear: Vec4) {
        Self::record(cmd, HeadlessCommand::BeginRenderPass { target: *target, clear });
    }

    fn end_render_pass(&self, cmd: &mut Self::Commands) {
        Self::record(cmd, HeadlessCommand::EndRenderPass);
    }

    fn set_viewport(&self, cmd: &mut Self::Commands, viewport: &Viewport) {
        Self::record(cmd, HeadlessCommand::SetViewport(*viewport));
    }

    fn bind_pipeline(&self, cmd: &mut Self::Commands, pipeline: &Self::Pipeline) {
        Self::record(cmd, HeadlessCommand::BindPipeline(*pipeline));
    }

    fn push_constants(&self, cmd: &mut Self::Commands, offset: u32, data: &[u8]) {
        Self::record(
            cmd,
            HeadlessCommand::PushConstants {
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn bind_vertex_buffer(&self, cmd: &mut Self::Commands, buffer: &Self::Buffer, offset: u64) {
        Self::record(cmd, HeadlessCommand::BindVertexBuffer { buffer: *buffer, offset });
    }

    fn bind_index_buffer(&self, cmd: &mut Self::Commands, buffer: &Self::Buffer, offset: u64) {
        Self::record(cmd, HeadlessCommand::BindIndexBuffer { buffer: *buffer, offset });
    }

    fn draw(
        &self,
        cmd: &mut Self::Commands,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        Self::record(
            cmd,
            HeadlessCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
        );
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
        Self::record(
            cmd,
            HeadlessCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            },
        );
    }

    fn submit_and_wait(&self, cmd: Self::Commands, _timeout: Duration) -> Result<(), GpuError> {
        profiling::scope!("HeadlessBackend::submit_and_wait");

        let mut state = self.state.lock();
        let mut replay = Replay::default();
        for command in &cmd.commands {
            state.execute(&cmd.label, &mut replay, command)?;
        }
        if replay.in_pass {
            return Err(validation(&cmd.label, "submitted with an open render pass"));
        }
        state.stats.submits += 1;
        state.history.extend(cmd.commands);
        log::trace!("submitted {:?}", cmd.label);
        Ok(())
    }
}
