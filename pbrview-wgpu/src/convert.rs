//! Mapping of the backend independent descriptors onto wgpu.

use pbrview::types::gpu::{AddressMode, BufferUsage, Filter, ImageFormat, ImageUsage, MemoryFlags, ViewDimension};
use wgpu::{BufferUsages, FilterMode, TextureFormat, TextureUsages, TextureViewDimension};

pub fn texture_format(format: ImageFormat) -> TextureFormat {
    match format {
        ImageFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        ImageFormat::Rg16Float => TextureFormat::Rg16Float,
        ImageFormat::Rgba16Float => TextureFormat::Rgba16Float,
        ImageFormat::Rgba32Float => TextureFormat::Rgba32Float,
    }
}

/// Host visible buffers are written through the queue and so always need `COPY_DST`.
pub fn buffer_usages(usage: BufferUsage, memory: MemoryFlags) -> BufferUsages {
    let mut out = BufferUsages::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        out |= BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) || memory.contains(MemoryFlags::HOST_VISIBLE) {
        out |= BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::VERTEX) {
        out |= BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= BufferUsages::INDEX;
    }
    out
}

/// Blits are rendered, so their source is sampled and their destination is an attachment.
pub fn texture_usages(usage: ImageUsage) -> TextureUsages {
    let mut out = TextureUsages::empty();
    if usage.contains(ImageUsage::TRANSFER_SRC) {
        out |= TextureUsages::COPY_SRC | TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(ImageUsage::TRANSFER_DST) {
        out |= TextureUsages::COPY_DST | TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(ImageUsage::SAMPLED) {
        out |= TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        out |= TextureUsages::RENDER_ATTACHMENT;
    }
    out
}

pub fn filter_mode(filter: Filter) -> FilterMode {
    match filter {
        Filter::Nearest => FilterMode::Nearest,
        Filter::Linear => FilterMode::Linear,
    }
}

pub fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn view_dimension(dimension: ViewDimension) -> TextureViewDimension {
    match dimension {
        ViewDimension::D2 => TextureViewDimension::D2,
        ViewDimension::Cube => TextureViewDimension::Cube,
    }
}

/// Rounds up to the copy alignment wgpu requires of buffer sizes and offsets.
pub fn align_copy(value: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use pbrview::types::gpu::{BufferUsage, ImageUsage, MemoryFlags};
    use wgpu::{BufferUsages, TextureUsages};

    use super::{align_copy, buffer_usages, texture_usages};

    #[test]
    fn staging_buffers_can_be_written() {
        let usages = buffer_usages(
            BufferUsage::TRANSFER_SRC,
            MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        );
        assert_eq!(usages, BufferUsages::COPY_SRC | BufferUsages::COPY_DST);
        assert_eq!(
            buffer_usages(BufferUsage::VERTEX, MemoryFlags::DEVICE_LOCAL),
            BufferUsages::VERTEX
        );
    }

    #[test]
    fn blit_endpoints_gain_render_usages() {
        let usages = texture_usages(ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST);
        assert!(usages.contains(TextureUsages::TEXTURE_BINDING | TextureUsages::RENDER_ATTACHMENT));
        assert_eq!(texture_usages(ImageUsage::SAMPLED), TextureUsages::TEXTURE_BINDING);
    }

    #[test]
    fn copy_alignment() {
        assert_eq!(align_copy(0), 0);
        assert_eq!(align_copy(3), 4);
        assert_eq!(align_copy(88), 88);
    }
}
