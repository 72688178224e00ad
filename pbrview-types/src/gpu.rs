//! Descriptors shared between the scene runtime and GPU backends.

use bitflags::bitflags;
use glam::UVec2;

bitflags! {
    /// How a buffer is going to be used.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const VERTEX = 1 << 3;
        const INDEX = 1 << 4;
    }
}

bitflags! {
    /// Properties a memory type must have to back an allocation.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct MemoryFlags: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
    }
}

bitflags! {
    /// How an image is going to be used.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const COLOR_ATTACHMENT = 1 << 3;
    }
}

/// Returns the index of the first memory type allowed by `type_bits` that has all of `flags`.
pub fn find_memory_type(types: &[MemoryFlags], type_bits: u32, flags: MemoryFlags) -> Option<u32> {
    types
        .iter()
        .enumerate()
        .take(32)
        .find(|&(idx, ty)| type_bits & (1 << idx) != 0 && ty.contains(flags))
        .map(|(idx, _)| idx as u32)
}

/// Number of levels in a full mip chain for an image of the given size.
///
/// ```
/// assert_eq!(pbrview_types::gpu::mip_levels(256, 256), 9);
/// assert_eq!(pbrview_types::gpu::mip_levels(300, 200), 9);
/// ```
pub fn mip_levels(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// Size of a mip level given the size of the base level.
pub fn mip_extent(base: UVec2, mip: u32) -> UVec2 {
    UVec2::new((base.x >> mip).max(1), (base.y >> mip).max(1))
}

/// Texel formats used by the runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
    Rg16Float,
    Rgba16Float,
    Rgba32Float,
}

impl ImageFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            ImageFormat::Rgba8Unorm => 4,
            ImageFormat::Rg16Float => 4,
            ImageFormat::Rgba16Float => 8,
            ImageFormat::Rgba32Float => 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc<'a> {
    pub label: &'a str,
    pub format: ImageFormat,
    pub size: UVec2,
    pub mip_levels: u32,
    pub layers: u32,
    pub usage: ImageUsage,
    /// Layers form a cube; requires `layers == 6`.
    pub cube: bool,
}

/// Layout an image subresource is in. Transitions between layouts are explicit.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    #[default]
    Undefined,
    TransferSrc,
    TransferDst,
    ColorAttachment,
    ShaderReadOnly,
}

/// Mip levels and array layers of an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub fn single(mip: u32, layer: u32) -> Self {
        Self {
            base_mip: mip,
            mip_count: 1,
            base_layer: layer,
            layer_count: 1,
        }
    }

    pub fn all(mip_count: u32, layer_count: u32) -> Self {
        Self {
            base_mip: 0,
            mip_count,
            base_layer: 0,
            layer_count,
        }
    }

    pub fn mips(&self) -> std::ops::Range<u32> {
        self.base_mip..self.base_mip + self.mip_count
    }

    pub fn layers(&self) -> std::ops::Range<u32> {
        self.base_layer..self.base_layer + self.layer_count
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerDesc<'a> {
    pub label: &'a str,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub max_anisotropy: Option<u16>,
    pub max_lod: f32,
}

impl<'a> SamplerDesc<'a> {
    /// Linear filtering on all axes with clamp-to-edge addressing.
    pub fn clamped(label: &'a str, max_lod: f32) -> Self {
        Self {
            label,
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            max_anisotropy: None,
            max_lod,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    #[default]
    D2,
    Cube,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageViewDesc<'a> {
    pub label: &'a str,
    pub dimension: ViewDimension,
    pub range: SubresourceRange,
}

/// Scaled blit between two subresources.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageBlit {
    pub src_mip: u32,
    pub src_layer: u32,
    pub src_extent: UVec2,
    pub dst_mip: u32,
    pub dst_layer: u32,
    pub dst_extent: UVec2,
    pub filter: Filter,
}

/// Unscaled copy of a region anchored at the origin of both subresources.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageCopy {
    pub src_mip: u32,
    pub src_layer: u32,
    pub dst_mip: u32,
    pub dst_layer: u32,
    pub extent: UVec2,
}

/// Tightly packed texels copied from a buffer into a single subresource.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub mip: u32,
    pub layer: u32,
    pub extent: UVec2,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn square(size: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size,
            height: size,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec2;

    use super::{find_memory_type, mip_extent, mip_levels, MemoryFlags};

    #[test]
    fn mip_counts() {
        assert_eq!(mip_levels(256, 256), 9);
        assert_eq!(mip_levels(300, 200), 9);
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(512, 1), 10);
        assert_eq!(mip_levels(0, 0), 1);
    }

    #[test]
    fn mip_extents_never_reach_zero() {
        assert_eq!(mip_extent(UVec2::new(300, 200), 1), UVec2::new(150, 100));
        assert_eq!(mip_extent(UVec2::new(300, 200), 8), UVec2::new(1, 1));
    }

    #[test]
    fn memory_type_respects_type_bits() {
        let types = [
            MemoryFlags::DEVICE_LOCAL,
            MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
            MemoryFlags::DEVICE_LOCAL | MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        ];
        assert_eq!(find_memory_type(&types, !0, MemoryFlags::DEVICE_LOCAL), Some(0));
        assert_eq!(find_memory_type(&types, !0, MemoryFlags::HOST_VISIBLE), Some(1));
        assert_eq!(
            find_memory_type(&types, 0b100, MemoryFlags::HOST_VISIBLE | MemoryFlags::DEVICE_LOCAL),
            Some(2)
        );
        assert_eq!(find_memory_type(&types, 0b001, MemoryFlags::HOST_VISIBLE), None);
    }
}
