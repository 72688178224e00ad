use glam::{Vec3, Vec4};

use crate::gpu::{AddressMode, Filter};

/// How the alpha channel of the base color is interpreted.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Fragments below [`Material::alpha_cutoff`] are discarded.
    Mask,
    Blend,
}

/// Texture coordinate set used by each texture slot of a material.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TexCoordSets {
    pub base_color: u8,
    pub metallic_roughness: u8,
    pub specular_glossiness: u8,
    pub normal: u8,
    pub occlusion: u8,
    pub emissive: u8,
}

/// Parameters of the `KHR_materials_pbrSpecularGlossiness` extension.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MaterialExtension {
    pub specular_glossiness_texture: Option<usize>,
    pub diffuse_texture: Option<usize>,
    pub diffuse_factor: Vec4,
    pub specular_factor: Vec3,
}

impl Default for MaterialExtension {
    fn default() -> Self {
        Self {
            specular_glossiness_texture: None,
            diffuse_texture: None,
            diffuse_factor: Vec4::ONE,
            specular_factor: Vec3::ZERO,
        }
    }
}

/// Which shading workflows a material provides data for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PbrWorkflows {
    pub metallic_roughness: bool,
    pub specular_glossiness: bool,
}

impl Default for PbrWorkflows {
    fn default() -> Self {
        Self {
            metallic_roughness: true,
            specular_glossiness: false,
        }
    }
}

/// Shading parameters of a primitive.
///
/// Texture references are indices into the owning model's texture list.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub base_color_factor: Vec4,
    pub emissive_factor: Vec4,
    pub base_color_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
    pub emissive_texture: Option<usize>,
    pub double_sided: bool,
    pub tex_coord_sets: TexCoordSets,
    pub extension: MaterialExtension,
    pub pbr_workflows: PbrWorkflows,
    pub unlit: bool,
    pub emissive_strength: f32,
    pub index: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 1.0,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            base_color_factor: Vec4::ONE,
            emissive_factor: Vec4::ZERO,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            double_sided: false,
            tex_coord_sets: TexCoordSets::default(),
            extension: MaterialExtension::default(),
            pbr_workflows: PbrWorkflows::default(),
            unlit: false,
            emissive_strength: 1.0,
            index: 0,
        }
    }
}

impl Material {
    /// Every texture index this material references, in slot order.
    pub fn textures(&self) -> impl Iterator<Item = usize> + '_ {
        [
            self.base_color_texture,
            self.metallic_roughness_texture,
            self.normal_texture,
            self.occlusion_texture,
            self.emissive_texture,
            self.extension.specular_glossiness_texture,
            self.extension.diffuse_texture,
        ]
        .into_iter()
        .flatten()
    }
}

/// Filtering and addressing of a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureSampler {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
}

impl Default for TextureSampler {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
        }
    }
}
