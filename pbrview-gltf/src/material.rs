use glam::{Vec3, Vec4};
use pbrview::types::{AlphaMode, Material, MaterialExtension, PbrWorkflows, TexCoordSets};

fn texture_slot(info: Option<(usize, u32)>, set: &mut u8) -> Option<usize> {
    let (index, tex_coord) = info?;
    *set = tex_coord as u8;
    Some(index)
}

fn convert_material(material: &gltf::Material, index: u32) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let mut sets = TexCoordSets::default();

    let base_color_texture = texture_slot(
        pbr.base_color_texture().map(|i| (i.texture().index(), i.tex_coord())),
        &mut sets.base_color,
    );
    let metallic_roughness_texture = texture_slot(
        pbr.metallic_roughness_texture()
            .map(|i| (i.texture().index(), i.tex_coord())),
        &mut sets.metallic_roughness,
    );
    let normal_texture = texture_slot(
        material.normal_texture().map(|i| (i.texture().index(), i.tex_coord())),
        &mut sets.normal,
    );
    let occlusion_texture = texture_slot(
        material
            .occlusion_texture()
            .map(|i| (i.texture().index(), i.tex_coord())),
        &mut sets.occlusion,
    );
    let emissive_texture = texture_slot(
        material.emissive_texture().map(|i| (i.texture().index(), i.tex_coord())),
        &mut sets.emissive,
    );

    let alpha_mode = match material.alpha_mode() {
        gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        gltf::material::AlphaMode::Mask => AlphaMode::Mask,
        gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    };
    // An explicit cutoff wins over the mask default of one half.
    let alpha_cutoff = match (material.alpha_cutoff(), alpha_mode) {
        (Some(cutoff), _) => cutoff,
        (None, AlphaMode::Mask) => 0.5,
        (None, _) => 1.0,
    };

    let mut pbr_workflows = PbrWorkflows::default();
    let extension = match material.pbr_specular_glossiness() {
        Some(sg) => MaterialExtension {
            specular_glossiness_texture: sg.specular_glossiness_texture().map(|info| {
                sets.specular_glossiness = info.tex_coord() as u8;
                pbr_workflows.specular_glossiness = true;
                info.texture().index()
            }),
            diffuse_texture: sg.diffuse_texture().map(|info| info.texture().index()),
            diffuse_factor: Vec4::from(sg.diffuse_factor()),
            specular_factor: Vec3::from(sg.specular_factor()),
        },
        None => MaterialExtension::default(),
    };

    Material {
        alpha_mode,
        alpha_cutoff,
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        base_color_factor: Vec4::from(pbr.base_color_factor()),
        emissive_factor: Vec3::from(material.emissive_factor()).extend(1.0),
        base_color_texture,
        metallic_roughness_texture,
        normal_texture,
        occlusion_texture,
        emissive_texture,
        double_sided: material.double_sided(),
        tex_coord_sets: sets,
        extension,
        pbr_workflows,
        unlit: material.unlit(),
        emissive_strength: material.emissive_strength().unwrap_or(1.0),
        index,
    }
}

/// Converts every document material and appends the default material last.
///
/// Primitives without a material use that trailing entry.
pub(crate) fn load_materials(document: &gltf::Document) -> Vec<Material> {
    profiling::scope!("load materials");
    let mut materials: Vec<Material> = document
        .materials()
        .enumerate()
        .map(|(idx, material)| convert_material(&material, idx as u32))
        .collect();
    materials.push(Material {
        index: materials.len() as u32,
        ..Material::default()
    });
    materials
}
