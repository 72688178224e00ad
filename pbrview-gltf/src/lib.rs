//! glTF 2.0 loader producing [`pbrview::Model`]s.
//!
//! [`load_gltf`] reads a `.gltf` or `.glb` file from disk, resolving external
//! buffers and images relative to it. [`load_gltf_data`] does the same for a
//! document that is already in memory.
//!
//! Loading runs in this order:
//! - samplers, textures and materials
//! - the node hierarchy of the selected scene, collecting all geometry
//! - animations, then skins
//! - initial pose, bounding volumes, and finally the geometry upload
//!
//! Any failure releases the GPU resources created so far.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use glam::{Mat4, Quat, Vec3, Vec4};
use gltf::{buffer, mesh::util::ReadIndices, Semantic};
use pbrview::{
    types::{BoundingBox, Vertex},
    GeometryBuffer, GpuBackend, GpuError, Mesh, Model, Node, NodeId, Primitive,
};
use thiserror::Error;

mod animation;
mod material;
mod skin;
mod texture;

pub use texture::{convert_to_rgba8, sampler_from_gltf};

/// Extensions the loader understands well enough to honor when required.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "KHR_materials_unlit",
    "KHR_materials_pbrSpecularGlossiness",
    "KHR_materials_emissive_strength",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    /// Uniform scale applied to the scene's root nodes.
    pub scale: f32,
    /// Scene to load instead of the document's default scene.
    pub scene: Option<usize>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { scale: 1.0, scene: None }
    }
}

#[derive(Debug, Error)]
pub enum GltfLoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gltf parsing or import failed")]
    Gltf(#[from] gltf::Error),
    #[error("scene {0:?} not found in document")]
    MissingScene(Option<usize>),
    #[error("primitive {primitive} of mesh {mesh:?} has no POSITION attribute")]
    MissingPositions { mesh: String, primitive: usize },
    #[error("document requires unsupported extension {0}")]
    UnsupportedExtension(String),
    #[error("image {image} cannot be converted: {reason}")]
    InvalidImage { image: usize, reason: String },
    #[error("skin {skin} uses node {node} as a joint but it is not in the loaded scene")]
    MissingJoint { skin: usize, node: usize },
    #[error("animation {animation:?} is invalid: {reason}")]
    InvalidAnimation { animation: String, reason: String },
    #[error("scene contains no vertices")]
    EmptyGeometry,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Geometry gathered from every primitive before the single upload.
#[derive(Default)]
struct GeometryData {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

/// Loads the glTF or GLB file at `path`.
pub fn load_gltf<B: GpuBackend>(
    backend: &B,
    path: impl AsRef<Path>,
    options: &LoaderOptions,
) -> Result<Model<B>, GltfLoadError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| GltfLoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    load_gltf_data(backend, &data, path.parent(), options)
}

/// Loads a glTF or GLB document from memory. External URIs resolve against `base_dir`.
pub fn load_gltf_data<B: GpuBackend>(
    backend: &B,
    data: &[u8],
    base_dir: Option<&Path>,
    options: &LoaderOptions,
) -> Result<Model<B>, GltfLoadError> {
    profiling::scope!("load_gltf_data");
    let start = Instant::now();

    // Required extensions are checked before validation so they surface as their own error.
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice_without_validation(data)?;
    if let Some(ext) = document
        .extensions_required()
        .find(|ext| !SUPPORTED_EXTENSIONS.contains(ext))
    {
        return Err(GltfLoadError::UnsupportedExtension(ext.to_owned()));
    }
    let document = gltf::Document::from_json(document.into_json())?;

    let buffers = {
        profiling::scope!("import buffers");
        gltf::import_buffers(&document, base_dir, blob)?
    };
    let images = {
        profiling::scope!("import images");
        gltf::import_images(&document, base_dir, &buffers)?
    };

    let mut model = Model::new();
    match load_into(backend, &mut model, &document, &buffers, &images, options) {
        Ok(()) => {
            log::info!(
                "loaded gltf with {} nodes, {} primitives, {} textures and {} animations in {:.2?}",
                model.node_count(),
                model.primitive_count(),
                model.textures.len(),
                model.animations.len(),
                start.elapsed()
            );
            Ok(model)
        }
        Err(e) => {
            model.destroy(backend);
            Err(e)
        }
    }
}

fn load_into<B: GpuBackend>(
    backend: &B,
    model: &mut Model<B>,
    document: &gltf::Document,
    buffers: &[buffer::Data],
    images: &[gltf::image::Data],
    options: &LoaderOptions,
) -> Result<(), GltfLoadError> {
    let scene = match options.scene {
        Some(requested) => document.scenes().nth(requested),
        None => document.default_scene().or_else(|| document.scenes().next()),
    }
    .ok_or(GltfLoadError::MissingScene(options.scene))?;

    model.texture_samplers = document.samplers().map(|s| sampler_from_gltf(&s)).collect();
    texture::load_textures(backend, model, document, images)?;
    model.materials = material::load_materials(document);

    let (vertex_count, index_count) = scene
        .nodes()
        .map(|node| node_props(&node))
        .fold((0, 0), |(v, i), (nv, ni)| (v + nv, i + ni));
    let mut geometry = GeometryData {
        vertices: Vec::with_capacity(vertex_count),
        indices: Vec::with_capacity(index_count),
    };

    {
        profiling::scope!("load nodes");
        for node in scene.nodes() {
            load_node(backend, model, &mut geometry, None, &node, buffers, options.scale)?;
        }
    }

    model.animations = animation::load_animations(model, document, buffers)?;
    model.skins = skin::load_skins(model, document, buffers)?;

    // Skins exist now, so nodes can be bound to them.
    for idx in 0..model.node_count() {
        let node = model.node_mut(NodeId(idx));
        node.skin = node.skin_index;
    }
    model.update(backend)?;

    model.extensions = document.extensions_used().map(str::to_owned).collect();
    model.compute_scene_dimensions();

    if geometry.vertices.is_empty() {
        return Err(GltfLoadError::EmptyGeometry);
    }
    model.geometry = Some(GeometryBuffer::upload(backend, &geometry.vertices, &geometry.indices)?);
    Ok(())
}

/// Number of vertices and indices in `node` and its descendants.
fn node_props(node: &gltf::Node) -> (usize, usize) {
    let own = node.mesh().map_or((0, 0), |mesh| {
        mesh.primitives().fold((0, 0), |(v, i), primitive| {
            let vertices = primitive.get(&Semantic::Positions).map_or(0, |a| a.count());
            let indices = primitive.indices().map_or(0, |a| a.count());
            (v + vertices, i + indices)
        })
    });
    node.children()
        .map(|child| node_props(&child))
        .fold(own, |(v, i), (cv, ci)| (v + cv, i + ci))
}

fn load_node<B: GpuBackend>(
    backend: &B,
    model: &mut Model<B>,
    geometry: &mut GeometryData,
    parent: Option<NodeId>,
    node: &gltf::Node,
    buffers: &[buffer::Data],
    scale: f32,
) -> Result<NodeId, GltfLoadError> {
    let mut new_node = Node::new(node.index() as u32, node.name().unwrap_or_default());
    new_node.skin_index = node.skin().map(|skin| skin.index());

    match node.transform() {
        gltf::scene::Transform::Matrix { matrix } => new_node.matrix = Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => {
            new_node.translation = Vec3::from(translation);
            new_node.rotation = Quat::from_array(rotation);
            new_node.scale = Vec3::from(scale);
        }
    }
    if parent.is_none() {
        new_node.translation *= scale;
        new_node.scale *= scale;
    }

    let id = model.add_node(parent, new_node);

    for child in node.children() {
        load_node(backend, model, geometry, Some(id), &child, buffers, scale)?;
    }

    if let Some(mesh) = node.mesh() {
        let local = model.node(id).local_matrix();
        let mesh = load_mesh(backend, model, geometry, &mesh, buffers, local)?;
        model.node_mut(id).mesh = Some(mesh);
    }

    model.linear_nodes.push(id);
    Ok(id)
}

fn load_mesh<B: GpuBackend>(
    backend: &B,
    model: &Model<B>,
    geometry: &mut GeometryData,
    mesh: &gltf::Mesh,
    buffers: &[buffer::Data],
    matrix: Mat4,
) -> Result<Mesh<B>, GltfLoadError> {
    // The default material is always last
    let default_material = model.materials.len() - 1;

    let mut primitives = Vec::with_capacity(mesh.primitives().len());
    for (idx, primitive) in mesh.primitives().enumerate() {
        let mut loaded = load_primitive(geometry, &primitive, buffers).ok_or_else(|| {
            GltfLoadError::MissingPositions {
                mesh: mesh.name().map_or_else(|| mesh.index().to_string(), str::to_owned),
                primitive: idx,
            }
        })?;
        loaded.material = primitive.material().index().unwrap_or(default_material);
        primitives.push(loaded);
    }

    let mut new_mesh = Mesh::new(backend, matrix)?;
    new_mesh.bb = primitives
        .iter()
        .fold(BoundingBox::default(), |acc, primitive| acc.union(&primitive.bb));
    new_mesh.primitives = primitives;
    Ok(new_mesh)
}

/// Appends the primitive's vertices and indices. Returns `None` without positions.
fn load_primitive(
    geometry: &mut GeometryData,
    primitive: &gltf::Primitive,
    buffers: &[buffer::Data],
) -> Option<Primitive> {
    let reader = primitive.reader(|buffer| Some(buffers[buffer.index()].0.as_slice()));

    let positions = reader.read_positions()?;
    let mut normals = reader.read_normals();
    let mut uv0 = reader.read_tex_coords(0).map(|uv| uv.into_f32());
    let mut uv1 = reader.read_tex_coords(1).map(|uv| uv.into_f32());
    let mut colors = reader.read_colors(0).map(|c| c.into_rgba_f32());
    let mut skinning = reader
        .read_joints(0)
        .map(|j| j.into_u16())
        .zip(reader.read_weights(0).map(|w| w.into_f32()));

    let vertex_start = geometry.vertices.len() as u32;
    let index_start = geometry.indices.len() as u32;

    for position in positions {
        let mut vertex = Vertex::from_position(Vec3::from(position));
        let normal = normals.as_mut().and_then(Iterator::next).map_or(Vec3::ZERO, Vec3::from);
        vertex.normal = normal.normalize_or_zero().to_array();
        vertex.uv0 = uv0.as_mut().and_then(Iterator::next).unwrap_or_default();
        vertex.uv1 = uv1.as_mut().and_then(Iterator::next).unwrap_or_default();
        if let Some(color) = colors.as_mut().and_then(Iterator::next) {
            vertex.color = color;
        }
        if let Some((joints, weights)) = skinning.as_mut() {
            let joint = joints.next().unwrap_or_default();
            let weight = Vec4::from(weights.next().unwrap_or_default());
            vertex.joint0 = joint.map(f32::from);
            vertex.weight0 = match weight.length() == 0.0 {
                true => Vec4::X.to_array(),
                false => weight.to_array(),
            };
        }
        geometry.vertices.push(vertex);
    }
    let vertex_count = geometry.vertices.len() as u32 - vertex_start;

    match reader.read_indices() {
        Some(ReadIndices::U8(iter)) => geometry.indices.extend(iter.map(|i| u32::from(i) + vertex_start)),
        Some(ReadIndices::U16(iter)) => geometry.indices.extend(iter.map(|i| u32::from(i) + vertex_start)),
        Some(ReadIndices::U32(iter)) => geometry.indices.extend(iter.map(|i| i + vertex_start)),
        None => {}
    }
    let index_count = geometry.indices.len() as u32 - index_start;

    let mut loaded = Primitive::new(index_start, index_count, vertex_start, vertex_count, 0);
    loaded.bb = match primitive.get(&Semantic::Positions).and_then(|a| accessor_bounds(&a)) {
        Some((min, max)) => BoundingBox::new(min, max),
        None => BoundingBox::from_points(
            geometry.vertices[vertex_start as usize..]
                .iter()
                .map(Vertex::position),
        ),
    };
    Some(loaded)
}

/// Reads the `min` and `max` arrays of a three component accessor.
fn accessor_bounds(accessor: &gltf::Accessor) -> Option<(Vec3, Vec3)> {
    fn read(value: Option<gltf::json::Value>) -> Option<Vec3> {
        let value = value?;
        let array = value.as_array()?;
        if array.len() < 3 {
            return None;
        }
        let mut v = Vec3::ZERO;
        for (axis, component) in array.iter().take(3).enumerate() {
            v[axis] = component.as_f64()? as f32;
        }
        Some(v)
    }
    Some((read(accessor.min())?, read(accessor.max())?))
}
