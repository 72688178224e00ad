//! The hierarchical transform graph of a loaded model.
//!
//! Nodes live in an arena owned by [`Model`] and refer to each other through
//! [`NodeId`]s. Parents own their children by id, and a child keeps an
//! optional id back to its parent. World matrices are never cached; they are
//! recomputed from the parent chain whenever they are needed.

use glam::{Mat4, Quat, Vec3};
use pbrview_types::{BoundingBox, Material, TextureSampler, Vertex};

use crate::{
    animation::Animation,
    backend::{GpuBackend, GpuError},
    buffer::{GeometryBuffer, UniformBuffer},
    texture::Texture,
};

/// Most joints a single skin can drive.
pub const MAX_NUM_JOINTS: usize = 128;

/// Index of a node in the arena of its [`Model`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Per-mesh data read by the vertex shader.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshUniformBlock {
    pub matrix: Mat4,
    pub joint_matrix: [Mat4; MAX_NUM_JOINTS],
    pub joint_count: f32,
    pub _padding: [f32; 3],
}

impl MeshUniformBlock {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
    const MATRIX_SIZE: usize = std::mem::size_of::<Mat4>();
}

/// A contiguous range of the model's index buffer drawn with one material.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub has_indices: bool,
    /// Index into [`Model::materials`].
    pub material: usize,
    pub bb: BoundingBox,
}

impl Primitive {
    pub fn new(first_index: u32, index_count: u32, first_vertex: u32, vertex_count: u32, material: usize) -> Self {
        Self {
            first_index,
            index_count,
            first_vertex,
            vertex_count,
            has_indices: index_count > 0,
            material,
            bb: BoundingBox::default(),
        }
    }

    pub fn set_bounding_box(&mut self, min: Vec3, max: Vec3) {
        self.bb = BoundingBox::new(min, max);
    }
}

pub struct Mesh<B: GpuBackend> {
    pub primitives: Vec<Primitive>,
    pub bb: BoundingBox,
    pub uniform_buffer: UniformBuffer<B>,
    pub uniform_block: Box<MeshUniformBlock>,
}

impl<B: GpuBackend> Mesh<B> {
    /// Creates a mesh whose uniform buffer initially holds `matrix`.
    pub fn new(backend: &B, matrix: Mat4) -> Result<Self, GpuError> {
        let uniform_buffer = UniformBuffer::new(backend, "mesh uniform buffer", MeshUniformBlock::SIZE)?;
        let mut uniform_block: Box<MeshUniformBlock> = Box::new(bytemuck::Zeroable::zeroed());
        uniform_block.matrix = matrix;
        uniform_buffer.write(backend, 0, bytemuck::bytes_of(&*uniform_block))?;
        Ok(Self {
            primitives: Vec::new(),
            bb: BoundingBox::default(),
            uniform_buffer,
            uniform_block,
        })
    }

    pub fn set_bounding_box(&mut self, min: Vec3, max: Vec3) {
        self.bb = BoundingBox::new(min, max);
    }

    /// Stores the world matrix and, for skinned meshes, the joint matrices.
    ///
    /// Unskinned meshes only write the world matrix to the GPU; skinned meshes
    /// write the whole block.
    pub fn write_pose(&mut self, backend: &B, matrix: Mat4, joints: Option<&[Mat4]>) -> Result<(), GpuError> {
        self.uniform_block.matrix = matrix;
        match joints {
            Some(joints) => {
                let count = joints.len().min(MAX_NUM_JOINTS);
                self.uniform_block.joint_matrix[..count].copy_from_slice(&joints[..count]);
                self.uniform_block.joint_count = count as f32;
                self.uniform_buffer
                    .write(backend, 0, bytemuck::bytes_of(&*self.uniform_block))
            }
            None => {
                let bytes = bytemuck::bytes_of(&*self.uniform_block);
                self.uniform_buffer
                    .write(backend, 0, &bytes[..MeshUniformBlock::MATRIX_SIZE])
            }
        }
    }

    pub fn destroy(self, backend: &B) {
        self.uniform_buffer.destroy(backend);
    }
}

/// Joints and inverse bind matrices of a skeleton.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skin {
    pub name: String,
    pub skeleton_root: Option<NodeId>,
    /// One per joint, matched by position.
    pub inverse_bind_matrices: Vec<Mat4>,
    pub joints: Vec<NodeId>,
}

pub struct Node<B: GpuBackend> {
    pub parent: Option<NodeId>,
    /// Index of the node in the source document.
    pub index: u32,
    pub children: Vec<NodeId>,
    /// Explicit local matrix, composed to the right of translation, rotation and scale.
    pub matrix: Mat4,
    pub name: String,
    pub mesh: Option<Mesh<B>>,
    /// Index into [`Model::skins`], bound once all skins are resolved.
    pub skin: Option<usize>,
    /// Skin index as written in the source document.
    pub skin_index: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// World space box enclosing this node and all of its descendants.
    pub bvh: BoundingBox,
    /// World space box of this node's own mesh.
    pub aabb: BoundingBox,
}

impl<B: GpuBackend> Node<B> {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            parent: None,
            index,
            children: Vec::new(),
            matrix: Mat4::IDENTITY,
            name: name.into(),
            mesh: None,
            skin: None,
            skin_index: None,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            bvh: BoundingBox::default(),
            aabb: BoundingBox::default(),
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scale)
            * self.matrix
    }
}

/// A loaded scene: node graph, GPU geometry, textures, materials and animations.
pub struct Model<B: GpuBackend> {
    pub geometry: Option<GeometryBuffer<B>>,
    /// Maps the unit cube onto [`Model::dimensions`].
    pub aabb: Mat4,
    pub(crate) nodes: Vec<Node<B>>,
    pub roots: Vec<NodeId>,
    /// Every node in the order its loading finished, children before parents.
    pub linear_nodes: Vec<NodeId>,
    pub skins: Vec<Skin>,
    pub textures: Vec<Texture<B>>,
    pub texture_samplers: Vec<TextureSampler>,
    pub materials: Vec<Material>,
    pub animations: Vec<Animation>,
    pub extensions: Vec<String>,
    pub dimensions: BoundingBox,
}

impl<B: GpuBackend> Default for Model<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> Model<B> {
    pub fn new() -> Self {
        Self {
            geometry: None,
            aabb: Mat4::IDENTITY,
            nodes: Vec::new(),
            roots: Vec::new(),
            linear_nodes: Vec::new(),
            skins: Vec::new(),
            textures: Vec::new(),
            texture_samplers: Vec::new(),
            materials: Vec::new(),
            animations: Vec::new(),
            extensions: Vec::new(),
            dimensions: BoundingBox::default(),
        }
    }

    /// Builds a single-node model from in-memory geometry drawn with one default material.
    pub fn from_geometry(backend: &B, name: &str, vertices: &[Vertex], indices: &[u32]) -> Result<Self, GpuError> {
        let mut model = Self::new();
        model.materials.push(Material::default());

        let mut mesh = Mesh::new(backend, Mat4::IDENTITY)?;
        let mut primitive = Primitive::new(0, indices.len() as u32, 0, vertices.len() as u32, 0);
        let bb = BoundingBox::from_points(vertices.iter().map(Vertex::position));
        primitive.bb = bb;
        mesh.bb = bb;
        mesh.primitives.push(primitive);

        let mut node = Node::new(0, name);
        node.mesh = Some(mesh);
        let id = model.add_node(None, node);
        model.linear_nodes.push(id);

        model.geometry = Some(GeometryBuffer::upload(backend, vertices, indices)?);
        model.compute_scene_dimensions();
        Ok(model)
    }

    /// Adds a node to the arena and links it under `parent`, or as a root.
    pub fn add_node(&mut self, parent: Option<NodeId>, mut node: Node<B>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        self.nodes.push(node);
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node<B> {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<B> {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node<B>)> {
        self.nodes.iter().enumerate().map(|(idx, node)| (NodeId(idx), node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Product of the local matrices from the root down to `id`.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut node = &self.nodes[id.0];
        let mut m = node.local_matrix();
        while let Some(parent) = node.parent {
            node = &self.nodes[parent.0];
            m = node.local_matrix() * m;
        }
        m
    }

    fn joint_matrices(&self, skin: &Skin, world: Mat4) -> Vec<Mat4> {
        let inverse = world.inverse();
        skin.joints
            .iter()
            .take(MAX_NUM_JOINTS)
            .enumerate()
            .map(|(i, &joint)| {
                let inverse_bind = skin.inverse_bind_matrices.get(i).copied().unwrap_or(Mat4::IDENTITY);
                inverse * self.world_matrix(joint) * inverse_bind
            })
            .collect()
    }

    /// Recomputes the uniform data of `id` and everything below it.
    pub fn update_node(&mut self, backend: &B, id: NodeId) -> Result<(), GpuError> {
        if self.nodes[id.0].mesh.is_some() {
            let world = self.world_matrix(id);
            let joints = self.nodes[id.0]
                .skin
                .and_then(|skin| self.skins.get(skin))
                .map(|skin| self.joint_matrices(skin, world));
            if let Some(mesh) = self.nodes[id.0].mesh.as_mut() {
                mesh.write_pose(backend, world, joints.as_deref())?;
            }
        }

        for child in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[child];
            self.update_node(backend, child)?;
        }
        Ok(())
    }

    /// Propagates the current pose of every root to the mesh uniform buffers.
    pub fn update(&mut self, backend: &B) -> Result<(), GpuError> {
        profiling::scope!("Model::update");
        for root in 0..self.roots.len() {
            self.update_node(backend, self.roots[root])?;
        }
        Ok(())
    }

    /// Depth first search from every root for the node with the given source index.
    pub fn find_node(&self, index: u32) -> Option<NodeId> {
        fn search<B: GpuBackend>(model: &Model<B>, id: NodeId, index: u32) -> Option<NodeId> {
            let node = &model.nodes[id.0];
            if node.index == index {
                return Some(id);
            }
            node.children.iter().find_map(|&child| search(model, child, index))
        }
        self.roots.iter().find_map(|&root| search(self, root, index))
    }

    pub fn node_from_index(&self, index: u32) -> Option<NodeId> {
        self.find_node(index)
    }

    /// Visits every primitive in depth first node order.
    pub fn for_each_primitive(&self, mut f: impl FnMut(NodeId, &Primitive)) {
        fn visit<B: GpuBackend>(model: &Model<B>, id: NodeId, f: &mut impl FnMut(NodeId, &Primitive)) {
            let node = &model.nodes[id.0];
            if let Some(mesh) = &node.mesh {
                for primitive in &mesh.primitives {
                    f(id, primitive);
                }
            }
            for &child in &node.children {
                visit(model, child, f);
            }
        }
        for &root in &self.roots {
            visit(self, root, &mut f);
        }
    }

    pub fn primitive_count(&self) -> usize {
        let mut count = 0;
        self.for_each_primitive(|_, _| count += 1);
        count
    }

    /// Binds the model's geometry and records one draw per primitive.
    pub fn draw(&self, backend: &B, cmd: &mut B::Commands) {
        let Some(geometry) = &self.geometry else {
            return;
        };
        backend.bind_vertex_buffer(cmd, &geometry.vertices.buffer, 0);
        if let Some(indices) = &geometry.indices {
            backend.bind_index_buffer(cmd, &indices.buffer, 0);
        }
        for &root in &self.roots {
            self.draw_node(backend, cmd, root);
        }
    }

    /// Records draws for `id` and its descendants. Geometry must already be bound.
    pub fn draw_node(&self, backend: &B, cmd: &mut B::Commands, id: NodeId) {
        let node = &self.nodes[id.0];
        if let Some(mesh) = &node.mesh {
            for primitive in &mesh.primitives {
                match primitive.has_indices {
                    true => backend.draw_indexed(cmd, primitive.index_count, 1, primitive.first_index, 0, 0),
                    false => backend.draw(cmd, primitive.vertex_count, 1, primitive.first_vertex, 0),
                }
            }
        }
        for &child in &node.children {
            self.draw_node(backend, cmd, child);
        }
    }

    /// Computes world space boxes for `id` and its descendants.
    ///
    /// Children are processed first so a node's `bvh` can enclose theirs.
    pub fn calculate_bounding_box(&mut self, id: NodeId) {
        for child in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[child];
            self.calculate_bounding_box(child);
        }

        let world = self.world_matrix(id);
        let children_bvh = self.nodes[id.0]
            .children
            .iter()
            .fold(BoundingBox::default(), |acc, child| acc.union(&self.nodes[child.0].bvh));

        let node = &mut self.nodes[id.0];
        if let Some(mesh) = node.mesh.as_ref().filter(|mesh| mesh.bb.valid) {
            node.aabb = mesh.bb.get_aabb(world);
        }
        node.bvh = node.aabb.union(&children_bvh);
    }

    /// Recomputes every node's bounding volumes and the scene dimensions.
    pub fn compute_scene_dimensions(&mut self) {
        profiling::scope!("Model::compute_scene_dimensions");
        for root in 0..self.roots.len() {
            self.calculate_bounding_box(self.roots[root]);
        }

        self.dimensions = self
            .linear_nodes
            .iter()
            .fold(BoundingBox::default(), |acc, id| acc.union(&self.nodes[id.0].bvh));

        let extent = self.dimensions.extent();
        self.aabb = Mat4::from_translation(self.dimensions.min) * Mat4::from_scale(extent);
    }

    /// Releases every GPU resource and leaves the model empty.
    pub fn destroy(&mut self, backend: &B) {
        profiling::scope!("Model::destroy");
        if let Some(geometry) = self.geometry.take() {
            geometry.destroy(backend);
        }
        for node in self.nodes.drain(..) {
            if let Some(mesh) = node.mesh {
                mesh.destroy(backend);
            }
        }
        for texture in self.textures.drain(..) {
            texture.destroy(backend);
        }
        *self = Self::new();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use glam::{Mat4, Quat, Vec3};
    use pbrview_types::{BoundingBox, Vertex};

    use super::{Mesh, MeshUniformBlock, Model, Node, NodeId, Primitive, Skin, MAX_NUM_JOINTS};
    use crate::{
        backend::GpuBackend,
        headless::{HeadlessBackend, HeadlessCommand},
    };

    pub(crate) fn mesh_node(backend: &HeadlessBackend, index: u32, min: Vec3, max: Vec3) -> Node<HeadlessBackend> {
        let mut mesh = Mesh::new(backend, Mat4::IDENTITY).unwrap();
        let mut primitive = Primitive::new(0, 3, 0, 3, 0);
        primitive.set_bounding_box(min, max);
        mesh.primitives.push(primitive);
        mesh.set_bounding_box(min, max);
        let mut node = Node::new(index, format!("node {index}"));
        node.mesh = Some(mesh);
        node
    }

    fn uniform_block(backend: &HeadlessBackend, model: &Model<HeadlessBackend>, id: NodeId) -> Vec<u8> {
        let mesh = model.node(id).mesh.as_ref().unwrap();
        backend.buffer_contents(mesh.uniform_buffer.buffer()).unwrap()
    }

    #[test]
    fn local_matrix_composes_explicit_matrix_last() {
        let mut node = Node::<HeadlessBackend>::new(0, "n");
        node.translation = Vec3::new(1.0, 0.0, 0.0);
        node.scale = Vec3::splat(2.0);
        node.matrix = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));

        let p = node.local_matrix().transform_point3(Vec3::ZERO);
        // The explicit translation is scaled before the node translation is applied.
        assert_eq!(p, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn world_matrix_walks_parents() {
        let mut model = Model::<HeadlessBackend>::new();
        let mut root = Node::new(0, "root");
        root.translation = Vec3::new(1.0, 0.0, 0.0);
        let root = model.add_node(None, root);
        let mut child = Node::new(1, "child");
        child.rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let child = model.add_node(Some(root), child);
        let mut grandchild = Node::new(2, "grandchild");
        grandchild.translation = Vec3::new(1.0, 0.0, 0.0);
        let grandchild = model.add_node(Some(child), grandchild);

        let p = model.world_matrix(grandchild).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6), "{p}");
        assert_eq!(model.node(grandchild).parent, Some(child));
        assert_eq!(model.roots, vec![root]);
    }

    #[test]
    fn find_node_searches_all_roots() {
        let mut model = Model::<HeadlessBackend>::new();
        let a = model.add_node(None, Node::new(7, "a"));
        let b = model.add_node(None, Node::new(3, "b"));
        let c = model.add_node(Some(b), Node::new(9, "c"));
        assert_eq!(model.find_node(7), Some(a));
        assert_eq!(model.node_from_index(9), Some(c));
        assert_eq!(model.find_node(4), None);
    }

    #[test]
    fn sibling_leaves_define_scene_dimensions() {
        let backend = HeadlessBackend::new();
        let mut model = Model::new();
        let parent = model.add_node(None, Node::new(0, "parent"));
        let a = model.add_node(Some(parent), mesh_node(&backend, 1, Vec3::ZERO, Vec3::ONE));
        let b = model.add_node(Some(parent), mesh_node(&backend, 2, Vec3::splat(2.0), Vec3::splat(3.0)));
        model.linear_nodes = vec![a, b, parent];

        model.compute_scene_dimensions();

        assert!(model.dimensions.valid);
        assert_eq!(model.dimensions.min, Vec3::ZERO);
        assert_eq!(model.dimensions.max, Vec3::splat(3.0));
        // The parent encloses both children; a min/min merge would give (1,1,1) here.
        assert_eq!(model.node(parent).bvh.max, Vec3::splat(3.0));
        assert_eq!(
            model.aabb.transform_point3(Vec3::ONE),
            Vec3::splat(3.0),
            "aabb maps the unit cube onto the dimensions"
        );
    }

    #[test]
    fn parent_transform_moves_child_bounds() {
        let backend = HeadlessBackend::new();
        let mut model = Model::new();
        let mut parent = Node::new(0, "parent");
        parent.translation = Vec3::new(10.0, 0.0, 0.0);
        let parent = model.add_node(None, parent);
        let child = model.add_node(Some(parent), mesh_node(&backend, 1, Vec3::ZERO, Vec3::ONE));
        model.linear_nodes = vec![child, parent];

        model.compute_scene_dimensions();
        assert_eq!(model.node(child).aabb, BoundingBox::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(11.0, 1.0, 1.0)));
        assert_eq!(model.dimensions.min, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn empty_model_has_invalid_dimensions() {
        let mut model = Model::<HeadlessBackend>::new();
        model.compute_scene_dimensions();
        assert!(!model.dimensions.valid);
    }

    #[test]
    fn unskinned_update_writes_world_matrix() {
        let backend = HeadlessBackend::new();
        let mut model = Model::new();
        let mut root = Node::new(0, "root");
        root.translation = Vec3::new(0.0, 5.0, 0.0);
        let root = model.add_node(None, root);
        let child = model.add_node(Some(root), mesh_node(&backend, 1, Vec3::ZERO, Vec3::ONE));

        model.update(&backend).unwrap();

        let data = uniform_block(&backend, &model, child);
        let matrix: Mat4 = bytemuck::pod_read_unaligned(&data[..64]);
        assert_eq!(matrix, Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        // Joint data is untouched for unskinned meshes.
        assert!(data[64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn identity_pose_joints_reduce_to_inverse_bind_matrices() {
        let backend = HeadlessBackend::new();
        let mut model = Model::new();
        let mut mesh_owner = mesh_node(&backend, 0, Vec3::ZERO, Vec3::ONE);
        mesh_owner.translation = Vec3::new(2.0, 0.0, 0.0);
        mesh_owner.skin = Some(0);
        let owner = model.add_node(None, mesh_owner);
        let joint_a = model.add_node(None, Node::new(1, "joint a"));
        let joint_b = model.add_node(Some(joint_a), Node::new(2, "joint b"));

        let ibms = vec![
            Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)),
            Mat4::from_scale(Vec3::splat(0.5)),
        ];
        model.skins.push(Skin {
            name: "skin".into(),
            skeleton_root: Some(joint_a),
            inverse_bind_matrices: ibms.clone(),
            joints: vec![joint_a, joint_b],
        });

        model.update(&backend).unwrap();

        let data = uniform_block(&backend, &model, owner);
        let block: MeshUniformBlock = bytemuck::pod_read_unaligned(&data);
        let inverse_node = model.world_matrix(owner).inverse();
        assert_eq!(block.joint_count, 2.0);
        for (joint, ibm) in ibms.iter().enumerate() {
            let expected = inverse_node * *ibm;
            assert!(block.joint_matrix[joint].abs_diff_eq(expected, 1e-6));
        }
        assert_eq!(block.joint_matrix[2], Mat4::ZERO);
    }

    #[test]
    fn joint_count_is_capped() {
        let backend = HeadlessBackend::new();
        let mut model = Model::new();
        let mut owner = mesh_node(&backend, 0, Vec3::ZERO, Vec3::ONE);
        owner.skin = Some(0);
        let owner = model.add_node(None, owner);
        let joint = model.add_node(None, Node::new(1, "joint"));
        model.skins.push(Skin {
            joints: vec![joint; MAX_NUM_JOINTS + 10],
            ..Default::default()
        });

        model.update(&backend).unwrap();
        assert_eq!(
            model.node(owner).mesh.as_ref().unwrap().uniform_block.joint_count,
            MAX_NUM_JOINTS as f32
        );
    }

    #[test]
    fn draw_records_one_call_per_primitive() {
        let backend = HeadlessBackend::new();
        let vertices: Vec<_> = [Vec3::ZERO, Vec3::X, Vec3::Y].into_iter().map(Vertex::from_position).collect();
        let model = Model::from_geometry(&backend, "triangle", &vertices, &[0, 1, 2]).unwrap();
        assert_eq!(model.primitive_count(), 1);
        assert_eq!(model.materials.len(), 1);
        assert_eq!(model.dimensions.max, Vec3::new(1.0, 1.0, 0.0));

        let mut cmd = backend.begin_commands("draw").unwrap();
        model.draw(&backend, &mut cmd);
        // bind vertex, bind index, one draw
        assert_eq!(cmd.len(), 3);
    }

    #[test]
    fn destroy_releases_everything() {
        let backend = HeadlessBackend::new();
        let vertices: Vec<_> = [Vec3::ZERO, Vec3::X, Vec3::Y].into_iter().map(Vertex::from_position).collect();
        let mut model = Model::from_geometry(&backend, "triangle", &vertices, &[0, 1, 2]).unwrap();
        assert_eq!(backend.live_resources().buffers, 3);

        model.destroy(&backend);
        assert_eq!(backend.live_resources().buffers, 0);
        assert_eq!(model.node_count(), 0);
        assert!(model.roots.is_empty() && model.materials.is_empty());
        assert!(!backend.history().iter().any(|c| matches!(c, HeadlessCommand::Draw { .. })));
    }
}
