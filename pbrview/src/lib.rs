//! Scene graph runtime for glTF models rendered with physically based shading.
//!
//! The crate is independent of any particular graphics API. GPU work goes
//! through the [`GpuBackend`] trait, which exposes buffers, images, command
//! recording and blocking submission. A [`HeadlessBackend`] that performs all
//! work in host memory ships with the crate and is used by the tests.
//!
//! The main type is [`Model`]: an arena of [`Node`]s with meshes, skins and
//! animations, plus the GPU geometry and textures they reference. Models are
//! usually produced by the `pbrview-gltf` loader.
//!
//! Each frame:
//! - Pose the model with [`Model::update_animation`], or change node
//!   transforms directly and call [`Model::update`].
//! - Record draws with [`Model::draw`].

pub use pbrview_types as types;

pub mod animation;
pub mod backend;
pub mod buffer;
pub mod headless;
pub mod scene;
pub mod texture;

pub use animation::{Animation, AnimationChannel, AnimationError, AnimationPath, AnimationSampler, Interpolation};
pub use backend::{GpuBackend, GpuError, PipelineDesc, Program, VertexInput, FENCE_TIMEOUT};
pub use buffer::{GeometryBuffer, UniformBuffer};
pub use headless::HeadlessBackend;
pub use scene::{Mesh, MeshUniformBlock, Model, Node, NodeId, Primitive, Skin, MAX_NUM_JOINTS};
pub use texture::Texture;
