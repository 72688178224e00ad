use glam::Mat4;
use gltf::buffer;
use pbrview::{GpuBackend, Model, NodeId, Skin};

use crate::GltfLoadError;

/// Resolves every document skin against the loaded node arena.
///
/// A joint is matched to its inverse bind matrix and to vertex joint indices
/// by position, so a skin bound in the loaded scene must resolve every joint.
/// Skins no loaded node uses keep an empty joint list.
pub(crate) fn load_skins<B: GpuBackend>(
    model: &Model<B>,
    document: &gltf::Document,
    buffers: &[buffer::Data],
) -> Result<Vec<Skin>, GltfLoadError> {
    profiling::scope!("load skins");
    document
        .skins()
        .map(|skin| {
            let name = skin.name().unwrap_or_default().to_owned();
            let skeleton_root = skin
                .skeleton()
                .and_then(|root| model.node_from_index(root.index() as u32));

            let resolved: Result<Vec<NodeId>, usize> = skin
                .joints()
                .map(|joint| model.node_from_index(joint.index() as u32).ok_or(joint.index()))
                .collect();
            let joints = match resolved {
                Ok(joints) => joints,
                Err(node) if model.nodes().any(|(_, n)| n.skin_index == Some(skin.index())) => {
                    return Err(GltfLoadError::MissingJoint {
                        skin: skin.index(),
                        node,
                    })
                }
                Err(node) => {
                    log::warn!("unused skin {name:?} references node {node} outside the scene");
                    Vec::new()
                }
            };

            let reader = skin.reader(|buffer| Some(buffers[buffer.index()].0.as_slice()));
            let inverse_bind_matrices = reader
                .read_inverse_bind_matrices()
                .map(|matrices| matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_default();

            Ok(Skin {
                name,
                skeleton_root,
                inverse_bind_matrices,
                joints,
            })
        })
        .collect()
}
