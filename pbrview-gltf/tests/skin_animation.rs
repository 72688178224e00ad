use anyhow::Context;
use glam::{Mat4, Quat, Vec3};
use pbrview::{types::Vertex, AnimationError, AnimationPath, HeadlessBackend, Interpolation, NodeId};
use pbrview_gltf::{load_gltf_data, GltfLoadError, LoaderOptions};

mod common;

use common::{DocumentBuilder, TRIANGLE};

fn load(backend: &HeadlessBackend, document: &[u8]) -> Result<pbrview::Model<HeadlessBackend>, GltfLoadError> {
    load_gltf_data(backend, document, None, &LoaderOptions::default())
}

fn skinned_document_with(joints_list: &str, unused_skin: &str) -> Vec<u8> {
    let mut doc = DocumentBuilder::new();
    let positions = doc.vec3(&TRIANGLE);
    let joints = doc.joints_u8(&[[0, 1, 0, 0], [1, 0, 0, 0], [0, 0, 0, 0]]);
    let weights = doc.vec4(&[[0.5, 0.5, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [0.0; 4]]);
    let ibms = doc.mat4(&[Mat4::IDENTITY, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))]);
    doc.finish(&format!(
        r#""scenes":[{{"nodes":[0,1]}}],
        "nodes":[
            {{"name":"body","mesh":0,"skin":0}},
            {{"name":"hip","children":[2]}},
            {{"name":"knee","translation":[0.0,1.0,0.0]}},
            {{"name":"detached"}}],
        "skins":[{{"name":"legs","joints":{joints_list},"skeleton":1,"inverseBindMatrices":{ibms}}}{unused_skin}],
        "meshes":[{{"primitives":[{{"attributes":{{"POSITION":{positions},"JOINTS_0":{joints},"WEIGHTS_0":{weights}}}}}]}}]"#
    ))
}

fn skinned_document() -> Vec<u8> {
    skinned_document_with("[1,2]", "")
}

#[test]
pub fn skins_resolve_joints_after_nodes() -> anyhow::Result<()> {
    let backend = HeadlessBackend::new();
    let model = load(&backend, &skinned_document())?;

    assert_eq!(model.skins.len(), 1);
    let skin = &model.skins[0];
    let hip = model.find_node(1).context("hip")?;
    let knee = model.find_node(2).context("knee")?;
    assert_eq!(skin.name, "legs");
    assert_eq!(skin.joints, [hip, knee]);
    assert_eq!(skin.skeleton_root, Some(hip));
    assert_eq!(skin.inverse_bind_matrices.len(), 2);
    assert_eq!(
        skin.inverse_bind_matrices[1],
        Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))
    );

    let body = model.find_node(0).context("body")?;
    assert_eq!(model.node(body).skin, Some(0));
    let mesh = model.node(body).mesh.as_ref().context("body mesh")?;
    assert_eq!(mesh.uniform_block.joint_count, 2.0);
    // The knee sits one unit above the hip and its inverse bind matrix moves it back.
    assert!(mesh.uniform_block.joint_matrix[1].abs_diff_eq(Mat4::IDENTITY, 1e-6));
    Ok(())
}

#[test]
pub fn bound_skin_with_joint_outside_scene_is_rejected() {
    let backend = HeadlessBackend::new();
    let err = load(&backend, &skinned_document_with("[1,3,2]", ""));
    assert!(matches!(err, Err(GltfLoadError::MissingJoint { skin: 0, node: 3 })));
    assert_eq!(backend.live_resources(), Default::default());
}

#[test]
pub fn unused_skin_outside_scene_keeps_no_joints() -> anyhow::Result<()> {
    let backend = HeadlessBackend::new();
    let model = load(&backend, &skinned_document_with("[1,2]", r#",{"name":"spare","joints":[3,1]}"#))?;

    assert_eq!(model.skins.len(), 2);
    assert_eq!(model.skins[1].name, "spare");
    assert!(model.skins[1].joints.is_empty());
    assert_eq!(model.skins[0].joints.len(), 2);
    Ok(())
}

#[test]
pub fn joint_attributes_are_read() -> anyhow::Result<()> {
    let backend = HeadlessBackend::new();
    let model = load(&backend, &skinned_document())?;
    let geometry = model.geometry.as_ref().context("geometry")?;
    let vertices: Vec<Vertex> =
        bytemuck::pod_collect_to_vec(&backend.buffer_contents(&geometry.vertices.buffer).context("vertices")?);

    assert_eq!(vertices[0].joint0, [0.0, 1.0, 0.0, 0.0]);
    assert_eq!(vertices[0].weight0, [0.5, 0.5, 0.0, 0.0]);
    assert_eq!(vertices[1].joint0, [1.0, 0.0, 0.0, 0.0]);
    // All zero weights fall back to the first joint.
    assert_eq!(vertices[2].weight0, [1.0, 0.0, 0.0, 0.0]);
    Ok(())
}

fn animated_document() -> Vec<u8> {
    let mut doc = DocumentBuilder::new();
    let positions = doc.vec3(&TRIANGLE);
    let times = doc.scalars(&[0.0, 1.0]);
    let late_times = doc.scalars(&[0.5, 2.0]);
    let translations = doc.vec3(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
    let rotations = doc.vec4(&[
        Quat::IDENTITY.to_array(),
        Quat::from_rotation_z(std::f32::consts::FRAC_PI_2).to_array(),
    ]);
    let weights = doc.scalars(&[0.0, 1.0]);
    doc.finish(&format!(
        r#""scenes":[{{"nodes":[0]}}],
        "nodes":[{{"mesh":0}},{{"name":"elsewhere"}}],
        "meshes":[{{"primitives":[{{"attributes":{{"POSITION":{positions}}}}}]}}],
        "animations":[{{
            "samplers":[
                {{"input":{times},"output":{translations}}},
                {{"input":{late_times},"output":{rotations},"interpolation":"STEP"}},
                {{"input":{times},"output":{weights}}}],
            "channels":[
                {{"sampler":0,"target":{{"node":0,"path":"translation"}}}},
                {{"sampler":1,"target":{{"node":0,"path":"rotation"}}}},
                {{"sampler":2,"target":{{"node":0,"path":"weights"}}}},
                {{"sampler":0,"target":{{"node":1,"path":"translation"}}}}]
        }}]"#
    ))
}

#[test]
pub fn animations_are_parsed() -> anyhow::Result<()> {
    let backend = HeadlessBackend::new();
    let model = load(&backend, &animated_document())?;

    assert_eq!(model.animations.len(), 1);
    let animation = &model.animations[0];
    assert_eq!(animation.name, "0");
    assert_eq!(animation.samplers.len(), 3);
    assert_eq!(animation.samplers[1].interpolation, Interpolation::Step);
    // Three component outputs are padded with zero.
    assert_eq!(animation.samplers[0].outputs[1].w, 0.0);
    // Weights and the channel targeting a node outside the scene are skipped.
    let paths: Vec<AnimationPath> = animation.channels.iter().map(|c| c.path).collect();
    assert_eq!(paths, [AnimationPath::Translation, AnimationPath::Rotation]);
    assert_eq!((animation.start, animation.end), (0.0, 2.0));
    assert_eq!(model.animation_duration(0), Some((0.0, 2.0)));
    Ok(())
}

#[test]
pub fn playing_an_animation_moves_nodes() -> anyhow::Result<()> {
    let backend = HeadlessBackend::new();
    let mut model = load(&backend, &animated_document())?;
    let node = NodeId(0);

    model.update_animation(&backend, 0, 0.5)?;
    assert!(model.node(node).translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    // Step interpolation holds the first key until the next one is reached.
    assert!(model.node(node).rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));

    let mesh = model.node(node).mesh.as_ref().context("mesh")?;
    let uploaded = backend
        .buffer_contents(mesh.uniform_buffer.buffer())
        .context("uniform contents")?;
    let matrix: Mat4 = bytemuck::pod_read_unaligned(&uploaded[..64]);
    assert!(matrix.abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)), 1e-6));

    model.update_animation(&backend, 0, 1.0)?;
    assert_eq!(model.node(node).translation, Vec3::new(2.0, 0.0, 0.0));
    Ok(())
}

#[test]
pub fn unknown_animation_index_is_an_error() -> anyhow::Result<()> {
    let backend = HeadlessBackend::new();
    let mut model = load(&backend, &animated_document())?;
    let result = model.update_animation(&backend, 3, 0.0);
    assert!(matches!(result, Err(AnimationError::IndexOutOfRange { index: 3, count: 1 })));
    Ok(())
}

#[test]
pub fn integer_keyframes_are_rejected() {
    let mut doc = DocumentBuilder::new();
    let positions = doc.vec3(&TRIANGLE);
    let times = doc.scalars(&[0.0, 1.0]);
    let outputs = doc.indices_u16(&[0, 1]);
    let document = doc.finish(&format!(
        r#""scenes":[{{"nodes":[0]}}],
        "nodes":[{{"mesh":0}}],
        "meshes":[{{"primitives":[{{"attributes":{{"POSITION":{positions}}}}}]}}],
        "animations":[{{"name":"bad",
            "samplers":[{{"input":{times},"output":{outputs}}}],
            "channels":[{{"sampler":0,"target":{{"node":0,"path":"translation"}}}}]}}]"#
    ));

    let backend = HeadlessBackend::new();
    let result = load(&backend, &document);
    assert!(matches!(result, Err(GltfLoadError::InvalidAnimation { animation, .. }) if animation == "bad"));
    assert_eq!(backend.live_resources(), Default::default());
}
