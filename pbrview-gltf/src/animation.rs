use glam::{Vec3, Vec4};
use gltf::{
    accessor::{DataType, Dimensions, Iter},
    animation::Property,
    buffer,
};
use pbrview::{Animation, AnimationChannel, AnimationPath, AnimationSampler, GpuBackend, Interpolation, Model};

use crate::GltfLoadError;

fn read_outputs<'a>(
    accessor: gltf::Accessor<'a>,
    buffers: &'a [buffer::Data],
) -> Result<Vec<Vec4>, &'static str> {
    if accessor.data_type() != DataType::F32 {
        return Err("keyframe outputs must be floats");
    }
    let get = |buffer: gltf::Buffer<'a>| Some(buffers[buffer.index()].0.as_slice());
    let outputs = match accessor.dimensions() {
        Dimensions::Vec3 => Iter::<[f32; 3]>::new(accessor, get)
            .ok_or("keyframe outputs have no data")?
            .map(|v| Vec3::from(v).extend(0.0))
            .collect(),
        Dimensions::Vec4 => Iter::<[f32; 4]>::new(accessor, get)
            .ok_or("keyframe outputs have no data")?
            .map(Vec4::from)
            .collect(),
        // Morph weights only, which are never played.
        Dimensions::Scalar => Vec::new(),
        _ => return Err("keyframe outputs must be scalars, vec3 or vec4"),
    };
    Ok(outputs)
}

fn read_inputs<'a>(accessor: gltf::Accessor<'a>, buffers: &'a [buffer::Data]) -> Result<Vec<f32>, &'static str> {
    if accessor.data_type() != DataType::F32 || accessor.dimensions() != Dimensions::Scalar {
        return Err("keyframe times must be scalar floats");
    }
    let get = |buffer: gltf::Buffer<'a>| Some(buffers[buffer.index()].0.as_slice());
    Ok(Iter::<f32>::new(accessor, get)
        .ok_or("keyframe times have no data")?
        .collect())
}

fn load_sampler(
    sampler: &gltf::animation::Sampler,
    buffers: &[buffer::Data],
) -> Result<AnimationSampler, &'static str> {
    let interpolation = match sampler.interpolation() {
        gltf::animation::Interpolation::Linear => Interpolation::Linear,
        gltf::animation::Interpolation::Step => Interpolation::Step,
        gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
    };
    Ok(AnimationSampler {
        interpolation,
        inputs: read_inputs(sampler.input(), buffers)?,
        outputs: read_outputs(sampler.output(), buffers)?,
    })
}

/// Reads every animation. Must run after the node hierarchy is loaded.
pub(crate) fn load_animations<B: GpuBackend>(
    model: &Model<B>,
    document: &gltf::Document,
    buffers: &[buffer::Data],
) -> Result<Vec<Animation>, GltfLoadError> {
    profiling::scope!("load animations");
    let mut animations = Vec::with_capacity(document.animations().len());

    for gltf_animation in document.animations() {
        let name = gltf_animation
            .name()
            .map_or_else(|| gltf_animation.index().to_string(), str::to_owned);
        let mut animation = Animation::new(name);

        for sampler in gltf_animation.samplers() {
            let sampler = load_sampler(&sampler, buffers).map_err(|reason| GltfLoadError::InvalidAnimation {
                animation: animation.name.clone(),
                reason: reason.to_owned(),
            })?;
            animation.samplers.push(sampler);
        }

        for channel in gltf_animation.channels() {
            let target = channel.target();
            let path = match target.property() {
                Property::Translation => AnimationPath::Translation,
                Property::Rotation => AnimationPath::Rotation,
                Property::Scale => AnimationPath::Scale,
                Property::MorphTargetWeights => {
                    log::warn!("animation {:?}: weights are not yet supported, skipping channel", animation.name);
                    continue;
                }
            };
            let Some(node) = model.node_from_index(target.node().index() as u32) else {
                log::warn!(
                    "animation {:?} targets node {} outside the scene",
                    animation.name,
                    target.node().index()
                );
                continue;
            };
            animation.channels.push(AnimationChannel {
                path,
                node,
                sampler: channel.sampler().index(),
            });
        }

        animation.update_time_range();
        log::debug!(
            "animation {:?}: {} channels over [{}, {}]",
            animation.name,
            animation.channels.len(),
            animation.start,
            animation.end
        );
        animations.push(animation);
    }

    Ok(animations)
}
