//! Keyframe animation playback.
//!
//! Samplers hold the keyframe tracks, and channels bind a sampler to a node
//! property. Playing an animation at a given time writes the sampled values
//! into node transforms, then repropagates the whole model.

use glam::{Quat, Vec4};
use thiserror::Error;

use crate::{
    backend::{GpuBackend, GpuError},
    scene::{Model, NodeId},
};

#[derive(Debug, Error)]
pub enum AnimationError {
    #[error("model does not contain any animations")]
    NoAnimations,
    #[error("no animation with index {index}, model has {count}")]
    IndexOutOfRange { index: usize, count: usize },
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
    /// Outputs hold an in-tangent, a value and an out-tangent per keyframe.
    CubicSpline,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnimationPath {
    Translation,
    Rotation,
    Scale,
}

/// A keyframe track. Three-component outputs are padded with `w = 0`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationSampler {
    pub interpolation: Interpolation,
    pub inputs: Vec<f32>,
    pub outputs: Vec<Vec4>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnimationChannel {
    pub path: AnimationPath,
    pub node: NodeId,
    /// Index into [`Animation::samplers`].
    pub sampler: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub name: String,
    pub samplers: Vec<AnimationSampler>,
    pub channels: Vec<AnimationChannel>,
    pub start: f32,
    pub end: f32,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samplers: Vec::new(),
            channels: Vec::new(),
            start: f32::MAX,
            end: f32::MIN,
        }
    }

    /// Widens `[start, end]` to cover every sampler's input times.
    pub fn update_time_range(&mut self) {
        for input in self.samplers.iter().flat_map(|s| s.inputs.iter().copied()) {
            self.start = self.start.min(input);
            self.end = self.end.max(input);
        }
    }

    pub fn duration(&self) -> f32 {
        (self.end - self.start).max(0.0)
    }
}

/// Helper trait that exposes a generic interpolation between keyframe values.
pub trait Lerp {
    fn lerp(self, other: Self, t: f32) -> Self;
}
impl Lerp for Vec4 {
    fn lerp(self, other: Self, t: f32) -> Self {
        Vec4::lerp(self, other, t)
    }
}
impl Lerp for Quat {
    fn lerp(self, other: Self, t: f32) -> Self {
        self.slerp(other, t).normalize()
    }
}

fn hermite(p0: Vec4, m0: Vec4, p1: Vec4, m1: Vec4, t: f32) -> Vec4 {
    let t2 = t * t;
    let t3 = t2 * t;
    p0 * (2.0 * t3 - 3.0 * t2 + 1.0) + m0 * (t3 - 2.0 * t2 + t) + p1 * (-2.0 * t3 + 3.0 * t2) + m1 * (t3 - t2)
}

impl AnimationSampler {
    /// Whether there are enough outputs for every input of this sampler.
    pub fn is_well_formed(&self) -> bool {
        let per_key = match self.interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        };
        self.outputs.len() >= self.inputs.len() * per_key
    }

    /// Finds the keyframe pair bracketing `time` and the fraction between them.
    ///
    /// Pairs are scanned in order; pairs with no duration are skipped.
    pub fn locate(&self, time: f32) -> Option<(usize, f32)> {
        self.inputs.windows(2).enumerate().find_map(|(i, pair)| {
            let span = pair[1] - pair[0];
            if time < pair[0] || time > pair[1] || span <= 0.0 {
                return None;
            }
            let u = (time - pair[0]).max(0.0) / span;
            (u <= 1.0).then_some((i, u))
        })
    }

    fn value(&self, key: usize) -> Vec4 {
        match self.interpolation {
            Interpolation::CubicSpline => self.outputs[key * 3 + 1],
            _ => self.outputs[key],
        }
    }

    /// Samples the track as a vector. Keyframe times reproduce their outputs exactly.
    pub fn sample_vec4(&self, key: usize, u: f32) -> Vec4 {
        match self.interpolation {
            _ if u >= 1.0 => self.value(key + 1),
            Interpolation::Step => self.value(key),
            _ if u <= 0.0 => self.value(key),
            Interpolation::Linear => Lerp::lerp(self.outputs[key], self.outputs[key + 1], u),
            Interpolation::CubicSpline => self.cubic(key, u),
        }
    }

    /// Samples the track as a rotation.
    pub fn sample_rotation(&self, key: usize, u: f32) -> Quat {
        let rotation = |v: Vec4| Quat::from_vec4(v).normalize();
        match self.interpolation {
            _ if u >= 1.0 => rotation(self.value(key + 1)),
            Interpolation::Step => rotation(self.value(key)),
            _ if u <= 0.0 => rotation(self.value(key)),
            Interpolation::Linear => Lerp::lerp(rotation(self.outputs[key]), rotation(self.outputs[key + 1]), u),
            Interpolation::CubicSpline => rotation(self.cubic(key, u)),
        }
    }

    fn cubic(&self, key: usize, u: f32) -> Vec4 {
        let dt = self.inputs[key + 1] - self.inputs[key];
        let p0 = self.outputs[key * 3 + 1];
        let m0 = self.outputs[key * 3 + 2] * dt;
        let p1 = self.outputs[(key + 1) * 3 + 1];
        let m1 = self.outputs[(key + 1) * 3] * dt;
        hermite(p0, m0, p1, m1, u)
    }
}

impl<B: GpuBackend> Model<B> {
    /// Poses the model according to animation `index` at `time` seconds.
    ///
    /// Channels whose sampler is malformed are skipped. If any node changed,
    /// the whole graph is updated once afterwards.
    pub fn update_animation(&mut self, backend: &B, index: usize, time: f32) -> Result<(), AnimationError> {
        profiling::scope!("Model::update_animation");

        if self.animations.is_empty() {
            log::warn!("model does not contain animation");
            return Err(AnimationError::NoAnimations);
        }
        let Some(animation) = self.animations.get(index) else {
            log::warn!("no animation with index {index}");
            return Err(AnimationError::IndexOutOfRange {
                index,
                count: self.animations.len(),
            });
        };

        let mut updated = false;
        for channel in &animation.channels {
            let Some(sampler) = animation.samplers.get(channel.sampler) else {
                continue;
            };
            if !sampler.is_well_formed() {
                log::warn!(
                    "skipping channel of animation {:?}: {} inputs but {} outputs",
                    animation.name,
                    sampler.inputs.len(),
                    sampler.outputs.len()
                );
                continue;
            }
            let Some((key, u)) = sampler.locate(time) else {
                continue;
            };

            let node = &mut self.nodes[channel.node.0];
            match channel.path {
                AnimationPath::Translation => node.translation = sampler.sample_vec4(key, u).truncate(),
                AnimationPath::Scale => node.scale = sampler.sample_vec4(key, u).truncate(),
                AnimationPath::Rotation => node.rotation = sampler.sample_rotation(key, u),
            }
            updated = true;
        }

        if updated {
            self.update(backend)?;
        }
        Ok(())
    }

    /// Time range covered by animation `index`.
    pub fn animation_duration(&self, index: usize) -> Option<(f32, f32)> {
        self.animations.get(index).map(|a| (a.start, a.end))
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat, Vec3, Vec4};

    use super::{Animation, AnimationChannel, AnimationError, AnimationPath, AnimationSampler, Interpolation};
    use crate::{
        headless::HeadlessBackend,
        scene::{tests::mesh_node, Model, NodeId},
    };

    fn linear(inputs: Vec<f32>, outputs: Vec<Vec4>) -> AnimationSampler {
        AnimationSampler {
            interpolation: Interpolation::Linear,
            inputs,
            outputs,
        }
    }

    fn model_with(sampler: AnimationSampler, path: AnimationPath) -> (HeadlessBackend, Model<HeadlessBackend>, NodeId) {
        let backend = HeadlessBackend::new();
        let mut model = Model::new();
        let node = model.add_node(None, mesh_node(&backend, 0, Vec3::ZERO, Vec3::ONE));
        let mut animation = Animation::new("0");
        animation.samplers.push(sampler);
        animation.channels.push(AnimationChannel {
            path,
            node,
            sampler: 0,
        });
        animation.update_time_range();
        model.animations.push(animation);
        (backend, model, node)
    }

    #[test]
    fn linear_track_is_exact_at_endpoints() {
        let outputs = vec![
            Vec4::new(0.1, 0.2, 0.3, 0.0),
            Vec4::new(7.0, -3.3, 1.7, 0.0),
            Vec4::new(-2.9, 4.4, 0.6, 0.0),
        ];
        let (backend, mut model, node) =
            model_with(linear(vec![0.3, 1.1, 2.7], outputs.clone()), AnimationPath::Translation);

        model.update_animation(&backend, 0, 0.3).unwrap();
        assert_eq!(model.node(node).translation, outputs[0].truncate());

        model.update_animation(&backend, 0, 2.7).unwrap();
        assert_eq!(model.node(node).translation, outputs[2].truncate());

        model.update_animation(&backend, 0, 1.1).unwrap();
        assert_eq!(model.node(node).translation, outputs[1].truncate());
    }

    #[test]
    fn equal_keys_hold_their_value() {
        let value = Vec4::new(1.5, 2.5, 3.5, 0.0);
        let (backend, mut model, node) = model_with(linear(vec![0.0, 2.0], vec![value, value]), AnimationPath::Scale);
        for t in [0.25, 1.0, 1.75] {
            model.update_animation(&backend, 0, t).unwrap();
            assert_eq!(model.node(node).scale, value.truncate());
        }
    }

    #[test]
    fn linear_midpoint_interpolates() {
        let (backend, mut model, node) = model_with(
            linear(vec![0.0, 1.0], vec![Vec4::ZERO, Vec4::new(2.0, 4.0, 6.0, 0.0)]),
            AnimationPath::Translation,
        );
        model.update_animation(&backend, 0, 0.5).unwrap();
        assert!(model.node(node).translation.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn rotation_uses_slerp() {
        let end = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let (backend, mut model, node) = model_with(
            linear(vec![0.0, 1.0], vec![Vec4::from(Quat::IDENTITY), Vec4::from(end)]),
            AnimationPath::Rotation,
        );
        model.update_animation(&backend, 0, 0.5).unwrap();
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(model.node(node).rotation.abs_diff_eq(expected, 1e-5));
        assert!(model.node(node).rotation.is_normalized());
    }

    #[test]
    fn step_holds_previous_key() {
        let sampler = AnimationSampler {
            interpolation: Interpolation::Step,
            inputs: vec![0.0, 1.0],
            outputs: vec![Vec4::ONE, Vec4::splat(5.0)],
        };
        let (backend, mut model, node) = model_with(sampler, AnimationPath::Scale);
        model.update_animation(&backend, 0, 0.99).unwrap();
        assert_eq!(model.node(node).scale, Vec3::ONE);
    }

    #[test]
    fn step_reaches_the_final_key() {
        let sampler = AnimationSampler {
            interpolation: Interpolation::Step,
            inputs: vec![0.0, 1.0, 2.0],
            outputs: vec![Vec4::ONE, Vec4::splat(5.0), Vec4::splat(9.0)],
        };
        let (backend, mut model, node) = model_with(sampler, AnimationPath::Scale);
        model.update_animation(&backend, 0, 1.0).unwrap();
        assert_eq!(model.node(node).scale, Vec3::splat(5.0));
        model.update_animation(&backend, 0, 1.5).unwrap();
        assert_eq!(model.node(node).scale, Vec3::splat(5.0));
        model.update_animation(&backend, 0, 2.0).unwrap();
        assert_eq!(model.node(node).scale, Vec3::splat(9.0));
    }

    #[test]
    fn step_rotation_reaches_the_final_key() {
        let last = Quat::from_rotation_y(1.0);
        let sampler = AnimationSampler {
            interpolation: Interpolation::Step,
            inputs: vec![0.0, 1.0],
            outputs: vec![Vec4::from(Quat::IDENTITY), Vec4::from(last)],
        };
        let (backend, mut model, node) = model_with(sampler, AnimationPath::Rotation);
        model.update_animation(&backend, 0, 1.0).unwrap();
        assert!(model.node(node).rotation.abs_diff_eq(last, 1e-6));
    }

    #[test]
    fn cubic_spline_passes_through_keys_and_uses_tangents() {
        let sampler = AnimationSampler {
            interpolation: Interpolation::CubicSpline,
            inputs: vec![0.0, 2.0],
            outputs: vec![
                Vec4::ZERO,
                Vec4::ZERO,
                Vec4::new(1.0, 0.0, 0.0, 0.0),
                Vec4::new(1.0, 0.0, 0.0, 0.0),
                Vec4::new(2.0, 0.0, 0.0, 0.0),
                Vec4::ZERO,
            ],
        };
        // A straight line from 0 to 2 over 2 seconds with unit slope.
        let (key, u) = sampler.locate(1.0).unwrap();
        assert_eq!((key, u), (0, 0.5));
        assert!(sampler.sample_vec4(key, u).abs_diff_eq(Vec4::new(1.0, 0.0, 0.0, 0.0), 1e-6));
        assert_eq!(sampler.sample_vec4(0, 1.0), Vec4::new(2.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn time_outside_track_leaves_node() {
        let (backend, mut model, node) = model_with(
            linear(vec![1.0, 2.0], vec![Vec4::ONE, Vec4::ONE]),
            AnimationPath::Translation,
        );
        model.update_animation(&backend, 0, 5.0).unwrap();
        assert_eq!(model.node(node).translation, Vec3::ZERO);
    }

    #[test]
    fn malformed_sampler_is_skipped() {
        let (backend, mut model, node) =
            model_with(linear(vec![0.0, 1.0], vec![Vec4::ONE]), AnimationPath::Translation);
        model.update_animation(&backend, 0, 0.5).unwrap();
        assert_eq!(model.node(node).translation, Vec3::ZERO);
    }

    #[test]
    fn animation_updates_uniforms() {
        let (backend, mut model, node) = model_with(
            linear(vec![0.0, 1.0], vec![Vec4::ZERO, Vec4::new(0.0, 0.0, 4.0, 0.0)]),
            AnimationPath::Translation,
        );
        model.update_animation(&backend, 0, 1.0).unwrap();
        let data = backend
            .buffer_contents(model.node(node).mesh.as_ref().unwrap().uniform_buffer.buffer())
            .unwrap();
        let matrix: Mat4 = bytemuck::pod_read_unaligned(&data[..64]);
        assert_eq!(matrix, Mat4::from_translation(Vec3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn bad_indices_are_errors() {
        let backend = HeadlessBackend::new();
        let mut empty = Model::<HeadlessBackend>::new();
        assert!(matches!(
            empty.update_animation(&backend, 0, 0.0),
            Err(AnimationError::NoAnimations)
        ));

        let (backend, mut model, _) = model_with(linear(vec![0.0], vec![Vec4::ONE]), AnimationPath::Scale);
        assert!(matches!(
            model.update_animation(&backend, 3, 0.0),
            Err(AnimationError::IndexOutOfRange { index: 3, count: 1 })
        ));
    }

    #[test]
    fn time_range_covers_all_samplers() {
        let mut animation = Animation::new("walk");
        animation.samplers.push(linear(vec![0.5, 1.0], vec![Vec4::ONE; 2]));
        animation.samplers.push(linear(vec![0.2, 3.0], vec![Vec4::ONE; 2]));
        animation.update_time_range();
        assert_eq!((animation.start, animation.end), (0.2, 3.0));
        assert!((animation.duration() - 2.8).abs() < 1e-6);
    }
}
