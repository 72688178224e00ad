//! Builds small glTF documents with their binary data embedded as a data URI.

#![allow(dead_code)]

use glam::Mat4;

const FLOAT: u32 = 5126;
const UNSIGNED_BYTE: u32 = 5121;
const UNSIGNED_SHORT: u32 = 5123;
const UNSIGNED_INT: u32 = 5125;

#[derive(Default)]
pub struct DocumentBuilder {
    data: Vec<u8>,
    views: Vec<String>,
    accessors: Vec<String>,
}

fn array(values: impl IntoIterator<Item = f32>) -> String {
    let values: Vec<String> = values.into_iter().map(|v| format!("{v:?}")).collect();
    format!("[{}]", values.join(","))
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn view(&mut self, bytes: &[u8]) -> usize {
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        self.views.push(format!(
            r#"{{"buffer":0,"byteOffset":{},"byteLength":{}}}"#,
            self.data.len(),
            bytes.len()
        ));
        self.data.extend_from_slice(bytes);
        self.views.len() - 1
    }

    fn accessor(&mut self, bytes: &[u8], component: u32, count: usize, kind: &str, extra: &str) -> usize {
        let view = self.view(bytes);
        self.accessors.push(format!(
            r#"{{"bufferView":{view},"componentType":{component},"count":{count},"type":"{kind}"{extra}}}"#
        ));
        self.accessors.len() - 1
    }

    /// A VEC3 float accessor carrying min and max, as POSITION requires.
    pub fn vec3(&mut self, values: &[[f32; 3]]) -> usize {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for v in values {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        let extra = format!(r#","min":{},"max":{}"#, array(min), array(max));
        self.accessor(bytemuck::cast_slice(values), FLOAT, values.len(), "VEC3", &extra)
    }

    pub fn vec2(&mut self, values: &[[f32; 2]]) -> usize {
        self.accessor(bytemuck::cast_slice(values), FLOAT, values.len(), "VEC2", "")
    }

    pub fn vec4(&mut self, values: &[[f32; 4]]) -> usize {
        self.accessor(bytemuck::cast_slice(values), FLOAT, values.len(), "VEC4", "")
    }

    pub fn scalars(&mut self, values: &[f32]) -> usize {
        let min = values.iter().copied().fold(f32::MAX, f32::min);
        let max = values.iter().copied().fold(f32::MIN, f32::max);
        let extra = format!(r#","min":[{min:?}],"max":[{max:?}]"#);
        self.accessor(bytemuck::cast_slice(values), FLOAT, values.len(), "SCALAR", &extra)
    }

    pub fn indices_u8(&mut self, values: &[u8]) -> usize {
        self.accessor(values, UNSIGNED_BYTE, values.len(), "SCALAR", "")
    }

    pub fn indices_u16(&mut self, values: &[u16]) -> usize {
        self.accessor(bytemuck::cast_slice(values), UNSIGNED_SHORT, values.len(), "SCALAR", "")
    }

    pub fn indices_u32(&mut self, values: &[u32]) -> usize {
        self.accessor(bytemuck::cast_slice(values), UNSIGNED_INT, values.len(), "SCALAR", "")
    }

    pub fn joints_u8(&mut self, values: &[[u8; 4]]) -> usize {
        self.accessor(bytemuck::cast_slice(values), UNSIGNED_BYTE, values.len(), "VEC4", "")
    }

    pub fn mat4(&mut self, values: &[Mat4]) -> usize {
        let floats: Vec<f32> = values.iter().flat_map(|m| m.to_cols_array()).collect();
        self.accessor(bytemuck::cast_slice(&floats), FLOAT, values.len(), "MAT4", "")
    }

    /// Completes the document. `body` holds the remaining top level members,
    /// such as `"scenes"`, `"nodes"` and `"meshes"`, without surrounding braces.
    pub fn finish(self, body: &str) -> Vec<u8> {
        let encoded = base64::encode(&self.data);
        format!(
            r#"{{"asset":{{"version":"2.0"}},"buffers":[{{"byteLength":{},"uri":"data:application/octet-stream;base64,{encoded}"}}],"bufferViews":[{}],"accessors":[{}],{body}}}"#,
            self.data.len(),
            self.views.join(","),
            self.accessors.join(","),
        )
        .into_bytes()
    }
}

pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// One node with one indexed triangle, referencing no material.
pub fn triangle_document(extra: &str) -> Vec<u8> {
    let mut doc = DocumentBuilder::new();
    let positions = doc.vec3(&TRIANGLE);
    let indices = doc.indices_u16(&[0, 1, 2]);
    doc.finish(&format!(
        r#""scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0}}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":{positions}}},"indices":{indices}}}]}}]{extra}"#
    ))
}
