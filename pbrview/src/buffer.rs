use pbrview_types::{
    gpu::{BufferDesc, BufferUsage, MemoryFlags},
    Vertex,
};

use crate::backend::{GpuBackend, GpuError, FENCE_TIMEOUT};

/// A buffer handle together with its size in bytes.
pub struct DeviceBuffer<B: GpuBackend> {
    pub buffer: B::Buffer,
    pub size: u64,
}

impl<B: GpuBackend> DeviceBuffer<B> {
    pub fn destroy(self, backend: &B) {
        backend.destroy_buffer(self.buffer);
    }
}

/// Creates a host visible buffer filled with `data`.
pub fn create_staging_buffer<B: GpuBackend>(
    backend: &B,
    label: &str,
    data: &[u8],
) -> Result<DeviceBuffer<B>, GpuError> {
    let size = data.len() as u64;
    let buffer = backend.create_buffer(&BufferDesc {
        label,
        size,
        usage: BufferUsage::TRANSFER_SRC,
        memory: MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
    })?;
    if let Err(e) = backend.write_buffer(&buffer, 0, data) {
        backend.destroy_buffer(buffer);
        return Err(e);
    }
    Ok(DeviceBuffer { buffer, size })
}

/// Consolidated vertex and index data of a model, resident in device local memory.
pub struct GeometryBuffer<B: GpuBackend> {
    pub vertices: DeviceBuffer<B>,
    pub indices: Option<DeviceBuffer<B>>,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl<B: GpuBackend> GeometryBuffer<B> {
    /// Uploads vertices and `u32` indices through staging buffers.
    ///
    /// Blocks until the transfer has completed; the staging buffers are freed
    /// before returning. An empty index list produces no index buffer.
    pub fn upload(backend: &B, vertices: &[Vertex], indices: &[u32]) -> Result<Self, GpuError> {
        profiling::scope!("GeometryBuffer::upload");

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let vertex_staging = create_staging_buffer(backend, "vertex staging buffer", vertex_bytes)?;
        let index_staging = match indices.is_empty() {
            true => None,
            false => match create_staging_buffer(backend, "index staging buffer", index_bytes) {
                Ok(staging) => Some(staging),
                Err(e) => {
                    vertex_staging.destroy(backend);
                    return Err(e);
                }
            },
        };

        let result = Self::copy_from_staging(backend, &vertex_staging, index_staging.as_ref());

        vertex_staging.destroy(backend);
        if let Some(staging) = index_staging {
            staging.destroy(backend);
        }

        let (vertex_buffer, index_buffer) = result?;

        log::debug!(
            "uploaded geometry: {} vertices ({} bytes), {} indices",
            vertices.len(),
            vertex_bytes.len(),
            indices.len()
        );

        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    #[allow(clippy::type_complexity)]
    fn copy_from_staging(
        backend: &B,
        vertex_staging: &DeviceBuffer<B>,
        index_staging: Option<&DeviceBuffer<B>>,
    ) -> Result<(DeviceBuffer<B>, Option<DeviceBuffer<B>>), GpuError> {
        let vertices = DeviceBuffer {
            buffer: backend.create_buffer(&BufferDesc {
                label: "vertex buffer",
                size: vertex_staging.size,
                usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
                memory: MemoryFlags::DEVICE_LOCAL,
            })?,
            size: vertex_staging.size,
        };

        let indices = match index_staging {
            Some(staging) => match backend.create_buffer(&BufferDesc {
                label: "index buffer",
                size: staging.size,
                usage: BufferUsage::INDEX | BufferUsage::TRANSFER_DST,
                memory: MemoryFlags::DEVICE_LOCAL,
            }) {
                Ok(buffer) => Some(DeviceBuffer {
                    buffer,
                    size: staging.size,
                }),
                Err(e) => {
                    vertices.destroy(backend);
                    return Err(e);
                }
            },
            None => None,
        };

        let submitted = (|| {
            let mut cmd = backend.begin_commands("geometry upload")?;
            backend.copy_buffer(&mut cmd, &vertex_staging.buffer, &vertices.buffer, vertices.size);
            if let (Some(staging), Some(indices)) = (index_staging, &indices) {
                backend.copy_buffer(&mut cmd, &staging.buffer, &indices.buffer, indices.size);
            }
            backend.submit_and_wait(cmd, FENCE_TIMEOUT)
        })();

        match submitted {
            Ok(()) => Ok((vertices, indices)),
            Err(e) => {
                vertices.destroy(backend);
                if let Some(indices) = indices {
                    indices.destroy(backend);
                }
                Err(e)
            }
        }
    }

    pub fn destroy(self, backend: &B) {
        self.vertices.destroy(backend);
        if let Some(indices) = self.indices {
            indices.destroy(backend);
        }
    }
}

/// Host visible uniform buffer, written directly by the CPU.
pub struct UniformBuffer<B: GpuBackend> {
    inner: DeviceBuffer<B>,
}

impl<B: GpuBackend> UniformBuffer<B> {
    pub fn new(backend: &B, label: &str, size: u64) -> Result<Self, GpuError> {
        let buffer = backend.create_buffer(&BufferDesc {
            label,
            size,
            usage: BufferUsage::UNIFORM,
            memory: MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        })?;
        Ok(Self {
            inner: DeviceBuffer { buffer, size },
        })
    }

    pub fn write(&self, backend: &B, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        backend.write_buffer(&self.inner.buffer, offset, data)
    }

    pub fn buffer(&self) -> &B::Buffer {
        &self.inner.buffer
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn destroy(self, backend: &B) {
        self.inner.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use pbrview_types::Vertex;

    use super::GeometryBuffer;
    use crate::headless::{HeadlessBackend, HeadlessCommand};

    #[test]
    fn upload_copies_vertex_and_index_data() {
        let backend = HeadlessBackend::new();
        let vertices = [
            Vertex::from_position(Vec3::X),
            Vertex::from_position(Vec3::Y),
            Vertex::from_position(Vec3::Z),
        ];
        let indices = [0, 1, 2];

        let geometry = GeometryBuffer::upload(&backend, &vertices, &indices).unwrap();
        assert_eq!(geometry.vertex_count, 3);
        assert_eq!(geometry.index_count, 3);

        let vertex_data = backend.buffer_contents(&geometry.vertices.buffer).unwrap();
        assert_eq!(vertex_data, bytemuck::cast_slice::<_, u8>(&vertices));
        let index_data = backend.buffer_contents(&geometry.indices.as_ref().unwrap().buffer).unwrap();
        assert_eq!(index_data, bytemuck::cast_slice::<_, u8>(&indices));

        let copies = backend
            .history()
            .iter()
            .filter(|c| matches!(c, HeadlessCommand::CopyBuffer { .. }))
            .count();
        assert_eq!(copies, 2);
        assert_eq!(backend.stats().submits, 1);

        // Only the two device local buffers remain.
        assert_eq!(backend.live_resources().buffers, 2);
        geometry.destroy(&backend);
        assert_eq!(backend.live_resources().buffers, 0);
    }

    #[test]
    fn no_index_buffer_without_indices() {
        let backend = HeadlessBackend::new();
        let geometry = GeometryBuffer::upload(&backend, &[Vertex::from_position(Vec3::ZERO)], &[]).unwrap();
        assert!(geometry.indices.is_none());
        assert_eq!(backend.live_resources().buffers, 1);
    }
}
