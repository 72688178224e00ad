use pbrview::{types::Vertex, Program, VertexInput};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingResource, BindingType, BufferAddress, ColorTargetState, ColorWrites, Device, FragmentState, FrontFace,
    MultisampleState, PipelineLayoutDescriptor, PolygonMode, PrimitiveState, PrimitiveTopology, PushConstantRange,
    RenderPipeline, RenderPipelineDescriptor, SamplerBindingType, ShaderModule, ShaderStages, TextureFormat,
    TextureSampleType, TextureView, TextureViewDimension, VertexAttribute, VertexBufferLayout, VertexFormat,
    VertexState, VertexStepMode,
};

/// Shader modules of every [`Program`], compiled once per device.
pub struct ShaderModules {
    brdf_lut: ShaderModule,
    irradiance: ShaderModule,
    prefilter: ShaderModule,
}

impl ShaderModules {
    pub fn new(device: &Device) -> Self {
        profiling::scope!("ShaderModules::new");
        Self {
            brdf_lut: device.create_shader_module(wgpu::include_wgsl!("../shaders/brdf_lut.wgsl")),
            irradiance: device.create_shader_module(wgpu::include_wgsl!("../shaders/irradiance.wgsl")),
            prefilter: device.create_shader_module(wgpu::include_wgsl!("../shaders/prefilter.wgsl")),
        }
    }

    fn get(&self, program: Program) -> &ShaderModule {
        match program {
            Program::BrdfLut => &self.brdf_lut,
            Program::Irradiance => &self.irradiance,
            Program::PrefilterEnvironment => &self.prefilter,
        }
    }
}

/// Only the position is read by the convolution programs.
const MODEL_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    format: VertexFormat::Float32x3,
    offset: 0,
    shader_location: 0,
}];

#[derive(Debug)]
pub struct ProgramPipeline {
    pub pipeline: RenderPipeline,
    pub bind_group: Option<BindGroup>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_program_pipeline(
    device: &Device,
    modules: &ShaderModules,
    label: &str,
    program: Program,
    format: TextureFormat,
    vertex_input: VertexInput,
    push_constant_size: u32,
    texture: Option<(&TextureView, &wgpu::Sampler)>,
) -> ProgramPipeline {
    profiling::scope!("build_program_pipeline");
    let sm = modules.get(program);

    let bgl = texture.map(|_| {
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
    });
    let bind_group = bgl.as_ref().zip(texture).map(|(bgl, (view, sampler))| {
        device.create_bind_group(&BindGroupDescriptor {
            label: Some(label),
            layout: bgl,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        })
    });

    let push_constant_ranges = [PushConstantRange {
        stages: ShaderStages::VERTEX_FRAGMENT,
        range: 0..push_constant_size,
    }];
    let layouts: Vec<&BindGroupLayout> = bgl.iter().collect();
    let pll = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &layouts,
        push_constant_ranges: if push_constant_size > 0 {
            &push_constant_ranges
        } else {
            &[]
        },
    });

    let vertex_buffers = [VertexBufferLayout {
        array_stride: Vertex::SIZE as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: &MODEL_ATTRIBUTES,
    }];

    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pll),
        vertex: VertexState {
            module: sm,
            entry_point: "vs_main",
            buffers: match vertex_input {
                VertexInput::None => &[],
                VertexInput::Model => &vertex_buffers,
            },
        },
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        fragment: Some(FragmentState {
            module: sm,
            entry_point: "fs_main",
            targets: &[Some(ColorTargetState {
                format,
                blend: None,
                write_mask: ColorWrites::all(),
            })],
        }),
        multiview: None,
    });

    ProgramPipeline { pipeline, bind_group }
}
