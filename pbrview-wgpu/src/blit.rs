//! Scaled image blits, rendered as a full screen triangle sampling the source.

use std::sync::Arc;

use parking_lot::RwLock;
use pbrview::types::gpu::{Filter, ImageBlit};
use wgpu::{
    AddressMode, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingResource, BindingType, Color, ColorTargetState, ColorWrites, CommandEncoder, Device, FilterMode,
    FragmentState, FrontFace, LoadOp, MultisampleState, Operations, PipelineLayout, PipelineLayoutDescriptor,
    PolygonMode, PrimitiveState, PrimitiveTopology, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, Sampler, SamplerBindingType, SamplerDescriptor, ShaderModule, ShaderStages, StoreOp,
    Texture, TextureFormat, TextureSampleType, TextureViewDescriptor, TextureViewDimension, VertexState,
};

use crate::FastHashMap;

pub struct Blitter {
    bgl: BindGroupLayout,
    linear: Sampler,
    nearest: Sampler,
    sm: ShaderModule,
    pll: PipelineLayout,
    pipelines: RwLock<FastHashMap<TextureFormat, Arc<RenderPipeline>>>,
}

impl Blitter {
    pub fn new(device: &Device) -> Self {
        profiling::scope!("Blitter::new");

        let bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("blit bgl"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
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
        });

        let sampler = |label, filter| {
            device.create_sampler(&SamplerDescriptor {
                label: Some(label),
                address_mode_u: AddressMode::ClampToEdge,
                address_mode_v: AddressMode::ClampToEdge,
                address_mode_w: AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear = sampler("blit linear sampler", FilterMode::Linear);
        let nearest = sampler("blit nearest sampler", FilterMode::Nearest);

        let sm = device.create_shader_module(wgpu::include_wgsl!("../shaders/blit.wgsl"));

        let pll = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("blit pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        Self {
            bgl,
            linear,
            nearest,
            sm,
            pll,
            pipelines: RwLock::new(FastHashMap::default()),
        }
    }

    fn build_blit_pipeline(
        device: &Device,
        format: TextureFormat,
        pll: &PipelineLayout,
        sm: &ShaderModule,
    ) -> RenderPipeline {
        let label = format!("blit pipeline {:?}", format);
        profiling::scope!("build_blit_pipeline");
        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(pll),
            vertex: VertexState {
                module: sm,
                entry_point: "vs_main",
                buffers: &[],
            },
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Cw,
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
        })
    }

    fn pipeline(&self, device: &Device, format: TextureFormat) -> Arc<RenderPipeline> {
        if let Some(pipeline) = self.pipelines.read().get(&format) {
            return Arc::clone(pipeline);
        }
        let mut pipelines = self.pipelines.write();
        let pipeline = pipelines
            .entry(format)
            .or_insert_with(|| Arc::new(Self::build_blit_pipeline(device, format, &self.pll, &self.sm)));
        Arc::clone(pipeline)
    }

    /// Draws `region.src_mip` of `src` scaled onto `region.dst_mip` of `dst`.
    pub fn blit(&self, device: &Device, encoder: &mut CommandEncoder, src: &Texture, dst: &Texture, region: &ImageBlit) {
        profiling::scope!("blit");
        let single = |mip, layer| TextureViewDescriptor {
            label: None,
            dimension: Some(TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        };
        let src_view = src.create_view(&single(region.src_mip, region.src_layer));
        let dst_view = dst.create_view(&single(region.dst_mip, region.dst_layer));

        let sampler = match region.filter {
            Filter::Linear => &self.linear,
            Filter::Nearest => &self.nearest,
        };
        let bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("blit bg"),
            layout: &self.bgl,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&src_view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        });
        let pipeline = self.pipeline(device, dst.format());

        let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("blit"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &dst_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(Color::BLACK),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        rpass.set_pipeline(&pipeline);
        rpass.set_bind_group(0, &bg, &[]);
        rpass.draw(0..3, 0..1);
    }
}
