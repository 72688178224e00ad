use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{bail, Context};
use pbrview::{GpuBackend, HeadlessBackend, Model};
use pbrview_gltf::LoaderOptions;
use pbrview_ibl::{load_environment_ktx2, skybox_cube, EnvironmentMaps, IblSettings};
use pico_args::Arguments;

const HELP: &str = "\
scene-inspector

USAGE:
    scene-inspector [OPTIONS] <FILE>

OPTIONS:
    --gpu                     Run on a wgpu device instead of the headless backend
    -b, --backend NAME        wgpu backend to use: vulkan, dx12, metal or gl
    -d, --device NAME         Substring of the adapter name to pick
    --scale FACTOR            Uniform scale applied to the scene roots [default: 1.0]
    --scene INDEX             Scene to load instead of the default scene
    --animation INDEX         Animation to play [default: 0]
    --animate SECONDS         Play the animation for this long
    --fps N                   Animation frames per second [default: 60]
    --environment FILE.ktx2   Bake lighting textures from this cubemap
    --prefilter-samples N     GGX samples per prefiltered texel [default: 32]
    -h, --help                Print this help
";

fn extract_backend(value: &str) -> Result<wgpu::Backend, &'static str> {
    Ok(match value.to_lowercase().as_str() {
        "vulkan" | "vk" => wgpu::Backend::Vulkan,
        "dx12" | "12" => wgpu::Backend::Dx12,
        "metal" | "mtl" => wgpu::Backend::Metal,
        "opengl" | "gl" => wgpu::Backend::Gl,
        _ => return Err("backend requested but not found"),
    })
}

struct InspectorArgs {
    gpu: bool,
    desired_backend: Option<wgpu::Backend>,
    desired_device: Option<String>,
    loader: LoaderOptions,
    animation: usize,
    animate: Option<f32>,
    fps: u32,
    environment: Option<PathBuf>,
    prefilter_samples: u32,
    file: PathBuf,
}

fn parse_args() -> anyhow::Result<Option<InspectorArgs>> {
    let mut args = Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(None);
    }

    let parsed = InspectorArgs {
        gpu: args.contains("--gpu"),
        desired_backend: args.opt_value_from_fn(["-b", "--backend"], extract_backend)?,
        desired_device: args.opt_value_from_str(["-d", "--device"])?,
        loader: LoaderOptions {
            scale: args.opt_value_from_str("--scale")?.unwrap_or(1.0),
            scene: args.opt_value_from_str("--scene")?,
        },
        animation: args.opt_value_from_str("--animation")?.unwrap_or(0),
        animate: args.opt_value_from_str("--animate")?,
        fps: args.opt_value_from_str("--fps")?.unwrap_or(60),
        environment: args.opt_value_from_os_str("--environment", |s| Ok::<_, String>(PathBuf::from(s)))?,
        prefilter_samples: args.opt_value_from_str("--prefilter-samples")?.unwrap_or(32),
        file: args.free_from_os_str(|s| Ok::<_, String>(PathBuf::from(s)))?,
    };

    let remaining = args.finish();
    if !remaining.is_empty() {
        bail!("unexpected arguments {remaining:?}");
    }
    if parsed.fps == 0 {
        bail!("--fps must be at least 1");
    }
    Ok(Some(parsed))
}

fn print_summary<B: GpuBackend>(model: &Model<B>) {
    println!("nodes:      {}", model.node_count());
    println!("primitives: {}", model.primitive_count());
    if let Some(geometry) = &model.geometry {
        println!("vertices:   {}", geometry.vertex_count);
        println!("indices:    {}", geometry.index_count);
    }
    println!("materials:  {}", model.materials.len());
    println!("textures:   {}", model.textures.len());
    println!("skins:      {}", model.skins.len());
    for (index, animation) in model.animations.iter().enumerate() {
        println!(
            "animation {index} {:?}: {:.3}s..{:.3}s, {} channels",
            animation.name,
            animation.start,
            animation.end,
            animation.channels.len()
        );
    }
    if !model.extensions.is_empty() {
        println!("extensions: {}", model.extensions.join(", "));
    }
    if model.dimensions.valid {
        println!(
            "bounds:     {} .. {} (radius {:.3})",
            model.dimensions.min,
            model.dimensions.max,
            model.dimensions.extent().length() * 0.5
        );
    }
}

fn play<B: GpuBackend>(backend: &B, model: &mut Model<B>, args: &InspectorArgs, seconds: f32) -> anyhow::Result<()> {
    let (start, end) = model.animation_duration(args.animation).with_context(|| {
        format!(
            "animation {} does not exist, the model has {}",
            args.animation,
            model.animations.len()
        )
    })?;
    let frames = (seconds * args.fps as f32).ceil() as u32;
    let duration = (end - start).max(f32::EPSILON);

    let timer = Instant::now();
    for frame in 0..frames {
        profiling::scope!("frame");
        let time = start + (frame as f32 / args.fps as f32) % duration;
        model.update_animation(backend, args.animation, time)?;
    }
    log::info!("played {frames} frames in {:.2?}", timer.elapsed());
    Ok(())
}

fn bake<B: GpuBackend>(backend: &B, path: &Path, args: &InspectorArgs) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading environment {}", path.display()))?;
    let environment = load_environment_ktx2(backend, &data).context("uploading environment cubemap")?;
    let mut skybox = skybox_cube(backend).context("creating skybox cube")?;

    let settings = IblSettings {
        prefilter_samples: args.prefilter_samples,
        ..IblSettings::default()
    };
    let baked = EnvironmentMaps::generate(backend, &settings, &environment, &skybox);
    skybox.destroy(backend);
    match baked {
        Ok(maps) => {
            println!(
                "baked brdf lut {}, irradiance {} and prefiltered {} with {} mips",
                maps.brdf_lut.size.x,
                maps.irradiance.size.x,
                maps.prefiltered.size.x,
                maps.prefiltered_mip_levels()
            );
            maps.destroy(backend);
            environment.destroy(backend);
            Ok(())
        }
        Err(e) => {
            environment.destroy(backend);
            Err(e).context("baking environment maps")
        }
    }
}

fn run<B: GpuBackend>(backend: &B, args: &InspectorArgs) -> anyhow::Result<()> {
    let mut model = pbrview_gltf::load_gltf(backend, &args.file, &args.loader)
        .with_context(|| format!("loading {}", args.file.display()))?;
    print_summary(&model);

    let result = (|| {
        if let Some(seconds) = args.animate {
            play(backend, &mut model, args, seconds)?;
        }
        if let Some(path) = &args.environment {
            bake(backend, path, args)?;
        }
        anyhow::Ok(())
    })();
    model.destroy(backend);
    result
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    if args.gpu {
        let iad = pollster::block_on(pbrview_wgpu::create_iad(
            args.desired_backend,
            args.desired_device.clone(),
        ))
        .context("creating wgpu device")?;
        log::info!("running on {} ({:?})", iad.info.name, iad.info.backend);
        let backend = pbrview_wgpu::WgpuBackend::new(&iad);
        run(&backend, &args)
    } else {
        let backend = HeadlessBackend::new();
        run(&backend, &args)?;
        let stats = backend.stats();
        println!(
            "headless: {} submits, {} render passes, {} draws, {} copies, {} blits, {} barriers",
            stats.submits, stats.render_passes, stats.draws, stats.copies, stats.blits, stats.barriers
        );
        let live = backend.live_resources();
        if live != Default::default() {
            log::warn!("resources leaked: {live:?}");
        }
        Ok(())
    }
}
