use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use kdam::tqdm;
use nalgebra::Vector3;
use tracing::{info, Level};

use fuse3d::camera::CameraIntrinsics;
use fuse3d::io::{dump_volume, open_dataset, write_trajectory_log};
use fuse3d::metrics::TransformMetrics;
use fuse3d::pipeline::{FusionPipeline, PipelineParams};
use fuse3d::render::{render_depth, render_normals, render_track, render_volume};
use fuse3d::trajectory::Trajectory;

/// Fuses a recorded depth sequence into a TSDF volume while tracking the
/// camera.
#[derive(Parser)]
struct Args {
    /// Path to the depth sequence, a packed .raw stream or a PNG directory
    dataset: String,
    /// Camera intrinsics as fx,fy,cx,cy, required for raw streams
    #[clap(long)]
    camera: Option<String>,
    /// Scale from raw depth units to meters, overrides the dataset one
    #[clap(long)]
    depth_scale: Option<f32>,
    /// JSON file overriding the default pipeline parameters
    #[clap(long)]
    config: Option<String>,
    /// Voxels per axis of the cubic reconstruction volume
    #[clap(long)]
    volume_resolution: Option<usize>,
    /// Edge length in meters of the cubic reconstruction volume
    #[clap(long)]
    volume_size: Option<f32>,
    /// ICP iterations per pyramid level as a comma list, coarsest first
    #[clap(long)]
    pyramid: Option<String>,
    /// Downsample factor from input to computation resolution
    #[clap(long)]
    compute_size_ratio: Option<usize>,
    /// Convergence threshold on the pose update norm
    #[clap(long)]
    icp_threshold: Option<f32>,
    /// TSDF truncation distance in meters
    #[clap(long)]
    mu: Option<f32>,
    /// Fuse a frame into the volume every this many frames
    #[clap(long)]
    integration_rate: Option<usize>,
    /// Run ICP every this many frames
    #[clap(long)]
    tracking_rate: Option<usize>,
    /// Emit renderings every this many frames
    #[clap(long)]
    rendering_rate: Option<usize>,
    /// Initial camera position as a fraction of the volume size per axis
    #[clap(long)]
    initial_pose_factor: Option<f32>,
    /// Maximum number of frames to process
    #[clap(long)]
    max_frames: Option<usize>,
    /// Write per-frame statistics to this TSV file
    #[clap(long)]
    log: Option<PathBuf>,
    /// Write depth, tracking, normal and volume views to this directory
    #[clap(long)]
    render_dir: Option<PathBuf>,
    /// Dump the TSDF distances to this file at the end
    #[clap(long)]
    dump_volume: Option<PathBuf>,
    /// Write the estimated camera trajectory to this log file
    #[clap(long)]
    trajectory: Option<PathBuf>,
    /// Log per-frame tracking details
    #[clap(long, short, action)]
    verbose: bool,
}

fn parse_camera(text: &str) -> CameraIntrinsics {
    let values: Vec<f64> = text
        .split(',')
        .map(|token| token.trim().parse().unwrap())
        .collect();
    assert_eq!(values.len(), 4, "expected the camera as fx,fy,cx,cy");
    CameraIntrinsics::from_simple_intrinsic(values[0], values[1], values[2], values[3])
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let dataset = open_dataset(&args.dataset, args.camera.as_deref().map(parse_camera)).unwrap();
    let (width, height) = dataset.image_size();
    let frames = dataset.len().min(args.max_frames.unwrap_or(usize::MAX));

    let mut params: PipelineParams = match args.config.as_ref() {
        Some(path) => {
            serde_json::from_reader(BufReader::new(File::open(path).unwrap())).unwrap()
        }
        None => PipelineParams::default(),
    };
    if let Some(resolution) = args.volume_resolution {
        params.volume_resolution = [resolution; 3];
    }
    if let Some(size) = args.volume_size {
        params.volume_size = [size; 3];
    }
    if let Some(pyramid) = args.pyramid.as_deref() {
        params.pyramid = pyramid
            .split(',')
            .map(|token| token.trim().parse().unwrap())
            .collect();
    }
    if let Some(ratio) = args.compute_size_ratio {
        params.compute_size_ratio = ratio;
    }
    if let Some(threshold) = args.icp_threshold {
        params.icp_threshold = threshold;
    }
    if let Some(mu) = args.mu {
        params.mu = mu;
    }
    if let Some(rate) = args.integration_rate {
        params.integration_rate = rate;
    }
    if let Some(rate) = args.tracking_rate {
        params.tracking_rate = rate;
    }
    if let Some(rate) = args.rendering_rate {
        params.rendering_rate = rate;
    }
    if let Some(factor) = args.initial_pose_factor {
        params.initial_pose_factor = factor;
    }
    if let Some(scale) = args.depth_scale {
        params.depth_scale = scale;
    } else if args.config.is_none() {
        params.depth_scale = dataset.depth_scale();
    }

    let mut pipeline = FusionPipeline::new(params, &dataset.intrinsics(), (height, width)).unwrap();
    info!(frames, width, height, "reconstruction started");

    let mut log_writer = args
        .log
        .as_ref()
        .map(|path| BufWriter::new(File::create(path).unwrap()));
    if let Some(writer) = log_writer.as_mut() {
        writeln!(
            writer,
            "frame\tpreprocessing\ttracking\tintegration\traycasting\tX\tY\tZ\ttracked\tintegrated"
        )
        .unwrap();
    }
    if let Some(dir) = args.render_dir.as_ref() {
        std::fs::create_dir_all(dir).unwrap();
    }

    let initial_position = pipeline.pose().translation();
    let mut trajectory = Trajectory::default();

    for frame in tqdm!(0..frames, desc = "Fusing frames") {
        let depth = dataset.get(frame).unwrap();
        let summary = pipeline.process_frame(&depth.view()).unwrap();
        trajectory.push(summary.pose.clone(), frame as f32);

        if let Some(writer) = log_writer.as_mut() {
            // Positions are logged relative to the starting pose.
            let position = summary.pose.translation() - initial_position;
            writeln!(
                writer,
                "{}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.6}\t{:.6}\t{:.6}\t{}\t{}",
                summary.frame,
                summary.timings.preprocessing.as_secs_f64() * 1000.0,
                summary.timings.tracking.as_secs_f64() * 1000.0,
                summary.timings.integration.as_secs_f64() * 1000.0,
                summary.timings.raycasting.as_secs_f64() * 1000.0,
                position[0],
                position[1],
                position[2],
                summary.tracked as u8,
                summary.integrated as u8
            )
            .unwrap();
        }

        if let Some(dir) = args.render_dir.as_ref() {
            if frame % pipeline.params().rendering_rate == 0 {
                let near = pipeline.params().near_plane;
                let far = pipeline.params().far_plane;
                let mu = pipeline.params().mu;
                render_depth(&pipeline.filtered_depth().view(), near, far)
                    .save(dir.join(format!("depth_{frame:05}.png")))
                    .unwrap();
                render_track(&pipeline.tracker().correspondences())
                    .save(dir.join(format!("track_{frame:05}.png")))
                    .unwrap();
                render_normals(pipeline.reference())
                    .save(dir.join(format!("normals_{frame:05}.png")))
                    .unwrap();
                render_volume(
                    pipeline.volume(),
                    &pipeline.camera(),
                    near,
                    far * 2.0,
                    mu,
                    &Vector3::new(1.0, 1.0, -1.0),
                    0.1,
                )
                .save(dir.join(format!("volume_{frame:05}.png")))
                .unwrap();
            }
        }
    }

    let motion = TransformMetrics::accumulated_motion(&trajectory);
    info!("accumulated motion: {motion}");
    if trajectory.len() > 1 {
        let net = TransformMetrics::new(&trajectory[0], &trajectory[trajectory.len() - 1]);
        info!("start to end: {net}");
    }

    if let Some(path) = args.trajectory.as_ref() {
        write_trajectory_log(&trajectory, path).unwrap();
        info!("trajectory written to {}", path.display());
    }
    if let Some(path) = args.dump_volume.as_ref() {
        dump_volume(pipeline.volume(), path).unwrap();
        info!("volume dumped to {}", path.display());
    }
}
