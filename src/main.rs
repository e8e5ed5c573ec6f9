// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use depthcam::backends::camera::types::Facing;
use depthcam::config::Config;
use depthcam::pipelines::depth::Colormap;
use depthcam::pipelines::photo::DisplayMode;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depthcam")]
#[command(about = "Live depth camera preview and depth photo viewer")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/depthcam/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras and their depth formats
    List,

    /// Run the live depth preview
    Live {
        /// Camera side to start with
        #[arg(short, long)]
        facing: Option<Facing>,

        /// Visualize disparity instead of depth
        #[arg(long)]
        disparity: bool,

        /// Histogram-equalize the visualization
        #[arg(short, long)]
        equalize: bool,

        /// Color mapping for depth
        #[arg(long)]
        colormap: Option<Colormap>,

        /// Stop after this many captured frames
        #[arg(long)]
        frames: Option<u64>,

        /// Stop after this many seconds (Ctrl+C stops an unbounded run)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Switch to the other camera after this many seconds
        #[arg(long)]
        switch_after: Option<u64>,

        /// Render through a wgpu texture instead of the offscreen canvas
        #[arg(long)]
        gpu: bool,

        /// PNG file for the last rendered frame (default: timestamped in the output folder)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a depth photo bundle to PNG
    Photo {
        /// Bundle directory or its manifest.json
        manifest: PathBuf,

        /// What to render
        #[arg(short, long, default_value = "depth")]
        mode: DisplayMode,

        /// Color mapping for depth
        #[arg(long)]
        colormap: Option<Colormap>,

        /// Histogram-equalize the visualization
        #[arg(short, long)]
        equalize: bool,

        /// Output file path (default: timestamped in the output folder)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depthcam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Live {
            facing,
            disparity,
            equalize,
            colormap,
            frames,
            duration,
            switch_after,
            gpu,
            output,
        } => {
            let mut config = config;
            if let Some(facing) = facing {
                config.facing = facing;
            }
            if let Some(colormap) = colormap {
                config.colormap = colormap;
            }
            config.use_disparity |= disparity;
            config.apply_equalization |= equalize;

            cli::run_live(
                &config,
                cli::LiveLimits {
                    frames,
                    duration,
                    switch_after,
                },
                gpu,
                output,
            )
        }
        Commands::Photo {
            manifest,
            mode,
            colormap,
            equalize,
            output,
        } => cli::render_photo(
            &config,
            &manifest,
            mode,
            colormap.unwrap_or(config.colormap),
            equalize || config.apply_equalization,
            output,
        ),
    }
}
