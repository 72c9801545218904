use clap::{Parser, Subcommand};
use std::path::PathBuf;

use keycount::config::RenderOverrides;
use keycount::encoder::Codec;

#[derive(Parser, Debug)]
#[command(name = "keycount")]
#[command(version)]
#[command(about = "Render counter overlay videos from keyframe timestamps", long_about = None)]
pub struct Args {
    /// Settings file (default: ./config.yml, then the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render every clip of a JSON clip file to its own video
    Render {
        /// Clip file: a JSON list of lists of timestamps in seconds
        clips: PathBuf,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Record keyframes from the keyboard
    Capture {
        /// Where the `s` key saves the clips
        #[arg(long, default_value = "clips.json")]
        save: PathBuf,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Print the effective settings as YAML
    Config,

    /// Show the stream header of a rendered video
    Inspect {
        video: PathBuf,
    },
}

/// Per-run replacements for the `output` section of the settings file.
#[derive(clap::Args, Debug, Default)]
pub struct OverrideArgs {
    /// Font file (TrueType/OpenType)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Output file name with one index placeholder, e.g. "counter_{:03}"
    #[arg(long)]
    pub name_template: Option<String>,

    /// Frame width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Font size in pixels
    #[arg(long)]
    pub fontsize: Option<u32>,

    /// Text placed before the counter
    #[arg(long, allow_hyphen_values = true)]
    pub prepend: Option<String>,

    /// Seconds the final count stays on screen
    #[arg(long)]
    pub extend: Option<f64>,

    /// Added to every counter value
    #[arg(long, allow_hyphen_values = true)]
    pub start_at: Option<f64>,

    /// Directory the videos are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Frame codec (DIB or MJPG)
    #[arg(long)]
    pub codec: Option<Codec>,

    /// JPEG quality for MJPG (1-100)
    #[arg(short = 'q', long)]
    pub jpeg_quality: Option<u8>,
}

impl From<OverrideArgs> for RenderOverrides {
    fn from(args: OverrideArgs) -> Self {
        RenderOverrides {
            font: args.font,
            name_template: args.name_template,
            width: args.width,
            height: args.height,
            fps: args.fps,
            fontsize: args.fontsize,
            prepend: args.prepend,
            extend: args.extend,
            start_at: args.start_at,
            output_dir: args.output_dir,
            codec: args.codec,
            jpeg_quality: args.jpeg_quality,
        }
    }
}
