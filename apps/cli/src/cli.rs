use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Streaming voice conversion.
#[derive(Parser, Debug)]
#[command(name = "timbre", author, version, about, long_about = None)]
pub struct Cli {
    /// Machine-readable output: JSON logs and JSON device lists
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the WebSocket conversion endpoint
    Serve(ServeArgs),
    /// Convert the microphone live and play the result
    Live(LiveArgs),
    /// Convert a WAV file through the streaming pipeline
    Convert(ConvertArgs),
    /// List audio input and output devices
    Devices,
}

/// Options shared by every command that runs a conversion session.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Directory of reference voice recordings
    #[arg(long, env = "TIMBRE_VOICES_DIR", default_value = "voices")]
    pub voices_dir: PathBuf,

    /// JSON file with session settings; unspecified fields keep their defaults
    #[arg(long, env = "TIMBRE_PRESET")]
    pub preset: Option<PathBuf>,

    /// Model output sample rate
    #[arg(long, env = "TIMBRE_OUTPUT_RATE", default_value_t = 22050)]
    pub output_rate: u32,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    #[arg(long, env = "TIMBRE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "TIMBRE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Seconds of audio converted per chunk
    #[arg(long)]
    pub chunk_seconds: Option<f32>,

    /// Gate conversion on detected speech
    #[arg(long)]
    pub vad: bool,
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Target voice id
    #[arg(short, long)]
    pub voice: String,

    /// Input device name (see `timbre devices`)
    #[arg(long)]
    pub input_device: Option<String>,

    /// Output device name
    #[arg(long)]
    pub output_device: Option<String>,

    /// Device sample rate; defaults to the input device's rate
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Seconds of new audio per block
    #[arg(long)]
    pub block_seconds: Option<f32>,

    /// Convert every block, speech or not
    #[arg(long)]
    pub no_vad: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<f32>,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Target voice id
    #[arg(short, long)]
    pub voice: String,

    /// Source WAV file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Destination WAV file (16-bit mono at the model output rate)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Seconds of new audio per block
    #[arg(long)]
    pub block_seconds: Option<f32>,

    /// Gate conversion on detected speech
    #[arg(long)]
    pub vad: bool,
}
