/*
 Copyright (c) 2024 clone206

 This file is part of st2surround

 st2surround is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 st2surround is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with st2surround. If not, see <https://www.gnu.org/licenses/>.
*/

use std::path::PathBuf;

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{info, warn};

use st2surround::{
    ChannelSetup, ColorLogger, InputContext, MyError, MyResult, OutputContext, TermResult,
    UpmixContext, UpmixParams,
};

#[derive(Parser)]
#[command(
    name = "st2surround",
    about = "Upmix stereo audio to discrete multichannel surround",
    version
)]
struct Cli {
    /// Input WAV files (use - for stdin; stdin expects raw interleaved
    /// stereo 32-bit float samples at the --rate sample rate)
    #[arg(name = "FILES")]
    files: Vec<String>,

    /// Output channel setup, e.g. cs_5point1, cs_7point1,
    /// cs_16point1. Overrides --channels
    #[arg(short = 'S', long = "setup")]
    setup: Option<String>,

    /// Pick the setup by speaker count (2-8) instead of by name
    #[arg(short = 'c', long = "channels", default_value = "6")]
    channels: usize,

    /// Processing block size in frames. Must be a power of two;
    /// decoding latency is half a block
    #[arg(short = 's', long = "block", default_value = "2048")]
    block_size: usize,

    /// Input sample rate in Hz. Only used when reading from stdin
    #[arg(short = 'r', long = "rate", default_value = "48000")]
    rate: u32,

    /// Output bit depth: 16, 24 (fixed integer), or 32 (float)
    #[arg(short = 'b', long = "bitdepth", default_value = "24")]
    bit_depth: i32,

    /// Output type: S (stdout, raw interleaved frames), W (wave file
    /// named <basename>.upmix.wav, or output.wav when reading stdin)
    #[arg(short = 'o', long = "output", default_value = "W")]
    output: char,

    /// Output directory for converted files. Must already exist
    /// [default: same as input file]
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,

    /// Volume level adjustment in dB. Can be negative with the
    /// long form, e.g. --level=-3
    #[arg(short = 'l', long = "level", default_value = "0.0", allow_hyphen_values = true)]
    level: f64,

    /// Presence of the center speaker
    #[arg(long = "center-image", default_value = "0.7")]
    center_image: f64,

    /// Forward/backward offset of the soundstage, -1 to 1
    #[arg(long = "shift", default_value = "0.0", allow_hyphen_values = true)]
    shift: f64,

    /// Backward stretch of the soundstage, 0 to 5; 1 is neutral
    #[arg(long = "depth", default_value = "1.0")]
    depth: f64,

    /// Angle of the front soundstage in degrees; 90 is neutral
    #[arg(long = "circular-wrap", default_value = "90.0")]
    circular_wrap: f64,

    /// Localization of sound events, -1 (diffuse) to 1 (pinpoint)
    #[arg(long = "focus", default_value = "0.0", allow_hyphen_values = true)]
    focus: f64,

    /// Front stereo separation; 1 is neutral
    #[arg(long = "front-sep", default_value = "1.0")]
    front_sep: f64,

    /// Rear stereo separation; 1 is neutral
    #[arg(long = "rear-sep", default_value = "1.0")]
    rear_sep: f64,

    /// Lower cutoff of the LFE band in Hz
    #[arg(long = "bass-lo", default_value = "40.0")]
    bass_lo: f64,

    /// Upper cutoff of the LFE band in Hz
    #[arg(long = "bass-hi", default_value = "90.0")]
    bass_hi: f64,

    /// Redirect bass into the LFE channel
    #[arg(long = "use-lfe")]
    use_lfe: bool,

    /// Suppress all messages
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Print diagnostic messages
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

// fallback table when only a speaker count is given
fn setup_for_channels(channels: usize) -> MyResult<ChannelSetup> {
    let choices = [
        ChannelSetup::Stereo,
        ChannelSetup::Stereo,
        ChannelSetup::Stereo3,
        ChannelSetup::Surround41,
        ChannelSetup::Surround51,
        ChannelSetup::Surround51,
        ChannelSetup::Surround61,
        ChannelSetup::Surround71,
    ];
    if !(1..=choices.len()).contains(&channels) {
        return Err(MyError::Message(format!(
            "No setup for {} speakers; use --setup for the larger layouts",
            channels
        )));
    }
    Ok(choices[channels - 1])
}

fn main() -> TermResult {
    TermResult(run())
}

fn run() -> MyResult<()> {
    let cli = Cli::parse();

    let logger = ColorLogger::new(cli.quiet, cli.verbose);
    let max_level = logger.level();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger)
        .try_init()
        .map_err(|e| MyError::Message(format!("Failed to initialize logger: {}", e)))?;
    log::set_max_level(max_level);

    let setup = match &cli.setup {
        Some(name) => name.parse::<ChannelSetup>()?,
        None => setup_for_channels(cli.channels)?,
    };

    let params = UpmixParams {
        setup,
        center_image: cli.center_image,
        shift: cli.shift,
        depth: cli.depth,
        circular_wrap: cli.circular_wrap,
        focus: cli.focus,
        front_sep: cli.front_sep,
        rear_sep: cli.rear_sep,
        bass_lo: cli.bass_lo,
        bass_hi: cli.bass_hi,
        use_lfe: cli.use_lfe,
    };

    let inputs = if cli.files.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.files.clone()
    };

    for input in inputs {
        if input.contains('*') {
            warn!(
                "Unexpanded glob pattern detected in input: \"{}\". Skipping.",
                input
            );
            continue;
        }

        let in_ctx = InputContext::new(input.clone(), cli.rate)?;
        let out_ctx = OutputContext::new(cli.bit_depth, cli.output, cli.level, cli.path.clone())?;

        let bar = in_ctx.frames.filter(|_| !cli.quiet).map(|total| {
            let bar = multi.add(ProgressBar::new(total));
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:32}] {percent:>3}% ({eta})",
                )
                .expect("valid progress template")
                .progress_chars("=> "),
            );
            bar.set_message(input.clone());
            bar
        });

        let upmix = UpmixContext::new(in_ctx, out_ctx, params.clone(), cli.block_size);
        let progress = |frames: u64| {
            if let Some(bar) = &bar {
                bar.set_position(frames);
            }
        };
        let stats = upmix.run(Some(&progress))?;

        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        if stats.clipped_samples > 0 {
            info!(
                "{}: {} clipped samples; try --level=-3",
                input, stats.clipped_samples
            );
        }
    }

    Ok(())
}
