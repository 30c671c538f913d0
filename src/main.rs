// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use loopscan::config::{Action, SamplerConfig, Script};
use loopscan::engine::Controls;
use loopscan::host::OfflineHost;
use loopscan::protocol::atom::encode_sequence;
use loopscan::protocol::{Message, Notification, TimedEvent, Urids};
use loopscan::sample::SampleStore;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A loop-scanning sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renders a script of controller actions to a mono WAV file.
    Render {
        /// The path to the sampler config.
        config_path: PathBuf,
        /// The path to the script (YAML or JSON).
        script_path: PathBuf,
        /// Where to write the rendered audio.
        output_path: PathBuf,
        /// A session file to restore before the first block.
        #[arg(short, long)]
        restore: Option<PathBuf>,
        /// A session file to save after the last block.
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// Loads an audio file and prints its metadata, or why it can't be used.
    Inspect {
        /// The path to the audio file.
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            config_path,
            script_path,
            output_path,
            restore,
            save,
        } => render(
            &config_path,
            &script_path,
            &output_path,
            restore.as_deref(),
            save.as_deref(),
        )?,
        Commands::Inspect { path } => inspect(&path)?,
    }

    Ok(())
}

fn render(
    config_path: &Path,
    script_path: &Path,
    output_path: &Path,
    restore: Option<&Path>,
    save: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let config = SamplerConfig::deserialize(config_path)?;
    let script = Script::deserialize(script_path)?;
    let mut host = OfflineHost::new(&config)?;
    if let Some(restore) = restore {
        host.restore_from(restore)?;
    }

    let urids = Urids::new(host.urid_map());
    let mut writer = WavWriter::create(
        output_path,
        WavSpec {
            channels: 1,
            sample_rate: config.sample_rate(),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let mut controls = Controls {
        start: script.start(),
        step: script.step(),
    };
    let mut output = vec![0.0f32; config.block_size()];
    let mut events = Vec::new();
    let mut bytes = Vec::new();
    let mut pending = script.events().iter().peekable();

    for block in 0..script.blocks() {
        events.clear();
        while let Some(event) = pending.next_if(|event| event.block == block) {
            match &event.action {
                Action::Controls { start, step } => {
                    controls = Controls {
                        start: *start,
                        step: *step,
                    };
                }
                action => {
                    if let Some(message) = to_message(action, config.bundle_path()) {
                        events.push(TimedEvent::new(event.offset, message.encode(&urids)));
                    }
                }
            }
        }

        bytes.clear();
        if !events.is_empty() {
            encode_sequence(&events, &mut bytes);
        }
        for notification in host.run_block(controls, &bytes, &mut output) {
            match &notification.body {
                Notification::SamplePath(path) => {
                    info!(block, offset = notification.frames, path = ?path, "Sample path")
                }
            }
        }
        for sample in &output {
            writer.write_sample(*sample)?;
        }
    }
    writer.finalize()?;

    if let Some(save) = save {
        host.save_to(save)?;
    }
    println!(
        "Rendered {} blocks of {} frames to {} (sample: {}, swaps: {}, dropped messages: {})",
        script.blocks(),
        config.block_size(),
        output_path.display(),
        host.engine().current_sample().source_path().display(),
        host.engine().generation(),
        host.engine().dropped_messages(),
    );
    host.shutdown();

    Ok(())
}

/// The message a controller would send for an action. Control changes are not
/// messages; they feed the continuous controls instead.
fn to_message(action: &Action, bundle: &Path) -> Option<Message> {
    match action {
        Action::TriggerOn { key, velocity } => Some(Message::TriggerOn {
            key: *key,
            velocity: *velocity,
        }),
        Action::TriggerOff { key } => Some(Message::TriggerOff { key: *key }),
        Action::SetSample { path } => Some(Message::SetSamplePath(bundle.join(path))),
        Action::SetGain { db } => Some(Message::SetGain(*db)),
        Action::Get => Some(Message::Get),
        Action::Controls { .. } => None,
    }
}

fn inspect(path: &Path) -> Result<(), Box<dyn Error>> {
    let sample = SampleStore::new().load(path)?;

    println!("{}:", sample.source_path().display());
    println!("- channels: {}", sample.channel_count());
    println!("- frames: {}", sample.frame_count());
    println!("- sample rate: {}", sample.sample_rate());
    println!("- duration: {:.3}s", sample.duration().as_secs_f64());
    println!("- memory: {} bytes", sample.memory_size());
    Ok(())
}
