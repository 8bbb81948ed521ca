use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use crossbeam::select;
use env_logger::Env;

use binaural_beats::{
    audio::{devices, output::CpalSinkFactory},
    presets::{self, Category, TIMER_OPTIONS},
    session::{Player, SessionEvent, TICK_INTERVAL},
    EngineEvent, SignalEngine,
};

mod args;
mod visualizer;

use args::{Action, PlayArgs};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    match args::parse_args()? {
        Action::Play(args) => play(args),
        Action::Presets { json } => list_presets(json),
        Action::Devices => list_devices(),
    }
}

fn play(args: PlayArgs) -> Result<()> {
    let engine = Arc::new(SignalEngine::new(CpalSinkFactory::new(&args.device)));
    let player = Player::with_timing(engine.clone(), None, args.fade, TICK_INTERVAL);
    let session_events = player.subscribe(64);
    let engine_events = engine.subscribe_events(16);

    player.set_frequency_volume(args.volume);
    let run = player.play(args.config, args.duration)?;
    println!(
        "[*] Playing `{}` ({} Hz left, {} Hz right)",
        args.label,
        args.config.carrier_hz,
        args.config.right_hz()
    );
    println!(
        "[I] Output `{}` at {} Hz, {} frames per block",
        args.device,
        args.config.sample_rate,
        run.block_frames()
    );

    if args.visualize {
        return visualizer::run(&player, &args.label);
    }

    loop {
        select! {
            recv(session_events) -> event => match event? {
                SessionEvent::TimerTick(left) if !left.is_zero() => {
                    println!("[I] {} left", format_duration(left))
                }
                SessionEvent::FadeStarted => println!("[*] Fading out"),
                SessionEvent::Finished => {
                    println!("[*] Done");
                    return Ok(());
                }
                SessionEvent::Stopped => return Ok(()),
                SessionEvent::PlaybackFailed(reason) => bail!("Playback failed: {reason}"),
                _ => {}
            },
            recv(engine_events) -> event => {
                if let EngineEvent::PlaybackFailed { reason, .. } = event? {
                    bail!("Playback failed: {reason}");
                }
            }
        }
    }
}

fn list_presets(json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "presets": presets::PRESETS,
            "timers": TIMER_OPTIONS,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for category in [Category::Binaural, Category::Solfeggio] {
        println!("[*] {category}");
        for preset in presets::by_category(category) {
            let freqs = if preset.beat_hz > 0.0 {
                format!("{} Hz + {} Hz", preset.carrier_hz, preset.beat_hz)
            } else {
                format!("{} Hz", preset.carrier_hz)
            };
            println!(
                " ├ {:<8} {:<20} {freqs:<16} {}",
                preset.id, preset.name, preset.description
            );
        }
    }

    let timers = TIMER_OPTIONS.iter().map(|x| x.label).collect::<Vec<_>>();
    println!("[I] Timer options: {}", timers.join(", "));
    Ok(())
}

fn list_devices() -> Result<()> {
    let names = devices::output_device_names()?;
    if names.is_empty() {
        println!("[-] No output devices found");
        return Ok(());
    }

    println!("[*] Output devices");
    for name in names {
        println!(" ├ {name}");
    }
    Ok(())
}

/// Formats as `m:ss`, rounding up so the last second reads `0:01`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    format!("{}:{:02}", secs / 60, secs % 60)
}
