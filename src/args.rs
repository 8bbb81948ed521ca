use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use binaural_beats::{
    audio::devices::DEFAULT_DEVICE,
    config::{EngineConfig, FadeConfig},
    presets,
};

pub enum Action {
    Play(PlayArgs),
    Presets { json: bool },
    Devices,
}

pub struct PlayArgs {
    /// What is playing, for the status line.
    pub label: String,
    pub config: EngineConfig,
    pub volume: f32,
    pub duration: Option<Duration>,
    pub fade: FadeConfig,
    pub device: String,
    pub visualize: bool,
}

pub fn parse_args() -> Result<Action> {
    let m = Command::new("binaural-beats")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .subcommands([
            Command::new("play")
                .alias("p")
                .about("Plays a preset or a custom carrier / beat pair.")
                .args([
                    Arg::new("preset")
                        .short('p')
                        .long("preset")
                        .conflicts_with_all(["carrier", "beat"])
                        .help("Preset id or name, see `presets`."),
                    Arg::new("carrier")
                        .short('c')
                        .long("carrier")
                        .value_parser(value_parser!(f64))
                        .help("Left channel frequency in Hz."),
                    Arg::new("beat")
                        .short('b')
                        .long("beat")
                        .requires("carrier")
                        .value_parser(value_parser!(f64))
                        .help("Added to the carrier for the right channel, in Hz. Defaults to 0 (pure tone)."),
                    Arg::new("volume")
                        .short('v')
                        .long("volume")
                        .value_parser(value_parser!(f32))
                        .default_value("0.8")
                        .help("Tone volume from 0 to 1."),
                    Arg::new("minutes")
                        .short('m')
                        .long("minutes")
                        .value_parser(value_parser!(u64))
                        .help("Fade out and stop after this many minutes. Plays until closed if missing."),
                    Arg::new("fade-ms")
                        .long("fade-ms")
                        .value_parser(value_parser!(u64))
                        .default_value("5000")
                        .help("Length of the fade out in milliseconds."),
                    Arg::new("sample-rate")
                        .short('r')
                        .long("sample-rate")
                        .value_parser(value_parser!(u32))
                        .default_value("44100")
                        .help("Output sample rate in Hz."),
                    Arg::new("output-device")
                        .short('o')
                        .long("output-device")
                        .default_value(DEFAULT_DEVICE)
                        .help("Output device, matched by similarity to its name."),
                    Arg::new("visualize")
                        .long("visualize")
                        .action(ArgAction::SetTrue)
                        .help("Draws the live waveform in the terminal."),
                ]),
            Command::new("presets")
                .about("Lists the built-in presets.")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the presets as JSON."),
                ),
            Command::new("devices")
                .alias("d")
                .about("Lists the available output devices."),
        ])
        .get_matches();

    Ok(match m.subcommand() {
        Some(("play", m)) => Action::Play(play_args(m)?),
        Some(("presets", m)) => Action::Presets {
            json: m.get_flag("json"),
        },
        Some(("devices", _)) => Action::Devices,
        _ => bail!("Invalid Subcommand"),
    })
}

fn play_args(m: &ArgMatches) -> Result<PlayArgs> {
    let sample_rate = *m.get_one::<u32>("sample-rate").context("missing sample rate")?;

    let (label, config) = if let Some(name) = m.get_one::<String>("preset") {
        let Some(preset) = presets::find(name) else {
            let ids = presets::PRESETS.iter().map(|x| x.id).collect::<Vec<_>>();
            bail!("Unknown preset `{name}`, expected one of: {}", ids.join(", "));
        };
        (preset.name.to_owned(), preset.config())
    } else if let Some(&carrier) = m.get_one::<f64>("carrier") {
        let beat = m.get_one::<f64>("beat").copied().unwrap_or(0.0);
        (format!("{carrier} Hz + {beat} Hz"), EngineConfig::new(carrier, beat))
    } else {
        bail!("Either --preset or --carrier is required");
    };

    let config = config.with_sample_rate(sample_rate);
    config.validate()?;

    let fade = FadeConfig {
        duration: Duration::from_millis(*m.get_one::<u64>("fade-ms").context("missing fade")?),
        ..FadeConfig::default()
    };

    Ok(PlayArgs {
        label,
        config,
        volume: *m.get_one::<f32>("volume").context("missing volume")?,
        duration: m
            .get_one::<u64>("minutes")
            .map(|&x| Duration::from_secs(x * 60)),
        fade,
        device: m
            .get_one::<String>("output-device")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DEVICE.to_owned()),
        visualize: m.get_flag("visualize"),
    })
}
