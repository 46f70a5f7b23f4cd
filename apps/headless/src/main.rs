//! Headless runner for the filter pipeline.
//!
//! Routes a virtual-cable input through the delay-line filter to the
//! default output and prints pipeline events until Enter is pressed.
//! Usage:
//!
//!   bleep devices                 list audio devices
//!   bleep run [config.json]      run the pipeline (Enter stops it)

use std::path::Path;
use std::sync::Arc;

use bleep_application::{FilterConfig, PipelineHandle};
use bleep_audio::{list_devices, DeviceDirection};
use bleep_events::{ChannelBus, UiEvent};
use bleep_media::NullProvider;
use bleep_stt::NullRecognizer;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bleep=debug")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");

    match command {
        "devices" => print_devices(),
        "run" => run(args.get(2).map(Path::new)),
        other => {
            eprintln!("unknown command: {other}");
            eprintln!("usage: bleep [devices | run [config.json]]");
            std::process::exit(2);
        }
    }
}

fn print_devices() {
    for direction in [DeviceDirection::Input, DeviceDirection::Output] {
        let label = match direction {
            DeviceDirection::Input => "Input devices",
            DeviceDirection::Output => "Output devices",
        };
        println!("{label}:");
        match list_devices(direction) {
            Ok(devices) => {
                for device in devices {
                    println!(
                        "  {}{}{}",
                        device.name,
                        if device.is_default { " (default)" } else { "" },
                        if device.is_virtual() { " [virtual]" } else { "" },
                    );
                }
            }
            Err(error) => eprintln!("  failed to list: {error}"),
        }
    }
}

fn run(config_path: Option<&Path>) {
    let config = match config_path {
        Some(path) => match FilterConfig::load(path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("failed to load {}: {error}", path.display());
                std::process::exit(1);
            }
        },
        None => FilterConfig::default(),
    };

    let (bus, events) = ChannelBus::new();

    // The recognizer model is an external collaborator; without one wired
    // in, the pipeline runs as a pure delayed passthrough.
    let handle = match PipelineHandle::start(
        &config,
        Box::new(NullRecognizer),
        Arc::new(NullProvider),
        Arc::new(bus),
    ) {
        Ok(handle) => handle,
        Err(error) => {
            eprintln!("failed to start pipeline: {error}");
            std::process::exit(1);
        }
    };

    // Event printer; exits when the pipeline drops the sending side.
    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                UiEvent::Censorship {
                    text,
                    mode,
                    applied,
                    ..
                } => {
                    println!(
                        "[censor] \"{text}\" {} ({mode})",
                        if applied { "rewritten" } else { "SKIPPED" }
                    );
                }
                UiEvent::SongMetadata { artist, title, .. } => {
                    println!("[song] {artist} - {title}");
                }
                UiEvent::Underrun { active } => {
                    println!("[buffer] underrun {}", if active { "begin" } else { "end" });
                }
                UiEvent::RawTranscript { text } => println!("[heard] {text}"),
                UiEvent::AlignedTranscript { text } => println!("[lyrics] {text}"),
                _ => {}
            }
        }
    });

    println!("pipeline running; press Enter to stop");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    let report = handle.stop();
    let _ = printer.join();
    println!("{report}");
}
