//! cpal binding for the filter engine.
//!
//! cpal has no duplex callback, so full duplex is modeled as an input
//! stream and an output stream bridged by a wait-free sample ring. The
//! output callback owns the engine outright: it pops whatever input frames
//! have arrived and runs `process_block` with them, which keeps a single
//! mutator for the delay line and both cursors. Clock drift between the two
//! devices shows up as a frame-count mismatch the engine already handles.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

use crate::engine::FilterEngine;
use crate::queue::{spsc_channel, Consumer, Producer};

/// Bridge depth between the capture and playback callbacks, in seconds.
/// Deep enough to ride out scheduling jitter, shallow enough to add no
/// meaningful latency on top of the delay line.
const BRIDGE_SECONDS: f64 = 1.0;

/// Largest device period we pre-size the pop scratch for.
const MAX_BLOCK_FRAMES: usize = 8192;

/// Keeps the paired streams alive; dropping it stops the audio device.
pub struct DuplexStream {
    _input: Stream,
    _output: Stream,
}

/// Pair `input_device` and `output_device` around `engine` and start both
/// streams.
///
/// Both devices are opened at the engine's sample rate and channel count;
/// a device that cannot satisfy them is a fatal start error.
pub fn run_duplex(
    engine: FilterEngine,
    input_device: &Device,
    output_device: &Device,
) -> crate::Result<DuplexStream> {
    let params = engine.params();
    let config = StreamConfig {
        channels: params.channels as u16,
        sample_rate: cpal::SampleRate(params.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let bridge_capacity =
        (params.sample_rate as f64 * BRIDGE_SECONDS) as usize * params.channels;
    let (bridge_tx, bridge_rx) = spsc_channel::<f32>(bridge_capacity);

    let input = build_input_stream(input_device, &config, bridge_tx)?;
    let output = build_output_stream(output_device, &config, bridge_rx, engine)?;

    input
        .play()
        .map_err(|e| crate::AudioError::StreamError(format!("failed to start input: {e}")))?;
    output
        .play()
        .map_err(|e| crate::AudioError::StreamError(format!("failed to start output: {e}")))?;

    tracing::info!(
        sample_rate = params.sample_rate,
        channels = params.channels,
        "duplex streams running"
    );

    Ok(DuplexStream {
        _input: input,
        _output: output,
    })
}

fn build_input_stream(
    device: &Device,
    config: &StreamConfig,
    mut bridge_tx: Producer<f32>,
) -> crate::Result<Stream> {
    let supported = device.default_input_config().map_err(|e| {
        crate::AudioError::StreamError(format!("failed to get input config: {e}"))
    })?;

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| {
                for &sample in data {
                    // A full bridge means the output side has stalled;
                    // dropping here is the only non-blocking option.
                    if !bridge_tx.push(sample) {
                        break;
                    }
                }
            },
            |err| tracing::error!("input stream error: {err}"),
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| {
                for &sample in data {
                    if !bridge_tx.push(sample as f32 / 32768.0) {
                        break;
                    }
                }
            },
            |err| tracing::error!("input stream error: {err}"),
            None,
        )?,
        format => {
            return Err(crate::AudioError::StreamError(format!(
                "unsupported input sample format: {format:?}"
            )));
        }
    };

    Ok(stream)
}

fn build_output_stream(
    device: &Device,
    config: &StreamConfig,
    mut bridge_rx: Consumer<f32>,
    mut engine: FilterEngine,
) -> crate::Result<Stream> {
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; MAX_BLOCK_FRAMES * channels];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _| {
            let wanted = data.len().min(scratch.len());

            // Pop whole frames only; a partial frame would shift every
            // later channel by one slot.
            let available = bridge_rx.len();
            let take = wanted.min(available - available % channels);
            for slot in scratch.iter_mut().take(take) {
                *slot = bridge_rx.pop().unwrap_or(0.0);
            }

            engine.process_block(&scratch[..take], data);
        },
        |err| tracing::error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
