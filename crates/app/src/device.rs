//! Real-time output through the default cpal device.

use std::{thread, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use sonify_core::{
    AudioConfig, AudioEngine, FrameRequest, MixerOutput, PlaybackScheduler, SonificationEvent,
    SonifyError,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Opens the default output and returns the running stream with the mixer
/// feeding it. The stream stops when dropped.
fn open_output() -> sonify_core::Result<(cpal::Stream, MixerOutput)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SonifyError::unavailable("no audio output device found"))?;
    let config = device
        .default_output_config()
        .map_err(|err| SonifyError::unavailable(format!("failed to get output config: {err}")))?;

    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(SonifyError::unavailable(format!(
            "unsupported device sample format {:?}",
            config.sample_format()
        )));
    }

    let channels = usize::from(config.channels());
    let mixer = MixerOutput::new(config.sample_rate().0);
    let feed = mixer.clone();

    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate = config.sample_rate().0,
        channels,
        "opened output device"
    );

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                feed.fill_interleaved(data, channels);
            },
            |err| tracing::error!(%err, "audio stream error"),
            None,
        )
        .map_err(|err| SonifyError::unavailable(format!("failed to build stream: {err}")))?;
    stream
        .play()
        .map_err(|err| SonifyError::unavailable(format!("failed to start stream: {err}")))?;

    Ok((stream, mixer))
}

/// Plays `events` to completion, sampling progress once per frame interval.
pub fn play(config: &AudioConfig, events: &[SonificationEvent]) -> sonify_core::Result<()> {
    let (_stream, mixer) = open_output()?;
    let mut scheduler = PlaybackScheduler::from_config(AudioEngine::new(mixer), config);
    let handle = scheduler.start(events)?;

    let mut reported = 0;
    scheduler.on_progress(handle, move |progress| {
        let decile = (progress * 10.0) as u32;
        if decile > reported {
            reported = decile;
            tracing::info!(percent = decile * 10, "playing");
        }
    })?;
    scheduler.on_complete(handle, || tracing::info!("playback finished"))?;

    while scheduler.tick() == FrameRequest::Continue {
        thread::sleep(FRAME_INTERVAL);
    }
    Ok(())
}
