//! chipsynth - demo song player
//!
//! Run with: cargo run

use chipsynth::{Song, Synth};
use color_eyre::eyre::eyre;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no audio output device available"))?;
    let config = device.default_output_config()?;
    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(eyre!(
            "unsupported sample format {:?}",
            config.sample_format()
        ));
    }
    let config: cpal::StreamConfig = config.into();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0 as f64;

    let mut synth = Synth::new(Song::demo(), sample_rate);
    synth.play();

    let mut left = vec![0.0f32; 4096];
    let mut right = vec![0.0f32; 4096];
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _| {
            let frames = data.len() / channels;
            let mut done = 0;
            while done < frames {
                let run = (frames - done).min(left.len());
                synth.render(&mut left[..run], &mut right[..run]);
                for i in 0..run {
                    let frame = &mut data[(done + i) * channels..(done + i + 1) * channels];
                    frame[0] = left[i];
                    if channels > 1 {
                        frame[1] = right[i];
                    }
                    for sample in frame.iter_mut().skip(2) {
                        *sample = 0.0;
                    }
                }
                done += run;
            }
        },
        |err| eprintln!("stream error: {err}"),
        None,
    )?;
    stream.play()?;

    println!("playing the demo song at {sample_rate} Hz; press Ctrl-C to quit");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}
