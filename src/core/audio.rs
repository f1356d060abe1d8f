use std::{fs::File, path::Path};

use anyhow::{bail, Context, Result};
use hound::WavWriter;
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::types::AudioData;

/// Amount of the vocal stem subtracted from the instrumental.
pub const RESIDUAL_STRENGTH: f32 = 0.2;

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path: &Path = path.as_ref();

    let file: File =
        File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format.default_track().context("No default track found")?;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(e.into()),
        };
        let decoded = decoder.decode(&packet)?;
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend_from_slice(buffer.samples());
    }

    log::debug!(
        "read {}: sample_rate={}, channels={}, samples={}",
        path.display(),
        sample_rate,
        channels,
        samples.len()
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

/// Writes 16-bit PCM WAV, clipping to [-1, 1].
pub fn write_audio(path: &Path, audio: &AudioData) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in &audio.samples {
        let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Subtracts `strength` times the vocal stem from the instrumental stem and
/// writes the clipped result as 16-bit PCM. Stems are truncated to the
/// shorter of the two.
pub fn suppress_residuals(
    instrumental: &Path,
    vocals: &Path,
    output: &Path,
    strength: f32,
) -> Result<()> {
    let inst = read_audio(instrumental)?;
    let voc = read_audio(vocals)?;
    if inst.channels != voc.channels {
        bail!(
            "Stem channel mismatch: instrumental has {}, vocals has {}",
            inst.channels,
            voc.channels
        );
    }
    let ch = inst.channels.max(1) as usize;
    let frames = (inst.samples.len() / ch).min(voc.samples.len() / ch);

    let samples: Vec<f32> = inst.samples[..frames * ch]
        .iter()
        .zip(&voc.samples[..frames * ch])
        .map(|(i, v)| (i - strength * v).clamp(-1.0, 1.0))
        .collect();

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_audio(
        output,
        &AudioData {
            samples,
            sample_rate: inst.sample_rate,
            channels: inst.channels,
        },
    )
}
