use std::{fs::File, path::Path};

use anyhow::Context;
use hound::WavWriter;
use rubato::{FftFixedInOut, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::{
    error::{Result, StemError},
    types::AudioData,
};

const RESAMPLE_CHUNK: usize = 1024;

/// Decodes any container symphonia knows into interleaved f32 samples at
/// the file's native rate.
pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path: &Path = path.as_ref();
    let decode_err = |reason: String| StemError::Decode {
        input: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| decode_err(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| decode_err("no default track".into()))?;
    let track_id = track.id;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = 0;
    let mut channels: u16 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // A corrupt frame is skipped; the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(decode_err("no audio frames".into()));
    }

    debug!(sample_rate, channels, samples = samples.len(), "read audio");

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

/// Resamples interleaved audio to `to_rate`, keeping the channel layout.
pub fn resample(audio: &AudioData, to_rate: u32) -> Result<AudioData> {
    if audio.sample_rate == to_rate {
        return Ok(audio.clone());
    }

    let channels = audio.channels.max(1) as usize;
    let frames = audio.frames();

    let mut resampler = FftFixedInOut::<f32>::new(
        audio.sample_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        channels,
    )
    .context("resampler construction")?;

    let chunk_in = resampler.input_frames_next();
    // The output chunk equals the FFT output size, and the sinc filter
    // lags by half of it.
    let delay = resampler.output_frames_next() / 2;
    let ratio = to_rate as f64 / audio.sample_rate as f64;
    let out_frames = (frames as f64 * ratio).round() as usize;

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|ch| {
            audio
                .samples
                .iter()
                .skip(ch)
                .step_by(channels)
                .copied()
                .collect()
        })
        .collect();

    let mut out: Vec<Vec<f32>> =
        vec![Vec::with_capacity(delay + out_frames + RESAMPLE_CHUNK); channels];
    let mut pos = 0;
    // Keep feeding zero chunks until the filter delay has flushed through.
    while out[0].len() < delay + out_frames || pos < frames {
        let chunk: Vec<Vec<f32>> = planar
            .iter()
            .map(|ch| {
                let mut c: Vec<f32> = ch.iter().skip(pos).take(chunk_in).copied().collect();
                c.resize(chunk_in, 0.0);
                c
            })
            .collect();
        let processed = resampler
            .process(&chunk, None)
            .context("resampling")?;
        for (dst, src) in out.iter_mut().zip(processed) {
            dst.extend(src);
        }
        pos += chunk_in;
    }

    let mut samples = Vec::with_capacity(out_frames * channels);
    // The first `delay` output frames are filter warm-up, not signal.
    for i in delay..delay + out_frames {
        for ch in out.iter() {
            samples.push(ch[i]);
        }
    }

    Ok(AudioData {
        samples,
        sample_rate: to_rate,
        channels: channels as u16,
    })
}

/// 16-bit PCM WAV writer.
pub fn write_wav(path: &Path, audio: &AudioData) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for sample in &audio.samples {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }

    writer.finalize()?;
    Ok(())
}
