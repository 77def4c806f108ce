// Sample format adaptation between a decoded track and the output device
// Channel mapping plus streaming rate conversion with rubato

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::engine::EngineError;

const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Converts interleaved decoder output into interleaved device input.
pub struct FormatAdapter {
    src_channels: usize,
    dst_channels: usize,
    resampler: Option<StreamResampler>,
}

impl FormatAdapter {
    pub fn new(
        src_rate: u32,
        src_channels: usize,
        dst_rate: u32,
        dst_channels: usize,
    ) -> Result<Self, EngineError> {
        let resampler = if src_rate != dst_rate {
            debug!("Resampling {}Hz -> {}Hz", src_rate, dst_rate);
            Some(StreamResampler::new(src_rate, dst_rate, dst_channels)?)
        } else {
            None
        };

        Ok(Self {
            src_channels: src_channels.max(1),
            dst_channels: dst_channels.max(1),
            resampler,
        })
    }

    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, EngineError> {
        let mapped = map_channels(interleaved, self.src_channels, self.dst_channels);
        match self.resampler.as_mut() {
            Some(resampler) => resampler.push(&mapped),
            None => Ok(mapped),
        }
    }

    /// Everything still buffered, zero-padded through the filter delay.
    /// Call once at end of stream.
    pub fn flush(&mut self) -> Result<Vec<f32>, EngineError> {
        match self.resampler.as_mut() {
            Some(resampler) => resampler.flush(),
            None => Ok(Vec::new()),
        }
    }

    /// Forget buffered input (after a seek).
    pub fn reset(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

/// Remap interleaved frames from `src` to `dst` channels.
///
/// Mono is copied to every output channel; otherwise channels are matched by
/// position, extra inputs dropped and missing outputs left silent.
pub fn map_channels(samples: &[f32], src: usize, dst: usize) -> Vec<f32> {
    if src == dst {
        return samples.to_vec();
    }

    let frames = samples.len() / src;
    let mut out = Vec::with_capacity(frames * dst);
    for frame in samples.chunks_exact(src) {
        for ch in 0..dst {
            let value = if src == 1 {
                frame[0]
            } else if ch < src {
                frame[ch]
            } else {
                0.0
            };
            out.push(value);
        }
    }
    out
}

/// Fixed-chunk rubato resampler fed with arbitrarily sized packets.
struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<Vec<f32>>,
    channels: usize,
    ratio: f64,
}

impl StreamResampler {
    fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Result<Self, EngineError> {
        let ratio = dst_rate as f64 / src_rate as f64;
        let inner = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            RESAMPLE_CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| EngineError::Output(format!("failed to create resampler: {}", e)))?;

        Ok(Self {
            inner,
            pending: vec![Vec::new(); channels],
            channels,
            ratio,
        })
    }

    fn push(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, EngineError> {
        for frame in interleaved.chunks_exact(self.channels) {
            for (ch, sample) in frame.iter().enumerate() {
                self.pending[ch].push(*sample);
            }
        }

        let mut out = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let chunk: Vec<&[f32]> = self.pending.iter().map(|ch| &ch[..needed]).collect();
            let planar = self
                .inner
                .process(&chunk, None)
                .map_err(|e| EngineError::Output(format!("resampling failed: {}", e)))?;

            for ch in self.pending.iter_mut() {
                ch.drain(..needed);
            }

            let frames = planar.first().map(|p| p.len()).unwrap_or(0);
            interleave(&planar, frames, &mut out);
        }

        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<f32>, EngineError> {
        let pending = self.pending[0].len();
        let planar = self
            .inner
            .process_partial(Some(self.pending.as_slice()), None)
            .map_err(|e| EngineError::Output(format!("resampling failed: {}", e)))?;

        // The padded chunk is full length; keep the real tail plus the delay
        let wanted = (pending as f64 * self.ratio).round() as usize + self.inner.output_delay();
        let frames = planar.first().map(|p| p.len()).unwrap_or(0).min(wanted);

        let mut out = Vec::with_capacity(frames * self.channels);
        interleave(&planar, frames, &mut out);
        self.reset();
        Ok(out)
    }

    fn reset(&mut self) {
        self.inner.reset();
        for ch in self.pending.iter_mut() {
            ch.clear();
        }
    }
}

fn interleave(planar: &[Vec<f32>], frames: usize, out: &mut Vec<f32>) {
    out.reserve(frames * planar.len());
    for frame in 0..frames {
        for plane in planar.iter() {
            out.push(plane[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let out = map_channels(&[0.1, 0.2, 0.3], 1, 2);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn extra_channels_are_dropped() {
        let out = map_channels(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn missing_channels_are_silent() {
        let out = map_channels(&[1.0, 2.0], 2, 4);
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn same_format_passes_through() {
        let mut adapter = FormatAdapter::new(44100, 2, 44100, 2).unwrap();
        let input = vec![0.5; 64];
        assert_eq!(adapter.process(&input).unwrap(), input);
    }

    #[test]
    fn upsampling_roughly_doubles_frames() {
        let mut adapter = FormatAdapter::new(22050, 1, 44100, 1).unwrap();
        let input = vec![0.25; 22050];
        let out = adapter.process(&input).unwrap();

        // Whole chunks only; the tail stays buffered
        let consumed = (22050 / RESAMPLE_CHUNK_FRAMES) * RESAMPLE_CHUNK_FRAMES;
        let expected = consumed * 2;
        assert!(out.len().abs_diff(expected) <= 64, "got {} frames", out.len());
    }

    #[test]
    fn flush_returns_the_buffered_tail() {
        let mut adapter = FormatAdapter::new(22050, 1, 44100, 1).unwrap();
        let input = vec![0.25; 22050];
        let mut out = adapter.process(&input).unwrap();
        out.extend(adapter.flush().unwrap());

        // One second in, one second out (plus the filter delay)
        assert!(out.len().abs_diff(44100) <= 64, "got {} frames", out.len());
    }

    #[test]
    fn flush_without_resampling_is_empty() {
        let mut adapter = FormatAdapter::new(44100, 1, 44100, 2).unwrap();
        adapter.process(&[0.5; 10]).unwrap();
        assert!(adapter.flush().unwrap().is_empty());
    }

    #[test]
    fn reset_drops_buffered_tail() {
        let mut adapter = FormatAdapter::new(48000, 2, 44100, 2).unwrap();
        adapter.process(&vec![0.0; 200]).unwrap();
        adapter.reset();
        // Less than one chunk after the reset: nothing comes out yet
        assert!(adapter.process(&vec![0.0; 200]).unwrap().is_empty());
    }
}
