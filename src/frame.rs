//! Buffers that travel through the pipeline queues.
//!
//! Each record owns its bytes outright. Once built it is moved, never shared: a queue
//! transfer hands the whole record to the receiving role, which drops it when done.

/// Fallible allocation of a zeroed byte buffer.
///
/// Returns `None` instead of aborting when the allocator refuses, so the caller can count
/// the frame as dropped and carry on.
#[must_use]
#[inline]
pub fn try_alloc(len: usize) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).ok()?;
    buffer.resize(len, 0);
    Some(buffer)
}

/// Fallible copy of `data` into a freshly allocated buffer.
#[must_use]
#[inline]
pub fn try_copy(data: &[u8]) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(data.len()).ok()?;
    buffer.extend_from_slice(data);
    Some(buffer)
}

/// Geometry of raw NV12 frames: a `height` × `stride` luma plane followed by an
/// interleaved chroma plane of half the height.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl VideoFormat {
    /// Packed NV12 with no row padding.
    #[must_use]
    #[inline]
    pub const fn nv12(width: u32, height: u32) -> Self {
        Self { width, height, stride: width }
    }

    /// Bytes in one NV12 frame.
    #[must_use]
    #[inline]
    pub const fn frame_size(&self) -> usize {
        self.stride as usize * self.height as usize * 3 / 2
    }
}

/// Layout of interleaved PCM as delivered by the audio device.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
    /// Per-channel frames requested per read.
    pub frames_per_period: u32,
}

impl AudioFormat {
    /// 16-bit little endian samples.
    #[must_use]
    #[inline]
    pub const fn s16le(sample_rate: u32, channels: u16, frames_per_period: u32) -> Self {
        Self { sample_rate, channels, bytes_per_sample: 2, frames_per_period }
    }

    /// Bytes in one interleaved sample frame (one sample for every channel).
    #[must_use]
    #[inline]
    pub const fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Bytes in one full period.
    #[must_use]
    #[inline]
    pub const fn period_bytes(&self) -> usize {
        self.frames_per_period as usize * self.bytes_per_frame()
    }
}

/// One raw captured picture.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// Monotonic time at which the capture buffer was dequeued.
    pub pts_us: u64,
    /// Capture order, starting at zero.
    pub frame_id: u64,
}

impl VideoFrame {
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One block of interleaved PCM.
#[derive(Clone, Debug)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
    /// Per-channel sample frames actually read.
    pub frames: u32,
    pub pts_us: u64,
}

impl AudioChunk {
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One unit of H.264 Annex-B bitstream.
#[derive(Clone, Debug)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    /// Inherited unchanged from the source [`VideoFrame`].
    pub pts_us: u64,
    pub is_keyframe: bool,
}

impl EncodedPacket {
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_frame_size() {
        assert_eq!(VideoFormat::nv12(1280, 720).frame_size(), 1_382_400);
        assert_eq!(VideoFormat { width: 1280, height: 720, stride: 1344 }.frame_size(), 1_451_520);
    }

    #[test]
    fn s16le_stereo_period() {
        let format = AudioFormat::s16le(48_000, 2, 1024);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.period_bytes(), 4096);
    }

    #[test]
    fn try_copy_copies() {
        assert_eq!(try_copy(&[1, 2, 3]).unwrap(), vec![1, 2, 3]);
        assert_eq!(try_alloc(4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn absurd_allocation_is_refused() {
        assert!(try_alloc(usize::MAX).is_none());
    }
}
