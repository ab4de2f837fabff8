use crate::audio_data::AudioStream;

/// Playback position within one looping input stream.
#[derive(Debug, Clone)]
pub(crate) struct SourceCursor {
    stream: AudioStream,
    /// Byte offset of the next frame, always frame-aligned
    offset: usize,
}

impl SourceCursor {
    pub fn new(stream: AudioStream) -> Self {
        Self { stream, offset: 0 }
    }

    pub fn frame_bytes(&self) -> usize {
        self.stream.format().frame_bytes()
    }

    /// Copies the next `out.len()` bytes of the stream into `out` without advancing,
    /// wrapping from the end back to the start as often as needed.
    pub fn peek_block(&self, out: &mut [u8]) {
        let data = self.stream.data();
        let mut position = self.offset;
        let mut filled = 0;
        while filled < out.len() {
            let run = (data.len() - position).min(out.len() - filled);
            out[filled..filled + run].copy_from_slice(&data[position..position + run]);
            filled += run;
            position = (position + run) % data.len();
        }
    }

    pub fn advance(&mut self, frames: usize) {
        let len = self.stream.len_bytes();
        self.offset = (self.offset + frames * self.frame_bytes() % len) % len;
    }

    #[cfg(test)]
    pub fn offset(&self) -> usize {
        self.offset
    }
}
