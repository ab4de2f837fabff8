use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Maximum duration to load (None = load entire file)
    pub max_duration: Option<Duration>,
    /// Bit depth to store the decoded samples at (None = the file's own depth, 16 if unknown)
    pub bits_per_sample: Option<u16>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = Some(bits);
        self
    }
}
