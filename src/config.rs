use crate::error::PbftError;

/// Per-node protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbftConfig {
    /// Number of admissible sequence numbers: `high = low + watermark_window - 1`.
    pub watermark_window: u64,
    /// Capacity of the committed-event broadcast channel.
    pub event_buffer: usize,
    /// Keep prepare/commit votes that arrive before their pre-prepare and count
    /// them once it is accepted. When false such votes are dropped.
    pub buffer_early_votes: bool,
}

impl Default for PbftConfig {
    fn default() -> Self {
        Self {
            watermark_window: 256,
            event_buffer: 1000,
            buffer_early_votes: true,
        }
    }
}

impl PbftConfig {
    pub fn builder() -> PbftConfigBuilder {
        PbftConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PbftError> {
        if self.watermark_window == 0 {
            return Err(PbftError::InvalidConfiguration(
                "watermark_window must be greater than 0".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(PbftError::InvalidConfiguration(
                "event_buffer must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct PbftConfigBuilder {
    config: PbftConfig,
}

impl PbftConfigBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: PbftConfig::default(),
        }
    }

    /// Set the size of the sequence window
    pub fn with_watermark_window(mut self, watermark_window: u64) -> Self {
        self.config.watermark_window = watermark_window;
        self
    }

    /// Set the committed-event channel capacity
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.config.event_buffer = event_buffer;
        self
    }

    /// Enable or disable buffering of votes that precede their pre-prepare
    pub fn with_early_vote_buffering(mut self, enabled: bool) -> Self {
        self.config.buffer_early_votes = enabled;
        self
    }

    /// Start builder from an existing PbftConfig (useful for partial updates)
    pub fn from_existing(config: PbftConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self) -> Result<(), PbftError> {
        self.config.validate()
    }

    /// Build the final PbftConfig
    pub fn build(self) -> Result<PbftConfig, PbftError> {
        self.validate()?;
        Ok(self.config)
    }
}

impl Default for PbftConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
