//! Playback rate support and control.

use tracing::debug;

use super::{
    MediaSource,
    constants::{MAX_PLAYBACK_RATE, SLOWEST_PLAYBACK_RATE},
};
use crate::{
    common::{Result, SourceError},
    media::SourceEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDirection {
    Forward,
    Reverse,
}

impl MediaSource {
    pub fn slowest_rate(&self, _direction: RateDirection) -> f32 {
        SLOWEST_PLAYBACK_RATE
    }

    pub fn fastest_rate(&self, direction: RateDirection) -> f32 {
        match direction {
            RateDirection::Forward => MAX_PLAYBACK_RATE,
            RateDirection::Reverse => -MAX_PLAYBACK_RATE,
        }
    }

    /// Returns the nearest supported rate, which is `rate` itself when it is
    /// within range.
    pub fn is_rate_supported(&self, _thin: bool, rate: f32) -> Result<f32> {
        if rate.is_nan() || rate.abs() > MAX_PLAYBACK_RATE {
            return Err(SourceError::UnsupportedRate(rate));
        }
        Ok(rate)
    }

    pub fn set_rate(&self, thin: bool, rate: f32) -> Result<()> {
        if rate < 0.0 {
            return Err(SourceError::ReverseUnsupported);
        }
        if thin {
            return Err(SourceError::ThinningUnsupported);
        }
        self.is_rate_supported(thin, rate)?;

        let mut inner = self.shared.inner.lock();
        inner.ensure_alive()?;
        inner.rate = rate;
        debug!("MediaSource: rate set to {}", rate);
        self.shared.post(SourceEvent::RateChanged { rate });
        Ok(())
    }

    /// Current rate; thinning is never in effect.
    pub fn rate(&self) -> Result<(bool, f32)> {
        let inner = self.shared.inner.lock();
        inner.ensure_alive()?;
        Ok((false, inner.rate))
    }
}
