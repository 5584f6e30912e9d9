//! Tick positions for notes and meta events.
//!
//! A [`Timing`] never stores an absolute position on its own unless `exact`
//! is set; everything else is resolved against the running tick of the
//! track being encoded.

use crate::error::{MidiError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timing {
    exact: Option<i64>,
    offset: Option<i64>,
    delay: Option<i64>,
    duration: Option<i64>,
}

fn check_exact(v: i64) -> Result<i64> {
    if v < 0 {
        return Err(MidiError::InvalidTiming(format!(
            "exact tick must be non-negative, got {v}"
        )));
    }
    Ok(v)
}

fn check_duration(v: i64) -> Result<i64> {
    if v < 0 {
        return Err(MidiError::InvalidTiming(format!(
            "duration must be non-negative, got {v}"
        )));
    }
    Ok(v)
}

/// Scales a tick count, rejecting results that fall between ticks.
fn scale(v: i64, scaled: f64) -> Result<i64> {
    if !scaled.is_finite() || scaled.fract() != 0.0 {
        return Err(MidiError::InvalidTiming(format!(
            "scaling {v} does not land on a whole tick ({scaled})"
        )));
    }
    Ok(scaled as i64)
}

impl Timing {
    pub fn new(
        exact: Option<i64>,
        offset: Option<i64>,
        delay: Option<i64>,
        duration: Option<i64>,
    ) -> Result<Self> {
        Ok(Timing {
            exact: exact.map(check_exact).transpose()?,
            offset,
            delay,
            duration: duration.map(check_duration).transpose()?,
        })
    }

    pub fn exact(tick: i64) -> Result<Self> {
        Timing::default().with_exact(tick)
    }

    pub fn duration(ticks: i64) -> Result<Self> {
        Timing::default().with_duration(ticks)
    }

    pub fn exact_field(&self) -> Option<i64> {
        self.exact
    }

    pub fn offset_field(&self) -> Option<i64> {
        self.offset
    }

    pub fn delay_field(&self) -> Option<i64> {
        self.delay
    }

    pub fn duration_field(&self) -> Option<i64> {
        self.duration
    }

    pub fn with_exact(self, tick: i64) -> Result<Self> {
        Ok(Timing {
            exact: Some(check_exact(tick)?),
            ..self
        })
    }

    pub fn with_offset(self, ticks: i64) -> Self {
        Timing {
            offset: Some(ticks),
            ..self
        }
    }

    pub fn with_delay(self, ticks: i64) -> Self {
        Timing {
            delay: Some(ticks),
            ..self
        }
    }

    pub fn with_duration(self, ticks: i64) -> Result<Self> {
        Ok(Timing {
            duration: Some(check_duration(ticks)?),
            ..self
        })
    }

    /// First tick of the event when the track cursor sits at `curr`.
    pub fn start_tick(&self, curr: i64) -> i64 {
        self.exact.unwrap_or(curr) + self.delay.unwrap_or(0) + self.offset.unwrap_or(0)
    }

    pub fn end_tick(&self, curr: i64) -> i64 {
        self.start_tick(curr) + self.duration.unwrap_or(0)
    }

    /// Where the cursor moves after this event.
    ///
    /// `offset` only displaces the event it belongs to, so it is left out.
    pub fn next_tick(&self, curr: i64) -> i64 {
        self.exact.unwrap_or(curr) + self.delay.unwrap_or(0) + self.duration.unwrap_or(0)
    }

    /// Multiplies every present field by `factor`.
    pub fn augment(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(MidiError::InvalidTiming(format!(
                "augment factor must be non-negative, got {factor}"
            )));
        }
        self.rescale(|v| v as f64 * factor)
    }

    /// Divides every present field by `factor`.
    pub fn diminish(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(MidiError::InvalidTiming(format!(
                "diminish factor must be positive, got {factor}"
            )));
        }
        self.rescale(|v| v as f64 / factor)
    }

    fn rescale(&self, f: impl Fn(i64) -> f64) -> Result<Self> {
        let apply = |field: Option<i64>| field.map(|v| scale(v, f(v))).transpose();
        Timing::new(
            apply(self.exact)?,
            apply(self.offset)?,
            apply(self.delay)?,
            apply(self.duration)?,
        )
    }

    /// Collapses everything except the duration into a single exact tick.
    pub fn with_all_ticks_exact(&self, curr: i64) -> Result<Self> {
        Timing::new(Some(self.start_tick(curr)), Some(0), None, self.duration)
    }
}
