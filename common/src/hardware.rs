//! Seams between the control logic and the board.
//!
//! The ESP32 build backs these with ADC and GPIO drivers; the host build and
//! the tests back them with in-memory fakes.

use crate::{
    config::OutputLevel,
    error::{ActuatorError, SampleError},
};

/// One-shot analog sampling.
pub trait AnalogInput {
    /// Returns a raw sample in `0..=resolution` for the configured ADC.
    fn sample(&mut self) -> Result<u32, SampleError>;
}

/// The digital line that drives the heater relay.
pub trait HeaterOutput {
    fn drive(&mut self, level: OutputLevel) -> Result<(), ActuatorError>;
}

impl<T: AnalogInput + ?Sized> AnalogInput for Box<T> {
    fn sample(&mut self) -> Result<u32, SampleError> {
        (**self).sample()
    }
}

impl<T: HeaterOutput + ?Sized> HeaterOutput for Box<T> {
    fn drive(&mut self, level: OutputLevel) -> Result<(), ActuatorError> {
        (**self).drive(level)
    }
}

/// Fixed sample, handy for the host build and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSample(pub u32);

impl AnalogInput for FixedSample {
    fn sample(&mut self) -> Result<u32, SampleError> {
        Ok(self.0)
    }
}

/// Remembers every level it was asked to drive.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    pub levels: Vec<OutputLevel>,
    pub fail_next: bool,
}

impl RecordingOutput {
    pub fn last_level(&self) -> Option<OutputLevel> {
        self.levels.last().copied()
    }
}

impl HeaterOutput for RecordingOutput {
    fn drive(&mut self, level: OutputLevel) -> Result<(), ActuatorError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(ActuatorError("simulated write failure".to_string()));
        }
        self.levels.push(level);
        Ok(())
    }
}
