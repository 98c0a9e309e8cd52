use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    gpio::{AnyOutputPin, Gpio34, Level, Output, PinDriver},
};
use log::warn;

use garage_common::{
    ActuatorError, AnalogInput, DispatchObserver, HeaterOutput, OutputLevel, Request, Response,
    SampleError,
};

/// Full-scale reading of the ESP32's 12-bit SAR ADC.
pub const ADC_FULL_SCALE: u32 = 4095;

/// Thermistor divider on GPIO34 (ADC1 channel 6).
pub struct ThermistorAdc {
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
}

impl ThermistorAdc {
    pub fn new(adc: ADC1, pin: Gpio34) -> anyhow::Result<Self> {
        let driver = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(driver, pin, &config)?;
        Ok(Self { channel })
    }
}

impl AnalogInput for ThermistorAdc {
    fn sample(&mut self) -> Result<u32, SampleError> {
        self.channel
            .read_raw()
            .map(u32::from)
            .map_err(|err| SampleError(err.to_string()))
    }
}

pub struct RelayPin {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl RelayPin {
    pub fn new(gpio: i32) -> anyhow::Result<Self> {
        let pin = unsafe { PinDriver::output(AnyOutputPin::new(gpio))? };
        Ok(Self { pin })
    }
}

impl HeaterOutput for RelayPin {
    fn drive(&mut self, level: OutputLevel) -> Result<(), ActuatorError> {
        let level = match level {
            OutputLevel::Low => Level::Low,
            OutputLevel::High => Level::High,
        };
        self.pin
            .set_level(level)
            .map_err(|err| ActuatorError(err.to_string()))
    }
}

/// On-board LED lit while a request is being handled.
pub struct StatusLed {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl StatusLed {
    pub fn new(gpio: i32) -> Option<Self> {
        match unsafe { PinDriver::output(AnyOutputPin::new(gpio)) } {
            Ok(mut pin) => {
                let _ = pin.set_low();
                Some(Self { pin })
            }
            Err(err) => {
                warn!("status LED unavailable on GPIO{gpio}: {err}");
                None
            }
        }
    }
}

impl DispatchObserver for StatusLed {
    fn before_dispatch(&mut self, _request: &Request) {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to drive status LED: {err}");
        }
    }

    fn after_dispatch(&mut self, _request: &Request, _response: &Response) {
        if let Err(err) = self.pin.set_low() {
            warn!("failed to drive status LED: {err}");
        }
    }
}
