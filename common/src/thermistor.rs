use crate::{config::ThermistorConfig, error::SensorFault};

const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub celsius: f64,
}

/// Divider math for a thermistor on the high side and the series resistor
/// to ground: `v_out` is measured across the series resistor, so
/// `R = Vcc * Rs / v_out - Rs`.
#[derive(Debug, Clone)]
pub struct ThermistorReader {
    config: ThermistorConfig,
}

impl ThermistorReader {
    pub fn new(config: ThermistorConfig) -> Self {
        Self { config }
    }

    pub fn output_voltage(&self, raw_sample: u32) -> f64 {
        f64::from(raw_sample) * self.config.supply_voltage
            / f64::from(self.config.adc_resolution_steps)
    }

    pub fn thermistor_resistance(&self, raw_sample: u32) -> Result<f64, SensorFault> {
        let resolution = self.config.adc_resolution_steps;
        if raw_sample > resolution {
            return Err(SensorFault::OutOfRange {
                sample: raw_sample,
                resolution,
            });
        }
        if raw_sample == 0 {
            return Err(SensorFault::OpenCircuit);
        }

        let v_out = self.output_voltage(raw_sample);
        let resistance_ohms = self.config.supply_voltage * self.config.series_resistance_ohms
            / v_out
            - self.config.series_resistance_ohms;

        // ln() below needs a strictly positive argument.
        if !(resistance_ohms.is_finite() && resistance_ohms > 0.0) {
            return Err(SensorFault::ShortCircuit { resistance_ohms });
        }
        Ok(resistance_ohms)
    }

    pub fn measure(&self, raw_sample: u32) -> Result<Reading, SensorFault> {
        let resistance = self.thermistor_resistance(raw_sample)?;

        let ln_r = resistance.ln();
        let denominator = self.config.coefficient_a
            + self.config.coefficient_b * ln_r
            + self.config.coefficient_c * ln_r.powi(3);
        let kelvin = 1.0 / denominator;

        if !kelvin.is_finite() || kelvin <= 0.0 {
            return Err(SensorFault::NonPhysical);
        }

        Ok(Reading {
            celsius: kelvin - KELVIN_OFFSET,
        })
    }
}
