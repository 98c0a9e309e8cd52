use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Voltage divider and Steinhart-Hart calibration for the NTC probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThermistorConfig {
    pub supply_voltage: f64,
    pub series_resistance_ohms: f64,
    pub adc_resolution_steps: u32,
    pub coefficient_a: f64,
    pub coefficient_b: f64,
    pub coefficient_c: f64,
}

impl Default for ThermistorConfig {
    fn default() -> Self {
        Self {
            supply_voltage: 3.3,
            series_resistance_ohms: 2005.0,
            adc_resolution_steps: 1023,
            coefficient_a: 1.009249522e-03,
            coefficient_b: 2.378405444e-04,
            coefficient_c: 2.019202697e-07,
        }
    }
}

/// Electrical level that switches the relay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayPolarity {
    ActiveLow,
    ActiveHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Low,
    High,
}

impl RelayPolarity {
    pub fn level_for(self, on: bool) -> OutputLevel {
        match (self, on) {
            (Self::ActiveLow, true) | (Self::ActiveHigh, false) => OutputLevel::Low,
            (Self::ActiveLow, false) | (Self::ActiveHigh, true) => OutputLevel::High,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeaterCommandConfig {
    pub on_literal: String,
    pub off_literal: String,
    pub case_sensitive: bool,
}

impl Default for HeaterCommandConfig {
    fn default() -> Self {
        Self {
            on_literal: "ON".to_string(),
            off_literal: "OFF".to_string(),
            case_sensitive: true,
        }
    }
}

impl HeaterCommandConfig {
    fn literals_collide(&self) -> bool {
        if self.case_sensitive {
            self.on_literal == self.off_literal
        } else {
            self.on_literal.eq_ignore_ascii_case(&self.off_literal)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeaterConfig {
    pub output_pin: i32,
    pub polarity: RelayPolarity,
    #[serde(default)]
    pub commands: HeaterCommandConfig,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            output_pin: 5,
            polarity: RelayPolarity::ActiveLow,
            commands: HeaterCommandConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AccessConfig {
    /// Exact caller address string permitted on guarded routes. `None`
    /// leaves every route open.
    #[serde(default)]
    pub allowed_caller: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub hostname: String,
    pub http_port: u16,
    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            hostname: "garage-controller".to_string(),
            http_port: 80,
            connect_attempts: 10,
            connect_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub thermistor: ThermistorConfig,
    #[serde(default)]
    pub heater: HeaterConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thermistor = &self.thermistor;
        if thermistor.adc_resolution_steps == 0 {
            return Err(ConfigError::ZeroAdcResolution);
        }
        if !(thermistor.supply_voltage.is_finite() && thermistor.supply_voltage > 0.0) {
            return Err(ConfigError::SupplyVoltage(thermistor.supply_voltage));
        }
        if !(thermistor.series_resistance_ohms.is_finite()
            && thermistor.series_resistance_ohms > 0.0)
        {
            return Err(ConfigError::SeriesResistance(
                thermistor.series_resistance_ohms,
            ));
        }
        if ![
            thermistor.coefficient_a,
            thermistor.coefficient_b,
            thermistor.coefficient_c,
        ]
        .iter()
        .all(|value| value.is_finite())
        {
            return Err(ConfigError::Coefficients);
        }

        let commands = &self.heater.commands;
        if commands.on_literal.is_empty() || commands.off_literal.is_empty() {
            return Err(ConfigError::EmptyCommandLiteral);
        }
        if commands.literals_collide() {
            return Err(ConfigError::CommandLiteralsCollide(
                commands.on_literal.clone(),
            ));
        }

        if self.network.connect_attempts == 0 {
            return Err(ConfigError::ZeroConnectAttempts);
        }

        Ok(())
    }

    /// Blank allow-list strings mean "open mode", not "nobody".
    pub fn sanitize(&mut self) {
        if let Some(caller) = self.access.allowed_caller.as_mut() {
            let trimmed = caller.trim().to_string();
            *caller = trimmed;
        }
        if self
            .access
            .allowed_caller
            .as_deref()
            .is_some_and(str::is_empty)
        {
            self.access.allowed_caller = None;
        }
        if self.network.hostname.trim().is_empty() {
            self.network.hostname = NetworkConfig::default().hostname;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_reference_hardware() {
        let config = RuntimeConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.thermistor.adc_resolution_steps, 1023);
        assert_eq!(config.heater.polarity, RelayPolarity::ActiveLow);
        assert_eq!(config.access.allowed_caller, None);
    }

    #[test]
    fn zero_adc_resolution_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.thermistor.adc_resolution_steps = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroAdcResolution));
    }

    #[test]
    fn colliding_literals_are_rejected_when_case_insensitive() {
        let mut config = RuntimeConfig::default();
        config.heater.commands.on_literal = "on".to_string();
        config.heater.commands.off_literal = "ON".to_string();
        assert_eq!(config.validate(), Ok(()));

        config.heater.commands.case_sensitive = false;
        assert_eq!(
            config.validate(),
            Err(ConfigError::CommandLiteralsCollide("on".to_string()))
        );
    }

    #[test]
    fn polarity_maps_state_to_level() {
        assert_eq!(RelayPolarity::ActiveLow.level_for(true), OutputLevel::Low);
        assert_eq!(RelayPolarity::ActiveLow.level_for(false), OutputLevel::High);
        assert_eq!(RelayPolarity::ActiveHigh.level_for(true), OutputLevel::High);
        assert_eq!(RelayPolarity::ActiveHigh.level_for(false), OutputLevel::Low);
    }

    #[test]
    fn sanitize_treats_blank_allow_list_as_open() {
        let mut config = RuntimeConfig::default();
        config.access.allowed_caller = Some("  ".to_string());
        config.sanitize();
        assert_eq!(config.access.allowed_caller, None);

        config.access.allowed_caller = Some(" 192.168.1.20 ".to_string());
        config.sanitize();
        assert_eq!(
            config.access.allowed_caller.as_deref(),
            Some("192.168.1.20")
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let raw = r#"{ "access": { "allowed_caller": "10.0.0.7" },
                       "heater": { "output_pin": 4, "polarity": "active-high" } }"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.access.allowed_caller.as_deref(), Some("10.0.0.7"));
        assert_eq!(config.heater.polarity, RelayPolarity::ActiveHigh);
        assert_eq!(config.heater.commands, HeaterCommandConfig::default());
        assert_eq!(config.thermistor, ThermistorConfig::default());
    }
}
