use crate::{
    config::{HeaterCommandConfig, HeaterConfig, RelayPolarity},
    error::{ActuatorError, HeaterError},
    hardware::HeaterOutput,
    types::HeaterState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterCommand {
    On,
    Off,
}

impl HeaterCommand {
    pub fn parse(value: &str, commands: &HeaterCommandConfig) -> Option<Self> {
        let matches = |literal: &str| {
            if commands.case_sensitive {
                value == literal
            } else {
                value.eq_ignore_ascii_case(literal)
            }
        };

        if matches(&commands.on_literal) {
            Some(Self::On)
        } else if matches(&commands.off_literal) {
            Some(Self::Off)
        } else {
            None
        }
    }

    fn target_state(self) -> HeaterState {
        match self {
            Self::On => HeaterState::On,
            Self::Off => HeaterState::Off,
        }
    }
}

/// Two-state relay controller. The recorded state only changes after the
/// output write succeeds.
#[derive(Debug)]
pub struct HeaterController<O> {
    output: O,
    polarity: RelayPolarity,
    commands: HeaterCommandConfig,
    state: HeaterState,
}

impl<O: HeaterOutput> HeaterController<O> {
    pub fn new(config: &HeaterConfig, output: O) -> Self {
        Self {
            output,
            polarity: config.polarity,
            commands: config.commands.clone(),
            state: HeaterState::Off,
        }
    }

    /// Drives the line to the current state's level. Called once at boot so
    /// the relay agrees with the initial `Off`.
    pub fn assert_output(&mut self) -> Result<(), ActuatorError> {
        let level = self.polarity.level_for(self.state.is_on());
        self.output.drive(level)
    }

    pub fn set_heater(&mut self, command: &str) -> Result<HeaterState, HeaterError> {
        let command = HeaterCommand::parse(command, &self.commands)
            .ok_or_else(|| HeaterError::InvalidCommand(command.to_string()))?;
        self.apply(command)
    }

    pub fn apply(&mut self, command: HeaterCommand) -> Result<HeaterState, HeaterError> {
        let next = command.target_state();
        self.output.drive(self.polarity.level_for(next.is_on()))?;
        self.state = next;
        Ok(next)
    }

    pub fn status(&self) -> HeaterState {
        self.state
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::OutputLevel, hardware::RecordingOutput};

    fn controller() -> HeaterController<RecordingOutput> {
        HeaterController::new(&HeaterConfig::default(), RecordingOutput::default())
    }

    #[test]
    fn starts_off() {
        assert_eq!(controller().status(), HeaterState::Off);
    }

    #[test]
    fn on_command_turns_heater_on_and_drives_active_low() {
        let mut heater = controller();
        assert_eq!(heater.set_heater("ON"), Ok(HeaterState::On));
        assert_eq!(heater.status(), HeaterState::On);
        assert_eq!(heater.output().last_level(), Some(OutputLevel::Low));

        assert_eq!(heater.set_heater("OFF"), Ok(HeaterState::Off));
        assert_eq!(heater.output().last_level(), Some(OutputLevel::High));
    }

    #[test]
    fn repeated_on_is_idempotent_and_reasserts_output() {
        let mut heater = controller();
        heater.set_heater("ON").unwrap();
        heater.set_heater("ON").unwrap();

        assert_eq!(heater.status(), HeaterState::On);
        assert_eq!(
            heater.output().levels,
            vec![OutputLevel::Low, OutputLevel::Low]
        );
    }

    #[test]
    fn garbage_command_leaves_state_and_output_alone() {
        let mut heater = controller();
        heater.set_heater("ON").unwrap();

        assert_eq!(
            heater.set_heater("garbage"),
            Err(HeaterError::InvalidCommand("garbage".to_string()))
        );
        assert_eq!(heater.status(), HeaterState::On);
        assert_eq!(heater.output().levels.len(), 1);
    }

    #[test]
    fn casing_follows_configuration() {
        let mut heater = controller();
        assert!(matches!(
            heater.set_heater("on"),
            Err(HeaterError::InvalidCommand(_))
        ));

        let config = HeaterConfig {
            commands: HeaterCommandConfig {
                on_literal: "On".to_string(),
                off_literal: "Off".to_string(),
                case_sensitive: false,
            },
            ..HeaterConfig::default()
        };
        let mut heater = HeaterController::new(&config, RecordingOutput::default());
        assert_eq!(heater.set_heater("ON"), Ok(HeaterState::On));
        assert_eq!(heater.set_heater("off"), Ok(HeaterState::Off));
    }

    #[test]
    fn active_high_polarity_inverts_levels() {
        let config = HeaterConfig {
            polarity: RelayPolarity::ActiveHigh,
            ..HeaterConfig::default()
        };
        let mut heater = HeaterController::new(&config, RecordingOutput::default());
        heater.assert_output().unwrap();
        heater.set_heater("ON").unwrap();
        assert_eq!(
            heater.output().levels,
            vec![OutputLevel::Low, OutputLevel::High]
        );
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let mut heater = controller();
        heater.output_mut().fail_next = true;

        assert!(matches!(
            heater.set_heater("ON"),
            Err(HeaterError::Actuator(_))
        ));
        assert_eq!(heater.status(), HeaterState::Off);
    }
}
