use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("adc_resolution_steps must be greater than zero")]
    ZeroAdcResolution,
    #[error("supply_voltage must be positive and finite, got {0}")]
    SupplyVoltage(f64),
    #[error("series_resistance_ohms must be positive and finite, got {0}")]
    SeriesResistance(f64),
    #[error("steinhart-hart coefficients must be finite")]
    Coefficients,
    #[error("heater command literals cannot be empty")]
    EmptyCommandLiteral,
    #[error("heater on/off literals are indistinguishable: `{0}`")]
    CommandLiteralsCollide(String),
    #[error("connect_attempts must be at least 1")]
    ZeroConnectAttempts,
}

/// Degenerate thermistor readings. Each one is a defined outcome of
/// `ThermistorReader::measure`, never a panic or a NaN.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SensorFault {
    #[error("adc sample is zero; thermistor open circuit")]
    OpenCircuit,
    #[error("thermistor resistance {resistance_ohms} ohm is not positive; short circuit or rail saturation")]
    ShortCircuit { resistance_ohms: f64 },
    #[error("adc sample {sample} exceeds resolution {resolution}")]
    OutOfRange { sample: u32, resolution: u32 },
    #[error("conversion produced a non-physical temperature")]
    NonPhysical,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("analog sample failed: {0}")]
pub struct SampleError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("heater output write failed: {0}")]
pub struct ActuatorError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaterError {
    #[error("invalid heater command `{0}`")]
    InvalidCommand(String),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

/// Everything a request can fail with. Every variant maps to a response;
/// none of them stop the service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("caller is not on the allow-list")]
    Unauthorized,
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },
    #[error("invalid heater command `{0}`")]
    InvalidCommand(String),
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },
    #[error(transparent)]
    Sensor(#[from] SensorFault),
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

impl From<HeaterError> for ControlError {
    fn from(err: HeaterError) -> Self {
        match err {
            HeaterError::InvalidCommand(command) => Self::InvalidCommand(command),
            HeaterError::Actuator(err) => Self::Actuator(err),
        }
    }
}

impl ControlError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::MethodNotAllowed { .. } => 405,
            // Kept at 404 for existing clients.
            Self::InvalidCommand(_) | Self::RouteNotFound { .. } => 404,
            Self::Sensor(_) | Self::Sample(_) => 503,
            Self::Actuator(_) => 500,
        }
    }
}

/// Startup network bring-up failure after every attempt was used.
#[derive(Debug, Error)]
#[error("network not reachable after {attempts} attempts: {last_error}")]
pub struct ConnectError {
    pub attempts: u32,
    pub last_error: String,
}
