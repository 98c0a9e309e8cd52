use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaterState {
    #[default]
    Off,
    On,
}

impl HeaterState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaterStatusPayload {
    #[serde(rename = "HeatingStatus")]
    pub heating_status: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemperaturePayload {
    #[serde(rename = "Temperature")]
    pub temperature: f64,
}

impl TemperaturePayload {
    /// Two decimals, the precision existing dashboards were built against.
    pub fn from_celsius(celsius: f64) -> Self {
        Self {
            temperature: (celsius * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
