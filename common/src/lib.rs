pub mod config;
pub mod error;
pub mod guard;
pub mod hardware;
pub mod heater;
pub mod net;
pub mod request;
pub mod routes;
pub mod service;
pub mod thermistor;
pub mod types;

pub use config::{
    AccessConfig, HeaterCommandConfig, HeaterConfig, NetworkConfig, OutputLevel, RelayPolarity,
    RuntimeConfig, ThermistorConfig,
};
pub use error::{
    ActuatorError, ConfigError, ConnectError, ControlError, HeaterError, SampleError, SensorFault,
};
pub use guard::AccessGuard;
pub use hardware::{AnalogInput, FixedSample, HeaterOutput, RecordingOutput};
pub use heater::{HeaterCommand, HeaterController};
pub use net::{
    caller_address, caller_from_peer, caller_from_socket, connect_with_retry,
    connect_with_retry_async, PeerFamily,
};
pub use request::{collect_args, Method, Request, Response};
pub use routes::*;
pub use service::{DeviceControlService, DispatchObserver};
pub use thermistor::{Reading, ThermistorReader};
pub use types::{HeaterState, HeaterStatusPayload, TemperaturePayload};
