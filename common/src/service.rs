use std::fmt::Write as _;

use crate::{
    config::RuntimeConfig,
    error::{ActuatorError, ControlError},
    guard::AccessGuard,
    hardware::{AnalogInput, HeaterOutput},
    heater::HeaterController,
    request::{Request, Response},
    routes::{Route, GREETING},
    thermistor::{Reading, ThermistorReader},
    types::{HeaterState, HeaterStatusPayload, TemperaturePayload},
};

/// Hook run around every dispatch, e.g. the status LED or request logging.
pub trait DispatchObserver {
    fn before_dispatch(&mut self, _request: &Request) {}

    fn after_dispatch(&mut self, _request: &Request, _response: &Response) {}
}

/// Owns the heater and the sampling input and turns each [`Request`] into a
/// [`Response`]. Not internally synchronized: callers hand it one request at
/// a time.
pub struct DeviceControlService<A, O> {
    guard: AccessGuard,
    thermistor: ThermistorReader,
    heater: HeaterController<O>,
    analog: A,
    observers: Vec<Box<dyn DispatchObserver + Send>>,
}

impl<A: AnalogInput, O: HeaterOutput> DeviceControlService<A, O> {
    pub fn new(config: &RuntimeConfig, analog: A, output: O) -> Self {
        Self {
            guard: AccessGuard::new(&config.access),
            thermistor: ThermistorReader::new(config.thermistor.clone()),
            heater: HeaterController::new(&config.heater, output),
            analog,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl DispatchObserver + Send + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Puts the relay line at the `Off` level before the first request.
    pub fn initialize_output(&mut self) -> Result<(), ActuatorError> {
        self.heater.assert_output()
    }

    pub fn heater_status(&self) -> HeaterState {
        self.heater.status()
    }

    pub fn heater(&self) -> &HeaterController<O> {
        &self.heater
    }

    pub fn heater_mut(&mut self) -> &mut HeaterController<O> {
        &mut self.heater
    }

    pub fn handle(&mut self, request: &Request) -> Response {
        for observer in &mut self.observers {
            observer.before_dispatch(request);
        }

        let response = match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => error_response(request, &err),
        };

        for observer in &mut self.observers {
            observer.after_dispatch(request, &response);
        }
        response
    }

    /// Guard, then method check, then the route body.
    pub fn dispatch(&mut self, request: &Request) -> Result<Response, ControlError> {
        let Some(route) = Route::resolve(&request.path) else {
            return Err(ControlError::RouteNotFound {
                method: request.method.as_str().to_string(),
                path: request.path.clone(),
            });
        };

        if route.requires_auth() && !self.guard.is_allowed(request.caller.as_deref()) {
            return Err(ControlError::Unauthorized);
        }

        if route
            .method()
            .is_some_and(|allowed| request.method != allowed)
        {
            return Err(ControlError::MethodNotAllowed {
                method: request.method.as_str().to_string(),
                path: request.path.clone(),
            });
        }

        match route {
            Route::Root => Ok(Response::text(200, GREETING)),
            Route::Heater => {
                let command = request.arg(0).unwrap_or_default();
                self.heater.set_heater(command)?;
                Ok(Response::no_content())
            }
            Route::HeaterStatus => Ok(Response::json(
                200,
                &HeaterStatusPayload {
                    heating_status: self.heater.status().is_on(),
                },
            )),
            Route::Temperature => {
                let reading = self.read_temperature()?;
                Ok(Response::json(
                    200,
                    &TemperaturePayload::from_celsius(reading.celsius),
                ))
            }
        }
    }

    pub fn read_temperature(&mut self) -> Result<Reading, ControlError> {
        let raw = self.analog.sample()?;
        Ok(self.thermistor.measure(raw)?)
    }
}

fn error_response(request: &Request, err: &ControlError) -> Response {
    let status = err.status_code();
    match err {
        ControlError::Unauthorized => Response::text(status, "Unauthorized"),
        ControlError::MethodNotAllowed { .. } => Response::text(status, "Method Not Allowed"),
        ControlError::InvalidCommand(_) => Response::text(status, "Wrong parameters"),
        ControlError::RouteNotFound { .. } => Response::text(status, not_found_body(request)),
        ControlError::Sensor(_) | ControlError::Sample(_) | ControlError::Actuator(_) => {
            Response::json_error(status, err.to_string())
        }
    }
}

pub fn not_found_body(request: &Request) -> String {
    let mut message = String::from("File Not Found\n\n");
    let _ = write!(
        message,
        "URI: {}\nMethod: {}\nArguments: {}\n",
        request.path,
        request.method.as_str(),
        request.args.len()
    );
    for (name, value) in &request.args {
        let _ = writeln!(message, " {name}: {value}");
    }
    message
}
