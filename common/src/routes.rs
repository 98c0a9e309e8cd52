use crate::request::Method;

pub const ROUTE_ROOT: &str = "/";
pub const ROUTE_HEATER: &str = "/heater/";
pub const ROUTE_HEATER_STATUS: &str = "/heater-status/";
pub const ROUTE_TEMPERATURE: &str = "/temperature/";

pub const GREETING: &str = "hello from GarageController nr1!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Root,
    Heater,
    HeaterStatus,
    Temperature,
}

impl Route {
    pub const ALL: [Route; 4] = [
        Route::Root,
        Route::Heater,
        Route::HeaterStatus,
        Route::Temperature,
    ];

    /// Exact, case-sensitive path match.
    pub fn resolve(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.path() == path)
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Root => ROUTE_ROOT,
            Self::Heater => ROUTE_HEATER,
            Self::HeaterStatus => ROUTE_HEATER_STATUS,
            Self::Temperature => ROUTE_TEMPERATURE,
        }
    }

    /// Method the route accepts. `None` means any verb.
    pub fn method(self) -> Option<Method> {
        match self {
            Self::Root => None,
            Self::Heater => Some(Method::Patch),
            Self::HeaterStatus | Self::Temperature => Some(Method::Get),
        }
    }

    pub fn requires_auth(self) -> bool {
        !matches!(self, Self::Root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_paths_only() {
        assert_eq!(Route::resolve("/"), Some(Route::Root));
        assert_eq!(Route::resolve("/heater/"), Some(Route::Heater));
        assert_eq!(Route::resolve("/heater"), None);
        assert_eq!(Route::resolve("/Temperature/"), None);
    }

    #[test]
    fn root_accepts_any_method() {
        assert_eq!(Route::Root.method(), None);
        assert_eq!(Route::Heater.method(), Some(Method::Patch));
        assert_eq!(Route::Temperature.method(), Some(Method::Get));
    }

    #[test]
    fn only_root_is_unguarded() {
        let guarded: Vec<_> = Route::ALL
            .into_iter()
            .filter(|route| route.requires_auth())
            .collect();
        assert_eq!(
            guarded,
            vec![Route::Heater, Route::HeaterStatus, Route::Temperature]
        );
    }
}
