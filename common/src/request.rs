use serde::Serialize;

use crate::types::ErrorBody;

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Argument name the raw body is stored under when it is not form encoded.
pub const PLAIN_BODY_ARG: &str = "plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Patch,
    Post,
    Delete,
    Other(String),
}

impl Method {
    /// Method tokens are case-sensitive; `patch` is not `PATCH`.
    pub fn parse(value: &str) -> Self {
        match value {
            "GET" => Self::Get,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "POST" => Self::Post,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub args: Vec<(String, String)>,
    pub caller: Option<String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            args: Vec::new(),
            caller: None,
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn with_args(mut self, args: Vec<(String, String)>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_caller(mut self, caller: Option<String>) -> Self {
        self.caller = caller;
        self
    }

    /// Positional lookup, the way the heater route reads its command.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl Response {
    pub fn text(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            content_type: Some(CONTENT_TYPE_TEXT),
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(status_code: u16, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self {
                status_code,
                content_type: Some(CONTENT_TYPE_JSON),
                body,
            },
            Err(err) => Self::text(500, format!("response serialization failed: {err}")),
        }
    }

    pub fn json_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::json(
            status_code,
            &ErrorBody {
                error: message.into(),
            },
        )
    }

    pub fn no_content() -> Self {
        Self {
            status_code: 204,
            content_type: None,
            body: String::new(),
        }
    }
}

/// Splits `a=1&b=two` into ordered pairs. `+` is a space and `%XX` escapes
/// are decoded; undecodable pairs are kept verbatim.
pub fn parse_urlencoded(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Query arguments first, then body arguments. Form bodies contribute their
/// pairs; any other non-empty body becomes a single `plain` argument.
pub fn collect_args(
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Vec<(String, String)> {
    let mut args = query.map(parse_urlencoded).unwrap_or_default();
    if body.is_empty() {
        return args;
    }

    let body = String::from_utf8_lossy(body);
    let is_form = content_type
        .map(|value| value.trim_start().starts_with(CONTENT_TYPE_FORM))
        .unwrap_or(false);
    if is_form {
        args.extend(parse_urlencoded(&body));
    } else {
        args.push((PLAIN_BODY_ARG.to_string(), body.into_owned()));
    }
    args
}
