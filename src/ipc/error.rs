use serde_json::json;

use super::types::{AppState, Request};
use rusqlite::Connection;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error carried out of a handler body and rendered with the request id.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn require_db<'s>(state: &'s AppState) -> Result<&'s Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::new("bad_params", format!("missing {key}"))),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    let value = req.params.get(key);
    value
        .and_then(|v| v.as_i64())
        .or_else(|| value.and_then(|v| v.as_str()).and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing or invalid {key}")))
}

/// Deserialize an optional params member, defaulting when absent.
pub fn optional_param<T>(req: &Request, key: &str) -> Result<T, HandlerErr>
where
    T: serde::de::DeserializeOwned + Default,
{
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::new("bad_params", format!("invalid {key}: {e}"))),
    }
}

/// Deserialize a params member that must be present.
pub fn required_param<T>(req: &Request, key: &str) -> Result<T, HandlerErr>
where
    T: serde::de::DeserializeOwned,
{
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => {
            Err(HandlerErr::new("bad_params", format!("missing {key}")))
        }
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::new("bad_params", format!("invalid {key}: {e}"))),
    }
}

/// Collapse a handler body into a response envelope.
pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}
