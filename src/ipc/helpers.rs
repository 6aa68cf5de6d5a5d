use crate::ipc::error::HandlerErr;
use crate::model::Period;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

/// Accepts either `period: "YYYY-MM"` or separate `month` and `year`.
pub fn get_period(params: &Value) -> Result<Period, HandlerErr> {
    if let Some(key) = params.get("period").and_then(|v| v.as_str()) {
        return Ok(Period::parse_key(key)?);
    }
    let month = get_required_i64(params, "month")?;
    let year = get_required_i64(params, "year")?;
    let month = u32::try_from(month).map_err(|_| HandlerErr::bad_params("month out of range"))?;
    let year = i32::try_from(year).map_err(|_| HandlerErr::bad_params("year out of range"))?;
    Ok(Period::new(month, year)?)
}

/// Deserializes one param into a typed value.
pub fn get_typed<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, HandlerErr> {
    let raw = params
        .get(key)
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    serde_json::from_value(raw).map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e)))
}
