use crate::error::AggregateError;
use serde_json::json;

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

/// Failure inside a handler body, turned into an error response at the edge.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self {
            code: "not_found",
            message: format!("{} not found: {}", what, id),
            details: Some(json!({ "entity": what, "id": id.to_string() })),
        }
    }

    pub fn query(e: anyhow::Error) -> Self {
        Self {
            code: "db_query_failed",
            message: format!("{e:#}"),
            details: None,
        }
    }

    pub fn update(e: anyhow::Error, table: &str) -> Self {
        Self {
            code: "db_update_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AggregateError> for HandlerErr {
    fn from(e: AggregateError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}
