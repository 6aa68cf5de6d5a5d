use crate::bucket::{
    CategoryBucketer, ViewMode, DEFAULT_BUCKET_ID, DEFAULT_BUCKET_NAME,
    DEFAULT_JUNIOR_CATEGORY_IDS,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::warn;

#[derive(Clone, Copy)]
enum SetupSection {
    CategoryBuckets,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "categoryBuckets" => Some(Self::CategoryBuckets),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::CategoryBuckets => "setup.categoryBuckets",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::CategoryBuckets => json!({
            "juniorCategoryIds": DEFAULT_JUNIOR_CATEGORY_IDS,
            "bucketId": DEFAULT_BUCKET_ID,
            "bucketName": DEFAULT_BUCKET_NAME
        }),
        SetupSection::Reports => json!({
            "defaultViewMode": ViewMode::default().as_str()
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64(v: &Value, key: &str) -> Result<i64, String> {
    v.as_i64().ok_or_else(|| format!("{} must be integer", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_id_list(v: &Value, key: &str) -> Result<Vec<i64>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of integers", key))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let id = parse_i64(item, key)?;
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out.sort_unstable();
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::CategoryBuckets => match k.as_str() {
                "juniorCategoryIds" => {
                    obj.insert(k.clone(), json!(parse_id_list(v, k)?));
                }
                "bucketId" => {
                    obj.insert(k.clone(), Value::from(parse_i64(v, k)?));
                }
                "bucketName" => {
                    let s = parse_string_max(v, k, 64)?;
                    if s.is_empty() {
                        return Err("bucketName must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown categoryBuckets field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "defaultViewMode" => {
                    let s = parse_string_max(v, k, 16)?.to_ascii_lowercase();
                    if s != "summary" && s != "all" {
                        return Err("defaultViewMode must be one of: summary, all".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                warn!(section = section.key(), %msg, "ignoring malformed saved setup");
            }
        }
    }
    Ok(current)
}

/// Bucketing configuration for the current workspace, defaults filled in.
pub fn load_bucketer(conn: &rusqlite::Connection) -> anyhow::Result<CategoryBucketer> {
    let section = load_section(conn, SetupSection::CategoryBuckets)?;
    let ids = section
        .get("juniorCategoryIds")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_i64()).collect::<Vec<_>>())
        .unwrap_or_default();
    let bucket_id = section
        .get("bucketId")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_BUCKET_ID);
    let bucket_name = section
        .get("bucketName")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_BUCKET_NAME);
    Ok(CategoryBucketer::new(ids, bucket_id, bucket_name))
}

pub fn load_default_view(conn: &rusqlite::Connection) -> anyhow::Result<ViewMode> {
    let section = load_section(conn, SetupSection::Reports)?;
    Ok(section
        .get("defaultViewMode")
        .and_then(|v| v.as_str())
        .map(ViewMode::parse)
        .unwrap_or_default())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let category_buckets = match load_section(conn, SetupSection::CategoryBuckets) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let reports = match load_section(conn, SetupSection::Reports) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "categoryBuckets": category_buckets,
            "reports": reports
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_patch_normalises_ids() {
        let mut current = default_section(SetupSection::CategoryBuckets);
        let patch = json!({ "juniorCategoryIds": [7, 3, 7, 1], "bucketName": "  Junior  " });
        merge_section_patch(
            SetupSection::CategoryBuckets,
            &mut current,
            patch.as_object().expect("object"),
        )
        .expect("valid patch");
        assert_eq!(current["juniorCategoryIds"], json!([1, 3, 7]));
        assert_eq!(current["bucketName"], json!("Junior"));
        assert_eq!(current["bucketId"], json!(0));
    }

    #[test]
    fn unknown_and_invalid_fields_are_rejected() {
        let mut current = default_section(SetupSection::Reports);
        let bad_mode = json!({ "defaultViewMode": "compact" });
        assert!(merge_section_patch(
            SetupSection::Reports,
            &mut current,
            bad_mode.as_object().expect("object")
        )
        .is_err());

        let mut buckets = default_section(SetupSection::CategoryBuckets);
        let unknown = json!({ "colour": "red" });
        assert!(merge_section_patch(
            SetupSection::CategoryBuckets,
            &mut buckets,
            unknown.as_object().expect("object")
        )
        .is_err());
        let long_name = json!({ "bucketName": "x".repeat(65) });
        assert!(merge_section_patch(
            SetupSection::CategoryBuckets,
            &mut buckets,
            long_name.as_object().expect("object")
        )
        .is_err());
    }
}
