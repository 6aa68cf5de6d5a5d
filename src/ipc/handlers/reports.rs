use super::setup::{load_bucketer, load_default_view};
use crate::bucket::ViewMode;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_period, get_required_i64, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::pivot::{pivot_census, pivot_headcount};
use crate::store::{self, CountScope, SqliteSource};
use crate::village::{build_cell, build_village_matrix};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

fn get_scope(params: &Value) -> CountScope {
    CountScope {
        village_id: get_optional_str(params, "villageId"),
        group_id: get_optional_str(params, "groupId"),
    }
}

fn get_view(conn: &Connection, params: &Value) -> Result<ViewMode, HandlerErr> {
    match params.get("viewMode") {
        None | Some(Value::Null) => load_default_view(conn).map_err(HandlerErr::query),
        Some(Value::String(raw)) => Ok(ViewMode::parse(raw)),
        Some(_) => Err(HandlerErr::bad_params("viewMode must be a string")),
    }
}

fn stats_headcount(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let view = get_view(conn, params)?;
    let bucketer = load_bucketer(conn).map_err(HandlerErr::query)?;
    let rows = store::headcount_rows(conn, &get_scope(params)).map_err(HandlerErr::query)?;
    let pivot = pivot_headcount(&rows, &bucketer, view);
    Ok(json!({
        "viewMode": view.as_str(),
        "rows": pivot.rows,
        "grandTotal": pivot.grand_total
    }))
}

fn stats_census(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let view = get_view(conn, params)?;
    let bucketer = load_bucketer(conn).map_err(HandlerErr::query)?;
    let rows = store::census_rows(conn, &get_scope(params)).map_err(HandlerErr::query)?;
    let pivot = pivot_census(&rows, &bucketer, view);

    let row_totals: Vec<Value> = pivot
        .categories
        .iter()
        .map(|c| json!({ "categoryId": c.id, "counts": pivot.row_total(c.id) }))
        .collect();
    let column_totals: Vec<Value> = pivot
        .groups
        .iter()
        .map(|g| json!({ "groupId": g.id, "counts": pivot.column_total(&g.id) }))
        .collect();
    Ok(json!({
        "viewMode": view.as_str(),
        "groups": pivot.groups,
        "categories": pivot.categories,
        "matrix": pivot.matrix,
        "rowTotals": row_totals,
        "columnTotals": column_totals,
        "grandTotal": pivot.grand_total()
    }))
}

fn reports_cell(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let category_id = get_required_i64(params, "categoryId")?;
    let period = get_period(params)?;
    let group = store::group_by_id(conn, &group_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("group", &group_id))?;
    if !store::category_exists(conn, category_id).map_err(HandlerErr::query)? {
        return Err(HandlerErr::not_found("category", category_id));
    }

    let report = build_cell(&SqliteSource::new(conn), &group, category_id, period);
    for d in &report.degraded_sources {
        warn!(source = d.source.as_str(), group_id = %group.id, error = %d.message, "recap source degraded");
    }
    serde_json::to_value(&report).map_err(|e| HandlerErr::query(e.into()))
}

fn reports_village_matrix(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let village_id = get_required_str(params, "villageId")?;
    let period = get_period(params)?;
    let matrix = build_village_matrix(&SqliteSource::new(conn), &village_id, period)?;
    if matrix.is_degraded() {
        for d in &matrix.degraded_sources {
            warn!(source = d.source.as_str(), %village_id, error = %d.message, "recap source degraded");
        }
    }
    debug!(%village_id, cells = matrix.cell_count(), "village matrix ready");

    let row_totals: Vec<Value> = matrix
        .categories
        .iter()
        .map(|c| json!({ "categoryId": c.id, "counts": matrix.row_totals(c.id) }))
        .collect();
    let column_totals: Vec<Value> = matrix
        .groups
        .iter()
        .map(|g| json!({ "groupId": g.id, "counts": matrix.column_totals(&g.id) }))
        .collect();
    let mut materials = Map::new();
    for c in &matrix.categories {
        let rows = matrix.materials_by_category(c.id);
        if !rows.is_empty() {
            materials.insert(c.id.to_string(), json!(rows));
        }
    }

    let mut out = serde_json::to_value(&matrix).map_err(|e| HandlerErr::query(e.into()))?;
    if let Some(obj) = out.as_object_mut() {
        obj.insert("rowTotals".into(), Value::Array(row_totals));
        obj.insert("columnTotals".into(), Value::Array(column_totals));
        obj.insert("materialsByCategory".into(), Value::Object(materials));
    }
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "stats.headcount" => stats_headcount,
        "stats.census" => stats_census,
        "reports.cell" => reports_cell,
        "reports.villageMatrix" => reports_village_matrix,
        _ => return None,
    };
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match handler(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
