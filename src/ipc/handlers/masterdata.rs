use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_i64, get_required_i64, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Category, MaterialCategory};
use crate::store::{self, SqliteSource};
use crate::village::ReportSource;
use rusqlite::Connection;
use serde_json::json;

const MAX_NAME_LEN: usize = 128;

fn get_name(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let name = get_required_str(params, "name")?;
    if name.len() > MAX_NAME_LEN {
        return Err(HandlerErr::bad_params(format!(
            "name length must be <= {}",
            MAX_NAME_LEN
        )));
    }
    Ok(name)
}

fn villages_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_name(params)?;
    let village = store::create_village(conn, &name).map_err(|e| HandlerErr::update(e, "villages"))?;
    Ok(json!({ "village": village }))
}

fn villages_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let villages = store::list_villages(conn).map_err(HandlerErr::query)?;
    Ok(json!({ "villages": villages }))
}

fn groups_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let village_id = get_required_str(params, "villageId")?;
    let name = get_name(params)?;
    let source = SqliteSource::new(conn);
    if source.village(&village_id).map_err(HandlerErr::query)?.is_none() {
        return Err(HandlerErr::not_found("village", &village_id));
    }
    let group = store::create_group(conn, &village_id, &name)
        .map_err(|e| HandlerErr::update(e, "learning_groups"))?;
    Ok(json!({ "group": group }))
}

fn groups_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let village_id = get_required_str(params, "villageId")?;
    let groups = SqliteSource::new(conn)
        .groups(&village_id)
        .map_err(HandlerErr::query)?;
    Ok(json!({ "groups": groups }))
}

fn categories_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let category = Category {
        id: get_required_i64(params, "id")?,
        name: get_name(params)?,
    };
    store::upsert_category(conn, &category).map_err(|e| HandlerErr::update(e, "categories"))?;
    Ok(json!({ "category": category }))
}

fn categories_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let categories = SqliteSource::new(conn)
        .categories()
        .map_err(HandlerErr::query)?;
    Ok(json!({ "categories": categories }))
}

fn material_categories_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mc = MaterialCategory {
        id: get_required_i64(params, "id")?,
        name: get_name(params)?,
    };
    store::upsert_material_category(conn, &mc)
        .map_err(|e| HandlerErr::update(e, "material_categories"))?;
    Ok(json!({ "materialCategory": mc }))
}

fn material_categories_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let material_categories = SqliteSource::new(conn)
        .material_categories()
        .map_err(HandlerErr::query)?;
    Ok(json!({ "materialCategories": material_categories }))
}

fn parse_gender(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, "gender")?.to_ascii_uppercase();
    match raw.as_str() {
        "L" | "P" => Ok(raw),
        _ => Err(HandlerErr::bad_params("gender must be one of: L, P")),
    }
}

fn generus_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let category_id = get_required_i64(params, "categoryId")?;
    let name = get_name(params)?;
    let gender = parse_gender(params)?;

    if store::group_by_id(conn, &group_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("group", &group_id));
    }
    if !store::category_exists(conn, category_id).map_err(HandlerErr::query)? {
        return Err(HandlerErr::not_found("category", category_id));
    }
    let generus = store::create_generus(conn, &group_id, category_id, &name, &gender)
        .map_err(|e| HandlerErr::update(e, "generus"))?;
    Ok(json!({ "generus": generus }))
}

fn generus_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let category_id = get_optional_i64(params, "categoryId")?;
    let generus = store::list_generus(conn, &group_id, category_id).map_err(HandlerErr::query)?;
    Ok(json!({ "generus": generus }))
}

/// Removed learners keep their id so past recaps still resolve, but they leave
/// the roster and the headcount.
fn generus_deactivate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let changed = store::deactivate_generus(conn, &id).map_err(|e| HandlerErr::update(e, "generus"))?;
    if !changed {
        return Err(HandlerErr::not_found("generus", &id));
    }
    Ok(json!({ "id": id, "active": false }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "villages.create" => villages_create,
            "villages.list" => villages_list,
            "groups.create" => groups_create,
            "groups.list" => groups_list,
            "categories.upsert" => categories_upsert,
            "categories.list" => categories_list,
            "materialCategories.upsert" => material_categories_upsert,
            "materialCategories.list" => material_categories_list,
            "generus.create" => generus_create,
            "generus.list" => generus_list,
            "generus.deactivate" => generus_deactivate,
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
