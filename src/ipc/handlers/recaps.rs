use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_period, get_required_i64, get_required_str, get_typed,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    self, AchievementNote, AttendanceRawData, AttendanceRecap, EvaluationEntry, EvaluationRecap,
    ManualKbmReport, Period, StudentAttendanceRecord,
};
use crate::pivot::{pivot_attendance_table, summarize_attendance};
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Group and category a recap is filed under, both checked against master data.
struct CellKey {
    group_id: String,
    category_id: i64,
    period: Period,
}

fn get_cell_key(conn: &Connection, params: &Value) -> Result<CellKey, HandlerErr> {
    let group_id = get_required_str(params, "groupId")?;
    let category_id = get_required_i64(params, "categoryId")?;
    let period = get_period(params)?;
    if store::group_by_id(conn, &group_id)
        .map_err(HandlerErr::query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("group", &group_id));
    }
    if !store::category_exists(conn, category_id).map_err(HandlerErr::query)? {
        return Err(HandlerErr::not_found("category", category_id));
    }
    Ok(CellKey {
        group_id,
        category_id,
        period,
    })
}

/// Upper bound for meeting counts, learner counts and per-student tallies.
const MAX_COUNT: u32 = 100_000;

/// Upper bound for the rows in one attendance recap.
const MAX_ATTENDANCES: usize = 10_000;

fn get_count(params: &Value, key: &str) -> Result<u32, HandlerErr> {
    let n = get_optional_i64(params, key)?.unwrap_or(0);
    match u32::try_from(n) {
        Ok(n) if n <= MAX_COUNT => Ok(n),
        _ => Err(HandlerErr::bad_params(format!(
            "{} must be in 0..={}",
            key, MAX_COUNT
        ))),
    }
}

fn get_percentage(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    let p = match params.get(key) {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?,
    };
    if !(0.0..=100.0).contains(&p) {
        return Err(HandlerErr::bad_params(format!("{} must be in 0..=100", key)));
    }
    Ok(p)
}

fn validate_attendances(meeting_count: u32, records: &[StudentAttendanceRecord]) -> Result<(), HandlerErr> {
    if records.len() > MAX_ATTENDANCES {
        return Err(HandlerErr::bad_params(format!(
            "attendances must have at most {} rows",
            MAX_ATTENDANCES
        )));
    }
    let mut seen = HashSet::new();
    for r in records {
        if r.student_id.trim().is_empty() {
            return Err(HandlerErr::bad_params("studentId must not be empty"));
        }
        if !seen.insert(r.student_id.as_str()) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("duplicate studentId: {}", r.student_id),
                details: Some(json!({ "studentId": r.student_id })),
            });
        }
        if r.total() > u64::from(meeting_count) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!(
                    "attendance for {} exceeds meetingCount {}",
                    r.student_id, meeting_count
                ),
                details: Some(json!({ "studentId": r.student_id, "meetingCount": meeting_count })),
            });
        }
    }
    Ok(())
}

fn attendance_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let key = get_cell_key(conn, params)?;
    let meeting_count = get_count(params, "meetingCount")?;
    let records: Vec<StudentAttendanceRecord> = get_typed(params, "attendances")?;
    validate_attendances(meeting_count, &records)?;

    let ids: Vec<String> = records.iter().map(|r| r.student_id.clone()).collect();
    let genders = store::generus_genders(conn, &ids).map_err(HandlerErr::query)?;
    let count_gender = |code: &str| -> u32 {
        genders
            .values()
            .filter(|g| g.trim().eq_ignore_ascii_case(code))
            .count() as u32
    };

    let totals = summarize_attendance(meeting_count, &records);
    let recap = AttendanceRecap {
        id: Uuid::new_v4().to_string(),
        group_id: key.group_id,
        category_id: key.category_id,
        period_month: key.period.month,
        period_year: key.period.year,
        meeting_count: totals.meeting_count,
        generus_count: totals.generus_count,
        raw_data: AttendanceRawData {
            count_male: count_gender("L"),
            count_female: count_gender("P"),
            count_total: totals.generus_count,
            attendances: records,
        },
        present_amount: totals.present_amount,
        present_percentage: totals.present_percentage,
        permission_amount: totals.permission_amount,
        permission_percentage: totals.permission_percentage,
        absent_amount: totals.absent_amount,
        absent_percentage: totals.absent_percentage,
    };
    let id = store::upsert_attendance_recap(conn, &recap)
        .map_err(|e| HandlerErr::update(e, "attendance_recaps"))?;
    debug!(recap_id = %id, period = %key.period.key(), "attendance recap saved");
    let saved = store::attendance_recap_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("attendanceRecap", &id))?;
    Ok(json!({ "id": id, "recap": saved }))
}

fn attendance_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let recap = store::attendance_recap_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("attendanceRecap", &id))?;
    Ok(json!({ "recap": recap }))
}

fn attendance_table(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let use_roster = params
        .get("useRoster")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let recap = store::attendance_recap_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("attendanceRecap", &id))?;

    let roster: Option<Vec<String>> = if use_roster {
        let generus = store::list_generus(conn, &recap.group_id, Some(recap.category_id))
            .map_err(HandlerErr::query)?;
        Some(generus.into_iter().map(|g| g.id).collect())
    } else {
        None
    };
    let table = pivot_attendance_table(&recap, roster.as_deref());
    Ok(json!({ "table": table }))
}

fn evaluation_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let key = get_cell_key(conn, params)?;
    let entries: Vec<EvaluationEntry> = get_typed(params, "entries")?;

    let mut seen = HashSet::new();
    for e in &entries {
        if !seen.insert(e.material_id) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("duplicate materialId: {}", e.material_id),
                details: Some(json!({ "materialId": e.material_id })),
            });
        }
        if e.scores.iter().any(|s| !s.score.is_finite()) {
            return Err(HandlerErr::bad_params(format!(
                "scores for material {} must be finite",
                e.material_id
            )));
        }
    }

    let recap = EvaluationRecap {
        id: Uuid::new_v4().to_string(),
        group_id: key.group_id,
        category_id: key.category_id,
        period_month: key.period.month,
        period_year: key.period.year,
        raw_data: entries,
        challenges: get_optional_str(params, "challenges"),
        solutions: get_optional_str(params, "solutions"),
        notes: get_optional_str(params, "notes"),
        achievement: get_optional_str(params, "achievement"),
    };
    let id = store::upsert_evaluation_recap(conn, &recap)
        .map_err(|e| HandlerErr::update(e, "evaluation_recaps"))?;
    debug!(recap_id = %id, period = %key.period.key(), "evaluation recap saved");
    let saved = store::evaluation_recap_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("evaluationRecap", &id))?;
    Ok(json!({ "id": id, "recap": saved }))
}

fn evaluation_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let recap = store::evaluation_recap_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("evaluationRecap", &id))?;
    Ok(json!({ "recap": recap }))
}

fn manual_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let key = get_cell_key(conn, params)?;
    let count_male = get_count(params, "countMale")?;
    let count_female = get_count(params, "countFemale")?;
    let count_total = count_male
        .checked_add(count_female)
        .ok_or_else(|| HandlerErr::bad_params("countMale + countFemale is too large"))?;

    let raw_data = match params.get("rawData") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => model::decode_manual_notes(&v.to_string())
            .map_err(|e| HandlerErr::bad_params(format!("rawData: {}", e)))?,
    };
    let achievements: Vec<AchievementNote> = match params.get("achievements") {
        None | Some(Value::Null) => Vec::new(),
        Some(_) => get_typed(params, "achievements")?,
    };

    let report = ManualKbmReport {
        id: Uuid::new_v4().to_string(),
        group_id: key.group_id,
        category_id: key.category_id,
        period_month: key.period.month,
        period_year: key.period.year,
        count_male,
        count_female,
        count_total,
        present_percentage: get_percentage(params, "presentPercentage")?,
        permission_percentage: get_percentage(params, "permissionPercentage")?,
        absent_percentage: get_percentage(params, "absentPercentage")?,
        raw_data,
        achievements,
        program_success_info: get_optional_str(params, "programSuccessInfo"),
        challenges_info: get_optional_str(params, "challengesInfo"),
    };
    let id = store::upsert_manual_report(conn, &report)
        .map_err(|e| HandlerErr::update(e, "manual_reports"))?;
    debug!(report_id = %id, period = %key.period.key(), "manual report saved");
    let saved = store::manual_report_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("manualReport", &id))?;
    Ok(json!({ "id": id, "report": saved }))
}

fn manual_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let report = store::manual_report_by_id(conn, &id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("manualReport", &id))?;
    Ok(json!({ "report": report }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "attendanceRecaps.upsert" => attendance_upsert,
        "attendanceRecaps.get" => attendance_get,
        "attendanceRecaps.table" => attendance_table,
        "evaluationRecaps.upsert" => evaluation_upsert,
        "evaluationRecaps.get" => evaluation_get,
        "manualReports.upsert" => manual_upsert,
        "manualReports.get" => manual_get,
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
