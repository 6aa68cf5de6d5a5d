use crate::model::{
    self, AchievementNote, AttendanceRawData, AttendanceRecap, Category, EvaluationEntry,
    EvaluationRecap, Generus, Group, ManualKbmReport, MaterialCategory, Village,
};
use crate::pivot::{CensusRow, HeadcountRow};
use crate::village::{RecapQuery, ReportSource};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Which learners a headcount or census covers. Both `None` means every group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountScope {
    pub village_id: Option<String>,
    pub group_id: Option<String>,
}

/// SQLite-backed collaborator for the aggregation core.
pub struct SqliteSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const ATTENDANCE_COLUMNS: &str = "r.id, r.group_id, r.category_id, r.period_month, r.period_year,
    r.meeting_count, r.generus_count, r.raw_data,
    r.present_amount, r.present_percentage, r.permission_amount, r.permission_percentage,
    r.absent_amount, r.absent_percentage";

const EVALUATION_COLUMNS: &str = "r.id, r.group_id, r.category_id, r.period_month, r.period_year,
    r.raw_data, r.challenges, r.solutions, r.notes, r.achievement";

const MANUAL_COLUMNS: &str = "r.id, r.group_id, r.category_id, r.period_month, r.period_year,
    r.count_male, r.count_female, r.count_total,
    r.present_percentage, r.permission_percentage, r.absent_percentage,
    r.raw_data, r.achievements, r.program_success_info, r.challenges_info";

/// Row shape before the JSON columns are decoded.
struct Undecoded<T> {
    row: T,
    raw_data: String,
    extra: Option<String>,
}

fn attendance_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Undecoded<AttendanceRecap>> {
    Ok(Undecoded {
        row: AttendanceRecap {
            id: r.get(0)?,
            group_id: r.get(1)?,
            category_id: r.get(2)?,
            period_month: r.get(3)?,
            period_year: r.get(4)?,
            meeting_count: r.get(5)?,
            generus_count: r.get(6)?,
            raw_data: AttendanceRawData::default(),
            present_amount: r.get(8)?,
            present_percentage: r.get(9)?,
            permission_amount: r.get(10)?,
            permission_percentage: r.get(11)?,
            absent_amount: r.get(12)?,
            absent_percentage: r.get(13)?,
        },
        raw_data: r.get(7)?,
        extra: None,
    })
}

fn decode_attendance(u: Undecoded<AttendanceRecap>) -> anyhow::Result<AttendanceRecap> {
    let mut recap = u.row;
    recap.raw_data = serde_json::from_str(&u.raw_data)
        .with_context(|| format!("attendance recap {} has malformed raw_data", recap.id))?;
    Ok(recap)
}

fn evaluation_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Undecoded<EvaluationRecap>> {
    Ok(Undecoded {
        row: EvaluationRecap {
            id: r.get(0)?,
            group_id: r.get(1)?,
            category_id: r.get(2)?,
            period_month: r.get(3)?,
            period_year: r.get(4)?,
            raw_data: Vec::new(),
            challenges: r.get(6)?,
            solutions: r.get(7)?,
            notes: r.get(8)?,
            achievement: r.get(9)?,
        },
        raw_data: r.get(5)?,
        extra: None,
    })
}

fn decode_evaluation(u: Undecoded<EvaluationRecap>) -> anyhow::Result<EvaluationRecap> {
    let mut recap = u.row;
    recap.raw_data = serde_json::from_str::<Vec<EvaluationEntry>>(&u.raw_data)
        .with_context(|| format!("evaluation recap {} has malformed raw_data", recap.id))?;
    Ok(recap)
}

fn manual_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Undecoded<ManualKbmReport>> {
    Ok(Undecoded {
        row: ManualKbmReport {
            id: r.get(0)?,
            group_id: r.get(1)?,
            category_id: r.get(2)?,
            period_month: r.get(3)?,
            period_year: r.get(4)?,
            count_male: r.get(5)?,
            count_female: r.get(6)?,
            count_total: r.get(7)?,
            present_percentage: r.get(8)?,
            permission_percentage: r.get(9)?,
            absent_percentage: r.get(10)?,
            raw_data: Vec::new(),
            achievements: Vec::new(),
            program_success_info: r.get(13)?,
            challenges_info: r.get(14)?,
        },
        raw_data: r.get(11)?,
        extra: r.get(12)?,
    })
}

fn decode_manual(u: Undecoded<ManualKbmReport>) -> anyhow::Result<ManualKbmReport> {
    let mut report = u.row;
    report.raw_data = model::decode_manual_notes(&u.raw_data)
        .with_context(|| format!("manual report {} has malformed raw_data", report.id))?;
    report.achievements = match u.extra.as_deref() {
        Some(text) => serde_json::from_str::<Vec<AchievementNote>>(text)
            .with_context(|| format!("manual report {} has malformed achievements", report.id))?,
        None => Vec::new(),
    };
    Ok(report)
}

fn fetch_decoded<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<Undecoded<T>>,
    decode: fn(Undecoded<T>) -> anyhow::Result<T>,
) -> anyhow::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode).collect()
}

fn period_sql(columns: &str, table: &str) -> String {
    format!(
        "SELECT {}
         FROM {} r
         JOIN learning_groups g ON g.id = r.group_id
         WHERE g.village_id = ?1
           AND r.period_month = ?2
           AND r.period_year = ?3
           AND (?4 IS NULL OR r.group_id = ?4)
         ORDER BY g.name, r.category_id",
        columns, table
    )
}

fn by_id_sql(columns: &str, table: &str) -> String {
    format!("SELECT {} FROM {} r WHERE r.id = ?1", columns, table)
}

impl ReportSource for SqliteSource<'_> {
    fn village(&self, village_id: &str) -> anyhow::Result<Option<Village>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM villages WHERE id = ?",
                [village_id],
                |r| {
                    Ok(Village {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn groups(&self, village_id: &str) -> anyhow::Result<Vec<Group>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, village_id, name
             FROM learning_groups
             WHERE village_id = ?
             ORDER BY name, id",
        )?;
        let rows = stmt
            .query_map([village_id], |r| {
                Ok(Group {
                    id: r.get(0)?,
                    village_id: r.get(1)?,
                    name: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn categories(&self) -> anyhow::Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Category {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn material_categories(&self) -> anyhow::Result<Vec<MaterialCategory>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM material_categories ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(MaterialCategory {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn manual_reports(&self, q: &RecapQuery<'_>) -> anyhow::Result<Vec<ManualKbmReport>> {
        fetch_decoded(
            self.conn,
            &period_sql(MANUAL_COLUMNS, "manual_reports"),
            params![q.village_id, q.period.month, q.period.year, q.group_id],
            manual_from_row,
            decode_manual,
        )
    }

    fn attendance_recaps(&self, q: &RecapQuery<'_>) -> anyhow::Result<Vec<AttendanceRecap>> {
        fetch_decoded(
            self.conn,
            &period_sql(ATTENDANCE_COLUMNS, "attendance_recaps"),
            params![q.village_id, q.period.month, q.period.year, q.group_id],
            attendance_from_row,
            decode_attendance,
        )
    }

    fn evaluation_recaps(&self, q: &RecapQuery<'_>) -> anyhow::Result<Vec<EvaluationRecap>> {
        fetch_decoded(
            self.conn,
            &period_sql(EVALUATION_COLUMNS, "evaluation_recaps"),
            params![q.village_id, q.period.month, q.period.year, q.group_id],
            evaluation_from_row,
            decode_evaluation,
        )
    }
}

pub fn attendance_recap_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<AttendanceRecap>> {
    let mut rows = fetch_decoded(
        conn,
        &by_id_sql(ATTENDANCE_COLUMNS, "attendance_recaps"),
        [id],
        attendance_from_row,
        decode_attendance,
    )?;
    Ok(rows.pop())
}

pub fn evaluation_recap_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<EvaluationRecap>> {
    let mut rows = fetch_decoded(
        conn,
        &by_id_sql(EVALUATION_COLUMNS, "evaluation_recaps"),
        [id],
        evaluation_from_row,
        decode_evaluation,
    )?;
    Ok(rows.pop())
}

pub fn manual_report_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<ManualKbmReport>> {
    let mut rows = fetch_decoded(
        conn,
        &by_id_sql(MANUAL_COLUMNS, "manual_reports"),
        [id],
        manual_from_row,
        decode_manual,
    )?;
    Ok(rows.pop())
}

pub fn list_villages(conn: &Connection) -> anyhow::Result<Vec<Village>> {
    let mut stmt = conn.prepare("SELECT id, name FROM villages ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Village {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_village(conn: &Connection, name: &str) -> anyhow::Result<Village> {
    let village = Village {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
    };
    conn.execute(
        "INSERT INTO villages(id, name) VALUES(?, ?)",
        (&village.id, &village.name),
    )?;
    Ok(village)
}

pub fn group_by_id(conn: &Connection, group_id: &str) -> anyhow::Result<Option<Group>> {
    Ok(conn
        .query_row(
            "SELECT id, village_id, name FROM learning_groups WHERE id = ?",
            [group_id],
            |r| {
                Ok(Group {
                    id: r.get(0)?,
                    village_id: r.get(1)?,
                    name: r.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn create_group(conn: &Connection, village_id: &str, name: &str) -> anyhow::Result<Group> {
    let group = Group {
        id: Uuid::new_v4().to_string(),
        village_id: village_id.to_string(),
        name: name.to_string(),
    };
    conn.execute(
        "INSERT INTO learning_groups(id, village_id, name) VALUES(?, ?, ?)",
        (&group.id, &group.village_id, &group.name),
    )?;
    Ok(group)
}

pub fn category_exists(conn: &Connection, category_id: i64) -> anyhow::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM categories WHERE id = ?", [category_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn upsert_category(conn: &Connection, category: &Category) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO categories(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        (category.id, &category.name),
    )?;
    Ok(())
}

pub fn upsert_material_category(conn: &Connection, mc: &MaterialCategory) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO material_categories(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        (mc.id, &mc.name),
    )?;
    Ok(())
}

pub fn create_generus(
    conn: &Connection,
    group_id: &str,
    category_id: i64,
    name: &str,
    gender: &str,
) -> anyhow::Result<Generus> {
    let generus = Generus {
        id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        category_id,
        name: name.to_string(),
        gender: gender.to_string(),
    };
    conn.execute(
        "INSERT INTO generus(id, group_id, category_id, name, gender, active, updated_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        params![
            generus.id,
            generus.group_id,
            generus.category_id,
            generus.name,
            generus.gender,
            now_stamp()
        ],
    )?;
    Ok(generus)
}

/// Returns false when no active learner has that id.
pub fn deactivate_generus(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE generus SET active = 0, updated_at = ? WHERE id = ? AND active = 1",
        params![now_stamp(), id],
    )?;
    Ok(changed > 0)
}

pub fn list_generus(
    conn: &Connection,
    group_id: &str,
    category_id: Option<i64>,
) -> anyhow::Result<Vec<Generus>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, category_id, name, gender
         FROM generus
         WHERE group_id = ?1
           AND active = 1
           AND (?2 IS NULL OR category_id = ?2)
         ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map(params![group_id, category_id], |r| {
            Ok(Generus {
                id: r.get(0)?,
                group_id: r.get(1)?,
                category_id: r.get(2)?,
                name: r.get(3)?,
                gender: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Gender codes for the given learner ids; unknown ids are simply absent.
pub fn generus_genders(conn: &Connection, ids: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT gender FROM generus WHERE id = ?")?;
    let mut out = HashMap::new();
    for id in ids {
        if let Some(g) = stmt
            .query_row([id], |r| r.get::<_, String>(0))
            .optional()?
        {
            out.insert(id.clone(), g);
        }
    }
    Ok(out)
}

fn id_for_cell(
    conn: &Connection,
    table: &str,
    group_id: &str,
    category_id: i64,
    month: u32,
    year: i32,
) -> anyhow::Result<String> {
    let sql = format!(
        "SELECT id FROM {} WHERE group_id = ? AND category_id = ? AND period_month = ? AND period_year = ?",
        table
    );
    Ok(conn.query_row(&sql, params![group_id, category_id, month, year], |r| r.get(0))?)
}

/// Inserts or replaces the recap for its (group, category, period). The first id
/// assigned to a cell is kept across updates.
pub fn upsert_attendance_recap(conn: &Connection, recap: &AttendanceRecap) -> anyhow::Result<String> {
    let raw = serde_json::to_string(&recap.raw_data)?;
    conn.execute(
        "INSERT INTO attendance_recaps(
            id, group_id, category_id, period_month, period_year,
            meeting_count, generus_count, raw_data,
            present_amount, present_percentage, permission_amount, permission_percentage,
            absent_amount, absent_percentage, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(group_id, category_id, period_month, period_year) DO UPDATE SET
           meeting_count = excluded.meeting_count,
           generus_count = excluded.generus_count,
           raw_data = excluded.raw_data,
           present_amount = excluded.present_amount,
           present_percentage = excluded.present_percentage,
           permission_amount = excluded.permission_amount,
           permission_percentage = excluded.permission_percentage,
           absent_amount = excluded.absent_amount,
           absent_percentage = excluded.absent_percentage,
           updated_at = excluded.updated_at",
        params![
            recap.id,
            recap.group_id,
            recap.category_id,
            recap.period_month,
            recap.period_year,
            recap.meeting_count,
            recap.generus_count,
            raw,
            recap.present_amount,
            recap.present_percentage,
            recap.permission_amount,
            recap.permission_percentage,
            recap.absent_amount,
            recap.absent_percentage,
            now_stamp()
        ],
    )?;
    id_for_cell(
        conn,
        "attendance_recaps",
        &recap.group_id,
        recap.category_id,
        recap.period_month,
        recap.period_year,
    )
}

pub fn upsert_evaluation_recap(conn: &Connection, recap: &EvaluationRecap) -> anyhow::Result<String> {
    let raw = serde_json::to_string(&recap.raw_data)?;
    conn.execute(
        "INSERT INTO evaluation_recaps(
            id, group_id, category_id, period_month, period_year,
            raw_data, challenges, solutions, notes, achievement, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(group_id, category_id, period_month, period_year) DO UPDATE SET
           raw_data = excluded.raw_data,
           challenges = excluded.challenges,
           solutions = excluded.solutions,
           notes = excluded.notes,
           achievement = excluded.achievement,
           updated_at = excluded.updated_at",
        params![
            recap.id,
            recap.group_id,
            recap.category_id,
            recap.period_month,
            recap.period_year,
            raw,
            recap.challenges,
            recap.solutions,
            recap.notes,
            recap.achievement,
            now_stamp()
        ],
    )?;
    id_for_cell(
        conn,
        "evaluation_recaps",
        &recap.group_id,
        recap.category_id,
        recap.period_month,
        recap.period_year,
    )
}

pub fn upsert_manual_report(conn: &Connection, report: &ManualKbmReport) -> anyhow::Result<String> {
    let raw = model::encode_manual_notes(&report.raw_data)?;
    let achievements = serde_json::to_string(&report.achievements)?;
    conn.execute(
        "INSERT INTO manual_reports(
            id, group_id, category_id, period_month, period_year,
            count_male, count_female, count_total,
            present_percentage, permission_percentage, absent_percentage,
            raw_data, achievements, program_success_info, challenges_info, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(group_id, category_id, period_month, period_year) DO UPDATE SET
           count_male = excluded.count_male,
           count_female = excluded.count_female,
           count_total = excluded.count_total,
           present_percentage = excluded.present_percentage,
           permission_percentage = excluded.permission_percentage,
           absent_percentage = excluded.absent_percentage,
           raw_data = excluded.raw_data,
           achievements = excluded.achievements,
           program_success_info = excluded.program_success_info,
           challenges_info = excluded.challenges_info,
           updated_at = excluded.updated_at",
        params![
            report.id,
            report.group_id,
            report.category_id,
            report.period_month,
            report.period_year,
            report.count_male,
            report.count_female,
            report.count_total,
            report.present_percentage,
            report.permission_percentage,
            report.absent_percentage,
            raw,
            achievements,
            report.program_success_info,
            report.challenges_info,
            now_stamp()
        ],
    )?;
    id_for_cell(
        conn,
        "manual_reports",
        &report.group_id,
        report.category_id,
        report.period_month,
        report.period_year,
    )
}

/// Per (category, group, gender) learner counts, already summed in SQL.
pub fn census_rows(conn: &Connection, scope: &CountScope) -> anyhow::Result<Vec<CensusRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, g.id, g.name, ge.gender, COUNT(*)
         FROM generus ge
         JOIN categories c ON c.id = ge.category_id
         JOIN learning_groups g ON g.id = ge.group_id
         WHERE ge.active = 1
           AND (?1 IS NULL OR g.village_id = ?1)
           AND (?2 IS NULL OR g.id = ?2)
         GROUP BY c.id, c.name, g.id, g.name, ge.gender
         ORDER BY c.id, g.name, g.id, ge.gender",
    )?;
    let rows = stmt
        .query_map(params![scope.village_id, scope.group_id], |r| {
            Ok(CensusRow {
                category_id: r.get(0)?,
                category_name: r.get(1)?,
                group_id: r.get(2)?,
                group_name: r.get(3)?,
                gender: r.get(4)?,
                total_users: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn headcount_rows(conn: &Connection, scope: &CountScope) -> anyhow::Result<Vec<HeadcountRow>> {
    Ok(census_rows(conn, scope)?
        .into_iter()
        .map(|r| HeadcountRow {
            category_id: r.category_id,
            category_name: r.category_name,
            group_name: r.group_name,
            gender: r.gender,
            total_users: r.total_users,
        })
        .collect())
}
