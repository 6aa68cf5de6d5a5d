use crate::bucket::{CategoryBucketer, ViewMode};
use crate::calc;
use crate::model::{AttendanceRecap, StudentAttendanceRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Flattened per-gender learner count for one category and group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadcountRow {
    pub category_id: i64,
    pub category_name: String,
    pub group_name: String,
    pub gender: String,
    pub total_users: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusRow {
    pub category_id: i64,
    pub category_name: String,
    pub group_id: String,
    pub group_name: String,
    pub gender: String,
    pub total_users: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenderSlot {
    Male,
    Female,
    Other,
}

fn gender_slot(raw: &str) -> GenderSlot {
    match raw.trim().to_ascii_uppercase().as_str() {
        "L" => GenderSlot::Male,
        "P" => GenderSlot::Female,
        _ => GenderSlot::Other,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenderCounts {
    pub male: u32,
    pub female: u32,
    pub total: u32,
}

impl GenderCounts {
    fn add(&mut self, gender: &str, n: u32) {
        match gender_slot(gender) {
            GenderSlot::Male => self.male = self.male.saturating_add(n),
            GenderSlot::Female => self.female = self.female.saturating_add(n),
            GenderSlot::Other => {}
        }
        self.total = self.total.saturating_add(n);
    }

    fn merge(&mut self, other: &GenderCounts) {
        self.male = self.male.saturating_add(other.male);
        self.female = self.female.saturating_add(other.female);
        self.total = self.total.saturating_add(other.total);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRow {
    /// `None` on the grand-total row.
    pub category_id: Option<i64>,
    pub category_name: String,
    #[serde(flatten)]
    pub counts: GenderCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadcountPivot {
    pub rows: Vec<StatRow>,
    pub grand_total: StatRow,
}

pub fn pivot_headcount(
    rows: &[HeadcountRow],
    bucketer: &CategoryBucketer,
    view: ViewMode,
) -> HeadcountPivot {
    let mut buckets: BTreeMap<i64, StatRow> = BTreeMap::new();
    for row in rows {
        let (id, name) = bucketer.resolve(row.category_id, &row.category_name, view);
        buckets
            .entry(id)
            .or_insert_with(|| StatRow {
                category_id: Some(id),
                category_name: name,
                counts: GenderCounts::default(),
            })
            .counts
            .add(&row.gender, row.total_users);
    }

    let rows: Vec<StatRow> = buckets.into_values().collect();
    let mut grand = GenderCounts::default();
    for r in &rows {
        grand.merge(&r.counts);
    }
    HeadcountPivot {
        rows,
        grand_total: StatRow {
            category_id: None,
            category_name: "Total".to_string(),
            counts: grand,
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CensusCounts {
    pub count_male: u32,
    pub count_female: u32,
    pub count_total: u32,
}

impl CensusCounts {
    pub fn merge(&mut self, other: &CensusCounts) {
        self.count_male = self.count_male.saturating_add(other.count_male);
        self.count_female = self.count_female.saturating_add(other.count_female);
        self.count_total = self.count_total.saturating_add(other.count_total);
    }

    fn add(&mut self, gender: &str, n: u32) {
        match gender_slot(gender) {
            GenderSlot::Male => self.count_male = self.count_male.saturating_add(n),
            GenderSlot::Female => self.count_female = self.count_female.saturating_add(n),
            GenderSlot::Other => {}
        }
        self.count_total = self.count_total.saturating_add(n);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

/// Group × category learner counts. A missing cell means nothing was recorded,
/// which is not the same as a recorded zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CensusPivot {
    pub groups: Vec<GroupRef>,
    pub categories: Vec<CategoryRef>,
    pub matrix: BTreeMap<i64, BTreeMap<String, CensusCounts>>,
}

impl CensusPivot {
    pub fn row_total(&self, category_id: i64) -> CensusCounts {
        let mut out = CensusCounts::default();
        if let Some(by_group) = self.matrix.get(&category_id) {
            for c in by_group.values() {
                out.merge(c);
            }
        }
        out
    }

    pub fn column_total(&self, group_id: &str) -> CensusCounts {
        let mut out = CensusCounts::default();
        for by_group in self.matrix.values() {
            if let Some(c) = by_group.get(group_id) {
                out.merge(c);
            }
        }
        out
    }

    pub fn grand_total(&self) -> CensusCounts {
        let mut out = CensusCounts::default();
        for by_group in self.matrix.values() {
            for c in by_group.values() {
                out.merge(c);
            }
        }
        out
    }
}

pub fn pivot_census(rows: &[CensusRow], bucketer: &CategoryBucketer, view: ViewMode) -> CensusPivot {
    let mut groups: Vec<GroupRef> = Vec::new();
    let mut categories: BTreeMap<i64, String> = BTreeMap::new();
    let mut matrix: BTreeMap<i64, BTreeMap<String, CensusCounts>> = BTreeMap::new();

    for row in rows {
        let (cat_id, cat_name) = bucketer.resolve(row.category_id, &row.category_name, view);
        categories.entry(cat_id).or_insert(cat_name);
        if !groups.iter().any(|g| g.id == row.group_id) {
            groups.push(GroupRef {
                id: row.group_id.clone(),
                name: row.group_name.clone(),
            });
        }
        matrix
            .entry(cat_id)
            .or_default()
            .entry(row.group_id.clone())
            .or_default()
            .add(&row.gender, row.total_users);
    }

    CensusPivot {
        groups,
        categories: categories
            .into_iter()
            .map(|(id, name)| CategoryRef { id, name })
            .collect(),
        matrix,
    }
}

/// Recap-level aggregates derived when a recap is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTotals {
    pub meeting_count: u32,
    pub generus_count: u32,
    pub present_amount: u32,
    pub present_percentage: f64,
    pub permission_amount: u32,
    pub permission_percentage: f64,
    pub absent_amount: u32,
    pub absent_percentage: f64,
}

fn clamp_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Percentages are taken against every possible attendance slot
/// (`meeting_count × generus_count`), not against meetings alone. Amounts are
/// summed as `u64` and saturate at `u32::MAX` when stored.
pub fn summarize_attendance(meeting_count: u32, students: &[StudentAttendanceRecord]) -> AttendanceTotals {
    let generus_count = clamp_u32(students.len() as u64);
    let slots = f64::from(meeting_count) * students.len() as f64;
    let present: u64 = students.iter().map(|s| u64::from(s.present_count)).sum();
    let permission: u64 = students.iter().map(|s| u64::from(s.permission_count)).sum();
    let absent: u64 = students.iter().map(|s| u64::from(s.absent_count)).sum();
    AttendanceTotals {
        meeting_count,
        generus_count,
        present_amount: clamp_u32(present),
        present_percentage: calc::percentage(present as f64, slots),
        permission_amount: clamp_u32(permission),
        permission_percentage: calc::percentage(permission as f64, slots),
        absent_amount: clamp_u32(absent),
        absent_percentage: calc::percentage(absent as f64, slots),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceRow {
    pub student_id: String,
    pub name: String,
    pub present: u32,
    pub permission: u32,
    pub absent: u32,
    pub total: u64,
    pub percent_present: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTable {
    pub recap_id: String,
    pub rows: Vec<StudentAttendanceRow>,
    pub totals: AttendanceTotals,
}

fn student_row(s: &StudentAttendanceRecord) -> StudentAttendanceRow {
    let total = s.total();
    StudentAttendanceRow {
        student_id: s.student_id.clone(),
        name: s.name_snapshot.clone(),
        present: s.present_count,
        permission: s.permission_count,
        absent: s.absent_count,
        total,
        percent_present: calc::percentage(f64::from(s.present_count), total as f64),
    }
}

/// Per-student detail rows for one recap. The recap-level totals are copied from
/// the stored aggregate; averaging the per-student percentages would lose the
/// slot weighting.
///
/// With a roster, rows follow roster order and ids the recap does not know are skipped.
pub fn pivot_attendance_table(recap: &AttendanceRecap, roster: Option<&[String]>) -> AttendanceTable {
    let rows = match roster {
        None => recap.raw_data.attendances.iter().map(student_row).collect(),
        Some(ids) => {
            let by_id: HashMap<&str, &StudentAttendanceRecord> = recap
                .raw_data
                .attendances
                .iter()
                .map(|s| (s.student_id.as_str(), s))
                .collect();
            ids.iter()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .map(student_row)
                .collect()
        }
    };

    AttendanceTable {
        recap_id: recap.id.clone(),
        rows,
        totals: AttendanceTotals {
            meeting_count: recap.meeting_count,
            generus_count: recap.generus_count,
            present_amount: recap.present_amount,
            present_percentage: recap.present_percentage,
            permission_amount: recap.permission_amount,
            permission_percentage: recap.permission_percentage,
            absent_amount: recap.absent_amount,
            absent_percentage: recap.absent_percentage,
        },
    }
}
