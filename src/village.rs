use crate::error::{AggregateError, DegradedSource, SourceKind};
use crate::evaluation::{self, VillageMaterialRow};
use crate::model::{
    AttendanceRecap, Category, EvaluationRecap, Group, ManualKbmReport, MaterialCategory, Period,
    Village,
};
use crate::pivot::CensusCounts;
use crate::reconcile::{self, CellInputs, ConsolidatedCell};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

/// Scope of a recap fetch. `group_id` narrows a village fetch to one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecapQuery<'a> {
    pub village_id: &'a str,
    pub group_id: Option<&'a str>,
    pub period: Period,
}

/// Read operations the aggregation core needs from persistence.
pub trait ReportSource {
    fn village(&self, village_id: &str) -> anyhow::Result<Option<Village>>;
    fn groups(&self, village_id: &str) -> anyhow::Result<Vec<Group>>;
    fn categories(&self) -> anyhow::Result<Vec<Category>>;
    fn material_categories(&self) -> anyhow::Result<Vec<MaterialCategory>>;
    fn manual_reports(&self, q: &RecapQuery<'_>) -> anyhow::Result<Vec<ManualKbmReport>>;
    fn attendance_recaps(&self, q: &RecapQuery<'_>) -> anyhow::Result<Vec<AttendanceRecap>>;
    fn evaluation_recaps(&self, q: &RecapQuery<'_>) -> anyhow::Result<Vec<EvaluationRecap>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VillageMatrix {
    pub village_id: String,
    pub village_name: String,
    pub period: Period,
    pub groups: Vec<Group>,
    pub categories: Vec<Category>,
    pub material_categories: Vec<MaterialCategory>,
    /// `category_id -> group_id -> cell`, one entry for every pair.
    pub matrix: BTreeMap<i64, BTreeMap<String, ConsolidatedCell>>,
    pub degraded_sources: Vec<DegradedSource>,
    #[serde(skip)]
    evaluations: Vec<EvaluationRecap>,
}

impl VillageMatrix {
    pub fn cell_count(&self) -> usize {
        self.matrix.values().map(|m| m.len()).sum()
    }

    pub fn row_totals(&self, category_id: i64) -> CensusCounts {
        let mut out = CensusCounts::default();
        if let Some(by_group) = self.matrix.get(&category_id) {
            for cell in by_group.values() {
                out.merge(&cell.counts);
            }
        }
        out
    }

    pub fn column_totals(&self, group_id: &str) -> CensusCounts {
        let mut out = CensusCounts::default();
        for by_group in self.matrix.values() {
            if let Some(cell) = by_group.get(group_id) {
                out.merge(&cell.counts);
            }
        }
        out
    }

    /// Evaluation entries of every group, grouped by material category, for one learner category.
    pub fn materials_by_category(&self, category_id: i64) -> Vec<VillageMaterialRow> {
        let group_ids: Vec<String> = self.groups.iter().map(|g| g.id.clone()).collect();
        let recaps: Vec<&EvaluationRecap> = self
            .evaluations
            .iter()
            .filter(|r| r.category_id == category_id)
            .collect();
        evaluation::merge_village(&self.material_categories, &group_ids, &recaps)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty()
    }
}

fn master<T>(what: &'static str, fetched: anyhow::Result<T>) -> Result<T, AggregateError> {
    fetched.map_err(|e| {
        error!(master_data = what, error = %e, "master data fetch failed");
        AggregateError::MissingMasterData {
            what,
            message: format!("{e:#}"),
        }
    })
}

fn degradable<T>(
    source: SourceKind,
    fetched: anyhow::Result<Vec<T>>,
    degraded: &mut Vec<DegradedSource>,
) -> Vec<T> {
    match fetched {
        Ok(rows) => rows,
        Err(e) => {
            debug!(source = source.as_str(), error = %e, "recap source treated as absent");
            degraded.push(DegradedSource {
                source,
                message: format!("{e:#}"),
            });
            Vec::new()
        }
    }
}

/// Latest row per (group, category) wins when a source returns duplicates.
fn index_by_cell<'a, T>(
    rows: &'a [T],
    key: impl Fn(&'a T) -> (&'a str, i64),
) -> HashMap<(String, i64), &'a T> {
    let mut out = HashMap::new();
    for row in rows {
        let (g, c) = key(row);
        out.insert((g.to_string(), c), row);
    }
    out
}

/// Builds the category × group matrix of one village for one period.
///
/// Master data (village, groups, categories, material categories) must load or the
/// whole build fails. A recap source that fails to load is reported in
/// `degraded_sources` and treated as empty for every cell.
pub fn build_village_matrix<S: ReportSource + ?Sized>(
    source: &S,
    village_id: &str,
    period: Period,
) -> Result<VillageMatrix, AggregateError> {
    let village = master("village", source.village(village_id))?.ok_or_else(|| {
        AggregateError::NotFound {
            what: "village",
            id: village_id.to_string(),
        }
    })?;
    let groups = master("groups", source.groups(village_id))?;
    let categories = master("categories", source.categories())?;
    let material_categories = master("materialCategories", source.material_categories())?;

    let query = RecapQuery {
        village_id,
        group_id: None,
        period,
    };
    let mut degraded = Vec::new();
    let manual = degradable(SourceKind::Manual, source.manual_reports(&query), &mut degraded);
    let attendance = degradable(
        SourceKind::Attendance,
        source.attendance_recaps(&query),
        &mut degraded,
    );
    let evaluations = degradable(
        SourceKind::Evaluation,
        source.evaluation_recaps(&query),
        &mut degraded,
    );

    let manual_idx = index_by_cell(&manual, |r| (r.group_id.as_str(), r.category_id));
    let attendance_idx = index_by_cell(&attendance, |r| (r.group_id.as_str(), r.category_id));
    let evaluation_idx = index_by_cell(&evaluations, |r| (r.group_id.as_str(), r.category_id));

    let mut matrix: BTreeMap<i64, BTreeMap<String, ConsolidatedCell>> = BTreeMap::new();
    for category in &categories {
        let row = matrix.entry(category.id).or_default();
        for group in &groups {
            let key = (group.id.clone(), category.id);
            let inputs = CellInputs {
                manual: manual_idx.get(&key).copied(),
                attendance: attendance_idx.get(&key).copied(),
                evaluation: evaluation_idx.get(&key).copied(),
            };
            row.insert(
                group.id.clone(),
                reconcile::reconcile(&group.id, category.id, inputs),
            );
        }
    }

    let reported = matrix
        .values()
        .flat_map(|row| row.values())
        .filter(|c| c.has_data())
        .count();
    debug!(
        village_id,
        period = %period.key(),
        groups = groups.len(),
        categories = categories.len(),
        reported,
        degraded = degraded.len(),
        "village matrix built"
    );

    Ok(VillageMatrix {
        village_id: village.id,
        village_name: village.name,
        period,
        groups,
        categories,
        material_categories,
        matrix,
        degraded_sources: degraded,
        evaluations,
    })
}

/// One reconciled cell plus whichever recap sources failed to load for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellReport {
    pub cell: ConsolidatedCell,
    pub degraded_sources: Vec<DegradedSource>,
}

/// Reconciles a single (group, category) for one period. The caller has already
/// resolved the group; recap fetches are narrowed to it.
pub fn build_cell<S: ReportSource + ?Sized>(
    source: &S,
    group: &Group,
    category_id: i64,
    period: Period,
) -> CellReport {
    let query = RecapQuery {
        village_id: &group.village_id,
        group_id: Some(&group.id),
        period,
    };
    let mut degraded = Vec::new();
    let manual = degradable(SourceKind::Manual, source.manual_reports(&query), &mut degraded);
    let attendance = degradable(
        SourceKind::Attendance,
        source.attendance_recaps(&query),
        &mut degraded,
    );
    let evaluations = degradable(
        SourceKind::Evaluation,
        source.evaluation_recaps(&query),
        &mut degraded,
    );

    let inputs = CellInputs {
        manual: manual.iter().rev().find(|r| r.category_id == category_id),
        attendance: attendance.iter().rev().find(|r| r.category_id == category_id),
        evaluation: evaluations.iter().rev().find(|r| r.category_id == category_id),
    };
    CellReport {
        cell: reconcile::reconcile(&group.id, category_id, inputs),
        degraded_sources: degraded,
    }
}
