use crate::calc;
use crate::error::SourceKind;
use crate::model::{
    AttendanceRecap, EvaluationEntry, EvaluationRecap, ManualKbmReport, ManualMaterialNote,
    StudentScore,
};
use crate::pivot::CensusCounts;
use serde::Serialize;

/// Shown for free-text fields no source has filled in. Also used for fields left
/// blank on purpose; the two cases are not told apart.
pub const MISSING_TEXT: &str = "-";
/// Shown for solutions when only a legacy challenge note exists.
pub const SEE_CHALLENGES: &str = "see challenges";

#[derive(Debug, Clone, Copy, Default)]
pub struct CellInputs<'a> {
    pub manual: Option<&'a ManualKbmReport>,
    pub attendance: Option<&'a AttendanceRecap>,
    pub evaluation: Option<&'a EvaluationRecap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CellStatus {
    NoData,
    Reported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AttendancePercentages {
    pub present: f64,
    pub permission: f64,
    pub absent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialView {
    pub material_id: i64,
    pub material_name: String,
    pub material_category_id: i64,
    pub material_category_name: String,
    pub show_details: bool,
    pub evaluation_note: String,
    /// Empty when `show_details` is off.
    pub scores: Vec<StudentScore>,
    pub average_score: Option<f64>,
}

impl MaterialView {
    fn from_entry(e: &EvaluationEntry) -> Self {
        Self {
            material_id: e.material_id,
            material_name: e.material_name.clone(),
            material_category_id: e.material_category_id,
            material_category_name: e.material_category_name.clone(),
            show_details: e.show_details,
            evaluation_note: e.evaluation_note.clone(),
            scores: if e.show_details {
                e.scores.clone()
            } else {
                Vec::new()
            },
            average_score: e
                .show_details
                .then(|| calc::round_off_2_decimals(e.average_score())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "camelCase")]
pub enum CellMaterials {
    Structured(Vec<MaterialView>),
    Manual(Vec<ManualMaterialNote>),
    Empty,
}

/// Read-only view of one (group, category, period), rebuilt on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedCell {
    pub group_id: String,
    pub category_id: i64,
    pub status: CellStatus,
    pub generus_count: u32,
    #[serde(flatten)]
    pub counts: CensusCounts,
    pub attendance_percentages: AttendancePercentages,
    pub attendance_source: Option<SourceKind>,
    pub materials: CellMaterials,
    pub achievement: String,
    pub challenges: String,
    pub solutions: String,
    pub success_notes: String,
    pub sources: Vec<SourceKind>,
}

impl ConsolidatedCell {
    pub fn has_data(&self) -> bool {
        self.status == CellStatus::Reported
    }
}

#[derive(Debug, Clone, Copy)]
struct StructuredRecaps<'a> {
    attendance: Option<&'a AttendanceRecap>,
    evaluation: Option<&'a EvaluationRecap>,
}

/// The two shapes a cell can be reported in. Each field picks its own
/// precedence order over these.
#[derive(Debug, Clone, Copy)]
enum ReportVariant<'a> {
    Manual(&'a ManualKbmReport),
    Structured(StructuredRecaps<'a>),
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty()).map(|s| s.to_string())
}

impl<'a> ReportVariant<'a> {
    fn headcount(&self) -> Option<(u32, CensusCounts)> {
        match self {
            ReportVariant::Manual(m) => Some((
                m.count_total,
                CensusCounts {
                    count_male: m.count_male,
                    count_female: m.count_female,
                    count_total: m.count_total,
                },
            )),
            ReportVariant::Structured(s) => s.attendance.map(|a| {
                (
                    a.generus_count,
                    CensusCounts {
                        count_male: a.raw_data.count_male,
                        count_female: a.raw_data.count_female,
                        count_total: a.raw_data.count_total,
                    },
                )
            }),
        }
    }

    fn attendance(&self) -> Option<(AttendancePercentages, SourceKind)> {
        match self {
            ReportVariant::Manual(m) => Some((
                AttendancePercentages {
                    present: m.present_percentage,
                    permission: m.permission_percentage,
                    absent: m.absent_percentage,
                },
                SourceKind::Manual,
            )),
            ReportVariant::Structured(s) => s.attendance.map(|a| {
                (
                    AttendancePercentages {
                        present: a.present_percentage,
                        permission: a.permission_percentage,
                        absent: a.absent_percentage,
                    },
                    SourceKind::Attendance,
                )
            }),
        }
    }

    fn materials(&self) -> Option<CellMaterials> {
        match self {
            ReportVariant::Manual(m) => Some(CellMaterials::Manual(m.raw_data.clone())),
            ReportVariant::Structured(s) => s.evaluation.map(|e| {
                CellMaterials::Structured(
                    crate::evaluation::dedupe_entries(&e.raw_data)
                        .iter()
                        .map(MaterialView::from_entry)
                        .collect(),
                )
            }),
        }
    }

    fn achievement(&self) -> Option<String> {
        match self {
            ReportVariant::Manual(m) => {
                let lines: Vec<String> = m
                    .achievements
                    .iter()
                    .filter(|a| !a.text.trim().is_empty())
                    .map(|a| {
                        if a.topic.trim().is_empty() {
                            a.text.clone()
                        } else {
                            format!("{}: {}", a.topic, a.text)
                        }
                    })
                    .collect();
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
            ReportVariant::Structured(s) => {
                non_blank(s.evaluation.and_then(|e| e.achievement.as_deref()))
            }
        }
    }

    fn challenges(&self) -> Option<String> {
        match self {
            ReportVariant::Manual(m) => non_blank(m.challenges_info.as_deref()),
            ReportVariant::Structured(s) => {
                non_blank(s.evaluation.and_then(|e| e.challenges.as_deref()))
            }
        }
    }

    fn solutions(&self) -> Option<String> {
        match self {
            ReportVariant::Manual(m) => non_blank(m.challenges_info.as_deref())
                .map(|_| SEE_CHALLENGES.to_string()),
            ReportVariant::Structured(s) => {
                non_blank(s.evaluation.and_then(|e| e.solutions.as_deref()))
            }
        }
    }

    fn success_notes(&self) -> Option<String> {
        match self {
            ReportVariant::Manual(m) => non_blank(m.program_success_info.as_deref()),
            ReportVariant::Structured(s) => non_blank(s.evaluation.and_then(|e| e.notes.as_deref())),
        }
    }
}

fn first_of<'a, T>(
    order: &[ReportVariant<'a>],
    pick: impl Fn(&ReportVariant<'a>) -> Option<T>,
) -> Option<T> {
    order.iter().find_map(pick)
}

pub fn reconcile(group_id: &str, category_id: i64, inputs: CellInputs<'_>) -> ConsolidatedCell {
    let structured = StructuredRecaps {
        attendance: inputs.attendance,
        evaluation: inputs.evaluation,
    };
    let mut manual_first: Vec<ReportVariant<'_>> = Vec::with_capacity(2);
    if let Some(m) = inputs.manual {
        manual_first.push(ReportVariant::Manual(m));
    }
    manual_first.push(ReportVariant::Structured(structured));
    let structured_first: Vec<ReportVariant<'_>> = manual_first.iter().rev().copied().collect();

    let mut sources = Vec::new();
    if inputs.manual.is_some() {
        sources.push(SourceKind::Manual);
    }
    if inputs.attendance.is_some() {
        sources.push(SourceKind::Attendance);
    }
    if inputs.evaluation.is_some() {
        sources.push(SourceKind::Evaluation);
    }

    let (generus_count, counts) =
        first_of(&manual_first, |v| v.headcount()).unwrap_or_default();
    let (attendance_percentages, attendance_source) =
        match first_of(&manual_first, |v| v.attendance()) {
            Some((p, src)) => (p, Some(src)),
            None => (AttendancePercentages::default(), None),
        };
    let text = |found: Option<String>| found.unwrap_or_else(|| MISSING_TEXT.to_string());

    ConsolidatedCell {
        group_id: group_id.to_string(),
        category_id,
        status: if sources.is_empty() {
            CellStatus::NoData
        } else {
            CellStatus::Reported
        },
        generus_count,
        counts,
        attendance_percentages,
        attendance_source,
        materials: first_of(&structured_first, |v| v.materials()).unwrap_or(CellMaterials::Empty),
        achievement: text(first_of(&manual_first, |v| v.achievement())),
        challenges: text(first_of(&manual_first, |v| v.challenges())),
        solutions: text(first_of(&structured_first, |v| v.solutions())),
        success_notes: text(first_of(&manual_first, |v| v.success_notes())),
        sources,
    }
}
