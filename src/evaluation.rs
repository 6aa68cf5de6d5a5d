use crate::calc;
use crate::model::{EvaluationEntry, EvaluationRecap, MaterialCategory};
use serde::Serialize;

impl EvaluationEntry {
    pub fn average_score(&self) -> f64 {
        calc::average(self.scores.iter().map(|s| s.score))
    }
}

/// Material ids are unique per recap at write time. If a stored recap still
/// repeats one, the later entry replaces the earlier one in its original position.
pub fn dedupe_entries(entries: &[EvaluationEntry]) -> Vec<EvaluationEntry> {
    let mut out: Vec<EvaluationEntry> = Vec::with_capacity(entries.len());
    for e in entries {
        match out.iter_mut().find(|x| x.material_id == e.material_id) {
            Some(existing) => *existing = e.clone(),
            None => out.push(e.clone()),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialCategoryBlock {
    pub material_category_id: i64,
    pub material_category_name: String,
    pub entries: Vec<EvaluationEntry>,
}

/// Blocks follow the master material-category order; categories the master list
/// does not know are appended in first-seen order.
pub fn group_by_material_category(
    entries: &[EvaluationEntry],
    material_categories: &[MaterialCategory],
) -> Vec<MaterialCategoryBlock> {
    let mut blocks: Vec<MaterialCategoryBlock> = material_categories
        .iter()
        .map(|mc| MaterialCategoryBlock {
            material_category_id: mc.id,
            material_category_name: mc.name.clone(),
            entries: Vec::new(),
        })
        .collect();

    for e in dedupe_entries(entries) {
        let idx = match blocks
            .iter()
            .position(|b| b.material_category_id == e.material_category_id)
        {
            Some(i) => i,
            None => {
                blocks.push(MaterialCategoryBlock {
                    material_category_id: e.material_category_id,
                    material_category_name: e.material_category_name.clone(),
                    entries: Vec::new(),
                });
                blocks.len() - 1
            }
        };
        blocks[idx].entries.push(e);
    }

    blocks.retain(|b| !b.entries.is_empty());
    blocks
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntries {
    pub group_id: String,
    pub entries: Vec<EvaluationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VillageMaterialRow {
    pub material_category_id: i64,
    pub material_category_name: String,
    pub groups: Vec<GroupEntries>,
}

/// One row per material category with every group's entries side by side.
/// `group_ids` fixes the column order; groups without entries get an empty list.
pub fn merge_village(
    material_categories: &[MaterialCategory],
    group_ids: &[String],
    recaps: &[&EvaluationRecap],
) -> Vec<VillageMaterialRow> {
    let mut per_group: Vec<(String, Vec<MaterialCategoryBlock>)> = Vec::new();
    for group_id in group_ids {
        let entries: Vec<EvaluationEntry> = recaps
            .iter()
            .filter(|r| &r.group_id == group_id)
            .flat_map(|r| dedupe_entries(&r.raw_data))
            .collect();
        per_group.push((
            group_id.clone(),
            group_by_material_category(&entries, material_categories),
        ));
    }

    let mut rows: Vec<VillageMaterialRow> = Vec::new();
    for (_, blocks) in &per_group {
        for b in blocks {
            if !rows
                .iter()
                .any(|r| r.material_category_id == b.material_category_id)
            {
                rows.push(VillageMaterialRow {
                    material_category_id: b.material_category_id,
                    material_category_name: b.material_category_name.clone(),
                    groups: Vec::new(),
                });
            }
        }
    }
    let order = |id: i64| {
        material_categories
            .iter()
            .position(|mc| mc.id == id)
            .unwrap_or(usize::MAX)
    };
    rows.sort_by_key(|r| order(r.material_category_id));

    for row in &mut rows {
        for (group_id, blocks) in &per_group {
            let entries = blocks
                .iter()
                .find(|b| b.material_category_id == row.material_category_id)
                .map(|b| b.entries.clone())
                .unwrap_or_default();
            row.groups.push(GroupEntries {
                group_id: group_id.clone(),
                entries,
            });
        }
    }
    rows
}
