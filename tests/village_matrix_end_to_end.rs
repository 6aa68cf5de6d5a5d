mod test_support;

use serde_json::json;
use test_support::{create_generus, request_ok, seed_village, spawn_sidecar, temp_dir};

#[test]
fn two_groups_two_categories_one_attendance_recap() {
    let workspace = temp_dir("kbmrecap-matrix-e2e");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_village(&mut stdin, &mut reader);
    let s1 = create_generus(&mut stdin, &mut reader, "2", &seed.alpha_id, 1, "Ahmad", "L");
    let s2 = create_generus(&mut stdin, &mut reader, "3", &seed.alpha_id, 1, "Aisyah", "P");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendanceRecaps.upsert",
        json!({
            "groupId": seed.alpha_id,
            "categoryId": 1,
            "period": "2024-05",
            "meetingCount": 4,
            "attendances": [
                { "studentId": s1, "nameSnapshot": "Ahmad", "presentCount": 4, "permissionCount": 0, "absentCount": 0 },
                { "studentId": s2, "nameSnapshot": "Aisyah", "presentCount": 4, "permissionCount": 0, "absentCount": 0 }
            ]
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.villageMatrix",
        json!({ "villageId": seed.village_id, "period": "2024-05" }),
    );

    assert_eq!(result["villageName"], "Sukamaju");
    let matrix = result["matrix"].as_object().expect("matrix");
    assert_eq!(matrix.len(), 2);
    let cells: usize = matrix
        .values()
        .map(|row| row.as_object().map(|r| r.len()).unwrap_or(0))
        .sum();
    assert_eq!(cells, 4);

    let alpha = &result["matrix"]["1"][seed.alpha_id.as_str()];
    assert_eq!(alpha["status"], "reported");
    assert_eq!(alpha["attendancePercentages"]["present"].as_f64(), Some(100.0));
    assert_eq!(alpha["attendancePercentages"]["absent"].as_f64(), Some(0.0));
    assert_eq!(alpha["attendanceSource"], "attendance");
    assert_eq!(alpha["generusCount"], 2);
    assert_eq!(alpha["countMale"], 1);
    assert_eq!(alpha["countFemale"], 1);
    assert_eq!(alpha["materials"]["kind"], "empty");
    assert_eq!(alpha["challenges"], "-");

    let empty = &result["matrix"]["20"][seed.beta_id.as_str()];
    assert_eq!(empty["status"], "noData");
    assert_eq!(empty["generusCount"], 0);
    assert_eq!(empty["attendanceSource"], serde_json::Value::Null);
    assert_eq!(empty["achievement"], "-");

    assert_eq!(result["degradedSources"], json!([]));
    let row_totals = result["rowTotals"].as_array().expect("rowTotals");
    assert_eq!(row_totals[0]["categoryId"], 1);
    assert_eq!(row_totals[0]["counts"]["countTotal"], 2);
    assert_eq!(row_totals[1]["counts"]["countTotal"], 0);
    let column_totals = result["columnTotals"].as_array().expect("columnTotals");
    assert_eq!(column_totals.len(), 2);
    assert_eq!(result["materialsByCategory"], json!({}));
}

#[test]
fn evaluation_materials_merge_across_groups() {
    let workspace = temp_dir("kbmrecap-matrix-materials");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_village(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "evaluationRecaps.upsert",
        json!({
            "groupId": seed.beta_id,
            "categoryId": 1,
            "month": 5,
            "year": 2024,
            "entries": [{
                "materialId": 3,
                "materialName": "Rukun Iman",
                "materialCategoryId": 1,
                "materialCategoryName": "Aqidah",
                "scores": { "s1": { "name": "Umar", "score": 80.0 }, "s2": { "name": "Zaid", "score": 90.0 } },
                "evaluationNote": "memorised"
            }],
            "notes": "steady progress"
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.villageMatrix",
        json!({ "villageId": seed.village_id, "period": "2024-05" }),
    );
    let beta = &result["matrix"]["1"][seed.beta_id.as_str()];
    assert_eq!(beta["materials"]["kind"], "structured");
    assert_eq!(beta["materials"]["items"][0]["averageScore"].as_f64(), Some(85.0));
    assert_eq!(beta["successNotes"], "steady progress");

    let rows = result["materialsByCategory"]["1"].as_array().expect("category 1 rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["materialCategoryName"], "Aqidah");
    let groups = rows[0]["groups"].as_array().expect("groups");
    // Groups are listed by name: Alpha then Beta.
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["entries"], json!([]));
    assert_eq!(groups[1]["entries"][0]["evaluationNote"], "memorised");
}
