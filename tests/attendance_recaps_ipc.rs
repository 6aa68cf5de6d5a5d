mod test_support;

use serde_json::json;
use test_support::{create_generus, request_err, request_ok, seed_village, spawn_sidecar, temp_dir};

#[test]
fn attendance_upsert_derives_slot_weighted_percentages() {
    let workspace = temp_dir("kbmrecap-attendance");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_village(&mut stdin, &mut reader);
    let ahmad = create_generus(&mut stdin, &mut reader, "2", &seed.alpha_id, 1, "Ahmad", "L");
    let zahra = create_generus(&mut stdin, &mut reader, "3", &seed.alpha_id, 1, "Zahra", "P");

    let first = request_ok(
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
                { "studentId": zahra, "nameSnapshot": "Zahra", "presentCount": 2, "permissionCount": 1, "absentCount": 1 },
                { "studentId": ahmad, "nameSnapshot": "Ahmad", "presentCount": 4, "permissionCount": 0, "absentCount": 0 }
            ]
        }),
    );
    let recap_id = first["id"].as_str().expect("id").to_string();
    let recap = &first["recap"];
    assert_eq!(recap["generusCount"], 2);
    assert_eq!(recap["presentAmount"], 6);
    assert_eq!(recap["presentPercentage"].as_f64(), Some(75.0));
    assert_eq!(recap["permissionPercentage"].as_f64(), Some(12.5));
    assert_eq!(recap["absentPercentage"].as_f64(), Some(12.5));
    assert_eq!(recap["rawData"]["countMale"], 1);
    assert_eq!(recap["rawData"]["countFemale"], 1);
    assert_eq!(
        recap["rawData"]["attendances"][ahmad.as_str()]["present"],
        4
    );

    // Same cell again: the id is kept and the figures replaced.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendanceRecaps.upsert",
        json!({
            "groupId": seed.alpha_id,
            "categoryId": 1,
            "month": 5,
            "year": 2024,
            "meetingCount": 4,
            "attendances": [
                { "studentId": zahra, "nameSnapshot": "Zahra", "presentCount": 2, "permissionCount": 1, "absentCount": 1 },
                { "studentId": ahmad, "nameSnapshot": "Ahmad", "presentCount": 3, "permissionCount": 0, "absentCount": 0 }
            ]
        }),
    );
    assert_eq!(second["id"], recap_id.as_str());
    assert_eq!(second["recap"]["presentAmount"], 5);
    assert_eq!(second["recap"]["presentPercentage"].as_f64(), Some(62.5));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendanceRecaps.get",
        json!({ "id": recap_id }),
    );
    assert_eq!(fetched["recap"]["meetingCount"], 4);

    // Roster order is by name, so Ahmad comes first.
    let table = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendanceRecaps.table",
        json!({ "id": recap_id, "useRoster": true }),
    );
    let rows = table["table"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Ahmad");
    assert_eq!(rows[0]["percentPresent"].as_f64(), Some(100.0));
    assert_eq!(rows[1]["percentPresent"].as_f64(), Some(50.0));
    assert_eq!(table["table"]["totals"]["presentPercentage"].as_f64(), Some(62.5));

    let plain = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendanceRecaps.table",
        json!({ "id": recap_id }),
    );
    assert_eq!(plain["table"]["rows"][0]["name"], "Zahra");
}

#[test]
fn attendance_upsert_rejects_bad_input() {
    let workspace = temp_dir("kbmrecap-attendance-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_village(&mut stdin, &mut reader);

    let over = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "period": "2024-05",
        "meetingCount": 4,
        "attendances": [
            { "studentId": "s1", "nameSnapshot": "A", "presentCount": 3, "permissionCount": 1, "absentCount": 1 }
        ]
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "attendanceRecaps.upsert", over),
        "bad_params"
    );

    let unknown_group = json!({
        "groupId": "nowhere",
        "categoryId": 1,
        "period": "2024-05",
        "meetingCount": 4,
        "attendances": []
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "3", "attendanceRecaps.upsert", unknown_group),
        "not_found"
    );

    let unknown_category = json!({
        "groupId": seed.alpha_id,
        "categoryId": 77,
        "period": "2024-05",
        "meetingCount": 4,
        "attendances": []
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "4", "attendanceRecaps.upsert", unknown_category),
        "not_found"
    );

    let bad_period = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "month": 0,
        "year": 2024,
        "meetingCount": 4,
        "attendances": []
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "5", "attendanceRecaps.upsert", bad_period),
        "bad_params"
    );

    let duplicate_material = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "period": "2024-05",
        "entries": [
            { "materialId": 3, "materialName": "Rukun Iman", "materialCategoryId": 1 },
            { "materialId": 3, "materialName": "Rukun Islam", "materialCategoryId": 1 }
        ]
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "6", "evaluationRecaps.upsert", duplicate_material),
        "bad_params"
    );

    let bad_manual = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "period": "2024-05",
        "presentPercentage": 120
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "7", "manualReports.upsert", bad_manual),
        "bad_params"
    );

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "attendanceRecaps.get",
            json!({ "id": "missing" }),
        ),
        "not_found"
    );
}

#[test]
fn oversized_counts_are_rejected_and_sidecar_keeps_serving() {
    let workspace = temp_dir("kbmrecap-attendance-oversized");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_village(&mut stdin, &mut reader);

    let manual = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "period": "2024-05",
        "countMale": 4_000_000_000u64,
        "countFemale": 4_000_000_000u64
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "manualReports.upsert", manual),
        "bad_params"
    );

    let attendance = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "period": "2024-05",
        "meetingCount": 3_000_000_000u64,
        "attendances": [
            { "studentId": "s1", "nameSnapshot": "A", "presentCount": 3_000_000_000u64, "permissionCount": 0, "absentCount": 0 },
            { "studentId": "s2", "nameSnapshot": "B", "presentCount": 3_000_000_000u64, "permissionCount": 0, "absentCount": 0 }
        ]
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "3", "attendanceRecaps.upsert", attendance),
        "bad_params"
    );

    let tallies = json!({
        "groupId": seed.alpha_id,
        "categoryId": 1,
        "period": "2024-05",
        "meetingCount": 10,
        "attendances": [
            { "studentId": "s1", "nameSnapshot": "A", "presentCount": 4_294_967_295u64, "permissionCount": 4_294_967_295u64, "absentCount": 0 }
        ]
    });
    assert_eq!(
        request_err(&mut stdin, &mut reader, "4", "attendanceRecaps.upsert", tallies),
        "bad_params"
    );

    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert!(health["workspacePath"].is_string());
}
