mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, seed_village, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("kbmrecap-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    // Workspace-bound methods refuse to run before a workspace is selected.
    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "villages.list", json!({})),
        "no_workspace"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_village(&mut stdin, &mut reader);

    let families = [
        ("4", "setup.get", json!({})),
        ("5", "villages.list", json!({})),
        ("6", "groups.list", json!({ "villageId": seed.village_id })),
        ("7", "categories.list", json!({})),
        ("8", "materialCategories.list", json!({})),
        ("9", "generus.list", json!({ "groupId": seed.alpha_id })),
        ("10", "stats.headcount", json!({})),
        ("11", "stats.census", json!({ "villageId": seed.village_id })),
        (
            "12",
            "reports.cell",
            json!({ "groupId": seed.alpha_id, "categoryId": 1, "period": "2024-05" }),
        ),
        (
            "13",
            "reports.villageMatrix",
            json!({ "villageId": seed.village_id, "month": 5, "year": 2024 }),
        ),
    ];
    for (id, method, params) in families {
        let _ = request_ok(&mut stdin, &mut reader, id, method, params);
    }

    assert_eq!(
        request_err(&mut stdin, &mut reader, "14", "nope.method", json!({})),
        "not_implemented"
    );
    // Unknown names inside a known family must not reach a neighbouring handler.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "14b",
            "generus.remove",
            json!({ "groupId": seed.alpha_id }),
        ),
        "not_implemented"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "15",
            "reports.villageMatrix",
            json!({ "villageId": seed.village_id, "period": "2024-13" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "16",
            "reports.villageMatrix",
            json!({ "villageId": "missing", "period": "2024-05" }),
        ),
        "not_found"
    );

    let listed = request(&mut stdin, &mut reader, "17", "villages.list", json!({}));
    let villages = listed
        .pointer("/result/villages")
        .and_then(|v| v.as_array())
        .expect("villages");
    assert_eq!(villages.len(), 1);
    assert_eq!(villages[0]["name"], "Sukamaju");
}
