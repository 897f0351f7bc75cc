mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("recordbook-router-smoke");
    let bundle_out = workspace.join("smoke-snapshot.zip");
    let csv_out = workspace.join("smoke-marks.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").is_some());

    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "records.list",
        json!({ "entity": "students" }),
    );
    assert_eq!(error_code(&early), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "snapshot.import",
        json!({
            "actor": { "role": "admin" },
            "document": {
                "data": {
                    "students": [
                        { "id": 1, "rollno": "S1", "FirstName": "Ada", "LastName": "Lovelace",
                          "department": "CSE", "semester": 3 },
                        { "id": 2, "rollno": "S2", "firstname": "Alan", "lastname": "Turing",
                          "department": "CSE", "semester": 3 }
                    ],
                    "classes": [
                        { "id": 1, "code": "CS301", "name": "Compilers", "department": "CSE",
                          "semester": 3, "faculty": "Grace Hopper" }
                    ]
                }
            }
        }),
    );
    assert_eq!(imported["shape"], json!("structuredDocument"));
    assert_eq!(imported["inserted"], json!(3));
    assert_eq!(imported["progress"], json!(100));
    let trail = imported["progressTrail"].as_array().expect("trail");
    assert_eq!(trail.first(), Some(&json!(5)));
    assert_eq!(trail.last(), Some(&json!(100)));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "records.list",
        json!({ "entity": "Students" }),
    );
    assert_eq!(listed["count"], json!(2));

    let denied = request(
        &mut stdin,
        &mut reader,
        "6",
        "snapshot.import",
        json!({
            "document": { "students": [] },
            "actor": { "role": "faculty", "firstname": "Grace", "lastname": "Hopper" }
        }),
    );
    assert_eq!(error_code(&denied), Some("forbidden"));

    let anonymous = request(
        &mut stdin,
        &mut reader,
        "6a",
        "snapshot.import",
        json!({ "document": { "students": [] }, "options": { "policy": "bestEffort" } }),
    );
    assert_eq!(error_code(&anonymous), Some("bad_params"));

    let misnamed = request(
        &mut stdin,
        &mut reader,
        "6b",
        "snapshot.import",
        json!({
            "actor": { "role": "admin" },
            "document": { "students": [] },
            "fileName": "snapshot.zip"
        }),
    );
    assert_eq!(error_code(&misnamed), Some("bad_params"));

    let unnamed_actor = request(
        &mut stdin,
        &mut reader,
        "6c",
        "classes.visible",
        json!({}),
    );
    assert_eq!(error_code(&unnamed_actor), Some("bad_params"));

    let still_there = request_ok(
        &mut stdin,
        &mut reader,
        "6d",
        "records.list",
        json!({ "entity": "students" }),
    );
    assert_eq!(still_there["count"], json!(2));

    let grace = json!({ "role": "faculty", "firstname": "grace", "lastname": "HOPPER" });
    let visible = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.visible",
        json!({ "actor": grace }),
    );
    assert_eq!(visible["classes"].as_array().map(Vec::len), Some(1));

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "marks.roster",
        json!({ "classId": 1, "actor": grace }),
    );
    assert_eq!(roster["students"].as_array().map(Vec::len), Some(2));

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "marks.save",
        json!({
            "classId": 1,
            "actor": grace,
            "entries": [
                { "studentId": 1, "midsem": 20, "assignment": 8, "attendance": 5 },
                { "studentId": 2, "midsem": 18, "assignment": 9, "attendance": 4 }
            ]
        }),
    );
    assert_eq!(saved["added"], json!(2));

    let csv = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "marks.exportCsv",
        json!({ "classId": 1, "outPath": csv_out.to_string_lossy() }),
    );
    assert_eq!(csv["fileName"], json!("InternalMarks_CS301.csv"));
    let written = std::fs::read_to_string(&csv_out).expect("csv written");
    assert!(written.contains("S1,Ada Lovelace,20,8,5,33"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.exportCsv",
        json!({ "classId": 1 }),
    );

    let bundle = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "snapshot.exportBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(bundle["recordCount"], json!(5));

    let doc = request_ok(&mut stdin, &mut reader, "13", "snapshot.exportJson", json!({}));
    assert_eq!(doc["document"]["data"]["internal_marks"].as_array().map(Vec::len), Some(2));

    let reimported = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "snapshot.import",
        json!({ "inPath": bundle_out.to_string_lossy(), "actor": { "role": "admin" } }),
    );
    assert_eq!(reimported["shape"], json!("bundledArchive"));
    assert_eq!(reimported["failed"], json!(0));

    let unknown = request(&mut stdin, &mut reader, "15", "grades.compute", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
