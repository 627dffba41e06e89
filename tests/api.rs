use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

use bugtrack::api;
use bugtrack_core::models::Role;
use bugtrack_core::Database;

const DEMO_ACCOUNTS: [(&str, Role); 4] = [
    ("demo1", Role::Administrator),
    ("demo2", Role::ProjectManager),
    ("demo3", Role::Developer),
    ("demo4", Role::Submitter),
];

fn test_server() -> (TestServer, Database, TempDir) {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    for (username, role) in DEMO_ACCOUNTS {
        db.create_user(bugtrack_core::models::CreateUserInput {
            username: username.into(),
            email: None,
            role: Some(role),
            is_demo: true,
        })
        .unwrap();
    }
    let uploads = TempDir::new().unwrap();
    let server = TestServer::new(api::create_router(db.clone(), uploads.path().to_path_buf()))
        .unwrap();
    (server, db, uploads)
}

async fn login(server: &TestServer, username: &str) -> String {
    let res = server
        .post("/login")
        .json(&json!({ "username": username }))
        .await;
    res.assert_status_ok();
    res.json::<Value>()["token"].as_str().unwrap().to_string()
}

fn location(res: &axum_test::TestResponse) -> String {
    res.headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn unauthenticated_requests_redirect_to_login() {
    let (server, _db, _uploads) = test_server();

    for path in ["/", "/projects", "/tickets", "/users"] {
        let res = server.get(path).await;
        assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "path {path}");
        assert_eq!(location(&res), "/login");
    }
}

#[tokio::test]
async fn demo_login_only_works_for_demo_accounts() {
    let (server, db, _uploads) = test_server();
    db.create_user(bugtrack_core::models::CreateUserInput {
        username: "regular".into(),
        email: None,
        role: Some(Role::Developer),
        is_demo: false,
    })
    .unwrap();

    let token = login(&server, "demo1").await;
    let me = server
        .get("/me")
        .authorization_bearer(&token)
        .await;
    me.assert_status_ok();
    assert_eq!(me.json::<Value>()["username"], "demo1");

    let denied = server
        .post("/login")
        .json(&json!({ "username": "regular" }))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let unknown = server
        .post("/login")
        .json(&json!({ "username": "nobody" }))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_permission_redirects_to_dashboard() {
    let (server, _db, _uploads) = test_server();
    let submitter = login(&server, "demo4").await;

    let res = server
        .post("/projects")
        .authorization_bearer(&submitter)
        .json(&json!({ "title": "P", "description": "d", "manager_id": null }))
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/");

    // Submitters may not manage roles either
    let res = server
        .get("/users")
        .authorization_bearer(&submitter)
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/");
}

#[tokio::test]
async fn role_assignment_regroups_users() {
    let (server, db, _uploads) = test_server();
    let admin = login(&server, "demo1").await;
    let target = db.get_user_by_username("demo4").unwrap().unwrap();

    let res = server
        .post("/users/roles")
        .authorization_bearer(&admin)
        .json(&json!({ "user_ids": [target.id], "role": "DV" }))
        .await;
    res.assert_status_ok();

    assert_eq!(db.user_group_names(target.id).unwrap(), vec!["Developer"]);

    // empty selection is a validation error, not a permission failure
    let res = server
        .post("/users/roles")
        .authorization_bearer(&admin)
        .json(&json!({ "user_ids": [], "role": "DV" }))
        .await;
    assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn archived_project_blocks_updates() {
    let (server, _db, _uploads) = test_server();
    let admin = login(&server, "demo1").await;

    let project = server
        .post("/projects")
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "manager_id": null }))
        .await
        .json::<Value>();
    let project_id = project["id"].as_str().unwrap().to_string();

    // archive it
    let res = server
        .put(&format!("/projects/{project_id}"))
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "is_active": false }))
        .await;
    res.assert_status_ok();

    // further edits redirect to the detail page
    let res = server
        .put(&format!("/projects/{project_id}"))
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P2", "description": "d", "is_active": true }))
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/projects/{project_id}"));
}

#[tokio::test]
async fn read_only_records_redirect_to_detail_before_permission_check() {
    let (server, db, _uploads) = test_server();
    let admin = login(&server, "demo1").await;
    let submitter = login(&server, "demo4").await;

    let project = server
        .post("/projects")
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "manager_id": null }))
        .await
        .json::<Value>();
    let project_id = project["id"].as_str().unwrap().to_string();

    let ticket = server
        .post("/tickets")
        .authorization_bearer(&submitter)
        .json(&json!({
            "project_id": project_id,
            "title": "T",
            "description": "d",
            "priority": "LOW",
            "kind": "CHANGE",
        }))
        .await
        .json::<Value>();
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    // archive the project; the cascade also closes the ticket
    server
        .put(&format!("/projects/{project_id}"))
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "is_active": false }))
        .await
        .assert_status_ok();
    let dev = db.get_user_by_username("demo3").unwrap().unwrap();

    // a caller without change_project still lands on the detail page,
    // not the dashboard: the record state wins over the permission check
    let res = server
        .put(&format!("/projects/{project_id}"))
        .authorization_bearer(&submitter)
        .json(&json!({ "title": "P", "description": "d", "is_active": true }))
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/projects/{project_id}"));

    // same for a closed ticket and a caller without change_ticket
    let res = server
        .put(&format!("/tickets/{ticket_id}"))
        .authorization_bearer(&submitter)
        .json(&json!({
            "title": "T",
            "description": "d",
            "assigned_developer_id": dev.id,
            "priority": "LOW",
            "status": "OPEN",
            "kind": "CHANGE",
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/tickets/{ticket_id}"));
}

#[tokio::test]
async fn ticket_lifecycle_with_audit_trail() {
    let (server, db, _uploads) = test_server();
    let admin = login(&server, "demo1").await;
    let submitter = login(&server, "demo4").await;
    let dev = db.get_user_by_username("demo3").unwrap().unwrap();

    let project = server
        .post("/projects")
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "manager_id": null }))
        .await
        .json::<Value>();
    let project_id = project["id"].as_str().unwrap().to_string();

    let ticket = server
        .post("/tickets")
        .authorization_bearer(&submitter)
        .json(&json!({
            "project_id": project_id,
            "title": "Crash on save",
            "description": "details",
            "priority": "MEDIUM",
            "kind": "BUG/ERROR",
        }))
        .await;
    ticket.assert_status_ok();
    let ticket = ticket.json::<Value>();
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    // submitter sees their own ticket
    let detail = server
        .get(&format!("/tickets/{ticket_id}"))
        .authorization_bearer(&submitter)
        .await;
    detail.assert_status_ok();
    assert!(detail.json::<Value>()["history"].as_array().unwrap().is_empty());

    // an unrelated developer is bounced back
    let dev_token = login(&server, "demo3").await;
    let res = server
        .get(&format!("/tickets/{ticket_id}"))
        .authorization_bearer(&dev_token)
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);

    // admin assigns the developer and closes in one save: two history rows
    let res = server
        .put(&format!("/tickets/{ticket_id}"))
        .authorization_bearer(&admin)
        .json(&json!({
            "title": "Crash on save",
            "description": "details",
            "assigned_developer_id": dev.id,
            "priority": "MEDIUM",
            "status": "CLOSED",
            "kind": "BUG/ERROR",
        }))
        .await;
    res.assert_status_ok();

    let history = db
        .list_history(ticket_id.parse().unwrap())
        .unwrap();
    assert_eq!(history.len(), 2);

    // closed tickets are read-only
    let res = server
        .put(&format!("/tickets/{ticket_id}"))
        .authorization_bearer(&admin)
        .json(&json!({
            "title": "Crash on save",
            "description": "details",
            "assigned_developer_id": dev.id,
            "priority": "HIGH",
            "status": "OPEN",
            "kind": "BUG/ERROR",
        }))
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/tickets/{ticket_id}"));
}

#[tokio::test]
async fn file_upload_stores_reference() {
    let (server, db, uploads) = test_server();
    let admin = login(&server, "demo1").await;
    let submitter = login(&server, "demo4").await;

    let project = server
        .post("/projects")
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "manager_id": null }))
        .await
        .json::<Value>();

    let ticket = server
        .post("/tickets")
        .authorization_bearer(&submitter)
        .json(&json!({
            "project_id": project["id"],
            "title": "T",
            "description": "d",
            "priority": "LOW",
            "kind": "CHANGE",
        }))
        .await
        .json::<Value>();
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    let res = server
        .post(&format!("/tickets/{ticket_id}/files?name=crash.log"))
        .authorization_bearer(&submitter)
        .bytes("stack trace here".as_bytes().to_vec().into())
        .await;
    res.assert_status_ok();

    let files = db.list_ticket_files(ticket_id.parse().unwrap()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "crash.log");
    assert!(std::path::Path::new(&files[0].stored_path).starts_with(uploads.path()));
    assert_eq!(
        std::fs::read_to_string(&files[0].stored_path).unwrap(),
        "stack trace here"
    );
}

#[tokio::test]
async fn dashboard_counts_by_status_and_kind() {
    let (server, _db, _uploads) = test_server();
    let admin = login(&server, "demo1").await;
    let submitter_token = login(&server, "demo4").await;

    let project = server
        .post("/projects")
        .authorization_bearer(&admin)
        .json(&json!({ "title": "P", "description": "d", "manager_id": null }))
        .await
        .json::<Value>();

    for kind in ["BUG/ERROR", "BUG/ERROR", "CHANGE"] {
        server
            .post("/tickets")
            .authorization_bearer(&submitter_token)
            .json(&json!({
                "project_id": project["id"],
                "title": "T",
                "description": "d",
                "priority": "LOW",
                "kind": kind,
            }))
            .await
            .assert_status_ok();
    }

    let counts = server.get("/").authorization_bearer(&admin).await;
    counts.assert_status_ok();
    let counts = counts.json::<Value>();
    assert_eq!(counts["by_status"][0][0], "OPEN");
    assert_eq!(counts["by_status"][0][1], 3);
    assert_eq!(counts["by_kind"][0][0], "BUG/ERROR");
    assert_eq!(counts["by_kind"][0][1], 2);
}
