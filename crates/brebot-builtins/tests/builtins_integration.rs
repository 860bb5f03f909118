#![allow(clippy::unwrap_used, clippy::expect_used)]

use brebot_builtins::*;
use brebot_skills::{Skill, SkillCall, SkillRegistry};
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// HTTP request skill against a mock endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn http_request_posts_json_and_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/crm"))
        .and(body_json(serde_json::json!({"lead": "acme"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 77, "ok": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let skill = HttpRequestSkill::new().unwrap().allow_private_hosts();
    let call = SkillCall::new(
        "http_request",
        Uuid::new_v4(),
        1,
        serde_json::json!({
            "url": format!("{}/hooks/crm", server.uri()),
            "method": "POST",
            "json": {"lead": "acme"}
        }),
    );

    let out = skill.execute(call).await.unwrap();
    assert_eq!(out.outputs["status"], 201);
    assert_eq!(out.outputs["body"]["id"], 77);
}

#[tokio::test]
async fn http_request_error_status_fails_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let skill = HttpRequestSkill::new().unwrap().allow_private_hosts();
    let call = SkillCall::new(
        "http_request",
        Uuid::new_v4(),
        4,
        serde_json::json!({"url": format!("{}/broken", server.uri())}),
    );

    let err = skill.execute(call).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("HTTP 503"), "unexpected error: {message}");
    assert!(message.contains("maintenance"));
}

#[tokio::test]
async fn http_request_blocks_loopback_by_default() {
    let server = MockServer::start().await;
    let skill = HttpRequestSkill::new().unwrap();
    let call = SkillCall::new(
        "http_request",
        Uuid::new_v4(),
        1,
        serde_json::json!({"url": server.uri()}),
    );
    assert!(skill.execute(call).await.is_err());
}

// ---------------------------------------------------------------------------
// Registry wiring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn builtins_run_through_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = SkillRegistry::new();
    register_builtins(&mut registry, tmp.path()).unwrap();

    let job_id = Uuid::new_v4();
    let out = registry
        .execute(SkillCall::new(
            "draft_document",
            job_id,
            1,
            serde_json::json!({"title": "Board update", "body": "Numbers are up."}),
        ))
        .await
        .unwrap();

    let path = out.outputs["path"].as_str().unwrap();
    assert!(path.starts_with(tmp.path().join("documents").to_str().unwrap()));
    assert!(std::path::Path::new(path).exists());
}
