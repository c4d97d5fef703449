use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use std::time::Duration;

mod common;

use common::{create_test_app, create_test_app_with, test_config, TestApp, OTHER_TEACHER_EMAIL, TEACHER_EMAIL};

const BOUNDARY: &str = "----assessment-upload-boundary";

fn multipart_body(fields: &[(&str, &str)], audio: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = audio {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(app: &TestApp, token: &str, body: Vec<u8>) -> (StatusCode, Value) {
    app.send(
        Request::builder()
            .method("POST")
            .uri("/api/upload-audio")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_upload_stores_recording_and_returns_reference() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    let body = multipart_body(
        &[("assessmentId", id.as_str()), ("section", "1"), ("question", "0")],
        Some(("recording.webm", "audio/webm", &b"fake-webm-bytes"[..])),
    );
    let (status, response) = upload(&app, &token, body).await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", response);

    let gs_uri = response["data"]["gsUri"].as_str().unwrap().to_string();
    assert_eq!(gs_uri, format!("s3://local-recordings/audio/{}/1/0.webm", id));

    // The reference feeds straight into the audio answer and signs on read
    let (status, _) = app
        .call(
            "submit-audio-answer",
            &token,
            json!({ "assessmentId": id, "section": 1, "question": 0, "gsUri": gs_uri }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, responses) = app
        .call(
            "get-assessment-student-responses",
            &token,
            json!({ "assessmentId": id }),
        )
        .await;
    let url = responses["data"]["studentResponsesBySection"]["1"]["files"]["0"]
        .as_str()
        .unwrap();
    assert!(url.starts_with(&format!(
        "memory://local-recordings/audio/{}/1/0.webm",
        id
    )));
}

#[tokio::test]
async fn test_upload_rejects_non_audio_and_missing_fields() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    let body = multipart_body(
        &[("assessmentId", id.as_str()), ("section", "1"), ("question", "0")],
        Some(("notes.txt", "text/plain", &b"not audio"[..])),
    );
    let (status, _) = upload(&app, &token, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = multipart_body(
        &[("assessmentId", id.as_str()), ("section", "1"), ("question", "0")],
        None,
    );
    let (status, _) = upload(&app, &token, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = multipart_body(
        &[("assessmentId", id.as_str()), ("section", "one"), ("question", "0")],
        Some(("a.webm", "audio/webm", &b"bytes"[..])),
    );
    let (status, _) = upload(&app, &token, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_to_foreign_assessment_is_forbidden() {
    let app = create_test_app().await;
    let owner = app.token_for(TEACHER_EMAIL).await;
    let other = app.token_for(OTHER_TEACHER_EMAIL).await;
    let id = app.create_assessment(&owner).await;

    let body = multipart_body(
        &[("assessmentId", id.as_str()), ("section", "2"), ("question", "1")],
        Some(("a.webm", "audio/webm", &b"bytes"[..])),
    );
    let (status, _) = upload(&app, &other, body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let key = format!("audio/{}/2/1.webm", id);
    assert!(app
        .state
        .blobs
        .presign_get(&key, Duration::from_secs(60))
        .is_err());
}

#[tokio::test]
async fn test_upload_over_body_limit_is_rejected() {
    let mut config = test_config();
    config.upload_limit_bytes = 64;
    let app = create_test_app_with(config).await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    let recording = vec![7u8; 4096];
    let body = multipart_body(
        &[("assessmentId", id.as_str()), ("section", "1"), ("question", "0")],
        Some(("long.webm", "audio/webm", &recording[..])),
    );
    let (status, response) = upload(&app, &token, body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "body: {}", response);
    assert_eq!(response["ok"], false);

    let key = format!("audio/{}/1/0.webm", id);
    assert!(app
        .state
        .blobs
        .presign_get(&key, Duration::from_secs(60))
        .is_err());
}
