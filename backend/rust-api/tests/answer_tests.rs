use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{create_test_app, ADMIN_EMAIL, TEACHER_EMAIL};

#[tokio::test]
async fn test_same_mc_question_overwrites() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    for answer in [1, 3] {
        let (status, body) = app
            .call(
                "submit-mc-answer",
                &token,
                json!({ "assessmentId": id, "section": 0, "question": 2, "answer": answer }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ok"], true);
    }

    let (_, body) = app
        .call(
            "get-assessment-student-responses",
            &token,
            json!({ "assessmentId": id }),
        )
        .await;
    assert_eq!(
        body["data"]["studentResponsesBySection"]["0"],
        json!({ "type": "mc", "studentResponses": { "2": 3 } })
    );
}

#[tokio::test]
async fn test_two_sections_create_two_records() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    for section in [0, 1] {
        let (status, _) = app
            .call(
                "submit-mc-answer",
                &token,
                json!({ "assessmentId": id, "section": section, "question": 0, "answer": 2 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let records = app.state.assessments.list_responses(&id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);
    assert_eq!(
        records.iter().map(|r| r.section).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[tokio::test]
async fn test_answers_advance_progress_cursor() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    app.call(
        "submit-mc-answer",
        &token,
        json!({ "assessmentId": id, "section": "0", "question": "4", "answer": "1" }),
    )
    .await;

    let assessment = app.state.assessments.get_assessment(&id).await.unwrap().unwrap();
    assert_eq!(
        (assessment.current_section, assessment.current_question),
        (0, 5)
    );

    let (status, _) = app
        .call(
            "submit-audio-answer",
            &token,
            json!({
                "assessmentId": id,
                "section": 1,
                "question": 0,
                "transcript": "the cat sat",
                "gsUri": "s3://local-recordings/audio/x/1/0.webm"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let assessment = app.state.assessments.get_assessment(&id).await.unwrap().unwrap();
    assert_eq!(
        (assessment.current_section, assessment.current_question),
        (1, 1)
    );
}

#[tokio::test]
async fn test_audio_answer_is_stored_with_transcript() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    let (status, _) = app
        .call(
            "submit-audio-answer",
            &token,
            json!({
                "assessmentId": id,
                "section": 3,
                "question": 1,
                "gsUri": "s3://local-recordings/audio/a/3/1.webm"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let record = app
        .state
        .assessments
        .find_response(&id, 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.files.unwrap()["1"],
        "s3://local-recordings/audio/a/3/1.webm"
    );
    assert_eq!(record.transcripts.unwrap()["1"], "");
}

#[tokio::test]
async fn test_invalid_answer_payloads_are_rejected() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    for data in [
        json!({ "assessmentId": id, "section": -1, "question": 0, "answer": 1 }),
        json!({ "assessmentId": id, "section": 0, "question": "x", "answer": 1 }),
        json!({ "assessmentId": "", "section": 0, "question": 0, "answer": 1 }),
        json!({ "assessmentId": id, "section": 0, "question": 0 }),
    ] {
        let (status, body) = app.call("submit-mc-answer", &token, data.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", data);
        assert_eq!(body["ok"], false);
    }

    let (status, _) = app
        .call(
            "submit-audio-answer",
            &token,
            json!({ "assessmentId": id, "section": 1, "question": 0, "gsUri": " " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mixing_answer_types_in_a_section_is_rejected() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    app.call(
        "submit-mc-answer",
        &token,
        json!({ "assessmentId": id, "section": 0, "question": 0, "answer": 1 }),
    )
    .await;

    let (status, _) = app
        .call(
            "submit-audio-answer",
            &token,
            json!({
                "assessmentId": id,
                "section": 0,
                "question": 1,
                "gsUri": "s3://local-recordings/audio/a/0/1.webm"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_answer_for_unknown_assessment_is_not_found() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;

    let (status, _) = app
        .call(
            "submit-mc-answer",
            &token,
            json!({
                "assessmentId": "65f000000000000000000000",
                "section": 0,
                "question": 0,
                "answer": 1
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_may_answer_on_behalf_of_teacher() {
    let app = create_test_app().await;
    let teacher = app.token_for(TEACHER_EMAIL).await;
    let admin = app.token_for(ADMIN_EMAIL).await;
    let id = app.create_assessment(&teacher).await;

    let (status, _) = app
        .call(
            "submit-mc-answer",
            &admin,
            json!({ "assessmentId": id, "section": 0, "question": 0, "answer": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_indices_are_rejected_without_writing() {
    let app = create_test_app().await;
    let token = app.token_for(TEACHER_EMAIL).await;
    let id = app.create_assessment(&token).await;

    for question in [json!(i64::MAX), json!(1e300), json!(2147483648i64)] {
        let (status, body) = app
            .call(
                "submit-mc-answer",
                &token,
                json!({ "assessmentId": id, "section": 0, "question": question, "answer": 1 }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "question {}", question);
        assert_eq!(body["ok"], false);
    }

    let (status, _) = app
        .call(
            "submit-audio-answer",
            &token,
            json!({
                "assessmentId": id,
                "section": 1,
                "question": i64::MAX,
                "gsUri": "s3://local-recordings/audio/a/1/0.webm"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.state.assessments.list_responses(&id).await.unwrap().is_empty());
    let assessment = app.state.assessments.get_assessment(&id).await.unwrap().unwrap();
    assert_eq!(
        (assessment.current_section, assessment.current_question),
        (0, 0)
    );

    // The largest accepted index still advances the cursor
    let (status, _) = app
        .call(
            "submit-mc-answer",
            &token,
            json!({ "assessmentId": id, "section": 0, "question": 2147483647i64, "answer": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let assessment = app.state.assessments.get_assessment(&id).await.unwrap().unwrap();
    assert_eq!(assessment.current_question, 2147483648);
}
