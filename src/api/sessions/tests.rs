use std::str::FromStr;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::ExamStatus;
use crate::test_support::{
    self, api_save_answer as save_answer, api_start_session as start_session,
    api_submit as submit, ExamFixture,
};

#[tokio::test]
async fn student_completes_an_all_mcq_exam_in_one_flow() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    let (question, options) =
        test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(100), 4, 1).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    assert_eq!(session["status"], "in_progress");
    assert_eq!(session["attempt_number"], 1);

    save_answer(
        &ctx,
        "student-1",
        session["id"].as_str().unwrap(),
        json!({"question_id": question.id, "selected_option_id": options[1].id}),
    )
    .await;

    let outcome = submit(&ctx, "student-1", session["id"].as_str().unwrap()).await;
    assert_eq!(outcome["session"]["status"], "graded");
    assert_eq!(outcome["auto_grade"]["fully_graded"], true);

    let mcq_marks =
        Decimal::from_str(outcome["auto_grade"]["mcq_marks"].as_str().unwrap()).unwrap();
    assert_eq!(mcq_marks, dec!(100));
}

#[tokio::test]
async fn wrong_and_missing_mcq_answers_score_zero() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    let (first, first_options) =
        test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(50), 4, 0).await;
    let (_second, _) =
        test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(50), 4, 2).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();

    // Wrong option on the first question, second question left unanswered.
    save_answer(
        &ctx,
        "student-1",
        session_id,
        json!({"question_id": first.id, "selected_option_id": first_options[3].id}),
    )
    .await;

    let outcome = submit(&ctx, "student-1", session_id).await;
    assert_eq!(outcome["session"]["status"], "graded");

    let mcq_marks =
        Decimal::from_str(outcome["auto_grade"]["mcq_marks"].as_str().unwrap()).unwrap();
    assert_eq!(mcq_marks, dec!(0));
}

#[tokio::test]
async fn second_start_conflicts_while_a_session_is_open() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;

    start_session(&ctx, "student-1", &exam.id).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/sessions", exam.id),
            Some(("student-1", "student")),
            None,
        ))
        .await
        .expect("second start");

    assert_eq!(response.status(), StatusCode::CONFLICT);

    // A different student is unaffected.
    start_session(&ctx, "student-2", &exam.id).await;
}

#[tokio::test]
async fn attempt_numbers_increase_across_submitted_attempts() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(100), 4, 0).await;

    let first = start_session(&ctx, "student-1", &exam.id).await;
    submit(&ctx, "student-1", first["id"].as_str().unwrap()).await;

    let second = start_session(&ctx, "student-1", &exam.id).await;
    assert_eq!(second["attempt_number"], 2);
}

#[tokio::test]
async fn attempt_limit_is_enforced() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(
        ctx.state.db(),
        "teacher-1",
        ExamFixture { max_attempts: 1, ..ExamFixture::default() },
    )
    .await;
    test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(100), 4, 0).await;

    let first = start_session(&ctx, "student-1", &exam.id).await;
    submit(&ctx, "student-1", first["id"].as_str().unwrap()).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/sessions", exam.id),
            Some(("student-1", "student")),
            None,
        ))
        .await
        .expect("start beyond limit");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn draft_exams_do_not_accept_attempts() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(
        ctx.state.db(),
        "teacher-1",
        ExamFixture { status: ExamStatus::Draft, ..ExamFixture::default() },
    )
    .await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/sessions", exam.id),
            Some(("student-1", "student")),
            None,
        ))
        .await
        .expect("start draft");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn only_students_start_sessions() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/sessions", exam.id),
            Some(("teacher-1", "teacher")),
            None,
        ))
        .await
        .expect("teacher start");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/sessions", exam.id),
            None,
            None,
        ))
        .await
        .expect("anonymous start");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tab_switches_flag_the_session_at_the_threshold() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();

    for expected_count in 1..=4 {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/sessions/{session_id}/violations"),
                Some(("student-1", "student")),
                Some(json!({"violation_type": "tab_switch"})),
            ))
            .await
            .expect("violation");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["tab_switch_count"], expected_count);
        assert_eq!(body["is_flagged"], false);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/violations"),
            Some(("student-1", "student")),
            Some(json!({"violation_type": "tab_switch"})),
        ))
        .await
        .expect("fifth violation");
    let body = test_support::read_json(response).await;
    assert_eq!(body["tab_switch_count"], 5);
    assert_eq!(body["is_flagged"], true);

    // Other counters do not unflag, and the flag is one-way.
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/violations"),
            Some(("student-1", "student")),
            Some(json!({"violation_type": "copy_paste"})),
        ))
        .await
        .expect("copy paste violation");
    let body = test_support::read_json(response).await;
    assert_eq!(body["copy_paste_attempts"], 1);
    assert_eq!(body["is_flagged"], true);
}

#[tokio::test]
async fn violations_require_the_owning_student_and_an_open_session() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(100), 4, 0).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/violations"),
            Some(("student-2", "student")),
            Some(json!({"violation_type": "tab_switch"})),
        ))
        .await
        .expect("foreign violation");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    submit(&ctx, "student-1", session_id).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/violations"),
            Some(("student-1", "student")),
            Some(json!({"violation_type": "tab_switch"})),
        ))
        .await
        .expect("violation after submit");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn answers_are_validated_against_the_question_kind() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    let (mcq, _options) =
        test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(50), 4, 0).await;
    let (_other, other_options) =
        test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(50), 4, 0).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/sessions/{session_id}/answers"),
            Some(("student-1", "student")),
            Some(json!({"question_id": mcq.id, "answer_text": "free text on an MCQ"})),
        ))
        .await
        .expect("text on mcq");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/sessions/{session_id}/answers"),
            Some(("student-1", "student")),
            Some(json!({"question_id": mcq.id, "selected_option_id": other_options[0].id})),
        ))
        .await
        .expect("foreign option");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submitting_twice_conflicts() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(100), 4, 0).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();
    submit(&ctx, "student-1", session_id).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/submit"),
            Some(("student-1", "student")),
            Some(json!({})),
        ))
        .await
        .expect("second submit");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_starts_create_exactly_one_session() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;

    let (first, second) = tokio::join!(
        crate::services::session_flow::start_session(ctx.state.db(), "student-1", &exam.id),
        crate::services::session_flow::start_session(ctx.state.db(), "student-1", &exam.id),
    );

    // Exactly one of the two racing starts wins.
    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1, "{first:?} / {second:?}");

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_sessions \
         WHERE exam_id = $1 AND student_id = $2 AND status = 'in_progress'",
    )
    .bind(&exam.id)
    .bind("student-1")
    .fetch_one(ctx.state.db())
    .await
    .expect("count open sessions");
    assert_eq!(open, 1);
}

#[tokio::test]
async fn session_visibility_is_owner_or_grader() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;

    let session = start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();

    for (principal, expected) in [
        (("student-1", "student"), StatusCode::OK),
        (("teacher-1", "teacher"), StatusCode::OK),
        (("admin-1", "admin"), StatusCode::OK),
        (("student-2", "student"), StatusCode::FORBIDDEN),
        (("teacher-2", "teacher"), StatusCode::FORBIDDEN),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/sessions/{session_id}"),
                Some(principal),
                None,
            ))
            .await
            .expect("get session");
        assert_eq!(response.status(), expected, "principal {principal:?}");
    }
}
