use std::str::FromStr;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::QuestionKind;
use crate::test_support::{
    self, api_save_answer, api_start_session, api_submit, ExamFixture, TestContext,
};

const TEACHER: (&str, &str) = ("teacher-1", "teacher");

/// Exam worth 100 with three 20-mark MCQs (the student gets two right) and
/// one 40-mark long answer. Returns (exam_id, session_id, long_answer_id).
async fn submitted_mixed_session(ctx: &TestContext) -> (String, String, String) {
    let exam = test_support::insert_exam(
        ctx.state.db(),
        "teacher-1",
        ExamFixture {
            total_marks: dec!(100),
            passing_marks: dec!(40),
            ..ExamFixture::default()
        },
    )
    .await;

    let mut mcq = Vec::new();
    for _ in 0..3 {
        mcq.push(test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(20), 4, 1).await);
    }
    let long_answer = test_support::insert_text_question(
        ctx.state.db(),
        &exam.id,
        QuestionKind::LongAnswer,
        dec!(40),
        Some("The mechanism proceeds through an intermediate"),
    )
    .await;

    let session = api_start_session(ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap().to_string();

    // Two correct options, one wrong.
    for (index, (question, options)) in mcq.iter().enumerate() {
        let pick = if index < 2 { &options[1] } else { &options[0] };
        api_save_answer(
            ctx,
            "student-1",
            &session_id,
            json!({"question_id": question.id, "selected_option_id": pick.id}),
        )
        .await;
    }

    let answer = api_save_answer(
        ctx,
        "student-1",
        &session_id,
        json!({"question_id": long_answer.id, "answer_text": "It forms a carbocation first"}),
    )
    .await;
    let answer_id = answer["id"].as_str().unwrap().to_string();

    let outcome = api_submit(ctx, "student-1", &session_id).await;
    assert_eq!(outcome["session"]["status"], "grading");
    assert_eq!(outcome["auto_grade"]["fully_graded"], false);

    (exam.id, session_id, answer_id)
}

async fn count_grades(ctx: &TestContext, session_id: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM answer_grades g \
         JOIN student_answers sa ON sa.id = g.answer_id \
         WHERE sa.session_id = $1",
    )
    .bind(session_id)
    .fetch_one(ctx.state.db())
    .await
    .expect("count grades")
}

#[tokio::test]
async fn auto_grade_retrigger_is_idempotent() {
    let ctx = test_support::setup_test_context().await;
    let (_, session_id, _) = submitted_mixed_session(&ctx).await;

    let before = count_grades(&ctx, &session_id).await;
    assert_eq!(before, 3);

    let mut marks = Vec::new();
    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/sessions/{session_id}/auto-grade"),
                Some(TEACHER),
                None,
            ))
            .await
            .expect("auto grade");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        marks.push(Decimal::from_str(body["mcq_marks"].as_str().unwrap()).unwrap());
    }

    assert_eq!(marks[0], dec!(40));
    assert_eq!(marks[0], marks[1]);
    assert_eq!(count_grades(&ctx, &session_id).await, before);
}

#[tokio::test]
async fn ai_grades_the_long_answer_and_finalize_computes_the_result() {
    let stub = test_support::start_stub_scoring(30.0, 0.8).await;
    let ctx = test_support::setup_test_context_with_scoring(&stub).await;
    let (_, session_id, answer_id) = submitted_mixed_session(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/ai-grade"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade");
    assert_eq!(response.status(), StatusCode::OK);
    let grade = test_support::read_json(response).await;

    assert_eq!(grade["graded_by"], "ai");
    assert_eq!(grade["is_reviewed"], false);
    assert_eq!(Decimal::from_str(grade["marks_awarded"].as_str().unwrap()).unwrap(), dec!(30));
    assert_eq!(Decimal::from_str(grade["ai_confidence"].as_str().unwrap()).unwrap(), dec!(0.8));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/finalize"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("finalize");
    assert_eq!(response.status(), StatusCode::OK);
    let result = test_support::read_json(response).await;

    assert_eq!(Decimal::from_str(result["obtained_marks"].as_str().unwrap()).unwrap(), dec!(70));
    assert_eq!(Decimal::from_str(result["percentage"].as_str().unwrap()).unwrap(), dec!(70.00));
    assert_eq!(result["is_passed"], true);
    assert_eq!(result["grade"], "B");
}

#[tokio::test]
async fn ai_proposals_are_clamped_to_question_marks() {
    let stub = test_support::start_stub_scoring(55.0, 1.4).await;
    let ctx = test_support::setup_test_context_with_scoring(&stub).await;
    let (_, _, answer_id) = submitted_mixed_session(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/ai-grade"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade");
    let grade = test_support::read_json(response).await;

    assert_eq!(Decimal::from_str(grade["marks_awarded"].as_str().unwrap()).unwrap(), dec!(40));
    assert_eq!(Decimal::from_str(grade["ai_confidence"].as_str().unwrap()).unwrap(), dec!(1));
}

#[tokio::test]
async fn scoring_outage_returns_retryable_error_and_writes_nothing() {
    let ctx = test_support::setup_test_context().await;
    let (_, session_id, answer_id) = submitted_mixed_session(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/ai-grade"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade against dead endpoint");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // No partial grade was written; only the 3 auto grades exist.
    assert_eq!(count_grades(&ctx, &session_id).await, 3);
}

#[tokio::test]
async fn manual_grades_are_never_overwritten_by_ai() {
    let stub = test_support::start_stub_scoring(12.0, 0.9).await;
    let ctx = test_support::setup_test_context_with_scoring(&stub).await;
    let (_, _, answer_id) = submitted_mixed_session(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/answers/{answer_id}/grade"),
            Some(TEACHER),
            Some(json!({"marks_awarded": "35", "feedback": "Well argued"})),
        ))
        .await
        .expect("manual override");
    assert_eq!(response.status(), StatusCode::OK);
    let manual = test_support::read_json(response).await;
    assert_eq!(manual["graded_by"], "manual");
    assert_eq!(manual["is_reviewed"], true);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/ai-grade"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade after manual");
    assert_eq!(response.status(), StatusCode::OK);
    let grade = test_support::read_json(response).await;

    assert_eq!(grade["graded_by"], "manual");
    assert_eq!(Decimal::from_str(grade["marks_awarded"].as_str().unwrap()).unwrap(), dec!(35));
    assert_eq!(grade["feedback"], "Well argued");
}

#[tokio::test]
async fn manual_override_replaces_an_ai_grade() {
    let stub = test_support::start_stub_scoring(10.0, 0.5).await;
    let ctx = test_support::setup_test_context_with_scoring(&stub).await;
    let (_, _, answer_id) = submitted_mixed_session(&ctx).await;

    ctx.app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/ai-grade"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/answers/{answer_id}/grade"),
            Some(TEACHER),
            Some(json!({"marks_awarded": "38", "feedback": "Better than the model thought"})),
        ))
        .await
        .expect("override");
    assert_eq!(response.status(), StatusCode::OK);
    let grade = test_support::read_json(response).await;

    assert_eq!(grade["graded_by"], "manual");
    assert_eq!(grade["is_reviewed"], true);
    assert_eq!(grade["ai_confidence"], serde_json::Value::Null);
    assert_eq!(Decimal::from_str(grade["marks_awarded"].as_str().unwrap()).unwrap(), dec!(38));
}

#[tokio::test]
async fn override_is_bounded_by_question_marks() {
    let ctx = test_support::setup_test_context().await;
    let (_, _, answer_id) = submitted_mixed_session(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/answers/{answer_id}/grade"),
            Some(TEACHER),
            Some(json!({"marks_awarded": "41"})),
        ))
        .await
        .expect("oversized override");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn confirm_marks_an_ai_grade_reviewed() {
    let stub = test_support::start_stub_scoring(20.0, 0.6).await;
    let ctx = test_support::setup_test_context_with_scoring(&stub).await;
    let (_, _, answer_id) = submitted_mixed_session(&ctx).await;

    ctx.app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/ai-grade"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{answer_id}/grade/confirm"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("confirm");
    assert_eq!(response.status(), StatusCode::OK);
    let grade = test_support::read_json(response).await;

    assert_eq!(grade["graded_by"], "ai");
    assert_eq!(grade["is_reviewed"], true);
}

#[tokio::test]
async fn ai_grading_rejects_objective_answers() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "teacher-1", ExamFixture::default()).await;
    let (question, options) =
        test_support::insert_mcq_question(ctx.state.db(), &exam.id, dec!(100), 4, 0).await;

    let session = api_start_session(&ctx, "student-1", &exam.id).await;
    let session_id = session["id"].as_str().unwrap();
    let answer = api_save_answer(
        &ctx,
        "student-1",
        session_id,
        json!({"question_id": question.id, "selected_option_id": options[0].id}),
    )
    .await;

    // Keep the session gradable so the kind check is what rejects.
    sqlx::query("UPDATE exam_sessions SET status = 'submitted' WHERE id = $1")
        .bind(session_id)
        .execute(ctx.state.db())
        .await
        .expect("force submitted");
    sqlx::query("DELETE FROM answer_grades").execute(ctx.state.db()).await.expect("clear grades");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/answers/{}/ai-grade", answer["id"].as_str().unwrap()),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("ai grade mcq");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn finalize_requires_full_grading_coverage() {
    let ctx = test_support::setup_test_context().await;
    let (_, session_id, _) = submitted_mixed_session(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/finalize"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("premature finalize");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn grading_operations_require_the_exam_grader() {
    let ctx = test_support::setup_test_context().await;
    let (_, session_id, answer_id) = submitted_mixed_session(&ctx).await;

    for (method, uri) in [
        (Method::POST, format!("/api/v1/sessions/{session_id}/auto-grade")),
        (Method::POST, format!("/api/v1/sessions/{session_id}/finalize")),
        (Method::POST, format!("/api/v1/sessions/{session_id}/reopen")),
        (Method::POST, format!("/api/v1/answers/{answer_id}/ai-grade")),
        (Method::POST, format!("/api/v1/answers/{answer_id}/grade/confirm")),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                method.clone(),
                &uri,
                Some(("teacher-2", "teacher")),
                None,
            ))
            .await
            .expect("foreign teacher");
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method} {uri}");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                method.clone(),
                &uri,
                Some(("student-1", "student")),
                None,
            ))
            .await
            .expect("student");
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method} {uri}");
    }
}

#[tokio::test]
async fn reopen_rolls_back_to_grading_and_keeps_prior_grades() {
    let ctx = test_support::setup_test_context().await;
    let (_, session_id, answer_id) = submitted_mixed_session(&ctx).await;

    // Grade the long answer manually and finalize.
    ctx.app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/answers/{answer_id}/grade"),
            Some(TEACHER),
            Some(json!({"marks_awarded": "30"})),
        ))
        .await
        .expect("manual grade");
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/finalize"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("finalize");
    assert_eq!(response.status(), StatusCode::OK);

    // Grade edits are rejected while graded.
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/answers/{answer_id}/grade"),
            Some(TEACHER),
            Some(json!({"marks_awarded": "35"})),
        ))
        .await
        .expect("edit while graded");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/reopen"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("reopen");
    assert_eq!(response.status(), StatusCode::OK);
    let session = test_support::read_json(response).await;
    assert_eq!(session["status"], "grading");

    // Result is gone, grades are kept.
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{session_id}/result"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("result after reopen");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(count_grades(&ctx, &session_id).await, 4);

    // Correct the grade and re-finalize with the new total.
    ctx.app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/answers/{answer_id}/grade"),
            Some(TEACHER),
            Some(json!({"marks_awarded": "40"})),
        ))
        .await
        .expect("corrected grade");
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/finalize"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("re-finalize");
    assert_eq!(response.status(), StatusCode::OK);
    let result = test_support::read_json(response).await;
    assert_eq!(Decimal::from_str(result["obtained_marks"].as_str().unwrap()).unwrap(), dec!(80));

    // Reopening a non-graded session is a rejected no-op.
    let reopened = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/reopen"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("reopen graded");
    assert_eq!(reopened.status(), StatusCode::OK);

    let again = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/reopen"),
            Some(TEACHER),
            None,
        ))
        .await
        .expect("double reopen");
    assert_eq!(again.status(), StatusCode::CONFLICT);
}
