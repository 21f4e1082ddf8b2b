use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerGrade, GradingPayload};
use crate::db::types::GradedBy;
use crate::repositories;
use crate::repositories::grades::CreateGrade;
use crate::services::error::{EngineError, EngineResult};

const SCORING_SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading one free-text answer from a school exam.
Compare the student's answer against the model answer and the grading rubric, then award marks.

Rules:
1. Award partial credit for partially correct answers.
2. Never award more than the maximum marks, never less than zero.
3. Report how confident you are in the assessment as a number between 0 and 1.
4. Keep the feedback short and addressed to the student.

Response format (strict JSON):
{
  "marks_awarded": <number between 0 and the maximum marks>,
  "feedback": "short feedback for the student",
  "confidence": <number between 0 and 1>
}
"#;

/// Proposed grade returned by the scoring model, already clamped to the
/// question's bounds.
#[derive(Debug, Clone)]
pub(crate) struct ScoredAnswer {
    pub(crate) marks_awarded: Decimal,
    pub(crate) feedback: Option<String>,
    pub(crate) confidence: Decimal,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoringClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl ScoringClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.scoring().request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.scoring().api_key.clone(),
            base_url: settings.scoring().base_url.trim_end_matches('/').to_string(),
            model: settings.scoring().model.clone(),
            max_tokens: settings.scoring().max_tokens,
            max_retries: settings.scoring().max_retries,
        })
    }

    /// Send one answer to the scoring model. Network and parse failures come
    /// back as errors with no other side effect, so the caller can retry.
    pub(crate) async fn score(
        &self,
        answer_text: &str,
        model_answer: Option<&str>,
        rubric: Option<&Value>,
        max_marks: Decimal,
    ) -> Result<ScoredAnswer> {
        let user_prompt = format!(
            "Maximum marks: {max_marks}\n\nModel answer:\n{}\n\nGrading rubric:\n{}\n\nStudent's answer:\n{answer_text}\n\nGrade the student's answer. Respond with the strict JSON format from the system prompt.",
            model_answer.unwrap_or("(none provided; rely on the rubric)"),
            rubric
                .map(|value| serde_json::to_string_pretty(value).unwrap_or_default())
                .unwrap_or_else(|| "(none provided; rely on the model answer)".to_string()),
        );

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SCORING_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": 0.0,
            "response_format": {"type": "json_object"}
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=self.max_retries {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow!("Scoring API error: {body}"));
                }
                Err(err) => {
                    last_error = Some(anyhow!(err).context("Failed to call scoring API"));
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .context("Missing scoring response content")?;

        parse_scored_payload(content, max_marks)
    }
}

/// Parse the model's strict-JSON verdict and clamp it into contract bounds:
/// marks into [0, max_marks], confidence into [0, 1].
fn parse_scored_payload(content: &str, max_marks: Decimal) -> Result<ScoredAnswer> {
    let value: Value =
        serde_json::from_str(content).context("Failed to parse scoring JSON")?;

    let marks = value
        .get("marks_awarded")
        .and_then(|value| value.as_f64())
        .and_then(Decimal::from_f64)
        .context("Scoring response is missing marks_awarded")?;

    let confidence = value
        .get("confidence")
        .and_then(|value| value.as_f64())
        .and_then(Decimal::from_f64)
        .context("Scoring response is missing confidence")?;

    let feedback = value
        .get("feedback")
        .and_then(|value| value.as_str())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    Ok(ScoredAnswer {
        marks_awarded: marks.clamp(Decimal::ZERO, max_marks).round_dp(2),
        feedback,
        confidence: confidence.clamp(Decimal::ZERO, Decimal::ONE).round_dp(3),
    })
}

/// Propose a grade for one subjective answer. Either a complete, clamped
/// AnswerGrade is written or nothing is; a provider failure surfaces as
/// `ScoringUnavailable` and the call is safe to retry. An answer that
/// already has any grade is returned untouched.
pub(crate) async fn ai_grade(
    pool: &PgPool,
    scoring: &ScoringClient,
    answer_id: &str,
) -> EngineResult<AnswerGrade> {
    let answer = repositories::answers::find_by_id(pool, answer_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("Answer {answer_id} not found")))?;

    if let Some(existing) = repositories::grades::find_by_answer(pool, answer_id).await? {
        return Ok(existing);
    }

    let session = repositories::sessions::find_by_id(pool, &answer.session_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Session for answer not found".to_string()))?;

    if !session.status.is_gradable() {
        return Err(EngineError::invalid_state(format!(
            "Answers can only be graded for submitted sessions, session is {:?}",
            session.status
        )));
    }

    let question = repositories::questions::find_by_id(pool, &answer.question_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Question for answer not found".to_string()))?;

    let (model_answer, rubric) = match question.grading_payload() {
        GradingPayload::Objective => {
            return Err(EngineError::validation(
                "Objective answers are scored by the auto-grader".to_string(),
            ));
        }
        GradingPayload::RubricScored { model_answer: None, rubric: None } => {
            return Err(EngineError::validation(
                "Question has neither a model answer nor a grading rubric".to_string(),
            ));
        }
        GradingPayload::RubricScored { model_answer, rubric } => (model_answer, rubric),
    };

    // The provider call holds no locks or transactions; the write below
    // re-checks that the answer is still ungraded.
    let scored = scoring
        .score(answer.answer_text.as_deref().unwrap_or_default(), model_answer, rubric, question.marks)
        .await
        .map_err(|err| {
            metrics::counter!("ai_grades_total", "status" => "unavailable").increment(1);
            EngineError::ScoringUnavailable(err.to_string())
        })?;

    let inserted = repositories::grades::insert_if_absent(
        pool,
        CreateGrade {
            id: &Uuid::new_v4().to_string(),
            answer_id,
            marks_awarded: scored.marks_awarded,
            feedback: scored.feedback.as_deref(),
            graded_by: GradedBy::Ai,
            ai_confidence: Some(scored.confidence),
            is_reviewed: false,
            now: primitive_now_utc(),
        },
    )
    .await?;

    if inserted {
        metrics::counter!("ai_grades_total", "status" => "proposed").increment(1);
        tracing::info!(
            answer_id,
            session_id = %answer.session_id,
            marks = %scored.marks_awarded,
            confidence = %scored.confidence,
            "AI grade proposed"
        );
    }

    repositories::grades::find_by_answer(pool, answer_id)
        .await?
        .ok_or_else(|| EngineError::Internal(anyhow!("grade vanished after insert")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_clamps_marks_to_question_bounds() {
        let scored = parse_scored_payload(
            r#"{"marks_awarded": 55.0, "feedback": "Good work", "confidence": 0.9}"#,
            dec!(40),
        )
        .unwrap();
        assert_eq!(scored.marks_awarded, dec!(40));

        let scored = parse_scored_payload(
            r#"{"marks_awarded": -3.0, "feedback": "", "confidence": 0.4}"#,
            dec!(40),
        )
        .unwrap();
        assert_eq!(scored.marks_awarded, dec!(0));
        assert_eq!(scored.feedback, None);
    }

    #[test]
    fn parse_clamps_confidence_into_unit_interval() {
        let scored = parse_scored_payload(
            r#"{"marks_awarded": 30, "feedback": "ok", "confidence": 1.7}"#,
            dec!(40),
        )
        .unwrap();
        assert_eq!(scored.confidence, dec!(1));
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        assert!(parse_scored_payload("not json", dec!(10)).is_err());
        assert!(parse_scored_payload(r#"{"feedback": "missing marks"}"#, dec!(10)).is_err());
        assert!(
            parse_scored_payload(r#"{"marks_awarded": 5, "feedback": "x"}"#, dec!(10)).is_err()
        );
    }

    #[test]
    fn parse_keeps_partial_credit_untouched() {
        let scored = parse_scored_payload(
            r#"{"marks_awarded": 30.0, "feedback": "Partially correct", "confidence": 0.8}"#,
            dec!(40),
        )
        .unwrap();
        assert_eq!(scored.marks_awarded, dec!(30));
        assert_eq!(scored.confidence, dec!(0.8));
        assert_eq!(scored.feedback.as_deref(), Some("Partially correct"));
    }
}
