use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{TaskError, TransportErrorKind};
use crate::llm::TextGenerator;
use crate::parser;
use crate::prompt;
use crate::schema::{Answer, ExtractionTarget, Quiz, ScheduleDay, UnitSummary};

pub const NO_ANSWER: &str = "Sorry, no answer.";
pub const MAX_QUIZ_QUESTIONS: u32 = 50;

const QUIZ_TARGET: ExtractionTarget = ExtractionTarget::SingleObject {
    required_key: "questions",
};

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub context: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitsRequest {
    pub context: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub units: Vec<String>,
    #[serde(default = "default_study_days")]
    pub study_days: u32,
    #[serde(default)]
    pub exam_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizRequest {
    pub context: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_num_questions")]
    pub num_questions: u32,
    #[serde(default)]
    pub difficulty: Option<String>,
}

fn default_study_days() -> u32 {
    7
}

fn default_num_questions() -> u32 {
    5
}

/// The four study tasks. Each one is prompt -> one model call -> extraction
/// -> validation. Nothing is retried and nothing is shared between calls.
pub struct StudyTasks<G> {
    generator: G,
}

impl<G: TextGenerator> StudyTasks<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Free-form answer. The only task that does not extract JSON.
    pub async fn ask(&self, req: &AskRequest) -> Result<Answer, TaskError> {
        if req.question.trim().is_empty() {
            return Err(TaskError::InvalidRequest("question is empty".to_string()));
        }

        let prompt = prompt::build_answer_prompt(&req.question, &req.context, &req.subject, &req.topic);
        let request = self.generator.request(prompt);

        let answer = match self.generator.generate(&request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.kind == TransportErrorKind::EmptyPayload => {
                debug!(task = "ask", "LLM returned no text, using placeholder");
                NO_ANSWER.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Answer { answer })
    }

    pub async fn units(&self, req: &UnitsRequest) -> Result<Vec<UnitSummary>, TaskError> {
        let prompt = prompt::build_units_prompt(&req.context, &req.subject);
        let (value, raw) = self.generate_structured("units", prompt, ExtractionTarget::ObjectList).await?;

        let units: Vec<UnitSummary> = records(value, &raw)?;
        if units.is_empty() {
            return Err(validation("LLM returned an empty unit list", &raw));
        }
        for unit in &units {
            unit.validate().map_err(|m| validation(m, &raw))?;
        }

        info!(task = "units", count = units.len(), "Units extracted");
        Ok(units)
    }

    pub async fn schedule(&self, req: &ScheduleRequest) -> Result<Vec<ScheduleDay>, TaskError> {
        if req.units.is_empty() {
            return Err(TaskError::InvalidRequest("units list is empty".to_string()));
        }
        if req.study_days == 0 {
            return Err(TaskError::InvalidRequest("study_days must be at least 1".to_string()));
        }

        let exam_date = Some(req.exam_date.as_str()).filter(|d| !d.trim().is_empty());
        let prompt = prompt::build_schedule_prompt(&req.units, req.study_days, exam_date);
        let (value, raw) = self.generate_structured("schedule", prompt, ExtractionTarget::ObjectList).await?;

        let days: Vec<ScheduleDay> = records(value, &raw)?;
        if days.is_empty() {
            return Err(validation("LLM returned an empty schedule", &raw));
        }
        for day in &days {
            day.validate().map_err(|m| validation(m, &raw))?;
        }

        let uncovered: Vec<&String> = req
            .units
            .iter()
            .filter(|unit| !days.iter().any(|d| d.units.contains(unit)))
            .collect();
        if !uncovered.is_empty() {
            warn!(task = "schedule", ?uncovered, "Schedule does not cover every unit");
        }

        info!(task = "schedule", days = days.len(), "Schedule extracted");
        Ok(days)
    }

    pub async fn quiz(&self, req: &QuizRequest) -> Result<Quiz, TaskError> {
        if req.num_questions == 0 || req.num_questions > MAX_QUIZ_QUESTIONS {
            return Err(TaskError::InvalidRequest(format!(
                "num_questions must be between 1 and {}",
                MAX_QUIZ_QUESTIONS
            )));
        }

        let prompt = prompt::build_quiz_prompt(
            &req.context,
            &req.subject,
            &req.topic,
            req.num_questions,
            req.difficulty.as_deref(),
        );
        let (value, raw) = self.generate_structured("quiz", prompt, QUIZ_TARGET).await?;

        if value.get("questions").is_none() {
            return Err(validation("JSON has no \"questions\" key", &raw));
        }
        let quiz: Quiz = serde_json::from_value(value).map_err(|e| validation(e.to_string(), &raw))?;
        if quiz.questions.is_empty() {
            return Err(validation("LLM returned an empty quiz", &raw));
        }
        for question in &quiz.questions {
            question.validate().map_err(|m| validation(m, &raw))?;
        }

        if quiz.questions.len() != req.num_questions as usize {
            warn!(
                task = "quiz",
                requested = req.num_questions,
                received = quiz.questions.len(),
                "Question count differs from request"
            );
        }

        info!(task = "quiz", count = quiz.questions.len(), "Quiz extracted");
        Ok(quiz)
    }

    /// Transport errors return before extraction is attempted.
    async fn generate_structured(
        &self,
        task: &'static str,
        prompt: String,
        target: ExtractionTarget,
    ) -> Result<(Value, String), TaskError> {
        let request = self.generator.request(prompt);
        let raw = self.generator.generate(&request).await?;

        match parser::extract(&raw, target) {
            Ok(value) => Ok((value, raw)),
            Err(e) => {
                warn!(
                    task,
                    reason = %e.reason,
                    raw_len = e.raw.len(),
                    raw = %e.raw,
                    "Could not extract JSON from LLM response"
                );
                Err(e.into())
            }
        }
    }
}

fn validation(message: impl Into<String>, raw: &str) -> TaskError {
    let message = message.into();
    warn!(error = %message, raw = %raw, "LLM response failed validation");
    TaskError::Validation {
        message,
        raw: raw.to_string(),
    }
}

fn records<T: DeserializeOwned>(value: Value, raw: &str) -> Result<Vec<T>, TaskError> {
    let Value::Array(items) = value else {
        return Err(validation("expected a JSON list", raw));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| serde_json::from_value(item).map_err(|e| validation(format!("item {}: {}", i, e), raw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::llm::GenerationResult;
    use crate::schema::GenerationRequest;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays one canned result and remembers the prompts it was sent.
    struct ScriptedGenerator {
        reply: GenerationResult,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn text(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: TransportError) -> Self {
            Self {
                reply: Err(err),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn model(&self) -> &str {
            "scripted"
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.reply.clone()
        }
    }

    fn tasks(reply: &str) -> StudyTasks<ScriptedGenerator> {
        StudyTasks::new(ScriptedGenerator::text(reply))
    }

    fn ask_request(question: &str) -> AskRequest {
        AskRequest {
            question: question.to_string(),
            context: "Mitochondria make ATP.".to_string(),
            subject: String::new(),
            topic: String::new(),
        }
    }

    fn units_request(context: &str) -> UnitsRequest {
        UnitsRequest {
            context: context.to_string(),
            subject: String::new(),
        }
    }

    fn schedule_request(units: &[&str], study_days: u32) -> ScheduleRequest {
        ScheduleRequest {
            units: units.iter().map(|u| u.to_string()).collect(),
            study_days,
            exam_date: String::new(),
        }
    }

    fn quiz_request(num_questions: u32) -> QuizRequest {
        QuizRequest {
            context: "Cells are the basic unit of life.".to_string(),
            subject: String::new(),
            topic: String::new(),
            num_questions,
            difficulty: None,
        }
    }

    #[tokio::test]
    async fn test_ask_trims_answer() {
        let tasks = tasks("  The powerhouse of the cell.\n");
        let answer = tasks.ask(&ask_request("What do mitochondria do?")).await.unwrap();
        assert_eq!(answer.answer, "The powerhouse of the cell.");
        assert!(tasks.generator().last_prompt().contains("Mitochondria make ATP."));
    }

    #[tokio::test]
    async fn test_ask_uses_placeholder_when_payload_empty() {
        let tasks = StudyTasks::new(ScriptedGenerator::failing(TransportError::new(
            TransportErrorKind::EmptyPayload,
            "no text",
        )));
        let answer = tasks.ask(&ask_request("Anything?")).await.unwrap();
        assert_eq!(answer.answer, NO_ANSWER);
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question_without_calling_llm() {
        let tasks = tasks("unused");
        let err = tasks.ask(&ask_request("   ")).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidRequest(_)));
        assert_eq!(tasks.generator().calls(), 0);
    }

    #[tokio::test]
    async fn test_units_scenario_preserves_order() {
        let tasks = tasks(r#"[{"unit":"Cells","summary":"..."}, {"unit":"Genetics","summary":"..."}]"#);
        let units = tasks
            .units(&units_request("Chapter 1: Cells. Chapter 2: Genetics."))
            .await
            .unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].title, "Cells");
        assert_eq!(units[1].title, "Genetics");
        assert_eq!(
            serde_json::to_value(&units).unwrap(),
            json!([
                {"unit": "Cells", "summary": "..."},
                {"unit": "Genetics", "summary": "..."}
            ])
        );
        assert!(tasks.generator().last_prompt().contains("Chapter 1: Cells. Chapter 2: Genetics."));
    }

    #[tokio::test]
    async fn test_units_recovers_from_prose() {
        let tasks = tasks("Sure! Here is the list: [{\"unit\":\"Cells\",\"summary\":\"Basics\"}] Hope that helps!");
        let units = tasks.units(&units_request("notes")).await.unwrap();
        assert_eq!(units[0].summary, "Basics");
    }

    #[tokio::test]
    async fn test_units_without_json_is_extraction_error_with_raw() {
        let reply = "I could not find any units in these notes.";
        let err = tasks(reply).units(&units_request("notes")).await.unwrap_err();
        assert!(matches!(err, TaskError::Extraction(_)));
        assert_eq!(err.raw(), Some(reply));
    }

    #[tokio::test]
    async fn test_units_missing_summary_is_validation_error() {
        let err = tasks(r#"[{"unit":"Cells"}]"#)
            .units(&units_request("notes"))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_short_circuits_extraction() {
        // Body looks like valid JSON but must never reach the extractor
        let err = TransportError::new(TransportErrorKind::Status, "LLM error: 503")
            .with_status(503, r#"[{"unit":"x","summary":"y"}]"#.to_string());
        let tasks = StudyTasks::new(ScriptedGenerator::failing(err));

        let result = tasks.units(&units_request("notes")).await;
        match result {
            Err(TaskError::Transport(e)) => assert_eq!(e.status, Some(503)),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_timeout_surfaces_for_quiz() {
        let tasks = StudyTasks::new(ScriptedGenerator::failing(TransportError::new(
            TransportErrorKind::Timeout,
            "operation timed out",
        )));
        let err = tasks.quiz(&quiz_request(3)).await.unwrap_err();
        assert!(matches!(err, TaskError::Transport(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_schedule_round_trip() {
        let reply = json!([
            {"day": 1, "units": ["Cells"]},
            {"day": 2, "units": ["Genetics", "Evolution"]}
        ]);
        let tasks = tasks(&reply.to_string());
        let days = tasks
            .schedule(&schedule_request(&["Cells", "Genetics", "Evolution"], 2))
            .await
            .unwrap();

        assert_eq!(serde_json::to_value(&days).unwrap(), reply);
        let prompt = tasks.generator().last_prompt();
        assert!(prompt.contains("Study days: 2"));
        assert!(!prompt.contains("Exam date"));
    }

    #[tokio::test]
    async fn test_schedule_rejects_day_zero() {
        let err = tasks(r#"[{"day": 0, "units": ["Cells"]}]"#)
            .schedule(&schedule_request(&["Cells"], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_schedule_rejects_zero_study_days() {
        let tasks = tasks("unused");
        let err = tasks.schedule(&schedule_request(&["Cells"], 0)).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidRequest(_)));
        assert_eq!(tasks.generator().calls(), 0);
    }

    #[tokio::test]
    async fn test_quiz_round_trip() {
        let reply = json!({
            "questions": [
                {"question": "What is the basic unit of life?", "options": ["A", "B", "C"], "answer": 1, "explanation": "From the notes"}
            ]
        });
        let tasks = tasks(&reply.to_string());
        let quiz = tasks.quiz(&quiz_request(1)).await.unwrap();

        assert_eq!(serde_json::to_value(&quiz).unwrap(), reply);
        assert!(tasks.generator().last_prompt().contains("Generate exactly 1 questions"));
    }

    #[tokio::test]
    async fn test_quiz_answer_out_of_bounds_rejected() {
        let reply = r#"{"questions":[{"question":"Q","options":["A","B","C"],"answer":5}]}"#;
        let err = tasks(reply).quiz(&quiz_request(1)).await.unwrap_err();
        match err {
            TaskError::Validation { message, raw } => {
                assert!(message.contains("answer index 5"));
                assert_eq!(raw, reply);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_quiz_without_questions_key_rejected() {
        let err = tasks(r#"{"quiz": []}"#).quiz(&quiz_request(1)).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_quiz_with_no_questions_rejected() {
        let reply = r#"{"questions": []}"#;
        let err = tasks(reply).quiz(&quiz_request(3)).await.unwrap_err();
        match err {
            TaskError::Validation { message, raw } => {
                assert!(message.contains("empty quiz"));
                assert_eq!(raw, reply);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extra_fields_from_model_are_passed_through() {
        let units_reply = json!([{"unit": "Cells", "summary": "s", "key_points": ["a", "b"]}]);
        let units = tasks(&units_reply.to_string())
            .units(&units_request("notes"))
            .await
            .unwrap();
        assert_eq!(serde_json::to_value(&units).unwrap(), units_reply);

        let quiz_reply = json!({
            "title": "Cells quiz",
            "questions": [
                {"question": "Q", "options": ["A", "B", "C"], "answer": 1, "difficulty": "easy"}
            ]
        });
        let quiz = tasks(&quiz_reply.to_string()).quiz(&quiz_request(1)).await.unwrap();
        assert_eq!(serde_json::to_value(&quiz).unwrap(), quiz_reply);
    }

    #[tokio::test]
    async fn test_quiz_num_questions_bounds() {
        let tasks = tasks("unused");
        assert!(matches!(
            tasks.quiz(&quiz_request(0)).await,
            Err(TaskError::InvalidRequest(_))
        ));
        assert!(matches!(
            tasks.quiz(&quiz_request(MAX_QUIZ_QUESTIONS + 1)).await,
            Err(TaskError::InvalidRequest(_))
        ));
        assert_eq!(tasks.generator().calls(), 0);
    }

    #[test]
    fn test_request_defaults() {
        let schedule: ScheduleRequest = serde_json::from_str(r#"{"units": ["Cells"]}"#).unwrap();
        assert_eq!(schedule.study_days, 7);
        assert_eq!(schedule.exam_date, "");

        let quiz: QuizRequest = serde_json::from_str(r#"{"context": "notes"}"#).unwrap();
        assert_eq!(quiz.num_questions, 5);
        assert!(quiz.difficulty.is_none());
    }

    #[test]
    fn test_ask_request_requires_context() {
        let err = serde_json::from_str::<AskRequest>(r#"{"question": "Q"}"#).unwrap_err();
        assert!(err.to_string().contains("context"));

        let ask: AskRequest = serde_json::from_str(r#"{"question": "Q", "context": ""}"#).unwrap();
        assert_eq!(ask.context, "");
        assert_eq!(ask.subject, "");
    }
}
