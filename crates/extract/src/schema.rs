use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// One call to the generation endpoint. Streaming is always off: the whole
/// response is needed before anything can be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            timeout,
        }
    }

    pub fn stream(&self) -> bool {
        false
    }
}

/// The shape we expect to pull out of the model's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTarget {
    /// `[{...}, {...}]`
    ObjectList,
    /// `{"<required_key>": ...}`
    SingleObject { required_key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    #[serde(rename = "unit", alias = "title")]
    pub title: String,
    pub summary: String,
    /// Fields the model added beyond the schema, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub day: u32,
    pub units: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<QuizQuestion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UnitSummary {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("unit title is empty".to_string());
        }
        Ok(())
    }
}

impl ScheduleDay {
    pub fn validate(&self) -> Result<(), String> {
        if self.day == 0 {
            return Err("day numbers start at 1".to_string());
        }
        if self.units.is_empty() {
            return Err(format!("day {} has no units", self.day));
        }
        Ok(())
    }
}

impl QuizQuestion {
    /// Index bounds and option count. Extraction only guarantees the JSON
    /// parsed; this is where the domain contract is checked.
    pub fn validate(&self) -> Result<(), String> {
        if self.options.len() < 2 {
            return Err(format!(
                "question \"{}\" has {} option(s), need at least 2",
                self.question,
                self.options.len()
            ));
        }
        if self.answer >= self.options.len() {
            return Err(format!(
                "question \"{}\" has answer index {} but only {} options",
                self.question,
                self.answer,
                self.options.len()
            ));
        }
        Ok(())
    }
}
