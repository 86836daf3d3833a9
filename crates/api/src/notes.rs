use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub filename: String,
    pub text: String,
    pub summary: String,
}

impl Note {
    pub fn new(filename: String, text: String) -> Self {
        let summary = summarize(&text);
        Self {
            id: Uuid::new_v4(),
            filename,
            text,
            summary,
        }
    }
}

/// First 500 characters, with an ellipsis when something was cut.
fn summarize(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Where uploaded notes live, keyed by user and course.
pub trait NoteStore: Send + Sync {
    fn add(&self, user_id: &str, course: &str, note: Note);

    /// Insertion order; empty when nothing was stored.
    fn list(&self, user_id: &str, course: &str) -> Vec<Note>;
}

#[derive(Default)]
pub struct MemoryNoteStore {
    notes: DashMap<(String, String), Vec<Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NoteStore for MemoryNoteStore {
    fn add(&self, user_id: &str, course: &str, note: Note) {
        self.notes
            .entry((user_id.to_string(), course.to_string()))
            .or_default()
            .push(note);
    }

    fn list(&self, user_id: &str, course: &str) -> Vec<Note> {
        self.notes
            .get(&(user_id.to_string(), course.to_string()))
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }
}
