fn context_lines(subject: &str, topic: &str) -> String {
    let mut lines = String::new();
    if !subject.trim().is_empty() {
        lines.push_str(&format!("Subject: {}\n", subject.trim()));
    }
    if !topic.trim().is_empty() {
        lines.push_str(&format!("Topic: {}\n", topic.trim()));
    }
    lines
}

/// Free answer: notes are context, not a boundary.
pub fn build_answer_prompt(question: &str, notes: &str, subject: &str, topic: &str) -> String {
    format!(
        r#"You are a helpful, precise study assistant. Use the provided notes as context if they are relevant, but you may answer any question to the best of your ability.
If the answer is in the notes, prefer quoting or referencing them, but you are not limited to the notes.
Be concise and use the subject and topic for context when possible. Respond with ONLY the answer text.

{}Notes (optional):
{}

Question: {}

Answer:"#,
        context_lines(subject, topic),
        notes,
        question
    )
}

pub fn build_units_prompt(notes: &str, subject: &str) -> String {
    format!(
        r#"Analyze the following study notes and break them into logical units or chapters.

INSTRUCTIONS:
1. Keep the units in the order they appear in the notes
2. For each unit give its title and a brief summary
3. Output ONLY a JSON list, nothing else

SCHEMA:
[{{"unit": "Unit Title", "summary": "brief summary"}}]

Output ONLY the JSON list, no markdown, no explanations.

{}NOTES:
{}

JSON OUTPUT:"#,
        context_lines(subject, ""),
        notes
    )
}

pub fn build_schedule_prompt(units: &[String], study_days: u32, exam_date: Option<&str>) -> String {
    let unit_list = units
        .iter()
        .map(|u| format!("- {}", u))
        .collect::<Vec<_>>()
        .join("\n");

    let exam_line = match exam_date {
        Some(date) if !date.trim().is_empty() => format!("Exam date: {}\n", date.trim()),
        _ => String::new(),
    };

    format!(
        r#"Given these units and a number of study days, create a day-by-day study schedule that covers ALL units efficiently.

INSTRUCTIONS:
1. Every unit listed below must appear on at least one day
2. Number days starting from 1
3. Output ONLY a JSON list, nothing else

SCHEMA:
[{{"day": 1, "units": ["Unit 1", "Unit 2"]}}]

Output ONLY the JSON list, no markdown, no explanations.

UNITS:
{}

Study days: {}
{}
JSON OUTPUT:"#,
        unit_list, study_days, exam_line
    )
}

/// Quiz grounding is stricter than the free answer: notes are the only source.
pub fn build_quiz_prompt(
    notes: &str,
    subject: &str,
    topic: &str,
    num_questions: u32,
    difficulty: Option<&str>,
) -> String {
    let difficulty_line = match difficulty {
        Some(d) if !d.trim().is_empty() => format!("Difficulty: {}\n", d.trim()),
        _ => String::new(),
    };

    format!(
        r#"You are a helpful assistant that creates short multiple-choice quizzes from study notes.

INSTRUCTIONS:
1. Use ONLY the information in the provided notes. Do not use outside knowledge.
2. Generate exactly {} questions
3. Each question must have 3-4 plausible options
4. "answer" is the 0-based index of the correct option
5. Output ONLY a single JSON object, nothing else

SCHEMA:
{{"questions": [{{"question": "...", "options": ["...", "...", "..."], "answer": 0, "explanation": "..."}}]}}

Output ONLY the JSON object, no markdown, no explanations.

{}{}NOTES:
{}

JSON OUTPUT:"#,
        num_questions,
        context_lines(subject, topic),
        difficulty_line,
        notes
    )
}
