//! Answer-accuracy benchmark.
//!
//! Runs a question file through the [`Analyzer`] and compares each answer
//! against the expected option labels. Question file format:
//!
//! ```json
//! [
//!   {
//!     "question": "Qu'est-ce qu'un bilan ?",
//!     "possibilites": [{"id": "a", "texte": "..."}, {"id": "b", "texte": "..."}],
//!     "reponse": "b"
//!   }
//! ]
//! ```
//!
//! An array `reponse` (`["a", "c"]`) marks a multiple-answer question.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analyze::Analyzer;
use crate::models::{ChoiceOption, Question, SelectionMode};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchOption {
    pub id: String,
    pub texte: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expected {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchQuestion {
    pub question: String,
    pub possibilites: Vec<BenchOption>,
    pub reponse: Expected,
}

impl BenchQuestion {
    pub fn to_question(&self) -> Question {
        let subtype = match self.reponse {
            Expected::Many(_) => SelectionMode::Multiple,
            Expected::One(_) => SelectionMode::Single,
        };
        Question::Choice {
            text: self.question.clone(),
            subtype,
            options: self
                .possibilites
                .iter()
                .map(|p| ChoiceOption {
                    letter: p.id.clone(),
                    text: p.texte.clone(),
                })
                .collect(),
        }
    }

    /// Expected labels, lowercased and sorted.
    pub fn expected_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = match &self.reponse {
            Expected::One(label) => vec![clean_label(label)],
            Expected::Many(labels) => labels.iter().map(|l| clean_label(l)).collect(),
        };
        labels.sort();
        labels.dedup();
        labels
    }
}

fn clean_label(label: &str) -> String {
    label
        .trim()
        .trim_matches(|c: char| c == '.' || c == ')' || c == '(')
        .to_lowercase()
}

/// Extract the option labels named in a model answer.
///
/// `"a. et c."`, `"a, c"` and `"c) and a)"` all yield `["a", "c"]`.
pub fn normalize_labels(answer: &str) -> Vec<String> {
    let lowered = format!(" {} ", answer.to_lowercase());
    let joined = lowered.replace(" et ", ",").replace(" and ", ",");

    let mut labels: Vec<String> = joined
        .split(|c: char| c == ',' || c == ';' || c == '/' || c == '&' || c.is_whitespace())
        .map(clean_label)
        .filter(|t| t.chars().count() == 1 && t.chars().all(char::is_alphanumeric))
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

/// Exact set equality of two sorted label lists.
pub fn answers_match(got: &[String], expected: &[String]) -> bool {
    got == expected
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchResult {
    pub question_index: usize,
    pub question: String,
    pub expected_answer: Vec<String>,
    pub llm_answer: Option<Vec<String>>,
    pub llm_reasoning: Option<String>,
    pub llm_raw_text: String,
    pub is_correct: bool,
    pub status: BenchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchSummary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub errors: usize,
    /// Percentage of correct answers over all questions.
    pub accuracy: f64,
}

impl BenchSummary {
    pub fn from_results(results: &[BenchResult]) -> Self {
        let total = results.len();
        let correct = results
            .iter()
            .filter(|r| r.status == BenchStatus::Success && r.is_correct)
            .count();
        let errors = results
            .iter()
            .filter(|r| r.status == BenchStatus::Error)
            .count();
        let accuracy = if total > 0 {
            correct as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        Self {
            total,
            correct,
            incorrect: total - correct - errors,
            errors,
            accuracy,
        }
    }
}

/// Load and check a benchmark question file.
pub fn load_questions(path: &Path) -> Result<Vec<BenchQuestion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read questions file: {}", path.display()))?;
    let questions: Vec<BenchQuestion> =
        serde_json::from_str(&content).with_context(|| "Failed to parse questions file")?;

    for (i, q) in questions.iter().enumerate() {
        if q.question.trim().is_empty() || q.possibilites.is_empty() {
            bail!("Question {}: missing question text or options", i + 1);
        }
        if q.expected_labels().iter().all(|l| l.is_empty()) {
            bail!("Question {}: missing expected answer", i + 1);
        }
    }
    Ok(questions)
}

/// Answer every question in order; failures are recorded, not fatal.
pub async fn run_bench(analyzer: &Analyzer, questions: &[BenchQuestion]) -> Vec<BenchResult> {
    let mut results = Vec::with_capacity(questions.len());
    for (i, q) in questions.iter().enumerate() {
        tracing::info!(n = i + 1, total = questions.len(), "benchmark question");
        let expected = q.expected_labels();
        let result = match analyzer.analyze(&q.to_question()).await {
            Ok(answer) => {
                let got = normalize_labels(&answer.answer);
                BenchResult {
                    question_index: i + 1,
                    question: q.question.clone(),
                    is_correct: answers_match(&got, &expected),
                    expected_answer: expected,
                    llm_answer: Some(got),
                    llm_reasoning: Some(answer.reasoning),
                    llm_raw_text: answer.raw_text,
                    status: BenchStatus::Success,
                    error: None,
                }
            }
            Err(e) => BenchResult {
                question_index: i + 1,
                question: q.question.clone(),
                expected_answer: expected,
                llm_answer: None,
                llm_reasoning: None,
                llm_raw_text: e.to_string(),
                is_correct: false,
                status: BenchStatus::Error,
                error: Some(e.to_string()),
            },
        };
        results.push(result);
    }
    results
}
