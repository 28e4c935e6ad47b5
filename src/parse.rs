//! Response parsing.
//!
//! Model output is untrusted free text. [`parse_response`] never fails: when
//! the expected markers are missing it degrades to placeholder strings so the
//! caller always has something to display, and `raw_text` keeps the untouched
//! output.
//!
//! Recognized markers (optional markdown emphasis):
//!
//! | Section | Markers |
//! |---------|---------|
//! | answer | `ANSWER:`, `RÉPONSE:`, `REPONSE:` |
//! | reasoning | `REASONING:`, `JUSTIFICATION:`, `RÉFLEXION:`, `REFLEXION:` |
//!
//! At the start of a line a marker matches in any case, with or without a
//! space before the colon. Elsewhere only the uppercase form glued to its
//! colon counts, so prose like "la bonne réponse : c" stays inside its
//! section.
//!
//! Each section runs until the next recognized marker or the end of the text,
//! in whichever order the model wrote them.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::models::InferenceResult;

/// Reasoning placeholder when the model gave none.
pub const NO_REASONING: &str = "No reasoning provided.";
/// Answer placeholder for empty output.
pub const NO_ANSWER: &str = "No answer provided.";
/// Answer placeholder when the provider payload holds no text.
pub const PARSE_ERROR_ANSWER: &str = "Parsing error";
/// Reasoning placeholder when the provider payload holds no text.
pub const PARSE_ERROR_REASONING: &str = "Could not extract reasoning.";

/// Length, in characters, of the raw-text prefix used as a fallback answer.
const FALLBACK_ANSWER_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Answer,
    Reasoning,
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?m)(?:^[ \t]*[*_]*[ \t]*",
            r"(?i:(answer|r[eé]ponse|reasoning|justification|r[eé]flexion))",
            r"[ \t]*[*_]*[ \t]*:",
            r"|\b(ANSWER|R[EÉ]PONSE|REASONING|JUSTIFICATION|R[EÉ]FLEXION)\**:)\**",
        ))
        .expect("marker pattern is valid")
    })
}

fn classify(word: &str) -> Section {
    match word.to_lowercase().as_str() {
        "answer" | "réponse" | "reponse" => Section::Answer,
        _ => Section::Reasoning,
    }
}

/// Split raw model output into answer and reasoning.
pub fn parse_response(raw: &str) -> InferenceResult {
    let mut markers: Vec<(Section, usize, usize)> = Vec::new();
    for caps in marker_regex().captures_iter(raw) {
        let (Some(whole), Some(word)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        markers.push((classify(word.as_str()), whole.start(), whole.end()));
    }

    let section_text = |wanted: Section| -> Option<String> {
        markers
            .iter()
            .enumerate()
            .find(|(_, (section, _, _))| *section == wanted)
            .map(|(i, (_, _, content_start))| {
                let end = markers
                    .get(i + 1)
                    .map(|(_, next_start, _)| *next_start)
                    .unwrap_or(raw.len());
                clean(&raw[*content_start..end])
            })
    };

    let answer = section_text(Section::Answer);
    let reasoning = section_text(Section::Reasoning)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| NO_REASONING.to_string());

    let answer = match answer {
        Some(a) if !a.is_empty() => a,
        Some(_) => NO_ANSWER.to_string(),
        None => fallback_answer(raw),
    };

    InferenceResult {
        answer,
        reasoning,
        raw_text: raw.to_string(),
    }
}

/// Parse a full `generateContent` payload.
///
/// When the payload holds no candidate text (blocked prompt, empty
/// candidates, unexpected shape) the result carries the parse-error
/// placeholders and the serialized payload as `raw_text`.
pub fn parse_generate_response(payload: &Value) -> InferenceResult {
    match extract_text(payload) {
        Some(text) => parse_response(&text),
        None => InferenceResult {
            answer: PARSE_ERROR_ANSWER.to_string(),
            reasoning: PARSE_ERROR_REASONING.to_string(),
            raw_text: payload.to_string(),
        },
    }
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn clean(section: &str) -> String {
    section.trim().trim_matches('*').trim().to_string()
}

fn fallback_answer(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return NO_ANSWER.to_string();
    }
    trimmed.chars().take(FALLBACK_ANSWER_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_then_reasoning() {
        let raw = "...ANSWER: a.\nREASONING: because...";
        let r = parse_response(raw);
        assert_eq!(r.answer, "a.");
        assert_eq!(r.reasoning, "because...");
        assert_eq!(r.raw_text, raw);
    }

    #[test]
    fn reasoning_then_answer() {
        let r = parse_response("REASONING: le bilan est une photographie.\nANSWER: b.");
        assert_eq!(r.answer, "b.");
        assert_eq!(r.reasoning, "le bilan est une photographie.");
    }

    #[test]
    fn garbage_degrades_to_placeholders() {
        let r = parse_response("garbage");
        assert_eq!(r.answer, "garbage");
        assert_eq!(r.reasoning, NO_REASONING);
        assert_eq!(r.raw_text, "garbage");
    }

    #[test]
    fn fallback_answer_is_truncated_on_char_boundary() {
        let raw = "é".repeat(250);
        let r = parse_response(&raw);
        assert_eq!(r.answer.chars().count(), 100);
    }

    #[test]
    fn empty_input() {
        let r = parse_response("   ");
        assert_eq!(r.answer, NO_ANSWER);
        assert_eq!(r.reasoning, NO_REASONING);
    }

    #[test]
    fn case_insensitive_and_markdown() {
        let r = parse_response("**Answer:** Vrai\n**Justification:** l'actif égale le passif");
        assert_eq!(r.answer, "Vrai");
        assert_eq!(r.reasoning, "l'actif égale le passif");
    }

    #[test]
    fn french_markers() {
        let r = parse_response("RÉFLEXION: analyse des options\nRÉPONSE: a. et c.");
        assert_eq!(r.answer, "a. et c.");
        assert_eq!(r.reasoning, "analyse des options");

        let r = parse_response("REFLEXION: x\nREPONSE: Faux");
        assert_eq!(r.answer, "Faux");
    }

    #[test]
    fn multiline_matching_answer() {
        let raw = "ANSWER:\n1. Stocks → Actif\n2. Emprunt → Passif\nREASONING: classement du bilan";
        let r = parse_response(raw);
        assert_eq!(r.answer, "1. Stocks → Actif\n2. Emprunt → Passif");
        assert_eq!(r.reasoning, "classement du bilan");
    }

    #[test]
    fn marker_words_inside_prose_do_not_split() {
        let r = parse_response(
            "ANSWER: c.\nREASONING: L'option a est fausse, donc la bonne réponse : c, car le stock est un actif.",
        );
        assert_eq!(r.answer, "c.");
        assert_eq!(
            r.reasoning,
            "L'option a est fausse, donc la bonne réponse : c, car le stock est un actif."
        );

        let r = parse_response(
            "REASONING: On pourrait penser que la réponse : a convient, mais non.\nANSWER: b.",
        );
        assert_eq!(r.answer, "b.");
        assert_eq!(
            r.reasoning,
            "On pourrait penser que la réponse : a convient, mais non."
        );

        let r = parse_response("REASONING: the answer: is not obvious here.\nANSWER: a.");
        assert_eq!(r.answer, "a.");
        assert_eq!(r.reasoning, "the answer: is not obvious here.");
    }

    #[test]
    fn line_start_marker_with_space_before_colon() {
        let r = parse_response("Réflexion : les deux sont des dettes\n  **Réponse** : a. et c.");
        assert_eq!(r.answer, "a. et c.");
        assert_eq!(r.reasoning, "les deux sont des dettes");
    }

    #[test]
    fn answer_without_reasoning() {
        let r = parse_response("ANSWER: Vrai");
        assert_eq!(r.answer, "Vrai");
        assert_eq!(r.reasoning, NO_REASONING);
    }

    #[test]
    fn round_trips_well_formed_pairs() {
        let cases = [
            ("a.", "Le bilan décrit le patrimoine."),
            ("a. and c.", "Both are assets."),
            ("Faux", "Un détail est inexact."),
        ];
        for (answer, reasoning) in cases {
            let raw = format!("ANSWER:  {}  \nREASONING: {}\n", answer, reasoning);
            let r = parse_response(&raw);
            assert_eq!(r.answer, answer);
            assert_eq!(r.reasoning, reasoning);
        }
    }

    #[test]
    fn generate_payload_with_text() {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [{"text": "ANSWER: Vrai\n"}, {"text": "REASONING: ok"}]}
            }]
        });
        let r = parse_generate_response(&payload);
        assert_eq!(r.answer, "Vrai");
        assert_eq!(r.reasoning, "ok");
    }

    #[test]
    fn generate_payload_without_text() {
        let payload = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let r = parse_generate_response(&payload);
        assert_eq!(r.answer, PARSE_ERROR_ANSWER);
        assert_eq!(r.reasoning, PARSE_ERROR_REASONING);
        assert!(r.raw_text.contains("SAFETY"));
    }
}
