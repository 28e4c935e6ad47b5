//! Prompt construction for quiz questions.
//!
//! [`build_prompt`] turns a [`Question`] into the instruction text sent to the
//! model. The text always ends with a response-format block naming the two
//! sections the [`crate::parse`] module splits on: [`ANSWER_MARKER`] and
//! [`REASONING_MARKER`], each present exactly once. Their order follows the
//! configured [`PromptFormat`].

use serde::Deserialize;

use crate::config::PromptConfig;
use crate::models::{ChoiceOption, MatchChoice, MatchItem, Question, SelectionMode};

/// Marker introducing the final answer.
pub const ANSWER_MARKER: &str = "ANSWER:";
/// Marker introducing the justification.
pub const REASONING_MARKER: &str = "REASONING:";

/// Order of the two response sections requested from the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFormat {
    /// `ANSWER:` first, then `REASONING:`.
    #[default]
    AnswerFirst,
    /// `REASONING:` first, then `ANSWER:`; asks the model to think before answering.
    ReasoningFirst,
}

/// Everything the builder needs besides the question itself.
#[derive(Debug, Clone)]
pub struct PromptOptions {
    pub format: PromptFormat,
    pub persona: String,
    pub true_label: String,
    pub false_label: String,
    /// Whether course documents are attached to the request.
    pub rag_active: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        PromptConfig::default().options()
    }
}

/// Build the model prompt for `question`.
pub fn build_prompt(question: &Question, opts: &PromptOptions) -> String {
    let mut prompt = String::new();

    prompt.push_str(opts.persona.trim());
    prompt.push('\n');
    if opts.rag_active {
        prompt.push_str(
            "Course documents are available to you through file search. \
             Base your answer on them first.\n",
        );
    }
    prompt.push('\n');

    match question {
        Question::Choice {
            text,
            subtype,
            options,
        } => push_choice(&mut prompt, text, *subtype, options, opts.format),
        Question::Matching {
            text,
            items,
            choices,
        } => push_matching(&mut prompt, text, items, choices, opts.format),
        Question::TrueFalse { text } => push_true_false(&mut prompt, text, opts),
    }

    prompt
}

fn push_choice(
    prompt: &mut String,
    text: &str,
    mode: SelectionMode,
    options: &[ChoiceOption],
    format: PromptFormat,
) {
    prompt.push_str("Answer this multiple-choice question precisely.\n\n");
    push_question(prompt, text);

    prompt.push_str("OPTIONS:\n");
    for opt in options {
        prompt.push_str(&format!("{} {}\n", display_label(&opt.letter), opt.text.trim()));
    }
    prompt.push('\n');

    match mode {
        SelectionMode::Multiple => prompt.push_str(
            "WARNING: several options may be correct. Give every correct option, not only one.\n\n",
        ),
        SelectionMode::Single => prompt.push_str("Exactly one option is correct.\n\n"),
    }

    push_instructions(
        prompt,
        &[
            "Analyse each option, break the problem down and look for traps",
            "Check your choice against the question wording before committing to it",
            "Be concise but precise",
        ],
    );

    let answer = match mode {
        SelectionMode::Multiple => {
            "[letters of all correct options only, e.g. \"a.\" or \"a. and c.\"]".to_string()
        }
        SelectionMode::Single => "[letter of the correct option only, e.g. \"b.\"]".to_string(),
    };
    push_format(
        prompt,
        format,
        &answer,
        "[short justification citing the key facts]",
    );
}

fn push_matching(
    prompt: &mut String,
    text: &str,
    items: &[MatchItem],
    choices: &[MatchChoice],
    format: PromptFormat,
) {
    prompt.push_str("Answer this matching question precisely.\n\n");
    push_question(prompt, text);

    prompt.push_str("ITEMS TO MATCH:\n");
    for (i, item) in items.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, item.text.trim()));
    }
    prompt.push_str("\nAVAILABLE CATEGORIES:\n");
    for choice in choices {
        prompt.push_str(&format!("- {}\n", choice.text.trim()));
    }
    prompt.push('\n');

    push_instructions(
        prompt,
        &[
            "Analyse each item and each category and identify the logical links",
            "Use only the category names listed above, spelled exactly as given",
            "Be concise but precise",
        ],
    );

    let mut answer = String::from("\n");
    for (i, item) in items.iter().enumerate() {
        answer.push_str(&format!("{}. {} → [category name]\n", i + 1, item.text.trim()));
    }
    let answer = answer.trim_end().to_string();
    push_format(
        prompt,
        format,
        &answer,
        "[short justification of the matches]",
    );
}

fn push_true_false(prompt: &mut String, text: &str, opts: &PromptOptions) {
    prompt.push_str("Answer this true/false question precisely.\n\n");
    push_question(prompt, text);

    prompt.push_str("OPTIONS:\n");
    prompt.push_str(&format!("- {}\n", opts.true_label));
    prompt.push_str(&format!("- {}\n\n", opts.false_label));

    push_instructions(
        prompt,
        &[
            "Analyse the statement in detail and identify the key points",
            "A statement with a single incorrect detail must be rejected",
            "Be concise but precise",
        ],
    );

    push_format(
        prompt,
        opts.format,
        "[exactly one of the two options above]",
        "[short justification of the key points]",
    );
}

fn push_question(prompt: &mut String, text: &str) {
    prompt.push_str("QUESTION:\n");
    prompt.push_str(text.trim());
    prompt.push_str("\n\n");
}

fn push_instructions(prompt: &mut String, steps: &[&str]) {
    prompt.push_str("INSTRUCTIONS:\n");
    for (i, step) in steps.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, step));
    }
    prompt.push('\n');
}

fn push_format(prompt: &mut String, format: PromptFormat, answer: &str, reasoning: &str) {
    prompt.push_str("RESPONSE FORMAT (IMPORTANT, follow it exactly):\n");
    let answer_line = format!("{} {}\n", ANSWER_MARKER, answer);
    let reasoning_line = format!("{} {}\n", REASONING_MARKER, reasoning);
    match format {
        PromptFormat::AnswerFirst => {
            prompt.push_str(&answer_line);
            prompt.push_str(&reasoning_line);
        }
        PromptFormat::ReasoningFirst => {
            prompt.push_str(&reasoning_line);
            prompt.push_str(&answer_line);
        }
    }
}

/// `"a"` → `"a."`; labels that already end in punctuation are kept.
fn display_label(label: &str) -> String {
    let label = label.trim();
    match label.chars().last() {
        Some(c) if c.is_alphanumeric() => format!("{}.", label),
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChoiceOption, MatchChoice, MatchItem};

    fn choice(mode: SelectionMode) -> Question {
        Question::Choice {
            text: "Qu'est-ce qu'un bilan en comptabilité ?".into(),
            subtype: mode,
            options: vec![
                ChoiceOption {
                    letter: "a.".into(),
                    text: "Un document qui retrace l'activité sur une période".into(),
                },
                ChoiceOption {
                    letter: "b".into(),
                    text: "Une photographie du patrimoine à un instant T".into(),
                },
                ChoiceOption {
                    letter: "c.".into(),
                    text: "Un tableau de suivi des stocks".into(),
                },
            ],
        }
    }

    fn matching() -> Question {
        Question::Matching {
            text: "Associez chaque élément à sa catégorie".into(),
            items: vec![
                MatchItem {
                    text: "Stocks".into(),
                    select_name: None,
                },
                MatchItem {
                    text: "Emprunt bancaire".into(),
                    select_name: Some("q1:sub1".into()),
                },
            ],
            choices: vec![
                MatchChoice {
                    value: Some("1".into()),
                    text: "Actif".into(),
                },
                MatchChoice {
                    value: Some("2".into()),
                    text: "Passif".into(),
                },
            ],
        }
    }

    fn true_false() -> Question {
        Question::TrueFalse {
            text: "Le bilan doit toujours être équilibré".into(),
        }
    }

    #[test]
    fn every_variant_has_text_and_single_markers() {
        for q in [choice(SelectionMode::Single), matching(), true_false()] {
            for format in [PromptFormat::AnswerFirst, PromptFormat::ReasoningFirst] {
                let opts = PromptOptions {
                    format,
                    ..PromptOptions::default()
                };
                let prompt = build_prompt(&q, &opts);
                assert!(prompt.contains(q.text()), "missing text for {}", q.kind());
                assert_eq!(prompt.matches(ANSWER_MARKER).count(), 1, "{}", prompt);
                assert_eq!(prompt.matches(REASONING_MARKER).count(), 1, "{}", prompt);
            }
        }
    }

    #[test]
    fn true_false_lists_labels_once() {
        let prompt = build_prompt(&true_false(), &PromptOptions::default());
        assert_eq!(prompt.matches("Vrai").count(), 1);
        assert_eq!(prompt.matches("Faux").count(), 1);
    }

    #[test]
    fn multiple_mode_warns_about_several_answers() {
        let single = build_prompt(&choice(SelectionMode::Single), &PromptOptions::default());
        let multiple = build_prompt(&choice(SelectionMode::Multiple), &PromptOptions::default());
        assert!(!single.contains("several options may be correct"));
        assert!(multiple.contains("several options may be correct"));
    }

    #[test]
    fn options_are_rendered_with_labels() {
        let prompt = build_prompt(&choice(SelectionMode::Single), &PromptOptions::default());
        assert!(prompt.contains("a. Un document qui retrace"));
        assert!(prompt.contains("b. Une photographie du patrimoine"));
    }

    #[test]
    fn matching_lists_items_and_categories() {
        let prompt = build_prompt(&matching(), &PromptOptions::default());
        assert!(prompt.contains("1. Stocks\n"));
        assert!(prompt.contains("2. Emprunt bancaire\n"));
        assert!(prompt.contains("- Actif\n"));
        assert!(prompt.contains("- Passif\n"));
        assert!(prompt.contains("2. Emprunt bancaire → [category name]"));
    }

    #[test]
    fn format_controls_section_order() {
        let answer_first = build_prompt(&true_false(), &PromptOptions::default());
        assert!(answer_first.find(ANSWER_MARKER) < answer_first.find(REASONING_MARKER));

        let opts = PromptOptions {
            format: PromptFormat::ReasoningFirst,
            ..PromptOptions::default()
        };
        let reasoning_first = build_prompt(&true_false(), &opts);
        assert!(reasoning_first.find(REASONING_MARKER) < reasoning_first.find(ANSWER_MARKER));
    }

    #[test]
    fn rag_preamble_only_when_active() {
        let plain = build_prompt(&true_false(), &PromptOptions::default());
        assert!(!plain.contains("file search"));
        let opts = PromptOptions {
            rag_active: true,
            ..PromptOptions::default()
        };
        assert!(build_prompt(&true_false(), &opts).contains("file search"));
    }

    #[test]
    fn persona_leads_the_prompt() {
        let opts = PromptOptions {
            persona: "Tu es un expert-comptable.".into(),
            ..PromptOptions::default()
        };
        let prompt = build_prompt(&true_false(), &opts);
        assert!(prompt.starts_with("Tu es un expert-comptable.\n"));
    }
}
