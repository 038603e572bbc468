use std::collections::BTreeSet;

use icu_normalizer::ComposingNormalizerBorrowed;

use crate::catalog::{Question, QuestionKind};

/// Normalize free-text input for comparison: NFC, trimmed, lowercased.
pub fn normalize_text(input: &str) -> String {
    let nfc = ComposingNormalizerBorrowed::new_nfc().normalize(input);
    nfc.trim().to_lowercase()
}

/// Whether `submitted` answers `question` correctly. Pure; no partial credit.
pub fn evaluate_answer(question: &Question, submitted: &[String]) -> bool {
    match question.kind {
        QuestionKind::Single => match submitted.first() {
            Some(value) => question.answer.as_set().len() == 1 && question.answer.contains(value),
            None => false,
        },
        QuestionKind::Multiple => {
            let expected = question.answer.as_set();
            let picked: BTreeSet<&str> = submitted.iter().map(String::as_str).collect();
            !submitted.is_empty() && submitted.len() == expected.len() && picked == expected
        }
        QuestionKind::Text => {
            let given = submitted.first().map(String::as_str).unwrap_or("");
            normalize_text(given) == normalize_text(&question.answer.joined())
        }
    }
}
