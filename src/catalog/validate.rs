use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::catalog::{Level, Question};

/// A content problem that would make a question or level behave oddly.
/// None of these are fatal: the engine degrades around them.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentIssue {
    AnswerIndexOutOfRange {
        question_id: String,
        index: i64,
        len: usize,
    },
    AnswerIndexWithoutTemplate {
        question_id: String,
    },
    MissingOptions {
        question_id: String,
    },
    AnswerNotInOptions {
        question_id: String,
        value: String,
    },
    EmptyVariable {
        question_id: String,
        name: String,
    },
    DuplicateQuestionId {
        question_id: String,
    },
    UnknownPrerequisite {
        level_id: String,
        required: String,
    },
}

impl fmt::Display for ContentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentIssue::AnswerIndexOutOfRange {
                question_id,
                index,
                len,
            } => write!(
                f,
                "{question_id}: answerIndex {index} is outside optionsTemplate (len {len})"
            ),
            ContentIssue::AnswerIndexWithoutTemplate { question_id } => {
                write!(f, "{question_id}: answerIndex set but no optionsTemplate")
            }
            ContentIssue::MissingOptions { question_id } => {
                write!(f, "{question_id}: choice question has no options")
            }
            ContentIssue::AnswerNotInOptions { question_id, value } => {
                write!(f, "{question_id}: answer {value:?} is not one of the options")
            }
            ContentIssue::EmptyVariable { question_id, name } => {
                write!(f, "{question_id}: variable {name} has no candidate values")
            }
            ContentIssue::DuplicateQuestionId { question_id } => {
                write!(f, "{question_id}: duplicate question id")
            }
            ContentIssue::UnknownPrerequisite { level_id, required } => {
                write!(f, "{level_id}: unlock requirement refers to unknown level {required}")
            }
        }
    }
}

/// Check whether `answerIndex` indexes into `optionsTemplate`.
/// Returns the index as `usize` when it does.
pub fn answer_index_in_range(question: &Question) -> Option<usize> {
    let index = question.answer_index?;
    let len = question.options_template.as_ref()?.len();
    usize::try_from(index).ok().filter(|&i| i < len)
}

pub fn validate_question(question: &Question) -> Vec<ContentIssue> {
    let mut issues = Vec::new();
    let id = || question.id.clone();

    match (question.answer_index, &question.options_template) {
        (Some(index), Some(templates)) if answer_index_in_range(question).is_none() => {
            issues.push(ContentIssue::AnswerIndexOutOfRange {
                question_id: id(),
                index,
                len: templates.len(),
            });
        }
        (Some(_), None) => {
            issues.push(ContentIssue::AnswerIndexWithoutTemplate { question_id: id() });
        }
        _ => {}
    }

    if question.kind.has_options() {
        let templated = question.options_template.as_ref().is_some_and(|t| !t.is_empty());
        if question.options.is_empty() && !templated {
            issues.push(ContentIssue::MissingOptions { question_id: id() });
        }
        // Static answers only; templated answers are derived from answerIndex.
        if !question.options.is_empty() && question.answer_index.is_none() {
            for value in question.answer.values() {
                if !question.options.contains(&value) {
                    issues.push(ContentIssue::AnswerNotInOptions {
                        question_id: id(),
                        value,
                    });
                }
            }
        }
    }

    if let Some(variables) = &question.variables {
        for (name, candidates) in variables {
            if candidates.is_empty() {
                issues.push(ContentIssue::EmptyVariable {
                    question_id: id(),
                    name: name.clone(),
                });
            }
        }
    }

    issues
}

pub fn validate_catalog(
    levels: &[Level],
    questions: &BTreeMap<String, Vec<Question>>,
) -> Vec<ContentIssue> {
    let mut issues = Vec::new();
    let level_ids: HashSet<&str> = levels.iter().map(|l| l.id.as_str()).collect();

    for level in levels {
        for required in level.prerequisites() {
            if !level_ids.contains(required) {
                issues.push(ContentIssue::UnknownPrerequisite {
                    level_id: level.id.clone(),
                    required: required.to_string(),
                });
            }
        }
    }

    for bank in questions.values() {
        let mut seen = HashSet::new();
        for question in bank {
            if !seen.insert(question.id.as_str()) {
                issues.push(ContentIssue::DuplicateQuestionId {
                    question_id: question.id.clone(),
                });
            }
            issues.extend(validate_question(question));
        }
    }

    issues
}
