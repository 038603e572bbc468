use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

use crate::catalog::nullable;

/// Variable bindings chosen for one question instance.
pub type Bindings = BTreeMap<String, Binding>;

// --- Question Kind ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    #[default]
    Single,
    Multiple,
    Text,
}

/// How the answer for a question kind is collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    PickOne,
    PickMany,
    FreeText,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Single => "single",
            QuestionKind::Multiple => "multiple",
            QuestionKind::Text => "text",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuestionKind::Single => "Single choice",
            QuestionKind::Multiple => "Multiple choice",
            QuestionKind::Text => "Free text",
        }
    }

    pub fn input_mode(self) -> InputMode {
        match self {
            QuestionKind::Single => InputMode::PickOne,
            QuestionKind::Multiple => InputMode::PickMany,
            QuestionKind::Text => InputMode::FreeText,
        }
    }

    pub fn has_options(self) -> bool {
        !matches!(self, QuestionKind::Text)
    }
}

// --- Answer ---

/// Stored correct answer. The sheet holds loosely typed JSON, so numbers and
/// booleans are accepted and kept in their textual form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    One(String),
    Many(Vec<String>),
}

impl Default for Answer {
    fn default() -> Self {
        Answer::One(String::new())
    }
}

impl Answer {
    /// All accepted values; a single answer is a one-element set.
    pub fn as_set(&self) -> BTreeSet<&str> {
        match self {
            Answer::One(value) => BTreeSet::from([value.as_str()]),
            Answer::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn values(&self) -> Vec<String> {
        match self {
            Answer::One(value) => vec![value.clone()],
            Answer::Many(values) => values.clone(),
        }
    }

    pub fn joined(&self) -> String {
        match self {
            Answer::One(value) => value.clone(),
            Answer::Many(values) => values.join(","),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        match self {
            Answer::One(answer) => answer == value,
            Answer::Many(values) => values.iter().any(|v| v == value),
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl<'de> Deserialize<'de> for Answer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Array(items) => {
                Answer::Many(items.iter().map(scalar_to_string).collect())
            }
            other => Answer::One(scalar_to_string(&other)),
        })
    }
}

// --- Binding ---

/// A candidate value for a template variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Number(f64),
    Text(String),
}

impl Binding {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Binding::Number(n) => Some(*n),
            Binding::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Number(n) => write!(f, "{}", crate::engine::template::format_number(*n)),
            Binding::Text(s) => f.write_str(s),
        }
    }
}

// --- Fraud Settings ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudDetection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_answer_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error_count: Option<u32>,
}

// --- Question ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub level_id: String,
    #[serde(rename = "type", default, deserialize_with = "nullable::or_default")]
    pub kind: QuestionKind,
    #[serde(
        rename = "question",
        alias = "questionText",
        default,
        deserialize_with = "nullable::or_default"
    )]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_image: Option<String>,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub option_images: BTreeMap<String, String>,
    #[serde(default)]
    pub answer: Answer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, Vec<Binding>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_template: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_detection: Option<FraudDetection>,
}

impl Question {
    /// True when the question is generated per attempt from variable bindings.
    pub fn is_template(&self) -> bool {
        self.variables.is_some()
            || self.question_template.is_some()
            || self.options_template.is_some()
    }

    pub fn fraud_enabled(&self) -> bool {
        self.fraud_detection.as_ref().is_some_and(|fd| fd.enabled)
    }

    pub fn option_image(&self, option: &str) -> Option<&str> {
        self.option_images.get(option).map(String::as_str)
    }
}
