pub mod level;
pub mod link;
pub mod question;
pub mod validate;

pub use level::{Level, Requirement, UnlockConditions, UnlockMode};
pub use link::{Link, LinkCategory, LinkKind};
pub use question::{Answer, Binding, Bindings, FraudDetection, InputMode, Question, QuestionKind};

/// Serde helpers for spreadsheet payloads, where empty cells arrive as `null`.
pub(crate) mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}
