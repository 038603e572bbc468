pub mod quiz;
pub mod result;
pub mod stats;

pub use quiz::{Phase, QuizSession, SessionCache, SessionError, SessionSettings, SubmitOutcome};
pub use result::{ProgressHistory, ProgressRecord};
pub use stats::{AnswerRecord, SessionStats};
