pub mod answer;
pub mod fraud;
pub mod scoring;
pub mod template;
pub mod unlock;

pub use answer::evaluate_answer;
pub use fraud::{FraudDefaults, FraudFlag};
pub use unlock::{LevelStatus, best_record, is_unlocked};
