use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::catalog::validate::answer_index_in_range;
use crate::catalog::{Answer, Bindings, Question};
use crate::engine::template::expand;

/// A per-session copy of a question with its templates expanded, plus the
/// bindings that produced it (empty for plain questions).
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedQuestion {
    pub question: Question,
    pub bindings: Bindings,
}

impl PreparedQuestion {
    pub fn id(&self) -> &str {
        &self.question.id
    }
}

/// Pick one candidate per variable, uniformly. Variables without candidates
/// stay unbound.
pub fn sample_bindings<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Bindings {
    let mut bindings = Bindings::new();
    if let Some(variables) = &question.variables {
        for (name, candidates) in variables {
            if let Some(value) = candidates.choose(rng) {
                bindings.insert(name.clone(), value.clone());
            }
        }
    }
    bindings
}

/// Render `question` with fixed `bindings`. Deterministic.
pub fn instantiate(question: &Question, bindings: &Bindings) -> Question {
    let mut rendered = question.clone();
    if !question.is_template() {
        return rendered;
    }

    if let Some(template) = &question.question_template {
        rendered.text = expand(template, bindings);
    }

    if let Some(templates) = &question.options_template {
        let options: Vec<String> = templates.iter().map(|t| expand(t, bindings)).collect();
        match (question.answer_index, answer_index_in_range(question)) {
            (None, _) => rendered.options = options,
            (Some(_), Some(index)) => {
                rendered.answer = Answer::One(options[index].clone());
                rendered.options = options;
            }
            (Some(index), None) => {
                warn!(
                    question = %question.id,
                    index,
                    len = templates.len(),
                    "answerIndex outside optionsTemplate, using unexpanded options"
                );
                rendered.options = templates.clone();
            }
        }
    }

    rendered
}

pub fn prepare_one<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> PreparedQuestion {
    let bindings = sample_bindings(question, rng);
    PreparedQuestion {
        question: instantiate(question, &bindings),
        bindings,
    }
}

/// Build the question sequence for one session. The bank is never mutated;
/// every returned question is an owned copy.
pub fn prepare<R: Rng + ?Sized>(
    questions: &[Question],
    randomize_order: bool,
    rng: &mut R,
) -> Vec<PreparedQuestion> {
    let mut order: Vec<&Question> = questions.iter().collect();
    if randomize_order {
        order.shuffle(rng);
    }
    order.into_iter().map(|q| prepare_one(q, rng)).collect()
}

/// Shuffle the displayed options of a choice question. Correctness is judged
/// by value, so this never changes the outcome of an answer.
pub fn shuffle_options<R: Rng + ?Sized>(question: &mut Question, rng: &mut R) {
    if question.kind.has_options() {
        question.options.shuffle(rng);
    }
}
