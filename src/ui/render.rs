use std::fmt::Write;

use crate::app::{LevelSummary, Notice, ReportRow};
use crate::catalog::link::grouped_by_category;
use crate::catalog::{InputMode, Level, Link};
use crate::engine::fraud::FraudFlag;
use crate::engine::unlock::LevelStatus;
use crate::event::format_elapsed;
use crate::generator::PreparedQuestion;
use crate::session::SubmitOutcome;
use crate::session::result::{ProgressHistory, ProgressRecord};
use crate::store::QuizCacheSnapshot;
use crate::ui::input::option_label;

fn status_mark(status: LevelStatus) -> &'static str {
    match status {
        LevelStatus::Locked => "[locked]",
        LevelStatus::Available => "[ ]",
        LevelStatus::Attempted => "[~]",
        LevelStatus::Perfect => "[*]",
    }
}

pub fn level_list(rows: &[LevelSummary]) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("No levels available.\n");
        return out;
    }
    for row in rows {
        let level = &row.level;
        let title = if level.icon.is_empty() {
            level.title.clone()
        } else {
            format!("{} {}", level.icon, level.title)
        };
        let _ = write!(out, "{:<9} {:<12} {title}", status_mark(row.status), level.id);
        if let Some(best) = &row.best {
            let _ = write!(out, "  best {}%", best.correct_rate);
            if best.skip_count > 0 {
                let _ = write!(out, " ({} skipped)", best.skip_count);
            }
            let _ = write!(out, ", {} attempt(s)", row.attempts);
        }
        out.push('\n');
        if !level.description.is_empty() {
            let _ = writeln!(out, "{:<22}{}", "", level.description);
        }
    }
    out
}

pub fn question_prompt(
    prepared: &PreparedQuestion,
    index: usize,
    total: usize,
    elapsed: Option<u64>,
) -> String {
    let question = &prepared.question;
    let mut out = String::new();
    let _ = write!(out, "\nQuestion {} / {total}  ({})", index + 1, question.kind.label());
    if let Some(secs) = elapsed {
        let _ = write!(out, "  {}", format_elapsed(secs));
    }
    out.push('\n');
    let _ = writeln!(out, "{}", question.text);
    if let Some(image) = &question.question_image {
        let _ = writeln!(out, "  (image: {image})");
    }

    match question.kind.input_mode() {
        InputMode::FreeText => {
            out.push_str("Type your answer (`:s` skip, `:q` leave): ");
        }
        mode => {
            for (i, option) in question.options.iter().enumerate() {
                let _ = write!(out, "  {}) {option}", option_label(i));
                if let Some(image) = question.option_image(option) {
                    let _ = write!(out, "  (image: {image})");
                }
                out.push('\n');
            }
            let hint = if mode == InputMode::PickMany {
                "letters separated by commas"
            } else {
                "one letter"
            };
            let _ = write!(out, "Answer with {hint} (`s` skip, `q` leave): ");
        }
    }
    out
}

pub fn fraud_flag(flag: &FraudFlag) -> String {
    match flag {
        FraudFlag::FastAnswer { time, min_time, .. } => {
            format!("answered in {time:.1}s (under {min_time:.1}s)")
        }
        FraudFlag::TooManyErrors {
            errors, max_errors, ..
        } => format!("{errors} wrong attempts (limit {max_errors})"),
    }
}

pub fn outcome(outcome: &SubmitOutcome) -> String {
    let mut out = String::new();
    if outcome.correct {
        out.push_str("Correct!\n");
    } else {
        let _ = writeln!(out, "Incorrect. Answer: {}", outcome.correct_answers.join(", "));
    }
    if let Some(explanation) = outcome.explanation.as_deref().filter(|e| !e.is_empty()) {
        let _ = writeln!(out, "{explanation}");
    }
    if let Some(image) = &outcome.explanation_image {
        let _ = writeln!(out, "  (image: {image})");
    }
    for flag in &outcome.flags {
        let _ = writeln!(out, "  note: {}", fraud_flag(flag));
    }
    out
}

pub fn resume_offer(snapshot: &QuizCacheSnapshot, total: usize) -> String {
    let total = snapshot
        .question_order
        .as_ref()
        .map_or(total, Vec::len);
    format!(
        "An unfinished attempt is saved: question {} of {total}, {} correct, {} skipped.\n\
         Resume it? [y/n] ",
        (snapshot.current_question_index + 1).min(total.max(1)),
        snapshot.correct_count,
        snapshot.skip_count,
    )
}

pub fn summary(record: &ProgressRecord, level: Option<&Level>) -> String {
    let mut out = String::new();
    let title = level.map_or(record.level_id.as_str(), |l| l.title.as_str());
    let _ = writeln!(out, "\n{title} complete");
    let _ = writeln!(
        out,
        "  {} / {} correct ({}%)",
        record.correct_count, record.total_questions, record.correct_rate
    );
    let _ = writeln!(out, "  skipped {}, wrong attempts {}", record.skip_count, record.error_count);
    let _ = writeln!(out, "  time {}", format_elapsed(record.elapsed_time));
    if record.perfect_without_skip {
        out.push_str("  Perfect run!\n");
    }
    if record.fraud_count > 0 {
        let _ = writeln!(out, "  {} answer(s) flagged for review", record.fraud_count);
    }
    out
}

pub fn history(history: &ProgressHistory, levels: &[Level], only: Option<&str>) -> String {
    let mut out = String::new();
    for level_id in history.levels().filter(|id| only.is_none_or(|o| o == *id)) {
        let title = levels
            .iter()
            .find(|l| l.id == level_id)
            .map_or(level_id, |l| l.title.as_str());
        let _ = writeln!(out, "{title}");
        let best = history.best(level_id);
        for record in history.records(level_id) {
            let mark = if best.is_some_and(|b| std::ptr::eq(b, record)) {
                "*"
            } else {
                " "
            };
            let _ = writeln!(
                out,
                " {mark} {}  {:>3}%  skipped {}  {}",
                record.start_time.format("%Y-%m-%d %H:%M"),
                record.correct_rate,
                record.skip_count,
                format_elapsed(record.elapsed_time),
            );
        }
    }
    if out.is_empty() {
        out.push_str("No attempts recorded.\n");
    }
    out
}

pub fn report(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("No progress recorded yet.\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{:<32} {:<12} {:>8} {:>5} {:>5} {:>7}",
        "email", "level", "attempts", "best", "skip", "flagged"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<32} {:<12} {:>8} {:>4}% {:>5} {:>7}",
            row.email,
            row.level_id,
            row.attempts,
            row.best.correct_rate,
            row.best.skip_count,
            row.flagged_attempts,
        );
    }
    out
}

/// Links under one heading per category.
pub fn links(links: &[Link]) -> String {
    let mut out = String::new();
    if links.is_empty() {
        out.push_str("No links have been added yet.\n");
        return out;
    }
    for (index, (category, members)) in grouped_by_category(links).into_iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", category.heading());
        for link in members {
            let _ = writeln!(out, "  {} {}", link.display_icon(), link.title);
            if let Some(description) = link.description.as_deref().filter(|d| !d.is_empty()) {
                let _ = writeln!(out, "     {description}");
            }
            let _ = writeln!(out, "     {}", link.href());
        }
    }
    out
}

pub fn notice(notice: &Notice) -> String {
    match notice {
        Notice::ProgressSaved { level_id } => format!("Progress for {level_id} saved."),
        Notice::SaveFailed { level_id, error } => {
            format!("Could not save progress for {level_id} ({error}); kept locally.")
        }
    }
}
