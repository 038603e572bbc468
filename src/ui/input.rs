use crate::catalog::{InputMode, Question};

/// What one line typed at the answer prompt asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Answer(Vec<String>),
    Skip,
    Quit,
    Invalid(String),
}

/// Letter label for the option at `index`: a, b, ... z, then aa, ab, ...
pub fn option_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index;
    loop {
        label.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

fn label_index(label: &str) -> Option<usize> {
    if label.is_empty() || !label.bytes().all(|b| b.is_ascii_lowercase()) {
        return None;
    }
    let mut index = 0usize;
    for b in label.bytes() {
        index = index.checked_mul(26)?.checked_add((b - b'a') as usize + 1)?;
    }
    Some(index - 1)
}

/// Parse a line typed for `question`. Choice questions take option letters
/// and bare `s`/`q`; text questions take the line verbatim and reserve `:s`
/// and `:q`.
pub fn parse_line(question: &Question, line: &str) -> Command {
    let trimmed = line.trim();
    match question.kind.input_mode() {
        InputMode::FreeText => match trimmed {
            ":s" => Command::Skip,
            ":q" => Command::Quit,
            "" => Command::Invalid("type an answer, `:s` to skip or `:q` to leave".into()),
            _ => Command::Answer(vec![trimmed.to_string()]),
        },
        mode => {
            let lowered = trimmed.to_ascii_lowercase();
            match lowered.as_str() {
                "s" => return Command::Skip,
                "q" => return Command::Quit,
                "" => return Command::Invalid("pick an option".into()),
                _ => {}
            }
            let mut picked: Vec<String> = Vec::new();
            for token in lowered
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                let Some(option) = label_index(token).and_then(|i| question.options.get(i)) else {
                    return Command::Invalid(format!("`{token}` is not one of the options"));
                };
                if !picked.contains(option) {
                    picked.push(option.clone());
                }
            }
            if mode == InputMode::PickOne && picked.len() > 1 {
                return Command::Invalid("pick exactly one option".into());
            }
            Command::Answer(picked)
        }
    }
}

/// Yes/no answer to a confirmation prompt. Anything else is `None`.
pub fn parse_yes_no(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QuestionKind;

    fn question(kind: QuestionKind, options: &[&str]) -> Question {
        Question {
            id: "q".into(),
            kind,
            text: "?".into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            ..Question::default()
        }
    }

    #[test]
    fn test_labels_roundtrip_past_z() {
        assert_eq!(option_label(0), "a");
        assert_eq!(option_label(25), "z");
        assert_eq!(option_label(26), "aa");
        assert_eq!(option_label(27), "ab");
        for i in [0, 3, 25, 26, 51, 52, 700] {
            assert_eq!(label_index(&option_label(i)), Some(i));
        }
        assert_eq!(label_index("A"), None);
        assert_eq!(label_index(""), None);
    }

    #[test]
    fn test_single_choice_takes_one_letter() {
        let q = question(QuestionKind::Single, &["red", "green", "blue"]);
        assert_eq!(parse_line(&q, " B "), Command::Answer(vec!["green".into()]));
        assert!(matches!(parse_line(&q, "a c"), Command::Invalid(_)));
        assert!(matches!(parse_line(&q, "d"), Command::Invalid(_)));
        assert_eq!(parse_line(&q, "s"), Command::Skip);
        assert_eq!(parse_line(&q, "Q"), Command::Quit);
    }

    #[test]
    fn test_multiple_choice_dedups_and_mixes_separators() {
        let q = question(QuestionKind::Multiple, &["1", "2", "3", "4"]);
        assert_eq!(
            parse_line(&q, "a, c d,a"),
            Command::Answer(vec!["1".into(), "3".into(), "4".into()])
        );
        assert!(matches!(parse_line(&q, ""), Command::Invalid(_)));
    }

    #[test]
    fn test_text_keeps_line_and_reserves_colon_commands() {
        let q = question(QuestionKind::Text, &[]);
        assert_eq!(parse_line(&q, "  Hello  "), Command::Answer(vec!["Hello".into()]));
        assert_eq!(parse_line(&q, "s"), Command::Answer(vec!["s".into()]));
        assert_eq!(parse_line(&q, ":s"), Command::Skip);
        assert_eq!(parse_line(&q, ":q"), Command::Quit);
        assert!(matches!(parse_line(&q, "   "), Command::Invalid(_)));
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(parse_yes_no("Y"), Some(true));
        assert_eq!(parse_yes_no(" no "), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }
}
