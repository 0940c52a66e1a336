//! Terminal quiz loop.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::Result;

use memquiz_core::{GradeError, Question, QuestionKind, SampledQuestion};

pub struct QuizRun {
    pub judgments: HashMap<String, bool>,
    /// Questions whose grading failed and was not retried.
    pub ungraded: Vec<String>,
    /// Time spent answering; grading latency is excluded.
    pub duration_ms: u64,
}

/// Accept an option number for multiple-choice questions.
pub fn resolve_choice(question: &Question, input: &str) -> String {
    let input = input.trim();
    if let QuestionKind::MultipleChoice { options } = &question.kind {
        if let Ok(n) = input.parse::<usize>() {
            if let Some(option) = n.checked_sub(1).and_then(|i| options.get(i)) {
                return option.clone();
            }
        }
    }
    input.to_string()
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub fn run_quiz<R, W>(
    questions: &[SampledQuestion],
    judge: impl Fn(&Question, &str) -> Result<bool, GradeError>,
    show_context: bool,
    input: &mut R,
    out: &mut W,
) -> Result<QuizRun>
where
    R: BufRead,
    W: Write,
{
    let mut judgments = HashMap::new();
    let mut ungraded = Vec::new();
    let mut answering = Duration::ZERO;
    let total = questions.len();

    for (i, sampled) in questions.iter().enumerate() {
        let q = &sampled.question;
        writeln!(out)?;
        writeln!(out, "Question {}/{} [{}]", i + 1, total, q.kind.label())?;
        if show_context {
            print_context(sampled, out)?;
        } else {
            writeln!(out, "  ({} sessions of history)", sampled.sessions.len())?;
        }
        if let Some(date) = &q.date {
            writeln!(out, "  Asked on: {date}")?;
        }
        writeln!(out, "  {}", q.prompt)?;
        for (n, option) in q.kind.options().iter().enumerate() {
            writeln!(out, "    {}. {option}", n + 1)?;
        }
        if q.kind == QuestionKind::Boolean {
            writeln!(out, "    (True / False)")?;
        }
        write!(out, "> ")?;
        out.flush()?;

        let started = Instant::now();
        let line = read_line(input)?;
        answering += started.elapsed();
        let Some(line) = line else {
            writeln!(out, "\n(input closed, remaining questions unanswered)")?;
            break;
        };
        let response = resolve_choice(q, &line);

        loop {
            match judge(q, &response) {
                Ok(correct) => {
                    judgments.insert(q.id.clone(), correct);
                    if correct {
                        writeln!(out, "  correct")?;
                    } else {
                        writeln!(out, "  incorrect (expected: {})", q.answer)?;
                    }
                    break;
                }
                Err(e) => {
                    writeln!(out, "  grading failed: {e}")?;
                    let retry = e.is_retryable() && {
                        write!(out, "  retry? [Y/n] ")?;
                        out.flush()?;
                        let answer = read_line(input)?.unwrap_or_else(|| "n".into());
                        !answer.trim().eq_ignore_ascii_case("n")
                    };
                    if !retry {
                        ungraded.push(q.id.clone());
                        break;
                    }
                }
            }
        }
    }

    Ok(QuizRun {
        judgments,
        ungraded,
        duration_ms: millis(answering),
    })
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn print_context<W: Write>(sampled: &SampledQuestion, out: &mut W) -> Result<()> {
    for session in &sampled.sessions {
        let heading = session.title.as_deref().unwrap_or(&session.id);
        match &session.date {
            Some(date) => writeln!(out, "  --- {heading} ({date}) ---")?,
            None => writeln!(out, "  --- {heading} ---")?,
        }
        for turn in &session.turns {
            writeln!(out, "  [{}] {}", turn.role, truncate(&turn.content, 200))?;
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}
