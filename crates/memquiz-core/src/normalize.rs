//! Raw benchmark record → canonical [`DatasetItem`].
//!
//! Every field is resolved through an ordered table of named strategies,
//! tried first to last, with a terminal default. Normalization is total:
//! a record of any shape yields a valid item.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::dataset::{DatasetItem, Question, QuestionKind, Role, Session, Turn};

// ---------------------------------------------------------------------------
// Alias tables
// ---------------------------------------------------------------------------

const ITEM_ID: &[&str] = &["id", "item_id", "sample_id"];

const TURN_ROLE: &[&str] = &["role", "speaker", "from"];
const TURN_CONTENT: &[&str] = &["content", "text", "message"];

const SESSION_ID: &[&str] = &["id", "session_id"];
const SESSION_TITLE: &[&str] = &["title", "topic"];
const SESSION_DATE: &[&str] = &["date", "timestamp"];
const SESSION_TURNS: &[&str] = &["turns", "messages"];

const HAYSTACK_SESSIONS: &str = "haystack_sessions";
const HAYSTACK_IDS: &str = "haystack_session_ids";
const HAYSTACK_DATES: &str = "haystack_dates";
const FLAT_HISTORY: &[&str] = &["history", "dialogue"];

const QUESTION_ID: &[&str] = &["id", "question_id"];
const QUESTION_PROMPT: &[&str] = &["prompt", "question", "q"];
const QUESTION_ANSWER: &[&str] = &["answer", "gold", "label", "target", "a"];
const QUESTION_OPTIONS: &[&str] = &["options", "choices", "candidates"];
const QUESTION_ALIASES: &[&str] = &["aliases", "acceptable_answers", "alt_answers"];
const QUESTION_DATE: &[&str] = &["date", "question_date"];

// ---------------------------------------------------------------------------
// Strategy tables
// ---------------------------------------------------------------------------

type SessionStrategy = fn(&Fields<'_>, usize) -> Option<Vec<Session>>;
type QuestionStrategy = fn(&Fields<'_>, usize) -> Option<Vec<Question>>;

/// Session sources in priority order.
const SESSION_STRATEGIES: &[(&str, SessionStrategy)] = &[
    ("sessions", explicit_sessions),
    ("haystack", haystack_sessions),
    ("history", flat_history),
];

/// Question sources in priority order.
const QUESTION_STRATEGIES: &[(&str, QuestionStrategy)] = &[
    ("questions", listed_questions),
    ("qa", qa_questions),
    ("single", single_question),
];

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Normalize one raw record. `index` is the record's position in the source
/// array and only feeds synthetic ids.
pub fn normalize_item(raw: &Value, index: usize) -> DatasetItem {
    let fields = Fields::of(raw);

    let id = fields
        .text(ITEM_ID)
        .unwrap_or_else(|| format!("item-{index}"));

    let mut sessions = resolve(&fields, index, SESSION_STRATEGIES, "sessions")
        .unwrap_or_else(|| vec![Session::empty(session_id(index, 0))]);
    dedupe_ids(&mut sessions, |s| &mut s.id, |n| session_id(index, n));

    let mut questions = resolve(&fields, index, QUESTION_STRATEGIES, "questions")
        .unwrap_or_default();
    dedupe_ids(&mut questions, |q| &mut q.id, |n| question_id(index, n));

    DatasetItem {
        id,
        sessions,
        questions,
    }
}

fn resolve<T>(
    fields: &Fields<'_>,
    index: usize,
    table: &[(&str, fn(&Fields<'_>, usize) -> Option<Vec<T>>)],
    what: &str,
) -> Option<Vec<T>> {
    for (name, strategy) in table {
        if let Some(found) = strategy(fields, index) {
            debug!(item = index, strategy = *name, "resolved {what}");
            return Some(found);
        }
    }
    debug!(item = index, "no {what} source, using default");
    None
}

/// Replace repeated ids within one item with their positional synthetic id,
/// suffixed further if an explicit id already holds it.
fn dedupe_ids<T>(
    entries: &mut [T],
    id_of: impl Fn(&mut T) -> &mut String,
    synthetic: impl Fn(usize) -> String,
) {
    let mut seen = HashSet::new();
    for (n, entry) in entries.iter_mut().enumerate() {
        let id = id_of(entry);
        if !seen.insert(id.clone()) {
            *id = claim_unique_id(&mut seen, synthetic(n));
        }
    }
}

/// Record `candidate` in `seen`, appending `-1`, `-2`, ... until the id is
/// unused. Returns the id actually claimed.
pub fn claim_unique_id(seen: &mut HashSet<String>, candidate: String) -> String {
    if seen.insert(candidate.clone()) {
        return candidate;
    }
    let mut k = 1usize;
    loop {
        let next = format!("{candidate}-{k}");
        if seen.insert(next.clone()) {
            return next;
        }
        k += 1;
    }
}

fn session_id(index: usize, n: usize) -> String {
    format!("{index}-session-{n}")
}

fn question_id(index: usize, n: usize) -> String {
    format!("{index}-q-{n}")
}

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

pub fn normalize_turn(raw: &Value) -> Turn {
    if let Value::String(s) = raw {
        return Turn {
            role: Role::User,
            content: s.clone(),
        };
    }

    let fields = Fields::of(raw);
    let role = match fields.text(TURN_ROLE) {
        Some(label) => Role::from_label(&label.trim().to_lowercase()),
        None if fields.truthy("is_assistant") => Role::Assistant,
        None => Role::User,
    };
    let content = fields
        .text(TURN_CONTENT)
        .or_else(|| scalar_text(raw))
        .unwrap_or_default();

    Turn { role, content }
}

fn turns_from(value: &Value) -> Vec<Turn> {
    match value {
        Value::Array(turns) => turns.iter().map(normalize_turn).collect(),
        other => Fields::of(other)
            .array(SESSION_TURNS)
            .map(|turns| turns.iter().map(normalize_turn).collect())
            .unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Session strategies
// ---------------------------------------------------------------------------

fn explicit_sessions(fields: &Fields<'_>, index: usize) -> Option<Vec<Session>> {
    let raw = fields.array(&["sessions"])?;
    Some(
        raw.iter()
            .enumerate()
            .map(|(n, session)| {
                let sf = Fields::of(session);
                Session {
                    id: sf.text(SESSION_ID).unwrap_or_else(|| session_id(index, n)),
                    title: sf.text(SESSION_TITLE),
                    date: sf.text(SESSION_DATE),
                    turns: turns_from(session),
                }
            })
            .collect(),
    )
}

/// Parallel arrays: `haystack_sessions[n]` pairs with
/// `haystack_session_ids[n]` and `haystack_dates[n]`.
fn haystack_sessions(fields: &Fields<'_>, index: usize) -> Option<Vec<Session>> {
    let raw = fields.array(&[HAYSTACK_SESSIONS])?;
    let ids = fields.array(&[HAYSTACK_IDS]);
    let dates = fields.array(&[HAYSTACK_DATES]);
    let at = |list: Option<&Vec<Value>>, n: usize| {
        list.and_then(|l| l.get(n)).and_then(present_text)
    };

    Some(
        raw.iter()
            .enumerate()
            .map(|(n, session)| {
                let sf = Fields::of(session);
                Session {
                    id: at(ids, n)
                        .or_else(|| sf.text(SESSION_ID))
                        .unwrap_or_else(|| session_id(index, n)),
                    title: sf.text(SESSION_TITLE),
                    date: at(dates, n).or_else(|| sf.text(SESSION_DATE)),
                    turns: turns_from(session),
                }
            })
            .collect(),
    )
}

fn flat_history(fields: &Fields<'_>, index: usize) -> Option<Vec<Session>> {
    let raw = fields.array(FLAT_HISTORY)?;
    Some(vec![Session {
        id: session_id(index, 0),
        title: None,
        date: None,
        turns: raw.iter().map(normalize_turn).collect(),
    }])
}

// ---------------------------------------------------------------------------
// Question strategies
// ---------------------------------------------------------------------------

fn listed_questions(fields: &Fields<'_>, index: usize) -> Option<Vec<Question>> {
    question_list(fields, "questions", index)
}

fn qa_questions(fields: &Fields<'_>, index: usize) -> Option<Vec<Question>> {
    question_list(fields, "qa", index)
}

fn question_list(fields: &Fields<'_>, key: &str, index: usize) -> Option<Vec<Question>> {
    let raw = fields.array(&[key])?;
    Some(
        raw.iter()
            .enumerate()
            .map(|(n, q)| normalize_question(q, index, n))
            .collect(),
    )
}

fn single_question(fields: &Fields<'_>, index: usize) -> Option<Vec<Question>> {
    fields.first(&["question"])?;
    Some(vec![normalize_question_fields(fields, index, 0)])
}

pub fn normalize_question(raw: &Value, index: usize, n: usize) -> Question {
    normalize_question_fields(&Fields::of(raw), index, n)
}

fn normalize_question_fields(fields: &Fields<'_>, index: usize, n: usize) -> Question {
    let answer = match fields.first(QUESTION_ANSWER) {
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(other) => to_text(other),
        None => String::new(),
    };

    let options: Vec<String> = fields
        .array(QUESTION_OPTIONS)
        .map(|opts| opts.iter().map(to_text).collect())
        .unwrap_or_default();

    let kind = if !options.is_empty() {
        QuestionKind::MultipleChoice { options }
    } else if answer.eq_ignore_ascii_case("true") || answer.eq_ignore_ascii_case("false") {
        QuestionKind::Boolean
    } else {
        QuestionKind::ShortText
    };

    Question {
        id: fields
            .text(QUESTION_ID)
            .unwrap_or_else(|| question_id(index, n)),
        kind,
        prompt: fields.text(QUESTION_PROMPT).unwrap_or_default(),
        answer,
        aliases: fields
            .array(QUESTION_ALIASES)
            .map(|a| a.iter().map(to_text).collect()),
        date: fields.text(QUESTION_DATE),
    }
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// Read-only view over a raw record; a non-object record has no fields.
struct Fields<'a> {
    raw: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value) -> Self {
        Self {
            raw: value.as_object(),
        }
    }

    /// First alias whose value is present (not null, not an empty string).
    fn first(&self, keys: &[&str]) -> Option<&'a Value> {
        let map = self.raw?;
        keys.iter()
            .filter_map(|k| map.get(*k))
            .find(|v| is_present(v))
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        self.first(keys).map(to_text)
    }

    /// First alias holding an array.
    fn array(&self, keys: &[&str]) -> Option<&'a Vec<Value>> {
        let map = self.raw?;
        keys.iter().find_map(|k| map.get(*k).and_then(Value::as_array))
    }

    fn truthy(&self, key: &str) -> bool {
        match self.raw.and_then(|m| m.get(key)) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|x| x != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn present_text(value: &Value) -> Option<String> {
    is_present(value).then(|| to_text(value))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(_) | Value::Bool(_) => Some(to_text(value)),
        _ => None,
    }
}

/// Coerce any JSON value to text. Strings are taken verbatim, `null` is
/// empty, everything else is its compact JSON rendering.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
