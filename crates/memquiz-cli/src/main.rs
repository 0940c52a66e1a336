mod config;
mod fetch;
mod llm_grader;
mod quiz;

use std::collections::HashMap;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use memquiz_core::{
    decode_share_token, encode_share_token, format_duration, format_percent, is_answer_correct,
    sample_questions, score, score_judgments, CompactDataset, DatasetVariant, GradeRequest,
    Grader, ScoreResult, SharePayload,
};
use memquiz_store::{build_compact, load_dataset, BuildOutcome, DataPaths, StreamConfig};

use crate::config::Config;
use crate::fetch::FetchOutcome;
use crate::llm_grader::LlmGrader;

#[derive(Parser)]
#[command(
    name = "memquiz",
    version,
    about = "Timed long-memory quiz over LongMemEval conversation histories"
)]
struct Cli {
    /// Directory holding the canonical datasets (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the raw LongMemEval corpora
    Fetch {
        /// Replace raw files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Convert raw corpora into canonical compact datasets
    Build {
        /// Only build this variant (default: all)
        #[arg(short, long)]
        variant: Option<CliVariant>,

        /// Read buffer size in bytes
        #[arg(long)]
        read_buffer: Option<usize>,

        /// Write buffer size in bytes
        #[arg(long)]
        write_buffer: Option<usize>,
    },

    /// Print the questions a seed selects
    Sample {
        #[arg(short, long)]
        variant: Option<CliVariant>,

        #[arg(short, long)]
        seed: String,

        /// Number of questions (non-positive means the default)
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        count: Option<i64>,

        /// Emit the sampled questions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take a timed quiz in the terminal
    Quiz {
        #[arg(short, long)]
        variant: Option<CliVariant>,

        /// Seed for question selection (default: random)
        #[arg(short, long)]
        seed: Option<String>,

        #[arg(short = 'n', long, allow_negative_numbers = true)]
        count: Option<i64>,

        #[arg(short, long, default_value = "exact")]
        grader: GraderKind,

        /// Print the conversation history before each question
        #[arg(long)]
        context: bool,
    },

    /// Score a set of judgments for a seeded question set
    Score {
        #[arg(short, long)]
        variant: Option<CliVariant>,

        #[arg(short, long)]
        seed: String,

        #[arg(short = 'n', long, allow_negative_numbers = true)]
        count: Option<i64>,

        /// JSON object mapping question id to true/false
        #[arg(short, long)]
        judgments: PathBuf,

        /// Elapsed time in milliseconds
        #[arg(short, long)]
        duration_ms: u64,

        /// Also print a share token
        #[arg(long)]
        share: bool,
    },

    /// Encode or decode share tokens
    Share {
        #[command(subcommand)]
        command: ShareCommands,
    },

    /// Grade one free-text response
    Grade {
        #[arg(short, long)]
        question: String,

        /// Ground-truth answer
        #[arg(short, long)]
        answer: String,

        #[arg(short, long)]
        response: String,

        /// Additional accepted answer (repeatable)
        #[arg(long = "alias")]
        aliases: Vec<String>,

        #[arg(short, long, default_value = "llm")]
        grader: GraderKind,
    },

    /// Show active configuration
    Config,
}

#[derive(Subcommand)]
enum ShareCommands {
    /// Build a token from a score
    Encode {
        #[arg(short, long, default_value = "s")]
        variant: CliVariant,

        #[arg(short, long)]
        seed: String,

        #[arg(short = 'n', long)]
        count: usize,

        /// Number of correct answers
        #[arg(short, long)]
        correct: usize,

        #[arg(short, long)]
        duration_ms: u64,
    },

    /// Verify a token and print its payload
    Decode {
        token: String,

        /// Print the payload as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliVariant {
    S,
    M,
}

impl From<CliVariant> for DatasetVariant {
    fn from(v: CliVariant) -> Self {
        match v {
            CliVariant::S => DatasetVariant::S,
            CliVariant::M => DatasetVariant::M,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GraderKind {
    /// Case-insensitive match against the answer and its aliases
    Exact,
    /// OpenAI-compatible chat completions judge
    Llm,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config()?;
    if let Some(dir) = cli.data_dir {
        cfg.data.out_dir = dir;
    }

    match cli.command {
        Commands::Fetch { overwrite } => {
            cfg.data.overwrite |= overwrite;
            cmd_fetch(&cfg)
        }
        Commands::Build {
            variant,
            read_buffer,
            write_buffer,
        } => {
            let defaults = StreamConfig::default();
            let stream = StreamConfig {
                read_buffer: read_buffer.unwrap_or(defaults.read_buffer),
                write_buffer: write_buffer.unwrap_or(defaults.write_buffer),
            };
            cmd_build(&cfg, variant.map(Into::into), stream)
        }
        Commands::Sample {
            variant,
            seed,
            count,
            json,
        } => cmd_sample(&cfg, resolve_variant(&cfg, variant), &seed, count, json),
        Commands::Quiz {
            variant,
            seed,
            count,
            grader,
            context,
        } => cmd_quiz(
            &cfg,
            resolve_variant(&cfg, variant),
            seed,
            count,
            grader,
            context,
        ),
        Commands::Score {
            variant,
            seed,
            count,
            judgments,
            duration_ms,
            share,
        } => cmd_score(
            &cfg,
            resolve_variant(&cfg, variant),
            &seed,
            count,
            &judgments,
            duration_ms,
            share,
        ),
        Commands::Share { command } => match command {
            ShareCommands::Encode {
                variant,
                seed,
                count,
                correct,
                duration_ms,
            } => cmd_share_encode(variant.into(), seed, count, correct, duration_ms),
            ShareCommands::Decode { token, json } => cmd_share_decode(&token, json),
        },
        Commands::Grade {
            question,
            answer,
            response,
            aliases,
            grader,
        } => cmd_grade(
            &cfg,
            GradeRequest::new(question, answer, response).with_aliases(aliases),
            grader,
        ),
        Commands::Config => cmd_config(&cfg),
    }
}

fn resolve_variant(cfg: &Config, variant: Option<CliVariant>) -> DatasetVariant {
    variant.map(Into::into).unwrap_or(cfg.quiz.default_variant)
}

fn resolve_count(cfg: &Config, count: Option<i64>) -> usize {
    memquiz_core::coerce_count(count.unwrap_or(cfg.quiz.default_count as i64))
}

fn data_paths(cfg: &Config) -> DataPaths {
    DataPaths::new(&cfg.data.raw_dir, &cfg.data.out_dir)
}

fn open_dataset(cfg: &Config, variant: DatasetVariant) -> Result<CompactDataset> {
    let path = data_paths(cfg).compact_path(variant);
    if !path.exists() {
        bail!(
            "no dataset at {} (run `memquiz fetch` and `memquiz build` first)",
            path.display()
        );
    }
    load_dataset(&path).with_context(|| format!("cannot load {}", path.display()))
}

// ---------------------------------------------------------------------------
// Data commands
// ---------------------------------------------------------------------------

fn cmd_fetch(cfg: &Config) -> Result<()> {
    let hosted = config::env_flag(std::env::var("VERCEL").ok().as_deref());
    if !fetch::fetch_permitted(hosted, cfg.data.allow_fetch) {
        println!("Hosted build detected, skipping fetch (set ALLOW_DATA_FETCH=1 to force).");
        return Ok(());
    }

    for outcome in fetch::fetch_all(&cfg.data)? {
        match outcome {
            FetchOutcome::Downloaded {
                path,
                bytes,
                sha256,
            } => println!("Saved {} ({bytes} bytes, sha256 {sha256})", path.display()),
            FetchOutcome::KeptExisting(path) => {
                println!("Exists {} (use --overwrite to replace)", path.display())
            }
        }
    }
    Ok(())
}

fn cmd_build(cfg: &Config, only: Option<DatasetVariant>, stream: StreamConfig) -> Result<()> {
    let paths = data_paths(cfg);
    let variants: Vec<DatasetVariant> = match only {
        Some(v) => vec![v],
        None => DatasetVariant::ALL.to_vec(),
    };

    let mut failed = Vec::new();
    for variant in variants {
        let input = paths.raw_path(variant);
        let output = paths.compact_path(variant);
        match build_compact(&input, &output, stream) {
            Ok(BuildOutcome::Written(report)) => {
                println!(
                    "Wrote {} ({} items, {} questions, sha256 {})",
                    report.output.display(),
                    report.stats.items,
                    report.stats.questions,
                    report.sha256
                );
            }
            Ok(BuildOutcome::SkippedMissingSource) => {
                println!("Skipped {variant}: {} not found", input.display());
            }
            Err(e) => {
                eprintln!("Build failed for {variant}: {e}");
                failed.push(variant.to_string());
            }
        }
    }

    if !failed.is_empty() {
        bail!("build failed for variant(s): {}", failed.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Quiz commands
// ---------------------------------------------------------------------------

fn cmd_sample(
    cfg: &Config,
    variant: DatasetVariant,
    seed: &str,
    count: Option<i64>,
    json: bool,
) -> Result<()> {
    let dataset = open_dataset(cfg, variant)?;
    let questions = sample_questions(&dataset, resolve_count(cfg, count), seed);

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
        return Ok(());
    }
    if questions.is_empty() {
        println!("Dataset has no questions.");
        return Ok(());
    }
    for (i, q) in questions.iter().enumerate() {
        println!(
            "{:>3}. [{}] {}  ({} / {})",
            i + 1,
            q.question.kind.label(),
            q.question.prompt,
            q.dataset_id,
            q.question.id
        );
    }
    Ok(())
}

fn cmd_quiz(
    cfg: &Config,
    variant: DatasetVariant,
    seed: Option<String>,
    count: Option<i64>,
    grader: GraderKind,
    context: bool,
) -> Result<()> {
    let dataset = open_dataset(cfg, variant)?;
    let seed = seed.unwrap_or_else(|| format!("{:x}", chrono::Utc::now().timestamp_millis()));
    let questions = sample_questions(&dataset, resolve_count(cfg, count), &seed);
    if questions.is_empty() {
        bail!("dataset {variant} has no questions");
    }
    if !io::stdin().is_terminal() {
        eprintln!("(reading answers from non-interactive stdin)");
    }

    eprintln!(
        "Variant {variant}, seed {seed}, {} questions. Timer starts at the first prompt.",
        questions.len()
    );

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stderr();
    let run = match grader {
        GraderKind::Exact => quiz::run_quiz(
            &questions,
            |q, r| Ok(is_answer_correct(q, r)),
            context,
            &mut input,
            &mut out,
        )?,
        GraderKind::Llm => {
            let llm = LlmGrader::from_config(&cfg.grader);
            quiz::run_quiz(
                &questions,
                |q, r| llm.grade(&GradeRequest::for_question(q, r)),
                context,
                &mut input,
                &mut out,
            )?
        }
    };

    let result = score_judgments(
        questions.iter().map(|s| &s.question),
        &run.judgments,
        run.duration_ms,
    );
    print_score(&result);
    if !run.ungraded.is_empty() {
        println!(
            "Ungraded:  {} (grading failed: {})",
            run.ungraded.len(),
            run.ungraded.join(", ")
        );
    }

    let payload = SharePayload::new(variant, seed, questions.len(), &result);
    println!("Share:     {}", encode_share_token(&payload)?);
    Ok(())
}

fn cmd_score(
    cfg: &Config,
    variant: DatasetVariant,
    seed: &str,
    count: Option<i64>,
    judgments_path: &Path,
    duration_ms: u64,
    share: bool,
) -> Result<()> {
    let dataset = open_dataset(cfg, variant)?;
    let questions = sample_questions(&dataset, resolve_count(cfg, count), seed);

    let raw = std::fs::read_to_string(judgments_path)
        .with_context(|| format!("reading {}", judgments_path.display()))?;
    let judgments: HashMap<String, bool> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", judgments_path.display()))?;

    let unknown = judgments
        .keys()
        .filter(|id| !questions.iter().any(|q| &q.question.id == *id))
        .count();
    if unknown > 0 {
        eprintln!("Warning: {unknown} judgment(s) do not match the sampled questions");
    }

    let result = score_judgments(questions.iter().map(|s| &s.question), &judgments, duration_ms);
    println!("{}", serde_json::to_string_pretty(&result)?);

    if share {
        let payload = SharePayload::new(variant, seed, questions.len(), &result);
        println!("{}", encode_share_token(&payload)?);
    }
    Ok(())
}

fn print_score(result: &ScoreResult) {
    println!();
    println!("Correct:   {}/{}", result.correct, result.total);
    println!("Accuracy:  {}", format_percent(result.accuracy));
    println!("Time:      {}", format_duration(result.duration_ms));
    println!("Factor:    {:.2}", result.time_factor);
    println!("Composite: {:.1}", result.composite);
}

// ---------------------------------------------------------------------------
// Share commands
// ---------------------------------------------------------------------------

fn cmd_share_encode(
    variant: DatasetVariant,
    seed: String,
    count: usize,
    correct: usize,
    duration_ms: u64,
) -> Result<()> {
    if correct > count {
        bail!("correct ({correct}) cannot exceed count ({count})");
    }
    let result = score(count, correct, duration_ms);
    let payload = SharePayload::new(variant, seed, count, &result);
    println!("{}", encode_share_token(&payload)?);
    Ok(())
}

fn cmd_share_decode(token: &str, json: bool) -> Result<()> {
    let Some(payload) = decode_share_token(token) else {
        bail!("share token not found or invalid");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    println!("Variant:   {}", payload.variant);
    println!("Seed:      {}", payload.seed);
    println!("Questions: {}", payload.count);
    println!("Accuracy:  {}", format_percent(payload.accuracy));
    println!("Time:      {}", format_duration(payload.duration_ms));
    println!("Composite: {:.1}", payload.composite);
    println!("Created:   {}", payload.created_at.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

fn grade_with(
    cfg: &Config,
    request: &GradeRequest,
    grader: GraderKind,
) -> Result<bool, memquiz_core::GradeError> {
    match grader {
        GraderKind::Exact => memquiz_core::ExactMatchGrader.grade(request),
        GraderKind::Llm => LlmGrader::from_config(&cfg.grader).grade(request),
    }
}

fn cmd_grade(cfg: &Config, request: GradeRequest, grader: GraderKind) -> Result<()> {
    match grade_with(cfg, &request, grader) {
        Ok(correct) => {
            println!("{}", serde_json::json!({ "correct": correct }));
            Ok(())
        }
        Err(e) if e.is_retryable() => bail!("grading failed, try again: {e}"),
        Err(e) => bail!("grading failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(cfg: &Config) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[data]");
    println!("  raw_dir = {}", cfg.data.raw_dir.display());
    println!("  out_dir = {}", cfg.data.out_dir.display());
    println!("  base_url = {}", cfg.data.base_url);
    println!("  allow_fetch = {}", cfg.data.allow_fetch);
    println!("  overwrite = {}", cfg.data.overwrite);
    println!();
    println!("[quiz]");
    println!("  default_count = {}", cfg.quiz.default_count);
    println!("  default_variant = {}", cfg.quiz.default_variant);
    println!();
    println!("[grader]");
    println!("  endpoint = {}", cfg.grader.endpoint);
    println!("  model = {}", cfg.grader.model);
    let key_state = if std::env::var(&cfg.grader.api_key_env).is_ok() {
        "set"
    } else {
        "unset"
    };
    println!("  api_key_env = {} ({key_state})", cfg.grader.api_key_env);
    println!("  timeout_secs = {}", cfg.grader.timeout_secs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_quiz() {
        let cli = Cli::try_parse_from([
            "memquiz", "quiz", "--variant", "m", "--seed", "abc", "-n", "-4",
        ])
        .unwrap();
        match cli.command {
            Commands::Quiz {
                variant,
                seed,
                count,
                ..
            } => {
                assert!(matches!(variant, Some(CliVariant::M)));
                assert_eq!(seed.as_deref(), Some("abc"));
                assert_eq!(count, Some(-4));
            }
            _ => panic!("expected quiz"),
        }
    }

    #[test]
    fn test_cli_parses_share_decode() {
        let cli = Cli::try_parse_from(["memquiz", "share", "decode", "tok"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Share {
                command: ShareCommands::Decode { .. }
            }
        ));
    }

    #[test]
    fn test_resolve_count_defaults_non_positive() {
        let cfg = Config::default();
        assert_eq!(resolve_count(&cfg, None), 10);
        assert_eq!(resolve_count(&cfg, Some(0)), 10);
        assert_eq!(resolve_count(&cfg, Some(-2)), 10);
        assert_eq!(resolve_count(&cfg, Some(500)), 500);
    }

    #[test]
    fn test_grade_command_passes_aliases_to_exact_grader() {
        let cli = Cli::try_parse_from([
            "memquiz", "grade", "-q", "Where?", "-a", "NYC", "-r", "new york",
            "--alias", "New York", "--alias", "Big Apple", "-g", "exact",
        ])
        .unwrap();
        let Commands::Grade {
            question,
            answer,
            response,
            aliases,
            grader,
        } = cli.command
        else {
            panic!("expected grade");
        };
        assert_eq!(aliases, vec!["New York".to_string(), "Big Apple".to_string()]);

        let cfg = Config::default();
        let request = GradeRequest::new(question, answer, response).with_aliases(aliases);
        assert!(grade_with(&cfg, &request, grader).unwrap());
        let without = GradeRequest::new("Where?", "NYC", "new york");
        assert!(!grade_with(&cfg, &without, GraderKind::Exact).unwrap());
    }

    #[test]
    fn test_share_decode_rejects_garbage() {
        assert!(cmd_share_decode("not-a-token", false).is_err());
    }

    #[test]
    fn test_build_then_sample_via_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.data.raw_dir = dir.path().join("raw");
        cfg.data.out_dir = dir.path().join("out");
        std::fs::create_dir_all(&cfg.data.raw_dir).unwrap();
        std::fs::write(
            cfg.data.raw_dir.join(DatasetVariant::S.raw_file()),
            r#"[{"question_id":"q1","question":"Cat name?","answer":"Miso","haystack_sessions":[[{"role":"user","content":"My cat is Miso"}]]}]"#,
        )
        .unwrap();

        cmd_build(&cfg, Some(DatasetVariant::S), StreamConfig::default()).unwrap();
        let dataset = open_dataset(&cfg, DatasetVariant::S).unwrap();
        assert_eq!(dataset.question_count(), 1);
        // The m variant has no raw file; building it is a skip, not an error.
        cmd_build(&cfg, Some(DatasetVariant::M), StreamConfig::default()).unwrap();
        assert!(open_dataset(&cfg, DatasetVariant::M).is_err());
    }
}
