//! Streaming raw corpus → canonical dataset transform.
//!
//! The raw array is pulled one element at a time through serde's
//! `SeqAccess`, normalized, and written out before the next element is
//! parsed. Memory is bounded by the largest single record plus the two I/O
//! buffers; the reader never runs ahead of the writer.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use memquiz_core::{claim_unique_id, normalize_item, QuizError, QuizResult, DATASET_VERSION};

/// I/O buffer sizes for one ingest run.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub read_buffer: usize,
    pub write_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_buffer: 64 * 1024,
            write_buffer: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub items: usize,
    pub questions: usize,
    /// Questions whose id collided with one from an earlier item.
    pub renamed_questions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output: PathBuf,
    pub stats: IngestStats,
    /// SHA-256 of the canonical file, lowercase hex.
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Written(BuildReport),
    /// Source file absent; any existing output was left alone.
    SkippedMissingSource,
}

/// Failure inside [`ingest`], split by side so callers can blame the right path.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("reading source: {0}")]
    Read(#[source] serde_json::Error),

    #[error("writing output: {0}")]
    Write(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Output side
// ---------------------------------------------------------------------------

/// Writes `{"version":..,"items":[` .. `]}` around items as they arrive.
struct ItemSink<W: Write> {
    out: W,
    stats: IngestStats,
    /// Every question id written so far; grows with the question count only.
    question_ids: HashSet<String>,
    failed: Option<io::Error>,
}

impl<W: Write> ItemSink<W> {
    fn begin(mut out: W) -> io::Result<Self> {
        out.write_all(b"{\"version\":")?;
        serde_json::to_writer(&mut out, DATASET_VERSION)?;
        out.write_all(b",\"items\":[")?;
        Ok(Self {
            out,
            stats: IngestStats::default(),
            question_ids: HashSet::new(),
            failed: None,
        })
    }

    fn push(&mut self, raw: Value) -> io::Result<()> {
        let mut item = normalize_item(&raw, self.stats.items);
        for question in item.questions.iter_mut() {
            if !self.question_ids.insert(question.id.clone()) {
                let candidate = format!("{}:{}", item.id, question.id);
                question.id = claim_unique_id(&mut self.question_ids, candidate);
                self.stats.renamed_questions += 1;
            }
        }
        if self.stats.items > 0 {
            self.out.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.out, &item)?;
        self.stats.items += 1;
        self.stats.questions += item.questions.len();
        Ok(())
    }

    /// Push, parking the I/O error so the deserializer can be unwound with
    /// a serde error and the real cause recovered afterwards.
    fn accept<E: de::Error>(&mut self, raw: Value) -> Result<(), E> {
        self.push(raw).map_err(|e| {
            self.failed = Some(e);
            E::custom("output write failed")
        })
    }

    fn finish(mut self) -> io::Result<(W, IngestStats)> {
        self.out.write_all(b"]}")?;
        self.out.flush()?;
        Ok((self.out, self.stats))
    }
}

// ---------------------------------------------------------------------------
// Input side
// ---------------------------------------------------------------------------

/// Top level: a bare array of records, or an object whose `items` field is
/// that array. Anything else contributes no items.
struct RootSeed<'s, W: Write>(&'s mut ItemSink<W>);

/// Value of an `items` key: streamed if it is an array, skipped otherwise.
struct ItemsSeed<'s, W: Write>(&'s mut ItemSink<W>);

impl<'de, W: Write> DeserializeSeed<'de> for RootSeed<'_, W> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, d: D) -> Result<(), D::Error> {
        d.deserialize_any(StreamVisitor {
            sink: self.0,
            descend_into_items: true,
        })
    }
}

impl<'de, W: Write> DeserializeSeed<'de> for ItemsSeed<'_, W> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, d: D) -> Result<(), D::Error> {
        d.deserialize_any(StreamVisitor {
            sink: self.0,
            descend_into_items: false,
        })
    }
}

struct StreamVisitor<'s, W: Write> {
    sink: &'s mut ItemSink<W>,
    descend_into_items: bool,
}

impl<'de, W: Write> Visitor<'de> for StreamVisitor<'_, W> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON array of records or an object with an `items` array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(raw) = seq.next_element::<Value>()? {
            self.sink.accept::<A::Error>(raw)?;
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if self.descend_into_items && key == "items" {
                map.next_value_seed(ItemsSeed(&mut *self.sink))?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<(), E> {
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<(), E> {
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<(), E> {
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<(), E> {
        Ok(())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<(), E> {
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }
}

/// Stream-normalize a raw corpus from `reader` into a canonical document on
/// `writer`. Output order equals input order.
pub fn ingest<R: Read, W: Write>(reader: R, writer: W) -> Result<(W, IngestStats), IngestError> {
    let mut sink = ItemSink::begin(writer).map_err(IngestError::Write)?;

    let mut de = serde_json::Deserializer::from_reader(reader);
    let parsed = RootSeed(&mut sink)
        .deserialize(&mut de)
        .and_then(|()| de.end());
    if let Some(e) = sink.failed.take() {
        return Err(IngestError::Write(e));
    }
    parsed.map_err(IngestError::Read)?;

    sink.finish().map_err(IngestError::Write)
}

// ---------------------------------------------------------------------------
// File-level build
// ---------------------------------------------------------------------------

/// Hashes everything that passes through to `inner`.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset.json".into());
    output.with_file_name(format!(".{name}.{}.partial", std::process::id()))
}

/// Build the canonical dataset at `output` from the raw corpus at `input`.
///
/// The output is written to a sibling temp file and renamed into place only
/// after the whole input has been consumed, so a failed build never replaces
/// or truncates a previously good file.
pub fn build_compact(input: &Path, output: &Path, config: StreamConfig) -> QuizResult<BuildOutcome> {
    match fs::metadata(input) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                "raw file missing: {}. Keeping existing compact data.",
                input.display()
            );
            return Ok(BuildOutcome::SkippedMissingSource);
        }
        Err(e) => return Err(QuizError::io(input, e)),
    }

    let source = File::open(input).map_err(|e| QuizError::io(input, e))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| QuizError::io(parent, e))?;
    }

    let tmp = partial_path(output);
    let result = write_partial(input, &tmp, source, config);
    let (stats, sha256) = match result {
        Ok(done) => done,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&tmp, output) {
        let _ = fs::remove_file(&tmp);
        return Err(QuizError::io(output, e));
    }

    if stats.renamed_questions > 0 {
        warn!(
            renamed = stats.renamed_questions,
            "question ids repeated across items were prefixed with their item id"
        );
    }
    info!(
        items = stats.items,
        questions = stats.questions,
        "wrote compact dataset to {}",
        output.display()
    );
    Ok(BuildOutcome::Written(BuildReport {
        output: output.to_path_buf(),
        stats,
        sha256,
    }))
}

fn write_partial(
    input: &Path,
    tmp: &Path,
    source: File,
    config: StreamConfig,
) -> QuizResult<(IngestStats, String)> {
    let file = File::create(tmp).map_err(|e| QuizError::io(tmp, e))?;
    let writer = HashingWriter {
        inner: BufWriter::with_capacity(config.write_buffer, file),
        hasher: Sha256::new(),
    };
    let reader = BufReader::with_capacity(config.read_buffer, source);

    let (writer, stats) = ingest(reader, writer).map_err(|e| match e {
        IngestError::Read(e) if e.is_io() => QuizError::io(input, e.into()),
        IngestError::Read(e) => QuizError::parse(input, e),
        IngestError::Write(e) => QuizError::io(tmp, e),
    })?;

    let sha256 = format!("{:x}", writer.hasher.finalize());
    let file = writer
        .inner
        .into_inner()
        .map_err(|e| QuizError::io(tmp, e.into_error()))?;
    file.sync_all().map_err(|e| QuizError::io(tmp, e))?;
    debug!("synced {}", tmp.display());

    Ok((stats, sha256))
}
