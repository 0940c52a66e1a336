use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use memquiz_core::{CompactDataset, DatasetVariant, QuizError, QuizResult};
use tracing::debug;

/// Where raw corpora and canonical datasets live on disk.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub raw_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl DataPaths {
    pub fn new(raw_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            out_dir: out_dir.into(),
        }
    }

    pub fn raw_path(&self, variant: DatasetVariant) -> PathBuf {
        self.raw_dir.join(variant.raw_file())
    }

    pub fn compact_path(&self, variant: DatasetVariant) -> PathBuf {
        self.out_dir.join(variant.compact_file())
    }
}

/// Read a canonical dataset file.
pub fn load_dataset(path: &Path) -> QuizResult<CompactDataset> {
    let file = File::open(path).map_err(|e| QuizError::io(path, e))?;
    let dataset: CompactDataset = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| QuizError::parse(path, e))?;
    debug!(
        items = dataset.items.len(),
        questions = dataset.question_count(),
        "loaded {}",
        path.display()
    );
    Ok(dataset)
}
