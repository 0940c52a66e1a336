use crate::dataset::{CompactDataset, SampledQuestion};
use crate::random::shuffle_with_seed;

/// Questions per quiz when the caller gives none (or a non-positive count).
pub const DEFAULT_QUESTION_COUNT: usize = 10;

/// Map a user-supplied count to a usable one: anything `<= 0` becomes the
/// default.
pub fn coerce_count(requested: i64) -> usize {
    if requested <= 0 {
        DEFAULT_QUESTION_COUNT
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}

/// Flatten every question in dataset order, each carrying its item's id and
/// sessions.
pub fn flatten_questions(dataset: &CompactDataset) -> Vec<SampledQuestion> {
    dataset
        .items
        .iter()
        .flat_map(|item| {
            item.questions.iter().map(move |question| SampledQuestion {
                question: question.clone(),
                dataset_id: item.id.clone(),
                sessions: item.sessions.clone(),
            })
        })
        .collect()
}

/// Pick `count` questions for `seed`.
///
/// One full permutation is drawn per seed and then truncated, so for a fixed
/// seed a smaller count always yields a prefix of a larger one.
pub fn sample_questions(dataset: &CompactDataset, count: usize, seed: &str) -> Vec<SampledQuestion> {
    let mut all = flatten_questions(dataset);
    shuffle_with_seed(&mut all, seed);
    all.truncate(count.min(all.len()));
    all
}
