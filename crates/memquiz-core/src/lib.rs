pub mod checksum;
pub mod dataset;
pub mod error;
pub mod grader;
pub mod normalize;
pub mod random;
pub mod sampler;
pub mod scoring;
pub mod share;

pub use checksum::{crc32, crc32_hex};
pub use dataset::{
    CompactDataset, DatasetItem, DatasetVariant, Question, QuestionKind, Role, SampledQuestion,
    Session, Turn, DATASET_VERSION,
};
pub use error::{QuizError, QuizResult};
pub use grader::{is_answer_correct, ExactMatchGrader, GradeError, GradeRequest, GradeResponse, Grader};
pub use normalize::{claim_unique_id, normalize_item};
pub use random::{shuffle_with_seed, SeededRandom};
pub use sampler::{coerce_count, sample_questions, DEFAULT_QUESTION_COUNT};
pub use scoring::{
    format_duration, format_percent, score, score_judgments, score_responses, ScoreResult,
    MIN_TIME_FACTOR, T_REF_PER_QUESTION,
};
pub use share::{
    decode_share_token, encode_share_token, try_decode_share_token, SharePayload, TokenError,
    SHARE_VERSION,
};
