pub mod matcher;
pub mod record;

pub use matcher::{
    match_movie, CandidateEntry, CompareStrategy, MatchCategory, MatchError, SearchResultSet,
};
pub use record::{MovieRecord, RatingValue};
