//! Hard-constraint filters.
//!
//! Every filter here is absolute: a candidate it removes can never appear
//! in a result, whatever its score.

pub mod already_rated;
pub mod genre;
pub mod year_range;

pub use already_rated::{AlreadyRatedFilter, DislikedFilter};
pub use genre::{ExcludedGenreFilter, IncludedGenreFilter};
pub use year_range::YearRangeFilter;
