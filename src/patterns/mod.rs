//! User-maintained allow/deny pattern lists for target executables.

pub mod filter;
pub mod list;
pub mod normalize;
pub mod store;


pub use filter::PatternFilter;
pub use list::{PatternKind, PatternList};
pub use normalize::normalize_for_persist;
pub use store::{PatternStore, PatternStoreError};
