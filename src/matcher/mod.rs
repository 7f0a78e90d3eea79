mod matcher;
mod matcher_list;

pub use matcher::{Matcher, MatcherKind};
pub use matcher_list::MatcherList;
