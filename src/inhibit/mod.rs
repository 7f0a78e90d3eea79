mod engine;
mod rule;
mod rule_index;
mod source_cache;

pub use engine::{InhibitionEngine, SOURCE_CACHE_GC_INTERVAL};
pub use rule::InhibitRule;
pub use rule_index::{RuleIndex, RuleIndexOptions};
pub use source_cache::{SourceCache, SourceCacheEntry};
