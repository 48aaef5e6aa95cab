pub mod base;
pub mod collstats;
pub mod dbstats;
pub mod diagnostic_data;
pub mod general;
pub mod indexstats;
pub mod replset_status;
pub mod sharded;

pub use base::{Batch, CacheState, CachingCollector, Fetch, Fetched};
pub use collstats::CollStatsFetcher;
pub use dbstats::DbStatsFetcher;
pub use diagnostic_data::DiagnosticDataFetcher;
pub use general::GeneralFetcher;
pub use indexstats::IndexStatsFetcher;
pub use replset_status::ReplSetStatusFetcher;
pub use sharded::ShardedFetcher;
