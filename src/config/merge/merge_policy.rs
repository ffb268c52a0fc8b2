//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key; tables merge, arrays replace.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("storage.cache_path", ".graphcache/cache")?
        .set_default("storage.queue_path", ".graphcache/queue")?
        .set_default("cache.return_partial_data", false)?
        .set_default("queue.persist_optimistic_response", false)?
        .set_default("queue.dequeue_on_error", false)
}
