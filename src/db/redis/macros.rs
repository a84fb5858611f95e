/// Read-through caching for external lookups.
///
/// Returns the cached value when present. Otherwise awaits `$block`, stores
/// its value in the background and returns it. An `Err` from the block is
/// propagated with `?` and never cached, so failed or rate-limited lookups are
/// retried on the next call.
///
/// # Arguments
/// * `$cache`: a [`crate::db::Cache`]
/// * `$key`: the [`crate::db::CacheKey`] to read and write
/// * `$ttl`: time-to-live in seconds
/// * `$block`: future computing the value on a miss
///
/// # Example
/// ```rust,ignore
/// async fn candidates(&self, title: &str) -> AppResult<Vec<Candidate>> {
///     cached!(self.cache, CacheKey::CatalogSearch(title.to_string()), SEARCH_CACHE_TTL, async move {
///         self.search(title).await
///     })
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
