use serde_json::Value;
use tracing::debug;

use blockgrid_core::ShardConfig;
use blockgrid_state::FilterProperties;

use super::{Filter, FilterError};
use crate::backend_state::PoolState;

/// Keeps sharded backends for the projects tagged onto their shard.
///
/// A backend without a shard capability serves everyone, as does any
/// backend for a project carrying no shard tag. Project tags are resolved
/// (and cached) by the host manager before the chain runs; unresolved tags
/// exclude every sharded backend.
pub struct ShardFilter {
    tag_prefix: String,
    capability_key: String,
}

impl ShardFilter {
    pub fn new(config: &ShardConfig) -> Self {
        Self {
            tag_prefix: config.tag_prefix.clone(),
            capability_key: config.capability_key.clone(),
        }
    }
}

impl Filter for ShardFilter {
    fn name(&self) -> &'static str {
        "ShardFilter"
    }

    fn run_filter_once_per_request(&self) -> bool {
        true
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let Some(backend_shard) = pool.capability(&self.capability_key).and_then(Value::as_str) else {
            return Ok(true);
        };
        if props.context.project_id.is_none() {
            return Ok(true);
        }
        let tags = props
            .resolved
            .project_shards
            .as_ref()
            .ok_or(FilterError::MissingDependency("project shard tags"))?;

        let shards: Vec<&str> = tags
            .iter()
            .filter_map(|t| t.strip_prefix(self.tag_prefix.as_str()))
            .collect();
        if shards.is_empty() {
            return Ok(true);
        }
        let passes = shards.contains(&backend_shard);
        if !passes {
            debug!(pool = %pool.id(), shard = backend_shard, ?shards, "project not on this shard");
        }
        Ok(passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::{plain, pool};
    use serde_json::json;

    fn filter() -> ShardFilter {
        ShardFilter::new(&ShardConfig::default())
    }

    fn project(tags: Option<&[&str]>) -> FilterProperties {
        let mut props = FilterProperties::default();
        props.context.project_id = Some("p1".to_string());
        props.resolved.project_shards = tags.map(|t| t.iter().map(|s| s.to_string()).collect());
        props
    }

    #[test]
    fn unsharded_backends_serve_everyone() {
        assert!(filter().passes(&plain("a@lvm"), &project(None)).unwrap());
    }

    #[test]
    fn sharded_backend_needs_matching_tag() {
        let sharded = pool("a@lvm", json!({"free_capacity_gb": 1, "shard": "s1"}));
        assert!(filter().passes(&sharded, &project(Some(&["shard:s1", "other"]))).unwrap());
        assert!(!filter().passes(&sharded, &project(Some(&["shard:s2"]))).unwrap());
        assert!(filter().passes(&sharded, &project(Some(&["untagged"]))).unwrap());
    }

    #[test]
    fn unresolved_tags_exclude_sharded_backends() {
        let sharded = pool("a@lvm", json!({"free_capacity_gb": 1, "shard": "s1"}));
        assert!(filter().passes(&sharded, &project(None)).is_err());
        assert!(filter().passes(&sharded, &FilterProperties::default()).unwrap());
    }
}
