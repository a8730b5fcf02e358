use std::sync::Arc;

use serde_json::{Value, json};

use blockgrid_state::FilterProperties;

use super::{Filter, FilterError};
use crate::backend_state::PoolState;
use crate::collab::ExpressionEvaluator;

/// Capability key holding a pool's admin-supplied filter expression.
pub const FILTER_FUNCTION_KEY: &str = "filter_function";

/// Runs the pool's own `filter_function` expression through an evaluator.
pub struct DriverFilter {
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
}

impl DriverFilter {
    pub fn new(evaluator: Option<Arc<dyn ExpressionEvaluator>>) -> Self {
        Self { evaluator }
    }
}

impl Filter for DriverFilter {
    fn name(&self) -> &'static str {
        "DriverFilter"
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let Some(expression) = pool
            .capability(FILTER_FUNCTION_KEY)
            .and_then(Value::as_str)
            .filter(|e| !e.trim().is_empty())
        else {
            return Ok(true);
        };
        let evaluator = self
            .evaluator
            .as_ref()
            .ok_or(FilterError::MissingDependency("filter expression evaluator"))?;

        evaluator
            .evaluate(expression, &namespace(pool, props))
            .map_err(FilterError::Evaluation)
    }
}

/// Names an expression may refer to.
fn namespace(pool: &PoolState, props: &FilterProperties) -> Value {
    let stats = json!({
        "backend_id": pool.backend.backend_id,
        "host": pool.backend.host,
        "pool_name": pool.pool_name,
        "volume_backend_name": pool.backend.volume_backend_name,
        "vendor_name": pool.backend.vendor_name,
        "driver_version": pool.backend.driver_version,
        "storage_protocol": pool.backend.storage_protocol,
        "total_capacity_gb": pool.total_capacity_gb,
        "free_capacity_gb": pool.free_capacity_gb,
        "allocated_capacity_gb": pool.allocated_capacity_gb,
        "provisioned_capacity_gb": pool.provisioned_capacity_gb,
        "reserved_percentage": pool.reserved_percentage,
        "max_over_subscription_ratio": pool.max_over_subscription_ratio,
    });
    json!({
        "stats": stats,
        "capabilities": pool.capability_tree(),
        "extra": props.extra_specs(),
        "volume": props.request_spec.resource_properties,
        "qos": props.qos_specs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::pool;

    /// Understands `free >= N` and nothing else.
    struct FreeAtLeast;

    impl ExpressionEvaluator for FreeAtLeast {
        fn evaluate(&self, expression: &str, namespace: &Value) -> anyhow::Result<bool> {
            let n: f64 = expression
                .strip_prefix("free >= ")
                .ok_or_else(|| anyhow::anyhow!("unsupported expression: {expression}"))?
                .parse()?;
            let free = namespace["stats"]["free_capacity_gb"]
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("free capacity is not numeric"))?;
            Ok(free >= n)
        }
    }

    fn filter() -> DriverFilter {
        DriverFilter::new(Some(Arc::new(FreeAtLeast)))
    }

    #[test]
    fn no_expression_passes() {
        let p = pool("a@lvm", serde_json::json!({"free_capacity_gb": 1}));
        assert!(filter().passes(&p, &FilterProperties::default()).unwrap());
        assert!(DriverFilter::new(None).passes(&p, &FilterProperties::default()).unwrap());
    }

    #[test]
    fn expression_decides() {
        let ok = pool("a@lvm", serde_json::json!({"free_capacity_gb": 50, "filter_function": "free >= 10"}));
        let low = pool("b@lvm", serde_json::json!({"free_capacity_gb": 5, "filter_function": "free >= 10"}));
        assert!(filter().passes(&ok, &FilterProperties::default()).unwrap());
        assert!(!filter().passes(&low, &FilterProperties::default()).unwrap());
    }

    #[test]
    fn evaluator_error_is_a_filter_error() {
        let bad = pool("a@lvm", serde_json::json!({"free_capacity_gb": 50, "filter_function": "size < 3"}));
        let err = filter().passes(&bad, &FilterProperties::default()).unwrap_err();
        assert!(matches!(err, FilterError::Evaluation(_)));

        let err = DriverFilter::new(None)
            .passes(&bad, &FilterProperties::default())
            .unwrap_err();
        assert!(matches!(err, FilterError::MissingDependency(_)));
    }
}
