use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use blockgrid_state::{FilterProperties, Operation};

use super::{Filter, FilterError};
use crate::backend_state::PoolState;
use crate::collab::SpecMatcher;
use crate::extra_specs::parse_bool;

/// Keeps pools whose reported capabilities satisfy the volume type's
/// extra specs.
pub struct CapabilitiesFilter {
    matcher: Arc<dyn SpecMatcher>,
}

impl CapabilitiesFilter {
    pub fn new(matcher: Arc<dyn SpecMatcher>) -> Self {
        Self { matcher }
    }
}

impl Filter for CapabilitiesFilter {
    fn name(&self) -> &'static str {
        "CapabilitiesFilter"
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let spec = &props.request_spec;
        if spec.operation == Operation::ExtendVolume
            && !spec.resource_properties.is_detached()
            && pool
                .capability("online_extend_support")
                .is_some_and(reported_false)
        {
            debug!(pool = %pool.id(), "online extend not supported");
            return Ok(false);
        }

        let Some(extra_specs) = props.extra_specs() else {
            return Ok(true);
        };
        Ok(satisfies_extra_specs(
            self.matcher.as_ref(),
            &pool.capability_tree(),
            extra_specs,
        ))
    }
}

fn reported_false(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::String(s) => parse_bool(s) == Some(false),
        _ => false,
    }
}

/// Whether a capability tree satisfies every extra spec.
///
/// Keys are split on `:`. A scoped key is only considered under the
/// `capabilities` scope, which is stripped; the rest is a path into the
/// tree, segmented on `:` and `.`.
pub fn satisfies_extra_specs(
    matcher: &dyn SpecMatcher,
    tree: &Value,
    extra_specs: &BTreeMap<String, String>,
) -> bool {
    for (key, requirement) in extra_specs {
        let mut scope: Vec<&str> = key.split(':').collect();
        if scope.len() > 1 {
            if scope[0] != "capabilities" {
                continue;
            }
            scope.remove(0);
        }
        let path: Vec<&str> = scope.iter().flat_map(|s| s.split('.')).collect();

        let mut node = tree;
        for segment in &path {
            match node.get(segment) {
                Some(next) => node = next,
                None => {
                    debug!(%key, "capability not reported");
                    return false;
                }
            }
        }

        let reported: Vec<&Value> = match node {
            Value::Array(items) => items.iter().collect(),
            scalar => vec![scalar],
        };
        if !reported.iter().any(|v| matcher.matches(v, requirement)) {
            debug!(%key, %requirement, "capability does not match");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra_specs::ExtraSpecsMatcher;
    use crate::filters::testing::pool;
    use blockgrid_state::VolumeType;
    use serde_json::json;

    fn filter() -> CapabilitiesFilter {
        CapabilitiesFilter::new(Arc::new(ExtraSpecsMatcher))
    }

    fn with_specs(specs: &[(&str, &str)]) -> FilterProperties {
        FilterProperties {
            volume_type: Some(VolumeType {
                name: Some("gold".to_string()),
                extra_specs: specs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
            ..FilterProperties::default()
        }
    }

    fn candidate() -> PoolState {
        pool(
            "a@lvm",
            json!({
                "vendor_name": "Acme",
                "free_capacity_gb": 10,
                "multiattach": true,
                "qos": {"iops": 5000},
                "protocols": ["iSCSI", "FC"],
            }),
        )
    }

    #[test]
    fn unscoped_and_capabilities_scoped_keys() {
        let p = candidate();
        assert!(filter().passes(&p, &with_specs(&[("vendor_name", "Acme")])).unwrap());
        assert!(
            filter()
                .passes(&p, &with_specs(&[("capabilities:multiattach", "<is> True")]))
                .unwrap()
        );
        assert!(!filter().passes(&p, &with_specs(&[("vendor_name", "Other")])).unwrap());
    }

    #[test]
    fn foreign_scopes_are_ignored() {
        let p = candidate();
        let props = with_specs(&[("acme:tier", "platinum"), ("qos:max_iops", "10")]);
        assert!(filter().passes(&p, &props).unwrap());
    }

    #[test]
    fn nested_paths_and_lists() {
        let p = candidate();
        assert!(filter().passes(&p, &with_specs(&[("capabilities:qos.iops", ">= 1000")])).unwrap());
        assert!(filter().passes(&p, &with_specs(&[("capabilities:qos:iops", "<= 5000")])).unwrap());
        assert!(filter().passes(&p, &with_specs(&[("protocols", "FC")])).unwrap());
        assert!(!filter().passes(&p, &with_specs(&[("protocols", "NFS")])).unwrap());
    }

    #[test]
    fn missing_capability_excludes() {
        let p = candidate();
        assert!(!filter().passes(&p, &with_specs(&[("capabilities:qos.latency", "1")])).unwrap());
        assert!(!filter().passes(&p, &with_specs(&[("replication", "<is> True")])).unwrap());
    }

    #[test]
    fn online_extend_needs_support_unless_detached() {
        let p = pool("a@lvm", json!({"free_capacity_gb": 10, "online_extend_support": false}));
        let mut props = FilterProperties::default();
        props.request_spec.operation = Operation::ExtendVolume;
        props.request_spec.resource_properties.attach_status = Some("attached".to_string());
        assert!(!filter().passes(&p, &props).unwrap());

        props.request_spec.resource_properties.attach_status = Some("detached".to_string());
        assert!(filter().passes(&p, &props).unwrap());

        let supported = pool("b@lvm", json!({"free_capacity_gb": 10, "online_extend_support": true}));
        props.request_spec.resource_properties.attach_status = Some("attached".to_string());
        assert!(filter().passes(&supported, &props).unwrap());
    }
}
