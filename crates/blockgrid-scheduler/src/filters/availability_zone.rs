use blockgrid_state::FilterProperties;

use super::{Filter, FilterError};
use crate::backend_state::PoolState;

/// Keeps pools in the requested availability zone.
///
/// An explicit zone list on the request wins over the resource's own zone;
/// with neither, every pool passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AvailabilityZoneFilter;

impl Filter for AvailabilityZoneFilter {
    fn name(&self) -> &'static str {
        "AvailabilityZoneFilter"
    }

    fn run_filter_once_per_request(&self) -> bool {
        true
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let zone = pool.backend.availability_zone.as_deref();
        let spec = &props.request_spec;

        if let Some(zones) = spec.availability_zones.as_ref().filter(|z| !z.is_empty()) {
            return Ok(zone.is_some_and(|az| zones.iter().any(|z| z == az)));
        }
        match spec.resource_properties.availability_zone.as_deref() {
            Some(wanted) => Ok(zone == Some(wanted)),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::plain;

    #[test]
    fn matches_resource_zone() {
        let pool = plain("a@lvm");
        let mut props = FilterProperties::default();
        assert!(AvailabilityZoneFilter.passes(&pool, &props).unwrap());

        props.request_spec.resource_properties.availability_zone = Some("az1".to_string());
        assert!(AvailabilityZoneFilter.passes(&pool, &props).unwrap());

        props.request_spec.resource_properties.availability_zone = Some("az2".to_string());
        assert!(!AvailabilityZoneFilter.passes(&pool, &props).unwrap());
    }

    #[test]
    fn explicit_zone_list_wins() {
        let pool = plain("a@lvm");
        let mut props = FilterProperties::default();
        props.request_spec.resource_properties.availability_zone = Some("az2".to_string());
        props.request_spec.availability_zones = Some(vec!["az3".to_string(), "az1".to_string()]);
        assert!(AvailabilityZoneFilter.passes(&pool, &props).unwrap());

        props.request_spec.availability_zones = Some(vec!["az3".to_string()]);
        assert!(!AvailabilityZoneFilter.passes(&pool, &props).unwrap());
    }
}
