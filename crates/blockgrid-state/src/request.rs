//! Request-scoped placement input handed to filters and weighers.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of operation the placement is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    CreateVolume,
    ExtendVolume,
    MigrateVolume,
    RetypeVolume,
    ManageExisting,
}

/// Properties of the resource being placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Requested size in GiB.
    #[serde(default)]
    pub size: u64,
    /// Target size for `extend_volume`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// `attached`, `detached`, ...; unset means never attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type_id: Option<String>,
    /// Anything else the caller sent along.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceProperties {
    pub fn is_detached(&self) -> bool {
        self.attach_status
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case("detached"))
    }
}

/// The request as the scheduler driver received it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub resource_properties: ResourceProperties,
    #[serde(default)]
    pub scheduler_hints: Map<String, Value>,
    #[serde(default)]
    pub operation: Operation,
    /// Explicit set of acceptable availability zones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zones: Option<Vec<String>>,
}

/// Volume type attached to the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeType {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extra_specs: BTreeMap<String, String>,
}

/// Backends already tried for this request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryInfo {
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default)]
    pub num_attempts: u32,
}

/// Caller's security context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Lookups resolved by the host manager before the filters run.
///
/// Never deserialized from a request; always filled in server-side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedLookups {
    /// Shard tags of the requesting project. `None` when they could not be
    /// resolved.
    pub project_shards: Option<Vec<String>>,
    /// Site identifier keyed by pool id (`host@backend#pool`).
    pub pool_sites: HashMap<String, String>,
}

/// Everything a filter or weigher may look at for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterProperties {
    #[serde(default)]
    pub request_spec: RequestSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<VolumeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos_specs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(skip)]
    pub resolved: ResolvedLookups,
}

impl FilterProperties {
    /// Size the request needs to find room for, in GiB.
    ///
    /// For an extend this is the growth, not the final size.
    pub fn requested_size(&self) -> u64 {
        let props = &self.request_spec.resource_properties;
        match (self.request_spec.operation, props.new_size) {
            (Operation::ExtendVolume, Some(new_size)) => new_size.saturating_sub(props.size),
            _ => props.size,
        }
    }

    pub fn extra_specs(&self) -> Option<&BTreeMap<String, String>> {
        self.volume_type.as_ref().map(|vt| &vt.extra_specs)
    }

    pub fn scheduler_hint(&self, key: &str) -> Option<&Value> {
        self.request_spec.scheduler_hints.get(key)
    }

    /// Record a backend as attempted for this request.
    pub fn record_attempt(&mut self, backend_id: &str) {
        let retry = self.retry.get_or_insert_with(RetryInfo::default);
        retry.num_attempts += 1;
        retry.backends.push(backend_id.to_string());
    }
}
