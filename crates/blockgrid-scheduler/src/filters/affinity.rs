//! Same/different backend affinity driven by scheduler hints.
//!
//! The hint names existing volumes by UUID, as a single string or a list.
//! Anything that is not a UUID excludes the candidate. The site-aware
//! variant compares site identifiers (resolved by the host manager from a
//! pool capability) when both sides have one and falls back to backend
//! identity otherwise.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use blockgrid_state::{FilterProperties, HostLevel, extract_host};

use super::{Filter, FilterError};
use crate::backend_state::PoolState;
use crate::collab::VolumeLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityMode {
    Same,
    Different,
}

impl AffinityMode {
    pub fn hint_key(&self) -> &'static str {
        match self {
            AffinityMode::Same => "same_host",
            AffinityMode::Different => "different_host",
        }
    }
}

pub struct AffinityFilter {
    mode: AffinityMode,
    site_aware: bool,
    volumes: Option<Arc<dyn VolumeLookup>>,
}

impl AffinityFilter {
    pub fn new(mode: AffinityMode, site_aware: bool, volumes: Option<Arc<dyn VolumeLookup>>) -> Self {
        Self {
            mode,
            site_aware,
            volumes,
        }
    }

    fn colocated(&self, volume_host: &str, pool: &PoolState, props: &FilterProperties) -> bool {
        if self.site_aware {
            let sites = &props.resolved.pool_sites;
            let candidate = sites.get(&pool.id());
            let referenced = sites.get(volume_host).or_else(|| {
                extract_host(volume_host, HostLevel::Backend).and_then(|b| sites.get(&b))
            });
            if let (Some(candidate), Some(referenced)) = (candidate, referenced) {
                return candidate == referenced;
            }
        }

        let Some(backend) = extract_host(volume_host, HostLevel::Backend) else {
            return false;
        };
        [pool.backend.backend_id.as_str(), pool.backend.host.as_str()]
            .into_iter()
            .filter_map(|id| extract_host(id, HostLevel::Backend))
            .any(|id| id == backend)
    }
}

impl Filter for AffinityFilter {
    fn name(&self) -> &'static str {
        match (self.mode, self.site_aware) {
            (AffinityMode::Same, false) => "SameBackendFilter",
            (AffinityMode::Different, false) => "DifferentBackendFilter",
            (AffinityMode::Same, true) => "SameSiteFilter",
            (AffinityMode::Different, true) => "DifferentSiteFilter",
        }
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let hint = self.mode.hint_key();
        let Some(value) = props.scheduler_hint(hint) else {
            return Ok(true);
        };
        let ids = parse_hint(hint, value)?;
        if ids.is_empty() {
            return Ok(true);
        }
        let volumes = self
            .volumes
            .as_ref()
            .ok_or(FilterError::MissingDependency("volume lookup"))?;

        let mut colocated = false;
        for id in &ids {
            let Some(host) = volumes.volume_host(id).map_err(FilterError::Lookup)? else {
                continue;
            };
            if self.colocated(&host, pool, props) {
                colocated = true;
                break;
            }
        }

        Ok(match self.mode {
            AffinityMode::Same => colocated,
            AffinityMode::Different => !colocated,
        })
    }
}

/// A UUID string or a list of them.
fn parse_hint(hint: &'static str, value: &Value) -> Result<Vec<Uuid>, FilterError> {
    let malformed = || FilterError::MalformedHint {
        hint,
        value: value.to_string(),
    };
    let parse = |v: &Value| {
        v.as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(malformed)
    };
    match value {
        Value::Array(items) => items.iter().map(parse).collect(),
        single => parse(single).map(|id| vec![id]),
    }
}
