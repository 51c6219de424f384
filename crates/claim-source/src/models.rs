//! Claim model types
//!
//! A `Claim` is the decoded, immutable view of a PersistentVolumeClaim that the
//! controller caches. Raw objects stay raw until the controller classifies them,
//! so a malformed object surfaces as a decode failure at the point of use.

use crate::error::ClaimSourceError;
use crate::quantity::Quantity;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Resource name aggregated by the controller
pub const STORAGE_RESOURCE: &str = "storage";

/// Stable identity of a claim: namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId {
    namespace: String,
    name: String,
}

impl ClaimId {
    /// Creates a claim identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Extracts the identity of a raw object, if it has a name.
    ///
    /// Objects without a namespace get the empty namespace.
    #[must_use]
    pub fn of(pvc: &PersistentVolumeClaim) -> Option<Self> {
        let name = pvc.metadata.name.as_deref()?;
        let namespace = pvc.metadata.namespace.as_deref().unwrap_or_default();
        Some(Self::new(namespace, name))
    }

    /// Namespace of the claim
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the claim
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Claim binding phase as reported in `status.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClaimPhase {
    /// Not yet bound
    Pending,

    /// Bound to a volume
    Bound,

    /// Bound volume is gone
    Lost,

    /// Missing or unrecognized phase
    #[default]
    Unknown,
}

impl ClaimPhase {
    /// Maps a raw `status.phase` value.
    #[must_use]
    pub fn from_status(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Bound") => Self::Bound,
            Some("Lost") => Self::Lost,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Pending => "Pending",
            Self::Bound => "Bound",
            Self::Lost => "Lost",
            Self::Unknown => "Unknown",
        };
        f.pad(phase)
    }
}

/// Decoded claim as held by the controller's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Stable identity
    pub id: ClaimId,

    /// Requested storage (`spec.resources.requests.storage`)
    pub requested: Quantity,

    /// Binding phase
    pub phase: ClaimPhase,

    /// Opaque version token used for duplicate suppression
    pub resource_version: String,

    /// Capacity reported in status once bound (diagnostics only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
}

impl Claim {
    /// Creates a claim with an unknown phase and no reported capacity.
    pub fn new(id: ClaimId, requested: Quantity, resource_version: impl Into<String>) -> Self {
        Self {
            id,
            requested,
            phase: ClaimPhase::Unknown,
            resource_version: resource_version.into(),
            capacity: None,
        }
    }

    /// Sets the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: ClaimPhase) -> Self {
        self.phase = phase;
        self
    }
}

fn decode_storage(
    id: &ClaimId,
    field: &str,
    raw: Option<&k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
) -> Result<Option<Quantity>, ClaimSourceError> {
    raw.map(|quantity| quantity.0.parse::<Quantity>())
        .transpose()
        .map_err(|e| ClaimSourceError::Decode(format!("{id} has invalid {field}: {e}")))
}

impl TryFrom<&PersistentVolumeClaim> for Claim {
    type Error = ClaimSourceError;

    fn try_from(pvc: &PersistentVolumeClaim) -> Result<Self, Self::Error> {
        let id = ClaimId::of(pvc).ok_or_else(|| {
            ClaimSourceError::Decode("PersistentVolumeClaim missing name".to_string())
        })?;
        let resource_version = pvc.metadata.resource_version.clone().ok_or_else(|| {
            ClaimSourceError::Decode(format!("{id} missing resourceVersion"))
        })?;

        let requested = decode_storage(
            &id,
            "storage request",
            pvc.spec
                .as_ref()
                .and_then(|spec| spec.resources.as_ref())
                .and_then(|resources| resources.requests.as_ref())
                .and_then(|requests| requests.get(STORAGE_RESOURCE)),
        )?
        .unwrap_or(Quantity::ZERO);

        let status = pvc.status.as_ref();
        // Capacity is diagnostic; a bad value must not drop the claim
        let capacity = decode_storage(
            &id,
            "storage capacity",
            status
                .and_then(|status| status.capacity.as_ref())
                .and_then(|capacity| capacity.get(STORAGE_RESOURCE)),
        )
        .unwrap_or_else(|e| {
            warn!("Ignoring capacity: {}", e);
            None
        });

        Ok(Self {
            id,
            requested,
            phase: ClaimPhase::from_status(status.and_then(|status| status.phase.as_deref())),
            resource_version,
            capacity,
        })
    }
}

/// Scope of the claims to list and watch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSelector {
    /// Namespace filter (`None` = all namespaces)
    pub namespace: Option<String>,

    /// Label selector
    pub label_selector: Option<String>,

    /// Field selector
    pub field_selector: Option<String>,
}

impl ClaimSelector {
    /// Selects every claim in every namespace.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Selects claims in one namespace.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Adds a label selector.
    #[must_use]
    pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Adds a field selector.
    #[must_use]
    pub fn with_fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into()).filter(|s: &String| !s.is_empty());
        self
    }
}

impl fmt::Display for ClaimSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "namespace={} labels={} fields={}",
            self.namespace.as_deref().unwrap_or("<all>"),
            self.label_selector.as_deref().unwrap_or("<none>"),
            self.field_selector.as_deref().unwrap_or("<none>"),
        )
    }
}

/// Notification delivered by the claim feed.
#[derive(Debug, Clone)]
pub enum ClaimEvent {
    /// Object delivered by a (re)list
    Added(PersistentVolumeClaim),

    /// Object created or changed
    Modified(PersistentVolumeClaim),

    /// Object deleted (last known state)
    Deleted(PersistentVolumeClaim),

    /// Transport-level error reported in-band; the feed continues
    Error(String),

    /// The watcher started a full relist
    RelistStarted,

    /// The relist finished; objects not seen since `RelistStarted` are gone
    RelistDone,
}
