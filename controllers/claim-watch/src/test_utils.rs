//! Test utilities for unit testing the controller
//!
//! This module provides helpers for creating claims and raw claim objects.

#[cfg(test)]
use claim_source::{Claim, ClaimId, ClaimPhase, Quantity};
#[cfg(test)]
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimStatus,
    VolumeResourceRequirements,
};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as RawQuantity;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::collections::BTreeMap;

/// Namespace used by the helpers
#[cfg(test)]
pub const TEST_NAMESPACE: &str = "default";

/// Helper to create a decoded, bound claim in the test namespace
///
/// Equal to what `create_test_pvc_bytes` decodes to.
#[cfg(test)]
pub fn claim(name: &str, bytes: u64, resource_version: &str) -> Claim {
    Claim::new(
        ClaimId::new(TEST_NAMESPACE, name),
        Quantity::from_bytes(u128::from(bytes)),
        resource_version,
    )
    .with_phase(ClaimPhase::Bound)
}

/// Helper to create a raw PersistentVolumeClaim in the test namespace
#[cfg(test)]
pub fn create_test_pvc(name: &str, storage: &str, resource_version: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    RawQuantity(storage.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some("Bound".to_string()),
            ..Default::default()
        }),
    }
}

/// Helper to create a raw PersistentVolumeClaim whose storage request is a
/// plain byte count
#[cfg(test)]
pub fn create_test_pvc_bytes(
    name: &str,
    bytes: u64,
    resource_version: &str,
) -> PersistentVolumeClaim {
    create_test_pvc(name, &bytes.to_string(), resource_version)
}

/// Helper to create a raw object that cannot be decoded (malformed quantity)
#[cfg(test)]
pub fn create_malformed_pvc(name: &str) -> PersistentVolumeClaim {
    create_test_pvc(name, "not-a-quantity", "1")
}

/// Identity of a claim in the test namespace
#[cfg(test)]
pub fn id(name: &str) -> ClaimId {
    ClaimId::new(TEST_NAMESPACE, name)
}
