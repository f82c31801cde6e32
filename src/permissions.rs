//! Host permission gate.
//!
//! Scanning is only started after the host grants the capabilities BLE
//! needs. How those are requested is platform business; the engine only
//! sees the verdict.

use async_trait::async_trait;

/// Capability check run before every scan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Ask the host for BLE scan/connect capabilities.
    async fn request_permissions(&self) -> bool;
}

/// Gate for hosts without a runtime permission prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn request_permissions(&self) -> bool {
        true
    }
}

/// Gate with a fixed verdict.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn request_permissions(&self) -> bool {
        self.0
    }
}
