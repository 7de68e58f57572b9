// ── Device registry ──

use crate::error::CoreError;
use crate::model::Device;

/// Source of managed devices. Read-only to the core.
pub trait DeviceRegistry: Send + Sync {
    fn devices(&self) -> Vec<Device>;

    /// Look a device up by id, then name (case-insensitive), then address.
    fn resolve(&self, identifier: &str) -> Result<Device, CoreError> {
        let devices = self.devices();
        devices
            .iter()
            .find(|d| d.id == identifier)
            .or_else(|| {
                devices
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(identifier))
            })
            .or_else(|| devices.iter().find(|d| d.address == identifier))
            .cloned()
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: identifier.to_owned(),
            })
    }
}

/// Fixed device list, typically loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    devices: Vec<Device>,
}

impl StaticRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }
}

impl DeviceRegistry for StaticRegistry {
    fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceKind;
    use crate::testing::device;

    fn registry() -> StaticRegistry {
        let mut edge = device(DeviceKind::Mikrotik, "192.0.2.1");
        edge.id = "edge".into();
        edge.name = "Edge-Router".into();
        StaticRegistry::new(vec![edge, device(DeviceKind::Linux, "192.0.2.2")])
    }

    #[test]
    fn resolves_by_id_name_or_address() {
        let reg = registry();
        assert_eq!(reg.resolve("edge").unwrap().address, "192.0.2.1");
        assert_eq!(reg.resolve("edge-router").unwrap().address, "192.0.2.1");
        assert_eq!(reg.resolve("192.0.2.2").unwrap().kind, DeviceKind::Linux);
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        assert!(matches!(
            registry().resolve("core-sw"),
            Err(CoreError::DeviceNotFound { identifier }) if identifier == "core-sw"
        ));
    }
}
