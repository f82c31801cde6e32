//! Advertisement and peripheral identity types.

/// Opaque identifier the radio stack assigns to a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create an identifier from its platform string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PeripheralId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single advertisement event delivered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// The advertising peripheral.
    pub id: PeripheralId,
    /// Local name carried in the advertisement payload.
    pub local_name: Option<String>,
    /// Device name cached by the host, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Create an advertisement carrying only a local name.
    pub fn named(id: impl Into<PeripheralId>, local_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            local_name: Some(local_name.into()),
            name: None,
            rssi: None,
        }
    }

    /// Check whether either advertised name equals `target` exactly.
    pub fn matches_name(&self, target: &str) -> bool {
        self.local_name.as_deref() == Some(target) || self.name.as_deref() == Some(target)
    }

    /// The name to show for this peripheral, preferring the host name.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.local_name.as_deref())
    }
}

/// A discovered lock that can be connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralHandle {
    /// Identifier used for all transport calls.
    pub id: PeripheralId,
    /// Advertised name at discovery time.
    pub name: Option<String>,
    /// Signal strength at discovery time.
    pub rssi: Option<i16>,
}

impl PeripheralHandle {
    /// Create a handle without signal information.
    pub fn new(id: PeripheralId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            rssi: None,
        }
    }

    /// Name if advertised, otherwise the identifier.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

impl From<&Advertisement> for PeripheralHandle {
    fn from(adv: &Advertisement) -> Self {
        Self {
            id: adv.id.clone(),
            name: adv.display_name().map(str::to_string),
            rssi: adv.rssi,
        }
    }
}
