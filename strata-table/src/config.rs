#[cfg(feature = "serde")]
use strata_error::StrataResult;

/// Fallback metadata used when a source leaves a field out.
///
/// Passed to each table at construction; there is no process-wide default.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DefaultsConfig {
    /// Group of elements that do not name one.
    pub group_name: String,
    pub group_description: String,
    /// Location of elements and groups that do not name one.
    pub location: String,
    /// Device that auto-registered groups are attached to.
    pub device_name: String,
    pub device_description: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            group_name: "ElementGroup".to_string(),
            group_description: "no description".to_string(),
            location: "unknown".to_string(),
            device_name: "Device".to_string(),
            device_description: "no description".to_string(),
        }
    }
}

impl DefaultsConfig {
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> StrataResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
