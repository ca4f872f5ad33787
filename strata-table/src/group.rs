use strata_error::{StrataResult, strata_bail};

use crate::config::DefaultsConfig;

/// Hardware that element groups belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    pub name: String,
    pub description: String,
}

/// A named group of elements, e.g. one probe or shank.
///
/// Elements refer to their group by name, groups refer to their device by name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub name: String,
    pub description: String,
    pub location: String,
    pub device: String,
}

impl Group {
    /// A group filled in from the defaults.
    pub fn from_defaults(name: impl Into<String>, defaults: &DefaultsConfig) -> Self {
        Self {
            name: name.into(),
            description: defaults.group_description.clone(),
            location: defaults.location.clone(),
            device: defaults.device_name.clone(),
        }
    }
}

/// Registry of devices and groups. Registration is idempotent and never overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupCatalog {
    devices: Vec<Device>,
    groups: Vec<Group>,
}

impl GroupCatalog {
    /// Register a device, returning whether it was new.
    pub fn add_device(&mut self, device: Device) -> bool {
        if let Some(existing) = self.device(&device.name) {
            if existing != &device {
                log::debug!("device {} already registered, keeping the first", device.name);
            }
            return false;
        }
        self.devices.push(device);
        true
    }

    /// Register a group on an already registered device, returning whether it was new.
    pub fn add_group(&mut self, group: Group) -> StrataResult<bool> {
        if self.device(&group.device).is_none() {
            strata_bail!(
                "group {} refers to unknown device {}",
                group.name,
                group.device
            );
        }
        if let Some(existing) = self.group(&group.name) {
            if existing != &group {
                log::debug!("group {} already registered, keeping the first", group.name);
            }
            return Ok(false);
        }
        self.groups.push(group);
        Ok(true)
    }

    /// Make sure a group exists, registering it and the default device from `defaults` if not.
    pub fn ensure_group(&mut self, name: &str, defaults: &DefaultsConfig) -> StrataResult<bool> {
        if self.group(name).is_some() {
            return Ok(false);
        }
        self.add_device(Device {
            name: defaults.device_name.clone(),
            description: defaults.device_description.clone(),
        });
        self.add_group(Group::from_defaults(name, defaults))
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_group_is_idempotent() {
        let defaults = DefaultsConfig::default();
        let mut catalog = GroupCatalog::default();
        assert!(catalog.ensure_group("shank0", &defaults).unwrap());
        assert!(!catalog.ensure_group("shank0", &defaults).unwrap());
        assert_eq!(catalog.groups().len(), 1);
        assert_eq!(catalog.devices().len(), 1);
        assert_eq!(catalog.group("shank0").unwrap().location, "unknown");
    }

    #[test]
    fn first_registration_wins() {
        let mut catalog = GroupCatalog::default();
        catalog.add_device(Device {
            name: "probe".to_string(),
            description: "first".to_string(),
        });
        assert!(!catalog.add_device(Device {
            name: "probe".to_string(),
            description: "second".to_string(),
        }));
        assert_eq!(catalog.device("probe").unwrap().description, "first");
    }

    #[test]
    fn groups_need_a_device() {
        let mut catalog = GroupCatalog::default();
        let group = Group::from_defaults("g", &DefaultsConfig::default());
        assert!(catalog.add_group(group).is_err());
    }
}
