use crate::error::{Error, Result};

/// A dotted `group.project.name` identifier split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemId {
    pub id: String,
    pub group: String,
    pub project: String,
    pub name: String,
}

impl ItemId {
    /// # Errors
    ///
    /// Returns `Error::InvalidId` unless `id` has exactly three dot-separated parts
    pub fn parse(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        match parts.as_slice() {
            [group, project, name] => Ok(Self {
                id: id.to_string(),
                group: (*group).to_string(),
                project: (*project).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(Error::InvalidId(id.to_string())),
        }
    }
}

/// Partition key for the registries: `id[:token][:gray]`.
///
/// Credential and channel are part of the key, so the same item read with two
/// tokens, or from both channels, is cached and watched twice.
#[must_use]
pub fn partition_key(id: &str, token: &str, gray: bool) -> String {
    let mut key = String::with_capacity(id.len() + token.len() + 6);
    key.push_str(id);
    if !token.is_empty() {
        key.push(':');
        key.push_str(token);
    }
    if gray {
        key.push_str(":gray");
    }
    key
}
