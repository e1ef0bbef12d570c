//! ACL spec entries and parsing
//!
//! An ACL spec is a comma-separated list of entries of the form
//! `[default:]user|group|mask|other:[name][:perms]`, for example
//! `user:alice:rwx,default:group::r-x`. Permissions are omitted in specs
//! used for removal.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which ACL an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclScope {
    /// Access ACL, applies to the entry itself
    Access,
    /// Default ACL, inherited by new children of a directory
    Default,
}

/// Principal type of an ACL entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclType {
    User,
    Group,
    Mask,
    Other,
}

impl AclType {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(AclType::User),
            "group" => Some(AclType::Group),
            "mask" => Some(AclType::Mask),
            "other" => Some(AclType::Other),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AclType::User => "user",
            AclType::Group => "group",
            AclType::Mask => "mask",
            AclType::Other => "other",
        }
    }
}

/// Read/write/execute permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission(u8);

impl Permission {
    /// Parse `rwx`-style or a single octal digit
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 1 {
            if let Some(d) = s.chars().next().and_then(|c| c.to_digit(8)) {
                return Some(Permission(d as u8));
            }
        }
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return None;
        }
        let mut bits = 0u8;
        for (c, (expected, bit)) in chars.iter().zip([('r', 4u8), ('w', 2), ('x', 1)]) {
            if *c == expected {
                bits |= bit;
            } else if *c != '-' {
                return None;
            }
        }
        Some(Permission(bits))
    }

    /// Raw bits (r=4, w=2, x=1)
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.0 & 4 != 0 { 'r' } else { '-' };
        let w = if self.0 & 2 != 0 { 'w' } else { '-' };
        let x = if self.0 & 1 != 0 { 'x' } else { '-' };
        write!(f, "{}{}{}", r, w, x)
    }
}

/// One entry of an ACL spec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclEntry {
    pub scope: AclScope,
    pub kind: AclType,
    /// User/group name; empty for the owning user/group, mask and other
    pub name: String,
    /// `None` in removal specs
    pub permission: Option<Permission>,
}

impl AclEntry {
    /// Whether two entries address the same principal (scope, type, name)
    pub fn same_principal(&self, other: &AclEntry) -> bool {
        self.scope == other.scope && self.kind == other.kind && self.name == other.name
    }

    /// Parse a single entry
    pub fn parse(entry: &str) -> Result<Self, String> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err("empty entry".into());
        }

        let mut parts: Vec<&str> = entry.split(':').collect();
        let scope = if parts[0].eq_ignore_ascii_case("default") {
            parts.remove(0);
            AclScope::Default
        } else {
            AclScope::Access
        };

        let kind = parts
            .first()
            .and_then(|t| AclType::parse(t))
            .ok_or_else(|| format!("unknown entry type in '{}'", entry))?;

        let (name, permission) = match parts.len() {
            1 => (String::new(), None),
            2 => (parts[1].to_string(), None),
            3 => {
                let perm = if parts[2].is_empty() {
                    None
                } else {
                    Some(
                        Permission::parse(parts[2])
                            .ok_or_else(|| format!("invalid permission '{}'", parts[2]))?,
                    )
                };
                (parts[1].to_string(), perm)
            }
            _ => return Err(format!("too many fields in '{}'", entry)),
        };

        if matches!(kind, AclType::Mask | AclType::Other) && !name.is_empty() {
            return Err(format!("{} entries cannot be named", kind.as_str()));
        }

        Ok(Self {
            scope,
            kind,
            name,
            permission,
        })
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope == AclScope::Default {
            write!(f, "default:")?;
        }
        write!(f, "{}:{}", self.kind.as_str(), self.name)?;
        if let Some(p) = self.permission {
            write!(f, ":{}", p)?;
        }
        Ok(())
    }
}

/// How an ACL spec is applied to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclMode {
    /// Merge entries into the existing ACL
    Modify,
    /// Replace the ACL
    Set,
    /// Remove matching entries
    Remove,
}

impl AclMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclMode::Modify => "modifyacl",
            AclMode::Set => "setacl",
            AclMode::Remove => "removeacl",
        }
    }
}

/// Parse a comma-separated ACL spec
pub fn parse_acl_spec(spec: &str) -> Result<Vec<AclEntry>, ConfigError> {
    let entries = spec
        .split(',')
        .filter(|e| !e.trim().is_empty())
        .map(AclEntry::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| ConfigError::InvalidAclSpec {
            spec: spec.to_string(),
            reason,
        })?;

    if entries.is_empty() {
        return Err(ConfigError::InvalidAclSpec {
            spec: spec.to_string(),
            reason: "no entries".into(),
        });
    }
    Ok(entries)
}

/// Render a spec back to its comma-separated form
pub fn format_acl_spec(entries: &[AclEntry]) -> String {
    entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Apply `spec` to `current` under `mode`, returning the resulting ACL
pub fn apply_acl_spec(current: &[AclEntry], spec: &[AclEntry], mode: AclMode) -> Vec<AclEntry> {
    match mode {
        AclMode::Set => spec.to_vec(),
        AclMode::Modify => {
            let mut result: Vec<AclEntry> = current
                .iter()
                .filter(|e| !spec.iter().any(|s| s.same_principal(e)))
                .cloned()
                .collect();
            result.extend(spec.iter().cloned());
            result
        }
        AclMode::Remove => current
            .iter()
            .filter(|e| !spec.iter().any(|s| s.same_principal(e)))
            .cloned()
            .collect(),
    }
}
