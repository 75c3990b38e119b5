use crate::error::FieldStoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Access levels, stored in a record's `role` column by their one-letter code.
///
/// `X` is the elevated level: it sees and may change every tenant's records.
/// All other levels only reach records whose owner identity is their own,
/// and are subject to the per-owner record quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    A,
    B,
    C,
    X,
}

impl Role {
    pub const ELEVATED: Role = Role::X;

    pub fn as_str(self) -> &'static str {
        match self {
            Role::A => "a",
            Role::B => "b",
            Role::C => "c",
            Role::X => "x",
        }
    }

    pub fn is_elevated(self) -> bool {
        self == Self::ELEVATED
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FieldStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(Role::A),
            "b" => Ok(Role::B),
            "c" => Ok(Role::C),
            "x" => Ok(Role::X),
            other => Err(FieldStoreError::Validation(format!(
                "unknown access level '{other}'"
            ))),
        }
    }
}

/// An already-authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
    pub tenant_label: String,
}

impl Principal {
    pub fn new(identity: impl Into<String>, role: Role, tenant_label: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role,
            tenant_label: tenant_label.into(),
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    /// Elevated principals may act on any record; everyone else only on
    /// records they own.
    pub fn may_modify(&self, owner_identity: &str) -> bool {
        self.is_elevated() || self.identity == owner_identity
    }
}

#[cfg(test)]
mod tests {
    use super::{Principal, Role};

    #[test]
    fn role_codes_round_trip() {
        for role in [Role::A, Role::B, Role::C, Role::X] {
            assert_eq!(role.as_str().parse::<Role>().expect("parse"), role);
        }
        assert!("z".parse::<Role>().is_err());
        assert!("X".parse::<Role>().is_err());
    }

    #[test]
    fn only_x_is_elevated() {
        assert!(Role::X.is_elevated());
        assert!(!Role::A.is_elevated());
        let hq = Principal::new("hq@example.org", Role::X, "Headquarters");
        let unit = Principal::new("unit@example.org", Role::B, "Madurai");
        assert!(hq.may_modify("unit@example.org"));
        assert!(unit.may_modify("unit@example.org"));
        assert!(!unit.may_modify("other@example.org"));
    }
}
