use serde::{Deserialize, Serialize};

/// Privilege tiers, lowest first. Ordering is significant: a higher tier
/// satisfies every check a lower tier does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Traveller,
    Staff,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "TRAVELLER" | "CUSTOMER" => Some(Role::Traveller),
            "STAFF" => Some(Role::Staff),
            "ADMIN" => Some(Role::Admin),
            "SUPER_ADMIN" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

/// Whoever is driving an operation. Role assignment happens outside the
/// engine; the engine only checks tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn system() -> Self {
        Self::new("system", Role::SuperAdmin)
    }

    pub fn has_at_least(&self, role: Role) -> bool {
        self.role >= role
    }

    pub fn is_staff(&self) -> bool {
        self.has_at_least(Role::Staff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        let staff = Actor::new("s-1", Role::Staff);
        assert!(staff.is_staff());
        assert!(!staff.has_at_least(Role::Admin));
        assert!(Actor::new("root", Role::SuperAdmin).has_at_least(Role::Admin));
        assert!(!Actor::new("t-1", Role::Traveller).is_staff());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("super_admin"), Some(Role::SuperAdmin));
        assert_eq!(Role::parse("CUSTOMER"), Some(Role::Traveller));
        assert_eq!(Role::parse("pilot"), None);
    }
}
