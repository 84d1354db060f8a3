//! Identity normalization, role derivation and secret verification.
//!
//! Roles are never stored: a principal's role is a pure function of its kind
//! and identifier, with the Administrator being the one reserved teacher id.

/// The reserved teacher identifier that carries Admin privileges.
pub const ADMIN_EMPLOYEE_ID: &str = "ADMIN001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    Teacher,
    Student,
}

impl PrincipalKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(PrincipalKind::Teacher),
            "student" => Some(PrincipalKind::Student),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            PrincipalKind::Teacher => "teachers",
            PrincipalKind::Student => "students",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            PrincipalKind::Teacher => "employee_id",
            PrincipalKind::Student => "roll_no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

/// Stored identifiers are upper-case; submitted ones are folded to match.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn role_for(kind: PrincipalKind, identifier: &str) -> Role {
    match kind {
        PrincipalKind::Teacher if identifier == ADMIN_EMPLOYEE_ID => Role::Admin,
        PrincipalKind::Teacher => Role::Teacher,
        PrincipalKind::Student => Role::Student,
    }
}

/// Credential check, pluggable so per-principal verification can replace the
/// legacy shared secrets without touching the resolver.
pub trait SecretVerifier {
    fn verify(&self, kind: PrincipalKind, identifier: &str, secret: &str) -> bool;
}

/// One fixed secret per role class. This mirrors the system being replaced
/// and exists for parity; it is not a credential scheme to keep.
pub struct SharedSecrets {
    pub staff: String,
    pub student: String,
}

impl Default for SharedSecrets {
    fn default() -> Self {
        SharedSecrets {
            staff: "admin123".to_string(),
            student: "pass123".to_string(),
        }
    }
}

impl SecretVerifier for SharedSecrets {
    fn verify(&self, kind: PrincipalKind, _identifier: &str, secret: &str) -> bool {
        match kind {
            PrincipalKind::Teacher => secret == self.staff,
            PrincipalKind::Student => secret == self.student,
        }
    }
}
