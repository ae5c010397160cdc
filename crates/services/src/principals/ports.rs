use crate::limits::LimitError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        UserId(uuid)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DomainId(pub Uuid);

impl From<Uuid> for DomainId {
    fn from(uuid: Uuid) -> Self {
        DomainId(uuid)
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two kinds of entity a limit can be attached to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Domain,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Domain => "domain",
        }
    }
}

impl FromStr for PrincipalKind {
    type Err = LimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(PrincipalKind::User),
            "domain" => Ok(PrincipalKind::Domain),
            other => Err(LimitError::UnknownPrincipalKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-owning reference to a principal, used as the limit record owner key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PrincipalRef {
    pub kind: PrincipalKind,
    pub id: Uuid,
}

impl PrincipalRef {
    pub fn user(id: UserId) -> Self {
        Self {
            kind: PrincipalKind::User,
            id: id.0,
        }
    }

    pub fn domain(id: DomainId) -> Self {
        Self {
            kind: PrincipalKind::Domain,
            id: id.0,
        }
    }
}

impl std::fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Administrative role of an account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UserRole {
    SuperAdmins,
    Resellers,
    DomainAdmins,
    SimpleUsers,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmins => "SuperAdmins",
            UserRole::Resellers => "Resellers",
            UserRole::DomainAdmins => "DomainAdmins",
            UserRole::SimpleUsers => "SimpleUsers",
        }
    }

    /// Roles whose resource usage is shown on the account dashboard
    pub fn has_resource_dashboard(&self) -> bool {
        matches!(self, UserRole::DomainAdmins | UserRole::Resellers)
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SuperAdmins" => Ok(UserRole::SuperAdmins),
            "Resellers" => Ok(UserRole::Resellers),
            "DomainAdmins" => Ok(UserRole::DomainAdmins),
            "SimpleUsers" => Ok(UserRole::SimpleUsers),
            other => Err(anyhow::anyhow!("Unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: UserRole,
}

impl User {
    /// Superusers are exempt from every limit
    pub fn is_unrestricted(&self) -> bool {
        self.role == UserRole::SuperAdmins
    }

    pub fn principal_ref(&self) -> PrincipalRef {
        PrincipalRef::user(self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
}

impl Domain {
    pub fn principal_ref(&self) -> PrincipalRef {
        PrincipalRef::domain(self.id)
    }
}

/// An entity that owns resources and is subject to limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    User(User),
    Domain(Domain),
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User(_) => PrincipalKind::User,
            Principal::Domain(_) => PrincipalKind::Domain,
        }
    }

    pub fn principal_ref(&self) -> PrincipalRef {
        match self {
            Principal::User(user) => user.principal_ref(),
            Principal::Domain(domain) => domain.principal_ref(),
        }
    }

    /// Only users can be unrestricted
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Principal::User(user) => user.is_unrestricted(),
            Principal::Domain(_) => false,
        }
    }
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Principal::User(user)
    }
}

impl From<Domain> for Principal {
    fn from(domain: Domain) -> Self {
        Principal::Domain(domain)
    }
}

/// Polymorphic view of anything limits can be checked against
///
/// The kind is reported by name so that callers holding a foreign entity
/// fail loudly instead of being silently allowed.
pub trait LimitedPrincipal: Send + Sync {
    fn principal_kind(&self) -> &str;

    fn principal_id(&self) -> Uuid;

    fn is_unrestricted(&self) -> bool {
        false
    }
}

impl LimitedPrincipal for User {
    fn principal_kind(&self) -> &str {
        PrincipalKind::User.as_str()
    }

    fn principal_id(&self) -> Uuid {
        self.id.0
    }

    fn is_unrestricted(&self) -> bool {
        User::is_unrestricted(self)
    }
}

impl LimitedPrincipal for Domain {
    fn principal_kind(&self) -> &str {
        PrincipalKind::Domain.as_str()
    }

    fn principal_id(&self) -> Uuid {
        self.id.0
    }
}

impl LimitedPrincipal for Principal {
    fn principal_kind(&self) -> &str {
        self.kind().as_str()
    }

    fn principal_id(&self) -> Uuid {
        self.principal_ref().id
    }

    fn is_unrestricted(&self) -> bool {
        Principal::is_unrestricted(self)
    }
}
