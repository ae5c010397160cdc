//! Static catalog of the resource types each principal kind is limited on.

use super::ports::CountableEntity;
use crate::principals::PrincipalKind;

/// Definition of one limited resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitTemplate {
    pub name: &'static str,
    pub entity_type: CountableEntity,
    /// Global parameter (namespace `limits`) seeding the maximum of new records
    pub default_parameter_key: &'static str,
}

const USER_TEMPLATES: &[LimitTemplate] = &[
    LimitTemplate {
        name: "domains",
        entity_type: CountableEntity::Domain,
        default_parameter_key: "deflt_user_domains_limit",
    },
    LimitTemplate {
        name: "domain_aliases",
        entity_type: CountableEntity::DomainAlias,
        default_parameter_key: "deflt_user_domain_aliases_limit",
    },
    LimitTemplate {
        name: "mailboxes",
        entity_type: CountableEntity::Mailbox,
        default_parameter_key: "deflt_user_mailboxes_limit",
    },
    LimitTemplate {
        name: "mailbox_aliases",
        entity_type: CountableEntity::MailboxAlias,
        default_parameter_key: "deflt_user_mailbox_aliases_limit",
    },
    LimitTemplate {
        name: "domain_admins",
        entity_type: CountableEntity::Account,
        default_parameter_key: "deflt_user_domain_admins_limit",
    },
];

const DOMAIN_TEMPLATES: &[LimitTemplate] = &[
    LimitTemplate {
        name: "domain_admins",
        entity_type: CountableEntity::Account,
        default_parameter_key: "deflt_domain_domain_admins_limit",
    },
    LimitTemplate {
        name: "domain_aliases",
        entity_type: CountableEntity::DomainAlias,
        default_parameter_key: "deflt_domain_domain_aliases_limit",
    },
    LimitTemplate {
        name: "mailboxes",
        entity_type: CountableEntity::Mailbox,
        default_parameter_key: "deflt_domain_mailboxes_limit",
    },
    LimitTemplate {
        name: "mailbox_aliases",
        entity_type: CountableEntity::MailboxAlias,
        default_parameter_key: "deflt_domain_mailbox_aliases_limit",
    },
];

/// Every resource type that must have a record for a principal of `kind`, in order
pub fn resource_types_for(kind: PrincipalKind) -> &'static [LimitTemplate] {
    match kind {
        PrincipalKind::User => USER_TEMPLATES,
        PrincipalKind::Domain => DOMAIN_TEMPLATES,
    }
}

pub fn template_for(kind: PrincipalKind, name: &str) -> Option<&'static LimitTemplate> {
    resource_types_for(kind).iter().find(|t| t.name == name)
}
