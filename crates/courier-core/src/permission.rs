//! Authorization predicates.
//!
//! A [`Permission`] is plain data. Composition builds a tree and
//! [`Permission::allows`] is the only interpreter, so predicates can be
//! stored, displayed and replaced on live listeners.
//!
//! ```rust
//! use courier_core::{Actor, Permission};
//!
//! let rule = Permission::any_role(["mods"]).or(Permission::Administrator);
//!
//! assert!(rule.allows(&Actor::new("1", "a").with_role("mods")));
//! assert!(rule.allows(&Actor::new("2", "b").administrator()));
//! assert!(!rule.allows(&Actor::new("3", "c")));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::event::{Actor, RoleId};

/// A composable authorization predicate over an [`Actor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Permission {
    /// Everyone passes.
    #[default]
    Always,
    /// Actors with the administrator capability pass.
    Administrator,
    /// Actors holding at least one of the roles pass.
    AnyRole(BTreeSet<RoleId>),
    /// Either side passes.
    Or(Box<Permission>, Box<Permission>),
    /// Both sides pass.
    And(Box<Permission>, Box<Permission>),
}

impl Permission {
    /// Builds an [`AnyRole`](Permission::AnyRole) predicate.
    pub fn any_role<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleId>,
    {
        Self::AnyRole(roles.into_iter().map(Into::into).collect())
    }

    /// The predicate installed when a role is granted access to a component:
    /// holders of `role` or administrators.
    pub fn role_override(role: impl Into<RoleId>) -> Self {
        Self::any_role([role.into()]).or(Self::Administrator)
    }

    pub fn or(self, other: Permission) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn and(self, other: Permission) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Evaluates the predicate against an actor.
    pub fn allows(&self, actor: &Actor) -> bool {
        match self {
            Self::Always => true,
            Self::Administrator => actor.administrator,
            Self::AnyRole(roles) => roles.iter().any(|r| actor.roles.contains(r)),
            Self::Or(a, b) => a.allows(actor) || b.allows(actor),
            Self::And(a, b) => a.allows(actor) && b.allows(actor),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("everyone"),
            Self::Administrator => f.write_str("administrators"),
            Self::AnyRole(roles) => {
                let list: Vec<String> = roles.iter().map(|r| format!("<@&{r}>")).collect();
                write!(f, "any of {}", list.join(", "))
            }
            Self::Or(a, b) => write!(f, "{a} or {b}"),
            Self::And(a, b) => write!(f, "({a} and {b})"),
        }
    }
}
