//! Domain services: the data-room access resolver, the points ledger and the
//! referral programme. Every operation takes the acting user explicitly.

pub mod access;
pub mod dataroom;
pub mod error;
pub mod ledger;
pub mod referral;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::AccessResolver;
pub use dataroom::{ClientInfo, DataRoom};
pub use error::{Error, Result};
pub use ledger::{Award, Ledger};
pub use referral::{ReferralPolicy, ReferralService};

use meridian_types::models::{Claims, Role};
use uuid::Uuid;

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

impl From<&Claims> for Principal {
    fn from(claims: &Claims) -> Self {
        Self::new(claims.sub, claims.role)
    }
}
