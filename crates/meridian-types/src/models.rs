use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored or submitted string that names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a fieldless enum whose variants round-trip through a fixed
/// snake_case string, both in serde and in SQLite TEXT columns.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    pub enum Role ("role") {
        Company => "company",
        Investor => "investor",
        Staff => "staff",
        Admin => "admin",
    }
}

string_enum! {
    /// Disclosure tier of the data room, ordered from least to most revealing.
    #[derive(PartialOrd, Ord)]
    pub enum AccessLevel ("access level") {
        None => "none",
        Overview => "overview",
        Nda => "nda",
        FullDd => "full_dd",
    }
}

impl AccessLevel {
    pub fn rank(self) -> u8 {
        match self {
            AccessLevel::None => 0,
            AccessLevel::Overview => 1,
            AccessLevel::Nda => 2,
            AccessLevel::FullDd => 3,
        }
    }

    /// Tiers at or above `nda` may only be held after an NDA signature.
    pub fn requires_nda(self) -> bool {
        self >= AccessLevel::Nda
    }

    /// Lenient parse for stored levels: anything unrecognised ranks as `none`.
    pub fn parse_or_none(s: &str) -> Self {
        s.parse().unwrap_or(AccessLevel::None)
    }
}

string_enum! {
    pub enum CompanyStatus ("company status") {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Engage => "engage",
    }
}

impl CompanyStatus {
    pub fn is_listed(self) -> bool {
        matches!(self, CompanyStatus::Approved | CompanyStatus::Engage)
    }
}

string_enum! {
    pub enum Visibility ("visibility") {
        Private => "private",
        Investors => "investors",
        Whitelist => "whitelist",
    }
}

string_enum! {
    pub enum PermissionType ("permission type") {
        View => "view",
        Review => "review",
        Full => "full",
    }
}

impl PermissionType {
    pub fn access_level(self) -> AccessLevel {
        match self {
            PermissionType::View => AccessLevel::Overview,
            PermissionType::Review => AccessLevel::Nda,
            PermissionType::Full => AccessLevel::FullDd,
        }
    }
}

string_enum! {
    pub enum GrantStatus ("grant status") {
        Active => "active",
        Suspended => "suspended",
        Revoked => "revoked",
    }
}

string_enum! {
    /// Which resolver rule produced an effective tier.
    pub enum AccessSource ("access source") {
        Owner => "owner",
        Admin => "admin",
        Creator => "creator",
        DataRoomGrant => "data_room_grant",
        CompanyPermission => "company_permission",
        PublicListing => "public_listing",
        None => "none",
    }
}

string_enum! {
    pub enum PointKind ("point kind") {
        Referral => "referral",
        Referred => "referred",
        Task => "task",
        Bonus => "bonus",
        BandwidthSharing => "bandwidth_sharing",
        Adjustment => "adjustment",
    }
}

string_enum! {
    pub enum ReferralStatus ("referral status") {
        NoReferral => "no_referral",
        InvalidCode => "invalid_code",
        SelfReferral => "self_referral",
        AlreadyReferred => "already_referred",
        Capped => "capped",
        Completed => "completed",
    }
}

string_enum! {
    pub enum FolderType ("folder type") {
        Financial => "financial",
        Legal => "legal",
        Ip => "ip",
        Equity => "equity",
        Team => "team",
        Other => "other",
    }
}

impl FolderType {
    pub fn display_name(self) -> &'static str {
        match self {
            FolderType::Financial => "Financials",
            FolderType::Legal => "Legal",
            FolderType::Ip => "Intellectual Property",
            FolderType::Equity => "Equity Structure",
            FolderType::Team => "Team",
            FolderType::Other => "Other",
        }
    }

    pub fn sort_order(self) -> i64 {
        match self {
            FolderType::Financial => 1,
            FolderType::Legal => 2,
            FolderType::Ip => 3,
            FolderType::Equity => 4,
            FolderType::Team => 5,
            FolderType::Other => 6,
        }
    }
}

string_enum! {
    pub enum ViewAction ("view action") {
        ViewFolder => "view_folder",
        DownloadFile => "download_file",
    }
}

string_enum! {
    pub enum StorageType ("storage type") {
        Stored => "stored",
        ExternalLink => "external_link",
    }
}

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the token issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}
