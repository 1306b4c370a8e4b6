//! User profile and role model.
//!
//! The server sends role codes as plain strings (`"ADMIN"`, `"STAFF_SALES"`, ...).
//! Known codes map onto `Role` variants; anything else is kept verbatim so a newer
//! server never breaks deserialization of a stored session.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A role code granted to a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Customer,
    StaffProduct,
    StaffSales,
    Other(String),
}

impl Role {
    /// The wire code for this role.
    pub fn code(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Customer => "CUSTOMER",
            Role::StaffProduct => "STAFF_PRODUCT",
            Role::StaffSales => "STAFF_SALES",
            Role::Other(code) => code,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::StaffProduct | Role::StaffSales)
    }
}

impl From<String> for Role {
    fn from(code: String) -> Self {
        match code.as_str() {
            "ADMIN" => Role::Admin,
            "CUSTOMER" => Role::Customer,
            "STAFF_PRODUCT" => Role::StaffProduct,
            "STAFF_SALES" => Role::StaffSales,
            _ => Role::Other(code),
        }
    }
}

impl From<&str> for Role {
    fn from(code: &str) -> Self {
        Role::from(code.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.code().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Snapshot of the logged-in user, taken when a credential is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Login identity (the account email).
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "Array<string>"))]
    pub roles: BTreeSet<Role>,
}

impl Profile {
    pub fn new(email: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id: None,
            email: email.into(),
            full_name: None,
            phone: None,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(&Role::Admin)
    }

    pub fn is_customer(&self) -> bool {
        self.has_role(&Role::Customer)
    }

    /// Either of the staff roles.
    pub fn is_staff(&self) -> bool {
        self.roles.iter().any(Role::is_staff)
    }

    pub fn is_staff_product(&self) -> bool {
        self.has_role(&Role::StaffProduct)
    }

    pub fn is_staff_sales(&self) -> bool {
        self.has_role(&Role::StaffSales)
    }

    /// Human-readable label for the most privileged role held.
    pub fn role_display(&self) -> &'static str {
        if self.is_admin() {
            "Administrator"
        } else if self.is_staff_product() {
            "Product staff"
        } else if self.is_staff_sales() {
            "Sales staff"
        } else if self.is_customer() {
            "Customer"
        } else {
            "User"
        }
    }

    /// Name to show in greetings, falling back to the email.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes_roundtrip_through_json() {
        let json = r#"{"id":7,"email":"a@b.vn","fullName":"An","roles":["ADMIN","WAREHOUSE"]}"#;
        let profile: Profile = serde_json::from_str(json).expect("profile json");

        assert_eq!(profile.id, Some(7));
        assert!(profile.is_admin());
        assert!(profile.has_role(&Role::Other("WAREHOUSE".into())));

        let back = serde_json::to_value(&profile).expect("serialize");
        let roles = back["roles"].as_array().expect("roles array");
        assert!(roles.iter().any(|r| r == "WAREHOUSE"));
        assert!(roles.iter().any(|r| r == "ADMIN"));
    }

    #[test]
    fn test_missing_roles_default_to_empty() {
        let profile: Profile = serde_json::from_str(r#"{"email":"x@y.z"}"#).expect("profile");
        assert!(profile.roles.is_empty());
        assert_eq!(profile.role_display(), "User");
    }

    #[test]
    fn test_role_queries() {
        let staff = Profile::new("s@shop.vn", [Role::StaffSales]);
        assert!(staff.is_staff());
        assert!(staff.is_staff_sales());
        assert!(!staff.is_staff_product());
        assert!(!staff.is_admin());
        assert_eq!(staff.role_display(), "Sales staff");

        let admin = Profile::new("root@shop.vn", [Role::Customer, Role::Admin]);
        assert_eq!(admin.role_display(), "Administrator");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut profile = Profile::new("c@shop.vn", [Role::Customer]);
        assert_eq!(profile.display_name(), "c@shop.vn");
        profile.full_name = Some("Chi".into());
        assert_eq!(profile.display_name(), "Chi");
    }
}
