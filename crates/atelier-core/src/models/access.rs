//! Role-based access decisions for the back-office areas.

use super::Profile;

/// Landing page for anonymous visitors.
pub const LOGIN_ROUTE: &str = "/login";

/// Landing page for administrators and staff.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Landing page for everyone else.
pub const HOME_ROUTE: &str = "/";

/// Back-office areas guarded by role checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessArea {
    /// The admin console as a whole (admins and any staff).
    Console,
    Products,
    Categories,
    Brands,
    Orders,
    Coupons,
    Users,
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    /// No session; send the user to the login page.
    LoginRequired,
    /// Logged in but lacking the role; `fallback` is where to send them.
    Forbidden { fallback: &'static str },
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allowed)
    }
}

impl AccessArea {
    fn permits(&self, profile: &Profile) -> bool {
        match self {
            AccessArea::Console => profile.is_admin() || profile.is_staff(),
            AccessArea::Products | AccessArea::Categories | AccessArea::Brands => {
                profile.is_admin() || profile.is_staff_product()
            }
            AccessArea::Orders | AccessArea::Coupons => {
                profile.is_admin() || profile.is_staff_sales()
            }
            AccessArea::Users => profile.is_admin(),
        }
    }

    // Console rejects bounce to the storefront; area rejects stay in the dashboard.
    fn fallback(&self) -> &'static str {
        match self {
            AccessArea::Console => HOME_ROUTE,
            _ => DASHBOARD_ROUTE,
        }
    }
}

/// Decide whether `profile` (if any) may enter `area`.
pub fn check_access(profile: Option<&Profile>, area: AccessArea) -> Access {
    match profile {
        None => Access::LoginRequired,
        Some(p) if area.permits(p) => Access::Allowed,
        Some(_) => Access::Forbidden {
            fallback: area.fallback(),
        },
    }
}

/// Where a user should land after logging in.
pub fn home_route(profile: Option<&Profile>) -> &'static str {
    match profile {
        None => LOGIN_ROUTE,
        Some(p) if p.is_admin() || p.is_staff() => DASHBOARD_ROUTE,
        Some(_) => HOME_ROUTE,
    }
}
