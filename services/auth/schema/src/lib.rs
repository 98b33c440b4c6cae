//! sea-orm entities for the auth service tables.

pub mod admin_accounts;
pub mod audit_events;
pub mod login_secrets;
