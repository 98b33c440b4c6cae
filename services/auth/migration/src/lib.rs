use sea_orm_migration::prelude::*;

mod m20260301_000001_create_admin_accounts;
mod m20260301_000002_create_login_secrets;
mod m20260301_000003_create_audit_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_admin_accounts::Migration),
            Box::new(m20260301_000002_create_login_secrets::Migration),
            Box::new(m20260301_000003_create_audit_events::Migration),
        ]
    }
}
