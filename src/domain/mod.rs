pub mod defaults;
pub mod models;
pub mod reconcile;
pub mod status_migration;
