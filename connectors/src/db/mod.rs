//! The MySQL and PostgreSQL demo apps.
//!
//! Both apps do the same thing against their own engine: wait for the
//! database to accept connections, make sure `app_users` exists, seed it when
//! empty and print what is in it.

mod mysql;
mod postgres;
pub mod url;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

pub use mysql::MysqlStore;
pub use postgres::PostgresStore;

pub const CONNECT_ATTEMPTS: u32 = 10;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct AppUser {
    pub id: i32,
    pub name: String,
    /// RFC 3339
    pub created_at: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    fn engine(&self) -> &'static str;

    async fn ping(&self) -> Result<(), sqlx::Error>;
    async fn ensure_table(&self) -> Result<(), sqlx::Error>;
    async fn count_users(&self) -> Result<i64, sqlx::Error>;
    async fn insert_user(&self, name: &str) -> Result<(), sqlx::Error>;
    async fn list_users(&self) -> Result<Vec<AppUser>, sqlx::Error>;
}

/// Retries `ping` until the database answers. Branch databases can take a few
/// seconds to accept connections after their pod comes up.
pub async fn wait_until_reachable<S: UserStore + ?Sized>(
    store: &S,
    attempts: u32,
    delay: Duration,
) -> anyhow::Result<()> {
    let mut last_err = None;

    for attempt in 1..=attempts {
        match store.ping().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                if attempt < attempts {
                    tracing::info!(
                        "Waiting for database to be ready (attempt {}/{})...",
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) => Err(err).with_context(|| {
            format!("failed to connect to database after {attempts} attempts")
        }),
        None => Err(anyhow::anyhow!("no connection attempts were made")),
    }
}

pub async fn run<S: UserStore + ?Sized>(store: &S, default_users: &[&str]) -> anyhow::Result<()> {
    wait_until_reachable(store, CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY).await?;
    tracing::info!("Connected to {} database", store.engine());

    store
        .ensure_table()
        .await
        .context("failed to create table")?;
    tracing::info!("Created/verified app_users table");

    let count = store
        .count_users()
        .await
        .context("failed to count users")?;

    if count == 0 {
        tracing::info!("Table is empty, inserting default test users...");
        for name in default_users {
            match store.insert_user(name).await {
                Ok(()) => tracing::info!("Inserted default user: {}", name),
                Err(err) => tracing::warn!("Failed to insert default user {}: {}", name, err),
            }
        }
    }

    let users = store.list_users().await.context("failed to query users")?;

    tracing::info!("Current users in database:");
    for user in &users {
        tracing::info!(
            "  - ID: {}, Name: {}, Created: {}",
            user.id,
            user.name,
            user.created_at
        );
    }
    tracing::info!("Total users: {}", users.len());

    Ok(())
}
