use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{mysql::MySqlPoolOptions, Connection, MySqlPool};

use super::{url::mysql_options, AppUser, UserStore};

pub struct MysqlStore {
    pool: MySqlPool,
}

impl MysqlStore {
    /// Builds a lazy pool; nothing is dialled until the first query.
    pub fn connect_lazy(connection: &str) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(mysql_options(connection)?);

        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for MysqlStore {
    fn engine(&self) -> &'static str {
        "MySQL"
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        self.pool.acquire().await?.ping().await
    }

    async fn ensure_table(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_users (
                id INT AUTO_INCREMENT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_users(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM app_users")
            .fetch_one(&self.pool)
            .await
    }

    async fn insert_user(&self, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO app_users (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<AppUser>, sqlx::Error> {
        let rows: Vec<(i32, String, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT id, name, created_at FROM app_users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, created_at)| AppUser {
                id,
                name,
                created_at: created_at
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
            })
            .collect())
    }
}
