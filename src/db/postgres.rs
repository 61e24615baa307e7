use crate::config::AppConfig;
use crate::db::sync::{apply_row_sets, TableWriter};
use crate::db::{
    ModuleRow, RowSets, SchoolYearRow, Store, StoreError, StudentRow, TemplateRow, UserRow,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

const STATUS_SCHEMA_KEY: &str = "status_schema_version";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with `DATABASE_URL` when set, otherwise with the driver's
    /// own `PG*` environment resolution, then applies embedded migrations.
    pub async fn connect(config: &AppConfig) -> Result<Self, StoreError> {
        let options = match &config.database_url {
            Some(url) => url.parse::<PgConnectOptions>()?,
            None => PgConnectOptions::new(),
        };

        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                e
            })?;
        tracing::info!("Database connection established");

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
        tracing::info!("Database migrations completed");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn load(&self) -> Result<RowSets, StoreError> {
        let users = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, salt, token, position
            FROM users
            ORDER BY position, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let school_years = sqlx::query_as::<_, SchoolYearRow>(
            "SELECT id, label, position FROM school_years ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let modules = sqlx::query_as::<_, ModuleRow>(
            "SELECT id, school_year_id, title, position FROM modules ORDER BY position, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let templates = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT module_id, evaluation_type, data
            FROM module_templates
            ORDER BY module_id, evaluation_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let students = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT
                id,
                module_id,
                evaluation_type,
                teacher_id,
                name,
                firstname,
                note,
                group_name,
                class_name,
                teacher,
                evaluation_date,
                coaching_date,
                operational_competence,
                competency_options,
                competencies,
                position
            FROM students
            ORDER BY position, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(RowSets {
            users,
            school_years,
            modules,
            templates,
            students,
        })
    }

    async fn replace_all(&self, rows: &RowSets) -> Result<(), StoreError> {
        let tx = self.pool.begin().await?;
        let mut writer = PgWriter { tx };
        // An early return drops the transaction, which rolls it back.
        let summary = apply_row_sets(&mut writer, rows).await?;
        writer.tx.commit().await?;
        tracing::info!(
            students_upserted = summary.students.upserted,
            students_deleted = summary.students.deleted,
            "Workspace committed"
        );
        Ok(())
    }

    async fn status_schema_version(&self) -> Result<i32, StoreError> {
        let version: Option<i32> =
            sqlx::query_scalar("SELECT value FROM app_meta WHERE key = $1")
                .bind(STATUS_SCHEMA_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.unwrap_or(0))
    }

    async fn set_status_schema_version(&self, version: i32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO app_meta (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(STATUS_SCHEMA_KEY)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

struct PgWriter {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TableWriter<UserRow> for PgWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM users")
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(keys)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[UserRow]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO users (id, name, email, password_hash, salt, token, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    email = EXCLUDED.email,
                    password_hash = EXCLUDED.password_hash,
                    salt = EXCLUDED.salt,
                    token = EXCLUDED.token,
                    position = EXCLUDED.position
                "#,
            )
            .bind(row.id)
            .bind(&row.name)
            .bind(&row.email)
            .bind(&row.password_hash)
            .bind(&row.salt)
            .bind(&row.token)
            .bind(row.position)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter<SchoolYearRow> for PgWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM school_years")
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM school_years WHERE id = ANY($1)")
            .bind(keys)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[SchoolYearRow]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO school_years (id, label, position)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET
                    label = EXCLUDED.label,
                    position = EXCLUDED.position
                "#,
            )
            .bind(row.id)
            .bind(&row.label)
            .bind(row.position)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter<ModuleRow> for PgWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM modules")
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM modules WHERE id = ANY($1)")
            .bind(keys)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[ModuleRow]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO modules (id, school_year_id, title, position)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET
                    school_year_id = EXCLUDED.school_year_id,
                    title = EXCLUDED.title,
                    position = EXCLUDED.position
                "#,
            )
            .bind(row.id)
            .bind(row.school_year_id)
            .bind(&row.title)
            .bind(row.position)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter<TemplateRow> for PgWriter {
    async fn existing_keys(&mut self) -> Result<Vec<(Uuid, String)>, StoreError> {
        Ok(
            sqlx::query_as::<_, (Uuid, String)>(
                "SELECT module_id, evaluation_type FROM module_templates",
            )
            .fetch_all(&mut *self.tx)
            .await?,
        )
    }

    async fn delete_rows(&mut self, keys: &[(Uuid, String)]) -> Result<(), StoreError> {
        for (module_id, evaluation_type) in keys {
            sqlx::query(
                "DELETE FROM module_templates WHERE module_id = $1 AND evaluation_type = $2",
            )
            .bind(module_id)
            .bind(evaluation_type)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[TemplateRow]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO module_templates (module_id, evaluation_type, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (module_id, evaluation_type) DO UPDATE SET
                    data = EXCLUDED.data,
                    updated_at = now()
                "#,
            )
            .bind(row.module_id)
            .bind(&row.evaluation_type)
            .bind(&row.data)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter<StudentRow> for PgWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM students")
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM students WHERE id = ANY($1)")
            .bind(keys)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[StudentRow]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO students (
                    id, module_id, evaluation_type, teacher_id,
                    name, firstname, note, group_name,
                    class_name, teacher, evaluation_date, coaching_date,
                    operational_competence, competency_options, competencies, position
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (id) DO UPDATE SET
                    module_id = EXCLUDED.module_id,
                    evaluation_type = EXCLUDED.evaluation_type,
                    teacher_id = EXCLUDED.teacher_id,
                    name = EXCLUDED.name,
                    firstname = EXCLUDED.firstname,
                    note = EXCLUDED.note,
                    group_name = EXCLUDED.group_name,
                    class_name = EXCLUDED.class_name,
                    teacher = EXCLUDED.teacher,
                    evaluation_date = EXCLUDED.evaluation_date,
                    coaching_date = EXCLUDED.coaching_date,
                    operational_competence = EXCLUDED.operational_competence,
                    competency_options = EXCLUDED.competency_options,
                    competencies = EXCLUDED.competencies,
                    position = EXCLUDED.position,
                    updated_at = now()
                "#,
            )
            .bind(row.id)
            .bind(row.module_id)
            .bind(&row.evaluation_type)
            .bind(row.teacher_id)
            .bind(&row.name)
            .bind(&row.firstname)
            .bind(&row.note)
            .bind(&row.group_name)
            .bind(&row.class_name)
            .bind(&row.teacher)
            .bind(&row.evaluation_date)
            .bind(&row.coaching_date)
            .bind(&row.operational_competence)
            .bind(&row.competency_options)
            .bind(&row.competencies)
            .bind(row.position)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}
