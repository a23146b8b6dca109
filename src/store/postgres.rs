use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::kind::PrincipalKind;

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Pool that connects on first use.
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Account Operations --

    pub async fn find_account_by_email(
        &self,
        kind: PrincipalKind,
        email: &str,
    ) -> anyhow::Result<Option<AccountRow>> {
        let sql = format!(
            "SELECT id, first_name, last_name, email, password_hash, created_at FROM {} WHERE email = $1",
            account_table(kind)
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Insert an account. Returns `None` when the email is already taken.
    pub async fn create_account(
        &self,
        kind: PrincipalKind,
        account: &NewAccount,
    ) -> anyhow::Result<Option<Uuid>> {
        let sql = format!(
            "INSERT INTO {} (first_name, last_name, email, password_hash) VALUES ($1, $2, $3, $4) RETURNING id",
            account_table(kind)
        );
        let result = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(id) => Ok(Some(id)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn account_exists(&self, kind: PrincipalKind, id: Uuid) -> anyhow::Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            account_table(kind)
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    // -- Course Operations --

    pub async fn create_course(&self, course: &NewCourse) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO courses (title, description, price, image_url) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price)
        .bind(&course.image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_course(&self, id: Uuid) -> anyhow::Result<Option<CourseRow>> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, title, description, price, image_url FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_course_price(&self, id: Uuid, price: Decimal) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE courses SET price = $1 WHERE id = $2")
            .bind(price)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every course with its instructors' public details.
    pub async fn list_catalog(&self) -> anyhow::Result<Vec<CatalogRow>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r#"SELECT c.title, c.description, c.price, c.image_url,
                      COALESCE(
                          jsonb_agg(
                              jsonb_build_object('firstName', a.first_name, 'lastName', a.last_name, 'email', a.email)
                              ORDER BY ci.created_at
                          ) FILTER (WHERE a.id IS NOT NULL),
                          '[]'::jsonb
                      ) AS instructors
               FROM courses c
               LEFT JOIN course_instructors ci ON ci.course_id = c.id
               LEFT JOIN admins a ON a.id = ci.admin_id
               GROUP BY c.id
               ORDER BY c.created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Ownership Operations --

    /// Returns `false` when the user already owns the course.
    pub async fn purchase_course(&self, user_id: Uuid, course_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO user_courses (user_id, course_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn courses_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<CourseRow>> {
        let rows = sqlx::query_as::<_, CourseRow>(
            r#"SELECT c.id, c.title, c.description, c.price, c.image_url
               FROM courses c
               JOIN user_courses uc ON uc.course_id = c.id
               WHERE uc.user_id = $1
               ORDER BY uc.created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Returns `false` when the admin already teaches the course.
    pub async fn add_instructor(&self, admin_id: Uuid, course_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO course_instructors (course_id, admin_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(course_id)
        .bind(admin_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_instructor(&self, admin_id: Uuid, course_id: Uuid) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM course_instructors WHERE course_id = $1 AND admin_id = $2)",
        )
        .bind(course_id)
        .bind(admin_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn courses_for_admin(&self, admin_id: Uuid) -> anyhow::Result<Vec<CourseRow>> {
        let rows = sqlx::query_as::<_, CourseRow>(
            r#"SELECT c.id, c.title, c.description, c.price, c.image_url
               FROM courses c
               JOIN course_instructors ci ON ci.course_id = c.id
               WHERE ci.admin_id = $1
               ORDER BY ci.created_at ASC"#,
        )
        .bind(admin_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Table holding accounts of `kind`. Only ever a fixed literal, so it is
/// safe to splice into SQL.
fn account_table(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "users",
        PrincipalKind::Admin => "admins",
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

// -- Row / Input Types --

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRow {
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_url: String,
    /// `[{"firstName", "lastName", "email"}]`
    pub instructors: serde_json::Value,
}

pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub image_url: String,
}
