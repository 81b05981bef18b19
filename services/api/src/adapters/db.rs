//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store ports from the `core` crate. It handles all interactions with the
//! PostgreSQL database using `sqlx`. Consultations are kept as JSONB documents
//! next to a `version` column used for conditional replacement.

use async_trait::async_trait;
use hvac_consult_core::domain::{Consultation, ImageCategory, InputType, Question};
use hvac_consult_core::ports::{
    CategoryStore, ConsultationStore, PortError, PortResult, QuestionStore,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ConsultationRecord {
    document: Json<Consultation>,
    version: i64,
}
impl ConsultationRecord {
    fn to_domain(self) -> Consultation {
        let mut consultation = self.document.0;
        consultation.version = self.version;
        consultation
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    question_text: String,
    input_type: String,
    options: Option<Json<Vec<String>>>,
    is_required: bool,
    question_order: i32,
}
impl QuestionRecord {
    fn to_domain(self) -> PortResult<Question> {
        let input_type = self
            .input_type
            .parse::<InputType>()
            .map_err(PortError::Unexpected)?;
        Ok(Question {
            id: self.id,
            question_text: self.question_text,
            input_type,
            options: self.options.map(|o| o.0),
            is_required: self.is_required,
            order: self.question_order,
        })
    }
}

#[derive(FromRow)]
struct CategoryRecord {
    document: Json<ImageCategory>,
}

//=========================================================================================
// `ConsultationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConsultationStore for DbAdapter {
    async fn insert_consultation(&self, consultation: &Consultation) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO consultations (session_id, id, document, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(consultation.session_id)
        .bind(consultation.id)
        .bind(Json(consultation))
        .bind(consultation.version)
        .bind(consultation.created_at)
        .bind(consultation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(format!(
                "Session {} already exists",
                consultation.session_id
            )),
            other => unexpected(other),
        })?;
        Ok(())
    }

    async fn get_consultation(&self, session_id: Uuid) -> PortResult<Consultation> {
        let record = sqlx::query_as::<_, ConsultationRecord>(
            "SELECT document, version FROM consultations WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Consultation {} not found", session_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn replace_consultation(
        &self,
        consultation: &Consultation,
        expected_version: i64,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE consultations SET document = $1, version = $2, updated_at = $3 \
             WHERE session_id = $4 AND version = $5",
        )
        .bind(Json(consultation))
        .bind(consultation.version)
        .bind(consultation.updated_at)
        .bind(consultation.session_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_consultations(&self, skip: usize, limit: usize) -> PortResult<Vec<Consultation>> {
        let records = sqlx::query_as::<_, ConsultationRecord>(
            "SELECT document, version FROM consultations \
             ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_consultation(&self, session_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM consultations WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Consultation {} not found",
                session_id
            )));
        }
        Ok(())
    }
}

//=========================================================================================
// `QuestionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionStore for DbAdapter {
    async fn list_questions(&self) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, question_text, input_type, options, is_required, question_order \
             FROM quiz_questions ORDER BY question_order ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn insert_questions(&self, questions: &[Question]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        for question in questions {
            sqlx::query(
                "INSERT INTO quiz_questions (id, question_text, input_type, options, is_required, question_order) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(question.id)
            .bind(&question.question_text)
            .bind(question.input_type.as_str())
            .bind(question.options.as_ref().map(Json))
            .bind(question.is_required)
            .bind(question.order)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(
                    format!("A question with order {} already exists", question.order),
                ),
                other => unexpected(other),
            })?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `CategoryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CategoryStore for DbAdapter {
    async fn list_categories(&self) -> PortResult<Vec<ImageCategory>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT document FROM hvac_categories ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.document.0).collect())
    }

    async fn upsert_category(&self, category: &ImageCategory) -> PortResult<bool> {
        // `xmax = 0` only holds for a freshly inserted row.
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO hvac_categories (category, document) VALUES ($1, $2) \
             ON CONFLICT (category) DO UPDATE SET document = EXCLUDED.document \
             RETURNING (xmax = 0)",
        )
        .bind(&category.category)
        .bind(Json(category))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(inserted)
    }
}
