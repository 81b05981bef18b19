//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the store ports, used when no
//! `DATABASE_URL` is configured and by the integration tests.

use async_trait::async_trait;
use hvac_consult_core::domain::{Consultation, ImageCategory, Question};
use hvac_consult_core::ports::{
    CategoryStore, ConsultationStore, PortError, PortResult, QuestionStore,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    consultations: RwLock<HashMap<Uuid, Consultation>>,
    questions: RwLock<Vec<Question>>,
    /// Kept in insertion order.
    categories: RwLock<Vec<ImageCategory>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsultationStore for InMemoryStore {
    async fn insert_consultation(&self, consultation: &Consultation) -> PortResult<()> {
        let mut consultations = self.consultations.write().await;
        if consultations.contains_key(&consultation.session_id) {
            return Err(PortError::Conflict(format!(
                "Session {} already exists",
                consultation.session_id
            )));
        }
        consultations.insert(consultation.session_id, consultation.clone());
        Ok(())
    }

    async fn get_consultation(&self, session_id: Uuid) -> PortResult<Consultation> {
        self.consultations
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Consultation {} not found", session_id)))
    }

    async fn replace_consultation(
        &self,
        consultation: &Consultation,
        expected_version: i64,
    ) -> PortResult<bool> {
        let mut consultations = self.consultations.write().await;
        match consultations.get_mut(&consultation.session_id) {
            Some(stored) if stored.version == expected_version => {
                *stored = consultation.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PortError::NotFound(format!(
                "Consultation {} not found",
                consultation.session_id
            ))),
        }
    }

    async fn list_consultations(&self, skip: usize, limit: usize) -> PortResult<Vec<Consultation>> {
        let mut consultations: Vec<Consultation> =
            self.consultations.read().await.values().cloned().collect();
        consultations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(consultations.into_iter().skip(skip).take(limit).collect())
    }

    async fn delete_consultation(&self, session_id: Uuid) -> PortResult<()> {
        self.consultations
            .write()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Consultation {} not found", session_id)))
    }
}

#[async_trait]
impl QuestionStore for InMemoryStore {
    async fn list_questions(&self) -> PortResult<Vec<Question>> {
        let mut questions = self.questions.read().await.clone();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    async fn insert_questions(&self, new_questions: &[Question]) -> PortResult<()> {
        let mut questions = self.questions.write().await;
        for question in new_questions {
            if questions.iter().any(|q| q.order == question.order) {
                return Err(PortError::Conflict(format!(
                    "A question with order {} already exists",
                    question.order
                )));
            }
        }
        questions.extend_from_slice(new_questions);
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for InMemoryStore {
    async fn list_categories(&self) -> PortResult<Vec<ImageCategory>> {
        Ok(self.categories.read().await.clone())
    }

    async fn upsert_category(&self, category: &ImageCategory) -> PortResult<bool> {
        let mut categories = self.categories.write().await;
        match categories.iter_mut().find(|c| c.category == category.category) {
            Some(existing) => {
                *existing = category.clone();
                Ok(false)
            }
            None => {
                categories.push(category.clone());
                Ok(true)
            }
        }
    }
}
