//! Quiz and user collaborator traits and static implementations
//!
//! Quiz/question authoring and user identity live outside this service;
//! these traits describe the read-only boundary the engine consumes. The
//! static implementations back tests and single-process deployments.

use crate::error::{GameRoomError, Result};
use crate::types::{QuestionSnapshot, QuizId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A quiz together with its ordered questions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizContent {
    pub quiz_id: QuizId,
    pub title: String,
    pub questions: Vec<QuestionSnapshot>,
}

/// Display information for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
}

/// Read-only quiz provider; called once per room creation
#[async_trait]
pub trait QuizProvider: Send + Sync {
    /// Fetch a quiz and its ordered questions
    async fn get_quiz_with_questions(&self, quiz_id: QuizId) -> Result<QuizContent>;
}

/// Read-only user directory for resolving display names
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user; None if unknown
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>>;
}

/// In-memory quiz provider backed by a preset quiz table
#[derive(Debug, Default)]
pub struct StaticQuizProvider {
    quizzes: RwLock<HashMap<QuizId, QuizContent>>,
}

impl StaticQuizProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a quiz so rooms can be created from it
    pub fn insert_quiz(&self, quiz: QuizContent) -> Result<()> {
        let mut quizzes = self
            .quizzes
            .write()
            .map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire quizzes lock".to_string(),
            })?;
        quizzes.insert(quiz.quiz_id, quiz);
        Ok(())
    }
}

#[async_trait]
impl QuizProvider for StaticQuizProvider {
    async fn get_quiz_with_questions(&self, quiz_id: QuizId) -> Result<QuizContent> {
        let quizzes = self
            .quizzes
            .read()
            .map_err(|_| GameRoomError::InternalError {
                message: "Failed to acquire quizzes lock".to_string(),
            })?;

        quizzes
            .get(&quiz_id)
            .cloned()
            .ok_or_else(|| GameRoomError::QuizNotFound { quiz_id }.into())
    }
}

/// In-memory user directory backed by a preset profile table
#[derive(Debug, Default)]
pub struct StaticUserDirectory {
    users: RwLock<HashMap<UserId, UserProfile>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, profile: UserProfile) -> Result<()> {
        let mut users = self.users.write().map_err(|_| GameRoomError::InternalError {
            message: "Failed to acquire users lock".to_string(),
        })?;
        users.insert(profile.user_id, profile);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let users = self.users.read().map_err(|_| GameRoomError::InternalError {
            message: "Failed to acquire users lock".to_string(),
        })?;

        Ok(users.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerOption;

    fn sample_quiz(quiz_id: QuizId, question_count: usize) -> QuizContent {
        let questions = (0..question_count)
            .map(|i| QuestionSnapshot {
                question_id: (i as i64) + 1,
                quiz_id,
                content: format!("Question {}?", i + 1),
                options: [
                    "Option A".to_string(),
                    "Option B".to_string(),
                    "Option C".to_string(),
                    "Option D".to_string(),
                ],
                correct_option: AnswerOption::B,
            })
            .collect();

        QuizContent {
            quiz_id,
            title: format!("Quiz {}", quiz_id),
            questions,
        }
    }

    #[tokio::test]
    async fn test_quiz_lookup() {
        let provider = StaticQuizProvider::new();
        provider.insert_quiz(sample_quiz(5, 3)).unwrap();

        let quiz = provider.get_quiz_with_questions(5).await.unwrap();
        assert_eq!(quiz.quiz_id, 5);
        assert_eq!(quiz.questions.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_quiz() {
        let provider = StaticQuizProvider::new();
        let err = provider.get_quiz_with_questions(42).await.unwrap_err();
        assert!(err.to_string().contains("Quiz not found"));
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let directory = StaticUserDirectory::new();
        directory
            .insert_user(UserProfile {
                user_id: 1,
                display_name: "Alice".to_string(),
            })
            .unwrap();

        let user = directory.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.display_name, "Alice");
        assert!(directory.get_user(2).await.unwrap().is_none());
    }
}
