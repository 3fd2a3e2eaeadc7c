//! Catalogue management endpoints: short-URL generation, object updates and
//! quiz authoring. These are not used by the marker session itself.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::http::HttpDirectoryClient;
use crate::types::{QuizPayload, ShortUrlRecord};
use crate::Result;

const UNKNOWN_QUESTION: &str = "Unknown Question";
const NOT_AVAILABLE: &str = "N/A";

/// Body of `PUT /update_object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    pub short_code: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub original: String,
    pub metadata: String,
}

/// Body of `POST /create_quiz`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewQuiz {
    pub questions: String,
    pub answer_a: String,
    pub answer_b: String,
    pub answer_c: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_d: Option<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub image: String,
}

/// Flattened question card with placeholders for missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
    pub answer: String,
    pub explanation: Option<String>,
}

impl From<&QuizPayload> for QuizQuestion {
    fn from(quiz: &QuizPayload) -> Self {
        let or_na = |v: &Option<String>| v.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Self {
            question: quiz
                .questions
                .clone()
                .unwrap_or_else(|| UNKNOWN_QUESTION.to_string()),
            a: or_na(&quiz.answer_a),
            b: or_na(&quiz.answer_b),
            c: or_na(&quiz.answer_c),
            d: or_na(&quiz.answer_d),
            answer: or_na(&quiz.correct_answer),
            explanation: quiz.explanation.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    count: u32,
    domain: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ImageListResponse {
    #[serde(default, rename = "imageUrls")]
    image_urls: Option<Vec<String>>,
}

impl HttpDirectoryClient {
    /// `POST /generate`: mint `count` short URLs under `domain`.
    pub async fn generate_short_urls(
        &self,
        count: u32,
        domain: &str,
    ) -> Result<Vec<ShortUrlRecord>> {
        let url = self.endpoint_url("/generate")?;
        let body = self
            .send_json(Method::POST, url.clone(), &GenerateRequest { count, domain })
            .await?;
        serde_json::from_str(&body).map_err(|e| DirectoryError::parse(url.as_str(), e))
    }

    /// `GET /retrieve?domain=`: all short URLs registered for a domain.
    pub async fn retrieve_by_domain(&self, domain: &str) -> Result<Vec<ShortUrlRecord>> {
        let url = self.endpoint_with_query("/retrieve", &[("domain", domain)])?;
        self.get_json(url).await
    }

    pub async fn update_object(&self, update: &ObjectUpdate) -> Result<()> {
        let url = self.endpoint_url("/update_object")?;
        self.send_json(Method::PUT, url, update).await?;
        tracing::info!(short_code = %update.short_code, "Updated object properties");
        Ok(())
    }

    pub async fn create_quiz(&self, quiz: &NewQuiz) -> Result<()> {
        let url = self.endpoint_url("/create_quiz")?;
        self.send_json(Method::POST, url, quiz).await?;
        Ok(())
    }

    pub async fn retrieve_quizzes(&self) -> Result<Vec<QuizPayload>> {
        let url = self.endpoint_url("/retrieve_quizzes")?;
        let quizzes: Vec<QuizPayload> = self.get_json(url).await?;

        for quiz in &quizzes {
            if quiz.questions.is_none() || quiz.correct_answer.is_none() {
                tracing::warn!(quiz_id = ?quiz.id, "Quiz has null fields");
            }
        }
        tracing::debug!(count = quizzes.len(), "Parsed quizzes");
        Ok(quizzes)
    }

    /// All quizzes as question cards. An empty catalogue is an error.
    pub async fn quiz_questions(&self) -> Result<Vec<QuizQuestion>> {
        let quizzes = self.retrieve_quizzes().await?;
        let questions = quiz_questions_from(&quizzes);
        if questions.is_empty() {
            return Err(DirectoryError::Empty("No questions available.".to_string()));
        }
        Ok(questions)
    }

    /// `GET /images`: URLs of the marker images known to the backend.
    pub async fn image_urls(&self) -> Result<Vec<String>> {
        let url = self.endpoint_url("/images")?;
        let response: ImageListResponse = self.get_json(url).await?;
        response.image_urls.ok_or_else(|| {
            DirectoryError::Empty("Invalid API response or no image URLs found.".to_string())
        })
    }
}

pub fn quiz_questions_from(quizzes: &[QuizPayload]) -> Vec<QuizQuestion> {
    quizzes.iter().map(QuizQuestion::from).collect()
}
