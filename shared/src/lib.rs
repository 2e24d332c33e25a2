use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct PredictionResponse {
    pub genre: String,
    pub confidence: f32,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct FeedbackRequest {
    pub predicted: Option<String>,
    pub is_correct: Option<bool>,
    pub actual: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct FeedbackResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ReadinessResponse {
    pub status: String,
    pub message: String,
    pub model_loaded: bool,
    pub scaler_loaded: bool,
    pub encoder_loaded: bool,
}
