use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::upload::validator::ValidationError;

/// Terminal failure of a request, mapped onto the wire as
/// `{ "error": <reason>, "details": <safe summary> }`.
///
/// Decoding and inference failures deliberately carry no payload here;
/// the full internal error is logged at the stage boundary and only a
/// generic summary leaves the server.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("artifacts not loaded")]
    NotReady,
    #[error("audio decoding failed")]
    Decoding,
    #[error("inference failed")]
    Inference,
    #[error("missing required feedback fields")]
    FeedbackValidation,
    #[error("multipart error: {0}")]
    Multipart(#[from] actix_multipart::MultipartError),
    #[error("io error: {0}")]
    Internal(#[from] std::io::Error),
}

impl ApiError {
    fn wire_parts(&self) -> (&'static str, String) {
        match self {
            ApiError::Validation(e) => e.wire_parts(),
            ApiError::NotReady => (
                "Server not ready",
                "Model, scaler, or encoder not loaded properly".into(),
            ),
            ApiError::Decoding => (
                "Prediction failed",
                "The uploaded audio could not be decoded".into(),
            ),
            ApiError::Inference => (
                "Prediction failed",
                "Inference could not be completed".into(),
            ),
            ApiError::FeedbackValidation => (
                "Missing required fields",
                "Required: predicted, is_correct, actual".into(),
            ),
            ApiError::Multipart(_) => ("Invalid upload", "Malformed multipart payload".into()),
            ApiError::Internal(_) => (
                "Internal server error",
                "Something went wrong on the server".into(),
            ),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::FeedbackValidation | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Decoding | ApiError::Inference | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, details) = self.wire_parts();
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error.into(),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation(ValidationError::MissingFile).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotReady.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::Decoding.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::Inference.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::FeedbackValidation.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_generic_details_for_pipeline_failures() {
        let (error, details) = ApiError::Decoding.wire_parts();
        assert_eq!(error, "Prediction failed");
        assert!(!details.contains("symphonia"));

        let (error, _) = ApiError::Inference.wire_parts();
        assert_eq!(error, "Prediction failed");
    }
}
