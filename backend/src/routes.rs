use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::{FeedbackRequest, FeedbackResponse, PredictionResponse, ReadinessResponse};
use uuid::Uuid;

use crate::artifacts::store::ArtifactStore;
use crate::audio::decoder::decode_window;
use crate::audio::features::FeatureExtractor;
use crate::error::ApiError;
use crate::feedback::sink::{FeedbackRecord, FeedbackSink};
use crate::inference::engine;
use crate::upload::temp::TempUpload;
use crate::upload::validator::{validate_filename, ValidationError, MAX_FILE_SIZE};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/feedback").route(web::post().to(handle_feedback)))
        .service(web::resource("/").route(web::get().to(handle_readiness)));
}

async fn handle_predict(
    store: web::Data<ArtifactStore>,
    extractor: web::Data<FeatureExtractor>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    // Degraded artifacts fail the request before any upload work.
    let artifacts = store.ready().ok_or(ApiError::NotReady)?;

    let request_id = Uuid::new_v4();
    let (filename, bytes) = collect_upload(payload).await?;
    info!(
        "[{}] Received {} ({} bytes)",
        request_id,
        filename,
        bytes.len()
    );

    let temp = TempUpload::write(&filename, &bytes)?;

    let samples = decode_window(temp.path()).map_err(|e| {
        error!("[{}] Decoding failed for {}: {}", request_id, filename, e);
        ApiError::Decoding
    })?;

    let features = extractor.extract(&samples).map_err(|e| {
        error!("[{}] Feature extraction failed for {}: {}", request_id, filename, e);
        ApiError::Decoding
    })?;

    let prediction = engine::predict(artifacts, &features).map_err(|e| {
        error!("[{}] Inference failed for {}: {}", request_id, filename, e);
        ApiError::Inference
    })?;

    info!(
        "[{}] Predicted {} (confidence {:.4})",
        request_id, prediction.genre, prediction.confidence
    );

    Ok(HttpResponse::Ok().json(PredictionResponse {
        genre: prediction.genre,
        confidence: prediction.confidence,
    }))
}

/// Pulls the `file` field out of the multipart payload.
///
/// The filename is validated before the field is drained so a
/// disallowed type is rejected without buffering its bytes, and the
/// drain aborts as soon as the size ceiling is crossed.
async fn collect_upload(mut payload: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Ok(Some(mut field)) = payload.try_next().await {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("")
            .to_string();
        validate_filename(&filename)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > MAX_FILE_SIZE {
                return Err(ValidationError::TooLarge(bytes.len() + chunk.len()).into());
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok((filename, bytes));
    }
    Err(ValidationError::MissingFile.into())
}

async fn handle_feedback(
    sink: web::Data<dyn FeedbackSink>,
    body: web::Json<FeedbackRequest>,
) -> Result<HttpResponse, ApiError> {
    let FeedbackRequest {
        predicted,
        is_correct,
        actual,
    } = body.into_inner();

    let (predicted, is_correct, actual) = match (predicted, is_correct, actual) {
        (Some(p), Some(c), Some(a)) => (p, c, a),
        _ => return Err(ApiError::FeedbackValidation),
    };

    let record = FeedbackRecord::new(predicted, is_correct, actual);
    sink.append(&record).map_err(|e| {
        error!("Failed to persist feedback: {}", e);
        ApiError::Internal(e)
    })?;

    Ok(HttpResponse::Ok().json(FeedbackResponse {
        status: "success".into(),
    }))
}

async fn handle_readiness(store: web::Data<ArtifactStore>) -> HttpResponse {
    let status = store.status();
    HttpResponse::Ok().json(ReadinessResponse {
        status: "running".into(),
        message: "Music Genre Classifier API".into(),
        model_loaded: status.model_loaded,
        scaler_loaded: status.scaler_loaded,
        encoder_loaded: status.encoder_loaded,
    })
}
