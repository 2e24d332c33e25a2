use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use backend::artifacts::store::{ArtifactPaths, ArtifactStore};
use backend::audio::features::FeatureExtractor;
use backend::feedback::sink::{CsvFeedbackSink, FeedbackSink};
use backend::routes::configure_routes;

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(key).unwrap_or_else(|_| default.to_string()))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let paths = ArtifactPaths {
        model: env_path("MODEL_PATH", "artifacts/model.json"),
        scaler: env_path("SCALER_PATH", "artifacts/scaler.json"),
        labels: env_path("LABELS_PATH", "artifacts/labels.json"),
    };
    let store = ArtifactStore::load(&paths);
    let status = store.status();
    log::info!(
        "Artifact status: model={} scaler={} encoder={}",
        status.model_loaded,
        status.scaler_loaded,
        status.encoder_loaded
    );
    if store.ready().is_none() {
        log::warn!("Serving degraded: /predict will be unavailable until artifacts load");
    }

    let store = web::Data::new(store);
    let extractor = web::Data::new(FeatureExtractor::new());

    let feedback_log = env_path("FEEDBACK_LOG", "feedback/user_feedback.csv");
    log::info!("Feedback log: {}", feedback_log.display());
    let sink: Arc<dyn FeedbackSink> = Arc::new(CsvFeedbackSink::new(feedback_log));
    let sink: web::Data<dyn FeedbackSink> = web::Data::from(sink);

    let port = env::var("PORT").unwrap_or_else(|_| "5000".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![actix_web::http::header::CONTENT_TYPE])
                    .max_age(3600),
            )
            .app_data(store.clone())
            .app_data(extractor.clone())
            .app_data(sink.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
