use std::net::SocketAddr;
use std::sync::Arc;
use verity_base::{init_file_logger, init_stdout_logger, log, log_fatal};
use verity_infer::Inference;
use verity_server::config::LOG_DIR_VAR;
use verity_server::{AppState, Config, router};

fn init_logging() {
    match std::env::var_os(LOG_DIR_VAR) {
        Some(dir) => {
            if let Err(e) = init_file_logger(&dir) {
                init_stdout_logger();
                log::warn!("Failed to log to {}: {}", dir.to_string_lossy(), e);
            }
        }
        None => init_stdout_logger(),
    }
}

#[cfg(feature = "cuda")]
fn select_device(config: &Config) -> Inference {
    match config.cuda_device {
        Some(ordinal) => match Inference::cuda(ordinal) {
            Ok(inference) => inference,
            Err(e) => log_fatal!("Failed to open CUDA device {}: {}", ordinal, e),
        },
        None => Inference::cpu(),
    }
}

#[cfg(not(feature = "cuda"))]
fn select_device(config: &Config) -> Inference {
    if let Some(ordinal) = config.cuda_device {
        log::warn!("CUDA_DEVICE={} ignored, built without the cuda feature", ordinal);
    }
    Inference::cpu()
}

#[tokio::main]
async fn main() {
    // a missing .env is fine, the variables may come from the environment
    let dotenv = dotenvy::dotenv();
    init_logging();
    if let Ok(path) = dotenv {
        log::debug!("Loaded {}", path.display());
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => log_fatal!("Configuration error: {}", e),
    };

    if let Err(e) = verity_video::check_tools() {
        log_fatal!("Video decoding unavailable: {}", e);
    }

    let inference = select_device(&config);

    log::info!("Loading image model from {}", config.image_model_path.display());
    let image = match inference.use_image_classifier(&config.image_model_path) {
        Ok(model) => model,
        Err(e) => log_fatal!("Failed to load image model: {}", e),
    };

    log::info!("Loading video model from {}", config.video_model_path.display());
    let video = match inference.use_video_classifier(
        &config.video_model_path,
        &config.face_detector_path,
        &config.face_mesh_path,
    ) {
        Ok(model) => model,
        Err(e) => log_fatal!("Failed to load video model: {}", e),
    };

    let state = Arc::new(AppState {
        image: Arc::new(image),
        video: Arc::new(video),
        request_timeout: config.request_timeout,
        max_upload_bytes: config.max_upload_bytes,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => log_fatal!("Failed to bind {}: {}", addr, e),
    };
    log::info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, router(state)).await {
        log_fatal!("Server error: {}", e);
    }
}
