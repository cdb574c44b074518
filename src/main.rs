use centinela::{camera, capture, config::Config, retention, stream, telegram, AppState};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.storage_path)?;

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(config)?);

    // Canal de frames entre el driver de cámara y el loop de captura
    let (frame_tx, frame_rx) = camera::frame_channel();

    #[cfg(feature = "gstreamer")]
    {
        let source = state.config.camera_source.clone();
        tokio::spawn(camera::start_camera_pipeline(
            source,
            frame_tx,
            state.camera.clone(),
        ));
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        drop(frame_tx);
        log::warn!(
            "⚠️ Compilado sin la feature 'gstreamer': sin captura de video, \
             solo comandos y API"
        );
    }

    // Loop de captura: detección de movimiento y disparo de eventos
    tokio::spawn(capture::run_capture_loop(frame_rx, state.clone()));

    // Tarea de retención de evidencias en segundo plano
    tokio::spawn(retention::run_retention_task(state.clone()));

    // Loop de comandos del operador por Telegram
    tokio::spawn(telegram::run_command_loop(state.clone()));

    let app = stream::router(state);
    let addr: SocketAddr = listen_addr.parse()?;
    log::info!("🚀 Centinela escuchando en http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
