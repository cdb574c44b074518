pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod motion;
pub mod retention;
pub mod state;
pub mod status;
pub mod stream;
pub mod telegram;

use crate::camera::CameraHandle;
use crate::config::Config;
use crate::error::Result;
use crate::frame::FrameBuffer;
use crate::state::SystemState;
use crate::telegram::TelegramClient;
use std::sync::Arc;

/// Estado compartido entre los loops y el servidor HTTP.
///
/// FrameBuffer y SystemState son los únicos puntos de contacto entre tareas;
/// los loops no se llaman entre sí para mantener aislados los dominios de
/// fallo.
pub struct AppState {
    pub config: Config,
    pub frame_buffer: FrameBuffer,
    pub system: SystemState,
    pub telegram: TelegramClient,
    pub camera: Arc<CameraHandle>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let telegram = TelegramClient::new(&config.telegram.token, &config.telegram.chat_id)?;
        Ok(AppState {
            frame_buffer: FrameBuffer::new(),
            system: SystemState::new(config.armed_on_start),
            telegram,
            camera: Arc::new(CameraHandle::new()),
            config,
        })
    }
}
