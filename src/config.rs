//! Configuración de la aplicación vía variables de entorno.
//!
//! Todas las variables se leen una sola vez al arranque; la configuración
//! es inmutable después de cargarse.

use crate::error::{CentinelaError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Credenciales y destino del canal de Telegram
#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// Parámetros del detector de movimiento y de la puerta de alertas
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Área mínima (px²) de una región conectada para considerarla movimiento
    pub min_area: usize,
    /// Tiempo mínimo entre dos eventos disparados
    pub cooldown: Duration,
}

/// Política de retención de evidencias (inmutable tras la carga)
#[derive(Clone, Debug)]
pub struct RetentionPolicy {
    /// Días que se conservan las evidencias antes del barrido por edad
    pub max_days_to_keep: u32,
    /// Espacio libre mínimo en GB antes del barrido de emergencia
    pub min_free_space_gb: f64,
    /// Período entre ciclos de barrido
    pub sweep_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub detector: DetectorConfig,
    pub retention: RetentionPolicy,
    /// Directorio donde se guardan las evidencias
    pub storage_path: PathBuf,
    /// Dirección de escucha del servidor de streaming
    pub listen_addr: String,
    /// URL de la fuente de video (RTSP o dispositivo v4l2)
    pub camera_source: String,
    /// Si el sistema arranca armado
    pub armed_on_start: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl Config {
    /// Carga la configuración desde el entorno. Token, chat id y ruta de
    /// almacenamiento son obligatorios; el resto tiene valores por defecto.
    pub fn from_env() -> Result<Self> {
        let token = env::var("TELEGRAM_TOKEN")
            .map_err(|_| CentinelaError::Config("TELEGRAM_TOKEN no definido".into()))?;
        let chat_id = env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| CentinelaError::Config("TELEGRAM_CHAT_ID no definido".into()))?;
        let storage_path = env::var("STORAGE_PATH").unwrap_or_else(|_| "security_footage".to_string());

        Ok(Config {
            telegram: TelegramConfig { token, chat_id },
            detector: DetectorConfig {
                min_area: env_parse("MOTION_MIN_AREA", 500),
                cooldown: Duration::from_secs(env_parse("NOTIFICATION_COOLDOWN_SECS", 60)),
            },
            retention: RetentionPolicy {
                max_days_to_keep: env_parse("MAX_DAYS_TO_KEEP", 10),
                min_free_space_gb: env_parse("MIN_FREE_SPACE_GB", 1.0),
                sweep_interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 3600)),
            },
            storage_path: PathBuf::from(storage_path),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            camera_source: env::var("CAMERA_SOURCE").unwrap_or_else(|_| "/dev/video0".to_string()),
            armed_on_start: env_flag("ARMED_ON_START", true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("CENTINELA_TEST_PARSE", "no-es-numero");
        let v: u32 = env_parse("CENTINELA_TEST_PARSE", 10);
        assert_eq!(v, 10);
        std::env::remove_var("CENTINELA_TEST_PARSE");
    }

    #[test]
    fn env_flag_accepts_one_and_true() {
        std::env::set_var("CENTINELA_TEST_FLAG", "1");
        assert!(env_flag("CENTINELA_TEST_FLAG", false));
        std::env::set_var("CENTINELA_TEST_FLAG", "TRUE");
        assert!(env_flag("CENTINELA_TEST_FLAG", false));
        std::env::set_var("CENTINELA_TEST_FLAG", "0");
        assert!(!env_flag("CENTINELA_TEST_FLAG", true));
        std::env::remove_var("CENTINELA_TEST_FLAG");
    }
}
