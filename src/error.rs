//! Tipos de error personalizados para Centinela.
//!
//! Proporciona errores estructurados con contexto para mejor debugging
//! y manejo de errores en producción.

use std::fmt;

/// Error principal de la aplicación Centinela
#[derive(Debug)]
pub enum CentinelaError {
    /// Errores de configuración
    Config(String),
    /// Errores de cámara / fuente de video
    Camera(String),
    /// Errores del canal de Telegram
    Telegram(String),
    /// Errores de almacenamiento de evidencias
    Storage(String),
    /// Errores al codificar imágenes
    Encode(String),
    /// Errores de I/O
    Io(std::io::Error),
    /// Errores de parsing
    Parse(String),
    /// Errores genéricos
    Other(String),
}

impl fmt::Display for CentinelaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CentinelaError::Config(msg) => write!(f, "Config error: {}", msg),
            CentinelaError::Camera(msg) => write!(f, "Camera error: {}", msg),
            CentinelaError::Telegram(msg) => write!(f, "Telegram error: {}", msg),
            CentinelaError::Storage(msg) => write!(f, "Storage error: {}", msg),
            CentinelaError::Encode(msg) => write!(f, "Encode error: {}", msg),
            CentinelaError::Io(err) => write!(f, "IO error: {}", err),
            CentinelaError::Parse(msg) => write!(f, "Parse error: {}", msg),
            CentinelaError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CentinelaError {}

impl From<std::io::Error> for CentinelaError {
    fn from(err: std::io::Error) -> Self {
        CentinelaError::Io(err)
    }
}

impl From<reqwest::Error> for CentinelaError {
    fn from(err: reqwest::Error) -> Self {
        CentinelaError::Telegram(err.to_string())
    }
}

impl From<serde_json::Error> for CentinelaError {
    fn from(err: serde_json::Error) -> Self {
        CentinelaError::Parse(format!("JSON error: {}", err))
    }
}

impl From<image::ImageError> for CentinelaError {
    fn from(err: image::ImageError) -> Self {
        CentinelaError::Encode(err.to_string())
    }
}

impl From<&str> for CentinelaError {
    fn from(err: &str) -> Self {
        CentinelaError::Other(err.to_string())
    }
}

impl From<String> for CentinelaError {
    fn from(err: String) -> Self {
        CentinelaError::Other(err)
    }
}

impl axum::response::IntoResponse for CentinelaError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            CentinelaError::Config(_) | CentinelaError::Storage(_) | CentinelaError::Io(_) => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
            ),
            CentinelaError::Camera(_) | CentinelaError::Encode(_) => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                self.to_string(),
            ),
            CentinelaError::Telegram(_) | CentinelaError::Parse(_) | CentinelaError::Other(_) => {
                (axum::http::StatusCode::BAD_REQUEST, self.to_string())
            }
        };

        axum::response::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(axum::body::Body::from(format!(
                "{{\"error\": \"{}\"}}",
                message
            )))
            .unwrap()
    }
}

/// Result type alias para simplificar el código
pub type Result<T> = std::result::Result<T, CentinelaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centinela_error_display() {
        let err = CentinelaError::Config("missing TELEGRAM_TOKEN".to_string());
        assert_eq!(format!("{}", err), "Config error: missing TELEGRAM_TOKEN");

        let err = CentinelaError::Camera("source closed".to_string());
        assert_eq!(format!("{}", err), "Camera error: source closed");
    }

    #[test]
    fn test_error_from_conversions() {
        // Test From<String>
        let err: CentinelaError = "generic error".to_string().into();
        assert!(matches!(err, CentinelaError::Other(_)));

        // Test From<&str>
        let err: CentinelaError = "string error".into();
        assert!(matches!(err, CentinelaError::Other(_)));

        // Test From<std::io::Error>
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CentinelaError = io_err.into();
        assert!(matches!(err, CentinelaError::Io(_)));
    }

    #[test]
    fn test_error_is_error_trait() {
        let err = CentinelaError::Storage("disk full".to_string());
        let _error: &dyn std::error::Error = &err;
    }
}
