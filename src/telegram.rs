//! Canal remoto de Telegram: envío de alertas y loop de comandos.
//!
//! El loop de comandos hace long-polling de `getUpdates` con el cursor de
//! offset explícito entre iteraciones (último update_id + 1), de modo que
//! ningún comando se procesa dos veces a propósito. Todos los handlers son
//! idempotentes, así que un reintento del lado de Telegram es inocuo.

use crate::error::{CentinelaError, Result};
use crate::metrics::COMMANDS_TOTAL;
use crate::status;
use crate::AppState;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Timeout del long-poll de getUpdates (el cliente HTTP espera un poco más)
const POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct UpdatesResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub text: Option<String>,
}

/// Comandos reconocidos del operador
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Arm,
    Disarm,
    Photo,
    Status,
    Storage,
}

impl Command {
    /// Parsea el texto de un mensaje. Texto no reconocido devuelve `None` y
    /// se ignora en silencio (decisión deliberada, no se responde con error).
    pub fn parse(text: &str) -> Option<Command> {
        match text.trim() {
            "/arm" => Some(Command::Arm),
            "/disarm" => Some(Command::Disarm),
            "/photo" => Some(Command::Photo),
            "/status" => Some(Command::Status),
            "/storage" => Some(Command::Storage),
            _ => None,
        }
    }
}

/// Cliente de la API de bots de Telegram
#[derive(Clone, Debug)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(token: &str, chat_id: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(TelegramClient {
            http,
            base: format!("https://api.telegram.org/bot{}", token),
            chat_id: chat_id.to_string(),
        })
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.send_message_inner(text, None).await
    }

    pub async fn send_message_markdown(&self, text: &str) -> Result<()> {
        self.send_message_inner(text, Some("Markdown")).await
    }

    async fn send_message_inner(&self, text: &str, parse_mode: Option<&str>) -> Result<()> {
        let url = format!("{}/sendMessage", self.base);
        let mut body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::Value::from(mode);
        }
        self.http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn send_photo(&self, jpeg: Bytes) -> Result<()> {
        let url = format!("{}/sendPhoto", self.base);
        let part = reqwest::multipart::Part::bytes(jpeg.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("photo", part);
        self.http
            .post(&url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Long-poll de la bandeja de entrada desde `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let url = format!("{}/getUpdates", self.base);
        let resp: UpdatesResponse = self
            .http
            .get(&url)
            .query(&[("offset", offset), ("timeout", POLL_TIMEOUT_SECS as i64)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !resp.ok {
            return Err(CentinelaError::Telegram("getUpdates devolvió ok=false".into()));
        }
        Ok(resp.result)
    }
}

/// Loop de comandos: consume un comando a la vez de la bandeja remota.
/// Un fallo del sondeo se registra y se reintenta; los fallos al responder
/// un comando nunca tumban el loop.
pub async fn run_command_loop(state: Arc<AppState>) {
    let mut last_update_id: i64 = 0;

    loop {
        let updates = match state.telegram.get_updates(last_update_id + 1).await {
            Ok(u) => u,
            Err(e) => {
                log::error!("❌ Error al sondear comandos de Telegram: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            last_update_id = update.update_id;
            let Some(text) = update.message.and_then(|m| m.text) else {
                continue;
            };
            let Some(command) = Command::parse(&text) else {
                // Comando no reconocido: ignorado en silencio
                continue;
            };
            COMMANDS_TOTAL.inc();
            handle_command(command, &state).await;
        }
    }
}

async fn handle_command(command: Command, state: &AppState) {
    log::info!("📨 Comando recibido: {:?}", command);
    let outcome = match command {
        Command::Arm => {
            state.system.set_armed(true);
            state
                .telegram
                .send_message("System armed! Motion detection active.")
                .await
        }
        Command::Disarm => {
            state.system.set_armed(false);
            state
                .telegram
                .send_message("System disarmed! Motion detection disabled.")
                .await
        }
        Command::Photo => send_current_photo(state).await,
        Command::Status => {
            let report = status::gather_status(state);
            state
                .telegram
                .send_message_markdown(&status::format_status(&report))
                .await
        }
        Command::Storage => {
            let report = status::gather_storage(state);
            state
                .telegram
                .send_message_markdown(&status::format_storage(&report))
                .await
        }
    };

    if let Err(e) = outcome {
        log::error!("❌ Error al responder el comando {:?}: {}", command, e);
    }
}

/// Foto bajo demanda desde el FrameBuffer; aviso de error si aún no hay frame
async fn send_current_photo(state: &AppState) -> Result<()> {
    match state.frame_buffer.snapshot() {
        Some(frame) => {
            let jpeg = frame.to_jpeg()?;
            state.telegram.send_photo(jpeg).await
        }
        None => {
            state
                .telegram
                .send_message("⚠️ No frame captured yet")
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_all_commands() {
        assert_eq!(Command::parse("/arm"), Some(Command::Arm));
        assert_eq!(Command::parse("/disarm"), Some(Command::Disarm));
        assert_eq!(Command::parse("/photo"), Some(Command::Photo));
        assert_eq!(Command::parse("/status"), Some(Command::Status));
        assert_eq!(Command::parse("/storage"), Some(Command::Storage));
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        assert_eq!(Command::parse("  /status \n"), Some(Command::Status));
    }

    #[test]
    fn parse_ignores_unknown_text() {
        assert_eq!(Command::parse("/selfdestruct"), None);
        assert_eq!(Command::parse("hola"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("/armado"), None);
    }

    #[test]
    fn updates_response_deserializes() {
        let raw = r#"{
            "ok": true,
            "result": [
                {"update_id": 42, "message": {"text": "/arm"}},
                {"update_id": 43, "message": {}},
                {"update_id": 44}
            ]
        }"#;
        let resp: UpdatesResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.result.len(), 3);
        assert_eq!(resp.result[0].update_id, 42);
        assert_eq!(resp.result[0].message.as_ref().unwrap().text.as_deref(), Some("/arm"));
        assert!(resp.result[2].message.is_none());
    }
}
