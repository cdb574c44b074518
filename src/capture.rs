//! Loop principal de captura: buffer de frames, detección y disparo de eventos.

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::metrics::{FRAMES_PROCESSED_TOTAL, MOTION_EVENTS_TOTAL};
use crate::motion::{AlertGate, MotionDetector};
use crate::AppState;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Detector + puerta de alertas, propiedad exclusiva del loop de captura.
/// Separado del loop para poder ejercitar secuencias de frames en tests.
pub struct MotionPipeline {
    detector: MotionDetector,
    gate: AlertGate,
}

impl MotionPipeline {
    pub fn new(config: &DetectorConfig) -> Self {
        MotionPipeline {
            detector: MotionDetector::new(config.min_area),
            gate: AlertGate::new(config.cooldown),
        }
    }

    /// Evalúa un frame. Con el sistema desarmado la detección se salta por
    /// completo (ni el modelo de fondo ni la puerta se tocan).
    pub fn evaluate(&mut self, frame: &Frame, armed: bool, now: Instant) -> bool {
        if !armed {
            return false;
        }
        let raw = self.detector.apply(frame);
        self.gate.signal(raw, now)
    }
}

/// Nombre de archivo de evidencia con la marca de tiempo embebida.
/// El formato es load-bearing: el barrido por edad lo vuelve a parsear.
pub fn evidence_filename(at: DateTime<Local>) -> String {
    format!("motion_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

/// Consume frames de la fuente hasta que esta se agote (fatal para este loop;
/// no hay reconexión automática aquí, eso es asunto del driver).
///
/// Por frame, en orden estricto: (1) actualizar el FrameBuffer siempre, armado
/// o no, para que la vista en vivo siga funcionando; (2) con el sistema
/// desarmado, pasar al siguiente frame; (3) detección; (4) puerta de alertas;
/// (5) si dispara, persistir la evidencia y notificar.
pub async fn run_capture_loop(mut rx: mpsc::Receiver<Frame>, state: Arc<AppState>) {
    let mut pipeline = MotionPipeline::new(&state.config.detector);

    while let Some(frame) = rx.recv().await {
        FRAMES_PROCESSED_TOTAL.inc();
        let armed = state.system.is_armed();

        state.frame_buffer.update(frame.clone());

        if !armed {
            continue;
        }

        if pipeline.evaluate(&frame, true, Instant::now()) {
            handle_event(&frame, &state).await;
        }
    }

    // Fuente agotada: fatal para el loop de captura
    log::error!("❌ La fuente de video terminó; el loop de captura se detiene");
}

/// Gestiona un evento disparado: evidencia a disco, alerta de texto, foto.
/// Ningún fallo periférico aborta el loop; se registra y se sigue.
async fn handle_event(frame: &Frame, state: &AppState) {
    let fired_at = frame.captured_at;
    MOTION_EVENTS_TOTAL.inc();
    log::info!("🚶 Movimiento detectado a las {}", fired_at.format("%H:%M:%S"));

    let jpeg = match frame.to_jpeg() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::error!("❌ Error al codificar la evidencia: {}", e);
            None
        }
    };

    if let Some(ref jpeg) = jpeg {
        if let Err(e) = persist_evidence(state, jpeg, fired_at) {
            log::error!("❌ Error al guardar la evidencia: {}", e);
        }
    }

    let alert = format!(
        "Motion detected! {}",
        fired_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Err(e) = state.telegram.send_message(&alert).await {
        log::error!("❌ Error al enviar alerta por Telegram: {}", e);
    }
    if let Some(jpeg) = jpeg {
        if let Err(e) = state.telegram.send_photo(jpeg).await {
            log::error!("❌ Error al enviar foto por Telegram: {}", e);
        }
    }

    state.system.record_event(fired_at);
}

fn persist_evidence(state: &AppState, jpeg: &[u8], at: DateTime<Local>) -> Result<()> {
    std::fs::create_dir_all(&state.config.storage_path)?;
    let path: PathBuf = state.config.storage_path.join(evidence_filename(at));
    std::fs::write(&path, jpeg)?;
    log::info!("💾 Evidencia guardada: {}", path.display());
    Ok(())
}
