use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};

lazy_static! {
    // Frames recibidos de la fuente de video
    pub static ref FRAMES_PROCESSED_TOTAL: IntCounter = register_int_counter!(
        "centinela_frames_processed_total",
        "Número total de frames procesados por el loop de captura"
    ).expect("No se pudo crear el contador FRAMES_PROCESSED_TOTAL");

    // Eventos de movimiento disparados (tras la puerta de alertas)
    pub static ref MOTION_EVENTS_TOTAL: IntCounter = register_int_counter!(
        "centinela_motion_events_total",
        "Número total de eventos de movimiento disparados"
    ).expect("No se pudo crear el contador MOTION_EVENTS_TOTAL");

    // Evidencias borradas por los barridos de retención
    pub static ref EVIDENCE_DELETED_TOTAL: IntCounter = register_int_counter!(
        "centinela_evidence_deleted_total",
        "Número total de archivos de evidencia eliminados por retención"
    ).expect("No se pudo crear el contador EVIDENCE_DELETED_TOTAL");

    // Comandos de operador atendidos
    pub static ref COMMANDS_TOTAL: IntCounter = register_int_counter!(
        "centinela_commands_total",
        "Número total de comandos de Telegram atendidos"
    ).expect("No se pudo crear el contador COMMANDS_TOTAL");

    // Duración de cada ciclo de retención
    pub static ref SWEEP_DURATION_SECONDS: Histogram = register_histogram!(
        "centinela_sweep_duration_seconds",
        "Duración de los ciclos de barrido de retención"
    ).expect("No se pudo crear el histograma SWEEP_DURATION_SECONDS");
}

/// Gather all metrics and encode them in Prometheus format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
