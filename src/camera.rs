//! Fuente de video: canal de frames crudos y driver GStreamer.
//!
//! El driver produce frames GRAY8 por un canal acotado (el último frame gana,
//! los atrasados se descartan) y mantiene un flag de vivacidad que el reporte
//! de estado consulta. El resto del sistema solo ve el extremo receptor del
//! canal, así los tests alimentan frames sintéticos sin cámara real.

use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

pub type FrameSender = mpsc::Sender<Frame>;
pub type FrameReceiver = mpsc::Receiver<Frame>;

/// Canal acotado entre el driver de cámara y el loop de captura
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::channel(4)
}

/// Vivacidad de la cámara, mantenida por el driver y leída por /status
#[derive(Debug, Default)]
pub struct CameraHandle {
    live: AtomicBool,
}

impl CameraHandle {
    pub fn new() -> Self {
        CameraHandle {
            live: AtomicBool::new(false),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }
}

#[cfg(feature = "gstreamer")]
pub use driver::start_camera_pipeline;

#[cfg(feature = "gstreamer")]
mod driver {
    use super::{CameraHandle, FrameSender};
    use crate::frame::Frame;
    use gstreamer::{self as gst, prelude::*, MessageView, Pipeline};
    use gstreamer_app as gst_app;
    use std::sync::Arc;

    /// Arma la cadena de captura según el tipo de fuente configurada
    fn pipeline_string(source: &str) -> String {
        let head = if source.starts_with("rtsp://") {
            format!(
                "rtspsrc location={} latency=200 protocols=tcp ! rtph264depay ! h264parse ! avdec_h264",
                source
            )
        } else {
            format!("v4l2src device={}", source)
        };
        format!(
            "{} ! videoconvert ! videoscale ! \
             video/x-raw,format=GRAY8,width=640,height=360 ! \
             appsink name=frames emit-signals=true sync=false max-buffers=1 drop=true",
            head
        )
    }

    /// Corre el pipeline de la cámara y reintenta ante errores. Termina solo
    /// cuando el receptor del canal de frames se cierra.
    pub async fn start_camera_pipeline(
        source: String,
        tx: FrameSender,
        handle: Arc<CameraHandle>,
    ) {
        if let Err(e) = gst::init() {
            log::error!("❌ Error al inicializar GStreamer: {}", e);
            return;
        }

        loop {
            let pipeline_str = pipeline_string(&source);
            log::info!("📷 Pipeline: {}", pipeline_str);

            let pipeline = match gst::parse::launch(&pipeline_str) {
                Ok(element) => match element.downcast::<Pipeline>() {
                    Ok(p) => p,
                    Err(_) => {
                        log::error!("❌ El pipeline no es un Pipeline de GStreamer");
                        return;
                    }
                },
                Err(err) => {
                    log::error!("❌ Error al crear el pipeline: {}. Reintentando en 10 s", err);
                    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                    continue;
                }
            };

            if !attach_frame_sink(&pipeline, tx.clone()) {
                return;
            }

            let Some(bus) = pipeline.bus() else {
                log::error!("❌ Pipeline sin bus, abortando driver de cámara");
                return;
            };

            if let Err(e) = pipeline.set_state(gst::State::Playing) {
                log::error!("❌ Error al iniciar pipeline: {}. Reintentando en 5 s", e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }

            handle.set_live(true);
            log::info!("🎬 Cámara activa, esperando frames...");

            let mut restart = false;
            while !restart {
                if tx.is_closed() {
                    // El loop de captura terminó: apagar y salir
                    let _ = pipeline.set_state(gst::State::Null);
                    handle.set_live(false);
                    return;
                }

                let mut iter = bus.iter_timed(gst::ClockTime::from_seconds(1));
                if let Some(msg) = iter.next() {
                    match msg.view() {
                        MessageView::Eos(_) => {
                            log::warn!("⏹️ Fin del stream (EOS), reiniciando...");
                            restart = true;
                        }
                        MessageView::Error(err) => {
                            log::error!("❌ Error del pipeline: {}", err.error());
                            restart = true;
                        }
                        _ => {}
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }

            handle.set_live(false);
            let _ = pipeline.set_state(gst::State::Null);
            log::warn!("🔄 Reiniciando cámara en 5 s...");
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
    }

    fn attach_frame_sink(pipeline: &Pipeline, tx: FrameSender) -> bool {
        let Some(appsink) = pipeline.by_name("frames") else {
            log::error!("❌ No se encontró el appsink 'frames'");
            return false;
        };
        let Ok(appsink) = appsink.downcast::<gst_app::AppSink>() else {
            log::error!("❌ Error al convertir 'frames' a AppSink");
            return false;
        };

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let s = caps.structure(0).ok_or(gst::FlowError::Error)?;
                    let width: i32 = s.get("width").unwrap_or(640);
                    let height: i32 = s.get("height").unwrap_or(360);

                    let data = map.as_ref();
                    if data.len() != (width * height) as usize {
                        return Ok(gst::FlowSuccess::Ok); // frame malformado, lo saltamos
                    }

                    let frame = Frame::new(width as u32, height as u32, data.to_vec());
                    // Canal lleno: el consumidor va atrasado, gana el siguiente frame
                    let _ = tx.try_send(frame);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        true
    }
}
