//! Frames crudos y el buffer del último frame capturado.

use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, Local};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Un frame en escala de grises (GRAY8) tal como lo entrega la fuente de video.
/// Inmutable después de la captura.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Frame {
            width,
            height,
            data,
            captured_at: Local::now(),
        }
    }

    /// Codifica el frame como JPEG (para evidencias, fotos y el stream en vivo)
    pub fn to_jpeg(&self) -> Result<Bytes> {
        let img = image::GrayImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| crate::error::CentinelaError::Encode("invalid frame buffer".into()))?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg)?;
        Ok(Bytes::from(out.into_inner()))
    }
}

/// Buffer del frame más reciente, compartido entre el loop de captura (escritor)
/// y los consumidores (comando /photo, stream MJPEG).
///
/// `update` reemplaza el frame bajo exclusión mutua; `snapshot` devuelve el
/// último frame almacenado (o `None` si aún no llegó ninguno). Los lectores
/// nunca observan un frame parcial: se intercambia un `Arc` completo y la
/// sección crítica del productor es solo ese intercambio.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    inner: Mutex<Option<Arc<Frame>>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            inner: Mutex::new(None),
        }
    }

    pub fn update(&self, frame: Frame) {
        let frame = Arc::new(frame);
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(frame);
        }
    }

    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.inner.lock().ok().and_then(|g| g.clone())
    }
}
