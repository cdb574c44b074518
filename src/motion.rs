//! Detección de movimiento sobre frames GRAY8.
//!
//! `MotionDetector` mantiene un modelo de fondo adaptativo por píxel
//! (media y varianza con tasa de aprendizaje exponencial) y clasifica cada
//! frame como "movimiento" si alguna región conectada de primer plano supera
//! el área mínima. `AlertGate` decide, a partir de esa señal cruda, cuándo
//! disparar realmente un evento (flanco de subida + cooldown).

use crate::frame::Frame;
use std::time::{Duration, Instant};

/// Equivalente a una ventana de historia de ~500 frames
const LEARNING_RATE: f32 = 1.0 / 500.0;
/// Umbral sobre la varianza para marcar primer plano (desviación² > k·var)
const VAR_THRESHOLD: f32 = 16.0;
/// Varianza inicial y piso de varianza del modelo
const INITIAL_VARIANCE: f32 = 100.0;
const MIN_VARIANCE: f32 = 4.0;
/// Valor de máscara para píxeles sospechosos de sombra
const SHADOW_VALUE: u8 = 127;
/// Binarización casi a saturación: deja fuera sombras y ruido
const BINARY_THRESHOLD: u8 = 244;

pub struct MotionDetector {
    min_area: usize,
    detect_shadows: bool,
    /// Frames iniciales que actualizan el modelo pero nunca reportan movimiento
    warmup_frames: u64,
    frames_seen: u64,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
}

impl MotionDetector {
    pub fn new(min_area: usize) -> Self {
        MotionDetector {
            min_area,
            detect_shadows: true,
            warmup_frames: 15,
            frames_seen: 0,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
        }
    }

    #[cfg(test)]
    fn with_warmup(min_area: usize, warmup_frames: u64) -> Self {
        let mut d = Self::new(min_area);
        d.warmup_frames = warmup_frames;
        d
    }

    /// Procesa un frame y devuelve si hay primer plano significativo.
    /// Muta únicamente el modelo interno; sin otros efectos.
    pub fn apply(&mut self, frame: &Frame) -> bool {
        let n = (frame.width * frame.height) as usize;
        if frame.data.len() != n {
            // Frame malformado: no tocar el modelo
            return false;
        }

        if self.width != frame.width || self.height != frame.height {
            self.reset_model(frame);
            return false;
        }

        let mut mask = vec![0u8; n];
        for i in 0..n {
            let px = frame.data[i] as f32;
            let d = px - self.mean[i];
            let d2 = d * d;
            let var = self.variance[i];

            if d2 > VAR_THRESHOLD * var {
                mask[i] = if self.detect_shadows && is_shadow(px, self.mean[i]) {
                    SHADOW_VALUE
                } else {
                    255
                };
            }

            // Actualización exponencial del modelo de fondo
            self.mean[i] += LEARNING_RATE * d;
            self.variance[i] = (var + LEARNING_RATE * (d2 - var)).max(MIN_VARIANCE);
        }

        self.frames_seen += 1;
        if self.frames_seen <= self.warmup_frames {
            // Modelo aún inestable: no disparar falsos positivos de arranque
            return false;
        }

        has_region_above(
            &mask,
            frame.width as usize,
            frame.height as usize,
            self.min_area,
        )
    }

    fn reset_model(&mut self, frame: &Frame) {
        self.width = frame.width;
        self.height = frame.height;
        self.mean = frame.data.iter().map(|&p| p as f32).collect();
        self.variance = vec![INITIAL_VARIANCE; frame.data.len()];
        self.frames_seen = 0;
    }
}

/// Heurística de sombra: píxel más oscuro que el fondo pero proporcional a él
fn is_shadow(px: f32, bg: f32) -> bool {
    if bg <= 0.0 || px >= bg {
        return false;
    }
    let ratio = px / bg;
    (0.5..=0.95).contains(&ratio)
}

/// Busca una componente conectada (8-vecinos) de píxeles binarizados cuya
/// área supere `min_area`. Recorrido iterativo con pila para evitar recursión.
fn has_region_above(mask: &[u8], width: usize, height: usize, min_area: usize) -> bool {
    let mut visited = vec![false; mask.len()];
    let mut stack: Vec<usize> = Vec::new();

    for start in 0..mask.len() {
        if visited[start] || mask[start] < BINARY_THRESHOLD {
            continue;
        }

        let mut area = 0usize;
        visited[start] = true;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            area += 1;
            if area > min_area {
                return true;
            }

            let x = idx % width;
            let y = idx / width;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let ni = ny as usize * width + nx as usize;
                    if !visited[ni] && mask[ni] >= BINARY_THRESHOLD {
                        visited[ni] = true;
                        stack.push(ni);
                    }
                }
            }
        }
    }

    false
}

/// Puerta de alertas: máquina de estados Idle/InMotion con cooldown.
///
/// Dispara un evento solo en el flanco de subida de la señal cruda y si pasó
/// el cooldown desde el último disparo. Un flanco dentro del cooldown se
/// descarta (no se encola): la racha en curso ya no puede disparar aunque el
/// cooldown venza a mitad de ella.
pub struct AlertGate {
    in_motion: bool,
    last_fire: Option<Instant>,
    cooldown: Duration,
}

impl AlertGate {
    pub fn new(cooldown: Duration) -> Self {
        AlertGate {
            in_motion: false,
            last_fire: None,
            cooldown,
        }
    }

    /// Alimenta la señal cruda del detector; devuelve `true` si debe
    /// dispararse un evento en este frame.
    pub fn signal(&mut self, raw: bool, now: Instant) -> bool {
        if !raw {
            self.in_motion = false;
            return false;
        }

        if self.in_motion {
            // Señal sostenida: ya estamos en movimiento, sin re-disparo
            return false;
        }

        self.in_motion = true;

        let cooled_down = match self.last_fire {
            Some(last) => now.duration_since(last) > self.cooldown,
            None => true,
        };
        if !cooled_down {
            // El cooldown tiene precedencia: flanco descartado
            return false;
        }

        self.last_fire = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(60);

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn gate_fires_once_per_contiguous_run() {
        let base = Instant::now();
        let mut gate = AlertGate::new(COOLDOWN);

        // Secuencia [F,F,T,T,T,F,F]: exactamente un evento, en el tercer frame
        let signals = [false, false, true, true, true, false, false];
        let fired: Vec<bool> = signals
            .iter()
            .enumerate()
            .map(|(i, &s)| gate.signal(s, at(base, i as u64)))
            .collect();
        assert_eq!(fired, [false, false, true, false, false, false, false]);
    }

    #[test]
    fn gate_suppresses_second_burst_within_cooldown() {
        let base = Instant::now();
        let mut gate = AlertGate::new(COOLDOWN);

        // Primera ráfaga en t=0
        assert!(gate.signal(true, at(base, 0)));
        assert!(!gate.signal(true, at(base, 1)));
        assert!(!gate.signal(false, at(base, 5)));

        // Segunda ráfaga 10 s después, con cooldown de 60 s: suprimida
        assert!(!gate.signal(true, at(base, 10)));
        assert!(!gate.signal(true, at(base, 11)));
        assert!(!gate.signal(false, at(base, 12)));
    }

    #[test]
    fn gate_dropped_edge_is_not_queued() {
        let base = Instant::now();
        let mut gate = AlertGate::new(COOLDOWN);

        assert!(gate.signal(true, at(base, 0)));
        gate.signal(false, at(base, 1));

        // Flanco a los 30 s: dentro del cooldown, descartado
        assert!(!gate.signal(true, at(base, 30)));
        // La misma racha sigue hasta pasado el cooldown: no dispara igualmente
        assert!(!gate.signal(true, at(base, 90)));
        gate.signal(false, at(base, 91));

        // Un nuevo flanco pasado el cooldown sí dispara
        assert!(gate.signal(true, at(base, 92)));
    }

    #[test]
    fn gate_never_two_events_within_cooldown() {
        let base = Instant::now();
        let mut gate = AlertGate::new(COOLDOWN);

        let mut fire_times: Vec<u64> = Vec::new();
        // Señal alternante agresiva cada segundo durante 5 minutos
        for t in 0..300u64 {
            let raw = t % 2 == 0;
            if gate.signal(raw, at(base, t)) {
                fire_times.push(t);
            }
        }
        for pair in fire_times.windows(2) {
            assert!(pair[1] - pair[0] > 60, "eventos a {} y {} s", pair[0], pair[1]);
        }
    }

    fn flat_frame(w: u32, h: u32, value: u8) -> Frame {
        Frame::new(w, h, vec![value; (w * h) as usize])
    }

    fn frame_with_block(w: u32, h: u32, bg: u8, fg: u8, block: usize) -> Frame {
        let mut data = vec![bg; (w * h) as usize];
        for y in 0..block {
            for x in 0..block {
                data[y * w as usize + x] = fg;
            }
        }
        Frame::new(w, h, data)
    }

    #[test]
    fn detector_warmup_reports_no_motion() {
        let mut det = MotionDetector::with_warmup(20, 5);
        // Incluso un frame totalmente distinto no dispara durante el warmup
        assert!(!det.apply(&flat_frame(16, 16, 200)));
        for _ in 0..4 {
            assert!(!det.apply(&flat_frame(16, 16, 0)));
        }
    }

    #[test]
    fn detector_flags_large_bright_region() {
        let mut det = MotionDetector::with_warmup(20, 3);
        for _ in 0..10 {
            det.apply(&flat_frame(32, 32, 50));
        }
        // Bloque 8x8 = 64 px > min_area 20
        assert!(det.apply(&frame_with_block(32, 32, 50, 255, 8)));
    }

    #[test]
    fn detector_ignores_region_below_min_area() {
        let mut det = MotionDetector::with_warmup(20, 3);
        for _ in 0..10 {
            det.apply(&flat_frame(32, 32, 50));
        }
        // Bloque 4x4 = 16 px < min_area 20
        assert!(!det.apply(&frame_with_block(32, 32, 50, 255, 4)));
    }

    #[test]
    fn detector_suppresses_shadows() {
        let mut det = MotionDetector::with_warmup(20, 3);
        for _ in 0..10 {
            det.apply(&flat_frame(32, 32, 200));
        }
        // Oscurecimiento proporcional (ratio 0.7): sombra, no movimiento
        assert!(!det.apply(&frame_with_block(32, 32, 200, 140, 10)));
        // Una región brillante del mismo tamaño sí es movimiento
        assert!(det.apply(&frame_with_block(32, 32, 200, 255, 10)));
    }

    #[test]
    fn detector_skips_malformed_frame() {
        let mut det = MotionDetector::new(20);
        det.apply(&flat_frame(16, 16, 50));
        let bad = Frame {
            width: 16,
            height: 16,
            data: vec![0; 10],
            captured_at: chrono::Local::now(),
        };
        assert!(!det.apply(&bad));
    }

    #[test]
    fn region_search_does_not_merge_separate_blobs() {
        // Dos manchas de 3x3 separadas: ninguna supera min_area 10 por sí sola
        let w = 16usize;
        let mut mask = vec![0u8; w * w];
        for y in 0..3 {
            for x in 0..3 {
                mask[y * w + x] = 255;
                mask[(y + 8) * w + (x + 8)] = 255;
            }
        }
        assert!(!has_region_above(&mask, w, w, 10));
        assert!(has_region_above(&mask, w, w, 8));
    }
}
