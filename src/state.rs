//! Estado compartido del sistema: flag de armado y contadores de eventos.
//!
//! Disciplina de escritura (un escritor por campo): `armed` lo escribe el
//! loop de comandos y lo lee el loop de captura; `events_today` y
//! `last_event_time` los escribe el loop de captura y los lee el loop de
//! comandos para el reporte de estado. Consistencia eventual es suficiente.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct SystemState {
    armed: AtomicBool,
    events_today: AtomicU64,
    last_event_time: Mutex<Option<DateTime<Local>>>,
    pub started_at: DateTime<Local>,
    pub start_instant: Instant,
}

/// Lectura puntual del estado, para componer reportes
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub armed: bool,
    pub events_today: u64,
    pub last_event_time: Option<DateTime<Local>>,
    pub uptime_seconds: u64,
}

impl SystemState {
    pub fn new(armed: bool) -> Self {
        SystemState {
            armed: AtomicBool::new(armed),
            events_today: AtomicU64::new(0),
            last_event_time: Mutex::new(None),
            started_at: Local::now(),
            start_instant: Instant::now(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Relaxed);
    }

    /// Registra un evento disparado: incrementa el contador exactamente una
    /// vez y actualiza la marca de tiempo del último evento.
    // Nota: "events today" son eventos desde el arranque del proceso; no hay
    // reinicio a medianoche, igual que en el comportamiento original.
    pub fn record_event(&self, at: DateTime<Local>) {
        self.events_today.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_event_time.lock() {
            *last = Some(at);
        }
    }

    pub fn events_today(&self) -> u64 {
        self.events_today.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            armed: self.is_armed(),
            events_today: self.events_today(),
            last_event_time: self.last_event_time.lock().ok().and_then(|g| *g),
            uptime_seconds: self.start_instant.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_disarm_roundtrip() {
        let state = SystemState::new(true);
        assert!(state.is_armed());
        state.set_armed(false);
        assert!(!state.is_armed());
        state.set_armed(true);
        assert!(state.is_armed());
    }

    #[test]
    fn record_event_increments_once() {
        let state = SystemState::new(true);
        assert_eq!(state.events_today(), 0);
        let now = Local::now();
        state.record_event(now);
        state.record_event(now);
        let snap = state.snapshot();
        assert_eq!(snap.events_today, 2);
        assert!(snap.last_event_time.is_some());
    }
}
