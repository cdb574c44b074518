//! Composición de los reportes de estado y de almacenamiento.
//!
//! La recolección (sondas de sistema) y el formato (texto Markdown para
//! Telegram) están separados para poder testear el formato con datos fijos.

use crate::retention::free_space_gb;
use crate::AppState;
use chrono::{DateTime, Local};
use std::fs;
use sysinfo::System;

#[derive(Clone, Debug)]
pub struct StatusReport {
    pub armed: bool,
    pub uptime_seconds: u64,
    pub events_today: u64,
    pub last_event_time: Option<DateTime<Local>>,
    pub camera_online: bool,
    pub free_space_gb: f64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

#[derive(Clone, Debug)]
pub struct StorageReport {
    pub free_space_gb: f64,
    pub total_files: usize,
    pub total_size_mb: f64,
    pub max_days_to_keep: u32,
    pub min_free_space_gb: f64,
}

pub fn gather_status(state: &AppState) -> StatusReport {
    let snap = state.system.snapshot();

    let mut sys = System::new_all();
    sys.refresh_all();
    let memory_percent = if sys.total_memory() > 0 {
        sys.used_memory() as f32 / sys.total_memory() as f32 * 100.0
    } else {
        0.0
    };

    StatusReport {
        armed: snap.armed,
        uptime_seconds: snap.uptime_seconds,
        events_today: snap.events_today,
        last_event_time: snap.last_event_time,
        camera_online: state.camera.is_live(),
        free_space_gb: free_space_gb(&state.config.storage_path),
        cpu_percent: sys.global_cpu_usage(),
        memory_percent,
    }
}

pub fn gather_storage(state: &AppState) -> StorageReport {
    let dir = &state.config.storage_path;
    let mut total_files = 0usize;
    let mut total_size = 0u64;

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_evidence = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("motion_") && n.ends_with(".jpg"))
                .unwrap_or(false);
            if is_evidence {
                total_files += 1;
                total_size += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            }
        }
    }

    StorageReport {
        free_space_gb: free_space_gb(dir),
        total_files,
        total_size_mb: total_size as f64 / (1024.0 * 1024.0),
        max_days_to_keep: state.config.retention.max_days_to_keep,
        min_free_space_gb: state.config.retention.min_free_space_gb,
    }
}

/// Uptime legible: `H:MM:SS`, con días cuando aplica
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{} days, {}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    }
}

pub fn format_status(report: &StatusReport) -> String {
    format!(
        "🎥 *Security Camera Status*\n\
         🔐 Motion Detection: {}\n\
         ⏱ Uptime: {}\n\
         🔍 Events Today: {}\n\
         🕒 Last Event: {}\n\
         📹 Camera: {}\n\
         💾 Storage Free: {:.2}GB\n\
         🔄 CPU Usage: {:.1}%\n\
         📊 Memory Usage: {:.1}%",
        if report.armed { "Armed" } else { "Disarmed" },
        format_uptime(report.uptime_seconds),
        report.events_today,
        report
            .last_event_time
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "None".to_string()),
        if report.camera_online { "Online" } else { "Offline" },
        report.free_space_gb,
        report.cpu_percent,
        report.memory_percent,
    )
}

pub fn format_storage(report: &StorageReport) -> String {
    format!(
        "📀 *Storage Status*\n\
         💾 Free Space: {:.2}GB\n\
         📁 Total Files: {}\n\
         📦 Storage Used: {:.2}MB\n\
         ⏳ Keeping files for: {} days\n\
         ⚠️ Min Free Space: {}GB",
        report.free_space_gb,
        report.total_files,
        report.total_size_mb,
        report.max_days_to_keep,
        report.min_free_space_gb,
    )
}
