//! Retención de evidencias: barrido por edad y barrido de emergencia.
//!
//! Una tarea periódica de un solo hilo ejecuta ambas políticas en orden fijo
//! cada ciclo: primero edad, después emergencia si falta espacio. Los errores
//! al borrar un archivo individual se registran y no abortan el barrido.

use crate::metrics::{EVIDENCE_DELETED_TOTAL, SWEEP_DURATION_SECONDS};
use crate::AppState;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::sleep;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// Resumen de una operación de limpieza
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

/// Extrae la fecha embebida de un nombre de evidencia
/// (`motion_YYYYMMDD_HHMMSS.jpg`). `None` si el nombre no parsea; esos
/// archivos se saltan, nunca se borran por edad.
pub fn parse_evidence_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_prefix("motion_")?;
    let date_seg = stem.split('_').next()?;
    NaiveDate::parse_from_str(date_seg, "%Y%m%d").ok()
}

/// Lista los archivos de evidencia (`motion_*.jpg`) del directorio dado
fn evidence_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("motion_") && n.ends_with(".jpg"))
                    .unwrap_or(false)
        })
        .collect()
}

/// Espacio libre en GB del volumen que contiene `path`
pub fn free_space_gb(path: &Path) -> f64 {
    match fs2::statvfs(path) {
        Ok(stats) => stats.available_space() as f64 / GB,
        Err(e) => {
            log::warn!("⚠️ No se pudo leer el espacio libre de {}: {}", path.display(), e);
            f64::MAX // sin lectura no se dispara la emergencia
        }
    }
}

/// Barrido por edad: borra evidencias cuya fecha de nombre sea más vieja que
/// `max_days`. La fecha del nombre es la única fuente de verdad de la edad.
pub fn age_sweep(dir: &Path, max_days: u32, today: NaiveDate) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    for path in evidence_files(dir) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(file_date) = parse_evidence_date(name) else {
            // Nombre malformado: se salta, no es un error
            continue;
        };

        let age_days = today.signed_duration_since(file_date).num_days();
        if age_days <= max_days as i64 {
            continue;
        }

        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(&path) {
            Ok(()) => {
                summary.files_removed += 1;
                summary.bytes_freed += size;
                log::info!("🗑️ Evidencia expirada eliminada: {}", path.display());
            }
            Err(e) => {
                log::warn!("⚠️ No se pudo borrar {}: {}", path.display(), e);
            }
        }
    }

    summary
}

/// Barrido de emergencia: borra evidencias de la más vieja a la más nueva
/// (por fecha de modificación, no por nombre) hasta recuperar el espacio
/// mínimo o quedarse sin archivos. El sondeo de espacio libre se inyecta
/// para poder verificar en tests que no se borra de más.
pub fn emergency_sweep(
    dir: &Path,
    min_free_gb: f64,
    mut probe: impl FnMut() -> f64,
) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    let mut files: Vec<(PathBuf, SystemTime, u64)> = evidence_files(dir)
        .into_iter()
        .filter_map(|p| {
            let meta = fs::metadata(&p).ok()?;
            let mtime = meta.modified().ok()?;
            Some((p, mtime, meta.len()))
        })
        .collect();
    files.sort_by_key(|&(_, mtime, _)| mtime);

    for (path, _, size) in files {
        if probe() >= min_free_gb {
            break;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                summary.files_removed += 1;
                summary.bytes_freed += size;
                log::info!("🗑️ Evidencia eliminada por falta de espacio: {}", path.display());
            }
            Err(e) => {
                log::warn!("⚠️ No se pudo borrar {}: {}", path.display(), e);
            }
        }
    }

    summary
}

/// Tarea periódica de retención: un ciclo cada `sweep_interval`, sin
/// solapamiento posible entre políticas ni entre ciclos.
pub async fn run_retention_task(state: Arc<AppState>) {
    let policy = state.config.retention.clone();
    let dir = state.config.storage_path.clone();

    loop {
        let started = std::time::Instant::now();

        let aged = age_sweep(&dir, policy.max_days_to_keep, chrono::Local::now().date_naive());
        if aged.files_removed > 0 {
            EVIDENCE_DELETED_TOTAL.inc_by(aged.files_removed as u64);
            let freed_mb = aged.bytes_freed as f64 / MB;
            log::info!(
                "🧹 Barrido por edad: {} archivos, {:.2} MB liberados",
                aged.files_removed,
                freed_mb
            );
            let msg = format!(
                "🧹 Storage cleanup: Removed {} files older than {} days\nFreed space: {:.2}MB",
                aged.files_removed, policy.max_days_to_keep, freed_mb
            );
            if let Err(e) = state.telegram.send_message(&msg).await {
                log::error!("❌ Error al notificar la limpieza: {}", e);
            }
        }

        if free_space_gb(&dir) < policy.min_free_space_gb {
            log::warn!("⚠️ Espacio libre por debajo del mínimo, barrido de emergencia");
            let emergency = emergency_sweep(&dir, policy.min_free_space_gb, || free_space_gb(&dir));
            if emergency.files_removed > 0 {
                EVIDENCE_DELETED_TOTAL.inc_by(emergency.files_removed as u64);
                let msg = format!(
                    "⚠️ Emergency storage cleanup performed!\nRemoved {} oldest files\nFreed space: {:.2}MB\nCurrent free space: {:.2}GB",
                    emergency.files_removed,
                    emergency.bytes_freed as f64 / MB,
                    free_space_gb(&dir)
                );
                if let Err(e) = state.telegram.send_message(&msg).await {
                    log::error!("❌ Error al notificar la limpieza de emergencia: {}", e);
                }
            }
        }

        SWEEP_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        sleep(policy.sweep_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_evidence(dir: &Path, name: &str, bytes: usize) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![0u8; bytes]).unwrap();
        path
    }

    fn dated_name(today: NaiveDate, days_ago: i64) -> String {
        let d = today - Duration::days(days_ago);
        format!("motion_{}_120000.jpg", d.format("%Y%m%d"))
    }

    #[test]
    fn parse_evidence_date_roundtrips_with_capture_filename() {
        let at = chrono::Local::now();
        let name = crate::capture::evidence_filename(at);
        assert_eq!(parse_evidence_date(&name), Some(at.date_naive()));
    }

    #[test]
    fn parse_evidence_date_rejects_malformed_names() {
        assert!(parse_evidence_date("motion_nofecha.jpg").is_none());
        assert!(parse_evidence_date("otracosa_20250101_120000.jpg").is_none());
        assert!(parse_evidence_date("motion_.jpg").is_none());
    }

    #[test]
    fn age_sweep_deletes_only_expired_files() {
        let tmp = TempDir::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();

        let old = write_evidence(tmp.path(), &dated_name(today, 11), 1024);
        let fresh = write_evidence(tmp.path(), &dated_name(today, 9), 2048);

        let summary = age_sweep(tmp.path(), 10, today);
        assert_eq!(summary.files_removed, 1);
        assert_eq!(summary.bytes_freed, 1024);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn age_sweep_skips_malformed_names_without_aborting() {
        let tmp = TempDir::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();

        let weird = write_evidence(tmp.path(), "motion_sinfecha.jpg", 100);
        let old = write_evidence(tmp.path(), &dated_name(today, 30), 100);
        let unrelated = write_evidence(tmp.path(), "notas.txt", 100);

        let summary = age_sweep(tmp.path(), 10, today);
        assert_eq!(summary.files_removed, 1);
        assert!(weird.exists(), "el nombre malformado se salta, no se borra");
        assert!(!old.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn emergency_sweep_deletes_oldest_first_and_stops_at_threshold() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();

        let oldest = write_evidence(tmp.path(), "motion_20260801_000000.jpg", 100);
        let middle = write_evidence(tmp.path(), "motion_20260815_000000.jpg", 100);
        let newest = write_evidence(tmp.path(), "motion_20260828_000000.jpg", 100);

        // mtime escalonado, independiente del nombre
        File::open(&oldest)
            .unwrap()
            .set_modified(now - std::time::Duration::from_secs(3000))
            .unwrap();
        File::open(&middle)
            .unwrap()
            .set_modified(now - std::time::Duration::from_secs(2000))
            .unwrap();
        File::open(&newest)
            .unwrap()
            .set_modified(now - std::time::Duration::from_secs(1000))
            .unwrap();

        // El espacio se recupera tras el primer borrado: no debe borrar de más
        let mut readings = vec![0.5f64, 2.0, 2.0].into_iter();
        let summary = emergency_sweep(tmp.path(), 1.0, move || readings.next().unwrap_or(2.0));

        assert_eq!(summary.files_removed, 1);
        assert!(!oldest.exists(), "debe caer primero el más viejo por mtime");
        assert!(middle.exists());
        assert!(newest.exists());
    }

    #[test]
    fn emergency_sweep_runs_out_of_files_gracefully() {
        let tmp = TempDir::new().unwrap();
        write_evidence(tmp.path(), "motion_20260801_000000.jpg", 100);
        write_evidence(tmp.path(), "motion_20260802_000000.jpg", 100);

        // El espacio nunca se recupera: borra todo y termina sin colgarse
        let summary = emergency_sweep(tmp.path(), 1.0, || 0.1);
        assert_eq!(summary.files_removed, 2);
        assert!(evidence_files(tmp.path()).is_empty());
    }
}
