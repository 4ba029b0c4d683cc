//! # Access Log
//! src/logging/access_log.rs
//!
//! Registro de accesos en Common Log Format:
//!
//! ```text
//! 127.0.0.1 - - [10/Oct/2025:13:55:36 -0600] "GET /index.html HTTP/1.1" 200 2326
//! ```
//!
//! Todos los procesos escriben el mismo archivo. Cada `append` toma el
//! `log_mutex` compartido, rota el archivo si alcanzó `max_bytes` y
//! agrega una línea. Un fallo de escritura nunca afecta la respuesta; un
//! fallo del `log_mutex` sí es fatal (ver [`LogError`]).

use crate::error::LogError;
use crate::stats::SharedStats;
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Datos de una línea del access log
#[derive(Debug, Clone)]
pub struct AccessEntry<'a> {
    pub client: Option<IpAddr>,
    pub time: DateTime<Local>,
    pub method: &'a str,
    pub path: &'a str,
    pub version: &'a str,
    pub status: u16,
    pub bytes: u64,
}

impl AccessEntry<'_> {
    /// Formatea la línea (sin salto de línea)
    pub fn to_line(&self) -> String {
        let client = self
            .client
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{} - - [{}] \"{} {} {}\" {} {}",
            client,
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.path,
            self.version,
            self.status,
            self.bytes
        )
    }
}

/// Access log compartido entre procesos
pub struct AccessLog {
    path: PathBuf,
    max_bytes: u64,
    stats: Arc<SharedStats>,
}

impl AccessLog {
    /// `stats` aporta el `log_mutex` compartido
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, stats: Arc<SharedStats>) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            stats,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Agrega una línea al log
    pub fn append(&self, entry: &AccessEntry<'_>) -> Result<(), LogError> {
        let mut line = entry.to_line();
        line.push('\n');

        let _guard = self.stats.lock_log()?;
        self.write_line(&line)?;
        Ok(())
    }

    /// Requiere el `log_mutex` tomado.
    fn write_line(&self, line: &str) -> io::Result<()> {
        if let Some(rotated) = self.rotate_if_needed()? {
            tracing::info!(rotated = %rotated.display(), "access log rotated");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Renombra el archivo actual si alcanzó `max_bytes`.
    /// Requiere el `log_mutex` tomado.
    fn rotate_if_needed(&self) -> io::Result<Option<PathBuf>> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if self.max_bytes == 0 || size < self.max_bytes {
            return Ok(None);
        }

        let target = self.rotated_name(Local::now());
        fs::rename(&self.path, &target)?;
        Ok(Some(target))
    }

    /// `access.log` -> `access_20251010135536.log` (con sufijo si ya existe)
    fn rotated_name(&self, now: DateTime<Local>) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("access");
        let ext = self.path.extension().and_then(|s| s.to_str()).unwrap_or("log");
        let stamp = now.format("%Y%m%d%H%M%S");

        let mut candidate = self.path.with_file_name(format!("{}_{}.{}", stem, stamp, ext));
        let mut n = 1;
        while candidate.exists() {
            candidate = self
                .path
                .with_file_name(format!("{}_{}-{}.{}", stem, stamp, n, ext));
            n += 1;
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(status: u16) -> AccessEntry<'static> {
        AccessEntry {
            client: Some("127.0.0.1".parse().unwrap()),
            time: Local::now(),
            method: "GET",
            path: "/index.html",
            version: "HTTP/1.1",
            status,
            bytes: 42,
        }
    }

    #[test]
    fn test_common_log_format() {
        let time = Local.with_ymd_and_hms(2025, 10, 10, 13, 55, 36).unwrap();
        let line = AccessEntry {
            time,
            ..entry(200)
        }
        .to_line();

        assert!(line.starts_with("127.0.0.1 - - [10/Oct/2025:13:55:36 "));
        assert!(line.ends_with("] \"GET /index.html HTTP/1.1\" 200 42"));
    }

    #[test]
    fn test_unknown_client() {
        let line = AccessEntry {
            client: None,
            ..entry(404)
        }
        .to_line();
        assert!(line.starts_with("- - - ["));
    }

    #[test]
    fn test_append_writes_lines() {
        let dir = TempDir::new().unwrap();
        let stats = Arc::new(SharedStats::new().unwrap());
        let log = AccessLog::new(dir.path().join("access.log"), 1 << 20, stats);

        log.append(&entry(200)).unwrap();
        log.append(&entry(404)).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\" 200 42"));
        assert!(lines[1].contains("\" 404 42"));
    }

    #[test]
    fn test_unwritable_log_is_io_error() {
        let dir = TempDir::new().unwrap();
        let stats = Arc::new(SharedStats::new().unwrap());
        let log = AccessLog::new(dir.path().join("missing/access.log"), 1 << 20, stats);

        let err = log.append(&entry(200)).unwrap_err();
        assert!(matches!(err, LogError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    }

    #[test]
    fn test_rotation_when_full() {
        let dir = TempDir::new().unwrap();
        let stats = Arc::new(SharedStats::new().unwrap());
        let log = AccessLog::new(dir.path().join("access.log"), 100, stats);

        // Cada línea mide ~70 bytes: la tercera append rota
        for _ in 0..3 {
            log.append(&entry(200)).unwrap();
        }

        let rotated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("access_") && name.ends_with(".log"))
            .collect();
        assert_eq!(rotated.len(), 1);

        let current = fs::read_to_string(log.path()).unwrap();
        assert_eq!(current.lines().count(), 1);
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let stats = Arc::new(SharedStats::new().unwrap());
        let log = Arc::new(AccessLog::new(dir.path().join("access.log"), 1 << 20, stats));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        log.append(&entry(200)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 200);
        assert!(contents.lines().all(|l| l.starts_with("127.0.0.1 - - [")));
    }
}
