//! # Handler de Conexiones
//! src/server/handler.rs
//!
//! Atiende una conexión completa dentro de un thread del pool:
//!
//! ```text
//! leer request ──► parsear ──► serve_request ──► escribir response
//!                                   │
//!                      caché ◄──────┴──────► disco
//! ```
//!
//! Cada conexión termina con exactamente un estado registrado en las
//! estadísticas y una línea en el access log, salvo que el cliente cierre
//! (o expire el timeout) antes de mandar un solo byte: en ese caso no hay
//! a quién responder.

use super::context::WorkerContext;
use crate::cache::Source;
use crate::error::{LogError, SyncError};
use crate::http::{content_type_for, Method, Request, Response, StatusCode};
use crate::logging::AccessEntry;
use crate::stats::CacheResult;
use chrono::Local;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Tamaño máximo del request (request line + headers)
pub const MAX_REQUEST_BYTES: usize = 8192;

/// Estado terminal de una conexión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: StatusCode,
    /// Bytes de body enviados
    pub bytes: u64,
}

/// Atiende `stream` de principio a fin y lo cierra.
///
/// Retorna `Ok(None)` si la conexión llegó rota (sin request). Solo los
/// fallos de los semáforos compartidos (estadísticas y `log_mutex`) son
/// `Err`.
pub fn handle_connection(ctx: &WorkerContext, mut stream: TcpStream) -> Result<Option<Outcome>, SyncError> {
    let start = Instant::now();
    ctx.stats.connection_opened()?;

    let result = serve_connection(ctx, &mut stream, start);
    ctx.stats.connection_closed()?;

    // El stream se cierra aquí, una sola vez, pase lo que pase. El cliente
    // ve el EOF recién cuando estadísticas y access log están al día.
    drop(stream);
    result
}

fn serve_connection(
    ctx: &WorkerContext,
    stream: &mut TcpStream,
    start: Instant,
) -> Result<Option<Outcome>, SyncError> {
    let timeout = ctx.config.socket_timeout();
    if let Err(e) = stream
        .set_read_timeout(timeout)
        .and_then(|_| stream.set_write_timeout(timeout))
    {
        tracing::debug!(error = %e, "cannot set socket timeouts");
    }
    let client = stream.peer_addr().ok().map(|addr| addr.ip());

    // 1. Leer el request
    let raw = match read_request(stream) {
        Ok(raw) if !raw.is_empty() => raw,
        Ok(_) => {
            tracing::debug!(client = ?client, "connection closed before request");
            return Ok(None);
        }
        Err(e) => {
            tracing::debug!(client = ?client, error = %e, "broken connection");
            return Ok(None);
        }
    };

    // 2. Parsear y atender
    let (request, response, cache) = match Request::parse(&raw) {
        Ok(request) => {
            let (response, cache) = serve_request(ctx, &request);
            let response = if *request.method() == Method::HEAD {
                response.head_only()
            } else {
                response
            };
            (Some(request), response, cache)
        }
        Err(e) => {
            tracing::debug!(client = ?client, error = %e, "malformed request");
            (None, Response::error(StatusCode::BadRequest), None)
        }
    };

    // 3. Escribir (best effort: una escritura fallida no cambia el estado)
    if let Err(e) = write_response(stream, &response) {
        tracing::debug!(client = ?client, error = %e, "response write failed");
    }

    // 4. Estadísticas y access log
    let outcome = Outcome {
        status: response.status(),
        bytes: response.body_len() as u64,
    };
    ctx.stats
        .record_response(outcome.status.as_u16(), outcome.bytes, start.elapsed())?;
    if let Some(cache) = cache {
        ctx.stats.record_cache(cache)?;
    }

    let (method, path, version) = match &request {
        Some(r) => (r.method().as_str(), r.path(), r.version()),
        None => ("-", "-", "-"),
    };
    let entry = AccessEntry {
        client,
        time: Local::now(),
        method,
        path,
        version,
        status: outcome.status.as_u16(),
        bytes: outcome.bytes,
    };
    match ctx.access_log.append(&entry) {
        Ok(()) => {}
        Err(LogError::Sync(e)) => return Err(e),
        Err(LogError::Io(e)) => {
            tracing::warn!(log = %ctx.access_log.path().display(), error = %e, "access log write failed");
        }
    }

    tracing::debug!(
        worker = ctx.id,
        method,
        path,
        status = outcome.status.as_u16(),
        bytes = outcome.bytes,
        latency_us = start.elapsed().as_micros() as u64,
        "request served"
    );

    Ok(Some(outcome))
}

/// Lee hasta el fin de los headers, `MAX_REQUEST_BYTES` o EOF
fn read_request(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() >= MAX_REQUEST_BYTES || has_header_end(&buffer) {
            break;
        }
    }

    buffer.truncate(MAX_REQUEST_BYTES);
    Ok(buffer)
}

fn has_header_end(buffer: &[u8]) -> bool {
    buffer.windows(4).any(|w| w == b"\r\n\r\n")
}

fn write_response(stream: &mut TcpStream, response: &Response) -> io::Result<()> {
    stream.write_all(&response.to_bytes())?;
    stream.flush()
}

/// Produce la respuesta para un request ya parseado.
///
/// El segundo valor indica cómo se resolvió el caché cuando se sirvió
/// un archivo.
pub fn serve_request(ctx: &WorkerContext, request: &Request) -> (Response, Option<CacheResult>) {
    // 1. Solo GET y HEAD
    if !request.method().is_supported() {
        let response = Response::error(StatusCode::MethodNotAllowed).with_header("Allow", "GET, HEAD");
        return (response, None);
    }

    // 2. Nada de `..`
    let path = match resolve_path(&ctx.document_root, request.path()) {
        Some(path) => path,
        None => {
            tracing::info!(path = request.path(), "path traversal rejected");
            return (Response::error(StatusCode::Forbidden), None);
        }
    };

    // 3. Caché o disco
    let key = path.to_string_lossy();
    match ctx.cache.get_or_load(&key, || read_file(&path)) {
        Ok(fetched) => {
            let cache = match fetched.source {
                Source::Cache => CacheResult::Hit,
                Source::Disk => CacheResult::Miss,
                Source::Flight => CacheResult::Shared,
            };
            let response = Response::new(StatusCode::Ok)
                .with_header("Content-Type", content_type_for(&path))
                .with_body_bytes(fetched.data);
            (response, Some(cache))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => (Response::error(StatusCode::NotFound), None),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "file read failed");
            (Response::error(StatusCode::InternalServerError), None)
        }
    }
}

/// Resuelve el path de un request contra `root`.
///
/// Retorna `None` si el path tiene un segmento `..` o un byte NUL. Un
/// path que termina en `/` sirve el `index.html` de ese directorio.
pub fn resolve_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    if request_path.contains('\0') {
        return None;
    }

    let mut resolved = root.to_path_buf();
    for segment in request_path.split('/') {
        match segment {
            ".." => return None,
            "" | "." => {}
            name => resolved.push(name),
        }
    }

    if request_path.ends_with('/') {
        resolved.push("index.html");
    }
    Some(resolved)
}

/// Lee un archivo regular completo.
///
/// Cualquier fallo al abrirlo (o que no sea un archivo regular) es
/// `NotFound`; una lectura que no trae exactamente `len` bytes es un
/// error distinto y termina en 500.
fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let not_found = |e: io::Error| io::Error::new(io::ErrorKind::NotFound, e);

    let mut file = File::open(path).map_err(not_found)?;
    let metadata = file.metadata().map_err(not_found)?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
    }

    let expected = metadata.len() as usize;
    let mut data = Vec::new();
    data.try_reserve_exact(expected)
        .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
    file.read_to_end(&mut data)?;

    if data.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("partial read: {} of {} bytes", data.len(), expected),
        ));
    }
    Ok(data)
}
