//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! API para construir respuestas y convertirlas a bytes para el socket.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 13\r\n
//! Server: ConcurrentHTTP/1.0\r\n
//! Connection: close\r\n
//! \r\n
//! <h1>Hola</h1>
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use concurrent_http::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("Hello");
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::StatusCode;
use std::collections::HashMap;

/// Valor del header `Server`
pub const SERVER_NAME: &str = "ConcurrentHTTP/1.0";

/// Representa una respuesta HTTP completa
#[derive(Debug, Clone)]
pub struct Response {
    /// Código de estado HTTP
    status: StatusCode,

    /// Headers HTTP (sin duplicados)
    headers: HashMap<String, String>,

    /// Cuerpo de la respuesta
    body: Vec<u8>,

    /// Respuesta a un HEAD: se anuncia el largo pero no se envía el body
    head_only: bool,
}

impl Response {
    /// Crea una respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            head_only: false,
        }
    }

    /// Agrega un header (si ya existe, se sobrescribe)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Establece el body desde un string y calcula `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el body desde bytes (archivos binarios)
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self.headers
            .insert("Content-Length".to_string(), self.body.len().to_string());
        self
    }

    /// Marca la respuesta como respuesta a HEAD
    pub fn head_only(mut self) -> Self {
        self.head_only = true;
        self
    }

    /// Respuesta de error con una página HTML mínima
    ///
    /// # Ejemplo
    /// ```
    /// use concurrent_http::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound);
    /// assert_eq!(response.status(), StatusCode::NotFound);
    /// ```
    pub fn error(status: StatusCode) -> Self {
        let body = format!(
            "<!DOCTYPE html>\n<html><head><title>{status}</title></head>\
             <body><h1>{status}</h1></body></html>\n",
            status = status
        );
        Self::new(status)
            .with_header("Content-Type", "text/html")
            .with_body(&body)
    }

    /// 503 que escribe el Acceptor cuando la cola está llena
    pub fn overload() -> Self {
        Self::error(StatusCode::ServiceUnavailable).with_header("Retry-After", "1")
    }

    /// Convierte la respuesta a bytes listos para enviar por el socket
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(256 + self.body_len());

        // 1. Status line
        result.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());

        // 2. Headers
        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if !self.headers.contains_key("Content-Length") {
            result.extend_from_slice(b"Content-Length: 0\r\n");
        }
        result.extend_from_slice(format!("Server: {}\r\n", SERVER_NAME).as_bytes());
        result.extend_from_slice(b"Connection: close\r\n");

        // 3. Línea vacía
        result.extend_from_slice(b"\r\n");

        // 4. Body (nunca en HEAD)
        if !self.head_only {
            result.extend_from_slice(&self.body);
        }

        result
    }

    /// Bytes de body que realmente se envían
    pub fn body_len(&self) -> usize {
        if self.head_only {
            0
        } else {
            self.body.len()
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
