//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Protocolo HTTP implementado desde cero, sin librerías de alto nivel:
//!
//! - Parsing de requests HTTP/1.0 y HTTP/1.1
//! - Construcción de responses (siempre `Connection: close`)
//! - Códigos de estado
//! - Tipos MIME por extensión
//!
//! ### Formato de Request
//!
//! ```text
//! GET /index.html HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 13\r\n
//! Connection: close\r\n
//! \r\n
//! <h1>Hola</h1>
//! ```

pub mod mime;
pub mod request;
pub mod response;
pub mod status;

// Permite usar `http::Request` en vez de `http::request::Request`
pub use mime::content_type_for;
pub use request::{Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
