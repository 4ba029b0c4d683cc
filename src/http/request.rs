//! # Parsing de Requests HTTP
//! src/http/request.rs
//!
//! Parser HTTP/1.0 y HTTP/1.1 escrito desde cero.
//!
//! ## Formato de un Request
//!
//! ```text
//! GET /path?param1=value1 HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! User-Agent: curl/7.68.0\r\n
//! \r\n
//! ```
//!
//! Cualquier token de método es sintácticamente válido; decidir qué
//! métodos se atienden es trabajo del handler (405, no 400).

use std::collections::HashMap;

/// Método HTTP del request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// HEAD - Como GET pero solo retorna headers
    HEAD,

    /// POST - No soportado por el servidor de archivos
    POST,

    /// Cualquier otro token (PUT, DELETE, ...)
    Other(String),
}

impl Method {
    /// Parsea un método HTTP. El token debe ser letras ASCII mayúsculas.
    fn from_token(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ParseError::InvalidRequestLine);
        }
        Ok(match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            other => Method::Other(other.to_string()),
        })
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::Other(token) => token,
        }
    }

    /// ¿Es un método que el servidor de archivos atiende?
    pub fn is_supported(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }
}

/// Representa un request HTTP parseado
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP
    method: Method,

    /// Path decodificado (ej: "/docs/index.html")
    path: String,

    /// Query parameters parseados
    query_params: HashMap<String, String>,

    /// Headers HTTP
    headers: HashMap<String, String>,

    /// "HTTP/1.0" o "HTTP/1.1"
    version: String,
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request incompleto o truncado
    IncompleteRequest,

    /// Formato inválido de la request line
    InvalidRequestLine,

    /// Path que no empieza con '/' o con escapes `%` inválidos
    InvalidPath(String),

    /// Versión HTTP no soportada
    InvalidHttpVersion(String),

    /// Header malformado
    InvalidHeader(String),

    /// Request vacío
    EmptyRequest,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::IncompleteRequest => write!(f, "Incomplete HTTP request"),
            ParseError::InvalidRequestLine => write!(f, "Invalid request line format"),
            ParseError::InvalidPath(p) => write!(f, "Invalid request path: {}", p),
            ParseError::InvalidHttpVersion(v) => write!(f, "Invalid HTTP version: {}", v),
            ParseError::InvalidHeader(h) => write!(f, "Invalid header: {}", h),
            ParseError::EmptyRequest => write!(f, "Empty request"),
        }
    }
}

impl std::error::Error for ParseError {}

impl Request {
    /// Parsea un request desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use concurrent_http::http::Request;
    ///
    /// let raw = b"GET /docs/a%20b.html?lang=es HTTP/1.1\r\nHost: x\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/docs/a b.html");
    /// assert_eq!(request.query_param("lang"), Some("es"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let request_str =
            std::str::from_utf8(buffer).map_err(|_| ParseError::InvalidRequestLine)?;

        if request_str.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        let lines: Vec<&str> = request_str.split("\r\n").collect();

        // 1. Request line
        let (method, path, query_params, version) = Self::parse_request_line(lines[0])?;

        // 2. Headers hasta la línea vacía
        let headers = Self::parse_headers(&lines[1..])?;

        Ok(Request {
            method,
            path,
            query_params,
            headers,
            version,
        })
    }

    /// Formato: `GET /path?query HTTP/1.1`
    fn parse_request_line(
        line: &str,
    ) -> Result<(Method, String, HashMap<String, String>, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Exactamente 3 partes: METHOD PATH VERSION
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::from_token(parts[0])?;

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        let (path, query_params) = Self::parse_path_and_query(parts[1])?;

        Ok((method, path, query_params, version))
    }

    /// Separa el path de la query y decodifica ambos
    fn parse_path_and_query(
        target: &str,
    ) -> Result<(String, HashMap<String, String>), ParseError> {
        let (raw_path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        if !raw_path.starts_with('/') {
            return Err(ParseError::InvalidPath(raw_path.to_string()));
        }
        let path = percent_decode(raw_path)
            .ok_or_else(|| ParseError::InvalidPath(raw_path.to_string()))?;

        let query_params = query.map(Self::parse_query_string).unwrap_or_default();
        Ok((path, query_params))
    }

    /// Ejemplo: "num=10&text=hola+mundo" -> {"num": "10", "text": "hola mundo"}
    fn parse_query_string(query: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();

        for param in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            let value = value.replace('+', " ");
            let decoded = percent_decode(&value).unwrap_or(value);
            params.insert(key.to_string(), decoded);
        }

        params
    }

    /// Cada header tiene formato: "Name: Value"
    fn parse_headers(lines: &[&str]) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();

        for line in lines {
            if line.trim().is_empty() {
                break;
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    // === Accesores ===

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Busca un header sin distinguir mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Decodifica escapes `%XX`. Retorna `None` si un escape es inválido o
/// el resultado no es UTF-8.
pub fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.version(), "HTTP/1.0");
        assert!(request.query_params().is_empty());
    }

    #[test]
    fn test_parse_head_http11() {
        let request = Request::parse(b"HEAD /index.html HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(request.method(), &Method::HEAD);
        assert!(request.method().is_supported());
        assert_eq!(request.version(), "HTTP/1.1");
    }

    #[test]
    fn test_unknown_method_is_parsed() {
        let request = Request::parse(b"DELETE /file HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method(), &Method::Other("DELETE".to_string()));
        assert_eq!(request.method().as_str(), "DELETE");
        assert!(!request.method().is_supported());

        let request = Request::parse(b"POST / HTTP/1.1\r\n\r\n").unwrap();
        assert!(!request.method().is_supported());
    }

    #[test]
    fn test_lowercase_method_is_invalid() {
        let result = Request::parse(b"get / HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidRequestLine)));
    }

    #[test]
    fn test_parse_with_query_params() {
        let request = Request::parse(b"GET /search?q=hola+mundo&x=%41&flag HTTP/1.0\r\n\r\n").unwrap();

        assert_eq!(request.path(), "/search");
        assert_eq!(request.query_param("q"), Some("hola mundo"));
        assert_eq!(request.query_param("x"), Some("A"));
        assert_eq!(request.query_param("flag"), Some(""));
    }

    #[test]
    fn test_path_is_percent_decoded() {
        let request = Request::parse(b"GET /%2e%2e/etc/passwd HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/../etc/passwd");
    }

    #[test]
    fn test_invalid_percent_escape() {
        let result = Request::parse(b"GET /bad%zz HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidPath(_))));

        let result = Request::parse(b"GET /trunc% HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidPath(_))));
    }

    #[test]
    fn test_relative_path_is_invalid() {
        let result = Request::parse(b"GET index.html HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidPath(_))));
    }

    #[test]
    fn test_parse_with_headers() {
        let raw = b"GET / HTTP/1.0\r\nHost: localhost:8080\r\nUser-Agent: test\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("Host"), Some("localhost:8080"));
        assert_eq!(request.header("user-agent"), Some("test"));
    }

    #[test]
    fn test_invalid_header() {
        let result = Request::parse(b"GET / HTTP/1.0\r\nNoColonHere\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHeader(_))));
    }

    #[test]
    fn test_invalid_version() {
        let result = Request::parse(b"GET / HTTP/2.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHttpVersion(_))));
    }

    #[test]
    fn test_empty_request() {
        assert!(matches!(Request::parse(b""), Err(ParseError::EmptyRequest)));
        assert!(matches!(Request::parse(b"\r\n\r\n"), Err(ParseError::EmptyRequest)));
    }

    #[test]
    fn test_invalid_request_line() {
        let result = Request::parse(b"GET\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidRequestLine)));
    }

    #[test]
    fn test_non_utf8() {
        let result = Request::parse(&[0x47, 0x45, 0x54, 0x20, 0xff, 0xfe]);
        assert!(matches!(result, Err(ParseError::InvalidRequestLine)));
    }
}
