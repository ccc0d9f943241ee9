//! Server configuration
//!
//! Every setting can come from a command-line flag or an environment
//! variable. `main` loads `.env` with dotenvy before parsing, so a local
//! `.env` file behaves like exported variables.

use axum::http::{header, HeaderName, HeaderValue, Method};
use clap::builder::BoolishValueParser;
use clap::Parser;
use qrstamp_core::DEFAULT_LABEL;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::warn;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const WILDCARD: &str = "*";

/// Command-line arguments and environment for the qrstamp server
#[derive(Parser, Debug, Clone)]
#[command(name = "qrstamp-api")]
#[command(about = "Detect sign markers in PDFs and stamp QR codes over them")]
pub struct ServerConfig {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Accepted for compatibility with older deployments; has no effect
    #[arg(long, env = "RELOAD", default_value_t = false, action = clap::ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub reload: bool,

    /// Comma-separated CORS origins, `*` for any
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_values = ["*"])]
    pub allowed_origins: Vec<String>,

    /// Comma-separated CORS methods, `*` for any
    #[arg(long, env = "ALLOWED_METHODS", value_delimiter = ',',
          default_values = ["GET", "POST", "PUT", "DELETE"])]
    pub allowed_methods: Vec<String>,

    /// Comma-separated CORS request headers, `*` for any
    #[arg(long, env = "ALLOWED_HEADERS", value_delimiter = ',', default_values = ["*"])]
    pub allowed_headers: Vec<String>,

    /// Whether CORS responses allow credentials
    #[arg(long, env = "ALLOW_CREDENTIALS", default_value_t = true, action = clap::ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub allow_credentials: bool,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Label printed above the certificate identifier
    #[arg(long, env = "CERTIFICATE_LABEL", default_value = DEFAULT_LABEL)]
    pub certificate_label: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reload: false,
            allowed_origins: vec![WILDCARD.to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec![WILDCARD.to_string()],
            allow_credentials: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            certificate_label: DEFAULT_LABEL.to_string(),
        }
    }
}

fn entries(values: &[String]) -> impl Iterator<Item = &str> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn is_wildcard(values: &[String]) -> bool {
    entries(values).any(|v| v == WILDCARD)
}

impl ServerConfig {
    /// Build the CORS layer.
    ///
    /// Browsers reject `*` together with credentials, so with credentials
    /// enabled a wildcard mirrors the request's origin, method or headers.
    pub fn cors_layer(&self) -> CorsLayer {
        let mirror = self.allow_credentials;

        let origins = if is_wildcard(&self.allowed_origins) {
            if mirror {
                AllowOrigin::mirror_request()
            } else {
                Any.into()
            }
        } else {
            AllowOrigin::list(entries(&self.allowed_origins).filter_map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| warn!("Ignoring invalid CORS origin {:?}", origin))
                    .ok()
            }))
        };

        let methods = if is_wildcard(&self.allowed_methods) {
            if mirror {
                AllowMethods::mirror_request()
            } else {
                Any.into()
            }
        } else {
            AllowMethods::list(entries(&self.allowed_methods).filter_map(|method| {
                Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| warn!("Ignoring invalid CORS method {:?}", method))
                    .ok()
            }))
        };

        let headers = if is_wildcard(&self.allowed_headers) {
            if mirror {
                AllowHeaders::mirror_request()
            } else {
                Any.into()
            }
        } else {
            AllowHeaders::list(entries(&self.allowed_headers).filter_map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| warn!("Ignoring invalid CORS header {:?}", name))
                    .ok()
            }))
        };

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(self.allow_credentials)
            .expose_headers([header::CONTENT_DISPOSITION])
    }
}
