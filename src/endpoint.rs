//! `ws://` endpoint parsing

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::MAX_HOST_LEN;
use crate::error::{Error, Result};

/// Default port for plain `ws://` URLs
pub const DEFAULT_PORT: u16 = 80;

/// Host, port and request target of a `ws://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Parse `ws://host[:port][/path]`
    ///
    /// `wss://` and any other scheme are rejected; TLS is not supported.
    pub fn parse(input: &str) -> Result<Self> {
        if input.chars().any(char::is_whitespace) {
            return Err(Error::InvalidUrl("whitespace in URL"));
        }

        let url = Url::parse(input).map_err(|e| match e {
            url::ParseError::EmptyHost => Error::InvalidUrl("missing host"),
            url::ParseError::InvalidPort => Error::InvalidUrl("invalid port"),
            url::ParseError::RelativeUrlWithoutBase => Error::InvalidUrl("missing scheme"),
            _ => Error::InvalidUrl("malformed URL"),
        })?;

        if url.scheme() != "ws" {
            return Err(Error::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(Error::InvalidUrl("missing host"))?;
        if host.len() > MAX_HOST_LEN {
            return Err(Error::HostTooLong(host.len()));
        }

        let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);

        let mut path = String::from(url.path());
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Host name or address literal
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request target sent in the upgrade request line, always starting with `/`
    #[inline]
    pub fn request_target(&self) -> &str {
        &self.path
    }

    /// Value of the `Host` header: the port is only included when it is not 80
    pub fn host_header(&self) -> String {
        if self.port == DEFAULT_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}:{}{}", self.host, self.port, self.path)
    }
}
