//! Session abstraction over the legacy VFP data server.
//!
//! A [`LegacySession`] models one COM/OLE automation handle. The production
//! handle lives in the desktop shell; the core only needs the contract, plus
//! the line-delimited JSON TCP collaborator used for form launches and
//! company sync.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// One handle to the legacy data server.
///
/// Implementations are not thread-safe; callers serialize access through the
/// executor or borrow exclusively from the pool.
pub trait LegacySession: Send {
    /// Opens (or switches to) the database under `company_path`.
    fn open_database(&mut self, company_path: &str) -> Result<()>;

    /// Whether the handle still has a live database.
    fn is_open(&self) -> bool;

    /// The company path currently open, if any.
    fn current_database(&self) -> Option<String>;

    /// Evaluates an expression on the data server and returns the raw reply.
    fn eval(&mut self, expression: &str) -> Result<String>;

    /// Closes the database and releases the handle.
    fn close(&mut self);
}

/// Creates sessions for the executor and the pool.
pub trait SessionFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn LegacySession>>;
}

/// One request frame of the TCP collaborator protocol.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TcpRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a str>,
}

/// One reply frame of the TCP collaborator protocol.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TcpReply {
    ok: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error: String,
}

/// Line-delimited JSON client for the external VFP host.
///
/// Correctness of the core does not depend on it; it exists so company sync
/// and form launches have a transport when the host is running.
pub struct TcpLegacyClient {
    address: String,
    stream: Option<TcpStream>,
    current: Option<String>,
}

impl TcpLegacyClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
            current: None,
        }
    }

    fn connect(&mut self) -> Result<&mut TcpStream> {
        if self.stream.is_none() {
            let stream = TcpStream::connect(&self.address)
                .map_err(|e| Error::LegacyUnavailable(format!("{}: {}", self.address, e)))?;
            stream
                .set_read_timeout(Some(Duration::from_secs(30)))
                .ok();
            debug!("connected to legacy host {}", self.address);
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().unwrap())
    }

    fn roundtrip(&mut self, request: &TcpRequest<'_>) -> Result<String> {
        let frame = serde_json::to_string(request)?;
        let stream = self.connect()?;

        let send = (|| -> std::io::Result<String> {
            stream.write_all(frame.as_bytes())?;
            stream.write_all(b"\n")?;
            stream.flush()?;
            let mut line = String::new();
            BufReader::new(stream.try_clone()?).read_line(&mut line)?;
            Ok(line)
        })();

        let line = match send {
            Ok(line) => line,
            Err(e) => {
                // Connection is suspect after any I/O failure.
                self.stream = None;
                return Err(Error::LegacyUnavailable(e.to_string()));
            }
        };

        let reply: TcpReply = serde_json::from_str(line.trim())
            .map_err(|e| Error::LegacyUnavailable(format!("bad reply frame: {}", e)))?;
        if reply.ok {
            Ok(reply.result)
        } else {
            Err(Error::LegacyUnavailable(reply.error))
        }
    }
}

impl LegacySession for TcpLegacyClient {
    fn open_database(&mut self, company_path: &str) -> Result<()> {
        self.roundtrip(&TcpRequest {
            command: "open",
            payload: Some(company_path),
        })?;
        self.current = Some(company_path.to_string());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some() && self.current.is_some()
    }

    fn current_database(&self) -> Option<String> {
        self.current.clone()
    }

    fn eval(&mut self, expression: &str) -> Result<String> {
        self.roundtrip(&TcpRequest {
            command: "eval",
            payload: Some(expression),
        })
    }

    fn close(&mut self) {
        if self.stream.is_some() {
            let _ = self.roundtrip(&TcpRequest {
                command: "close",
                payload: None,
            });
        }
        self.stream = None;
        self.current = None;
    }
}

/// Factory producing [`TcpLegacyClient`] sessions for one host address.
pub struct TcpSessionFactory {
    address: String,
}

impl TcpSessionFactory {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl SessionFactory for TcpSessionFactory {
    fn create(&self) -> Result<Box<dyn LegacySession>> {
        Ok(Box::new(TcpLegacyClient::new(self.address.clone())))
    }
}
