//! Fire-and-forget statsd emission over UDP.
//!
//! Datagrams use the datadog flavour (`prefix.name:value|type|#tag:v,...`).
//! A disabled sink swallows every call so call sites never branch, and
//! send failures are logged at debug and otherwise ignored; the probe
//! never stalls on its own metrics.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::net::UdpSocket;
use tracing::debug;

pub struct StatsdSink {
    socket: Option<UdpSocket>,
    target: String,
    prefix: String,
}

impl StatsdSink {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self {
            socket: None,
            target: String::new(),
            prefix: String::new(),
        }
    }

    pub fn connect(host: &str, port: u16, prefix: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("binding statsd socket")?;
        socket
            .set_nonblocking(true)
            .context("setting statsd socket nonblocking")?;
        Ok(Self {
            socket: Some(socket),
            target: format!("{host}:{port}"),
            prefix: prefix.to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.socket.is_some()
    }

    pub fn count(&self, name: &str, value: u64, tags: &[String]) {
        self.send(name, &value.to_string(), "c", tags);
    }

    pub fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        self.send(name, &format!("{value}"), "g", tags);
    }

    pub fn timing(&self, name: &str, millis: i64, tags: &[String]) {
        self.send(name, &millis.to_string(), "ms", tags);
    }

    fn send(&self, name: &str, value: &str, kind: &str, tags: &[String]) {
        let Some(socket) = &self.socket else {
            return;
        };
        let mut datagram = format!("{}.{name}:{value}|{kind}", self.prefix);
        if !tags.is_empty() {
            datagram.push_str("|#");
            for (i, tag) in tags.iter().enumerate() {
                if i > 0 {
                    datagram.push(',');
                }
                let _ = write!(datagram, "{tag}");
            }
        }
        if let Err(err) = socket.send_to(datagram.as_bytes(), &self.target) {
            debug!(error = %err, "statsd send failed");
        }
    }
}
