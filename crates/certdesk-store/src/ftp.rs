//! ---
//! cd_section: "02-remote-store"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "FTP/FTPS session backend built on suppaftp."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use std::io::Cursor;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{FtpError, NativeTlsConnector, NativeTlsFtpStream, Status};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::model::{Credentials, SecurityMode};
use crate::session::{Connector, RemoteSession};

/// Opens FTP, explicit FTPS, or implicit FTPS sessions.
#[derive(Debug, Clone)]
pub struct FtpConnector {
    timeout: Duration,
}

impl FtpConnector {
    /// `timeout` bounds the TCP connect, the greeting and TLS handshake, and
    /// every later control-socket read/write.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn open(&self, credentials: &Credentials) -> std::result::Result<FtpSession, String> {
        let addrs = resolve(&credentials.host, credentials.effective_port())?;

        let mut stream = match credentials.secure {
            SecurityMode::Plain => {
                NativeTlsFtpStream::connect_with_stream(self.dial(&addrs)?).map_err(describe)?
            }
            SecurityMode::Explicit => NativeTlsFtpStream::connect_with_stream(self.dial(&addrs)?)
                .map_err(describe)?
                .into_secure(tls_connector()?, &credentials.host)
                .map_err(describe)?,
            SecurityMode::Implicit => self.connect_implicit(addrs, &credentials.host)?,
        };

        set_timeouts(stream.get_ref(), self.timeout)?;
        stream
            .login(&credentials.user, &credentials.password)
            .map_err(describe)?;
        stream.transfer_type(FileType::Binary).map_err(describe)?;

        Ok(FtpSession {
            stream,
            closed: false,
        })
    }

    /// Connected control socket with read/write timeouts already applied.
    fn dial(&self, addrs: &[SocketAddr]) -> std::result::Result<TcpStream, String> {
        let socket = connect_any(addrs, self.timeout)?;
        set_timeouts(&socket, self.timeout)?;
        Ok(socket)
    }

    /// suppaftp dials the socket itself for implicit FTPS, so connect, handshake
    /// and greeting run on a worker thread that is abandoned at the deadline.
    fn connect_implicit(
        &self,
        addrs: Vec<SocketAddr>,
        host: &str,
    ) -> std::result::Result<NativeTlsFtpStream, String> {
        let tls = tls_connector()?;
        let domain = host.to_owned();
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("ftps-implicit-connect".into())
            .spawn(move || {
                let outcome =
                    NativeTlsFtpStream::connect_secure_implicit(addrs.as_slice(), tls, &domain)
                        .map_err(describe);
                let _ = tx.send(outcome);
            })
            .map_err(|err| format!("unable to start implicit TLS connect: {err}"))?;

        match rx.recv_timeout(self.timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "implicit TLS connect timed out after {}s",
                self.timeout.as_secs_f32()
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err("implicit TLS connect worker exited without a result".to_owned())
            }
        }
    }
}

impl Connector for FtpConnector {
    fn name(&self) -> &'static str {
        "ftp"
    }

    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteSession>> {
        let session = self.open(credentials).map_err(|reason| StoreError::Connection {
            host: credentials.host.clone(),
            port: credentials.effective_port(),
            reason,
        })?;
        info!(
            host = %credentials.host,
            port = credentials.effective_port(),
            secure = credentials.secure.as_str(),
            "ftp session established"
        );
        Ok(Box::new(session))
    }
}

struct FtpSession {
    stream: NativeTlsFtpStream,
    closed: bool,
}

impl RemoteSession for FtpSession {
    fn ensure_dir(&mut self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match self.stream.mkdir(&current) {
                Ok(()) => debug!(path = %current, "remote directory created"),
                // Most servers answer 550/521 for an existing directory; the cwd below settles it.
                Err(FtpError::UnexpectedResponse(_)) => {}
                Err(err) => return Err(StoreError::transport("mkdir", current, describe(err))),
            }
        }
        self.stream
            .cwd(path)
            .map_err(|err| StoreError::transport("mkdir", path, describe(err)))
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        match self.stream.retr_as_buffer(path) {
            Ok(buffer) => Ok(buffer.into_inner()),
            Err(FtpError::UnexpectedResponse(response))
                if matches!(response.status, Status::FileUnavailable) =>
            {
                Err(StoreError::NotFound {
                    path: path.to_owned(),
                })
            }
            Err(err) => Err(StoreError::transport("read", path, describe(err))),
        }
    }

    fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        let mut reader = Cursor::new(contents);
        let written = self
            .stream
            .put_file(path, &mut reader)
            .map_err(|err| StoreError::transport("write", path, describe(err)))?;
        debug!(path, bytes = written, "remote file stored");
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        self.stream
            .rm(path)
            .map_err(|err| StoreError::transport("delete", path, describe(err)))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .quit()
            .map_err(|err| StoreError::transport("quit", "/", describe(err)))
    }
}

fn resolve(host: &str, port: u16) -> std::result::Result<Vec<SocketAddr>, String> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|err| format!("unable to resolve {host}: {err}"))?
        .collect();
    if addrs.is_empty() {
        return Err(format!("{host} did not resolve to any address"));
    }
    Ok(addrs)
}

/// Try each address in turn; the error lists every failed attempt.
fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> std::result::Result<TcpStream, String> {
    let mut failures = Vec::with_capacity(addrs.len());
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(socket) => return Ok(socket),
            Err(err) => {
                debug!(%addr, error = %err, "ftp address unreachable");
                failures.push(format!("{addr}: {err}"));
            }
        }
    }
    if failures.is_empty() {
        return Err("no address to connect to".to_owned());
    }
    Err(failures.join("; "))
}

fn set_timeouts(socket: &TcpStream, timeout: Duration) -> std::result::Result<(), String> {
    socket
        .set_read_timeout(Some(timeout))
        .and_then(|_| socket.set_write_timeout(Some(timeout)))
        .map_err(|err| format!("unable to configure socket timeouts: {err}"))
}

fn tls_connector() -> std::result::Result<NativeTlsConnector, String> {
    TlsConnector::new()
        .map(NativeTlsConnector::from)
        .map_err(|err| format!("unable to initialise TLS: {err}"))
}

fn describe(err: FtpError) -> String {
    match err {
        FtpError::UnexpectedResponse(response) => format!(
            "{:?}: {}",
            response.status,
            String::from_utf8_lossy(&response.body).trim()
        ),
        other => other.to_string(),
    }
}
