// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Implicit-TLS FTP client (FTPS, port 990).
//
// The TLS handshake starts as soon as the control socket connects. After
// `PBSZ 0` / `PROT P` every data connection is TLS as well, and resumes the
// control connection's TLS session (printer firmware refuses data channels
// that do not). Passive mode only: the printer never connects back to us.
//
// Lifecycle:
//   Disconnected -> Connected -> Authenticated -> ProtectedDataMode
//     -> Transferring -> ProtectedDataMode ... -> Closed
//
// This type reports faults and never retries; see `upload` for the policy.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::{debug, info, instrument, warn};

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_security::TlsContext;

use crate::reply::{Reply, parse_pasv, read_reply};
use crate::session::{SessionFactory, TransferSession};

type ControlStream = BufReader<TlsStream<TcpStream>>;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    ProtectedDataMode,
    Transferring,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::ProtectedDataMode => "protected-data-mode",
            Self::Transferring => "transferring",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One FTPS session with a printer.
pub struct SecureTransferClient {
    connector: TlsConnector,
    /// Socket-level timeout for every command, data write and reply.
    io_timeout: Duration,
    state: SessionState,
    control: Option<ControlStream>,
    server_name: Option<ServerName<'static>>,
    peer_ip: Option<IpAddr>,
    passive: bool,
}

impl SecureTransferClient {
    pub fn new(tls: &TlsContext, io_timeout: Duration) -> Self {
        Self {
            connector: TlsConnector::from(tls.client_config()),
            io_timeout,
            state: SessionState::Disconnected,
            control: None,
            server_name: None,
            peer_ip: None,
            passive: true,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// TCP connect, TLS handshake and the `220` greeting, all inside
    /// `connect_timeout`.
    #[instrument(skip(self))]
    pub async fn connect(&mut self, host: &str, port: u16, connect_timeout: Duration) -> Result<()> {
        self.require(SessionState::Disconnected)?;

        let addr = format!("{host}:{port}");
        let server_name = ServerName::try_from(host.to_owned()).map_err(|e| {
            SpoolcastError::Configuration(format!("invalid printer address {host:?}: {e}"))
        })?;

        let connector = self.connector.clone();
        let name = server_name.clone();
        let target = addr.clone();
        let handshake = async move {
            let tcp = TcpStream::connect(&target).await.map_err(|e| {
                SpoolcastError::TransientTransfer(format!("connect to {target}: {e}"))
            })?;
            let peer = tcp.peer_addr()?.ip();
            let tls = connector.connect(name, tcp).await.map_err(handshake_error)?;
            let mut control = BufReader::new(tls);
            let greeting = read_reply(&mut control).await?;
            Ok::<_, SpoolcastError>((control, peer, greeting))
        };

        let (control, peer, greeting) = timeout(connect_timeout, handshake)
            .await
            .map_err(|_| SpoolcastError::ConnectTimeout {
                addr: addr.clone(),
                timeout: connect_timeout,
            })??;
        let greeting = greeting.expect_class(2)?;

        info!(addr = %addr, greeting = %greeting, "FTPS control connection open");
        self.control = Some(control);
        self.server_name = Some(server_name);
        self.peer_ip = Some(peer);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// `USER` / `PASS`. Any permanent rejection is an authentication failure.
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, user: &str, password: &str) -> Result<()> {
        self.require(SessionState::Connected)?;

        let reply = reject_as_auth(self.command("USER", Some(user)).await?)?;
        if reply.class() != 2 {
            reply.expect_class(3)?;
            reject_as_auth(self.command("PASS", Some(password)).await?)?.expect_class(2)?;
        }

        debug!("logged in");
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// `PBSZ 0` then `PROT P`. Every data connection after this is TLS.
    pub async fn enable_protected_data_mode(&mut self) -> Result<()> {
        self.require(SessionState::Authenticated)?;
        self.command("PBSZ", Some("0")).await?.expect_class(2)?;
        self.command("PROT", Some("P")).await?.expect_class(2)?;
        debug!("data channel protection set to private");
        self.state = SessionState::ProtectedDataMode;
        Ok(())
    }

    pub fn set_passive_mode(&mut self, enabled: bool) {
        self.passive = enabled;
    }

    /// Upload `source` as `remote_name`.
    ///
    /// Returns the number of bytes sent. A timeout waiting for the final
    /// `226` (or for the data channel to close) once every byte is out is
    /// reported as `SilentTimeout`; the caller decides what that means.
    #[instrument(skip(self, source, on_progress), fields(source = %source.display()))]
    pub async fn store_file(
        &mut self,
        source: &Path,
        remote_name: &str,
        buffer_size: usize,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<u64> {
        self.require(SessionState::ProtectedDataMode)?;
        if !self.passive {
            return Err(SpoolcastError::Configuration(
                "active-mode data connections are not supported".into(),
            ));
        }

        let mut file = File::open(source).await?;
        let total = file.metadata().await?.len();

        self.command("TYPE", Some("I")).await?.expect_class(2)?;
        let pasv = self.command("PASV", None).await?.expect_class(2)?;
        let (_, data_port) = parse_pasv(&pasv)?;
        // The data address is the control peer; only the port comes from
        // the reply.
        let peer = self.peer_ip.ok_or(SpoolcastError::InvalidSessionState {
            expected: SessionState::Connected.as_str(),
            actual: self.state.as_str(),
        })?;
        let data_addr = SocketAddr::new(peer, data_port);

        let data_tcp = timeout(self.io_timeout, TcpStream::connect(data_addr))
            .await
            .map_err(|_| {
                SpoolcastError::TransientTransfer(format!("data connection to {data_addr} timed out"))
            })?
            .map_err(|e| {
                SpoolcastError::TransientTransfer(format!("data connection to {data_addr}: {e}"))
            })?;

        self.command("STOR", Some(remote_name)).await?.expect_class(1)?;
        self.state = SessionState::Transferring;

        let mut data = self.open_protected_data_channel(data_tcp).await?;
        info!(remote = remote_name, total, "sending file");

        let sent = send_in_chunks(&mut file, &mut data, buffer_size, self.io_timeout, on_progress).await?;

        match timeout(self.io_timeout, data.shutdown()).await {
            Err(_) => {
                warn!(sent, "data channel close timed out");
                return Err(SpoolcastError::SilentTimeout);
            }
            Ok(Err(e)) => {
                return Err(SpoolcastError::TransientTransfer(format!(
                    "data channel close: {e}"
                )));
            }
            Ok(Ok(())) => {}
        }
        drop(data);

        let io_timeout = self.io_timeout;
        let control = self.control_stream()?;
        let done = timeout(io_timeout, read_reply(control))
            .await
            .map_err(|_| {
                warn!(sent, "no transfer-complete reply");
                SpoolcastError::SilentTimeout
            })??;
        let done = done.expect_class(2)?;

        info!(sent, reply = %done, "file stored");
        self.state = SessionState::ProtectedDataMode;
        Ok(sent)
    }

    /// Wrap a freshly connected data socket in TLS, resuming the control
    /// connection's session.
    async fn open_protected_data_channel(&self, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let name = self.server_name.clone().ok_or(SpoolcastError::InvalidSessionState {
            expected: SessionState::Connected.as_str(),
            actual: self.state.as_str(),
        })?;
        timeout(self.io_timeout, self.connector.connect(name, tcp))
            .await
            .map_err(|_| {
                SpoolcastError::TransientTransfer("data channel TLS handshake timed out".into())
            })?
            .map_err(handshake_error)
    }

    /// Send `QUIT` and drop the connection. Safe to call in any state and
    /// more than once; the socket is dropped even if the server never answers.
    pub async fn close(&mut self) {
        if let Some(mut control) = self.control.take() {
            let quit = async {
                let stream = control.get_mut();
                stream.write_all(b"QUIT\r\n").await?;
                stream.flush().await?;
                let reply = read_reply(&mut control).await?;
                Ok::<_, SpoolcastError>(reply)
            };
            match timeout(self.io_timeout, quit).await {
                Ok(Ok(reply)) => debug!(reply = %reply, "control connection closed"),
                Ok(Err(e)) => debug!(error = %e, "QUIT failed, dropping connection"),
                Err(_) => debug!("QUIT timed out, dropping connection"),
            }
        }
        self.server_name = None;
        self.peer_ip = None;
        self.state = SessionState::Closed;
    }

    fn require(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SpoolcastError::InvalidSessionState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    fn control_stream(&mut self) -> Result<&mut ControlStream> {
        let actual = self.state.as_str();
        self.control.as_mut().ok_or(SpoolcastError::InvalidSessionState {
            expected: SessionState::Connected.as_str(),
            actual,
        })
    }

    /// Send one command and read its reply within the I/O timeout.
    /// Only the verb is logged.
    async fn command(&mut self, verb: &'static str, arg: Option<&str>) -> Result<Reply> {
        let line = match arg {
            Some(arg) => format!("{verb} {arg}\r\n"),
            None => format!("{verb}\r\n"),
        };
        let io_timeout = self.io_timeout;
        let control = self.control_stream()?;

        let exchange = async {
            let stream = control.get_mut();
            stream.write_all(line.as_bytes()).await.map_err(write_error)?;
            stream.flush().await.map_err(write_error)?;
            read_reply(control).await
        };
        let reply = timeout(io_timeout, exchange).await.map_err(|_| {
            SpoolcastError::TransientTransfer(format!("no reply to {verb} within {io_timeout:?}"))
        })??;

        debug!(verb, code = reply.code, "command answered");
        Ok(reply)
    }
}

impl fmt::Debug for SecureTransferClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureTransferClient")
            .field("state", &self.state)
            .field("peer_ip", &self.peer_ip)
            .field("passive", &self.passive)
            .finish()
    }
}

impl TransferSession for SecureTransferClient {
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        SecureTransferClient::connect(self, host, port, timeout).await
    }

    async fn login(&mut self, user: &str, password: &str) -> Result<()> {
        SecureTransferClient::login(self, user, password).await
    }

    async fn enable_protected_data_mode(&mut self) -> Result<()> {
        SecureTransferClient::enable_protected_data_mode(self).await
    }

    fn set_passive_mode(&mut self, enabled: bool) {
        SecureTransferClient::set_passive_mode(self, enabled);
    }

    async fn store_file(
        &mut self,
        source: &Path,
        remote_name: &str,
        buffer_size: usize,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<u64> {
        SecureTransferClient::store_file(self, source, remote_name, buffer_size, on_progress).await
    }

    async fn close(&mut self) {
        SecureTransferClient::close(self).await;
    }
}

/// Builds real FTPS sessions sharing one TLS context.
#[derive(Debug, Clone)]
pub struct FtpsSessionFactory {
    tls: TlsContext,
    io_timeout: Duration,
}

impl FtpsSessionFactory {
    pub fn new(tls: TlsContext, io_timeout: Duration) -> Self {
        Self { tls, io_timeout }
    }
}

impl SessionFactory for FtpsSessionFactory {
    type Session = SecureTransferClient;

    fn new_session(&self) -> SecureTransferClient {
        SecureTransferClient::new(&self.tls, self.io_timeout)
    }
}

/// Copy `reader` to `writer` in `chunk_size` pieces, calling `on_progress`
/// with the running total after each one. A write that does not finish
/// within `stall_timeout` aborts the copy.
pub(crate) async fn send_in_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    stall_timeout: Duration,
    on_progress: &mut dyn FnMut(u64),
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        timeout(stall_timeout, writer.write_all(&buf[..n]))
            .await
            .map_err(|_| {
                SpoolcastError::TransientTransfer(format!("data channel stalled after {sent} bytes"))
            })?
            .map_err(|e| {
                SpoolcastError::TransientTransfer(format!("data channel write after {sent} bytes: {e}"))
            })?;
        sent += n as u64;
        on_progress(sent);
    }
    Ok(sent)
}

fn reject_as_auth(reply: Reply) -> Result<Reply> {
    if reply.class() == 5 {
        return Err(SpoolcastError::Auth(reply.to_string()));
    }
    Ok(reply)
}

fn write_error(e: io::Error) -> SpoolcastError {
    SpoolcastError::TransientTransfer(format!("control channel write: {e}"))
}

/// A certificate the CA does not vouch for will not get better on retry.
fn handshake_error(e: io::Error) -> SpoolcastError {
    let bad_cert = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls| matches!(tls, rustls::Error::InvalidCertificate(_)));
    if bad_cert {
        SpoolcastError::Configuration(format!("printer certificate rejected: {e}"))
    } else {
        SpoolcastError::TransientTransfer(format!("TLS handshake: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_rustls::TlsAcceptor;
    use tokio_rustls::rustls::{HandshakeKind, ServerConfig};
    use tokio_rustls::rustls::pki_types::pem::PemObject;
    use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

    const CA_PEM: &[u8] = include_bytes!("../testdata/printer-ca.pem");
    const CERT_PEM: &[u8] = include_bytes!("../testdata/printer-cert.pem");
    const KEY_PEM: &[u8] = include_bytes!("../testdata/printer-key.pem");
    const ACCESS_CODE: &str = "12345678";

    #[derive(Clone, Copy, PartialEq)]
    enum Finish {
        Complete,
        /// Takes the upload but never sends 226.
        Silent,
        /// Reads `QUIT` and never answers.
        HangOnQuit,
    }

    /// What the fake printer saw.
    struct FakePrinter {
        port: u16,
        received: Arc<Mutex<Vec<u8>>>,
        data_handshakes: Arc<Mutex<Vec<Option<HandshakeKind>>>>,
        control_closed: oneshot::Receiver<()>,
    }

    fn tls_context() -> TlsContext {
        TlsContext::from_ca_pem(CA_PEM).expect("client context")
    }

    fn acceptor() -> TlsAcceptor {
        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(CERT_PEM)
            .collect::<std::result::Result<_, _>>()
            .expect("certs");
        let key = PrivateKeyDer::from_pem_slice(KEY_PEM).expect("key");
        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .expect("versions")
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .expect("server config");
        TlsAcceptor::from(Arc::new(config))
    }

    /// Minimal implicit-FTPS printer: one control connection, passive
    /// uploads into `received`.
    async fn fake_printer(finish: Finish) -> FakePrinter {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let data_handshakes = Arc::new(Mutex::new(Vec::new()));
        let handshakes = Arc::clone(&data_handshakes);
        let (closed_tx, control_closed) = oneshot::channel();
        let acceptor = acceptor();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let tls = acceptor.accept(tcp).await.expect("control handshake");
            let mut control = BufReader::new(tls);
            control.get_mut().write_all(b"220 Bambu FTPS ready\r\n").await.expect("greet");
            control.get_mut().flush().await.expect("flush");

            let mut data_listener: Option<TcpListener> = None;
            loop {
                let mut line = String::new();
                if control.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end();
                let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
                let answer = match verb {
                    "USER" => "331 Password required".to_owned(),
                    "PASS" if arg == ACCESS_CODE => "230 Logged in".to_owned(),
                    "PASS" => "530 Login incorrect.".to_owned(),
                    "PBSZ" => "200 PBSZ=0".to_owned(),
                    "PROT" => "200 Protection level set to P".to_owned(),
                    "TYPE" => "200 Switching to Binary mode.".to_owned(),
                    "PASV" => {
                        let data = TcpListener::bind("127.0.0.1:0").await.expect("data bind");
                        let p = data.local_addr().expect("data addr").port();
                        data_listener = Some(data);
                        format!("227 Entering Passive Mode (127,0,0,1,{},{})", p >> 8, p & 0xff)
                    }
                    "STOR" => {
                        let data = data_listener.take().expect("PASV before STOR");
                        let (tcp, _) = data.accept().await.expect("data accept");
                        control.get_mut().write_all(b"150 Ok to send data.\r\n").await.expect("150");
                        control.get_mut().flush().await.expect("flush");
                        let mut tls = acceptor.accept(tcp).await.expect("data handshake");
                        handshakes.lock().expect("handshakes").push(tls.get_ref().1.handshake_kind());
                        let mut bytes = Vec::new();
                        tls.read_to_end(&mut bytes).await.expect("data read");
                        sink.lock().expect("sink").extend_from_slice(&bytes);
                        match finish {
                            Finish::Complete | Finish::HangOnQuit => "226 Transfer complete.".to_owned(),
                            Finish::Silent => continue,
                        }
                    }
                    "QUIT" if finish == Finish::HangOnQuit => continue,
                    "QUIT" => {
                        let _ = control.get_mut().write_all(b"221 Goodbye.\r\n").await;
                        let _ = control.get_mut().flush().await;
                        break;
                    }
                    _ => "502 Command not implemented.".to_owned(),
                };
                control
                    .get_mut()
                    .write_all(format!("{answer}\r\n").as_bytes())
                    .await
                    .expect("reply");
                control.get_mut().flush().await.expect("flush");
            }
            let _ = closed_tx.send(());
        });

        FakePrinter {
            port,
            received,
            data_handshakes,
            control_closed,
        }
    }

    fn payload(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::io::Write::write_all(&mut file, &bytes).expect("write payload");
        file
    }

    async fn ready_client(port: u16) -> SecureTransferClient {
        let mut client = SecureTransferClient::new(&tls_context(), Duration::from_secs(2));
        client.connect("127.0.0.1", port, Duration::from_secs(2)).await.expect("connect");
        client.login("bblp", ACCESS_CODE).await.expect("login");
        client.enable_protected_data_mode().await.expect("protect");
        client.set_passive_mode(true);
        client
    }

    #[tokio::test]
    async fn uploads_file_to_printer() {
        let printer = fake_printer(Finish::Complete).await;
        let file = payload(100_000);
        let mut client = ready_client(printer.port).await;
        assert_eq!(client.state(), SessionState::ProtectedDataMode);

        let mut progress = Vec::new();
        let sent = client
            .store_file(file.path(), "Benchy.gcode.3mf", 8192, &mut |n| progress.push(n))
            .await
            .expect("store");
        client.close().await;

        assert_eq!(sent, 100_000);
        assert_eq!(progress.last().copied(), Some(100_000));
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        let expected: Vec<u8> = (0..100_000).map(|i| (i % 251) as u8).collect();
        assert_eq!(*printer.received.lock().expect("received"), expected);
        assert_eq!(client.state(), SessionState::Closed);
        assert_eq!(
            *printer.data_handshakes.lock().expect("handshakes"),
            [Some(HandshakeKind::Resumed)],
            "data channel must resume the control session"
        );
    }

    #[tokio::test]
    async fn wrong_access_code_is_auth_error() {
        let printer = fake_printer(Finish::Complete).await;
        let mut client = SecureTransferClient::new(&tls_context(), Duration::from_secs(2));
        client.connect("127.0.0.1", printer.port, Duration::from_secs(2)).await.expect("connect");
        let err = client.login("bblp", "wrong").await.unwrap_err();
        assert!(matches!(err, SpoolcastError::Auth(_)));
        client.close().await;
    }

    #[tokio::test]
    async fn missing_completion_reply_is_silent_timeout() {
        let printer = fake_printer(Finish::Silent).await;
        let file = payload(20_000);
        let mut client = ready_client(printer.port).await;
        let err = client
            .store_file(file.path(), "Benchy.gcode.3mf", 8192, &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SpoolcastError::SilentTimeout));
        assert_eq!(printer.received.lock().expect("received").len(), 20_000);
        client.close().await;
    }

    #[tokio::test]
    async fn untrusted_certificate_is_configuration_error() {
        let printer = fake_printer(Finish::Complete).await;
        let other = TlsContext::from_ca_pem(include_bytes!("../testdata/other-ca.pem")).expect("ctx");
        let mut client = SecureTransferClient::new(&other, Duration::from_secs(2));
        let err = client
            .connect("127.0.0.1", printer.port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SpoolcastError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails_retryably() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let mut client = SecureTransferClient::new(&tls_context(), Duration::from_secs(1));
        let err = client.connect("127.0.0.1", port, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(
            err,
            SpoolcastError::TransientTransfer(_) | SpoolcastError::ConnectTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn store_before_protection_is_rejected() {
        let file = payload(10);
        let mut client = SecureTransferClient::new(&tls_context(), Duration::from_secs(1));
        let err = client
            .store_file(file.path(), "x.gcode.3mf", 8192, &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpoolcastError::InvalidSessionState { expected: "protected-data-mode", actual: "disconnected" }
        ));
    }

    #[tokio::test]
    async fn close_drops_socket_when_quit_hangs() {
        let printer = fake_printer(Finish::HangOnQuit).await;
        let io_timeout = Duration::from_millis(300);
        let mut client = SecureTransferClient::new(&tls_context(), io_timeout);
        client
            .connect("127.0.0.1", printer.port, Duration::from_secs(2))
            .await
            .expect("connect");
        client.login("bblp", ACCESS_CODE).await.expect("login");

        let start = std::time::Instant::now();
        client.close().await;
        let took = start.elapsed();

        assert!(took >= io_timeout, "close returned before the QUIT timeout: {took:?}");
        assert!(took < Duration::from_secs(2), "close hung: {took:?}");
        assert_eq!(client.state(), SessionState::Closed);
        timeout(Duration::from_secs(2), printer.control_closed)
            .await
            .expect("printer saw the control socket close")
            .expect("printer task finished");

        client.close().await;
        assert_eq!(client.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut client = SecureTransferClient::new(&tls_context(), Duration::from_secs(1));
        client.close().await;
        client.close().await;
        assert_eq!(client.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn chunked_progress_accounts_for_every_byte() {
        let data: Vec<u8> = (0..10_007u32).map(|i| (i % 256) as u8).collect();
        for chunk in [1usize, 7, 512, 8192, 10_007, 100_000] {
            let mut reader = &data[..];
            let mut writer = Vec::new();
            let mut calls = Vec::new();
            let sent = send_in_chunks(
                &mut reader,
                &mut writer,
                chunk,
                Duration::from_secs(1),
                &mut |n| calls.push(n),
            )
            .await
            .expect("copy");

            assert_eq!(sent, data.len() as u64, "chunk {chunk}");
            assert_eq!(writer, data, "chunk {chunk}");
            assert_eq!(calls.last().copied(), Some(data.len() as u64), "chunk {chunk}");
            assert_eq!(calls.len(), data.len().div_ceil(chunk), "chunk {chunk}");
        }
    }

    #[tokio::test]
    async fn empty_source_reports_no_progress() {
        let mut reader: &[u8] = &[];
        let mut writer = Vec::new();
        let mut calls = 0;
        let sent = send_in_chunks(&mut reader, &mut writer, 8192, Duration::from_secs(1), &mut |_| {
            calls += 1
        })
        .await
        .expect("copy");
        assert_eq!(sent, 0);
        assert_eq!(calls, 0);
    }
}
