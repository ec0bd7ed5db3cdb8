//! Async transport: TCP with optional TLS, framed with [`IrcCodec`].

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::irc::{Encoding, IrcCodec};
use crate::message::Message;

/// Connection parameters for a single transport attempt.
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub tls_verify: bool,
    pub tls_client_cert: Option<PathBuf>,
    pub tls_client_cert_key: Option<PathBuf>,
    pub tls_client_cert_password: Option<String>,
    pub encoding: Encoding,
}

/// Byte streams the transport can run over.
pub trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

/// Write half of a split transport.
pub type TransportSink = SplitSink<Framed<Box<dyn Duplex>, IrcCodec>, Message>;
/// Read half of a split transport.
pub type TransportStream = SplitStream<Framed<Box<dyn Duplex>, IrcCodec>>;

/// A connected, framed IRC transport.
pub struct Transport {
    framed: Framed<Box<dyn Duplex>, IrcCodec>,
}

impl Transport {
    /// Connect per the given options, performing the TLS handshake when
    /// requested.
    pub async fn connect(opts: &ConnectOptions) -> Result<Transport, ProtocolError> {
        let stream = TcpStream::connect((opts.host.as_str(), opts.port)).await?;
        if let Err(e) = enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }

        let codec = IrcCodec::new(opts.encoding);
        let stream: Box<dyn Duplex> = if opts.tls {
            let config = build_tls_config(opts)?;
            let connector = TlsConnector::from(Arc::new(config));
            let server_name = rustls::pki_types::ServerName::try_from(opts.host.clone())
                .map_err(|e| ProtocolError::Config(format!("invalid TLS host name: {}", e)))?;
            let tls = connector.connect(server_name, stream).await?;
            debug!(host = %opts.host, "TLS session established");
            Box::new(tls)
        } else {
            Box::new(stream)
        };

        Ok(Transport {
            framed: Framed::new(stream, codec),
        })
    }

    /// Wrap an already-connected byte stream (used by tests).
    pub fn from_stream(stream: Box<dyn Duplex>, encoding: Encoding) -> Transport {
        Transport {
            framed: Framed::new(stream, IrcCodec::new(encoding)),
        }
    }

    /// Read the next message. `Ok(None)` means the peer closed the stream.
    pub async fn read_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        match self.framed.next().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    /// Write one message, flushing it to the wire.
    pub async fn write_message(&mut self, message: Message) -> Result<(), ProtocolError> {
        self.framed.send(message).await
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> (TransportSink, TransportStream) {
        self.framed.split()
    }
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}

fn build_tls_config(opts: &ConnectOptions) -> Result<rustls::ClientConfig, ProtocolError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let builder = if opts.tls_verify {
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder().with_root_certificates(root_store)
    } else {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
    };

    match (&opts.tls_client_cert, &opts.tls_client_cert_key) {
        (Some(cert_path), key_path) => {
            if opts.tls_client_cert_password.is_some() {
                return Err(ProtocolError::Config(
                    "encrypted client certificate keys are not supported".to_string(),
                ));
            }
            let (certs, key) = load_client_cert(cert_path, key_path.as_ref().unwrap_or(cert_path))?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ProtocolError::Config(format!("client certificate rejected: {}", e)))
        }
        (None, _) => Ok(builder.with_no_client_auth()),
    }
}

type ClientCert = (
    Vec<rustls::pki_types::CertificateDer<'static>>,
    rustls::pki_types::PrivateKeyDer<'static>,
);

fn load_client_cert(cert_path: &PathBuf, key_path: &PathBuf) -> Result<ClientCert, ProtocolError> {
    let mut cert_reader = BufReader::new(File::open(cert_path)?);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProtocolError::Config(format!("bad client certificate: {}", e)))?;

    let mut key_reader = BufReader::new(File::open(key_path)?);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ProtocolError::Config(format!("bad client key: {}", e)))?
        .ok_or_else(|| ProtocolError::Config("no private key in file".to_string()))?;

    Ok((certs, key))
}

/// Accepts any server certificate; used when `tls_verify` is off.
#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut transport = Transport::from_stream(Box::new(client), Encoding::Utf8);
        let mut peer = Transport::from_stream(Box::new(server), Encoding::Utf8);

        transport
            .write_message(Message::privmsg("#chan", "hello"))
            .await
            .unwrap();
        let msg = peer.read_message().await.unwrap().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hello"]);
    }

    #[tokio::test]
    async fn test_eof_reports_closed() {
        let (client, server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(Box::new(client), Encoding::Utf8);
        drop(server);
        assert!(transport.read_message().await.unwrap().is_none());
    }
}
