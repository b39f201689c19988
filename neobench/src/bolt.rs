//! Bolt driver adapter.
//!
//! The engine's worker loops are synchronous; neo4rs is async. The
//! adapter owns a tokio runtime and blocks on each call, which keeps the
//! suspension points where the engine expects them (the driver call and
//! the pacing sleep).

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltString, BoltType, Graph, Query};
use tokio::runtime::{Handle, Runtime};

use neobench_core::{Driver, DriverError, Session, StatementKind};
use neobench_script::{Statement, UnitOfWork};
use neobench_value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Probe the server port with an unverified TLS handshake.
    Auto,
    On,
    Off,
}

pub struct ConnectOptions<'a> {
    pub address: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    /// Empty selects the server's default database.
    pub database: &'a str,
    pub encryption: EncryptionMode,
    pub check_certificates: bool,
}

pub struct BoltDriver {
    graph: Graph,
    runtime: Runtime,
}

impl BoltDriver {
    pub fn connect(opts: &ConnectOptions<'_>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start driver runtime")?;

        let encrypted = match opts.encryption {
            EncryptionMode::On => true,
            EncryptionMode::Off => false,
            EncryptionMode::Auto => probe_tls(opts.address).with_context(|| {
                format!(
                    "failed to auto-detect TLS for {}, consider setting --encryption explicitly",
                    opts.address
                )
            })?,
        };
        let uri = apply_scheme(opts.address, encrypted, opts.check_certificates);
        tracing::debug!(uri, encrypted, "connecting");

        let mut config = neo4rs::ConfigBuilder::default()
            .uri(&uri)
            .user(opts.user)
            .password(opts.password);
        if !opts.database.is_empty() {
            config = config.db(opts.database);
        }
        let config = config.build().context("invalid driver configuration")?;

        let graph = runtime
            .block_on(Graph::connect(config))
            .with_context(|| format!("failed to connect to {uri}"))?;

        Ok(BoltDriver { graph, runtime })
    }

    /// Run a statement outside the benchmark loop (dataset population).
    pub fn run(&self, query: &str, params: &[(&str, Value)]) -> Result<(), DriverError> {
        let mut q = neo4rs::query(query);
        for (name, value) in params {
            q = q.param(name, bolt_value(value));
        }
        self.runtime
            .block_on(self.graph.run(q))
            .map_err(map_driver_err)
    }

    /// Run a query returning a single integer column named `n`.
    pub fn count(&self, query: &str) -> Result<i64, DriverError> {
        self.runtime.block_on(async {
            let mut stream = self
                .graph
                .execute(neo4rs::query(query))
                .await
                .map_err(map_driver_err)?;
            let row = stream
                .next()
                .await
                .map_err(map_driver_err)?
                .ok_or_else(|| DriverError::Database("query returned no rows".to_string()))?;
            row.get::<i64>("n")
                .map_err(|e| DriverError::Database(e.to_string()))
        })
    }
}

impl Driver for BoltDriver {
    fn session(&self, _database: &str) -> Result<Box<dyn Session>, DriverError> {
        // The target database is part of the connection config; a session
        // is a clone of the pooled graph handle.
        Ok(Box::new(BoltSession {
            graph: self.graph.clone(),
            handle: self.runtime.handle().clone(),
        }))
    }
}

struct BoltSession {
    graph: Graph,
    handle: Handle,
}

impl Session for BoltSession {
    fn execute(&mut self, unit: &UnitOfWork) -> Result<(), DriverError> {
        self.handle.block_on(async {
            if unit.autocommit {
                // Each statement is its own implicit transaction.
                for statement in &unit.statements {
                    self.graph
                        .run(build_query(statement))
                        .await
                        .map_err(map_driver_err)?;
                }
                return Ok(());
            }

            let mut txn = self.graph.start_txn().await.map_err(map_driver_err)?;
            // run() consumes each result fully before returning, so a
            // later statement never starts before the earlier one's
            // stream is drained.
            for statement in &unit.statements {
                txn.run(build_query(statement)).await.map_err(map_driver_err)?;
            }
            txn.commit().await.map_err(map_driver_err)
        })
    }

    fn explain(&mut self, statement: &Statement) -> Result<StatementKind, DriverError> {
        self.handle.block_on(async {
            let query = build_query_text(&format!("EXPLAIN {}", statement.query), statement);
            let stream = self
                .graph
                .execute(query)
                .await
                .map_err(map_driver_err)?;
            let summary = stream.finish().await.map_err(map_driver_err)?;
            Ok(match summary.query_type() {
                neo4rs::summary::Type::Read => StatementKind::ReadOnly,
                neo4rs::summary::Type::Write => StatementKind::WriteOnly,
                neo4rs::summary::Type::ReadWrite => StatementKind::ReadWrite,
                neo4rs::summary::Type::SchemaWrite => StatementKind::SchemaWrite,
            })
        })
    }
}

fn build_query(statement: &Statement) -> Query {
    build_query_text(&statement.query, statement)
}

fn build_query_text(text: &str, statement: &Statement) -> Query {
    let mut query = neo4rs::query(text);
    for (name, value) in &statement.params {
        query = query.param(name, bolt_value(value));
    }
    query
}

fn bolt_value(value: &Value) -> BoltType {
    match value {
        Value::Int(i) => BoltType::Integer(BoltInteger::new(*i)),
        Value::Float(f) => BoltType::Float(BoltFloat::new(*f)),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::List(items) => {
            let mut list = BoltList::new();
            for item in items.iter() {
                list.push(bolt_value(item));
            }
            BoltType::List(list)
        }
        Value::Map(map) => {
            let mut out = BoltMap::new();
            for (key, val) in map {
                out.put(BoltString::new(key), bolt_value(val));
            }
            BoltType::Map(out)
        }
    }
}

fn map_driver_err(err: neo4rs::Error) -> DriverError {
    let message = err.to_string();
    match extract_error_code(&message) {
        Some(code) => DriverError::Server { code, message },
        None => DriverError::Database(message),
    }
}

/// Server error codes look like `Neo.ClientError.Statement.SyntaxError`;
/// pull the first such token out of the driver's message.
fn extract_error_code(message: &str) -> Option<String> {
    let start = message.find("Neo.")?;
    let code: String = message[start..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '.')
        .collect();
    let code = code.trim_end_matches('.').to_string();
    if code.split('.').count() >= 3 {
        Some(code)
    } else {
        None
    }
}

/// Rewrite the URI scheme to match the resolved TLS policy.
fn apply_scheme(address: &str, encrypted: bool, check_certificates: bool) -> String {
    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("neo4j", address),
    };
    let base = scheme.trim_end_matches("+ssc").trim_end_matches("+s");
    let suffix = if !encrypted {
        ""
    } else if check_certificates {
        "+s"
    } else {
        "+ssc"
    };
    format!("{base}{suffix}://{rest}")
}

/// Try an unverified TLS handshake against the server port. A server that
/// answers the handshake gets an encrypted connection; one that talks
/// plain bolt does not.
fn probe_tls(address: &str) -> anyhow::Result<bool> {
    let (host, port) = host_port(address)?;

    let mut tcp = TcpStream::connect((host.as_str(), port))
        .with_context(|| format!("could not reach {host}:{port}"))?;
    tcp.set_read_timeout(Some(Duration::from_secs(5)))?;
    tcp.set_write_timeout(Some(Duration::from_secs(5)))?;

    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new()))
        .with_no_client_auth();
    let server_name = rustls::pki_types::ServerName::try_from(host.clone())
        .with_context(|| format!("invalid host name: {host}"))?;
    let mut conn = rustls::ClientConnection::new(Arc::new(config), server_name)
        .context("failed to build TLS client")?;

    while conn.is_handshaking() {
        match conn.complete_io(&mut tcp) {
            Ok(_) => {}
            // The server answered with something that isn't TLS.
            Err(_) => return Ok(false),
        }
    }
    Ok(true)
}

fn host_port(address: &str) -> anyhow::Result<(String, u16)> {
    let rest = address.split_once("://").map_or(address, |(_, rest)| rest);
    let rest = rest.split(['/', '?']).next().unwrap_or(rest);
    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in address: {address}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((rest.to_string(), 7687)),
    }
}

#[derive(Debug)]
struct AcceptAnyCert(rustls::crypto::CryptoProvider);

impl AcceptAnyCert {
    fn new() -> Self {
        AcceptAnyCert(rustls::crypto::aws_lc_rs::default_provider())
    }
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
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
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_rewrites_follow_the_tls_policy() {
        assert_eq!(apply_scheme("neo4j://db:7687", false, true), "neo4j://db:7687");
        assert_eq!(apply_scheme("neo4j://db:7687", true, true), "neo4j+s://db:7687");
        assert_eq!(apply_scheme("neo4j://db:7687", true, false), "neo4j+ssc://db:7687");
        assert_eq!(apply_scheme("bolt+s://db", false, true), "bolt://db");
        assert_eq!(apply_scheme("db:7687", true, true), "neo4j+s://db:7687");
    }

    #[test]
    fn host_port_defaults_to_bolt() {
        assert_eq!(host_port("neo4j://db").unwrap(), ("db".to_string(), 7687));
        assert_eq!(
            host_port("neo4j://db:9999").unwrap(),
            ("db".to_string(), 9999)
        );
        assert!(host_port("neo4j://db:nope").is_err());
    }

    #[test]
    fn error_codes_are_extracted_from_messages() {
        assert_eq!(
            extract_error_code("server said: Neo.TransientError.Transaction.Terminated (txid 7)"),
            Some("Neo.TransientError.Transaction.Terminated".to_string())
        );
        assert_eq!(extract_error_code("connection reset by peer"), None);
        assert_eq!(extract_error_code("Neo. something"), None);
    }
}
