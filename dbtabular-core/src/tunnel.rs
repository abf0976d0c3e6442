//! SSH port forwarding to the database host.
//!
//! [`SshTunnel::open`] authenticates with a username and password, binds an
//! ephemeral port on `127.0.0.1`, and forwards every connection accepted there
//! through a `direct-tcpip` channel to the database host and port, resolved
//! on the SSH server's side.

use crate::config::TunnelConfig;
use crate::{DbTabularError, Result};
use async_trait::async_trait;
use russh::{Disconnect, client};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type SshHandle = Arc<Mutex<client::Handle<TunnelClient>>>;

/// russh client callbacks.
struct TunnelClient {
    host: String,
}

#[async_trait]
impl client::Handler for TunnelClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // Host keys are not pinned; the fingerprint is logged for auditing.
        tracing::debug!(
            "SSH host {} presented key {}",
            self.host,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

/// An open SSH tunnel.
///
/// Dropping the tunnel cancels forwarding; [`SshTunnel::stop`] additionally
/// waits for the forwarding task and disconnects the SSH session.
pub struct SshTunnel {
    local_addr: SocketAddr,
    remote_host: String,
    remote_port: u16,
    ssh: SshHandle,
    cancel_token: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
}

impl SshTunnel {
    /// Opens a tunnel to `remote_host:remote_port` through the configured SSH host.
    ///
    /// # Errors
    /// Returns a connection error if the SSH server is unreachable, rejects
    /// the credentials, or the local port cannot be bound. Nothing stays open
    /// on failure.
    pub async fn open(config: &TunnelConfig, remote_host: &str, remote_port: u16) -> Result<Self> {
        tracing::info!(
            "Opening SSH tunnel via {}:{} to {}:{}",
            config.host,
            config.port,
            remote_host,
            remote_port
        );

        let ssh = Self::connect_ssh(config).await?;

        let listener = match TcpListener::bind(("127.0.0.1", 0)).await {
            Ok(listener) => listener,
            Err(e) => {
                disconnect(&ssh).await;
                return Err(DbTabularError::connection_failed(
                    "Failed to bind local port for SSH tunnel",
                    e,
                ));
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                disconnect(&ssh).await;
                return Err(DbTabularError::connection_failed(
                    "Failed to read local tunnel address",
                    e,
                ));
            }
        };

        let ssh = Arc::new(Mutex::new(ssh));
        let cancel_token = CancellationToken::new();
        let forwarder = tokio::spawn(run_tunnel(
            listener,
            Arc::clone(&ssh),
            remote_host.to_string(),
            remote_port,
            cancel_token.clone(),
        ));

        tracing::info!("SSH tunnel listening on {}", local_addr);

        Ok(Self {
            local_addr,
            remote_host: remote_host.to_string(),
            remote_port,
            ssh,
            cancel_token,
            forwarder: Some(forwarder),
        })
    }

    async fn connect_ssh(config: &TunnelConfig) -> Result<client::Handle<TunnelClient>> {
        let ssh_config = Arc::new(client::Config::default());
        let handler = TunnelClient {
            host: config.host.clone(),
        };

        let mut handle = client::connect(ssh_config, (config.host.as_str(), config.port), handler)
            .await
            .map_err(|e| {
                DbTabularError::connection_failed(
                    format!("Failed to connect to SSH server {}:{}", config.host, config.port),
                    e,
                )
            })?;

        let authenticated = match handle
            .authenticate_password(config.username.as_str(), config.password.as_str())
            .await
        {
            Ok(authenticated) => authenticated,
            Err(e) => {
                disconnect(&handle).await;
                return Err(DbTabularError::connection_failed(
                    format!("SSH password authentication to {} failed", config.host),
                    e,
                ));
            }
        };

        if !authenticated {
            disconnect(&handle).await;
            return Err(DbTabularError::connection_refused(format!(
                "SSH server {} rejected credentials for {}",
                config.host, config.username
            )));
        }

        tracing::debug!(
            "SSH authentication successful for {}@{}",
            config.username,
            config.host
        );
        Ok(handle)
    }

    /// Loopback port the database client should connect to.
    pub const fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// True until the tunnel has been stopped or dropped.
    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }

    /// Stops forwarding and disconnects from the SSH server.
    pub async fn stop(mut self) {
        self.cancel_token.cancel();
        if let Some(forwarder) = self.forwarder.take()
            && let Err(e) = forwarder.await
        {
            tracing::warn!("SSH tunnel forwarding task ended abnormally: {}", e);
        }

        let handle = self.ssh.lock().await;
        disconnect(&handle).await;

        tracing::info!(
            "SSH tunnel on {} to {}:{} stopped",
            self.local_addr,
            self.remote_host,
            self.remote_port
        );
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTunnel")
            .field("local_addr", &self.local_addr)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

async fn disconnect(handle: &client::Handle<TunnelClient>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        tracing::debug!("SSH disconnect failed: {}", e);
    }
}

/// Accept loop: one forwarding task per local connection.
async fn run_tunnel(
    listener: TcpListener,
    ssh: SshHandle,
    remote_host: String,
    remote_port: u16,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((local_stream, peer_addr)) => {
                        tracing::debug!("Tunnel connection from {}", peer_addr);

                        let ssh = Arc::clone(&ssh);
                        let remote_host = remote_host.clone();
                        let cancel = cancel_token.clone();

                        tokio::spawn(async move {
                            if let Err(e) =
                                forward_connection(local_stream, ssh, &remote_host, remote_port, cancel).await
                            {
                                tracing::warn!("Tunnel forwarding error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept tunnel connection: {}", e);
                    }
                }
            }
            () = cancel_token.cancelled() => {
                tracing::debug!("SSH tunnel accept loop cancelled");
                break;
            }
        }
    }
}

/// Copies bytes both ways between a local socket and an SSH channel.
async fn forward_connection(
    mut local_stream: TcpStream,
    ssh: SshHandle,
    remote_host: &str,
    remote_port: u16,
    cancel_token: CancellationToken,
) -> Result<()> {
    let channel = {
        let handle = ssh.lock().await;
        handle
            .channel_open_direct_tcpip(remote_host, u32::from(remote_port), "127.0.0.1", 0)
            .await
            .map_err(|e| {
                DbTabularError::connection_failed(
                    format!("Failed to open SSH channel to {}:{}", remote_host, remote_port),
                    e,
                )
            })?
    };

    let mut channel = channel.into_stream();
    let mut buf_local = [0u8; 8192];
    let mut buf_remote = [0u8; 8192];

    loop {
        tokio::select! {
            n = local_stream.read(&mut buf_local) => {
                match n {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if channel.write_all(&buf_local[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            n = channel.read(&mut buf_remote) => {
                match n {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if local_stream.write_all(&buf_remote[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            () = cancel_token.cancelled() => {
                break;
            }
        }
    }

    let _ = channel.shutdown().await;
    Ok(())
}

/// In-process SSH server for tests. It accepts one password and refuses
/// every `direct-tcpip` request, like a bastion whose target port is closed.
#[cfg(test)]
pub(crate) mod test_bastion {
    #![allow(clippy::unwrap_used)]

    use async_trait::async_trait;
    use russh::server::{self, Auth, Msg, Session};
    use russh::Channel;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    pub(crate) const USERNAME: &str = "jump";
    pub(crate) const PASSWORD: &str = "ssh-secret";

    struct BastionHandler;

    #[async_trait]
    impl server::Handler for BastionHandler {
        type Error = russh::Error;

        async fn auth_password(
            &mut self,
            user: &str,
            password: &str,
        ) -> Result<Auth, Self::Error> {
            if user == USERNAME && password == PASSWORD {
                Ok(Auth::Accept)
            } else {
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }

        async fn channel_open_direct_tcpip(
            &mut self,
            _channel: Channel<Msg>,
            _host_to_connect: &str,
            _port_to_connect: u32,
            _originator_address: &str,
            _originator_port: u32,
            _session: &mut Session,
        ) -> Result<bool, Self::Error> {
            Ok(false)
        }
    }

    /// A running bastion and the number of SSH sessions still open on it.
    pub(crate) struct Bastion {
        pub(crate) port: u16,
        open_sessions: Arc<AtomicUsize>,
    }

    impl Bastion {
        pub(crate) async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let open_sessions = Arc::new(AtomicUsize::new(0));
            let config = Arc::new(server::Config {
                keys: vec![russh_keys::key::KeyPair::generate_ed25519()],
                auth_rejection_time: Duration::from_millis(10),
                auth_rejection_time_initial: Some(Duration::ZERO),
                ..Default::default()
            });

            let counter = Arc::clone(&open_sessions);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let config = Arc::clone(&config);
                    let counter = Arc::clone(&counter);
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        if let Ok(session) = server::run_stream(config, stream, BastionHandler).await {
                            let _ = session.await;
                        }
                        counter.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });

            Self {
                port,
                open_sessions,
            }
        }

        /// Waits up to five seconds for every client session to end.
        pub(crate) async fn all_sessions_closed(&self) -> bool {
            for _ in 0..250 {
                if self.open_sessions.load(Ordering::SeqCst) == 0 {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            false
        }
    }
}
