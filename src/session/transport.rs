use super::*;

/// An authenticated SSH connection, however it was reached.
pub(super) enum Transport {
    /// Dialled over TCP.
    Direct(Client),
    /// Carried by a direct-tcpip channel of another transport, which is kept
    /// alive for as long as this one exists.
    Tunneled {
        handle: Handle<PermissiveHandler>,
        via: Arc<Transport>,
    },
}

impl Transport {
    /// Dials `address:port` and authenticates.
    pub(super) async fn dial(
        target: &str,
        address: &str,
        port: u16,
        user: &str,
        credentials: &Credentials,
        options: &HostOptions,
    ) -> Result<Self, RemoteError> {
        let auth = credentials
            .auth_method()
            .ok_or_else(|| RemoteError::MissingCredential(target.to_string()))?;
        let config = options.security.client_config(options.inactivity_timeout);

        let client = Client::connect_with_config(
            (address.to_string(), port),
            user,
            auth,
            options.security.server_check.clone(),
            config,
        )
        .await
        .map_err(|e| RemoteError::from_connect(target, e))?;
        debug!("{target} TCP connection successful");

        Ok(Transport::Direct(client))
    }

    /// Runs a fresh handshake over a direct-tcpip channel opened on `via`.
    pub(super) async fn tunnel(
        via: Arc<Transport>,
        target: &str,
        address: &str,
        port: u16,
        user: &str,
        credentials: &Credentials,
        options: &HostOptions,
    ) -> Result<Self, RemoteError> {
        let channel = via.open_direct_tcpip(target, address, port).await?;
        let config = Arc::new(options.security.client_config(options.inactivity_timeout));
        let handler = PermissiveHandler {
            target: target.to_string(),
        };

        let mut handle = russh::client::connect_stream(config, channel.into_stream(), handler)
            .await
            .map_err(|e| RemoteError::Connectivity {
                target: target.to_string(),
                reason: format!("handshake over tunnel failed: {e}"),
            })?;
        debug!("{target} handshake over tunnel successful");

        authenticate(&mut handle, target, user, credentials).await?;
        Ok(Transport::Tunneled { handle, via })
    }

    /// Opens a session channel.
    pub(super) async fn open_session(&self, target: &str) -> Result<Channel<Msg>, RemoteError> {
        let opened = match self {
            Transport::Direct(client) => client.get_channel().await.map_err(|e| e.to_string()),
            Transport::Tunneled { handle, .. } => {
                handle.channel_open_session().await.map_err(|e| e.to_string())
            }
        };
        opened.map_err(|reason| RemoteError::Session {
            target: target.to_string(),
            reason,
        })
    }

    /// Asks the remote side to connect to `address:port` on our behalf.
    pub(super) async fn open_direct_tcpip(
        &self,
        target: &str,
        address: &str,
        port: u16,
    ) -> Result<Channel<Msg>, RemoteError> {
        let opened = match self {
            Transport::Direct(client) => client
                .open_direct_tcpip_channel(
                    (address.to_string(), port),
                    None::<std::net::SocketAddr>,
                )
                .await
                .map_err(|e| e.to_string()),
            Transport::Tunneled { handle, .. } => handle
                .channel_open_direct_tcpip(address, u32::from(port), "127.0.0.1", 0)
                .await
                .map_err(|e| e.to_string()),
        };
        opened.map_err(|reason| RemoteError::Connectivity {
            target: target.to_string(),
            reason: format!("cannot open tunnel: {reason}"),
        })
    }

    pub(super) fn is_closed(&self) -> bool {
        match self {
            Transport::Direct(client) => client.is_closed(),
            Transport::Tunneled { handle, via } => handle.is_closed() || via.is_closed(),
        }
    }

    pub(super) async fn disconnect(&self) -> Result<(), RemoteError> {
        match self {
            Transport::Direct(client) => client.disconnect().await?,
            Transport::Tunneled { handle, .. } => {
                handle
                    .disconnect(russh::Disconnect::ByApplication, "", "en")
                    .await?
            }
        }
        Ok(())
    }
}

/// Client handler for tunnelled connections. Every server key is accepted.
pub(super) struct PermissiveHandler {
    target: String,
}

impl russh::client::Handler for PermissiveHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "{} accepting server key {}",
            self.target,
            server_public_key.fingerprint(russh::keys::HashAlg::Sha256)
        );
        Ok(true)
    }
}

async fn authenticate(
    handle: &mut Handle<PermissiveHandler>,
    target: &str,
    user: &str,
    credentials: &Credentials,
) -> Result<(), RemoteError> {
    let rejected = |reason: String| RemoteError::Authentication {
        target: target.to_string(),
        reason,
    };

    let result = match credentials
        .choice()
        .ok_or_else(|| RemoteError::MissingCredential(target.to_string()))?
    {
        AuthChoice::Password(password) => handle.authenticate_password(user, password).await?,
        AuthChoice::KeyFile { path, passphrase } => {
            let key = russh::keys::load_secret_key(path, passphrase)
                .map_err(|e| rejected(format!("cannot load {}: {e}", path.display())))?;
            let hash = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(
                    user,
                    russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                )
                .await?
        }
    };

    if !result.success() {
        return Err(rejected("server rejected the credential".to_string()));
    }
    trace!("{target} authenticated as {user}");
    Ok(())
}
