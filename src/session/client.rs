use super::*;

impl RemoteHost {
    /// Creates a host that dials `address:port` directly on first use.
    ///
    /// Nothing is dialled and no key file is read here; the only check is
    /// that at least one credential is non-empty.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, RemoteError> {
        Self::assemble(
            address.into(),
            port,
            user.into(),
            credentials,
            HostOptions::default(),
            HashMap::new(),
            Route::Direct,
        )
    }

    /// Creates a host from its serialized description.
    pub fn from_spec(spec: &HostSpec) -> Result<Self, RemoteError> {
        Self::assemble(
            spec.address.clone(),
            spec.port,
            spec.user.clone(),
            spec.credentials(),
            spec.options(),
            spec.properties.clone(),
            Route::Direct,
        )
    }

    pub(super) fn assemble(
        address: String,
        port: u16,
        user: String,
        credentials: Credentials,
        options: HostOptions,
        properties: HashMap<String, String>,
        route: Route,
    ) -> Result<Self, RemoteError> {
        if address.trim().is_empty() {
            return Err(RemoteError::Config("host address is empty".to_string()));
        }
        if user.is_empty() {
            return Err(RemoteError::Config(format!("no user given for {address}")));
        }
        let label = format!("{user}@{address}:{port}");
        if credentials.choice().is_none() {
            return Err(RemoteError::MissingCredential(label));
        }

        Ok(Self {
            address,
            port,
            user,
            credentials,
            id: uuid::Uuid::new_v4().to_string(),
            options,
            ctx: ExecContext::default(),
            properties,
            route,
            transport: Mutex::new(None),
        })
    }

    /// Replaces the formatter and cancellation token used by this host.
    pub fn with_context(mut self, ctx: ExecContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_options(mut self, options: HostOptions) -> Self {
        self.options = options;
        self
    }

    /// Establishes the transport if there is none yet. Calling it again on a
    /// connected host does nothing.
    pub async fn connect(&self) -> Result<(), RemoteError> {
        self.transport().await.map(|_| ())
    }

    pub(super) async fn transport(&self) -> Result<Arc<Transport>, RemoteError> {
        let mut slot = self.transport.lock().await;
        if let Some(transport) = slot.as_ref() {
            if !transport.is_closed() {
                return Ok(Arc::clone(transport));
            }
            debug!("{} transport was closed, dropping it", self.label());
            *slot = None;
        }

        if self.route == Route::Tunneled {
            return Err(RemoteError::Connectivity {
                target: self.label(),
                reason: "tunnel is closed; open it again through the jump host".to_string(),
            });
        }
        if self.ctx.cancel.is_cancelled() {
            return Err(RemoteError::Cancelled(self.label()));
        }

        debug!("{} connecting", self.label());
        let transport = Arc::new(
            Transport::dial(
                &self.label(),
                &self.address,
                self.port,
                &self.user,
                &self.credentials,
                &self.options,
            )
            .await?,
        );
        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// Wraps an already-established tunneled transport.
    pub(super) fn adopt(self, transport: Transport) -> Self {
        Self {
            transport: Mutex::new(Some(Arc::new(transport))),
            ..self
        }
    }

    /// Connects if needed and opens a fresh channel.
    pub async fn new_session(&self) -> Result<Session, RemoteError> {
        if self.ctx.cancel.is_cancelled() {
            return Err(RemoteError::Cancelled(self.label()));
        }
        let transport = self.transport().await?;
        Session::open(&transport, &self.label()).await
    }

    /// Releases the transport. A host that never connected is left alone.
    ///
    /// A disconnect failure is logged and returned; the transport is dropped
    /// either way, so a later call on a direct host dials again.
    pub async fn close(&self) -> Result<(), RemoteError> {
        let Some(transport) = self.transport.lock().await.take() else {
            trace!("{} close on a host that is not connected", self.label());
            return Ok(());
        };
        debug!("{} disconnecting", self.label());
        transport.disconnect().await.inspect_err(|e| {
            warn!("{} disconnect failed: {e}", self.label());
        })
    }

    pub async fn is_connected(&self) -> bool {
        self.transport
            .lock()
            .await
            .as_ref()
            .is_some_and(|transport| !transport.is_closed())
    }

    /// Random identifier assigned when the host was created.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Prefix used for every output line, `"<id> (<address>:<port>) :"`.
    pub fn prefix(&self) -> String {
        format!("{} ({}:{}) :", self.id, self.address, self.port)
    }

    /// `user@address:port`.
    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.user, self.address, self.port)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}
