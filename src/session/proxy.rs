use super::*;

impl RemoteHost {
    /// Connects to the host described by `spec` through this host.
    ///
    /// This host must already be connected. A direct-tcpip channel to
    /// `spec.address:spec.port` is opened on its transport and a new SSH
    /// handshake runs over that channel. The returned host is connected,
    /// shares this host's [`ExecContext`] and keeps this host's transport
    /// alive. The target address is resolved by this host, not locally.
    ///
    /// Server keys seen through the tunnel are accepted without
    /// verification. Once closed, the returned host cannot reconnect on its
    /// own; call `proxy` again.
    pub async fn proxy(&self, spec: &HostSpec) -> Result<RemoteHost, RemoteError> {
        let via = {
            let slot = self.transport.lock().await;
            match slot.as_ref() {
                Some(transport) if !transport.is_closed() => Arc::clone(transport),
                _ => {
                    return Err(RemoteError::Connectivity {
                        target: self.label(),
                        reason: "jump host is not connected".to_string(),
                    });
                }
            }
        };

        let host = RemoteHost::assemble(
            spec.address.clone(),
            spec.port,
            spec.user.clone(),
            spec.credentials(),
            spec.options(),
            spec.properties.clone(),
            Route::Tunneled,
        )?
        .with_context(self.ctx.clone());

        debug!("{} tunnelling to {}", self.label(), host.label());
        let transport = Transport::tunnel(
            via,
            &host.label(),
            &host.address,
            host.port,
            &host.user,
            &host.credentials,
            &host.options,
        )
        .await?;

        Ok(host.adopt(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn proxy_requires_a_connected_jump_host() {
        let jump =
            RemoteHost::new("bastion", 22, "ops", Credentials::password("pw")).expect("jump host");
        let target = HostSpec::new("10.1.0.7", "ops").password("pw");

        let err = jump.proxy(&target).await.expect_err("not connected");
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }
}
