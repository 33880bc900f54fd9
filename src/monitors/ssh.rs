//! SSH sessions via `russh`
//!
//! Host keys are accepted without verification, so a target is trusted on
//! its address alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tracing::{debug, trace};

use super::session::{CommandOutput, ProbeFailure, RemoteSession, SessionConnector, SessionError};
use crate::{Credential, Target};

// TODO: check host keys against a known_hosts file once targets carry one
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens password or key authenticated SSH sessions
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new() -> Self {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn RemoteSession>, SessionError> {
        let mut handle = client::connect(
            self.config.clone(),
            (target.address.as_str(), target.port),
            AcceptAnyHostKey,
        )
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))?;

        let authenticated = match &target.credential {
            Credential::Password(password) => handle
                .authenticate_password(target.user.as_str(), password.as_str())
                .await
                .map_err(|e| SessionError::Transport(e.to_string()))?,
            Credential::KeyFile { path, passphrase } => {
                let key_pair = russh_keys::load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| {
                        debug!("could not load key {}: {e}", path.display());
                        SessionError::AuthenticationFailed
                    })?;
                handle
                    .authenticate_publickey(target.user.as_str(), Arc::new(key_pair))
                    .await
                    .map_err(|e| SessionError::Transport(e.to_string()))?
            }
        };

        if !authenticated {
            return Err(SessionError::AuthenticationFailed);
        }

        trace!("authenticated as {} on {}", target.user, target.display());
        Ok(Box::new(SshSession { handle }))
    }
}

struct SshSession {
    handle: Handle<AcceptAnyHostKey>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, ProbeFailure> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        let exit_status = exit_status
            .ok_or_else(|| ProbeFailure::Transport("channel closed without exit status".into()))?;

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
        })
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("error while disconnecting: {e}");
        }
    }
}
