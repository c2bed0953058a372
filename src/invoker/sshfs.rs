//! sshfs command-line mount helper

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{InvokerError, MountInvoker};
use crate::config::SshfsConfig;
use crate::volume::{ConnectionParams, Credential};

/// Mounts volumes by running `sshfs` and unmounts them with `umount`
pub struct SshfsInvoker {
    config: SshfsConfig,
}

impl SshfsInvoker {
    pub fn new(config: SshfsConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the mount command, in order
    pub fn mount_args(&self, mountpoint: &Path, params: &ConnectionParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            params.connection.clone().into(),
            mountpoint.as_os_str().to_owned(),
        ];

        if let Some(port) = params.port {
            args.push("-p".into());
            args.push(port.to_string().into());
        }

        let strict = if self.config.strict_host_key_checking {
            "yes"
        } else {
            "no"
        };
        push_option(&mut args, format!("StrictHostKeyChecking={}", strict));

        match &params.credential {
            Some(Credential::Password(_)) => push_option(&mut args, "password_stdin".to_string()),
            Some(Credential::IdentityFile(path)) => {
                push_option(&mut args, format!("IdentityFile={}", path.display()))
            }
            None => {
                if let Some(path) = &self.config.identity_file {
                    push_option(&mut args, format!("IdentityFile={}", path.display()));
                }
            }
        }

        for option in self.config.default_options.iter().chain(&params.options) {
            push_option(&mut args, option.clone());
        }

        args
    }

    /// Run `command`, optionally feeding `stdin`, and map a non-zero exit to
    /// an error carrying stdout and stderr.
    async fn run(
        &self,
        program: &str,
        args: Vec<OsString>,
        stdin: Option<&str>,
    ) -> Result<(), InvokerError> {
        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} with {} argument(s)", program, args.len());

        let mut child = command.spawn().map_err(|source| InvokerError::Spawn {
            command: program.to_string(),
            source,
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            match pipe.write_all(input.as_bytes()).await {
                Ok(()) => {}
                // The helper exited without reading; its status says why
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(source) => {
                    return Err(InvokerError::Spawn {
                        command: program.to_string(),
                        source,
                    })
                }
            }
            // Close stdin so the helper sees EOF after the password
            drop(pipe);
        }

        let output = match self.config.timeout {
            Some(limit) => wait_with_timeout(child, limit).await?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| InvokerError::Spawn {
            command: program.to_string(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(InvokerError::Failed {
            command: program.to_string(),
            status: output.status,
            output: text.trim().to_string(),
        })
    }
}

fn push_option(args: &mut Vec<OsString>, option: String) {
    args.push("-o".into());
    args.push(option.into());
}

/// `kill_on_drop` reaps the helper when the timeout drops the future
async fn wait_with_timeout(
    child: tokio::process::Child,
    limit: Duration,
) -> Result<std::io::Result<std::process::Output>, InvokerError> {
    tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| InvokerError::TimedOut(limit))
}

#[async_trait]
impl MountInvoker for SshfsInvoker {
    async fn establish(
        &self,
        mountpoint: &Path,
        params: &ConnectionParams,
    ) -> Result<(), InvokerError> {
        info!("Mounting {} at {:?}", params.connection, mountpoint);
        let password = match &params.credential {
            Some(Credential::Password(password)) => Some(password.as_str()),
            _ => None,
        };
        let args = self.mount_args(mountpoint, params);
        self.run(&self.config.command, args, password)
            .await
            .inspect_err(|e| error!("Mount of {:?} failed: {}", mountpoint, e))
    }

    async fn teardown(&self, mountpoint: &Path) -> Result<(), InvokerError> {
        info!("Unmounting {:?}", mountpoint);
        self.run(
            &self.config.unmount_command,
            vec![mountpoint.as_os_str().to_owned()],
            None,
        )
        .await
        .inspect_err(|e| error!("Unmount of {:?} failed: {}", mountpoint, e))
    }
}
