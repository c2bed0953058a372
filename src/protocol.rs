//! Volume plugin protocol adapter
//!
//! Translates the JSON bodies of the volume plugin API into
//! [`VolumeManager`] calls and encodes the outcome back into the response
//! shape the plugin host expects. Transport is up to the caller: hand
//! [`VolumePlugin::handle`] the request path and body, send back the bytes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::VolumeError;
use crate::mount::{Scope, VolumeManager};
use crate::volume::{MountState, VolumeInfo};

pub const ACTIVATE: &str = "/Plugin.Activate";
pub const CREATE: &str = "/VolumeDriver.Create";
pub const REMOVE: &str = "/VolumeDriver.Remove";
pub const MOUNT: &str = "/VolumeDriver.Mount";
pub const UNMOUNT: &str = "/VolumeDriver.Unmount";
pub const PATH: &str = "/VolumeDriver.Path";
pub const GET: &str = "/VolumeDriver.Get";
pub const LIST: &str = "/VolumeDriver.List";
pub const CAPABILITIES: &str = "/VolumeDriver.Capabilities";

/// Content type plugin hosts send and expect
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

const IMPLEMENTS: &str = "VolumeDriver";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("malformed request: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

/// Body of `/VolumeDriver.Create`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    /// Hosts send `null` when no options were given
    #[serde(default)]
    pub opts: Option<BTreeMap<String, String>>,
}

/// Body of Remove, Path and Get
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

/// Body of Mount and Unmount
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: String,
}

/// Status map attached to Get responses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VolumeStatus {
    pub connections: u32,
    pub state: MountState,
}

/// One volume as the plugin host sees it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub name: String,
    pub mountpoint: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VolumeStatus>,
}

impl Volume {
    /// Full description, used by Get
    fn detailed(info: VolumeInfo) -> Self {
        Self {
            created_at: Some(info.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            status: Some(VolumeStatus {
                connections: info.reference_count,
                state: info.state,
            }),
            ..Self::summary(info)
        }
    }

    /// Name and mountpoint only, used by List
    fn summary(info: VolumeInfo) -> Self {
        Self {
            name: info.name,
            mountpoint: info.mountpoint,
            created_at: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginCapabilities {
    pub scope: Scope,
}

/// Every endpoint answers with a subset of these fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<PluginCapabilities>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: message.into(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.err.is_empty()
    }
}

/// Dispatches plugin API calls onto a [`VolumeManager`]
#[derive(Clone)]
pub struct VolumePlugin {
    manager: Arc<VolumeManager>,
}

impl VolumePlugin {
    pub fn new(manager: Arc<VolumeManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<VolumeManager> {
        &self.manager
    }

    /// Handle one request and return the encoded response body.
    ///
    /// Failures are encoded as `{"Err": "..."}`; this never panics on bad
    /// input.
    pub async fn handle(&self, endpoint: &str, body: &[u8]) -> Vec<u8> {
        let response = self.dispatch(endpoint, body).await.unwrap_or_else(|e| {
            warn!("{} failed: {}", endpoint, e);
            Response::error(e.to_string())
        });
        serde_json::to_vec(&response)
            .unwrap_or_else(|e| format!(r#"{{"Err":"failed to encode response: {}"}}"#, e).into_bytes())
    }

    /// Typed dispatch; `handle` without the encoding
    pub async fn dispatch(&self, endpoint: &str, body: &[u8]) -> Result<Response, ProtocolError> {
        debug!("{} ({} byte body)", endpoint, body.len());
        let m = &self.manager;

        let response = match endpoint {
            ACTIVATE => Response {
                implements: Some(vec![IMPLEMENTS.to_string()]),
                ..Response::default()
            },
            CREATE => {
                let req: CreateRequest = parse(body)?;
                m.create(&req.name, &req.opts.unwrap_or_default())?;
                Response::default()
            }
            REMOVE => {
                let req: NameRequest = parse(body)?;
                m.remove(&req.name).await?;
                Response::default()
            }
            MOUNT => {
                let req: MountRequest = parse(body)?;
                Response {
                    mountpoint: Some(m.mount(&req.name, &req.id).await?),
                    ..Response::default()
                }
            }
            UNMOUNT => {
                let req: MountRequest = parse(body)?;
                m.unmount(&req.name, &req.id).await?;
                Response::default()
            }
            PATH => {
                let req: NameRequest = parse(body)?;
                Response {
                    mountpoint: Some(m.path(&req.name)?),
                    ..Response::default()
                }
            }
            GET => {
                let req: NameRequest = parse(body)?;
                Response {
                    volume: Some(Volume::detailed(m.get(&req.name)?)),
                    ..Response::default()
                }
            }
            LIST => Response {
                volumes: Some(m.list().into_iter().map(Volume::summary).collect()),
                ..Response::default()
            },
            CAPABILITIES => Response {
                capabilities: Some(PluginCapabilities {
                    scope: m.capabilities().scope,
                }),
                ..Response::default()
            },
            other => return Err(ProtocolError::UnknownEndpoint(other.to_string())),
        };
        Ok(response)
    }
}

/// An empty body reads as `{}`
fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    Ok(serde_json::from_slice(body)?)
}
