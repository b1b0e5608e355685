//! Core types used throughout the control plane

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::errors::SharedError;

/// Node identity singleton - set once at startup
static NODE_ID: OnceLock<NodeId> = OnceLock::new();

static UNASSIGNED: NodeId = NodeId::Unassigned;

/// Identity of the running binary, attached to every log line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// Host agent, named by its configured agent id
    Agent(String),
    /// Central controller (singleton)
    Controller,
    /// Library code running before any init_* call (tests)
    Unassigned,
}

impl NodeId {
    /// Initialize the global node id for a host agent
    pub fn init_agent(agent_id: impl Into<String>) -> &'static NodeId {
        let agent_id = agent_id.into();
        NODE_ID.get_or_init(|| NodeId::Agent(agent_id))
    }

    /// Initialize the global node id for the controller
    pub fn init_controller() -> &'static NodeId {
        NODE_ID.get_or_init(|| NodeId::Controller)
    }

    /// Get the global node id, `Unassigned` if never initialized
    pub fn current() -> &'static NodeId {
        NODE_ID.get().unwrap_or(&UNASSIGNED)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Agent(id) => write!(f, "agent_{id}"),
            NodeId::Controller => write!(f, "controller"),
            NodeId::Unassigned => write!(f, "unassigned"),
        }
    }
}

/// Identifier of a host agent as known to the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(Uuid);

impl HostId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HostId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidHostId { input: s.to_string() })
    }
}

/// Lifecycle status of a game server on its host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl ServerStatus {
    /// Whether a live process is (or is about to be) attached to the server
    pub fn is_active(&self) -> bool {
        match self {
            ServerStatus::Starting | ServerStatus::Running | ServerStatus::Stopping => true,
            ServerStatus::Stopped | ServerStatus::Crashed => false,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// Connection status of a host as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Connecting,
    Online,
    Offline,
    Error,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostStatus::Connecting => "connecting",
            HostStatus::Online => "online",
            HostStatus::Offline => "offline",
            HostStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for HostStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connecting" => Ok(HostStatus::Connecting),
            "online" => Ok(HostStatus::Online),
            "offline" => Ok(HostStatus::Offline),
            "error" => Ok(HostStatus::Error),
            _ => Err(SharedError::InvalidStatus { input: s.to_string() }),
        }
    }
}

/// Resource configuration for launching a server process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Initial heap, e.g. "1G"
    pub min_memory: String,
    /// Maximum heap, e.g. "4G"
    pub max_memory: String,
    /// Extra runtime flags placed before the fixed tuning flags
    pub extra_args: Vec<String>,
    /// Server jar, relative to the server's working directory
    pub jar_file: String,
    /// Respawn the server when it exits without being asked to
    pub auto_restart: bool,
    pub custom_args: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_memory: "1G".to_string(),
            max_memory: "2G".to_string(),
            extra_args: Vec::new(),
            jar_file: "server.jar".to_string(),
            auto_restart: false,
            custom_args: BTreeMap::new(),
        }
    }
}

/// Request to create and launch a server on a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartServerRequest {
    pub server_id: String,
    pub name: String,
    /// paper, purpur, velocity, ...
    pub server_type: String,
    pub version: String,
    pub port: u16,
    pub config: ServerConfig,
}

/// A game server known to a host agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    pub server_type: String,
    pub version: String,
    /// Agent id of the owning host
    pub host_id: String,
    pub port: u16,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    /// Unix seconds
    pub started_at: Option<u64>,
    pub work_dir: PathBuf,
    pub config: ServerConfig,
    /// Consecutive automatic restarts after crashes
    pub restart_count: u32,
}

impl ServerDescriptor {
    pub fn from_request(request: StartServerRequest, host_id: impl Into<String>) -> Self {
        Self {
            id: request.server_id,
            name: request.name,
            server_type: request.server_type,
            version: request.version,
            host_id: host_id.into(),
            port: request.port,
            status: ServerStatus::Starting,
            pid: None,
            started_at: None,
            work_dir: PathBuf::new(),
            config: request.config,
            restart_count: 0,
        }
    }

    /// Rebuild the start request that produced this descriptor
    pub fn to_request(&self) -> StartServerRequest {
        StartServerRequest {
            server_id: self.id.clone(),
            name: self.name.clone(),
            server_type: self.server_type.clone(),
            version: self.version.clone(),
            port: self.port,
            config: self.config.clone(),
        }
    }
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
