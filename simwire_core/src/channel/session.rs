//! Device-side transport session.
//!
//! A session owns everything one device instance needs: the region, the
//! computed layout, and one channel per connected peer. All cursors and
//! connection state live inside the session, so several sessions can
//! coexist in one process (each with its own region and sockets).

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimWireError};
use crate::memory::layout::{QueueGeometry, RegionLayout, RingDims, DEFAULT_REGION_SIZE};
use crate::memory::{platform, ShmRegion};

use super::endpoint::{PeerEndpoint, Rendezvous};
use super::fdpass;
use super::intro::{DeviceIntro, PeerIntro, PEER_INTRO_LEN};
use super::ring::{ConsumerRing, ProducerRing};

/// Session configuration, loadable from TOML. The defaults reproduce the
/// geometry deployed peers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backing file for the shared region.
    pub shm_path: PathBuf,
    /// Total bytes mapped; all four queues must fit.
    pub region_size: u64,
    /// Rendezvous socket for the host peer; `None` runs network-only.
    pub host_socket: Option<PathBuf>,
    /// Rendezvous socket for the network peer; `None` runs host-only.
    pub network_socket: Option<PathBuf>,
    /// Slot dimensions of the two host-facing queues.
    pub host_dims: RingDims,
    /// Slot dimensions of the two network-facing queues.
    pub net_dims: RingDims,
    /// Per-queue override of the pairwise dimensions; a set field wins
    /// for that queue only.
    pub host_to_device_dims: Option<RingDims>,
    /// See `host_to_device_dims`.
    pub device_to_host_dims: Option<RingDims>,
    /// See `host_to_device_dims`.
    pub net_to_device_dims: Option<RingDims>,
    /// See `host_to_device_dims`.
    pub device_to_net_dims: Option<RingDims>,
    /// Forwarded verbatim in both device introductions.
    pub device_flags: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shm_path: platform::shm_region_path("session"),
            region_size: DEFAULT_REGION_SIZE,
            host_socket: None,
            network_socket: None,
            host_dims: RingDims::host(),
            net_dims: RingDims::network(),
            host_to_device_dims: None,
            device_to_host_dims: None,
            net_to_device_dims: None,
            device_to_net_dims: None,
            device_flags: 0,
        }
    }
}

impl SessionConfig {
    /// Load a configuration from a TOML file; missing fields keep their
    /// defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_socket.is_none() && self.network_socket.is_none() {
            return Err(SimWireError::config(
                "at least one peer socket must be configured",
            ));
        }
        Ok(())
    }

    /// Effective dimensions of the four queues, in layout order.
    pub fn queue_dims(&self) -> [RingDims; 4] {
        [
            self.host_to_device_dims.unwrap_or(self.host_dims),
            self.device_to_host_dims.unwrap_or(self.host_dims),
            self.net_to_device_dims.unwrap_or(self.net_dims),
            self.device_to_net_dims.unwrap_or(self.net_dims),
        ]
    }
}

/// Device-side half of one peer connection: the queue pair plus the
/// peer's introduction record.
pub struct PeerChannel {
    /// Messages from the peer.
    pub rx: ConsumerRing,
    /// Messages to the peer.
    pub tx: ProducerRing,
    /// What the peer announced about itself.
    pub intro: PeerIntro,
    // Held open so the peer observes session teardown as a closed socket.
    _stream: UnixStream,
}

/// A fully established device-side transport.
pub struct TransportSession {
    region: Arc<ShmRegion>,
    layout: RegionLayout,
    host: Option<PeerChannel>,
    network: Option<PeerChannel>,
}

impl TransportSession {
    /// Create the region, run the rendezvous, and exchange introductions
    /// with every configured peer. Returns once the session is ready for
    /// traffic; any failure along the way aborts the whole setup.
    pub fn establish(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let layout = RegionLayout::compute_each(config.region_size, config.queue_dims())?;
        let region_size = usize::try_from(config.region_size)
            .map_err(|_| SimWireError::memory("region size exceeds the address space"))?;
        let region = Arc::new(ShmRegion::create(&config.shm_path, region_size)?);
        for (name, geometry) in layout.queues() {
            log::debug!(
                "{} queue at [{}..{}), {} slots of {} bytes",
                name,
                geometry.offset,
                geometry.end_offset()?,
                geometry.slot_count,
                geometry.slot_size
            );
        }

        let host_intro = DeviceIntro::new(
            config.device_flags,
            layout.host_to_device,
            layout.device_to_host,
        );
        let net_intro = DeviceIntro::new(
            config.device_flags,
            layout.net_to_device,
            layout.device_to_net,
        );

        let host_endpoint = match &config.host_socket {
            Some(path) => Some(PeerEndpoint::bind(path, "host")?),
            None => None,
        };
        let net_endpoint = match &config.network_socket {
            Some(path) => Some(PeerEndpoint::bind(path, "network")?),
            None => None,
        };

        let (host_stream, net_stream) =
            Rendezvous::new(host_endpoint, net_endpoint).run(&region, &host_intro, &net_intro)?;

        // Peer introductions are read only after every configured peer is
        // connected, host first.
        let host = host_stream
            .map(|stream| {
                Self::finish_peer(
                    stream,
                    &region,
                    layout.host_to_device,
                    layout.device_to_host,
                    "host",
                )
            })
            .transpose()?;
        let network = net_stream
            .map(|stream| {
                Self::finish_peer(
                    stream,
                    &region,
                    layout.net_to_device,
                    layout.device_to_net,
                    "network",
                )
            })
            .transpose()?;

        log::info!(
            "transport session ready (host: {}, network: {})",
            host.is_some(),
            network.is_some()
        );
        Ok(Self {
            region,
            layout,
            host,
            network,
        })
    }

    fn finish_peer(
        mut stream: UnixStream,
        region: &Arc<ShmRegion>,
        to_device: QueueGeometry,
        from_device: QueueGeometry,
        label: &'static str,
    ) -> Result<PeerChannel> {
        let bytes = fdpass::recv_record(&mut stream, PEER_INTRO_LEN)?;
        let intro = PeerIntro::from_bytes(&bytes)?;
        log::info!("{} introduction received (flags {:#x})", label, intro.flags);
        Ok(PeerChannel {
            rx: ConsumerRing::new(region.clone(), to_device)?,
            tx: ProducerRing::new(region.clone(), from_device)?,
            intro,
            _stream: stream,
        })
    }

    /// The host channel, when a host peer is connected.
    pub fn host(&mut self) -> Option<&mut PeerChannel> {
        self.host.as_mut()
    }

    /// The network channel, when a network peer is connected.
    pub fn network(&mut self) -> Option<&mut PeerChannel> {
        self.network.as_mut()
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    pub fn region(&self) -> &Arc<ShmRegion> {
        &self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::layout::{DEFAULT_HOST_SLOT_SIZE, DEFAULT_NET_SLOT_SIZE, DEFAULT_SLOT_COUNT};

    #[test]
    fn test_default_config_matches_deployed_peers() {
        let config = SessionConfig::default();
        assert_eq!(config.region_size, DEFAULT_REGION_SIZE);
        assert_eq!(config.host_dims.slot_size, DEFAULT_HOST_SLOT_SIZE);
        assert_eq!(config.net_dims.slot_size, DEFAULT_NET_SLOT_SIZE);
        assert_eq!(config.host_dims.slot_count, DEFAULT_SLOT_COUNT);
        assert_eq!(config.net_dims.slot_count, DEFAULT_SLOT_COUNT);
    }

    #[test]
    fn test_config_per_queue_dims_override_pairwise_defaults() {
        let mut config = SessionConfig::default();
        config.host_dims = RingDims::new(128, 8);
        config.device_to_host_dims = Some(RingDims::new(8256, 32));

        let dims = config.queue_dims();
        assert_eq!(dims[0], RingDims::new(128, 8));
        assert_eq!(dims[1], RingDims::new(8256, 32));
        assert_eq!(dims[2], RingDims::network());
        assert_eq!(dims[3], RingDims::network());
    }

    #[test]
    fn test_config_requires_at_least_one_peer() {
        let mut config = SessionConfig::default();
        assert!(config.validate().is_err());

        config.host_socket = Some(PathBuf::from("/tmp/host.sock"));
        assert!(config.validate().is_ok());

        config.host_socket = None;
        config.network_socket = Some(PathBuf::from("/tmp/net.sock"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_loads_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
shm_path = "/dev/shm/simwire/nic0"
host_socket = "/tmp/nic0-pci.sock"
device_flags = 5
host_dims = { slot_size = 256, slot_count = 64 }
device_to_host_dims = { slot_size = 8256, slot_count = 16 }
"#,
        )
        .unwrap();

        let config = SessionConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.shm_path, PathBuf::from("/dev/shm/simwire/nic0"));
        assert_eq!(config.host_socket, Some(PathBuf::from("/tmp/nic0-pci.sock")));
        assert_eq!(config.network_socket, None);
        assert_eq!(config.device_flags, 5);
        assert_eq!(config.host_dims, RingDims::new(256, 64));
        assert_eq!(config.device_to_host_dims, Some(RingDims::new(8256, 16)));
        // Unset fields keep their defaults.
        assert_eq!(config.host_to_device_dims, None);
        assert_eq!(config.net_dims, RingDims::network());
        assert_eq!(config.region_size, DEFAULT_REGION_SIZE);
    }

    #[test]
    fn test_config_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "region_size = \"lots\"").unwrap();
        assert!(matches!(
            SessionConfig::from_toml_file(&path),
            Err(SimWireError::Config(_))
        ));
    }
}
