//! Peer-side attach.
//!
//! The mirror image of the device handshake: connect to a rendezvous
//! socket, adopt the region the device sends, build this peer's two queue
//! halves from the advertised geometry, and answer with a peer
//! introduction. Host and network simulators both attach this way; the
//! only difference between them is which socket they dial.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::memory::ShmRegion;

use super::fdpass;
use super::intro::{DeviceIntro, PeerIntro, DEVICE_INTRO_LEN};
use super::ring::{ConsumerRing, ProducerRing};

/// One peer's side of a transport session.
pub struct PeerTransport {
    /// Messages to the device.
    pub tx: ProducerRing,
    /// Messages from the device.
    pub rx: ConsumerRing,
    device_intro: DeviceIntro,
    region: Arc<ShmRegion>,
    // Held open so this peer observes session teardown as a closed socket.
    _stream: UnixStream,
}

impl PeerTransport {
    /// Connect to a device rendezvous socket and complete the handshake.
    /// Blocks until the device accepts and introduces the region.
    pub fn connect(socket: &Path, intro: PeerIntro) -> Result<Self> {
        let mut stream = UnixStream::connect(socket)?;
        let (bytes, fd) = fdpass::recv_with_fd(&stream, DEVICE_INTRO_LEN)?;
        let device_intro = DeviceIntro::from_bytes(&bytes)?;
        let region = Arc::new(ShmRegion::from_fd(fd)?);
        log::info!(
            "adopted region of {} bytes (device flags {:#x})",
            region.len(),
            device_intro.flags
        );

        // Ring construction bounds-checks the advertised geometry against
        // the mapped size before any slot is touched.
        let tx = ProducerRing::new(region.clone(), device_intro.to_device)?;
        let rx = ConsumerRing::new(region.clone(), device_intro.from_device)?;

        stream.write_all(intro.as_bytes())?;
        Ok(Self {
            tx,
            rx,
            device_intro,
            region,
            _stream: stream,
        })
    }

    /// The introduction record the device sent.
    pub fn device_intro(&self) -> &DeviceIntro {
        &self.device_intro
    }

    pub fn region(&self) -> &Arc<ShmRegion> {
        &self.region
    }
}
