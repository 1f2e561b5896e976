//! Rendezvous endpoints and connection establishment.
//!
//! Each configured peer gets one Unix-socket listener. Establishment waits
//! on every pending listener at once, so the host and network peers may
//! connect in either order, and a session configured with a single peer
//! never binds the other socket at all. A listener accepts exactly one
//! connection and closes; the accepted stream stays open for the rest of
//! the session so the peer observes teardown.

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use crate::error::{Result, SimWireError};
use crate::memory::ShmRegion;

use super::fdpass;
use super::intro::DeviceIntro;

/// One rendezvous listener. Accepts exactly one peer, introduces the
/// region to it, and is gone.
pub struct PeerEndpoint {
    listener: UnixListener,
    path: PathBuf,
    label: &'static str,
}

impl PeerEndpoint {
    /// Bind the rendezvous socket, replacing a stale socket file left by
    /// an earlier run.
    pub fn bind(path: &Path, label: &'static str) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        // Remove existing socket if present
        let _ = std::fs::remove_file(path);

        let listener = UnixListener::bind(path).map_err(|e| {
            SimWireError::handshake(format!(
                "failed to bind {} socket {}: {}",
                label,
                path.display(),
                e
            ))
        })?;
        log::debug!("{} endpoint listening on {}", label, path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            label,
        })
    }

    fn raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Block until the peer connects, then send the introduction record and
    /// the region descriptor in one message. Consumes the endpoint: the
    /// listener closes right after the accept, so a queue pair can never
    /// have a second taker.
    pub fn accept_and_introduce(
        self,
        intro: &DeviceIntro,
        region: &ShmRegion,
    ) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().map_err(|e| {
            SimWireError::handshake(format!("failed to accept {} peer: {}", self.label, e))
        })?;
        log::info!("{} peer connected", self.label);
        fdpass::send_with_fd(&stream, intro.as_bytes(), region.raw_fd())?;
        log::info!("{} introduction sent", self.label);
        Ok(stream)
    }
}

impl Drop for PeerEndpoint {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::warn!(
                "failed to remove {} socket {}: {}",
                self.label,
                self.path.display(),
                err
            );
        }
    }
}

enum WaitState {
    AwaitingBoth {
        host: PeerEndpoint,
        network: PeerEndpoint,
    },
    AwaitingHost {
        host: PeerEndpoint,
    },
    AwaitingNetwork {
        network: PeerEndpoint,
    },
    Ready,
}

/// Connection establishment over the configured endpoints.
///
/// Starts in the wait state matching the configuration and shrinks the
/// wait set one accept at a time until every configured peer has been
/// introduced.
pub struct Rendezvous {
    state: WaitState,
    host_stream: Option<UnixStream>,
    net_stream: Option<UnixStream>,
}

impl Rendezvous {
    pub fn new(host: Option<PeerEndpoint>, network: Option<PeerEndpoint>) -> Self {
        let state = match (host, network) {
            (Some(host), Some(network)) => WaitState::AwaitingBoth { host, network },
            (Some(host), None) => WaitState::AwaitingHost { host },
            (None, Some(network)) => WaitState::AwaitingNetwork { network },
            (None, None) => WaitState::Ready,
        };
        Self {
            state,
            host_stream: None,
            net_stream: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, WaitState::Ready)
    }

    /// Drive establishment to completion and return the accepted streams,
    /// in (host, network) order.
    pub fn run(
        mut self,
        region: &ShmRegion,
        host_intro: &DeviceIntro,
        net_intro: &DeviceIntro,
    ) -> Result<(Option<UnixStream>, Option<UnixStream>)> {
        while !self.is_ready() {
            self.step(region, host_intro, net_intro)?;
        }
        Ok((self.host_stream, self.net_stream))
    }

    /// One readiness wait plus the accepts it unblocks.
    fn step(
        &mut self,
        region: &ShmRegion,
        host_intro: &DeviceIntro,
        net_intro: &DeviceIntro,
    ) -> Result<()> {
        let state = std::mem::replace(&mut self.state, WaitState::Ready);
        self.state = match state {
            WaitState::AwaitingBoth { host, network } => {
                match poll_pair(host.raw_fd(), network.raw_fd())? {
                    (true, true) => {
                        self.host_stream = Some(host.accept_and_introduce(host_intro, region)?);
                        self.net_stream = Some(network.accept_and_introduce(net_intro, region)?);
                        WaitState::Ready
                    }
                    (true, false) => {
                        self.host_stream = Some(host.accept_and_introduce(host_intro, region)?);
                        WaitState::AwaitingNetwork { network }
                    }
                    (false, true) => {
                        self.net_stream = Some(network.accept_and_introduce(net_intro, region)?);
                        WaitState::AwaitingHost { host }
                    }
                    (false, false) => WaitState::AwaitingBoth { host, network },
                }
            }
            WaitState::AwaitingHost { host } => {
                self.host_stream = Some(host.accept_and_introduce(host_intro, region)?);
                WaitState::Ready
            }
            WaitState::AwaitingNetwork { network } => {
                self.net_stream = Some(network.accept_and_introduce(net_intro, region)?);
                WaitState::Ready
            }
            WaitState::Ready => WaitState::Ready,
        };
        Ok(())
    }
}

/// Wait for a connection attempt on either listener. Infinite timeout;
/// establishment happens once, before simulated time starts.
fn poll_pair(a: RawFd, b: RawFd) -> Result<(bool, bool)> {
    let mut pfds = [
        libc::pollfd {
            fd: a,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: b,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    // SAFETY: pfds is a live array of two pollfd entries.
    let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok((
        pfds[0].revents & libc::POLLIN != 0,
        pfds[1].revents & libc::POLLIN != 0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::intro::DEVICE_INTRO_LEN;
    use crate::memory::layout::QueueGeometry;

    fn geometry(offset: u64) -> QueueGeometry {
        QueueGeometry {
            offset,
            slot_size: 64,
            slot_count: 8,
        }
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        std::fs::write(&path, b"stale").unwrap();

        let endpoint = PeerEndpoint::bind(&path, "host").unwrap();
        assert!(path.exists());
        drop(endpoint);
        assert!(!path.exists());
    }

    #[test]
    fn test_accept_sends_introduction_and_region() {
        let dir = tempfile::tempdir().unwrap();
        let region = ShmRegion::create(&dir.path().join("region"), 1024).unwrap();
        let path = dir.path().join("host.sock");
        let endpoint = PeerEndpoint::bind(&path, "host").unwrap();
        let intro = DeviceIntro::new(7, geometry(0), geometry(512));

        let connect_path = path.clone();
        let peer = std::thread::spawn(move || {
            let stream = UnixStream::connect(&connect_path).unwrap();
            fdpass::recv_with_fd(&stream, DEVICE_INTRO_LEN).unwrap()
        });

        let _stream = endpoint.accept_and_introduce(&intro, &region).unwrap();
        let (bytes, fd) = peer.join().unwrap();
        assert_eq!(DeviceIntro::from_bytes(&bytes).unwrap(), intro);

        let adopted = ShmRegion::from_fd(fd).unwrap();
        assert_eq!(adopted.len(), 1024);
    }

    #[test]
    fn test_rendezvous_without_endpoints_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let region = ShmRegion::create(&dir.path().join("region"), 1024).unwrap();
        let intro = DeviceIntro::new(0, geometry(0), geometry(512));

        let rendezvous = Rendezvous::new(None, None);
        assert!(rendezvous.is_ready());
        let (host, network) = rendezvous.run(&region, &intro, &intro).unwrap();
        assert!(host.is_none());
        assert!(network.is_none());
    }
}
