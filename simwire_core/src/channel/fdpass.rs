//! Introduction framing over the rendezvous socket.
//!
//! The device's introduction travels in a single `sendmsg` that carries
//! the record bytes and the region descriptor side by side, so a peer that
//! receives the geometry always receives the memory it describes. Records
//! are read with one `recv` and an exact length check; anything short,
//! long, or truncated fails the handshake.

use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{Result, SimWireError};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Send `bytes` and one descriptor as a single message.
pub fn send_with_fd(stream: &UnixStream, bytes: &[u8], fd: RawFd) -> Result<()> {
    let mut iov = libc::iovec {
        iov_base: bytes.as_ptr() as *mut libc::c_void,
        iov_len: bytes.len(),
    };

    // SAFETY: zeroed msghdr is valid before assigning pointers.
    let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
    msghdr.msg_iov = &mut iov;
    msghdr.msg_iovlen = 1;

    let data_len = std::mem::size_of::<RawFd>();
    let cmsg_space = unsafe { libc::CMSG_SPACE(data_len as u32) } as usize;
    let mut control_buf = vec![0u8; cmsg_space];
    msghdr.msg_control = control_buf.as_mut_ptr().cast();
    msghdr.msg_controllen = control_buf.len() as _;

    // SAFETY: control buffer sized with CMSG_SPACE and owned here.
    let cmsg = unsafe { libc::CMSG_FIRSTHDR(&msghdr) };
    if cmsg.is_null() {
        return Err(SimWireError::handshake("failed to build SCM_RIGHTS cmsg"));
    }
    // SAFETY: cmsg points into `control_buf` with room for one descriptor.
    unsafe {
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(data_len as u32) as _;
        std::ptr::copy_nonoverlapping(&fd, libc::CMSG_DATA(cmsg).cast::<RawFd>(), 1);
    }

    // SAFETY: msghdr points to live iov/control buffers.
    let n = unsafe { libc::sendmsg(stream.as_raw_fd(), &msghdr, SEND_FLAGS) };
    if n < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    if n as usize != bytes.len() {
        return Err(SimWireError::handshake(format!(
            "introduction send wrote {} of {} bytes",
            n,
            bytes.len()
        )));
    }
    Ok(())
}

/// Receive a record of exactly `len` bytes plus one descriptor.
pub fn recv_with_fd(stream: &UnixStream, len: usize) -> Result<(Vec<u8>, OwnedFd)> {
    let mut bytes = vec![0u8; len];
    let mut iov = libc::iovec {
        iov_base: bytes.as_mut_ptr().cast(),
        iov_len: bytes.len(),
    };

    let cmsg_space = unsafe { libc::CMSG_SPACE(std::mem::size_of::<RawFd>() as u32) } as usize;
    let mut control_buf = vec![0u8; cmsg_space];

    // SAFETY: zeroed msghdr is valid before assigning pointers.
    let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
    msghdr.msg_iov = &mut iov;
    msghdr.msg_iovlen = 1;
    msghdr.msg_control = control_buf.as_mut_ptr().cast();
    msghdr.msg_controllen = control_buf.len() as _;

    // SAFETY: msghdr points to live iov/control buffers.
    let n = unsafe { libc::recvmsg(stream.as_raw_fd(), &mut msghdr, 0) };
    if n < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    if n == 0 {
        return Err(SimWireError::handshake(
            "connection closed during introduction",
        ));
    }

    // Adopt any delivered descriptors before bailing out, or they leak.
    let mut fds = parse_fds(&msghdr);
    if (msghdr.msg_flags & libc::MSG_CTRUNC) != 0 {
        close_raw_fds(fds);
        return Err(SimWireError::handshake(
            "introduction control message truncated",
        ));
    }
    if n as usize != len {
        close_raw_fds(fds);
        return Err(SimWireError::handshake(format!(
            "introduction has {} bytes, expected {}",
            n, len
        )));
    }
    if fds.len() != 1 {
        let count = fds.len();
        close_raw_fds(fds);
        return Err(SimWireError::handshake(format!(
            "introduction carried {} descriptors, expected 1",
            count
        )));
    }
    // SAFETY: the descriptor came from SCM_RIGHTS and is owned by us now.
    let fd = unsafe { OwnedFd::from_raw_fd(fds.remove(0)) };
    Ok((bytes, fd))
}

/// Receive a record of exactly `len` bytes with no descriptor attached.
pub fn recv_record(stream: &mut UnixStream, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    let n = stream.read(&mut bytes)?;
    if n == 0 {
        return Err(SimWireError::handshake(
            "connection closed during introduction",
        ));
    }
    if n != len {
        return Err(SimWireError::handshake(format!(
            "introduction has {} bytes, expected {}",
            n, len
        )));
    }
    Ok(bytes)
}

fn parse_fds(msghdr: &libc::msghdr) -> Vec<RawFd> {
    let mut out = Vec::new();
    // SAFETY: msghdr points at a valid control buffer owned by the caller.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msghdr);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let cmsg_len = (*cmsg).cmsg_len as usize;
                let base_len = libc::CMSG_LEN(0) as usize;
                if cmsg_len >= base_len + std::mem::size_of::<RawFd>() {
                    let count = (cmsg_len - base_len) / std::mem::size_of::<RawFd>();
                    let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                    for i in 0..count {
                        out.push(*data.add(i));
                    }
                }
            }
            cmsg = libc::CMSG_NXTHDR(msghdr, cmsg);
        }
    }
    out
}

fn close_raw_fds(fds: impl IntoIterator<Item = RawFd>) {
    for fd in fds {
        if fd >= 0 {
            // SAFETY: stray descriptors from a rejected message belong to us.
            let _ = unsafe { libc::close(fd) };
        }
    }
}
