//! # Transporte de Handles de Conexión
//! src/ipc/transport.rs
//!
//! La cola compartida solo guarda `u64` en memoria compartida. Un socket
//! aceptado por el master no existe en la tabla de descriptores de un
//! worker que ya hizo `fork()`, así que el descriptor real viaja por un
//! [`HandleTransport`]:
//!
//! ```text
//! Acceptor ──stage(stream)──► token ──► slot en la cola ──► claim(token) ──► Worker
//! ```
//!
//! La cola llama a `stage`/`claim` con `queue_mutex` tomado, por lo que el
//! orden de los slots y el orden de los descriptores nunca divergen.

use std::io;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// Mueve handles de un lado a otro de la cola compartida.
pub trait HandleTransport: Send + Sync {
    /// Handle que entra por un lado y sale por el otro
    type Handle: Send;

    /// Prepara el handle para cruzar la cola y devuelve el token a guardar
    /// en el slot. Si falla, devuelve el handle intacto al llamador.
    fn stage(&self, handle: Self::Handle) -> Result<u64, (Self::Handle, io::Error)>;

    /// Recupera el handle asociado a `token`, en el mismo orden de `stage`.
    fn claim(&self, token: u64) -> io::Result<Self::Handle>;
}

/// Transporte para un solo proceso: el token es el descriptor mismo.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessTransport;

impl HandleTransport for InProcessTransport {
    type Handle = TcpStream;

    fn stage(&self, handle: TcpStream) -> Result<u64, (TcpStream, io::Error)> {
        let fd = handle.into_raw_fd();
        Ok(fd as u32 as u64)
    }

    fn claim(&self, token: u64) -> io::Result<TcpStream> {
        let fd = RawFd::try_from(token)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "token is not a descriptor"))?;
        // El descriptor salió de `into_raw_fd` en `stage`: nadie más lo posee
        Ok(unsafe { TcpStream::from_raw_fd(fd) })
    }
}

/// Transporte entre procesos: `SCM_RIGHTS` sobre un socketpair Unix.
///
/// Se crea antes del `fork()`; el master escribe en `tx` y los workers
/// leen de `rx`. Cada mensaje lleva el token como payload de 8 bytes y
/// exactamente un descriptor como dato auxiliar. El kernel no junta
/// mensajes que traen descriptores, así que cada `recvmsg` de 8 bytes
/// devuelve un mensaje completo.
///
/// `tx` es no bloqueante: `stage` corre con `queue_mutex` tomado y un
/// buffer lleno no puede dejar a los consumidores sin poder entrar.
pub struct ScmRightsTransport {
    tx: UnixStream,
    rx: UnixStream,
    next_token: std::sync::atomic::AtomicU64,
}

impl ScmRightsTransport {
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = UnixStream::pair()?;
        tx.set_nonblocking(true)?;
        Ok(Self {
            tx,
            rx,
            next_token: std::sync::atomic::AtomicU64::new(1),
        })
    }
}

/// Buffer de control alineado para un `cmsghdr` con un descriptor
#[repr(C, align(8))]
struct ControlBuffer([u8; 64]);

impl HandleTransport for ScmRightsTransport {
    type Handle = TcpStream;

    fn stage(&self, handle: TcpStream) -> Result<u64, (TcpStream, io::Error)> {
        let token = self
            .next_token
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        match send_fd(self.tx.as_raw_fd(), token, handle.as_raw_fd()) {
            // El kernel duplicó el descriptor en el mensaje: cerramos el nuestro
            Ok(()) => {
                drop(handle);
                Ok(token)
            }
            Err(e) => Err((handle, e)),
        }
    }

    fn claim(&self, token: u64) -> io::Result<TcpStream> {
        let (received, fd) = recv_fd(self.rx.as_raw_fd())?;
        let stream = unsafe { TcpStream::from_raw_fd(fd) };

        if received != token {
            // `stream` se cierra al salir; no se pierde el descriptor
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("handle order mismatch: expected token {}, got {}", token, received),
            ));
        }
        Ok(stream)
    }
}

fn send_fd(socket: RawFd, token: u64, fd: RawFd) -> io::Result<()> {
    let payload = token.to_ne_bytes();
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    let mut control = ControlBuffer([0; 64]);

    unsafe {
        let space = libc::CMSG_SPACE(std::mem::size_of::<RawFd>() as u32) as usize;
        let mut msg: libc::msghdr = std::mem::zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.0.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = space as _;

        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if cmsg.is_null() {
            return Err(io::Error::new(io::ErrorKind::Other, "control buffer too small"));
        }
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(std::mem::size_of::<RawFd>() as u32) as _;
        std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut RawFd, fd);

        loop {
            let sent = libc::sendmsg(socket, &msg, libc::MSG_NOSIGNAL);
            if sent == payload.len() as isize {
                return Ok(());
            }
            if sent >= 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "short handle message"));
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

fn recv_fd(socket: RawFd) -> io::Result<(u64, RawFd)> {
    let mut payload = [0u8; 8];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    let mut control = ControlBuffer([0; 64]);

    unsafe {
        let mut msg: libc::msghdr = std::mem::zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.0.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = control.0.len() as _;

        let received = loop {
            let n = libc::recvmsg(socket, &mut msg, libc::MSG_CMSG_CLOEXEC);
            if n >= 0 {
                break n as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        let mut fd: Option<RawFd> = None;
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                fd = Some(std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const RawFd));
                break;
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }

        let fd = fd.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "message without descriptor")
        })?;

        if received != payload.len() {
            libc::close(fd);
            return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated handle token"));
        }

        Ok((u64::from_ne_bytes(payload), fd))
    }
}
