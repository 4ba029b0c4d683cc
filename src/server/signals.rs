//! # Señales
//! src/server/signals.rs
//!
//! SIGINT/SIGTERM en el master solo levantan una bandera atómica; el
//! Acceptor la revisa entre `poll()`s y arranca el apagado ordenado.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// ¿Llegó SIGINT o SIGTERM?
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Instala los handlers del master.
///
/// Sin `SA_RESTART`: un `poll()` bloqueado vuelve con EINTR y el Acceptor
/// ve la bandera de inmediato.
pub fn install_master_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_shutdown_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::sigaction(sig, &action) }?;
    }
    Ok(())
}

/// Ajustes de un worker recién forkeado.
///
/// El Ctrl-C de la terminal llega a todo el grupo de procesos: el worker
/// lo ignora y espera la marca de apagado del master. Si el master muere,
/// el kernel le manda SIGTERM.
pub fn prepare_worker(master: nix::unistd::Pid) -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        signal::sigaction(Signal::SIGINT, &ignore)?;
        signal::sigaction(Signal::SIGTERM, &default)?;
    }

    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong) };
        if rc != 0 {
            return Err(nix::Error::last());
        }
        // El master pudo morir antes del prctl
        if nix::unistd::getppid() != master {
            return Err(nix::Error::ESRCH);
        }
    }
    Ok(())
}
