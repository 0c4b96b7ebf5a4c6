//! Thread pinning and scheduling priority.
//!
//! Both are applied by the worker thread to itself, once, before it reports
//! readiness. Affinity failures abort construction. Priority failures are
//! only logged: an unprivileged process may not lower its nice value.

use std::io;

use crate::error::InitError;
use crate::placement::{Placement, PriorityClass};

/// Maximum number of CPUs the affinity API can address.
#[cfg(target_os = "linux")]
pub const CPU_SET_CAPACITY: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

/// Maximum number of CPUs the affinity API can address.
#[cfg(target_os = "windows")]
pub const CPU_SET_CAPACITY: usize = usize::BITS as usize;

/// Maximum number of CPUs the affinity API can address.
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub const CPU_SET_CAPACITY: usize = 1024;

/// Applies `placement` to the calling thread.
///
/// # Errors
///
/// Returns [`InitError::Affinity`] if the thread cannot be pinned.
pub(crate) fn apply_placement(worker: &str, placement: &Placement) -> Result<(), InitError> {
    if placement.is_pinned() {
        set_cpu_affinity(&placement.cpus)?;
    }
    if let Err(e) = set_priority(placement.priority) {
        tracing::warn!(
            worker,
            priority = ?placement.priority,
            error = %e,
            "failed to set thread priority"
        );
    }
    Ok(())
}

/// Pins the current thread to `cpus`.
fn set_cpu_affinity(cpus: &[usize]) -> Result<(), InitError> {
    let fail = |message: String| InitError::Affinity {
        cpus: cpus.to_vec(),
        message,
    };
    if let Some(&cpu) = cpus.iter().find(|&&cpu| cpu >= CPU_SET_CAPACITY) {
        return Err(fail(format!(
            "core index {cpu} exceeds CPU_SET_CAPACITY ({CPU_SET_CAPACITY})"
        )));
    }

    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
        use std::mem;

        // SAFETY: the set is zero-initialised with CPU_ZERO and every index
        // was checked against CPU_SET_CAPACITY. pid 0 is the calling thread.
        #[allow(unsafe_code)]
        unsafe {
            let mut set: cpu_set_t = mem::zeroed();
            CPU_ZERO(&mut set);
            for &cpu in cpus {
                CPU_SET(cpu, &mut set);
            }

            let result = sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &set);
            if result != 0 {
                return Err(fail(format!(
                    "sched_setaffinity failed: {}",
                    io::Error::last_os_error()
                )));
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        use winapi::shared::basetsd::DWORD_PTR;
        use winapi::um::processthreadsapi::GetCurrentThread;
        use winapi::um::winbase::SetThreadAffinityMask;

        let mask: DWORD_PTR = cpus.iter().fold(0, |mask, &cpu| mask | (1 << cpu));
        // SAFETY: GetCurrentThread returns a pseudo-handle that needs no
        // closing; the mask only has bits below the pointer width.
        #[allow(unsafe_code)]
        unsafe {
            if SetThreadAffinityMask(GetCurrentThread(), mask) == 0 {
                return Err(fail(format!(
                    "SetThreadAffinityMask failed: {}",
                    io::Error::last_os_error()
                )));
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let _ = fail;
    }

    Ok(())
}

/// Sets the scheduling priority of the current thread.
fn set_priority(priority: PriorityClass) -> io::Result<()> {
    let Some(nice) = priority.nice_value() else {
        return Ok(());
    };

    #[cfg(target_os = "linux")]
    {
        // SAFETY: plain syscalls on the calling thread's own id.
        #[allow(unsafe_code)]
        unsafe {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
            if libc::setpriority(libc::PRIO_PROCESS, tid, nice) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        use winapi::um::processthreadsapi::{GetCurrentThread, SetThreadPriority};

        // THREAD_PRIORITY_BELOW_NORMAL / THREAD_PRIORITY_NORMAL
        let level: i32 = if nice > 0 { -1 } else { 0 };
        // SAFETY: pseudo-handle of the calling thread.
        #[allow(unsafe_code)]
        unsafe {
            if SetThreadPriority(GetCurrentThread(), level) == 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let _ = nice;
    }

    Ok(())
}
