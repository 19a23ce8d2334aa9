//! CPU affinity and processor discovery.
//!
//! On Linux the calling thread is pinned with `sched_setaffinity`. On other platforms pinning
//! is not available; a warning is logged and the probe runs wherever the scheduler puts it.

use std::io;
use std::thread;

#[cfg(not(target_os = "linux"))]
use tracing::warn;

/// Kernel list of possible CPUs, the same source libbpf uses
const POSSIBLE_CPUS_PATH: &str = "/sys/devices/system/cpu/possible";

/// Pin the calling thread to `cpu`.
pub fn pin_current_thread(cpu: usize) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        linux_impl::pin_current_thread(cpu)
    }

    #[cfg(not(target_os = "linux"))]
    {
        warn!(cpu, "CPU pinning is not supported on this platform; running unpinned");
        Ok(())
    }
}

/// Number of processor slots on this host.
///
/// Reads the kernel's possible-CPU list (`0-7`, `0,2-3`, ...) so offline CPUs still get a
/// slot; falls back to the available parallelism.
pub fn possible_cpus() -> usize {
    std::fs::read_to_string(POSSIBLE_CPUS_PATH)
        .ok()
        .and_then(|list| parse_cpu_list(&list))
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
}

/// Highest CPU index in a kernel CPU list, plus one
pub fn parse_cpu_list(list: &str) -> Option<usize> {
    let mut max: Option<usize> = None;
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        let last = match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().ok()?;
                let end: usize = end.trim().parse().ok()?;
                if end < start {
                    return None;
                }
                end
            }
            None => part.trim().parse().ok()?,
        };
        max = Some(max.map_or(last, |m| m.max(last)));
    }
    max.map(|m| m + 1)
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use std::io;
    use std::mem;

    pub fn pin_current_thread(cpu: usize) -> io::Result<()> {
        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let rc = unsafe {
            let mut set: libc::cpu_set_t = mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(cpu, &mut set);
            libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
