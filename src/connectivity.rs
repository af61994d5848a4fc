use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers "is the remote authority reachable right now?". Synchronous and
/// side-effect free; sampled by the connectivity monitor and consulted by
/// the fetch/mutation paths.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Reachability check against a host:port with a bounded connect timeout.
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl ConnectivityProbe for TcpProbe {
    fn is_online(&self) -> bool {
        let Ok(mut addrs) = self.addr.to_socket_addrs() else {
            return false;
        };
        let Some(addr) = addrs.next() else {
            return false;
        };
        TcpStream::connect_timeout(&addr, self.timeout).is_ok()
    }
}

/// Manually switched probe backed by a shared flag. Used by tests and by
/// callers that want to force offline mode.
#[derive(Clone)]
pub struct SharedProbe {
    online: Arc<AtomicBool>,
}

impl SharedProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for SharedProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
