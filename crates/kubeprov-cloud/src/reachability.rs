//! Waiting for instances to accept connections (exponential backoff)

use crate::plan::ReachabilityCheck;
use async_trait::async_trait;
use kubeprov_core::{ProvisionError, ProvisionedInstance, Result};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};

/// Checks whether a host answers on a port
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, address: &str, port: u16, banner: Option<&str>) -> bool;
}

/// TCP connect probe, optionally reading a greeting banner
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, address: &str, port: u16, banner: Option<&str>) -> bool {
        let mut stream =
            match timeout(self.connect_timeout, TcpStream::connect((address, port))).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::trace!("{}:{} not reachable: {}", address, port, e);
                    return false;
                }
                Err(_) => return false,
            };

        let Some(banner) = banner else {
            return true;
        };

        let mut buf = [0u8; 256];
        match timeout(self.connect_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&buf[..n]).contains(banner),
            _ => false,
        }
    }
}

/// Delay between probes
#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Wait until `address` passes `check` or the check's timeout elapses
pub async fn wait_for_host(
    probe: &dyn ReachabilityProbe,
    address: &str,
    check: &ReachabilityCheck,
    backoff: &Backoff,
) -> Result<()> {
    let deadline = Instant::now() + check.timeout();
    let mut attempt = 0;

    loop {
        if probe.probe(address, check.port, check.banner.as_deref()).await {
            tracing::debug!("{}:{} reachable after {} attempt(s)", address, check.port, attempt + 1);
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProvisionError::provider(format!(
                "{} did not become reachable on port {} within {}s",
                address, check.port, check.timeout_secs
            )));
        }

        sleep(backoff.delay_for_attempt(attempt).min(deadline - now)).await;
        attempt += 1;
    }
}

/// Wait for every instance of a role; instances are checked one after another
pub async fn wait_for_instances(
    probe: &dyn ReachabilityProbe,
    instances: &[ProvisionedInstance],
    check: &ReachabilityCheck,
    backoff: &Backoff,
) -> Result<()> {
    if !check.initial_delay().is_zero() {
        sleep(check.initial_delay()).await;
    }

    for instance in instances {
        let address = instance.address(check.address).ok_or_else(|| {
            ProvisionError::provider(format!(
                "{} has no {} address to check",
                instance.name, check.address
            ))
        })?;
        wait_for_host(probe, address, check, backoff).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeprov_core::{AddressKind, Role};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    struct FlakyProbe {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReachabilityProbe for FlakyProbe {
        async fn probe(&self, _address: &str, _port: u16, _banner: Option<&str>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) >= self.failures
        }
    }

    fn fast() -> Backoff {
        Backoff {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    fn instance(public_ip: Option<&str>) -> ProvisionedInstance {
        ProvisionedInstance {
            id: "i-1".to_string(),
            name: "k8s-ibis-zx81ab".to_string(),
            private_ip: Some("10.0.0.4".to_string()),
            public_ip: public_ip.map(str::to_string),
            zone: None,
            role: Role::Node,
        }
    }

    #[test]
    fn test_delay_calculation() {
        let backoff = Backoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(10)); // capped at max
    }

    #[tokio::test]
    async fn test_retries_until_reachable() {
        let probe = FlakyProbe {
            failures: 3,
            calls: AtomicU32::new(0),
        };
        let check = ReachabilityCheck::ssh(Role::Node, AddressKind::Public).with_timeout(5);

        wait_for_host(&probe, "203.0.113.7", &check, &fast()).await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_timeout_is_a_provider_error() {
        let probe = FlakyProbe {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let check = ReachabilityCheck::ssh(Role::Node, AddressKind::Public).with_timeout(0);

        let err = wait_for_host(&probe, "203.0.113.7", &check, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Provider(_)));
        assert!(err.to_string().contains("port 22"));
    }

    #[tokio::test]
    async fn test_missing_address() {
        let probe = FlakyProbe {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let check = ReachabilityCheck::ssh(Role::Node, AddressKind::Public);

        let result = wait_for_instances(&probe, &[instance(None)], &check, &fast()).await;
        assert!(result.is_err());

        let check = ReachabilityCheck::ssh(Role::Node, AddressKind::Private);
        wait_for_instances(&probe, &[instance(None)], &check, &fast())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tcp_probe_reads_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await;
            }
        });

        let probe = TcpProbe::new(Duration::from_secs(2));
        assert!(probe.probe("127.0.0.1", port, None).await);
        assert!(probe.probe("127.0.0.1", port, Some("SSH")).await);
        assert!(!probe.probe("127.0.0.1", port, Some("HTTP")).await);
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new(Duration::from_millis(500));
        assert!(!probe.probe("127.0.0.1", port, None).await);
    }
}
