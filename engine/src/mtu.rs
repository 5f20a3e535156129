// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::error::MtuAttemptError;
use crate::host::Host;
use crate::inventory::resolve_interface_name;
use common::{RetryError, RetryPolicy};
use hardware::pci::address::PciAddress;

/// Set the MTU of the netdev of `pci`, retrying while the netdev is missing or refuses the
/// write.  The interface name is resolved again on every attempt since it may change while
/// the driver re-creates the netdev.
pub(crate) async fn write_mtu<H: Host>(
    host: &H,
    policy: &RetryPolicy,
    pci: PciAddress,
    mtu: u32,
) -> Result<(), RetryError<MtuAttemptError>> {
    policy
        .retry(format!("set MTU {mtu} on {pci}"), move || async move {
            let ifname = resolve_interface_name(host, &pci)
                .await
                .ok_or(MtuAttemptError::NoInterface(pci))?;
            host.write_mtu(&ifname, mtu).await?;
            Ok(())
        })
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::write_mtu;
    use crate::error::MtuAttemptError;
    use crate::fake::{FakeHost, FakeOp};
    use common::RetryPolicy;
    use hardware::pci::address::PciAddress;
    use hardware::pci::device::DeviceId;
    use hardware::pci::vendor::VendorId;
    use std::time::Duration;
    use tokio::time::Instant;

    fn host() -> (FakeHost, PciAddress) {
        let host = FakeHost::new();
        let pci: PciAddress = "0000:3b:00.0".parse().unwrap();
        host.add_pf(pci, "ens2f0", VendorId::INTEL, DeviceId::new(0x159b), 8, "ice");
        (host, pci)
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let (host, pci) = host();
        host.fail_times(FakeOp::WriteMtu, 3);
        let start = Instant::now();
        write_mtu(&host, &RetryPolicy::MTU_WRITE, pci, 9000)
            .await
            .unwrap();
        assert_eq!(host.mtu_of("ens2f0"), Some(9000));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_ten_attempts() {
        let (host, pci) = host();
        host.fail(FakeOp::WriteMtu);
        let start = Instant::now();
        let err = write_mtu(&host, &RetryPolicy::MTU_WRITE, pci, 9000)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 10);
        assert!(matches!(err.last, MtuAttemptError::Host(_)));
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_interface() {
        let (host, pci) = host();
        host.set_net_names(&pci, &[]);
        let err = write_mtu(&host, &RetryPolicy::new(Duration::from_secs(1), 2), pci, 1500)
            .await
            .unwrap_err();
        assert!(matches!(err.last, MtuAttemptError::NoInterface(p) if p == pci));
    }
}
