use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::fib::{self, Dataplane, FibConfig, FibWorker};
use crate::show::{self, ShowCommand};
use crate::srv6::{LocalSidManager, LocatorTable};
use crate::vpn::{self, InstallerGone, RouteInstaller, VpnHandle};

/// Daemon state shared by configuration, show and shutdown.
pub struct Srv6Vpn {
    pub locators: Arc<LocatorTable>,
    pub sids: Arc<LocalSidManager>,
    pub vpn: VpnHandle,
    vpn_task: JoinHandle<()>,
    fib_task: JoinHandle<()>,
}

impl Srv6Vpn {
    pub fn new(
        dataplane: Arc<dyn Dataplane>,
        fib_config: FibConfig,
        encap_source: Option<Ipv6Addr>,
    ) -> Self {
        let queue_depth = fib_config.queue_depth;
        let (worker, fib) = FibWorker::new(dataplane, fib_config);
        let fib_task = fib::serve(worker);

        let locators = Arc::new(LocatorTable::new());
        let sids = Arc::new(LocalSidManager::new(locators.clone(), fib.clone()));
        let installer = RouteInstaller::new(fib, locators.clone(), encap_source);
        let (vpn, vpn_task) = vpn::serve(installer, queue_depth);

        Self {
            locators,
            sids,
            vpn,
            vpn_task,
            fib_task,
        }
    }

    pub async fn show(
        &self,
        command: ShowCommand,
        prefix: Option<IpNet>,
        locator: Option<&str>,
        json: bool,
    ) -> Result<String, InstallerGone> {
        let output = match command {
            ShowCommand::Locators => show::show_locators(&self.locators, json),
            ShowCommand::Locator => match locator {
                Some(name) => show::show_locator_detail(&self.locators, name, json),
                None => show::show_locators(&self.locators, json),
            },
            ShowCommand::LocalSids => show::show_local_sids(&self.sids.list(), json),
            ShowCommand::Vpn => show::show_vpn(&self.vpn.snapshot().await?, prefix, json),
            ShowCommand::Ipv4Rib => {
                show::show_rib(&self.vpn.snapshot().await?, &self.sids.list(), false, json)
            }
            ShowCommand::Ipv6Rib => {
                show::show_rib(&self.vpn.snapshot().await?, &self.sids.list(), true, json)
            }
        };
        Ok(output)
    }

    /// VPN routes leave the forwarding table first, local SIDs last.
    pub async fn shutdown(self) {
        let Srv6Vpn {
            sids,
            vpn,
            vpn_task,
            fib_task,
            ..
        } = self;
        if vpn.shutdown().await.is_ok() {
            let _ = vpn_task.await;
        }
        sids.shutdown().await;

        // The worker exits once the last FIB handle is gone.
        drop(vpn);
        drop(sids);
        if tokio::time::timeout(Duration::from_secs(1), fib_task)
            .await
            .is_err()
        {
            warn!("FIB worker still busy at exit");
        }
        info!("srv6vpnd stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use hex_literal::hex;
    use serde_json::{Value, json};

    use super::*;
    use crate::fib::MemoryDataplane;
    use crate::srv6::{Behavior, SidOwner, VrfId};

    #[tokio::test]
    async fn test_vpn_end_to_end() {
        let dataplane = Arc::new(MemoryDataplane::new());
        let srv6 = Srv6Vpn::new(dataplane.clone(), FibConfig::for_test(), None);
        let peer: IpAddr = "192.0.2.4".parse().unwrap();
        let prefix: IpNet = "4.4.4.4/32".parse().unwrap();

        srv6.vpn
            .update(
                peer,
                "1:1".parse().unwrap(),
                prefix,
                peer,
                Some(hex!("04001300010020010000000000010040000000000000").to_vec()),
            )
            .await
            .unwrap();
        srv6.vpn.settle().await.unwrap();

        let output = srv6.show(ShowCommand::Vpn, Some(prefix), None, true).await.unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            value,
            json!({"1:1":{"prefix":"4.4.4.4/32","paths":[{"valid":true,"remoteSid":"2001:0:0:1:40::"}]}})
        );
        assert_eq!(dataplane.route_count(), 1);

        srv6.shutdown().await;
        assert_eq!(dataplane.route_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_sids() {
        let dataplane = Arc::new(MemoryDataplane::new());
        let srv6 = Srv6Vpn::new(dataplane.clone(), FibConfig::for_test(), None);
        let id = srv6
            .locators
            .register("loc1", "2001:db8:1:1::/64".parse().unwrap(), 40, 24, 16)
            .unwrap();
        let sid = srv6
            .sids
            .allocate(id, Behavior::EndDT4, Some(VrfId(10)), SidOwner::Bgp)
            .unwrap();
        srv6.sids.install(&sid).await.unwrap();
        assert_eq!(dataplane.sid_count(), 1);

        let advertised = srv6.vpn.advertise(sid, Some(VrfId(10))).await.unwrap();
        assert!(advertised.is_some());

        srv6.shutdown().await;
        assert_eq!(dataplane.sid_count(), 0);
    }
}
