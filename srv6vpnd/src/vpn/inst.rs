use std::net::IpAddr;

use bgp_packet::{PrefixSid, RouteDistinguisher};
use ipnet::IpNet;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use super::{RouteInstaller, VpnRouteStore};
use crate::srv6::{LocalSid, VrfId};

pub enum Message {
    Update {
        peer: IpAddr,
        rd: RouteDistinguisher,
        prefix: IpNet,
        nexthop: IpAddr,
        attr: Option<Vec<u8>>,
    },
    Withdraw {
        peer: IpAddr,
        rd: RouteDistinguisher,
        prefix: IpNet,
    },
    PeerDown {
        peer: IpAddr,
        tx: oneshot::Sender<usize>,
    },
    Advertise {
        sid: LocalSid,
        vrf: Option<VrfId>,
        tx: oneshot::Sender<Option<PrefixSid>>,
    },
    Snapshot {
        tx: oneshot::Sender<VpnRouteStore>,
    },
    Settle {
        tx: oneshot::Sender<()>,
    },
    Shutdown {
        tx: oneshot::Sender<()>,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("VPN installer task is not running")]
pub struct InstallerGone;

/// Handle to the installer task. Messages are processed in order, so a
/// peer's updates are applied in the order they were sent.
#[derive(Debug, Clone)]
pub struct VpnHandle {
    tx: mpsc::Sender<Message>,
}

impl VpnHandle {
    async fn send(&self, msg: Message) -> Result<(), InstallerGone> {
        self.tx.send(msg).await.map_err(|_| InstallerGone)
    }

    pub async fn update(
        &self,
        peer: IpAddr,
        rd: RouteDistinguisher,
        prefix: IpNet,
        nexthop: IpAddr,
        attr: Option<Vec<u8>>,
    ) -> Result<(), InstallerGone> {
        self.send(Message::Update {
            peer,
            rd,
            prefix,
            nexthop,
            attr,
        })
        .await
    }

    pub async fn withdraw(
        &self,
        peer: IpAddr,
        rd: RouteDistinguisher,
        prefix: IpNet,
    ) -> Result<(), InstallerGone> {
        self.send(Message::Withdraw { peer, rd, prefix }).await
    }

    /// Completes after every update queued before it has been applied.
    pub async fn peer_down(&self, peer: IpAddr) -> Result<usize, InstallerGone> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::PeerDown { peer, tx }).await?;
        rx.await.map_err(|_| InstallerGone)
    }

    pub async fn advertise(
        &self,
        sid: LocalSid,
        vrf: Option<VrfId>,
    ) -> Result<Option<PrefixSid>, InstallerGone> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Advertise { sid, vrf, tx }).await?;
        rx.await.map_err(|_| InstallerGone)
    }

    pub async fn snapshot(&self) -> Result<VpnRouteStore, InstallerGone> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Snapshot { tx }).await?;
        rx.await.map_err(|_| InstallerGone)
    }

    /// Completes once every FIB request queued so far has been
    /// acknowledged.
    pub async fn settle(&self) -> Result<(), InstallerGone> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Settle { tx }).await?;
        rx.await.map_err(|_| InstallerGone)
    }

    pub async fn shutdown(&self) -> Result<(), InstallerGone> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Shutdown { tx }).await?;
        rx.await.map_err(|_| InstallerGone)
    }
}

impl RouteInstaller {
    async fn process_msg(&mut self, msg: Message) -> bool {
        match msg {
            Message::Update {
                peer,
                rd,
                prefix,
                nexthop,
                attr,
            } => {
                // Decode errors are logged and leave the path invalid.
                let _ = self.on_receive(peer, rd, prefix, nexthop, attr.as_deref());
            }
            Message::Withdraw { peer, rd, prefix } => {
                self.on_withdraw(peer, rd, prefix);
            }
            Message::PeerDown { peer, tx } => {
                let removed = self.peer_down(peer);
                let _ = tx.send(removed);
            }
            Message::Advertise { sid, vrf, tx } => {
                let _ = tx.send(self.on_local_sid_advertise(&sid, vrf));
            }
            Message::Snapshot { tx } => {
                let _ = tx.send(self.store.clone());
            }
            Message::Settle { tx } => {
                self.settle().await;
                let _ = tx.send(());
            }
            Message::Shutdown { tx } => {
                self.shutdown().await;
                let _ = tx.send(());
                return false;
            }
        }
        true
    }

    pub async fn event_loop(mut self, mut rx: mpsc::Receiver<Message>) {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        break;
                    };
                    if !self.process_msg(msg).await {
                        break;
                    }
                }
                Some(ack) = self.acks.rx.recv() => {
                    self.on_fib_ack(ack);
                }
            }
        }
        info!("VPN installer stopped");
    }
}

pub fn serve(installer: RouteInstaller, queue_depth: usize) -> (VpnHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let handle = tokio::spawn(installer.event_loop(rx));
    (VpnHandle { tx }, handle)
}
