use std::net::{IpAddr, Ipv6Addr};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use bgp_packet::{Afi, AttrEmitter, BgpParseError, RouteDistinguisher, VpnNlri};
use ipnet::{IpNet, Ipv6Net};
use serde::Deserialize;
use tracing::{info, warn};

use crate::fib::FibConfig;
use crate::inst::Srv6Vpn;
use crate::srv6::{Behavior, DEFAULT_FUNCTION_LEN, LocalSid, LocatorSpec, SidOwner, VrfId};

const DEFAULT_BLOCK_LEN: u8 = 40;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub fib: FibConfig,
    #[serde(default)]
    pub segment_routing: SegmentRoutingConfig,
    #[serde(default)]
    pub vrfs: Vec<VrfConfig>,
    #[serde(default)]
    pub updates: Vec<UpdateConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SegmentRoutingConfig {
    #[serde(default)]
    pub srv6: Srv6Config,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Srv6Config {
    pub encap_source: Option<Ipv6Addr>,
    #[serde(default)]
    pub locators: Vec<LocatorConfig>,
    #[serde(default)]
    pub sids: Vec<SidConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LocatorConfig {
    pub name: String,
    pub prefix: Ipv6Net,
    pub block_len: Option<u8>,
    pub node_len: Option<u8>,
    pub function_len: Option<u8>,
}

impl LocatorConfig {
    /// Fills in block and node lengths that were left out. Either one
    /// given alone determines the other from the prefix length.
    pub fn spec(&self) -> LocatorSpec {
        let plen = self.prefix.prefix_len();
        let (block_len, node_len) = match (self.block_len, self.node_len) {
            (Some(block), Some(node)) => (block, node),
            (Some(block), None) => (block, plen.saturating_sub(block)),
            (None, Some(node)) => (plen.saturating_sub(node), node),
            (None, None) => {
                let block = DEFAULT_BLOCK_LEN.min(plen);
                (block, plen - block)
            }
        };
        LocatorSpec {
            name: self.name.clone(),
            prefix: self.prefix,
            block_len,
            node_len,
            function_len: self.function_len.unwrap_or(DEFAULT_FUNCTION_LEN),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SidConfig {
    pub locator: String,
    pub behavior: Behavior,
    pub vrf: Option<VrfId>,
    #[serde(default = "static_owner")]
    pub owner: SidOwner,
}

fn static_owner() -> SidOwner {
    SidOwner::Static
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VrfConfig {
    pub name: String,
    pub table: VrfId,
    pub rd: String,
    pub srv6: Option<VrfSrv6Config>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VrfSrv6Config {
    pub locator: String,
    #[serde(default = "dt4")]
    pub behavior: Behavior,
}

fn dt4() -> Behavior {
    Behavior::EndDT4
}

/// A received VPN update replayed at startup. The route is taken from
/// `nlri` (hex VPN NLRI, family of the nexthop) when present, from `rd`
/// and `prefix` otherwise.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpdateConfig {
    pub peer: IpAddr,
    pub nexthop: Option<IpAddr>,
    pub rd: Option<String>,
    pub prefix: Option<IpNet>,
    pub nlri: Option<String>,
    pub prefix_sid: Option<String>,
}

#[derive(Debug)]
pub struct Update {
    pub peer: IpAddr,
    pub nexthop: IpAddr,
    pub rd: RouteDistinguisher,
    pub prefix: IpNet,
    pub attr: Option<Vec<u8>>,
}

fn parse_rd(rd: &str) -> Result<RouteDistinguisher> {
    rd.parse::<RouteDistinguisher>()
        .map_err(|e| anyhow!("invalid route distinguisher {}", e))
}

fn parse_nlri(nlri: &str, afi: Afi) -> Result<VpnNlri> {
    let bytes = hex::decode(nlri).context("nlri is not hex")?;
    let (_, nlri) = VpnNlri::parse_nlri(&bytes, afi, false)
        .map_err(|e| anyhow!("malformed VPN NLRI: {}", BgpParseError::from(e)))?;
    Ok(nlri)
}

impl UpdateConfig {
    pub fn resolve(&self) -> Result<Update> {
        let nexthop = self.nexthop.unwrap_or(self.peer);
        let (rd, prefix) = match (&self.nlri, &self.rd, &self.prefix) {
            (Some(nlri), _, _) => {
                let nlri = parse_nlri(nlri, Afi::from(&nexthop))?;
                (nlri.rd, nlri.prefix)
            }
            (None, Some(rd), Some(prefix)) => (parse_rd(rd)?, prefix.trunc()),
            _ => bail!("update from {} needs nlri or rd and prefix", self.peer),
        };
        let attr = self
            .prefix_sid
            .as_deref()
            .map(hex::decode)
            .transpose()
            .context("prefix-sid is not hex")?;
        Ok(Update {
            peer: self.peer,
            nexthop,
            rd,
            prefix,
            attr,
        })
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text).context("invalid YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks references between sections before anything is applied.
    pub fn validate(&self) -> Result<()> {
        let srv6 = &self.segment_routing.srv6;
        let known = |name: &str| srv6.locators.iter().any(|loc| loc.name == name);
        for sid in srv6.sids.iter() {
            if !known(&sid.locator) {
                bail!("sid refers to unknown locator {}", sid.locator);
            }
        }
        for vrf in self.vrfs.iter() {
            parse_rd(&vrf.rd).with_context(|| format!("vrf {}", vrf.name))?;
            if let Some(srv6) = &vrf.srv6 {
                if !known(&srv6.locator) {
                    bail!("vrf {} refers to unknown locator {}", vrf.name, srv6.locator);
                }
                if !srv6.behavior.requires_context() {
                    bail!("vrf {}: {} cannot be bound to a VRF", vrf.name, srv6.behavior);
                }
            }
        }
        for update in self.updates.iter() {
            update.resolve()?;
        }
        Ok(())
    }

    pub async fn apply(&self, srv6vpn: &Srv6Vpn) -> Result<()> {
        let srv6 = &self.segment_routing.srv6;
        let specs: Vec<LocatorSpec> = srv6.locators.iter().map(LocatorConfig::spec).collect();
        srv6vpn
            .locators
            .register_all(&specs)
            .context("segment-routing srv6 locators")?;

        let mut allocated: Vec<LocalSid> = Vec::new();
        for sid in srv6.sids.iter() {
            match allocate(srv6vpn, &sid.locator, sid.behavior, sid.vrf, sid.owner) {
                Ok(local) => allocated.push(local),
                Err(err) => {
                    for local in allocated {
                        srv6vpn.sids.uninstall(local.address).await;
                    }
                    return Err(err.context("segment-routing srv6 sids"));
                }
            }
        }
        for local in allocated.iter() {
            if let Err(err) = srv6vpn.sids.install(local).await {
                warn!("SRv6 SID {} not installed: {}", local.prefix(), err);
            }
        }

        for vrf in self.vrfs.iter() {
            let Some(binding) = &vrf.srv6 else {
                continue;
            };
            let local = allocate(
                srv6vpn,
                &binding.locator,
                binding.behavior,
                Some(vrf.table),
                SidOwner::Bgp,
            )
            .with_context(|| format!("vrf {}", vrf.name))?;
            if let Err(err) = srv6vpn.sids.install(&local).await {
                warn!("vrf {} SID {} not installed: {}", vrf.name, local.prefix(), err);
            }
            if let Some(prefix_sid) = srv6vpn.vpn.advertise(local, Some(vrf.table)).await? {
                info!(
                    "vrf {} rd {} exports {} attribute {}",
                    vrf.name,
                    vrf.rd,
                    prefix_sid,
                    hex::encode(prefix_sid.attr_bytes())
                );
            }
        }

        for update in self.updates.iter() {
            let update = update.resolve()?;
            srv6vpn
                .vpn
                .update(
                    update.peer,
                    update.rd,
                    update.prefix,
                    update.nexthop,
                    update.attr,
                )
                .await?;
        }
        srv6vpn.vpn.settle().await?;
        Ok(())
    }
}

fn allocate(
    srv6vpn: &Srv6Vpn,
    locator: &str,
    behavior: Behavior,
    vrf: Option<VrfId>,
    owner: SidOwner,
) -> Result<LocalSid> {
    let id = srv6vpn
        .locators
        .lookup(locator)
        .map(|loc| loc.id)
        .ok_or_else(|| anyhow!("unknown locator {}", locator))?;
    let local = srv6vpn.sids.allocate(id, behavior, vrf, owner)?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fib::MemoryDataplane;
    use crate::show::ShowCommand;

    const CONFIG: &str = r#"
fib:
  queue-depth: 16
  max-attempts: 2
  initial-backoff-ms: 1
  max-backoff-ms: 2
segment-routing:
  srv6:
    encap-source: 2001:db8::1
    locators:
      - name: loc1
        prefix: 2001:db8:1:1::/64
      - name: loc2
        prefix: 2001:db8:2:2::/64
        block-len: 48
    sids:
      - locator: loc1
        behavior: End
vrfs:
  - name: blue
    table: 10
    rd: "65000:10"
    srv6:
      locator: loc2
updates:
  - peer: 192.0.2.4
    rd: "1:1"
    prefix: 4.4.4.4/32
    prefix-sid: "04001300010020010000000000010040000000000000"
"#;

    #[test]
    fn test_locator_defaults() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let specs: Vec<LocatorSpec> = config
            .segment_routing
            .srv6
            .locators
            .iter()
            .map(LocatorConfig::spec)
            .collect();
        assert_eq!((specs[0].block_len, specs[0].node_len), (40, 24));
        assert_eq!((specs[1].block_len, specs[1].node_len), (48, 16));
        assert_eq!(specs[1].function_len, DEFAULT_FUNCTION_LEN);
        assert_eq!(config.fib.max_attempts, 2);
    }

    #[test]
    fn test_invalid_references() {
        let bad = CONFIG.replace("locator: loc2", "locator: loc9");
        assert!(Config::from_yaml(&bad).is_err());

        let bad = CONFIG.replace("rd: \"1:1\"\n", "");
        assert!(Config::from_yaml(&bad).is_err());

        let bad = CONFIG.replace("queue-depth", "queue-size");
        assert!(Config::from_yaml(&bad).is_err());
    }

    #[test]
    fn test_update_from_nlri() {
        // Label 16001, RD 1:1, 4.4.4.4/32.
        let update = UpdateConfig {
            peer: "192.0.2.4".parse().unwrap(),
            nexthop: None,
            rd: None,
            prefix: None,
            nlri: Some("7803e811000000010000000104040404".to_string()),
            prefix_sid: None,
        };
        let update = update.resolve().unwrap();
        assert_eq!(update.rd.to_string(), "1:1");
        assert_eq!(update.prefix.to_string(), "4.4.4.4/32");
        assert_eq!(update.nexthop, update.peer);
    }

    #[tokio::test]
    async fn test_apply() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let dataplane = Arc::new(MemoryDataplane::new());
        let srv6 = Srv6Vpn::new(
            dataplane.clone(),
            config.fib.clone(),
            config.segment_routing.srv6.encap_source,
        );
        config.apply(&srv6).await.unwrap();

        let names: Vec<String> = srv6.locators.list().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["loc1", "loc2"]);

        let sids = srv6.sids.list();
        assert_eq!(sids.len(), 2);
        assert_eq!(sids[0].behavior, Behavior::End);
        assert_eq!(sids[1].context, Some(VrfId(10)));
        assert!(sids.iter().all(|sid| sid.installed));
        assert_eq!(dataplane.sid_count(), 2);

        let output = srv6.show(ShowCommand::Vpn, None, None, true).await.unwrap();
        assert!(output.contains("2001:0:0:1:40::"));
        assert_eq!(dataplane.route_count(), 1);

        srv6.shutdown().await;
    }

    #[tokio::test]
    async fn test_apply_rolls_back_locators() {
        let config = Config::from_yaml(
            r#"
segment-routing:
  srv6:
    locators:
      - name: loc1
        prefix: 2001:db8:1:1::/64
      - name: loc2
        prefix: 2001:db8:1::/48
"#,
        )
        .unwrap();
        let srv6 = Srv6Vpn::new(
            Arc::new(MemoryDataplane::new()),
            FibConfig::for_test(),
            None,
        );
        assert!(config.apply(&srv6).await.is_err());
        assert!(srv6.locators.list().is_empty());
    }
}
