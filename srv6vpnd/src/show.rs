use std::collections::BTreeMap;
use std::fmt::Write;

use clap::ValueEnum;
use ipnet::IpNet;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::srv6::{LocalSid, LocatorTable};
use crate::vpn::{VpnRoute, VpnRouteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShowCommand {
    Locators,
    /// One locator in detail, named by `--locator`.
    Locator,
    LocalSids,
    Vpn,
    Ipv4Rib,
    Ipv6Rib,
}

#[derive(Serialize)]
struct LocatorJson {
    name: String,
    prefix: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocatorDetailJson {
    name: String,
    prefix: String,
    block_bits_length: u8,
    node_bits_length: u8,
    function_bits_length: u8,
    argument_bits_length: u8,
    functions_in_use: usize,
}

#[derive(Serialize)]
struct LocalSidJson {
    name: String,
    context: String,
    prefix: String,
    owner: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VpnPathJson {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_sid: Option<String>,
}

#[derive(Serialize)]
struct VpnPrefixJson {
    prefix: String,
    paths: Vec<VpnPathJson>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

pub fn show_locators(locators: &LocatorTable, json: bool) -> String {
    let list = locators.list();
    if json {
        let locators: Vec<LocatorJson> = list
            .iter()
            .map(|loc| LocatorJson {
                name: loc.name.clone(),
                prefix: loc.prefix.to_string(),
            })
            .collect();
        return to_json(&json!({ "locators": locators }));
    }

    let mut buf = String::new();
    writeln!(buf, "Locator:").unwrap();
    writeln!(
        buf,
        "Name                 ID      Prefix                   Status"
    )
    .unwrap();
    writeln!(
        buf,
        "-------------------- ------- ------------------------ -------"
    )
    .unwrap();
    for loc in list.iter() {
        writeln!(
            buf,
            "{:<20} {:>7} {:<24} Up",
            loc.name,
            loc.id.to_string(),
            loc.prefix.to_string()
        )
        .unwrap();
    }
    buf
}

pub fn show_locator_detail(locators: &LocatorTable, name: &str, json: bool) -> String {
    let Some(loc) = locators.lookup(name) else {
        return format!("% No such locator: {}\n", name);
    };
    let in_use = locators.usage(loc.id).map(|(n, _)| n).unwrap_or(0);

    if json {
        return to_json(&LocatorDetailJson {
            name: loc.name.clone(),
            prefix: loc.prefix.to_string(),
            block_bits_length: loc.block_len,
            node_bits_length: loc.node_len,
            function_bits_length: loc.function_len,
            argument_bits_length: loc.argument_len(),
            functions_in_use: in_use,
        });
    }

    let mut buf = String::new();
    writeln!(buf, "Name: {}", loc.name).unwrap();
    writeln!(buf, "Prefix: {}", loc.prefix).unwrap();
    writeln!(buf, "Block-Bit-Len: {}", loc.block_len).unwrap();
    writeln!(buf, "Node-Bit-Len: {}", loc.node_len).unwrap();
    writeln!(buf, "Function-Bit-Len: {}", loc.function_len).unwrap();
    writeln!(buf, "Argument-Bit-Len: {}", loc.argument_len()).unwrap();
    writeln!(buf, "Functions in use: {}", in_use).unwrap();
    buf
}

pub fn show_local_sids(sids: &[LocalSid], json: bool) -> String {
    if json {
        let sids: Vec<LocalSidJson> = sids
            .iter()
            .map(|sid| LocalSidJson {
                name: sid.behavior.to_string(),
                context: sid.context_label(),
                prefix: sid.prefix().to_string(),
                owner: sid.owner.to_string(),
            })
            .collect();
        return to_json(&json!({ "localSids": sids }));
    }

    let mut buf = String::new();
    writeln!(buf, "Local SIDs:").unwrap();
    writeln!(
        buf,
        " Name       Context              Prefix                   Owner"
    )
    .unwrap();
    writeln!(
        buf,
        "---------- -------------------- ------------------------ ------------"
    )
    .unwrap();
    for sid in sids.iter() {
        writeln!(
            buf,
            " {:<10} {:<20} {:<24} {:<12}",
            sid.behavior.to_string(),
            sid.context_label(),
            sid.prefix().to_string(),
            sid.owner.to_string()
        )
        .unwrap();
    }
    buf
}

fn vpn_prefix_json(prefix: &IpNet, paths: &[VpnRoute]) -> VpnPrefixJson {
    VpnPrefixJson {
        prefix: prefix.to_string(),
        paths: paths
            .iter()
            .map(|path| VpnPathJson {
                valid: path.valid,
                remote_sid: path.remote_sid().map(|sid| sid.to_string()),
            })
            .collect(),
    }
}

/// VPN table. With `prefix`, one object per RD carrying that prefix.
pub fn show_vpn(store: &VpnRouteStore, prefix: Option<IpNet>, json: bool) -> String {
    if let Some(prefix) = prefix {
        let mut map = Map::new();
        for ((rd, p), paths) in store.iter().filter(|((_, p), _)| *p == prefix) {
            let value = serde_json::to_value(vpn_prefix_json(p, paths)).unwrap_or(Value::Null);
            map.insert(rd.to_string(), value);
        }
        if json {
            return to_json(&map);
        }
        let mut buf = String::new();
        for ((rd, p), paths) in store.iter().filter(|((_, p), _)| *p == prefix) {
            vpn_text(&mut buf, &rd.to_string(), p, paths);
        }
        return buf;
    }

    if json {
        let mut rds: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for ((rd, p), paths) in store.iter() {
            let value = serde_json::to_value(vpn_prefix_json(p, paths)).unwrap_or(Value::Null);
            rds.entry(rd.to_string())
                .or_default()
                .insert(p.to_string(), value);
        }
        return to_json(&json!({ "routeDistinguishers": rds }));
    }

    let mut buf = String::new();
    for ((rd, p), paths) in store.iter() {
        vpn_text(&mut buf, &rd.to_string(), p, paths);
    }
    buf
}

fn vpn_text(buf: &mut String, rd: &str, prefix: &IpNet, paths: &[VpnRoute]) {
    writeln!(buf, "Route Distinguisher: {}", rd).unwrap();
    writeln!(buf, "  {}", prefix).unwrap();
    for path in paths.iter() {
        let status = match (path.valid, path.selected) {
            (false, _) => "invalid",
            (true, true) => "*>",
            (true, false) => "*",
        };
        write!(buf, "    {:<8} from {} nexthop {}", status, path.peer, path.nexthop).unwrap();
        if let Some(sid) = path.remote_sid() {
            write!(buf, " sid {}", sid).unwrap();
        }
        if path.degraded {
            write!(buf, " (not installed)").unwrap();
        }
        writeln!(buf).unwrap();
    }
}

#[derive(Serialize)]
struct RibEntryJson {
    prefix: String,
    protocol: String,
    selected: bool,
    nexthops: Vec<Value>,
}

fn vpn_rib_entry(path: &VpnRoute) -> RibEntryJson {
    let mut nexthop = json!({
        "fib": path.installed,
        "active": path.valid,
        "ip": path.nexthop.to_string(),
        "afi": if path.nexthop.is_ipv4() { "ipv4" } else { "ipv6" },
        "rd": path.rd.to_string(),
    });
    if let Some(sid) = path.remote_sid() {
        nexthop["seg6"] = json!({ "segs": sid.to_string() });
    }
    RibEntryJson {
        prefix: path.prefix.to_string(),
        protocol: "bgp".to_string(),
        selected: path.selected,
        nexthops: vec![nexthop],
    }
}

fn sid_rib_entry(sid: &LocalSid) -> RibEntryJson {
    let mut seg6local = json!({ "action": sid.behavior.to_string() });
    if let Some(vrf) = sid.context {
        seg6local["table"] = json!(vrf.0);
    }
    RibEntryJson {
        prefix: format!("{}/128", sid.address),
        protocol: sid.owner.to_string(),
        selected: true,
        nexthops: vec![json!({
            "fib": sid.installed,
            "active": !sid.degraded,
            "directlyConnected": true,
            "seg6local": seg6local,
        })],
    }
}

/// Routing table view. `ipv6` adds local SIDs as /128 entries.
pub fn show_rib(store: &VpnRouteStore, sids: &[LocalSid], ipv6: bool, json: bool) -> String {
    let mut table: BTreeMap<String, Vec<RibEntryJson>> = BTreeMap::new();
    for (_, paths) in store.iter() {
        for path in paths.iter().filter(|p| matches!(p.prefix, IpNet::V6(_)) == ipv6) {
            table
                .entry(path.prefix.to_string())
                .or_default()
                .push(vpn_rib_entry(path));
        }
    }
    if ipv6 {
        for sid in sids.iter() {
            let entry = sid_rib_entry(sid);
            table.entry(entry.prefix.clone()).or_default().push(entry);
        }
    }

    if json {
        return to_json(&table);
    }

    let mut buf = String::new();
    writeln!(
        buf,
        "Codes: B - BGP, S - static, > - selected, * - FIB route"
    )
    .unwrap();
    writeln!(buf).unwrap();
    for entries in table.values() {
        for entry in entries.iter() {
            let code = if entry.protocol == "bgp" { "B" } else { "S" };
            let selected = if entry.selected { ">" } else { " " };
            let fib = entry
                .nexthops
                .first()
                .and_then(|nh| nh["fib"].as_bool())
                .unwrap_or(false);
            let fib = if fib { "*" } else { " " };
            write!(buf, "{}{}{} {}", code, selected, fib, entry.prefix).unwrap();
            for nh in entry.nexthops.iter() {
                if let Some(ip) = nh["ip"].as_str() {
                    write!(buf, " via {}", ip).unwrap();
                }
                if let Some(segs) = nh["seg6"]["segs"].as_str() {
                    write!(buf, ", seg6 {}", segs).unwrap();
                }
                if let Some(action) = nh["seg6local"]["action"].as_str() {
                    write!(buf, " seg6local {}", action).unwrap();
                }
            }
            writeln!(buf).unwrap();
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use bgp_packet::PrefixSid;

    use super::*;
    use crate::srv6::{Behavior, Locator, LocatorId, SidOwner, VrfId};

    fn store() -> VpnRouteStore {
        let mut store = VpnRouteStore::new();
        let peer: IpAddr = "192.0.2.4".parse().unwrap();
        let mut route = VpnRoute::new(
            "1:1".parse().unwrap(),
            "4.4.4.4/32".parse().unwrap(),
            peer,
            peer,
            Some(PrefixSid::Type4L3Vpn {
                sid: "2001:0:0:1:40::".parse().unwrap(),
            }),
        );
        route.selected = true;
        route.installed = true;
        store.upsert(route);
        store
    }

    fn local_sid(behavior: Behavior, context: Option<VrfId>, function: u64) -> LocalSid {
        let locator = Locator {
            id: LocatorId(0),
            name: "loc1".to_string(),
            prefix: "2001:db8:1:1::/64".parse().unwrap(),
            block_len: 40,
            node_len: 24,
            function_len: 16,
        };
        LocalSid {
            address: locator.sid_address(function),
            behavior,
            context,
            owner: SidOwner::Static,
            installed: true,
            degraded: false,
            locator: locator.id,
            function,
            prefix_len: locator.sid_len(),
        }
    }

    #[test]
    fn test_show_vpn_prefix_json() {
        let output = show_vpn(&store(), "4.4.4.4/32".parse().ok(), true);
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            value,
            json!({"1:1":{"prefix":"4.4.4.4/32","paths":[{"valid":true,"remoteSid":"2001:0:0:1:40::"}]}})
        );
    }

    #[test]
    fn test_show_vpn_all_json() {
        let output = show_vpn(&store(), None, true);
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            value["routeDistinguishers"]["1:1"]["4.4.4.4/32"]["paths"][0]["valid"],
            json!(true)
        );
    }

    #[test]
    fn test_show_local_sids() {
        let sids = vec![
            local_sid(Behavior::End, None, 1),
            local_sid(Behavior::EndDT4, Some(VrfId(10)), 2),
        ];
        let value: Value = serde_json::from_str(&show_local_sids(&sids, true)).unwrap();
        assert_eq!(
            value,
            json!({"localSids":[
                {"name":"End","context":"USP","prefix":"2001:db8:1:1:1::/80","owner":"static"},
                {"name":"End.DT4","context":"table 10","prefix":"2001:db8:1:1:2::/80","owner":"static"}
            ]})
        );

        let text = show_local_sids(&sids, false);
        assert!(text.contains(" End        USP                  2001:db8:1:1:1::/80      static"));
    }

    #[test]
    fn test_show_locators() {
        let locators = LocatorTable::new();
        locators
            .register("loc1", "2001:db8:1:1::/64".parse().unwrap(), 40, 24, 16)
            .unwrap();
        locators
            .register("loc2", "2001:db8:2:2::/64".parse().unwrap(), 40, 24, 16)
            .unwrap();
        let value: Value = serde_json::from_str(&show_locators(&locators, true)).unwrap();
        assert_eq!(
            value,
            json!({"locators":[
                {"name":"loc1","prefix":"2001:db8:1:1::/64"},
                {"name":"loc2","prefix":"2001:db8:2:2::/64"}
            ]})
        );
        let text = show_locators(&locators, false);
        assert!(text.contains("loc2                       1 2001:db8:2:2::/64        Up"));

        let detail = show_locator_detail(&locators, "loc1", false);
        assert!(detail.contains("Function-Bit-Len: 16"));
    }

    #[test]
    fn test_show_locators_id_after_unregister() {
        let locators = LocatorTable::new();
        for (name, prefix) in [
            ("loc1", "2001:db8:1:1::/64"),
            ("loc2", "2001:db8:2:2::/64"),
            ("loc3", "2001:db8:3:3::/64"),
        ] {
            locators
                .register(name, prefix.parse().unwrap(), 40, 24, 16)
                .unwrap();
        }
        locators.unregister("loc2").unwrap();
        let loc3 = locators.lookup("loc3").unwrap();

        let text = show_locators(&locators, false);
        assert!(text.contains(&format!(
            "loc3                 {:>7} 2001:db8:3:3::/64        Up",
            loc3.id.to_string()
        )));
        assert!(text.contains("loc3                       2 "));
    }

    #[test]
    fn test_show_locator_detail() {
        let locators = LocatorTable::new();
        let id = locators
            .register("loc1", "2001:db8:1:1::/64".parse().unwrap(), 40, 24, 16)
            .unwrap();
        locators.reserve_function(id).unwrap();
        locators.reserve_function(id).unwrap();

        let value: Value =
            serde_json::from_str(&show_locator_detail(&locators, "loc1", true)).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "loc1",
                "prefix": "2001:db8:1:1::/64",
                "blockBitsLength": 40,
                "nodeBitsLength": 24,
                "functionBitsLength": 16,
                "argumentBitsLength": 48,
                "functionsInUse": 2
            })
        );
        assert_eq!(
            show_locator_detail(&locators, "loc9", false),
            "% No such locator: loc9\n"
        );
    }

    #[test]
    fn test_show_rib() {
        let sids = vec![local_sid(Behavior::EndDT6, Some(VrfId(20)), 3)];
        let v4: Value = serde_json::from_str(&show_rib(&store(), &sids, false, true)).unwrap();
        let entry = &v4["4.4.4.4/32"][0];
        assert_eq!(entry["protocol"], json!("bgp"));
        assert_eq!(entry["selected"], json!(true));
        assert_eq!(entry["nexthops"][0]["fib"], json!(true));
        assert_eq!(entry["nexthops"][0]["seg6"]["segs"], json!("2001:0:0:1:40::"));

        let v6: Value = serde_json::from_str(&show_rib(&store(), &sids, true, true)).unwrap();
        let entry = &v6["2001:db8:1:1:3::/128"][0];
        assert_eq!(entry["protocol"], json!("static"));
        assert_eq!(entry["nexthops"][0]["seg6local"]["action"], json!("End.DT6"));
        assert!(v6.get("4.4.4.4/32").is_none());
    }
}
