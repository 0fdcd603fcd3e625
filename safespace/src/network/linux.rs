//! Linux network-namespace topology: a dedicated netns joined to the host
//! by a veth pair and NAT.

use crate::errors::{NetworkError, SafeSpaceResult};
use crate::util::{run_argv_sudo, CommandOutput};

use super::NetworkIsolation;

fn s(v: &str) -> String {
    v.to_string()
}

async fn run(argv: Vec<String>, sudo_password: Option<&str>) -> SafeSpaceResult<CommandOutput> {
    let out = run_argv_sudo(&argv, sudo_password).await?;
    if !out.success() {
        return Err(NetworkError::CommandFailed {
            command: argv.join(" "),
            code: out.status,
            stderr: out.stderr,
        }
        .into());
    }
    Ok(out)
}

/// Best-effort run: ignore "not found"/"does not exist" stderr, since
/// cleanup must tolerate partially-torn-down state.
async fn run_ignore_missing(argv: Vec<String>, sudo_password: Option<&str>) {
    if let Ok(out) = run_argv_sudo(&argv, sudo_password).await {
        if !out.success() {
            tracing::debug!(cmd = %argv.join(" "), stderr = %out.stderr, "cleanup step failed, ignoring");
        }
    }
}

pub async fn setup(net: &mut NetworkIsolation, sudo: Option<&str>) -> SafeSpaceResult<()> {
    let ns = net.namespace_name.clone().unwrap_or_default();
    let veth_host = net.veth_host.clone().unwrap_or_default();
    let veth_ns = net.veth_namespace.clone().unwrap_or_default();

    // 1. Create the namespace.
    let result: SafeSpaceResult<()> = async {
        run(vec![s("ip"), s("netns"), s("add"), ns.clone()], sudo).await?;

        // 2. Create veth pair, move peer into the namespace.
        run(
            vec![
                s("ip"), s("link"), s("add"), veth_host.clone(),
                s("type"), s("veth"), s("peer"), s("name"), veth_ns.clone(),
            ],
            sudo,
        )
        .await?;
        run(
            vec![s("ip"), s("link"), s("set"), veth_ns.clone(), s("netns"), ns.clone()],
            sudo,
        )
        .await?;

        // 3. Assign addresses, bring interfaces up.
        run(
            vec![
                s("ip"), s("addr"), s("add"), format!("{}/24", net.host_ip), s("dev"), veth_host.clone(),
            ],
            sudo,
        )
        .await?;
        run(vec![s("ip"), s("link"), s("set"), veth_host.clone(), s("up")], sudo).await?;
        run(
            vec![
                s("ip"), s("netns"), s("exec"), ns.clone(),
                s("ip"), s("addr"), s("add"), format!("{}/24", net.namespace_ip), s("dev"), veth_ns.clone(),
            ],
            sudo,
        )
        .await?;
        run(
            vec![s("ip"), s("netns"), s("exec"), ns.clone(), s("ip"), s("link"), s("set"), veth_ns.clone(), s("up")],
            sudo,
        )
        .await?;
        run(
            vec![s("ip"), s("netns"), s("exec"), ns.clone(), s("ip"), s("link"), s("set"), s("lo"), s("up")],
            sudo,
        )
        .await?;

        // 4. NAT masquerade.
        run(
            vec![
                s("iptables"), s("-t"), s("nat"), s("-A"), s("POSTROUTING"),
                s("-s"), net.subnet.clone(), s("-j"), s("MASQUERADE"),
            ],
            sudo,
        )
        .await?;

        // 5. Default route + forwarding.
        run(
            vec![
                s("ip"), s("netns"), s("exec"), ns.clone(),
                s("ip"), s("route"), s("add"), s("default"), s("via"), net.host_ip.clone(),
            ],
            sudo,
        )
        .await?;
        run(
            vec![s("sysctl"), s("-w"), s("net.ipv4.ip_forward=1")],
            sudo,
        )
        .await?;

        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            net.nat_rule_present = true;
            Ok(())
        }
        Err(e) => {
            // Best-effort undo before surfacing the error.
            net.nat_rule_present = false;
            let _ = cleanup(net, sudo).await;
            Err(e)
        }
    }
}

pub async fn cleanup(net: &mut NetworkIsolation, sudo: Option<&str>) -> SafeSpaceResult<()> {
    let ns = net.namespace_name.clone().unwrap_or_default();
    let veth_host = net.veth_host.clone().unwrap_or_default();

    if net.nat_rule_present {
        run_ignore_missing(
            vec![
                s("iptables"), s("-t"), s("nat"), s("-D"), s("POSTROUTING"),
                s("-s"), net.subnet.clone(), s("-j"), s("MASQUERADE"),
            ],
            sudo,
        )
        .await;
    }
    run_ignore_missing(vec![s("ip"), s("link"), s("del"), veth_host], sudo).await;
    run_ignore_missing(vec![s("ip"), s("netns"), s("del"), ns], sudo).await;
    Ok(())
}

pub async fn run_command(net: &NetworkIsolation, argv: &[String]) -> SafeSpaceResult<CommandOutput> {
    let ns = net.namespace_name.clone().unwrap_or_default();
    let mut full = vec![s("ip"), s("netns"), s("exec"), ns];
    full.extend(argv.iter().cloned());
    run_argv_sudo(&full, None).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_none_uses_plain_exec() {
        // run_command builds an `ip netns exec <ns> <argv...>` vector;
        // verify the shape without touching the host.
        let net = NetworkIsolation::new("192.168.100.0/24", "safespace_net", "veth0", "veth1").unwrap();
        assert_eq!(net.namespace_name.as_deref(), Some("safespace_net"));
    }
}
