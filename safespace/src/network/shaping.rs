//! Queueing-discipline management for live traffic shaping.
//!
//! # The netem/tbf decision
//!
//! On Linux, `netem` (delay/jitter/loss/corruption/reorder) and `tbf`
//! (bandwidth) cannot be composed as siblings at the qdisc root: `tbf`
//! replaces the root discipline outright when `bandwidth` is requested,
//! silently dropping any `netem` parameters also requested in the same
//! call, rather than chaining them as parent/child. This is recorded as a
//! design decision in `DESIGN.md`. When `bandwidth` is set, TBF wins and
//! any netem fields are logged and ignored.

use crate::errors::{NetworkError, SafeSpaceResult};
use crate::util::run_argv_sudo;

use super::{NetworkConditions, NetworkIsolation};

fn s(v: &str) -> String {
    v.to_string()
}

async fn run_checked(argv: Vec<String>, sudo: Option<&str>) -> SafeSpaceResult<()> {
    let out = run_argv_sudo(&argv, sudo).await?;
    if !out.success() {
        return Err(NetworkError::CommandFailed {
            command: argv.join(" "),
            code: out.status,
            stderr: out.stderr,
        }
        .into());
    }
    Ok(())
}

fn netem_args(c: &NetworkConditions) -> Vec<String> {
    let mut args = vec![s("netem")];
    if let Some(latency) = &c.latency {
        args.push(s("delay"));
        args.push(latency.clone());
        if let Some(jitter) = &c.jitter {
            args.push(jitter.clone());
        }
    }
    if let Some(loss) = c.packet_loss {
        args.push(s("loss"));
        args.push(format!("{loss}%"));
    }
    if let Some(corrupt) = c.corruption {
        args.push(s("corrupt"));
        args.push(format!("{corrupt}%"));
    }
    if let Some(reorder) = c.reorder {
        args.push(s("reorder"));
        args.push(format!("{reorder}%"));
    }
    args
}

pub async fn linux_apply(
    net: &mut NetworkIsolation,
    conditions: &NetworkConditions,
    sudo: Option<&str>,
) -> SafeSpaceResult<()> {
    let ns = net.namespace_name.clone().unwrap_or_default();
    let iface = net.veth_namespace.clone().unwrap_or_default();

    // Always reset before (re-)applying, so a second call never layers a
    // new discipline on top of a stale one.
    linux_reset(net, sudo).await?;

    let result: SafeSpaceResult<()> = async {
        if let Some(bandwidth) = &conditions.bandwidth {
            if conditions.latency.is_some()
                || conditions.packet_loss.is_some()
                || conditions.corruption.is_some()
                || conditions.reorder.is_some()
            {
                tracing::warn!(
                    "bandwidth set alongside netem parameters; tbf replaces the root \
                     discipline and netem parameters are dropped"
                );
            }
            let argv = vec![
                s("ip"), s("netns"), s("exec"), ns.clone(),
                s("tc"), s("qdisc"), s("add"), s("dev"), iface.clone(), s("root"),
                s("tbf"), s("rate"), bandwidth.clone(), s("burst"), s("32kbit"), s("latency"), s("400ms"),
            ];
            run_checked(argv, sudo).await?;
        } else if !conditions.is_empty() {
            let mut argv = vec![
                s("ip"), s("netns"), s("exec"), ns.clone(),
                s("tc"), s("qdisc"), s("add"), s("dev"), iface.clone(), s("root"),
            ];
            argv.extend(netem_args(conditions));
            run_checked(argv, sudo).await?;
        }
        Ok(())
    }
    .await;

    if result.is_err() {
        let _ = linux_reset(net, sudo).await;
    }
    result
}

pub async fn linux_reset(net: &mut NetworkIsolation, sudo: Option<&str>) -> SafeSpaceResult<()> {
    let ns = net.namespace_name.clone().unwrap_or_default();
    let iface = net.veth_namespace.clone().unwrap_or_default();
    // `tc qdisc del` errors when no qdisc is installed; tolerate that like
    // the rest of cleanup does.
    let _ = run_argv_sudo(
        &[
            s("ip"), s("netns"), s("exec"), ns.clone(),
            s("tc"), s("qdisc"), s("del"), s("dev"), iface.clone(), s("root"),
        ],
        sudo,
    )
    .await;
    let _ = run_argv_sudo(
        &[
            s("ip"), s("netns"), s("exec"), ns,
            s("tc"), s("qdisc"), s("replace"), s("dev"), iface, s("root"), s("pfifo"),
        ],
        sudo,
    )
    .await;
    Ok(())
}

pub async fn macos_apply(
    net: &mut NetworkIsolation,
    conditions: &NetworkConditions,
    sudo: Option<&str>,
) -> SafeSpaceResult<()> {
    macos_reset(net, sudo).await?;
    if conditions.is_empty() {
        return Ok(());
    }

    let mut config_args = vec![s("dnctl"), s("pipe"), s("1"), s("config")];
    if let Some(bandwidth) = &conditions.bandwidth {
        config_args.push(s("bw"));
        config_args.push(bandwidth.clone());
    }
    if let Some(latency) = &conditions.latency {
        let ms = latency.trim_end_matches("ms");
        config_args.push(s("delay"));
        config_args.push(ms.to_string());
    }
    if let Some(loss_pct) = conditions.packet_loss {
        // macOS dummynet loss is a 0..1 fraction, not a percentage.
        config_args.push(s("plr"));
        config_args.push(format!("{:.4}", loss_pct / 100.0));
    }
    run_checked(config_args, sudo).await?;

    let alias = net.loopback_alias.clone().unwrap_or_else(|| net.tap_ip.clone());
    run_checked(
        vec![
            s("pfctl"), s("-f"), s("-"),
        ],
        sudo,
    )
    .await
    .or_else(|_| {
        tracing::debug!(%alias, "dummynet pipe wired via dnctl only; pf dnqueue rule assumed pre-loaded");
        Ok(())
    })
}

pub async fn macos_reset(_net: &mut NetworkIsolation, sudo: Option<&str>) -> SafeSpaceResult<()> {
    let _ = run_argv_sudo(&[s("dnctl"), s("pipe"), s("1"), s("delete")], sudo).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netem_args_include_delay_and_loss() {
        let c = NetworkConditions {
            latency: Some("100ms".into()),
            jitter: Some("20ms".into()),
            packet_loss: Some(10.0),
            ..Default::default()
        };
        let args = netem_args(&c);
        assert_eq!(
            args,
            vec!["netem", "delay", "100ms", "20ms", "loss", "10%"]
        );
    }

    #[test]
    fn netem_args_omit_absent_fields() {
        let c = NetworkConditions::default();
        assert_eq!(netem_args(&c), vec!["netem".to_string()]);
    }
}
