//! macOS "soft namespace": a loopback alias plus a packet-filter ruleset.
//!
//! This provides no kernel enforcement — children run with
//! `SAFESPACE_IP`/`SAFESPACE_NETWORK`/`HOSTALIASES` set, which only
//! cooperating processes honor. Callers needing strict isolation must use
//! Linux.

use std::path::PathBuf;

use crate::errors::{NetworkError, SafeSpaceResult};
use crate::util::{run_argv_sudo, CommandOutput};

use super::NetworkIsolation;

fn s(v: &str) -> String {
    v.to_string()
}

async fn run(argv: Vec<String>, sudo: Option<&str>) -> SafeSpaceResult<CommandOutput> {
    let out = run_argv_sudo(&argv, sudo).await?;
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

fn pf_ruleset(alias: &str, subnet: &str) -> String {
    format!(
        "block drop out quick on lo0 from {alias} to any\n\
         pass out quick on lo0 from {alias} to {subnet}\n\
         pass in quick on lo0 from {subnet} to {alias}\n"
    )
}

pub async fn setup(net: &mut NetworkIsolation, sudo: Option<&str>) -> SafeSpaceResult<()> {
    let alias = net.tap_ip.clone();
    let pf_path = net
        .pf_conf_path
        .clone()
        .unwrap_or_else(|| "/tmp/safespace_pf.conf".to_string());

    let result: SafeSpaceResult<()> = async {
        run(
            vec![s("ifconfig"), s("lo0"), s("alias"), alias.clone()],
            sudo,
        )
        .await?;

        std::fs::write(&pf_path, pf_ruleset(&alias, &net.subnet))
            .map_err(|e| NetworkError::CommandFailed {
                command: format!("write {pf_path}"),
                code: -1,
                stderr: e.to_string(),
            })?;

        run(vec![s("pfctl"), s("-f"), pf_path.clone()], sudo).await?;
        run(vec![s("pfctl"), s("-e")], sudo).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            net.loopback_alias = Some(alias);
            net.pf_conf_path = Some(pf_path);
            Ok(())
        }
        Err(e) => {
            let _ = cleanup(net, sudo).await;
            Err(e)
        }
    }
}

pub async fn cleanup(net: &mut NetworkIsolation, sudo: Option<&str>) -> SafeSpaceResult<()> {
    if let Some(alias) = net.loopback_alias.clone() {
        let _ = run_argv_sudo(&[s("ifconfig"), s("lo0"), s("-alias"), alias], sudo).await;
    }
    if let Some(pf_path) = net.pf_conf_path.clone() {
        let _ = std::fs::remove_file(PathBuf::from(&pf_path));
    }
    let _ = run_argv_sudo(&[s("pfctl"), s("-d")], sudo).await;
    net.loopback_alias = None;
    Ok(())
}

/// Run `argv` with the soft-namespace environment attached: `SAFESPACE_IP`,
/// `SAFESPACE_NETWORK`, and a `HOSTALIASES` file remapping `localhost` to
/// the alias.
pub async fn run_command(net: &NetworkIsolation, argv: &[String]) -> SafeSpaceResult<CommandOutput> {
    let alias = net.loopback_alias.clone().unwrap_or_else(|| net.tap_ip.clone());
    let hostaliases_path = std::env::temp_dir().join(format!("safespace_hosts_{alias}"));
    let _ = std::fs::write(&hostaliases_path, format!("localhost {alias}\n"));

    let (program, args) = argv
        .split_first()
        .ok_or_else(|| NetworkError::InvalidParameter {
            name: "argv",
            value: "empty".to_string(),
        })?;

    let output = tokio::process::Command::new(program)
        .args(args)
        .env("SAFESPACE_IP", &alias)
        .env("SAFESPACE_NETWORK", &net.subnet)
        .env("HOSTALIASES", &hostaliases_path)
        .output()
        .await
        .map_err(|e| NetworkError::CommandFailed {
            command: argv.join(" "),
            code: -1,
            stderr: e.to_string(),
        })?;

    Ok(CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pf_ruleset_blocks_all_then_allows_subnet() {
        let rules = pf_ruleset("192.168.100.3", "192.168.100.0/24");
        assert!(rules.contains("block drop out quick on lo0 from 192.168.100.3"));
        assert!(rules.contains("pass out quick on lo0 from 192.168.100.3 to 192.168.100.0/24"));
    }
}
