//! Emulator command-line assembly and launcher script generation.
//!
//! Argv is built the same way every other external command in this crate
//! is built: a `Vec<String>`, never a shell string. The launcher scripts
//! are a convenience for operators inspecting `<root>/vm/` by hand;
//! SafeSpace itself always spawns via [`super::VmManager::start`], not by
//! invoking the scripts.

use std::path::Path;

use rand::Rng;

use crate::errors::SafeSpaceResult;
use crate::settings::VmDefaults;

/// Generate a locally-administered, unicast MAC address (bit 1 of the first
/// octet set, bit 0 clear).
pub fn generate_mac() -> String {
    let mut rng = rand::thread_rng();
    let mut octets = [0u8; 6];
    rng.fill(&mut octets);
    octets[0] = (octets[0] & 0xfc) | 0x02;
    octets
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Assemble the emulator argv: memory, cpus, virtio disk, ISO cdrom boot,
/// virtio NIC with the given MAC, headless/monitor-socket flags.
pub fn build_argv(
    config: &VmDefaults,
    disk_path: &Path,
    iso_path: Option<&Path>,
    mac: &str,
    monitor_sock: &Path,
    tap_device: Option<&str>,
) -> Vec<String> {
    let mut argv = vec!["qemu-system-x86_64".to_string()];

    argv.push("-m".to_string());
    argv.push(config.memory.clone());
    argv.push("-smp".to_string());
    argv.push(config.cpus.to_string());

    if config.acceleration && cfg!(target_os = "linux") {
        argv.push("-enable-kvm".to_string());
    }

    argv.push("-drive".to_string());
    argv.push(format!("file={},if=virtio,format=qcow2", disk_path.display()));

    if let Some(iso) = iso_path {
        argv.push("-cdrom".to_string());
        argv.push(iso.display().to_string());
    }

    let netdev = match tap_device {
        Some(tap) => format!("tap,id=net0,ifname={tap},script=no,downscript=no"),
        None => "user,id=net0".to_string(),
    };
    argv.push("-netdev".to_string());
    argv.push(netdev);
    argv.push("-device".to_string());
    argv.push(format!("virtio-net-pci,netdev=net0,mac={mac}"));

    if config.headless {
        argv.push("-nographic".to_string());
        argv.push("-display".to_string());
        argv.push("none".to_string());
    }

    argv.push("-monitor".to_string());
    argv.push(format!("unix:{},server,nowait", monitor_sock.display()));
    argv.push("-daemonize".to_string());

    argv
}

/// Write `start_vm.sh` (execs the assembled argv) and `vm_functions.sh` (a
/// small library of `vm_is_running`/`vm_stop` bash helpers), leaving an
/// operator-inspectable script beside the programmatic path.
pub fn write_launcher_scripts(vm_dir: &Path, argv: &[String], pid_file: &Path) -> SafeSpaceResult<()> {
    let start_path = vm_dir.join(crate::constants::vm_files::START_SCRIPT);
    let functions_path = vm_dir.join(crate::constants::vm_files::FUNCTIONS_SCRIPT);

    let quoted: Vec<String> = argv.iter().map(|a| shell_quote(a)).collect();
    let start_script = format!(
        "#!/bin/sh\nset -eu\nexec {}\n",
        quoted.join(" ")
    );
    write_executable(&start_path, &start_script)?;

    let functions_script = format!(
        "#!/bin/sh\n\
         vm_pid_file=\"{}\"\n\n\
         vm_is_running() {{\n  [ -f \"$vm_pid_file\" ] && kill -0 \"$(cat \"$vm_pid_file\")\" 2>/dev/null\n}}\n\n\
         vm_stop() {{\n  if vm_is_running; then\n    kill \"$(cat \"$vm_pid_file\")\"\n  fi\n}}\n",
        pid_file.display()
    );
    write_executable(&functions_path, &functions_script)?;

    Ok(())
}

fn shell_quote(arg: &str) -> String {
    if arg.chars().all(|c| c.is_alphanumeric() || "-_./:,=".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

fn write_executable(path: &Path, contents: &str) -> SafeSpaceResult<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o700);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_mac_is_locally_administered_unicast() {
        let mac = generate_mac();
        let first_octet = u8::from_str_radix(&mac[0..2], 16).unwrap();
        assert_eq!(first_octet & 0x01, 0); // unicast
        assert_eq!(first_octet & 0x02, 0x02); // locally administered
    }

    #[test]
    fn build_argv_includes_disk_and_mac() {
        let config = VmDefaults {
            memory: "2G".to_string(),
            cpus: 2,
            disk_size: "20G".to_string(),
            headless: true,
            acceleration: false,
        };
        let argv = build_argv(
            &config,
            Path::new("/tmp/disk.qcow2"),
            Some(Path::new("/tmp/base.iso")),
            "02:00:00:00:00:01",
            Path::new("/tmp/monitor.sock"),
            None,
        );
        assert!(argv.iter().any(|a| a.contains("disk.qcow2")));
        assert!(argv.iter().any(|a| a.contains("02:00:00:00:00:01")));
        assert!(argv.iter().any(|a| a.contains("base.iso")));
    }

    #[test]
    fn write_launcher_scripts_are_executable() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec!["qemu-system-x86_64".to_string(), "-m".to_string(), "2G".to_string()];
        write_launcher_scripts(dir.path(), &argv, &dir.path().join("vm.pid")).unwrap();
        let start = dir.path().join("start_vm.sh");
        assert!(start.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&start).unwrap().permissions().mode();
            assert_eq!(mode & 0o700, 0o700);
        }
    }
}
