use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Add,
    Remove,
}

/// Marks incoming packets with the network id of the interface they arrived
/// on, so reply packets route back out the same network.
pub trait PacketFilter {
    fn apply(&self, action: FilterAction, interface: &str, net_id: u16) -> anyhow::Result<()>;
}

/// Empties one routing table wholesale.
pub trait RouteFlusher {
    fn flush(&self, table: u32) -> anyhow::Result<()>;
}

/// Installs the ingress mark through the mangle table, for both families.
pub struct IptablesFilter;

/// Argument list for one family's MARK rule. The mark renders in hex.
pub(crate) fn mark_arguments(action: FilterAction, interface: &str, net_id: u16) -> [String; 10] {
    let flag = match action {
        FilterAction::Add => "-A",
        FilterAction::Remove => "-D",
    };
    let mark = format!("{:#x}", u32::from(net_id));
    ["-t", "mangle", flag, "INPUT", "-i", interface, "-j", "MARK", "--set-mark", mark.as_str()].map(String::from)
}

impl PacketFilter for IptablesFilter {
    fn apply(&self, action: FilterAction, interface: &str, net_id: u16) -> anyhow::Result<()> {
        for program in ["iptables", "ip6tables"] {
            let mut command = Command::new(program);
            command.args(mark_arguments(action, interface, net_id));
            run(&mut command)?;
        }
        Ok(())
    }
}

/// Flushes through the ip tool rather than per-route netlink deletions. The
/// kernel walks the table in one pass, which also catches routes we never
/// installed ourselves.
pub struct IpRouteFlusher;

impl RouteFlusher for IpRouteFlusher {
    fn flush(&self, table: u32) -> anyhow::Result<()> {
        let table = table.to_string();
        for family in ["-4", "-6"] {
            let mut command = Command::new("ip");
            command.args([family, "route", "flush", "table", table.as_str()]);
            run(&mut command)?;
        }
        Ok(())
    }
}

fn run(command: &mut Command) -> anyhow::Result<()> {
    tracing::debug!(?command, "running command");
    let output = command.output()?;
    if !output.status.success() {
        anyhow::bail!("command {command:?} failed with {}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim());
    }
    Ok(())
}
