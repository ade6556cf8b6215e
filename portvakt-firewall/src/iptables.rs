//! Subprocess backend shelling out to `ipset` and `iptables`.
//!
//! Set membership lives in `hash:net` ipsets so per-IP mutation is a single
//! constant-time kernel operation; the evaluation chain only references the
//! sets and never needs reconfiguration after install. Bulk population goes
//! through `ipset restore` into a shadow set followed by `ipset swap`, so a
//! whole-list load is observable only as fully-old or fully-new.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use ipnetwork::IpNetwork;
use tracing::{debug, warn};

use crate::backend::{FirewallBackend, FirewallError};

/// Primary inbound hook point.
const INPUT_HOOK: &str = "INPUT";
/// Container runtime pre-routing user hook; optional on the host.
const CONTAINER_HOOK: &str = "DOCKER-USER";

/// stderr fragments that mean "the object was not there", across the ipset
/// and iptables error vocabularies.
const ABSENT_MARKERS: &[&str] = &[
    "does not exist",
    "doesn't exist",
    "No chain/target/match by that name",
    "does a matching rule exist",
    "it's not added",
];

fn stderr_means_absent(stderr: &str) -> bool {
    ABSENT_MARKERS.iter().any(|m| stderr.contains(m))
}

/// Backend driving the kernel through the `ipset`/`iptables` CLIs.
pub struct IptablesBackend {
    ipset: PathBuf,
    iptables: PathBuf,
    max_elements: u64,
    timeout: Duration,
}

impl IptablesBackend {
    /// Preflight both binaries and build the backend.
    pub fn new(max_elements: u64, timeout: Duration) -> Result<Self, FirewallError> {
        let ipset = find_in_path("ipset")?;
        let iptables = find_in_path("iptables")?;
        Ok(Self {
            ipset,
            iptables,
            max_elements,
            timeout,
        })
    }

    /// Run one command under the per-call deadline and classify its outcome.
    fn run(&self, program: &Path, args: &[&str]) -> Result<(), FirewallError> {
        debug!(program = %program.display(), ?args, "firewall command");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let status = self.wait_with_deadline(&mut child, program)?;
        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }

        if stderr_means_absent(&stderr) {
            return Err(FirewallError::AlreadyAbsent);
        }
        Err(FirewallError::CommandFailed {
            program: program.display().to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            detail: stderr.trim().to_string(),
        })
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        program: &Path,
    ) -> Result<std::process::ExitStatus, FirewallError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FirewallError::Timeout {
                    program: program.display().to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn ipset(&self, args: &[&str]) -> Result<(), FirewallError> {
        self.run(&self.ipset, args)
    }

    fn iptables(&self, args: &[&str]) -> Result<(), FirewallError> {
        self.run(&self.iptables, args)
    }

    /// Hook `chain` at position 1 of `hook`, exactly once.
    ///
    /// Optional hooks (the container chain) that are missing entirely are
    /// skipped with a log line rather than failing init.
    fn ensure_hook(&self, hook: &str, chain: &str, required: bool) -> Result<(), FirewallError> {
        match self.iptables(&["-nL", hook]) {
            Ok(()) => {}
            Err(FirewallError::AlreadyAbsent) if !required => {
                warn!(hook, "hook chain not present, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        match self.iptables(&["-C", hook, "-j", chain]) {
            Ok(()) => Ok(()),
            Err(FirewallError::AlreadyAbsent) => self.iptables(&["-I", hook, "1", "-j", chain]),
            Err(e) => Err(e),
        }
    }

    fn unhook(&self, hook: &str, chain: &str) -> Result<(), FirewallError> {
        match self.iptables(&["-D", hook, "-j", chain]) {
            Ok(()) | Err(FirewallError::AlreadyAbsent) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl FirewallBackend for IptablesBackend {
    fn create_set(&mut self, set: &str) -> Result<(), FirewallError> {
        let maxelem = self.max_elements.to_string();
        self.ipset(&[
            "create", set, "hash:net", "family", "inet", "maxelem", &maxelem, "-exist",
        ])
    }

    fn destroy_set(&mut self, set: &str) -> Result<(), FirewallError> {
        self.ipset(&["destroy", set])
    }

    fn add_entry(&mut self, set: &str, entry: IpNetwork) -> Result<(), FirewallError> {
        self.ipset(&["add", set, &entry.to_string(), "-exist"])
    }

    fn remove_entry(&mut self, set: &str, entry: IpNetwork) -> Result<(), FirewallError> {
        self.ipset(&["del", set, &entry.to_string()])
    }

    fn load_entries(&mut self, set: &str, entries: &[IpNetwork]) -> Result<(), FirewallError> {
        let mut script = String::new();
        for entry in entries {
            script.push_str(&format!("add {} {} -exist\n", set, entry));
        }
        let path = std::env::temp_dir().join(format!(
            "portvakt-restore-{}-{}",
            std::process::id(),
            set
        ));
        std::fs::write(&path, script)?;
        let result = self.ipset(&["restore", "-f", &path.to_string_lossy()]);
        let _ = std::fs::remove_file(&path);
        result
    }

    fn swap_sets(&mut self, first: &str, second: &str) -> Result<(), FirewallError> {
        self.ipset(&["swap", first, second])
    }

    fn install_chain(
        &mut self,
        chain: &str,
        whitelist_set: &str,
        blacklist_set: &str,
    ) -> Result<(), FirewallError> {
        match self.iptables(&["-N", chain]) {
            Ok(()) => {}
            Err(FirewallError::CommandFailed { ref detail, .. })
                if detail.contains("Chain already exists") => {}
            Err(e) => return Err(e),
        }
        self.iptables(&["-F", chain])?;

        // Rule order is the correctness contract: exempt, then return
        // traffic of legitimate sessions, then drop.
        self.iptables(&[
            "-A", chain, "-m", "set", "--match-set", whitelist_set, "src", "-j", "RETURN",
        ])?;
        self.iptables(&[
            "-A",
            chain,
            "-m",
            "conntrack",
            "--ctstate",
            "ESTABLISHED,RELATED",
            "-j",
            "RETURN",
        ])?;
        self.iptables(&[
            "-A", chain, "-m", "set", "--match-set", blacklist_set, "src", "-j", "DROP",
        ])?;

        self.ensure_hook(INPUT_HOOK, chain, true)?;
        self.ensure_hook(CONTAINER_HOOK, chain, false)?;
        Ok(())
    }

    fn remove_chain(&mut self, chain: &str) -> Result<(), FirewallError> {
        self.unhook(INPUT_HOOK, chain)?;
        self.unhook(CONTAINER_HOOK, chain)?;
        match self.iptables(&["-F", chain]) {
            Ok(()) | Err(FirewallError::AlreadyAbsent) => {}
            Err(e) => return Err(e),
        }
        match self.iptables(&["-X", chain]) {
            Ok(()) | Err(FirewallError::AlreadyAbsent) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Resolve a binary name against `$PATH`.
fn find_in_path(name: &str) -> Result<PathBuf, FirewallError> {
    let path = std::env::var_os("PATH")
        .ok_or_else(|| FirewallError::MissingCommand(name.to_string()))?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(FirewallError::MissingCommand(name.to_string()))
}
