//! Server process launch.
//!
//! The launch plan is built up front so the full command line can be
//! printed before anything is spawned. The sequencer then hands the plan
//! to [`run`], which spawns the child, forwards SIGINT/SIGTERM to it and
//! waits, returning the child's exit code.

use crate::config::{EnvSnapshot, LaunchConfig};
use anyhow::{bail, Context, Result};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicI32, Ordering};

/// A fully rendered server command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchPlan {
    /// Build the plan from config and the environment snapshot.
    ///
    /// Port precedence: explicit override, then `$PORT` (when non-empty),
    /// then the configured default. The value from the environment is
    /// passed through verbatim; a malformed port is the server's problem
    /// and surfaces as its startup failure.
    pub fn build(
        cfg: &LaunchConfig,
        env: &EnvSnapshot,
        port_override: Option<u16>,
    ) -> Result<Self> {
        let mut words = shell_words::split(&cfg.command)
            .with_context(|| format!("invalid launch command '{}'", cfg.command))?;
        if words.is_empty() {
            bail!("launch command is empty");
        }
        let program = words.remove(0);

        let port = match port_override {
            Some(p) => p.to_string(),
            None => env
                .port()
                .map(|p| p.to_string())
                .unwrap_or_else(|| cfg.default_port.to_string()),
        };

        let mut args = words;
        args.push(cfg.entry.clone());
        args.extend(cfg.extra_args.iter().cloned());
        args.push(cfg.port_flag.clone());
        args.push(port);
        args.push(cfg.address_flag.clone());
        args.push(cfg.address.clone());

        Ok(Self { program, args })
    }

    /// The command line as a shell-quoted string, for the launch banner.
    pub fn command_line(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(self.args.iter()))
    }
}

// Pid of the launched server, read by the signal handler.
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

extern "C" fn forward_signal(sig: libc::c_int) {
    let pid = CHILD_PID.load(Ordering::SeqCst);
    if pid > 0 {
        unsafe {
            libc::kill(pid, sig);
        }
    }
}

/// Spawn the server and wait for it, forwarding termination signals.
///
/// Returns the child's exit code; a child killed by a signal maps to the
/// shell convention 128 + signo. A spawn failure propagates as an error,
/// making the bootstrap itself exit non-zero.
pub fn run(plan: &LaunchPlan) -> Result<i32> {
    let mut child = Command::new(&plan.program)
        .args(&plan.args)
        .spawn()
        .with_context(|| format!("failed to start '{}'", plan.command_line()))?;

    CHILD_PID.store(child.id() as i32, Ordering::SeqCst);
    unsafe {
        libc::signal(libc::SIGINT, forward_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, forward_signal as libc::sighandler_t);
    }

    let status = child
        .wait()
        .context("failed to wait for the server process")?;
    CHILD_PID.store(0, Ordering::SeqCst);

    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaunchConfig;
    use std::collections::HashMap;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSnapshot::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_plan_uses_port_from_env() {
        let plan = LaunchPlan::build(
            &LaunchConfig::default(),
            &snapshot(&[("PORT", "8501")]),
            None,
        )
        .unwrap();
        assert_eq!(plan.program, "streamlit");
        assert_eq!(
            plan.args,
            vec![
                "run",
                "main.py",
                "--server.port",
                "8501",
                "--server.address",
                "0.0.0.0"
            ]
        );
        let line = plan.command_line();
        assert!(line.contains("8501"));
        assert!(line.contains("0.0.0.0"));
    }

    #[test]
    fn test_plan_defaults_port_when_env_unset() {
        let plan =
            LaunchPlan::build(&LaunchConfig::default(), &snapshot(&[]), None).unwrap();
        assert!(plan.args.contains(&"8501".to_string()));
    }

    #[test]
    fn test_plan_override_beats_env() {
        let plan = LaunchPlan::build(
            &LaunchConfig::default(),
            &snapshot(&[("PORT", "9999")]),
            Some(8080),
        )
        .unwrap();
        assert!(plan.args.contains(&"8080".to_string()));
        assert!(!plan.args.contains(&"9999".to_string()));
    }

    #[test]
    fn test_plan_passes_malformed_port_through() {
        let plan = LaunchPlan::build(
            &LaunchConfig::default(),
            &snapshot(&[("PORT", "not-a-port")]),
            None,
        )
        .unwrap();
        assert!(plan.args.contains(&"not-a-port".to_string()));
    }

    #[test]
    fn test_plan_with_custom_command() {
        let cfg = LaunchConfig {
            command: "gunicorn --workers 2".to_string(),
            entry: "app:app".to_string(),
            port_flag: "--bind-port".to_string(),
            address_flag: "--bind-address".to_string(),
            ..LaunchConfig::default()
        };
        let plan = LaunchPlan::build(&cfg, &snapshot(&[("PORT", "8000")]), None).unwrap();
        assert_eq!(plan.program, "gunicorn");
        assert_eq!(
            plan.args,
            vec![
                "--workers",
                "2",
                "app:app",
                "--bind-port",
                "8000",
                "--bind-address",
                "0.0.0.0"
            ]
        );
    }

    #[test]
    fn test_plan_rejects_empty_command() {
        let cfg = LaunchConfig {
            command: "  ".to_string(),
            ..LaunchConfig::default()
        };
        let err = LaunchPlan::build(&cfg, &snapshot(&[]), None).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_run_propagates_exit_code() {
        let plan = LaunchPlan {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 7".to_string()],
        };
        assert_eq!(run(&plan).unwrap(), 7);
    }

    #[test]
    fn test_run_maps_signal_death_to_128_plus_signo() {
        let plan = LaunchPlan {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "kill -KILL $$".to_string()],
        };
        assert_eq!(run(&plan).unwrap(), 128 + libc::SIGKILL);
    }

    #[test]
    fn test_run_spawn_failure_is_error() {
        let plan = LaunchPlan {
            program: "definitely-not-a-real-binary".to_string(),
            args: vec![],
        };
        let err = run(&plan).unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
