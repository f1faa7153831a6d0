//! Best-effort host provisioning for the Render deployment.
//!
//! Tries to install the unixODBC/FreeTDS system packages and registers
//! the FreeTDS driver in an `odbcinst.ini`. Every sub-step prints its own
//! ✅/⚠️ status line and none of them abort the run; the target host may
//! not allow package installs or writes to /etc at all.

use crate::diagnostics::{self, DriverProbe, DriverSource, OdbcInst};
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

const INSTALL_COMMANDS: [&str; 2] = [
    "apt-get update",
    "apt-get install -y unixodbc-dev freetds-dev freetds-bin",
];

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

const ODBCINST_FREETDS: &str = "\
[FreeTDS]
Description = FreeTDS Driver
Driver = /usr/lib/x86_64-linux-gnu/odbc/libtdsodbc.so
Setup = /usr/lib/x86_64-linux-gnu/odbc/libtdsS.so
FileUsage = 1
";

/// Run the full provisioning sequence. Always returns `Ok` unless the
/// output sink itself fails.
pub fn provision(out: &mut dyn Write) -> Result<()> {
    writeln!(out, "🚀 Configurando entorno para Render...")?;

    install_system_packages(out)?;

    let candidates = [
        PathBuf::from("/etc/odbcinst.ini"),
        PathBuf::from("./odbcinst.ini"),
    ];
    if let Some(path) = configure_odbc(out, &candidates)? {
        // unixODBC honors ODBCINST as an override for the registry path.
        std::env::set_var("ODBCINST", &path);
    }

    verify_drivers(out, &OdbcInst)?;

    writeln!(out, "✅ Configuración completada")?;
    Ok(())
}

/// Try the package installs, each bounded by [`COMMAND_TIMEOUT`].
fn install_system_packages(out: &mut dyn Write) -> Result<()> {
    writeln!(out, "🔧 Intentando instalar paquetes del sistema...")?;
    for cmdline in INSTALL_COMMANDS {
        match run_with_timeout(cmdline, COMMAND_TIMEOUT) {
            Ok(()) => writeln!(out, "✅ {}", cmdline)?,
            Err(err) => writeln!(out, "⚠️ {} - {}", cmdline, err)?,
        }
    }
    Ok(())
}

/// Write the FreeTDS stanza to the first writable candidate path.
/// Returns the path used, or `None` when no candidate was writable.
fn configure_odbc(out: &mut dyn Write, candidates: &[PathBuf]) -> Result<Option<PathBuf>> {
    for path in candidates {
        match std::fs::write(path, ODBCINST_FREETDS) {
            Ok(()) => {
                writeln!(out, "✅ Configuración ODBC creada en: {}", path.display())?;
                return Ok(Some(path.clone()));
            }
            Err(_) => continue,
        }
    }
    writeln!(out, "⚠️ No se pudo configurar ODBC: ninguna ruta es escribible")?;
    Ok(None)
}

/// Post-install check: can the driver registry be enumerated now?
fn verify_drivers(out: &mut dyn Write, source: &dyn DriverSource) -> Result<()> {
    match diagnostics::probe(source) {
        DriverProbe::DriverList(drivers) if !drivers.is_empty() => {
            writeln!(out, "✅ Drivers ODBC registrados: {}", drivers.join(", "))?;
        }
        DriverProbe::DriverList(_) => {
            writeln!(out, "⚠️ El registro ODBC está vacío")?;
        }
        DriverProbe::DiagnosticFailed(reason) => {
            writeln!(out, "⚠️ No se pudo consultar los drivers ODBC: {}", reason)?;
        }
    }
    Ok(())
}

/// Run a command line, discarding its output, killing it on timeout.
fn run_with_timeout(cmdline: &str, timeout: Duration) -> Result<()> {
    let words = shell_words::split(cmdline)
        .with_context(|| format!("invalid command '{}'", cmdline))?;
    let (program, args) = words.split_first().context("empty command")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", program))?;

    match child.wait_timeout(timeout)? {
        Some(status) if status.success() => Ok(()),
        Some(status) => bail!("exited with {}", status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            bail!("timeout after {}s", timeout.as_secs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_odbc_writes_first_writable() {
        let dir = tempfile::tempdir().unwrap();
        let unwritable = dir.path().join("missing-subdir").join("odbcinst.ini");
        let writable = dir.path().join("odbcinst.ini");

        let mut buf = Vec::new();
        let chosen = configure_odbc(&mut buf, &[unwritable, writable.clone()])
            .unwrap()
            .unwrap();
        assert_eq!(chosen, writable);

        let content = std::fs::read_to_string(&writable).unwrap();
        assert!(content.starts_with("[FreeTDS]"));
        assert!(content.contains("libtdsodbc.so"));

        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("✅ Configuración ODBC creada en:"));
    }

    #[test]
    fn test_configure_odbc_no_writable_path() {
        let dir = tempfile::tempdir().unwrap();
        let unwritable = dir.path().join("missing-subdir").join("odbcinst.ini");

        let mut buf = Vec::new();
        let chosen = configure_odbc(&mut buf, &[unwritable]).unwrap();
        assert!(chosen.is_none());
        assert!(String::from_utf8(buf)
            .unwrap()
            .contains("⚠️ No se pudo configurar ODBC"));
    }

    #[test]
    fn test_run_with_timeout_success_and_failure() {
        run_with_timeout("true", Duration::from_secs(5)).unwrap();
        let err = run_with_timeout("false", Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn test_run_with_timeout_kills_slow_command() {
        let err = run_with_timeout("sleep 30", Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_run_with_timeout_missing_binary() {
        let err =
            run_with_timeout("definitely-not-a-real-binary", Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn test_verify_drivers_reports_failure_without_error() {
        struct Broken;
        impl DriverSource for Broken {
            fn installed_drivers(&self) -> Result<Vec<String>> {
                bail!("no registry")
            }
        }
        let mut buf = Vec::new();
        verify_drivers(&mut buf, &Broken).unwrap();
        assert!(String::from_utf8(buf)
            .unwrap()
            .contains("⚠️ No se pudo consultar los drivers ODBC: no registry"));
    }
}
