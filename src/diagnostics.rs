//! ODBC driver diagnostics.
//!
//! The connectivity library is a black box behind [`DriverSource`]; the
//! production implementation shells out to `odbcinst -q -d`. Any failure
//! is downgraded to a [`DriverProbe::DiagnosticFailed`] value so the
//! startup sequence can report it and keep going.

use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::process::Command;

/// Drivers the deployment can actually use, checked individually in the
/// report. Order matters: FreeTDS is the preferred recommendation.
pub const TARGET_DRIVERS: [&str; 3] = [
    "FreeTDS",
    "ODBC Driver 17 for SQL Server",
    "SQL Server",
];

/// Outcome of the driver probe. The sequencer proceeds after either
/// variant; only the printed banner differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverProbe {
    DriverList(Vec<String>),
    DiagnosticFailed(String),
}

/// Source of the installed-driver list.
pub trait DriverSource {
    fn installed_drivers(&self) -> Result<Vec<String>>;
}

/// Queries unixODBC's `odbcinst` for registered drivers.
pub struct OdbcInst;

impl DriverSource for OdbcInst {
    fn installed_drivers(&self) -> Result<Vec<String>> {
        let output = Command::new("odbcinst")
            .args(["-q", "-d"])
            .output()
            .context("failed to run odbcinst -q -d")?;
        if !output.status.success() {
            bail!(
                "odbcinst exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(parse_driver_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Run the probe, folding any error into `DiagnosticFailed`.
pub fn probe(source: &dyn DriverSource) -> DriverProbe {
    match source.installed_drivers() {
        Ok(drivers) => DriverProbe::DriverList(drivers),
        Err(err) => DriverProbe::DiagnosticFailed(err.to_string()),
    }
}

/// Parse `odbcinst -q -d` output: one `[Driver Name]` header per line.
fn parse_driver_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .map(|name| name.to_string())
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Print the numbered installed-driver list, or the none-found banner.
pub fn write_driver_list(out: &mut dyn Write, drivers: &[String]) -> io::Result<()> {
    writeln!(out, "Drivers ODBC disponibles en el sistema:")?;
    if drivers.is_empty() {
        writeln!(out, "❌ No se encontraron drivers ODBC instalados.")?;
    } else {
        for (i, driver) in drivers.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, driver)?;
        }
    }
    Ok(())
}

/// Full diagnostic report: installed drivers, per-target availability and
/// a `DB_DRIVER` recommendation.
pub fn write_report(out: &mut dyn Write, probe: &DriverProbe) -> io::Result<()> {
    writeln!(out, "=== DIAGNÓSTICO DE DRIVERS ODBC ===")?;
    writeln!(out)?;

    let drivers = match probe {
        DriverProbe::DriverList(drivers) => drivers,
        DriverProbe::DiagnosticFailed(reason) => {
            writeln!(out, "⚠️ No se pudo consultar los drivers ODBC: {}", reason)?;
            return Ok(());
        }
    };

    write_driver_list(out, drivers)?;
    writeln!(out)?;

    writeln!(out, "Verificación de drivers específicos:")?;
    for target in TARGET_DRIVERS {
        let status = if drivers.iter().any(|d| d == target) {
            "✅ DISPONIBLE"
        } else {
            "❌ NO DISPONIBLE"
        };
        writeln!(out, "  {}: {}", target, status)?;
    }

    writeln!(out)?;
    writeln!(out, "=== RECOMENDACIONES ===")?;
    if drivers.iter().any(|d| d == "FreeTDS") {
        writeln!(out, "✅ FreeTDS está disponible. Usar: DB_DRIVER={{FreeTDS}}")?;
    } else {
        let sql_drivers: Vec<&String> =
            drivers.iter().filter(|d| d.contains("SQL Server")).collect();
        if let Some(first) = sql_drivers.first() {
            writeln!(
                out,
                "✅ Drivers de SQL Server disponibles: {:?}",
                sql_drivers
            )?;
            writeln!(out, "   Usar: DB_DRIVER={{{}}}", first)?;
        } else {
            writeln!(out, "❌ No hay drivers compatibles con SQL Server.")?;
            writeln!(
                out,
                "   Instalar FreeTDS: apt-get install -y freetds-bin unixodbc"
            )?;
        }
    }
    Ok(())
}
