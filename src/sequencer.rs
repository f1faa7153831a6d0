//! The startup sequence: banner, driver diagnostic, env echo, launch.
//!
//! Strictly linear. The only branch is the driver probe's outcome, and
//! either outcome proceeds to the next step. Banners go to an injected
//! writer so the sequence is testable without touching stdout.

use crate::config::{EnvSnapshot, LaunchConfig};
use crate::diagnostics::{self, DriverProbe, DriverSource};
use crate::launcher::LaunchPlan;
use anyhow::Result;
use std::io::Write;

pub struct Sequencer<'a> {
    pub snapshot: EnvSnapshot,
    pub launch: LaunchConfig,
    pub drivers: &'a dyn DriverSource,
}

impl Sequencer<'_> {
    /// Run steps 1-3 and plan step 4.
    ///
    /// The returned plan is handed to [`crate::launcher::run`] by the
    /// caller; splitting it off keeps the printed sequence testable
    /// without spawning anything.
    pub fn prepare(
        &self,
        out: &mut dyn Write,
        port_override: Option<u16>,
        skip_driver_check: bool,
    ) -> Result<LaunchPlan> {
        writeln!(out, "🚀 Iniciando aplicación...")?;

        if !skip_driver_check {
            match diagnostics::probe(self.drivers) {
                DriverProbe::DriverList(drivers) => {
                    diagnostics::write_driver_list(out, &drivers)?;
                }
                DriverProbe::DiagnosticFailed(reason) => {
                    writeln!(out, "⚠️ No se pudo consultar los drivers ODBC: {}", reason)?;
                }
            }
        }

        if self.launch.verify_env {
            writeln!(out, "Verificando variables de entorno...")?;
            // Values are echoed verbatim, including DB_USERNAME.
            for (name, value) in self.snapshot.iter() {
                writeln!(out, "  {}: {}", name, value)?;
            }
        }

        let plan = LaunchPlan::build(&self.launch, &self.snapshot, port_override)?;
        writeln!(out, "🚀 Lanzando servidor web...")?;
        writeln!(out, "   {}", plan.command_line())?;
        Ok(plan)
    }
}
