use std::io::{self, Write};

use crate::sandbox::ConsoleKind;
use crate::session::SessionReport;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn of(report: &SessionReport) -> Self {
        if report.success() {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail => 1,
        }
    }
}

/// Human readable report of a finished session.
pub struct Reporter<W: Write> {
    out: W,
    verbose: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            verbose: false,
        }
    }

    /// Also print captured snapshots and console output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write(&mut self, report: &SessionReport) -> io::Result<Verdict> {
        let out = &mut self.out;
        writeln!(out, "\n=== {} TEST ===\n", report.title)?;

        if let Some(rom) = &report.rom {
            writeln!(out, "ROM: {}", rom.description)?;
            writeln!(out, "SHA-256: {}", rom.sha256)?;
        }
        if let Some(seed) = report.seed {
            writeln!(out, "Seed: {seed}")?;
        }
        writeln!(out)?;

        if self.verbose {
            if let Some(obs) = &report.observations {
                for (label, snapshot) in &obs.snapshots {
                    writeln!(out, "{label}:")?;
                    for (key, value) in snapshot.iter() {
                        match value {
                            Some(v) if key == "pc" => writeln!(out, "  {key:<16} ${v:04x}")?,
                            Some(v) => writeln!(out, "  {key:<16} ${v:02x} ({v})")?,
                            None => writeln!(out, "  {key:<16} undefined")?,
                        }
                    }
                }
                writeln!(out, "\nFrames stepped: {}\n", obs.frames)?;
            }
        }

        for record in &report.records {
            let (icon, status) = if record.passed {
                ("✅", "PASS")
            } else {
                ("❌", "FAIL")
            };
            writeln!(out, "{icon} {}: {status}", record.name)?;
            if !record.details.is_empty() {
                writeln!(out, "   {}", record.details)?;
            }
        }

        let passed = report.passed();
        let total = report.records.len();
        writeln!(out, "\n=== SUMMARY ===")?;
        writeln!(out, "Passed: {passed}/{total}")?;
        writeln!(out, "Failed: {}/{total}", total - passed)?;

        if self.verbose {
            let logs: Vec<_> = report
                .console
                .iter()
                .filter(|m| m.kind == ConsoleKind::Log)
                .collect();
            if !logs.is_empty() {
                writeln!(out, "\n=== CONSOLE LOGS ===")?;
                for log in logs {
                    writeln!(out, "{}", log.text)?;
                }
            }
        }

        let errors: Vec<_> = report.page_errors().collect();
        if !errors.is_empty() {
            writeln!(out, "\n=== PAGE ERRORS ===")?;
            for error in errors {
                writeln!(out, "❌ {}", error.text)?;
            }
        }

        let verdict = Verdict::of(report);
        match verdict {
            Verdict::Pass => writeln!(out, "\n✅ ALL {} TESTS PASSED", report.title)?,
            Verdict::Fail => writeln!(out, "\n❌ {} TESTS FAILED", report.title)?,
        }

        Ok(verdict)
    }
}
