use std::collections::{HashMap, HashSet};

use anyhow::{Result, anyhow, bail};
use xshell::{Shell, cmd};

const VARIANTS: [&str; 6] = [
    "rom-load",
    "rom-execution",
    "gameplay",
    "game-state",
    "minimal-rom",
    "full-init",
];

fn main() -> Result<()> {
    let mut jobs = HashMap::new();
    for job in all_jobs() {
        if let Some(old_job) = jobs.insert(job.name(), job) {
            bail!("Duplicate Job name configured: '{}'", old_job.name());
        }
    }

    let mut args = std::env::args();
    let _ = args.next();
    let Some(task) = args.next() else {
        println!("Available tasks:");
        for job in all_jobs() {
            println!("\t{}", job.name());
        }
        bail!("No task specified")
    };

    let mut completed_jobs = HashSet::new();

    let sh = Shell::new()?;
    let job = jobs
        .get(task.as_str())
        .ok_or(anyhow!("Job not found: {task}"))?;
    run_with_deps(&sh, job, &jobs, &mut completed_jobs)
}

fn run_with_deps<J: Job>(
    sh: &Shell,
    job: &J,
    all_jobs: &HashMap<&'static str, Box<dyn Job>>,
    completed_jobs: &mut HashSet<&'static str>,
) -> Result<()> {
    for dep in job.depends() {
        let job = all_jobs.get(dep).ok_or(anyhow!("Job not found: '{dep}'"))?;
        run_with_deps(sh, job, all_jobs, completed_jobs)?;
    }

    if completed_jobs.insert(job.name()) {
        println!("Running: {}", job.name());
        job.run(sh)?;
    }

    Ok(())
}

fn all_jobs() -> impl Iterator<Item = Box<dyn Job>> {
    [
        Box::new(CleanTask) as Box<dyn Job>,
        Box::new(HarnessTask),
        Box::new(StageTask),
        Box::new(SuiteTask),
    ]
    .into_iter()
}

trait Job {
    fn name(&self) -> &'static str;
    fn depends(&self) -> &'static [&'static str] {
        &[]
    }

    fn run(&self, sh: &Shell) -> Result<()>;
}

impl Job for Box<dyn Job> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn depends(&self) -> &'static [&'static str] {
        (**self).depends()
    }

    fn run(&self, sh: &Shell) -> Result<()> {
        (**self).run(sh)
    }
}

/// Directory holding the game's `build/` output, served during the suite.
fn harness_root(sh: &Shell) -> String {
    sh.var("HARNESS_ROOT").unwrap_or_else(|_| ".".to_string())
}

struct CleanTask;

impl Job for CleanTask {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn run(&self, sh: &Shell) -> Result<()> {
        cmd!(sh, "cargo clean").run()?;

        Ok(())
    }
}

struct HarnessTask;

impl Job for HarnessTask {
    fn name(&self) -> &'static str {
        "harness"
    }

    fn run(&self, sh: &Shell) -> Result<()> {
        cmd!(sh, "cargo build --release -p cli").run()?;
        cmd!(sh, "strip target/release/nes-harness").run()?;

        Ok(())
    }
}

struct StageTask;

impl Job for StageTask {
    fn name(&self) -> &'static str {
        "stage"
    }

    fn run(&self, sh: &Shell) -> Result<()> {
        let root = harness_root(sh);
        if root == "." {
            return Ok(());
        }

        for f in sh.read_dir("static")? {
            sh.copy_file(f, &root)?;
        }
        println!("Harness page staged in {root}");

        Ok(())
    }
}

struct SuiteTask;

impl Job for SuiteTask {
    fn name(&self) -> &'static str {
        "suite"
    }

    fn depends(&self) -> &'static [&'static str] {
        &["harness", "stage"]
    }

    fn run(&self, sh: &Shell) -> Result<()> {
        let root = harness_root(sh);
        let bin = sh.current_dir().join("target/release/nes-harness");

        // Each variant owns a distinct port, so they can all run at once.
        let handles: Vec<_> = VARIANTS
            .into_iter()
            .map(|variant| {
                let root = root.clone();
                let bin = bin.clone();
                std::thread::spawn(move || -> Result<()> {
                    let sh = Shell::new()?;
                    cmd!(sh, "{bin} run {variant} --root {root}").run()?;
                    Ok(())
                })
            })
            .collect();

        let mut failed = Vec::new();
        for (variant, handle) in VARIANTS.into_iter().zip(handles) {
            match handle.join() {
                Ok(Ok(())) => (),
                Ok(Err(err)) => {
                    eprintln!("{variant}: {err}");
                    failed.push(variant);
                }
                Err(_) => failed.push(variant),
            }
        }

        if !failed.is_empty() {
            bail!("Variants failed: {}", failed.join(", "));
        }

        println!("All {} variants passed", VARIANTS.len());
        Ok(())
    }
}
