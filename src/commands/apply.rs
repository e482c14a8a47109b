use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use converge::{
    BatchOptions, BatchSummary, DesiredState, Engine, Outcome, Plan, Poller, adapter_for,
    execute_batch,
};
use sacloud::ResourceKind;
use serde::Serialize;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands::{connect, show_progress};
use crate::config::{self, Manifest, ResourceEntry, Settings};
use crate::progress::BatchProgress;
use crate::ui;

#[derive(Serialize)]
struct EntryReport<'a> {
    name: &'a str,
    kind: ResourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    outcome: Outcome,
}

#[derive(Serialize)]
struct ApplyReport<'a> {
    results: Vec<EntryReport<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<BatchSummary>,
}

impl<'a> EntryReport<'a> {
    fn new(entry: &'a ResourceEntry, outcome: Outcome) -> Self {
        Self {
            name: &entry.name,
            kind: entry.kind,
            id: entry.id.as_ref().map(ToString::to_string),
            outcome,
        }
    }
}

fn manifest_path(args: &ApplyArgs) -> Result<PathBuf> {
    match &args.manifest {
        Some(path) => Ok(config::expand_path(path)),
        None => config::default_manifest_path(),
    }
}

/// Validate every entry before anything is sent.
fn desired_states(
    manifest: &Manifest,
    dry_run: bool,
) -> std::result::Result<Vec<DesiredState>, Vec<(&ResourceEntry, converge::Error)>> {
    let mut states = Vec::with_capacity(manifest.resources.len());
    let mut invalid = Vec::new();
    for entry in &manifest.resources {
        let checked = entry.desired_state(dry_run).and_then(|desired| {
            adapter_for(desired.kind()).validate(&desired)?;
            Ok(desired)
        });
        match checked {
            Ok(desired) => states.push(desired),
            Err(err) => invalid.push((entry, err)),
        }
    }
    if invalid.is_empty() {
        Ok(states)
    } else {
        Err(invalid)
    }
}

fn subject(entry: &ResourceEntry) -> String {
    format!("{} ({})", entry.name, entry.reference())
}

/// Show what each entry would do. Returns whether anything is pending.
fn preview(engine: &Engine<'_>, manifest: &Manifest, desired: &[DesiredState]) -> bool {
    ui::header("Plan");
    let mut pending = false;
    for (entry, state) in manifest.resources.iter().zip(desired) {
        match engine.plan(state) {
            Ok(Some((plan, _))) => {
                pending |= !plan.is_empty();
                ui::plan(&subject(entry), &plan);
            }
            Ok(None) => ui::plan(&subject(entry), &Plan::default()),
            Err(err) => {
                pending = true;
                ui::error(&format!("{}: {err}", subject(entry)));
            }
        }
    }
    println!();
    pending
}

fn confirm() -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt("Apply these changes?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Converge every resource listed in a manifest.
pub fn run(ctx: &Context, args: ApplyArgs) -> Result<ExitCode> {
    let path = manifest_path(&args)?;
    let manifest = Manifest::load(&path)?;
    log::info!(
        "loaded {} resource(s) from {}",
        manifest.resources.len(),
        path.display()
    );

    if manifest.resources.is_empty() {
        if !ctx.json {
            ui::info(&format!("{} lists no resources", path.display()));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let desired = match desired_states(&manifest, ctx.dry_run) {
        Ok(desired) => desired,
        Err(invalid) => {
            report_invalid(ctx, invalid)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let confirm_first = !(args.yes || ctx.dry_run);
    if confirm_first && ctx.json {
        anyhow::bail!("--json needs --yes or --dry-run");
    }

    let session = Settings::resolve(&ctx.overrides, Some(&manifest))
        .and_then(|settings| Ok((connect(&settings)?, settings.budget)));
    let (cloud, budget) = match session {
        Ok(session) => session,
        Err(err) => {
            report_all(ctx, &manifest, &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    let engine = Engine::new(&cloud).with_poller(Poller::new(budget));

    if confirm_first {
        if !preview(&engine, &manifest, &desired) {
            ui::success("Everything is already in the desired state");
            return Ok(ExitCode::SUCCESS);
        }
        if !confirm()? {
            ui::warn("Aborted");
            return Ok(ExitCode::FAILURE);
        }
    }

    if ctx.dry_run && !ctx.json {
        ui::warn("Dry run - no changes will be made");
    }

    let options = BatchOptions {
        jobs: usize::from(args.jobs.max(1)),
    };
    let mut progress = BatchProgress::new(show_progress(ctx));
    let report = match execute_batch(&engine, &desired, options, &mut progress) {
        Ok(report) => report,
        Err(err) => {
            report_all(ctx, &manifest, &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let outcomes: Vec<Outcome> = report.results.into_iter().map(Outcome::from).collect();
    if ctx.json {
        ui::json(&ApplyReport {
            results: manifest
                .resources
                .iter()
                .zip(outcomes)
                .map(|(entry, outcome)| EntryReport::new(entry, outcome))
                .collect(),
            summary: Some(report.summary),
        })?;
    } else {
        ui::header("Results");
        for (entry, outcome) in manifest.resources.iter().zip(&outcomes) {
            ui::outcome(&subject(entry), outcome, ctx.dry_run);
        }
        ui::summary(&report.summary, ctx.dry_run);
    }

    Ok(if report.summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report_invalid(ctx: &Context, invalid: Vec<(&ResourceEntry, converge::Error)>) -> Result<()> {
    if ctx.json {
        return ui::json(&ApplyReport {
            results: invalid
                .iter()
                .map(|(entry, err)| EntryReport::new(entry, Outcome::from_error(err)))
                .collect(),
            summary: None,
        });
    }
    ui::error("The manifest has invalid entries; nothing was changed");
    for (entry, err) in &invalid {
        ui::outcome(&subject(entry), &Outcome::from_error(err), ctx.dry_run);
    }
    Ok(())
}

/// Report an error that stopped the whole batch before it started.
fn report_all(ctx: &Context, manifest: &Manifest, err: &converge::Error) -> Result<()> {
    if ctx.json {
        return ui::json(&ApplyReport {
            results: manifest
                .resources
                .iter()
                .map(|entry| EntryReport::new(entry, Outcome::from_error(err)))
                .collect(),
            summary: None,
        });
    }
    ui::outcome("apply", &Outcome::from_error(err), ctx.dry_run);
    Ok(())
}
