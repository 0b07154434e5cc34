// aethera-core/src/application/orchestrator.rs
//
// The run orchestrator: sequences catalog, cache, geospatial stages,
// ML fan-out and legal evaluation into one persisted, content-addressed
// run. It is the single catcher of typed stage errors; fatal-vs-skip is
// decided here, never inside a stage.

use crate::application::context::AnalysisContext;
use crate::application::legal::{self, RuleSetLoad};
use crate::application::manifest::ArtifactWriter;
use crate::application::predictors;
use crate::application::stages::{StageResult, biodiversity, emissions, kpis, land_cover, receptors};
use crate::application::tracker::CancellationFlag;
use crate::domain::aoi::{Aoi, AoiInput};
use crate::domain::error::DomainError;
use crate::domain::metrics::{MetricsMap, round_sig};
use crate::domain::run::{
    ErrorRecord, EmissionSummary, LegalSummary, ProjectAnalysisConfig, RunContext, RunManifest,
    RunRecord, RunStatus, ScoreSummary, SkippedStage, allocate_run_id,
};
use crate::error::AetheraError;
use crate::infrastructure::aoi_reader::load_aoi;
use crate::infrastructure::fs::sha256_bytes;
use chrono::Utc;
use geo::{Contains, Intersects};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub struct RunRequest {
    pub project_id: String,
    pub aoi: AoiInput,
    pub config: ProjectAnalysisConfig,
    pub task_id: String,
}

/// Where `execute_run` stopped and why.
struct StageError {
    stage: String,
    error: AetheraError,
}

enum Finished {
    Completed(Box<RunState>),
    Revoked(Box<RunState>, String),
}

/// Everything accumulated while a run executes.
struct RunState {
    aoi: Aoi,
    country: Option<String>,
    metrics: MetricsMap,
    scores: ScoreSummary,
    model_runs: Vec<crate::domain::ml::ensemble::ModelRun>,
    legal: Option<LegalSummary>,
    skipped: Vec<SkippedStage>,
    warnings: Vec<String>,
    context: RunContext,
}

/// Entry point of the analytical core. Returns the run id; artifacts land
/// under `<storage_root>/<run_id>/` and progress is published through the
/// task tracker.
#[instrument(skip(ctx, request), fields(project = %request.project_id, task = %request.task_id))]
pub async fn run_analysis(
    ctx: &AnalysisContext,
    request: RunRequest,
) -> Result<String, AetheraError> {
    println!("🚀 Starting AETHERA analysis...");
    let wall_clock = Instant::now();
    let cancel = ctx.tracker.register(&request.task_id);

    // Reject-fast: a bad AOI never creates a run.
    ctx.tracker.publish(&request.task_id, "aoi", 5.0, "Normalizing AOI");
    let aoi = match load_aoi(&request.aoi, &ctx.projector) {
        Ok(aoi) => aoi,
        Err(e) => {
            let error = AetheraError::Domain(e);
            ctx.tracker
                .fail(&request.task_id, error_record(&error, "aoi"));
            return Err(error);
        }
    };

    let run_id = allocate_run_id(Utc::now());
    let started_at = Utc::now();
    info!(%run_id, area_ha = round_sig(aoi.area_ha()), "run created");

    let mut writer = ArtifactWriter::new(ctx.storage.clone(), &run_id);
    let record = RunRecord {
        run_id: run_id.clone(),
        project_id: request.project_id.clone(),
        status: RunStatus::Processing,
        output_dir: run_id.clone(),
        manifest_path: format!("{run_id}/manifest.json"),
        started_at,
        finished_at: None,
        config: request.config.clone(),
    };
    ctx.runs.record(&record)?;

    let outcome = execute_run(ctx, &request, aoi, &cancel, &mut writer, wall_clock).await;

    let finished_at = Utc::now();
    match outcome {
        Ok(Finished::Completed(state)) => {
            let manifest = compose_manifest(
                &run_id,
                &request,
                RunStatus::Completed,
                started_at,
                finished_at,
                &state,
                &writer,
            );
            writer.commit_manifest(&manifest).await?;
            ctx.runs.record(&RunRecord {
                status: RunStatus::Completed,
                finished_at: Some(finished_at),
                ..record
            })?;
            ctx.tracker.complete(&request.task_id, &run_id);
            println!(
                "✨ Run {run_id} completed in {:.2?} ({} artifacts)",
                wall_clock.elapsed(),
                manifest.artifacts.len()
            );
            Ok(run_id)
        }
        Ok(Finished::Revoked(state, stage)) => {
            // Truncated manifest: exactly the artifacts of the completed
            // stages, nothing downstream.
            let mut manifest = compose_manifest(
                &run_id,
                &request,
                RunStatus::Revoked,
                started_at,
                finished_at,
                &state,
                &writer,
            );
            manifest
                .warnings
                .push(format!("cancelled at stage boundary '{stage}'"));
            writer.commit_manifest(&manifest).await?;
            ctx.runs.record(&RunRecord {
                status: RunStatus::Revoked,
                finished_at: Some(finished_at),
                ..record
            })?;
            ctx.tracker.revoke(&request.task_id, &run_id);
            println!("🛑 Run {run_id} revoked at '{stage}'");
            Ok(run_id)
        }
        Err(StageError { stage, error }) => {
            error!(%run_id, stage, kind = error.kind(), "run failed: {error}");
            let err_record = error_record(&error, &stage);
            writer.write_error(&err_record).await?;

            // FAILED manifest stays consistent: it lists only artifacts
            // that exist, with their true hashes.
            let state = RunState::empty(load_failed_aoi(&request, ctx));
            let mut manifest = compose_manifest(
                &run_id,
                &request,
                RunStatus::Failed,
                started_at,
                finished_at,
                &state,
                &writer,
            );
            manifest.warnings.push(format!(
                "failed at stage '{stage}': {} ({})",
                err_record.message, err_record.kind
            ));
            writer.commit_manifest(&manifest).await?;
            ctx.runs.record(&RunRecord {
                status: RunStatus::Failed,
                finished_at: Some(finished_at),
                ..record
            })?;
            ctx.tracker.fail(&request.task_id, err_record);
            eprintln!("💥 Run {run_id} FAILED at '{stage}': {error}");
            Err(error)
        }
    }
}

/// The ten-step procedure. Cancellation and the wall-clock budget are
/// checked at every stage boundary; mid-stage work runs to completion.
async fn execute_run(
    ctx: &AnalysisContext,
    request: &RunRequest,
    aoi: Aoi,
    cancel: &CancellationFlag,
    writer: &mut ArtifactWriter,
    wall_clock: Instant,
) -> Result<Finished, StageError> {
    let task_id = &request.task_id;
    let mut state = RunState::empty(aoi);

    // 3. Country: explicit config wins, else AOI centroid inference.
    state.country = match &request.config.country {
        Some(code) => Some(code.to_ascii_uppercase()),
        None => infer_country(ctx, &state.aoi).await,
    };
    let country = state.country.clone();
    info!(country = ?country, "country resolved");

    // Base metrics feeding every later stage.
    state.metrics.insert("aoi_area_ha", state.aoi.area_ha());
    state
        .metrics
        .insert("aoi_perimeter_km", state.aoi.perimeter_km());
    if let Some(capacity) = request.config.capacity_mw {
        state.metrics.insert("capacity_mw", capacity);
    }
    state.metrics.insert(
        "horizon_years",
        request
            .config
            .horizon_years
            .unwrap_or(ctx.config.default_horizon_years),
    );

    // 4. Dataset availability, then fail-fast on required datasets.
    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), "dataset_availability".into()));
    }
    budget_check(ctx, &mut state, wall_clock, "dataset_availability")?;
    ctx.tracker
        .publish(task_id, "dataset_availability", 10.0, "Checking datasets");
    let availability = ctx.catalog.availability_report(country.as_deref());
    writer
        .write_json("dataset_availability.json", &availability)
        .await
        .map_err(|e| at("dataset_availability", e))?;
    ctx.catalog
        .ensure_required_present(country.as_deref())
        .map_err(|e| at("dataset_availability", AetheraError::Domain(e)))?;

    // 5. Geospatial stages, declared order.
    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), land_cover::STAGE.into()));
    }
    budget_check(ctx, &mut state, wall_clock, land_cover::STAGE)?;
    ctx.tracker
        .publish(task_id, land_cover::STAGE, 25.0, "Clipping land cover");
    let aoi_snapshot = state.aoi.clone();
    let land_cover_outcome = land_cover::run(
        ctx,
        &aoi_snapshot,
        country.as_deref(),
        writer,
        &mut state.metrics,
    )
    .await
    .map_err(|e| at(land_cover::STAGE, e))?;

    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), biodiversity::STAGE.into()));
    }
    budget_check(ctx, &mut state, wall_clock, biodiversity::STAGE)?;
    ctx.tracker
        .publish(task_id, biodiversity::STAGE, 40.0, "Protected-area overlay");
    match biodiversity::run(ctx, &aoi_snapshot, country.as_deref(), writer, &mut state.metrics)
        .await
    {
        Ok(StageResult::Done(_)) => {}
        Ok(StageResult::Skipped(reason)) => state.skip(biodiversity::STAGE, reason),
        Err(e) => state.skip(biodiversity::STAGE, optional_failure(biodiversity::STAGE, e)),
    }

    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), receptors::STAGE.into()));
    }
    budget_check(ctx, &mut state, wall_clock, receptors::STAGE)?;
    ctx.tracker
        .publish(task_id, receptors::STAGE, 50.0, "Receptor distances");
    match receptors::run(ctx, &aoi_snapshot, country.as_deref(), writer, &mut state.metrics).await
    {
        Ok(StageResult::Done(())) => {}
        Ok(StageResult::Skipped(reason)) => state.skip(receptors::STAGE, reason),
        Err(e) => state.skip(receptors::STAGE, optional_failure(receptors::STAGE, e)),
    }

    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), emissions::STAGE.into()));
    }
    budget_check(ctx, &mut state, wall_clock, emissions::STAGE)?;
    ctx.tracker
        .publish(task_id, emissions::STAGE, 60.0, "Emission balance");
    match emissions::run(
        ctx,
        &request.config,
        &land_cover_outcome,
        writer,
        &mut state.metrics,
    )
    .await
    {
        Ok(StageResult::Done(())) => {}
        Ok(StageResult::Skipped(reason)) => state.skip(emissions::STAGE, reason),
        Err(e) => state.skip(emissions::STAGE, optional_failure(emissions::STAGE, e)),
    }

    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), kpis::STAGE.into()));
    }
    budget_check(ctx, &mut state, wall_clock, kpis::STAGE)?;
    ctx.tracker
        .publish(task_id, kpis::STAGE, 70.0, "Deriving KPIs");
    kpis::run(ctx, &land_cover_outcome, writer, &mut state.metrics)
        .await
        .map_err(|e| at(kpis::STAGE, e))?;

    // 6. ML fan-out (the declared intra-run parallel point), CIM last.
    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), "ml_ensembles".into()));
    }
    budget_check(ctx, &mut state, wall_clock, "ml_ensembles")?;
    ctx.tracker
        .publish(task_id, "ml_ensembles", 85.0, "Scoring ensembles");
    let bundle = predictors::run_predictions(ctx, &mut state.metrics)
        .await
        .map_err(|e| at("ml_ensembles", e))?;

    writer
        .write_json("processed/biodiversity/prediction.json", &bundle.biodiversity)
        .await
        .map_err(|e| at("ml_ensembles", e))?;
    writer
        .write_json("processed/resm_prediction.json", &bundle.resm)
        .await
        .map_err(|e| at("ml_ensembles", e))?;
    writer
        .write_json("processed/ahsm_prediction.json", &bundle.ahsm)
        .await
        .map_err(|e| at("ml_ensembles", e))?;
    writer
        .write_json("processed/cim_prediction.json", &bundle.cim)
        .await
        .map_err(|e| at("ml_ensembles", e))?;

    state.scores = ScoreSummary {
        biodiversity: Some(bundle.biodiversity.score),
        resm: Some(bundle.resm.score),
        ahsm: Some(bundle.ahsm.score),
        cim: Some(bundle.cim.score),
    };
    state.model_runs = vec![
        bundle.biodiversity.model_run.clone(),
        bundle.resm.model_run.clone(),
        bundle.ahsm.model_run.clone(),
        bundle.cim.model_run.clone(),
    ];

    // 7. Legal evaluation, when a rule set exists for the country.
    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), legal::STAGE.into()));
    }
    budget_check(ctx, &mut state, wall_clock, legal::STAGE)?;
    ctx.tracker
        .publish(task_id, legal::STAGE, 92.0, "Evaluating legal rules");
    if let Some(country_code) = &country {
        match legal::load_rule_set(ctx, country_code) {
            RuleSetLoad::Loaded(rule_set) => {
                let result = legal::evaluate_rules(ctx, &rule_set, &state.metrics);
                writer
                    .write_json(legal::ARTIFACT, &result)
                    .await
                    .map_err(|e| at(legal::STAGE, e))?;
                state.legal = Some(LegalSummary {
                    overall_compliant: result.overall_compliant,
                    critical: result.critical_count(),
                    warnings: result.warning_count(),
                });
            }
            RuleSetLoad::Absent => {
                state.skip(legal::STAGE, format!("no rule set for {country_code}"));
            }
            RuleSetLoad::Unparseable(message) => {
                state.warnings.push(message.clone());
                state.skip(legal::STAGE, message);
            }
        }
    } else {
        state.skip(legal::STAGE, "country could not be resolved".to_string());
    }

    // 8. Regional context for the manifest.
    state.context = regional_context(ctx, &state.aoi).await;

    if cancel.is_cancelled() {
        return Ok(Finished::Revoked(Box::new(state), "manifest".into()));
    }
    budget_check(ctx, &mut state, wall_clock, "manifest")?;
    ctx.tracker
        .publish(task_id, "manifest", 98.0, "Committing manifest");
    Ok(Finished::Completed(Box::new(state)))
}

impl RunState {
    fn empty(aoi: Aoi) -> Self {
        Self {
            aoi,
            country: None,
            metrics: MetricsMap::new(),
            scores: ScoreSummary::default(),
            model_runs: Vec::new(),
            legal: None,
            skipped: Vec::new(),
            warnings: Vec::new(),
            context: RunContext::default(),
        }
    }

    fn skip(&mut self, stage: &str, reason: String) {
        warn!(stage, reason, "stage skipped");
        self.skipped.push(SkippedStage {
            stage: stage.to_string(),
            reason,
        });
    }
}

fn at(stage: &str, error: AetheraError) -> StageError {
    StageError {
        stage: stage.to_string(),
        error,
    }
}

fn optional_failure(stage: &str, error: AetheraError) -> String {
    format!("stage '{stage}' failed: {error}")
}

/// Stage-boundary budget check: the hard wall-clock limit kills the run,
/// the soft limit warns once. Cancellation is handled inline at each
/// boundary because it ends the run as REVOKED, not FAILED.
fn budget_check(
    ctx: &AnalysisContext,
    state: &mut RunState,
    wall_clock: Instant,
    stage: &str,
) -> Result<(), StageError> {
    let elapsed = wall_clock.elapsed().as_secs();
    if elapsed > ctx.config.wall_clock_hard_seconds {
        return Err(at(
            stage,
            AetheraError::Domain(DomainError::Timeout {
                limit_seconds: ctx.config.wall_clock_hard_seconds,
            }),
        ));
    }
    if elapsed > ctx.config.wall_clock_soft_seconds {
        let warning = format!(
            "soft wall-clock budget ({}s) exceeded before stage '{stage}'",
            ctx.config.wall_clock_soft_seconds
        );
        if !state.warnings.contains(&warning) {
            state.warnings.push(warning);
        }
    }
    Ok(())
}

fn error_record(error: &AetheraError, stage: &str) -> ErrorRecord {
    let message = error.to_string();
    ErrorRecord {
        kind: error.kind().to_string(),
        message: message.clone(),
        stage: stage.to_string(),
        stack_digest: sha256_bytes(format!("{stage}:{message}"))[..16].to_string(),
    }
}

fn compose_manifest(
    run_id: &str,
    request: &RunRequest,
    status: RunStatus,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
    state: &RunState,
    writer: &ArtifactWriter,
) -> RunManifest {
    RunManifest {
        run_id: run_id.to_string(),
        project_id: request.project_id.clone(),
        status,
        started_at,
        finished_at,
        aoi: state.aoi.to_geojson_feature(),
        config: request.config.clone(),
        country: state.country.clone(),
        scores: state.scores.clone(),
        emissions: EmissionSummary {
            baseline_tco2e: state.metrics.get("baseline_tco2e_per_year").unwrap_or(0.0),
            project_tco2e_per_year: state
                .metrics
                .get("project_operation_tco2e_per_year")
                .unwrap_or(0.0),
            net_tco2e: state.metrics.get("net_tco2e_per_year").unwrap_or(0.0),
        },
        legal: state.legal.clone(),
        artifacts: writer.entries().to_vec(),
        model_runs: state.model_runs.clone(),
        skipped_stages: state.skipped.clone(),
        warnings: state.warnings.clone(),
        context: state.context.clone(),
    }
}

/// Keep the FAILED manifest's AOI field faithful without re-running
/// validation (the AOI parsed fine if we got this far).
fn load_failed_aoi(request: &RunRequest, ctx: &AnalysisContext) -> Aoi {
    load_aoi(&request.aoi, &ctx.projector).unwrap_or_else(|_| {
        // Unreachable in practice; an empty placeholder keeps the
        // manifest write alive.
        Aoi {
            wgs84: Vec::new(),
            working: Vec::new(),
            working_crs: ctx.config.working_crs.clone(),
        }
    })
}

/// AOI-centroid country inference against the admin boundaries dataset.
async fn infer_country(ctx: &AnalysisContext, aoi: &Aoi) -> Option<String> {
    let descriptor = ctx.catalog.locate("admin_boundaries", None, false).ok()??;
    let set = ctx.cache.load(&descriptor, aoi.wgs84_bbox(), None).await.ok()?;
    let centroid = aoi.wgs84_centroid()?;

    for record in &set.records {
        if record.geometry.contains(&centroid) {
            for key in ["ISO3", "iso3", "ISO_A3", "ADM0_A3", "GID_0", "country_code"] {
                if let Some(code) = record.properties.get(key).and_then(|v| v.as_text()) {
                    return Some(code.to_ascii_uppercase());
                }
            }
        }
    }
    None
}

/// NUTS regions and countries intersecting the AOI (manifest context).
async fn regional_context(ctx: &AnalysisContext, aoi: &Aoi) -> RunContext {
    let mut context = RunContext::default();
    let aoi_bbox = aoi.wgs84_bbox();
    let aoi_geometry =
        geo::Geometry::MultiPolygon(geo::MultiPolygon(
            aoi.wgs84.iter().map(|f| f.geometry.clone()).collect(),
        ));

    for (logical, keys, sink) in [
        (
            "nuts_regions",
            &["NUTS_ID", "nuts_id", "id"][..],
            &mut context.nuts_regions as &mut Vec<String>,
        ),
        (
            "admin_boundaries",
            &["ISO3", "iso3", "ISO_A3", "ADM0_A3", "GID_0"][..],
            &mut context.countries,
        ),
    ] {
        let Ok(Some(descriptor)) = ctx.catalog.locate(logical, None, false) else {
            continue;
        };
        let Ok(set) = ctx.cache.load(&descriptor, aoi_bbox, None).await else {
            continue;
        };
        for record in &set.records {
            if record.geometry.intersects(&aoi_geometry) {
                if let Some(code) = keys
                    .iter()
                    .find_map(|k| record.properties.get(*k).and_then(|v| v.as_text()))
                {
                    let code = code.to_string();
                    if !sink.contains(&code) {
                        sink.push(code);
                    }
                }
            }
        }
        sink.sort();
    }
    context
}
