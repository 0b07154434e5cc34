// aethera/src/main.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Infrastructure (Config & Stores)
use aethera_core::infrastructure::config::{AetheraConfig, load_config};

// Domain (Types for the CLI)
use aethera_core::domain::aoi::AoiInput;
use aethera_core::domain::run::{ProjectAnalysisConfig, ProjectRecord, RunManifest};

// Application (Use Cases)
use aethera_core::application::{AnalysisContext, ReportMemory, RunRequest, run_analysis};

use comfy_table::Table;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "aethera")]
#[command(about = "Reproducible Environmental Impact Assessment Engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 🚀 Runs a full analysis (AOI -> artifacts -> manifest)
    Run {
        /// Data root (holds aethera.yaml, datasets/, rule_sets/...)
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Project id the run belongs to
        #[arg(long)]
        project: String,

        /// AOI: inline WKT, inline GeoJSON, or a path (.geojson/.shp/.wkt)
        #[arg(long)]
        aoi: String,

        /// Project type (ex: "solar_farm", "wind_farm")
        #[arg(long = "type")]
        project_type: String,

        /// Installed capacity in MW
        #[arg(long)]
        capacity_mw: Option<f64>,

        /// ISO 3166-1 alpha-3 country override (else inferred from the AOI)
        #[arg(long)]
        country: Option<String>,

        /// Operational horizon in years
        #[arg(long)]
        horizon_years: Option<f64>,

        /// Task id for progress polling (defaults to the project id)
        #[arg(long)]
        task_id: Option<String>,
    },

    /// 🗂️  Prints the dataset availability table
    Datasets {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        #[arg(long)]
        country: Option<String>,
    },

    /// 📁 Registers a new project
    CreateProject {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Project id
        id: String,

        /// Display name
        #[arg(long)]
        name: String,

        #[arg(long = "type")]
        project_type: String,

        #[arg(long)]
        country: Option<String>,
    },

    /// 📋 Lists registered projects and their completed runs
    Projects {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
    },

    /// 🔍 Summarizes a run manifest
    Inspect {
        /// Run directory containing manifest.json
        run_dir: PathBuf,
    },

    /// 🧠 Queries the report memory for similar sections
    Memory {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Query text
        query: String,

        #[arg(long, short, default_value = "3")]
        k: usize,
    },
}

/// WKT / inline GeoJSON / file path.
fn parse_aoi_arg(raw: &str) -> AoiInput {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        match serde_json::from_str(trimmed) {
            Ok(value) => AoiInput::GeoJson(value),
            Err(_) => AoiInput::Wkt(trimmed.to_string()),
        }
    } else if trimmed
        .to_ascii_uppercase()
        .starts_with(&['P', 'M', 'G'][..])
        && trimmed.contains('(')
    {
        AoiInput::Wkt(trimmed.to_string())
    } else {
        AoiInput::Path(PathBuf::from(trimmed))
    }
}

fn load_or_default_config(data_dir: &PathBuf) -> AetheraConfig {
    match load_config(data_dir) {
        Ok(config) => config,
        Err(_) => AetheraConfig::with_root(data_dir),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug aethera run ... pour voir les détails
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        // --- USE CASE: RUN ANALYSIS ---
        Commands::Run {
            data_dir,
            project,
            aoi,
            project_type,
            capacity_mw,
            country,
            horizon_years,
            task_id,
        } => {
            let start = std::time::Instant::now();

            println!("⚙️  Loading configuration...");
            let config = load_or_default_config(&data_dir);
            let ctx = AnalysisContext::initialize(config)?;

            let request = RunRequest {
                project_id: project.clone(),
                aoi: parse_aoi_arg(&aoi),
                config: ProjectAnalysisConfig {
                    project_type,
                    capacity_mw,
                    country,
                    horizon_years,
                    avoided_tco2e_per_year: None,
                    options: serde_json::Value::Null,
                },
                task_id: task_id.unwrap_or(project),
            };

            match run_analysis(&ctx, request).await {
                Ok(run_id) => {
                    println!(
                        "\n✨ SUCCESS! Run {run_id} finished in {:.2?}",
                        start.elapsed()
                    );
                    println!(
                        "   Manifest: {}",
                        ctx.config.storage_root.join(&run_id).join("manifest.json").display()
                    );
                }
                Err(e) => {
                    eprintln!("\n💥 CRITICAL RUN ERROR: {e}");
                    std::process::exit(1);
                }
            }
        }

        // --- USE CASE: DATASET AVAILABILITY ---
        Commands::Datasets { data_dir, country } => {
            let config = load_or_default_config(&data_dir);
            let ctx = AnalysisContext::initialize(config)?;
            let report = ctx.catalog.availability_report(country.as_deref());

            let mut table = Table::new();
            table.set_header(vec!["dataset", "required", "present", "path"]);
            for (name, availability) in &report {
                table.add_row(vec![
                    name.clone(),
                    availability.required.to_string(),
                    if availability.present { "✅".into() } else { "❌".to_string() },
                    availability
                        .path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }

        // --- USE CASE: CREATE PROJECT ---
        Commands::CreateProject {
            data_dir,
            id,
            name,
            project_type,
            country,
        } => {
            let config = load_or_default_config(&data_dir);
            let ctx = AnalysisContext::initialize(config)?;
            ctx.projects.create_project(&ProjectRecord {
                id: id.clone(),
                name,
                country,
                project_type,
                created_at: chrono::Utc::now(),
                metadata: serde_json::json!({}),
            })?;
            println!("✨ Project '{id}' registered");
        }

        // --- USE CASE: LIST PROJECTS ---
        Commands::Projects { data_dir } => {
            let config = load_or_default_config(&data_dir);
            let ctx = AnalysisContext::initialize(config)?;

            let mut table = Table::new();
            table.set_header(vec!["id", "name", "type", "country", "completed runs"]);
            for project in ctx.projects.list()? {
                let completed = ctx.runs.completed_for_project(&project.id)?.len();
                table.add_row(vec![
                    project.id,
                    project.name,
                    project.project_type,
                    project.country.unwrap_or_default(),
                    completed.to_string(),
                ]);
            }
            println!("{table}");
        }

        // --- USE CASE: INSPECT MANIFEST ---
        Commands::Inspect { run_dir } => {
            let manifest_path = run_dir.join("manifest.json");
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: RunManifest = serde_json::from_str(&content)?;

            println!("🔍 Run {} [{:?}]", manifest.run_id, manifest.status);
            println!("   Project: {}", manifest.project_id);
            println!(
                "   Country: {}",
                manifest.country.as_deref().unwrap_or("unresolved")
            );

            let mut table = Table::new();
            table.set_header(vec!["score", "value"]);
            for (name, value) in [
                ("biodiversity", manifest.scores.biodiversity),
                ("resm", manifest.scores.resm),
                ("ahsm", manifest.scores.ahsm),
                ("cim", manifest.scores.cim),
            ] {
                table.add_row(vec![
                    name.to_string(),
                    value.map(|v| format!("{v:.1}")).unwrap_or("—".into()),
                ]);
            }
            println!("{table}");

            if let Some(legal) = &manifest.legal {
                println!(
                    "   Legal: compliant={} critical={} warnings={}",
                    legal.overall_compliant, legal.critical, legal.warnings
                );
            }
            println!("   Artifacts: {}", manifest.artifacts.len());
            for skipped in &manifest.skipped_stages {
                println!("   ⚠️  skipped {}: {}", skipped.stage, skipped.reason);
            }
        }

        // --- USE CASE: REPORT MEMORY SEARCH ---
        Commands::Memory { data_dir, query, k } => {
            let config = load_or_default_config(&data_dir);
            let memory_root = config.memory_root();
            let ctx = AnalysisContext::initialize(config)?;
            let memory = ReportMemory::open(memory_root, Arc::clone(&ctx.embedder))?;

            let hits = memory
                .find_similar(&query, k, &Default::default(), ctx.config.rag_min_score)
                .await?;
            if hits.is_empty() {
                println!("🤷 No similar sections above the similarity threshold");
            }
            for hit in hits {
                println!(
                    "📄 {}/{} (score {:.3})\n   {}",
                    hit.report_id,
                    hit.section_id,
                    hit.score,
                    hit.text.chars().take(160).collect::<String>()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run_defaults() {
        let args = Cli::parse_from([
            "aethera",
            "run",
            "--project",
            "p1",
            "--aoi",
            "POLYGON((0 0,1 0,1 1,0 1,0 0))",
            "--type",
            "solar_farm",
        ]);
        match args.command {
            Commands::Run {
                project,
                project_type,
                capacity_mw,
                ..
            } => {
                assert_eq!(project, "p1");
                assert_eq!(project_type, "solar_farm");
                assert_eq!(capacity_mw, None);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_aoi_arg_forms() {
        assert!(matches!(
            parse_aoi_arg("POLYGON((0 0,1 0,1 1,0 1,0 0))"),
            AoiInput::Wkt(_)
        ));
        assert!(matches!(
            parse_aoi_arg(r#"{"type": "Point", "coordinates": [1, 2]}"#),
            AoiInput::GeoJson(_)
        ));
        assert!(matches!(parse_aoi_arg("sites/aoi.geojson"), AoiInput::Path(_)));
        assert!(matches!(
            parse_aoi_arg("MULTIPOLYGON(((0 0,1 0,1 1,0 0)))"),
            AoiInput::Wkt(_)
        ));
    }

    #[test]
    fn test_cli_parse_memory_k() {
        let args = Cli::parse_from(["aethera", "memory", "habitat overlap", "-k", "5"]);
        match args.command {
            Commands::Memory { k, query, .. } => {
                assert_eq!(k, 5);
                assert_eq!(query, "habitat overlap");
            }
            _ => panic!("Expected Memory command"),
        }
    }
}
