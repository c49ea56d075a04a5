use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod progress;

use progress::RunSummary;
use specforge::contexts::{
    self, AnalyzerOptions, Analyzer, CodeRefiner, ModelCodeFixer, completion_from_settings,
    recover,
};
use specforge::data::ProjectPlan;
use specforge::server;
use specforge::settings::Settings;

#[derive(Clone, Copy)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
}

pub fn analyze(
    document: &Path,
    output_dir: Option<PathBuf>,
    settings: &Settings,
    config: &Config,
) -> Result<()> {
    let bytes = fs::read(document)
        .with_context(|| format!("Failed to read document {}", document.display()))?;
    let file_name = document
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut options = AnalyzerOptions::from_settings(settings, config.dry_run);
    if let Some(dir) = output_dir {
        options.output_dir = dir;
    }
    let client = completion_from_settings(settings).context("Failed to create model client")?;
    let analyzer = Analyzer::new(client, options);

    println!("Analyzing {}...", document.display());
    let response = analyzer.analyze_document(&file_name, &bytes);
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialize analysis result")?
    );

    if response.is_success() {
        println!("✓ Analysis complete");
        Ok(())
    } else {
        anyhow::bail!("Analysis failed");
    }
}

pub fn serve(addr: Option<String>, settings: &Settings, config: &Config) -> Result<()> {
    let addr = addr.unwrap_or_else(|| settings.listen_addr.clone());
    let client = completion_from_settings(settings).context("Failed to create model client")?;
    let analyzer = Arc::new(Analyzer::new(
        client,
        AnalyzerOptions::from_settings(settings, config.dry_run),
    ));

    if settings.api_key.is_none() {
        eprintln!("warning: GROQ_API_KEY is not set; analysis requests will fail");
    }
    println!("Serving on http://{}", addr);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let served = runtime.block_on(server::serve(analyzer.clone(), &addr));
    // The blocking HTTP client must not be dropped on a runtime thread.
    drop(runtime);
    drop(analyzer);
    served.with_context(|| format!("Server on {} stopped", addr))
}

pub fn materialize(
    plan_file: &Path,
    output_dir: Option<PathBuf>,
    settings: &Settings,
    config: &Config,
) -> Result<()> {
    let text = fs::read_to_string(plan_file)
        .with_context(|| format!("Failed to read plan {}", plan_file.display()))?;
    let plan = ProjectPlan::from_payload(&recover(&text))
        .with_context(|| format!("Failed to interpret plan {}", plan_file.display()))?;
    let root = output_dir.unwrap_or_else(|| settings.output_dir.clone());

    if config.dry_run {
        println!("[DRY RUN] Would write {} file(s) under {}:", plan.files().len(), root.display());
        for (path, content) in plan.files() {
            println!("  {} ({} bytes)", path.display(), content.len());
        }
        return Ok(());
    }

    let summary = RunSummary::start();
    let report = contexts::materialize(&plan, &root)
        .with_context(|| format!("Failed to materialize project at {}", root.display()))?;
    if config.verbose {
        for file in &report.files {
            println!("✓ {}", file.display());
        }
    }
    summary.finish_materialize(&report);
    Ok(())
}

pub fn refine(
    dir: &Path,
    max_iterations: Option<usize>,
    jobs: Option<usize>,
    settings: &Settings,
    config: &Config,
) -> Result<()> {
    let refiner = CodeRefiner::new(max_iterations.unwrap_or(settings.max_refine_iterations));
    let jobs = jobs.unwrap_or(settings.refine_jobs);
    println!(
        "Refining Python files under {} (max_iterations={}, jobs={})...",
        dir.display(),
        refiner.max_iterations(),
        jobs
    );

    if config.dry_run {
        let files = contexts::python_files(dir)
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        for file in files {
            let code = fs::read_to_string(dir.join(&file))
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = contexts::validate(&code, &file, dir);
            match result.describe() {
                Some(error) => println!("[DRY RUN] ✗ {}: {}", file.display(), error),
                None => println!("[DRY RUN] ✓ {}", file.display()),
            }
        }
        return Ok(());
    }

    let client = completion_from_settings(settings).context("Failed to create model client")?;
    let fixer = ModelCodeFixer::new(client);
    let summary = RunSummary::start();
    let stats = refiner
        .refine_project(dir, &fixer, jobs)
        .with_context(|| format!("Failed to refine {}", dir.display()))?;
    summary.finish_refinement(&stats);

    if stats.failed_files > 0 {
        anyhow::bail!("{} file(s) could not be fixed", stats.failed_files);
    }
    Ok(())
}
