use std::time::Instant;

use specforge::contexts::MaterializeReport;
use specforge::data::RefinementStats;

/// Times a command and prints its end-of-run summary.
pub struct RunSummary {
    start_time: Instant,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn finish_materialize(&self, report: &MaterializeReport) {
        print_rule();
        println!("Summary:");
        println!("  Root:        {}", report.root.display());
        println!("  Directories: {}", report.directories.len());
        println!("  Files:       {}", report.files.len());
        if !report.executables.is_empty() {
            println!("  Executables: {}", report.executables.len());
        }
        if !report.generated_scripts.is_empty() {
            println!("  Batch files: {}", report.generated_scripts.len());
        }
        self.print_duration();
        print_rule();
    }

    pub fn finish_refinement(&self, stats: &RefinementStats) {
        print_rule();
        println!("Summary:");
        println!("  Total:      {}", stats.total_files);
        println!("  Valid:      {}", stats.valid_files);
        println!("  Fixed:      {}", stats.fixed_files);
        println!("  Failed:     {}", stats.failed_files);
        println!("  Iterations: {}", stats.iterations);
        self.print_duration();
        for failure in &stats.errors {
            println!("  ✗ {}: {}", failure.file, failure.error);
        }
        print_rule();
    }

    fn print_duration(&self) {
        println!("  Duration:   {:.2}s", self.start_time.elapsed().as_secs_f64());
    }
}

fn print_rule() {
    println!("{}", "=".repeat(60));
}
