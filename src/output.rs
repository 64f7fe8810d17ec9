use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    DiscoverResult, IngestResult, ProgressEvent, ProgressLevel, ProgressSink, RunResult,
};
use crate::clinical::JoinResult;
use crate::sync::SyncResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Line-oriented progress for terminal runs.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let suffix = event
            .elapsed
            .map(|elapsed| format!(" ({} ms)", elapsed.as_millis()))
            .unwrap_or_default();
        match event.level {
            ProgressLevel::Info => println!("{}{suffix}", event.message),
            ProgressLevel::Error => eprintln!("\x1b[31m{}\x1b[0m{suffix}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_discover(result: &DiscoverResult) {
        println!("\x1b[36mDiscovered cohorts: {}\x1b[0m", result.cohorts.len());
        for cohort in &result.cohorts {
            println!("  {} -> {}", cohort.cohort_name, cohort.download_url);
        }
    }

    pub fn print_ingest(result: &IngestResult) {
        let failed = result
            .cohorts
            .iter()
            .filter(|item| item.error.is_some())
            .count();
        println!(
            "\x1b[32mIngested cohorts: {}\x1b[0m",
            result.cohorts.len() - failed
        );
        println!("\x1b[33mSkipped cohorts: {failed}\x1b[0m");
        println!("Total processed records: {}", result.total_records);
    }

    pub fn print_sync(result: &SyncResult) {
        println!(
            "\x1b[32mLoaded {} documents from {} objects in {}\x1b[0m",
            result.inserted,
            result.objects.len(),
            result.bucket
        );
    }

    pub fn print_join(result: &JoinResult) {
        println!(
            "\x1b[32mCombined records: {} of {} clinical records\x1b[0m",
            result.inserted, result.clinical_records
        );
        println!("Data insertion process completed.");
    }

    pub fn print_run(result: &RunResult) {
        Self::print_discover(&result.discover);
        Self::print_ingest(&result.ingest);
        Self::print_sync(&result.sync);
        Self::print_join(&result.join);
    }
}
