use crate::convert::{StoreState, probe};
use crate::error::Result;
use crate::partition::PartitionKey;
use crate::paths::PathResolver;
use chrono::NaiveDate;
use colored::{Color, Colorize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Absent,
    Partial {
        written: usize,
        expected: usize,
        last_day: Option<NaiveDate>,
    },
    Complete {
        written: usize,
        expected: usize,
    },
}

/// Conversion progress of one partition's store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionProgress {
    pub key: PartitionKey,
    pub store_path: PathBuf,
    pub progress: Progress,
}

/// Probe every partition's store without writing anything
pub fn collect(resolver: &PathResolver, partitions: &[PartitionKey]) -> Result<Vec<PartitionProgress>> {
    partitions
        .iter()
        .map(|key| -> Result<PartitionProgress> {
            let store_path = resolver.store_path(key.season, &key.state, &key.region);
            let expected = key.season.len_days() as usize;
            let progress = match probe(&store_path, key.season)? {
                StoreState::Absent => Progress::Absent,
                StoreState::Complete(store) => Progress::Complete {
                    written: store.times().len(),
                    expected,
                },
                StoreState::Partial { store, .. } => Progress::Partial {
                    written: store.times().len(),
                    expected,
                    last_day: store.last_day(),
                },
            };
            Ok(PartitionProgress {
                key: key.clone(),
                store_path,
                progress,
            })
        })
        .collect()
}

/// Plain-text progress table with optional color
pub struct StatusFormatter {
    use_color: bool,
}

impl StatusFormatter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    pub fn format_line(&self, entry: &PartitionProgress) -> String {
        let key = &entry.key;
        let label = format!("{} {} {}", key.season, key.state, key.region);
        let state = match &entry.progress {
            Progress::Absent => self.paint("absent", Color::BrightBlack),
            Progress::Partial {
                written,
                expected,
                last_day,
            } => {
                let last = last_day
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "{} {}/{} days (last {})",
                    self.paint("partial", Color::Yellow),
                    written,
                    expected,
                    last
                )
            }
            Progress::Complete { written, expected } => format!(
                "{} {}/{} days",
                self.paint("complete", Color::Green),
                written,
                expected
            ),
        };
        format!("{}: {}", self.paint(&label, Color::Cyan), state)
    }

    pub fn print(&self, entries: &[PartitionProgress]) {
        for entry in entries {
            println!("{}", self.format_line(entry));
        }

        let complete = entries
            .iter()
            .filter(|e| matches!(e.progress, Progress::Complete { .. }))
            .count();
        let absent = entries
            .iter()
            .filter(|e| matches!(e.progress, Progress::Absent))
            .count();
        println!(
            "Summary: {} partitions, {} complete, {} partial, {} absent",
            entries.len(),
            complete,
            entries.len() - complete - absent,
            absent
        );
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.use_color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }
}
