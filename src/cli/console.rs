use std::collections::HashMap;
use std::io::Write;
use tracing::{error, info, warn};
use tubegrab::media::{
    DownloadOutcome, NoticeLevel, Notification, ProgressAggregator, ProgressEvent,
};

/// Messages workers send to the console. Workers never print themselves.
#[derive(Debug)]
pub enum AppEvent {
    Started {
        job: usize,
        url: String,
        title: Option<String>,
        format: String,
    },
    Progress(usize, ProgressEvent),
    Notice(usize, Notification),
    Finished {
        job: usize,
        result: Result<DownloadOutcome, String>,
    },
}

/// Owns all display state. Each running job gets its own aggregator, dropped
/// once the job reports back whatever the outcome.
#[derive(Default)]
pub struct Console {
    jobs: HashMap<usize, ProgressAggregator>,
    succeeded: usize,
    failed: usize,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::Started {
                job,
                url,
                title,
                format,
            } => {
                self.jobs.insert(job, ProgressAggregator::new());
                info!(
                    job,
                    "🚀 Starting download of {} ({}) with format {}",
                    title.as_deref().unwrap_or("untitled"),
                    url,
                    format
                );
            }
            AppEvent::Progress(job, event) => {
                let aggregator = self.jobs.entry(job).or_default();
                let notice = aggregator.apply(&event);
                render_status(job, aggregator);
                if let Some(notice) = notice {
                    end_status_line();
                    log_notice(job, &notice);
                }
            }
            AppEvent::Notice(job, notice) => log_notice(job, &notice),
            AppEvent::Finished { job, result } => {
                self.jobs.remove(&job);
                end_status_line();
                match result {
                    Ok(outcome) => {
                        self.succeeded += 1;
                        match outcome.file_path {
                            Some(path) => info!(
                                job,
                                status = "success",
                                "✅ Download completed: {}",
                                path.display()
                            ),
                            None => info!(job, status = "success", "✅ Download completed"),
                        }
                    }
                    Err(message) => {
                        self.failed += 1;
                        error!(job, "❌ {}", message);
                    }
                }
            }
        }
    }
}

pub fn log_notice(job: usize, notice: &Notification) {
    match notice.level {
        NoticeLevel::Info => info!(job, "{}", notice.message),
        NoticeLevel::Success => info!(job, status = "success", "{}", notice.message),
        NoticeLevel::Warning => warn!(job, "{}", notice.message),
        NoticeLevel::Error => error!(job, "{}", notice.message),
    }
}

fn render_status(job: usize, aggregator: &ProgressAggregator) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(
        stdout,
        "\r[{}] {:>5.1}%  {:>12}  ETA {}  {}   ",
        job + 1,
        aggregator.percent(),
        aggregator.speed_label(),
        aggregator.eta_label(),
        aggregator.byte_label()
    );
    let _ = stdout.flush();
}

fn end_status_line() {
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tubegrab::media::ProgressSample;

    fn progress(job: usize, downloaded: u64) -> AppEvent {
        AppEvent::Progress(
            job,
            ProgressEvent::Downloading(ProgressSample {
                downloaded_bytes: downloaded,
                total_bytes: Some(100),
                speed: Some(2048.0),
                eta_seconds: Some(1),
                target_path: "a.mp4".to_string(),
            }),
        )
    }

    fn started(job: usize) -> AppEvent {
        AppEvent::Started {
            job,
            url: "https://youtu.be/abc".to_string(),
            title: None,
            format: "best".to_string(),
        }
    }

    #[test]
    fn test_jobs_have_independent_aggregators() {
        let mut console = Console::new();
        console.handle(started(0));
        console.handle(started(1));

        console.handle(progress(0, 70));
        console.handle(progress(1, 20));

        assert_eq!(console.jobs[&0].percent(), 70.0);
        assert_eq!(console.jobs[&1].percent(), 20.0);
    }

    #[test]
    fn test_finished_clears_state_and_counts() {
        let mut console = Console::new();
        console.handle(started(0));
        console.handle(started(1));
        console.handle(progress(0, 50));

        console.handle(AppEvent::Finished {
            job: 0,
            result: Ok(DownloadOutcome {
                file_path: Some(PathBuf::from("/tmp/a.mp4")),
            }),
        });
        console.handle(AppEvent::Finished {
            job: 1,
            result: Err("download failed: boom".to_string()),
        });

        assert!(console.jobs.is_empty());
        assert_eq!(console.succeeded(), 1);
        assert_eq!(console.failed(), 1);
    }
}
