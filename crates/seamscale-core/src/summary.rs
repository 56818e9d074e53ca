// crates/seamscale-core/src/summary.rs
//
// Batch summary shown to the operator once every item has finished.
// Informational messages are collected here instead of being interleaved with
// live progress output.

use std::fmt::Write as _;
use std::time::Duration;

use uuid::Uuid;

use crate::types::{ItemStatus, ProcessingResult};

#[derive(Clone, Debug)]
pub struct BatchSummary {
    pub job_id:  Uuid,
    pub results: Vec<ProcessingResult>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn new(job_id: Uuid, mut results: Vec<ProcessingResult>, elapsed: Duration) -> Self {
        results.sort_by_key(|r| r.index);
        Self { job_id, results, elapsed }
    }

    fn count(&self, status: ItemStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize { self.count(ItemStatus::Succeeded) }
    pub fn failed(&self) -> usize    { self.count(ItemStatus::Failed) }
    pub fn cancelled(&self) -> usize { self.count(ItemStatus::Cancelled) }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(ProcessingResult::is_success)
    }

    /// `(label, message)` pairs in origin order.
    pub fn messages(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter()
            .flat_map(|r| r.messages.iter().map(move |m| (r.label.as_str(), m.as_str())))
    }

    /// Multi-line human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} item(s) in {:.1}s: {} succeeded, {} failed, {} cancelled",
            self.results.len(), self.elapsed.as_secs_f64(),
            self.succeeded(), self.failed(), self.cancelled(),
        );
        for r in self.results.iter().filter(|r| r.status == ItemStatus::Failed) {
            let _ = writeln!(out, "  FAILED {}: {}", r.label, r.error.as_deref().unwrap_or("unknown error"));
        }
        for (label, msg) in self.messages() {
            let _ = writeln!(out, "  note {label}: {msg}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_render() {
        let results = vec![
            ProcessingResult::failed(1, "b.jpg", "liquid rescale exited with 1"),
            ProcessingResult::succeeded(0, "a.jpg", None).with_message("fell back to plain resize"),
            ProcessingResult::cancelled(2, "c.jpg"),
        ];
        let s = BatchSummary::new(Uuid::nil(), results, Duration::from_secs(3));

        assert_eq!((s.succeeded(), s.failed(), s.cancelled()), (1, 1, 1));
        assert!(!s.all_succeeded());
        assert_eq!(s.results[0].label, "a.jpg");

        let text = s.render();
        assert!(text.starts_with("3 item(s) in 3.0s: 1 succeeded, 1 failed, 1 cancelled"));
        assert!(text.contains("FAILED b.jpg: liquid rescale exited with 1"));
        assert!(text.contains("note a.jpg: fell back to plain resize"));
    }
}
