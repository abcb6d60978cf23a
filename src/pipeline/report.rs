use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// An item a stage gave up on, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub item: String,
    pub reason: String,
}

/// Outcome of a stage that processes items independently.
///
/// Per-item failures never abort the stage; they are collected here next to
/// the successful results so callers can report both.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub items: Vec<T>,
    pub skipped: Vec<Skipped>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn skip(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(Skipped {
            item: item.into(),
            reason: reason.into(),
        });
    }

    /// Folds one item outcome into the report.
    pub fn record(&mut self, outcome: Result<T, Skipped>) {
        match outcome {
            Ok(item) => self.items.push(item),
            Err(skipped) => self.skipped.push(skipped),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items.len()
    }

    pub fn attempted(&self) -> usize {
        self.items.len() + self.skipped.len()
    }
}

impl<T> FromIterator<Result<T, Skipped>> for BatchReport<T> {
    fn from_iter<I: IntoIterator<Item = Result<T, Skipped>>>(iter: I) -> Self {
        let mut report = BatchReport::new();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

/// Counts collected over one pipeline invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub articles_considered: usize,
    pub embedded: usize,
    pub embed_skipped: usize,
    pub clustered: usize,
    pub clusters: usize,
    pub noise: usize,
    pub silhouette: Option<f64>,
    pub issues_created: usize,
    pub synth_skipped: usize,
    pub articles_reconciled: u64,
    pub articles_to_reconcile: u64,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Run summary".bold())?;
        writeln!(
            f,
            "  embedded:   {}/{} articles ({} skipped)",
            self.embedded, self.articles_considered, self.embed_skipped
        )?;
        writeln!(
            f,
            "  grouped:    {} articles into {} clusters, {} noise",
            self.clustered, self.clusters, self.noise
        )?;
        if let Some(score) = self.silhouette {
            writeln!(f, "  silhouette: {:.4}", score)?;
        }
        writeln!(
            f,
            "  issues:     {} created ({} clusters skipped)",
            self.issues_created, self.synth_skipped
        )?;
        writeln!(
            f,
            "  reconciled: {}/{} articles",
            self.articles_reconciled, self.articles_to_reconcile
        )?;
        write!(f, "  elapsed:    {:.2}s", self.elapsed.as_secs_f64())
    }
}
