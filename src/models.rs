use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One evaluation case read from the input dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Question put to the RAG pipeline
    #[serde(alias = "user_input")]
    pub question: String,
    /// Answer the pipeline generated
    #[serde(alias = "response")]
    pub answer: String,
    /// Passages the pipeline retrieved
    #[serde(alias = "retrieved_contexts")]
    pub contexts: Vec<String>,
    /// Expected answer, needed by answer correctness and context recall
    #[serde(default, alias = "reference")]
    pub ground_truth: Option<String>,
    /// Latency the pipeline measured for this sample
    #[serde(default)]
    pub latency_ms: Option<f64>,
}

/// Ordered, read-only collection of input records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<InputRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<InputRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputRecord> {
        self.records().iter()
    }

    pub fn records(&self) -> &[InputRecord] {
        &self.records
    }

    /// Indices of records without a ground truth
    pub fn missing_ground_truth(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.ground_truth.is_none())
            .map(|(index, _)| index)
            .collect()
    }
}

/// Metrics the evaluation engine can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Faithfulness,
    AnswerCorrectness,
    ContextPrecision,
    ContextRecall,
}

impl Metric {
    /// The fixed metric list every run evaluates
    pub const ALL: [Metric; 4] = [
        Metric::Faithfulness,
        Metric::AnswerCorrectness,
        Metric::ContextPrecision,
        Metric::ContextRecall,
    ];

    /// Name used as the score key and output field
    pub fn name(self) -> &'static str {
        match self {
            Metric::Faithfulness => "faithfulness",
            Metric::AnswerCorrectness => "answer_correctness",
            Metric::ContextPrecision => "context_precision",
            Metric::ContextRecall => "context_recall",
        }
    }

    pub fn requires_ground_truth(self) -> bool {
        matches!(self, Metric::AnswerCorrectness | Metric::ContextRecall)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Scores the engine produced for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRow {
    pub question: String,
    /// Scores keyed by metric name
    pub scores: HashMap<String, f64>,
    pub latency_ms: Option<f64>,
}

/// Everything the engine returns for one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Overall score across metrics and records
    pub score: f64,
    /// Per-record scores, in dataset order
    pub rows: Vec<ScoredRow>,
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub question: String,
    pub answer_correctness: f64,
    pub faithfulness: f64,
    pub context_precision: f64,
    pub context_recall: f64,
    pub latency_ms: f64,
}

impl ResultRow {
    /// Value of one metric in this row
    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Faithfulness => self.faithfulness,
            Metric::AnswerCorrectness => self.answer_correctness,
            Metric::ContextPrecision => self.context_precision,
            Metric::ContextRecall => self.context_recall,
        }
    }
}

/// Final output object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub overall: f64,
    pub rows: Vec<ResultRow>,
}
