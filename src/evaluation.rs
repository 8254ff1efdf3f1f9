use crate::llm::{JudgeModel, parse_judge_json};
use crate::models::{Dataset, EvaluationReport, InputRecord, Metric, ScoredRow};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Engine that scores a dataset on a list of metrics
pub trait Evaluate {
    async fn evaluate(&self, dataset: &Dataset, metrics: &[Metric]) -> Result<EvaluationReport>;
}

/// LLM-as-judge engine computing RAGAS-style metrics
pub struct RagasEvaluator<M> {
    model: M,
    /// Weights of factuality and semantic similarity in answer correctness
    answer_correctness_weights: [f64; 2],
}

impl<M: JudgeModel> RagasEvaluator<M> {
    /// Create an evaluator around a judge model
    pub fn new(model: M) -> Self {
        Self {
            model,
            answer_correctness_weights: [0.75, 0.25],
        }
    }

    pub fn with_answer_correctness_weights(mut self, weights: [f64; 2]) -> Self {
        self.answer_correctness_weights = weights;
        self
    }

    /// Fail before any model call if a metric needs a column the dataset lacks
    fn check_required_columns(dataset: &Dataset, metrics: &[Metric]) -> Result<()> {
        let needs_ground_truth: Vec<&str> = metrics
            .iter()
            .filter(|metric| metric.requires_ground_truth())
            .map(|metric| metric.name())
            .collect();

        if needs_ground_truth.is_empty() {
            return Ok(());
        }

        let missing = dataset.missing_ground_truth();
        if !missing.is_empty() {
            anyhow::bail!(
                "records {:?} have no ground_truth, required by {}",
                missing,
                needs_ground_truth.join(", ")
            );
        }

        Ok(())
    }

    /// Score every requested metric for one record
    async fn score_record(
        &self,
        record: &InputRecord,
        metrics: &[Metric],
    ) -> Result<HashMap<String, f64>> {
        let mut scores = HashMap::new();

        for &metric in metrics {
            let score = self
                .score_metric(metric, record)
                .await
                .with_context(|| format!("Failed to compute {}", metric))?;
            scores.insert(metric.name().to_string(), score.clamp(0.0, 1.0));
        }

        Ok(scores)
    }

    async fn score_metric(&self, metric: Metric, record: &InputRecord) -> Result<f64> {
        match metric {
            Metric::Faithfulness => self.faithfulness(record).await,
            Metric::AnswerCorrectness => self.answer_correctness(record).await,
            Metric::ContextPrecision => self.context_precision(record).await,
            Metric::ContextRecall => self.context_recall(record).await,
        }
    }

    /// Send a prompt and parse the reply as JSON
    async fn ask(&self, prompt: String) -> Result<Value> {
        let reply = self.model.complete(&prompt).await?;
        parse_judge_json(&reply).with_context(|| format!("Unusable judge reply: {}", reply))
    }

    /// Share of answer statements supported by the contexts
    async fn faithfulness(&self, record: &InputRecord) -> Result<f64> {
        let parsed = self
            .ask(faithfulness_prompt(
                &record.question,
                &record.answer,
                &record.contexts,
            ))
            .await?;

        let verdicts = collect_verdicts(&parsed, "statements", "verdict")?;
        if verdicts.is_empty() {
            tracing::warn!(question = %record.question, "No statements extracted from answer");
        }

        Ok(ratio(&verdicts))
    }

    /// Weighted factuality F1 and semantic similarity against the ground truth
    async fn answer_correctness(&self, record: &InputRecord) -> Result<f64> {
        let ground_truth = record.ground_truth.as_deref().context("Missing ground_truth")?;
        let [factuality_weight, similarity_weight] = self.answer_correctness_weights;

        let parsed = self
            .ask(answer_correctness_prompt(
                &record.question,
                &record.answer,
                ground_truth,
            ))
            .await?;

        let tp = count_statements(&parsed, "TP")?;
        let fp = count_statements(&parsed, "FP")?;
        let fn_ = count_statements(&parsed, "FN")?;
        let factuality = f1_score(tp, fp, fn_);

        let similarity = if similarity_weight > 0.0 {
            self.semantic_similarity(&record.answer, ground_truth).await?
        } else {
            0.0
        };

        Ok((factuality_weight * factuality + similarity_weight * similarity)
            / (factuality_weight + similarity_weight))
    }

    /// Cosine similarity of the answer and ground truth embeddings
    async fn semantic_similarity(&self, answer: &str, ground_truth: &str) -> Result<f64> {
        let vectors = self
            .model
            .embed(&[answer.to_string(), ground_truth.to_string()])
            .await?;

        match vectors.as_slice() {
            [a, b] => Ok(cosine_similarity(a, b).clamp(0.0, 1.0)),
            _ => anyhow::bail!("Expected 2 embeddings, received {}", vectors.len()),
        }
    }

    /// Average precision of the useful chunks in retrieval order
    async fn context_precision(&self, record: &InputRecord) -> Result<f64> {
        let reference = record.ground_truth.as_deref().unwrap_or(&record.answer);
        let mut verdicts = Vec::with_capacity(record.contexts.len());

        for context in &record.contexts {
            let parsed = self
                .ask(context_precision_prompt(&record.question, context, reference))
                .await?;
            verdicts.push(parse_verdict(&parsed["verdict"]).context("Missing verdict")?);
        }

        Ok(average_precision(&verdicts))
    }

    /// Share of ground truth sentences attributable to the contexts
    async fn context_recall(&self, record: &InputRecord) -> Result<f64> {
        let ground_truth = record.ground_truth.as_deref().context("Missing ground_truth")?;

        let parsed = self
            .ask(context_recall_prompt(
                &record.question,
                &record.contexts,
                ground_truth,
            ))
            .await?;

        let verdicts = collect_verdicts(&parsed, "classifications", "attributed")?;
        Ok(ratio(&verdicts))
    }
}

impl<M: JudgeModel> Evaluate for RagasEvaluator<M> {
    async fn evaluate(&self, dataset: &Dataset, metrics: &[Metric]) -> Result<EvaluationReport> {
        Self::check_required_columns(dataset, metrics)?;

        if dataset.is_empty() {
            tracing::warn!("Dataset is empty, nothing to evaluate");
        }

        let total = dataset.len();
        let mut rows = Vec::with_capacity(total);

        for (index, record) in dataset.iter().enumerate() {
            tracing::info!("Evaluating record {}/{}", index + 1, total);

            let scores = self
                .score_record(record, metrics)
                .await
                .with_context(|| format!("Failed to evaluate record {}: {}", index + 1, record.question))?;

            rows.push(ScoredRow {
                question: record.question.clone(),
                scores,
                latency_ms: record.latency_ms,
            });
        }

        let score = overall_score(&rows, metrics);
        tracing::info!(score, "Evaluation finished");

        Ok(EvaluationReport { score, rows })
    }
}

fn format_contexts(contexts: &[String]) -> String {
    if contexts.is_empty() {
        return "(none)".to_string();
    }

    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n")
}

fn faithfulness_prompt(question: &str, answer: &str, contexts: &[String]) -> String {
    format!(
        r#"Break the answer into standalone factual statements, then judge each statement against the context.
Use verdict 1 if the statement can be directly inferred from the context, otherwise 0.

QUESTION:
{question}

ANSWER:
{answer}

CONTEXT:
{context}

Respond in JSON:
{{"statements": [{{"statement": "...", "reason": "...", "verdict": 0 or 1}}]}}"#,
        question = question,
        answer = answer,
        context = format_contexts(contexts),
    )
}

fn answer_correctness_prompt(question: &str, answer: &str, ground_truth: &str) -> String {
    format!(
        r#"Compare the answer with the ground truth. Break both into statements and classify them:
TP: statements in the answer supported by the ground truth
FP: statements in the answer not supported by the ground truth
FN: statements in the ground truth missing from the answer
Each statement belongs to exactly one list.

QUESTION:
{question}

ANSWER:
{answer}

GROUND TRUTH:
{ground_truth}

Respond in JSON:
{{"TP": [{{"statement": "...", "reason": "..."}}], "FP": [...], "FN": [...]}}"#,
        question = question,
        answer = answer,
        ground_truth = ground_truth,
    )
}

fn context_precision_prompt(question: &str, context: &str, reference: &str) -> String {
    format!(
        r#"Decide whether the context was useful in arriving at the given answer.
Use verdict 1 if it was useful, otherwise 0.

QUESTION:
{question}

CONTEXT:
{context}

ANSWER:
{reference}

Respond in JSON:
{{"reason": "...", "verdict": 0 or 1}}"#,
        question = question,
        context = context,
        reference = reference,
    )
}

fn context_recall_prompt(question: &str, contexts: &[String], ground_truth: &str) -> String {
    format!(
        r#"Split the ground truth into sentences and decide for each whether it can be attributed to the context.
Use attributed 1 if it can, otherwise 0.

QUESTION:
{question}

CONTEXT:
{context}

GROUND TRUTH:
{ground_truth}

Respond in JSON:
{{"classifications": [{{"statement": "...", "reason": "...", "attributed": 0 or 1}}]}}"#,
        question = question,
        context = format_contexts(contexts),
        ground_truth = ground_truth,
    )
}

/// Interpret a 0/1 verdict, also accepting booleans and numeric strings
fn parse_verdict(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v >= 0.5),
        Value::String(s) => match s.trim() {
            "1" | "yes" | "true" => Some(true),
            "0" | "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read the verdicts of every item in `parsed[list_key]`
fn collect_verdicts(parsed: &Value, list_key: &str, verdict_key: &str) -> Result<Vec<bool>> {
    let items = parsed
        .get(list_key)
        .and_then(Value::as_array)
        .with_context(|| format!("Judge reply has no '{}' list", list_key))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.get(verdict_key)
                .and_then(parse_verdict)
                .with_context(|| format!("Item {} of '{}' has no valid '{}'", i, list_key, verdict_key))
        })
        .collect()
}

/// Length of `parsed[key]`, treating a missing list as empty
fn count_statements(parsed: &Value, key: &str) -> Result<usize> {
    match parsed.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Array(items)) => Ok(items.len()),
        Some(_) => anyhow::bail!("Judge reply field '{}' is not a list", key),
    }
}

fn ratio(verdicts: &[bool]) -> f64 {
    if verdicts.is_empty() {
        return 0.0;
    }

    verdicts.iter().filter(|&&v| v).count() as f64 / verdicts.len() as f64
}

fn f1_score(tp: usize, fp: usize, fn_: usize) -> f64 {
    let denominator = tp as f64 + 0.5 * (fp + fn_) as f64;
    if denominator == 0.0 {
        return 0.0;
    }

    tp as f64 / denominator
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Mean of precision@k over the positions k holding a useful chunk
fn average_precision(verdicts: &[bool]) -> f64 {
    let mut useful = 0usize;
    let mut numerator = 0.0;

    for (k, &verdict) in verdicts.iter().enumerate() {
        if verdict {
            useful += 1;
            numerator += useful as f64 / (k + 1) as f64;
        }
    }

    if useful == 0 {
        return 0.0;
    }

    numerator / useful as f64
}

/// Harmonic mean of the per-metric means
fn overall_score(rows: &[ScoredRow], metrics: &[Metric]) -> f64 {
    if rows.is_empty() || metrics.is_empty() {
        return 0.0;
    }

    let mut reciprocal_sum = 0.0;
    for metric in metrics {
        let sum: f64 = rows
            .iter()
            .filter_map(|row| row.scores.get(metric.name()))
            .sum();
        let mean = sum / rows.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        reciprocal_sum += 1.0 / mean;
    }

    metrics.len() as f64 / reciprocal_sum
}
