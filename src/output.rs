use crate::error::EvalError;
use crate::models::{EvaluationReport, Metric, Payload, ResultRow, ScoredRow};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Json,
    Plain,
}

/// Reshape an evaluation report into the output payload
///
/// Every row must carry all four metrics as finite numbers and the report
/// must hold exactly one row per input record.
pub fn format_payload(report: &EvaluationReport, expected_rows: usize) -> Result<Payload, EvalError> {
    if report.rows.len() != expected_rows {
        return Err(EvalError::ResultShape(format!(
            "expected {} rows, received {}",
            expected_rows,
            report.rows.len()
        )));
    }

    if !report.score.is_finite() {
        return Err(EvalError::ResultShape(format!(
            "overall score is not a finite number: {}",
            report.score
        )));
    }

    let rows = report
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| format_row(index, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Payload {
        overall: report.score,
        rows,
    })
}

fn format_row(index: usize, row: &ScoredRow) -> Result<ResultRow, EvalError> {
    let metric = |metric: Metric| -> Result<f64, EvalError> {
        match row.scores.get(metric.name()) {
            Some(value) if value.is_finite() => Ok(*value),
            Some(value) => Err(EvalError::ResultShape(format!(
                "row {} has non-finite {}: {}",
                index, metric, value
            ))),
            None => Err(EvalError::ResultShape(format!(
                "row {} is missing {}",
                index, metric
            ))),
        }
    };

    Ok(ResultRow {
        question: row.question.clone(),
        answer_correctness: metric(Metric::AnswerCorrectness)?,
        faithfulness: metric(Metric::Faithfulness)?,
        context_precision: metric(Metric::ContextPrecision)?,
        context_recall: metric(Metric::ContextRecall)?,
        latency_ms: row.latency_ms.unwrap_or(0.0),
    })
}

/// Print the payload to stdout in the specified format
pub fn print_payload(payload: &Payload, format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_payload(&mut out, payload, format)?;
    out.flush().context("Failed to flush stdout")
}

/// Write the payload in the specified format
pub fn write_payload<W: Write>(out: &mut W, payload: &Payload, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(out, payload),
        OutputFormat::Plain => write_plain(out, payload),
    }
}

/// Write the payload as a single JSON line
fn write_json<W: Write>(out: &mut W, payload: &Payload) -> Result<()> {
    let json = serde_json::to_string(payload).context("Failed to serialize payload to JSON")?;
    writeln!(out, "{}", json).context("Failed to write payload")
}

/// Write the payload as a human-readable table
fn write_plain<W: Write>(out: &mut W, payload: &Payload) -> Result<()> {
    writeln!(out, "Overall score: {:.3}", payload.overall)?;
    writeln!(out)?;

    if payload.rows.is_empty() {
        writeln!(out, "No samples evaluated.")?;
        return Ok(());
    }

    writeln!(out, "{:<20} {:<8}", "Metric", "Mean")?;
    writeln!(out, "{}", "-".repeat(29))?;
    for (name, mean) in metric_means(&payload.rows) {
        writeln!(out, "{:<20} {:<8.3}", name, mean)?;
    }
    writeln!(out)?;

    for (i, row) in payload.rows.iter().enumerate() {
        writeln!(out, "Sample #{}", i + 1)?;
        writeln!(out, "Question: {}", row.question)?;
        for metric in OUTPUT_METRICS {
            writeln!(out, "  • {}: {:.3}", metric, row.score(metric))?;
        }
        writeln!(out, "  • latency_ms: {:.1}", row.latency_ms)?;
        writeln!(out)?;
    }

    Ok(())
}

/// Metrics in output field order
const OUTPUT_METRICS: [Metric; 4] = [
    Metric::AnswerCorrectness,
    Metric::Faithfulness,
    Metric::ContextPrecision,
    Metric::ContextRecall,
];

/// Mean of each metric across rows, in output field order
fn metric_means(rows: &[ResultRow]) -> Vec<(Metric, f64)> {
    OUTPUT_METRICS
        .into_iter()
        .map(|metric| {
            let sum: f64 = rows.iter().map(|row| row.score(metric)).sum();
            (metric, sum / rows.len() as f64)
        })
        .collect()
}

/// Store the payload as pretty-printed JSON
pub fn store_payload(payload: &Payload, path: &Path) -> Result<()> {
    let json_content =
        serde_json::to_string_pretty(payload).context("Failed to serialize payload to JSON")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, json_content)
        .with_context(|| format!("Failed to write results to: {}", path.display()))?;

    tracing::info!("Results stored to: {}", path.display());
    Ok(())
}
