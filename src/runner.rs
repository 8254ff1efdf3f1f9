use crate::config::{Config, Credentials};
use crate::error::EvalError;
use crate::evaluation::{Evaluate, RagasEvaluator};
use crate::llm::OpenAiJudge;
use crate::models::{Dataset, Metric, Payload};
use crate::output;
use std::path::PathBuf;

/// Main runner that orchestrates one evaluation pass
pub struct Runner<E> {
    evaluator: E,
    storage_path: Option<PathBuf>,
}

impl Runner<RagasEvaluator<OpenAiJudge>> {
    /// Build the runner that scores with the configured remote judge
    ///
    /// Credentials resolve before any client exists, so a missing key fails
    /// without touching the network.
    pub fn from_env(config: &Config) -> Result<Self, EvalError> {
        let credentials = Credentials::from_env(config)?;

        let judge = OpenAiJudge::new(config, &credentials)
            .map_err(|e| EvalError::Config(format!("{:#}", e)))?;
        let evaluator = RagasEvaluator::new(judge)
            .with_answer_correctness_weights(config.answer_correctness_weights);

        Ok(Runner::new(evaluator).with_storage_path(config.storage_path.clone()))
    }
}

impl<E: Evaluate> Runner<E> {
    /// Create a new runner around an evaluation engine
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            storage_path: None,
        }
    }

    /// Also store the payload at `path` after a successful run
    pub fn with_storage_path(mut self, path: Option<PathBuf>) -> Self {
        self.storage_path = path;
        self
    }

    /// Evaluate the dataset on the fixed metric list and build the payload
    pub async fn run(&self, dataset: &Dataset) -> Result<Payload, EvalError> {
        tracing::info!(
            records = dataset.len(),
            metrics = ?Metric::ALL.map(Metric::name),
            "Running evaluation"
        );

        let report = self
            .evaluator
            .evaluate(dataset, &Metric::ALL)
            .await
            .map_err(EvalError::Delegate)?;

        let payload = output::format_payload(&report, dataset.len())?;

        self.store_if_configured(&payload)?;

        Ok(payload)
    }

    /// Store the payload if a storage path is configured
    fn store_if_configured(&self, payload: &Payload) -> Result<(), EvalError> {
        match &self.storage_path {
            Some(path) => output::store_payload(payload, path).map_err(EvalError::Output),
            None => Ok(()),
        }
    }
}
