use crate::domain::model::BatchSummary;
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct BatchRun {
    pub output_path: String,
    pub summary: BatchSummary,
}

/// Drives a pipeline through extract, transform and load.
pub struct BatchEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> BatchEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<BatchRun> {
        let started = Instant::now();
        tracing::info!("Starting batch run");

        let observations = self.pipeline.extract().await?;
        tracing::info!(records = observations.len(), "Extracted observations");

        let result = self.pipeline.transform(observations).await?;
        let summary = result.summary.clone();
        tracing::info!(
            total = summary.total,
            converged = summary.converged,
            unconverged = summary.unconverged,
            failed = summary.failed,
            worst_fval = summary.worst_fval,
            "Solved observations"
        );

        let output_path = self.pipeline.load(result).await?;
        tracing::info!(
            output = %output_path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch run finished"
        );

        Ok(BatchRun { output_path, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BatchResult, Observation};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPipeline {
        stages: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<Vec<Observation>> {
            self.stages.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Observation {
                id: "a".to_string(),
                labor: vec![1.0],
            }])
        }

        async fn transform(&self, data: Vec<Observation>) -> Result<BatchResult> {
            self.stages.fetch_add(1, Ordering::SeqCst);
            Ok(BatchResult {
                results: Vec::new(),
                csv_output: String::new(),
                summary: BatchSummary {
                    total: data.len(),
                    failed: data.len(),
                    ..BatchSummary::default()
                },
            })
        }

        async fn load(&self, _result: BatchResult) -> Result<String> {
            self.stages.fetch_add(1, Ordering::SeqCst);
            Ok("out/results.csv".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_visits_every_stage() {
        let engine = BatchEngine::new(CountingPipeline {
            stages: AtomicUsize::new(0),
        });
        let run = engine.run().await.unwrap();
        assert_eq!(run.output_path, "out/results.csv");
        assert_eq!(run.summary.total, 1);
        assert_eq!(run.summary.failed, 1);
        assert_eq!(engine.pipeline.stages.load(Ordering::SeqCst), 3);
    }
}
