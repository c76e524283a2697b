use crate::config::toml_config::{BatchConfig, TomlConfig};
use crate::core::demand::marg_prod_labor_at;
use crate::core::elasticity::elasticities_at;
use crate::core::production::EngineOptions;
use crate::core::solver::solve_thresholds;
use crate::domain::model::{BatchResult, BatchSummary, Observation, ObservationResult};
use crate::domain::ports::{Pipeline, Storage, TaskModel};
use crate::utils::error::{ProductionError, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Reads observed labor inputs from CSV, solves each row on the blocking
/// pool and writes a results CSV plus a JSON summary.
pub struct CsvBatchPipeline<S: Storage> {
    storage: S,
    input: String,
    output_dir: String,
    model: Arc<dyn TaskModel>,
    options: Arc<EngineOptions>,
    batch: BatchConfig,
}

impl<S: Storage> CsvBatchPipeline<S> {
    pub fn new(storage: S, config: &TomlConfig, input: impl Into<String>, output_dir: impl Into<String>) -> Result<Self> {
        Ok(Self {
            storage,
            input: input.into(),
            output_dir: output_dir.into(),
            model: config.task_model()?,
            options: Arc::new(config.engine_options()),
            batch: config.batch.clone(),
        })
    }

    fn output_path(&self, file: &str) -> String {
        if self.output_dir.is_empty() {
            file.to_string()
        } else {
            format!("{}/{}", self.output_dir.trim_end_matches('/'), file)
        }
    }
}

fn parse_observations(data: &[u8], types: usize) -> Result<Vec<Observation>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    if headers.len() != types + 1 {
        return Err(ProductionError::invalid(
            "input.columns",
            headers.len(),
            format!("Expected an id column followed by {} labor columns", types),
        ));
    }

    let mut observations = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let id = record.get(0).unwrap_or_default().to_string();
        let labor = record
            .iter()
            .skip(1)
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    ProductionError::invalid(
                        &format!("input row {}", row + 1),
                        field,
                        "Labor input is not a number",
                    )
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        observations.push(Observation { id, labor });
    }
    Ok(observations)
}

/// Solves one observation. Failures are recorded on the result, never
/// raised, so one bad row does not sink the batch. A failed elasticity
/// computation keeps the solution and records the error.
pub fn solve_observation(
    model: &dyn TaskModel,
    options: &EngineOptions,
    observation: Observation,
    elasticities: bool,
) -> ObservationResult {
    let mut result = ObservationResult {
        id: observation.id,
        labor: observation.labor,
        solution: None,
        mpl: Vec::new(),
        elasticities: None,
        error: None,
    };

    let solved = solve_thresholds(model, &result.labor, &options.solver).and_then(|solution| {
        let mpl = marg_prod_labor_at(model, &result.labor, solution.q, &solution.thresholds)?;
        Ok((solution, mpl))
    });
    let (solution, mpl) = match solved {
        Ok(solved) => solved,
        Err(e) => {
            tracing::warn!(id = %result.id, error = %e, "observation failed");
            result.error = Some(e.to_string());
            return result;
        }
    };

    if elasticities {
        match elasticities_at(model, &result.labor, &solution, &mpl, &options.solver, &options.elasticity) {
            Ok(matrices) => result.elasticities = Some(matrices),
            Err(e) => {
                tracing::warn!(id = %result.id, error = %e, "elasticities failed");
                result.error = Some(e.to_string());
            }
        }
    }

    result.solution = Some(solution);
    result.mpl = mpl;
    result
}

fn summarize(results: &[ObservationResult]) -> BatchSummary {
    let mut summary = BatchSummary {
        total: results.len(),
        ..BatchSummary::default()
    };
    for result in results {
        match &result.solution {
            Some(solution) => {
                if solution.converged {
                    summary.converged += 1;
                } else {
                    summary.unconverged += 1;
                }
                summary.worst_fval = summary.worst_fval.max(solution.fval);
            }
            None => summary.failed += 1,
        }
    }
    summary
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn write_results_csv(results: &[ObservationResult], types: usize, elasticities: bool) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let pairs: Vec<(usize, usize)> = (0..types)
        .flat_map(|i| ((i + 1)..types).map(move |j| (i, j)))
        .collect();

    let mut header = vec![
        "id".to_string(),
        "q".to_string(),
        "fval".to_string(),
        "converged".to_string(),
        "attempts".to_string(),
    ];
    header.extend((1..types).map(|k| format!("x{}", k)));
    header.extend((1..=types).map(|k| format!("mpl{}", k)));
    if elasticities {
        header.extend(pairs.iter().map(|(i, j)| format!("allen_{}_{}", i + 1, j + 1)));
        header.extend(pairs.iter().map(|(i, j)| format!("hicks_{}_{}", i + 1, j + 1)));
    }
    header.push("error".to_string());
    writer.write_record(&header)?;

    for result in results {
        let mut row = vec![result.id.clone()];
        match &result.solution {
            Some(solution) => {
                row.push(solution.q.to_string());
                row.push(solution.fval.to_string());
                row.push(solution.converged.to_string());
                row.push(solution.attempts.to_string());
                row.extend(solution.thresholds.iter().map(|x| x.to_string()));
                row.extend(result.mpl.iter().map(|m| m.to_string()));
            }
            None => row.extend(std::iter::repeat(String::new()).take(4 + (types - 1) + types)),
        }
        if elasticities {
            match &result.elasticities {
                Some(m) => {
                    row.extend(pairs.iter().map(|&(i, j)| format_value(m.allen[(i, j)])));
                    row.extend(pairs.iter().map(|&(i, j)| format_value(m.hicks[(i, j)])));
                }
                None => row.extend(std::iter::repeat(String::new()).take(2 * pairs.len())),
            }
        }
        row.push(result.error.clone().unwrap_or_default());
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|e| ProductionError::ProcessingError {
        message: format!("Failed to flush CSV output: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| ProductionError::ProcessingError {
        message: format!("CSV output is not UTF-8: {}", e),
    })
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for CsvBatchPipeline<S> {
    async fn extract(&self) -> Result<Vec<Observation>> {
        tracing::debug!(input = %self.input, "reading observations");
        let data = self.storage.read_file(&self.input).await?;
        parse_observations(&data, self.model.type_count())
    }

    async fn transform(&self, data: Vec<Observation>) -> Result<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.batch.workers.max(1)));
        let mut handles = Vec::with_capacity(data.len());

        for observation in data {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| ProductionError::ProcessingError {
                    message: format!("Worker pool closed: {}", e),
                })?;
            let model = Arc::clone(&self.model);
            let options = Arc::clone(&self.options);
            let elasticities = self.batch.elasticities;

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                solve_observation(model.as_ref(), &options, observation, elasticities)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle.await.map_err(|e| ProductionError::ProcessingError {
                message: format!("Solver task panicked: {}", e),
            })?;
            results.push(result);
        }

        let summary = summarize(&results);
        let csv_output = write_results_csv(&results, self.model.type_count(), self.batch.elasticities)?;
        Ok(BatchResult {
            results,
            csv_output,
            summary,
        })
    }

    async fn load(&self, result: BatchResult) -> Result<String> {
        let results_path = self.output_path(&self.batch.results_file);
        let summary_path = self.output_path(&self.batch.summary_file);

        self.storage
            .write_file(&results_path, result.csv_output.as_bytes())
            .await?;

        let summary = serde_json::to_string_pretty(&result.summary)?;
        self.storage.write_file(&summary_path, summary.as_bytes()).await?;

        tracing::debug!(results = %results_path, summary = %summary_path, "batch output written");
        Ok(results_path)
    }
}
