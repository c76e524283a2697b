use crate::domain::model::{BatchResult, Observation};
use crate::utils::error::Result;
use async_trait::async_trait;

/// A real-valued function of task complexity: a task density or a worker
/// type's efficiency schedule.
pub trait TaskFunction: Send + Sync {
    fn evaluate(&self, x: f64) -> f64;
}

impl<F> TaskFunction for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn evaluate(&self, x: f64) -> f64 {
        self(x)
    }
}

/// A task/productivity distribution with `H` worker types ordered by
/// comparative advantage. Types are zero-indexed.
pub trait TaskModel: Send + Sync {
    fn type_count(&self) -> usize;

    /// Task-space support `(lower, upper)`; either end may be infinite.
    fn support(&self) -> (f64, f64);

    /// Finite window the initial-guess heuristic partitions.
    fn task_window(&self) -> (f64, f64);

    /// Unit labor demand of type `h` over `[lo, hi]`. Callers clip the
    /// interval to the support and never pass an empty one.
    fn interval_demand(&self, h: usize, lo: f64, hi: f64) -> Result<f64>;

    /// Labor density `b_g(x) / (z e_h(x))` of type `h` at task `x`.
    fn labor_density(&self, h: usize, x: f64) -> f64;

    /// `e_{h+1}(x) / e_h(x)`: relative efficiency across the boundary
    /// between types `h` and `h + 1`.
    fn efficiency_ratio(&self, h: usize, x: f64) -> f64;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Observation>>;
    async fn transform(&self, data: Vec<Observation>) -> Result<BatchResult>;
    async fn load(&self, result: BatchResult) -> Result<String>;
}
