use crate::structs::{CryoError, Evaluation, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// Scores every row of a dataset in parallel.
///
/// `featurizer` maps a row to model input and `model` maps that input to an
/// output. Results keep the input order.
pub struct Evaluator<'a, T, Feat, Model> {
    dataset: &'a [T],
    model: Model,
    featurizer: Feat,
    workers: Option<usize>,
}

impl<'a, T, Feat, Model> Evaluator<'a, T, Feat, Model> {
    pub const fn new(dataset: &'a [T], model: Model, featurizer: Feat) -> Self {
        Self {
            dataset,
            model,
            featurizer,
            workers: None,
        }
    }

    /// Run on a dedicated pool of `n` threads instead of the global one
    #[must_use]
    pub const fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// # Errors
    /// Returns `Ml` if the dedicated thread pool cannot be built
    pub fn evaluate<X, O>(&self) -> Result<Vec<Evaluation<O, T>>>
    where
        T: Clone + Send + Sync,
        X: Send,
        O: Send,
        Feat: Fn(&T) -> X + Sync,
        Model: Fn(X) -> O + Sync,
    {
        let run = || {
            self.dataset
                .par_iter()
                .map(|row| Evaluation {
                    key: (self.model)((self.featurizer)(row)),
                    value: row.clone(),
                })
                .collect::<Vec<_>>()
        };

        match self.workers {
            Some(n) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| CryoError::Ml(format!("Failed to build thread pool: {e}")))?;
                Ok(pool.install(run))
            }
            None => Ok(run()),
        }
    }
}
