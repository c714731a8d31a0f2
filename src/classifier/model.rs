use std::fmt;

use log::{debug, info};
use ndarray::{Array, Array1, Array2, ArrayView2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::encoder::PADDING_ID;
use super::error::ClassifierError;
use super::utils::{softmax, softmax_rows};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;
const EMBEDDING_INIT_RANGE: f32 = 0.05;

/// First layer of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputLayer {
    /// Feature vector fed straight into the hidden layer
    Dense { width: usize },
    /// Token ids looked up in an embedding table and averaged over
    /// non-padding positions
    Embedding {
        sequence_length: usize,
        id_space: usize,
        dim: usize,
    },
}

impl InputLayer {
    /// Expected length of an input feature vector
    pub fn width(&self) -> usize {
        match *self {
            InputLayer::Dense { width } => width,
            InputLayer::Embedding { sequence_length, .. } => sequence_length,
        }
    }

    /// Width of the vector reaching the hidden layer
    fn features(&self) -> usize {
        match *self {
            InputLayer::Dense { width } => width,
            InputLayer::Embedding { dim, .. } => dim,
        }
    }
}

/// Dimensions of a network; persisted next to its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    pub input: InputLayer,
    pub hidden_width: usize,
    pub output_width: usize,
}

impl ModelShape {
    pub fn input_width(&self) -> usize {
        self.input.width()
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        let input_ok = match self.input {
            InputLayer::Dense { width } => width > 0,
            InputLayer::Embedding { sequence_length, id_space, dim } => {
                sequence_length > 0 && id_space > 2 && dim > 0
            }
        };
        if !input_ok || self.hidden_width == 0 || self.output_width == 0 {
            return Err(ClassifierError::BuildError(format!("Invalid model shape: {}", self)));
        }
        Ok(())
    }
}

impl fmt::Display for ModelShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.input {
            InputLayer::Dense { width } => write!(f, "dense({})", width)?,
            InputLayer::Embedding { sequence_length, id_space, dim } => {
                write!(f, "embedding({}x{} -> {})", sequence_length, id_space, dim)?
            }
        }
        write!(f, " -> hidden({}) -> softmax({})", self.hidden_width, self.output_width)
    }
}

/// Trainable state of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub shape: ModelShape,
    pub embedding: Option<Array2<f32>>,
    pub hidden_weights: Array2<f32>,
    pub hidden_bias: Array1<f32>,
    pub output_weights: Array2<f32>,
    pub output_bias: Array1<f32>,
}

/// Knobs for a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub learning_rate: f32,
    pub dropout: f32,
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.01,
            dropout: 0.2,
            seed: 42,
        }
    }
}

/// Outcome of [`IntentModel::train`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub epochs: usize,
    pub final_loss: f32,
}

/// One-hidden-layer feed-forward network with a softmax head.
///
/// Trained with categorical cross-entropy and Adam over the full training set
/// each epoch. There is no held-out split: FAQ corpora are tiny and static, so
/// the reported loss is training loss only.
#[derive(Debug, Clone)]
pub struct IntentModel {
    params: ModelParameters,
}

impl IntentModel {
    /// Creates an untrained network with Glorot-uniform weights.
    pub fn new(shape: ModelShape, seed: u64) -> Result<Self, ClassifierError> {
        shape.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let features = shape.input.features();

        let embedding = match shape.input {
            InputLayer::Dense { .. } => None,
            InputLayer::Embedding { id_space, dim, .. } => Some(Array2::from_shape_fn((id_space, dim), |_| {
                rng.random_range(-EMBEDDING_INIT_RANGE..EMBEDDING_INIT_RANGE)
            })),
        };
        let hidden_weights = glorot_uniform(&mut rng, features, shape.hidden_width);
        let output_weights = glorot_uniform(&mut rng, shape.hidden_width, shape.output_width);

        Ok(Self {
            params: ModelParameters {
                shape,
                embedding,
                hidden_weights,
                hidden_bias: Array1::zeros(shape.hidden_width),
                output_weights,
                output_bias: Array1::zeros(shape.output_width),
            },
        })
    }

    /// Wraps previously trained parameters after checking they agree with
    /// their recorded shape.
    pub fn from_parameters(params: ModelParameters) -> Result<Self, ClassifierError> {
        let shape = params.shape;
        shape.validate()?;
        let features = shape.input.features();

        let embedding_ok = match (shape.input, &params.embedding) {
            (InputLayer::Dense { .. }, None) => true,
            (InputLayer::Embedding { id_space, dim, .. }, Some(table)) => table.dim() == (id_space, dim),
            _ => false,
        };
        if !embedding_ok
            || params.hidden_weights.dim() != (features, shape.hidden_width)
            || params.hidden_bias.len() != shape.hidden_width
            || params.output_weights.dim() != (shape.hidden_width, shape.output_width)
            || params.output_bias.len() != shape.output_width
        {
            return Err(ClassifierError::BuildError(format!(
                "Parameter arrays do not match recorded shape {}",
                shape
            )));
        }
        Ok(Self { params })
    }

    pub fn shape(&self) -> &ModelShape {
        &self.params.shape
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    /// Fits the network to `features` and one-hot `labels`.
    ///
    /// # Errors
    /// - `TrainingError` if the set is empty, the two slices differ in length,
    ///   a feature vector is not `input_width` long, a label is not
    ///   `output_width` long, or a sequence holds an invalid id
    pub fn train(
        &mut self,
        features: &[Array1<f32>],
        labels: &[Array1<f32>],
        options: &TrainingOptions,
    ) -> Result<TrainingReport, ClassifierError> {
        self.train_until(features, labels, options, || false)
    }

    /// Same as [`IntentModel::train`], but polls `cancelled` before every
    /// epoch and stops with `ClassifierError::Cancelled` once it returns true.
    /// Parameters are left partially trained in that case.
    pub fn train_until<F: Fn() -> bool>(
        &mut self,
        features: &[Array1<f32>],
        labels: &[Array1<f32>],
        options: &TrainingOptions,
        cancelled: F,
    ) -> Result<TrainingReport, ClassifierError> {
        let shape = self.params.shape;
        if features.is_empty() {
            return Err(ClassifierError::TrainingError("Training set is empty".into()));
        }
        if features.len() != labels.len() {
            return Err(ClassifierError::TrainingError(format!(
                "Got {} feature vectors but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(bad) = features.iter().find(|f| f.len() != shape.input_width()) {
            return Err(ClassifierError::TrainingError(format!(
                "Feature vector length {} does not match input width {}",
                bad.len(),
                shape.input_width()
            )));
        }
        if let Some(bad) = labels.iter().find(|l| l.len() != shape.output_width) {
            return Err(ClassifierError::TrainingError(format!(
                "Label length {} does not match output width {}",
                bad.len(),
                shape.output_width
            )));
        }
        if !(0.0..1.0).contains(&options.dropout) {
            return Err(ClassifierError::TrainingError(format!(
                "Dropout rate must be in [0, 1), got {}",
                options.dropout
            )));
        }

        let n = features.len();
        let x = stack_rows(features, shape.input_width());
        let y = stack_rows(labels, shape.output_width);
        let sequences = match shape.input {
            InputLayer::Embedding { id_space, .. } => Some(
                sequence_ids(x.view(), id_space).map_err(ClassifierError::TrainingError)?,
            ),
            InputLayer::Dense { .. } => None,
        };

        let mut rng = StdRng::seed_from_u64(options.seed);
        let keep = 1.0 - options.dropout;
        let mut embedding_adam = self.params.embedding.as_ref().map(Adam::new);
        let mut hidden_w_adam = Adam::new(&self.params.hidden_weights);
        let mut hidden_b_adam = Adam::new(&self.params.hidden_bias);
        let mut output_w_adam = Adam::new(&self.params.output_weights);
        let mut output_b_adam = Adam::new(&self.params.output_bias);

        info!("Training {} on {} examples for {} epochs", shape, n, options.epochs);
        let mut final_loss = f32::NAN;
        for epoch in 1..=options.epochs {
            if cancelled() {
                info!("Training cancelled at epoch {}/{}", epoch, options.epochs);
                return Err(ClassifierError::Cancelled);
            }
            let pooled = match &sequences {
                Some(ids) => self.pool_embeddings(ids),
                None => x.clone(),
            };

            let z1 = pooled.dot(&self.params.hidden_weights) + &self.params.hidden_bias;
            let h = z1.mapv(|v| v.max(0.0));
            let mask = Array2::from_shape_fn(h.raw_dim(), |_| {
                if rng.random::<f32>() < keep {
                    1.0 / keep
                } else {
                    0.0
                }
            });
            let hd = &h * &mask;
            let z2 = hd.dot(&self.params.output_weights) + &self.params.output_bias;
            let p = softmax_rows(&z2);

            final_loss = -(&y * &p.mapv(|v| (v + 1e-12).ln())).sum() / n as f32;
            if epoch == 1 || epoch % 50 == 0 {
                debug!("epoch {}/{}: loss {:.5}", epoch, options.epochs, final_loss);
            }

            let dz2 = (&p - &y) / n as f32;
            let d_output_w = hd.t().dot(&dz2);
            let d_output_b = dz2.sum_axis(Axis(0));
            let dz1 = dz2.dot(&self.params.output_weights.t()) * &mask * &z1.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
            let d_hidden_w = pooled.t().dot(&dz1);
            let d_hidden_b = dz1.sum_axis(Axis(0));

            if let (Some(ids), Some(table), Some(adam)) =
                (&sequences, self.params.embedding.as_mut(), embedding_adam.as_mut())
            {
                let d_pooled = dz1.dot(&self.params.hidden_weights.t());
                let mut d_table = Array2::zeros(table.raw_dim());
                for (row_ids, grad) in ids.iter().zip(d_pooled.axis_iter(Axis(0))) {
                    let active: Vec<usize> = row_ids.iter().copied().filter(|&id| id != PADDING_ID).collect();
                    if active.is_empty() {
                        continue;
                    }
                    let share = grad.mapv(|g| g / active.len() as f32);
                    for id in active {
                        let mut slot = d_table.row_mut(id);
                        slot += &share;
                    }
                }
                adam.step(table, &d_table, options.learning_rate, epoch as i32);
            }

            hidden_w_adam.step(&mut self.params.hidden_weights, &d_hidden_w, options.learning_rate, epoch as i32);
            hidden_b_adam.step(&mut self.params.hidden_bias, &d_hidden_b, options.learning_rate, epoch as i32);
            output_w_adam.step(&mut self.params.output_weights, &d_output_w, options.learning_rate, epoch as i32);
            output_b_adam.step(&mut self.params.output_bias, &d_output_b, options.learning_rate, epoch as i32);
        }

        if !final_loss.is_finite() && options.epochs > 0 {
            return Err(ClassifierError::TrainingError("Training diverged".into()));
        }
        info!("Training finished with loss {:.5}", final_loss);
        Ok(TrainingReport {
            epochs: options.epochs,
            final_loss,
        })
    }

    /// Probability distribution over intents for one feature vector.
    ///
    /// # Errors
    /// - `PredictionError` if the vector has the wrong length, holds an
    ///   invalid sequence id, or the network produces non-finite output
    pub fn predict(&self, features: &Array1<f32>) -> Result<Array1<f32>, ClassifierError> {
        let shape = self.params.shape;
        if features.len() != shape.input_width() {
            return Err(ClassifierError::PredictionError(format!(
                "Feature vector length {} does not match input width {}",
                features.len(),
                shape.input_width()
            )));
        }

        let x = features.view().insert_axis(Axis(0));
        let pooled = match shape.input {
            InputLayer::Embedding { id_space, .. } => {
                let ids = sequence_ids(x, id_space).map_err(ClassifierError::PredictionError)?;
                self.pool_embeddings(&ids)
            }
            InputLayer::Dense { .. } => x.to_owned(),
        };

        let h = (pooled.dot(&self.params.hidden_weights) + &self.params.hidden_bias).mapv(|v| v.max(0.0));
        let logits = h.dot(&self.params.output_weights) + &self.params.output_bias;
        let probabilities = softmax(logits.row(0));
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::PredictionError("Model produced non-finite output".into()));
        }
        Ok(probabilities)
    }

    fn pool_embeddings(&self, sequences: &[Vec<usize>]) -> Array2<f32> {
        let features = self.params.shape.input.features();
        let mut pooled = Array2::zeros((sequences.len(), features));
        let Some(table) = self.params.embedding.as_ref() else {
            return pooled;
        };
        for (mut out, ids) in pooled.axis_iter_mut(Axis(0)).zip(sequences) {
            let mut count = 0usize;
            for &id in ids.iter().filter(|&&id| id != PADDING_ID) {
                out += &table.row(id);
                count += 1;
            }
            if count > 0 {
                out /= count as f32;
            }
        }
        pooled
    }
}

fn glorot_uniform(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit))
}

fn stack_rows(rows: &[Array1<f32>], width: usize) -> Array2<f32> {
    let mut out = Array2::zeros((rows.len(), width));
    for (mut dst, src) in out.axis_iter_mut(Axis(0)).zip(rows) {
        dst.assign(src);
    }
    out
}

fn sequence_ids(x: ArrayView2<f32>, id_space: usize) -> Result<Vec<Vec<usize>>, String> {
    x.axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .map(|&v| {
                    if v >= 0.0 && v.fract() == 0.0 && (v as usize) < id_space {
                        Ok(v as usize)
                    } else {
                        Err(format!("Invalid token id {} (id space is {})", v, id_space))
                    }
                })
                .collect()
        })
        .collect()
}

struct Adam<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Adam<D> {
    fn new(param: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    fn step(&mut self, param: &mut Array<f32, D>, grad: &Array<f32, D>, learning_rate: f32, t: i32) {
        let m_correction = 1.0 - ADAM_BETA1.powi(t);
        let v_correction = 1.0 - ADAM_BETA2.powi(t);
        Zip::from(param)
            .and(grad)
            .and(&mut self.m)
            .and(&mut self.v)
            .for_each(|p, &g, m, v| {
                *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = *m / m_correction;
                let v_hat = *v / v_correction;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dense_shape() -> ModelShape {
        ModelShape {
            input: InputLayer::Dense { width: 3 },
            hidden_width: 8,
            output_width: 2,
        }
    }

    fn one_hot(index: usize, width: usize) -> Array1<f32> {
        let mut v = Array1::zeros(width);
        v[index] = 1.0;
        v
    }

    #[test]
    fn test_training_separates_classes() {
        let mut model = IntentModel::new(dense_shape(), 7).unwrap();
        let features = vec![array![1.0, 0.0, 0.0], array![0.0, 1.0, 1.0]];
        let labels = vec![one_hot(0, 2), one_hot(1, 2)];

        let report = model.train(&features, &labels, &TrainingOptions::default()).unwrap();
        assert_eq!(report.epochs, 200);
        assert!(report.final_loss < 0.3);

        let p = model.predict(&features[0]).unwrap();
        assert!(p[0] > 0.5);
        let p = model.predict(&features[1]).unwrap();
        assert!(p[1] > 0.5);
    }

    #[test]
    fn test_predict_returns_distribution() {
        let model = IntentModel::new(dense_shape(), 1).unwrap();
        for input in [array![0.0, 0.0, 0.0], array![5.0, -3.0, 2.0], array![0.1, 0.2, 0.3]] {
            let p = model.predict(&input).unwrap();
            assert_eq!(p.len(), 2);
            assert!(p.iter().all(|&x| x >= 0.0 && x <= 1.0));
            assert!((p.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_training_rejects_wrong_widths() {
        let mut model = IntentModel::new(dense_shape(), 1).unwrap();
        let options = TrainingOptions::default();

        let result = model.train(&[array![1.0, 0.0]], &[one_hot(0, 2)], &options);
        assert!(matches!(result, Err(ClassifierError::TrainingError(_))));

        let result = model.train(&[array![1.0, 0.0, 0.0]], &[one_hot(0, 3)], &options);
        assert!(matches!(result, Err(ClassifierError::TrainingError(_))));

        let result = model.train(&[], &[], &options);
        assert!(matches!(result, Err(ClassifierError::TrainingError(_))));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = IntentModel::new(dense_shape(), 1).unwrap();
        let result = model.predict(&array![1.0]);
        assert!(matches!(result, Err(ClassifierError::PredictionError(_))));
    }

    #[test]
    fn test_embedding_model_trains_on_sequences() {
        let shape = ModelShape {
            input: InputLayer::Embedding { sequence_length: 4, id_space: 6, dim: 8 },
            hidden_width: 16,
            output_width: 2,
        };
        let mut model = IntentModel::new(shape, 3).unwrap();
        let features = vec![array![2.0, 3.0, 0.0, 0.0], array![4.0, 5.0, 0.0, 0.0]];
        let labels = vec![one_hot(0, 2), one_hot(1, 2)];
        model.train(&features, &labels, &TrainingOptions::default()).unwrap();

        assert!(model.predict(&features[0]).unwrap()[0] > 0.5);
        assert!(model.predict(&features[1]).unwrap()[1] > 0.5);

        // Ids outside the table are refused rather than read out of bounds.
        let result = model.predict(&array![9.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(ClassifierError::PredictionError(_))));
    }

    #[test]
    fn test_from_parameters_checks_arrays() {
        let model = IntentModel::new(dense_shape(), 1).unwrap();
        let mut params = model.parameters().clone();
        assert!(IntentModel::from_parameters(params.clone()).is_ok());

        params.output_bias = Array1::zeros(5);
        assert!(matches!(
            IntentModel::from_parameters(params),
            Err(ClassifierError::BuildError(_))
        ));
    }

    #[test]
    fn test_cancelled_training_stops() {
        let mut model = IntentModel::new(dense_shape(), 7).unwrap();
        let features = vec![array![1.0, 0.0, 0.0], array![0.0, 1.0, 1.0]];
        let labels = vec![one_hot(0, 2), one_hot(1, 2)];
        let options = TrainingOptions { epochs: 1_000_000, ..TrainingOptions::default() };

        let result = model.train_until(&features, &labels, &options, || true);
        assert_eq!(result, Err(ClassifierError::Cancelled));
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let a = IntentModel::new(dense_shape(), 11).unwrap();
        let b = IntentModel::new(dense_shape(), 11).unwrap();
        assert_eq!(a.parameters(), b.parameters());
    }
}
