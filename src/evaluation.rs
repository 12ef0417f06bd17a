use crate::error::{Error, Result};
use crate::mnist::Dataloader;
use crate::model::LeNet;
use burn::prelude::*;
use std::fmt;

/// Classification statistics accumulated over a confusion matrix.
///
/// `matrix[actual][predicted]` counts the examples of class `actual` that were
/// predicted as `predicted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    matrix: Vec<Vec<u64>>,
}

impl Evaluation {
    pub fn new(num_classes: usize) -> Self {
        Self {
            matrix: vec![vec![0; num_classes]; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn confusion_matrix(&self) -> &[Vec<u64>] {
        &self.matrix
    }

    /// Adds one batch of targets and their predicted classes.
    pub fn eval(&mut self, targets: &[usize], predictions: &[usize]) -> Result<()> {
        if targets.len() != predictions.len() {
            return Err(Error::Evaluation(format!(
                "{} targets but {} predictions",
                targets.len(),
                predictions.len()
            )));
        }
        let n = self.num_classes();
        if let Some(class) = targets.iter().chain(predictions).find(|&&c| c >= n) {
            return Err(Error::Evaluation(format!(
                "class {class} out of range for {n} classes"
            )));
        }
        for (&actual, &predicted) in targets.iter().zip(predictions) {
            self.matrix[actual][predicted] += 1;
        }
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.matrix.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: usize) -> u64 {
        self.matrix[class][class]
    }

    pub fn false_positives(&self, class: usize) -> u64 {
        self.predicted_count(class) - self.true_positives(class)
    }

    pub fn false_negatives(&self, class: usize) -> u64 {
        self.actual_count(class) - self.true_positives(class)
    }

    fn actual_count(&self, class: usize) -> u64 {
        self.matrix[class].iter().sum()
    }

    fn predicted_count(&self, class: usize) -> u64 {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    /// Fraction of correct predictions, or 0.0 when nothing was evaluated.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: u64 = (0..self.num_classes())
            .map(|c| self.true_positives(c))
            .sum();
        correct as f64 / total as f64
    }

    /// `None` when the class was never predicted.
    pub fn precision(&self, class: usize) -> Option<f64> {
        ratio(self.true_positives(class), self.predicted_count(class))
    }

    /// `None` when the class never occurred.
    pub fn recall(&self, class: usize) -> Option<f64> {
        ratio(self.true_positives(class), self.actual_count(class))
    }

    /// `None` when precision or recall is undefined, or both are zero.
    pub fn f1(&self, class: usize) -> Option<f64> {
        let precision = self.precision(class)?;
        let recall = self.recall(class)?;
        if precision + recall == 0.0 {
            return None;
        }
        Some(2.0 * precision * recall / (precision + recall))
    }

    pub fn precision_macro(&self) -> MacroAverage {
        self.macro_average(Self::precision)
    }

    pub fn recall_macro(&self) -> MacroAverage {
        self.macro_average(Self::recall)
    }

    pub fn f1_macro(&self) -> MacroAverage {
        self.macro_average(Self::f1)
    }

    // classes with an undefined metric are left out of the average
    fn macro_average(&self, metric: impl Fn(&Self, usize) -> Option<f64>) -> MacroAverage {
        let values: Vec<f64> = (0..self.num_classes())
            .filter_map(|c| metric(self, c))
            .collect();
        let excluded = self.num_classes() - values.len();
        let value = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        MacroAverage { value, excluded }
    }

    /// Human-readable summary with the metrics and the confusion matrix.
    pub fn stats(&self) -> String {
        self.to_string()
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator != 0).then(|| numerator as f64 / denominator as f64)
}

/// A metric averaged over classes, equally weighted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacroAverage {
    pub value: f64,
    /// Number of classes for which the metric was undefined.
    pub excluded: usize,
}

impl fmt::Display for MacroAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.value)?;
        if self.excluded > 0 {
            write!(f, "\t({} classes excluded from average)", self.excluded)?;
        }
        Ok(())
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.num_classes();
        writeln!(f)?;
        writeln!(
            f,
            "========================Evaluation Metrics========================"
        )?;
        writeln!(f, " # of classes:    {n}")?;
        writeln!(f, " # of examples:   {}", self.total())?;
        writeln!(f, " Accuracy:        {:.4}", self.accuracy())?;
        writeln!(f, " Precision:       {}", self.precision_macro())?;
        writeln!(f, " Recall:          {}", self.recall_macro())?;
        writeln!(f, " F1 Score:        {}", self.f1_macro())?;
        writeln!(
            f,
            "Precision, recall & F1: macro-averaged (equally weighted avg. of {n} classes)"
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "=========================Confusion Matrix========================="
        )?;
        let width = self
            .matrix
            .iter()
            .flatten()
            .max()
            .map_or(1, |max| max.to_string().len())
            .max(n.to_string().len());
        for predicted in 0..n {
            write!(f, " {predicted:>width$}")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "-".repeat((width + 1) * n))?;
        for (actual, row) in self.matrix.iter().enumerate() {
            for count in row {
                write!(f, " {count:>width$}")?;
            }
            writeln!(f, " | {actual} = {actual}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Confusion matrix format: Actual (rowClass) predicted as (columnClass) N times"
        )?;
        write!(
            f,
            "=================================================================="
        )
    }
}

/// Runs `model` over the whole loader and accumulates its predictions.
pub fn evaluate<B: Backend>(model: &LeNet<B>, dataloader: Dataloader<B>) -> Result<Evaluation> {
    let mut evaluation = Evaluation::new(model.output.weight.dims()[1]);

    for batch in dataloader.iter() {
        let [batch_size] = batch.targets.dims();
        let targets = to_classes(batch.targets.clone())?;
        let output = model.forward(batch.images);
        let predictions = to_classes(output.argmax(1).reshape([batch_size]))?;
        evaluation.eval(&targets, &predictions)?;
    }

    Ok(evaluation)
}

/// Reads an Int tensor of class indices back into host memory.
pub fn to_classes<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| Error::TensorData(format!("{e:?}")))
        .map(|values| values.into_iter().map(|v| v as usize).collect())
}
