use ndarray::{Array1, Array2, ArrayView1, Axis};

pub(crate) fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    if sum > 0.0 && sum.is_finite() {
        exp / sum
    } else {
        Array1::from_elem(logits.len(), 1.0 / logits.len().max(1) as f32)
    }
}

pub(crate) fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = Array2::zeros(logits.raw_dim());
    for (mut row, logit_row) in out.axis_iter_mut(Axis(0)).zip(logits.axis_iter(Axis(0))) {
        row.assign(&softmax(logit_row));
    }
    out
}

/// Index and value of the largest entry; the first maximum wins ties.
pub(crate) fn argmax(values: ArrayView1<f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_is_a_distribution() {
        let p = softmax(array![1.0, 2.0, 3.0, -50.0].view());
        assert!((p.sum() - 1.0).abs() < 1e-6);
        assert!(p.iter().all(|&x| x >= 0.0));
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let p = softmax(array![1000.0, 1000.0].view());
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        assert_eq!(argmax(array![0.25, 0.5, 0.5, 0.1].view()), Some((1, 0.5)));
        assert_eq!(argmax(Array1::<f32>::zeros(0).view()), None);
    }
}
