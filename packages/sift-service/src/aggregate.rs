use crate::{Error, Result};

/// Element-wise mean of every reference embedding.
///
/// All vectors contribute; the result does not depend on their order.
pub fn aggregate<V>(vectors: &[V]) -> Result<Vec<f32>>
where
	V: AsRef<[f32]>,
{
	let Some(first) = vectors.first() else {
		return Err(Error::EmptyReferenceSet);
	};
	let dim = first.as_ref().len();
	let mut sums = vec![0.0_f64; dim];

	for vector in vectors {
		let vector = vector.as_ref();

		if vector.len() != dim {
			return Err(Error::DimensionMismatch { expected: dim, actual: vector.len() });
		}

		for (sum, value) in sums.iter_mut().zip(vector) {
			*sum += f64::from(*value);
		}
	}

	let count = vectors.len() as f64;

	Ok(sums.into_iter().map(|sum| (sum / count) as f32).collect())
}
