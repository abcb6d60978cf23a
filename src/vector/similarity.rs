use anyhow::Result;

/// Magnitudes below this are treated as zero vectors.
const MIN_MAGNITUDE: f64 = 1e-6;

/// Calculate cosine similarity directly between two vectors
///
/// # Arguments
/// * `vec1` - First vector
/// * `vec2` - Second vector
///
/// # Returns
/// * `Result<f64>` - The cosine similarity, or an error if the dimensions
///   differ or either vector has (near) zero magnitude
pub fn cosine_similarity(vec1: &[f32], vec2: &[f32]) -> Result<f64> {
    if vec1.len() != vec2.len() {
        return Err(anyhow::anyhow!(
            "Vector dimensions don't match: {} vs {}",
            vec1.len(),
            vec2.len()
        ));
    }

    let mag1 = magnitude(vec1);
    let mag2 = magnitude(vec2);

    if mag1 < MIN_MAGNITUDE || mag2 < MIN_MAGNITUDE {
        return Err(anyhow::anyhow!("Zero magnitude vector detected"));
    }

    let dot_product: f64 = vec1
        .iter()
        .zip(vec2.iter())
        .map(|(a, b)| *a as f64 * *b as f64)
        .sum();

    Ok((dot_product / (mag1 * mag2)).clamp(-1.0, 1.0))
}

/// Cosine distance (`1 - similarity`) in `[0, 2]`.
///
/// A zero vector is considered unrelated to everything, so it sits at
/// distance 1.0 from any other vector.
pub fn cosine_distance(vec1: &[f32], vec2: &[f32]) -> Result<f64> {
    if vec1.len() != vec2.len() {
        return Err(anyhow::anyhow!(
            "Vector dimensions don't match: {} vs {}",
            vec1.len(),
            vec2.len()
        ));
    }
    if magnitude(vec1) < MIN_MAGNITUDE || magnitude(vec2) < MIN_MAGNITUDE {
        return Ok(1.0);
    }
    Ok(1.0 - cosine_similarity(vec1, vec2)?)
}

/// Symmetric pairwise cosine distance matrix with a zero diagonal.
pub fn distance_matrix(vectors: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&vectors[i], &vectors[j])?;
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }

    Ok(matrix)
}

fn magnitude(vec: &[f32]) -> f64 {
    vec.iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum::<f64>()
        .sqrt()
}
