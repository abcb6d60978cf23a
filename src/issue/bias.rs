use crate::types::{Article, Bias};

/// Share of a cluster's coverage coming from each editorial lean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasComposition {
    pub left: f64,
    pub center: f64,
    pub right: f64,
}

impl BiasComposition {
    /// Counts articles per lean and normalises to shares.
    ///
    /// With no articles the composition is entirely center rather than NaN.
    pub fn from_articles(articles: &[Article]) -> Self {
        Self::from_biases(articles.iter().map(|a| a.bias))
    }

    pub fn from_biases(biases: impl IntoIterator<Item = Bias>) -> Self {
        let mut counts = [0usize; 3];
        for bias in biases {
            counts[bias_index(bias)] += 1;
        }

        let total: usize = counts.iter().sum();
        if total == 0 {
            return Self {
                left: 0.0,
                center: 1.0,
                right: 0.0,
            };
        }

        let share = |count: usize| count as f64 / total as f64;
        Self {
            left: share(counts[0]),
            center: share(counts[1]),
            right: share(counts[2]),
        }
    }

    pub fn share(&self, bias: Bias) -> f64 {
        match bias {
            Bias::Left => self.left,
            Bias::Center => self.center,
            Bias::Right => self.right,
        }
    }

    /// The lean with the largest share. Ties go to the earlier entry of `Bias::ALL`.
    pub fn dominant(&self) -> Bias {
        let mut best = Bias::ALL[0];
        for bias in Bias::ALL.into_iter().skip(1) {
            if self.share(bias) > self.share(best) {
                best = bias;
            }
        }
        best
    }
}

fn bias_index(bias: Bias) -> usize {
    match bias {
        Bias::Left => 0,
        Bias::Center => 1,
        Bias::Right => 2,
    }
}
