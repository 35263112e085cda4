use serde::{Deserialize, Serialize};
use std::slice::{Iter, IterMut};

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A representation of a machine learning model as vector object.
///
/// Serializes as a bare JSON array of floats, which is the wire encoding of
/// every weight vector in the protocol.
pub struct Model(pub Vec<f64>);

impl std::convert::AsRef<Model> for Model {
    fn as_ref(&self) -> &Model {
        self
    }
}

impl From<Vec<f64>> for Model {
    fn from(weights: Vec<f64>) -> Self {
        Model(weights)
    }
}

#[allow(clippy::len_without_is_empty)]
impl Model {
    /// Returns the number of weights/parameters of a model.
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Returns model with all zeros given a fixed length.
    pub fn zeros(length: usize) -> Self {
        Model(vec![0.0; length])
    }
    /// Creates an iterator that yields references to the weights/parameters of this model.
    pub fn iter(&self) -> Iter<f64> {
        self.0.iter()
    }
    /// Creates an iterator that yields mutable references to the weights/parameters of this model.
    pub fn iter_mut(&mut self) -> IterMut<f64> {
        self.0.iter_mut()
    }
    /// The Euclidean norm of the weight vector.
    pub fn l2_norm(&self) -> f64 {
        self.0.iter().map(|w| w * w).sum::<f64>().sqrt()
    }
    /// Adds `other` onto this model coordinate-wise.
    ///
    /// Both models must have the same length; extra coordinates of the
    /// longer one are ignored, which never happens behind the submission
    /// checks of the round engine.
    pub fn add_assign(&mut self, other: &Model) {
        for (w, u) in self.0.iter_mut().zip(other.iter()) {
            *w += u;
        }
    }
    /// Arithmetic mean over a collection of equal-length models.
    ///
    /// Returns `None` when the collection is empty.
    pub fn mean<'a, I>(models: I) -> Option<Model>
    where
        I: IntoIterator<Item = &'a Model>,
    {
        let mut models = models.into_iter();
        let mut acc = models.next()?.clone();
        let mut count = 1usize;
        for model in models {
            acc.add_assign(model);
            count += 1;
        }
        for w in acc.iter_mut() {
            *w /= count as f64;
        }
        Some(acc)
    }
}
